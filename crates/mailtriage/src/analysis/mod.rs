//! Message classification and the per-message fan-out processor.

pub mod anthropic;
pub mod classifier;
pub mod labels;
pub mod processor;
pub mod prompt;
pub mod types;

pub use anthropic::AnthropicClassifier;
pub use classifier::{Classifier, ClassifyError};
pub use labels::{LabelOp, LabelScheme};
pub use processor::{
    AnalysisProcessor, MessageProcessor, ProcessError, ProcessOutcome, ProcessorFactory,
};
pub use types::{Classification, Domain, MessageKind};
