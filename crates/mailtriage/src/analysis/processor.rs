//! Per-message fan-out: classify, then label and persist.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, instrument};

use super::classifier::Classifier;
use super::labels::{LabelOp, LabelScheme};
use super::types::Classification;
use crate::db::MessageStore;
use crate::email::{MailboxGateway, RawMessage};
use crate::index::SemanticStore;

/// A processor gave up on a message.
#[derive(Error, Debug)]
#[error("Processing failed for message '{message_id}': {reason}")]
pub struct ProcessError {
    pub message_id: String,
    pub reason: String,
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Classification failed; no side effects were attempted.
    Skipped,
    /// Classified; `failed_effects` counts side effects that failed.
    Completed {
        classification: Classification,
        failed_effects: usize,
    },
}

/// Handles one message at a time for the watcher.
///
/// Implementations should absorb their own side-effect failures. An `Err`
/// or a panic is still tolerated: the watcher logs it and marks the message
/// as processed either way.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, message: &RawMessage) -> Result<ProcessOutcome, ProcessError>;
}

/// Builds one processor per live gateway connection.
pub type ProcessorFactory =
    Box<dyn Fn(Arc<dyn MailboxGateway>) -> Box<dyn MessageProcessor> + Send + Sync>;

/// Classifies a message and fans the result out to labels, the semantic
/// index and the relational store.
///
/// Classification gates everything. The remaining targets are independent:
/// each failure is logged and does not stop its siblings.
pub struct AnalysisProcessor {
    classifier: Arc<dyn Classifier>,
    gateway: Arc<dyn MailboxGateway>,
    labels: LabelScheme,
    index: Option<Arc<dyn SemanticStore>>,
    store: Option<Arc<dyn MessageStore>>,
}

impl AnalysisProcessor {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        gateway: Arc<dyn MailboxGateway>,
        labels: LabelScheme,
    ) -> Self {
        Self {
            classifier,
            gateway,
            labels,
            index: None,
            store: None,
        }
    }

    pub fn with_index(mut self, index: Arc<dyn SemanticStore>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Factory binding every new processor to the connection it is given.
    pub fn factory(
        classifier: Arc<dyn Classifier>,
        labels: LabelScheme,
        index: Option<Arc<dyn SemanticStore>>,
        store: Option<Arc<dyn MessageStore>>,
    ) -> ProcessorFactory {
        Box::new(move |gateway| {
            let mut processor =
                AnalysisProcessor::new(Arc::clone(&classifier), gateway, labels.clone());
            processor.index = index.clone();
            processor.store = store.clone();
            Box::new(processor)
        })
    }

    async fn apply_labels(&self, message_id: &str, classification: &Classification) -> usize {
        let mut failures = 0;
        for op in self.labels.plan(classification) {
            let result = match &op {
                LabelOp::Apply(label) => self.gateway.apply_label(message_id, label).await,
                LabelOp::Star => self.gateway.star(message_id).await,
            };
            if let Err(e) = result {
                failures += 1;
                error!(message_id, step = %op.describe(), error = %e, "failed to apply label");
            }
        }
        failures
    }

    fn write_storage(&self, message: &RawMessage, classification: &Classification) -> usize {
        let mut failures = 0;
        if let Some(index) = &self.index {
            if let Err(e) = index.upsert(message, classification) {
                failures += 1;
                error!(message_id = %message.id, step = "semantic index", error = %e, "failed to write");
            }
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save(message, classification) {
                failures += 1;
                error!(message_id = %message.id, step = "database", error = %e, "failed to write");
            }
        }
        failures
    }
}

#[async_trait]
impl MessageProcessor for AnalysisProcessor {
    #[instrument(skip_all, fields(message_id = %message.id))]
    async fn process(&self, message: &RawMessage) -> Result<ProcessOutcome, ProcessError> {
        let classification = match self.classifier.classify(message).await {
            Ok(c) => c,
            Err(e) => {
                error!(message_id = %message.id, error = %e, "classification failed");
                return Ok(ProcessOutcome::Skipped);
            }
        };

        let mut failed_effects = self.apply_labels(&message.id, &classification).await;
        failed_effects += self.write_storage(message, &classification);

        info!(
            message_id = %message.id,
            kind = %classification.kind,
            domain = classification.domain.map(|d| d.as_str()).unwrap_or("n/a"),
            reply = classification.requires_reply,
            deadline = ?classification.deadline,
            failed_effects,
            "message processed"
        );

        Ok(ProcessOutcome::Completed {
            classification,
            failed_effects,
        })
    }
}
