//! Long-running mailbox watcher.
//!
//! One session = one gateway connection. Each session ensures labels,
//! seeds the processed set from the current unread backlog, then polls
//! until stopped or until something fails. Failures of any kind end the
//! session and are retried after an exponential backoff, forever, until
//! the stop signal is set.

pub mod backoff;
pub mod processed;
pub mod stop;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use backoff::{Backoff, DEFAULT_BACKOFF_CAP};
pub use processed::ProcessedIds;
pub use stop::StopSignal;

use crate::analysis::{LabelScheme, MessageProcessor, ProcessOutcome, ProcessorFactory};
use crate::config::WatcherConfig;
use crate::email::{GatewayConnector, GatewayError, MailboxGateway, RawMessage};

/// Why a session ended early.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Unexpected panic: {0}")]
    Panic(String),
}

/// Timing and batch sizes for the watcher.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub poll_interval: Duration,
    pub poll_batch: usize,
    pub seed_batch: usize,
    pub backoff_cap: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self::from(&WatcherConfig::default())
    }
}

impl From<&WatcherConfig> for WatcherOptions {
    fn from(config: &WatcherConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            poll_batch: config.poll_batch,
            seed_batch: config.seed_batch,
            backoff_cap: Duration::from_secs(config.backoff_cap_secs),
        }
    }
}

pub struct Watcher {
    connector: Arc<dyn GatewayConnector>,
    factory: ProcessorFactory,
    options: WatcherOptions,
    labels: LabelScheme,
    stop: StopSignal,
}

impl Watcher {
    pub fn new(
        connector: Arc<dyn GatewayConnector>,
        factory: ProcessorFactory,
        options: WatcherOptions,
        labels: LabelScheme,
    ) -> Self {
        Self {
            connector,
            factory,
            options,
            labels,
            stop: StopSignal::new(),
        }
    }

    /// Uses `signal` instead of a private one, so the owner can hand the
    /// same signal to other components before the watcher exists.
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop = signal;
        self
    }

    /// Requests shutdown. Idempotent; wakes any pending sleep.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Handle for stopping the watcher from elsewhere (signal handlers,
    /// other tasks).
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Runs sessions until stopped. Never returns an error.
    pub async fn run(&self) {
        let mut backoff = Backoff::new(self.options.backoff_cap);
        info!(
            poll_interval_secs = self.options.poll_interval.as_secs_f64(),
            poll_batch = self.options.poll_batch,
            "watcher started"
        );

        while !self.stop.is_stopped() {
            let result = AssertUnwindSafe(self.session(&mut backoff))
                .catch_unwind()
                .await;
            let err = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(panic) => WatchError::Panic(panic_message(panic.as_ref())),
            };

            if self.stop.is_stopped() {
                error!(error = %err, "session failed during shutdown");
                break;
            }

            let delay = backoff.next_delay();
            error!(
                error = %err,
                attempt = backoff.attempt(),
                retry_in_secs = delay.as_secs(),
                "session failed, reconnecting"
            );
            if self.stop.sleep(delay).await {
                break;
            }
        }

        info!("watcher stopped");
    }

    /// One connection's lifetime. `Ok` means the stop signal was observed.
    async fn session(&self, backoff: &mut Backoff) -> Result<(), WatchError> {
        debug!("connecting to mailbox");
        let gateway = self.connector.connect().await?;

        let result = AssertUnwindSafe(self.serve(&gateway, backoff))
            .catch_unwind()
            .await;

        if let Err(e) = gateway.close().await {
            warn!(error = %e, "failed to close gateway");
        }

        match result {
            Ok(r) => r,
            Err(panic) => Err(WatchError::Panic(panic_message(panic.as_ref()))),
        }
    }

    async fn serve(
        &self,
        gateway: &Arc<dyn MailboxGateway>,
        backoff: &mut Backoff,
    ) -> Result<(), WatchError> {
        gateway.ensure_labels(&self.labels.all_labels()).await?;
        backoff.reset();

        let processor = (self.factory)(Arc::clone(gateway));

        let backlog = gateway.list_unread_ids(self.options.seed_batch).await?;
        let mut processed = ProcessedIds::seeded(backlog);
        info!(backlog = processed.len(), "connected, backlog seeded");

        loop {
            if self.stop.is_stopped() {
                return Ok(());
            }

            let batch = gateway.list_unread_messages(self.options.poll_batch).await?;
            for message in processed.filter_unprocessed(batch) {
                self.handle(processor.as_ref(), &message).await;
                processed.mark(message.id);
            }

            if self.stop.sleep(self.options.poll_interval).await {
                return Ok(());
            }
        }
    }

    async fn handle(&self, processor: &dyn MessageProcessor, message: &RawMessage) {
        let result = AssertUnwindSafe(processor.process(message))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(ProcessOutcome::Completed { failed_effects, .. })) => {
                debug!(message_id = %message.id, failed_effects, "message handled");
            }
            Ok(Ok(ProcessOutcome::Skipped)) => {
                warn!(message_id = %message.id, "message skipped");
            }
            Ok(Err(e)) => {
                error!(message_id = %message.id, error = %e, "processor failed");
            }
            Err(panic) => {
                error!(
                    message_id = %message.id,
                    panic = %panic_message(panic.as_ref()),
                    "processor panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ProcessError;
    use crate::email::error::Result as GatewayResult;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Gateway serving a fixed backlog and then scripted poll batches.
    struct ScriptedGateway {
        backlog: Vec<String>,
        polls: Mutex<VecDeque<Vec<RawMessage>>>,
        closed: AtomicUsize,
        stop_when_drained: StopSignal,
    }

    #[async_trait]
    impl MailboxGateway for ScriptedGateway {
        async fn list_unread_ids(&self, _max: usize) -> GatewayResult<Vec<String>> {
            Ok(self.backlog.clone())
        }
        async fn list_unread_messages(&self, _max: usize) -> GatewayResult<Vec<RawMessage>> {
            let next = self.polls.lock().unwrap().pop_front();
            match next {
                Some(batch) => Ok(batch),
                None => {
                    self.stop_when_drained.stop();
                    Ok(vec![])
                }
            }
        }
        async fn list_messages_since(&self, _d: u32, _m: usize) -> GatewayResult<Vec<RawMessage>> {
            Ok(vec![])
        }
        async fn get_message(&self, id: &str) -> GatewayResult<RawMessage> {
            Err(GatewayError::NotFound(id.to_string()))
        }
        async fn apply_label(&self, _id: &str, _label: &str) -> GatewayResult<()> {
            Ok(())
        }
        async fn remove_label(&self, _id: &str, _label: &str) -> GatewayResult<()> {
            Ok(())
        }
        async fn star(&self, _id: &str) -> GatewayResult<()> {
            Ok(())
        }
        async fn ensure_labels(&self, _names: &[String]) -> GatewayResult<()> {
            Ok(())
        }
        async fn send(&self, _to: &str, _s: &str, _b: &str) -> GatewayResult<()> {
            Ok(())
        }
        async fn close(&self) -> GatewayResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct OneShotConnector(Arc<ScriptedGateway>);

    #[async_trait]
    impl GatewayConnector for OneShotConnector {
        async fn connect(&self) -> GatewayResult<Arc<dyn MailboxGateway>> {
            Ok(self.0.clone())
        }
    }

    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
        panic_on: Option<&'static str>,
    }

    #[async_trait]
    impl MessageProcessor for Recorder {
        async fn process(&self, message: &RawMessage) -> Result<ProcessOutcome, ProcessError> {
            self.seen.lock().unwrap().push(message.id.clone());
            if self.panic_on == Some(message.id.as_str()) {
                panic!("boom");
            }
            if self.fail_on == Some(message.id.as_str()) {
                return Err(ProcessError {
                    message_id: message.id.clone(),
                    reason: "bad message".into(),
                });
            }
            Ok(ProcessOutcome::Skipped)
        }
    }

    fn msg(id: &str) -> RawMessage {
        RawMessage::new(id, "a@example.com", "s")
    }

    fn fast_options() -> WatcherOptions {
        WatcherOptions {
            poll_interval: Duration::from_millis(1),
            poll_batch: 50,
            seed_batch: 500,
            backoff_cap: Duration::ZERO,
        }
    }

    fn watcher_for(
        backlog: &[&str],
        polls: Vec<Vec<RawMessage>>,
        fail_on: Option<&'static str>,
        panic_on: Option<&'static str>,
    ) -> (Watcher, Arc<ScriptedGateway>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_factory = seen.clone();
        let factory: ProcessorFactory = Box::new(move |_gateway| {
            Box::new(Recorder {
                seen: seen_in_factory.clone(),
                fail_on,
                panic_on,
            })
        });

        // The gateway stops the watcher once its scripted polls run out.
        let stop = StopSignal::new();
        let gateway = Arc::new(ScriptedGateway {
            backlog: backlog.iter().map(|s| s.to_string()).collect(),
            polls: Mutex::new(polls.into()),
            closed: AtomicUsize::new(0),
            stop_when_drained: stop.clone(),
        });
        let watcher = Watcher::new(
            Arc::new(OneShotConnector(gateway.clone())),
            factory,
            fast_options(),
            LabelScheme::default(),
        )
        .with_stop_signal(stop);
        (watcher, gateway, seen)
    }

    #[tokio::test]
    async fn test_backlog_is_never_processed() {
        let (watcher, gateway, seen) = watcher_for(
            &["a", "b"],
            vec![vec![msg("a"), msg("b"), msg("c")], vec![msg("a"), msg("c")]],
            None,
            None,
        );
        watcher.run().await;
        assert_eq!(*seen.lock().unwrap(), vec!["c"]);
        assert_eq!(gateway.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_and_panicking_messages_are_not_retried() {
        let (watcher, _gateway, seen) = watcher_for(
            &[],
            vec![
                vec![msg("x"), msg("y"), msg("z")],
                vec![msg("x"), msg("y"), msg("z")],
            ],
            Some("x"),
            Some("y"),
        );
        watcher.run().await;
        assert_eq!(*seen.lock().unwrap(), vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn test_stop_before_run_returns_immediately() {
        let (watcher, gateway, seen) = watcher_for(&[], vec![vec![msg("a")]], None, None);
        watcher.stop();
        watcher.run().await;
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(gateway.closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_message() {
        let p: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(p.as_ref()), "static");
        let p: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(p.as_ref()), "owned");
        let p: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(p.as_ref()), "unknown panic");
    }
}
