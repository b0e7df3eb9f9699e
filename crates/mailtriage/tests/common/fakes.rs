//! In-memory stand-ins for the mailbox and the classifier.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mailtriage::analysis::{
    Classification, ClassifyError, Domain, ProcessError, ProcessOutcome, ProcessorFactory,
};
use mailtriage::email::error::{GatewayError, Result as GatewayResult};
use mailtriage::{
    Classifier, GatewayConnector, MailboxGateway, MessageProcessor, RawMessage, StopSignal,
};

use super::builders::ClassificationBuilder;

/// Mailbox serving a fixed unread backlog and a queue of scripted polls.
///
/// Once the last scripted poll has been served, the attached stop signal
/// (if any) is set so the watcher winds down after that batch.
#[derive(Default)]
pub struct FakeMailbox {
    backlog: Vec<String>,
    polls: Mutex<VecDeque<GatewayResult<Vec<RawMessage>>>>,
    recent: Vec<RawMessage>,
    stop_when_drained: Option<StopSignal>,
    fail_labels: HashSet<String>,
    pub ensured: Mutex<Vec<Vec<String>>>,
    pub applied: Mutex<Vec<(String, String)>>,
    pub starred: Mutex<Vec<String>>,
    pub closed: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backlog(mut self, ids: &[&str]) -> Self {
        self.backlog = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn poll(self, batch: Vec<RawMessage>) -> Self {
        self.polls.lock().unwrap().push_back(Ok(batch));
        self
    }

    pub fn poll_error(self, error: GatewayError) -> Self {
        self.polls.lock().unwrap().push_back(Err(error));
        self
    }

    /// Messages returned by `list_messages_since`.
    pub fn recent(mut self, messages: Vec<RawMessage>) -> Self {
        self.recent = messages;
        self
    }

    pub fn fail_label(mut self, label: &str) -> Self {
        self.fail_labels.insert(label.to_string());
        self
    }

    pub fn stop_when_drained(mut self, signal: StopSignal) -> Self {
        self.stop_when_drained = Some(signal);
        self
    }

    pub fn labels_for(&self, id: &str) -> Vec<String> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == id)
            .map(|(_, l)| l.clone())
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailboxGateway for FakeMailbox {
    async fn list_unread_ids(&self, max: usize) -> GatewayResult<Vec<String>> {
        Ok(self.backlog.iter().take(max).cloned().collect())
    }

    async fn list_unread_messages(&self, max: usize) -> GatewayResult<Vec<RawMessage>> {
        let mut polls = self.polls.lock().unwrap();
        let next = polls.pop_front();
        if polls.is_empty() {
            if let Some(signal) = &self.stop_when_drained {
                signal.stop();
            }
        }
        match next {
            Some(Ok(batch)) => Ok(batch.into_iter().take(max).collect()),
            Some(Err(e)) => Err(e),
            None => Ok(vec![]),
        }
    }

    async fn list_messages_since(&self, _days: u32, max: usize) -> GatewayResult<Vec<RawMessage>> {
        Ok(self.recent.iter().take(max).cloned().collect())
    }

    async fn get_message(&self, id: &str) -> GatewayResult<RawMessage> {
        self.recent
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    async fn apply_label(&self, id: &str, label: &str) -> GatewayResult<()> {
        if self.fail_labels.contains(label) {
            return Err(GatewayError::Tool {
                tool: "modify_gmail_message_labels".into(),
                message: format!("cannot apply {}", label),
            });
        }
        self.applied
            .lock()
            .unwrap()
            .push((id.to_string(), label.to_string()));
        Ok(())
    }

    async fn remove_label(&self, _id: &str, _label: &str) -> GatewayResult<()> {
        Ok(())
    }

    async fn star(&self, id: &str) -> GatewayResult<()> {
        self.starred.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn ensure_labels(&self, names: &[String]) -> GatewayResult<()> {
        self.ensured.lock().unwrap().push(names.to_vec());
        Ok(())
    }

    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> GatewayResult<()> {
        Ok(())
    }

    async fn close(&self) -> GatewayResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out scripted sessions in order.
///
/// When the script runs out it sets `stop` and fails, so a watcher
/// under test always terminates.
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<GatewayResult<Arc<FakeMailbox>>>>,
    stop: StopSignal,
    connects: AtomicUsize,
    attempts: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedConnector {
    pub fn new(stop: StopSignal) -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            stop,
            connects: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn session(self, mailbox: Arc<FakeMailbox>) -> Self {
        self.sessions.lock().unwrap().push_back(Ok(mailbox));
        self
    }

    pub fn refuse(self, error: GatewayError) -> Self {
        self.sessions.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Time between consecutive connect attempts, on tokio's clock.
    pub fn gaps(&self) -> Vec<std::time::Duration> {
        self.attempts
            .lock()
            .unwrap()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }
}

#[async_trait]
impl GatewayConnector for ScriptedConnector {
    async fn connect(&self) -> GatewayResult<Arc<dyn MailboxGateway>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.attempts
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        match self.sessions.lock().unwrap().pop_front() {
            Some(Ok(mailbox)) => Ok(mailbox as Arc<dyn MailboxGateway>),
            Some(Err(e)) => Err(e),
            None => {
                self.stop.stop();
                Err(GatewayError::Transport("no more scripted sessions".into()))
            }
        }
    }
}

/// Classifier answering from a fixed table.
///
/// Unknown ids classify as automated `Other`; ids in `fail` return an error.
#[derive(Default)]
pub struct TableClassifier {
    answers: HashMap<String, Classification>,
    fail: HashSet<String>,
    pub calls: AtomicUsize,
}

impl TableClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, classification: Classification) -> Self {
        self.answers
            .insert(classification.message_id.clone(), classification);
        self
    }

    pub fn fail(mut self, id: &str) -> Self {
        self.fail.insert(id.to_string());
        self
    }
}

#[async_trait]
impl Classifier for TableClassifier {
    async fn classify(&self, message: &RawMessage) -> Result<Classification, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.contains(&message.id) {
            return Err(ClassifyError::Malformed {
                message_id: message.id.clone(),
                reason: "scripted failure".into(),
            });
        }
        Ok(self.answers.get(&message.id).cloned().unwrap_or_else(|| {
            ClassificationBuilder::automated(&message.id, Domain::Other).build()
        }))
    }
}

/// Processor recording every id it sees. Can be told to fail or panic.
#[derive(Clone, Default)]
pub struct RecordingProcessor {
    pub seen: Arc<Mutex<Vec<String>>>,
    pub built: Arc<AtomicUsize>,
    fail: Arc<HashSet<String>>,
    panic: Arc<HashSet<String>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, ids: &[&str]) -> Self {
        self.fail = Arc::new(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn panicking_on(mut self, ids: &[&str]) -> Self {
        self.panic = Arc::new(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn factory(&self) -> ProcessorFactory {
        let template = self.clone();
        Box::new(move |_gateway| {
            template.built.fetch_add(1, Ordering::SeqCst);
            Box::new(template.clone())
        })
    }
}

#[async_trait]
impl MessageProcessor for RecordingProcessor {
    async fn process(&self, message: &RawMessage) -> Result<ProcessOutcome, ProcessError> {
        self.seen.lock().unwrap().push(message.id.clone());
        if self.panic.contains(&message.id) {
            panic!("processor blew up on {}", message.id);
        }
        if self.fail.contains(&message.id) {
            return Err(ProcessError {
                message_id: message.id.clone(),
                reason: "scripted failure".into(),
            });
        }
        Ok(ProcessOutcome::Completed {
            classification: ClassificationBuilder::automated(&message.id, Domain::Other).build(),
            failed_effects: 0,
        })
    }
}
