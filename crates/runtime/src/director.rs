//! Director: user-facing Q&A, peer coordination, proactive meeting prep
//! (spec.md §4.6).

use crate::collaborators::{CalendarClient, ChatMessage, LlmClient};
use crate::event_loop::PeerAgent;
use async_trait::async_trait;
use concord_bus::MessageBus;
use concord_common::error::{AgentError, Result};
use concord_common::types::{message_types, AlertLevel, Message, TaskStatus};
use concord_journal::Journal;
use concord_store::StateStore;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

const PERSONA: &str = "You are the Director: a calm, direct personal coordination assistant. \
Use the supplied project context and any peer results to answer precisely. \
Never invent information you were not given.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Greeting,
    FileSearch,
    Execution,
    ExternalCapability,
    Direct,
}

fn classify(question: &str) -> Intent {
    let q = question.to_lowercase();
    const GREETINGS: &[&str] = &["hi", "hello", "hey", "thanks", "thank you", "good morning", "good evening"];
    const TIME_WORDS: &[&str] = &["what time is it", "what's the time", "current time"];
    const FILE_WORDS: &[&str] = &["find", "search", "file", "files", "where is", "look for", "locate"];
    const EXEC_WORDS: &[&str] = &["run ", "execute ", "command"];
    const EXTERNAL_WORDS: &[&str] =
        &["web", "internet", "browse", "real-time", "real time", "latest", "research", "write code", "implement", "fix the bug", "call the api"];

    if GREETINGS.iter().any(|w| q.trim() == *w || q.starts_with(w)) || TIME_WORDS.iter().any(|w| q.contains(w)) {
        Intent::Greeting
    } else if EXEC_WORDS.iter().any(|w| q.contains(w)) {
        Intent::Execution
    } else if FILE_WORDS.iter().any(|w| q.contains(w)) {
        Intent::FileSearch
    } else if EXTERNAL_WORDS.iter().any(|w| q.contains(w)) {
        Intent::ExternalCapability
    } else {
        Intent::Direct
    }
}

struct PendingRequest {
    sender: oneshot::Sender<Message>,
}

/// Bounded in-memory conversation history, mirroring the teacher's
/// buffered-memory pattern generalised to a fixed-size ring.
struct ConversationHistory {
    turns: Mutex<VecDeque<(String, String)>>,
    capacity: usize,
}

impl ConversationHistory {
    fn new(capacity: usize) -> Self {
        Self { turns: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    async fn push(&self, question: &str, answer: &str) {
        let mut turns = self.turns.lock().await;
        if turns.len() == self.capacity {
            turns.pop_front();
        }
        turns.push_back((question.to_string(), answer.to_string()));
    }
}

pub struct Director {
    name: String,
    llm_model: String,
    store: Arc<StateStore>,
    bus: Arc<MessageBus>,
    journal: Arc<Journal>,
    llm: Arc<dyn LlmClient>,
    calendar: Arc<dyn CalendarClient>,
    librarian: String,
    executor: String,
    wait_timeout: Duration,
    pending: Mutex<HashMap<String, PendingRequest>>,
    history: ConversationHistory,
}

impl Director {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        llm_model: impl Into<String>,
        store: Arc<StateStore>,
        bus: Arc<MessageBus>,
        journal: Arc<Journal>,
        llm: Arc<dyn LlmClient>,
        calendar: Arc<dyn CalendarClient>,
        librarian: impl Into<String>,
        executor: impl Into<String>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            llm_model: llm_model.into(),
            store,
            bus,
            journal,
            llm,
            calendar,
            librarian: librarian.into(),
            executor: executor.into(),
            wait_timeout,
            pending: Mutex::new(HashMap::new()),
            history: ConversationHistory::new(50),
        }
    }

    /// Registers a correlation id before issuing a peer request, then waits
    /// on its private channel rather than re-polling `get_pending` — this
    /// avoids racing the event loop's own drain of the same message
    /// (spec.md §4.6 "satisfy outstanding pending_requests keyed by reply_to").
    async fn await_reply(&self, request_id: String) -> Option<Message> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), PendingRequest { sender: tx });
        let result = tokio::time::timeout(self.wait_timeout, rx).await;
        self.pending.lock().await.remove(&request_id);
        result.ok().and_then(|r| r.ok())
    }

    /// The user-facing entry point (spec.md §4.6 `ask` algorithm).
    pub async fn ask(&self, question: &str) -> String {
        match self.ask_inner(question).await {
            Ok(answer) => answer,
            Err(AgentError::Timeout) => "I didn't hear back from my team in time — try again shortly.".to_string(),
            Err(AgentError::LlmError(_)) => "I'm having trouble reaching my language model right now.".to_string(),
            Err(e) => {
                warn!(error = %e, "unhandled error answering question");
                "Sorry, I encountered an error processing your message.".to_string()
            }
        }
    }

    async fn ask_inner(&self, question: &str) -> Result<String> {
        let intent = classify(question);

        let peer_result: Option<Value> = match intent {
            Intent::Greeting => None,
            Intent::Execution => {
                return Ok(
                    "I can do that, but I won't run commands without your explicit confirmation. Reply \"confirm\" to proceed.".to_string(),
                );
            }
            Intent::FileSearch => {
                let request_id = self.bus.request_search(&self.name, &self.librarian, question, None, "smart").await?;
                self.await_reply(request_id).await.and_then(|m| serde_json::from_str(&m.body).ok())
            }
            Intent::ExternalCapability => {
                let request_id =
                    self.bus.request_claude_code(&self.name, &self.executor, question, None, false, 60).await?;
                self.await_reply(request_id).await.and_then(|m| serde_json::from_str(&m.body).ok())
            }
            Intent::Direct => None,
        };

        let context = self.assemble_context(question, peer_result.as_ref()).await?;
        let messages = vec![ChatMessage { role: "user".to_string(), content: context }];
        let answer = self
            .llm
            .complete(&self.llm_model, PERSONA, &messages, 1024, 0.4)
            .await
            .map_err(|_| AgentError::LlmError("completion failed".to_string()))?;

        self.history.push(question, &answer).await;
        Ok(answer)
    }

    async fn assemble_context(&self, question: &str, peer_result: Option<&Value>) -> Result<String> {
        let mut sections = Vec::new();
        sections.push(format!("Question: {question}"));

        let tasks = self.store.get_tasks(None).await?;
        let mut by_status: HashMap<&'static str, usize> = HashMap::new();
        for task in &tasks {
            let key = match task.status {
                TaskStatus::Pending => "pending",
                TaskStatus::InProgress => "in_progress",
                TaskStatus::Completed => "completed",
                TaskStatus::Blocked => "blocked",
            };
            *by_status.entry(key).or_insert(0) += 1;
        }
        sections.push(format!(
            "Tasks: pending={} in_progress={} completed={} blocked={}",
            by_status.get("pending").unwrap_or(&0),
            by_status.get("in_progress").unwrap_or(&0),
            by_status.get("completed").unwrap_or(&0),
            by_status.get("blocked").unwrap_or(&0),
        ));

        let alerts = self.store.get_alerts(None, Some(false)).await?;
        if !alerts.is_empty() {
            sections.push(format!("Unacknowledged alerts: {}", alerts.len()));
        }

        if let Some(result) = peer_result {
            sections.push(format!("Peer result: {result}"));
        }

        let journal_hits = self.journal.retrieve(&[], question, 3).await.unwrap_or_default();
        if !journal_hits.is_empty() {
            let titles: Vec<&str> = journal_hits.iter().map(|r| r.metadata.title.as_str()).collect();
            sections.push(format!("Relevant journal entries: {}", titles.join("; ")));
        }

        Ok(sections.join("\n"))
    }

    /// `review_request` handler: puts the completed task to the LLM for a
    /// review and derives an approval from the response (spec.md §4.6,
    /// grounded on the original `FDAAgent.review_task`).
    async fn review_task(&self, task_id: &str) -> Result<Value> {
        let Some(task) = self.store.get_task(task_id).await? else {
            return Ok(json!({ "status": "error", "message": format!("Task {task_id} not found") }));
        };

        let prompt = format!(
            "Review this task and provide feedback:\n\nTitle: {}\nDescription: {}\nOwner: {}\nStatus: {:?}\n\n\
             1. Assessment of the work\n2. Any concerns\n3. Recommendations\n\
             4. Whether this task can be marked as complete",
            task.title, task.description, task.owner, task.status
        );
        let context = self.assemble_context(&prompt, None).await.unwrap_or_else(|_| prompt.clone());
        let messages = vec![ChatMessage { role: "user".to_string(), content: context }];
        let response = self
            .llm
            .complete(&self.llm_model, PERSONA, &messages, 512, 0.2)
            .await
            .map_err(|_| AgentError::LlmError("review completion failed".to_string()))?;

        let lower = response.to_lowercase();
        let approved = ["approved", "can be marked as complete", "looks good"].iter().any(|phrase| lower.contains(phrase));

        Ok(json!({
            "status": "completed",
            "task_id": task_id,
            "response": response,
            "approved": approved,
            "timestamp": concord_common::types::now_iso(),
        }))
    }

    pub async fn run_daily_checkin(&self) -> Result<()> {
        let events = self.calendar.get_events_today().await.unwrap_or_default();
        if events.is_empty() {
            return Ok(());
        }
        let summary = events.iter().map(|e| format!("{} ({}-{})", e.subject, e.start, e.end)).collect::<Vec<_>>().join(", ");
        self.journal
            .write_entry(&self.name, vec!["meeting-prep".to_string()], "Daily check-in", &summary, concord_common::types::RelevanceDecay::Fast)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PeerAgent for Director {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, message: &Message) -> Result<()> {
        match message.msg_type.as_str() {
            message_types::SEARCH_RESULT
            | message_types::EXECUTE_RESULT
            | message_types::FILE_COMPLETE
            | message_types::KNOWLEDGE_RESULT
            | message_types::INDEX_COMPLETE => {
                if let Some(reply_to) = &message.reply_to {
                    let mut pending = self.pending.lock().await;
                    if let Some(waiting) = pending.remove(reply_to) {
                        let _ = waiting.sender.send(message.clone());
                    }
                }
                Ok(())
            }
            message_types::DISCOVERY => {
                let body: Value = serde_json::from_str(&message.body).unwrap_or(Value::Null);
                self.store
                    .add_discovery(
                        &message.from,
                        body.get("discovery_type").and_then(Value::as_str).unwrap_or("unknown"),
                        body.get("description").and_then(Value::as_str).unwrap_or(""),
                        body.get("details").unwrap_or(&Value::Null),
                    )
                    .await?;
                Ok(())
            }
            message_types::BLOCKER => {
                let body: Value = serde_json::from_str(&message.body).unwrap_or(Value::Null);
                let description = body.get("description").and_then(Value::as_str).unwrap_or("unspecified blocker");
                self.store.add_alert(AlertLevel::Critical, description, &message.from).await?;
                Ok(())
            }
            message_types::REVIEW_REQUEST => {
                let body: Value = serde_json::from_str(&message.body).unwrap_or(Value::Null);
                let task_id = body.get("task_id").and_then(Value::as_str).unwrap_or_default();
                let result = self.review_task(task_id).await?;
                self.bus.send_result(&self.name, &message.from, message_types::REVIEW_RESPONSE, &message.id, result).await?;
                Ok(())
            }
            other => {
                info!(agent = %self.name, msg_type = %other, "unrecognised message type acknowledged");
                Ok(())
            }
        }
    }

    async fn maintenance(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_greetings_and_search_and_execution_and_external() {
        assert_eq!(classify("hello there"), Intent::Greeting);
        assert_eq!(classify("find the config file"), Intent::FileSearch);
        assert_eq!(classify("run the deploy script"), Intent::Execution);
        assert_eq!(classify("can you research the latest news"), Intent::ExternalCapability);
        assert_eq!(classify("who am I talking to"), Intent::Direct);
    }
}
