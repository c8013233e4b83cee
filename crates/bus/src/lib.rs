//! Durable peer message bus (spec.md §4.1).
//!
//! Messages live in a single JSON file. Every mutating operation, and every
//! read that must see a consistent snapshot, holds an in-process exclusive
//! lock for the duration of the read-modify-write; writes land via
//! write-temp-then-rename so a crash mid-write can never leave the file
//! holding a partial message. Three agent loops share one `MessageBus`
//! inside a single process (spec.md's non-goal rules out cross-host
//! coordination), so the lock is a `tokio::sync::Mutex`, not a cross-process
//! advisory file lock — released on every exit path via RAII, the same
//! discipline the teacher's `FileLockManager` uses for per-path locks.

use concord_common::error::{AgentError, Result};
use concord_common::types::{message_types, new_id, now_iso, Message, Priority};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BusFile {
    messages: Vec<Message>,
    created_at: String,
}

impl Default for BusFile {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            created_at: now_iso(),
        }
    }
}

pub struct MessageBus {
    path: PathBuf,
    lock: Mutex<()>,
    acquire_timeout: Duration,
}

impl MessageBus {
    pub fn new(path: impl Into<PathBuf>, lock_retry_attempts: u32, lock_retry_delay_ms: u64) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            acquire_timeout: Duration::from_millis(lock_retry_delay_ms) * lock_retry_attempts.max(1),
        }
    }

    async fn with_lock<T>(&self, f: impl FnOnce(&mut BusFile) -> Result<T>) -> Result<T> {
        let _permit = tokio::time::timeout(self.acquire_timeout, self.lock.lock())
            .await
            .map_err(|_| AgentError::StoreUnavailable(format!("bus lock busy: {}", self.path.display())))?;

        let mut file = self.read_file()?;
        let result = f(&mut file)?;
        self.write_file(&file)?;
        Ok(result)
    }

    async fn with_lock_ro<T>(&self, f: impl FnOnce(&BusFile) -> T) -> Result<T> {
        let _permit = tokio::time::timeout(self.acquire_timeout, self.lock.lock())
            .await
            .map_err(|_| AgentError::StoreUnavailable(format!("bus lock busy: {}", self.path.display())))?;
        let file = self.read_file()?;
        Ok(f(&file))
    }

    fn read_file(&self) -> Result<BusFile> {
        if !self.path.exists() {
            return Ok(BusFile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BusFile::default());
        }
        serde_json::from_str(&content).map_err(|e| {
            AgentError::CorruptState(format!("bus file {} is malformed: {e}", self.path.display()))
        })
    }

    fn write_file(&self, file: &BusFile) -> Result<()> {
        let pretty = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, pretty)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Appends a new message, returning its id (spec.md §4.1).
    pub async fn send(
        &self,
        from: &str,
        to: &str,
        msg_type: &str,
        subject: &str,
        body: &str,
        priority: Priority,
        reply_to: Option<&str>,
    ) -> Result<String> {
        let id = new_id();
        let thread_id = match reply_to {
            Some(parent_id) => {
                // Look up once under the same lock acquisition isn't strictly
                // required here (ids are immutable once written) but we still
                // read through with_lock_ro to see a consistent snapshot.
                let found = self
                    .with_lock_ro(|f| f.messages.iter().find(|m| m.id == parent_id).map(|m| m.thread_id.clone()))
                    .await?;
                found.unwrap_or_else(|| id.clone())
            }
            None => id.clone(),
        };

        let message = Message {
            id: id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            msg_type: msg_type.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            priority,
            timestamp: now_iso(),
            read: false,
            read_at: None,
            thread_id,
            reply_to: reply_to.map(|s| s.to_string()),
            extra: serde_json::Map::new(),
        };

        self.with_lock(|f| {
            f.messages.push(message.clone());
            Ok(())
        })
        .await?;

        debug!(msg_id = %id, %from, %to, %msg_type, "message sent");
        Ok(id)
    }

    /// Unread messages addressed to `agent`, priority rank ascending then
    /// timestamp ascending (spec.md §4.1, property 2).
    pub async fn get_pending(&self, agent: &str) -> Result<Vec<Message>> {
        self.with_lock_ro(|f| {
            let mut pending: Vec<Message> = f
                .messages
                .iter()
                .filter(|m| m.to == agent && !m.read)
                .cloned()
                .collect();
            pending.sort_by(|a, b| {
                a.priority
                    .rank()
                    .cmp(&b.priority.rank())
                    .then_with(|| a.timestamp.cmp(&b.timestamp))
            });
            pending
        })
        .await
    }

    /// Idempotent: setting `read` on an already-read message is a no-op.
    pub async fn mark_read(&self, msg_id: &str) -> Result<()> {
        self.with_lock(|f| {
            if let Some(msg) = f.messages.iter_mut().find(|m| m.id == msg_id) {
                if !msg.read {
                    msg.read = true;
                    msg.read_at = Some(now_iso());
                }
            }
            Ok(())
        })
        .await
    }

    /// All messages sharing `msg_id`'s thread, timestamp ascending; `[]` if
    /// `msg_id` is unknown.
    pub async fn get_thread(&self, msg_id: &str) -> Result<Vec<Message>> {
        self.with_lock_ro(|f| {
            let thread_id = match f.messages.iter().find(|m| m.id == msg_id) {
                Some(m) => m.thread_id.clone(),
                None => return Vec::new(),
            };
            let mut thread: Vec<Message> = f
                .messages
                .iter()
                .filter(|m| m.thread_id == thread_id)
                .cloned()
                .collect();
            thread.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            thread
        })
        .await
    }

    /// Polls `get_pending(agent)` for a message whose `reply_to == request_id`,
    /// returning the first match or `None` once `timeout` elapses.
    pub async fn wait_for_response(
        &self,
        agent: &str,
        request_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<Message>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let pending = self.get_pending(agent).await?;
            if let Some(msg) = pending.into_iter().find(|m| m.reply_to.as_deref() == Some(request_id)) {
                return Ok(Some(msg));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::time::sleep(poll_interval.min(remaining.max(Duration::from_millis(1)))).await;
        }
    }

    /// Removes messages older than `days`; returns how many were removed.
    pub async fn cleanup_old_messages(&self, days: i64) -> Result<usize> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        self.with_lock(|f| {
            let before = f.messages.len();
            f.messages.retain(|m| {
                chrono::DateTime::parse_from_rfc3339(&m.timestamp)
                    .map(|ts| ts.with_timezone(&chrono::Utc) >= cutoff)
                    .unwrap_or(true)
            });
            let removed = before - f.messages.len();
            if removed > 0 {
                info!(removed, "cleaned up old bus messages");
            }
            Ok(removed)
        })
        .await
    }

    // --- Typed helpers (spec.md §4.1) ---------------------------------

    pub async fn request_search(&self, from: &str, to: &str, query: &str, path: Option<&str>, search_type: &str) -> Result<String> {
        let body = json!({ "query": query, "path": path, "search_type": search_type }).to_string();
        self.send(from, to, message_types::SEARCH_REQUEST, "search request", &body, Priority::Medium, None).await
    }

    pub async fn request_execute(&self, from: &str, to: &str, command: &str, cwd: Option<&str>) -> Result<String> {
        let body = json!({ "command": command, "cwd": cwd }).to_string();
        self.send(from, to, message_types::EXECUTE_REQUEST, "execute request", &body, Priority::High, None).await
    }

    pub async fn request_file_operation(
        &self,
        from: &str,
        to: &str,
        operation: &str,
        path: &str,
        content: Option<&str>,
        destination: Option<&str>,
    ) -> Result<String> {
        let body = json!({
            "operation": operation,
            "path": path,
            "content": content,
            "destination": destination,
        })
        .to_string();
        self.send(from, to, message_types::FILE_REQUEST, "file request", &body, Priority::Medium, None).await
    }

    pub async fn request_knowledge(&self, from: &str, to: &str, question: &str, context: Option<&str>) -> Result<String> {
        let body = json!({ "question": question, "context": context }).to_string();
        self.send(from, to, message_types::KNOWLEDGE_REQUEST, "knowledge request", &body, Priority::Medium, None).await
    }

    pub async fn request_claude_code(
        &self,
        from: &str,
        to: &str,
        prompt: &str,
        cwd: Option<&str>,
        allow_edits: bool,
        timeout_secs: u64,
    ) -> Result<String> {
        let body = json!({
            "prompt": prompt,
            "cwd": cwd,
            "allow_edits": allow_edits,
            "timeout": timeout_secs,
        })
        .to_string();
        self.send(from, to, message_types::CLAUDE_CODE_REQUEST, "claude code request", &body, Priority::Medium, None).await
    }

    pub async fn share_discovery(&self, from: &str, to: &str, discovery_type: &str, description: &str, details: serde_json::Value) -> Result<String> {
        let body = json!({ "discovery_type": discovery_type, "description": description, "details": details }).to_string();
        self.send(from, to, message_types::DISCOVERY, "discovery", &body, Priority::Low, None).await
    }

    pub async fn report_blocker(&self, from: &str, to: &str, description: &str) -> Result<String> {
        let body = json!({ "description": description }).to_string();
        self.send(from, to, message_types::BLOCKER, "blocker", &body, Priority::High, None).await
    }

    /// A fresh, uncorrelated request for the Director to review a completed
    /// task — not a reply, so `reply_to` is always `None`.
    pub async fn request_review(&self, from: &str, to: &str, task_id: &str) -> Result<String> {
        let body = json!({ "task_id": task_id }).to_string();
        self.send(from, to, message_types::REVIEW_REQUEST, "task review", &body, Priority::Medium, None).await
    }

    pub async fn send_result(&self, from: &str, to: &str, result_type: &str, reply_to: &str, payload: serde_json::Value) -> Result<String> {
        let body = payload.to_string();
        self.send(from, to, result_type, "result", &body, Priority::Medium, Some(reply_to)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn bus_at(dir: &tempfile::TempDir) -> MessageBus {
        MessageBus::new(dir.path().join("message_bus.json"), 20, 50)
    }

    #[tokio::test]
    async fn send_and_get_pending_orders_by_priority_then_time() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus_at(&dir);

        bus.send("director", "librarian", "discovery", "a", "{}", Priority::Medium, None).await.unwrap();
        bus.send("director", "librarian", "discovery", "b", "{}", Priority::High, None).await.unwrap();
        bus.send("director", "librarian", "discovery", "c", "{}", Priority::Medium, None).await.unwrap();
        bus.send("director", "librarian", "discovery", "d", "{}", Priority::Low, None).await.unwrap();

        let pending = bus.get_pending("librarian").await.unwrap();
        let subjects: Vec<&str> = pending.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["b", "a", "c", "d"]);
    }

    #[tokio::test]
    async fn thread_chain_shares_thread_id_in_timestamp_order() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus_at(&dir);

        let m0 = bus.send("director", "librarian", "question", "q", "{}", Priority::Medium, None).await.unwrap();
        let m1 = bus.send("librarian", "director", "suggestion", "r", "{}", Priority::Medium, Some(&m0)).await.unwrap();
        let m2 = bus.send("director", "librarian", "question", "r2", "{}", Priority::Medium, Some(&m1)).await.unwrap();

        let thread = bus.get_thread(&m2).await.unwrap();
        let ids: Vec<&str> = thread.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![m0.as_str(), m1.as_str(), m2.as_str()]);
        assert!(thread.iter().all(|m| m.thread_id == m0));
    }

    #[tokio::test]
    async fn get_thread_of_unknown_id_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus_at(&dir);
        assert!(bus.get_thread("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wait_for_response_returns_first_matching_reply() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(bus_at(&dir));

        let req_id = bus.request_execute("director", "executor", "ls", None).await.unwrap();

        let bus2 = Arc::clone(&bus);
        let req_id2 = req_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            bus2.send_result("executor", "director", "execute_result", &req_id2, json!({"success": true})).await.unwrap();
        });

        let reply = bus
            .wait_for_response("director", &req_id, Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(reply.is_some());
        assert_eq!(reply.unwrap().reply_to.as_deref(), Some(req_id.as_str()));
    }

    #[tokio::test]
    async fn wait_for_response_times_out_when_no_reply_arrives() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus_at(&dir);

        let started = tokio::time::Instant::now();
        let reply = bus
            .wait_for_response("director", "nonexistent", Duration::from_millis(200), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(reply.is_none());
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus_at(&dir);
        let id = bus.send("director", "librarian", "question", "q", "{}", Priority::Medium, None).await.unwrap();

        bus.mark_read(&id).await.unwrap();
        bus.mark_read(&id).await.unwrap();

        let thread = bus.get_thread(&id).await.unwrap();
        assert!(thread[0].read);
    }

    #[tokio::test]
    async fn concurrent_sends_all_land_with_unique_ids() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(bus_at(&dir));

        let mut handles = Vec::new();
        for i in 0..20 {
            let bus = Arc::clone(&bus);
            handles.push(tokio::spawn(async move {
                bus.send("director", "librarian", "discovery", &format!("n{i}"), "{}", Priority::Medium, None)
                    .await
                    .unwrap()
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 20);

        let pending = bus.get_pending("librarian").await.unwrap();
        assert_eq!(pending.len(), 20);
    }

    #[tokio::test]
    async fn cleanup_removes_only_old_messages() {
        let dir = tempfile::tempdir().unwrap();
        let bus = bus_at(&dir);
        let path = dir.path().join("message_bus.json");

        bus.send("director", "librarian", "discovery", "fresh", "{}", Priority::Medium, None).await.unwrap();

        // Inject a stale message directly to avoid sleeping in the test.
        let mut file: BusFile = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        file.messages.push(Message {
            id: new_id(),
            from: "director".into(),
            to: "librarian".into(),
            msg_type: "discovery".into(),
            subject: "stale".into(),
            body: "{}".into(),
            priority: Priority::Medium,
            timestamp: (chrono::Utc::now() - chrono::Duration::days(90)).to_rfc3339(),
            read: false,
            read_at: None,
            thread_id: "stale-thread".into(),
            reply_to: None,
            extra: Default::default(),
        });
        std::fs::write(&path, serde_json::to_string_pretty(&file).unwrap()).unwrap();

        let removed = bus.cleanup_old_messages(30).await.unwrap();
        assert_eq!(removed, 1);
        let pending = bus.get_pending("librarian").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].subject, "fresh");
    }

    #[tokio::test]
    async fn corrupt_bus_file_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("message_bus.json");
        std::fs::write(&path, "{ not json").unwrap();
        let bus = MessageBus::new(path, 5, 10);
        let err = bus.get_pending("director").await.unwrap_err();
        assert!(matches!(err, AgentError::CorruptState(_)));
    }
}
