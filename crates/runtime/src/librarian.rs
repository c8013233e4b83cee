//! Librarian: filesystem exploration, code indexing, and search
//! (spec.md §4.6).

use crate::event_loop::PeerAgent;
use async_trait::async_trait;
use concord_bus::MessageBus;
use concord_common::error::Result;
use concord_common::types::{message_types, AgentRunState, Message};
use concord_journal::Journal;
use concord_store::StateStore;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

pub struct LibrarianSettings {
    pub roots: Vec<PathBuf>,
    pub max_depth: usize,
    pub extensions: Vec<String>,
    pub skip_dirs: Vec<String>,
    pub per_extension_cap: usize,
}

pub struct Librarian {
    name: String,
    store: Arc<StateStore>,
    bus: Arc<MessageBus>,
    journal: Arc<Journal>,
    director: String,
    settings: LibrarianSettings,
    explored: AtomicUsize,
}

impl Librarian {
    pub fn new(
        name: impl Into<String>,
        store: Arc<StateStore>,
        bus: Arc<MessageBus>,
        journal: Arc<Journal>,
        director: impl Into<String>,
        settings: LibrarianSettings,
    ) -> Self {
        Self { name: name.into(), store, bus, journal, director: director.into(), settings, explored: AtomicUsize::new(0) }
    }

    /// Walks the configured roots up to `max_depth`, indexing every file
    /// whose extension is in the allowlist, then builds the routing system
    /// over what was indexed (spec.md §4.5/§4.6 startup choreography).
    pub async fn explore(&self) -> Result<()> {
        self.store.update_agent_status(&self.name, AgentRunState::Exploring, Some("walking configured roots")).await?;

        let mut per_extension: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for root in &self.settings.roots {
            self.walk(root, 0, &mut per_extension).await;
        }

        self.store.update_agent_status(&self.name, AgentRunState::Routing, Some("building routing system")).await?;
        let route_count = concord_router::build_routing_system(&self.store).await?;

        let indexed = self.explored.load(Ordering::Relaxed);
        self.bus
            .share_discovery(
                &self.name,
                &self.director,
                "exploration_complete",
                &format!("indexed {indexed} files, extracted {route_count} routes"),
                json!({ "files_indexed": indexed, "routes_extracted": route_count }),
            )
            .await?;

        self.store.update_agent_status(&self.name, AgentRunState::Running, None).await?;
        Ok(())
    }

    fn walk<'a>(
        &'a self,
        dir: &'a Path,
        depth: usize,
        per_extension: &'a mut std::collections::HashMap<String, usize>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'a>> {
        Box::pin(async move {
            if depth > self.settings.max_depth {
                return;
            }
            let Ok(mut entries) = fs::read_dir(dir).await else { return };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let file_name = entry.file_name().to_string_lossy().to_string();

                if path.is_dir() {
                    if self.settings.skip_dirs.iter().any(|skip| skip == &file_name) {
                        continue;
                    }
                    self.walk(&path, depth + 1, per_extension).await;
                    continue;
                }

                let Some(extension) = path.extension().and_then(|e| e.to_str()) else { continue };
                if !self.settings.extensions.iter().any(|e| e == extension) {
                    continue;
                }
                let count = per_extension.entry(extension.to_string()).or_insert(0);
                if *count >= self.settings.per_extension_cap {
                    continue;
                }
                *count += 1;

                if let Err(e) = self.index_one(&path, extension).await {
                    warn!(path = %path.display(), error = %e, "failed to index file");
                    continue;
                }
                self.explored.fetch_add(1, Ordering::Relaxed);
            }
        })
    }

    async fn index_one(&self, path: &Path, extension: &str) -> Result<()> {
        let metadata = fs::metadata(path).await?;
        let modified_at = metadata
            .modified()
            .ok()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            .unwrap_or_else(concord_common::types::now_iso);

        let mut tags = BTreeSet::new();
        tags.insert(extension.to_string());
        let path_str = path.to_string_lossy().to_string();

        self.store
            .add_file_to_index(&path_str, extension, metadata.len() as i64, &modified_at, None, &tags)
            .await?;
        Ok(())
    }

    async fn handle_search(&self, message: &Message, body: &Value) -> Result<Value> {
        let query = body.get("query").and_then(Value::as_str).unwrap_or_default();
        let search_type = body.get("search_type").and_then(Value::as_str).unwrap_or("smart");

        match search_type {
            "routes" => {
                let routes = concord_router::search_routes(&self.store, query, None, 25).await?;
                Ok(json!({ "summary": format!("{} matching routes", routes.len()), "routes": routes }))
            }
            "files" => {
                let files = self.store.search_file_index(None, None, Some(&format!("%{query}%")), 25).await?;
                Ok(json!({ "summary": format!("{} matching files", files.len()), "files": files }))
            }
            "journal" => {
                let entries = self.journal.retrieve(&[], query, 10).await?;
                Ok(json!({ "summary": format!("{} matching journal entries", entries.len()), "entries": entries }))
            }
            _ => {
                let routes = concord_router::search_routes(&self.store, query, None, 10).await?;
                let files = self.store.search_file_index(None, None, Some(&format!("%{query}%")), 10).await?;
                let journal_entries = self.journal.retrieve(&[], query, 5).await.unwrap_or_default();
                let _ = message;
                Ok(json!({
                    "summary": format!("{} routes, {} files, {} journal entries", routes.len(), files.len(), journal_entries.len()),
                    "routes": routes,
                    "files": files,
                    "journal_entries": journal_entries,
                }))
            }
        }
    }

    async fn handle_knowledge(&self, body: &Value) -> Result<Value> {
        let question = body.get("question").and_then(Value::as_str).unwrap_or_default();
        let entries = self.journal.retrieve(&[], question, 5).await?;
        let files = self.store.search_file_index(None, None, Some(&format!("%{question}%")), 5).await?;

        let sources: Vec<String> = entries
            .iter()
            .map(|r| r.metadata.filename.clone())
            .chain(files.iter().map(|f| f.path.clone()))
            .collect();

        let answer = if sources.is_empty() {
            "No matching journal entries or files were found.".to_string()
        } else {
            format!("Found {} relevant sources for: {question}", sources.len())
        };

        Ok(json!({ "answer": answer, "sources": sources }))
    }

    async fn handle_status(&self) -> Result<Value> {
        let files = self.store.search_file_index(None, None, None, i64::MAX).await?;
        let discoveries = self.store.get_recent_discoveries(5).await?;
        Ok(json!({
            "exploration_complete": true,
            "files_indexed": files.len(),
            "recent_discoveries": discoveries,
            "roots": self.settings.roots.iter().map(|p| p.to_string_lossy().to_string()).collect::<Vec<_>>(),
        }))
    }
}

#[async_trait]
impl PeerAgent for Librarian {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, message: &Message) -> Result<()> {
        let body: Value = serde_json::from_str(&message.body).unwrap_or(Value::Null);

        let result = match message.msg_type.as_str() {
            message_types::SEARCH_REQUEST => Some((message_types::SEARCH_RESULT, self.handle_search(message, &body).await?)),
            message_types::INDEX_REQUEST => {
                let path_str = body.get("path").and_then(Value::as_str).unwrap_or_default();
                let extension = Path::new(path_str).extension().and_then(|e| e.to_str()).unwrap_or_default();
                let payload = match concord_router::index_file(&self.store, Path::new(path_str), extension).await {
                    Ok(count) => json!({ "success": true, "path": path_str, "routes_indexed": count }),
                    Err(e) => json!({ "success": false, "path": path_str, "error": e.to_string() }),
                };
                Some((message_types::INDEX_COMPLETE, payload))
            }
            message_types::KNOWLEDGE_REQUEST => Some((message_types::KNOWLEDGE_RESULT, self.handle_knowledge(&body).await?)),
            message_types::STATUS_REQUEST => Some((message_types::STATUS_RESPONSE, self.handle_status().await?)),
            other => {
                info!(agent = %self.name, msg_type = %other, "unrecognised message type acknowledged");
                None
            }
        };

        if let Some((result_type, payload)) = result {
            self.bus.send_result(&self.name, &message.from, result_type, &message.id, payload).await?;
        }
        Ok(())
    }

    async fn maintenance(&self) -> Result<()> {
        Ok(())
    }
}
