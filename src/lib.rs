//! Wires the three peer agents to a shared bus, state store, journal and
//! scheduler, per the injected `SystemConfig` (spec.md §9).

pub mod tracing_setup;

use anyhow::Result;
use concord_bus::MessageBus;
use concord_common::config::SystemConfig;
use concord_journal::Journal;
use concord_runtime::{
    Director, Executor, ExecutorSettings, Librarian, LibrarianSettings, NullCalendarClient, PeerAgent, ProcessCodingAssistant,
};
use concord_scheduler::Scheduler;
use concord_store::StateStore;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DIRECTOR_NAME: &str = "director";
pub const LIBRARIAN_NAME: &str = "librarian";
pub const EXECUTOR_NAME: &str = "executor";

/// A stub LLM client used until a real provider is wired in. Kept out of
/// `concord-runtime` since it is an application-level placeholder, not a
/// contract the core needs to know about.
pub struct EchoLlmClient;

#[async_trait::async_trait]
impl concord_runtime::LlmClient for EchoLlmClient {
    async fn complete(
        &self,
        _model: &str,
        _system_prompt: &str,
        messages: &[concord_runtime::ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> concord_common::error::Result<String> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(format!("(no LLM configured) received: {last}"))
    }
}

/// The fully assembled runtime: every long-lived handle the binary needs
/// to keep alive, plus the three agents themselves for direct calls
/// (e.g. a future transport's `director.ask(...)`).
pub struct System {
    pub store: Arc<StateStore>,
    pub bus: Arc<MessageBus>,
    pub journal: Arc<Journal>,
    pub scheduler: Arc<Scheduler>,
    pub director: Arc<Director>,
    pub librarian: Arc<Librarian>,
    pub executor: Arc<Executor>,
    stop: Arc<AtomicBool>,
    handles: Vec<tokio::task::JoinHandle<concord_common::error::Result<()>>>,
}

pub async fn build(config: &SystemConfig) -> Result<System> {
    let store = Arc::new(StateStore::connect(&config.store.database_path).await?);
    let bus = Arc::new(MessageBus::new(&config.bus.bus_path, config.bus.lock_retry_attempts, config.bus.lock_retry_delay_ms));
    let journal = Arc::new(Journal::new(&config.journal.journal_dir));
    let scheduler = Arc::new(Scheduler::new());

    let director = Arc::new(Director::new(
        DIRECTOR_NAME,
        &config.director.model,
        store.clone(),
        bus.clone(),
        journal.clone(),
        Arc::new(EchoLlmClient),
        Arc::new(NullCalendarClient),
        LIBRARIAN_NAME,
        EXECUTOR_NAME,
        Duration::from_secs(config.director.wait_for_response_secs),
    ));

    let librarian = Arc::new(Librarian::new(
        LIBRARIAN_NAME,
        store.clone(),
        bus.clone(),
        journal.clone(),
        DIRECTOR_NAME,
        LibrarianSettings {
            roots: config.librarian.roots.clone(),
            max_depth: config.librarian.max_depth,
            extensions: config.librarian.extensions.clone(),
            skip_dirs: config.librarian.skip_dirs.clone(),
            per_extension_cap: config.librarian.per_extension_cap,
        },
    ));

    let executor = Arc::new(Executor::new(
        EXECUTOR_NAME,
        store.clone(),
        bus.clone(),
        DIRECTOR_NAME,
        Arc::new(ProcessCodingAssistant::new(config.executor.claude_code_binary.to_string_lossy().to_string())),
        ExecutorSettings {
            command_timeout: Duration::from_secs(config.executor.command_timeout_secs),
            stdout_cap: config.executor.stdout_cap,
            stderr_cap: config.executor.stderr_cap,
            history_capacity: config.executor.history_capacity,
        },
    ));

    Ok(System {
        store,
        bus,
        journal,
        scheduler,
        director,
        librarian,
        executor,
        stop: Arc::new(AtomicBool::new(false)),
        handles: Vec::new(),
    })
}

impl System {
    /// Runs the Librarian's one-shot startup exploration, then spawns all
    /// three agents' event loops plus the scheduler's background timer
    /// (spec.md §4.6).
    pub async fn start(&mut self, config: &SystemConfig) -> Result<()> {
        self.librarian.explore().await?;

        let tick_interval = Duration::from_millis(config.scheduler.tick_interval_ms);

        self.handles.push(concord_runtime::spawn(
            self.director.clone() as Arc<dyn PeerAgent>,
            self.bus.clone(),
            self.store.clone(),
            self.stop.clone(),
            tick_interval,
            config.scheduler.tick_interval_ms.max(1) as u32,
        ));
        self.handles.push(concord_runtime::spawn(
            self.librarian.clone() as Arc<dyn PeerAgent>,
            self.bus.clone(),
            self.store.clone(),
            self.stop.clone(),
            tick_interval,
            config.librarian.maintenance_every_ticks,
        ));
        self.handles.push(concord_runtime::spawn(
            self.executor.clone() as Arc<dyn PeerAgent>,
            self.bus.clone(),
            self.store.clone(),
            self.stop.clone(),
            tick_interval,
            config.executor.maintenance_every_ticks,
        ));

        let director_for_checkin = self.director.clone();
        self.scheduler
            .register_daily_checkin(
                "director-daily-checkin",
                "08:00",
                Arc::new(move || {
                    let director = director_for_checkin.clone();
                    Box::pin(async move { director.run_daily_checkin().await.map_err(Into::into) })
                }),
            )
            .await?;
        self.scheduler.run_in_background();

        info!("concord runtime started");
        Ok(())
    }

    /// Signals all agent loops to stop, joins them, then stops the
    /// scheduler (spec.md §5 cancellation policy: in-flight work finishes).
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        self.scheduler.stop().await;
        info!("concord runtime stopped");
        Ok(())
    }
}
