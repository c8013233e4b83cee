//! The three peer agents — Director, Librarian, Executor — and the
//! event-loop discipline and external collaborator contracts they share
//! (spec.md §4.6).

pub mod collaborators;
pub mod dangerous;
pub mod director;
pub mod event_loop;
pub mod executor;
pub mod librarian;

pub use collaborators::{CalendarClient, ChatMessage, CodingAssistant, LlmClient, NullCalendarClient, ProcessCodingAssistant};
pub use director::Director;
pub use event_loop::PeerAgent;
pub use executor::{Executor, ExecutorSettings};
pub use librarian::{Librarian, LibrarianSettings};

use concord_bus::MessageBus;
use concord_common::error::Result;
use concord_store::StateStore;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawns an agent's event loop as a background task, returning a handle
/// joinable on shutdown (spec.md §4.6 cooperative event-loop contract).
pub fn spawn(
    agent: Arc<dyn PeerAgent>,
    bus: Arc<MessageBus>,
    store: Arc<StateStore>,
    stop: Arc<AtomicBool>,
    tick_interval: Duration,
    maintenance_every: u32,
) -> JoinHandle<Result<()>> {
    tokio::spawn(event_loop::run(agent, bus, store, stop, tick_interval, maintenance_every))
}
