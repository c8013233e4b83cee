//! Event-loop discipline shared by all three peer agents (spec.md §4.6).

use async_trait::async_trait;
use concord_bus::MessageBus;
use concord_common::error::Result;
use concord_common::types::{AgentRunState, Message};
use concord_store::StateStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Implemented by each peer agent. `dispatch` handles one already-pending
/// message; `maintenance` runs at a lower cadence for domain upkeep
/// (exploration refresh, history trimming, idle task pickup, ...).
#[async_trait]
pub trait PeerAgent: Send + Sync {
    fn name(&self) -> &str;
    async fn dispatch(&self, message: &Message) -> Result<()>;
    async fn maintenance(&self) -> Result<()> {
        Ok(())
    }
}

/// Runs `agent`'s loop until `stop` is set. Ticks at `tick_interval`
/// (spec.md: "every ≤1s"); domain maintenance runs every `maintenance_every`
/// ticks. Stopping flips `stop`, checked once per iteration — in-flight
/// work finishes before the loop exits (spec.md §5 cancellation policy).
pub async fn run(
    agent: Arc<dyn PeerAgent>,
    bus: Arc<MessageBus>,
    store: Arc<StateStore>,
    stop: Arc<AtomicBool>,
    tick_interval: Duration,
    maintenance_every: u32,
) -> Result<()> {
    let name = agent.name().to_string();
    store.update_agent_status(&name, AgentRunState::Running, None).await?;

    let mut ticks: u32 = 0;
    while !stop.load(Ordering::Relaxed) {
        store.agent_heartbeat(&name).await?;

        let pending = bus.get_pending(&name).await?;
        for message in pending {
            if let Err(e) = agent.dispatch(&message).await {
                if e.is_fatal_to_loop() {
                    error!(agent = %name, error = %e, "fatal error handling message, aborting loop");
                    store.update_agent_status(&name, AgentRunState::Stopped, None).await.ok();
                    return Err(e);
                }
                warn!(agent = %name, msg_id = %message.id, error = %e, "error dispatching message");
            }
            bus.mark_read(&message.id).await?;
        }

        ticks = ticks.wrapping_add(1);
        if maintenance_every > 0 && ticks % maintenance_every == 0 {
            if let Err(e) = agent.maintenance().await {
                if e.is_fatal_to_loop() {
                    error!(agent = %name, error = %e, "fatal error during maintenance, aborting loop");
                    store.update_agent_status(&name, AgentRunState::Stopped, None).await.ok();
                    return Err(e);
                }
                warn!(agent = %name, error = %e, "maintenance pass failed");
            }
        }

        tokio::time::sleep(tick_interval).await;
    }

    store.update_agent_status(&name, AgentRunState::Stopped, None).await?;
    Ok(())
}
