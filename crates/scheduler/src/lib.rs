//! Cooperative timer driver wrapping tokio's platform timers (spec.md §4.4).
//!
//! Single loop task, guarded by one mutex covering both the registration
//! map and the timer set, so callbacks never overlap with `stop()`'s
//! cleanup and never fire after `stop()` has returned.

use chrono::{Local, NaiveTime};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::Instant;
use tracing::{error, info};

pub type Callback = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone)]
pub enum Kind {
    DailyCheckin { hh_mm: String },
    Periodic { interval: Duration },
    OneTime,
}

impl Kind {
    fn label(&self) -> &'static str {
        match self {
            Kind::DailyCheckin { .. } => "daily_checkin",
            Kind::Periodic { .. } => "periodic",
            Kind::OneTime => "one_time",
        }
    }
}

struct Registration {
    kind: Kind,
    callback: Callback,
    next_fire: Instant,
}

#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub name: String,
    pub kind: &'static str,
    pub fires_in: Duration,
}

struct State {
    registrations: HashMap<String, Registration>,
}

struct Inner {
    state: Mutex<State>,
    wake: Notify,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    stopped: AtomicBool,
    loop_exited: Notify,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State { registrations: HashMap::new() }),
                wake: Notify::new(),
                stop_tx,
                stop_rx,
                stopped: AtomicBool::new(false),
                loop_exited: Notify::new(),
            }),
        }
    }

    /// Computes the next absolute wall-clock occurrence of `hh:mm` and
    /// schedules a one-shot; on fire the callback runs and the checkin is
    /// re-scheduled for +24h (spec.md §4.4).
    pub async fn register_daily_checkin(&self, name: &str, hh_mm: &str, callback: Callback) -> anyhow::Result<()> {
        let time = NaiveTime::parse_from_str(hh_mm, "%H:%M")?;
        let next_fire = instant_for_next_occurrence(time);
        self.insert(name, Kind::DailyCheckin { hh_mm: hh_mm.to_string() }, callback, next_fire).await;
        Ok(())
    }

    /// Fixed-delay periodic registration.
    pub async fn register_task(&self, name: &str, callback: Callback, interval_seconds: u64) {
        let interval = Duration::from_secs(interval_seconds);
        let next_fire = Instant::now() + interval;
        self.insert(name, Kind::Periodic { interval }, callback, next_fire).await;
    }

    /// Self-removing on completion.
    pub async fn register_one_time(&self, name: &str, callback: Callback, delay_seconds: u64) {
        let next_fire = Instant::now() + Duration::from_secs(delay_seconds);
        self.insert(name, Kind::OneTime, callback, next_fire).await;
    }

    /// Cancels the pending timer (if any) and drops the registration.
    pub async fn unregister_task(&self, name: &str) {
        let mut state = self.inner.state.lock().await;
        state.registrations.remove(name);
        drop(state);
        self.inner.wake.notify_one();
    }

    async fn insert(&self, name: &str, kind: Kind, callback: Callback, next_fire: Instant) {
        let mut state = self.inner.state.lock().await;
        state.registrations.insert(name.to_string(), Registration { kind, callback, next_fire });
        drop(state);
        self.inner.wake.notify_one();
    }

    pub async fn get_status(&self) -> Vec<TaskStatus> {
        let state = self.inner.state.lock().await;
        let now = Instant::now();
        state
            .registrations
            .iter()
            .map(|(name, reg)| TaskStatus {
                name: name.clone(),
                kind: reg.kind.label(),
                fires_in: reg.next_fire.saturating_duration_since(now),
            })
            .collect()
    }

    /// Blocks until `stop()` is called. Runs callbacks whose timer has
    /// fired; a re-entrant lock (the single `state` mutex) protects the
    /// registration map across every mutation, so `stop()` cleanup never
    /// interleaves with a firing callback.
    pub async fn run(&self) {
        info!("scheduler loop starting");
        let mut stop_rx = self.inner.stop_rx.clone();
        loop {
            if *stop_rx.borrow() {
                break;
            }

            let sleep_until = {
                let state = self.inner.state.lock().await;
                state.registrations.values().map(|r| r.next_fire).min()
            };

            tokio::select! {
                _ = async {
                    match sleep_until {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {}
                _ = self.inner.wake.notified() => continue,
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.fire_due().await;
        }

        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.loop_exited.notify_one();
        info!("scheduler loop stopped");
    }

    pub fn run_in_background(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run().await })
    }

    async fn fire_due(&self) {
        let now = Instant::now();
        let due: Vec<(String, Callback)> = {
            let mut state = self.inner.state.lock().await;
            let mut due = Vec::new();
            let mut to_remove = Vec::new();

            for (name, reg) in state.registrations.iter_mut() {
                if reg.next_fire > now {
                    continue;
                }
                due.push((name.clone(), reg.callback.clone()));
                match reg.kind.clone() {
                    Kind::DailyCheckin { hh_mm } => {
                        let time = NaiveTime::parse_from_str(&hh_mm, "%H:%M").unwrap_or_else(|_| Local::now().time());
                        reg.next_fire = instant_for_next_occurrence(time);
                    }
                    Kind::Periodic { interval } => {
                        reg.next_fire = now + interval;
                    }
                    Kind::OneTime => {
                        to_remove.push(name.clone());
                    }
                }
            }
            for name in to_remove {
                state.registrations.remove(&name);
            }
            due
        };

        for (name, callback) in due {
            if let Err(e) = callback().await {
                error!(task = %name, error = %e, "scheduled task failed");
            }
        }
    }

    /// Stops the driver: cancels every pending timer and waits for `run()`
    /// to actually return before this call returns, so no callback fires
    /// after `stop()` has returned (spec.md §4.4 ordering guarantee).
    pub async fn stop(&self) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.stop_tx.send(true);
        self.inner.wake.notify_waiters();
        self.inner.loop_exited.notified().await;

        let mut state = self.inner.state.lock().await;
        state.registrations.clear();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn instant_for_next_occurrence(time: NaiveTime) -> Instant {
    let now = Local::now();
    let mut candidate = now.date_naive().and_time(time);
    if candidate <= now.naive_local() {
        candidate += chrono::Duration::days(1);
    }
    let delta = candidate - now.naive_local();
    let std_delta = delta.to_std().unwrap_or(Duration::from_secs(0));
    Instant::now() + std_delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::advance;

    fn counting_callback(counter: Arc<AtomicUsize>) -> Callback {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_fires_repeatedly_at_fixed_delay() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.register_task("heartbeat", counting_callback(counter.clone()), 10).await;

        let handle = scheduler.run_in_background();
        advance(Duration::from_secs(25)).await;
        tokio::task::yield_now().await;

        scheduler.stop().await;
        let _ = handle.await;

        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn one_time_task_fires_once_and_removes_itself() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.register_one_time("startup", counting_callback(counter.clone()), 5).await;

        let handle = scheduler.run_in_background();
        advance(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;

        let status = scheduler.get_status().await;
        assert!(status.is_empty());

        scheduler.stop().await;
        let _ = handle.await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregister_drops_a_pending_task() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.register_task("cleanup", counting_callback(counter), 3600).await;
        scheduler.unregister_task("cleanup").await;

        let status = scheduler.get_status().await;
        assert!(status.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_callbacks_from_firing() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.register_task("noisy", counting_callback(counter.clone()), 1).await;

        let handle = scheduler.run_in_background();
        advance(Duration::from_millis(500)).await;
        scheduler.stop().await;
        let _ = handle.await;

        let after_stop = counter.load(Ordering::SeqCst);
        advance(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn daily_checkin_schedules_for_tomorrow_when_time_has_passed() {
        let one_minute_ago = Local::now().time() - chrono::Duration::minutes(1);
        let next = instant_for_next_occurrence(one_minute_ago);
        // A time just shy of now must roll to tomorrow, landing at least
        // ~23h59m out rather than firing immediately.
        assert!(next.saturating_duration_since(Instant::now()) > Duration::from_secs(23 * 3600));
    }
}
