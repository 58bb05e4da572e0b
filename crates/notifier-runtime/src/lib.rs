//! Shared concurrency primitives threaded through ingress, egress, and the
//! supervisor: the stop-broadcast, the ingress wait-group, the
//! process-wide (really: per-[`RuntimeContext`]) active-worker counter, and
//! the bounded message channel they all feed.
//!
//! None of these types carry business logic; they exist so that
//! notifier-ingress, notifier-egress, and notifier-core can all observe
//! the same lifecycle signals without a dependency cycle between them.

use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use notifier_config::Config;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::sync::broadcast;
use tokio::sync::mpsc;

/// The shutdown broadcast. Closing it is the sole cancellation primitive
/// for ingress drivers; it is never closed twice (reload always builds a
/// fresh one on the new [`RuntimeContext`]).
#[derive(Clone)]
pub struct StopSignal {
    tx: broadcast::Sender<()>,
    stopping: Arc<std::sync::atomic::AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1);
        Self {
            tx,
            stopping: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Idempotent: the second and later call is a no-op, matching the
    /// Go source's `if !stopped { close(StopChan) }` guard.
    pub fn trigger(&self) {
        if self
            .stopping
            .compare_exchange(
                false,
                true,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            let _ = self.tx.send(());
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts live ingress drivers. The supervisor's shutdown barrier waits
/// for this to reach zero before it waits on [`ActiveWorkers`].
#[derive(Clone)]
pub struct WaitGroup {
    count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

pub struct WaitGroupGuard {
    count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Registers one live driver. Dropping the returned guard (normal
    /// return or panic-unwind) deregisters it and wakes any waiter.
    pub fn add(&self) -> WaitGroupGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        WaitGroupGuard {
            count: Arc::clone(&self.count),
            idle: Arc::clone(&self.idle),
        }
    }

    pub async fn wait(&self) {
        loop {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            self.idle.notified().await;
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaitGroupGuard {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// In-flight output invocation counter (`ActiveWorkers` in the source).
/// Used both as the supervisor's admission gate and as the shutdown
/// drain barrier.
#[derive(Clone)]
pub struct ActiveWorkers(Arc<AtomicI64>);

pub struct WorkerGuard(Arc<AtomicI64>);

impl ActiveWorkers {
    pub fn new() -> Self {
        Self(Arc::new(AtomicI64::new(0)))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Increments on creation; the returned guard decrements on drop so a
    /// panicking output task still releases its slot.
    pub fn enter(&self) -> WorkerGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        WorkerGuard(Arc::clone(&self.0))
    }
}

impl Default for ActiveWorkers {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a reload needs to replace wholesale: config, channel,
/// stop-broadcast, ingress wait-group, and effective default timeouts.
/// The active-workers counter deliberately lives outside this struct
/// (see [`RuntimeContext::active_workers`] doc) since it must keep
/// counting across a reload rather than reset to zero.
pub struct RuntimeContext {
    pub config: Config,
    pub tx: mpsc::Sender<String>,
    pub rx: Mutex<mpsc::Receiver<String>>,
    pub stop: StopSignal,
    pub ingress_wg: WaitGroup,
    pub active_workers: ActiveWorkers,
    pub input_timeout: Duration,
    pub output_timeout: Duration,
    pub exec_timeout: Duration,
}

impl RuntimeContext {
    /// Builds a fresh context from an already-loaded config. `active_workers`
    /// is shared from the previous context (or created fresh at startup) so
    /// outputs still draining on the old context are counted toward the
    /// same shutdown barrier as outputs dispatched on the new one.
    pub fn new(config: Config, active_workers: ActiveWorkers) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size);
        let input_timeout = Duration::from_millis(config.input_timeout);
        let output_timeout = Duration::from_millis(config.output_timeout);
        let exec_timeout = Duration::from_millis(config.exec_timeout);
        Self {
            config,
            tx,
            rx: Mutex::new(rx),
            stop: StopSignal::new(),
            ingress_wg: WaitGroup::new(),
            active_workers,
            input_timeout,
            output_timeout,
            exec_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stop_signal_trigger_is_idempotent() {
        let stop = StopSignal::new();
        assert!(!stop.is_stopping());
        stop.trigger();
        assert!(stop.is_stopping());
        stop.trigger();
        assert!(stop.is_stopping());
    }

    #[tokio::test]
    async fn wait_group_waits_for_zero() {
        let wg = WaitGroup::new();
        let guard = wg.add();
        let wg2 = wg.clone();
        let handle = tokio::spawn(async move { wg2.wait().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(guard);
        handle.await.unwrap();
    }

    #[test]
    fn active_workers_guard_decrements_on_drop() {
        let workers = ActiveWorkers::new();
        assert_eq!(workers.get(), 0);
        {
            let _g1 = workers.enter();
            let _g2 = workers.enter();
            assert_eq!(workers.get(), 2);
        }
        assert_eq!(workers.get(), 0);
    }
}
