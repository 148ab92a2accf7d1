//! Tick sources
//!
//! A tick source calls back at a fixed period while started. The engine
//! never trusts tick counts for timing; ticks only prompt it to recompute
//! remaining time from the wall clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Callback invoked on every tick
pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

/// Repeating, cancellable timer
pub trait TickSource: Send {
    /// Begin calling `on_tick` every period. Restarting replaces the
    /// previous callback.
    fn start(&mut self, on_tick: TickCallback);

    /// Stop ticking. Idempotent; once this returns the callback never runs
    /// again.
    fn cancel(&mut self);

    fn is_active(&self) -> bool;
}

type CallbackSlot = Arc<Mutex<Option<TickCallback>>>;

/// Tick source backed by a tokio interval.
///
/// Missed ticks are skipped rather than bunched, and the callback runs with
/// its slot locked so `cancel` waits out an in-flight call. The callback
/// must not call back into this ticker.
pub struct IntervalTicker {
    period: Duration,
    slot: Option<CallbackSlot>,
    task: Option<JoinHandle<()>>,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            slot: None,
            task: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl TickSource for IntervalTicker {
    fn start(&mut self, on_tick: TickCallback) {
        self.cancel();

        let slot: CallbackSlot = Arc::new(Mutex::new(Some(on_tick)));
        let task_slot = slot.clone();
        let period = self.period;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let guard = task_slot.lock().unwrap_or_else(|p| p.into_inner());
                match guard.as_ref() {
                    Some(callback) => callback(),
                    None => break,
                }
            }
        });

        debug!(period_ms = period.as_millis() as u64, "Ticker started");
        self.slot = Some(slot);
        self.task = Some(task);
    }

    fn cancel(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.lock().unwrap_or_else(|p| p.into_inner()).take();
            debug!("Ticker cancelled");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.slot.is_some()
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Default)]
struct ManualState {
    callback: Option<TickCallback>,
    starts: usize,
    cancels: usize,
}

/// Tick source driven by hand, for tests.
///
/// Clones share state, so a test can keep one clone while the engine owns
/// another.
#[derive(Clone, Default)]
pub struct ManualTicker {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke the callback once. Returns false when not started.
    pub fn fire(&self) -> bool {
        let callback = self.lock().callback.clone();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn starts(&self) -> usize {
        self.lock().starts
    }

    pub fn cancels(&self) -> usize {
        self.lock().cancels
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl TickSource for ManualTicker {
    fn start(&mut self, on_tick: TickCallback) {
        let mut state = self.lock();
        state.callback = Some(on_tick);
        state.starts += 1;
    }

    fn cancel(&mut self) {
        let mut state = self.lock();
        if state.callback.take().is_some() {
            state.cancels += 1;
        }
    }

    fn is_active(&self) -> bool {
        self.lock().callback.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, TickCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_fires_each_period() {
        let (count, callback) = counter();
        let mut ticker = IntervalTicker::new(Duration::from_secs(1));
        ticker.start(callback);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        ticker.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_never_fires_after_cancel() {
        let (count, callback) = counter();
        let mut ticker = IntervalTicker::new(Duration::from_secs(1));
        ticker.start(callback);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        ticker.cancel();
        ticker.cancel();
        assert!(!ticker.is_active());

        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_callback() {
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();
        let mut ticker = IntervalTicker::new(Duration::from_secs(1));

        ticker.start(first_cb);
        ticker.start(second_cb);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_manual_ticker_counts_and_fires() {
        let (count, callback) = counter();
        let mut ticker = ManualTicker::new();
        let handle = ticker.clone();

        assert!(!handle.fire());
        ticker.start(callback);
        assert!(handle.fire());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        ticker.cancel();
        ticker.cancel();
        assert_eq!(handle.starts(), 1);
        assert_eq!(handle.cancels(), 1);
        assert!(!handle.fire());
    }
}
