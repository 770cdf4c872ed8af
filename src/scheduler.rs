//! Tick scheduling
//!
//! A running session pulls ticks from a [`TickScheduler`]. Production code uses
//! [`IntervalScheduler`]; tests drive ticks by hand through [`ManualClock`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Source of tick events for one streaming session
#[async_trait]
pub trait TickScheduler: Send {
    /// Wait for the next tick. Returns `false` once the schedule is exhausted.
    async fn next_tick(&mut self) -> bool;
}

/// Creates a fresh schedule each time a session goes live
pub trait SchedulerFactory: Send + Sync {
    fn create(&self, period: Duration) -> Box<dyn TickScheduler>;
}

/// Fixed-rate schedule on the tokio timer.
///
/// The first tick fires one period after creation. Ticks missed while the
/// runtime was busy are skipped rather than delivered in a burst.
pub struct IntervalScheduler {
    interval: Interval,
}

impl IntervalScheduler {
    /// Must be called from within a tokio runtime.
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

#[async_trait]
impl TickScheduler for IntervalScheduler {
    async fn next_tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Factory for [`IntervalScheduler`]
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalSchedulerFactory;

impl SchedulerFactory for IntervalSchedulerFactory {
    fn create(&self, period: Duration) -> Box<dyn TickScheduler> {
        Box::new(IntervalScheduler::new(period))
    }
}

/// Hand-cranked scheduler factory for deterministic tests.
///
/// Every `create` replaces the previous schedule; [`ManualClock::tick`] feeds
/// the most recent one.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<()>>>>,
    created: Arc<AtomicUsize>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one tick. Returns `false` if no live schedule is listening.
    pub fn tick(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }

    /// End the current schedule
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Number of schedules handed out so far
    pub fn schedules_created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }
}

impl SchedulerFactory for ManualClock {
    fn create(&self, _period: Duration) -> Box<dyn TickScheduler> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        self.created.fetch_add(1, Ordering::AcqRel);
        Box::new(ManualScheduler { rx })
    }
}

struct ManualScheduler {
    rx: mpsc::UnboundedReceiver<()>,
}

#[async_trait]
impl TickScheduler for ManualScheduler {
    async fn next_tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}
