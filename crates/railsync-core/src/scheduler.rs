//! Poll cadence control.
//!
//! [`PollScheduler`] owns the poll timer. It is either idle or running at
//! the interval of a [`PollMode`]. Changing the mode re-arms the timer so the
//! next tick lands one new interval from now; it never fires an extra tick
//! immediately, and it has no effect on the health-check cadence.
//!
//! Ticks that would have fired while a poll cycle was still running are
//! skipped, not queued, so cycles never overlap or burst.
//!
//! The [`PollGate`] is the scheduler's running flag, shared with
//! [`SyncHandle`](crate::engine::SyncHandle) so that a stop request is
//! visible to a poll cycle that is already in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use railsync_types::PollMode;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::info;

/// Shared flag saying whether poll results may still be applied.
#[derive(Debug, Clone, Default)]
pub struct PollGate(Arc<AtomicBool>);

impl PollGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow poll results to be applied.
    pub fn open(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Refuse poll results from now on, including in-flight ones.
    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Whether poll results may be applied.
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Scheduler state machine: `Idle --start--> Running --stop--> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No poll ticks fire.
    Idle,
    /// Ticks fire at the mode's interval.
    Running {
        /// Active cadence.
        mode: PollMode,
    },
}

/// Drives poll cycles at a configurable cadence.
#[derive(Debug)]
pub struct PollScheduler {
    mode: PollMode,
    timer: Option<Interval>,
    gate: PollGate,
}

impl PollScheduler {
    /// Create an idle scheduler that will use `mode` when started.
    pub fn new(mode: PollMode) -> Self {
        Self {
            mode,
            timer: None,
            gate: PollGate::new(),
        }
    }

    /// Start ticking at `mode`. The first tick fires one interval from now.
    ///
    /// Starting a running scheduler re-arms it at the new mode.
    pub fn start(&mut self, mode: PollMode) {
        self.mode = mode;
        self.timer = Some(timer_for(mode.interval()));
        self.gate.open();
        info!(mode = %mode, interval_ms = mode.interval_ms(), "Polling started");
    }

    /// Stop ticking. No further tick fires and in-flight results are refused.
    pub fn stop(&mut self) {
        self.gate.close();
        if self.timer.take().is_some() {
            info!("Polling stopped");
        }
    }

    /// Change the cadence. Takes effect from the next tick.
    ///
    /// Returns the previous mode. While idle, only the mode used by the
    /// next [`start`](Self::start) changes.
    pub fn set_mode(&mut self, mode: PollMode) -> PollMode {
        let previous = self.mode;
        self.mode = mode;
        if let Some(timer) = self.timer.as_mut() {
            *timer = timer_for(mode.interval());
        }
        info!(
            mode = %mode,
            previous = %previous,
            interval_ms = mode.interval_ms(),
            "Poll mode changed"
        );
        previous
    }

    /// Current or next cadence.
    pub const fn mode(&self) -> PollMode {
        self.mode
    }

    /// Current state.
    pub const fn state(&self) -> SchedulerState {
        match self.timer {
            Some(_) => SchedulerState::Running { mode: self.mode },
            None => SchedulerState::Idle,
        }
    }

    /// Whether ticks are firing.
    pub const fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// A handle to the running flag.
    pub fn gate(&self) -> PollGate {
        self.gate.clone()
    }

    /// Wait for the next tick. Never completes while idle.
    ///
    /// Cancel safe: dropping the future does not consume a tick.
    pub async fn next_tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Build an interval whose first tick is one period away.
pub(crate) fn timer_for(period: Duration) -> Interval {
    let now = Instant::now();
    let first = now.checked_add(period).unwrap_or(now);
    let mut timer = tokio::time::interval_at(first, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Whether the scheduler ticks within `window`.
    async fn ticks_within(scheduler: &mut PollScheduler, window: Duration) -> bool {
        tokio::time::timeout(window, scheduler.next_tick()).await.is_ok()
    }

    #[tokio::test(start_paused = true)]
    async fn idle_scheduler_never_ticks() {
        let mut scheduler = PollScheduler::new(PollMode::Rocket);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(!ticks_within(&mut scheduler, Duration::from_secs(60)).await);
        assert!(!scheduler.gate().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn running_scheduler_ticks_at_mode_interval() {
        let mut scheduler = PollScheduler::new(PollMode::Normal);
        scheduler.start(PollMode::Supercar);
        assert_eq!(
            scheduler.state(),
            SchedulerState::Running {
                mode: PollMode::Supercar
            }
        );

        let started = Instant::now();
        scheduler.next_tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(50));
        scheduler.next_tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn mode_change_does_not_fire_an_immediate_tick() {
        let mut scheduler = PollScheduler::new(PollMode::Normal);
        scheduler.start(PollMode::Normal);
        tokio::time::advance(Duration::from_millis(150)).await;

        let previous = scheduler.set_mode(PollMode::Rocket);
        assert_eq!(previous, PollMode::Normal);

        let changed_at = Instant::now();
        assert!(!ticks_within(&mut scheduler, Duration::from_millis(5)).await);
        scheduler.next_tick().await;
        assert_eq!(changed_at.elapsed(), Duration::from_millis(10));
        scheduler.next_tick().await;
        assert_eq!(changed_at.elapsed(), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_closes_gate_and_silences_timer() {
        let mut scheduler = PollScheduler::new(PollMode::Rocket);
        scheduler.start(PollMode::Rocket);
        let gate = scheduler.gate();
        assert!(gate.is_open());

        scheduler.stop();
        assert!(!gate.is_open());
        assert!(!scheduler.is_running());
        assert!(!ticks_within(&mut scheduler, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn mode_set_while_idle_applies_on_start() {
        let mut scheduler = PollScheduler::new(PollMode::Normal);
        scheduler.set_mode(PollMode::Teleportation);
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.mode(), PollMode::Teleportation);
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_cycle_skips_missed_ticks() {
        let mut scheduler = PollScheduler::new(PollMode::Rocket);
        scheduler.start(PollMode::Rocket);
        scheduler.next_tick().await;

        // A cycle that takes 35ms overlaps three scheduled ticks.
        tokio::time::advance(Duration::from_millis(35)).await;
        let resumed = Instant::now();
        scheduler.next_tick().await;
        scheduler.next_tick().await;
        // One late tick fires at once, then the grid resumes at 50ms.
        assert_eq!(resumed.elapsed(), Duration::from_millis(5));
    }
}
