//! Fixed-rate scheduling for the node's loops.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

/// Lowest rate any loop runs at.
pub const MIN_HZ: f64 = 0.1;

/// Tick period for `hz`, floored at [`MIN_HZ`].
pub fn period_from_hz(hz: f64) -> Duration {
    let hz = if hz.is_finite() { hz.max(MIN_HZ) } else { MIN_HZ };
    Duration::from_secs_f64(1.0 / hz)
}

/// A periodic sleeper that wakes early on shutdown.
///
/// Late ticks are skipped rather than bunched up, so a slow iteration never
/// causes a burst of catch-up iterations.
pub struct Ticker {
    interval: Interval,
    shutdown: watch::Receiver<bool>,
}

impl Ticker {
    pub fn new(hz: f64, shutdown: watch::Receiver<bool>) -> Self {
        let mut interval = tokio::time::interval(period_from_hz(hz));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, shutdown }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Wait for the next tick. Returns `false` once shutdown is signalled or
    /// the shutdown sender is gone.
    pub async fn tick(&mut self) -> bool {
        loop {
            if *self.shutdown.borrow() {
                return false;
            }
            tokio::select! {
                _ = self.interval.tick() => return !*self.shutdown.borrow(),
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}
