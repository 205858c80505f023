//! Cancellable timers for `crossbeam_channel::select!` loops.
//!
//! Both timers expose a receiver that the owning loop selects on. Cancelling
//! swaps in a channel that never fires, so a loop that re-reads the receiver
//! every iteration can never observe a tick from a cancelled timer.

use std::time::{Duration, Instant};

use crossbeam_channel::{after, never, tick, Receiver};

/// Fires every `interval` until cancelled.
pub struct RepeatingTask {
    ticks: Receiver<Instant>,
    interval: Option<Duration>,
}

impl RepeatingTask {
    pub fn idle() -> Self {
        Self {
            ticks: never(),
            interval: None,
        }
    }

    /// (Re)starts the task. The first tick arrives one interval from now.
    pub fn start(&mut self, interval: Duration) {
        self.ticks = tick(interval);
        self.interval = Some(interval);
    }

    /// Stops the task. Calling it again is a no-op.
    pub fn cancel(&mut self) {
        if self.interval.take().is_some() {
            self.ticks = never();
        }
    }

    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn receiver(&self) -> &Receiver<Instant> {
        &self.ticks
    }
}

impl Default for RepeatingTask {
    fn default() -> Self {
        Self::idle()
    }
}

/// Fires once after a delay unless cancelled or re-armed first.
pub struct OneShotTimer {
    fires: Receiver<Instant>,
    armed: bool,
}

impl OneShotTimer {
    pub fn idle() -> Self {
        Self {
            fires: never(),
            armed: false,
        }
    }

    /// Arms the timer, replacing any pending deadline.
    pub fn arm(&mut self, delay: Duration) {
        self.fires = after(delay);
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        if self.armed {
            self.fires = never();
            self.armed = false;
        }
    }

    /// Marks the timer as spent after its receiver delivered.
    pub fn fired(&mut self) {
        self.cancel();
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn receiver(&self) -> &Receiver<Instant> {
        &self.fires
    }
}

impl Default for OneShotTimer {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(10);
    const WAIT: Duration = Duration::from_millis(60);

    #[test]
    fn test_idle_task_never_fires() {
        let task = RepeatingTask::idle();
        assert!(!task.is_active());
        assert!(task.receiver().recv_timeout(WAIT).is_err());
    }

    #[test]
    fn test_started_task_ticks_repeatedly() {
        let mut task = RepeatingTask::idle();
        task.start(SHORT);

        assert!(task.receiver().recv_timeout(WAIT).is_ok());
        assert!(task.receiver().recv_timeout(WAIT).is_ok());
        assert_eq!(task.interval(), Some(SHORT));
    }

    #[test]
    fn test_cancelled_task_stops_and_cancel_is_idempotent() {
        let mut task = RepeatingTask::idle();
        task.start(SHORT);
        task.cancel();
        task.cancel();

        assert!(!task.is_active());
        assert!(task.receiver().recv_timeout(WAIT).is_err());
    }

    #[test]
    fn test_one_shot_fires_once() {
        let mut timer = OneShotTimer::idle();
        timer.arm(SHORT);

        assert!(timer.receiver().recv_timeout(WAIT).is_ok());
        timer.fired();
        assert!(!timer.is_armed());
        assert!(timer.receiver().recv_timeout(WAIT).is_err());
    }

    #[test]
    fn test_cancelled_one_shot_never_fires() {
        let mut timer = OneShotTimer::idle();
        timer.arm(SHORT);
        timer.cancel();
        timer.cancel();

        assert!(timer.receiver().recv_timeout(WAIT).is_err());
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let mut timer = OneShotTimer::idle();
        timer.arm(Duration::from_secs(60));
        timer.arm(SHORT);
        assert!(timer.receiver().recv_timeout(WAIT).is_ok());
    }
}
