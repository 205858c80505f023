//! Inactivity-driven forced logout.
//!
//! The monitor is a pure state machine: it never owns a timer. Each
//! transition returns the timer action the caller must perform, and the
//! caller feeds elapsed timers back in.

use std::time::Duration;

use crate::scheduling::activity_signal::ActivitySignal;
use crate::shared::config::EngineConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Seconds left before forced logout.
    Warning(u32),
    Expired,
}

/// Timer work requested by a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionAction {
    /// Cancel the countdown, then (re)arm the inactivity timer.
    ArmInactivity(Duration),
    /// Cancel the inactivity timer and start ticking the countdown.
    StartCountdown { remaining: u32, tick: Duration },
    /// The countdown moved; nothing to re-arm.
    CountdownChanged(u32),
    /// Cancel every timer and end the session.
    Logout,
}

pub struct SessionMonitor {
    state: SessionState,
    grace: Duration,
    warning_secs: u32,
    tick: Duration,
}

impl SessionMonitor {
    /// `grace` is the silence before the warning starts; the warning then
    /// counts down `warning_secs` ticks of `tick` each.
    pub fn new(grace: Duration, warning_secs: u32, tick: Duration) -> Self {
        Self {
            state: SessionState::Active,
            grace,
            warning_secs,
            tick,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.inactivity_grace(),
            config.session_warning_secs,
            config.countdown_tick(),
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn start(&mut self) -> SessionAction {
        self.state = SessionState::Active;
        SessionAction::ArmInactivity(self.grace)
    }

    /// Any activity before expiry resets the whole machine.
    pub fn on_activity(&mut self, signal: ActivitySignal) -> Option<SessionAction> {
        if self.state == SessionState::Expired {
            return None;
        }
        if let SessionState::Warning(remaining) = self.state {
            log::debug!("Session warning cancelled at {remaining}s by {signal}");
        }
        Some(self.start())
    }

    pub fn on_inactivity_elapsed(&mut self) -> Option<SessionAction> {
        if self.state != SessionState::Active {
            return None;
        }
        if self.warning_secs == 0 {
            return Some(self.expire());
        }
        self.state = SessionState::Warning(self.warning_secs);
        log::info!("No activity; logging out in {}s", self.warning_secs);
        Some(SessionAction::StartCountdown {
            remaining: self.warning_secs,
            tick: self.tick,
        })
    }

    /// Reaching zero expires the session unconditionally.
    pub fn on_countdown_tick(&mut self) -> Option<SessionAction> {
        let SessionState::Warning(remaining) = self.state else {
            return None;
        };
        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            return Some(self.expire());
        }
        self.state = SessionState::Warning(remaining);
        Some(SessionAction::CountdownChanged(remaining))
    }

    fn expire(&mut self) -> SessionAction {
        self.state = SessionState::Expired;
        log::info!("Session expired after inactivity");
        SessionAction::Logout
    }
}
