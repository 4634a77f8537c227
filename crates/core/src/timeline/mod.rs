use std::time::{Duration, Instant};

use crate::config::TimingConfig;

/// Countdown notices emitted while a scene approaches its end color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    /// The color will finish changing in this many seconds.
    ChangingIn(u32),
    /// The color has finished changing.
    Changed,
}

impl std::fmt::Display for Announcement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChangingIn(secs) => write!(f, "color changing in {secs} seconds"),
            Self::Changed => write!(f, "color changed"),
        }
    }
}

/// Derives countdown notices from a scene's local clock, reporting each
/// distinct value once per activation.
#[derive(Debug, Clone)]
pub struct AnnouncementTracker {
    transition_end: f64,
    warning_secs: i32,
    last_remaining: Option<i32>,
}

impl Default for AnnouncementTracker {
    fn default() -> Self {
        Self::new(&TimingConfig::default())
    }
}

impl AnnouncementTracker {
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            transition_end: timing.transition_end_secs(),
            warning_secs: i32::try_from(timing.warning_secs).unwrap_or(i32::MAX),
            last_remaining: None,
        }
    }

    /// Forgets what was reported; called on every scene switch.
    pub fn reset(&mut self) {
        self.last_remaining = None;
    }

    pub fn last_remaining(&self) -> Option<i32> {
        self.last_remaining
    }

    /// Whole seconds left until the end color, rounded up.
    pub fn remaining(&self, t_local: f64) -> i32 {
        let remaining = (self.transition_end - t_local).ceil();
        if remaining.is_nan() {
            return 0;
        }
        remaining.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    }

    pub fn observe(&mut self, t_local: f64) -> Option<Announcement> {
        let remaining = self.remaining(t_local);
        if remaining > 0 {
            if remaining <= self.warning_secs && self.last_remaining != Some(remaining) {
                self.last_remaining = Some(remaining);
                return Some(Announcement::ChangingIn(remaining as u32));
            }
            return None;
        }
        if self.last_remaining != Some(0) {
            self.last_remaining = Some(0);
            return Some(Announcement::Changed);
        }
        None
    }
}

/// Paces the control loop at a fixed period.
///
/// Deadlines advance by exactly one period so the cadence does not drift. A
/// tick that overruns resynchronises to "now" instead of bursting frames to
/// catch up.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    period: Duration,
    next_deadline: Instant,
    overruns: u64,
}

impl TickScheduler {
    pub fn new(period: Duration) -> Self {
        Self::starting_at(period, Instant::now())
    }

    pub fn starting_at(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next_deadline: start + period,
            overruns: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Seconds per tick, as fed to the scene clocks.
    pub fn period_secs(&self) -> f64 {
        self.period.as_secs_f64()
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// How long to sleep at `now`, advancing the deadline. `None` means the
    /// tick ran late.
    pub fn advance(&mut self, now: Instant) -> Option<Duration> {
        if now >= self.next_deadline {
            self.overruns += 1;
            tracing::trace!(overruns = self.overruns, "control tick overran its period");
            self.next_deadline = now + self.period;
            return None;
        }
        let wait = self.next_deadline - now;
        self.next_deadline += self.period;
        Some(wait)
    }

    /// Blocks until the next tick is due.
    pub fn wait(&mut self) {
        if let Some(wait) = self.advance(Instant::now()) {
            std::thread::sleep(wait);
        }
    }
}
