//! Push scheduling with debounce.
//!
//! Provides:
//! - `Clock` - source of "now", swappable for tests
//! - `Debouncer` - single-slot delayed trigger

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }
}

/// Delayed trigger holding at most one deadline.
///
/// Every `arm` replaces the deadline with `now + delay`, so a burst of arms
/// fires once, `delay` after the last one. Nothing is queued.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm (or re-arm) the trigger relative to `now`
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Returns true and disarms if the deadline has passed
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if now >= at => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Disarm without firing; returns whether anything was pending
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before the trigger is due; zero if overdue, `None` if idle
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|at| at.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_delay() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(Duration::from_millis(600));

        debouncer.arm(clock.now());
        assert!(debouncer.is_armed());
        clock.advance(Duration::from_millis(599));
        assert!(!debouncer.fire_if_due(clock.now()));

        clock.advance(Duration::from_millis(1));
        assert!(debouncer.fire_if_due(clock.now()));
        assert!(!debouncer.is_armed());
        assert!(!debouncer.fire_if_due(clock.now()));
    }

    #[test]
    fn rearm_pushes_deadline_back() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(Duration::from_millis(600));

        debouncer.arm(clock.now());
        clock.advance(Duration::from_millis(400));
        debouncer.arm(clock.now());
        clock.advance(Duration::from_millis(400));

        assert!(!debouncer.fire_if_due(clock.now()));
        assert_eq!(debouncer.time_until_due(clock.now()), Some(Duration::from_millis(200)));
        clock.advance(Duration::from_millis(200));
        assert!(debouncer.fire_if_due(clock.now()));
    }

    #[test]
    fn cancel_disarms() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::new(Duration::from_millis(10));

        assert!(!debouncer.cancel());
        debouncer.arm(clock.now());
        assert!(debouncer.cancel());
        clock.advance(Duration::from_secs(1));
        assert!(!debouncer.fire_if_due(clock.now()));
        assert_eq!(debouncer.time_until_due(clock.now()), None);
    }
}
