//! Time source for request stamping and instrumentation.
//!
//! Times are seconds as `f64` since an arbitrary epoch chosen by the clock,
//! the same unit the host world clock reports.

use std::cell::Cell;
use std::time::Instant;

/// A source of "now", in seconds.
pub trait Clock {
    /// Current time in seconds.
    fn now(&self) -> f64;
}

/// Monotonic wall clock; zero at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Starts a new clock at zero.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    /// Creates a clock reading `start` seconds.
    pub fn new(start: f64) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Sets the current time.
    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for std::rc::Rc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}
