use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Source of monotonically non-decreasing time in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Wall-clock time measured from construction.
#[derive(Debug, Copy, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Deterministic clock for tests and replays.
///
/// Clones share the same time. With a non-zero auto-advance every read moves
/// time forward, which lets a test simulate work that takes time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Rc<Cell<f64>>,
    auto_advance_ms: f64,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now_ms: Rc::new(Cell::new(start_ms)),
            auto_advance_ms: 0.0,
        }
    }

    pub fn with_auto_advance(start_ms: f64, step_ms: f64) -> Self {
        Self {
            now_ms: Rc::new(Cell::new(start_ms)),
            auto_advance_ms: step_ms,
        }
    }

    pub fn set(&self, now_ms: f64) {
        self.now_ms.set(now_ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        let now = self.now_ms.get();
        self.now_ms.set(now + self.auto_advance_ms);
        now
    }
}

/// Wall-clock budget for one batch of cooperative work.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimeBudget {
    started_ms: f64,
    max_ms: f64,
}

impl TimeBudget {
    pub fn start(clock: &dyn Clock, max_ms: f64) -> Self {
        Self {
            started_ms: clock.now_ms(),
            max_ms,
        }
    }

    /// A budget that never runs out.
    pub fn unlimited() -> Self {
        Self {
            started_ms: 0.0,
            max_ms: f64::INFINITY,
        }
    }

    pub fn max_ms(&self) -> f64 {
        self.max_ms
    }

    pub fn elapsed_ms(&self, clock: &dyn Clock) -> f64 {
        clock.now_ms() - self.started_ms
    }

    /// True once strictly more than `max_ms` has elapsed.
    pub fn is_exhausted(&self, clock: &dyn Clock) -> bool {
        self.elapsed_ms(clock) > self.max_ms
    }
}
