/// A frame that passed the throttle.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based count of drawn frames.
    pub index: u64,
    /// Timestamp of the callback that produced this frame (ms).
    pub timestamp_ms: f64,
}

/// Drops animation callbacks that arrive sooner than the target interval.
///
/// Callbacks may fire at display rate; only those more than `interval_ms`
/// after the last drawn frame produce a [`Frame`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameThrottle {
    interval_ms: f64,
    last_ms: Option<f64>,
    drawn: u64,
}

impl FrameThrottle {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            last_ms: None,
            drawn: 0,
        }
    }

    pub fn from_rate(frames_per_second: f64) -> Self {
        Self::new(1000.0 / frames_per_second)
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn frames_drawn(&self) -> u64 {
        self.drawn
    }

    pub fn tick(&mut self, timestamp_ms: f64) -> Option<Frame> {
        if let Some(last) = self.last_ms
            && timestamp_ms - last <= self.interval_ms
        {
            return None;
        }
        let frame = Frame {
            index: self.drawn,
            timestamp_ms,
        };
        self.last_ms = Some(timestamp_ms);
        self.drawn += 1;
        Some(frame)
    }
}
