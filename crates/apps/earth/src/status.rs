//! User-facing status line and progress bar.

use streaming::{STATUS_NOT_FOUND, STATUS_TRANSPORT};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Number of glyphs in the progress bar.
pub const PROGRESS_WIDTH: usize = 22;
const COMPLETED: char = '▪';
const REMAINING: char = '▫';

/// Status text plus a progress bar.
///
/// An error sticks: later status messages are ignored until [`StatusReport::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    text: String,
    error: bool,
    progress: Option<String>,
}

impl StatusReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    /// The bar, or `None` while hidden.
    pub fn progress_bar(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    pub fn status(&mut self, msg: impl Into<String>) {
        if !self.error {
            self.text = msg.into();
        }
    }

    pub fn error(&mut self, err: &EngineError) {
        let msg = match err.status() {
            Some(STATUS_TRANSPORT) => "Server Down".to_string(),
            Some(STATUS_NOT_FOUND) => "No Data".to_string(),
            // Load errors with any other status render as "status message".
            _ => err.to_string(),
        };
        warn!(error = %err, "status error");
        self.text = msg;
        self.error = true;
    }

    pub fn reset(&mut self) {
        self.text.clear();
        self.error = false;
    }

    /// Shows `fraction` of the bar filled; values outside `[0, 1)` hide it.
    pub fn progress(&mut self, fraction: f64) {
        if !(0.0..1.0).contains(&fraction) {
            if self.progress.take().is_some() {
                debug!("progress hidden");
            }
            return;
        }
        let done = ((fraction * PROGRESS_WIDTH as f64).ceil() as usize).min(PROGRESS_WIDTH);
        let mut bar = String::with_capacity(PROGRESS_WIDTH * 3);
        bar.extend(std::iter::repeat_n(COMPLETED, done));
        bar.extend(std::iter::repeat_n(REMAINING, PROGRESS_WIDTH - done));
        self.progress = Some(bar);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use streaming::LoadError;

    fn load_error(status: i32) -> EngineError {
        EngineError::Load(LoadError::from_status(status, "weather/current_UV_SFC.json"))
    }

    #[test]
    fn errors_are_sticky_until_reset() {
        let mut report = StatusReport::new();
        report.status("Downloading...");
        assert_eq!(report.text(), "Downloading...");

        report.error(&load_error(404));
        assert_eq!(report.text(), "No Data");
        report.status("Rendering...");
        assert_eq!(report.text(), "No Data");

        report.reset();
        assert!(!report.has_error());
        report.status("Rendering...");
        assert_eq!(report.text(), "Rendering...");
    }

    #[test]
    fn error_messages_by_status() {
        let mut report = StatusReport::new();
        report.error(&load_error(-1));
        assert_eq!(report.text(), "Server Down");
        report.error(&load_error(500));
        assert_eq!(report.text(), "500 weather/current_UV_SFC.json");
        report.error(&EngineError::Fatal("boom".to_string()));
        assert_eq!(report.text(), "boom");
    }

    #[test]
    fn progress_bar_fills_by_ceiling() {
        let mut report = StatusReport::new();
        report.progress(0.0);
        assert_eq!(report.progress_bar(), Some("▫▫▫▫▫▫▫▫▫▫▫▫▫▫▫▫▫▫▫▫▫▫"));
        report.progress(0.5);
        assert_eq!(report.progress_bar(), Some("▪▪▪▪▪▪▪▪▪▪▪▫▫▫▫▫▫▫▫▫▫▫"));
        report.progress(0.01);
        assert_eq!(report.progress_bar().unwrap().chars().filter(|&c| c == COMPLETED).count(), 1);
        report.progress(1.0);
        assert_eq!(report.progress_bar(), None);
        report.progress(-0.5);
        assert_eq!(report.progress_bar(), None);
    }
}
