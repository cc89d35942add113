//! Performance metrics collection via the `metrics` facade.
//!
//! Handles are no-ops until the embedding process installs a recorder;
//! exporters stay out of scope.

use std::time::Duration;

use metrics::{Counter, Histogram};

use crate::error::ReportError;

pub struct ServiceMetrics {
    pub reports_generated: Counter,
    pub reports_failed: Counter,
    pub busy_rejections: Counter,
    pub js_timeouts: Counter,
    pub cancellations: Counter,
    pub browser_launches: Counter,
    pub bytes_streamed: Counter,
    pub render_duration: Histogram,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            reports_generated: Counter::noop(),
            reports_failed: Counter::noop(),
            busy_rejections: Counter::noop(),
            js_timeouts: Counter::noop(),
            cancellations: Counter::noop(),
            browser_launches: Counter::noop(),
            bytes_streamed: Counter::noop(),
            render_duration: Histogram::noop(),
        }
    }

    pub fn record_report(&self, duration: Duration, outcome: &Result<(), ReportError>) {
        match outcome {
            Ok(()) => self.reports_generated.increment(1),
            Err(ReportError::ServerBusy) => {
                self.reports_failed.increment(1);
                self.busy_rejections.increment(1);
            }
            Err(ReportError::JsTimeout) => {
                self.reports_failed.increment(1);
                self.js_timeouts.increment(1);
            }
            Err(ReportError::Cancelled) => {
                self.reports_failed.increment(1);
                self.cancellations.increment(1);
            }
            Err(ReportError::BrowserError(_)) => self.reports_failed.increment(1),
        }
        self.render_duration.record(duration.as_secs_f64());
    }

    pub fn record_browser_launch(&self) {
        self.browser_launches.increment(1);
    }

    pub fn record_bytes_streamed(&self, bytes: usize) {
        self.bytes_streamed.increment(bytes as u64);
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_every_outcome_kind_does_not_panic() {
        let metrics = ServiceMetrics::new();
        let d = Duration::from_millis(120);
        metrics.record_report(d, &Ok(()));
        metrics.record_report(d, &Err(ReportError::ServerBusy));
        metrics.record_report(d, &Err(ReportError::JsTimeout));
        metrics.record_report(d, &Err(ReportError::Cancelled));
        metrics.record_report(d, &Err(ReportError::BrowserError("x".into())));
    }

    #[test]
    fn recording_launches_and_bytes_does_not_panic() {
        let metrics = ServiceMetrics::new();
        metrics.record_browser_launch();
        metrics.record_bytes_streamed(51_200);
        metrics.record_bytes_streamed(0);
    }
}
