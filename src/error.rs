use std::time::Duration;
use thiserror::Error;

use crate::base64::DecodeError;

/// Internal failure taxonomy for the rendering stack.
///
/// Everything below the service facade speaks this type; the facade folds it
/// into the closed [`ReportError`] set callers see.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("browser start failed: {0}")]
    BrowserStart(String),

    #[error("transport closed: {0}")]
    Transport(String),

    #[error("{method} rejected by browser: {message}")]
    Protocol { method: String, message: String },

    #[error("no response to {method} within {timeout:?}")]
    RpcTimeout { method: String, timeout: Duration },

    #[error("request cancelled")]
    Cancelled,

    #[error("readiness signal not observed within {0:?}")]
    JsTimeout(Duration),

    #[error("pool limit reached")]
    PoolLimitReached,

    #[error("PDF stream decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    /// Whether the failing page must be disposed rather than returned to its
    /// pool. A late readiness signal or a caller hang-up leaves the tab
    /// healthy; every other pipeline failure poisons it.
    pub fn poisons_page(&self) -> bool {
        !matches!(self, RenderError::JsTimeout(_) | RenderError::Cancelled)
    }
}

/// Public outcome of [`ReportService::generate_report`].
///
/// A closed tagged set, matched exhaustively at the caller; no failure is
/// ever thrown across this boundary.
///
/// [`ReportService::generate_report`]: crate::ReportService::generate_report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// Pool caps were hit and admission retries were exhausted.
    #[error("rendering capacity exhausted")]
    ServerBusy,

    /// Caller context ended before the render completed.
    #[error("request cancelled")]
    Cancelled,

    /// Non-recoverable protocol, decode, or process-level failure.
    #[error("browser failure: {0}")]
    BrowserError(String),

    /// The JS completion signal was not observed in the configured window.
    #[error("javascript readiness signal timed out")]
    JsTimeout,
}

impl ReportError {
    /// Status code the (out-of-scope) HTTP layer maps this outcome to.
    pub fn http_status(&self) -> u16 {
        match self {
            ReportError::ServerBusy => 503,
            ReportError::Cancelled => 499,
            ReportError::BrowserError(_) => 500,
            ReportError::JsTimeout => 408,
        }
    }
}

impl From<RenderError> for ReportError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::PoolLimitReached => ReportError::ServerBusy,
            RenderError::Cancelled => ReportError::Cancelled,
            RenderError::JsTimeout(_) => ReportError::JsTimeout,
            other => ReportError::BrowserError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(ReportError::ServerBusy.http_status(), 503);
        assert_eq!(ReportError::Cancelled.http_status(), 499);
        assert_eq!(ReportError::BrowserError("x".into()).http_status(), 500);
        assert_eq!(ReportError::JsTimeout.http_status(), 408);
    }

    #[test]
    fn render_error_folds_into_public_set() {
        assert_eq!(
            ReportError::from(RenderError::PoolLimitReached),
            ReportError::ServerBusy
        );
        assert_eq!(
            ReportError::from(RenderError::Cancelled),
            ReportError::Cancelled
        );
        assert_eq!(
            ReportError::from(RenderError::JsTimeout(Duration::from_secs(3))),
            ReportError::JsTimeout
        );
        assert!(matches!(
            ReportError::from(RenderError::Transport("socket closed".into())),
            ReportError::BrowserError(_)
        ));
        assert!(matches!(
            ReportError::from(RenderError::BrowserStart("no binary".into())),
            ReportError::BrowserError(_)
        ));
    }

    #[test]
    fn page_poisoning_classification() {
        assert!(!RenderError::JsTimeout(Duration::from_millis(200)).poisons_page());
        assert!(!RenderError::Cancelled.poisons_page());
        assert!(RenderError::Transport("gone".into()).poisons_page());
        assert!(RenderError::Protocol {
            method: "IO.read".into(),
            message: "invalid handle".into()
        }
        .poisons_page());
    }

    #[test]
    fn io_and_json_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(RenderError::from(io), RenderError::Io(_)));

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(RenderError::from(json), RenderError::Json(_)));
    }
}
