//! Configuration management with serde serialization/deserialization
//!
//! This module provides all configuration structures for the report tool:
//! pool sizing, RPC timeouts, browser selection, page layout defaults, and
//! the fixed Chromium argument list used for every launch.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for the report service.
///
/// # Examples
///
/// ```rust
/// use report_tool::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     max_browsers: 2,
///     max_pages_per_browser: 4,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of Chromium processes kept alive (default: 4)
    ///
    /// Browsers are created lazily up to this cap and then reused
    /// round-robin across requests.
    pub max_browsers: usize,

    /// Maximum number of reusable tabs per browser (default: 10)
    ///
    /// Bounds the number of renders one browser serves concurrently.
    pub max_pages_per_browser: usize,

    /// Per-RPC response timeout on the DevTools connection (default: 30s)
    #[serde(with = "duration_secs")]
    pub response_timeout: Duration,

    /// Launch Chromium with `--no-sandbox` (default: false)
    ///
    /// Required inside most containers where user namespaces are disabled.
    pub no_sandbox: bool,

    /// Launch Chromium with `--disable-dev-shm-usage` (default: false)
    ///
    /// Avoids renderer crashes on hosts with a small /dev/shm.
    pub disable_dev_shm_usage: bool,

    /// Which browser family to launch (default: chrome)
    pub browser_kind: BrowserKind,

    /// Explicit browser executable path (default: auto-detect)
    pub browser_path: Option<PathBuf>,

    /// Default JS readiness settings applied when a request supplies none
    pub default_js: JsSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_browsers: 4,
            max_pages_per_browser: 10,
            response_timeout: Duration::from_secs(30),
            no_sandbox: false,
            disable_dev_shm_usage: false,
            browser_kind: BrowserKind::Chrome,
            browser_path: None,
            default_js: JsSettings::default(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Browser family used for launch and binary discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Edge,
}

/// Page orientation for `Page.printToPDF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Page layout for a single render. Immutable per request.
///
/// Defaults: portrait US Letter (8.5 × 11 in), 0.4 in margins, backgrounds
/// printed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PageSettings {
    pub orientation: Orientation,

    /// Paper width in inches
    pub paper_width_inches: f64,

    /// Paper height in inches
    pub paper_height_inches: f64,

    pub margin_top_inches: f64,
    pub margin_bottom_inches: f64,
    pub margin_left_inches: f64,
    pub margin_right_inches: f64,

    /// Render CSS backgrounds into the PDF
    pub print_background: bool,

    /// Chromium header template HTML, passed through verbatim.
    ///
    /// When set, `displayHeaderFooter` is enabled on the print command; the
    /// template's semantics are Chromium's to interpret.
    pub header_template: Option<String>,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            orientation: Orientation::Portrait,
            paper_width_inches: 8.5,
            paper_height_inches: 11.0,
            margin_top_inches: 0.4,
            margin_bottom_inches: 0.4,
            margin_left_inches: 0.4,
            margin_right_inches: 0.4,
            print_background: true,
            header_template: None,
        }
    }
}

/// JS readiness protocol settings. Immutable per request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JsSettings {
    /// Wait for a window-level flag before printing (default: false)
    pub wait_for_completion: bool,

    /// How long the in-page readiness wait may run (default: 3s)
    #[serde(with = "duration_secs")]
    pub completion_timeout: Duration,

    /// Name of the window-level readiness flag (default: `reportIsReady`)
    pub readiness_flag_name: String,
}

impl Default for JsSettings {
    fn default() -> Self {
        Self {
            wait_for_completion: false,
            completion_timeout: Duration::from_secs(3),
            readiness_flag_name: "reportIsReady".to_string(),
        }
    }
}

/// Environment variable overriding browser binary discovery.
pub const BROWSER_ENV_VAR: &str = "REPORT_TOOL_BROWSER";

const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

const EDGE_PATHS: &[&str] = &[
    "/usr/bin/microsoft-edge",
    "/usr/bin/microsoft-edge-stable",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

/// Find a browser executable for the given kind.
///
/// Search order: explicit config path, the `REPORT_TOOL_BROWSER` environment
/// variable, then known install locations per platform.
pub fn find_browser_executable(kind: BrowserKind, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "configured browser path does not exist");
    }

    if let Ok(env_path) = std::env::var(BROWSER_ENV_VAR) {
        let path = PathBuf::from(&env_path);
        if path.is_file() {
            return Some(path);
        }
        tracing::debug!(path = %env_path, "{BROWSER_ENV_VAR} set but not a file, falling through");
    }

    let candidates = match kind {
        BrowserKind::Chrome => CHROME_PATHS,
        BrowserKind::Edge => EDGE_PATHS,
    };
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Build the fixed Chromium argument list for one browser instance.
///
/// The debugging port is always 0 (the OS picks); the real port is learned
/// from the `DevToolsActivePort` handshake file under `user_data_dir`.
pub fn browser_args(config: &Config, user_data_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--headless=new".to_string(),
        "--disable-gpu".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-extensions".to_string(),
        "--disable-hang-monitor".to_string(),
        "--disable-prompt-on-repost".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--metrics-recording-only".to_string(),
        "--no-first-run".to_string(),
        "--disable-crash-reporter".to_string(),
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", user_data_dir.display()),
    ];

    if config.no_sandbox {
        args.push("--no-sandbox".to_string());
    }
    if config.disable_dev_shm_usage {
        args.push("--disable-dev-shm-usage".to_string());
    }

    args
}
