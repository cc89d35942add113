use crate::{
    format_bytes, format_duration, BufferSink, Config, JsSettings, Orientation, PageSettings,
    ReportService,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "report-tool")]
#[command(about = "Headless-browser PDF report renderer")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Maximum pooled browsers")]
    pub max_browsers: Option<usize>,

    #[arg(long, help = "Maximum pages per browser")]
    pub max_pages: Option<usize>,

    #[arg(long, help = "DevTools response timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Launch browsers with --no-sandbox")]
    pub no_sandbox: bool,

    #[arg(long, help = "Launch browsers with --disable-dev-shm-usage")]
    pub disable_dev_shm: bool,

    #[arg(long, help = "Browser executable path")]
    pub browser_path: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a single HTML file to a PDF
    Render {
        #[arg(short, long, help = "Input HTML file")]
        input: PathBuf,

        #[arg(short, long, help = "Output PDF file")]
        output: PathBuf,

        #[arg(long, help = "Landscape orientation")]
        landscape: bool,

        #[arg(long, help = "Paper width in inches")]
        paper_width: Option<f64>,

        #[arg(long, help = "Paper height in inches")]
        paper_height: Option<f64>,

        #[arg(long, help = "Uniform margin in inches")]
        margin: Option<f64>,

        #[arg(long, help = "Skip CSS backgrounds")]
        no_background: bool,

        #[arg(long, help = "Chromium header template HTML")]
        header_template: Option<String>,

        #[arg(long, help = "Wait for the in-page readiness flag")]
        wait_for_ready: bool,

        #[arg(long, help = "Readiness wait timeout in milliseconds")]
        ready_timeout_ms: Option<u64>,

        #[arg(long, help = "Name of the window-level readiness flag")]
        ready_flag: Option<String>,
    },

    /// Render every *.html file in a directory
    Batch {
        #[arg(short, long, help = "Input directory containing HTML files")]
        input: PathBuf,

        #[arg(short, long, help = "Output directory for PDFs")]
        output: PathBuf,

        #[arg(short, long, default_value = "8", help = "Concurrent renders")]
        concurrency: usize,

        #[arg(long, help = "Landscape orientation")]
        landscape: bool,

        #[arg(long, help = "Skip CSS backgrounds")]
        no_background: bool,
    },

    /// Validate a configuration file
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },

    /// Launch the service and print pool statistics
    Stats,
}

pub struct CliRunner {
    pub config: Config,
    pub service: Arc<ReportService>,
}

impl CliRunner {
    pub fn new(mut config: Config, args: &Cli) -> Self {
        if let Some(max_browsers) = args.max_browsers {
            config.max_browsers = max_browsers;
        }
        if let Some(max_pages) = args.max_pages {
            config.max_pages_per_browser = max_pages;
        }
        if let Some(timeout) = args.timeout {
            config.response_timeout = Duration::from_secs(timeout);
        }
        if args.no_sandbox {
            config.no_sandbox = true;
        }
        if args.disable_dev_shm {
            config.disable_dev_shm_usage = true;
        }
        if let Some(browser_path) = &args.browser_path {
            config.browser_path = Some(browser_path.clone());
        }

        let service = Arc::new(ReportService::new(config.clone()));
        Self { config, service }
    }

    pub async fn run(&self, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
        match command {
            Commands::Render {
                input,
                output,
                landscape,
                paper_width,
                paper_height,
                margin,
                no_background,
                header_template,
                wait_for_ready,
                ready_timeout_ms,
                ready_flag,
            } => {
                let page = build_page_settings(
                    landscape,
                    paper_width,
                    paper_height,
                    margin,
                    no_background,
                    header_template,
                );
                let js = build_js_settings(
                    &self.config,
                    wait_for_ready,
                    ready_timeout_ms,
                    ready_flag,
                );
                self.run_render(input, output, page, js).await
            }
            Commands::Batch {
                input,
                output,
                concurrency,
                landscape,
                no_background,
            } => {
                let page =
                    build_page_settings(landscape, None, None, None, no_background, None);
                self.run_batch(input, output, concurrency, page).await
            }
            Commands::Validate { config } => self.validate_config(config).await,
            Commands::Stats => self.show_stats().await,
        }
    }

    async fn run_render(
        &self,
        input: PathBuf,
        output: PathBuf,
        page: PageSettings,
        js: JsSettings,
    ) -> Result<(), Box<dyn std::error::Error>> {
        info!("rendering {}", input.display());
        let html = fs::read_to_string(&input).await?;

        let started = Instant::now();
        let mut sink = BufferSink::new();
        self.service
            .generate_report(&mut sink, &html, &page, &js, &CancellationToken::new())
            .await?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&output, sink.as_bytes()).await?;

        println!("Report rendered successfully:");
        println!("  Input: {}", input.display());
        println!("  Output: {}", output.display());
        println!("  Size: {}", format_bytes(sink.len()));
        println!("  Duration: {}", format_duration(started.elapsed()));
        Ok(())
    }

    async fn run_batch(
        &self,
        input: PathBuf,
        output: PathBuf,
        concurrency: usize,
        page: PageSettings,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let documents = self.collect_html_files(&input).await?;
        info!("rendering {} documents from {}", documents.len(), input.display());
        fs::create_dir_all(&output).await?;

        let started = Instant::now();
        let limiter = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = Vec::new();

        for document in documents {
            let service = self.service.clone();
            let limiter = limiter.clone();
            let page = page.clone();
            let js = self.config.default_js.clone();
            let target = output.join(document.file_stem().map_or_else(
                || PathBuf::from("report.pdf"),
                |stem| PathBuf::from(stem).with_extension("pdf"),
            ));

            tasks.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await?;
                let html = fs::read_to_string(&document).await?;

                let mut sink = BufferSink::new();
                service
                    .generate_report(&mut sink, &html, &page, &js, &CancellationToken::new())
                    .await?;
                fs::write(&target, sink.as_bytes()).await?;
                Ok::<PathBuf, Box<dyn std::error::Error + Send + Sync>>(document)
            }));
        }

        let mut success_count = 0;
        let mut error_count = 0;
        for task in tasks {
            match task.await {
                Ok(Ok(document)) => {
                    success_count += 1;
                    info!("rendered {}", document.display());
                }
                Ok(Err(e)) => {
                    error_count += 1;
                    warn!("render failed: {e}");
                }
                Err(e) => {
                    error_count += 1;
                    error!("render task panicked: {e}");
                }
            }
        }

        println!(
            "Batch completed in {}. Success: {success_count}, Errors: {error_count}",
            format_duration(started.elapsed())
        );
        Ok(())
    }

    async fn validate_config(&self, path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        println!("Validating configuration: {}", path.display());

        let contents = fs::read_to_string(&path).await?;
        let config: Config = serde_json::from_str(&contents)?;

        println!("Configuration is valid:");
        println!("  Max browsers: {}", config.max_browsers);
        println!("  Max pages per browser: {}", config.max_pages_per_browser);
        println!("  Response timeout: {:?}", config.response_timeout);
        println!("  Browser kind: {:?}", config.browser_kind);
        println!("  No sandbox: {}", config.no_sandbox);
        Ok(())
    }

    async fn show_stats(&self) -> Result<(), Box<dyn std::error::Error>> {
        let stats = self.service.stats().await;
        println!("Browser Pool:");
        println!("  Live browsers: {}", stats.live_browsers);
        println!("  Max browsers: {}", stats.max_browsers);
        println!("  Total reports: {}", stats.total_reports);
        Ok(())
    }

    async fn collect_html_files(
        &self,
        dir: &PathBuf,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        let mut documents = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "html" || ext == "htm") {
                documents.push(path);
            }
        }
        documents.sort();
        Ok(documents)
    }
}

fn build_page_settings(
    landscape: bool,
    paper_width: Option<f64>,
    paper_height: Option<f64>,
    margin: Option<f64>,
    no_background: bool,
    header_template: Option<String>,
) -> PageSettings {
    let mut page = PageSettings {
        orientation: if landscape {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        },
        print_background: !no_background,
        header_template,
        ..Default::default()
    };
    if let Some(width) = paper_width {
        page.paper_width_inches = width;
    }
    if let Some(height) = paper_height {
        page.paper_height_inches = height;
    }
    if let Some(margin) = margin {
        page.margin_top_inches = margin;
        page.margin_bottom_inches = margin;
        page.margin_left_inches = margin;
        page.margin_right_inches = margin;
    }
    page
}

fn build_js_settings(
    config: &Config,
    wait_for_ready: bool,
    ready_timeout_ms: Option<u64>,
    ready_flag: Option<String>,
) -> JsSettings {
    let mut js = config.default_js.clone();
    js.wait_for_completion = wait_for_ready;
    if let Some(ms) = ready_timeout_ms {
        js.completion_timeout = Duration::from_millis(ms);
    }
    if let Some(flag) = ready_flag {
        js.readiness_flag_name = flag;
    }
    js
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_settings_from_flags() {
        let page = build_page_settings(true, Some(11.0), Some(8.5), Some(0.25), true, None);
        assert_eq!(page.orientation, Orientation::Landscape);
        assert_eq!(page.paper_width_inches, 11.0);
        assert_eq!(page.paper_height_inches, 8.5);
        assert_eq!(page.margin_left_inches, 0.25);
        assert_eq!(page.margin_right_inches, 0.25);
        assert!(!page.print_background);
    }

    #[test]
    fn page_settings_defaults_without_flags() {
        let page = build_page_settings(false, None, None, None, false, None);
        assert_eq!(page.orientation, Orientation::Portrait);
        assert_eq!(page.paper_width_inches, 8.5);
        assert!(page.print_background);
    }

    #[test]
    fn js_settings_from_flags() {
        let config = Config::default();
        let js = build_js_settings(&config, true, Some(500), Some("chartsDone".into()));
        assert!(js.wait_for_completion);
        assert_eq!(js.completion_timeout, Duration::from_millis(500));
        assert_eq!(js.readiness_flag_name, "chartsDone");
    }

    #[test]
    fn js_settings_inherit_config_defaults() {
        let config = Config::default();
        let js = build_js_settings(&config, false, None, None);
        assert!(!js.wait_for_completion);
        assert_eq!(js.completion_timeout, Duration::from_secs(3));
        assert_eq!(js.readiness_flag_name, "reportIsReady");
    }
}
