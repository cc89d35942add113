use clap::Parser;
use report_tool::{setup_logging, Cli, CliRunner, Config};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("starting report-tool v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;
    let runner = CliRunner::new(config, &args);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx);

    let result = tokio::select! {
        result = runner.run(args.command) => result,
        _ = shutdown_rx.recv() => {
            info!("received shutdown signal");
            Ok(())
        }
    };

    info!("shutting down...");
    runner.service.shutdown().await;

    if let Err(e) = result {
        error!("application error: {e}");
        std::process::exit(1);
    }

    info!("report-tool stopped");
    Ok(())
}

async fn load_config(args: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let config = if let Some(config_path) = &args.config {
        let contents = tokio::fs::read_to_string(config_path).await?;
        serde_json::from_str(&contents)?
    } else {
        Config::default()
    };

    validate_config(&config)?;

    info!(
        max_browsers = config.max_browsers,
        max_pages_per_browser = config.max_pages_per_browser,
        response_timeout = ?config.response_timeout,
        "configuration loaded"
    );

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.max_browsers == 0 {
        return Err("max_browsers must be greater than 0".into());
    }
    if config.max_pages_per_browser == 0 {
        return Err("max_pages_per_browser must be greater than 0".into());
    }
    if config.response_timeout.is_zero() {
        return Err("response_timeout must be greater than 0".into());
    }
    Ok(())
}

fn setup_shutdown_handler(
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("failed to create SIGINT handler");
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to create SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }

        let _ = shutdown_tx.send(());
    })
}
