use clap::Parser;
use sharpline::cli::{commands, Cli, Commands, OutputMode};
use sharpline::config::{AppConfig, LoggingConfig};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    let _log_guard = init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "invalid configuration");
        }
        anyhow::bail!("configuration invalid: {}", errors.join("; "));
    }

    let mode = OutputMode::from_json_flag(cli.json);
    match &cli.command {
        Commands::Strategies => commands::list_strategies(&config, mode)?,
        Commands::Signals {
            data,
            cutoff,
            strategies,
            game,
            timeout_secs,
        } => {
            commands::run_signals(
                &config,
                data,
                *cutoff,
                strategies,
                game.as_deref(),
                *timeout_secs,
                mode,
            )
            .await?
        }
        Commands::Backtest {
            data,
            database_url,
            start,
            end,
            strategies,
            timeout_secs,
        } => {
            commands::run_backtest(
                &config,
                data.as_deref(),
                database_url.as_deref(),
                *start,
                *end,
                strategies,
                *timeout_secs,
                mode,
            )
            .await?
        }
    }

    info!("done");
    Ok(())
}

/// Console logging to stderr plus an optional daily rolling file. Hold the
/// returned guard until exit so buffered file output is flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,sharpline={},sqlx=warn", config.level))
    });

    // `rolling::daily` panics if it cannot create the first file, so check
    // the directory is writable first
    let mut guard = None;
    let file_layer = config.dir.as_deref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Warning: Could not create log directory {log_dir} ({e}), file logging disabled");
            return None;
        }
        let probe = std::path::Path::new(log_dir).join(".sharpline_write_test");
        if let Err(e) = std::fs::OpenOptions::new().create(true).append(true).open(&probe) {
            eprintln!("Warning: Could not write to log directory {log_dir} ({e}), file logging disabled");
            return None;
        }
        let _ = std::fs::remove_file(&probe);

        let file_appender = tracing_appender::rolling::daily(log_dir, "sharpline.log");
        let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}
