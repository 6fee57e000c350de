use std::sync::Arc;

use clap::{Parser, Subcommand};
use onionwatch::{
    config::AppConfig,
    supervisor::{Supervisor, SupervisorError},
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a configuration file; environment variables always apply.
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the monitoring daemon: scheduler plus HTTP API.
    Run,
    /// Scans a single URL and prints the record as JSON.
    Scan {
        /// URL to scan.
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    init_tracing(&config);

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::Scan { url } => run_single_scan(config, &url).await,
    };

    if let Err(code) = result {
        std::process::exit(code);
    }
}

async fn run_daemon(config: AppConfig) -> Result<(), i32> {
    let supervisor = build_supervisor(config).await?;

    tracing::info!("Supervisor initialized, starting monitoring...");
    if let Err(e) = supervisor.run().await {
        tracing::error!(error = %e, "Supervisor terminated abnormally");
        return Err(1);
    }
    Ok(())
}

async fn run_single_scan(config: AppConfig, url: &str) -> Result<(), i32> {
    let supervisor = build_supervisor(config).await?;

    match supervisor.pipeline().scan(url).await {
        Ok(record) => {
            let rendered = serde_json::to_string_pretty(&record).unwrap_or_default();
            println!("{rendered}");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Scan failed");
            Err(1)
        }
    }
}

async fn build_supervisor(config: AppConfig) -> Result<Supervisor, i32> {
    match Supervisor::builder().config(config).build().await {
        Ok(supervisor) => Ok(supervisor),
        Err(e @ SupervisorError::StoreUnreachable(_)) => {
            tracing::error!(error = %e, "Scan store unreachable at startup");
            Err(3)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialise");
            Err(2)
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(dir) = &config.log_dir {
        let opened = std::fs::create_dir_all(dir).and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(std::path::Path::new(dir).join("onionwatch.log"))
        });
        match opened {
            Ok(file) => {
                let subscriber = FmtSubscriber::builder()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .finish();
                tracing::subscriber::set_global_default(subscriber)
                    .expect("setting default subscriber failed");
                return;
            }
            Err(e) => {
                eprintln!("Could not open log file in {dir}: {e}; logging to stdout");
            }
        }
    }

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");
}
