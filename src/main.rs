use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use pmtrace::logging::{init_logging, LogLevel, LoggingConfig};
use pmtrace::server::{self, ServerConfig};
use pmtrace::{Observability, ObservabilityConfig};

#[derive(Parser, Debug)]
#[command(name = "pmtrace")]
#[command(version)]
#[command(about = "Resilient observability client for PM Copilot")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, conflicts_with = "quiet", global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Probe the tracing service and print the health report as JSON
    Health,
    /// Run the diagnostics HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, short, default_value = "3001")]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let logging = if cli.quiet {
        LoggingConfig::new().with_level(LogLevel::Error)
    } else {
        LoggingConfig::from_verbosity(cli.verbose)
    };
    init_logging(logging);

    let config = match ObservabilityConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{}", err);
            return Ok(ExitCode::FAILURE);
        }
    };
    let observability = Arc::new(Observability::from_config(config));

    match cli.command {
        Commands::Health => {
            let report = observability.health_report().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(exit_code(report.healthy))
        }
        Commands::Serve { port, bind } => {
            let config = ServerConfig::new(port).with_bind_address(bind);
            server::serve(config, observability).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
