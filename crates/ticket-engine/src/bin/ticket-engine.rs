//! Ticket engine command line
//!
//! - `serve`: run the escalation sweep until Ctrl-C
//! - `sweep`: run one sweep and print the report
//! - `route`: create a ticket for a store and route it
//! - `check-config`: load, validate and print the effective configuration

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use fixdesk_ticket_engine::config::TicketEngineConfig;
use fixdesk_ticket_engine::logging::{log_welcome, setup_logging};
use fixdesk_ticket_engine::server::{TicketEngineServer, TicketEngineServerBuilder};
use fixdesk_ticket_engine::types::NewTicketRequest;

#[derive(Parser, Debug)]
#[command(author, version, about = "FixDesk ticket routing and SLA escalation", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL, overrides the configuration
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the periodic escalation sweep until interrupted
    Serve,

    /// Run a single escalation sweep
    Sweep,

    /// Create a ticket and route it
    Route {
        /// Store reporting the issue
        #[arg(long)]
        store: Uuid,

        /// Reporting user, random when omitted
        #[arg(long)]
        reporter: Option<Uuid>,

        /// Where in the store the issue is
        #[arg(long)]
        location: String,

        /// Asset tag scanned from the equipment
        #[arg(long)]
        asset_tag: Option<String>,

        /// Issue description
        description: String,
    },

    /// Validate and print the configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TicketEngineConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(url) = &args.database {
        config.database.url = url.clone();
    }
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    setup_logging(&config.logging).context("failed to set up logging")?;

    match args.command {
        Command::CheckConfig => {
            config
                .validate()
                .map_err(anyhow::Error::msg)
                .context("configuration is invalid")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Sweep => {
            let server = build_server(config).await?;
            let report = server.monitor().sweep().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Route {
            store,
            reporter,
            location,
            asset_tag,
            description,
        } => {
            let server = build_server(config).await?;
            let mut request =
                NewTicketRequest::new(description, location, store, reporter.unwrap_or_else(Uuid::new_v4));
            if let Some(tag) = asset_tag {
                request = request.with_asset_tag(tag);
            }
            let outcome = server.orchestrator().process_new_ticket(request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Serve => {
            log_welcome(&config.logging.app_name, env!("CARGO_PKG_VERSION"));
            let mut server = build_server(config).await?;
            server.start().await?;
            info!("🎫 Ticket engine running, press Ctrl+C to stop");

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            server.stop().await?;
        }
    }

    Ok(())
}

async fn build_server(config: TicketEngineConfig) -> anyhow::Result<TicketEngineServer> {
    TicketEngineServerBuilder::new()
        .with_config(config)
        .build()
        .await
        .context("failed to start ticket engine")
}
