//! Nopal CLI - migrations and shipping maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run admin database migrations
//! nopal-cli migrate
//!
//! # Reconcile a shipping metadata document offline
//! nopal-cli shipping normalize --file metadata.json
//!
//! # Resync an order's shipment from Skydropx
//! nopal-cli shipping sync --order-id <UUID>
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "nopal-cli")]
#[command(author, version, about = "Nopal back-office CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run admin database migrations
    Migrate,
    /// Shipping metadata maintenance
    Shipping {
        #[command(subcommand)]
        action: ShippingAction,
    },
}

#[derive(Subcommand)]
enum ShippingAction {
    /// Reconcile a metadata document and print the result with its diagnostics
    Normalize {
        /// JSON file to read (stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Route name recorded in `_last_write.route`
        #[arg(short, long, default_value = "cli")]
        source: String,

        /// Order id recorded in `_last_write.order_id`
        #[arg(long)]
        order_id: Option<String>,
    },
    /// Pull an order's shipment state from Skydropx and store it
    Sync {
        /// Order UUID
        #[arg(long)]
        order_id: String,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nopal_cli=info,nopal_admin=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::admin().await?,
        Commands::Shipping { action } => match action {
            ShippingAction::Normalize {
                file,
                source,
                order_id,
            } => commands::shipping::normalize(file.as_deref(), &source, order_id.as_deref())?,
            ShippingAction::Sync { order_id } => commands::shipping::sync(&order_id).await?,
        },
    }
    Ok(())
}
