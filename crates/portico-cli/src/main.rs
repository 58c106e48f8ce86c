//! Command-line interface for the Portico ticket service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portico_core::config::env_vars;
use portico_core::{PorticoConfig, SharedClock, SystemClock};
use portico_tickets::{
    AccessTicket, StaticCredentials, StaticEntitlements, TicketIssuer, TicketSigner,
    TicketValidator,
};
use tracing::{debug, info};

/// Portico - ticket-gated plugin frames.
#[derive(Parser, Debug)]
#[command(name = "portico")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to $PORTICO_CONFIG, then ./portico.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the ticket service and asset gate.
    Serve {
        /// Address to bind to, overriding the config.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Issue a ticket locally using the configured credentials.
    IssueTicket {
        /// Bearer credential of the caller.
        #[arg(long)]
        credential: String,
        /// Plugin to authorize.
        #[arg(long)]
        plugin: String,
    },
    /// Check a ticket's signature and expiry without consuming it.
    VerifyTicket {
        ticket: String,
        /// Require the ticket to be for this plugin.
        #[arg(long)]
        plugin: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = PorticoConfig::load(args.config.as_deref())?;
    let signer = Arc::new(TicketSigner::from_env_or_generate());

    match args.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                debug!(category = "cli", bind = %bind, "Bind address overridden");
                config.server.bind = bind;
            }
            info!(
                category = "cli",
                version = env!("CARGO_PKG_VERSION"),
                plugins = config.plugins.len(),
                "Starting Portico"
            );
            portico_api::run(config, signer).await
        }
        Command::IssueTicket { credential, plugin } => {
            issue_ticket(&config, signer, &credential, &plugin).await
        }
        Command::VerifyTicket { ticket, plugin } => verify_ticket(&config, signer, &ticket, plugin),
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "portico=debug" } else { "portico=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

async fn issue_ticket(
    config: &PorticoConfig,
    signer: Arc<TicketSigner>,
    credential: &str,
    plugin: &str,
) -> Result<()> {
    if env_vars::ticket_secret().is_none() {
        eprintln!(
            "warning: {} is not set; this ticket will not validate anywhere else",
            env_vars::TICKET_SECRET
        );
    }

    let clock: SharedClock = Arc::new(SystemClock);
    let issuer = TicketIssuer::new(
        signer,
        clock,
        Arc::new(StaticCredentials::from_map(&config.auth.tokens)),
        Arc::new(StaticEntitlements::from_map(&config.auth.entitlements)),
    )
    .with_settings(&config.tickets);

    let ticket = issuer
        .issue(Some(credential), plugin)
        .await
        .context("Ticket issuance failed")?;
    println!("{}", ticket.as_str());
    Ok(())
}

fn verify_ticket(
    config: &PorticoConfig,
    signer: Arc<TicketSigner>,
    ticket: &str,
    plugin: Option<String>,
) -> Result<()> {
    let clock: SharedClock = Arc::new(SystemClock);
    let mut validator = TicketValidator::from_settings(signer.clone(), clock, &config.tickets);
    if let Some(plugin) = plugin {
        validator = validator.for_plugin(plugin);
    }

    match validator.verify(Some(ticket)) {
        Ok(claims) => {
            let expires = claims
                .expires_at_time()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&claims)?);
            println!("valid until {}", expires);
            Ok(())
        }
        Err(e) => {
            // Show what the ticket claims even when it is no longer valid.
            if let Ok(claims) = AccessTicket::open(ticket, &signer) {
                eprintln!("{}", serde_json::to_string_pretty(&claims)?);
            }
            Err(anyhow::anyhow!("Ticket rejected: {}", e))
        }
    }
}
