//! MongoDB connection checker.
//!
//! Runs the full mongoboot bootstrap against a cluster and reports the
//! resulting session policy, or prints the X.509 principal a client
//! certificate would authenticate as.
//!
//! # Security
//! - Connection strings are redacted in all output
//! - Certificate key material is never printed

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use mongoboot_core::{
    BootstrapConfig, connect_with, derive_identity_from_pem, error::redact_database_url,
    init_logging,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mongoboot")]
#[command(about = "MongoDB connection bootstrap checker")]
#[command(version)]
#[command(long_about = "
mongoboot - MongoDB connection bootstrap checker

Connects to a MongoDB cluster exactly the way an application using
mongoboot-core would:
- Optional TLS with a custom CA certificate
- Optional MONGODB-X509 authentication with a client certificate
- Monotonic reads and majority writes

EXAMPLES:
  mongoboot check mongodb://localhost:27017/test
  mongoboot check --ca-cert ca.pem --client-cert client.pem mongodb://db:27017/app
  mongoboot identity client.pem
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bootstrap a connection and report the session policy
    Check(CheckArgs),
    /// Print the X.509 principal derived from a certificate
    Identity(IdentityArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Connection URI
    #[arg(
        env = "MONGODB_URI",
        help = "Connection string naming one database (credentials are redacted in logs)"
    )]
    uri: Option<String>,

    /// JSON bootstrap configuration file
    #[arg(long, help = "Read bootstrap settings from a JSON file")]
    config: Option<PathBuf>,

    /// CA certificate file
    #[arg(long, help = "PEM file with one or more CA certificates (enables TLS)")]
    ca_cert: Option<PathBuf>,

    /// Client certificate file
    #[arg(long, help = "PEM file with client certificate and private key")]
    client_cert: Option<PathBuf>,

    /// Dial timeout in seconds
    #[arg(long, help = "Dial timeout in seconds (default: 10)")]
    timeout: Option<u64>,
}

#[derive(Args)]
struct IdentityArgs {
    /// Certificate file
    #[arg(help = "PEM file whose first certificate is inspected")]
    cert: PathBuf,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    match &cli.command {
        Command::Check(args) => check(args).await,
        Command::Identity(args) => identity(&args.cert),
    }
}

/// Builds the bootstrap configuration from a file and/or flags.
///
/// Flags override values read from the file.
fn build_config(args: &CheckArgs) -> anyhow::Result<BootstrapConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let uri = args
                .uri
                .clone()
                .context("a connection URI is required (argument, MONGODB_URI or --config)")?;
            BootstrapConfig::new(uri)
        }
    };

    if let (Some(uri), Some(_)) = (&args.uri, &args.config) {
        config.uri.clone_from(uri);
    }
    if let Some(ca) = &args.ca_cert {
        config = config.with_ca_cert(ca);
    }
    if let Some(client) = &args.client_cert {
        config = config.with_client_cert(client);
    }
    if let Some(secs) = args.timeout {
        config = config.with_dial_timeout(Duration::from_secs(secs));
    }

    Ok(config)
}

fn load_config(path: &Path) -> anyhow::Result<BootstrapConfig> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing config file {}", path.display()))
}

/// Bootstraps a connection, reports it and closes it
async fn check(args: &CheckArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;

    info!("Checking {}", redact_database_url(&config.uri));

    let handle = connect_with(&config).await.inspect_err(|e| {
        error!("Bootstrap failed: {}", e);
    })?;

    info!("✓ Bootstrap successful");
    println!("Connected to database '{}'", handle.name());
    println!(
        "Write concern: {:?}",
        handle.write_concern().and_then(|w| w.w.clone())
    );
    println!("Read preference: {:?}", handle.selection_criteria());
    println!(
        "Authentication: {}",
        if config.client_cert().is_some() {
            "MONGODB-X509"
        } else {
            "URI credentials or none"
        }
    );

    handle.close().await;
    Ok(())
}

/// Prints the principal identity of a certificate
fn identity(cert: &Path) -> anyhow::Result<()> {
    let pem = std::fs::read(cert).with_context(|| format!("reading {}", cert.display()))?;
    let principal = derive_identity_from_pem(&pem)?;
    println!("{}", principal);
    Ok(())
}
