use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use redash_migrate::commands::init::InitArgs;
use redash_migrate::error::{MigrateError, Result};
use redash_migrate::output::{self, Format};
use redash_migrate::phase::{Phase, phase_help};
use redash_migrate::service::HttpConnector;
use redash_migrate::store::ledger::LedgerStore;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "redash-migrate",
    version,
    about = "Move users, queries, dashboards and alerts between two service instances",
    after_help = phase_help()
)]
struct Cli {
    /// Ledger file mapping origin ids to destination ids
    #[arg(long, global = true, default_value = LedgerStore::DEFAULT_FILE)]
    ledger: PathBuf,
    /// Output format of the final summary
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    format: Format,
    /// Log every request
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger; prompts for any setting not given as a flag
    Init {
        #[arg(long)]
        origin_url: Option<String>,
        #[arg(long)]
        origin_api_key: Option<String>,
        /// Id of the admin user at the origin
        #[arg(long)]
        origin_admin_id: Option<u64>,
        #[arg(long)]
        destination_url: Option<String>,
        #[arg(long)]
        destination_api_key: Option<String>,
        /// Id of the admin user at the destination
        #[arg(long)]
        destination_admin_id: Option<u64>,
        #[arg(long)]
        destination_admin_email: Option<String>,
        /// Keep destination invite links in the ledger
        #[arg(long)]
        preserve_invite_links: Option<bool>,
    },
    /// Show what the ledger has mapped so far
    Status,
    /// Run one migration phase
    #[command(external_subcommand)]
    Phase(Vec<String>),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let store = LedgerStore::new(&cli.ledger);
    match cli.command {
        Commands::Init {
            origin_url,
            origin_api_key,
            origin_admin_id,
            destination_url,
            destination_api_key,
            destination_admin_id,
            destination_admin_email,
            preserve_invite_links,
        } => {
            let args = InitArgs {
                origin_url,
                origin_api_key,
                origin_admin_id,
                destination_url,
                destination_api_key,
                destination_admin_id,
                destination_admin_email,
                preserve_invite_links,
            };
            redash_migrate::commands::init::run(
                &store,
                args,
                &mut io::stdin().lock(),
                &mut io::stderr(),
                cli.format,
            )
        }
        Commands::Status => redash_migrate::commands::status::run(&store, cli.format),
        Commands::Phase(args) => {
            let (name, extra) = args.split_first().ok_or_else(|| {
                MigrateError::InvalidInput("missing phase name".into())
            })?;
            if !extra.is_empty() {
                return Err(MigrateError::InvalidInput(format!(
                    "unexpected arguments after {name}: {} (put options before the phase)",
                    extra.join(" ")
                )));
            }
            let phase: Phase = name.parse()?;
            let outcome = redash_migrate::driver::run(phase, &store, &HttpConnector)?;
            output::print_outcome(&outcome, cli.format)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(ledger = %cli.ledger.display(), "redash-migrate {}", env!("CARGO_PKG_VERSION"));

    let format = cli.format;
    if let Err(e) = run(cli) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            Format::Pretty => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
