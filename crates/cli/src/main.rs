mod commands;
mod render;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use atolye_core::{Decimal, Karat, UnitId, VaultDirection};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Gold workshop ledger: unit stock, fire and has accounting.
#[derive(Parser)]
#[command(name = "atolye", version, about = "Gold workshop ledger toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Sync configuration file (TOML); environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize every unit and the external vault from a ledger file
    Summarize {
        /// Path to the ledger JSON file
        ledger: PathBuf,
        /// Only show this unit
        #[arg(long, value_parser = parse_unit)]
        unit: Option<UnitId>,
    },

    /// Report units and karats whose output exceeds their input
    Audit {
        /// Path to the ledger JSON file
        ledger: PathBuf,
    },

    /// Print a counterparty's external vault statement
    Statement {
        /// Path to the ledger JSON file
        ledger: PathBuf,
        /// Counterparty name (surrounding whitespace is ignored)
        counterparty: String,
    },

    /// Start the reference ledger store HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Ledger JSON file to pre-load
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Record a transfer between two units
    Transfer {
        #[arg(long, value_parser = parse_unit)]
        from: UnitId,
        #[arg(long, value_parser = parse_unit)]
        to: UnitId,
        /// Amount in grams
        #[arg(long, value_parser = parse_grams)]
        grams: Decimal,
        /// Karat grade (14, 18, 22 or 24)
        #[arg(long, value_parser = parse_karat)]
        karat: Karat,
        /// Product category
        #[arg(long)]
        cinsi: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Record an external vault deposit or withdrawal
    Vault {
        #[arg(long, value_enum)]
        direction: DirectionArg,
        /// Amount in grams
        #[arg(long, value_parser = parse_grams)]
        grams: Decimal,
        /// Karat grade (14, 18, 22 or 24)
        #[arg(long, value_parser = parse_karat)]
        karat: Karat,
        #[arg(long)]
        counterparty: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a transfer, or a vault transaction with --vault
    Delete {
        /// Record id
        id: String,
        #[arg(long)]
        vault: bool,
    },

    /// Follow the store and print the workshop summary on every change
    Watch {
        /// Fetch once, print, and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Deposit,
    Withdrawal,
}

impl From<DirectionArg> for VaultDirection {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Deposit => VaultDirection::Deposit,
            DirectionArg::Withdrawal => VaultDirection::Withdrawal,
        }
    }
}

fn parse_unit(s: &str) -> Result<UnitId, String> {
    s.parse().map_err(|e: atolye_core::ValidationError| e.to_string())
}

fn parse_karat(s: &str) -> Result<Karat, String> {
    s.parse().map_err(|e: atolye_core::ValidationError| e.to_string())
}

fn parse_grams(s: &str) -> Result<Decimal, String> {
    s.trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid gram amount '{}': {}", s, e))
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "error" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let output = cli.output;
    let quiet = cli.quiet;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Summarize { ledger, unit } => {
            commands::report::cmd_summarize(&ledger, unit, output, quiet);
        }
        Commands::Audit { ledger } => {
            commands::report::cmd_audit(&ledger, output, quiet);
        }
        Commands::Statement {
            ledger,
            counterparty,
        } => {
            commands::report::cmd_statement(&ledger, &counterparty, output, quiet);
        }
        Commands::Serve { port, seed } => {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(&format!("failed to start runtime: {}", e), output, quiet);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(port, seed)) {
                report_error(&format!("server error: {}", e), output, quiet);
                process::exit(1);
            }
        }
        Commands::Transfer {
            from,
            to,
            grams,
            karat,
            cinsi,
            notes,
        } => {
            let mut transfer = atolye_core::NewTransfer::new(from, to, grams, karat);
            transfer.cinsi = cinsi;
            transfer.notes = notes;
            commands::remote::cmd_transfer(config, transfer, output, quiet);
        }
        Commands::Vault {
            direction,
            grams,
            karat,
            counterparty,
            notes,
        } => {
            let mut transaction =
                atolye_core::NewVaultTransaction::new(direction.into(), grams, karat);
            transaction.counterparty = counterparty;
            transaction.notes = notes;
            commands::remote::cmd_vault(config, transaction, output, quiet);
        }
        Commands::Delete { id, vault } => {
            commands::remote::cmd_delete(config, &id, vault, output, quiet);
        }
        Commands::Watch { once } => {
            commands::watch::cmd_watch(config, once, output, quiet);
        }
    }
}

/// Report an error message in the appropriate format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
