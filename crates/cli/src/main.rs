// billcheck - monthly vendor billing vs. CRM workflow-status check

mod exit_codes;
mod logging;
mod recon;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::EXIT_SUCCESS;
use recon::RunArgs;

#[derive(Parser)]
#[command(name = "billcheck")]
#[command(about = "Flag billed sites and add-ons whose CRM workflow status does not justify the charge")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Log progress to stderr (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a billing export against a CRM export
    #[command(after_help = "\
Examples:
  billcheck run --billing acme_2024_05_invoice.csv --crm Projekte_2024_05.csv
  billcheck run --billing acme_2024_05_invoice.csv --crm Projekte_2024_05.csv -o review.csv
  billcheck run --billing acme_2024_05_invoice.csv --crm Projekte_2024_05.csv --json
  billcheck run --billing b.csv --crm c.csv --diagnostics diag.csv --no-fail-on-review")]
    Run(RunArgs),

    /// Validate a config file without running
    #[command(after_help = "\
Examples:
  billcheck validate billcheck.toml")]
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },

    /// Print the effective configuration and where it came from
    Config {
        /// Config file (default: $BILLCHECK_CONFIG, then the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the category a product name is billed under
    #[command(after_help = "\
Examples:
  billcheck classify 'DudaOne Monthly' ecom-premium AudioEye")]
    Classify {
        /// Product names as they appear in the billing export
        #[arg(required = true)]
        names: Vec<String>,

        /// Config file (default: $BILLCHECK_CONFIG, then the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  billcheck-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  billcheck-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: billcheck <command> [options]");
            eprintln!("       billcheck --help for more information");
            Ok(())
        }
        Some(Commands::Run(args)) => recon::cmd_run(args),
        Some(Commands::Validate { config }) => recon::cmd_validate(config),
        Some(Commands::Config { config }) => recon::cmd_config(config),
        Some(Commands::Classify { names, config }) => recon::cmd_classify(names, config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}
