//! `billcheck run | validate | config | classify`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use tracing::{debug, info};

use billcheck_recon::model::{Category, RecordKind, ReconInput, SourceFile};
use billcheck_recon::product::classify_product;
use billcheck_recon::report::{write_diagnostics_csv, write_review_csv};
use billcheck_recon::{ReconConfig, ReconError, ReconResult};

use crate::exit_codes::{recon_exit_code, EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_REVIEW_REQUIRED, EXIT_USAGE};
use crate::util::review_lines;
use crate::CliError;

pub const CONFIG_ENV: &str = "BILLCHECK_CONFIG";

#[derive(Args)]
pub struct RunArgs {
    /// Vendor billing export (`<account>_<YYYY>_<MM>_*.csv`)
    #[arg(long)]
    pub billing: PathBuf,

    /// CRM project export (`Projekte_*.csv`)
    #[arg(long)]
    pub crm: PathBuf,

    /// Config file (default: $BILLCHECK_CONFIG, then the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the review table (CSV) to this file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Write the diagnostics block (CSV) to this file
    #[arg(long)]
    pub diagnostics: Option<PathBuf>,

    /// Output JSON to stdout instead of the review table
    #[arg(long)]
    pub json: bool,

    /// Write JSON output to file
    #[arg(long)]
    pub output_json: Option<PathBuf>,

    /// Exit 0 even when lines need review
    #[arg(long)]
    pub no_fail_on_review: bool,
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn engine_err(err: ReconError) -> CliError {
    let hint = match &err {
        ReconError::Encoding { .. } => Some("re-export the file as UTF-8 CSV".to_string()),
        ReconError::Schema { kind: RecordKind::Billing, .. } => {
            Some("map the header name under [billing.columns] in the config".to_string())
        }
        ReconError::Schema { kind: RecordKind::Crm, .. } => {
            Some("map the header name under [crm.columns] in the config".to_string())
        }
        _ => None,
    };
    CliError { code: recon_exit_code(&err), message: err.to_string(), hint }
}

// ============================================================================
// config discovery
// ============================================================================

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Flag(PathBuf),
    Env(PathBuf),
    UserDir(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flag(p) => write!(f, "{} (--config)", p.display()),
            Self::Env(p) => write!(f, "{} (${CONFIG_ENV})", p.display()),
            Self::UserDir(p) => write!(f, "{}", p.display()),
            Self::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// `--config`, else `$BILLCHECK_CONFIG`, else `<config_dir>/billcheck/config.toml`
/// when present, else defaults.
pub fn resolve_config_source(flag: Option<PathBuf>) -> ConfigSource {
    if let Some(path) = flag {
        return ConfigSource::Flag(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return ConfigSource::Env(PathBuf::from(path));
    }
    if let Some(path) = dirs::config_dir().map(|d| d.join("billcheck").join("config.toml")) {
        if path.is_file() {
            return ConfigSource::UserDir(path);
        }
    }
    ConfigSource::Defaults
}

pub fn load_config(flag: Option<PathBuf>) -> Result<(ReconConfig, ConfigSource), CliError> {
    let source = resolve_config_source(flag);
    let path = match &source {
        ConfigSource::Flag(p) | ConfigSource::Env(p) | ConfigSource::UserDir(p) => p,
        ConfigSource::Defaults => {
            debug!("no config file, using defaults");
            return Ok((ReconConfig::default(), source));
        }
    };
    let config = read_config_file(path)?;
    info!(config = %source, "loaded config");
    Ok((config, source))
}

fn read_config_file(path: &Path) -> Result<ReconConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        recon_err(EXIT_USAGE, format!("cannot read config {}: {e}", path.display()))
    })?;
    ReconConfig::from_toml(&text).map_err(|e| {
        recon_err(EXIT_INVALID_CONFIG, format!("{}: {e}", path.display()))
    })
}

// ============================================================================
// run
// ============================================================================

fn read_input(path: &Path) -> Result<SourceFile, CliError> {
    let bytes = std::fs::read(path).map_err(|e| {
        recon_err(EXIT_USAGE, format!("cannot read {}: {e}", path.display()))
    })?;
    Ok(SourceFile::new(path.display().to_string(), bytes))
}

fn create_file(path: &Path) -> Result<BufWriter<File>, CliError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| recon_err(EXIT_ERROR, format!("cannot write {}: {e}", path.display())))
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let (config, source) = load_config(args.config.clone())?;
    debug!(config = %source, "effective config");

    let input = ReconInput {
        billing: read_input(&args.billing)?,
        crm: read_input(&args.crm)?,
    };

    let result = billcheck_recon::run(&config, &input).map_err(engine_err)?;

    // Review table
    match &args.output {
        Some(path) => {
            write_review_csv(&result.report.rows, create_file(path)?)
                .map_err(|e| recon_err(EXIT_ERROR, format!("cannot write {}: {e}", path.display())))?;
            eprintln!("wrote {}", path.display());
        }
        None if !args.json => {
            write_review_csv(&result.report.rows, io::stdout().lock())
                .map_err(|e| recon_err(EXIT_ERROR, format!("cannot write review table: {e}")))?;
        }
        None => {}
    }

    if let Some(ref path) = args.diagnostics {
        write_diagnostics_csv(&result.report.diagnostics, create_file(path)?)
            .map_err(|e| recon_err(EXIT_ERROR, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }

    // JSON
    if args.json || args.output_json.is_some() {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| recon_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

        if let Some(ref path) = args.output_json {
            std::fs::write(path, &json_str)
                .map_err(|e| recon_err(EXIT_ERROR, format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }

        if args.json {
            println!("{json_str}");
        }
    }

    print_summary(&result, args.json || args.output.is_some());

    let review = result.report.summary.review_required;
    if review > 0 && !args.no_fail_on_review {
        return Err(recon_err(
            EXIT_REVIEW_REQUIRED,
            format!("{review} line(s) need review"),
        ));
    }
    Ok(())
}

/// Human summary to stderr.
fn print_summary(result: &ReconResult, list_rows: bool) {
    let s = &result.report.summary;
    let period = result
        .meta
        .invoice_period
        .as_deref()
        .map(|p| format!(" for {p}"))
        .unwrap_or_default();

    eprintln!(
        "billing check{period}: {} line(s), {} billed, {} ok, {} review required ({:.1}%)",
        s.total_lines, s.billed_lines, s.ok, s.review_required, s.issue_rate_percent,
    );
    for (category, counts) in &s.categories {
        if counts.total > 0 {
            eprintln!(
                "  {:<13}{:>5} total {:>5} ok {:>5} review",
                category.to_string(),
                counts.total,
                counts.ok,
                counts.review_required,
            );
        }
    }

    if !result.report.diagnostics.is_empty() {
        eprintln!("diagnostics ({}):", result.report.diagnostics.len());
        for d in &result.report.diagnostics {
            eprintln!("  {d}");
        }
    }

    if list_rows && !result.report.rows.is_empty() {
        eprintln!("review:");
        for line in review_lines(&result.report.rows) {
            eprintln!("{line}");
        }
    }
}

// ============================================================================
// validate / config / classify
// ============================================================================

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config_file(&config_path)?;
    eprintln!(
        "valid: config '{}' with {} site status(es), {} app status(es)",
        config.name,
        config.statuses.site_ok.len(),
        config.statuses.app_ok.len(),
    );
    Ok(())
}

pub fn cmd_config(flag: Option<PathBuf>) -> Result<(), CliError> {
    let (config, source) = load_config(flag)?;
    let text = config
        .to_toml()
        .map_err(|e| recon_err(EXIT_ERROR, e.to_string()))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "# source: {source}")
        .and_then(|_| write!(handle, "{text}"))
        .map_err(|e| recon_err(EXIT_ERROR, e.to_string()))
}

pub fn cmd_classify(names: Vec<String>, flag: Option<PathBuf>) -> Result<(), CliError> {
    let (config, _) = load_config(flag)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for name in &names {
        let category: Category = classify_product(name, &config.products);
        writeln!(handle, "{name}\t{category}").map_err(|e| recon_err(EXIT_ERROR, e.to_string()))?;
    }
    Ok(())
}
