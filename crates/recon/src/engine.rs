use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::classify::classify_all;
use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::matcher::{build_index, match_records};
use crate::model::{
    BillingRecord, CrmRecord, Diagnostic, ReconInput, ReconMeta, ReconResult, RecordKind, SiteId,
};
use crate::parse::{read_billing, read_crm};
use crate::product::classify_product;
use crate::repair::repair_scientific_ids;
use crate::report::build_report;

/// Run reconciliation per config. Returns per-line verdicts, the review report
/// and diagnostics. Only undecodable input or missing columns fail the run.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconResult, ReconError> {
    config.validate()?;

    let mut diagnostics = Vec::new();

    // Billing
    let billing_rows = read_billing(&input.billing.name, &input.billing.bytes, config)?;
    let billing_encoding = billing_rows.info().encoding;
    let mut billing: Vec<BillingRecord> = Vec::new();
    let mut unreadable: Vec<(usize, String)> = Vec::new();
    for row in billing_rows {
        match row {
            Ok(rec) => billing.push(rec),
            Err(issue) => {
                billing.push(placeholder_record(issue.line, config));
                unreadable.push((issue.line, issue.detail));
            }
        }
    }

    // CRM
    let crm_rows = read_crm(&input.crm.name, &input.crm.bytes, config)?;
    let crm_encoding = crm_rows.info().encoding;
    let mut crm: Vec<CrmRecord> = Vec::new();
    for row in crm_rows {
        match row {
            Ok(rec) => crm.push(rec),
            Err(issue) => {
                warn!(source = %input.crm.name, line = issue.line, detail = %issue.detail, "unreadable CRM row");
                diagnostics.push(Diagnostic::MalformedRowWarning {
                    source: RecordKind::Crm,
                    line: issue.line,
                    site_id: String::new(),
                    detail: issue.detail,
                });
            }
        }
    }
    info!(billing = billing.len(), crm = crm.len(), "inputs loaded");

    if config.repair.scientific_ids {
        diagnostics.extend(repair_scientific_ids(&mut billing, &crm));
    }

    for rec in &billing {
        let detail = match unreadable.iter().find(|(line, _)| *line == rec.line) {
            Some((_, detail)) => Some(detail.clone()),
            None => rec.defect(),
        };
        if let Some(detail) = detail {
            warn!(source = %input.billing.name, line = rec.line, %detail, "malformed billing row");
            diagnostics.push(Diagnostic::MalformedRowWarning {
                source: RecordKind::Billing,
                line: rec.line,
                site_id: rec.site_id.raw.clone(),
                detail,
            });
        }
    }

    let (index, duplicates) = build_index(&crm);
    diagnostics.extend(duplicates);

    let pairs = match_records(&billing, &index);
    let results = classify_all(&pairs, &config.statuses);
    let report = build_report(&results, diagnostics);

    info!(
        lines = report.summary.total_lines,
        review = report.summary.review_required,
        diagnostics = report.diagnostics.len(),
        "reconciliation finished"
    );

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            billing_file: input.billing.name.clone(),
            crm_file: input.crm.name.clone(),
            billing_encoding: billing_encoding.to_string(),
            crm_encoding: crm_encoding.to_string(),
            invoice_period: invoice_period(&input.billing.name),
        },
        report,
        results,
    })
}

/// Stand-in for a billing row the reader could not split into fields; it
/// still gets a verdict.
fn placeholder_record(line: usize, config: &ReconConfig) -> BillingRecord {
    BillingRecord {
        line,
        site_id: SiteId::new(""),
        parent_site: None,
        product_name: String::new(),
        should_charge: None,
        charge_flag_raw: String::new(),
        site_url: None,
        category: classify_product("", &config.products),
    }
}

static INVOICE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^.+?_(\d{4})_(\d{2})_.*\.csv$").expect("valid regex"));

/// `YYYY-MM` from a billing export named `<account>_<YYYY>_<MM>_*.csv`.
pub fn invoice_period(source_name: &str) -> Option<String> {
    let file_name = Path::new(source_name).file_name()?.to_str()?;
    let caps = INVOICE_FILE.captures(file_name)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let date = chrono::NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(date.format("%Y-%m").to_string())
}
