//! Report Builder: review table, diagnostics block and their CSV renderings.

use std::io::Write;

use crate::evidence::compute_summary;
use crate::model::{Diagnostic, ReconciliationResult, Report, Verdict};

pub const REVIEW_COLUMNS: [&str; 5] = ["site_id", "category", "should_charge", "crm_status", "reason"];
pub const DIAGNOSTIC_COLUMNS: [&str; 5] = ["kind", "source", "line", "site_id", "detail"];

/// Keep only the rows that need review, in billing order.
pub fn build_report(results: &[ReconciliationResult], diagnostics: Vec<Diagnostic>) -> Report {
    let summary = compute_summary(results, diagnostics.len());
    let rows = results
        .iter()
        .filter(|r| r.verdict == Verdict::ReviewRequired)
        .cloned()
        .collect();
    Report {
        summary,
        rows,
        diagnostics,
    }
}

pub fn write_review_csv<W: Write>(rows: &[ReconciliationResult], out: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(REVIEW_COLUMNS)?;
    for r in rows {
        let should_charge = match r.should_charge {
            Some(true) => "1",
            Some(false) => "0",
            None => "",
        };
        writer.write_record([
            r.site_id.as_str(),
            &r.category.to_string(),
            should_charge,
            r.crm_status.as_deref().unwrap_or(""),
            r.reason.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_diagnostics_csv<W: Write>(diagnostics: &[Diagnostic], out: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(DIAGNOSTIC_COLUMNS)?;
    for d in diagnostics {
        let lines: Vec<String> = d.lines().iter().map(|l| l.to_string()).collect();
        writer.write_record([
            d.kind(),
            &d.source().to_string(),
            &lines.join(";"),
            d.site_id(),
            &d.detail(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Review table as a string, for callers that do not stream to a file.
pub fn review_csv_string(rows: &[ReconciliationResult]) -> csv::Result<String> {
    let mut buf = Vec::new();
    write_review_csv(rows, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
