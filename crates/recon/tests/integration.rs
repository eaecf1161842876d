use std::path::PathBuf;

use billcheck_recon::config::ReconConfig;
use billcheck_recon::engine::run;
use billcheck_recon::model::{
    Category, CategoryCounts, Diagnostic, ReconInput, ReconResult, RecordKind, SourceFile, Verdict,
};
use billcheck_recon::report::{review_csv_string, write_diagnostics_csv};
use billcheck_recon::ReconError;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> SourceFile {
    let path = fixtures_dir().join(name);
    let bytes = std::fs::read(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    SourceFile::new(name, bytes)
}

fn run_files(config: &ReconConfig, billing: &str, crm: &str) -> Result<ReconResult, ReconError> {
    let input = ReconInput {
        billing: fixture(billing),
        crm: fixture(crm),
    };
    run(config, &input)
}

fn run_inline(billing: &str, crm: &str) -> ReconResult {
    let input = ReconInput {
        billing: SourceFile::new("billing.csv", billing.as_bytes()),
        crm: SourceFile::new("Projekte_test.csv", crm.as_bytes()),
    };
    run(&ReconConfig::default(), &input).unwrap()
}

fn verdict_by_line(result: &ReconResult) -> Vec<(usize, Verdict)> {
    result.results.iter().map(|r| (r.line, r.verdict)).collect()
}

const MAIN_BILLING: &str = "acme_2024_05_invoice.csv";
const MAIN_CRM: &str = "Projekte_2024_05.csv";

// -------------------------------------------------------------------------
// Scenarios
// -------------------------------------------------------------------------

const BILLING_HEADER: &str = "Site Alias,Charge Frequency,Should Charge,Parent Site\n";
const CRM_HEADER: &str = "Duda-Site-ID;Workflow-Status\n";

#[test]
fn scenario_a_online_license_is_ok() {
    let result = run_inline(
        &format!("{BILLING_HEADER}abc123,DudaOne Monthly,1,\n"),
        &format!("{CRM_HEADER}abc123;Website online\n"),
    );
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].verdict, Verdict::Ok);
    assert!(result.report.rows.is_empty());
}

#[test]
fn scenario_b_status_mismatch() {
    let result = run_inline(
        &format!("{BILLING_HEADER}abc123,DudaOne Monthly,1,\n"),
        &format!("{CRM_HEADER}abc123;In Bearbeitung\n"),
    );
    let r = &result.results[0];
    assert_eq!(r.verdict, Verdict::ReviewRequired);
    assert!(r.reason.contains("status mismatch"));
    assert_eq!(r.crm_status.as_deref(), Some("In Bearbeitung"));
}

#[test]
fn scenario_c_billed_but_missing() {
    let result = run_inline(
        &format!("{BILLING_HEADER}xyz999,ecom-premium,1,\n"),
        &format!("{CRM_HEADER}abc123;Website online\n"),
    );
    let r = &result.results[0];
    assert_eq!(r.category, Category::Shop);
    assert_eq!(r.verdict, Verdict::ReviewRequired);
    assert_eq!(r.reason, "billed but not found in CRM");
    assert_eq!(r.crm_status, None);
}

#[test]
fn scenario_d_app_on_online_parent() {
    let result = run_inline(
        &format!("{BILLING_HEADER}app1,AudioEye,1,abc123\n"),
        &format!("{CRM_HEADER}abc123;Website online\n"),
    );
    assert_eq!(result.results[0].category, Category::App);
    assert_eq!(result.results[0].verdict, Verdict::Ok);
}

#[test]
fn scenario_e_app_on_archived_parent() {
    let result = run_inline(
        &format!("{BILLING_HEADER}app1,AudioEye,1,abc123\n"),
        &format!("{CRM_HEADER}abc123;Archiviert\n"),
    );
    let r = &result.results[0];
    assert_eq!(r.verdict, Verdict::ReviewRequired);
    assert_eq!(r.reason, "app billed but parent site is not Website online");
}

#[test]
fn scenario_f_duplicate_crm_rows_warn_without_abort() {
    let result = run_inline(
        &format!("{BILLING_HEADER}abc123,DudaOne Monthly,1,\n"),
        &format!("{CRM_HEADER}abc123;Website online\nabc123;Archiviert\n"),
    );
    assert_eq!(result.results.len(), 1);
    assert_eq!(
        result.report.diagnostics,
        vec![Diagnostic::DuplicateKeyWarning {
            site_id: "abc123".into(),
            lines: vec![2, 3],
            statuses: vec!["Website online".into(), "Archiviert".into()],
        }]
    );
    // last seen wins
    assert_eq!(result.results[0].crm_status.as_deref(), Some("Archiviert"));
}

// -------------------------------------------------------------------------
// Full invoice
// -------------------------------------------------------------------------

#[test]
fn full_invoice_verdicts() {
    let result = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();

    use Verdict::{Ok as OK, ReviewRequired as RR};
    assert_eq!(
        verdict_by_line(&result),
        vec![
            (2, OK),  // license, online
            (3, OK),  // app on online parent
            (4, OK),  // license, terminated but billable
            (5, RR),  // app on terminated parent
            (6, RR),  // shop, in progress
            (7, RR),  // shop, not in CRM
            (8, OK),  // site-level cookie banner
            (9, RR),  // add-on cookie banner, parent in progress
            (10, OK), // not billed
            (11, OK), // repaired ID
            (12, OK), // app under repaired ID
            (13, RR), // malformed flag
            (14, OK), // landing-page ID
            (15, RR), // duplicate CRM rows, last is archived
        ]
    );

    let reasons: Vec<&str> = result.report.rows.iter().map(|r| r.reason.as_str()).collect();
    assert_eq!(
        reasons,
        vec![
            "app billed but parent site is not Website online",
            "status mismatch: billed but CRM status is In Bearbeitung",
            "billed but not found in CRM",
            "app billed but parent site is not Website online",
            "malformed record: should-charge flag 'ja' is not 0/1",
            "status mismatch: billed but CRM status is Archiviert",
        ]
    );
}

#[test]
fn full_invoice_summary() {
    let result = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();
    let s = &result.report.summary;

    assert_eq!(s.total_lines, 14);
    assert_eq!(s.billed_lines, 12);
    assert_eq!(s.ok, 8);
    assert_eq!(s.review_required, 6);
    assert_eq!(s.issue_rate_percent, 42.9);
    assert_eq!(s.verdict_counts[&Verdict::ReviewRequired], 6);
    assert_eq!(
        s.categories[&Category::License],
        CategoryCounts { total: 7, ok: 5, review_required: 2 }
    );
    assert_eq!(
        s.categories[&Category::Shop],
        CategoryCounts { total: 2, ok: 0, review_required: 2 }
    );
    assert_eq!(
        s.categories[&Category::CookieBanner],
        CategoryCounts { total: 2, ok: 1, review_required: 1 }
    );
    assert_eq!(
        s.categories[&Category::App],
        CategoryCounts { total: 3, ok: 2, review_required: 1 }
    );
}

#[test]
fn full_invoice_diagnostics() {
    let result = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();
    let diags = &result.report.diagnostics;

    let kinds: Vec<&str> = diags.iter().map(|d| d.kind()).collect();
    assert_eq!(
        kinds,
        vec!["site_id_repaired", "malformed_row_warning", "duplicate_key_warning"]
    );
    assert_eq!(
        diags[0],
        Diagnostic::SiteIdRepaired {
            lines: vec![11, 12],
            from: "6.12E+20".into(),
            to: "612e20a".into(),
            domain: "gasthof-post.at".into(),
        }
    );
    assert_eq!(diags[1].source(), RecordKind::Billing);
    assert_eq!(diags[1].lines(), vec![13]);
    assert_eq!(diags[2].lines(), vec![7, 9]);
    assert_eq!(result.report.summary.diagnostics, 3);
}

#[test]
fn full_invoice_carries_crm_context() {
    let result = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();

    let landing = result.results.iter().find(|r| r.line == 14).unwrap();
    assert_eq!(landing.project_name.as_deref(), Some("Gasthof Post (Landingpage)"));

    let repaired = result.results.iter().find(|r| r.line == 12).unwrap();
    assert_eq!(repaired.site_id, "612e20a");
    assert_eq!(repaired.site_url.as_deref(), Some("www.gasthof-post.at"));

    assert_eq!(result.meta.invoice_period.as_deref(), Some("2024-05"));
    assert_eq!(result.meta.billing_file, MAIN_BILLING);
    assert_eq!(result.meta.crm_file, MAIN_CRM);
}

#[test]
fn one_result_per_billing_line() {
    let result = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();
    let data_lines = std::fs::read_to_string(fixtures_dir().join(MAIN_BILLING))
        .unwrap()
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .count();
    assert_eq!(result.results.len(), data_lines);
}

// -------------------------------------------------------------------------
// Config
// -------------------------------------------------------------------------

#[test]
fn strict_status_policy_flags_terminated_sites() {
    let toml = std::fs::read_to_string(fixtures_dir().join("strict.toml")).unwrap();
    let config = ReconConfig::from_toml(&toml).unwrap();
    let result = run_files(&config, MAIN_BILLING, MAIN_CRM).unwrap();

    assert_eq!(result.meta.config_name, "strict-termination");
    let line4 = result.results.iter().find(|r| r.line == 4).unwrap();
    assert_eq!(line4.verdict, Verdict::ReviewRequired);
    assert_eq!(result.report.summary.review_required, 7);
}

// -------------------------------------------------------------------------
// Encodings + Schema
// -------------------------------------------------------------------------

#[test]
fn windows_1252_crm_export() {
    let utf8 = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();
    let cp1252 = run_files(&ReconConfig::default(), MAIN_BILLING, "Projekte_2024_05_cp1252.csv").unwrap();

    assert_eq!(cp1252.meta.crm_encoding, "windows-1252");
    assert_eq!(verdict_by_line(&cp1252), verdict_by_line(&utf8));
    let line4 = cp1252.results.iter().find(|r| r.line == 4).unwrap();
    assert_eq!(line4.crm_status.as_deref(), Some("Website online (gekündigt)"));
}

#[test]
fn large_windows_1252_export_keeps_umlauts() {
    // One umlaut in ~3000 characters: few enough to pass as damaged UTF-8.
    let input = ReconInput {
        billing: SourceFile::new("acme_2024_06_invoice.csv", "Site Alias,Charge Frequency,Should Charge\ndef456,DudaOne Monthly,1\n".as_bytes()),
        crm: fixture("Projekte_2024_06_cp1252.csv"),
    };
    let result = run(&ReconConfig::default(), &input).unwrap();

    assert_eq!(result.meta.crm_encoding, "windows-1252");
    let line = &result.results[0];
    assert_eq!(line.crm_status.as_deref(), Some("Website online (gekündigt)"));
    assert_eq!(line.verdict, Verdict::Ok);
    assert!(result.report.rows.is_empty());
}

#[test]
fn utf16_billing_export() {
    let utf8 = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();
    let utf16 = run_files(&ReconConfig::default(), "acme_2024_05_invoice_utf16.csv", MAIN_CRM).unwrap();

    assert_eq!(utf16.meta.billing_encoding, "UTF-16LE");
    assert_eq!(utf16.meta.invoice_period.as_deref(), Some("2024-05"));
    assert_eq!(verdict_by_line(&utf16), verdict_by_line(&utf8));
}

#[test]
fn missing_flag_column_aborts_with_schema_error() {
    let err = run_files(&ReconConfig::default(), "billing_without_flag.csv", MAIN_CRM).unwrap_err();
    match &err {
        ReconError::Schema { source_name, kind, .. } => {
            assert_eq!(source_name, "billing_without_flag.csv");
            assert_eq!(*kind, RecordKind::Billing);
        }
        other => panic!("expected schema error, got {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("should_charge"));
    assert!(msg.contains("Charge Frequency"));
}

#[test]
fn binary_crm_aborts_with_encoding_error() {
    let input = ReconInput {
        billing: fixture(MAIN_BILLING),
        crm: SourceFile::new("Projekte.xlsx", (0u8..=255).cycle().take(2048).collect::<Vec<u8>>()),
    };
    let err = run(&ReconConfig::default(), &input).unwrap_err();
    assert!(matches!(err, ReconError::Encoding { ref source_name, .. } if source_name == "Projekte.xlsx"));
}

// -------------------------------------------------------------------------
// Determinism
// -------------------------------------------------------------------------

#[test]
fn identical_inputs_give_identical_output() {
    let a = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();
    let b = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();

    assert_eq!(
        serde_json::to_string_pretty(&a).unwrap(),
        serde_json::to_string_pretty(&b).unwrap()
    );
    assert_eq!(
        review_csv_string(&a.report.rows).unwrap(),
        review_csv_string(&b.report.rows).unwrap()
    );

    let mut da = Vec::new();
    let mut db = Vec::new();
    write_diagnostics_csv(&a.report.diagnostics, &mut da).unwrap();
    write_diagnostics_csv(&b.report.diagnostics, &mut db).unwrap();
    assert_eq!(da, db);
}

#[test]
fn json_contract() {
    let result = run_files(&ReconConfig::default(), MAIN_BILLING, MAIN_CRM).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert!(json.get("meta").is_some());
    assert!(json.get("summary").is_some());
    assert!(json.get("results").is_none());
    assert_eq!(json["rows"].as_array().unwrap().len(), 6);
    assert_eq!(json["rows"][0]["verdict"], "review_required");
    assert_eq!(json["rows"][0]["category"], "App");
    assert_eq!(json["diagnostics"][2]["kind"], "duplicate_key_warning");
    assert_eq!(json["summary"]["categories"]["License"]["total"], 7);
    assert!(json["meta"].get("run_at").is_none());
}
