use std::collections::BTreeMap;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Which of the two input files a record or diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Billing,
    Crm,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Billing => write!(f, "billing"),
            Self::Crm => write!(f, "crm"),
        }
    }
}

/// One raw input file as handed over by the caller.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// The two files of one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconInput {
    pub billing: SourceFile,
    pub crm: SourceFile,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A site identifier as written in the file, plus its normalized join key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteId {
    pub raw: String,
    pub key: String,
}

impl SiteId {
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let key = normalize_site_id(&raw);
        Self { raw, key }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

/// Canonical comparable form of a site identifier: lowercase, with whitespace
/// and the separator variants seen in exports (`-`, `_`, `.`, `/`) removed.
pub fn normalize_site_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '_' | '.' | '/'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Category {
    License,
    Shop,
    CookieBanner,
    App,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::License,
        Category::Shop,
        Category::CookieBanner,
        Category::App,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::License => write!(f, "License"),
            Self::Shop => write!(f, "Shop"),
            Self::CookieBanner => write!(f, "CookieBanner"),
            Self::App => write!(f, "App"),
        }
    }
}

/// Whose CRM record a billing line is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    /// Site-level product: the line's own site.
    Own,
    /// Add-on: the parent site the line is billed against.
    Parent,
}

/// One billed line item.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingRecord {
    /// 1-based line in the source file.
    pub line: usize,
    pub site_id: SiteId,
    pub parent_site: Option<SiteId>,
    pub product_name: String,
    /// `None` when the source flag was neither 0 nor 1.
    pub should_charge: Option<bool>,
    pub charge_flag_raw: String,
    pub site_url: Option<String>,
    pub category: Category,
}

impl BillingRecord {
    /// Apps always resolve against their parent site. A cookie banner is an
    /// add-on only when it names a parent distinct from its own site;
    /// otherwise it is the site-level CCB line.
    pub fn basis(&self) -> MatchBasis {
        match self.category {
            Category::App => MatchBasis::Parent,
            Category::CookieBanner => match &self.parent_site {
                Some(parent) if !parent.is_empty() && parent.key != self.site_id.key => {
                    MatchBasis::Parent
                }
                _ => MatchBasis::Own,
            },
            Category::License | Category::Shop => MatchBasis::Own,
        }
    }

    /// The site identity used for the CRM lookup. Apps without an explicit
    /// parent column are billed under the parent's alias, so their own ID is
    /// the parent ID.
    pub fn lookup_id(&self) -> &SiteId {
        match self.basis() {
            MatchBasis::Own => &self.site_id,
            MatchBasis::Parent => self
                .parent_site
                .as_ref()
                .filter(|p| !p.is_empty())
                .unwrap_or(&self.site_id),
        }
    }

    /// Why this record cannot be evaluated, if it cannot.
    pub fn defect(&self) -> Option<String> {
        if self.site_id.is_empty() {
            return Some("site ID is empty".into());
        }
        if self.should_charge.is_none() {
            return Some(format!(
                "should-charge flag '{}' is not 0/1",
                self.charge_flag_raw
            ));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    Primary,
    LandingPage,
}

/// One CRM project row (or its landing-page twin).
#[derive(Debug, Clone, PartialEq)]
pub struct CrmRecord {
    pub line: usize,
    pub site_id: SiteId,
    pub workflow_status: String,
    pub project_name: Option<String>,
    pub domain: Option<String>,
    pub id_source: IdSource,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Ok,
    ReviewRequired,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::ReviewRequired => write!(f, "ReviewRequired"),
        }
    }
}

/// Rule Engine output for one billing line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub line: usize,
    pub site_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_site: Option<String>,
    pub product_name: String,
    pub category: Category,
    pub should_charge: Option<bool>,
    pub crm_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    pub basis: MatchBasis,
    pub verdict: Verdict,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Non-fatal findings that accompany a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Several CRM rows share one site identity; the last one seen is used.
    DuplicateKeyWarning {
        site_id: String,
        lines: Vec<usize>,
        statuses: Vec<String>,
    },
    /// A row could not be read as a well-formed record.
    MalformedRowWarning {
        source: RecordKind,
        line: usize,
        site_id: String,
        detail: String,
    },
    /// A spreadsheet-mangled billing ID was restored through the CRM domain.
    SiteIdRepaired {
        lines: Vec<usize>,
        from: String,
        to: String,
        domain: String,
    },
    /// A spreadsheet-mangled billing ID could not be restored.
    SiteIdUnrepaired {
        lines: Vec<usize>,
        site_id: String,
        detail: String,
    },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateKeyWarning { .. } => "duplicate_key_warning",
            Self::MalformedRowWarning { .. } => "malformed_row_warning",
            Self::SiteIdRepaired { .. } => "site_id_repaired",
            Self::SiteIdUnrepaired { .. } => "site_id_unrepaired",
        }
    }

    pub fn source(&self) -> RecordKind {
        match self {
            Self::DuplicateKeyWarning { .. } => RecordKind::Crm,
            Self::MalformedRowWarning { source, .. } => *source,
            Self::SiteIdRepaired { .. } | Self::SiteIdUnrepaired { .. } => RecordKind::Billing,
        }
    }

    pub fn lines(&self) -> Vec<usize> {
        match self {
            Self::DuplicateKeyWarning { lines, .. }
            | Self::SiteIdRepaired { lines, .. }
            | Self::SiteIdUnrepaired { lines, .. } => lines.clone(),
            Self::MalformedRowWarning { line, .. } => vec![*line],
        }
    }

    pub fn site_id(&self) -> &str {
        match self {
            Self::DuplicateKeyWarning { site_id, .. }
            | Self::MalformedRowWarning { site_id, .. }
            | Self::SiteIdUnrepaired { site_id, .. } => site_id,
            Self::SiteIdRepaired { from, .. } => from,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::DuplicateKeyWarning { statuses, .. } => format!(
                "{} CRM rows share this site ID (statuses: {}); last one used",
                statuses.len(),
                statuses.join(" | ")
            ),
            Self::MalformedRowWarning { detail, .. } | Self::SiteIdUnrepaired { detail, .. } => {
                detail.clone()
            }
            Self::SiteIdRepaired { to, domain, .. } => {
                format!("repaired to '{to}' via domain {domain}")
            }
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<String> = self.lines().iter().map(|l| l.to_string()).collect();
        write!(
            f,
            "{} [{} line {}] {}: {}",
            self.kind(),
            self.source(),
            lines.join(","),
            self.site_id(),
            self.detail()
        )
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub total: usize,
    pub ok: usize,
    pub review_required: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconSummary {
    pub total_lines: usize,
    pub billed_lines: usize,
    pub ok: usize,
    pub review_required: usize,
    /// Share of review rows among all lines, one decimal.
    pub issue_rate_percent: f64,
    pub verdict_counts: BTreeMap<Verdict, usize>,
    pub categories: BTreeMap<Category, CategoryCounts>,
    pub diagnostics: usize,
}

/// The exportable artifact: summary, review-only rows, diagnostics block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub summary: ReconSummary,
    pub rows: Vec<ReconciliationResult>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub billing_file: String,
    pub crm_file: String,
    pub billing_encoding: String,
    pub crm_encoding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    #[serde(flatten)]
    pub report: Report,
    /// Every verdict, OK rows included. Not part of the exported artifact.
    #[serde(skip)]
    pub results: Vec<ReconciliationResult>,
}
