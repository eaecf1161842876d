//! Row Parser: raw export bytes → lazily produced, normalized records.

use std::io::Cursor;

use tracing::{debug, info};

use crate::config::{ProductRules, ReconConfig};
use crate::decode::decode_bytes;
use crate::error::ReconError;
use crate::model::{BillingRecord, CrmRecord, IdSource, RecordKind, SiteId};
use crate::product::classify_product;

/// A row the reader could not turn into a record at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub line: usize,
    pub detail: String,
}

impl RowIssue {
    fn from_csv(err: csv::Error) -> Self {
        Self {
            line: err.position().map(|p| p.line() as usize).unwrap_or(0),
            detail: err.to_string(),
        }
    }
}

/// How a file was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub source_name: String,
    pub encoding: &'static str,
    pub delimiter: u8,
    pub headers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Table opening
// ---------------------------------------------------------------------------

fn open_table(
    kind: RecordKind,
    source_name: &str,
    bytes: &[u8],
    delimiter: Option<char>,
    max_corruption_ratio: f64,
) -> Result<(csv::Reader<Cursor<String>>, TableInfo), ReconError> {
    let decoded = decode_bytes(source_name, bytes, max_corruption_ratio)?;
    let delimiter = match delimiter {
        Some(c) => c as u8,
        None => sniff_delimiter(&decoded.text),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(Cursor::new(decoded.text));

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::Csv {
            source_name: source_name.into(),
            message: e.to_string(),
        })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    info!(
        source = source_name,
        %kind,
        encoding = decoded.encoding,
        delimiter = %(delimiter as char).escape_default(),
        columns = headers.len(),
        "opened input"
    );

    let info = TableInfo {
        source_name: source_name.into(),
        encoding: decoded.encoding,
        delimiter,
        headers,
    };
    Ok((reader, info))
}

const SNIFF_CANDIDATES: [u8; 4] = [b'\t', b';', b',', b'|'];
const SNIFF_RECORDS: usize = 10;

/// Pick the delimiter whose first records agree best with the header width.
///
/// Each candidate parses the start of the file as CSV, so a quoted cell that
/// spans lines still counts as one record. Ties go to the earlier candidate;
/// `,` when nothing splits the header.
pub fn sniff_delimiter(content: &str) -> u8 {
    let mut best: Option<(usize, u8)> = None;
    for delim in SNIFF_CANDIDATES {
        let Some(score) = width_score(&field_counts(content, delim)) else {
            continue;
        };
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, delim));
        }
    }
    best.map_or(b',', |(_, delim)| delim)
}

fn field_counts(content: &str, delimiter: u8) -> Vec<usize> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
        .records()
        .map_while(Result::ok)
        .filter(|r| !is_blank(r))
        .take(SNIFF_RECORDS)
        .map(|r| r.len())
        .collect()
}

/// Header width times the number of records with that width. `None` when the
/// header does not split.
fn width_score(counts: &[usize]) -> Option<usize> {
    let (&header, _) = counts.split_first()?;
    (header > 1).then(|| header * counts.iter().filter(|&&c| c == header).count())
}

/// Header comparison form: lowercase without whitespace, `-` or `_`.
fn header_key(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn find_column(headers: &[String], aliases: &[String]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        let wanted = header_key(alias);
        headers.iter().position(|h| header_key(h) == wanted)
    })
}

fn require_column(
    info: &TableInfo,
    kind: RecordKind,
    logical: &str,
    aliases: &[String],
) -> Result<usize, ReconError> {
    find_column(&info.headers, aliases).ok_or_else(|| ReconError::Schema {
        source_name: info.source_name.clone(),
        kind,
        column: format!("{logical} ({})", aliases.join(" | ")),
        available: info.headers.clone(),
    })
}

fn cell(record: &csv::StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}

fn optional_cell(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.map(|i| cell(record, i))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn record_line(record: &csv::StringRecord) -> usize {
    record.position().map(|p| p.line() as usize).unwrap_or(0)
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

/// Canonical flag values are "1"/"0"; spreadsheet round-trips add the others.
pub fn parse_charge_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" => Some(true),
        "0" | "0.0" | "false" | "no" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct BillingIndices {
    site_id: usize,
    product: usize,
    should_charge: usize,
    parent_site: Option<usize>,
    site_url: Option<usize>,
}

/// Lazy, single-pass sequence of billing records.
pub struct BillingRows {
    info: TableInfo,
    records: csv::StringRecordsIntoIter<Cursor<String>>,
    cols: BillingIndices,
    rules: ProductRules,
}

pub fn read_billing(
    source_name: &str,
    bytes: &[u8],
    config: &ReconConfig,
) -> Result<BillingRows, ReconError> {
    let kind = RecordKind::Billing;
    let (reader, info) = open_table(
        kind,
        source_name,
        bytes,
        config.input.billing_delimiter,
        config.input.max_corruption_ratio,
    )?;

    let c = &config.billing.columns;
    let cols = BillingIndices {
        site_id: require_column(&info, kind, "site_id", &c.site_id)?,
        product: require_column(&info, kind, "product", &c.product)?,
        should_charge: require_column(&info, kind, "should_charge", &c.should_charge)?,
        parent_site: find_column(&info.headers, &c.parent_site),
        site_url: find_column(&info.headers, &c.site_url),
    };
    debug!(source = source_name, ?cols, "resolved billing columns");

    Ok(BillingRows {
        info,
        records: reader.into_records(),
        cols,
        rules: config.products.clone(),
    })
}

impl BillingRows {
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    fn build(&self, record: &csv::StringRecord) -> BillingRecord {
        let product_name = cell(record, self.cols.product).to_string();
        let charge_flag_raw = cell(record, self.cols.should_charge).to_string();
        BillingRecord {
            line: record_line(record),
            site_id: SiteId::new(cell(record, self.cols.site_id)),
            parent_site: optional_cell(record, self.cols.parent_site).map(|p| SiteId::new(&p)),
            should_charge: parse_charge_flag(&charge_flag_raw),
            charge_flag_raw,
            site_url: optional_cell(record, self.cols.site_url),
            category: classify_product(&product_name, &self.rules),
            product_name,
        }
    }
}

impl Iterator for BillingRows {
    type Item = Result<BillingRecord, RowIssue>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.records.next()? {
                Ok(record) if is_blank(&record) => continue,
                Ok(record) => return Some(Ok(self.build(&record))),
                Err(e) => return Some(Err(RowIssue::from_csv(e))),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CRM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct CrmIndices {
    site_id: usize,
    workflow_status: usize,
    landing_page_id: Option<usize>,
    project_name: Option<usize>,
    domain: Option<usize>,
}

/// Lazy, single-pass sequence of CRM records. A row carrying a landing-page ID
/// yields a second record for that ID.
pub struct CrmRows {
    info: TableInfo,
    records: csv::StringRecordsIntoIter<Cursor<String>>,
    cols: CrmIndices,
    pending: Option<CrmRecord>,
}

pub fn read_crm(
    source_name: &str,
    bytes: &[u8],
    config: &ReconConfig,
) -> Result<CrmRows, ReconError> {
    let kind = RecordKind::Crm;
    let (reader, info) = open_table(
        kind,
        source_name,
        bytes,
        config.input.crm_delimiter,
        config.input.max_corruption_ratio,
    )?;

    let c = &config.crm.columns;
    let cols = CrmIndices {
        site_id: require_column(&info, kind, "site_id", &c.site_id)?,
        workflow_status: require_column(&info, kind, "workflow_status", &c.workflow_status)?,
        landing_page_id: find_column(&info.headers, &c.landing_page_id),
        project_name: find_column(&info.headers, &c.project_name),
        domain: find_column(&info.headers, &c.domain),
    };
    debug!(source = source_name, ?cols, "resolved CRM columns");

    Ok(CrmRows {
        info,
        records: reader.into_records(),
        cols,
        pending: None,
    })
}

impl CrmRows {
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// Primary record and landing-page twin of one row, either may be absent.
    fn build(&self, record: &csv::StringRecord) -> (Option<CrmRecord>, Option<CrmRecord>) {
        let line = record_line(record);
        let site_id = SiteId::new(cell(record, self.cols.site_id));
        let workflow_status = cell(record, self.cols.workflow_status).to_string();
        let project_name = optional_cell(record, self.cols.project_name);
        let domain = optional_cell(record, self.cols.domain);

        let landing = optional_cell(record, self.cols.landing_page_id)
            .map(|id| SiteId::new(&id))
            .filter(|id| !id.is_empty() && id.key != site_id.key)
            .map(|id| CrmRecord {
                line,
                site_id: id,
                workflow_status: workflow_status.clone(),
                project_name: Some(match &project_name {
                    Some(name) => format!("{name} (Landingpage)"),
                    None => "Landingpage".into(),
                }),
                domain: domain.clone(),
                id_source: IdSource::LandingPage,
            });

        let primary = (!site_id.is_empty()).then(|| CrmRecord {
            line,
            site_id,
            workflow_status,
            project_name,
            domain,
            id_source: IdSource::Primary,
        });

        (primary, landing)
    }
}

impl Iterator for CrmRows {
    type Item = Result<CrmRecord, RowIssue>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(landing) = self.pending.take() {
            return Some(Ok(landing));
        }
        loop {
            let record = match self.records.next()? {
                Ok(record) if is_blank(&record) => continue,
                Ok(record) => record,
                Err(e) => return Some(Err(RowIssue::from_csv(e))),
            };
            match self.build(&record) {
                (Some(primary), landing) => {
                    self.pending = landing;
                    return Some(Ok(primary));
                }
                (None, Some(landing)) => return Some(Ok(landing)),
                (None, None) => {
                    debug!(
                        source = %self.info.source_name,
                        line = record_line(&record),
                        "skipping CRM row without site ID"
                    );
                }
            }
        }
    }
}
