//! Restore billing site IDs that a spreadsheet round-trip turned into
//! scientific notation (`6.12E+20`), using the site URL and the CRM domain.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::model::{BillingRecord, CrmRecord, Diagnostic, IdSource, SiteId};

static SCIENTIFIC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)?[eE][+-]\d+$").expect("valid regex"));

pub fn is_scientific_id(raw: &str) -> bool {
    SCIENTIFIC_ID.is_match(raw.trim())
}

/// Host of a URL or bare domain, lowercased and without a leading `www.`.
pub fn extract_domain(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let with_scheme = if value.contains("://") {
        value.to_string()
    } else {
        format!("https://{value}")
    };
    let parsed = url::Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    (!host.is_empty()).then_some(host)
}

/// Rewrite every mangled site ID that maps to exactly one CRM project by domain.
///
/// Records sharing a mangled value are repaired together; the first URL among
/// them is used, so app lines without a URL borrow it from their license line.
pub fn repair_scientific_ids(records: &mut [BillingRecord], crm: &[CrmRecord]) -> Vec<Diagnostic> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    for (idx, rec) in records.iter().enumerate() {
        if is_scientific_id(&rec.site_id.raw) {
            let entry = groups.entry(rec.site_id.raw.clone()).or_default();
            if entry.is_empty() {
                order.push(rec.site_id.raw.clone());
            }
            entry.push(idx);
        }
    }
    if order.is_empty() {
        return Vec::new();
    }
    info!(ids = order.len(), "repairing site IDs in scientific notation");

    let mut by_domain: BTreeMap<String, Vec<&SiteId>> = BTreeMap::new();
    for rec in crm.iter().filter(|r| r.id_source == IdSource::Primary) {
        if let Some(domain) = rec.domain.as_deref().and_then(extract_domain) {
            let ids = by_domain.entry(domain).or_default();
            if !ids.iter().any(|id| id.key == rec.site_id.key) {
                ids.push(&rec.site_id);
            }
        }
    }

    let mut diagnostics = Vec::new();
    for raw in order {
        let members = &groups[&raw];
        let lines: Vec<usize> = members.iter().map(|&i| records[i].line).collect();
        let url = members
            .iter()
            .find_map(|&i| records[i].site_url.clone());

        let Some(url) = url else {
            warn!(site_id = %raw, "cannot repair site ID without a site URL");
            diagnostics.push(Diagnostic::SiteIdUnrepaired {
                lines,
                site_id: raw,
                detail: "no site URL to match against CRM domains".into(),
            });
            continue;
        };
        let Some(domain) = extract_domain(&url) else {
            warn!(site_id = %raw, %url, "site URL has no usable domain");
            diagnostics.push(Diagnostic::SiteIdUnrepaired {
                lines,
                site_id: raw,
                detail: format!("site URL '{url}' has no usable domain"),
            });
            continue;
        };

        match by_domain.get(&domain).map(Vec::as_slice) {
            Some([target]) => {
                let target = (*target).clone();
                for &i in members {
                    let rec = &mut records[i];
                    rec.site_id = target.clone();
                    if rec.site_url.is_none() {
                        rec.site_url = Some(url.clone());
                    }
                }
                for rec in records.iter_mut() {
                    if let Some(parent) = rec.parent_site.as_mut() {
                        if parent.raw == raw {
                            *parent = target.clone();
                        }
                    }
                }
                info!(from = %raw, to = %target.raw, %domain, "site ID repaired");
                diagnostics.push(Diagnostic::SiteIdRepaired {
                    lines,
                    from: raw,
                    to: target.raw,
                    domain,
                });
            }
            Some(ids) if ids.len() > 1 => {
                warn!(site_id = %raw, %domain, matches = ids.len(), "ambiguous domain");
                diagnostics.push(Diagnostic::SiteIdUnrepaired {
                    lines,
                    site_id: raw,
                    detail: format!("{} CRM projects share domain {domain}", ids.len()),
                });
            }
            _ => {
                warn!(site_id = %raw, %domain, "no CRM project for domain");
                diagnostics.push(Diagnostic::SiteIdUnrepaired {
                    lines,
                    site_id: raw,
                    detail: format!("no CRM project with domain {domain}"),
                });
            }
        }
    }
    diagnostics
}
