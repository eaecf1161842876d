use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::model::{BillingRecord, CrmRecord, Diagnostic, IdSource};

/// Lookup from normalized site identity to the CRM record that represents it.
#[derive(Debug, Default)]
pub struct CrmIndex<'a> {
    by_key: BTreeMap<&'a str, &'a CrmRecord>,
}

impl<'a> CrmIndex<'a> {
    pub fn get(&self, key: &str) -> Option<&'a CrmRecord> {
        self.by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// A billing line and the CRM record it is checked against, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair<'a> {
    pub billing: &'a BillingRecord,
    pub crm: Option<&'a CrmRecord>,
}

/// Build the CRM lookup. Later rows win over earlier rows with the same key;
/// every such collision is reported as a [`Diagnostic::DuplicateKeyWarning`],
/// ordered by the key's first appearance. A primary site ID always takes
/// precedence over a landing-page ID, silently.
pub fn build_index(crm: &[CrmRecord]) -> (CrmIndex<'_>, Vec<Diagnostic>) {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: BTreeMap<&str, Vec<&CrmRecord>> = BTreeMap::new();
    for rec in crm {
        let key = rec.site_id.key.as_str();
        let group = groups.entry(key).or_default();
        if group.is_empty() {
            order.push(key);
        }
        group.push(rec);
    }

    let mut index = CrmIndex::default();
    let mut diagnostics = Vec::new();

    for key in order {
        let group = &groups[key];
        let primaries: Vec<&CrmRecord> = group
            .iter()
            .copied()
            .filter(|r| r.id_source == IdSource::Primary)
            .collect();
        let candidates = if primaries.is_empty() {
            group.clone()
        } else {
            primaries
        };

        let Some(&winner) = candidates.last() else {
            continue;
        };
        if candidates.len() > 1 {
            let lines: Vec<usize> = candidates.iter().map(|r| r.line).collect();
            let statuses: Vec<String> = candidates
                .iter()
                .map(|r| r.workflow_status.clone())
                .collect();
            warn!(
                site_id = %winner.site_id.raw,
                ?lines,
                "duplicate site ID in CRM, using last row"
            );
            diagnostics.push(Diagnostic::DuplicateKeyWarning {
                site_id: winner.site_id.raw.clone(),
                lines,
                statuses,
            });
        }
        index.by_key.insert(key, winner);
    }

    debug!(keys = index.len(), "CRM index built");
    (index, diagnostics)
}

/// Pair every billing record with its CRM record, in billing order. Add-ons
/// are looked up through their parent site.
pub fn match_records<'a>(
    billing: &'a [BillingRecord],
    index: &CrmIndex<'a>,
) -> Vec<MatchedPair<'a>> {
    billing
        .iter()
        .map(|rec| {
            let key = &rec.lookup_id().key;
            let crm = if key.is_empty() { None } else { index.get(key) };
            MatchedPair { billing: rec, crm }
        })
        .collect()
}
