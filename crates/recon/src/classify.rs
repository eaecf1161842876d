use crate::config::StatusPolicy;
use crate::matcher::MatchedPair;
use crate::model::{CrmRecord, MatchBasis, ReconciliationResult, Verdict};

/// Classify one billing line against its CRM record.
///
/// Site-level lines (license, shop, site-level cookie banner) are checked
/// against their own site and accept every `site_ok` status. Add-ons are
/// checked against their parent site and accept only `app_ok`. Anything not
/// explicitly justified is `ReviewRequired`. Lines not billed this period
/// have nothing to verify.
pub fn classify_pair(pair: &MatchedPair<'_>, policy: &StatusPolicy) -> ReconciliationResult {
    let billing = pair.billing;
    let basis = billing.basis();

    let (verdict, reason) = match billing.defect() {
        Some(defect) => (Verdict::ReviewRequired, format!("malformed record: {defect}")),
        None if billing.should_charge != Some(true) => (Verdict::Ok, "not billed".into()),
        None => match basis {
            MatchBasis::Own => site_rule(pair.crm, policy),
            MatchBasis::Parent => addon_rule(pair.crm, policy),
        },
    };

    ReconciliationResult {
        line: billing.line,
        site_id: billing.site_id.raw.clone(),
        parent_site: billing.parent_site.as_ref().map(|p| p.raw.clone()),
        product_name: billing.product_name.clone(),
        category: billing.category,
        should_charge: billing.should_charge,
        crm_status: pair.crm.map(|c| c.workflow_status.clone()),
        project_name: pair.crm.and_then(|c| c.project_name.clone()),
        site_url: billing.site_url.clone(),
        basis,
        verdict,
        reason,
    }
}

pub fn classify_all(pairs: &[MatchedPair<'_>], policy: &StatusPolicy) -> Vec<ReconciliationResult> {
    pairs.iter().map(|p| classify_pair(p, policy)).collect()
}

fn site_rule(crm: Option<&CrmRecord>, policy: &StatusPolicy) -> (Verdict, String) {
    match crm {
        Some(c) if policy.site_accepts(&c.workflow_status) => (
            Verdict::Ok,
            format!("status accepted: {}", c.workflow_status),
        ),
        Some(c) => (
            Verdict::ReviewRequired,
            format!(
                "status mismatch: billed but CRM status is {}",
                display_status(&c.workflow_status)
            ),
        ),
        None => (Verdict::ReviewRequired, "billed but not found in CRM".into()),
    }
}

fn addon_rule(parent: Option<&CrmRecord>, policy: &StatusPolicy) -> (Verdict, String) {
    match parent {
        Some(c) if policy.app_accepts(&c.workflow_status) => {
            (Verdict::Ok, "parent site online".into())
        }
        _ => (
            Verdict::ReviewRequired,
            "app billed but parent site is not Website online".into(),
        ),
    }
}

fn display_status(status: &str) -> &str {
    if status.trim().is_empty() {
        "(empty)"
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BillingRecord, Category, IdSource, SiteId};
    use proptest::prelude::*;

    fn bill(site: &str, parent: Option<&str>, category: Category, charge: Option<bool>) -> BillingRecord {
        BillingRecord {
            line: 2,
            site_id: SiteId::new(site),
            parent_site: parent.map(SiteId::new),
            product_name: "p".into(),
            should_charge: charge,
            charge_flag_raw: match charge {
                Some(true) => "1".into(),
                Some(false) => "0".into(),
                None => "x".into(),
            },
            site_url: None,
            category,
        }
    }

    fn crm(site: &str, status: &str) -> CrmRecord {
        CrmRecord {
            line: 2,
            site_id: SiteId::new(site),
            workflow_status: status.into(),
            project_name: Some("Projekt".into()),
            domain: None,
            id_source: IdSource::Primary,
        }
    }

    fn run(billing: &BillingRecord, crm: Option<&CrmRecord>) -> ReconciliationResult {
        classify_pair(&MatchedPair { billing, crm }, &StatusPolicy::default())
    }

    #[test]
    fn site_online_is_ok() {
        let b = bill("abc123", None, Category::License, Some(true));
        let c = crm("abc123", "Website online");
        let r = run(&b, Some(&c));
        assert_eq!(r.verdict, Verdict::Ok);
        assert_eq!(r.crm_status.as_deref(), Some("Website online"));
        assert_eq!(r.project_name.as_deref(), Some("Projekt"));
    }

    #[test]
    fn terminated_site_still_ok_for_site_products() {
        for category in [Category::License, Category::Shop, Category::CookieBanner] {
            let b = bill("abc123", None, category, Some(true));
            let c = crm("abc123", "Website online (gekündigt)");
            assert_eq!(run(&b, Some(&c)).verdict, Verdict::Ok, "{category}");
        }
    }

    #[test]
    fn status_mismatch() {
        let b = bill("abc123", None, Category::License, Some(true));
        let c = crm("abc123", "In Bearbeitung");
        let r = run(&b, Some(&c));
        assert_eq!(r.verdict, Verdict::ReviewRequired);
        assert_eq!(r.reason, "status mismatch: billed but CRM status is In Bearbeitung");
    }

    #[test]
    fn empty_status_is_named() {
        let b = bill("abc123", None, Category::Shop, Some(true));
        let c = crm("abc123", "");
        assert!(run(&b, Some(&c)).reason.ends_with("(empty)"));
    }

    #[test]
    fn billed_but_missing() {
        let b = bill("xyz999", None, Category::Shop, Some(true));
        let r = run(&b, None);
        assert_eq!(r.verdict, Verdict::ReviewRequired);
        assert_eq!(r.reason, "billed but not found in CRM");
        assert_eq!(r.crm_status, None);
    }

    #[test]
    fn not_billed_site_is_ok() {
        let b = bill("xyz999", None, Category::License, Some(false));
        let r = run(&b, None);
        assert_eq!(r.verdict, Verdict::Ok);
        assert_eq!(r.reason, "not billed");
    }

    #[test]
    fn app_rules() {
        let b = bill("app1", Some("abc123"), Category::App, Some(true));
        let online = crm("abc123", "Website online");
        let terminated = crm("abc123", "Website online (gekündigt)");
        let archived = crm("abc123", "Archiviert");

        assert_eq!(run(&b, Some(&online)).verdict, Verdict::Ok);
        assert_eq!(run(&b, Some(&online)).basis, MatchBasis::Parent);
        assert_eq!(run(&b, Some(&terminated)).verdict, Verdict::ReviewRequired);
        let r = run(&b, Some(&archived));
        assert_eq!(r.verdict, Verdict::ReviewRequired);
        assert_eq!(r.reason, "app billed but parent site is not Website online");
        assert_eq!(run(&b, None).verdict, Verdict::ReviewRequired);
    }

    #[test]
    fn not_billed_app_is_ok_even_on_archived_parent() {
        let b = bill("app1", Some("abc123"), Category::App, Some(false));
        let archived = crm("abc123", "Archiviert");
        let r = run(&b, Some(&archived));
        assert_eq!(r.verdict, Verdict::Ok);
        assert_eq!(r.reason, "not billed");
        assert_eq!(r.basis, MatchBasis::Parent);
        assert_eq!(run(&b, None).verdict, Verdict::Ok);
    }

    #[test]
    fn addon_cookie_banner_uses_app_rules() {
        let b = bill("ccb1", Some("abc123"), Category::CookieBanner, Some(true));
        let terminated = crm("abc123", "Website online (gekündigt)");
        assert_eq!(run(&b, Some(&terminated)).verdict, Verdict::ReviewRequired);
    }

    #[test]
    fn malformed_row_is_flagged_not_dropped() {
        let b = bill("abc123", None, Category::License, None);
        let c = crm("abc123", "Website online");
        let r = run(&b, Some(&c));
        assert_eq!(r.verdict, Verdict::ReviewRequired);
        assert!(r.reason.starts_with("malformed record: "));
    }

    #[test]
    fn custom_policy() {
        let policy = StatusPolicy {
            site_ok: vec!["Live".into()],
            app_ok: vec!["Live".into()],
        };
        let b = bill("abc123", None, Category::License, Some(true));
        let c = crm("abc123", "live");
        let r = classify_pair(&MatchedPair { billing: &b, crm: Some(&c) }, &policy);
        assert_eq!(r.verdict, Verdict::Ok);
    }

    fn category() -> impl Strategy<Value = Category> {
        prop::sample::select(Category::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn ok_only_for_allow_listed_status(status in ".{0,30}", cat in category(), has_parent in any::<bool>()) {
            let policy = StatusPolicy::default();
            let parent = has_parent.then_some("parent1");
            let b = bill("site1", parent, cat, Some(true));
            let c = crm("parent1", &status);
            let r = classify_pair(&MatchedPair { billing: &b, crm: Some(&c) }, &policy);
            if r.verdict == Verdict::Ok {
                let accepted = match b.basis() {
                    MatchBasis::Own => policy.site_accepts(&status),
                    MatchBasis::Parent => policy.app_accepts(&status),
                };
                prop_assert!(accepted);
            }
        }

        #[test]
        fn leaving_website_online_never_upgrades(status in ".{0,30}", cat in category()) {
            let b = bill("site1", Some("parent1"), cat, Some(true));
            let before = run(&b, Some(&crm("site1", "Website online")));
            let before_parent = run(&b, Some(&crm("parent1", "Website online")));
            let after = run(&b, Some(&crm("site1", &status)));
            let after_parent = run(&b, Some(&crm("parent1", &status)));
            if before.verdict == Verdict::ReviewRequired {
                prop_assert_eq!(after.verdict, Verdict::ReviewRequired);
            }
            if before_parent.verdict == Verdict::ReviewRequired {
                prop_assert_eq!(after_parent.verdict, Verdict::ReviewRequired);
            }
        }
    }
}
