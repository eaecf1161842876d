use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Run configuration. Every section is optional; the defaults encode the
/// reconciliation policy for the monthly vendor invoice.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub statuses: StatusPolicy,
    #[serde(default)]
    pub products: ProductRules,
    #[serde(default)]
    pub billing: BillingSection,
    #[serde(default)]
    pub crm: CrmSection,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub repair: RepairConfig,
}

fn default_name() -> String {
    "monthly-billing".into()
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            statuses: StatusPolicy::default(),
            products: ProductRules::default(),
            billing: BillingSection::default(),
            crm: CrmSection::default(),
            input: InputConfig::default(),
            repair: RepairConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Status policy
// ---------------------------------------------------------------------------

/// Workflow statuses that justify a charge.
///
/// `site_ok` applies to site-level lines (license, shop, site-level cookie
/// banner) and includes the terminated-but-still-billable variants.
/// `app_ok` applies to add-ons checked against their parent site.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StatusPolicy {
    #[serde(default = "default_site_ok")]
    pub site_ok: Vec<String>,
    #[serde(default = "default_app_ok")]
    pub app_ok: Vec<String>,
}

fn default_site_ok() -> Vec<String> {
    vec!["Website online".into(), "Website online (gekündigt)".into()]
}

fn default_app_ok() -> Vec<String> {
    vec!["Website online".into()]
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            site_ok: default_site_ok(),
            app_ok: default_app_ok(),
        }
    }
}

impl StatusPolicy {
    pub fn site_accepts(&self, status: &str) -> bool {
        contains_status(&self.site_ok, status)
    }

    pub fn app_accepts(&self, status: &str) -> bool {
        contains_status(&self.app_ok, status)
    }
}

/// Case-insensitive, whitespace-collapsed exact membership.
fn contains_status(list: &[String], status: &str) -> bool {
    let wanted = canonical_status(status);
    list.iter().any(|s| canonical_status(s) == wanted)
}

pub fn canonical_status(status: &str) -> String {
    status
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Product rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProductRules {
    /// Exact names (case-insensitive) of the site license product.
    #[serde(default = "default_license")]
    pub license: Vec<String>,
    /// Name prefixes (case-insensitive) of shop products.
    #[serde(default = "default_shop_prefixes")]
    pub shop_prefixes: Vec<String>,
    /// Exact names (case-insensitive) of the cookie-consent banner product.
    #[serde(default = "default_cookie_banner")]
    pub cookie_banner: Vec<String>,
}

fn default_license() -> Vec<String> {
    vec!["DudaOne Monthly".into()]
}

fn default_shop_prefixes() -> Vec<String> {
    vec!["ecom".into(), "store".into()]
}

fn default_cookie_banner() -> Vec<String> {
    vec!["Cookiebot Pro monthly".into()]
}

impl Default for ProductRules {
    fn default() -> Self {
        Self {
            license: default_license(),
            shop_prefixes: default_shop_prefixes(),
            cookie_banner: default_cookie_banner(),
        }
    }
}

// ---------------------------------------------------------------------------
// Column aliases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingSection {
    #[serde(default)]
    pub columns: BillingColumns,
}

/// Header aliases per logical billing column; the first alias present wins.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingColumns {
    #[serde(default = "default_billing_site_id")]
    pub site_id: Vec<String>,
    #[serde(default = "default_billing_product")]
    pub product: Vec<String>,
    #[serde(default = "default_billing_should_charge")]
    pub should_charge: Vec<String>,
    #[serde(default = "default_billing_parent_site")]
    pub parent_site: Vec<String>,
    #[serde(default = "default_billing_site_url")]
    pub site_url: Vec<String>,
}

fn default_billing_site_id() -> Vec<String> {
    vec!["Site Alias".into(), "Site ID".into(), "site_id".into()]
}

fn default_billing_product() -> Vec<String> {
    vec!["Charge Frequency".into(), "Product".into(), "product_name".into()]
}

fn default_billing_should_charge() -> Vec<String> {
    vec!["Should Charge".into(), "should_charge".into()]
}

fn default_billing_parent_site() -> Vec<String> {
    vec!["Parent Site Alias".into(), "Parent Site".into(), "parent_site".into()]
}

fn default_billing_site_url() -> Vec<String> {
    vec!["Site URL".into(), "site_url".into()]
}

impl Default for BillingColumns {
    fn default() -> Self {
        Self {
            site_id: default_billing_site_id(),
            product: default_billing_product(),
            should_charge: default_billing_should_charge(),
            parent_site: default_billing_parent_site(),
            site_url: default_billing_site_url(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CrmSection {
    #[serde(default)]
    pub columns: CrmColumns,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CrmColumns {
    #[serde(default = "default_crm_site_id")]
    pub site_id: Vec<String>,
    #[serde(default = "default_crm_landing_page_id")]
    pub landing_page_id: Vec<String>,
    #[serde(default = "default_crm_workflow_status")]
    pub workflow_status: Vec<String>,
    #[serde(default = "default_crm_project_name")]
    pub project_name: Vec<String>,
    #[serde(default = "default_crm_domain")]
    pub domain: Vec<String>,
}

fn default_crm_site_id() -> Vec<String> {
    vec!["Duda-Site-ID".into(), "Site-ID".into(), "site_id".into()]
}

fn default_crm_landing_page_id() -> Vec<String> {
    vec!["Site-ID-Duda".into()]
}

fn default_crm_workflow_status() -> Vec<String> {
    vec!["Workflow-Status".into(), "workflow_status".into()]
}

fn default_crm_project_name() -> Vec<String> {
    vec!["Projektname".into(), "Project".into(), "project_name".into()]
}

fn default_crm_domain() -> Vec<String> {
    vec!["Domain".into(), "domain".into()]
}

impl Default for CrmColumns {
    fn default() -> Self {
        Self {
            site_id: default_crm_site_id(),
            landing_page_id: default_crm_landing_page_id(),
            workflow_status: default_crm_workflow_status(),
            project_name: default_crm_project_name(),
            domain: default_crm_domain(),
        }
    }
}

// ---------------------------------------------------------------------------
// Input + Repair
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// Share of corrupted characters tolerated when decoding a file.
    #[serde(default = "default_max_corruption_ratio")]
    pub max_corruption_ratio: f64,
    /// Field delimiter of the billing file; sniffed when absent.
    #[serde(default)]
    pub billing_delimiter: Option<char>,
    /// Field delimiter of the CRM file; sniffed when absent.
    #[serde(default)]
    pub crm_delimiter: Option<char>,
}

fn default_max_corruption_ratio() -> f64 {
    0.001
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_corruption_ratio: default_max_corruption_ratio(),
            billing_delimiter: None,
            crm_delimiter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepairConfig {
    /// Restore billing IDs that a spreadsheet turned into scientific notation.
    #[serde(default = "default_true")]
    pub scientific_ids: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            scientific_ids: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ReconError> {
        toml::to_string_pretty(self).map_err(|e| ReconError::ConfigParse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.statuses.site_ok.is_empty() {
            return Err(ReconError::ConfigValidation(
                "statuses.site_ok must list at least one status".into(),
            ));
        }
        if self.statuses.app_ok.is_empty() {
            return Err(ReconError::ConfigValidation(
                "statuses.app_ok must list at least one status".into(),
            ));
        }

        let products = [
            ("products.license", &self.products.license),
            ("products.shop_prefixes", &self.products.shop_prefixes),
            ("products.cookie_banner", &self.products.cookie_banner),
        ];
        for (field, values) in products {
            if values.iter().any(|v| v.trim().is_empty()) {
                return Err(ReconError::ConfigValidation(format!(
                    "{field} must not contain blank entries"
                )));
            }
        }

        let required = [
            ("billing.columns.site_id", &self.billing.columns.site_id),
            ("billing.columns.product", &self.billing.columns.product),
            ("billing.columns.should_charge", &self.billing.columns.should_charge),
            ("crm.columns.site_id", &self.crm.columns.site_id),
            ("crm.columns.workflow_status", &self.crm.columns.workflow_status),
        ];
        for (field, aliases) in required {
            if aliases.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "{field} needs at least one header alias"
                )));
            }
        }

        let ratio = self.input.max_corruption_ratio;
        if !(0.0..1.0).contains(&ratio) {
            return Err(ReconError::ConfigValidation(format!(
                "input.max_corruption_ratio must be in [0, 1), got {ratio}"
            )));
        }

        for (field, delim) in [
            ("input.billing_delimiter", self.input.billing_delimiter),
            ("input.crm_delimiter", self.input.crm_delimiter),
        ] {
            if let Some(c) = delim {
                if !c.is_ascii() || c == '"' || c == '\n' || c == '\r' {
                    return Err(ReconError::ConfigValidation(format!(
                        "{field} must be a single ASCII character other than quote or newline"
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
