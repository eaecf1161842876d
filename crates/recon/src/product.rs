use crate::config::ProductRules;
use crate::model::Category;

/// Map a raw product name to its category.
///
/// Rules apply in order: license (exact), shop (prefix), cookie banner (exact),
/// everything else is an app. Comparison ignores case and surrounding whitespace.
pub fn classify_product(name: &str, rules: &ProductRules) -> Category {
    let name = name.trim().to_lowercase();

    if rules.license.iter().any(|l| l.trim().to_lowercase() == name) {
        return Category::License;
    }
    if rules
        .shop_prefixes
        .iter()
        .any(|p| name.starts_with(&p.trim().to_lowercase()))
    {
        return Category::Shop;
    }
    if rules
        .cookie_banner
        .iter()
        .any(|c| c.trim().to_lowercase() == name)
    {
        return Category::CookieBanner;
    }
    Category::App
}
