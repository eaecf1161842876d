use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use billcheck_recon::model::ReconciliationResult;

const SITE_WIDTH: usize = 16;
const CATEGORY_WIDTH: usize = 12;
const STATUS_WIDTH: usize = 28;

/// Pad or truncate a string to exactly `width` display columns.
/// Truncated text ends in "..".
pub(crate) fn pad_right(s: &str, width: usize) -> String {
    let sw = UnicodeWidthStr::width(s);
    if sw <= width {
        return format!("{}{}", s, " ".repeat(width - sw));
    }

    let budget = width.saturating_sub(2);
    let mut used = 0;
    let mut out = String::new();
    for ch in s.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + cw > budget {
            break;
        }
        used += cw;
        out.push(ch);
    }
    let dots = if width >= 2 { ".." } else { "" };
    format!("{out}{dots}{}", " ".repeat(width - used - dots.len()))
}

/// One aligned stderr line per review row: line, site, category, CRM status, reason.
pub(crate) fn review_lines(rows: &[ReconciliationResult]) -> Vec<String> {
    rows.iter()
        .map(|r| {
            format!(
                "  {:>5}  {} {} {} {}",
                r.line,
                pad_right(&r.site_id, SITE_WIDTH),
                pad_right(&r.category.to_string(), CATEGORY_WIDTH),
                pad_right(r.crm_status.as_deref().unwrap_or("-"), STATUS_WIDTH),
                r.reason
            )
        })
        .collect()
}
