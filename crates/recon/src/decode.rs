//! Text decoding for uploaded exports.
//!
//! Exports arrive as UTF-8 (with or without BOM), UTF-16 with BOM, or
//! Windows-1252 from spreadsheet tools. Each candidate is accepted only when
//! the decoded text stays within the configured corruption tolerance.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::error::ReconError;

/// Decoded file contents and the encoding that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
    /// Characters counted as corruption (replacement, NUL, undefined bytes).
    pub corrupted: usize,
}

/// Code points Windows-1252 leaves undefined; encoding_rs maps them to C1 controls.
const CP1252_UNDEFINED: [char; 5] = ['\u{81}', '\u{8D}', '\u{8F}', '\u{90}', '\u{9D}'];

pub fn decode_bytes(
    source_name: &str,
    bytes: &[u8],
    max_corruption_ratio: f64,
) -> Result<DecodedText, ReconError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return accept(source_name, text.into_owned(), encoding, max_corruption_ratio);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return accept(source_name, text.to_string(), UTF_8, max_corruption_ratio);
    }

    // Mostly-UTF-8 files with a stray broken byte. A file whose non-ASCII
    // bytes are all invalid UTF-8 is single-byte encoded and goes to 1252.
    let lossy = String::from_utf8_lossy(bytes).into_owned();
    if has_utf8_sequences(&lossy)
        && within_tolerance(corruption(&lossy, false), &lossy, max_corruption_ratio)
    {
        return accept(source_name, lossy, UTF_8, max_corruption_ratio);
    }

    // Fall back to Windows-1252 (common for Excel-exported CSVs)
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    accept(source_name, text.into_owned(), WINDOWS_1252, max_corruption_ratio)
}

fn accept(
    source_name: &str,
    text: String,
    encoding: &'static Encoding,
    max_corruption_ratio: f64,
) -> Result<DecodedText, ReconError> {
    let corrupted = corruption(&text, encoding == WINDOWS_1252);
    if !within_tolerance(corrupted, &text, max_corruption_ratio) {
        return Err(ReconError::Encoding {
            source_name: source_name.into(),
            detail: format!(
                "{corrupted} of {} characters corrupted when decoded as {} (tolerance {max_corruption_ratio})",
                text.chars().count(),
                encoding.name()
            ),
        });
    }
    Ok(DecodedText {
        text,
        encoding: encoding.name(),
        corrupted,
    })
}

fn corruption(text: &str, cp1252: bool) -> usize {
    text.chars()
        .filter(|&c| {
            c == char::REPLACEMENT_CHARACTER
                || c == '\0'
                || (cp1252 && CP1252_UNDEFINED.contains(&c))
        })
        .count()
}

fn has_utf8_sequences(lossy: &str) -> bool {
    lossy
        .chars()
        .any(|c| !c.is_ascii() && c != char::REPLACEMENT_CHARACTER)
}

fn within_tolerance(corrupted: usize, text: &str, max_corruption_ratio: f64) -> bool {
    let allowed = (text.chars().count() as f64 * max_corruption_ratio).floor() as usize;
    corrupted <= allowed
}
