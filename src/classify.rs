//! Identifier classification for scan-style inputs.
//!
//! UIs may call [`classify_identifier`] directly to pre-validate input; the
//! orchestrator uses it to pick exactly one scan stage per attempt.

use once_cell::sync::Lazy;
use regex::Regex;

/// Retail barcodes are 8-14 digit numeric strings (EAN-8 through GTIN-14).
static BARCODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8,14}$").expect("barcode pattern is valid"));

/// Shape of a scan identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    /// 8-14 digit numeric string.
    Barcode,
    /// Short or multi-word text naming a product.
    ProductName,
    /// Image URL or content reference.
    ImageReference,
}

/// Classify a free-text identifier.
///
/// The check order is load-bearing and must not change: digits first so a
/// 13-digit EAN is never mistaken for a product name, then the short-text
/// rule, and only long whitespace-free strings fall through to an image
/// reference.
pub fn classify_identifier(input: &str) -> InputClass {
    let trimmed = input.trim();
    if BARCODE_PATTERN.is_match(trimmed) {
        return InputClass::Barcode;
    }
    if trimmed.contains(char::is_whitespace) || trimmed.chars().count() < 50 {
        return InputClass::ProductName;
    }
    InputClass::ImageReference
}

/// Normalize a barcode to GTIN-14 format for product lookup.
///
/// EAN-8, UPC-A, and EAN-13 are zero-padded to 14 digits. Non-standard
/// lengths pass through with non-digit characters stripped.
pub fn normalize_gtin14(barcode: &str) -> String {
    let digits: String = barcode.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        8 => format!("000000{digits}"),
        12 => format!("00{digits}"),
        13 => format!("0{digits}"),
        _ => digits,
    }
}
