//! Header and token normalisation

/// Normalise a column header for case- and punctuation-insensitive matching.
///
/// Whitespace, `_` and `-` are removed and the rest is lower-cased, so
/// `"Tumor_Sample_Barcode"`, `"tumor sample barcode"` and `"TUMOR-SAMPLE-BARCODE"`
/// all compare equal.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compare two headers after normalisation
pub fn headers_match(a: &str, b: &str) -> bool {
    normalize_header(a) == normalize_header(b)
}

/// Trim a raw cell value, returning `None` for blank cells
pub fn non_blank(cell: &str) -> Option<&str> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
