use strsim::normalized_levenshtein;
use unicode_normalization::UnicodeNormalization;

/// Levenshtein distance divided by the longer length, over NFC characters.
/// Two empty strings are at distance 0.
pub fn normalized_edit_distance(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let a: String = a.nfc().collect();
    let b: String = b.nfc().collect();
    (1.0 - normalized_levenshtein(&a, &b)).clamp(0.0, 1.0)
}

/// Distance between two optional field values; a missing side is maximally
/// distant.
pub fn value_distance(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => normalized_edit_distance(a, b),
        _ => 1.0,
    }
}

/// Similarity that only credits values present and non-empty on both sides.
pub fn value_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            1.0 - normalized_edit_distance(a, b)
        }
        _ => 0.0,
    }
}
