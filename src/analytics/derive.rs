//! Derived values for analytics output.

/// Reviews rated at or above this are candidates for the suspicious report.
pub const SUSPICIOUS_MIN_RATING: f64 = 4.5;
/// Helpfulness ratio below which a candidate is reported.
pub const SUSPICIOUS_MAX_RATIO: f64 = 0.1;
/// Characters of review text shown per suspicious review.
pub const TEXT_SAMPLE_CHARS: usize = 200;
/// Appended to every text sample.
pub const TRUNCATION_MARKER: &str = "...";

/// Format a ratio as a percentage with two decimals (`0.05` → `5.00%`).
pub fn format_pct(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

/// First [`TEXT_SAMPLE_CHARS`] characters of `text` plus the marker.
///
/// Counts characters, not bytes, so multi-byte text is never split.
pub fn text_sample(text: &str) -> String {
    let mut sample: String = text.chars().take(TEXT_SAMPLE_CHARS).collect();
    sample.push_str(TRUNCATION_MARKER);
    sample
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pct_two_decimals() {
        assert_eq!(format_pct(0.05), "5.00%");
        assert_eq!(format_pct(1.0 / 30.0), "3.33%");
        assert_eq!(format_pct(0.0), "0.00%");
    }

    #[test]
    fn sample_truncates_by_chars() {
        let long = "é".repeat(250);
        let s = text_sample(&long);
        assert_eq!(s.chars().count(), TEXT_SAMPLE_CHARS + TRUNCATION_MARKER.len());
        assert!(s.ends_with("..."));
    }

    #[test]
    fn short_text_still_marked() {
        assert_eq!(text_sample("Great!"), "Great!...");
        assert_eq!(text_sample(""), "...");
    }
}
