//! Local CRN format validation.

/// Jurisdiction prefixes accepted ahead of a 6–8 digit serial.
/// Scotland, Northern Ireland, LLPs, and the overseas/registered variants.
const JURISDICTION_PREFIXES: &[&str] = &["SC", "NI", "OC", "SO", "NC", "FC", "IE", "RC"];

/// Check whether a string is structurally a valid CRN.
///
/// Valid forms: exactly 8 digits, or an uppercase two-letter jurisdiction
/// prefix followed by 6–8 digits. Lowercase prefixes are rejected. Pure
/// predicate, no network.
pub fn validate_crn_format(crn: &str) -> bool {
    let crn = crn.trim();
    if !crn.is_ascii() {
        return false;
    }

    if crn.len() == 8 && crn.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }

    if crn.len() < 8 || crn.len() > 10 {
        return false;
    }

    let (prefix, serial) = crn.split_at(2);
    JURISDICTION_PREFIXES.contains(&prefix)
        && (6..=8).contains(&serial.len())
        && serial.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_eight_digits() {
        assert!(validate_crn_format("12345678"));
        assert!(validate_crn_format("00000001"));
    }

    #[test]
    fn prefixed_forms() {
        assert!(validate_crn_format("SC123456"));
        assert!(validate_crn_format("NI1234567"));
        assert!(validate_crn_format("OC12345678"));
    }

    #[test]
    fn rejections() {
        assert!(!validate_crn_format("1234567")); // 7 digits
        assert!(!validate_crn_format("123456789")); // 9 digits, no prefix
        assert!(!validate_crn_format("sc123456")); // lowercase prefix
        assert!(!validate_crn_format("XX123456")); // unknown prefix
        assert!(!validate_crn_format("SC12345")); // serial too short
        assert!(!validate_crn_format("1234567a"));
        assert!(!validate_crn_format(""));
    }

    #[test]
    fn non_ascii_input_is_rejected_not_panicked_on() {
        // Multibyte characters must not trip the fixed-offset prefix split.
        assert!(!validate_crn_format("€1234567"));
        assert!(!validate_crn_format("ＳＣ123456"));
        assert!(!validate_crn_format("1234567é"));
    }

    #[test]
    fn idempotent_and_whitespace_tolerant() {
        for _ in 0..3 {
            assert!(validate_crn_format(" 12345678 "));
            assert!(!validate_crn_format("123 45678"));
        }
    }
}
