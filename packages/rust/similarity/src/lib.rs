//! Company-name similarity scoring.
//!
//! This is the single source of truth for every "is this the same company"
//! decision in the pipeline. Both names are normalized (lowercased, legal
//! entity suffixes stripped, punctuation removed, whitespace collapsed)
//! before an edit-distance comparison, so "Acme Ltd" and "ACME LIMITED"
//! score as identical.

/// Legal-entity suffixes and filler words stripped during normalization.
/// Matched as whole words only.
const LEGAL_SUFFIXES: &[&str] = &[
    "ltd", "limited", "llc", "llp", "inc", "plc", "corp", "company", "group", "holdings", "uk",
];

/// Similarity score in `[0, 1]` between two company names.
///
/// `1.0` means the normalized forms are identical (two empty inputs also
/// score `1.0`); `0.0` means nothing matches. Symmetric and pure.
pub fn similarity(a: &str, b: &str) -> f64 {
    let na = normalize_name(a);
    let nb = normalize_name(b);

    let max_len = na.chars().count().max(nb.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    let distance = levenshtein(&na, &nb);
    1.0 - (distance as f64 / max_len as f64)
}

/// Normalize a company name for comparison: lowercase, strip legal-entity
/// suffixes, strip punctuation, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();

    // Keep only letters, digits, and spaces; everything else becomes a space
    // so "J&B Smith-Jones" splits cleanly into words.
    let depunctuated: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    depunctuated
        .split_whitespace()
        .filter(|word| !LEGAL_SUFFIXES.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classic two-row Levenshtein distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr: Vec<usize> = vec![0; b_chars.len() + 1];

    for (i, &ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let substitution_cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1) // deletion
                .min(curr[j] + 1) // insertion
                .min(prev[j] + substitution_cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_after_suffix_stripping() {
        assert!(similarity("Acme Ltd", "ACME LIMITED") >= 0.9);
        assert!((similarity("Acme Ltd", "Acme Limited") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn symmetry() {
        let pairs = [
            ("Alpha Muscle Gym Limited", "Alpha Muscle Gym Ltd"),
            ("Foo Bar", "Baz Qux"),
            ("", "Something"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "asymmetric for {a:?}/{b:?}");
        }
    }

    #[test]
    fn bounds_and_identity() {
        let names = ["Acme", "J&B Smith-Jones LLP", "", "A very long company name indeed"];
        for a in names {
            assert!((similarity(a, a) - 1.0).abs() < f64::EPSILON);
            for b in names {
                let s = similarity(a, b);
                assert!((0.0..=1.0).contains(&s), "out of bounds: {s} for {a:?}/{b:?}");
            }
        }
    }

    #[test]
    fn both_empty_is_one() {
        assert!((similarity("", "") - 1.0).abs() < f64::EPSILON);
        // "Ltd" normalizes to the empty string too
        assert!((similarity("Ltd", "Limited") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(similarity("Alpha Muscle Gym", "Omega Catering Services") < 0.4);
    }

    #[test]
    fn normalization_strips_punctuation_and_fillers() {
        assert_eq!(normalize_name("The J&B Group Holdings PLC"), "the j b");
        assert_eq!(normalize_name("Acme (UK) Ltd."), "acme");
    }

    #[test]
    fn suffix_only_stripped_as_whole_word() {
        // "Plcmaker" must not lose its prefix
        assert_eq!(normalize_name("Plcmaker"), "plcmaker");
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
