//! Parsing of free-form AI replies into structured CRN claims.
//!
//! Models are asked for JSON but rarely guaranteed to produce it, so parsing
//! cascades: strict JSON (including fenced code blocks), then labeled fields,
//! then a bare CRN-shaped token anywhere in the text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use kybcheck_registry::validate_crn_format;

/// `"crn": "12345678"` or `CRN: SC123456` style labeled values.
static LABELED_CRN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:crn|company[\s_]?(?:registration[\s_]?)?number)["'\s:=]+([A-Z]{0,2}\s?\d{6,8})"#,
    )
    .expect("labeled CRN regex")
});

/// A bare CRN-shaped token: optional jurisdiction prefix then 6-8 digits.
static BARE_CRN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:SC|NI|OC|SO|NC|FC|IE|RC)\d{6,8}|\d{8})\b").expect("bare CRN regex")
});

/// Phrases a model uses to say the company does not exist.
const NEGATIVE_MARKERS: &[&str] = &[
    "not_found",
    "no such company",
    "does not exist",
    "doesn't exist",
    "could not find",
    "couldn't find",
    "cannot find",
    "can't find",
    "unable to find",
    "no company found",
    "no matching company",
    "not registered",
];

#[derive(Debug, Default, Deserialize)]
struct JsonReply {
    #[serde(default, alias = "company_number", alias = "registration_number")]
    crn: Option<String>,
    #[serde(default, alias = "name", alias = "registered_name")]
    company_name: Option<String>,
    #[serde(default)]
    found: Option<bool>,
}

/// A structured view of an AI reply.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedReply {
    /// A structurally valid CRN claimed by the reply, normalized to
    /// uppercase with whitespace removed.
    pub crn: Option<String>,
    /// The registered company name claimed alongside the CRN, if any.
    pub company_name: Option<String>,
    /// Whether the reply explicitly states the company does not exist.
    pub negative: bool,
}

/// Parse an AI reply, cascading from strict JSON down to a bare regex scan.
pub fn parse_reply(reply: &str) -> ParsedReply {
    let negative = is_negative(reply);

    if let Some(parsed) = parse_json(reply) {
        let crn = parsed.crn.as_deref().and_then(normalize_crn);
        return ParsedReply {
            crn,
            company_name: parsed
                .company_name
                .filter(|name| !name.trim().is_empty()),
            negative: negative || parsed.found == Some(false),
        };
    }

    if let Some(captures) = LABELED_CRN_RE.captures(reply) {
        if let Some(crn) = normalize_crn(&captures[1]) {
            return ParsedReply {
                crn: Some(crn),
                company_name: None,
                negative,
            };
        }
    }

    for captures in BARE_CRN_RE.captures_iter(reply) {
        if let Some(crn) = normalize_crn(&captures[1]) {
            return ParsedReply {
                crn: Some(crn),
                company_name: None,
                negative,
            };
        }
    }

    ParsedReply {
        crn: None,
        company_name: None,
        negative,
    }
}

/// Try the whole reply as JSON, then the contents of a fenced code block,
/// then the first `{...}` span.
fn parse_json(reply: &str) -> Option<JsonReply> {
    let trimmed = reply.trim();
    if let Ok(parsed) = serde_json::from_str::<JsonReply>(trimmed) {
        return Some(parsed);
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(parsed) = serde_json::from_str::<JsonReply>(block.trim()) {
            return Some(parsed);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        serde_json::from_str::<JsonReply>(&trimmed[start..=end]).ok()
    } else {
        None
    }
}

fn fenced_block(reply: &str) -> Option<&str> {
    let after_open = reply.split_once("```")?.1;
    // Skip a language tag on the opening fence line.
    let body = after_open.split_once('\n').map_or(after_open, |(_, b)| b);
    Some(body.split_once("```")?.0)
}

fn is_negative(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    NEGATIVE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Uppercase, strip internal whitespace, and keep only structurally valid
/// CRNs. Zero-pads bare 6-7 digit numbers, which the registry stores
/// left-padded to eight.
fn normalize_crn(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if compact.is_empty() {
        return None;
    }

    let candidate = if compact.chars().all(|c| c.is_ascii_digit()) && compact.len() < 8 {
        format!("{compact:0>8}")
    } else {
        compact
    };

    validate_crn_format(&candidate).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_json() {
        let reply = r#"{"crn": "12345678", "company_name": "ALPHA MUSCLE GYM LIMITED"}"#;
        let parsed = parse_reply(reply);
        assert_eq!(parsed.crn.as_deref(), Some("12345678"));
        assert_eq!(
            parsed.company_name.as_deref(),
            Some("ALPHA MUSCLE GYM LIMITED")
        );
        assert!(!parsed.negative);
    }

    #[test]
    fn parses_fenced_json() {
        let reply = "Here you go:\n```json\n{\"crn\": \"SC123456\"}\n```";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.crn.as_deref(), Some("SC123456"));
    }

    #[test]
    fn parses_labeled_field() {
        let parsed = parse_reply("The company registration number is 09876543.");
        assert_eq!(parsed.crn.as_deref(), Some("09876543"));
    }

    #[test]
    fn falls_back_to_bare_crn() {
        let parsed = parse_reply("I believe it's SC123456 based in Edinburgh.");
        assert_eq!(parsed.crn.as_deref(), Some("SC123456"));
    }

    #[test]
    fn pads_short_numbers() {
        let parsed = parse_reply(r#"{"crn": "123456"}"#);
        assert_eq!(parsed.crn.as_deref(), Some("00123456"));
    }

    #[test]
    fn detects_negatives() {
        let parsed = parse_reply("I could not find any such company in the UK register.");
        assert!(parsed.negative);
        assert!(parsed.crn.is_none());

        let json = parse_reply(r#"{"found": false}"#);
        assert!(json.negative);
    }

    #[test]
    fn garbage_yields_nothing() {
        let parsed = parse_reply("Call us on 020 7946 0958 for details.");
        // A 10-digit phone number must not be mistaken for a CRN.
        assert!(parsed.crn.is_none());
        assert!(!parsed.negative);
    }

    #[test]
    fn invalid_prefix_rejected() {
        let parsed = parse_reply(r#"{"crn": "XX123456"}"#);
        assert!(parsed.crn.is_none());
    }
}
