//! HTML extraction helpers for the website collector.
//!
//! Everything in this module is synchronous and pure over an already-fetched
//! page body. Pattern order matters throughout: labeled, specific patterns
//! are tried before bare numeric ones so a phone number is never mistaken
//! for a CRN.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use kybcheck_registry::validate_crn_format;

/// Characters of context captured around a CRN match.
const CRN_CONTEXT_WINDOW: usize = 100;

/// Characters of footer text kept around a postcode when no address element
/// is found.
const ADDRESS_WINDOW: usize = 80;

// ---------------------------------------------------------------------------
// Selector lists (most specific first)
// ---------------------------------------------------------------------------

const DESCRIPTION_SELECTORS: &[&str] = &[
    ".company-description",
    ".about-us p",
    "#about p",
    "section.about p",
    ".hero p",
    "main p",
];

const FOOTER_SELECTORS: &[&str] = &[
    "footer",
    ".footer",
    "#footer",
    ".site-footer",
    ".legal",
    ".copyright",
];

const BRAND_SELECTORS: &[&str] = &[
    ".navbar-brand",
    "header .logo",
    ".site-title",
    "header h1",
];

const ADDRESS_SELECTORS: &[&str] = &[
    "address",
    "[itemprop=\"address\"]",
    ".contact-address",
    "footer .address",
    ".address",
];

/// Social platforms recognized in anchor hrefs, keyed by canonical name.
const SOCIAL_PLATFORMS: &[(&str, &str)] = &[
    ("facebook", "facebook.com"),
    ("twitter", "twitter.com"),
    ("twitter", "x.com"),
    ("instagram", "instagram.com"),
    ("linkedin", "linkedin.com"),
    ("youtube", "youtube.com"),
    ("tiktok", "tiktok.com"),
];

/// Email local-part prefixes preferred as the primary contact address.
const PREFERRED_EMAIL_PREFIXES: &[&str] = &["info@", "contact@", "enquiries@", "hello@"];

// ---------------------------------------------------------------------------
// Regex cascades
// ---------------------------------------------------------------------------

/// CRN capture group: optional jurisdiction prefix plus 6–8 digits.
const CRN_SHAPE: &str = r"((?:SC|NI|OC|SO|NC|FC|IE|RC)?\s?\d{6,8})";

/// Ordered CRN disclosure patterns, most explicit first. The first match
/// whose capture passes the structural format check wins and short-circuits
/// the rest.
static CRN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let raw = [
        format!(r"company\s+registration\s+number\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"company\s+reg(?:istration)?\.?\s+no\.?\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"company\s+number\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"company\s+no\.?\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"registration\s+number\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"registered\s+number\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"registered\s+no\.?\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"reg(?:istration)?\.?\s+no\.?\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"crn\s*[:#]?\s*{CRN_SHAPE}"),
        format!(
            r"registered\s+in\s+england(?:\s+(?:and|&)\s+wales)?\s*(?:under)?\s*(?:company)?\s*(?:number|no\.?)?\s*[:#]?\s*{CRN_SHAPE}"
        ),
        format!(r"registered\s+in\s+scotland\s*(?:under)?\s*(?:number|no\.?)?\s*[:#]?\s*{CRN_SHAPE}"),
        format!(
            r"registered\s+in\s+northern\s+ireland\s*(?:under)?\s*(?:number|no\.?)?\s*[:#]?\s*{CRN_SHAPE}"
        ),
        format!(r"incorporated\s+(?:in\s+\w+\s+)?(?:under\s+)?(?:number|no\.?)\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"companies\s+house\s*(?:number|no\.?)?\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"co\.?\s+reg\.?\s+no\.?\s*[:#]?\s*{CRN_SHAPE}"),
        format!(r"company\s*[:#]\s*{CRN_SHAPE}"),
        format!(r"number\s*[:#]\s*{CRN_SHAPE}"),
        format!(r"no\.\s*{CRN_SHAPE}"),
        // Bare shapes last: prefixed first, then eight plain digits.
        r"\b((?:SC|NI|OC|SO|NC|FC|IE|RC)\d{6,8})\b".to_string(),
        r"\b(\d{8})\b".to_string(),
    ];

    raw.iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("CRN pattern must compile")
        })
        .collect()
});

/// Ordered, labeled VAT number patterns.
static VAT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"vat\s+registration\s+(?:number|no\.?)\s*[:#]?\s*(GB\s?\d{9}|\d{9})",
        r"vat\s+reg\.?\s+no\.?\s*[:#]?\s*(GB\s?\d{9}|\d{9})",
        r"vat\s+(?:number|no\.?)\s*[:#]?\s*(GB\s?\d{9}|\d{9})",
        r"vat\s*[:#]\s*(GB\s?\d{9}|\d{9})",
        r"\b(GB\s?\d{9})\b",
    ]
    .iter()
    .map(|pattern| {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("VAT pattern must compile")
    })
    .collect()
});

/// Company-name-near-copyright constructs, most specific first.
static COPYRIGHT_NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "© 2024 Acme Widgets Ltd" — require a legal suffix
        r"(?:©|\(c\)|copyright)\s*(?:\d{4}(?:\s*[-–]\s*\d{4})?)?\s*(?:by\s+)?([A-Za-z0-9][A-Za-z0-9&.,'\- ]{1,60}?(?:Ltd|Limited|LLP|LLC|PLC|Inc)\.?)",
        // "Acme Widgets Ltd © 2024"
        r"([A-Za-z0-9][A-Za-z0-9&.,'\- ]{1,60}?(?:Ltd|Limited|LLP|LLC|PLC|Inc)\.?)\s*(?:©|\(c\)|copyright)",
        // "© 2024 Acme Widgets. All rights reserved."
        r"(?:©|\(c\)|copyright)\s*(?:\d{4}(?:\s*[-–]\s*\d{4})?)?\s*(?:by\s+)?([A-Za-z][A-Za-z0-9&.'\- ]{2,50}?)\s*[.|,]?\s*all\s+rights\s+reserved",
        // Bare "© 2024 Acme Widgets"
        r"(?:©|\(c\))\s*\d{4}\s+([A-Za-z][A-Za-z0-9&.'\- ]{2,50})",
    ]
    .iter()
    .map(|pattern| {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("copyright pattern must compile")
    })
    .collect()
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email regex")
});

static UK_PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+44\s?\(?0?\)?\s?\d{2,4}|\(?0\d{2,4}\)?)[\s\-]?\d{3,4}[\s\-]?\d{3,4}")
        .expect("phone regex")
});

static UK_POSTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z]{1,2}\d[A-Z\d]?\s*\d[A-Z]{2}\b").expect("postcode regex")
});

// ---------------------------------------------------------------------------
// Text extraction
// ---------------------------------------------------------------------------

/// Collect the visible text of a document, skipping script/style/noscript
/// subtrees, with whitespace collapsed.
pub fn visible_text(doc: &Html) -> String {
    let mut out = String::new();
    collect_text(doc.root_element(), &mut out);
    collapse_whitespace(&out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let tag = element.value().name();
    if matches!(tag, "script" | "style" | "noscript") {
        return;
    }

    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            collect_text(child_el, out);
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text content of the first element matching any selector in `selectors`,
/// tried in order.
pub fn select_first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = doc.select(&selector).next() {
            let text = collapse_whitespace(&element.text().collect::<String>());
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Concatenated text of all footer-ish regions, for disclosure scanning.
pub fn footer_text(doc: &Html) -> String {
    let mut combined = String::new();
    for raw in FOOTER_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for element in doc.select(&selector) {
            combined.push_str(&element.text().collect::<String>());
            combined.push(' ');
        }
    }
    collapse_whitespace(&combined)
}

// ---------------------------------------------------------------------------
// Field extractors
// ---------------------------------------------------------------------------

/// `<title>` text, if present.
pub fn page_title(doc: &Html) -> Option<String> {
    select_first_text(doc, &["title"])
}

/// `<meta name="description">` content, if present.
pub fn meta_description(doc: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="description"]"#).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|content| collapse_whitespace(content))
        .filter(|content| !content.is_empty())
}

/// Company description: meta description first, then the prioritized
/// selector list.
pub fn description(doc: &Html) -> Option<String> {
    meta_description(doc).or_else(|| select_first_text(doc, DESCRIPTION_SELECTORS))
}

/// Locate an "About Us"-style link for the description fallback fetch.
pub fn about_link(doc: &Html, base_url: &Url) -> Option<Url> {
    let selector = Selector::parse("a[href]").ok()?;
    for element in doc.select(&selector) {
        let text = element.text().collect::<String>().to_lowercase();
        let href = element.value().attr("href")?;
        let href_lower = href.to_lowercase();
        if text.contains("about") || href_lower.contains("about") {
            if let Ok(resolved) = base_url.join(href) {
                if resolved.scheme() == "http" || resolved.scheme() == "https" {
                    return Some(resolved);
                }
            }
        }
    }
    None
}

/// Company name from footer/legal copyright text, falling back to
/// header/brand elements.
pub fn company_name(doc: &Html) -> Option<String> {
    let footer = footer_text(doc);
    for pattern in COPYRIGHT_NAME_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(&footer) {
            let name = collapse_whitespace(captures.get(1)?.as_str());
            let trimmed = name.trim_matches(|c: char| c == '.' || c == ',' || c.is_whitespace());
            if trimmed.len() >= 3 {
                return Some(trimmed.to_string());
            }
        }
    }
    select_first_text(doc, BRAND_SELECTORS)
}

/// All distinct emails in the page text, preferred contact prefixes first.
pub fn emails(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for m in EMAIL_RE.find_iter(text) {
        let email = m.as_str().to_lowercase();
        // Regex over raw text also matches image names like logo@2x.png
        if email.split('@').nth(1).is_some_and(|domain| domain.contains('.'))
            && !email.ends_with(".png")
            && !email.ends_with(".jpg")
            && !email.ends_with(".svg")
            && !seen.contains(&email)
        {
            seen.push(email);
        }
    }

    seen.sort_by_key(|email| {
        let preferred = PREFERRED_EMAIL_PREFIXES
            .iter()
            .any(|prefix| email.starts_with(prefix));
        usize::from(!preferred)
    });
    seen
}

/// First UK-formatted phone number in the page text.
pub fn uk_phone(text: &str) -> Option<String> {
    UK_PHONE_RE
        .find(text)
        .map(|m| collapse_whitespace(m.as_str()))
}

/// Postal address: element selectors first, then a bounded window around a
/// UK postcode in the footer text.
pub fn address(doc: &Html) -> Option<String> {
    if let Some(found) = select_first_text(doc, ADDRESS_SELECTORS) {
        return Some(found);
    }

    let footer = footer_text(doc);
    let m = UK_POSTCODE_RE.find(&footer)?;
    let start = m.start().saturating_sub(ADDRESS_WINDOW);
    let start = ceil_char_boundary(&footer, start);
    Some(collapse_whitespace(&footer[start..m.end()]))
}

/// VAT number via the ordered labeled patterns.
pub fn vat_number(text: &str) -> Option<String> {
    for pattern in VAT_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(text) {
            let vat: String = captures
                .get(1)?
                .as_str()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            return Some(vat.to_uppercase());
        }
    }
    None
}

/// Social profile links keyed by platform name; first href per platform wins.
pub fn social_links(doc: &Html) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    let Ok(selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in doc.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let lower = href.to_lowercase();
        for (platform, domain) in SOCIAL_PLATFORMS {
            if lower.contains(domain) {
                links
                    .entry((*platform).to_string())
                    .or_insert_with(|| href.to_string());
            }
        }
    }
    links
}

/// A CRN found in page text, with where it matched and surrounding context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrnMatch {
    pub crn: String,
    /// Pattern index in the cascade that matched (lower = more explicit).
    pub pattern_index: usize,
    /// Up to [`CRN_CONTEXT_WINDOW`] characters around the match.
    pub context: String,
}

/// Run the CRN pattern cascade over `text`. The first structurally valid
/// capture wins and short-circuits the remaining patterns.
pub fn find_crn(text: &str) -> Option<CrnMatch> {
    for (index, pattern) in CRN_PATTERNS.iter().enumerate() {
        for captures in pattern.captures_iter(text) {
            let Some(group) = captures.get(1) else {
                continue;
            };
            let candidate: String = group
                .as_str()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_uppercase();

            if validate_crn_format(&candidate) {
                let full = captures.get(0).expect("whole match");
                let half = CRN_CONTEXT_WINDOW / 2;
                let start = ceil_char_boundary(text, full.start().saturating_sub(half));
                let end = floor_char_boundary(text, (full.end() + half).min(text.len()));
                return Some(CrnMatch {
                    crn: candidate,
                    pattern_index: index,
                    context: collapse_whitespace(&text[start..end]),
                });
            }
        }
    }
    None
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Html {
        Html::parse_document(html)
    }

    #[test]
    fn visible_text_skips_scripts() {
        let d = doc("<html><body><script>var x = 1;</script><p>Hello   world</p><style>p{}</style></body></html>");
        assert_eq!(visible_text(&d), "Hello world");
    }

    #[test]
    fn labeled_crn_beats_bare_digits() {
        // The phone-looking number appears first in the text, but the labeled
        // pattern is higher priority.
        let text = "Call 02079460000 today. Company Number: 12345678.";
        let found = find_crn(text).expect("crn");
        assert_eq!(found.crn, "12345678");
        assert_eq!(found.pattern_index, 2);
        assert!(found.context.contains("Company Number"));
    }

    #[test]
    fn registered_in_england_phrase() {
        let text = "Registered in England and Wales under company number 09876543.";
        assert_eq!(find_crn(text).unwrap().crn, "09876543");
    }

    #[test]
    fn prefixed_crn_with_space_normalized() {
        let text = "Company No. SC 123456";
        assert_eq!(find_crn(text).unwrap().crn, "SC123456");
    }

    #[test]
    fn bare_eight_digits_is_last_resort() {
        let text = "Our warehouse code is 55512345 apparently.";
        let found = find_crn(text).expect("crn");
        assert_eq!(found.crn, "55512345");
        assert_eq!(found.pattern_index, CRN_PATTERNS.len() - 1);
    }

    #[test]
    fn seven_digit_number_rejected() {
        assert!(find_crn("Company Number: 1234567 (typo)").is_none());
    }

    #[test]
    fn crn_context_window_bounded() {
        let padding = "x".repeat(500);
        let text = format!("{padding} Company Number: 12345678 {padding}");
        let found = find_crn(&text).unwrap();
        assert!(found.context.len() <= CRN_CONTEXT_WINDOW + 40);
        assert!(found.context.contains("12345678"));
    }

    #[test]
    fn vat_patterns_ordered() {
        assert_eq!(
            vat_number("VAT Registration Number: GB 123456789"),
            Some("GB123456789".into())
        );
        assert_eq!(vat_number("vat no: 987654321"), Some("987654321".into()));
        assert_eq!(vat_number("no vat here"), None);
    }

    #[test]
    fn email_preference_ordering() {
        let text = "Reach jane.doe@example.co.uk or info@example.co.uk for details";
        let found = emails(text);
        assert_eq!(found[0], "info@example.co.uk");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn email_dedup_and_junk_filter() {
        let text = "info@acme.uk info@acme.uk logo@2x.png";
        assert_eq!(emails(text), vec!["info@acme.uk"]);
    }

    #[test]
    fn uk_phone_formats() {
        assert!(uk_phone("Call +44 20 7946 0000 now").is_some());
        assert!(uk_phone("Tel: 0161 496 0000").is_some());
        assert!(uk_phone("no numbers").is_none());
    }

    #[test]
    fn copyright_name_extraction() {
        let d = doc(
            r#"<html><body><footer>© 2024 Alpha Muscle Gym Ltd. All rights reserved.</footer></body></html>"#,
        );
        assert_eq!(company_name(&d).as_deref(), Some("Alpha Muscle Gym Ltd"));
    }

    #[test]
    fn brand_fallback_when_no_copyright() {
        let d = doc(
            r#"<html><body><header><h1>Beta Bakery</h1></header><footer>nothing legal</footer></body></html>"#,
        );
        assert_eq!(company_name(&d).as_deref(), Some("Beta Bakery"));
    }

    #[test]
    fn address_from_element_then_postcode_window() {
        let with_element = doc(
            r#"<html><body><address>1 Gym Lane, Manchester, M1 2AB</address></body></html>"#,
        );
        assert_eq!(
            address(&with_element).as_deref(),
            Some("1 Gym Lane, Manchester, M1 2AB")
        );

        let postcode_only = doc(
            r#"<html><body><footer>Visit us at 1 Gym Lane, Manchester M1 2AB today</footer></body></html>"#,
        );
        let found = address(&postcode_only).expect("address");
        assert!(found.ends_with("M1 2AB"));
        assert!(found.contains("Gym Lane"));
    }

    #[test]
    fn social_links_by_platform() {
        let d = doc(
            r#"<html><body>
            <a href="https://www.facebook.com/alphagym">fb</a>
            <a href="https://x.com/alphagym">x</a>
            <a href="https://www.facebook.com/other">fb2</a>
            </body></html>"#,
        );
        let links = social_links(&d);
        assert_eq!(links["facebook"], "https://www.facebook.com/alphagym");
        assert_eq!(links["twitter"], "https://x.com/alphagym");
    }

    #[test]
    fn about_link_resolution() {
        let d = doc(r#"<html><body><a href="/about-us">About Us</a></body></html>"#);
        let base = Url::parse("https://alphagym.co.uk/").unwrap();
        assert_eq!(
            about_link(&d, &base).unwrap().as_str(),
            "https://alphagym.co.uk/about-us"
        );
    }

    #[test]
    fn meta_description_preferred() {
        let d = doc(
            r#"<html><head><meta name="description" content="Manchester's friendliest gym."></head>
            <body><main><p>Some other paragraph</p></main></body></html>"#,
        );
        assert_eq!(
            description(&d).as_deref(),
            Some("Manchester's friendliest gym.")
        );
    }
}
