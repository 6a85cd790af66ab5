//! Candidate scoring for website discovery.
//!
//! Scoring is additive over hand-tuned signals; known platforms and
//! directories short-circuit to a large penalty so they can never win
//! against a plausible official domain.

use url::Url;

/// Hosting/social platforms that are never a company's official site.
const PLATFORM_DOMAINS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "linkedin.com",
    "twitter.com",
    "x.com",
    "youtube.com",
    "tiktok.com",
    "pinterest.com",
    "wikipedia.org",
    "companieshouse.gov.uk",
    "company-information.service.gov.uk",
    "find-and-update.company-information.service.gov.uk",
    "endole.co.uk",
    "companycheck.co.uk",
    "duedil.com",
    "opencorporates.com",
    "bizdb.co.uk",
];

/// Directory-ish words in a hostname that suggest a listings site.
const DIRECTORY_TERMS: &[&str] = &[
    "yell",
    "yelp",
    "trustpilot",
    "glassdoor",
    "indeed",
    "checkatrade",
    "thomsonlocal",
    "cylex",
    "192.com",
    "hotfrog",
];

const COMMON_TLDS: &[&str] = &["com", "org", "net"];
const UK_TLDS: &[&str] = &["co.uk", "uk", "org.uk", "ltd.uk"];

/// Legal-form tokens ignored when matching names against hostnames.
const LEGAL_TOKENS: &[&str] = &[
    "ltd", "limited", "llc", "llp", "inc", "plc", "corp", "company", "group", "holdings", "the",
];

/// Score a search result against the company name. Higher is better; known
/// platforms return -100 outright.
pub fn score_candidate(company_name: &str, url: &Url, title: Option<&str>) -> f64 {
    let Some(host) = url.host_str() else {
        return -100.0;
    };
    let host = host.trim_start_matches("www.").to_lowercase();
    let domain = registrable_domain(&host);

    if PLATFORM_DOMAINS
        .iter()
        .any(|platform| domain == *platform || host.ends_with(&format!(".{platform}")))
    {
        return -100.0;
    }

    let mut score = 0.0;

    if DIRECTORY_TERMS.iter().any(|term| host.contains(term)) {
        score -= 30.0;
    }

    let tokens = name_tokens(company_name);
    let label = domain.split('.').next().unwrap_or(&domain);
    let concat = tokens.concat();

    // Exact match between the hostname label and the concatenated (or
    // hyphenated) name tokens is the strongest signal there is.
    if !concat.is_empty() && (label == concat || label == tokens.join("-")) {
        score += 100.0;
    } else if !tokens.is_empty() && tokens.iter().all(|token| host.contains(token.as_str())) {
        score += 50.0;
    } else if !tokens.is_empty() {
        // Partial credit, capped so fragments never outrank a full match.
        let hits = tokens.iter().filter(|token| host.contains(token.as_str())).count();
        score += (hits as f64 / tokens.len() as f64) * 20.0;
    }

    // Shorter hostnames and shallower paths read more official.
    score -= host.len() as f64 * 0.5;
    score -= url.path_segments().map(|s| s.filter(|p| !p.is_empty()).count()).unwrap_or(0) as f64
        * 5.0;

    let suffix = domain_suffix(&domain);
    if UK_TLDS.contains(&suffix.as_str()) {
        score += 15.0;
    } else if COMMON_TLDS.contains(&suffix.as_str()) {
        score += 10.0;
    }

    if let Some(title) = title {
        if title.to_lowercase().contains("official") {
            score += 10.0;
        }
    }

    score
}

/// Collapse a hostname to its registrable domain, treating two-part UK
/// suffixes (co.uk etc.) as a single public suffix.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_start_matches("www.").to_lowercase();
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() < 2 {
        return host;
    }

    let two_part_suffix = parts.len() >= 3 && {
        let suffix = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
        matches!(
            suffix.as_str(),
            "co.uk" | "org.uk" | "ltd.uk" | "plc.uk" | "me.uk" | "net.uk" | "ac.uk" | "gov.uk"
        )
    };

    let keep = if two_part_suffix { 3 } else { 2 };
    parts[parts.len() - keep..].join(".")
}

/// Slugify a company name for domain guessing: lowercase, legal suffixes
/// stripped, remaining tokens hyphen-joined.
pub fn slugify(company_name: &str) -> String {
    name_tokens(company_name).join("-")
}

/// Lowercased alphanumeric tokens of the name, minus legal-form words.
fn name_tokens(company_name: &str) -> Vec<String> {
    company_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|token| !LEGAL_TOKENS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Everything after the registrable label, e.g. "co.uk" for "acme.co.uk".
fn domain_suffix(domain: &str) -> String {
    domain.splitn(2, '.').nth(1).unwrap_or("").to_string()
}
