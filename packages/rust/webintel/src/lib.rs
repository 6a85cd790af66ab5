//! Website intelligence collection.
//!
//! Given a company website URL, fetch the page and extract every identifier
//! a KYB check cares about: CRN, VAT number, company name, address, contact
//! details, description, and social links.
//!
//! Scrape failures are ordinary, expected events — a dead site must not
//! fail the pipeline. [`Collector::collect`] therefore never errors for
//! network or parse problems; it returns an empty [`WebsiteData`] annotated
//! with a note. Only an empty URL is a contract violation.

mod extract;

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use scraper::Html;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use url::Url;

use kybcheck_shared::{KybError, Result};

pub use extract::{CrnMatch, find_crn};

/// Realistic browser user agent. Many company sites serve bot-detection
/// placeholder pages to obvious non-browser agents.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default timeout for page fetches.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum redirects to follow.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// WebsiteData
// ---------------------------------------------------------------------------

/// Everything extracted from a company website. All fields best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebsiteData {
    /// The URL actually fetched (after normalization).
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    /// Where on the page the CRN was found ("footer" or "body").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn_location: Option<String>,
    /// Text surrounding the CRN match, for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Primary contact email (preferred prefixes first).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub social_links: BTreeMap<String, String>,
    /// SHA-256 of the fetched page body, for the audit trail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Collection notes: scrape errors, fallbacks taken, oddities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl WebsiteData {
    fn empty_with_note(url: &str, note: String) -> Self {
        Self {
            url: url.to_string(),
            notes: vec![note],
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Fetches and mines company websites.
#[derive(Debug, Clone)]
pub struct Collector {
    client: Client,
}

impl Collector {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| KybError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn with_default_timeout() -> Result<Self> {
        Self::new(DEFAULT_TIMEOUT)
    }

    /// Collect identifiers from `url`.
    ///
    /// `expected_company_name` is recorded in the notes when the scraped
    /// name diverges wildly, as a hint for downstream validation. Errors
    /// only on an empty URL; every scrape failure degrades to an
    /// empty-but-annotated result.
    #[instrument(skip(self))]
    pub async fn collect(&self, url: &str, expected_company_name: &str) -> Result<WebsiteData> {
        if url.trim().is_empty() {
            return Err(KybError::validation("collect requires a non-empty URL"));
        }

        let normalized = normalize_url(url);
        let parsed = match Url::parse(&normalized) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Ok(WebsiteData::empty_with_note(
                    &normalized,
                    format!("invalid URL after normalization: {e}"),
                ));
            }
        };

        let body = match self.fetch_page(parsed.as_str()).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %parsed, error = %e, "website fetch failed, returning empty data");
                return Ok(WebsiteData::empty_with_note(
                    parsed.as_str(),
                    format!("fetch failed: {e}"),
                ));
            }
        };

        // All HTML work happens synchronously here; `Html` is not Send and
        // must not live across an await.
        let (mut data, about) = extract_all(&body, &parsed);

        // About-page fallback for the description.
        if data.description.is_none() {
            if let Some(about_url) = about {
                match self.fetch_page(about_url.as_str()).await {
                    Ok(about_body) => {
                        data.description = extract_description(&about_body);
                        if data.description.is_some() {
                            data.notes
                                .push(format!("description taken from {about_url}"));
                        }
                    }
                    Err(e) => {
                        debug!(url = %about_url, error = %e, "about page fetch failed");
                        data.notes.push(format!("about page fetch failed: {e}"));
                    }
                }
            }
        }

        if let Some(found) = &data.company_name {
            let score = kybcheck_similarity_hint(found, expected_company_name);
            if score < 0.3 {
                data.notes.push(format!(
                    "scraped company name {found:?} bears little resemblance to {expected_company_name:?}"
                ));
            }
        }

        debug!(
            url = %data.url,
            crn = data.crn.as_deref().unwrap_or("-"),
            name = data.company_name.as_deref().unwrap_or("-"),
            emails = data.emails.len(),
            "website collection finished"
        );

        Ok(data)
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KybError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KybError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| KybError::Network(format!("{url}: body read failed: {e}")))
    }
}

/// Prepend `https://` when the URL carries no scheme.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Parse the body and run every extractor. Returns the populated data plus
/// an optional About link for the async description fallback.
fn extract_all(body: &str, url: &Url) -> (WebsiteData, Option<Url>) {
    let doc = Html::parse_document(body);

    let full_text = extract::visible_text(&doc);
    let footer = extract::footer_text(&doc);

    // CRN: footer/legal text first (most disclosure text lives there), whole
    // page second.
    let (crn_match, crn_location) = match extract::find_crn(&footer) {
        Some(found) => (Some(found), Some("footer".to_string())),
        None => (
            extract::find_crn(&full_text),
            Some("body".to_string()),
        ),
    };
    let (crn, crn_context, crn_location) = match crn_match {
        Some(found) => (Some(found.crn), Some(found.context), crn_location),
        None => (None, None, None),
    };

    let emails = extract::emails(&full_text);
    let email = emails.first().cloned();

    let data = WebsiteData {
        url: url.to_string(),
        crn,
        crn_location,
        crn_context,
        company_name: extract::company_name(&doc),
        address: extract::address(&doc),
        phone: extract::uk_phone(&full_text),
        email,
        emails,
        vat_number: extract::vat_number(&full_text),
        description: extract::description(&doc),
        page_title: extract::page_title(&doc),
        social_links: extract::social_links(&doc),
        content_hash: Some(compute_hash(body)),
        notes: Vec::new(),
    };

    let about = if data.description.is_none() {
        extract::about_link(&doc, url)
    } else {
        None
    };

    (data, about)
}

/// Description extraction for a fetched About page.
fn extract_description(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    extract::description(&doc)
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cheap similarity hint used only for note annotation; the real scoring
/// lives in the similarity crate and is applied by the cross-validator.
fn kybcheck_similarity_hint(a: &str, b: &str) -> f64 {
    let la = a.to_lowercase();
    let lb = b.to_lowercase();
    let tokens: Vec<&str> = lb.split_whitespace().collect();
    if tokens.is_empty() {
        return 1.0;
    }
    let hits = tokens.iter().filter(|token| la.contains(**token)).count();
    hits as f64 / tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GYM_PAGE: &str = r#"<html>
    <head>
        <title>Alpha Muscle Gym — Manchester</title>
        <meta name="description" content="Manchester's friendliest 24 hour gym.">
    </head>
    <body>
        <header><h1 class="site-title">Alpha Muscle Gym</h1></header>
        <main>
            <p>Open every day. Call 0161 496 0000 or email info@alphamusclegym.co.uk.</p>
            <a href="https://www.facebook.com/alphamusclegym">Facebook</a>
        </main>
        <footer>
            <address>1 Gym Lane, Manchester, M1 2AB</address>
            © 2024 Alpha Muscle Gym Ltd. All rights reserved.
            Registered in England and Wales under company number 12345678.
            VAT No: GB 123456789
        </footer>
    </body>
    </html>"#;

    #[tokio::test]
    async fn collects_everything_from_a_rich_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GYM_PAGE))
            .mount(&server)
            .await;

        let collector = Collector::with_default_timeout().unwrap();
        let data = collector
            .collect(&server.uri(), "Alpha Muscle Gym Limited")
            .await
            .unwrap();

        assert_eq!(data.crn.as_deref(), Some("12345678"));
        assert_eq!(data.crn_location.as_deref(), Some("footer"));
        assert!(data.crn_context.as_deref().unwrap().contains("company number"));
        assert_eq!(data.company_name.as_deref(), Some("Alpha Muscle Gym Ltd"));
        assert_eq!(data.email.as_deref(), Some("info@alphamusclegym.co.uk"));
        assert_eq!(data.phone.as_deref(), Some("0161 496 0000"));
        assert_eq!(data.vat_number.as_deref(), Some("GB123456789"));
        assert_eq!(
            data.description.as_deref(),
            Some("Manchester's friendliest 24 hour gym.")
        );
        assert_eq!(data.address.as_deref(), Some("1 Gym Lane, Manchester, M1 2AB"));
        assert_eq!(
            data.social_links["facebook"],
            "https://www.facebook.com/alphamusclegym"
        );
        assert!(data.content_hash.is_some());
        assert!(data.notes.is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_returns_empty_data_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let collector = Collector::with_default_timeout().unwrap();
        let data = collector.collect(&server.uri(), "Anything Ltd").await.unwrap();

        assert!(data.crn.is_none());
        assert!(data.company_name.is_none());
        assert_eq!(data.notes.len(), 1);
        assert!(data.notes[0].contains("fetch failed"));
    }

    #[tokio::test]
    async fn unreachable_host_is_not_fatal() {
        let collector = Collector::new(Duration::from_millis(200)).unwrap();
        let data = collector
            .collect("http://127.0.0.1:9/nothing", "Anything Ltd")
            .await
            .unwrap();
        assert!(data.notes[0].contains("fetch failed"));
    }

    #[tokio::test]
    async fn empty_url_is_a_contract_violation() {
        let collector = Collector::with_default_timeout().unwrap();
        let err = collector.collect("  ", "Anything Ltd").await.unwrap_err();
        assert!(matches!(err, KybError::Validation { .. }));
    }

    #[tokio::test]
    async fn about_page_fallback_for_description() {
        let server = MockServer::start().await;
        let landing = r#"<html><body>
            <a href="/about">About us</a>
            <footer>© 2024 Beta Bakery Ltd</footer>
        </body></html>"#;
        let about = r#"<html><body>
            <section class="about"><p>Family bakers since 1932.</p></section>
        </body></html>"#;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(landing))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(200).set_body_string(about))
            .mount(&server)
            .await;

        let collector = Collector::with_default_timeout().unwrap();
        let data = collector.collect(&server.uri(), "Beta Bakery").await.unwrap();

        assert_eq!(data.description.as_deref(), Some("Family bakers since 1932."));
        assert!(data.notes.iter().any(|note| note.contains("description taken from")));
    }

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url("alphagym.co.uk"), "https://alphagym.co.uk");
        assert_eq!(
            normalize_url("http://alphagym.co.uk"),
            "http://alphagym.co.uk"
        );
        assert_eq!(normalize_url("  example.com  "), "https://example.com");
    }
}
