//! Official-website discovery for a company name.
//!
//! Given only a business name, find a plausible official website. The
//! service degrades through a tiered fallback chain and always returns a
//! usable URL:
//!
//! 1. Scrape a search engine results page for 2–3 query variants
//!    (secondary provider as backup when the primary parses to nothing).
//! 2. Score and rank the deduplicated candidates.
//! 3. Best-effort paid search API call (absence of credentials is fine).
//! 4. Guess a domain from the slugified name over a UK-biased TLD list,
//!    probing each with a short HEAD request; an unresponsive first guess
//!    is still returned, explicitly annotated as unverified.

mod score;
mod serp;

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use kybcheck_shared::{KybError, Result, WebsiteSource};

pub use score::{registrable_domain, score_candidate, slugify};
pub use serp::RawCandidate;

/// User-Agent for search-engine requests. SERPs block obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default timeout for search and probe requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Probe timeout for guessed domains — existence checks should be cheap.
const PROBE_TIMEOUT: Duration = Duration::from_secs(4);

/// Number of alternative candidates reported alongside the winner.
const MAX_ALTERNATIVES: usize = 5;

/// TLDs tried when guessing, UK-first for UK-flavored names.
const UK_TLDS: &[&str] = &[".co.uk", ".uk", ".com", ".org", ".net"];
const GENERIC_TLDS: &[&str] = &[".com", ".co.uk", ".net", ".org", ".io"];

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A scored website candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub score: f64,
}

/// Outcome of website discovery. `website` is always usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredWebsite {
    pub website: String,
    pub source: WebsiteSource,
    /// Runner-up candidates, highest score first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<ScoredCandidate>,
    /// Caveats, e.g. "unverified guess".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for the discovery service.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Primary SERP endpoint (query appended as `?q=`).
    pub primary_base_url: String,
    /// Secondary SERP endpoint, used when the primary parses to nothing.
    pub secondary_base_url: String,
    /// Paid search API endpoint (Serper-style JSON POST).
    pub api_base_url: String,
    /// API key for the paid endpoint; `None` skips it silently.
    pub api_key: Option<String>,
    /// Timeout for search requests.
    pub timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            primary_base_url: "https://html.duckduckgo.com/html".into(),
            secondary_base_url: "https://www.bing.com/search".into(),
            api_base_url: "https://google.serper.dev/search".into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// DiscoveryService
// ---------------------------------------------------------------------------

/// Finds official websites for company names.
#[derive(Debug, Clone)]
pub struct DiscoveryService {
    client: Client,
    probe_client: Client,
    opts: DiscoveryOptions,
}

impl DiscoveryService {
    pub fn new(opts: DiscoveryOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(opts.timeout)
            .build()
            .map_err(|e| KybError::Network(format!("failed to build HTTP client: {e}")))?;

        let probe_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| KybError::Network(format!("failed to build probe client: {e}")))?;

        Ok(Self {
            client,
            probe_client,
            opts,
        })
    }

    /// Discover a plausible official website for `company_name`.
    ///
    /// Never fails silently: every error path degrades to the next tier,
    /// ending in an annotated domain guess.
    #[instrument(skip(self))]
    pub async fn discover(&self, company_name: &str) -> Result<DiscoveredWebsite> {
        if company_name.trim().is_empty() {
            return Err(KybError::validation("discover requires a company name"));
        }

        // Tier 1: SERP scraping, primary then secondary.
        let mut raw = self.scrape_provider(&self.opts.primary_base_url, company_name).await;
        if raw.is_empty() {
            debug!("primary search provider yielded nothing parseable, trying secondary");
            raw = self
                .scrape_provider(&self.opts.secondary_base_url, company_name)
                .await;
        }

        // Tier 2: paid search API, only when credentials exist.
        if raw.is_empty() {
            if let Some(api_key) = &self.opts.api_key {
                raw = self.search_api(company_name, api_key).await;
            }
        }

        if !raw.is_empty() {
            let scored = rank_candidates(company_name, raw);
            if let Some(best) = scored.first().cloned() {
                info!(website = %best.url, score = best.score, "website discovered via search");
                return Ok(DiscoveredWebsite {
                    website: best.url,
                    source: WebsiteSource::WebSearch,
                    candidates: scored.into_iter().skip(1).take(MAX_ALTERNATIVES).collect(),
                    note: None,
                });
            }
        }

        // Tier 3: domain guessing.
        Ok(self.guess_domain(company_name).await)
    }

    /// Scrape one SERP provider across the query variants, returning every
    /// parseable, non-denylisted candidate.
    async fn scrape_provider(&self, base_url: &str, company_name: &str) -> Vec<RawCandidate> {
        let mut all = Vec::new();
        for query in query_variants(company_name) {
            let url = format!("{base_url}?q={}", urlencode(&query));
            match self.fetch(&url).await {
                Ok(body) => {
                    let mut parsed = serp::parse_serp(&body);
                    debug!(query, results = parsed.len(), "SERP parsed");
                    all.append(&mut parsed);
                }
                Err(e) => {
                    warn!(query, error = %e, "SERP fetch failed");
                }
            }
        }
        all
    }

    /// Best-effort paid search API call (Serper-style JSON).
    async fn search_api(&self, company_name: &str, api_key: &str) -> Vec<RawCandidate> {
        let body = serde_json::json!({ "q": format!("{company_name} official website") });
        let response = self
            .client
            .post(&self.opts.api_base_url)
            .header("X-API-KEY", api_key)
            .json(&body)
            .send()
            .await;

        let value: serde_json::Value = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "search API returned invalid JSON");
                    return Vec::new();
                }
            },
            Ok(resp) => {
                warn!(status = %resp.status(), "search API request rejected");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "search API request failed");
                return Vec::new();
            }
        };

        value["organic"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(RawCandidate {
                            url: item["link"].as_str()?.to_string(),
                            title: item["title"].as_str().map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Guess a domain by slugifying the name over a TLD list, probing each.
    async fn guess_domain(&self, company_name: &str) -> DiscoveredWebsite {
        let slug = slugify(company_name);
        let tlds = if is_uk_flavored(company_name) {
            UK_TLDS
        } else {
            GENERIC_TLDS
        };

        let guesses: Vec<String> = tlds
            .iter()
            .map(|tld| format!("https://{slug}{tld}"))
            .collect();

        for guess in &guesses {
            if self.probe_exists(guess).await {
                info!(website = %guess, "guessed domain responded");
                return DiscoveredWebsite {
                    website: guess.clone(),
                    source: WebsiteSource::DomainGuess,
                    candidates: Vec::new(),
                    note: None,
                };
            }
        }

        // Nothing responded: return the first guess, clearly annotated.
        let first = guesses
            .into_iter()
            .next()
            .unwrap_or_else(|| format!("https://{slug}.co.uk"));
        warn!(website = %first, "no guessed domain responded, returning unverified guess");
        DiscoveredWebsite {
            website: first,
            source: WebsiteSource::ErrorFallback,
            candidates: Vec::new(),
            note: Some("unverified guess: no discovery strategy produced a live site".into()),
        }
    }

    /// Lightweight existence check: HEAD with a short timeout; any non-5xx
    /// response counts as "exists".
    pub async fn probe_exists(&self, url: &str) -> bool {
        match self.probe_client.head(url).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(_) => false,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
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

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The 2–3 search query variants tried per provider.
fn query_variants(company_name: &str) -> Vec<String> {
    vec![
        format!("{company_name} official website"),
        format!("{company_name} company website"),
        format!("{company_name} contact us"),
    ]
}

/// Dedupe by registrable domain, score, and sort descending.
fn rank_candidates(company_name: &str, raw: Vec<RawCandidate>) -> Vec<ScoredCandidate> {
    let mut seen_domains: Vec<String> = Vec::new();
    let mut scored: Vec<ScoredCandidate> = Vec::new();

    for candidate in raw {
        let Ok(parsed) = Url::parse(&candidate.url) else {
            continue;
        };
        let Some(host) = parsed.host_str() else {
            continue;
        };
        let domain = registrable_domain(host);
        if seen_domains.contains(&domain) {
            continue;
        }
        seen_domains.push(domain);

        let score = score_candidate(company_name, &parsed, candidate.title.as_deref());
        scored.push(ScoredCandidate {
            url: candidate.url,
            title: candidate.title,
            score,
        });
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Does the name or its keywords suggest a UK company?
fn is_uk_flavored(company_name: &str) -> bool {
    let lower = company_name.to_lowercase();
    ["uk", "ltd", "limited", "llp", "plc", "british", "london"]
        .iter()
        .any(|marker| {
            lower
                .split_whitespace()
                .any(|word| word.trim_matches(|c: char| !c.is_alphanumeric()) == *marker)
        })
}

/// Minimal percent-encoding for query values.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
