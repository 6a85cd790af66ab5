//! HTTP client for the Companies House REST API.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use kybcheck_shared::{KybError, Officer, RegisteredAddress, Result};

use crate::format::validate_crn_format;

/// User-Agent string for registry requests.
const USER_AGENT: &str = concat!("kybcheck/", env!("CARGO_PKG_VERSION"));

/// Search results requested per name search.
const SEARCH_PAGE_SIZE: u32 = 20;

// ---------------------------------------------------------------------------
// Response types (matching the registry's JSON shape)
// ---------------------------------------------------------------------------

/// A company profile as returned by `GET /company/{crn}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub company_name: String,
    pub company_number: String,
    #[serde(default)]
    pub company_status: Option<String>,
    #[serde(rename = "type", default)]
    pub company_type: Option<String>,
    #[serde(default)]
    pub date_of_creation: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub sic_codes: Vec<String>,
    #[serde(default)]
    pub registered_office_address: Option<RegisteredAddress>,
}

impl CompanyProfile {
    /// Whether the registry reports this company as active.
    pub fn is_active(&self) -> bool {
        self.company_status.as_deref() == Some("active")
    }
}

/// A typed profile together with the raw upstream payload, retained for the
/// final report's audit trail.
#[derive(Debug, Clone)]
pub struct FetchedProfile {
    pub profile: CompanyProfile,
    pub raw: serde_json::Value,
}

/// One hit from `GET /search/companies`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanySearchItem {
    pub title: String,
    pub company_number: String,
    #[serde(default)]
    pub company_status: Option<String>,
    #[serde(default)]
    pub address_snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<CompanySearchItem>,
}

#[derive(Debug, Deserialize)]
struct OfficerItem {
    name: String,
    #[serde(default)]
    officer_role: Option<String>,
    #[serde(default)]
    appointed_on: Option<String>,
    #[serde(default)]
    resigned_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OfficerListResponse {
    #[serde(default)]
    items: Vec<OfficerItem>,
}

#[derive(Debug, Deserialize)]
struct PscItem {
    name: String,
    #[serde(default)]
    natures_of_control: Vec<String>,
    #[serde(default)]
    notified_on: Option<String>,
    #[serde(default)]
    ceased_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PscListResponse {
    #[serde(default)]
    items: Vec<PscItem>,
}

// ---------------------------------------------------------------------------
// CRN verification outcome
// ---------------------------------------------------------------------------

/// Outcome of verifying a candidate CRN against the registry.
#[derive(Debug, Clone)]
pub enum CrnVerification {
    /// The string is not structurally a CRN; no lookup was made.
    InvalidFormat,
    /// The registry has no company under this number (conclusive, not retryable).
    NotFound,
    /// An active company exists under this number.
    Active(FetchedProfile),
    /// A company exists but is not active (dissolved, liquidation, ...).
    /// Verification needs a different CRN, not a pipeline failure.
    Inactive {
        status: String,
        profile: FetchedProfile,
    },
}

// ---------------------------------------------------------------------------
// RegistryClient
// ---------------------------------------------------------------------------

/// Client for the official company registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RegistryClient {
    /// Create a client against `base_url`, authenticating with `api_key`
    /// (HTTP basic auth, key as username — the registry's scheme).
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| KybError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Fetch the profile for a single company.
    #[instrument(skip(self))]
    pub async fn company_profile(&self, crn: &str) -> Result<FetchedProfile> {
        let url = format!("{}/company/{}", self.base_url, crn.trim());
        let raw = self.get_json(&url, &format!("company {crn}")).await?;

        let profile: CompanyProfile = serde_json::from_value(raw.clone())
            .map_err(|e| KybError::parse(format!("company profile for {crn}: {e}")))?;

        debug!(
            crn,
            name = %profile.company_name,
            status = profile.company_status.as_deref().unwrap_or("unknown"),
            "fetched company profile"
        );

        Ok(FetchedProfile { profile, raw })
    }

    /// Search the registry by company name.
    #[instrument(skip(self))]
    pub async fn search_companies(&self, name: &str) -> Result<Vec<CompanySearchItem>> {
        let url = format!(
            "{}/search/companies?q={}&items_per_page={}",
            self.base_url,
            urlencode(name),
            SEARCH_PAGE_SIZE
        );
        let raw = self.get_json(&url, &format!("search for {name:?}")).await?;

        let response: SearchResponse = serde_json::from_value(raw)
            .map_err(|e| KybError::parse(format!("company search response: {e}")))?;

        debug!(name, hits = response.items.len(), "registry name search");
        Ok(response.items)
    }

    /// Current (non-resigned) officers of a company. Best-effort: a missing
    /// officer list is an empty list, not an error.
    #[instrument(skip(self))]
    pub async fn officers(&self, crn: &str) -> Result<Vec<Officer>> {
        let url = format!("{}/company/{}/officers", self.base_url, crn.trim());
        let raw = match self.get_json(&url, &format!("officers of {crn}")).await {
            Ok(raw) => raw,
            Err(KybError::RegistryNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let response: OfficerListResponse = serde_json::from_value(raw)
            .map_err(|e| KybError::parse(format!("officer list: {e}")))?;

        Ok(response
            .items
            .into_iter()
            .filter(|item| item.resigned_on.is_none())
            .map(|item| Officer {
                name: item.name,
                role: item.officer_role,
                appointed_on: item.appointed_on,
            })
            .collect())
    }

    /// Current persons with significant control (beneficial owners).
    /// Best-effort, like [`Self::officers`].
    #[instrument(skip(self))]
    pub async fn pscs(&self, crn: &str) -> Result<Vec<Officer>> {
        let url = format!(
            "{}/company/{}/persons-with-significant-control",
            self.base_url,
            crn.trim()
        );
        let raw = match self.get_json(&url, &format!("PSCs of {crn}")).await {
            Ok(raw) => raw,
            Err(KybError::RegistryNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let response: PscListResponse = serde_json::from_value(raw)
            .map_err(|e| KybError::parse(format!("PSC list: {e}")))?;

        Ok(response
            .items
            .into_iter()
            .filter(|item| item.ceased_on.is_none())
            .map(|item| Officer {
                name: item.name,
                role: (!item.natures_of_control.is_empty())
                    .then(|| item.natures_of_control.join(", ")),
                appointed_on: item.notified_on,
            })
            .collect())
    }

    /// Verify a candidate CRN: format check first (no network for garbage),
    /// then a registry lookup classifying not-found and non-active outcomes.
    #[instrument(skip(self))]
    pub async fn verify(&self, crn: &str) -> Result<CrnVerification> {
        if !validate_crn_format(crn) {
            return Ok(CrnVerification::InvalidFormat);
        }

        match self.company_profile(crn).await {
            Ok(fetched) => {
                if fetched.profile.is_active() {
                    Ok(CrnVerification::Active(fetched))
                } else {
                    let status = fetched
                        .profile
                        .company_status
                        .clone()
                        .unwrap_or_else(|| "unknown".into());
                    Ok(CrnVerification::Inactive {
                        status,
                        profile: fetched,
                    })
                }
            }
            Err(KybError::RegistryNotFound(_)) => Ok(CrnVerification::NotFound),
            Err(e) => Err(e),
        }
    }

    /// GET a URL and parse the body as JSON, mapping HTTP status classes to
    /// the registry error taxonomy.
    async fn get_json(&self, url: &str, context: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await
            .map_err(|e| KybError::Network(format!("{context}: {e}")))?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => {
                return Err(KybError::RegistryNotFound(context.to_string()));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(%status, context, "registry rejected credentials");
                return Err(KybError::RegistryAuth(format!("{context}: HTTP {status}")));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(context, "registry rate limit hit");
                return Err(KybError::RegistryRateLimit(context.to_string()));
            }
            s if !s.is_success() => {
                return Err(KybError::RegistryApi(format!("{context}: HTTP {status}")));
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| KybError::parse(format!("{context}: invalid JSON: {e}")))
    }
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
