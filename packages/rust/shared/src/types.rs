//! Core domain types for kybcheck jobs and verification results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for job identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a verification job.
///
/// `pending → processing → {completed | failed | action_required}`;
/// `action_required → processing` on continuation. `Completed` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    ActionRequired,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::ActionRequired => "action_required",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "action_required" => Ok(Self::ActionRequired),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Provenance & confidence
// ---------------------------------------------------------------------------

/// Where a candidate CRN came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrnSource {
    Ai,
    RegistrySearch,
    UserProvided,
}

/// Where a candidate website URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebsiteSource {
    WebSearch,
    DomainGuess,
    ErrorFallback,
    UserProvided,
    Registry,
}

/// Qualitative confidence derived from a name-similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Band a similarity score into a qualitative confidence level.
    pub fn from_similarity(score: f64) -> Self {
        if score >= 0.9 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Intermediate resolution state threaded through the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn_source: Option<CrnSource>,
    /// Registry company name for the candidate CRN, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_source: Option<WebsiteSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

// ---------------------------------------------------------------------------
// Continuation input
// ---------------------------------------------------------------------------

/// Externally supplied data that resumes an `action_required` job.
///
/// All fields are optional; an empty continuation is accepted and simply
/// re-raises the same request for input (any forward-progress attempt is
/// logged even when it cannot resolve).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinueInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl ContinueInput {
    pub fn is_empty(&self) -> bool {
        self.crn.is_none() && self.company_name.is_none() && self.website.is_none()
    }
}

/// Machine-readable description of the inputs that would unblock a stalled
/// job: field name → human description of what is needed. Ordered so the
/// serialized form is deterministic.
pub type RequiredFields = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// An immutable fact about pipeline progress. Entries are append-only and
/// never edited or removed; insertion order is chronological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LogEvent,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    pub fn now(event: LogEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Step-specific payload of a [`LogEntry`]. One variant per pipeline step,
/// each carrying only its own fields — no optional-field guesswork.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum LogEvent {
    /// The original job submission.
    OriginalRequest { business_name: String },
    /// A continuation call with externally supplied data.
    Continuation { input: ContinueInput },
    /// A resolution strategy produced a candidate CRN.
    CrnCandidate {
        crn: String,
        source: CrnSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        company_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        similarity: Option<f64>,
    },
    /// A candidate CRN was discarded before verification.
    CandidateRejected { crn: String, reason: String },
    /// Result of verifying a CRN against the registry.
    RegistryCheck {
        crn: String,
        company_status: String,
        company_name: String,
        similarity: f64,
    },
    /// The discovery service settled on a website URL.
    WebsiteDiscovered { url: String, source: WebsiteSource },
    /// The website collector finished scraping.
    WebsiteCollected {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crn_found: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        company_name_found: Option<String>,
    },
    /// Cross-validation outcome summary.
    CrossValidated {
        crn_match: bool,
        name_match: bool,
        address_match: bool,
        issue_count: usize,
    },
    /// Automation stalled; the named fields would unblock the job.
    ActionRequired {
        message: String,
        required_fields: RequiredFields,
    },
    /// Terminal entry for a completed job, embedding the final result.
    Completed { result: Box<VerificationResult> },
    /// Terminal entry for an unexpected, unrecoverable failure.
    Failed { error: String },
    /// Free-form progress note.
    Note { message: String },
}

// ---------------------------------------------------------------------------
// VerificationResult
// ---------------------------------------------------------------------------

/// Overall verdict of a completed verification.
///
/// Serialized as a single string: `verified`, `warning: <reason>`, or
/// `no_company_found`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Verified,
    Warning(String),
    NoCompanyFound,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verified => f.write_str("verified"),
            Self::Warning(reason) => write!(f, "warning: {reason}"),
            Self::NoCompanyFound => f.write_str("no_company_found"),
        }
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "verified" => Ok(Self::Verified),
            "no_company_found" => Ok(Self::NoCompanyFound),
            other => match other.strip_prefix("warning:") {
                Some(reason) => Ok(Self::Warning(reason.trim_start().to_string())),
                None => Err(format!("unknown verification status: {other}")),
            },
        }
    }
}

impl Serialize for VerificationStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VerificationStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Outcome of a single verification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

/// A per-check status with a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub message: String,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            message: message.into(),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Skipped,
            message: message.into(),
        }
    }
}

/// Per-check breakdown embedded in the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationDetails {
    pub crn_validation: CheckOutcome,
    pub name_validation: CheckOutcome,
    pub address_validation: CheckOutcome,
    pub website_data_validation: CheckOutcome,
}

impl VerificationDetails {
    /// All checks skipped — used for `no_company_found` results.
    pub fn all_skipped(reason: &str) -> Self {
        Self {
            crn_validation: CheckOutcome::skipped(reason),
            name_validation: CheckOutcome::skipped(reason),
            address_validation: CheckOutcome::skipped(reason),
            website_data_validation: CheckOutcome::skipped(reason),
        }
    }
}

/// A registered office address as returned by the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisteredAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl RegisteredAddress {
    /// Flatten to a single comma-separated line, skipping absent parts.
    pub fn to_single_line(&self) -> String {
        [
            &self.address_line_1,
            &self.address_line_2,
            &self.locality,
            &self.region,
            &self.postal_code,
            &self.country,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// A company officer (director) or person with significant control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Officer {
    pub name: String,
    /// Officer role, or the joined natures-of-control for a PSC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointed_on: Option<String>,
}

/// The final compiled verification report. Set exactly once, when a job
/// completes; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// The business name originally submitted.
    pub requested_name: String,

    // Registry identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incorporation_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sic_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational_address: Option<String>,

    // Website enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub social_links: BTreeMap<String, String>,

    // People
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directors: Vec<Officer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub beneficial_owners: Vec<Officer>,

    // Verdict
    pub verification_status: VerificationStatus,
    pub verification_details: VerificationDetails,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_issues: Vec<String>,

    /// Full upstream payloads retained for audit/debugging.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw_data: serde_json::Value,
}

impl VerificationResult {
    /// A conclusive "no such company" report: all company fields null, all
    /// checks skipped. Modeled as a successful completion, not a failure.
    pub fn no_company_found(requested_name: &str) -> Self {
        Self {
            requested_name: requested_name.to_string(),
            company_name: None,
            crn: None,
            company_status: None,
            company_type: None,
            incorporation_date: None,
            jurisdiction: None,
            sic_codes: Vec::new(),
            registered_address: None,
            operational_address: None,
            website: None,
            description: None,
            vat_number: None,
            emails: Vec::new(),
            phone: None,
            social_links: BTreeMap::new(),
            directors: Vec::new(),
            beneficial_owners: Vec::new(),
            verification_status: VerificationStatus::NoCompanyFound,
            verification_details: VerificationDetails::all_skipped(
                "no active company found for the requested name",
            ),
            validation_issues: Vec::new(),
            raw_data: serde_json::Value::Null,
        }
    }
}
