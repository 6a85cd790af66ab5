//! The job orchestrator: drives a verification job through its stages and
//! owns every state transition.
//!
//! One parameterized [`Orchestrator::run_pipeline`] serves both fresh
//! submissions and continuations — a continuation just picks its entry
//! stage and seeds the candidate identity from user input. The audit log
//! records what happened; it is never read back to decide what happens
//! next.
//!
//! Design goal: almost every anticipated failure routes to
//! `action_required` with machine-readable `required_fields`; the `failed`
//! state is reserved for genuinely unexpected errors.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use kybcheck_discovery::DiscoveryService;
use kybcheck_registry::{CrnVerification, FetchedProfile, RegistryClient};
use kybcheck_resolver::{CrnResolver, Resolution};
use kybcheck_shared::{
    CandidateIdentity, CheckOutcome, Confidence, ContinueInput, CrnSource, JobId, JobStatus,
    KybError, LogEntry, LogEvent, Officer, RequiredFields, Result, VerificationDetails,
    VerificationResult, VerificationStatus, WebsiteSource,
};
use kybcheck_similarity::similarity;
use kybcheck_storage::JobStore;
use kybcheck_webintel::{Collector, WebsiteData};

use crate::crossval::{self, CrossValidation};
use crate::queue::JobRequest;

/// Registry name similarity below this means the resolved company is
/// clearly not the one requested.
const NAME_REJECT_THRESHOLD: f64 = 0.3;

/// Below this (and at or above the reject threshold) the match is
/// plausible but needs human confirmation.
const NAME_CONFIRM_THRESHOLD: f64 = 0.5;

/// Similarity needed for a secondary-search hit to be flagged as an
/// alternative CRN.
const ALT_CRN_THRESHOLD: f64 = 0.8;

/// Entry point into the stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStage {
    /// Resolve the business name to a CRN first.
    Resolution,
    /// A CRN is already in hand; go straight to registry verification.
    Verification,
}

/// Drives verification jobs. All collaborators are owned; the orchestrator
/// is shared behind an [`Arc`] by the queue worker.
pub struct Orchestrator {
    store: Arc<JobStore>,
    resolver: CrnResolver,
    registry: RegistryClient,
    discovery: DiscoveryService,
    collector: Collector,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        resolver: CrnResolver,
        registry: RegistryClient,
        discovery: DiscoveryService,
        collector: Collector,
    ) -> Self {
        Self {
            store,
            resolver,
            registry,
            discovery,
            collector,
        }
    }

    /// Execute one queued request to completion or to its next pause.
    /// Never returns an error: failures are recorded on the job itself.
    pub async fn handle(&self, request: JobRequest) {
        let (job_id, outcome) = match request {
            JobRequest::Start { job_id } => (job_id, self.run_fresh(job_id).await),
            JobRequest::Continue { job_id, input } => {
                (job_id, self.run_continuation(job_id, input).await)
            }
        };

        if let Err(e) = outcome {
            self.record_failure(job_id, e).await;
        }
    }

    #[instrument(skip(self))]
    async fn run_fresh(&self, job_id: JobId) -> Result<()> {
        let job = self.require_job(job_id).await?;
        self.log(
            job_id,
            LogEvent::OriginalRequest {
                business_name: job.business_name.clone(),
            },
        )
        .await?;

        self.run_pipeline(
            job_id,
            &job.business_name,
            &job.current_name,
            StartStage::Resolution,
            CandidateIdentity::default(),
        )
        .await
    }

    #[instrument(skip(self, input))]
    async fn run_continuation(&self, job_id: JobId, input: ContinueInput) -> Result<()> {
        let job = self.require_job(job_id).await?;
        if job.status != JobStatus::ActionRequired {
            warn!(status = %job.status, "continuation for a job not awaiting input, ignoring");
            return Ok(());
        }

        self.log(
            job_id,
            LogEvent::Continuation {
                input: input.clone(),
            },
        )
        .await?;

        let mut candidate = CandidateIdentity::default();
        if let Some(website) = non_blank(input.website.as_deref()) {
            candidate.website = Some(website.to_string());
            candidate.website_source = Some(WebsiteSource::UserProvided);
        }

        // A corrected name applies even when a CRN is also given; the CRN
        // then decides the entry stage.
        let mut current_name = job.current_name.clone();
        if let Some(name) = non_blank(input.company_name.as_deref()) {
            self.store.set_current_name(job_id, name).await?;
            current_name = name.to_string();
        }

        if let Some(crn) = non_blank(input.crn.as_deref()) {
            candidate.crn = Some(crn.to_uppercase());
            candidate.crn_source = Some(CrnSource::UserProvided);
            return self
                .run_pipeline(
                    job_id,
                    &job.business_name,
                    &current_name,
                    StartStage::Verification,
                    candidate,
                )
                .await;
        }

        if non_blank(input.company_name.as_deref()).is_some() {
            return self
                .run_pipeline(
                    job_id,
                    &job.business_name,
                    &current_name,
                    StartStage::Resolution,
                    candidate,
                )
                .await;
        }

        // Nothing that can move the job forward; the attempt itself is
        // logged above, then the same request for input is re-raised. The
        // job still passes through processing so the status trace matches
        // every other continuation cycle.
        self.store.set_status(job_id, JobStatus::Processing).await?;
        self.raise_action_required(
            job_id,
            "a company registration number is still required".to_string(),
            crn_fields(),
        )
        .await
    }

    /// The stage sequence: resolution → registry verification → website
    /// collection → cross-validation → compile.
    async fn run_pipeline(
        &self,
        job_id: JobId,
        business_name: &str,
        current_name: &str,
        start: StartStage,
        mut candidate: CandidateIdentity,
    ) -> Result<()> {
        self.store.set_status(job_id, JobStatus::Processing).await?;

        // --- Identity resolution -------------------------------------------
        if start == StartStage::Resolution {
            let report = self.resolver.resolve(current_name).await?;
            for event in report.events {
                self.log(job_id, event).await?;
            }

            match report.outcome {
                Resolution::Resolved {
                    crn,
                    source,
                    company_name,
                    similarity: score,
                } => {
                    candidate.crn = Some(crn);
                    candidate.crn_source = Some(source);
                    candidate.company_name = company_name;
                    candidate.confidence = score.map(Confidence::from_similarity);
                }
                Resolution::NotFound => {
                    return self.complete_not_found(job_id, business_name).await;
                }
                Resolution::Unresolved => {
                    return self
                        .raise_action_required(
                            job_id,
                            format!(
                                "could not resolve {current_name:?} to a company \
                                 registration number"
                            ),
                            unresolved_fields(),
                        )
                        .await;
                }
            }
        }

        let Some(crn) = candidate.crn.clone() else {
            return self
                .raise_action_required(
                    job_id,
                    "no company registration number available".to_string(),
                    crn_fields(),
                )
                .await;
        };
        let source = candidate.crn_source.unwrap_or(CrnSource::UserProvided);

        // --- Registry verification -----------------------------------------
        let fetched = match self.registry.verify(&crn).await? {
            CrnVerification::InvalidFormat => {
                return self
                    .raise_action_required(
                        job_id,
                        format!("{crn:?} is not a valid company registration number"),
                        crn_fields(),
                    )
                    .await;
            }
            CrnVerification::NotFound => {
                return self
                    .raise_action_required(
                        job_id,
                        format!("the registry has no company numbered {crn}"),
                        crn_fields(),
                    )
                    .await;
            }
            CrnVerification::Inactive { status, profile } => {
                let name = profile.profile.company_name.clone();
                self.log(
                    job_id,
                    LogEvent::RegistryCheck {
                        crn: crn.clone(),
                        company_status: status.clone(),
                        company_name: name.clone(),
                        similarity: similarity(current_name, &name),
                    },
                )
                .await?;
                return self
                    .raise_action_required(
                        job_id,
                        format!("{name} ({crn}) is {status}; verification requires an active company"),
                        crn_fields(),
                    )
                    .await;
            }
            CrnVerification::Active(fetched) => fetched,
        };

        let registry_name = fetched.profile.company_name.clone();
        let name_similarity = similarity(current_name, &registry_name);
        self.log(
            job_id,
            LogEvent::RegistryCheck {
                crn: crn.clone(),
                company_status: "active".to_string(),
                company_name: registry_name.clone(),
                similarity: name_similarity,
            },
        )
        .await?;

        // A user-provided CRN is taken at its word; resolved CRNs must
        // clear the similarity bands.
        if source != CrnSource::UserProvided {
            if name_similarity < NAME_REJECT_THRESHOLD {
                return self
                    .raise_action_required(
                        job_id,
                        format!(
                            "{registry_name} ({crn}) does not appear to be the requested \
                             company {current_name:?}"
                        ),
                        mismatch_fields(),
                    )
                    .await;
            }
            if name_similarity < NAME_CONFIRM_THRESHOLD {
                return self
                    .raise_action_required(
                        job_id,
                        format!(
                            "{registry_name} ({crn}) only loosely matches \
                             {current_name:?}; resubmit this CRN to confirm it, or \
                             supply a different one"
                        ),
                        confirm_fields(&crn),
                    )
                    .await;
            }
        }

        // --- Website collection --------------------------------------------
        let website_url = match candidate.website.clone() {
            Some(url) => {
                self.log(
                    job_id,
                    LogEvent::WebsiteDiscovered {
                        url: url.clone(),
                        source: candidate.website_source.unwrap_or(WebsiteSource::UserProvided),
                    },
                )
                .await?;
                url
            }
            None => {
                let found = self.discovery.discover(&registry_name).await?;
                if let Some(note) = &found.note {
                    self.log(
                        job_id,
                        LogEvent::Note {
                            message: note.clone(),
                        },
                    )
                    .await?;
                }
                self.log(
                    job_id,
                    LogEvent::WebsiteDiscovered {
                        url: found.website.clone(),
                        source: found.source,
                    },
                )
                .await?;
                found.website
            }
        };

        let web = self.collector.collect(&website_url, &registry_name).await?;
        self.log(
            job_id,
            LogEvent::WebsiteCollected {
                url: web.url.clone(),
                crn_found: web.crn.clone(),
                company_name_found: web.company_name.clone(),
            },
        )
        .await?;
        for note in &web.notes {
            self.log(
                job_id,
                LogEvent::Note {
                    message: note.clone(),
                },
            )
            .await?;
        }

        // --- Cross-validation ----------------------------------------------
        let mut cv = crossval::cross_validate(current_name, &fetched.profile, &web);

        // A name mismatch triggers a secondary search for the website's
        // name; a strong alternative hit is recorded, never auto-accepted.
        if let Some(web_name) = cv.mismatched_name.clone() {
            match self.registry.search_companies(&web_name).await {
                Ok(items) => {
                    let alternative = items.iter().find(|item| {
                        item.company_number != crn
                            && similarity(&web_name, &item.title) > ALT_CRN_THRESHOLD
                    });
                    if let Some(alt) = alternative {
                        cv.issues.push(format!(
                            "the website may belong to {} (CRN {})",
                            alt.title, alt.company_number
                        ));
                    }
                }
                Err(e) => {
                    self.log(
                        job_id,
                        LogEvent::Note {
                            message: format!("secondary name search for {web_name:?} failed: {e}"),
                        },
                    )
                    .await?;
                }
            }
        }

        self.log(
            job_id,
            LogEvent::CrossValidated {
                crn_match: cv.crn_match(),
                name_match: cv.name_match(),
                address_match: cv.address_match(),
                issue_count: cv.issues.len(),
            },
        )
        .await?;

        // --- Compile --------------------------------------------------------
        let directors = match self.registry.officers(&crn).await {
            Ok(officers) => officers,
            Err(e) => {
                self.log(
                    job_id,
                    LogEvent::Note {
                        message: format!("officer lookup failed: {e}"),
                    },
                )
                .await?;
                Vec::new()
            }
        };
        let beneficial_owners = match self.registry.pscs(&crn).await {
            Ok(pscs) => pscs,
            Err(e) => {
                self.log(
                    job_id,
                    LogEvent::Note {
                        message: format!("PSC lookup failed: {e}"),
                    },
                )
                .await?;
                Vec::new()
            }
        };

        let result = compile_result(
            business_name,
            &fetched,
            web,
            cv,
            directors,
            beneficial_owners,
        );
        self.store.set_result(job_id, &result).await?;
        self.log(
            job_id,
            LogEvent::Completed {
                result: Box::new(result),
            },
        )
        .await?;
        self.store.set_status(job_id, JobStatus::Completed).await?;
        info!(%job_id, "job completed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Terminal transitions
    // -----------------------------------------------------------------------

    /// Conclusive "no such company": a successful completion, not a failure.
    async fn complete_not_found(&self, job_id: JobId, business_name: &str) -> Result<()> {
        let result = VerificationResult::no_company_found(business_name);
        self.store.set_result(job_id, &result).await?;
        self.log(
            job_id,
            LogEvent::Completed {
                result: Box::new(result),
            },
        )
        .await?;
        self.store.set_status(job_id, JobStatus::Completed).await?;
        info!(%job_id, "job completed: no company found");
        Ok(())
    }

    async fn raise_action_required(
        &self,
        job_id: JobId,
        message: String,
        required_fields: RequiredFields,
    ) -> Result<()> {
        debug_assert!(!required_fields.is_empty());
        info!(%job_id, message, "job paused awaiting input");
        self.log(
            job_id,
            LogEvent::ActionRequired {
                message,
                required_fields,
            },
        )
        .await?;
        self.store
            .set_status(job_id, JobStatus::ActionRequired)
            .await
    }

    /// Classify an escaped error. Auth, quota, and transient upstream
    /// problems are actionable and pause the job; only the residual
    /// catch-all is a terminal failure.
    async fn record_failure(&self, job_id: JobId, error: KybError) {
        let outcome = match &error {
            KybError::RegistryAuth(_) | KybError::RegistryRateLimit(_) => {
                self.raise_action_required(
                    job_id,
                    format!("registry request rejected: {error}; continue once access is restored"),
                    crn_fields(),
                )
                .await
            }
            KybError::RegistryApi(_) | KybError::Network(_) => {
                self.raise_action_required(
                    job_id,
                    format!(
                        "registry temporarily unavailable ({error}); resubmit the CRN to retry"
                    ),
                    crn_fields(),
                )
                .await
            }
            _ => {
                error!(%job_id, %error, "job failed");
                let logged = self
                    .log(
                        job_id,
                        LogEvent::Failed {
                            error: error.to_string(),
                        },
                    )
                    .await;
                match logged {
                    Ok(()) => self.store.set_status(job_id, JobStatus::Failed).await,
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = outcome {
            error!(%job_id, %e, "failed to record job failure");
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn require_job(&self, job_id: JobId) -> Result<kybcheck_storage::JobRecord> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| KybError::validation(format!("unknown job {job_id}")))
    }

    async fn log(&self, job_id: JobId, event: LogEvent) -> Result<()> {
        self.store.append_log(job_id, &LogEntry::now(event)).await
    }
}

// ---------------------------------------------------------------------------
// Result compilation
// ---------------------------------------------------------------------------

fn compile_result(
    business_name: &str,
    fetched: &FetchedProfile,
    web: WebsiteData,
    cv: CrossValidation,
    directors: Vec<Officer>,
    beneficial_owners: Vec<Officer>,
) -> VerificationResult {
    let profile = &fetched.profile;

    let website_data_validation = if web.crn.is_some()
        || web.company_name.is_some()
        || web.address.is_some()
        || web.email.is_some()
        || web.phone.is_some()
    {
        CheckOutcome::pass("website yielded identifying data")
    } else {
        CheckOutcome::warn("no identifying data found on the website")
    };

    let verification_status = if cv.issues.is_empty() {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Warning(cv.issues.join("; "))
    };

    VerificationResult {
        requested_name: business_name.to_string(),
        company_name: Some(profile.company_name.clone()),
        crn: Some(profile.company_number.clone()),
        company_status: profile.company_status.clone(),
        company_type: profile.company_type.clone(),
        incorporation_date: profile.date_of_creation.clone(),
        jurisdiction: profile.jurisdiction.clone(),
        sic_codes: profile.sic_codes.clone(),
        registered_address: profile
            .registered_office_address
            .as_ref()
            .map(|addr| addr.to_single_line()),
        operational_address: web.address.clone(),
        website: Some(web.url.clone()),
        description: web.description.clone(),
        vat_number: web.vat_number.clone(),
        emails: web.emails.clone(),
        phone: web.phone.clone(),
        social_links: web.social_links.clone(),
        directors,
        beneficial_owners,
        verification_status,
        verification_details: VerificationDetails {
            crn_validation: cv.crn,
            name_validation: cv.name,
            address_validation: cv.address,
            website_data_validation,
        },
        validation_issues: cv.issues,
        raw_data: serde_json::json!({ "company_profile": fetched.raw }),
    }
}

// ---------------------------------------------------------------------------
// Required-field vocabularies
// ---------------------------------------------------------------------------

fn crn_fields() -> RequiredFields {
    RequiredFields::from([(
        "crn".to_string(),
        "the registration number of an active company".to_string(),
    )])
}

fn unresolved_fields() -> RequiredFields {
    RequiredFields::from([
        (
            "crn".to_string(),
            "the company's registration number".to_string(),
        ),
        (
            "company_name".to_string(),
            "a corrected or fuller company name to retry resolution with".to_string(),
        ),
        (
            "website".to_string(),
            "the company's website, if known".to_string(),
        ),
    ])
}

fn mismatch_fields() -> RequiredFields {
    RequiredFields::from([
        (
            "crn".to_string(),
            "the registration number of the intended company".to_string(),
        ),
        (
            "company_name".to_string(),
            "the intended company's registered name".to_string(),
        ),
    ])
}

fn confirm_fields(crn: &str) -> RequiredFields {
    RequiredFields::from([(
        "crn".to_string(),
        format!("resubmit {crn} to confirm the match, or supply a different CRN"),
    )])
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use kybcheck_discovery::DiscoveryOptions;
    use kybcheck_resolver::AiClient;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Harness {
        server: MockServer,
        store: Arc<JobStore>,
        orchestrator: Orchestrator,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(
            JobStore::open(&dir.path().join("jobs.db"))
                .await
                .expect("open store"),
        );

        let ai = AiClient::new(&server.uri(), "ai-key", "test-model", TIMEOUT).unwrap();
        let registry = RegistryClient::new(&server.uri(), "registry-key", TIMEOUT).unwrap();
        let resolver = CrnResolver::standard(ai, registry.clone());
        let discovery = DiscoveryService::new(DiscoveryOptions {
            primary_base_url: format!("{}/serp", server.uri()),
            secondary_base_url: format!("{}/serp2", server.uri()),
            api_base_url: format!("{}/serpapi", server.uri()),
            api_key: None,
            timeout: TIMEOUT,
        })
        .unwrap();
        let collector = Collector::new(TIMEOUT).unwrap();

        let orchestrator =
            Orchestrator::new(store.clone(), resolver, registry, discovery, collector);

        Harness {
            server,
            store,
            orchestrator,
            _dir: dir,
        }
    }

    async fn mock_ai(server: &MockServer, content: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })))
            .mount(server)
            .await;
    }

    async fn mock_profile(server: &MockServer, crn: &str, name: &str, status: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/company/{crn}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "company_name": name,
                "company_number": crn,
                "company_status": status,
                "type": "ltd",
                "date_of_creation": "2015-03-02",
                "jurisdiction": "england-wales",
                "sic_codes": ["93130"],
                "registered_office_address": {
                    "address_line_1": "1 Gym Lane",
                    "locality": "Manchester",
                    "postal_code": "M1 2AB",
                    "country": "England"
                }
            })))
            .mount(server)
            .await;
    }

    async fn mock_people(server: &MockServer, crn: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/company/{crn}/officers")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"name": "SMITH, Jane", "officer_role": "director", "appointed_on": "2015-03-02"}
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/company/{crn}/persons-with-significant-control"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "name": "Ms Jane Smith",
                        "natures_of_control": ["ownership-of-shares-75-to-100-percent"],
                        "notified_on": "2016-04-06"
                    }
                ]
            })))
            .mount(server)
            .await;
    }

    async fn mock_website(server: &MockServer, crn_on_page: &str) {
        // SERP pointing at the mock's own /site page.
        let site_url = format!("{}/site", server.uri());
        Mock::given(method("GET"))
            .and(path("/serp"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><body><a class="result__a" href="{site_url}">Alpha Muscle Gym — Official Site</a></body></html>"#
            )))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/site"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html>
                <head>
                    <title>Alpha Muscle Gym — Manchester</title>
                    <meta name="description" content="Manchester's friendliest 24 hour gym.">
                </head>
                <body>
                    <main><p>Open every day. Email info@alphamusclegym.co.uk.</p></main>
                    <footer>
                        <address>1 Gym Lane, Manchester, M1 2AB</address>
                        © 2024 Alpha Muscle Gym Ltd. All rights reserved.
                        Registered in England and Wales under company number {crn_on_page}.
                    </footer>
                </body>
                </html>"#
            )))
            .mount(server)
            .await;
    }

    async fn parsed_log(store: &JobStore, job_id: JobId) -> Vec<LogEvent> {
        store
            .log_entries(job_id)
            .await
            .unwrap()
            .iter()
            .map(|entry| entry.parse().unwrap().event)
            .collect()
    }

    #[tokio::test]
    async fn happy_path_verifies_company() {
        let h = harness().await;
        mock_ai(
            &h.server,
            r#"{"crn": "12345678", "company_name": "ALPHA MUSCLE GYM LIMITED"}"#,
        )
        .await;
        mock_profile(&h.server, "12345678", "ALPHA MUSCLE GYM LIMITED", "active").await;
        mock_people(&h.server, "12345678").await;
        mock_website(&h.server, "12345678").await;

        let job_id = JobId::new();
        h.store.create_job(job_id, "Alpha Muscle Gym Ltd").await.unwrap();
        h.orchestrator.handle(JobRequest::Start { job_id }).await;

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let result = job.result.expect("result compiled");
        assert_eq!(result.verification_status, VerificationStatus::Verified);
        assert_eq!(result.crn.as_deref(), Some("12345678"));
        assert_eq!(result.company_name.as_deref(), Some("ALPHA MUSCLE GYM LIMITED"));
        assert!(result.validation_issues.is_empty());
        assert_eq!(result.directors.len(), 1);
        assert_eq!(result.beneficial_owners.len(), 1);
        assert!(result.registered_address.as_deref().unwrap().contains("Gym Lane"));
        assert_eq!(result.raw_data["company_profile"]["company_number"], "12345678");

        let log = parsed_log(&h.store, job_id).await;
        assert!(matches!(log[0], LogEvent::OriginalRequest { .. }));
        assert!(log.iter().any(|e| matches!(e, LogEvent::RegistryCheck { .. })));
        assert!(log.iter().any(|e| matches!(e, LogEvent::WebsiteDiscovered { .. })));
        assert!(log.iter().any(|e| matches!(e, LogEvent::WebsiteCollected { .. })));
        assert!(log.iter().any(|e| matches!(e, LogEvent::CrossValidated { issue_count: 0, .. })));
        assert!(matches!(log.last().unwrap(), LogEvent::Completed { .. }));
    }

    #[tokio::test]
    async fn unresolvable_name_pauses_then_bad_crn_pauses_again() {
        let h = harness().await;
        // The model has never heard of it and the search finds nothing.
        mock_ai(&h.server, "That name is unfamiliar to me.").await;
        Mock::given(method("GET"))
            .and(path("/search/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&h.server)
            .await;

        let job_id = JobId::new();
        h.store
            .create_job(job_id, "Qzxyabc Nonexistent Corp")
            .await
            .unwrap();
        h.orchestrator.handle(JobRequest::Start { job_id }).await;

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ActionRequired);

        let log = parsed_log(&h.store, job_id).await;
        let Some(LogEvent::ActionRequired { required_fields, .. }) = log.last() else {
            panic!("expected action_required entry, got {:?}", log.last());
        };
        assert!(required_fields.contains_key("crn"));

        // Continue with a structurally invalid CRN: the cycle re-enters.
        h.orchestrator
            .handle(JobRequest::Continue {
                job_id,
                input: ContinueInput {
                    crn: Some("1234".into()),
                    ..Default::default()
                },
            })
            .await;

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ActionRequired);

        let log = parsed_log(&h.store, job_id).await;
        let pauses = log
            .iter()
            .filter(|e| matches!(e, LogEvent::ActionRequired { .. }))
            .count();
        assert_eq!(pauses, 2);
        assert!(log.iter().any(|e| matches!(e, LogEvent::Continuation { .. })));
    }

    #[tokio::test]
    async fn dissolved_company_requests_active_crn() {
        let h = harness().await;
        mock_ai(
            &h.server,
            r#"{"crn": "12345678", "company_name": "OLD VENTURES LIMITED"}"#,
        )
        .await;
        mock_profile(&h.server, "12345678", "OLD VENTURES LIMITED", "dissolved").await;

        let job_id = JobId::new();
        h.store.create_job(job_id, "Old Ventures Ltd").await.unwrap();
        h.orchestrator.handle(JobRequest::Start { job_id }).await;

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ActionRequired);

        let log = parsed_log(&h.store, job_id).await;
        let Some(LogEvent::ActionRequired { message, required_fields }) = log.last() else {
            panic!("expected action_required entry");
        };
        assert!(message.contains("dissolved"));
        assert!(required_fields["crn"].contains("active"));
    }

    #[tokio::test]
    async fn conclusive_negative_completes_with_no_company_found() {
        let h = harness().await;
        // First AI pass: unparseable. Constrained pass: explicit negative.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Hmm, hard to say."}}]
            })))
            .up_to_n_times(1)
            .mount(&h.server)
            .await;
        mock_ai(&h.server, r#"{"found": false}"#).await;
        Mock::given(method("GET"))
            .and(path("/search/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&h.server)
            .await;

        let job_id = JobId::new();
        h.store
            .create_job(job_id, "Qzxyabc Nonexistent Corp")
            .await
            .unwrap();
        h.orchestrator.handle(JobRequest::Start { job_id }).await;

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let result = job.result.expect("null result compiled");
        assert_eq!(result.verification_status, VerificationStatus::NoCompanyFound);
        assert!(result.crn.is_none());
        assert!(result.company_name.is_none());
    }

    #[tokio::test]
    async fn scraped_crn_mismatch_yields_warning() {
        let h = harness().await;
        mock_ai(
            &h.server,
            r#"{"crn": "12345678", "company_name": "ALPHA MUSCLE GYM LIMITED"}"#,
        )
        .await;
        mock_profile(&h.server, "12345678", "ALPHA MUSCLE GYM LIMITED", "active").await;
        mock_people(&h.server, "12345678").await;
        // The website displays someone else's number.
        mock_website(&h.server, "87654321").await;

        let job_id = JobId::new();
        h.store.create_job(job_id, "Alpha Muscle Gym Ltd").await.unwrap();
        h.orchestrator.handle(JobRequest::Start { job_id }).await;

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let result = job.result.unwrap();
        match &result.verification_status {
            VerificationStatus::Warning(reason) => {
                assert!(reason.contains("87654321"));
                assert!(reason.contains("12345678"));
            }
            other => panic!("expected warning status, got {other:?}"),
        }
        assert_eq!(result.validation_issues.len(), 1);

        let log = parsed_log(&h.store, job_id).await;
        assert!(log.iter().any(|e| matches!(
            e,
            LogEvent::CrossValidated { crn_match: false, issue_count: 1, .. }
        )));
    }

    #[tokio::test]
    async fn registry_outage_during_verify_pauses_instead_of_failing() {
        let h = harness().await;
        // Park the job: the model is clueless and the search is empty.
        mock_ai(&h.server, "That name is unfamiliar to me.").await;
        Mock::given(method("GET"))
            .and(path("/search/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&h.server)
            .await;
        // The registry is down when the user supplies a CRN.
        Mock::given(method("GET"))
            .and(path("/company/12345678"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&h.server)
            .await;

        let job_id = JobId::new();
        h.store.create_job(job_id, "Alpha Muscle Gym Ltd").await.unwrap();
        h.orchestrator.handle(JobRequest::Start { job_id }).await;
        assert_eq!(
            h.store.get_job(job_id).await.unwrap().unwrap().status,
            JobStatus::ActionRequired
        );

        h.orchestrator
            .handle(JobRequest::Continue {
                job_id,
                input: ContinueInput {
                    crn: Some("12345678".into()),
                    ..Default::default()
                },
            })
            .await;

        // A transient 500 must pause the job, not terminally fail it.
        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ActionRequired);

        let log = parsed_log(&h.store, job_id).await;
        let Some(LogEvent::ActionRequired { message, required_fields }) = log.last() else {
            panic!("expected action_required entry, got {:?}", log.last());
        };
        assert!(message.contains("temporarily unavailable"));
        assert!(required_fields.contains_key("crn"));
        assert!(!log.iter().any(|e| matches!(e, LogEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn multibyte_crn_continuation_pauses_cleanly() {
        let h = harness().await;
        mock_ai(&h.server, "That name is unfamiliar to me.").await;
        Mock::given(method("GET"))
            .and(path("/search/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&h.server)
            .await;

        let job_id = JobId::new();
        h.store.create_job(job_id, "Alpha Muscle Gym Ltd").await.unwrap();
        h.orchestrator.handle(JobRequest::Start { job_id }).await;

        // A CRN whose second character boundary falls mid-codepoint must be
        // rejected as invalid, never panic the worker.
        h.orchestrator
            .handle(JobRequest::Continue {
                job_id,
                input: ContinueInput {
                    crn: Some("€1234567".into()),
                    ..Default::default()
                },
            })
            .await;

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ActionRequired);

        let log = parsed_log(&h.store, job_id).await;
        let Some(LogEvent::ActionRequired { message, .. }) = log.last() else {
            panic!("expected action_required entry");
        };
        assert!(message.contains("not a valid"));
    }

    #[tokio::test]
    async fn empty_continuation_cycles_back_to_action_required() {
        let h = harness().await;
        mock_ai(&h.server, "That name is unfamiliar to me.").await;
        Mock::given(method("GET"))
            .and(path("/search/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&h.server)
            .await;

        let job_id = JobId::new();
        h.store.create_job(job_id, "Alpha Muscle Gym Ltd").await.unwrap();
        h.orchestrator.handle(JobRequest::Start { job_id }).await;

        h.orchestrator
            .handle(JobRequest::Continue {
                job_id,
                input: ContinueInput::default(),
            })
            .await;

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::ActionRequired);

        // The attempt is logged and the request for input re-raised.
        let log = parsed_log(&h.store, job_id).await;
        assert!(log.iter().any(|e| matches!(e, LogEvent::Continuation { .. })));
        let pauses = log
            .iter()
            .filter(|e| matches!(e, LogEvent::ActionRequired { .. }))
            .count();
        assert_eq!(pauses, 2);
    }

    #[tokio::test]
    async fn continuation_for_non_paused_job_is_ignored() {
        let h = harness().await;
        let job_id = JobId::new();
        h.store.create_job(job_id, "Alpha Muscle Gym Ltd").await.unwrap();

        h.orchestrator
            .handle(JobRequest::Continue {
                job_id,
                input: ContinueInput::default(),
            })
            .await;

        let job = h.store.get_job(job_id).await.unwrap().unwrap();
        // Still pending; nothing was logged or transitioned.
        assert_eq!(job.status, JobStatus::Pending);
        assert!(h.store.log_entries(job_id).await.unwrap().is_empty());
    }
}
