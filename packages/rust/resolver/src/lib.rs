//! CRN resolution: turn a free-text business name into a candidate company
//! registration number.
//!
//! Resolution runs a cascade of [`ResolveStrategy`] implementations in a
//! fixed order, stopping at the first conclusive answer:
//!
//! 1. AI lookup — ask a language model for the CRN.
//! 2. Registry name search — best active hit above a similarity floor.
//! 3. Constrained AI lookup — a strict-JSON retry whose explicit negative
//!    is treated as conclusive "no such company".
//!
//! Strategies only nominate candidates; the registry check that proves a
//! candidate real happens downstream. Everything a strategy decides is
//! surfaced as audit events for the job log.

mod ai;
mod parse;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use kybcheck_shared::{CrnSource, KybError, LogEvent, Result};
use kybcheck_similarity::similarity;

pub use ai::AiClient;
pub use parse::{ParsedReply, parse_reply};

/// Minimum name similarity for a registry-search hit to become a candidate.
const SEARCH_SIMILARITY_FLOOR: f64 = 0.7;

/// An AI-claimed company name below this similarity to the requested name
/// means the model answered about some other company entirely.
const AI_SANITY_FLOOR: f64 = 0.4;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// What a strategy (or the whole cascade) concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A candidate CRN worth verifying against the registry.
    Resolved {
        crn: String,
        source: CrnSource,
        company_name: Option<String>,
        similarity: Option<f64>,
    },
    /// Conclusive: the company does not exist. Stops the cascade.
    NotFound,
    /// This strategy has nothing; try the next one.
    Unresolved,
}

/// Cascade output: the final outcome plus audit events describing every
/// candidate nominated or rejected along the way.
#[derive(Debug)]
pub struct ResolutionReport {
    pub outcome: Resolution,
    pub events: Vec<LogEvent>,
}

// ---------------------------------------------------------------------------
// Strategy trait
// ---------------------------------------------------------------------------

/// One way of resolving a business name to a CRN.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    /// Short name used in audit events and logs.
    fn name(&self) -> &'static str;

    /// Attempt resolution, appending audit events as it goes.
    async fn resolve(
        &self,
        business_name: &str,
        events: &mut Vec<LogEvent>,
    ) -> Result<Resolution>;
}

// ---------------------------------------------------------------------------
// AI lookup
// ---------------------------------------------------------------------------

const AI_SYSTEM_PROMPT: &str = "You are a UK company registry assistant. Given a business name, \
     reply with JSON: {\"crn\": \"<8-char company registration number>\", \
     \"company_name\": \"<registered name>\"}. Only answer when the registered \
     name is a very close match for the given name. If you do not know the \
     CRN, reply {\"crn\": null}. Never invent a number.";

/// Ask a language model for the CRN directly.
pub struct AiLookup {
    client: AiClient,
}

impl AiLookup {
    pub fn new(client: AiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolveStrategy for AiLookup {
    fn name(&self) -> &'static str {
        "ai_lookup"
    }

    #[instrument(skip_all, fields(business_name))]
    async fn resolve(
        &self,
        business_name: &str,
        events: &mut Vec<LogEvent>,
    ) -> Result<Resolution> {
        let user = format!("What is the UK company registration number of: {business_name}");
        let reply = self.client.complete(AI_SYSTEM_PROMPT, &user).await?;
        let parsed = parse_reply(&reply);

        let Some(crn) = parsed.crn else {
            debug!("AI reply contained no usable CRN");
            return Ok(Resolution::Unresolved);
        };

        // Sanity check: a model answering about a visibly different company
        // is worse than no answer.
        let name_similarity = parsed
            .company_name
            .as_deref()
            .map(|claimed| similarity(business_name, claimed));
        if let Some(score) = name_similarity {
            if score < AI_SANITY_FLOOR {
                warn!(crn, score, "AI candidate rejected: claimed name too dissimilar");
                events.push(LogEvent::CandidateRejected {
                    crn,
                    reason: format!(
                        "AI-claimed company name {:?} does not resemble the requested name \
                         (similarity {score:.2})",
                        parsed.company_name.as_deref().unwrap_or_default()
                    ),
                });
                return Ok(Resolution::Unresolved);
            }
        }

        events.push(LogEvent::CrnCandidate {
            crn: crn.clone(),
            source: CrnSource::Ai,
            company_name: parsed.company_name.clone(),
            similarity: name_similarity,
        });

        Ok(Resolution::Resolved {
            crn,
            source: CrnSource::Ai,
            company_name: parsed.company_name,
            similarity: name_similarity,
        })
    }
}

// ---------------------------------------------------------------------------
// Registry name search
// ---------------------------------------------------------------------------

/// Search the registry by name and take the best active hit above the
/// similarity floor.
pub struct RegistrySearch {
    client: kybcheck_registry::RegistryClient,
}

impl RegistrySearch {
    pub fn new(client: kybcheck_registry::RegistryClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolveStrategy for RegistrySearch {
    fn name(&self) -> &'static str {
        "registry_search"
    }

    #[instrument(skip_all, fields(business_name))]
    async fn resolve(
        &self,
        business_name: &str,
        events: &mut Vec<LogEvent>,
    ) -> Result<Resolution> {
        let items = self.client.search_companies(business_name).await?;

        let mut best: Option<(kybcheck_registry::CompanySearchItem, f64)> = None;
        for item in items {
            if item.company_status.as_deref() != Some("active") {
                continue;
            }
            let score = similarity(business_name, &item.title);
            if score <= SEARCH_SIMILARITY_FLOOR {
                continue;
            }
            if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
                best = Some((item, score));
            }
        }

        let Some((item, score)) = best else {
            debug!("no active search hit above the similarity floor");
            return Ok(Resolution::Unresolved);
        };

        events.push(LogEvent::CrnCandidate {
            crn: item.company_number.clone(),
            source: CrnSource::RegistrySearch,
            company_name: Some(item.title.clone()),
            similarity: Some(score),
        });

        Ok(Resolution::Resolved {
            crn: item.company_number,
            source: CrnSource::RegistrySearch,
            company_name: Some(item.title),
            similarity: Some(score),
        })
    }
}

// ---------------------------------------------------------------------------
// Constrained AI lookup
// ---------------------------------------------------------------------------

const CONSTRAINED_SYSTEM_PROMPT: &str = "You are a UK company registry assistant. Reply ONLY with JSON, no prose: \
     {\"found\": true, \"crn\": \"<number>\", \"company_name\": \"<registered name>\"} \
     when you are certain the company exists, or {\"found\": false} when it \
     does not exist or you are not certain. Never invent a number.";

/// Last-resort strict-JSON AI retry. Its explicit negative is conclusive:
/// two AI passes and a registry search have all come up empty by the time
/// this strategy says "no".
pub struct ConstrainedAiLookup {
    client: AiClient,
}

impl ConstrainedAiLookup {
    pub fn new(client: AiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolveStrategy for ConstrainedAiLookup {
    fn name(&self) -> &'static str {
        "constrained_ai_lookup"
    }

    #[instrument(skip_all, fields(business_name))]
    async fn resolve(
        &self,
        business_name: &str,
        events: &mut Vec<LogEvent>,
    ) -> Result<Resolution> {
        let user = format!("Does this UK company exist, and what is its CRN: {business_name}");
        let reply = self.client.complete(CONSTRAINED_SYSTEM_PROMPT, &user).await?;
        let parsed = parse_reply(&reply);

        if let Some(crn) = parsed.crn {
            let name_similarity = parsed
                .company_name
                .as_deref()
                .map(|claimed| similarity(business_name, claimed));
            events.push(LogEvent::CrnCandidate {
                crn: crn.clone(),
                source: CrnSource::Ai,
                company_name: parsed.company_name.clone(),
                similarity: name_similarity,
            });
            return Ok(Resolution::Resolved {
                crn,
                source: CrnSource::Ai,
                company_name: parsed.company_name,
                similarity: name_similarity,
            });
        }

        if parsed.negative {
            info!("constrained AI lookup is conclusive: company does not exist");
            return Ok(Resolution::NotFound);
        }

        Ok(Resolution::Unresolved)
    }
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

/// The ordered strategy cascade.
///
/// AI-sourced candidates are sanity-checked against the registry before
/// they are accepted: a CRN whose registered name barely resembles the
/// request is discarded and the chain continues.
pub struct CrnResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
    registry: Option<kybcheck_registry::RegistryClient>,
}

impl CrnResolver {
    /// The standard cascade: AI lookup, registry search, constrained AI.
    pub fn standard(ai: AiClient, registry: kybcheck_registry::RegistryClient) -> Self {
        Self {
            strategies: vec![
                Box::new(AiLookup::new(ai.clone())),
                Box::new(RegistrySearch::new(registry.clone())),
                Box::new(ConstrainedAiLookup::new(ai)),
            ],
            registry: Some(registry),
        }
    }

    /// A custom cascade without the registry sanity check, mainly for tests.
    pub fn with_strategies(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self {
            strategies,
            registry: None,
        }
    }

    /// Run strategies in order until one is conclusive. Recoverable
    /// strategy failures (network, AI flakiness) fall through to the next
    /// strategy; anything else aborts.
    #[instrument(skip(self))]
    pub async fn resolve(&self, business_name: &str) -> Result<ResolutionReport> {
        let mut events = Vec::new();

        for strategy in &self.strategies {
            match strategy.resolve(business_name, &mut events).await {
                Ok(Resolution::Unresolved) => {
                    debug!(strategy = strategy.name(), "strategy inconclusive");
                }
                Ok(Resolution::Resolved {
                    crn,
                    source,
                    company_name,
                    similarity,
                }) => {
                    let candidate = match self
                        .sanity_check(business_name, crn, source, company_name, similarity, &mut events)
                        .await?
                    {
                        Some(resolved) => resolved,
                        None => {
                            debug!(strategy = strategy.name(), "candidate rejected, trying next");
                            continue;
                        }
                    };
                    info!(strategy = strategy.name(), "strategy concluded");
                    return Ok(ResolutionReport {
                        outcome: candidate,
                        events,
                    });
                }
                Ok(outcome) => {
                    info!(strategy = strategy.name(), "strategy concluded");
                    return Ok(ResolutionReport { outcome, events });
                }
                Err(e) if e.is_recoverable() => {
                    warn!(strategy = strategy.name(), error = %e, "strategy failed, trying next");
                    events.push(LogEvent::Note {
                        message: format!("resolution strategy {} failed: {e}", strategy.name()),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ResolutionReport {
            outcome: Resolution::Unresolved,
            events,
        })
    }

    /// Check an AI-sourced candidate against the registry's own record of
    /// the company. Returns `None` when the candidate must be discarded.
    /// Registry-search candidates already carry a vetted similarity and
    /// pass through untouched.
    async fn sanity_check(
        &self,
        business_name: &str,
        crn: String,
        source: CrnSource,
        company_name: Option<String>,
        name_similarity: Option<f64>,
        events: &mut Vec<LogEvent>,
    ) -> Result<Option<Resolution>> {
        let passthrough = Resolution::Resolved {
            crn: crn.clone(),
            source,
            company_name: company_name.clone(),
            similarity: name_similarity,
        };

        if source != CrnSource::Ai {
            return Ok(Some(passthrough));
        }
        let Some(registry) = &self.registry else {
            return Ok(Some(passthrough));
        };

        match registry.company_profile(&crn).await {
            Ok(fetched) => {
                let registered = fetched.profile.company_name;
                let score = similarity(business_name, &registered);
                if score < AI_SANITY_FLOOR {
                    warn!(crn, score, "AI candidate rejected: registry name too dissimilar");
                    events.push(LogEvent::CandidateRejected {
                        crn,
                        reason: format!(
                            "registry lists this number as {registered:?}, which does not \
                             resemble the requested name (similarity {score:.2})"
                        ),
                    });
                    return Ok(None);
                }
                Ok(Some(Resolution::Resolved {
                    crn,
                    source,
                    company_name: Some(registered),
                    similarity: Some(score),
                }))
            }
            Err(KybError::RegistryNotFound(_)) => {
                events.push(LogEvent::CandidateRejected {
                    crn,
                    reason: "registry has no company under this number".into(),
                });
                Ok(None)
            }
            Err(e) if e.is_recoverable() => {
                // The verification stage will settle it either way.
                events.push(LogEvent::Note {
                    message: format!("registry sanity check for {crn} failed: {e}"),
                });
                Ok(Some(passthrough))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn ai_reply(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    async fn mock_ai(server: &MockServer, content: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ai_reply(content)))
            .mount(server)
            .await;
    }

    fn ai_client(server: &MockServer) -> AiClient {
        AiClient::new(&server.uri(), "key", "test-model", TIMEOUT).unwrap()
    }

    fn registry_client(server: &MockServer) -> kybcheck_registry::RegistryClient {
        kybcheck_registry::RegistryClient::new(&server.uri(), "key", TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn ai_lookup_produces_candidate() {
        let server = MockServer::start().await;
        mock_ai(
            &server,
            r#"{"crn": "12345678", "company_name": "ALPHA MUSCLE GYM LIMITED"}"#,
        )
        .await;

        let mut events = Vec::new();
        let outcome = AiLookup::new(ai_client(&server))
            .resolve("Alpha Muscle Gym Ltd", &mut events)
            .await
            .unwrap();

        match outcome {
            Resolution::Resolved { crn, source, .. } => {
                assert_eq!(crn, "12345678");
                assert_eq!(source, CrnSource::Ai);
            }
            other => panic!("expected Resolved, got {other:?}"),
        }
        assert!(matches!(events[0], LogEvent::CrnCandidate { .. }));
    }

    #[tokio::test]
    async fn ai_lookup_rejects_dissimilar_claim() {
        let server = MockServer::start().await;
        mock_ai(
            &server,
            r#"{"crn": "12345678", "company_name": "COMPLETELY UNRELATED WIDGETS PLC"}"#,
        )
        .await;

        let mut events = Vec::new();
        let outcome = AiLookup::new(ai_client(&server))
            .resolve("Alpha Muscle Gym Ltd", &mut events)
            .await
            .unwrap();

        assert_eq!(outcome, Resolution::Unresolved);
        assert!(matches!(events[0], LogEvent::CandidateRejected { .. }));
    }

    #[tokio::test]
    async fn registry_search_picks_best_active_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "title": "ALPHA MUSCLE GYM LIMITED",
                        "company_number": "12345678",
                        "company_status": "active"
                    },
                    {
                        "title": "ALPHA MUSCLE GYM (LEEDS) LIMITED",
                        "company_number": "11111111",
                        "company_status": "dissolved"
                    },
                    {
                        "title": "BETA BAKERY LIMITED",
                        "company_number": "22222222",
                        "company_status": "active"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let mut events = Vec::new();
        let outcome = RegistrySearch::new(registry_client(&server))
            .resolve("Alpha Muscle Gym Ltd", &mut events)
            .await
            .unwrap();

        match outcome {
            Resolution::Resolved {
                crn,
                source,
                similarity: Some(score),
                ..
            } => {
                assert_eq!(crn, "12345678");
                assert_eq!(source, CrnSource::RegistrySearch);
                assert!(score > SEARCH_SIMILARITY_FLOOR);
            }
            other => panic!("expected Resolved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn registry_search_unresolved_below_floor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "title": "TOTALLY DIFFERENT TRADING LIMITED",
                        "company_number": "33333333",
                        "company_status": "active"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let mut events = Vec::new();
        let outcome = RegistrySearch::new(registry_client(&server))
            .resolve("Alpha Muscle Gym Ltd", &mut events)
            .await
            .unwrap();

        assert_eq!(outcome, Resolution::Unresolved);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn constrained_negative_is_conclusive() {
        let server = MockServer::start().await;
        mock_ai(&server, r#"{"found": false}"#).await;

        let mut events = Vec::new();
        let outcome = ConstrainedAiLookup::new(ai_client(&server))
            .resolve("Qzxyabc Nonexistent Widgets Ltd", &mut events)
            .await
            .unwrap();

        assert_eq!(outcome, Resolution::NotFound);
    }

    #[tokio::test]
    async fn cascade_falls_through_failed_strategies() {
        struct Failing;
        #[async_trait]
        impl ResolveStrategy for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            async fn resolve(
                &self,
                _business_name: &str,
                _events: &mut Vec<LogEvent>,
            ) -> Result<Resolution> {
                Err(KybError::Network("connection refused".into()))
            }
        }

        struct Answering;
        #[async_trait]
        impl ResolveStrategy for Answering {
            fn name(&self) -> &'static str {
                "answering"
            }
            async fn resolve(
                &self,
                _business_name: &str,
                events: &mut Vec<LogEvent>,
            ) -> Result<Resolution> {
                events.push(LogEvent::CrnCandidate {
                    crn: "12345678".into(),
                    source: CrnSource::RegistrySearch,
                    company_name: None,
                    similarity: None,
                });
                Ok(Resolution::Resolved {
                    crn: "12345678".into(),
                    source: CrnSource::RegistrySearch,
                    company_name: None,
                    similarity: None,
                })
            }
        }

        let resolver =
            CrnResolver::with_strategies(vec![Box::new(Failing), Box::new(Answering)]);
        let report = resolver.resolve("Alpha Muscle Gym Ltd").await.unwrap();

        assert!(matches!(report.outcome, Resolution::Resolved { .. }));
        // The failure left an audit note before the next strategy answered.
        assert!(matches!(report.events[0], LogEvent::Note { .. }));
        assert!(matches!(report.events[1], LogEvent::CrnCandidate { .. }));
    }

    #[tokio::test]
    async fn cascade_sanity_checks_ai_candidates() {
        let server = MockServer::start().await;
        // The model is confidently wrong: the number belongs to someone else.
        mock_ai(&server, r#"{"crn": "12345678"}"#).await;
        Mock::given(method("GET"))
            .and(path("/company/12345678"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "company_name": "COMPLETELY UNRELATED WIDGETS PLC",
                "company_number": "12345678",
                "company_status": "active"
            })))
            .mount(&server)
            .await;
        // Name search finds nothing either.
        Mock::given(method("GET"))
            .and(path("/search/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&server)
            .await;

        let resolver = CrnResolver::standard(ai_client(&server), registry_client(&server));
        let report = resolver.resolve("Alpha Muscle Gym Ltd").await.unwrap();

        // Both AI passes nominate the same bad number; the registry check
        // rejects it each time and the cascade ends unresolved.
        assert_eq!(report.outcome, Resolution::Unresolved);
        assert!(report
            .events
            .iter()
            .any(|event| matches!(event, LogEvent::CandidateRejected { .. })));
    }

    #[tokio::test]
    async fn cascade_exhaustion_is_unresolved() {
        struct Silent;
        #[async_trait]
        impl ResolveStrategy for Silent {
            fn name(&self) -> &'static str {
                "silent"
            }
            async fn resolve(
                &self,
                _business_name: &str,
                _events: &mut Vec<LogEvent>,
            ) -> Result<Resolution> {
                Ok(Resolution::Unresolved)
            }
        }

        let resolver = CrnResolver::with_strategies(vec![Box::new(Silent), Box::new(Silent)]);
        let report = resolver.resolve("Anything").await.unwrap();
        assert_eq!(report.outcome, Resolution::Unresolved);
    }
}
