//! Query router - classify, dispatch, aggregate
//!
//! VALIDATE → EXTRACT → CLASSIFY → SELECT → DISPATCH (concurrent) → MERGE → AUDIT
//!
//! `route` always returns an envelope. Agent failures stay inside their own
//! entry; only a request that cannot be routed at all yields `failed`.

use crate::agents::{create_default_registry, AgentRegistry};
use crate::audit::{compute_context_hash, AuditSink, JsonlAuditLog, RouteAuditRecord};
use crate::classifier::{determine_agents, extract_companies, map_to_tickers};
use crate::config::{RouterConfig, DEFAULT_MAX_QUERY_CHARS};
use crate::corpus::DocumentCorpus;
use crate::error::RouterError;
use crate::lexicon::Lexicon;
use crate::llm::LanguageModel;
use crate::models::{
    AgentKind, AgentOrdering, AgentOutput, AgentPlan, RequestContext, ResponseEnvelope,
    RouteRequest, RouteStatus,
};
use crate::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const ROUTER_NAME: &str = "QueryRouter";

/// What the classifier made of a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub companies: Vec<String>,
    pub tickers: Vec<String>,
    pub agents: AgentPlan,
}

/// One agent's contribution after normalization
struct MergedEntry {
    value: Value,
    context_updates: Map<String, Value>,
    failed: bool,
}

impl MergedEntry {
    fn error(message: impl Into<String>) -> Self {
        Self {
            value: json!({"error": message.into()}),
            context_updates: Map::new(),
            failed: true,
        }
    }
}

fn merge_output(kind: AgentKind, output: AgentOutput) -> MergedEntry {
    match output {
        AgentOutput::Envelope(envelope) => {
            let failed = envelope.status == RouteStatus::Failed;
            let mut data = envelope.data;
            let value = match data.remove(kind.output_key()) {
                Some(entry) => entry,
                None => Value::Object(data),
            };
            MergedEntry {
                value,
                context_updates: envelope.context_updates,
                failed,
            }
        }
        AgentOutput::Value(Value::Null) => MergedEntry::error("Agent returned no response"),
        AgentOutput::Value(Value::Object(map)) => MergedEntry {
            failed: map.contains_key("error"),
            value: Value::Object(map),
            context_updates: Map::new(),
        },
        AgentOutput::Value(other) => MergedEntry {
            value: json!({"response": other}),
            context_updates: Map::new(),
            failed: false,
        },
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct QueryRouter {
    lexicon: Arc<Lexicon>,
    // company identifiers from the corpus snapshot
    document_names: Vec<String>,
    registry: AgentRegistry,
    audit: Arc<dyn AuditSink>,
    ordering: AgentOrdering,
    agent_timeout: Option<Duration>,
    max_query_chars: usize,
}

impl QueryRouter {
    pub fn new(
        lexicon: Arc<Lexicon>,
        corpus: &DocumentCorpus,
        registry: AgentRegistry,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            lexicon,
            document_names: corpus.company_identifiers(),
            registry,
            audit,
            ordering: AgentOrdering::default(),
            agent_timeout: None,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
        }
    }

    pub fn with_ordering(mut self, ordering: AgentOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_agent_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn with_max_query_chars(mut self, max_query_chars: usize) -> Self {
        self.max_query_chars = max_query_chars;
        self
    }

    /// Production wiring: lexicon, corpus snapshot, HTTP agents, JSONL audit file.
    pub fn from_config(
        config: &RouterConfig,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self> {
        let lexicon = match &config.lexicon_path {
            Some(path) => Lexicon::load(path)?,
            None => Lexicon::default(),
        };

        let corpus = Arc::new(DocumentCorpus::scan(&config.raw_data_dir));
        let registry = create_default_registry(config, llm, corpus.clone())?;
        let audit: Arc<dyn AuditSink> = Arc::new(JsonlAuditLog::new(&config.audit_log_path));

        info!(
            companies = lexicon.len(),
            documents = corpus.len(),
            agents = registry.len(),
            ordering = ?config.agent_ordering,
            "Query router initialized"
        );

        Ok(Self::new(Arc::new(lexicon), &corpus, registry, audit)
            .with_ordering(config.agent_ordering)
            .with_agent_timeout(config.agent_timeout)
            .with_max_query_chars(config.max_query_chars))
    }

    /// Classification only; no agent is called.
    pub fn plan(&self, query: &str) -> RoutingDecision {
        let companies: Vec<String> = extract_companies(query, &self.lexicon, &self.document_names)
            .into_iter()
            .collect();
        let tickers: Vec<String> = map_to_tickers(&companies, &self.lexicon)
            .into_iter()
            .collect();
        let agents = determine_agents(query, &companies, &tickers, self.ordering, &self.lexicon);

        RoutingDecision {
            companies,
            tickers,
            agents,
        }
    }

    fn validate(&self, request: &RouteRequest) -> Result<()> {
        let length = request.context.user_query.chars().count();
        if length > self.max_query_chars {
            return Err(RouterError::InvalidRequest(format!(
                "query is {} characters, limit is {}",
                length, self.max_query_chars
            )));
        }
        Ok(())
    }

    pub async fn route(&self, request: RouteRequest) -> ResponseEnvelope {
        let started_at = Utc::now();
        let request_id = request.request_id.clone();

        if let Err(e) = self.validate(&request) {
            warn!(request_id = %request_id, error = %e, "Routing failed");

            let mut envelope = ResponseEnvelope::new(request_id, RouteStatus::Failed);
            envelope
                .data
                .insert("error".to_string(), json!(format!("Routing failed: {}", e)));

            // nothing was extracted; caller-supplied entities stay out of the record
            let context = RequestContext {
                companies: Vec::new(),
                tickers: Vec::new(),
                ..request.context.clone()
            };
            self.record_audit(&context, started_at, &AgentPlan::new(Vec::new()), &envelope, 0)
                .await;
            return envelope;
        }

        let decision = self.plan(&request.context.user_query);

        info!(
            request_id = %request_id,
            companies = ?decision.companies,
            tickers = ?decision.tickers,
            agents = ?decision.agents.names(),
            "Routing query"
        );

        let mut extracted_terms = Map::new();
        extracted_terms.insert("agent_names".to_string(), json!(decision.agents.names()));

        let context = RequestContext {
            user_query: request.context.user_query.clone(),
            companies: decision.companies.clone(),
            tickers: decision.tickers.clone(),
            extracted_terms,
            version: request.context.version.clone(),
        };

        let agent_request = RouteRequest {
            request_id: request_id.clone(),
            context,
            timestamp: request.timestamp,
            source: request.source.clone(),
        };

        let outcomes = self.dispatch(&decision.agents, &agent_request).await;

        let mut envelope = ResponseEnvelope::new(request_id.clone(), RouteStatus::Success);
        let mut failures = 0usize;

        for (kind, entry) in decision.agents.iter().zip(outcomes) {
            if entry.failed {
                failures += 1;
            }
            envelope.data.insert(kind.output_key().to_string(), entry.value);
            // later agents win on conflicting keys
            envelope.context_updates.extend(entry.context_updates);
        }

        if failures > 0 {
            envelope.status = RouteStatus::PartialFailure;
        }
        envelope.timestamp = Utc::now();

        let completed = decision.agents.len() - failures;

        info!(
            request_id = %request_id,
            status = %envelope.status,
            agents_completed = completed,
            agents_failed = failures,
            "Routing complete"
        );

        self.record_audit(&agent_request.context, started_at, &decision.agents, &envelope, completed)
            .await;

        envelope
    }

    /// Runs every planned agent in its own task; results come back in plan order.
    async fn dispatch(&self, plan: &AgentPlan, request: &RouteRequest) -> Vec<MergedEntry> {
        let runs = plan.iter().map(|kind| {
            let agent = self.registry.get(kind);
            let request = request.clone();
            let timeout = self.agent_timeout;

            async move {
                let Some(agent) = agent else {
                    warn!(agent = %kind, "Agent not registered");
                    return MergedEntry::error(
                        RouterError::AgentNotRegistered(kind.name().to_string()).to_string(),
                    );
                };

                let handle = tokio::spawn(async move {
                    match timeout {
                        Some(limit) => match tokio::time::timeout(limit, agent.run(request)).await {
                            Ok(result) => result,
                            Err(_) => Err(RouterError::AgentTimeout(limit.as_millis() as u64)),
                        },
                        None => agent.run(request).await,
                    }
                });

                match handle.await {
                    Ok(Ok(output)) => {
                        debug!(agent = %kind, "Agent completed");
                        merge_output(kind, output)
                    }
                    Ok(Err(e)) => {
                        warn!(agent = %kind, error = %e, "Agent failed");
                        MergedEntry::error(e.to_string())
                    }
                    Err(join_error) => {
                        let message = if join_error.is_panic() {
                            format!("Agent panicked: {}", panic_message(join_error.into_panic()))
                        } else {
                            "Agent task was cancelled".to_string()
                        };
                        warn!(agent = %kind, error = %message, "Agent task aborted");
                        MergedEntry::error(message)
                    }
                }
            }
        });

        join_all(runs).await
    }

    async fn record_audit(
        &self,
        context: &RequestContext,
        started_at: DateTime<Utc>,
        plan: &AgentPlan,
        envelope: &ResponseEnvelope,
        agents_completed: usize,
    ) {
        let record = RouteAuditRecord {
            router: ROUTER_NAME.to_string(),
            request_id: envelope.request_id.clone(),
            query: context.user_query.clone(),
            started_at,
            completed_at: Utc::now(),
            companies: context.companies.clone(),
            tickers: context.tickers.clone(),
            agents: plan.agents().to_vec(),
            status: envelope.status,
            agents_completed,
            context_hash: compute_context_hash(context),
        };

        self.audit.record(&record).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::StubAgent;
    use crate::agents::Agent;
    use crate::audit::InMemoryAuditLog;
    use crate::corpus::CorpusDocument;

    struct Harness {
        router: QueryRouter,
        audit: Arc<InMemoryAuditLog>,
    }

    fn harness(agents: Vec<Arc<StubAgent>>) -> Harness {
        let mut registry = AgentRegistry::new();
        for agent in agents {
            registry.register(agent);
        }
        let audit = Arc::new(InMemoryAuditLog::new());
        let corpus = DocumentCorpus::from_documents(
            CorpusDocument::from_file_name("berkshire-annual-2023.pdf")
                .into_iter()
                .collect(),
        );
        let router = QueryRouter::new(
            Arc::new(Lexicon::default()),
            &corpus,
            registry,
            audit.clone(),
        );
        Harness { router, audit }
    }

    fn ok_agents() -> Vec<Arc<StubAgent>> {
        vec![
            Arc::new(StubAgent::value(AgentKind::Finance, json!({"answer": "docs"}))),
            Arc::new(StubAgent::value(AgentKind::Yahoo, json!({"results": []}))),
            Arc::new(StubAgent::value(AgentKind::Sec, json!({"metrics": {}}))),
            Arc::new(StubAgent::value(AgentKind::Reddit, json!({"posts": []}))),
            Arc::new(StubAgent::value(AgentKind::General, json!({"response": "hi"}))),
        ]
    }

    fn replace(mut agents: Vec<Arc<StubAgent>>, agent: StubAgent) -> Vec<Arc<StubAgent>> {
        agents.retain(|existing| existing.kind() != agent.kind());
        agents.push(Arc::new(agent));
        agents
    }

    #[test]
    fn test_plan_for_company_comparison() {
        let h = harness(ok_agents());
        let decision = h.router.plan("Compare Apple and Microsoft stocks");

        assert_eq!(decision.companies, vec!["apple", "microsoft"]);
        assert_eq!(decision.tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(
            decision.agents.agents(),
            &[AgentKind::Finance, AgentKind::Yahoo, AgentKind::Sec, AgentKind::Reddit]
        );
    }

    #[test]
    fn test_plan_uses_corpus_companies() {
        let h = harness(ok_agents());
        let decision = h.router.plan("berkshire annual report");

        assert_eq!(decision.companies, vec!["berkshire"]);
        assert!(decision.tickers.is_empty());
        assert_eq!(decision.agents.agents(), &[AgentKind::Finance, AgentKind::Reddit]);
    }

    #[tokio::test]
    async fn test_failing_agent_gives_partial_failure() {
        let h = harness(replace(
            ok_agents(),
            StubAgent::failing(AgentKind::Yahoo, "rate limited"),
        ));

        let envelope = h
            .router
            .route(RouteRequest::new("Compare Apple and Microsoft stocks"))
            .await;

        assert_eq!(envelope.status, RouteStatus::PartialFailure);
        assert_eq!(
            envelope.data["yahoo"],
            json!({"error": "Agent error: rate limited"})
        );
        assert_eq!(envelope.data["finance"], json!({"answer": "docs"}));
        assert_eq!(envelope.data["sec"], json!({"metrics": {}}));
        assert_eq!(envelope.data["reddit"], json!({"posts": []}));
    }

    #[tokio::test]
    async fn test_general_query_succeeds() {
        let h = harness(ok_agents());
        let envelope = h.router.route(RouteRequest::new("What's the weather today?")).await;

        assert_eq!(envelope.status, RouteStatus::Success);
        assert_eq!(envelope.data.len(), 1);
        assert_eq!(envelope.data["general"], json!({"response": "hi"}));
    }

    #[tokio::test]
    async fn test_agents_receive_derived_context() {
        let finance = Arc::new(StubAgent::value(AgentKind::Finance, json!({"answer": "x"})));
        let mut agents = ok_agents();
        agents.retain(|a| a.kind() != AgentKind::Finance);
        agents.push(finance.clone());
        let h = harness(agents);

        let mut request = RouteRequest::new("apple stock outlook");
        request.context.companies = vec!["stale".to_string()];
        request.context.version = "2.0".to_string();
        let request_id = request.request_id.clone();
        h.router.route(request).await;

        let seen = finance.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].request_id, request_id);
        assert_eq!(seen[0].context.companies, vec!["apple"]);
        assert_eq!(seen[0].context.tickers, vec!["AAPL"]);
        assert_eq!(seen[0].context.version, "2.0");
        assert_eq!(
            seen[0].context.extracted_terms["agent_names"],
            json!(["FinanceAgent", "YahooAgent", "SECAgent", "RedditAgent"])
        );
    }

    #[tokio::test]
    async fn test_panicking_agent_is_isolated() {
        let h = harness(replace(ok_agents(), StubAgent::panicking(AgentKind::Reddit)));
        let envelope = h.router.route(RouteRequest::new("tesla earnings")).await;

        assert_eq!(envelope.status, RouteStatus::PartialFailure);
        let error = envelope.data["reddit"]["error"].as_str().unwrap();
        assert!(error.contains("panicked"));
        assert_eq!(envelope.data["finance"], json!({"answer": "docs"}));
    }

    #[tokio::test]
    async fn test_slow_agent_times_out() {
        let h = harness(replace(
            ok_agents(),
            StubAgent::slow(AgentKind::Sec, Duration::from_secs(5)),
        ));
        let router = h.router.with_agent_timeout(Some(Duration::from_millis(50)));

        let envelope = router.route(RouteRequest::new("nvidia revenue")).await;

        assert_eq!(envelope.status, RouteStatus::PartialFailure);
        assert_eq!(
            envelope.data["sec"],
            json!({"error": "Agent timed out after 50 ms"})
        );
    }

    #[tokio::test]
    async fn test_unregistered_agent_is_recorded() {
        let mut agents = ok_agents();
        agents.retain(|a| a.kind() != AgentKind::Reddit);
        let h = harness(agents);

        let envelope = h.router.route(RouteRequest::new("apple")).await;

        assert_eq!(envelope.status, RouteStatus::PartialFailure);
        assert_eq!(
            envelope.data["reddit"],
            json!({"error": "Agent not registered: RedditAgent"})
        );
    }

    #[tokio::test]
    async fn test_envelope_results_are_merged() {
        let sec_envelope = ResponseEnvelope::single("x", "sec", json!([{"company": "apple"}]))
            .with_context_update("last_sec_query", json!("t1"));
        let reddit_envelope = ResponseEnvelope::single("x", "other", json!(1))
            .with_context_update("last_reddit_access", json!("t2"));

        let agents = replace(
            replace(ok_agents(), StubAgent::envelope(AgentKind::Sec, sec_envelope)),
            StubAgent::envelope(AgentKind::Reddit, reddit_envelope),
        );
        let h = harness(agents);

        let envelope = h.router.route(RouteRequest::new("apple stock")).await;

        assert_eq!(envelope.status, RouteStatus::Success);
        assert_eq!(envelope.data["sec"], json!([{"company": "apple"}]));
        // no entry under its own key: the whole data map is kept
        assert_eq!(envelope.data["reddit"], json!({"other": 1}));
        assert_eq!(envelope.context_updates["last_sec_query"], "t1");
        assert_eq!(envelope.context_updates["last_reddit_access"], "t2");
    }

    #[tokio::test]
    async fn test_failed_envelope_and_plain_values() {
        let failed = ResponseEnvelope::single("x", "sec", json!({"error": "No companies"}))
            .with_status(RouteStatus::Failed);
        let agents = replace(
            replace(
                replace(ok_agents(), StubAgent::envelope(AgentKind::Sec, failed)),
                StubAgent::value(AgentKind::Yahoo, json!("plain text")),
            ),
            StubAgent::value(AgentKind::Reddit, Value::Null),
        );
        let h = harness(agents);

        let envelope = h.router.route(RouteRequest::new("msft")).await;

        assert_eq!(envelope.status, RouteStatus::PartialFailure);
        assert_eq!(envelope.data["yahoo"], json!({"response": "plain text"}));
        assert_eq!(
            envelope.data["reddit"],
            json!({"error": "Agent returned no response"})
        );
        assert_eq!(envelope.data["sec"], json!({"error": "No companies"}));
    }

    #[tokio::test]
    async fn test_overlong_query_fails_without_dispatch() {
        let finance = Arc::new(StubAgent::value(AgentKind::Finance, json!({})));
        let h = harness(vec![finance.clone()]);
        let router = h.router.with_max_query_chars(10);

        let mut request = RouteRequest::new("apple stock price today");
        request.context.companies = vec!["stale".to_string()];
        request.context.tickers = vec!["STL".to_string()];
        let envelope = router.route(request).await;

        assert_eq!(envelope.status, RouteStatus::Failed);
        assert_eq!(envelope.data.len(), 1);
        assert!(envelope.data["error"]
            .as_str()
            .unwrap()
            .starts_with("Routing failed:"));
        assert!(finance.seen().is_empty());

        let records = h.audit.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RouteStatus::Failed);
        assert!(records[0].companies.is_empty());
        assert!(records[0].tickers.is_empty());
        assert!(records[0].agents.is_empty());
    }

    #[tokio::test]
    async fn test_every_request_is_audited() {
        let h = harness(replace(
            ok_agents(),
            StubAgent::failing(AgentKind::Yahoo, "boom"),
        ));

        let request = RouteRequest::new("Compare Apple and Microsoft stocks");
        let request_id = request.request_id.clone();
        h.router.route(request).await;

        let records = h.audit.for_request(&request_id).await;
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.router, "QueryRouter");
        assert_eq!(record.companies, vec!["apple", "microsoft"]);
        assert_eq!(record.tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(record.agents.len(), 4);
        assert_eq!(record.status, RouteStatus::PartialFailure);
        assert_eq!(record.agents_completed, 3);
        assert_eq!(record.context_hash.len(), 64);
        assert!(record.completed_at >= record.started_at);
    }

    #[tokio::test]
    async fn test_reddit_first_ordering() {
        let h = harness(ok_agents());
        let router = h.router.with_ordering(AgentOrdering::RedditFirst);
        assert_eq!(
            router.plan("apple stock").agents.agents(),
            &[AgentKind::Reddit, AgentKind::Finance, AgentKind::Yahoo, AgentKind::Sec]
        );
    }
}
