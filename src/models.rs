//! Core data models for query routing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::RouterError;

//
// ================= Agents =================
//

/// The closed set of agents a query can be dispatched to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentKind {
    #[serde(rename = "FinanceAgent")]
    Finance,
    #[serde(rename = "YahooAgent")]
    Yahoo,
    #[serde(rename = "SECAgent")]
    Sec,
    #[serde(rename = "RedditAgent")]
    Reddit,
    #[serde(rename = "GeneralAgent")]
    General,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        AgentKind::Finance,
        AgentKind::Yahoo,
        AgentKind::Sec,
        AgentKind::Reddit,
        AgentKind::General,
    ];

    /// Identifier used in logs and audit records
    pub fn name(self) -> &'static str {
        match self {
            AgentKind::Finance => "FinanceAgent",
            AgentKind::Yahoo => "YahooAgent",
            AgentKind::Sec => "SECAgent",
            AgentKind::Reddit => "RedditAgent",
            AgentKind::General => "GeneralAgent",
        }
    }

    /// Key under which this agent's result lands in `ResponseEnvelope::data`
    pub fn output_key(self) -> &'static str {
        match self {
            AgentKind::Finance => "finance",
            AgentKind::Yahoo => "yahoo",
            AgentKind::Sec => "sec",
            AgentKind::Reddit => "reddit",
            AgentKind::General => "general",
        }
    }

    pub fn from_output_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.output_key() == key)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Presentation order for a plan. Never changes plan membership.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentOrdering {
    #[default]
    FinanceFirst,
    RedditFirst,
}

impl FromStr for AgentOrdering {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "finance_first" | "finance-first" => Ok(AgentOrdering::FinanceFirst),
            "reddit_first" | "reddit-first" => Ok(AgentOrdering::RedditFirst),
            other => Err(RouterError::Config(format!(
                "unknown agent ordering '{}' (expected finance_first or reddit_first)",
                other
            ))),
        }
    }
}

/// Ordered list of agents selected for one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentPlan(Vec<AgentKind>);

impl AgentPlan {
    pub fn new(agents: Vec<AgentKind>) -> Self {
        Self(agents)
    }

    /// Plan used when classification itself fails
    pub fn fallback(ordering: AgentOrdering) -> Self {
        match ordering {
            AgentOrdering::FinanceFirst => Self(vec![AgentKind::Finance, AgentKind::Reddit]),
            AgentOrdering::RedditFirst => Self(vec![AgentKind::Reddit, AgentKind::Finance]),
        }
    }

    pub fn agents(&self) -> &[AgentKind] {
        &self.0
    }

    pub fn contains(&self, kind: AgentKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AgentKind> + '_ {
        self.0.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|kind| kind.name()).collect()
    }
}

//
// ================= Request =================
//

fn default_version() -> String {
    "1.0".to_string()
}

fn default_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_source() -> String {
    "router".to_string()
}

/// Shared context handed (by copy) to every agent
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestContext {
    #[serde(default)]
    pub user_query: String,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub extracted_terms: Map<String, Value>,
    #[serde(default = "default_version")]
    pub version: String,
}

impl RequestContext {
    pub fn for_query(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            version: default_version(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    #[serde(default = "default_request_id")]
    pub request_id: String,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
}

impl RouteRequest {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self::with_context(RequestContext::for_query(user_query))
    }

    pub fn with_context(context: RequestContext) -> Self {
        Self {
            request_id: default_request_id(),
            context,
            timestamp: Utc::now(),
            source: default_source(),
        }
    }
}

//
// ================= Response =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Success,
    PartialFailure,
    Failed,
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteStatus::Success => "success",
            RouteStatus::PartialFailure => "partial_failure",
            RouteStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub context_updates: Map<String, Value>,
    pub status: RouteStatus,
    pub timestamp: DateTime<Utc>,
}

impl ResponseEnvelope {
    pub fn new(request_id: impl Into<String>, status: RouteStatus) -> Self {
        Self {
            request_id: request_id.into(),
            data: Map::new(),
            context_updates: Map::new(),
            status,
            timestamp: Utc::now(),
        }
    }

    /// Envelope carrying a single entry under `key`
    pub fn single(request_id: impl Into<String>, key: &str, value: Value) -> Self {
        let mut envelope = Self::new(request_id, RouteStatus::Success);
        envelope.data.insert(key.to_string(), value);
        envelope
    }

    pub fn with_status(mut self, status: RouteStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_context_update(mut self, key: &str, value: Value) -> Self {
        self.context_updates.insert(key.to_string(), value);
        self
    }
}

/// What an agent hands back to the dispatcher
#[derive(Debug, Clone)]
pub enum AgentOutput {
    Envelope(ResponseEnvelope),
    Value(Value),
}

impl From<ResponseEnvelope> for AgentOutput {
    fn from(envelope: ResponseEnvelope) -> Self {
        AgentOutput::Envelope(envelope)
    }
}

impl From<Value> for AgentOutput {
    fn from(value: Value) -> Self {
        AgentOutput::Value(value)
    }
}
