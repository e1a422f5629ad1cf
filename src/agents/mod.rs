//! Agent trait and registry
//!
//! Each agent answers one aspect of a query (documents, prices, filings,
//! sentiment, general knowledge). Agents receive their own copy of the
//! request and hand back an `AgentOutput`; the router never shares mutable
//! state with them.

pub mod finance;
pub mod general;
pub mod reddit;
pub mod sec;
pub mod yahoo;

#[cfg(test)]
pub(crate) mod testing;

pub use finance::FinanceAgent;
pub use general::GeneralAgent;
pub use reddit::RedditAgent;
pub use sec::SecAgent;
pub use yahoo::YahooAgent;

use crate::config::RouterConfig;
use crate::corpus::DocumentCorpus;
use crate::llm::LanguageModel;
use crate::models::{AgentKind, AgentOutput, RouteRequest};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;
    async fn run(&self, request: RouteRequest) -> Result<AgentOutput>;
}

/// Lookup table from agent kind to its implementation
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Registers under the agent's own kind, replacing any previous entry.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.kind(), agent);
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        self.agents.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<_> = self.agents.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pooled HTTP client shared by the network-backed agents
pub(crate) fn http_client(user_agent: &str) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

/// Registry with all five production agents.
pub fn create_default_registry(
    config: &RouterConfig,
    llm: Option<Arc<dyn LanguageModel>>,
    corpus: Arc<DocumentCorpus>,
) -> Result<AgentRegistry> {
    let client = http_client(&config.sec_user_agent)?;
    let mut registry = AgentRegistry::new();

    registry.register(Arc::new(FinanceAgent::new(corpus, llm.clone())));
    registry.register(Arc::new(YahooAgent::new(client.clone(), llm.clone())));
    registry.register(Arc::new(SecAgent::new(client.clone(), llm.clone())));
    registry.register(Arc::new(RedditAgent::new(
        client,
        config.reddit_subreddit.clone(),
    )));
    registry.register(Arc::new(GeneralAgent::new(llm)));

    Ok(registry)
}
