//! Catch-all agent for non-financial queries

use super::Agent;
use crate::error::RouterError;
use crate::llm::LanguageModel;
use crate::models::{AgentKind, AgentOutput, ResponseEnvelope, RouteRequest};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct GeneralAgent {
    llm: Option<Arc<dyn LanguageModel>>,
}

impl GeneralAgent {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Agent for GeneralAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::General
    }

    async fn run(&self, request: RouteRequest) -> Result<AgentOutput> {
        let llm = self.llm.as_ref().ok_or_else(|| {
            RouterError::Agent("GeneralAgent needs a language model (set GEMINI_API_KEY)".to_string())
        })?;

        let prompt = format!(
            "Answer the following question helpfully and concisely.\n\nQuestion: {}",
            request.context.user_query
        );
        let answer = llm.generate(&prompt).await?;

        Ok(ResponseEnvelope::single(
            request.request_id,
            AgentKind::General.output_key(),
            json!({"response": answer}),
        )
        .into())
    }
}
