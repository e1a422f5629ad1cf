//! Internal document agent
//!
//! Answers from the document corpus snapshot: picks the filings that belong
//! to the requested companies and, when a model is configured, asks it to
//! answer the query over that document list.

use super::Agent;
use crate::corpus::{CorpusDocument, DocumentCorpus};
use crate::llm::LanguageModel;
use crate::models::{AgentKind, AgentOutput, ResponseEnvelope, RouteRequest};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FinanceAgent {
    corpus: Arc<DocumentCorpus>,
    llm: Option<Arc<dyn LanguageModel>>,
}

impl FinanceAgent {
    pub fn new(corpus: Arc<DocumentCorpus>, llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { corpus, llm }
    }

    /// Documents for the given companies; every document when none are given.
    fn matching_documents(&self, companies: &[String]) -> Vec<&CorpusDocument> {
        if companies.is_empty() {
            return self.corpus.documents().iter().collect();
        }

        companies
            .iter()
            .flat_map(|company| self.corpus.documents_for(company))
            .collect()
    }

    async fn answer(&self, query: &str, documents: &[&CorpusDocument]) -> String {
        if documents.is_empty() {
            return "No internal documents matched this query.".to_string();
        }

        let listing = plain_listing(documents);

        let Some(llm) = &self.llm else {
            return listing;
        };

        let prompt = format!(
            "You are a financial document analyst. The internal library holds these filings:\n{}\n\n\
             Using what these filings cover (company, period), answer the question: \"{}\"\n\
             Say which filings are relevant and what they would tell an investor.",
            listing, query
        );

        match llm.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(agent = "FinanceAgent", error = %e, "LLM answer failed, returning document listing");
                listing
            }
        }
    }
}

fn plain_listing(documents: &[&CorpusDocument]) -> String {
    documents
        .iter()
        .map(|doc| match &doc.year {
            Some(year) => format!("- {} ({}, {})", doc.file_name, doc.company, year),
            None => format!("- {} ({})", doc.file_name, doc.company),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Agent for FinanceAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Finance
    }

    async fn run(&self, request: RouteRequest) -> Result<AgentOutput> {
        let companies = &request.context.companies;
        let documents = self.matching_documents(companies);

        debug!(
            request_id = %request.request_id,
            document_count = documents.len(),
            "FinanceAgent matched documents"
        );

        let answer = self.answer(&request.context.user_query, &documents).await;

        let envelope = ResponseEnvelope::single(
            request.request_id.clone(),
            AgentKind::Finance.output_key(),
            json!({
                "companies": companies,
                "documents": documents,
                "answer": answer,
            }),
        );

        Ok(envelope.into())
    }
}
