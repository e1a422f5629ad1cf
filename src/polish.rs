//! Presentation pass over routed results
//!
//! Rewrites each agent's raw JSON into readable prose and, when no general
//! answer is present, adds a final summary across all sections. Runs after
//! routing and never changes the envelope itself.

use crate::llm::LanguageModel;
use crate::models::{AgentKind, ResponseEnvelope};
use futures::future::join_all;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const FINAL_SUMMARY_SECTION: &str = "FinalSummary";
pub const SUMMARY_NO_KEY: &str = "Summary unavailable (no API key).";
pub const SUMMARY_FAILED: &str = "Summary generation failed.";

fn agent_tip(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Finance => {
            "Finance agent analyzes internal financial documents from the filing library."
        }
        AgentKind::Yahoo => "Yahoo agent provides stock price data and market statistics.",
        AgentKind::Sec => "SEC agent analyzes public company financial filings and regulatory data.",
        AgentKind::Reddit => {
            "Reddit agent provides social media sentiment from stock-related discussions."
        }
        AgentKind::General => "General agent handles non-financial queries.",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolishedSection {
    /// Agent display name, or `FinalSummary`
    pub name: String,
    pub summary: String,
}

/// Sections in agent order; serializes as `{name: {"summary": text}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolishedResponse {
    pub sections: Vec<PolishedSection>,
}

impl PolishedResponse {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|section| section.name == name)
            .map(|section| section.summary.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl Serialize for PolishedResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for section in &self.sections {
            map.serialize_entry(&section.name, &json!({"summary": section.summary}))?;
        }
        map.end()
    }
}

/// Entries that carry nothing worth presenting
fn is_presentable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty() && !map.contains_key("error"),
        _ => true,
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("response") {
            Some(Value::String(s)) => s.clone(),
            _ => serde_json::to_string_pretty(value).unwrap_or_default(),
        },
        _ => serde_json::to_string_pretty(value).unwrap_or_default(),
    }
}

pub struct ResponsePolisher {
    llm: Option<Arc<dyn LanguageModel>>,
}

impl ResponsePolisher {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { llm }
    }

    pub async fn polish(&self, query: &str, envelope: &ResponseEnvelope) -> PolishedResponse {
        let entries: Vec<(AgentKind, &Value)> = AgentKind::ALL
            .into_iter()
            .filter_map(|kind| envelope.data.get(kind.output_key()).map(|value| (kind, value)))
            .filter(|(_, value)| is_presentable(value))
            .collect();

        let has_general = entries.iter().any(|(kind, _)| *kind == AgentKind::General);

        let rewrites = entries.iter().map(|(kind, value)| async move {
            let summary = match kind {
                AgentKind::General => plain_text(value),
                _ => self.rewrite(*kind, value).await,
            };
            PolishedSection {
                name: kind.name().to_string(),
                summary,
            }
        });

        let mut sections = join_all(rewrites).await;

        if !has_general && !sections.is_empty() {
            let summary = self.final_summary(query, &sections).await;
            sections.push(PolishedSection {
                name: FINAL_SUMMARY_SECTION.to_string(),
                summary,
            });
        }

        debug!(
            request_id = %envelope.request_id,
            section_count = sections.len(),
            "Response polished"
        );

        PolishedResponse { sections }
    }

    async fn rewrite(&self, kind: AgentKind, value: &Value) -> String {
        let content = serde_json::to_string_pretty(value).unwrap_or_default();

        let Some(llm) = &self.llm else {
            return content;
        };

        let prompt = format!(
            "You are an expert financial analyst. Here is a response from the {} agent. {}\n\
             Improve the formatting, give a clear summary, and keep all important financial \
             data and insights. Mention the agent name.\n\nResponse to improve:\n{}",
            kind.output_key(),
            agent_tip(kind),
            content
        );

        match llm.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(agent = %kind, error = %e, "Polish rewrite failed, keeping raw output");
                content
            }
        }
    }

    async fn final_summary(&self, query: &str, sections: &[PolishedSection]) -> String {
        let Some(llm) = &self.llm else {
            return SUMMARY_NO_KEY.to_string();
        };

        let findings = sections
            .iter()
            .map(|section| format!("## {}\n{}", section.name, section.summary))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "A user asked: \"{}\"\n\nFindings from {} specialized agents:\n\n{}\n\n\
             Write an executive summary covering key findings, investment perspective, \
             how the sources agree or conflict, risks and opportunities, and what an \
             investor should consider next. Stay objective.",
            query,
            sections.len(),
            findings
        );

        match llm.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Final summary generation failed");
                SUMMARY_FAILED.to_string()
            }
        }
    }
}
