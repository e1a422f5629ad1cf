//! SEC filings agent
//!
//! Resolves companies to EDGAR CIKs and reads headline XBRL facts from the
//! `companyfacts` API. EDGAR requires a descriptive User-Agent, which the
//! shared client carries.

use super::Agent;
use crate::error::RouterError;
use crate::llm::LanguageModel;
use crate::models::{AgentKind, AgentOutput, ResponseEnvelope, RouteRequest, RouteStatus};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SEC_BASE_URL: &str = "https://data.sec.gov";

const COMPANY_CIKS: &[(&str, &str)] = &[
    ("apple", "0000320193"),
    ("microsoft", "0000789019"),
    ("google", "0001652044"),
    ("alphabet", "0001652044"),
    ("amazon", "0001018724"),
    ("meta", "0001326801"),
    ("facebook", "0001326801"),
    ("tesla", "0001318605"),
    ("nvidia", "0001045810"),
    ("netflix", "0001065280"),
    ("intel", "0000050863"),
    ("ibm", "0000051143"),
];

/// Metric name and the us-gaap tags that may carry it, in preference order
const KEY_METRICS: &[(&str, &[&str])] = &[
    (
        "Revenues",
        &["Revenues", "RevenueFromContractWithCustomerExcludingAssessedTax"],
    ),
    ("NetIncomeLoss", &["NetIncomeLoss", "ProfitLoss"]),
    ("Assets", &["Assets"]),
    ("Liabilities", &["Liabilities"]),
    ("StockholdersEquity", &["StockholdersEquity"]),
    ("EarningsPerShare", &["EarningsPerShareBasic"]),
];

const PERIODIC_FORMS: &[&str] = &["10-K", "10-Q"];

// per-share values are reported in USD/shares
const USD_UNITS: &[&str] = &["USD", "USD/shares"];

pub fn cik_for(company: &str) -> Option<&'static str> {
    let company = company.to_lowercase();
    COMPANY_CIKS
        .iter()
        .find(|(name, _)| *name == company)
        .map(|(_, cik)| *cik)
}

/// Most recent 10-K/10-Q value per key metric.
///
/// For each metric the first tag present in the filing decides; a metric
/// whose tag has no periodic USD facts is left out.
pub fn extract_key_metrics(company_facts: &Value) -> Map<String, Value> {
    let mut metrics = Map::new();
    let Some(gaap) = company_facts.pointer("/facts/us-gaap") else {
        return metrics;
    };

    for (metric, tags) in KEY_METRICS {
        let Some(tag_data) = tags.iter().find_map(|tag| gaap.get(*tag)) else {
            continue;
        };

        let Some(units) = tag_data.get("units") else {
            continue;
        };

        let latest = USD_UNITS
            .iter()
            .filter_map(|unit| units.get(*unit).and_then(Value::as_array))
            .flatten()
            .filter(|fact| {
                fact.get("form")
                    .and_then(Value::as_str)
                    .map(|form| PERIODIC_FORMS.contains(&form))
                    .unwrap_or(false)
            })
            .max_by(|a, b| {
                let end = |fact: &Value| fact.get("end").and_then(Value::as_str).unwrap_or("").to_string();
                end(*a).cmp(&end(*b))
            });

        if let Some(fact) = latest {
            metrics.insert(
                metric.to_string(),
                json!({
                    "value": fact.get("val"),
                    "end_date": fact.get("end"),
                    "form": fact.get("form"),
                    "period": fact.get("fp"),
                }),
            );
        }
    }

    metrics
}

pub struct SecAgent {
    client: Client,
    base_url: String,
    llm: Option<Arc<dyn LanguageModel>>,
}

impl SecAgent {
    pub fn new(client: Client, llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            client,
            base_url: SEC_BASE_URL.to_string(),
            llm,
        }
    }

    /// EDGAR data host, without the `/api/...` path.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_company_facts(&self, cik: &str) -> Result<Value> {
        let url = format!("{}/api/xbrl/companyfacts/CIK{}.json", self.base_url, cik);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RouterError::Agent(format!("SEC request failed for CIK {}: {}", cik, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouterError::Agent(format!(
                "SEC returned {} for CIK {}",
                status, cik
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RouterError::Agent(format!("Invalid SEC response for CIK {}: {}", cik, e)))
    }

    async fn analysis(&self, query: &str, company: &str, summary: &Value) -> Option<String> {
        let llm = self.llm.as_ref()?;

        let prompt = format!(
            "As a financial analyst, review the SEC filing data for {} and respond to \"{}\".\n\
             Metrics:\n{}\n\
             Cover key highlights of the recent filings and what they imply for investors. \
             Stick to the data provided.",
            company,
            query,
            serde_json::to_string_pretty(summary).unwrap_or_default()
        );

        match llm.generate(&prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(agent = "SECAgent", company, error = %e, "LLM analysis failed");
                Some(format!("LLM analysis error: {}", e))
            }
        }
    }

    async fn company_report(&self, query: &str, company: &str) -> Value {
        let Some(cik) = cik_for(company) else {
            return json!({
                "company": company,
                "error": format!("CIK not found for {}. Company not supported.", company),
            });
        };

        let facts = match self.fetch_company_facts(cik).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!(agent = "SECAgent", company, cik, error = %e, "Company facts fetch failed");
                return json!({"company": company, "cik": cik, "error": e.to_string()});
            }
        };

        let entity_name = facts
            .get("entityName")
            .and_then(Value::as_str)
            .unwrap_or(company)
            .to_string();
        let metrics = extract_key_metrics(&facts);

        let mut report = json!({
            "company": company,
            "entity_name": entity_name,
            "cik": cik,
            "key_metrics": metrics,
            "data_source": "SEC EDGAR API",
        });

        if let Some(text) = self.analysis(query, &entity_name, &report).await {
            report["llm_analysis"] = Value::String(text);
        }

        report
    }
}

#[async_trait]
impl Agent for SecAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Sec
    }

    async fn run(&self, request: RouteRequest) -> Result<AgentOutput> {
        let key = AgentKind::Sec.output_key();
        let companies = &request.context.companies;

        if companies.is_empty() {
            let envelope = ResponseEnvelope::single(
                request.request_id,
                key,
                json!({"error": "No companies specified for SEC analysis"}),
            )
            .with_status(RouteStatus::Failed);
            return Ok(envelope.into());
        }

        let mut reports = Vec::with_capacity(companies.len());
        for company in companies {
            debug!(request_id = %request.request_id, company = %company, "SECAgent fetching facts");
            reports.push(self.company_report(&request.context.user_query, company).await);
        }

        info!(
            request_id = %request.request_id,
            company_count = companies.len(),
            "SECAgent processed companies"
        );

        let envelope = ResponseEnvelope::single(request.request_id, key, Value::Array(reports))
            .with_context_update("last_sec_query", json!(Utc::now().to_rfc3339()));

        Ok(envelope.into())
    }
}
