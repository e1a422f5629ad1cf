//! Market data agent
//!
//! Pulls one month of daily closes per ticker from the Yahoo Finance chart
//! endpoint and reduces them to summary statistics.

use super::Agent;
use crate::error::RouterError;
use crate::llm::LanguageModel;
use crate::models::{AgentKind, AgentOutput, ResponseEnvelope, RouteRequest};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Summary of a closing price series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStatistics {
    pub trading_days: usize,
    pub last_close: f64,
    pub min_close: f64,
    pub max_close: f64,
    pub mean_close: f64,
    /// Sample standard deviation of closes
    pub std_dev: f64,
    pub percent_change: f64,
    /// Sample std of daily returns, annualized, in percent
    pub annualized_volatility: f64,
}

impl PriceStatistics {
    /// `None` for an empty series.
    pub fn from_closes(closes: &[f64]) -> Option<Self> {
        let first = *closes.first()?;
        let last = *closes.last()?;

        let min_close = closes.iter().copied().fold(f64::INFINITY, f64::min);
        let max_close = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let returns: Vec<f64> = closes
            .windows(2)
            .filter(|pair| pair[0] != 0.0)
            .map(|pair| pair[1] / pair[0] - 1.0)
            .collect();

        let percent_change = if first != 0.0 {
            (last - first) / first * 100.0
        } else {
            0.0
        };

        Some(Self {
            trading_days: closes.len(),
            last_close: last,
            min_close,
            max_close,
            mean_close: mean(closes),
            std_dev: sample_std(closes),
            percent_change,
            annualized_volatility: sample_std(&returns) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

struct PriceSeries {
    currency: Option<String>,
    closes: Vec<f64>,
}

/// Closes from a chart payload; missing (null) points are dropped.
fn parse_chart(ticker: &str, body: ChartResponse) -> Result<PriceSeries> {
    if let Some(error) = body.chart.error {
        return Err(RouterError::Agent(format!(
            "Yahoo chart error for {}: {}",
            ticker, error.description
        )));
    }

    let result = body
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| RouterError::Agent(format!("No data found for {}", ticker)))?;

    let closes: Vec<f64> = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|series| series.close.into_iter().flatten().collect())
        .unwrap_or_default();

    if closes.is_empty() {
        return Err(RouterError::Agent(format!("No data found for {}", ticker)));
    }

    Ok(PriceSeries {
        currency: result.meta.and_then(|meta| meta.currency),
        closes,
    })
}

pub struct YahooAgent {
    client: Client,
    base_url: String,
    llm: Option<Arc<dyn LanguageModel>>,
}

impl YahooAgent {
    pub fn new(client: Client, llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            client,
            base_url: YAHOO_CHART_URL.to_string(),
            llm,
        }
    }

    /// Chart endpoint root; the ticker is appended as the last path segment.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_series(&self, ticker: &str) -> Result<PriceSeries> {
        let url = format!("{}/{}", self.base_url, ticker);

        let response = self
            .client
            .get(&url)
            .query(&[("range", "1mo"), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| RouterError::Agent(format!("Yahoo request failed for {}: {}", ticker, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouterError::Agent(format!(
                "Yahoo returned {} for {}",
                status, ticker
            )));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| RouterError::Agent(format!("Invalid Yahoo response for {}: {}", ticker, e)))?;

        parse_chart(ticker, body)
    }

    async fn ticker_report(&self, ticker: &str) -> Value {
        let series = match self.fetch_series(ticker).await {
            Ok(series) => series,
            Err(e) => {
                warn!(agent = "YahooAgent", ticker, error = %e, "Ticker fetch failed");
                return json!({"ticker": ticker, "error": e.to_string()});
            }
        };

        match PriceStatistics::from_closes(&series.closes) {
            Some(stats) => json!({
                "ticker": ticker,
                "period": "1mo",
                "currency": series.currency,
                "stats": stats,
            }),
            None => json!({"ticker": ticker, "error": format!("No data found for {}", ticker)}),
        }
    }

    async fn analysis(&self, query: &str, reports: &[Value]) -> Option<String> {
        let llm = self.llm.as_ref()?;
        if reports.iter().all(|report| report.get("error").is_some()) {
            return None;
        }

        let prompt = format!(
            "As a market analyst, answer \"{}\" using these one-month price statistics:\n{}\n\
             Highlight trend, volatility and notable differences between tickers.",
            query,
            serde_json::to_string_pretty(reports).unwrap_or_default()
        );

        match llm.generate(&prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(agent = "YahooAgent", error = %e, "LLM analysis failed");
                None
            }
        }
    }
}

#[async_trait]
impl Agent for YahooAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Yahoo
    }

    async fn run(&self, request: RouteRequest) -> Result<AgentOutput> {
        let tickers = &request.context.tickers;

        let reports = futures::future::join_all(
            tickers.iter().map(|ticker| self.ticker_report(ticker)),
        )
        .await;

        debug!(
            request_id = %request.request_id,
            ticker_count = tickers.len(),
            "YahooAgent collected price data"
        );

        let mut entry = json!({
            "tickers": tickers,
            "results": reports,
        });
        if let Some(text) = self.analysis(&request.context.user_query, &reports).await {
            entry["analysis"] = Value::String(text);
        }

        Ok(ResponseEnvelope::single(request.request_id, AgentKind::Yahoo.output_key(), entry).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::http_client;
    use crate::agents::testing::{serve_json, StubLlm};
    use crate::models::RequestContext;

    fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_statistics_from_closes() {
        let stats = PriceStatistics::from_closes(&[100.0, 110.0, 99.0, 121.0]).unwrap();

        assert_eq!(stats.trading_days, 4);
        assert!(close_to(stats.min_close, 99.0));
        assert!(close_to(stats.max_close, 121.0));
        assert!(close_to(stats.mean_close, 107.5));
        assert!(close_to(stats.last_close, 121.0));
        assert!(close_to(stats.percent_change, 21.0));
        assert!(close_to(stats.std_dev, 10.279429296739517));
        assert!(stats.annualized_volatility > 0.0);
    }

    #[test]
    fn test_flat_series_has_no_volatility() {
        let stats = PriceStatistics::from_closes(&[50.0, 50.0, 50.0]).unwrap();
        assert!(close_to(stats.std_dev, 0.0));
        assert!(close_to(stats.annualized_volatility, 0.0));
        assert!(close_to(stats.percent_change, 0.0));

        let single = PriceStatistics::from_closes(&[42.0]).unwrap();
        assert!(close_to(single.std_dev, 0.0));
        assert!(PriceStatistics::from_closes(&[]).is_none());
    }

    #[test]
    fn test_parse_chart_skips_null_points() {
        let body: ChartResponse = serde_json::from_str(
            r#"{"chart": {"result": [{"meta": {"currency": "USD"},
                "indicators": {"quote": [{"close": [1.0, null, 3.0]}]}}], "error": null}}"#,
        )
        .unwrap();

        let series = parse_chart("AAPL", body).unwrap();
        assert_eq!(series.closes, vec![1.0, 3.0]);
        assert_eq!(series.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_parse_chart_error() {
        let body: ChartResponse = serde_json::from_str(
            r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#,
        )
        .unwrap();

        let err = parse_chart("ZZZZ", body).err().unwrap();
        assert!(err.to_string().contains("delisted"));
    }

    #[tokio::test]
    async fn test_no_tickers_is_an_empty_success() {
        let agent = YahooAgent::new(http_client("test").unwrap(), None);
        let request = RouteRequest::with_context(RequestContext::for_query("market today"));

        match agent.run(request).await.unwrap() {
            AgentOutput::Envelope(envelope) => {
                assert_eq!(envelope.data["yahoo"]["results"], json!([]));
                assert!(envelope.data["yahoo"].get("analysis").is_none());
            }
            AgentOutput::Value(_) => panic!("expected envelope"),
        }
    }

    #[tokio::test]
    async fn test_fetches_each_ticker_and_reports_failures_inline() {
        let base = serve_json(vec![(
            "/AAPL",
            json!({"chart": {"result": [{"meta": {"currency": "USD"},
                "indicators": {"quote": [{"close": [100.0, null, 110.0, 121.0]}]}}], "error": null}}),
        )])
        .await;

        let llm = Arc::new(StubLlm::replying("AAPL trended up"));
        let model: Arc<dyn LanguageModel> = llm.clone();
        let agent = YahooAgent::new(http_client("test").unwrap(), Some(model)).with_base_url(base);

        let mut context = RequestContext::for_query("AAPL vs ZZZZ");
        context.tickers = vec!["AAPL".to_string(), "ZZZZ".to_string()];

        let envelope = match agent.run(RouteRequest::with_context(context)).await.unwrap() {
            AgentOutput::Envelope(envelope) => envelope,
            AgentOutput::Value(_) => panic!("expected envelope"),
        };
        let entry = &envelope.data["yahoo"];

        assert_eq!(entry["results"][0]["ticker"], "AAPL");
        assert_eq!(entry["results"][0]["currency"], "USD");
        assert_eq!(entry["results"][0]["stats"]["trading_days"], 3);
        assert_eq!(entry["results"][0]["stats"]["last_close"], 121.0);
        assert_eq!(entry["results"][1]["ticker"], "ZZZZ");
        assert!(entry["results"][1]["error"].as_str().unwrap().contains("404"));
        assert_eq!(entry["analysis"], "AAPL trended up");
        assert_eq!(llm.prompts().len(), 1);
    }
}
