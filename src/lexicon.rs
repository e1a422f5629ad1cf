//! Company/ticker table and financial keyword list
//!
//! Loaded once at startup (built-in defaults or a JSON file) and shared
//! read-only with the classifier.

use crate::error::RouterError;
use crate::Result;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

const DEFAULT_COMPANY_TICKERS: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("meta", "META"),
    ("facebook", "META"),
    ("tesla", "TSLA"),
    ("nvidia", "NVDA"),
    ("netflix", "NFLX"),
    ("intel", "INTC"),
    ("ibm", "IBM"),
];

const DEFAULT_FINANCIAL_KEYWORDS: &[&str] = &[
    "stock", "stocks", "share", "shares", "price", "prices",
    "earnings", "revenue", "profit", "loss", "income",
    "invest", "investment", "investor", "investing",
    "dividend", "dividends", "yield",
    "market", "markets", "trading", "trade", "trader",
    "buy", "sell", "hold", "bullish", "bearish", "bull", "bear",
    "portfolio", "asset", "assets", "liability", "liabilities",
    "sec", "filing", "filings", "10-k", "10-q", "10k", "10q",
    "quarterly", "annual", "fiscal", "financial", "finance",
    "balance sheet", "income statement", "cash flow",
    "p/e", "ratio", "eps", "ebitda", "roi", "roe",
    "analyst", "forecast", "valuation", "capitalization",
    "ipo", "merger", "acquisition", "bond", "bonds",
    "equity", "debt", "loan", "bank", "banking",
    "nasdaq", "nyse", "s&p", "dow", "etf", "fund",
    "hedge", "mutual", "index",
    "volatility", "volume", "momentum",
    "ticker", "symbol", "chart",
    "report", "quarter", "guidance", "outlook",
    "sentiment", "wall street",
];

/// Read-only lexicon. Company names are lowercase, tickers uppercase, and
/// entries keep their configured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexicon {
    entries: Vec<(String, String)>,
    financial_keywords: Vec<String>,
}

impl Lexicon {
    pub fn new<N, T, K>(
        company_tickers: impl IntoIterator<Item = (N, T)>,
        financial_keywords: impl IntoIterator<Item = K>,
    ) -> Self
    where
        N: AsRef<str>,
        T: AsRef<str>,
        K: AsRef<str>,
    {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (name, ticker) in company_tickers {
            let name = name.as_ref().trim().to_lowercase();
            let ticker = ticker.as_ref().trim().to_uppercase();
            if name.is_empty() || ticker.is_empty() {
                continue;
            }
            match entries.iter_mut().find(|(existing, _)| *existing == name) {
                Some(entry) => entry.1 = ticker,
                None => entries.push((name, ticker)),
            }
        }

        let mut keywords: Vec<String> = Vec::new();
        for keyword in financial_keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }

        Self {
            entries,
            financial_keywords: keywords,
        }
    }

    /// Parse the `{"company_ticker_map": {..}, "financial_keywords": [..]}` format.
    /// A missing keyword list falls back to the built-in one.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: LexiconFile = serde_json::from_str(json)
            .map_err(|e| RouterError::Lexicon(format!("invalid lexicon JSON: {}", e)))?;

        let lexicon = match file.financial_keywords {
            Some(keywords) => Self::new(file.company_ticker_map.0, keywords),
            None => Self::new(file.company_ticker_map.0, DEFAULT_FINANCIAL_KEYWORDS.iter()),
        };
        Ok(lexicon)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RouterError::Lexicon(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Case-insensitive ticker lookup
    pub fn ticker_for(&self, company: &str) -> Option<&str> {
        let company = company.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(name, _)| *name == company)
            .map(|(_, ticker)| ticker.as_str())
    }

    pub fn companies(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Lowercased tickers paired with the first company (in lexicon order)
    /// that carries them.
    pub fn ticker_aliases(&self) -> Vec<(String, &str)> {
        let mut aliases: Vec<(String, &str)> = Vec::with_capacity(self.entries.len());
        for (name, ticker) in &self.entries {
            let alias = ticker.to_lowercase();
            if !aliases.iter().any(|(existing, _)| *existing == alias) {
                aliases.push((alias, name.as_str()));
            }
        }
        aliases
    }

    pub fn financial_keywords(&self) -> &[String] {
        &self.financial_keywords
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new(
            DEFAULT_COMPANY_TICKERS.iter().copied(),
            DEFAULT_FINANCIAL_KEYWORDS.iter(),
        )
    }
}

#[derive(Deserialize)]
struct LexiconFile {
    company_ticker_map: OrderedPairs,
    #[serde(default)]
    financial_keywords: Option<Vec<String>>,
}

/// JSON object read as an ordered list of pairs (document order)
struct OrderedPairs(Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedPairs {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = OrderedPairs;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of company name to ticker symbol")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, ticker)) = access.next_entry::<String, String>()? {
                    pairs.push((name, ticker));
                }
                Ok(OrderedPairs(pairs))
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}
