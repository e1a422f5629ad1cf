//! Router configuration
//!
//! Read once at process start from the environment (`.env` honoured by the
//! binaries). Every key is optional; a key that is present but unparseable
//! fails startup.

use crate::error::RouterError;
use crate::models::AgentOrdering;
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_QUERY_CHARS: usize = 8192;
pub const DEFAULT_API_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// JSON lexicon; the built-in table is used when unset
    pub lexicon_path: Option<PathBuf>,
    pub raw_data_dir: PathBuf,
    pub agent_ordering: AgentOrdering,
    pub audit_log_path: PathBuf,
    pub agent_timeout: Option<Duration>,
    pub max_query_chars: usize,
    pub gemini_api_key: Option<String>,
    pub polish_responses: bool,
    pub reddit_subreddit: String,
    pub sec_user_agent: String,
    pub api_port: u16,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            lexicon_path: None,
            raw_data_dir: PathBuf::from("raw_data"),
            agent_ordering: AgentOrdering::FinanceFirst,
            audit_log_path: PathBuf::from("monitor_logs.json"),
            agent_timeout: None,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
            gemini_api_key: None,
            polish_responses: true,
            reddit_subreddit: "stocks".to_string(),
            sec_user_agent: "finance-query-router admin@example.com".to_string(),
            api_port: DEFAULT_API_PORT,
        }
    }
}

impl RouterConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = Self::default();

        let agent_timeout = match get("AGENT_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = parse_value("AGENT_TIMEOUT_SECS", &raw)?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let port_setting = get("PORT")
            .map(|raw| ("PORT", raw))
            .or_else(|| get("API_PORT").map(|raw| ("API_PORT", raw)));
        let api_port = match port_setting {
            Some((key, raw)) => parse_value(key, &raw)?,
            None => defaults.api_port,
        };

        Ok(Self {
            lexicon_path: get("LEXICON_PATH").map(PathBuf::from),
            raw_data_dir: get("RAW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.raw_data_dir),
            agent_ordering: match get("AGENT_ORDER") {
                Some(raw) => raw.parse()?,
                None => defaults.agent_ordering,
            },
            audit_log_path: get("AUDIT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.audit_log_path),
            agent_timeout,
            max_query_chars: match get("MAX_QUERY_CHARS") {
                Some(raw) => parse_value("MAX_QUERY_CHARS", &raw)?,
                None => defaults.max_query_chars,
            },
            gemini_api_key: get("GEMINI_API_KEY"),
            polish_responses: match get("POLISH_RESPONSES") {
                Some(raw) => parse_bool("POLISH_RESPONSES", &raw)?,
                None => defaults.polish_responses,
            },
            reddit_subreddit: get("REDDIT_SUBREDDIT").unwrap_or(defaults.reddit_subreddit),
            sec_user_agent: get("SEC_USER_AGENT").unwrap_or(defaults.sec_user_agent),
            api_port,
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| RouterError::Config(format!("{}='{}': {}", key, raw, e)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RouterError::Config(format!(
            "{}='{}': expected a boolean",
            key, raw
        ))),
    }
}
