//! Social sentiment agent
//!
//! Searches a subreddit's public JSON listing for recent posts about each
//! company and scores them with a small word-list sentiment model.

use super::Agent;
use crate::error::RouterError;
use crate::models::{AgentKind, AgentOutput, ResponseEnvelope, RouteRequest};
use crate::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

const REDDIT_BASE_URL: &str = "https://www.reddit.com";
const SEARCH_LIMIT: &str = "10";
const MAX_POSTS_PER_SEARCH: usize = 3;
const EXCERPT_CHARS: usize = 200;
const LOOKBACK_DAYS: i64 = 30;

const POSITIVE_WORDS: &[&str] = &[
    "bull", "bullish", "buy", "buying", "beat", "beats", "gain", "gains", "growth", "strong",
    "up", "rally", "surge", "soar", "profit", "outperform", "upgrade", "moon", "undervalued",
    "record", "good", "great", "positive", "long", "calls",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bear", "bearish", "sell", "selling", "miss", "misses", "loss", "losses", "weak", "down",
    "crash", "drop", "plunge", "decline", "downgrade", "overvalued", "bad", "terrible",
    "negative", "short", "puts", "bubble", "layoffs", "lawsuit", "risk",
];

/// Word-list sentiment in [-1, 1]; 0 when no scored word appears.
pub fn sentiment_score(text: &str) -> f64 {
    let mut positive = 0usize;
    let mut negative = 0usize;

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
    {
        if POSITIVE_WORDS.contains(&word.as_str()) {
            positive += 1;
        } else if NEGATIVE_WORDS.contains(&word.as_str()) {
            negative += 1;
        }
    }

    let total = positive + negative;
    if total == 0 {
        return 0.0;
    }
    (positive as f64 - negative as f64) / total as f64
}

/// First 200 characters, with an ellipsis when cut.
pub fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut)
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: RedditPost,
}

#[derive(Debug, Clone, Deserialize)]
struct RedditPost {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
}

impl RedditPost {
    fn mentions(&self, company: &str) -> bool {
        let company = company.to_lowercase();
        self.title.to_lowercase().contains(&company)
            || self.selftext.to_lowercase().contains(&company)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    pub post_title: String,
    pub post_url: String,
    pub summary: String,
    pub score: i64,
    pub num_comments: u64,
    pub sentiment: f64,
}

impl From<&RedditPost> for PostSummary {
    fn from(post: &RedditPost) -> Self {
        Self {
            post_title: post.title.clone(),
            post_url: post.url.clone(),
            summary: excerpt(&post.selftext),
            score: post.score,
            num_comments: post.num_comments,
            sentiment: sentiment_score(&format!("{} {}", post.title, post.selftext)),
        }
    }
}

/// Recent posts, optionally restricted to those mentioning `company`.
fn select_posts(posts: &[RedditPost], company: Option<&str>, since_epoch: f64) -> Vec<PostSummary> {
    posts
        .iter()
        .filter(|post| post.created_utc >= since_epoch)
        .filter(|post| company.map(|c| post.mentions(c)).unwrap_or(true))
        .take(MAX_POSTS_PER_SEARCH)
        .map(PostSummary::from)
        .collect()
}

fn average_sentiment(posts: &[PostSummary]) -> f64 {
    if posts.is_empty() {
        return 0.0;
    }
    posts.iter().map(|post| post.sentiment).sum::<f64>() / posts.len() as f64
}

pub struct RedditAgent {
    client: Client,
    base_url: String,
    subreddit: String,
}

impl RedditAgent {
    pub fn new(client: Client, subreddit: impl Into<String>) -> Self {
        Self {
            client,
            base_url: REDDIT_BASE_URL.to_string(),
            subreddit: subreddit.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search(&self, query: &str) -> Result<Vec<RedditPost>> {
        let url = format!("{}/r/{}/search.json", self.base_url, self.subreddit);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("restrict_sr", "1"),
                ("sort", "new"),
                ("t", "month"),
                ("limit", SEARCH_LIMIT),
            ])
            .send()
            .await
            .map_err(|e| RouterError::Agent(format!("Reddit search failed for '{}': {}", query, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouterError::Agent(format!(
                "Reddit returned {} for '{}'",
                status, query
            )));
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| RouterError::Agent(format!("Invalid Reddit listing: {}", e)))?;

        Ok(listing.data.children.into_iter().map(|child| child.data).collect())
    }

    /// `None` when the search found nothing relevant.
    async fn company_sentiment(&self, company: Option<&str>, query: &str, since_epoch: f64) -> Option<Value> {
        let search_term = company.unwrap_or(query);

        let posts = match self.search(search_term).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!(agent = "RedditAgent", search = search_term, error = %e, "Search failed");
                return Some(json!({"company": company, "error": e.to_string()}));
            }
        };

        let selected = select_posts(&posts, company, since_epoch);
        if company.is_some() && selected.is_empty() {
            return None;
        }

        Some(json!({
            "company": company,
            "avg_sentiment": average_sentiment(&selected),
            "posts": selected,
        }))
    }
}

#[async_trait]
impl Agent for RedditAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Reddit
    }

    async fn run(&self, request: RouteRequest) -> Result<AgentOutput> {
        let since_epoch = (Utc::now() - Duration::days(LOOKBACK_DAYS)).timestamp() as f64;
        let query = &request.context.user_query;
        let companies = &request.context.companies;

        let results: Vec<Value> = if companies.is_empty() {
            self.company_sentiment(None, query, since_epoch)
                .await
                .into_iter()
                .collect()
        } else {
            futures::future::join_all(
                companies
                    .iter()
                    .map(|company| self.company_sentiment(Some(company.as_str()), query, since_epoch)),
            )
            .await
            .into_iter()
            .flatten()
            .collect()
        };

        debug!(
            request_id = %request.request_id,
            subreddit = %self.subreddit,
            result_count = results.len(),
            "RedditAgent collected posts"
        );

        let envelope = ResponseEnvelope::single(
            request.request_id,
            AgentKind::Reddit.output_key(),
            Value::Array(results),
        )
        .with_context_update("last_reddit_access", json!(Utc::now().to_rfc3339()));

        Ok(envelope.into())
    }
}
