//! Error types for the finance query router

use thiserror::Error;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {

    // =============================
    // Startup Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lexicon error: {0}")]
    Lexicon(String),

    // =============================
    // Routing Pipeline Errors
    // =============================

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Agent timed out after {0} ms")]
    AgentTimeout(u64),

    #[error("Agent not registered: {0}")]
    AgentNotRegistered(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Audit error: {0}")]
    Audit(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
