//! Finance Query Router
//!
//! Routes a natural-language finance question to the agents that can answer it:
//! - Extracts companies and tickers from the query (lexicon + document corpus)
//! - Classifies financial intent and selects agents from a fixed decision table
//! - Runs the selected agents concurrently, isolating each failure
//! - Merges results into one response envelope and audits every request
//!
//! PIPELINE:
//! VALIDATE → EXTRACT → CLASSIFY → SELECT → DISPATCH → MERGE → AUDIT

pub mod agents;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod error;
pub mod lexicon;
pub mod llm;
pub mod models;
pub mod polish;
pub mod router;

pub use error::Result;

// Re-export common types
pub use config::RouterConfig;
pub use models::*;
pub use router::{QueryRouter, RoutingDecision};
