use finance_query_router::{
    api::{start_server, ApiState},
    llm::language_model_from_config,
    polish::ResponsePolisher,
    QueryRouter, RouterConfig,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RouterConfig::from_env()?;

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set; GeneralAgent and response polishing are disabled");
    }

    info!(port = config.api_port, "Finance query router - API server");

    let llm = language_model_from_config(&config)?;
    let router = Arc::new(QueryRouter::from_config(&config, llm.clone())?);
    let polisher = config
        .polish_responses
        .then(|| Arc::new(ResponsePolisher::new(llm)));

    start_server(ApiState { router, polisher }, config.api_port).await?;

    Ok(())
}
