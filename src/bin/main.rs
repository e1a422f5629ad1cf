use finance_query_router::{
    llm::language_model_from_config, polish::ResponsePolisher, QueryRouter, RouteRequest,
    RouterConfig,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RouterConfig::from_env()?;
    let llm = language_model_from_config(&config)?;
    let router = QueryRouter::from_config(&config, llm.clone())?;
    let polisher = config
        .polish_responses
        .then(|| ResponsePolisher::new(llm));

    info!("Finance query router ready");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout
            .write_all(b"\nEnter your financial question (or 'quit' to exit): ")
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();

        if matches!(query.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        if query.is_empty() {
            continue;
        }

        let decision = router.plan(query);
        println!("\n=== ROUTING ===");
        println!("Companies: {:?}", decision.companies);
        println!("Tickers:   {:?}", decision.tickers);
        println!("Agents:    {}", decision.agents.names().join(", "));

        let envelope = router.route(RouteRequest::new(query)).await;
        println!("Status:    {}", envelope.status);

        if let Some(error) = envelope.data.get("error") {
            println!("\n{}", error);
            continue;
        }

        match &polisher {
            Some(polisher) => {
                let polished = polisher.polish(query, &envelope).await;
                for section in &polished.sections {
                    println!("\n--- {} ---\n{}", section.name, section.summary);
                }
                // error entries are not polished; show them as-is
                for (key, value) in &envelope.data {
                    if value.get("error").is_some() {
                        println!("\n--- {} (error) ---\n{}", key, value["error"]);
                    }
                }
            }
            None => println!("\n{}", serde_json::to_string_pretty(&envelope.data)?),
        }
    }

    println!("Goodbye!");
    Ok(())
}
