// Start the controller
use clap::Parser;
use kube::Client;
use tracing_subscriber::fmt::format::FmtSpan;

use devserver_operator::Config;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter.clone())
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let client = Client::try_default().await?;
    devserver_operator::run(client, config).await;
    Ok(())
}
