use anyhow::Result;
use energy_analytics::{config::AppConfig, http_api, observability, report, runner};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Counters are recorded whether or not the server is enabled.
    http_api::install_recorder()?;

    let output = runner::run(&cfg).await?;
    report::write_json(&cfg.output.path, &output)?;
    tracing::info!(path = %cfg.output.path.display(), "analytics output written");

    if let Some(server) = &cfg.server {
        http_api::serve(&server.bind_addr, output).await?;
    }

    Ok(())
}
