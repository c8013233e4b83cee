use anyhow::{Context, Result};
use concord::build;
use concord_common::config::SystemConfig;

#[tokio::main]
async fn main() -> Result<()> {
    concord::tracing_setup::init()?;

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = SystemConfig::load(std::path::Path::new(&config_path))
        .with_context(|| format!("loading config from {config_path}"))?;

    let mut system = build(&config).await?;
    system.start(&config).await?;

    tracing::info!("concord is running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    system.shutdown().await?;
    Ok(())
}
