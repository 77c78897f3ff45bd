use anyhow::Result;
use dex_swap_bot::{bot::SwapBot, config::Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Starting DEX swap bot");

    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    info!(
        "Configuration loaded for chain {} ({} / {})",
        config.chain.chain_id, config.tokens.input.symbol, config.tokens.output.symbol,
    );

    let bot = SwapBot::new(config).await.map_err(|e| {
        error!("Failed to initialize bot: {}", e);
        e
    })?;

    tokio::select! {
        result = bot.run() => {
            if let Err(e) = result {
                error!("Bot stopped with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            bot.shutdown();
        }
    }

    info!("Swap bot shut down");
    Ok(())
}
