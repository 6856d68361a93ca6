use anyhow::Result;
use log::{error, info};
use std::sync::Arc;

use chatwarden::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting chatwarden v{}", chatwarden::VERSION);

    let config = match ModerationConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid moderation configuration: {:#}", e);
            return Err(e);
        }
    };

    let api = Arc::new(TelegramApi::new(TelegramConfig::from_env()?));

    let mut bot = ChatBot::new(api.clone(), &config);
    bot.add_connection(Box::new(TelegramConnection::new(api))).await;
    bot.start().await?;

    info!("Bot is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received");
    bot.shutdown().await?;
    Ok(())
}
