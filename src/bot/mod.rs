use anyhow::Result;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration};

use crate::config::ModerationConfig;
use crate::platforms::{ModerationGateway, PlatformConnection};
use crate::types::ChatMessage;

pub mod cleanup;
pub mod clock;
pub mod commands;
pub mod deletion;
pub mod engine;
pub mod filter;
pub mod handler;
pub mod mutes;
pub mod spam;

use engine::ModerationEngine;
use filter::WordFilter;
use handler::MessageHandler;

/// How often idle flood windows are dropped
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Bot runtime: owns the platform connections and feeds their messages to the handler
pub struct ChatBot {
    connections: Arc<RwLock<HashMap<String, Box<dyn PlatformConnection>>>>,
    handler: MessageHandler,
    running: Arc<AtomicBool>,
}

impl ChatBot {
    pub fn new(gateway: Arc<dyn ModerationGateway>, config: &ModerationConfig) -> Self {
        let engine = Arc::new(ModerationEngine::new(gateway, config));
        Self::with_engine(engine, config)
    }

    pub fn with_engine(engine: Arc<ModerationEngine>, config: &ModerationConfig) -> Self {
        let filter = WordFilter::from_config(&config.filter);
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            handler: MessageHandler::new(engine, filter, config.deletion.default_count),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn engine(&self) -> &Arc<ModerationEngine> {
        self.handler.engine()
    }

    /// Add a platform connection to the bot
    pub async fn add_connection(&mut self, connection: Box<dyn PlatformConnection>) {
        let platform_name = connection.platform_name().to_string();
        info!("Added {} connection", platform_name);
        self.connections.write().await.insert(platform_name, connection);
    }

    /// Connect every platform and start processing messages
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting moderation bot...");
        self.running.store(true, Ordering::SeqCst);

        let mut receivers = Vec::new();
        {
            let mut connections_guard = self.connections.write().await;
            for (platform_name, connection) in connections_guard.iter_mut() {
                if let Err(e) = connection.connect().await {
                    error!("Failed to connect to {}: {}", platform_name, e);
                    continue;
                }

                if let Some(receiver) = connection.get_message_receiver() {
                    receivers.push(receiver);
                    info!("Set up message receiver for {}", platform_name);
                }
            }
        }

        if receivers.is_empty() {
            return Err(anyhow::anyhow!("No platform connection could be started"));
        }

        for receiver in receivers {
            self.spawn_message_processor(receiver);
        }
        self.spawn_window_pruner();

        info!("Moderation bot started");
        Ok(())
    }

    /// One task per inbound message, so a slow deletion never delays flood checks
    fn spawn_message_processor(&self, mut receiver: broadcast::Receiver<ChatMessage>) {
        let handler = self.handler.clone();
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handler.process_message(&message).await {
                                error!("Failed to process message {} in {}: {}", message.message_id, message.chat_id, e);
                            }
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Message receiver lagged by {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Message receiver closed");
                        break;
                    }
                }
            }
        });
    }

    fn spawn_window_pruner(&self) {
        let engine = Arc::clone(self.handler.engine());
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            let mut ticker = interval(PRUNE_INTERVAL);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                engine.prune_idle_windows().await;
            }
        });
    }

    /// Health of every connection
    pub async fn health_check(&self) -> HashMap<String, bool> {
        let mut status = HashMap::new();
        let connections_guard = self.connections.read().await;

        for (platform_name, connection) in connections_guard.iter() {
            let is_healthy = connection.is_connected().await;
            status.insert(platform_name.clone(), is_healthy);

            if !is_healthy {
                warn!("{} connection is unhealthy", platform_name);
            }
        }

        status
    }

    /// Stop processing and disconnect all platforms.
    /// Pending expiries and cleanups are dropped with the runtime.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down moderation bot...");
        self.running.store(false, Ordering::SeqCst);

        let mut connections_guard = self.connections.write().await;
        for (platform_name, connection) in connections_guard.iter_mut() {
            if let Err(e) = connection.disconnect().await {
                error!("Error disconnecting from {}: {}", platform_name, e);
            }
        }

        info!("Moderation bot shutdown complete");
        Ok(())
    }
}
