mod app;
mod bot;
mod cache;
mod config;
mod jobs;
mod lifecycle;
mod notify;
mod storage;
mod throttle;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::stop::mk_stop_token;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("  Webhook path: {}", config.webhook.path);
    info!("  Public URL: {}", config.webhook.public_url);
    info!("  Admin chats: {}", config.telegram.admin_chat_ids.len());

    let app = App::new(config).await?;

    // Ordered bootstrap; any failure here aborts the process
    lifecycle::run_startup(&app).await?;

    let (mut dispatcher, sink, rx) = app.take_runtime().await?;

    // HTTP server and dispatcher share a stop token so both wind down together
    let (stop_token, stop_flag) = mk_stop_token();
    let listener = webhook::queue_listener(rx, stop_token.clone());

    let router = webhook::router(
        &app.config().webhook.path,
        &app.config().telegram.bot_token,
        Arc::new(sink),
    );

    let addr = app.config().bind_addr();
    let tcp_listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Webhook server listening on {addr}");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(stop_flag)
            .await
        {
            error!("Webhook server error: {e}");
        }
    });

    // Runs until Ctrl-C; the dispatcher builder installs the signal handler
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("update listener"),
        )
        .await;

    stop_token.stop();
    server.await.ok();

    lifecycle::run_shutdown(&app).await
}
