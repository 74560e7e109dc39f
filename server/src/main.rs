//! Callback Gateway - Main Entry Point
//!
//! Demo wiring: a text echo rule plus a subscribe greeter, behind the
//! webhook endpoint. Applications embed `wx_server` as a library and
//! register their own rules instead.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;
use wx_common::{EventKind, InboundMessage, MsgTag, OutboundMessage};
use wx_crypto::CallbackCrypto;
use wx_server::endpoint::{self, GatewayState};
use wx_server::router::{DispatchContext, MessageHandler, MessageRouter};
use wx_server::{api, config};

/// Replies to any text message with its own content.
struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(
        &self,
        msg: &InboundMessage,
        _ctx: &mut DispatchContext,
    ) -> anyhow::Result<Option<OutboundMessage>> {
        let content = match &msg.kind {
            wx_common::MessageKind::Text { content } => content.clone(),
            _ => return Ok(None),
        };
        Ok(Some(OutboundMessage::text_reply(msg, &content)))
    }
}

/// Greets newly subscribed users.
struct SubscribeHandler;

#[async_trait]
impl MessageHandler for SubscribeHandler {
    async fn handle(
        &self,
        msg: &InboundMessage,
        _ctx: &mut DispatchContext,
    ) -> anyhow::Result<Option<OutboundMessage>> {
        Ok(Some(OutboundMessage::text_reply(msg, "Welcome!")))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wx_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        app_id = %config.app_id,
        "Starting callback gateway"
    );

    // Shared secret material, immutable from here on
    let crypto = CallbackCrypto::new(&config.token, &config.app_id, &config.aes_key)
        .context("invalid WECHAT_AES_KEY")?;

    // Outbound API client (optional)
    if config.has_api_client() {
        let secret = config.app_secret.as_deref().unwrap_or_default();
        let client = api::ApiClient::new(&config.api_base_url, &config.app_id, secret);
        info!(client = ?client, "Outbound API client configured");
    } else {
        info!("WECHAT_APP_SECRET not set; outbound API calls disabled");
    }

    // Rule table: specific rules first, catch-alls last
    let mut builder =
        MessageRouter::builder().async_pool(config.async_pool_size, config.async_queue_depth);
    builder
        .rule()
        .event(EventKind::Subscribe)
        .handler(SubscribeHandler)
        .end();
    builder.rule().msg_tag(MsgTag::Text).handler(EchoHandler).end();
    let router = builder.build();

    // Webhook endpoint
    let state = GatewayState::new(crypto, router);
    let app = endpoint::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Gateway listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Gateway shutdown complete");

    Ok(())
}
