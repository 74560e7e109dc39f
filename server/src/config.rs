//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::{Context, Result};
use std::env;

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// Callback verification token (platform console)
    pub token: String,

    /// Application identifier (platform console)
    pub app_id: String,

    /// 43-character base64 `EncodingAESKey` (platform console)
    pub aes_key: String,

    /// Application secret for the outbound API client (optional; outbound
    /// calls are disabled without it)
    pub app_secret: Option<String>,

    /// Base URL of the platform API
    pub api_base_url: String,

    /// Worker count for asynchronous rule handlers (default: 4)
    pub async_pool_size: usize,

    /// Queue depth for asynchronous rule handlers (default: 64)
    pub async_queue_depth: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            token: env::var("WECHAT_TOKEN").context("WECHAT_TOKEN must be set")?,
            app_id: env::var("WECHAT_APP_ID").context("WECHAT_APP_ID must be set")?,
            aes_key: env::var("WECHAT_AES_KEY").context("WECHAT_AES_KEY must be set")?,
            app_secret: env::var("WECHAT_APP_SECRET").ok(),
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "https://api.weixin.qq.com".into()),
            async_pool_size: env::var("ASYNC_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            async_queue_depth: env::var("ASYNC_QUEUE_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(64),
        })
    }

    /// Check if the outbound API client is configured.
    #[must_use]
    pub const fn has_api_client(&self) -> bool {
        self.app_secret.is_some()
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".into(),
            token: "testToken".into(),
            app_id: "wx1234567890abcdef".into(),
            // 43-char base64 test key
            aes_key: "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG".into(),
            app_secret: None,
            api_base_url: "https://api.weixin.qq.com".into(),
            async_pool_size: 2,
            async_queue_depth: 8,
        }
    }
}
