//! Outbound Platform API Client
//!
//! Minimal client for the calls the gateway itself needs: fetching an
//! access token (cached in-process until shortly before expiry) and pushing
//! messages to users outside the callback reply window. Retry/backoff is
//! deliberately left to the caller.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Refresh the cached token this many seconds before the platform expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Outbound API errors.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a business error code.
    #[error("Platform error {errcode}: {errmsg}")]
    Platform { errcode: i64, errmsg: String },
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Platform API client bound to one application's credentials.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    secret: String,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    errcode: Option<i64>,
    errmsg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlatformAck {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: &str, app_id: &str, secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            secret: secret.to_string(),
            token: RwLock::new(None),
        }
    }

    /// Return a valid access token, fetching a fresh one when the cached
    /// token is absent or close to expiry.
    pub async fn access_token(&self) -> Result<String, ApiError> {
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.value.clone());
            }
        }

        let response: TokenResponse = self
            .http
            .get(format!("{}/cgi-bin/token", self.base_url))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.app_id.as_str()),
                ("secret", self.secret.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        match (response.access_token, response.expires_in) {
            (Some(value), Some(expires_in)) => {
                let expires_at =
                    Utc::now() + Duration::seconds(expires_in - TOKEN_EXPIRY_MARGIN_SECS);
                debug!(%expires_at, "access token refreshed");
                *self.token.write().await = Some(CachedToken {
                    value: value.clone(),
                    expires_at,
                });
                Ok(value)
            }
            _ => Err(ApiError::Platform {
                errcode: response.errcode.unwrap_or(-1),
                errmsg: response
                    .errmsg
                    .unwrap_or_else(|| "missing access_token in response".into()),
            }),
        }
    }

    /// Push a text message to a user via the custom-service API.
    pub async fn send_text(&self, to_user: &str, content: &str) -> Result<(), ApiError> {
        let token = self.access_token().await?;
        let body = serde_json::json!({
            "touser": to_user,
            "msgtype": "text",
            "text": { "content": content },
        });

        let ack: PlatformAck = self
            .http
            .post(format!(
                "{}/cgi-bin/message/custom/send",
                self.base_url
            ))
            .query(&[("access_token", token.as_str())])
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if ack.errcode != 0 {
            return Err(ApiError::Platform {
                errcode: ack.errcode,
                errmsg: ack.errmsg,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ApiClient {
    /// Secret is deliberately omitted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}
