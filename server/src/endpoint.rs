//! Webhook Endpoint
//!
//! The HTTP trust boundary: proves an inbound callback originated from the
//! platform, decrypts it, hands it to the router, and encrypts the reply.
//! Signature verification always happens before decryption, and decryption
//! before parsing; an authentication failure rejects the request with no
//! side effects and no leaked plaintext.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use wx_crypto::{CallbackCrypto, CryptoError};

use crate::router::MessageRouter;
use crate::xml::{self, XmlError};

/// Shared state for the callback handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub crypto: Arc<CallbackCrypto>,
    pub router: Arc<MessageRouter>,
}

impl GatewayState {
    #[must_use]
    pub fn new(crypto: CallbackCrypto, router: MessageRouter) -> Self {
        Self {
            crypto: Arc::new(crypto),
            router: Arc::new(router),
        }
    }
}

/// Query parameters the platform attaches to every callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
    /// Present only for the URL-verification handshake.
    pub echostr: Option<String>,
}

/// Endpoint error types.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Signature or app-identifier verification failed.
    #[error("Request authentication failed")]
    Unauthorized,

    /// The request could not be decoded far enough to process.
    #[error("Malformed request: {0}")]
    BadRequest(String),

    /// Parsed cleanly but the message kind is outside the supported set.
    /// Answered with an empty acknowledgement, not an error status.
    #[error("Unsupported message kind: {0}")]
    UnsupportedKind(String),

    /// Reply encryption failed.
    #[error("Internal server error")]
    Internal,
}

impl From<CryptoError> for EndpointError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::SignatureMismatch | CryptoError::AppIdMismatch => Self::Unauthorized,
            CryptoError::MalformedCiphertext(msg) => Self::BadRequest(msg),
            CryptoError::InvalidAesKey => Self::Internal,
        }
    }
}

impl From<XmlError> for EndpointError {
    fn from(err: XmlError) -> Self {
        match err {
            XmlError::UnsupportedMessageKind(kind) => Self::UnsupportedKind(kind),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        match self {
            // The body deliberately carries no detail for auth failures.
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid request").into_response(),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            Self::UnsupportedKind(kind) => {
                warn!(kind = %kind, "unsupported message kind; acknowledging with empty body");
                StatusCode::OK.into_response()
            }
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Build the callback router: `GET /callback` for the verification
/// handshake, `POST /callback` for message traffic.
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/callback", get(handshake).post(callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// URL-verification handshake: verify the signature over `echostr`, decrypt
/// it, and echo the plaintext back.
async fn handshake(
    State(state): State<GatewayState>,
    Query(query): Query<CallbackQuery>,
) -> Result<String, EndpointError> {
    let echostr = query
        .echostr
        .as_deref()
        .ok_or_else(|| EndpointError::BadRequest("missing echostr".into()))?;

    state
        .crypto
        .check_signature(&query.msg_signature, &query.timestamp, &query.nonce, echostr)?;
    let plaintext = state.crypto.decrypt(echostr)?;

    debug!("verification handshake succeeded");
    Ok(plaintext)
}

/// Normal callback: verify, decrypt, parse, route, and reply encrypted (or
/// with an empty acknowledgement when the router produced no reply).
async fn callback(
    State(state): State<GatewayState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Result<Response, EndpointError> {
    let ciphertext = xml::parse_envelope(&body)?;
    state.crypto.check_signature(
        &query.msg_signature,
        &query.timestamp,
        &query.nonce,
        &ciphertext,
    )?;

    let plaintext = state.crypto.decrypt(&ciphertext)?;
    let message = xml::parse_message(&plaintext)?;

    let outcome = state.router.route(message).await;
    for failure in &outcome.failures {
        // Handler failures are contained per-rule; the callback itself is
        // still acknowledged.
        warn!(error = %failure, "handler failed during dispatch");
    }

    match outcome.reply {
        Some(reply) => {
            let reply_xml = xml::render_message(&reply);
            let envelope = state
                .crypto
                .seal(&reply_xml)
                .map_err(|_| EndpointError::Internal)?;
            Ok(xml::render_envelope(&envelope).into_response())
        }
        None => Ok(StatusCode::OK.into_response()),
    }
}
