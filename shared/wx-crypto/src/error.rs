//! Crypto Error Types

use thiserror::Error;

/// Errors raised while authenticating or transforming callback payloads.
///
/// Each variant is a distinct, terminal failure: none of them are retried,
/// and the whole callback is rejected when one occurs.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The configured `EncodingAESKey` is not a 43-character base64 string
    /// decoding to 32 bytes.
    #[error("Invalid AES key (expected 43-char base64 encoding a 32-byte key)")]
    InvalidAesKey,

    /// The caller-supplied signature does not match the computed one.
    #[error("Signature mismatch")]
    SignatureMismatch,

    /// The ciphertext could not be decoded, decrypted, or unpacked.
    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// The app identifier embedded in the decrypted payload does not match
    /// the configured one. Distinct from [`CryptoError::MalformedCiphertext`]:
    /// the payload decrypted cleanly but was encrypted for a different app.
    #[error("App identifier mismatch")]
    AppIdMismatch,
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
