//! Callback Cryptography
//!
//! Authenticates inbound webhook callbacks and encrypts/decrypts the XML
//! payload they carry, using the platform's shared secret material:
//!
//! - **Signature**: SHA1 over the lexicographically sorted concatenation of
//!   `{token, timestamp, nonce, payload}`, compared in constant time.
//! - **Payload**: AES-256-CBC with PKCS#7 padding; the IV is the first 16
//!   bytes of the key, per the platform's wire protocol.
//!
//! The codec is stateless apart from the immutable secret material and is
//! safe to share across concurrent callback requests.

pub mod cipher;
pub mod error;
pub mod signature;

pub use cipher::{CallbackCrypto, EncryptedEnvelope};
pub use error::{CryptoError, CryptoResult};
pub use signature::{compute_signature, constant_time_eq};
