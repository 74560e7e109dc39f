//! AES-256-CBC Payload Codec
//!
//! Implements the platform's payload envelope: the decrypted buffer is
//! `[16 random bytes][u32 BE length N][N bytes of UTF-8 XML][app id]`,
//! PKCS#7-padded to the AES block size and encrypted with AES-256-CBC.
//! The IV is the first 16 bytes of the key, fixed by the wire protocol.

use aes::Aes256;
use base64::engine::general_purpose::{GeneralPurposeConfig, STANDARD};
use base64::engine::GeneralPurpose;
use base64::{alphabet, Engine as _};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{distributions::Alphanumeric, Rng};

use crate::error::{CryptoError, CryptoResult};
use crate::signature::{compute_signature, constant_time_eq};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes; the IV length as well.
const BLOCK_SIZE: usize = 16;

/// Platform consoles issue arbitrary 43-character keys, so the final base64
/// character may carry nonzero trailing bits. Decode the key leniently;
/// ciphertext still goes through the strict [`STANDARD`] engine.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Length of the random prefix prepended to every plaintext envelope.
const RANDOM_PREFIX_LEN: usize = 16;

/// Offset of the XML payload inside the decrypted buffer: random prefix
/// followed by the 4-byte big-endian length.
const PAYLOAD_OFFSET: usize = RANDOM_PREFIX_LEN + 4;

/// A signed, encrypted reply ready to be serialized into the outbound
/// envelope XML by the HTTP layer.
#[derive(Debug, Clone)]
pub struct EncryptedEnvelope {
    /// Base64 ciphertext.
    pub encrypt: String,
    /// Hex SHA1 signature over `{token, timestamp, nonce, encrypt}`.
    pub signature: String,
    /// Unix timestamp used in the signature.
    pub timestamp: i64,
    /// Random nonce used in the signature.
    pub nonce: String,
}

/// Callback codec bound to one application's shared secret material.
///
/// Holds the verification token, the app identifier, and the 32-byte AES key
/// decoded from the 43-character `EncodingAESKey`. Immutable after
/// construction; safe to share behind an `Arc` across concurrent callbacks.
#[derive(Clone)]
pub struct CallbackCrypto {
    token: String,
    app_id: String,
    key: [u8; 32],
}

impl CallbackCrypto {
    /// Build a codec from the out-of-band-provisioned secret material.
    ///
    /// `encoding_aes_key` is the 43-character base64 key as issued by the
    /// platform console (the trailing `=` pad stripped).
    pub fn new(token: &str, app_id: &str, encoding_aes_key: &str) -> CryptoResult<Self> {
        if encoding_aes_key.len() != 43 {
            return Err(CryptoError::InvalidAesKey);
        }

        let decoded = KEY_ENGINE
            .decode(format!("{encoding_aes_key}="))
            .map_err(|_| CryptoError::InvalidAesKey)?;

        let key: [u8; 32] = decoded.try_into().map_err(|_| CryptoError::InvalidAesKey)?;

        Ok(Self {
            token: token.to_string(),
            app_id: app_id.to_string(),
            key,
        })
    }

    /// The app identifier this codec authenticates payloads for.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Verify a caller-supplied signature against the payload.
    ///
    /// Pure and fails closed: any mismatch is "not authentic", never a
    /// recoverable error. `payload` is the echo string for the handshake and
    /// the base64 ciphertext for normal callbacks.
    #[must_use]
    pub fn verify_signature(
        &self,
        signature: &str,
        timestamp: &str,
        nonce: &str,
        payload: &str,
    ) -> bool {
        let expected = compute_signature(&self.token, timestamp, nonce, payload);
        constant_time_eq(&expected, signature)
    }

    /// [`verify_signature`](Self::verify_signature) as a `Result`, for `?`
    /// chains in the HTTP layer.
    pub fn check_signature(
        &self,
        signature: &str,
        timestamp: &str,
        nonce: &str,
        payload: &str,
    ) -> CryptoResult<()> {
        if self.verify_signature(signature, timestamp, nonce, payload) {
            Ok(())
        } else {
            Err(CryptoError::SignatureMismatch)
        }
    }

    /// Decrypt a base64 ciphertext and return the plaintext XML.
    ///
    /// Verifies the embedded app identifier after unpacking; a mismatch is a
    /// hard authentication failure ([`CryptoError::AppIdMismatch`]) distinct
    /// from the malformed-input paths.
    pub fn decrypt(&self, ciphertext_b64: &str) -> CryptoResult<String> {
        let ciphertext = STANDARD
            .decode(ciphertext_b64.trim())
            .map_err(|e| CryptoError::MalformedCiphertext(format!("base64: {e}")))?;

        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::MalformedCiphertext(format!(
                "ciphertext length {} is not a positive multiple of the block size",
                ciphertext.len()
            )));
        }

        let plaintext = Aes256CbcDec::new(&self.key.into(), &self.iv().into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CryptoError::MalformedCiphertext("bad PKCS#7 padding".into()))?;

        self.unpack(&plaintext)
    }

    /// Encrypt plaintext XML into a base64 ciphertext.
    ///
    /// Prepends 16 random bytes and the big-endian payload length, appends
    /// the app identifier, pads, and encrypts. `decrypt` losslessly inverts
    /// the result.
    pub fn encrypt(&self, plaintext_xml: &str) -> CryptoResult<String> {
        let xml = plaintext_xml.as_bytes();

        let mut buf = Vec::with_capacity(PAYLOAD_OFFSET + xml.len() + self.app_id.len());
        let mut prefix = [0u8; RANDOM_PREFIX_LEN];
        rand::thread_rng().fill(&mut prefix);
        buf.extend_from_slice(&prefix);
        buf.extend_from_slice(&(xml.len() as u32).to_be_bytes());
        buf.extend_from_slice(xml);
        buf.extend_from_slice(self.app_id.as_bytes());

        let ciphertext =
            Aes256CbcEnc::new(&self.key.into(), &self.iv().into()).encrypt_padded_vec_mut::<Pkcs7>(&buf);

        Ok(STANDARD.encode(ciphertext))
    }

    /// Encrypt and sign a reply: fresh nonce, current timestamp, ciphertext,
    /// and a signature over the quadruple. The HTTP layer serializes the
    /// result into the outbound envelope XML.
    pub fn seal(&self, plaintext_xml: &str) -> CryptoResult<EncryptedEnvelope> {
        let encrypt = self.encrypt(plaintext_xml)?;
        let timestamp = chrono::Utc::now().timestamp();
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let signature =
            compute_signature(&self.token, &timestamp.to_string(), &nonce, &encrypt);

        Ok(EncryptedEnvelope {
            encrypt,
            signature,
            timestamp,
            nonce,
        })
    }

    /// The protocol fixes the IV to the first 16 bytes of the key.
    fn iv(&self) -> [u8; BLOCK_SIZE] {
        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&self.key[..BLOCK_SIZE]);
        iv
    }

    /// Split the decrypted buffer into XML payload and app identifier, and
    /// authenticate the latter.
    fn unpack(&self, plaintext: &[u8]) -> CryptoResult<String> {
        if plaintext.len() < PAYLOAD_OFFSET {
            return Err(CryptoError::MalformedCiphertext(
                "decrypted buffer shorter than envelope header".into(),
            ));
        }

        let len_bytes: [u8; 4] = plaintext[RANDOM_PREFIX_LEN..PAYLOAD_OFFSET]
            .try_into()
            .map_err(|_| CryptoError::MalformedCiphertext("unreadable length field".into()))?;
        let xml_len = u32::from_be_bytes(len_bytes) as usize;

        let xml_end = PAYLOAD_OFFSET
            .checked_add(xml_len)
            .filter(|end| *end <= plaintext.len())
            .ok_or_else(|| {
                CryptoError::MalformedCiphertext("payload length exceeds buffer".into())
            })?;

        let xml = std::str::from_utf8(&plaintext[PAYLOAD_OFFSET..xml_end])
            .map_err(|_| CryptoError::MalformedCiphertext("payload is not UTF-8".into()))?;
        let app_id = std::str::from_utf8(&plaintext[xml_end..])
            .map_err(|_| CryptoError::MalformedCiphertext("app id is not UTF-8".into()))?;

        if !constant_time_eq(app_id, &self.app_id) {
            return Err(CryptoError::AppIdMismatch);
        }

        Ok(xml.to_string())
    }
}

impl std::fmt::Debug for CallbackCrypto {
    /// Key material is deliberately omitted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackCrypto")
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 43-char base64 key (decodes to 32 bytes with one pad char).
    const TEST_AES_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";

    fn codec() -> CallbackCrypto {
        CallbackCrypto::new("testToken", "wx1234567890abcdef", TEST_AES_KEY)
            .expect("test codec construction failed")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let c = codec();
        let plaintext = "<xml><Content><![CDATA[hello]]></Content></xml>";

        let ciphertext = c.encrypt(plaintext).expect("encryption failed");
        let decrypted = c.decrypt(&ciphertext).expect("decryption failed");

        assert_eq!(plaintext, decrypted);
    }

    #[test]
    fn test_ciphertext_is_randomized() {
        let c = codec();
        let plaintext = "<xml/>";

        let ct1 = c.encrypt(plaintext).expect("encryption 1 failed");
        let ct2 = c.encrypt(plaintext).expect("encryption 2 failed");

        // Random prefix means identical plaintext never yields identical
        // ciphertext, but both decrypt to the same value.
        assert_ne!(ct1, ct2);
        assert_eq!(c.decrypt(&ct1).expect("decrypt 1"), plaintext);
        assert_eq!(c.decrypt(&ct2).expect("decrypt 2"), plaintext);
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(matches!(
            CallbackCrypto::new("t", "app", "too-short"),
            Err(CryptoError::InvalidAesKey)
        ));
        // Right length, not base64.
        let bad = "!".repeat(43);
        assert!(matches!(
            CallbackCrypto::new("t", "app", &bad),
            Err(CryptoError::InvalidAesKey)
        ));
    }

    #[test]
    fn test_garbage_ciphertext_is_malformed() {
        let c = codec();

        assert!(matches!(
            c.decrypt("not base64 at all!!!"),
            Err(CryptoError::MalformedCiphertext(_))
        ));

        // Valid base64, wrong block size.
        let short = STANDARD.encode(b"abc");
        assert!(matches!(
            c.decrypt(&short),
            Err(CryptoError::MalformedCiphertext(_))
        ));

        // Valid base64, block-aligned random bytes: padding check fails.
        let noise = STANDARD.encode([0x5au8; 64]);
        assert!(matches!(
            c.decrypt(&noise),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_app_id_mismatch_is_distinct() {
        let ours = codec();
        let theirs = CallbackCrypto::new("testToken", "wx_other_app_0000", TEST_AES_KEY)
            .expect("codec construction failed");

        let ciphertext = theirs.encrypt("<xml/>").expect("encryption failed");
        assert!(matches!(
            ours.decrypt(&ciphertext),
            Err(CryptoError::AppIdMismatch)
        ));
    }

    #[test]
    fn test_signature_verify() {
        let c = codec();
        let payload = c.encrypt("<xml/>").expect("encryption failed");
        let sig = compute_signature("testToken", "1409735669", "nonce123", &payload);

        assert!(c.verify_signature(&sig, "1409735669", "nonce123", &payload));
        assert!(!c.verify_signature(&sig, "1409735668", "nonce123", &payload));
        assert!(!c.verify_signature(&sig, "1409735669", "nonce124", &payload));

        let mut tampered = sig.clone().into_bytes();
        tampered[0] = if tampered[0] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(tampered).expect("hex is UTF-8");
        assert!(!c.verify_signature(&tampered, "1409735669", "nonce123", &payload));
    }

    #[test]
    fn test_check_signature_error_kind() {
        let c = codec();
        assert!(matches!(
            c.check_signature("deadbeef", "1", "n", "p"),
            Err(CryptoError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_seal_produces_verifiable_envelope() {
        let c = codec();
        let envelope = c.seal("<xml><MsgType>text</MsgType></xml>").expect("seal failed");

        assert!(c.verify_signature(
            &envelope.signature,
            &envelope.timestamp.to_string(),
            &envelope.nonce,
            &envelope.encrypt,
        ));
        assert_eq!(envelope.nonce.len(), 16);
        assert_eq!(
            c.decrypt(&envelope.encrypt).expect("decrypt failed"),
            "<xml><MsgType>text</MsgType></xml>"
        );
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let c = codec();
        let ct = c.encrypt("").expect("encryption failed");
        assert_eq!(c.decrypt(&ct).expect("decryption failed"), "");
    }
}
