//! Key vault
//!
//! Encrypts wallet private keys at rest with XChaCha20-Poly1305.
//!
//! SECURITY:
//! - The process-wide key is loaded once and held in a `SecretBox`
//! - Every encryption draws a fresh 24-byte random nonce
//! - Decryption fails closed: a tag that doesn't verify yields an error, never bytes
//! - Plaintext is returned in `Zeroizing` buffers so it is wiped on drop

use crate::error::CryptoError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use chacha20poly1305::{Key, Tag, XChaCha20Poly1305, XNonce};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// The process-wide wallet encryption key
pub struct EncryptionKey(SecretBox<[u8; KEY_LEN]>);

impl EncryptionKey {
    /// Load the key from a base64 environment variable
    pub fn from_env(var_name: &'static str) -> Result<Self, CryptoError> {
        let encoded = Zeroizing::new(
            std::env::var(var_name).map_err(|_| CryptoError::MissingKey(var_name))?,
        );
        Self::from_base64(&encoded)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| CryptoError::MalformedKey(format!("not base64: {}", e)))?,
        );
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::MalformedKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }

        let mut key = Box::new([0u8; KEY_LEN]);
        key.copy_from_slice(&bytes);
        Ok(Self(SecretBox::new(key)))
    }

    /// Generate a new random key
    pub fn generate() -> Self {
        let mut generated = XChaCha20Poly1305::generate_key(&mut OsRng);
        let mut key = Box::new([0u8; KEY_LEN]);
        key.copy_from_slice(generated.as_slice());
        generated.as_mut_slice().zeroize();
        Self(SecretBox::new(key))
    }

    /// Base64 form, for writing the key into a secrets store once
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.0.expose_secret()))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// At-rest form of a private key; each part is base64 encoded independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
}

/// Authenticated encryption of private keys under the process-wide key
pub struct KeyVault {
    key: EncryptionKey,
}

impl KeyVault {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(self.key.0.expose_secret()))
    }

    /// Encrypt a hex-encoded private key
    pub fn encrypt(&self, raw_key_hex: &str) -> Result<Envelope, CryptoError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let mut buffer = Zeroizing::new(raw_key_hex.as_bytes().to_vec());

        let tag = self
            .cipher()
            .encrypt_in_place_detached(&nonce, b"", buffer.as_mut_slice())
            .map_err(|_| CryptoError::MalformedEnvelope("encryption failed".to_string()))?;

        Ok(Envelope {
            iv: STANDARD.encode(nonce.as_slice()),
            ciphertext: STANDARD.encode(buffer.as_slice()),
            tag: STANDARD.encode(tag.as_slice()),
        })
    }

    /// Decrypt an envelope back to the hex-encoded private key
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Zeroizing<String>, CryptoError> {
        let iv = decode_part("iv", &envelope.iv, Some(NONCE_LEN))?;
        let tag = decode_part("tag", &envelope.tag, Some(TAG_LEN))?;
        let mut buffer = Zeroizing::new(decode_part("ciphertext", &envelope.ciphertext, None)?);

        self.cipher()
            .decrypt_in_place_detached(
                XNonce::from_slice(&iv),
                b"",
                buffer.as_mut_slice(),
                Tag::from_slice(&tag),
            )
            .map_err(|_| CryptoError::Authentication)?;

        match String::from_utf8(std::mem::take(&mut *buffer)) {
            Ok(plain) => Ok(Zeroizing::new(plain)),
            Err(e) => {
                e.into_bytes().zeroize();
                Err(CryptoError::MalformedEnvelope(
                    "plaintext is not utf-8".to_string(),
                ))
            }
        }
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault").field("key", &self.key).finish()
    }
}

fn decode_part(name: &str, value: &str, len: Option<usize>) -> Result<Vec<u8>, CryptoError> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| CryptoError::MalformedEnvelope(format!("{}: {}", name, e)))?;
    match len {
        Some(expected) if bytes.len() != expected => Err(CryptoError::MalformedEnvelope(format!(
            "{}: expected {} bytes, got {}",
            name,
            expected,
            bytes.len()
        ))),
        _ => Ok(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn vault() -> KeyVault {
        KeyVault::new(EncryptionKey::generate())
    }

    fn flip_bit(encoded: &str, byte: usize, bit: u8) -> String {
        let mut bytes = STANDARD.decode(encoded).unwrap();
        bytes[byte] ^= 1 << bit;
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_round_trip() {
        let vault = vault();
        for key in [TEST_KEY, "0x01", ""] {
            let envelope = vault.encrypt(key).unwrap();
            assert_eq!(vault.decrypt(&envelope).unwrap().as_str(), key);
        }
    }

    #[test]
    fn test_ciphertext_tamper_fails_closed() {
        let vault = vault();
        let envelope = vault.encrypt(TEST_KEY).unwrap();
        let len = STANDARD.decode(&envelope.ciphertext).unwrap().len();

        for byte in 0..len {
            for bit in [0u8, 7] {
                let tampered = Envelope {
                    ciphertext: flip_bit(&envelope.ciphertext, byte, bit),
                    ..envelope.clone()
                };
                assert!(matches!(
                    vault.decrypt(&tampered),
                    Err(CryptoError::Authentication)
                ));
            }
        }
    }

    #[test]
    fn test_tag_tamper_fails_closed() {
        let vault = vault();
        let envelope = vault.encrypt(TEST_KEY).unwrap();

        for byte in 0..TAG_LEN {
            for bit in 0..8u8 {
                let tampered = Envelope {
                    tag: flip_bit(&envelope.tag, byte, bit),
                    ..envelope.clone()
                };
                assert!(matches!(
                    vault.decrypt(&tampered),
                    Err(CryptoError::Authentication)
                ));
            }
        }
    }

    #[test]
    fn test_nonces_are_unique() {
        let vault = vault();
        let ivs: HashSet<String> = (0..256)
            .map(|_| vault.encrypt(TEST_KEY).unwrap().iv)
            .collect();
        assert_eq!(ivs.len(), 256);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let envelope = vault().encrypt(TEST_KEY).unwrap();
        assert!(matches!(
            vault().decrypt(&envelope),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_key_loading() {
        let key = EncryptionKey::generate();
        let encoded = key.to_base64();
        assert!(EncryptionKey::from_base64(&encoded).is_ok());

        let short = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            EncryptionKey::from_base64(&short),
            Err(CryptoError::MalformedKey(_))
        ));
        assert!(matches!(
            EncryptionKey::from_base64("not base64!"),
            Err(CryptoError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_malformed_envelope() {
        let vault = vault();
        let mut envelope = vault.encrypt(TEST_KEY).unwrap();
        envelope.iv = STANDARD.encode([0u8; 12]);
        assert!(matches!(
            vault.decrypt(&envelope),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = EncryptionKey::generate();
        let encoded = key.to_base64();
        let vault = KeyVault::new(key);
        let debug_str = format!("{:?}", vault);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains(encoded.as_str()));
    }
}
