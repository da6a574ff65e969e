//! Cipher for stored values.
//!
//! Values are sealed with ChaCha20-Poly1305 under a 32-byte key derived from
//! the session secret with HKDF-SHA256. The stored form is
//! `base64(nonce || ciphertext)`; the nonce is random per write.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

use fieldbook_core::errors::{Error, Result};
use fieldbook_core::sync::SecretKey;

const NONCE_LEN: usize = 12;
const STORE_KEY_SALT: &[u8] = b"fieldbook-local-store";
const STORE_KEY_INFO: &[u8] = b"fieldbook/store-entry/v1";
const NAMESPACE_INFO: &[u8] = b"fieldbook/store-namespace/v1";

/// Cipher key derived from a session secret.
#[derive(Clone)]
pub struct StoreKey([u8; 32]);

impl StoreKey {
    /// Derives the cipher key. An empty secret is rejected: without a local
    /// session there is no key material.
    pub fn derive(secret: &SecretKey) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::encryption("no key material for the local store"));
        }
        let hk = Hkdf::<Sha256>::new(Some(STORE_KEY_SALT), secret.expose().as_bytes());
        let mut okm = [0_u8; 32];
        hk.expand(STORE_KEY_INFO, &mut okm)
            .map_err(|e| Error::encryption(format!("key derivation failed: {}", e)))?;
        Ok(Self(okm))
    }

    /// Same as [`StoreKey::derive`] but reports a missing key as a read failure.
    pub fn derive_for_read(secret: &SecretKey) -> Result<Self> {
        Self::derive(secret).map_err(|_| Error::decryption("no key material for the local store"))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreKey(<redacted>)")
    }
}

pub fn seal(key: &StoreKey, plaintext: &[u8]) -> Result<String> {
    let mut nonce_bytes = [0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| Error::encryption("cipher failure while sealing value"))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(sealed))
}

pub fn open(key: &StoreKey, sealed: &str) -> Result<Vec<u8>> {
    let raw = STANDARD
        .decode(sealed.trim())
        .map_err(|e| Error::decryption(format!("stored value is not valid base64: {}", e)))?;
    if raw.len() <= NONCE_LEN {
        return Err(Error::decryption("stored value is too short"));
    }

    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::decryption("wrong key or corrupted entry"))
}

/// Partition name for the entries sealed under `secret`: 16 bytes of HKDF
/// output, hex encoded. Distinct from the cipher key derivation.
pub fn store_namespace(secret: &SecretKey) -> Result<String> {
    if secret.is_empty() {
        return Err(Error::encryption("no key material for the local store"));
    }
    let hk = Hkdf::<Sha256>::new(Some(STORE_KEY_SALT), secret.expose().as_bytes());
    let mut okm = [0_u8; 16];
    hk.expand(NAMESPACE_INFO, &mut okm)
        .map_err(|e| Error::encryption(format!("namespace derivation failed: {}", e)))?;
    Ok(okm.iter().map(|byte| format!("{:02x}", byte)).collect())
}

/// Lowercase hex SHA-256 of `input`.
pub fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Random 256-bit secret, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(secret: &str) -> StoreKey {
        StoreKey::derive(&SecretKey::new(secret)).expect("derive key")
    }

    #[test]
    fn sealed_value_opens_with_same_secret() {
        let sealed = seal(&key("alpha"), b"{\"id\":\"1\"}").expect("seal");
        assert_eq!(open(&key("alpha"), &sealed).expect("open"), b"{\"id\":\"1\"}");
    }

    #[test]
    fn sealing_twice_uses_fresh_nonces() {
        let k = key("alpha");
        assert_ne!(seal(&k, b"same").expect("seal"), seal(&k, b"same").expect("seal"));
    }

    #[test]
    fn wrong_secret_is_a_decryption_error() {
        let sealed = seal(&key("alpha"), b"payload").expect("seal");
        let err = open(&key("beta"), &sealed).expect_err("must fail");
        assert!(err.is_unreadable_local_data());
    }

    #[test]
    fn garbage_is_a_decryption_error() {
        assert!(open(&key("alpha"), "not base64 !!").is_err());
        assert!(open(&key("alpha"), &STANDARD.encode([1_u8; 4])).is_err());
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(StoreKey::derive(&SecretKey::new("")).is_err());
        assert!(StoreKey::derive_for_read(&SecretKey::new(""))
            .expect_err("must fail")
            .is_unreadable_local_data());
    }

    #[test]
    fn namespaces_differ_per_secret_and_are_stable() {
        let alpha = store_namespace(&SecretKey::new("alpha")).expect("namespace");
        assert_eq!(alpha.len(), 32);
        assert_eq!(
            alpha,
            store_namespace(&SecretKey::new("alpha")).expect("namespace")
        );
        assert_ne!(
            alpha,
            store_namespace(&SecretKey::new("beta")).expect("namespace")
        );
        assert!(store_namespace(&SecretKey::new("")).is_err());
    }

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
