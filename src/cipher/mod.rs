//! Cipher Store - password-based encryption of wallet payloads.
//!
//! ```text
//! blob = base64( version:1 | m_cost:4 | t_cost:4 | p_cost:4 | salt:16 | nonce:24 | ciphertext )
//! key  = Argon2id(password, salt, m/t/p)
//! ct   = XChaCha20-Poly1305(key, nonce, json(payload), aad = "pepevault-blob" | header)
//! ```
//!
//! The KDF parameters travel inside the blob so a store written with one cost
//! setting stays readable after the setting changes.

use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};

const VERSION: u8 = 1;
const AAD_BLOB: &[u8] = b"pepevault-blob";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const HEADER_LEN: usize = 1 + 12 + SALT_LEN + NONCE_LEN;

/// Opaque encrypted payload, stored as a base64 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn from_string(value: String) -> Self { Self(value) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self { m_cost: 19_456, t_cost: 2, p_cost: 1 }
    }
}

impl KdfParams {
    /// Largest costs a blob header may ask for. Anything above is treated as
    /// corruption and never reaches argon2.
    pub const MAX: KdfParams = KdfParams { m_cost: 4 * 19_456, t_cost: 16, p_cost: 8 };

    /// Minimum-cost parameters for tests and short-lived stores.
    pub fn light() -> Self {
        Self { m_cost: 256, t_cost: 1, p_cost: 1 }
    }

    pub fn within_limits(&self) -> bool {
        self.m_cost <= Self::MAX.m_cost && self.t_cost <= Self::MAX.t_cost && self.p_cost <= Self::MAX.p_cost
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKey([u8; 32]);

/// Stateless apart from its cost parameters; safe to share across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cipher {
    params: KdfParams,
}

impl Cipher {
    pub fn new(params: KdfParams) -> Self { Self { params } }

    pub fn params(&self) -> KdfParams { self.params }

    pub fn encrypt<T: Serialize + ?Sized>(&self, data: &T, password: &str) -> VaultResult<EncryptedBlob> {
        if !self.params.within_limits() {
            return Err(VaultError::Crypto("kdf parameters exceed the readable maximum".into()));
        }
        let mut plaintext = serde_json::to_vec(data)?;
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let mut out = Vec::with_capacity(HEADER_LEN + plaintext.len() + 16);
        out.push(VERSION);
        out.extend_from_slice(&self.params.m_cost.to_le_bytes());
        out.extend_from_slice(&self.params.t_cost.to_le_bytes());
        out.extend_from_slice(&self.params.p_cost.to_le_bytes());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);

        let key = derive_key(password, &salt, &self.params)?;
        let aad = aad(&out[..HEADER_LEN]);
        let sealed = XChaCha20Poly1305::new(Key::from_slice(&key.0))
            .encrypt(XNonce::from_slice(&nonce), Payload { msg: &plaintext, aad: &aad })
            .map_err(|e| VaultError::Crypto(format!("seal: {e}")));
        plaintext.zeroize();
        out.extend_from_slice(&sealed?);
        Ok(EncryptedBlob(base64::engine::general_purpose::STANDARD.encode(out)))
    }

    /// `None` on a wrong password, a corrupted blob, or a payload of another shape.
    pub fn decrypt<T: DeserializeOwned>(&self, blob: &EncryptedBlob, password: &str) -> Option<T> {
        let raw = base64::engine::general_purpose::STANDARD.decode(&blob.0).ok()?;
        if raw.len() < HEADER_LEN + 16 || raw[0] != VERSION {
            return None;
        }
        let word = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let params = KdfParams { m_cost: word(1), t_cost: word(5), p_cost: word(9) };
        if !params.within_limits() {
            return None;
        }
        let salt = &raw[13..13 + SALT_LEN];
        let nonce = &raw[13 + SALT_LEN..HEADER_LEN];

        let key = derive_key(password, salt, &params).ok()?;
        let aad = aad(&raw[..HEADER_LEN]);
        let mut plaintext = XChaCha20Poly1305::new(Key::from_slice(&key.0))
            .decrypt(XNonce::from_slice(nonce), Payload { msg: &raw[HEADER_LEN..], aad: &aad })
            .ok()?;
        let value = serde_json::from_slice(&plaintext).ok();
        plaintext.zeroize();
        value
    }

    /// One-way password digest. Only ever stored inside an encrypted blob.
    pub fn hash(&self, password: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"pepevault-password");
        hasher.update(password.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Seal the password digest under the password itself.
    pub fn seal_password(&self, password: &str) -> VaultResult<EncryptedBlob> {
        self.encrypt(&self.hash(password), password)
    }

    pub fn verify_password(&self, blob: &EncryptedBlob, password: &str) -> bool {
        self.decrypt::<String>(blob, password)
            .map(|stored| stored == self.hash(password))
            .unwrap_or(false)
    }
}

fn aad(header: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_BLOB.len() + header.len());
    aad.extend_from_slice(AAD_BLOB);
    aad.extend_from_slice(header);
    aad
}

fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> VaultResult<DerivedKey> {
    let argon_params = argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| VaultError::Crypto(format!("argon2 params: {e}")))?;
    let argon = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, argon_params);
    let mut out = [0u8; 32];
    argon
        .hash_password_into(password.as_bytes(), salt, &mut out)
        .map_err(|e| VaultError::Crypto(format!("argon2: {e}")))?;
    Ok(DerivedKey(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cipher() -> Cipher { Cipher::new(KdfParams::light()) }

    #[test]
    fn test_roundtrip() {
        let payload = json!({"phrase": "abandon about", "children": ["a", "b"]});
        let blob = cipher().encrypt(&payload, "hunter2").unwrap();
        let back: serde_json::Value = cipher().decrypt(&blob, "hunter2").unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_wrong_password_yields_none() {
        let blob = cipher().encrypt(&"secret", "right").unwrap();
        assert!(cipher().decrypt::<String>(&blob, "wrong").is_none());
        assert!(cipher().decrypt::<String>(&blob, "").is_none());
    }

    #[test]
    fn test_tampered_blob_yields_none() {
        let blob = cipher().encrypt(&"secret", "pw").unwrap();
        let mut raw = base64::engine::general_purpose::STANDARD.decode(blob.as_str()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = EncryptedBlob::from_string(base64::engine::general_purpose::STANDARD.encode(raw));
        assert!(cipher().decrypt::<String>(&tampered, "pw").is_none());
        assert!(cipher().decrypt::<String>(&EncryptedBlob::from_string("!!".into()), "pw").is_none());
    }

    #[test]
    fn test_oversized_header_costs_yield_none() {
        let blob = cipher().encrypt(&"secret", "pw").unwrap();
        let raw = base64::engine::general_purpose::STANDARD.decode(blob.as_str()).unwrap();
        for (at, value) in [(1usize, 0x0FFF_FFFFu32), (5, 1_000_000), (9, 0xFFFF)] {
            let mut bad = raw.clone();
            bad[at..at + 4].copy_from_slice(&value.to_le_bytes());
            let bad = EncryptedBlob::from_string(base64::engine::general_purpose::STANDARD.encode(bad));
            assert!(cipher().decrypt::<String>(&bad, "pw").is_none(), "offset {at}");
        }
    }

    #[test]
    fn test_encrypt_refuses_unreadable_params() {
        let greedy = Cipher::new(KdfParams { m_cost: KdfParams::MAX.m_cost + 1, ..KdfParams::light() });
        assert!(greedy.encrypt(&"secret", "pw").is_err());
        assert!(KdfParams::default().within_limits());
        assert!(KdfParams::MAX.within_limits());
    }

    #[test]
    fn test_params_travel_with_blob() {
        let blob = Cipher::new(KdfParams { m_cost: 512, t_cost: 1, p_cost: 1 })
            .encrypt(&42u32, "pw")
            .unwrap();
        assert_eq!(cipher().decrypt::<u32>(&blob, "pw"), Some(42));
    }

    #[test]
    fn test_password_verifier() {
        let c = cipher();
        let sealed = c.seal_password("pw").unwrap();
        assert!(c.verify_password(&sealed, "pw"));
        assert!(!c.verify_password(&sealed, "pw "));
        assert_ne!(c.hash("pw"), "pw");
        assert_eq!(c.hash("pw"), c.hash("pw"));
    }
}
