//! Signed messages and key-addressed message encryption.
//!
//! Signatures use the Bitcoin signed-message layout under the chain's own
//! prefix: `base64(header | r | s)`, header = 27 + recid + 4 (compressed key).
//!
//! Encryption is ECIES over secp256k1:
//!
//! ```text
//! shared = ECDH(ephemeral, recipient)
//! key    = HKDF-SHA256(ikm = shared, salt = ephemeral_pub, info = "pepevault-ecies")
//! wire   = base64( ephemeral_pub:33 | nonce:24 | XChaCha20-Poly1305(key, nonce, msg) )
//! ```

use base64::Engine;
use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::ecdh::SharedSecret;
use bitcoin::secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};
use crate::keys::{Address, ChainParams, KeyPair};

const ECIES_INFO: &[u8] = b"pepevault-ecies";
const PUBKEY_LEN: usize = 33;
const NONCE_LEN: usize = 24;

pub fn message_hash(message: &str, params: &ChainParams) -> [u8; 32] {
    let mut data = serialize(&VarInt(params.message_prefix.len() as u64));
    data.extend_from_slice(params.message_prefix.as_bytes());
    data.extend(serialize(&VarInt(message.len() as u64)));
    data.extend_from_slice(message.as_bytes());
    sha256d::Hash::hash(&data).to_byte_array()
}

pub fn sign_message(message: &str, key: &KeyPair, params: &ChainParams) -> String {
    let secp = Secp256k1::new();
    let msg = Message::from_digest(message_hash(message, params));
    let (rec_id, bytes) = secp.sign_ecdsa_recoverable(&msg, &key.secret).serialize_compact();
    let mut out = [0u8; 65];
    out[0] = 27 + rec_id.to_i32() as u8 + 4;
    out[1..].copy_from_slice(&bytes);
    base64::engine::general_purpose::STANDARD.encode(out)
}

/// True when `signature` over `message` recovers to `address`.
pub fn verify_message(address: &str, signature: &str, message: &str, params: &ChainParams) -> VaultResult<bool> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(signature.trim())
        .map_err(|e| VaultError::validation(format!("signature base64: {e}")))?;
    if raw.len() != 65 || !(27..=34).contains(&raw[0]) {
        return Err(VaultError::validation("malformed signature"));
    }
    let compressed = raw[0] >= 31;
    let rec_id = RecoveryId::from_i32(((raw[0] - 27) & 3) as i32)
        .map_err(|e| VaultError::validation(format!("signature: {e}")))?;
    let sig = RecoverableSignature::from_compact(&raw[1..], rec_id)
        .map_err(|e| VaultError::validation(format!("signature: {e}")))?;
    let secp = Secp256k1::new();
    let msg = Message::from_digest(message_hash(message, params));
    let Ok(pubkey) = secp.recover_ecdsa(&msg, &sig) else {
        return Ok(false);
    };
    if !compressed {
        return Ok(false);
    }
    Ok(Address::p2pkh(&pubkey).encode(params) == address.trim())
}

fn ecies_key(shared: &SharedSecret, ephemeral: &PublicKey) -> VaultResult<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(Some(&ephemeral.serialize()[..]), &shared.secret_bytes());
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(ECIES_INFO, &mut okm[..])
        .map_err(|e| VaultError::Crypto(format!("hkdf: {e}")))?;
    Ok(okm)
}

pub fn encrypt_data(recipient: &PublicKey, plaintext: &str) -> VaultResult<String> {
    let secp = Secp256k1::new();
    let mut seed = Zeroizing::new([0u8; 32]);
    let ephemeral_secret = loop {
        OsRng.fill_bytes(&mut seed[..]);
        if let Ok(sk) = SecretKey::from_slice(&seed[..]) {
            break sk;
        }
    };
    let ephemeral = ephemeral_secret.public_key(&secp);
    let shared = SharedSecret::new(recipient, &ephemeral_secret);
    let key = ecies_key(&shared, &ephemeral)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = XChaCha20Poly1305::new(Key::from_slice(&key[..]))
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| VaultError::Crypto(format!("ecies seal: {e}")))?;

    let mut out = Vec::with_capacity(PUBKEY_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&ephemeral.serialize());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(base64::engine::general_purpose::STANDARD.encode(out))
}

pub fn decrypt_data(key: &KeyPair, ciphertext: &str) -> VaultResult<String> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| VaultError::validation(format!("ciphertext base64: {e}")))?;
    if raw.len() < PUBKEY_LEN + NONCE_LEN + 16 {
        return Err(VaultError::validation("ciphertext too short"));
    }
    let ephemeral = PublicKey::from_slice(&raw[..PUBKEY_LEN])
        .map_err(|e| VaultError::validation(format!("ephemeral key: {e}")))?;
    let nonce = &raw[PUBKEY_LEN..PUBKEY_LEN + NONCE_LEN];
    let shared = SharedSecret::new(&ephemeral, &key.secret);
    let sym = ecies_key(&shared, &ephemeral)?;
    let plaintext = XChaCha20Poly1305::new(Key::from_slice(&sym[..]))
        .decrypt(XNonce::from_slice(nonce), &raw[PUBKEY_LEN + NONCE_LEN..])
        .map_err(|_| VaultError::validation("message could not be decrypted with this key"))?;
    String::from_utf8(plaintext).map_err(|_| VaultError::validation("decrypted message is not UTF-8"))
}
