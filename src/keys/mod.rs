//! Key Derivation Engine - phrase → root → children → addresses.
//!
//! ```text
//!   generate_phrase()          12 English words (128 bits entropy)
//!        │
//!   generate_root(phrase)      BIP32 master from the BIP39 seed (no passphrase)
//!        │
//!   generate_child(root, i)    m/44'/<coin>'/0'/0/i
//!        │
//!   KeyPair::address()         P2PKH under ChainParams::p2pkh_prefix
//! ```
//!
//! Keys are persisted as compressed WIF. A stored root that no longer parses
//! under the active params is the signal to re-derive (see `wallet::migrate`).

mod address;
mod params;
mod wif;

pub use address::Address;
pub use params::ChainParams;
pub use wif::{from_wif as secret_from_wif, to_wif};

use std::str::FromStr;

use bip39::{Language, Mnemonic};
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::NetworkKind;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{VaultError, VaultResult};

/// A private key and its compressed public key.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

impl KeyPair {
    pub fn from_secret(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        Self { public: secret.public_key(&secp), secret }
    }

    pub fn to_wif(&self, params: &ChainParams) -> String {
        wif::to_wif(&self.secret, params)
    }

    pub fn address(&self, params: &ChainParams) -> String {
        generate_address(self, params)
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }
}

pub fn generate_phrase() -> VaultResult<String> {
    let mut entropy = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| VaultError::Crypto(e.to_string()));
    entropy.zeroize();
    Ok(mnemonic?.to_string())
}

/// Parse and checksum-validate a phrase supplied by a user.
pub fn parse_phrase(phrase: &str) -> VaultResult<Mnemonic> {
    Mnemonic::parse_in_normalized(Language::English, phrase.trim())
        .map_err(|e| VaultError::validation(format!("invalid seed phrase: {e}")))
}

pub fn generate_root(phrase: &str) -> VaultResult<Xpriv> {
    let mnemonic = parse_phrase(phrase)?;
    let mut seed = mnemonic.to_seed("");
    let root = Xpriv::new_master(NetworkKind::Main, &seed)
        .map_err(|e| VaultError::Crypto(e.to_string()));
    seed.zeroize();
    root
}

pub fn generate_child(root: &Xpriv, index: u32, params: &ChainParams) -> VaultResult<KeyPair> {
    let secp = Secp256k1::new();
    let path = DerivationPath::from_str(&params.child_path(index))
        .map_err(|e| VaultError::Crypto(e.to_string()))?;
    let child = root
        .derive_priv(&secp, &path)
        .map_err(|e| VaultError::Crypto(e.to_string()))?;
    Ok(KeyPair::from_secret(child.private_key))
}

pub fn generate_address(key: &KeyPair, params: &ChainParams) -> String {
    Address::p2pkh(&key.public).encode(params)
}

/// Deserialize a WIF. Doubles as the format check for stored keys.
pub fn from_wif(wif: &str, params: &ChainParams) -> VaultResult<KeyPair> {
    let (secret, _) = wif::from_wif(wif, params)?;
    Ok(KeyPair::from_secret(secret))
}

pub fn root_wif(root: &Xpriv, params: &ChainParams) -> String {
    wif::to_wif(&root.private_key, params)
}
