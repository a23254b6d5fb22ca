//! Wallet record - the secret payload kept encrypted at rest.
//!
//! # Architecture
//!
//! ```text
//! Wallet (secret)                         SessionWallet (session view)
//!     phrase ──► root (WIF)                   addresses
//!     children[i] (WIF) ──► addresses[i]      nicknames
//!     indices[i]  (BIP44 child index)         phrase   (only on explicit request)
//!     nicknames   address → label
//! ```
//!
//! `children`, `addresses` and `indices` are parallel and always the same
//! length. Position 0 exists from creation on and cannot be deleted.
//! Deleting an address never frees its derivation index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};
use crate::keys::{self, ChainParams, KeyPair};

pub const MAX_NICKNAME_LENGTH: usize = 18;

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Wallet {
    pub phrase: String,
    pub root: String,
    pub children: Vec<String>,
    #[zeroize(skip)]
    pub addresses: Vec<String>,
    #[zeroize(skip)]
    #[serde(default)]
    pub nicknames: BTreeMap<String, String>,
    /// Derivation index per position. Records written before this field existed
    /// derived positions 0..n in order.
    #[zeroize(skip)]
    #[serde(default)]
    pub indices: Vec<u32>,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("addresses", &self.addresses)
            .field("nicknames", &self.nicknames)
            .field("indices", &self.indices)
            .finish_non_exhaustive()
    }
}

/// Non-secret view handed to the UI for the life of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWallet {
    pub addresses: Vec<String>,
    pub nicknames: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,
}

pub fn validate_nickname(nickname: &str) -> VaultResult<()> {
    if nickname.chars().count() > MAX_NICKNAME_LENGTH {
        return Err(VaultError::validation(format!(
            "nickname longer than {MAX_NICKNAME_LENGTH} characters"
        )));
    }
    Ok(())
}

impl Wallet {
    /// New wallet from an imported phrase, or a freshly generated one.
    pub fn create(phrase: Option<&str>, params: &ChainParams) -> VaultResult<Self> {
        let phrase = match phrase {
            Some(p) => keys::parse_phrase(p)?.to_string(),
            None => keys::generate_phrase()?,
        };
        let root = keys::generate_root(&phrase)?;
        let child = keys::generate_child(&root, 0, params)?;
        let address = child.address(params);
        let mut nicknames = BTreeMap::new();
        nicknames.insert(address.clone(), "Address 1".to_string());
        Ok(Self {
            root: keys::root_wif(&root, params),
            children: vec![child.to_wif(params)],
            addresses: vec![address],
            nicknames,
            indices: vec![0],
            phrase,
        })
    }

    /// Reject records whose parallel sequences disagree.
    pub fn check(&self) -> VaultResult<()> {
        let indices_ok = self.indices.is_empty() || self.indices.len() == self.children.len();
        if self.children.len() != self.addresses.len() || !indices_ok || self.children.is_empty() {
            return Err(VaultError::Storage("wallet record is inconsistent".into()));
        }
        Ok(())
    }

    pub fn derivation_indices(&self) -> Vec<u32> {
        if self.indices.len() == self.children.len() {
            self.indices.clone()
        } else {
            (0..self.children.len() as u32).collect()
        }
    }

    pub fn key_at(&self, position: usize, params: &ChainParams) -> VaultResult<KeyPair> {
        let wif = self
            .children
            .get(position)
            .ok_or_else(|| VaultError::validation(format!("no address at index {position}")))?;
        keys::from_wif(wif, params)
    }

    /// Derive the next address. Returns its position.
    pub fn generate_address(&mut self, nickname: Option<&str>, params: &ChainParams) -> VaultResult<usize> {
        let nickname = nickname.map(str::trim).filter(|n| !n.is_empty());
        if let Some(n) = nickname {
            validate_nickname(n)?;
        }
        let mut indices = self.derivation_indices();
        let next = indices.iter().max().map_or(0, |m| m + 1);
        let root = keys::generate_root(&self.phrase)?;
        let child = keys::generate_child(&root, next, params)?;
        let address = child.address(params);

        self.children.push(child.to_wif(params));
        self.addresses.push(address.clone());
        indices.push(next);
        self.indices = indices;
        let label = nickname
            .map(str::to_string)
            .unwrap_or_else(|| format!("Address {}", self.addresses.len()));
        self.nicknames.insert(address, label);
        Ok(self.addresses.len() - 1)
    }

    pub fn delete_address(&mut self, position: usize) -> VaultResult<String> {
        if position == 0 {
            return Err(VaultError::validation("the first address cannot be deleted"));
        }
        if position >= self.addresses.len() {
            return Err(VaultError::validation(format!("no address at index {position}")));
        }
        let mut indices = self.derivation_indices();
        indices.remove(position);
        self.indices = indices;
        let mut wif = self.children.remove(position);
        wif.zeroize();
        let address = self.addresses.remove(position);
        self.nicknames.remove(&address);
        Ok(address)
    }

    pub fn set_nickname(&mut self, address: &str, nickname: &str) -> VaultResult<()> {
        validate_nickname(nickname)?;
        if !self.addresses.iter().any(|a| a == address) {
            return Err(VaultError::validation(format!("unknown address {address}")));
        }
        self.nicknames.insert(address.to_string(), nickname.to_string());
        Ok(())
    }

    pub fn session_view(&self, include_phrase: bool) -> SessionWallet {
        SessionWallet {
            addresses: self.addresses.clone(),
            nicknames: self.nicknames.clone(),
            phrase: include_phrase.then(|| self.phrase.clone()),
        }
    }

    pub fn needs_migration(&self, params: &ChainParams) -> bool {
        keys::from_wif(&self.root, params).is_err()
    }

    /// Re-derive root and children from the phrase when the stored root does
    /// not parse under `params`. Derivation indices are preserved. Returns
    /// whether anything changed; a second call is a no-op.
    pub fn migrate(&mut self, params: &ChainParams) -> VaultResult<bool> {
        if !self.needs_migration(params) {
            return Ok(false);
        }
        let root = keys::generate_root(&self.phrase)?;
        let indices = self.derivation_indices();
        let mut children = Vec::with_capacity(indices.len());
        let mut addresses = Vec::with_capacity(indices.len());
        for &index in &indices {
            let child = keys::generate_child(&root, index, params)?;
            addresses.push(child.address(params));
            children.push(child.to_wif(params));
        }

        let mut nicknames = BTreeMap::new();
        for (old, new) in self.addresses.iter().zip(addresses.iter()) {
            if let Some(label) = self.nicknames.get(old) {
                nicknames.insert(new.clone(), label.clone());
            }
        }

        self.root.zeroize();
        self.root = keys::root_wif(&root, params);
        self.children.zeroize();
        self.children = children;
        self.addresses = addresses;
        self.nicknames = nicknames;
        self.indices = indices;
        Ok(true)
    }
}
