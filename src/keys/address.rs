//! Base58check addresses under the active chain's version bytes.

use bitcoin::base58;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{PubkeyHash, ScriptBuf, ScriptHash};

use super::ChainParams;
use crate::error::{VaultError, VaultResult};

/// A decoded recipient: either a key hash or a script hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    P2pkh(PubkeyHash),
    P2sh(ScriptHash),
}

impl Address {
    pub fn p2pkh(pubkey: &PublicKey) -> Self {
        let hash = hash160::Hash::hash(&pubkey.serialize());
        Address::P2pkh(PubkeyHash::from_raw_hash(hash))
    }

    pub fn parse(value: &str, params: &ChainParams) -> VaultResult<Self> {
        let payload = base58::decode_check(value.trim())
            .map_err(|_| VaultError::validation(format!("invalid address: {value}")))?;
        if payload.len() != 21 {
            return Err(VaultError::validation(format!("invalid address: {value}")));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        match payload[0] {
            v if v == params.p2pkh_prefix => Ok(Address::P2pkh(PubkeyHash::from_byte_array(hash))),
            v if v == params.p2sh_prefix => Ok(Address::P2sh(ScriptHash::from_byte_array(hash))),
            _ => Err(VaultError::validation(format!(
                "address {value} is not a {} address",
                params.name
            ))),
        }
    }

    pub fn encode(&self, params: &ChainParams) -> String {
        let mut payload = Vec::with_capacity(21);
        match self {
            Address::P2pkh(hash) => {
                payload.push(params.p2pkh_prefix);
                payload.extend_from_slice(hash.as_byte_array());
            }
            Address::P2sh(hash) => {
                payload.push(params.p2sh_prefix);
                payload.extend_from_slice(hash.as_byte_array());
            }
        }
        base58::encode_check(&payload)
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        match self {
            Address::P2pkh(hash) => ScriptBuf::new_p2pkh(hash),
            Address::P2sh(hash) => ScriptBuf::new_p2sh(hash),
        }
    }
}
