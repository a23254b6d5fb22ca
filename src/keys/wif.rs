//! Wallet Import Format under arbitrary version bytes.

use bitcoin::base58;
use bitcoin::secp256k1::SecretKey;

use super::ChainParams;
use crate::error::{VaultError, VaultResult};

const COMPRESSED_FLAG: u8 = 0x01;

pub fn to_wif(secret: &SecretKey, params: &ChainParams) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(params.wif_prefix);
    payload.extend_from_slice(&secret.secret_bytes());
    payload.push(COMPRESSED_FLAG);
    base58::encode_check(&payload)
}

/// Parse a WIF. Fails when the version byte does not belong to `params`,
/// which is how stale key formats are detected.
pub fn from_wif(wif: &str, params: &ChainParams) -> VaultResult<(SecretKey, bool)> {
    let payload = base58::decode_check(wif.trim())
        .map_err(|e| VaultError::Crypto(format!("wif: {e}")))?;
    let compressed = match payload.len() {
        34 if payload[33] == COMPRESSED_FLAG => true,
        33 => false,
        n => return Err(VaultError::Crypto(format!("wif: bad length {n}"))),
    };
    if payload[0] != params.wif_prefix {
        return Err(VaultError::Crypto(format!(
            "wif: version {:#04x} is not {}",
            payload[0], params.name
        )));
    }
    let secret = SecretKey::from_slice(&payload[1..33])
        .map_err(|e| VaultError::Crypto(format!("wif: {e}")))?;
    Ok((secret, compressed))
}
