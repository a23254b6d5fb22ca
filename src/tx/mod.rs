//! Transaction Engine - selection, building, signing, message crypto.
//!
//! ```text
//!   indexer utxos ──► select_utxos ──► build_unsigned_transaction ──► raw hex
//!                                                                      │
//!                            KeyPair ──► sign_raw_tx ◄─────────────────┘
//!
//!   page PSBT ──► check_sighash ──► sign_raw_psbt ──► final hex | PSBT base64
//!
//!   sign_message / verify_message      encrypt_data / decrypt_data
//! ```
//!
//! Every function here is pure: no storage, no network, no shared state.
//! ECDSA nonces are RFC 6979 so identical inputs give identical signatures.

mod amount;
mod builder;
mod message;
mod sign;

pub use amount::{format_coin_amount, parse_coin_amount, parse_coin_value, SATS_PER_COIN};
pub use builder::{
    build_unsigned_transaction, flexible_u64, select_utxos, spent_outpoints, FeePolicy, Selection,
    UnsignedTransaction, Utxo,
};
pub use message::{decrypt_data, encrypt_data, message_hash, sign_message, verify_message};
pub use sign::{
    check_sighash, decode_psbt, sign_raw_psbt, sign_raw_tx, PsbtSignOptions, SignedPsbt,
    ALLOWED_SIGHASH_TYPES,
};

use bitcoin::consensus::encode::deserialize;
use bitcoin::Transaction;

use crate::error::{VaultError, VaultResult};

pub(crate) fn decode_tx(raw_tx: &str) -> VaultResult<Transaction> {
    let bytes = hex::decode(raw_tx.trim())
        .map_err(|e| VaultError::validation(format!("raw tx hex: {e}")))?;
    deserialize(&bytes).map_err(|e| VaultError::validation(format!("raw tx: {e}")))
}
