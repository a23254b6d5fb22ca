//! Legacy P2PKH signing of raw transactions and PSBTs.

use std::collections::BTreeSet;

use base64::Engine;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::psbt::{Psbt, PsbtSighashType};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{ecdsa, Script, ScriptBuf, TxOut};
use serde::{Deserialize, Serialize};

use super::decode_tx;
use crate::error::{VaultError, VaultResult};
use crate::keys::{Address, KeyPair};

/// Signature-hash flags a page may request. SIGHASH_NONE variants are absent:
/// they let whoever completes the transaction rewrite its outputs.
pub const ALLOWED_SIGHASH_TYPES: [u32; 5] = [1, 3, 128, 129, 131];

pub fn check_sighash(flag: u32) -> VaultResult<EcdsaSighashType> {
    if !ALLOWED_SIGHASH_TYPES.contains(&flag) {
        return Err(VaultError::PolicyViolation(flag));
    }
    Ok(EcdsaSighashType::from_consensus(flag))
}

/// Result of a PSBT signing pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPsbt {
    /// Final transaction hex when finalized in full, PSBT base64 otherwise.
    pub raw_tx: String,
    /// `None` when a prevout value is unknown.
    pub fee: Option<u64>,
    /// Value leaving the signer (outputs not paying back to its own address).
    pub amount: u64,
    pub finalized: bool,
}

#[derive(Debug, Clone)]
pub struct PsbtSignOptions {
    pub indexes: Vec<usize>,
    pub finalize: bool,
    pub partial: bool,
    pub sighash_type: Option<u32>,
}

impl Default for PsbtSignOptions {
    fn default() -> Self {
        Self { indexes: Vec::new(), finalize: true, partial: false, sighash_type: None }
    }
}

fn own_script(key: &KeyPair) -> ScriptBuf {
    Address::p2pkh(&key.public).script_pubkey()
}

fn legacy_signature(
    cache: &SighashCache<&bitcoin::Transaction>,
    index: usize,
    prevout_script: &Script,
    sighash: EcdsaSighashType,
    key: &KeyPair,
) -> VaultResult<ecdsa::Signature> {
    let digest = cache
        .legacy_signature_hash(index, prevout_script, sighash.to_u32())
        .map_err(|e| VaultError::validation(format!("input {index}: {e}")))?;
    let secp = Secp256k1::new();
    let signature = secp.sign_ecdsa(&Message::from_digest(digest.to_byte_array()), &key.secret);
    Ok(ecdsa::Signature { signature, sighash_type: sighash })
}

fn p2pkh_script_sig(signature: &ecdsa::Signature, key: &KeyPair) -> VaultResult<ScriptBuf> {
    let sig = PushBytesBuf::try_from(signature.to_vec())
        .map_err(|e| VaultError::Crypto(format!("signature push: {e}")))?;
    Ok(Builder::new()
        .push_slice(sig)
        .push_key(&bitcoin::PublicKey::new(key.public))
        .into_script())
}

/// Sign every input of an unsigned transaction as a spend from `key`'s own address.
pub fn sign_raw_tx(raw_tx: &str, key: &KeyPair) -> VaultResult<String> {
    let mut tx = decode_tx(raw_tx)?;
    if tx.input.is_empty() {
        return Err(VaultError::validation("transaction has no inputs"));
    }
    let script = own_script(key);
    let signatures = {
        let cache = SighashCache::new(&tx);
        (0..tx.input.len())
            .map(|i| legacy_signature(&cache, i, &script, EcdsaSighashType::All, key))
            .collect::<VaultResult<Vec<_>>>()?
    };
    for (input, signature) in tx.input.iter_mut().zip(signatures.iter()) {
        input.script_sig = p2pkh_script_sig(signature, key)?;
    }
    Ok(serialize_hex(&tx))
}

/// Accepts base64 or hex.
pub fn decode_psbt(raw: &str) -> VaultResult<Psbt> {
    let raw = raw.trim();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw)
        .ok()
        .filter(|b| b.starts_with(b"psbt\xff"))
        .or_else(|| hex::decode(raw).ok())
        .ok_or_else(|| VaultError::validation("psbt is neither base64 nor hex"))?;
    Psbt::deserialize(&bytes).map_err(|e| VaultError::validation(format!("psbt: {e}")))
}

/// Output spent by input `index`. A full funding transaction must hash to the
/// txid the input actually spends; legacy sighashes do not commit to values.
fn prevout(psbt: &Psbt, index: usize) -> VaultResult<Option<TxOut>> {
    let (Some(input), Some(txin)) = (psbt.inputs.get(index), psbt.unsigned_tx.input.get(index)) else {
        return Ok(None);
    };
    if let Some(prev_tx) = &input.non_witness_utxo {
        if prev_tx.compute_txid() != txin.previous_output.txid {
            return Err(VaultError::validation(format!(
                "input {index}: funding transaction does not match the spent outpoint"
            )));
        }
        return Ok(prev_tx.output.get(txin.previous_output.vout as usize).cloned());
    }
    Ok(input.witness_utxo.clone())
}

fn checked_total(values: impl IntoIterator<Item = u64>) -> VaultResult<u64> {
    values
        .into_iter()
        .try_fold(0u64, u64::checked_add)
        .ok_or_else(|| VaultError::validation("psbt values overflow"))
}

/// Sign the listed PSBT inputs with `key`.
///
/// The sighash flag is checked against [`ALLOWED_SIGHASH_TYPES`] before the
/// PSBT is even decoded.
pub fn sign_raw_psbt(raw: &str, key: &KeyPair, opts: &PsbtSignOptions) -> VaultResult<SignedPsbt> {
    let sighash = check_sighash(opts.sighash_type.unwrap_or(1))?;
    let mut psbt = decode_psbt(raw)?;

    let indexes: BTreeSet<usize> = opts.indexes.iter().copied().collect();
    if indexes.is_empty() {
        return Err(VaultError::validation("no inputs selected for signing"));
    }
    let own = own_script(key);

    let mut signatures = Vec::with_capacity(indexes.len());
    {
        let cache = SighashCache::new(&psbt.unsigned_tx);
        for &index in &indexes {
            if index >= psbt.inputs.len() {
                return Err(VaultError::validation(format!("input index {index} out of range")));
            }
            let prev = prevout(&psbt, index)?
                .ok_or_else(|| VaultError::validation(format!("input {index} has no previous output")))?;
            if prev.script_pubkey != own {
                return Err(VaultError::validation(format!("input {index} is not spendable by this key")));
            }
            signatures.push((index, legacy_signature(&cache, index, &prev.script_pubkey, sighash, key)?));
        }
    }

    let public = bitcoin::PublicKey::new(key.public);
    for (index, signature) in &signatures {
        let input = &mut psbt.inputs[*index];
        if opts.finalize {
            input.final_script_sig = Some(p2pkh_script_sig(signature, key)?);
            input.partial_sigs.clear();
            input.sighash_type = None;
            input.bip32_derivation.clear();
            input.redeem_script = None;
        } else {
            input.sighash_type = Some(PsbtSighashType::from(sighash));
            input.partial_sigs.insert(public, *signature);
        }
    }

    let output_total = checked_total(psbt.unsigned_tx.output.iter().map(|o| o.value.to_sat()))?;
    let prevouts = (0..psbt.inputs.len())
        .map(|i| prevout(&psbt, i))
        .collect::<VaultResult<Option<Vec<TxOut>>>>()?;
    let fee = match prevouts {
        Some(outs) => checked_total(outs.iter().map(|o| o.value.to_sat()))?.checked_sub(output_total),
        None => None,
    };
    let amount = checked_total(
        psbt.unsigned_tx
            .output
            .iter()
            .filter(|o| o.script_pubkey != own)
            .map(|o| o.value.to_sat()),
    )?;

    let finalized = opts.finalize && !opts.partial;
    let raw_tx = if finalized {
        serialize_hex(&psbt.extract_tx_unchecked_fee_rate())
    } else {
        base64::engine::general_purpose::STANDARD.encode(psbt.serialize())
    };
    tracing::debug!(signed = signatures.len(), finalized, "signed psbt inputs");
    Ok(SignedPsbt { raw_tx, fee, amount, finalized })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelist() {
        for ok in ALLOWED_SIGHASH_TYPES {
            assert!(check_sighash(ok).is_ok(), "{ok}");
        }
        for bad in [0u32, 2, 4, 130, 0x41, 255, 1 << 16] {
            assert!(matches!(check_sighash(bad), Err(VaultError::PolicyViolation(f)) if f == bad));
        }
    }

    #[test]
    fn test_policy_checked_before_decoding() {
        let key = KeyPair::from_secret(bitcoin::secp256k1::SecretKey::from_slice(&[2u8; 32]).unwrap());
        let opts = PsbtSignOptions { indexes: vec![0], sighash_type: Some(2), ..Default::default() };
        // Garbage PSBT: a decode error would be Validation, the policy error wins.
        let err = sign_raw_psbt("not a psbt", &key, &opts).unwrap_err();
        assert!(matches!(err, VaultError::PolicyViolation(2)));
    }
}
