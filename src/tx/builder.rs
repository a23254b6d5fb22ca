//! UTXO selection and unsigned transaction assembly.
//!
//! Selection is deliberately simple and fully deterministic:
//!
//! ```text
//! sort utxos ascending by value (stable)
//! for utxo in sorted:
//!     if total >= amount && total >= amount + fee(selected.len()): stop
//!     select utxo
//! fee = fee(selected.len())
//! total < amount + fee  →  InsufficientFunds
//! change = total - amount - fee
//! change > dust_threshold  →  change output, else forfeited to fee
//! ```

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::keys::{Address, ChainParams};

/// An unspent output as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    #[serde(deserialize_with = "flexible_u64")]
    pub value: u64,
}

impl Utxo {
    pub fn outpoint_key(&self) -> String {
        format!("{}:{}", self.txid, self.vout)
    }
}

/// Indexers return values as numbers or numeric strings.
pub fn flexible_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Size and rate constants behind the fee estimate. All values configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    /// Sats per estimated size unit.
    pub fee_rate: u64,
    pub input_size: u64,
    pub output_size: u64,
    pub base_size: u64,
    /// Change at or below this is forfeited to fee.
    pub dust_threshold: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self { fee_rate: 5000, input_size: 180, output_size: 34, base_size: 10, dust_threshold: 100_000 }
    }
}

impl FeePolicy {
    pub fn with_fee_rate(mut self, fee_rate: u64) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn with_dust_threshold(mut self, dust_threshold: u64) -> Self {
        self.dust_threshold = dust_threshold;
        self
    }

    /// Fee for `inputs` inputs and two outputs (payment + change).
    pub fn estimate(&self, inputs: usize) -> u64 {
        let size = self.base_size + inputs as u64 * self.input_size + 2 * self.output_size;
        self.fee_rate.saturating_mul(size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Serialized unsigned transaction, hex.
    pub raw_tx: String,
    pub inputs: Vec<Utxo>,
    pub estimated_fee: u64,
    /// Estimated fee plus any forfeited dust.
    pub fee: u64,
    pub amount: u64,
    /// Zero when no change output was emitted.
    pub change: u64,
    pub change_output: bool,
}

impl UnsignedTransaction {
    pub fn input_total(&self) -> u64 {
        self.inputs.iter().fold(0, |total, u| total.saturating_add(u.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub selected: Vec<Utxo>,
    pub total: u64,
    pub fee: u64,
}

pub fn select_utxos(utxos: &[Utxo], amount: u64, policy: &FeePolicy) -> VaultResult<Selection> {
    let mut sorted = utxos.to_vec();
    sorted.sort_by_key(|u| u.value);

    let overflow = || VaultError::validation("amount plus fee overflows");
    let mut selected = Vec::new();
    let mut total: u64 = 0;
    for utxo in sorted {
        if total >= amount.checked_add(policy.estimate(selected.len())).ok_or_else(overflow)? {
            break;
        }
        total = total
            .checked_add(utxo.value)
            .ok_or_else(|| VaultError::validation("utxo values overflow"))?;
        selected.push(utxo);
    }

    let fee = policy.estimate(selected.len());
    let needed = amount.checked_add(fee).ok_or_else(overflow)?;
    if total < needed {
        return Err(VaultError::InsufficientFunds { needed, available: total });
    }
    Ok(Selection { selected, total, fee })
}

pub fn build_unsigned_transaction(
    sender: &str,
    recipient: &str,
    amount: u64,
    utxos: &[Utxo],
    policy: &FeePolicy,
    params: &ChainParams,
) -> VaultResult<UnsignedTransaction> {
    if amount == 0 {
        return Err(VaultError::validation("amount must be greater than zero"));
    }
    let recipient_script = Address::parse(recipient, params)?.script_pubkey();
    let sender_script = Address::parse(sender, params)?.script_pubkey();

    let Selection { selected, total, fee: estimated_fee } = select_utxos(utxos, amount, policy)?;

    let mut input = Vec::with_capacity(selected.len());
    for utxo in &selected {
        let txid = Txid::from_str(&utxo.txid)
            .map_err(|e| VaultError::validation(format!("utxo txid {}: {e}", utxo.txid)))?;
        input.push(TxIn {
            previous_output: OutPoint { txid, vout: utxo.vout },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        });
    }

    let mut output = vec![TxOut { value: Amount::from_sat(amount), script_pubkey: recipient_script }];
    let leftover = total - amount - estimated_fee;
    let change_output = leftover > policy.dust_threshold;
    let (fee, change) = if change_output {
        output.push(TxOut { value: Amount::from_sat(leftover), script_pubkey: sender_script });
        (estimated_fee, leftover)
    } else {
        (estimated_fee + leftover, 0)
    };

    let tx = Transaction { version: Version::ONE, lock_time: LockTime::ZERO, input, output };
    tracing::debug!(inputs = selected.len(), fee, change, "built unsigned transaction");

    Ok(UnsignedTransaction {
        raw_tx: serialize_hex(&tx),
        inputs: selected,
        estimated_fee,
        fee,
        amount,
        change,
        change_output,
    })
}

/// Outpoints (`txid:vout`) consumed by a serialized transaction.
pub fn spent_outpoints(raw_tx: &str) -> VaultResult<Vec<String>> {
    let tx = super::decode_tx(raw_tx)?;
    Ok(tx
        .input
        .iter()
        .map(|i| format!("{}:{}", i.previous_output.txid, i.previous_output.vout))
        .collect())
}
