//! Indexer reads, transaction building, signing and broadcast.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatcher::{Request, VaultContext};
use crate::error::{VaultError, VaultResult};
use crate::indexer::TRANSACTION_PAGE_SIZE;
use crate::protocol::parse_data;
use crate::tx::{
    self, build_unsigned_transaction, check_sighash, format_coin_amount, parse_coin_value,
    PsbtSignOptions,
};
use crate::ui::Notification;

/// Confirmations before a broadcast counts as settled.
pub const TRANSACTION_CONFIRMATIONS: u64 = 1;

pub async fn get_pepecoin_price(ctx: &VaultContext, _req: &Request) -> VaultResult<Value> {
    ctx.indexer.price().await
}

#[derive(Deserialize)]
struct BalanceData {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    addresses: Vec<String>,
}

/// One balance for a single address, an array for a list.
pub async fn get_address_balance(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: BalanceData = parse_data(&req.data)?;
    let addresses = match (data.addresses.is_empty(), data.address) {
        (false, _) => data.addresses,
        (true, Some(address)) => vec![address],
        (true, None) => return Err(VaultError::validation("address is required")),
    };

    let mut balances = Vec::with_capacity(addresses.len());
    for address in &addresses {
        balances.push(ctx.indexer.balance(address).await?);
    }
    if balances.len() == 1 {
        return Ok(balances.swap_remove(0));
    }
    Ok(Value::Array(balances))
}

#[derive(Deserialize)]
struct TransactionsData {
    address: String,
    #[serde(default)]
    page: Option<u32>,
}

pub async fn get_transactions(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: TransactionsData = parse_data(&req.data)?;
    let page = ctx
        .indexer
        .address_txids(&data.address, data.page.unwrap_or(1).max(1), TRANSACTION_PAGE_SIZE)
        .await?;

    let mut transactions = Vec::with_capacity(page.txids.len());
    for txid in &page.txids {
        transactions.push(ctx.indexer.transaction(txid).await?);
    }
    transactions.sort_by_key(|tx| std::cmp::Reverse(block_time(tx)));

    Ok(json!({
        "transactions": transactions,
        "totalPages": page.total_pages,
        "page": page.page,
    }))
}

fn block_time(tx: &Value) -> u64 {
    tx.get("blockTime").and_then(Value::as_u64).unwrap_or(0)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxIdData {
    tx_id: String,
}

pub async fn get_transaction_details(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: TxIdData = parse_data(&req.data)?;
    ctx.indexer.transaction(&data.tx_id).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionData {
    sender_address: String,
    recipient_address: String,
    pepe_amount: Value,
}

pub async fn create_transaction(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: CreateTransactionData = parse_data(&req.data)?;
    let amount = parse_coin_value(&data.pepe_amount)?;

    let spent = ctx.session.spent_outpoints()?;
    let utxos: Vec<_> = ctx
        .indexer
        .utxos(&data.sender_address)
        .await?
        .into_iter()
        .filter(|u| !spent.contains(&u.outpoint_key()))
        .collect();

    let unsigned = build_unsigned_transaction(
        &data.sender_address,
        &data.recipient_address,
        amount,
        &utxos,
        &ctx.fees,
        &ctx.params,
    )?;
    let amount_mismatch = unsigned.amount < amount.saturating_sub(unsigned.fee);

    Ok(json!({
        "rawTx": unsigned.raw_tx,
        "fee": format_coin_amount(unsigned.fee),
        "amount": format_coin_amount(unsigned.amount),
        "change": format_coin_amount(unsigned.change),
        "amountMismatch": amount_mismatch,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTxData {
    raw_tx: String,
}

pub async fn send_transaction(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: RawTxData = parse_data(&req.data)?;
    let (wallet, _password) = ctx.unlock_wallet()?;
    let key = ctx.selected_key(&wallet, &req.data)?;
    let signed = tx::sign_raw_tx(&data.raw_tx, &key)?;
    broadcast(ctx, &signed).await
}

/// Broadcast a signed transaction and hide its inputs from later selections.
async fn broadcast(ctx: &VaultContext, signed: &str) -> VaultResult<Value> {
    let outpoints = tx::spent_outpoints(signed)?;
    let txid = ctx.indexer.broadcast(signed).await?;
    ctx.session.record_spent(outpoints)?;
    tracing::info!(%txid, "transaction broadcast");
    Ok(Value::String(txid))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignPsbtData {
    raw_tx: String,
    indexes: Vec<usize>,
    #[serde(default)]
    fee_only: bool,
    #[serde(default)]
    partial: bool,
    #[serde(default)]
    sighash_type: Option<u32>,
}

pub async fn sign_psbt(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: SignPsbtData = parse_data(&req.data)?;
    if let Some(flag) = data.sighash_type {
        check_sighash(flag)?;
    }
    let (wallet, _password) = ctx.unlock_wallet()?;
    let key = ctx.selected_key(&wallet, &req.data)?;
    let opts = PsbtSignOptions {
        indexes: data.indexes,
        finalize: !data.fee_only,
        partial: data.partial,
        sighash_type: data.sighash_type,
    };
    let signed = tx::sign_raw_psbt(&data.raw_tx, &key, &opts)?;
    Ok(serde_json::to_value(signed)?)
}

pub async fn send_psbt(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: RawTxData = parse_data(&req.data)?;
    broadcast(ctx, data.raw_tx.trim()).await
}

#[derive(Deserialize)]
struct MessageData {
    message: String,
}

pub async fn sign_message(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: MessageData = parse_data(&req.data)?;
    let (wallet, _password) = ctx.unlock_wallet()?;
    let key = ctx.selected_key(&wallet, &req.data)?;
    Ok(Value::String(tx::sign_message(&data.message, &key, &ctx.params)))
}

pub async fn decrypt_message(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: MessageData = parse_data(&req.data)?;
    let (wallet, _password) = ctx.unlock_wallet()?;
    let key = ctx.selected_key(&wallet, &req.data)?;
    Ok(Value::String(tx::decrypt_data(&key, &data.message)?))
}

/// Emit a confirmed/unconfirmed notification for a broadcast transaction.
/// Returns whether a notification was shown; a known but still unconfirmed
/// transaction shows nothing.
pub async fn notify_transaction_success(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: TxIdData = parse_data(&req.data)?;
    let transaction = match ctx.indexer.transaction(&data.tx_id).await {
        Ok(tx) if !tx.is_null() => Some(tx),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(txid = %data.tx_id, error = %err, "transaction lookup failed");
            None
        }
    };

    let notification = match transaction {
        None => Notification {
            id: None,
            title: "Transaction Unconfirmed".into(),
            message: format!("Transaction details could not be retrieved for `{}`.", data.tx_id),
        },
        Some(tx) if confirmations(&tx) >= TRANSACTION_CONFIRMATIONS => {
            let (sats, address) = first_output(&tx);
            Notification {
                id: Some(data.tx_id.clone()),
                title: "Transaction Confirmed".into(),
                message: format!("{} PEPE sent to {}.", format_coin_amount(sats), address),
            }
        }
        Some(_) => return Ok(Value::Bool(false)),
    };
    ctx.ui.notify(notification).await?;
    Ok(Value::Bool(true))
}

pub(crate) fn confirmations(tx: &Value) -> u64 {
    tx.get("confirmations").and_then(Value::as_u64).unwrap_or(0)
}

fn first_output(tx: &Value) -> (u64, String) {
    let vout = tx.get("vout").and_then(|v| v.get(0));
    let sats = vout
        .and_then(|o| o.get("value"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(0);
    let address = vout
        .and_then(|o| o.get("addresses"))
        .and_then(|a| a.get(0))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    (sats, address)
}
