//! Page-originated requests and the popup answers relayed back to them.
//!
//! ```text
//!  page ──clientRequestX──► open ticket ──► popup ──clientRequestXResponse──► ticket ──► tab
//!  page ──clientRequestBalance/Disconnect/ConnectionStatus/TransactionStatus──► tab
//! ```
//!
//! A tab only ever receives messages typed with its request's response type
//! and scoped to its own origin.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::chain::{confirmations, TRANSACTION_CONFIRMATIONS};
use crate::dispatcher::approvals::ClientRequestState;
use crate::dispatcher::{Request, VaultContext};
use crate::error::{VaultError, VaultResult};
use crate::protocol::{
    parse_data, MessageRequest, MessageType, PaymentRequest, PsbtRequest, TxStatusRequest,
};
use crate::session::ConnectedClient;
use crate::tx::check_sighash;
use crate::ui::{PopupRequest, TabMessage};

const CONNECTION_REJECTED: &str = "User rejected connection request";
const REQUEST_REJECTED: &str = "User rejected request";

/// Page requests answered later by a popup rather than by the handler.
fn awaits_popup(kind: MessageType) -> bool {
    matches!(
        kind,
        MessageType::ClientRequestConnection
            | MessageType::ClientRequestTransaction
            | MessageType::ClientRequestPsbt
            | MessageType::ClientRequestSignedMessage
            | MessageType::ClientRequestDecryptedMessage
    )
}

/// The page request a popup response answers.
fn request_for(response: MessageType) -> Option<MessageType> {
    Some(match response {
        MessageType::ClientRequestConnectionResponse => MessageType::ClientRequestConnection,
        MessageType::ClientRequestTransactionResponse => MessageType::ClientRequestTransaction,
        MessageType::ClientRequestPsbtResponse => MessageType::ClientRequestPsbt,
        MessageType::ClientRequestSignedMessageResponse => MessageType::ClientRequestSignedMessage,
        MessageType::ClientRequestDecryptedMessageResponse => MessageType::ClientRequestDecryptedMessage,
        _ => return None,
    })
}

async fn send_to_tab(ctx: &VaultContext, tab_id: i64, message: TabMessage) {
    let kind = message.kind.clone();
    if let Err(err) = ctx.ui.send_to_tab(tab_id, message).await {
        tracing::warn!(tab_id, %kind, error = %err, "tab message not delivered");
    }
}

/// Answer the sender tab of a page request. Direct capabilities always get
/// their result; popup requests only hear back here when they failed before
/// a popup was shown.
pub async fn reply_to_page(ctx: &VaultContext, req: &Request, result: &VaultResult<Value>) {
    let (Some(kind), Ok((origin, tab_id))) = (req.message.response_type(), req.sender.page_scope()) else {
        return;
    };
    let message = match result {
        Ok(_) if awaits_popup(req.message) => return,
        Ok(data) => TabMessage { kind: kind.as_str(), data: Some(data.clone()), error: None, origin: origin.into() },
        Err(err) => TabMessage { kind: kind.as_str(), data: None, error: Some(err.public_message()), origin: origin.into() },
    };
    send_to_tab(ctx, tab_id, message).await;
}

async fn open_popup(ctx: &VaultContext, req: &Request, data: &Value, onboarding_pending: bool) -> VaultResult<Value> {
    let (origin, tab_id) = req.sender.page_scope()?;
    let id = ctx.approvals.open(origin, tab_id, req.message)?;
    let popup = PopupRequest::for_client_request(&req.message.as_str(), tab_id, origin, data, onboarding_pending);

    let opened = match ctx.ui.open_popup(popup).await {
        Ok(opened) => opened,
        Err(err) => {
            ctx.approvals.discard(id)?;
            return Err(err);
        }
    };
    if !opened {
        ctx.approvals.discard(id)?;
        return Err(VaultError::RejectedByUser("Approval window could not be opened".into()));
    }
    ctx.approvals.advance(id, ClientRequestState::PopupOpened)?;
    ctx.approvals.advance(id, ClientRequestState::AwaitingUserDecision)?;
    tracing::info!(%origin, tab_id, kind = %req.message, ticket = id, "approval requested");
    Ok(json!({ "originTabId": tab_id }))
}

pub async fn request_connection(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let onboarding_pending = !ctx.onboarding_complete()?;
    open_popup(ctx, req, &json!({ "isOnboardingPending": onboarding_pending }), onboarding_pending).await
}

/// Payment, PSBT, signature and decryption requests. The payload is checked
/// first, then the origin must hold a connection; only then is a popup shown.
pub async fn request_approval(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    match req.message {
        MessageType::ClientRequestTransaction => {
            parse_data::<PaymentRequest>(&req.data)?.validate()?;
        }
        MessageType::ClientRequestPsbt => {
            let psbt: PsbtRequest = parse_data(&req.data)?;
            psbt.validate()?;
            if let Some(flag) = psbt.sighash_type {
                check_sighash(flag)?;
            }
        }
        MessageType::ClientRequestSignedMessage | MessageType::ClientRequestDecryptedMessage => {
            parse_data::<MessageRequest>(&req.data)?.validate()?;
        }
        other => return Err(VaultError::validation(format!("{other} does not need approval"))),
    }

    let (origin, _) = req.sender.page_scope()?;
    if ctx.session.client(origin)?.is_none() {
        tracing::warn!(%origin, kind = %req.message, "request from unconnected origin");
        return Err(VaultError::AuthFailure);
    }
    open_popup(ctx, req, &req.data, false).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PopupAnswer {
    origin_tab_id: i64,
    origin: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl PopupAnswer {
    fn text(&self, key: &str) -> Option<&str> {
        self.rest.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// Relay the popup's decision to the tab that asked. Returns `true` when the
/// request was approved and delivered, `false` when it was rejected.
pub async fn relay_answer(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let request_kind = request_for(req.message)
        .ok_or_else(|| VaultError::validation(format!("{} is not a popup answer", req.message)))?;
    let answer: PopupAnswer = parse_data(&req.data)?;
    let ticket = ctx
        .approvals
        .awaiting(&answer.origin, answer.origin_tab_id, request_kind)?
        .ok_or_else(|| VaultError::validation("no pending approval for this origin and tab"))?;

    let outcome = match approved_payload(ctx, request_kind, &answer).await {
        Ok(outcome) => outcome,
        Err(err) => {
            ctx.approvals.advance(ticket.id, ClientRequestState::Rejected)?;
            let message = TabMessage {
                kind: req.message.as_str(),
                data: None,
                error: Some(err.public_message()),
                origin: answer.origin.clone(),
            };
            send_to_tab(ctx, answer.origin_tab_id, message).await;
            return Err(err);
        }
    };

    match outcome {
        Some(data) => {
            ctx.approvals.advance(ticket.id, ClientRequestState::Approved)?;
            let message = TabMessage { kind: req.message.as_str(), data: Some(data), error: None, origin: answer.origin.clone() };
            send_to_tab(ctx, answer.origin_tab_id, message).await;
            ctx.approvals.advance(ticket.id, ClientRequestState::Executed)?;
            tracing::info!(origin = %answer.origin, kind = %request_kind, "request approved");
            Ok(Value::Bool(true))
        }
        None => {
            ctx.approvals.advance(ticket.id, ClientRequestState::Rejected)?;
            let fallback = match request_kind {
                MessageType::ClientRequestConnection => CONNECTION_REJECTED,
                _ => REQUEST_REJECTED,
            };
            let error = answer.error.clone().filter(|e| !e.is_empty()).unwrap_or_else(|| fallback.into());
            let message = TabMessage { kind: req.message.as_str(), data: None, error: Some(error), origin: answer.origin.clone() };
            send_to_tab(ctx, answer.origin_tab_id, message).await;
            tracing::info!(origin = %answer.origin, kind = %request_kind, "request rejected");
            Ok(Value::Bool(false))
        }
    }
}

/// Tab payload for an approved answer, `None` for a rejection.
async fn approved_payload(ctx: &VaultContext, kind: MessageType, answer: &PopupAnswer) -> VaultResult<Option<Value>> {
    Ok(match kind {
        MessageType::ClientRequestConnection => {
            if answer.rest.get("approved") != Some(&Value::Bool(true)) {
                return Ok(None);
            }
            let data = Value::Object(answer.rest.clone());
            let (wallet, _password) = ctx.unlock_wallet()?;
            let key = ctx.selected_key(&wallet, &data)?;
            let address = key.address(&ctx.params);
            ctx.session.connect_client(ConnectedClient {
                origin: answer.origin.clone(),
                address: address.clone(),
                origin_tab_id: answer.origin_tab_id,
            })?;
            Some(json!({
                "approved": true,
                "publicKey": key.public_hex(),
                "address": address,
                "balance": answer.rest.get("balance").cloned().unwrap_or(Value::Null),
            }))
        }
        MessageType::ClientRequestTransaction => {
            answer.text("txId").map(|tx_id| json!({ "txId": tx_id }))
        }
        MessageType::ClientRequestPsbt => {
            let mut data = Map::new();
            if let Some(raw) = answer.text("signedRawTx") {
                data.insert("signedRawTx".into(), raw.into());
            }
            if let Some(tx_id) = answer.text("txId") {
                data.insert("txId".into(), tx_id.into());
            }
            (!data.is_empty()).then_some(Value::Object(data))
        }
        MessageType::ClientRequestSignedMessage => answer
            .text("signedMessage")
            .map(|signed| json!({ "signedMessage": signed })),
        MessageType::ClientRequestDecryptedMessage => answer
            .text("decryptedMessage")
            .map(|decrypted| json!({ "decryptedMessage": decrypted })),
        _ => None,
    })
}

fn connected(ctx: &VaultContext, req: &Request) -> VaultResult<ConnectedClient> {
    let (origin, _) = req.sender.page_scope()?;
    ctx.session.client(origin)?.ok_or(VaultError::AuthFailure)
}

pub async fn balance(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let client = connected(ctx, req)?;
    let balance = ctx.indexer.balance(&client.address).await?;
    Ok(json!({ "address": client.address, "balance": balance }))
}

#[derive(Deserialize, Default)]
struct DisconnectData {
    #[serde(default)]
    origin: Option<String>,
}

/// Pages disconnect themselves; the extension UI names the origin.
pub async fn disconnect(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let origin = if req.sender.is_page() {
        req.sender.page_scope()?.0.to_string()
    } else {
        let data: DisconnectData = if req.data.is_null() { DisconnectData::default() } else { parse_data(&req.data)? };
        data.origin.ok_or_else(|| VaultError::validation("origin is required"))?
    };
    let removed = ctx.session.disconnect_client(&origin)?;
    tracing::info!(%origin, removed, "client disconnected");
    Ok(Value::Bool(true))
}

pub async fn connection_status(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let (origin, _) = req.sender.page_scope()?;
    let client = ctx.session.client(origin)?;
    let selected = match ctx.session.wallet()? {
        Some(view) => view.addresses.get(ctx.selected_index(&Value::Null)?).cloned(),
        None => None,
    };
    Ok(json!({
        "connected": client.is_some(),
        "address": client.map(|c| c.address),
        "selectedWalletAddress": selected,
    }))
}

pub async fn transaction_status(ctx: &VaultContext, req: &Request) -> VaultResult<Value> {
    let data: TxStatusRequest = parse_data(&req.data)?;
    data.validate()?;
    connected(ctx, req)?;
    let tx = ctx.indexer.transaction(&data.tx_id).await?;
    let confirmations = confirmations(&tx);
    Ok(json!({
        "txId": data.tx_id,
        "confirmations": confirmations,
        "confirmed": confirmations >= TRANSACTION_CONFIRMATIONS,
    }))
}
