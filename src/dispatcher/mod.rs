//! Background Dispatcher - the privileged message router.
//!
//! ```text
//!   extension UI ─┐                         ┌─► keys / tx / cipher
//!                 ├─► Request ─► route ─────┼─► session registry
//!   content script┘   {message,data,sender} ├─► indexer
//!                                           └─► ExtensionUi (popups, tabs)
//!                        │
//!                        ▼
//!                    Response  (exactly one per request)
//! ```
//!
//! Only the nine `clientRequest*` / `client*` page capabilities are accepted
//! from a page sender. Everything else, including popup answers, must come
//! from the extension itself.

mod approvals;
mod context;
mod handlers;
mod message;

pub use approvals::{Approvals, ClientRequestState, Ticket};
pub use context::VaultContext;
pub use message::{Request, Response, Sender};

use std::sync::Arc;

use serde_json::Value;

use crate::error::{VaultError, VaultResult};
use crate::protocol::MessageType;
use handlers::{chain, client, wallet};

#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<VaultContext>,
}

impl Dispatcher {
    pub fn new(ctx: VaultContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &VaultContext { &self.ctx }

    /// Handle one request. Errors become `Response::Err` here and nowhere else.
    pub async fn dispatch(&self, req: Request) -> Response {
        tracing::debug!(message = %req.message, origin = ?req.sender.origin, "dispatch");
        let result = self.route(&req).await;
        if let Err(err) = &result {
            tracing::warn!(message = %req.message, error = %err, "request failed");
        }
        if req.sender.is_page() && req.message.is_page_request() {
            client::reply_to_page(&self.ctx, &req, &result).await;
        }
        result.into()
    }

    /// Parse and handle a raw `{message, data, sender}` envelope.
    pub async fn dispatch_value(&self, envelope: Value) -> Response {
        match Request::from_value(envelope) {
            Ok(req) => self.dispatch(req).await,
            Err(err) => Err(err).into(),
        }
    }

    async fn route(&self, req: &Request) -> VaultResult<Value> {
        let ctx = self.ctx.as_ref();
        if req.sender.is_page() && !req.message.is_page_request() {
            return Err(VaultError::validation(format!("{} is not available to pages", req.message)));
        }

        match req.message {
            MessageType::CreateWallet | MessageType::ResetWallet => wallet::create_wallet(ctx, req).await,
            MessageType::Authenticate => wallet::authenticate(ctx, req).await,
            MessageType::IsOnboardingComplete => wallet::is_onboarding_complete(ctx, req).await,
            MessageType::IsSessionAuthenticated => wallet::is_session_authenticated(ctx, req).await,
            MessageType::SignOut => wallet::sign_out(ctx, req).await,
            MessageType::DeleteWallet => wallet::delete_wallet(ctx, req).await,
            MessageType::GenerateAddress => wallet::generate_address(ctx, req).await,
            MessageType::DeleteAddress => wallet::delete_address(ctx, req).await,
            MessageType::SelectAddress => wallet::select_address(ctx, req).await,
            MessageType::UpdateAddressNickname => wallet::update_address_nickname(ctx, req).await,
            MessageType::GetConnectedClients => wallet::get_connected_clients(ctx, req).await,

            MessageType::GetPepecoinPrice => chain::get_pepecoin_price(ctx, req).await,
            MessageType::GetAddressBalance => chain::get_address_balance(ctx, req).await,
            MessageType::GetTransactions => chain::get_transactions(ctx, req).await,
            MessageType::GetTransactionDetails => chain::get_transaction_details(ctx, req).await,
            MessageType::CreateTransaction => chain::create_transaction(ctx, req).await,
            MessageType::SendTransaction => chain::send_transaction(ctx, req).await,
            MessageType::SignPsbt => chain::sign_psbt(ctx, req).await,
            MessageType::SendPsbt => chain::send_psbt(ctx, req).await,
            MessageType::SignMessage => chain::sign_message(ctx, req).await,
            MessageType::DecryptMessage => chain::decrypt_message(ctx, req).await,
            MessageType::NotifyTransactionSuccess => chain::notify_transaction_success(ctx, req).await,

            MessageType::ClientRequestConnection => client::request_connection(ctx, req).await,
            MessageType::ClientRequestTransaction
            | MessageType::ClientRequestPsbt
            | MessageType::ClientRequestSignedMessage
            | MessageType::ClientRequestDecryptedMessage => client::request_approval(ctx, req).await,
            MessageType::ClientRequestConnectionResponse
            | MessageType::ClientRequestTransactionResponse
            | MessageType::ClientRequestPsbtResponse
            | MessageType::ClientRequestSignedMessageResponse
            | MessageType::ClientRequestDecryptedMessageResponse => client::relay_answer(ctx, req).await,

            MessageType::ClientRequestBalance => client::balance(ctx, req).await,
            MessageType::ClientDisconnect => client::disconnect(ctx, req).await,
            MessageType::ClientConnectionStatus => client::connection_status(ctx, req).await,
            MessageType::ClientTransactionStatus => client::transaction_status(ctx, req).await,

            MessageType::ClientGetBalanceResponse
            | MessageType::ClientDisconnectResponse
            | MessageType::ClientConnectionStatusResponse
            | MessageType::ClientTransactionStatusResponse => Err(VaultError::validation(format!(
                "{} is sent to pages, not handled",
                req.message
            ))),
        }
    }
}
