//! Dispatcher Tests - wallet lifecycle, page approvals, chain operations
//!
//! These tests verify:
//! 1. Onboarding, authentication and sign-out move the session as expected
//! 2. Address book edits keep the selected index consistent
//! 3. Page requests need a connection and a popup decision
//! 4. Rejections reach the tab and leave the registry untouched
//! 5. Pages cannot send privileged messages or forge popup answers
//! 6. Broadcast inputs are excluded from later selections
//!
//! The indexer and extension UI are in-memory fakes that record every call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pepevault::cipher::{Cipher, KdfParams};
use pepevault::keys::{self, ChainParams};
use pepevault::storage::keys as store_keys;
use pepevault::{
    ChainIndexer, Dispatcher, EncryptedBlob, ErrorKind, ExtensionUi, FeePolicy, KeyValueStore, MemoryStore,
    MessageType, Notification, PopupRequest, Request, Response, TabMessage, TxidPage, Utxo, VaultContext,
    VaultError, VaultResult, Wallet,
};
use serde_json::{json, Value};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const PASSWORD: &str = "ribbit-ribbit";
const DAPP: &str = "https://dapp.example";
const DAPP_TAB: i64 = 7;

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct FakeIndexer {
    utxos: Mutex<Vec<Utxo>>,
    transactions: Mutex<HashMap<String, Value>>,
    broadcasts: Mutex<Vec<String>>,
}

impl FakeIndexer {
    fn add_transaction(&self, txid: &str, tx: Value) {
        self.transactions.lock().unwrap().insert(txid.to_string(), tx);
    }
}

#[async_trait]
impl ChainIndexer for FakeIndexer {
    async fn utxos(&self, _address: &str) -> VaultResult<Vec<Utxo>> {
        Ok(self.utxos.lock().unwrap().clone())
    }

    async fn balance(&self, address: &str) -> VaultResult<Value> {
        Ok(json!({ "address": address, "balance": "250000000" }))
    }

    async fn address_txids(&self, _address: &str, page: u32, _page_size: u32) -> VaultResult<TxidPage> {
        let mut txids: Vec<String> = self.transactions.lock().unwrap().keys().cloned().collect();
        txids.sort();
        Ok(TxidPage { txids, page: Some(page), total_pages: Some(1) })
    }

    async fn transaction(&self, txid: &str) -> VaultResult<Value> {
        self.transactions
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| VaultError::Network(format!("{txid} not found")))
    }

    async fn broadcast(&self, raw_tx: &str) -> VaultResult<String> {
        self.broadcasts.lock().unwrap().push(raw_tx.to_string());
        Ok("ab".repeat(32))
    }

    async fn price(&self) -> VaultResult<Value> {
        Ok(json!({ "rates": { "usd": 0.0004 } }))
    }
}

struct RecordingUi {
    popups_open: bool,
    popups: Mutex<Vec<PopupRequest>>,
    tabs: Mutex<Vec<(i64, TabMessage)>>,
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingUi {
    fn new(popups_open: bool) -> Self {
        Self {
            popups_open,
            popups: Mutex::new(Vec::new()),
            tabs: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    fn tab_messages(&self) -> Vec<(i64, TabMessage)> {
        self.tabs.lock().unwrap().clone()
    }

    fn last_tab_message(&self) -> TabMessage {
        self.tabs.lock().unwrap().last().expect("a tab message").1.clone()
    }
}

#[async_trait]
impl ExtensionUi for RecordingUi {
    async fn open_popup(&self, request: PopupRequest) -> VaultResult<bool> {
        self.popups.lock().unwrap().push(request);
        Ok(self.popups_open)
    }

    async fn send_to_tab(&self, tab_id: i64, message: TabMessage) -> VaultResult<()> {
        self.tabs.lock().unwrap().push((tab_id, message));
        Ok(())
    }

    async fn notify(&self, notification: Notification) -> VaultResult<()> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    dispatcher: Dispatcher,
    local: Arc<MemoryStore>,
    indexer: Arc<FakeIndexer>,
    ui: Arc<RecordingUi>,
}

fn harness_with(popups_open: bool) -> Harness {
    let indexer = Arc::new(FakeIndexer::default());
    let ui = Arc::new(RecordingUi::new(popups_open));
    let local = Arc::new(MemoryStore::new());
    let ctx = VaultContext::new(
        local.clone(),
        Arc::new(MemoryStore::new()),
        indexer.clone(),
        ui.clone(),
    )
    .with_fees(FeePolicy::default().with_fee_rate(1))
    .with_cipher(cipher());
    Harness { dispatcher: Dispatcher::new(ctx), local, indexer, ui }
}

fn cipher() -> Cipher {
    Cipher::new(KdfParams::light())
}

fn harness() -> Harness {
    harness_with(true)
}

fn address(index: u32) -> String {
    let params = ChainParams::pepecoin();
    let root = keys::generate_root(TEST_MNEMONIC).expect("root");
    keys::generate_child(&root, index, &params).expect("child").address(&params)
}

impl Harness {
    async fn send(&self, message: MessageType, data: Value) -> Response {
        self.dispatcher.dispatch(Request::new(message, data)).await
    }

    async fn ok(&self, message: MessageType, data: Value) -> Value {
        match self.send(message, data).await {
            Response::Ok { data } => data,
            Response::Err { kind, message: text } => panic!("{message} failed: {kind:?} {text}"),
        }
    }

    async fn from_page(&self, message: MessageType, data: Value) -> Response {
        self.dispatcher.dispatch(Request::from_page(message, data, DAPP, DAPP_TAB)).await
    }

    async fn onboard(&self) -> Value {
        self.ok(MessageType::CreateWallet, json!({ "password": PASSWORD, "seedPhrase": TEST_MNEMONIC }))
            .await
    }

    /// Walk a connection request through an approving popup.
    async fn connect_dapp(&self) {
        assert!(self.from_page(MessageType::ClientRequestConnection, json!({})).await.is_ok());
        let answer = json!({ "originTabId": DAPP_TAB, "origin": DAPP, "approved": true, "balance": "2.5" });
        assert_eq!(self.ok(MessageType::ClientRequestConnectionResponse, answer).await, json!(true));
    }
}

// =============================================================================
// Wallet lifecycle
// =============================================================================

#[tokio::test]
async fn onboarding_then_authentication() {
    let h = harness();
    assert_eq!(h.ok(MessageType::IsOnboardingComplete, Value::Null).await, json!(false));

    let created = h.onboard().await;
    assert_eq!(created["authenticated"], json!(true));
    assert_eq!(created["wallet"]["addresses"], json!([address(0)]));
    assert!(created["wallet"].get("phrase").is_none());
    assert_eq!(h.ok(MessageType::IsOnboardingComplete, Value::Null).await, json!(true));

    assert_eq!(h.ok(MessageType::SignOut, Value::Null).await, json!(true));
    let status = h.ok(MessageType::IsSessionAuthenticated, Value::Null).await;
    assert_eq!(status["authenticated"], json!(false));
    assert!(status["wallet"].is_null());

    let denied = h.ok(MessageType::Authenticate, json!({ "password": "wrong" })).await;
    assert_eq!(denied, json!({ "authenticated": false, "wallet": null }));

    let granted = h
        .ok(MessageType::Authenticate, json!({ "password": PASSWORD, "_dangerouslyReturnSecretPhrase": true }))
        .await;
    assert_eq!(granted["authenticated"], json!(true));
    assert_eq!(granted["wallet"]["phrase"], json!(TEST_MNEMONIC));

    let status = h.ok(MessageType::IsSessionAuthenticated, Value::Null).await;
    assert_eq!(status["authenticated"], json!(true));
    assert_eq!(status["selectedAddressIndex"], json!(0));
}

#[tokio::test]
async fn authenticate_migrates_legacy_keys_once() {
    let h = harness();
    let legacy = ChainParams::bitcoin_legacy();
    let mut wallet = Wallet::create(Some(TEST_MNEMONIC), &legacy).expect("legacy wallet");
    wallet.generate_address(None, &legacy).expect("gen");
    let cipher = cipher();
    h.local
        .set_many(vec![
            (store_keys::PASSWORD.into(), json!(cipher.seal_password(PASSWORD).expect("seal"))),
            (store_keys::WALLET.into(), json!(cipher.encrypt(&wallet, PASSWORD).expect("encrypt"))),
            (store_keys::ONBOARDING_COMPLETE.into(), json!(true)),
        ])
        .expect("seed store");

    let stored_wallet = || -> Value { h.local.get(store_keys::WALLET).expect("get").expect("present") };
    let open = |value: Value| -> Wallet {
        let blob: EncryptedBlob = serde_json::from_value(value).expect("blob");
        cipher.decrypt(&blob, PASSWORD).expect("decrypt")
    };
    let legacy_blob = stored_wallet();

    let first = h.ok(MessageType::Authenticate, json!({ "password": PASSWORD })).await;
    assert_eq!(first["authenticated"], json!(true));
    assert_eq!(first["wallet"]["addresses"], json!([address(0), address(1)]));

    let params = ChainParams::pepecoin();
    let migrated_blob = stored_wallet();
    assert_ne!(migrated_blob, legacy_blob);
    let migrated = open(migrated_blob.clone());
    assert!(!migrated.needs_migration(&params));
    assert!(migrated.children.iter().all(|wif| keys::from_wif(wif, &params).is_ok()));
    assert_eq!(migrated.addresses, vec![address(0), address(1)]);

    assert_eq!(h.ok(MessageType::SignOut, Value::Null).await, json!(true));
    let second = h.ok(MessageType::Authenticate, json!({ "password": PASSWORD })).await;
    assert_eq!(second["wallet"], first["wallet"]);
    // Already current: the stored ciphertext is not rewritten.
    assert_eq!(stored_wallet(), migrated_blob);
}

#[tokio::test]
async fn create_wallet_requires_password_and_valid_phrase() {
    let h = harness();
    let missing = h.send(MessageType::CreateWallet, json!({ "seedPhrase": TEST_MNEMONIC })).await;
    assert_eq!(missing.error_kind(), Some(ErrorKind::Validation));

    let garbled = h
        .send(MessageType::CreateWallet, json!({ "password": PASSWORD, "seedPhrase": "frog frog frog" }))
        .await;
    assert!(!garbled.is_ok());
    assert_eq!(h.ok(MessageType::IsOnboardingComplete, Value::Null).await, json!(false));
}

#[tokio::test]
async fn address_book_keeps_selection_consistent() {
    let h = harness();
    h.onboard().await;

    let generated = h.ok(MessageType::GenerateAddress, json!({ "nickname": "savings" })).await;
    assert_eq!(generated["wallet"]["addresses"], json!([address(0), address(1)]));
    assert_eq!(generated["wallet"]["nicknames"][address(1)], json!("savings"));

    let renamed = h
        .ok(MessageType::UpdateAddressNickname, json!({ "address": address(0), "nickname": "main" }))
        .await;
    assert_eq!(renamed["wallet"]["nicknames"][address(0)], json!("main"));

    assert_eq!(
        h.ok(MessageType::SelectAddress, json!({ "index": 1 })).await,
        json!({ "selectedAddressIndex": 1 })
    );
    let out_of_range = h.send(MessageType::SelectAddress, json!({ "index": 4 })).await;
    assert_eq!(out_of_range.error_kind(), Some(ErrorKind::Validation));

    let deleted = h.ok(MessageType::DeleteAddress, json!({ "index": 1 })).await;
    assert_eq!(deleted["wallet"]["addresses"], json!([address(0)]));
    let status = h.ok(MessageType::IsSessionAuthenticated, Value::Null).await;
    assert_eq!(status["selectedAddressIndex"], json!(0));
    assert_eq!(status["wallet"]["addresses"], json!([address(0)]));

    let first = h.send(MessageType::DeleteAddress, json!({ "index": 0 })).await;
    assert_eq!(first.error_kind(), Some(ErrorKind::Validation));

    // Next index follows the highest live one.
    let regenerated = h.ok(MessageType::GenerateAddress, Value::Null).await;
    assert_eq!(regenerated["wallet"]["addresses"], json!([address(0), address(1)]));
    assert_eq!(regenerated["wallet"]["nicknames"][address(1)], json!("Address 2"));
}

#[tokio::test]
async fn wallet_mutations_need_a_session() {
    let h = harness();
    h.onboard().await;
    h.ok(MessageType::SignOut, Value::Null).await;

    let res = h.send(MessageType::GenerateAddress, Value::Null).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::AuthFailure));
    let res = h.send(MessageType::SignMessage, json!({ "message": "hi" })).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::AuthFailure));
}

#[tokio::test]
async fn delete_wallet_resets_onboarding() {
    let h = harness();
    h.onboard().await;
    assert_eq!(h.ok(MessageType::DeleteWallet, Value::Null).await, json!(true));
    assert_eq!(h.ok(MessageType::IsOnboardingComplete, Value::Null).await, json!(false));
    let denied = h.ok(MessageType::Authenticate, json!({ "password": PASSWORD })).await;
    assert_eq!(denied["authenticated"], json!(false));
}

// =============================================================================
// Page requests
// =============================================================================

#[tokio::test]
async fn rejected_connection_reaches_tab_only() {
    let h = harness();
    h.onboard().await;

    let opened = h.from_page(MessageType::ClientRequestConnection, json!({})).await;
    assert_eq!(opened.data(), Some(&json!({ "originTabId": DAPP_TAB })));
    {
        let popups = h.ui.popups.lock().unwrap();
        assert_eq!(popups.len(), 1);
        assert!(popups[0].url.ends_with("#clientRequestConnection"));
        assert!(popups[0].url.contains("isOnboardingPending=false"));
        assert_eq!(popups[0].width, pepevault::ui::POPUP_WIDTH);
    }
    assert!(h.ui.tab_messages().is_empty());
    assert_eq!(h.dispatcher.context().approvals().pending().unwrap().len(), 1);

    let answer = json!({ "originTabId": DAPP_TAB, "origin": DAPP, "approved": false });
    assert_eq!(h.ok(MessageType::ClientRequestConnectionResponse, answer).await, json!(false));

    let tabs = h.ui.tab_messages();
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].0, DAPP_TAB);
    assert_eq!(tabs[0].1.kind, "clientRequestConnectionResponse");
    assert_eq!(tabs[0].1.origin, DAPP);
    assert_eq!(tabs[0].1.error.as_deref(), Some("User rejected connection request"));
    assert!(tabs[0].1.data.is_none());

    assert_eq!(h.ok(MessageType::GetConnectedClients, Value::Null).await, json!({}));
    assert!(h.dispatcher.context().approvals().pending().unwrap().is_empty());
}

#[tokio::test]
async fn approved_connection_registers_client() {
    let h = harness();
    h.onboard().await;
    h.connect_dapp().await;

    let reply = h.ui.last_tab_message();
    assert_eq!(reply.kind, "clientRequestConnectionResponse");
    let data = reply.data.expect("approval data");
    assert_eq!(data["approved"], json!(true));
    assert_eq!(data["address"], json!(address(0)));
    assert_eq!(data["balance"], json!("2.5"));
    assert_eq!(data["publicKey"].as_str().map(str::len), Some(66));

    let clients = h.ok(MessageType::GetConnectedClients, Value::Null).await;
    assert_eq!(clients[DAPP]["address"], json!(address(0)));
    assert_eq!(clients[DAPP]["originTabId"], json!(DAPP_TAB));

    // The ticket is spent; a replayed answer has nothing to attach to.
    let replay = json!({ "originTabId": DAPP_TAB, "origin": DAPP, "approved": true });
    let res = h.send(MessageType::ClientRequestConnectionResponse, replay).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::Validation));
}

#[tokio::test]
async fn direct_capabilities_answer_the_tab() {
    let h = harness();
    h.onboard().await;

    let status = h.from_page(MessageType::ClientConnectionStatus, Value::Null).await;
    assert_eq!(status.data().map(|d| d["connected"].clone()), Some(json!(false)));
    let reply = h.ui.last_tab_message();
    assert_eq!(reply.kind, "clientConnectionStatusResponse");
    assert_eq!(reply.data.expect("status")["selectedWalletAddress"], json!(address(0)));

    let balance = h.from_page(MessageType::ClientRequestBalance, Value::Null).await;
    assert_eq!(balance.error_kind(), Some(ErrorKind::AuthFailure));
    let reply = h.ui.last_tab_message();
    assert_eq!(reply.kind, "clientGetBalanceResponse");
    assert_eq!(reply.error.as_deref(), Some("Authentication failed"));

    h.connect_dapp().await;
    assert!(h.from_page(MessageType::ClientRequestBalance, Value::Null).await.is_ok());
    let reply = h.ui.last_tab_message();
    assert_eq!(reply.data.expect("balance")["address"], json!(address(0)));

    let txid = "f00d".repeat(16);
    h.indexer.add_transaction(&txid, json!({ "txid": txid, "confirmations": 3 }));
    assert!(h.from_page(MessageType::ClientTransactionStatus, json!({ "txId": txid })).await.is_ok());
    let reply = h.ui.last_tab_message();
    assert_eq!(reply.kind, "clientTransactionStatusResponse");
    assert_eq!(reply.data, Some(json!({ "txId": txid, "confirmations": 3, "confirmed": true })));

    // A txid is never spliced into an indexer path unless it is plain hex.
    let steered = h.from_page(MessageType::ClientTransactionStatus, json!({ "txId": "../wallet/rpc" })).await;
    assert_eq!(steered.error_kind(), Some(ErrorKind::Validation));
    assert_eq!(h.ui.last_tab_message().kind, "clientTransactionStatusResponse");

    assert!(h.from_page(MessageType::ClientDisconnect, Value::Null).await.is_ok());
    assert_eq!(h.ui.last_tab_message().kind, "clientDisconnectResponse");
    assert_eq!(h.ok(MessageType::GetConnectedClients, Value::Null).await, json!({}));
}

#[tokio::test]
async fn unconnected_origin_never_gets_a_popup() {
    let h = harness();
    h.onboard().await;

    let payment = json!({ "recipientAddress": address(1), "pepeAmount": "1.5" });
    let res = h.from_page(MessageType::ClientRequestTransaction, payment).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::AuthFailure));
    assert!(h.ui.popups.lock().unwrap().is_empty());

    let reply = h.ui.last_tab_message();
    assert_eq!(reply.kind, "clientRequestTransactionResponse");
    assert_eq!(reply.origin, DAPP);
    assert!(reply.error.is_some());

    let zero = json!({ "recipientAddress": address(1), "pepeAmount": 0 });
    let res = h.from_page(MessageType::ClientRequestTransaction, zero).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::Validation));

    let psbt = json!({ "rawTx": "cHNidP8=", "indexes": [0], "sighashType": 2 });
    let res = h.from_page(MessageType::ClientRequestPsbt, psbt).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::PolicyViolation));
}

#[tokio::test]
async fn approved_payment_relays_txid() {
    let h = harness();
    h.onboard().await;
    h.connect_dapp().await;

    let payment = json!({ "recipientAddress": address(1), "pepeAmount": "1.5" });
    assert!(h.from_page(MessageType::ClientRequestTransaction, payment).await.is_ok());
    {
        let popups = h.ui.popups.lock().unwrap();
        let popup = popups.last().expect("payment popup");
        assert!(popup.url.ends_with("#clientRequestTransaction"));
        assert!(popup.url.contains("pepeAmount=%221.5%22"));
    }

    let answer = json!({ "originTabId": DAPP_TAB, "origin": DAPP, "txId": "beef" });
    assert_eq!(h.ok(MessageType::ClientRequestTransactionResponse, answer).await, json!(true));
    let reply = h.ui.last_tab_message();
    assert_eq!(reply.kind, "clientRequestTransactionResponse");
    assert_eq!(reply.data, Some(json!({ "txId": "beef" })));
}

#[tokio::test]
async fn pages_cannot_send_privileged_messages() {
    let h = harness();
    h.onboard().await;
    h.from_page(MessageType::ClientRequestConnection, json!({})).await;

    let forged = json!({ "originTabId": DAPP_TAB, "origin": DAPP, "approved": true });
    let res = h.from_page(MessageType::ClientRequestConnectionResponse, forged).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::Validation));

    let res = h.from_page(MessageType::SignMessage, json!({ "message": "gm" })).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::Validation));
    let res = h.from_page(MessageType::Authenticate, json!({ "password": PASSWORD })).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::Validation));

    assert!(h.ui.tab_messages().is_empty());
    assert_eq!(h.ok(MessageType::GetConnectedClients, Value::Null).await, json!({}));
}

#[tokio::test]
async fn popup_that_fails_to_open_rejects() {
    let h = harness_with(false);
    h.onboard().await;

    let res = h.from_page(MessageType::ClientRequestConnection, json!({})).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::RejectedByUser));
    assert!(h.dispatcher.context().approvals().pending().unwrap().is_empty());
    let reply = h.ui.last_tab_message();
    assert_eq!(reply.kind, "clientRequestConnectionResponse");
    assert!(reply.error.is_some());
}

#[tokio::test]
async fn onboarding_popup_is_wide() {
    let h = harness();
    assert!(h.from_page(MessageType::ClientRequestConnection, json!({})).await.is_ok());
    let popups = h.ui.popups.lock().unwrap();
    assert_eq!(popups[0].width, pepevault::ui::ONBOARDING_POPUP_WIDTH);
    assert!(popups[0].url.contains("isOnboardingPending=true"));
}

// =============================================================================
// Chain operations
// =============================================================================

#[tokio::test]
async fn broadcast_inputs_are_not_selected_again() {
    let h = harness();
    h.onboard().await;
    *h.indexer.utxos.lock().unwrap() = vec![Utxo { txid: "11".repeat(32), vout: 1, value: 500_000_000 }];

    let request = json!({ "senderAddress": address(0), "recipientAddress": address(1), "pepeAmount": "1" });
    let built = h.ok(MessageType::CreateTransaction, request.clone()).await;
    assert_eq!(built["amount"], json!("1"));
    assert_eq!(built["fee"], json!("0.00000258"));
    assert_eq!(built["change"], json!("3.99999742"));
    assert_eq!(built["amountMismatch"], json!(false));

    let txid = h.ok(MessageType::SendTransaction, json!({ "rawTx": built["rawTx"] })).await;
    assert_eq!(txid, json!("ab".repeat(32)));
    assert_eq!(h.indexer.broadcasts.lock().unwrap().len(), 1);

    let again = h.send(MessageType::CreateTransaction, request).await;
    assert_eq!(again.error_kind(), Some(ErrorKind::InsufficientFunds));
}

#[tokio::test]
async fn transactions_are_newest_first() {
    let h = harness();
    h.onboard().await;
    h.indexer.add_transaction("a1", json!({ "txid": "a1", "blockTime": 100 }));
    h.indexer.add_transaction("b2", json!({ "txid": "b2", "blockTime": 300 }));
    h.indexer.add_transaction("c3", json!({ "txid": "c3", "blockTime": 200 }));

    let page = h.ok(MessageType::GetTransactions, json!({ "address": address(0) })).await;
    let order: Vec<&str> = page["transactions"]
        .as_array()
        .expect("transactions")
        .iter()
        .filter_map(|tx| tx["txid"].as_str())
        .collect();
    assert_eq!(order, vec!["b2", "c3", "a1"]);
    assert_eq!(page["page"], json!(1));
    assert_eq!(page["totalPages"], json!(1));
}

#[tokio::test]
async fn balance_and_price_pass_through() {
    let h = harness();
    let single = h.ok(MessageType::GetAddressBalance, json!({ "address": address(0) })).await;
    assert_eq!(single["address"], json!(address(0)));

    let many = h
        .ok(MessageType::GetAddressBalance, json!({ "addresses": [address(0), address(1)] }))
        .await;
    assert_eq!(many.as_array().map(Vec::len), Some(2));

    let price = h.ok(MessageType::GetPepecoinPrice, Value::Null).await;
    assert_eq!(price["rates"]["usd"], json!(0.0004));
}

#[tokio::test]
async fn transaction_notifications() {
    let h = harness();
    let confirmed = json!({
        "txid": "c0ffee",
        "confirmations": 2,
        "vout": [{ "value": "150000000", "addresses": [address(1)] }]
    });
    h.indexer.add_transaction("c0ffee", confirmed);
    h.indexer.add_transaction("pending", json!({ "txid": "pending", "confirmations": 0 }));

    assert_eq!(h.ok(MessageType::NotifyTransactionSuccess, json!({ "txId": "c0ffee" })).await, json!(true));
    assert_eq!(h.ok(MessageType::NotifyTransactionSuccess, json!({ "txId": "pending" })).await, json!(false));
    assert_eq!(h.ok(MessageType::NotifyTransactionSuccess, json!({ "txId": "gone" })).await, json!(true));

    let notes = h.ui.notifications.lock().unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].title, "Transaction Confirmed");
    assert_eq!(notes[0].message, format!("1.5 PEPE sent to {}.", address(1)));
    assert_eq!(notes[0].id.as_deref(), Some("c0ffee"));
    assert_eq!(notes[1].title, "Transaction Unconfirmed");
    assert!(notes[1].message.contains("`gone`"));
}

#[tokio::test]
async fn sign_message_uses_selected_address() {
    let h = harness();
    h.onboard().await;
    h.ok(MessageType::GenerateAddress, Value::Null).await;
    h.ok(MessageType::SelectAddress, json!({ "index": 1 })).await;

    let signature = h.ok(MessageType::SignMessage, json!({ "message": "gm" })).await;
    let params = ChainParams::pepecoin();
    let signature = signature.as_str().expect("signature string");
    assert!(pepevault::tx::verify_message(&address(1), signature, "gm", &params).expect("verify"));
    assert!(!pepevault::tx::verify_message(&address(0), signature, "gm", &params).expect("verify"));
}

#[tokio::test]
async fn raw_envelopes_are_parsed() {
    let h = harness();
    let res = h
        .dispatcher
        .dispatch_value(json!({ "message": "isOnboardingComplete" }))
        .await;
    assert_eq!(res, Response::Ok { data: json!(false) });

    let res = h.dispatcher.dispatch_value(json!({ "message": "mintNft" })).await;
    assert_eq!(res.error_kind(), Some(ErrorKind::Validation));
}
