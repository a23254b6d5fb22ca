//! Process-lifetime state threaded through every handler.
//!
//! Session state starts at `create_wallet`/`authenticate` (`Session::begin`)
//! and ends at `sign_out`/`delete_wallet` (`Session::end`). Nothing else
//! outlives a request.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use zeroize::Zeroizing;

use super::approvals::Approvals;
use crate::cipher::{Cipher, EncryptedBlob};
use crate::error::{VaultError, VaultResult};
use crate::indexer::ChainIndexer;
use crate::keys::{ChainParams, KeyPair};
use crate::session::Session;
use crate::storage::{keys, KeyValueStore};
use crate::tx::FeePolicy;
use crate::ui::ExtensionUi;
use crate::wallet::{SessionWallet, Wallet};

pub struct VaultContext {
    pub(crate) local: Arc<dyn KeyValueStore>,
    pub(crate) session: Session,
    pub(crate) indexer: Arc<dyn ChainIndexer>,
    pub(crate) ui: Arc<dyn ExtensionUi>,
    pub(crate) params: ChainParams,
    pub(crate) fees: FeePolicy,
    pub(crate) cipher: Cipher,
    pub(crate) approvals: Approvals,
    wallet_lock: Mutex<()>,
}

impl VaultContext {
    pub fn new(
        local: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        indexer: Arc<dyn ChainIndexer>,
        ui: Arc<dyn ExtensionUi>,
    ) -> Self {
        Self {
            local,
            session: Session::new(session),
            indexer,
            ui,
            params: ChainParams::pepecoin(),
            fees: FeePolicy::default(),
            cipher: Cipher::default(),
            approvals: Approvals::new(),
            wallet_lock: Mutex::new(()),
        }
    }

    pub fn with_params(mut self, params: ChainParams) -> Self { self.params = params; self }
    pub fn with_fees(mut self, fees: FeePolicy) -> Self { self.fees = fees; self }
    pub fn with_cipher(mut self, cipher: Cipher) -> Self { self.cipher = cipher; self }

    pub fn session(&self) -> &Session { &self.session }
    pub fn approvals(&self) -> &Approvals { &self.approvals }

    /// Serializes read-modify-write cycles on the wallet record.
    pub(crate) async fn lock_wallet(&self) -> MutexGuard<'_, ()> {
        self.wallet_lock.lock().await
    }

    pub(crate) fn onboarding_complete(&self) -> VaultResult<bool> {
        Ok(matches!(self.local.get(keys::ONBOARDING_COMPLETE)?, Some(Value::Bool(true))))
    }

    pub(crate) fn stored_blob(&self, key: &str) -> VaultResult<Option<EncryptedBlob>> {
        self.local
            .get(key)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    /// Decrypt the stored wallet with `password`. Any failure is `AuthFailure`.
    pub(crate) fn load_wallet(&self, password: &str) -> VaultResult<Wallet> {
        let blob = self.stored_blob(keys::WALLET)?.ok_or(VaultError::AuthFailure)?;
        let wallet: Wallet = self.cipher.decrypt(&blob, password).ok_or(VaultError::AuthFailure)?;
        wallet.check().map_err(|_| VaultError::AuthFailure)?;
        Ok(wallet)
    }

    /// Decrypt the stored wallet with the session password.
    pub(crate) fn unlock_wallet(&self) -> VaultResult<(Wallet, Zeroizing<String>)> {
        let password = self.session.password()?;
        let wallet = self.load_wallet(&password)?;
        Ok((wallet, password))
    }

    /// Persist the re-encrypted wallet and the recomputed session view as one
    /// step. A failed session write restores the previous local record.
    pub(crate) fn commit_wallet(&self, wallet: &Wallet, password: &str) -> VaultResult<SessionWallet> {
        wallet.check()?;
        let blob = self.cipher.encrypt(wallet, password)?;
        let view = wallet.session_view(false);
        let previous = self.local.get(keys::WALLET)?;

        self.local.set(keys::WALLET, serde_json::to_value(&blob)?)?;
        if let Err(err) = self.session.set_wallet(&view) {
            let restored = match previous {
                Some(value) => self.local.set(keys::WALLET, value),
                None => self.local.remove(&[keys::WALLET]),
            };
            if let Err(restore_err) = restored {
                tracing::error!(error = %restore_err, "failed to restore wallet record");
            }
            return Err(err);
        }
        Ok(view)
    }

    pub(crate) fn selected_index(&self, data: &Value) -> VaultResult<usize> {
        if let Some(index) = data.get("selectedAddressIndex").and_then(Value::as_u64) {
            return Ok(index as usize);
        }
        Ok(self
            .local
            .get(keys::SELECTED_ADDRESS_INDEX)?
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize)
    }

    pub(crate) fn selected_key(&self, wallet: &Wallet, data: &Value) -> VaultResult<KeyPair> {
        wallet.key_at(self.selected_index(data)?, &self.params)
    }
}
