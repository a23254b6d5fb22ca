//! Session/Connection Registry.
//!
//! Lives in the session storage area, so everything here disappears on
//! sign-out, wallet deletion, or when the session area itself is dropped.
//!
//! ```text
//! begin(password, view)  ──►  AUTHENTICATED = true, WALLET = view, PASSWORD
//! connect_client(c)      ──►  CONNECTED_CLIENTS[c.origin] = c
//! end()                  ──►  (empty)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};
use crate::storage::{keys, KeyValueStore};
use crate::wallet::SessionWallet;

/// A page origin the user approved, with the address it was shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedClient {
    pub origin: String,
    pub address: String,
    pub origin_tab_id: i64,
}

pub type ConnectedClients = BTreeMap<String, ConnectedClient>;

#[derive(Clone)]
pub struct Session {
    store: Arc<dyn KeyValueStore>,
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self { Self { store } }

    pub fn begin(&self, password: &str, view: &SessionWallet) -> VaultResult<()> {
        self.store.set_many(vec![
            (keys::AUTHENTICATED.into(), Value::Bool(true)),
            (keys::WALLET.into(), serde_json::to_value(view)?),
            (keys::PASSWORD.into(), Value::String(password.to_string())),
        ])
    }

    pub fn end(&self) -> VaultResult<()> {
        self.store.clear()
    }

    pub fn is_authenticated(&self) -> VaultResult<bool> {
        Ok(matches!(self.store.get(keys::AUTHENTICATED)?, Some(Value::Bool(true))))
    }

    pub fn wallet(&self) -> VaultResult<Option<SessionWallet>> {
        self.store
            .get(keys::WALLET)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    pub fn set_wallet(&self, view: &SessionWallet) -> VaultResult<()> {
        self.store.set(keys::WALLET, serde_json::to_value(view)?)
    }

    /// The session password. Missing means the session is locked.
    pub fn password(&self) -> VaultResult<Zeroizing<String>> {
        match self.store.get(keys::PASSWORD)? {
            Some(Value::String(p)) => Ok(Zeroizing::new(p)),
            _ => Err(VaultError::AuthFailure),
        }
    }

    pub fn connected_clients(&self) -> VaultResult<ConnectedClients> {
        Ok(self
            .store
            .get(keys::CONNECTED_CLIENTS)?
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default())
    }

    pub fn client(&self, origin: &str) -> VaultResult<Option<ConnectedClient>> {
        Ok(self.connected_clients()?.remove(origin))
    }

    /// At most one entry per origin; a reconnect replaces the old one.
    pub fn connect_client(&self, client: ConnectedClient) -> VaultResult<()> {
        let mut clients = self.connected_clients()?;
        clients.insert(client.origin.clone(), client);
        self.store.set(keys::CONNECTED_CLIENTS, serde_json::to_value(&clients)?)
    }

    pub fn disconnect_client(&self, origin: &str) -> VaultResult<bool> {
        let mut clients = self.connected_clients()?;
        let removed = clients.remove(origin).is_some();
        if removed {
            self.store.set(keys::CONNECTED_CLIENTS, serde_json::to_value(&clients)?)?;
        }
        Ok(removed)
    }

    /// Outpoints spent by transactions broadcast this session, not yet
    /// reflected by the indexer.
    pub fn spent_outpoints(&self) -> VaultResult<BTreeSet<String>> {
        Ok(self
            .store
            .get(keys::SPENT_OUTPOINTS)?
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default())
    }

    pub fn record_spent(&self, outpoints: impl IntoIterator<Item = String>) -> VaultResult<()> {
        let mut spent = self.spent_outpoints()?;
        spent.extend(outpoints);
        self.store.set(keys::SPENT_OUTPOINTS, json!(spent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn session() -> Session { Session::new(Arc::new(MemoryStore::new())) }

    fn client(origin: &str, tab: i64) -> ConnectedClient {
        ConnectedClient { origin: origin.into(), address: "Paddr".into(), origin_tab_id: tab }
    }

    #[test]
    fn test_begin_and_end() {
        let s = session();
        assert!(!s.is_authenticated().unwrap());
        assert!(matches!(s.password(), Err(VaultError::AuthFailure)));

        let view = SessionWallet { addresses: vec!["Pa".into()], ..Default::default() };
        s.begin("pw", &view).unwrap();
        assert!(s.is_authenticated().unwrap());
        assert_eq!(s.password().unwrap().as_str(), "pw");
        assert_eq!(s.wallet().unwrap(), Some(view));

        s.connect_client(client("https://a.example", 1)).unwrap();
        s.end().unwrap();
        assert!(!s.is_authenticated().unwrap());
        assert!(s.connected_clients().unwrap().is_empty());
    }

    #[test]
    fn test_one_entry_per_origin() {
        let s = session();
        s.connect_client(client("https://a.example", 1)).unwrap();
        s.connect_client(client("https://a.example", 7)).unwrap();
        s.connect_client(client("https://b.example", 2)).unwrap();
        let clients = s.connected_clients().unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients["https://a.example"].origin_tab_id, 7);

        assert!(s.disconnect_client("https://a.example").unwrap());
        assert!(!s.disconnect_client("https://a.example").unwrap());
        assert!(s.client("https://a.example").unwrap().is_none());
    }

    #[test]
    fn test_client_wire_shape() {
        let value = serde_json::to_value(client("https://a.example", 3)).unwrap();
        assert_eq!(value["originTabId"], 3);
        assert_eq!(value["origin"], "https://a.example");
    }

    #[test]
    fn test_spent_outpoints_accumulate() {
        let s = session();
        s.record_spent(vec!["aa:0".to_string()]).unwrap();
        s.record_spent(vec!["bb:1".to_string(), "aa:0".to_string()]).unwrap();
        assert_eq!(s.spent_outpoints().unwrap().len(), 2);
    }
}
