//! Pepevault: self-custody Pepecoin wallet core.
//!
//! # Architecture
//!
//! ```text
//! page ─► Provider (FIFO, one in flight)
//!           │  {type, data}
//!           ▼
//!        content script ─► Dispatcher ◄─ extension UI
//!                             │
//!           ┌─────────────────┼──────────────────┬──────────────┐
//!           ▼                 ▼                  ▼              ▼
//!        Cipher           keys / wallet        tx            Session
//!     (argon2 + XChaCha)  (BIP39/BIP44, WIF)  (select,       (auth flag,
//!           │                                  sign, PSBT)    connected
//!           ▼                                                 clients)
//!      KeyValueStore (local file / session memory)
//!
//!   Dispatcher ─► ChainIndexer (REST indexer)   ─► ExtensionUi (popups, tabs, notifications)
//! ```
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`cipher`] | password encryption of wallet payloads, password verifier |
//! | [`keys`] | mnemonic, root/child derivation, WIF, addresses |
//! | [`wallet`] | the encrypted wallet record, address book, format migration |
//! | [`tx`] | UTXO selection, unsigned tx, signing, PSBT policy, message crypto |
//! | [`session`] | session secrets and per-origin connections |
//! | `dispatcher` | privileged message router and approval tickets |
//! | `provider` | page-side request queue |
//!
//! # Features
//!
//! - `native` (default) - tokio host: dispatcher, provider, HTTP indexer,
//!   file store, logging, binary.
//!
//! # Usage
//!
//! ```ignore
//! use pepevault::{Request, MessageType, VaultConfig};
//! use serde_json::json;
//!
//! let dispatcher = VaultConfig::from_env().open_dispatcher(ui)?;
//! let response = dispatcher
//!     .dispatch(Request::new(MessageType::CreateWallet, json!({"password": "hunter22"})))
//!     .await;
//! ```

// =============================================================================
// Engines (no runtime required)
// =============================================================================
pub mod cipher;
pub mod error;
pub mod indexer;
pub mod keys;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod tx;
pub mod ui;
pub mod wallet;

// =============================================================================
// Native host (tokio, filesystem, HTTP)
// =============================================================================
#[cfg(feature = "native")]
pub mod config;
#[cfg(feature = "native")]
pub mod dispatcher;
#[cfg(feature = "native")]
pub mod logging;
#[cfg(feature = "native")]
pub mod provider;
#[cfg(feature = "native")]
pub mod runtime;

// =============================================================================
// Re-exports
// =============================================================================
pub use cipher::{Cipher, EncryptedBlob, KdfParams};
pub use error::{ErrorKind, VaultError, VaultResult};
pub use indexer::{ChainIndexer, TxidPage};
pub use keys::{Address, ChainParams, KeyPair};
pub use protocol::MessageType;
pub use session::{ConnectedClient, Session};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use tx::{FeePolicy, UnsignedTransaction, Utxo};
pub use ui::{ExtensionUi, Notification, PopupRequest, TabMessage};
pub use wallet::{SessionWallet, Wallet};

#[cfg(feature = "native")]
pub use config::VaultConfig;
#[cfg(feature = "native")]
pub use dispatcher::{Dispatcher, Request, Response, Sender, VaultContext};
#[cfg(feature = "native")]
pub use indexer::HttpIndexer;
#[cfg(feature = "native")]
pub use provider::{Callbacks, PageChannel, PageMessage, Provider, ProviderError};
#[cfg(feature = "native")]
pub use runtime::{install_signal_handlers, Shutdown};
