//! Host configuration - passed from the binary or an embedding layer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cipher::{Cipher, KdfParams};
use crate::dispatcher::{Dispatcher, VaultContext};
use crate::error::VaultResult;
use crate::indexer::{HttpIndexer, DEFAULT_INDEXER_URL};
use crate::keys::ChainParams;
use crate::provider::{PageChannel, Provider, DEFAULT_SETTLE_DELAY};
use crate::storage::{FileStore, MemoryStore};
use crate::tx::FeePolicy;
use crate::ui::ExtensionUi;

pub const DEFAULT_INDEXER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub app: String,
    /// Holds the persisted local record. `None` means the platform default.
    pub data_dir: Option<PathBuf>,
    pub indexer_url: String,
    pub indexer_timeout: Duration,
    pub params: ChainParams,
    pub fees: FeePolicy,
    pub settle_delay: Duration,
    pub kdf: KdfParams,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            app: "pepevault".into(),
            data_dir: None,
            indexer_url: DEFAULT_INDEXER_URL.into(),
            indexer_timeout: DEFAULT_INDEXER_TIMEOUT,
            params: ChainParams::pepecoin(),
            fees: FeePolicy::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            kdf: KdfParams::default(),
        }
    }
}

impl VaultConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self { self.data_dir = Some(path.into()); self }
    pub fn with_indexer_url(mut self, url: impl Into<String>) -> Self { self.indexer_url = url.into(); self }
    pub fn with_indexer_timeout(mut self, timeout: Duration) -> Self { self.indexer_timeout = timeout; self }
    pub fn with_params(mut self, params: ChainParams) -> Self { self.params = params; self }
    pub fn with_fees(mut self, fees: FeePolicy) -> Self { self.fees = fees; self }
    pub fn with_settle_delay(mut self, delay: Duration) -> Self { self.settle_delay = delay; self }
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self { self.kdf = kdf; self }

    /// Overlay `PEPEVAULT_*` environment variables on the defaults.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|s| !s.trim().is_empty());
        let mut config = Self::new(var("PEPEVAULT_APP").unwrap_or_else(|| "pepevault".into()));

        if let Some(dir) = var("PEPEVAULT_DATA_DIR") {
            config = config.with_data_dir(dir);
        }
        if let Some(url) = var("PEPEVAULT_INDEXER_URL") {
            config = config.with_indexer_url(url);
        }
        if let Some(params) = var("PEPEVAULT_CHAIN").and_then(|c| ChainParams::from_str(&c)) {
            config = config.with_params(params);
        }
        if let Some(rate) = var("PEPEVAULT_FEE_RATE").and_then(|s| s.parse().ok()) {
            config.fees = config.fees.with_fee_rate(rate);
        }
        if let Some(dust) = var("PEPEVAULT_DUST_THRESHOLD").and_then(|s| s.parse().ok()) {
            config.fees = config.fees.with_dust_threshold(dust);
        }
        if let Some(ms) = var("PEPEVAULT_SETTLE_DELAY_MS").and_then(|s| s.parse().ok()) {
            config = config.with_settle_delay(Duration::from_millis(ms));
        }
        config
    }

    /// Directory of the persisted local record.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(&self.app)
        })
    }

    pub fn local_store_path(&self) -> PathBuf {
        self.data_dir().join("local.json")
    }

    /// Wire the production collaborators: file-backed local record, in-memory
    /// session area, HTTP indexer.
    pub fn open_dispatcher(&self, ui: Arc<dyn ExtensionUi>) -> VaultResult<Dispatcher> {
        let local = FileStore::open(self.local_store_path())?;
        let indexer = HttpIndexer::new(&self.indexer_url, self.indexer_timeout)?;
        tracing::info!(
            store = %local.path().display(),
            indexer = %self.indexer_url,
            chain = self.params.as_str(),
            "opening vault"
        );
        let ctx = VaultContext::new(Arc::new(local), Arc::new(MemoryStore::new()), Arc::new(indexer), ui)
            .with_params(self.params.clone())
            .with_fees(self.fees)
            .with_cipher(Cipher::new(self.kdf));
        Ok(Dispatcher::new(ctx))
    }

    /// Start a page's request queue with the configured settle delay.
    pub fn spawn_provider(&self, origin: impl Into<String>, channel: Arc<dyn PageChannel>) -> Provider {
        Provider::spawn_with_settle_delay(origin, channel, self.settle_delay)
    }
}
