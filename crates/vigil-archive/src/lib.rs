// SPDX-License-Identifier: MIT

//! The transaction history archive: an append-only journal of every
//! transaction a sentinel observes, plus the evolving lifecycle status of
//! each, behind a pluggable storage backend.
//!
//! Archiving is strictly best-effort. Every backend failure is logged and
//! folded into a `false`/`0`/`None` result; nothing here may panic or stall
//! the transaction hot path.

use std::str::FromStr;
use std::sync::Arc;

use log::error;
use log::info;
use log::trace;
use log::warn;
use serde::Deserialize;
use vigil_common::millis_since_epoch;
use vigil_common::Hash;
use vigil_transaction::tx_id;
use vigil_transaction::FullTx;

pub mod kv_store;
#[cfg(feature = "keyspaces")]
pub mod keyspaces;
pub mod records;
pub mod store;

pub use records::render_tx;
pub use records::TxState;
pub use store::ArchiveStore;
pub use store::NullStore;
pub use store::StoreError;

/// The sentinel id that disables archiving
pub const INVALID_SENTINEL_ID: u32 = u32::MAX;

/// TLS protocol versions accepted for the remote wide-column backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslVersion {
    #[default]
    None,
    Tls1,
    Tls1_1,
    Tls1_2,
}

impl FromStr for SslVersion {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Ok(SslVersion::None),
            "tls1" => Ok(SslVersion::Tls1),
            "tls1_1" => Ok(SslVersion::Tls1_1),
            "tls1_2" => Ok(SslVersion::Tls1_2),
            other => Err(format!("unsupported ssl version {other}")),
        }
    }
}

/// Archive configuration, drawn from the sentinel's `tha_*` option keys
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Backend selector: `"leveldb"` (embedded), `"keyspaces"` or `"none"`
    pub backend: String,

    /// Filesystem path of the embedded store, or the contact host of the
    /// remote store
    pub parameter: String,

    /// Port of the remote store
    pub port: u16,

    /// Credentials for the remote store
    pub user: String,
    pub password: String,

    /// TLS version for the remote store: `"none"`, `"TLS1"`, `"TLS1_1"` or
    /// `"TLS1_2"`. Unsupported values fall back to TLS1_2 with a warning.
    pub ssl_version: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            backend: "none".into(),
            parameter: "tha-data".into(),
            port: 9142,
            user: String::new(),
            password: String::new(),
            ssl_version: "none".into(),
        }
    }
}

impl ArchiveConfig {
    /// The configured TLS version, warning and falling back to TLS1_2 on an
    /// unsupported value, the way the remote handler always has
    pub fn ssl(&self) -> SslVersion {
        SslVersion::from_str(&self.ssl_version).unwrap_or_else(|_| {
            warn!(
                "Unsupported ssl version {} specified. Supported are TLS1, TLS1_1, \
                 TLS1_2 or 'none' to NOT use SSL. Falling back to TLS1_2",
                self.ssl_version
            );
            SslVersion::Tls1_2
        })
    }
}

/// The transaction history archiver: body and status journaling for one
/// sentinel, on top of whichever [ArchiveStore] the configuration selects
pub struct TxHistoryArchiver {
    enabled: bool,
    store: Arc<dyn ArchiveStore>,
}

impl TxHistoryArchiver {
    /// Builds the archiver for `sentinel_id`. Never fails: a backend that
    /// cannot be opened, an unknown backend type, a `"none"` configuration or
    /// the invalid sentinel id all produce a disabled archiver.
    pub async fn new(sentinel_id: u32, config: &ArchiveConfig) -> Self {
        if sentinel_id == INVALID_SENTINEL_ID {
            return Self::disabled();
        }

        info!(
            "THA config: Type: {} Parameter: {} Port: {} User: {} SSL: {:?}",
            config.backend,
            config.parameter,
            config.port,
            config.user,
            config.ssl()
        );

        let store: Arc<dyn ArchiveStore> = match config.backend.to_ascii_lowercase().as_str() {
            "none" => {
                info!("tha backend set to 'none'. THA functionality disabled.");
                return Self::disabled();
            }
            "leveldb" | "kv" => match kv_store::KvStore::open(&config.parameter) {
                Ok(store) => {
                    info!("embedded archive store opened at {}", config.parameter);
                    Arc::new(store)
                }
                Err(e) => {
                    error!("failed to open embedded archive store at {}: {e}", config.parameter);
                    return Self::disabled();
                }
            },
            #[cfg(feature = "keyspaces")]
            "keyspaces" => match keyspaces::KeyspacesStore::connect(config).await {
                Ok(store) => {
                    info!("connected to keyspaces archive store at {}", config.parameter);
                    Arc::new(store)
                }
                Err(e) => {
                    error!("failed to connect to keyspaces archive store: {e}");
                    return Self::disabled();
                }
            },
            #[cfg(not(feature = "keyspaces"))]
            "keyspaces" => {
                error!("this build does not carry keyspaces support; THA disabled");
                return Self::disabled();
            }
            other => {
                error!("unknown tha backend type {other}; THA disabled");
                return Self::disabled();
            }
        };

        TxHistoryArchiver {
            enabled: true,
            store,
        }
    }

    /// An archiver whose every operation is a no-op returning `false`/`0`
    pub fn disabled() -> Self {
        TxHistoryArchiver {
            enabled: false,
            store: Arc::new(NullStore),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Journals a transaction body under its id with a fresh timestamp
    pub async fn add_transaction(&self, tx: &FullTx) -> bool {
        if !self.enabled {
            return false;
        }

        let key = records::body_key(&tx_id(tx));
        let record = records::encode_tx(tx, millis_since_epoch());
        match self.store.put(&key, &record).await {
            Ok(()) => {
                trace!("archived transaction body, key {key}");
                true
            }
            Err(e) => {
                error!("failed to archive transaction {key}: {e}");
                false
            }
        }
    }

    /// Journals a status transition. Writing the same state again overwrites
    /// the previous timestamp; the operation is idempotent per state.
    pub async fn set_status(&self, txid: &Hash, state: TxState) -> bool {
        if !self.enabled {
            return false;
        }

        let key = records::status_key(&records::body_key(txid), state);
        let record = records::encode_status(millis_since_epoch());
        match self.store.put(&key, &record).await {
            Ok(()) => {
                trace!("archived status {state}, key {key}");
                true
            }
            Err(e) => {
                error!("failed to archive status {state} for {key}: {e}");
                false
            }
        }
    }

    /// Returns the body and the highest-priority recorded status of a
    /// transaction, with the timestamp of whichever record won
    pub async fn get(&self, txid: &Hash) -> Option<(TxState, FullTx, u64)> {
        self.get_by_key(&records::body_key(txid)).await
    }

    /// [TxHistoryArchiver::get], keyed by the 64-character hex body key
    pub async fn get_by_key(&self, key: &str) -> Option<(TxState, FullTx, u64)> {
        if !self.enabled {
            return None;
        }

        let body = match self.store.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("transaction not found, key {key}");
                return None;
            }
            Err(e) => {
                error!("failed to read transaction {key}: {e}");
                return None;
            }
        };

        let (tx, mut timestamp) = match records::decode_tx(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("corrupt body record for {key}: {e}");
                return None;
            }
        };

        let mut state = TxState::Initial;
        for probe in TxState::PRIORITY {
            match self.store.get(&records::status_key(key, probe)).await {
                Ok(Some(record)) => match records::decode_status(&record) {
                    Ok(when) => {
                        state = probe;
                        timestamp = when;
                        break;
                    }
                    Err(e) => {
                        error!("corrupt status record for {key}/{probe}: {e}");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    error!("failed to read status {probe} for {key}: {e}");
                }
            }
        }

        Some((state, tx, timestamp))
    }

    /// Removes the body and every status record of a transaction, returning
    /// the number of deleted rows
    pub async fn delete(&self, txid: &Hash) -> u64 {
        self.delete_by_key(&records::body_key(txid)).await
    }

    /// [TxHistoryArchiver::delete], keyed by the hex body key
    pub async fn delete_by_key(&self, key: &str) -> u64 {
        if !self.enabled {
            return 0;
        }

        match self.store.delete_prefix(key).await {
            Ok(count) => {
                trace!("deleted {count} archive rows for {key}");
                count
            }
            Err(e) => {
                error!("failed to delete archive rows for {key}: {e}");
                0
            }
        }
    }
}
