use thiserror::Error;
use vigil_common::impl_error_from;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("no sentinel endpoints are defined")]
    NoEndpoints,

    #[error("sentinel id {id} is too large for {count} configured sentinels")]
    IdOutOfRange { id: u32, count: usize },

    #[error("attestation threshold is {0} but no private key is configured")]
    NoPrivateKey(usize),

    #[error("invalid sentinel private key: {0}")]
    InvalidPrivateKey(secp256k1::Error),

    #[error("we don't have any peers")]
    NoPeersAvailable,

    #[error("failed to start the sentinel RPC server: {0}")]
    Bind(std::io::Error),

    #[error("configuration error: {0}")]
    Config(ConfigError),
}

impl_error_from!(SentinelError, secp256k1::Error, InvalidPrivateKey);
impl_error_from!(SentinelError, ConfigError, Config);
