//! Sentinel configuration: the enumerated option keys, their TOML file form
//! and the parsing from one to the other.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;
use vigil_archive::ArchiveConfig;
use vigil_common::parse_hash;
use vigil_common::Hash;

pub use vigil_archive::INVALID_SENTINEL_ID;

/// Fully parsed sentinel options.
///
/// One options value describes the whole deployment; each sentinel picks its
/// own endpoint, key and log level out of it by sentinel id.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Ordered list of sentinel RPC endpoints; this sentinel serves at the
    /// index equal to its sentinel id
    pub sentinel_endpoints: Vec<String>,

    /// Private keys by sentinel id. A sentinel without a key can only run
    /// with an attestation threshold of zero.
    pub sentinel_private_keys: HashMap<u32, Hash>,

    /// Minimum number of distinct attestations a compact transaction needs
    /// before coordinator submission
    pub attestation_threshold: usize,

    /// Coordinator endpoints; a sentinel uses `endpoints[id % len]`
    pub coordinator_endpoints: Vec<String>,

    /// Transaction history archive configuration (the `tha_*` keys)
    pub archive: ArchiveConfig,

    /// Per-sentinel log verbosity; ids past the end reuse the last entry
    pub sentinel_loglevels: Vec<LevelFilter>,
}

impl Options {
    /// Loads options from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Options, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&raw)?;
        Options::try_from(file)
    }

    /// The log verbosity for `sentinel_id`, defaulting to `Info` when none
    /// is configured
    pub fn log_level_for(&self, sentinel_id: u32) -> LevelFilter {
        if self.sentinel_loglevels.is_empty() {
            return LevelFilter::Info;
        }
        let index = (sentinel_id as usize).min(self.sentinel_loglevels.len() - 1);
        self.sentinel_loglevels[index]
    }

    /// The coordinator endpoint assigned to `sentinel_id`, if any are
    /// configured
    pub fn coordinator_endpoint_for(&self, sentinel_id: u32) -> Option<&str> {
        if self.coordinator_endpoints.is_empty() {
            return None;
        }
        let index = sentinel_id as usize % self.coordinator_endpoints.len();
        Some(&self.coordinator_endpoints[index])
    }
}

/// The raw TOML shape of the options file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub sentinel_endpoints: Vec<String>,
    /// Keys are decimal sentinel ids, values 64-digit hex private keys
    pub sentinel_private_keys: HashMap<String, String>,
    pub attestation_threshold: usize,
    pub coordinator_endpoints: Vec<String>,
    pub tha_type: Option<String>,
    pub tha_parameter: Option<String>,
    pub tha_port: Option<u16>,
    pub tha_user: Option<String>,
    pub tha_password: Option<String>,
    pub tha_ssl_version: Option<String>,
    pub sentinel_loglevels: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read the config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse the config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("sentinel_private_keys index {0} is not a sentinel id")]
    BadKeyIndex(String),

    #[error("sentinel_private_keys[{0}] is not a 32-byte hex key")]
    BadKey(String),

    #[error("{0} is not a log level")]
    BadLogLevel(String),
}

impl TryFrom<ConfigFile> for Options {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let mut sentinel_private_keys = HashMap::new();
        for (index, key) in file.sentinel_private_keys {
            let id: u32 = index
                .parse()
                .map_err(|_| ConfigError::BadKeyIndex(index.clone()))?;
            let key = parse_hash(&key).ok_or_else(|| ConfigError::BadKey(index.clone()))?;
            sentinel_private_keys.insert(id, key);
        }

        let mut sentinel_loglevels = Vec::new();
        for level in file.sentinel_loglevels {
            let parsed = LevelFilter::from_str(&level)
                .map_err(|_| ConfigError::BadLogLevel(level.clone()))?;
            sentinel_loglevels.push(parsed);
        }

        let default_archive = ArchiveConfig::default();
        let archive = ArchiveConfig {
            backend: file.tha_type.unwrap_or(default_archive.backend),
            parameter: file.tha_parameter.unwrap_or(default_archive.parameter),
            port: file.tha_port.unwrap_or(default_archive.port),
            user: file.tha_user.unwrap_or(default_archive.user),
            password: file.tha_password.unwrap_or(default_archive.password),
            ssl_version: file.tha_ssl_version.unwrap_or(default_archive.ssl_version),
        };

        Ok(Options {
            sentinel_endpoints: file.sentinel_endpoints,
            sentinel_private_keys,
            attestation_threshold: file.attestation_threshold,
            coordinator_endpoints: file.coordinator_endpoints,
            archive,
            sentinel_loglevels,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r#"
        sentinel_endpoints = ["127.0.0.1:5555", "127.0.0.1:5556", "127.0.0.1:5557"]
        attestation_threshold = 2
        coordinator_endpoints = ["127.0.0.1:7777", "127.0.0.1:7778"]
        tha_type = "leveldb"
        tha_parameter = "/tmp/tha"
        sentinel_loglevels = ["debug", "info", "warn"]

        [sentinel_private_keys]
        0 = "0101010101010101010101010101010101010101010101010101010101010101"
        1 = "0x0202020202020202020202020202020202020202020202020202020202020202"
    "#;

    #[test]
    fn test_parse_sample() {
        let file: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let opts = Options::try_from(file).unwrap();

        assert_eq!(opts.sentinel_endpoints.len(), 3);
        assert_eq!(opts.attestation_threshold, 2);
        assert_eq!(opts.sentinel_private_keys[&0], [0x01; 32]);
        assert_eq!(opts.sentinel_private_keys[&1], [0x02; 32]);
        assert_eq!(opts.archive.backend, "leveldb");
        assert_eq!(opts.archive.parameter, "/tmp/tha");

        assert_eq!(opts.log_level_for(0), LevelFilter::Debug);
        assert_eq!(opts.log_level_for(2), LevelFilter::Warn);
        // Ids past the end of the list reuse the last entry
        assert_eq!(opts.log_level_for(9), LevelFilter::Warn);

        assert_eq!(opts.coordinator_endpoint_for(0), Some("127.0.0.1:7777"));
        assert_eq!(opts.coordinator_endpoint_for(1), Some("127.0.0.1:7778"));
        assert_eq!(opts.coordinator_endpoint_for(2), Some("127.0.0.1:7777"));
    }

    #[test]
    fn test_defaults() {
        let opts = Options::try_from(ConfigFile::default()).unwrap();
        assert!(opts.sentinel_endpoints.is_empty());
        assert_eq!(opts.attestation_threshold, 0);
        assert_eq!(opts.archive.backend, "none");
        assert_eq!(opts.log_level_for(0), LevelFilter::Info);
        assert_eq!(opts.coordinator_endpoint_for(0), None);
    }

    #[test]
    fn test_bad_key_material() {
        let raw = r#"
            [sentinel_private_keys]
            zero = "0101010101010101010101010101010101010101010101010101010101010101"
        "#;
        let file: ConfigFile = toml::from_str(raw).unwrap();
        assert!(matches!(
            Options::try_from(file),
            Err(ConfigError::BadKeyIndex(_))
        ));

        let raw = r#"
            [sentinel_private_keys]
            0 = "abcd"
        "#;
        let file: ConfigFile = toml::from_str(raw).unwrap();
        assert!(matches!(Options::try_from(file), Err(ConfigError::BadKey(_))));
    }

    #[test]
    fn test_bad_log_level() {
        let raw = r#"sentinel_loglevels = ["chatty"]"#;
        let file: ConfigFile = toml::from_str(raw).unwrap();
        assert!(matches!(
            Options::try_from(file),
            Err(ConfigError::BadLogLevel(_))
        ));
    }
}
