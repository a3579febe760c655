//! Remote wide-column archive backend, speaking CQL through the scylla
//! driver. Reads and writes go through prepared statements at local-quorum
//! consistency; TLS is configured from the archive options.
//!
//! The table holds one text key column and one blob column. Wide-column
//! stores cannot range-scan arbitrary text keys, so prefix deletion probes
//! the fixed set of keys a transaction can own: its body key plus one status
//! key per state.

use openssl::ssl::SslContextBuilder;
use openssl::ssl::SslMethod;
use openssl::ssl::SslVerifyMode;
use scylla::prepared_statement::PreparedStatement;
use scylla::statement::Consistency;
use scylla::Session;
use scylla::SessionBuilder;

use async_trait::async_trait;

use crate::store::ArchiveStore;
use crate::store::StoreError;
use crate::ArchiveConfig;
use crate::SslVersion;

const KEYSPACE: &str = "tx_history";
const TABLE: &str = "tx_history.records";

pub struct KeyspacesStore {
    session: Session,
    insert: PreparedStatement,
    select: PreparedStatement,
    delete: PreparedStatement,
}

impl KeyspacesStore {
    pub async fn connect(config: &ArchiveConfig) -> Result<Self, StoreError> {
        let mut builder = SessionBuilder::new()
            .known_node(format!("{}:{}", config.parameter, config.port));

        if !config.user.is_empty() {
            builder = builder.user(config.user.clone(), config.password.clone());
        }

        if let Some(version) = min_proto_version(config.ssl()) {
            let mut ssl = SslContextBuilder::new(SslMethod::tls()).map_err(remote)?;
            ssl.set_verify(SslVerifyMode::NONE);
            ssl.set_min_proto_version(Some(version)).map_err(remote)?;
            builder = builder.ssl_context(Some(ssl.build()));
        }

        let session = builder.build().await.map_err(remote)?;

        // Production deployments pre-provision the table; local clusters get
        // it created on first contact. Failures here only matter if the
        // statements below cannot be prepared.
        let _ = session
            .query(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {KEYSPACE} WITH replication = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
                ),
                (),
            )
            .await;
        let _ = session
            .query(
                format!("CREATE TABLE IF NOT EXISTS {TABLE} (rec_key text PRIMARY KEY, rec_data blob)"),
                (),
            )
            .await;

        let insert = prepare(
            &session,
            &format!("INSERT INTO {TABLE} (rec_key, rec_data) VALUES (?, ?)"),
        )
        .await?;
        let select = prepare(
            &session,
            &format!("SELECT rec_data FROM {TABLE} WHERE rec_key = ?"),
        )
        .await?;
        let delete = prepare(&session, &format!("DELETE FROM {TABLE} WHERE rec_key = ?")).await?;

        Ok(KeyspacesStore {
            session,
            insert,
            select,
            delete,
        })
    }

    async fn get_row(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let result = self
            .session
            .execute(&self.select, (key.to_string(),))
            .await
            .map_err(remote)?;
        let row = result
            .maybe_first_row_typed::<(Vec<u8>,)>()
            .map_err(remote)?;
        Ok(row.map(|(data,)| data))
    }

    async fn delete_row(&self, key: &str) -> Result<(), StoreError> {
        self.session
            .execute(&self.delete, (key.to_string(),))
            .await
            .map_err(remote)?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for KeyspacesStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.session
            .execute(&self.insert, (key.to_string(), value.to_vec()))
            .await
            .map_err(remote)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.get_row(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.delete_row(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut candidates = vec![prefix.to_string()];
        for ordinal in 0u8..=6 {
            candidates.push(format!("{prefix}-{ordinal}"));
        }

        let mut deleted = 0;
        for key in candidates {
            if self.get_row(&key).await?.is_some() {
                self.delete_row(&key).await?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

async fn prepare(session: &Session, statement: &str) -> Result<PreparedStatement, StoreError> {
    let mut prepared = session.prepare(statement).await.map_err(remote)?;
    prepared.set_consistency(Consistency::LocalQuorum);
    Ok(prepared)
}

fn min_proto_version(version: SslVersion) -> Option<openssl::ssl::SslVersion> {
    match version {
        SslVersion::None => None,
        SslVersion::Tls1 => Some(openssl::ssl::SslVersion::TLS1),
        SslVersion::Tls1_1 => Some(openssl::ssl::SslVersion::TLS1_1),
        SslVersion::Tls1_2 => Some(openssl::ssl::SslVersion::TLS1_2),
    }
}

fn remote(error: impl std::fmt::Display) -> StoreError {
    StoreError::Remote(error.to_string())
}
