//! Embedded archive backend on top of the `kv` store. Everything lives in a
//! single bucket; prefix deletion is a full bucket scan, which is fine for
//! the eight records a transaction can ever own.

use async_trait::async_trait;
use kv::Bucket;
use kv::Config;
use kv::Store;

use crate::store::ArchiveStore;
use crate::store::StoreError;

pub struct KvStore(Store, Bucket<'static, String, Vec<u8>>);

impl KvStore {
    pub fn open(datadir: &str) -> Result<KvStore, StoreError> {
        // Configure the database
        let cfg = Config::new(datadir);

        // Open the key/value store
        let store = Store::new(cfg)?;
        let bucket = store.bucket::<String, Vec<u8>>(Some("tx-history"))?;
        Ok(KvStore(store, bucket))
    }
}

#[async_trait]
impl ArchiveStore for KvStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.1.set(&key.to_string(), &value.to_vec())?;
        self.1.flush()?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.1.get(&key.to_string())?)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.1.remove(&key.to_string())?;
        self.1.flush()?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut matched = Vec::new();
        for item in self.1.iter() {
            let item = item?;
            let key = item.key::<String>()?;
            if key.starts_with(prefix) {
                matched.push(key);
            }
        }

        for key in &matched {
            self.1.remove(key)?;
        }
        self.1.flush()?;
        Ok(matched.len() as u64)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
