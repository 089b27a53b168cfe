use super::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use std::sync::Mutex;
use tracing::debug;

/// Collection backed by a `fjall` partition.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
    // Serializes read-and-remove so a value is taken at most once.
    take_lock: Mutex<()>,
}

impl DiskCollection {
    pub fn new(keyspace: Keyspace, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
            take_lock: Mutex::new(()),
        }
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.partition.get(key)?.map(|value| value.to_vec()))
    }

    fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.partition.insert(key, value)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.partition.remove(key)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.read(key) {
            Ok(Some(value)) => {
                debug!("Store HIT for key: {}", String::from_utf8_lossy(key));
                Some(value)
            }
            Ok(None) => {
                debug!("Store MISS for key: {}", String::from_utf8_lossy(key));
                None
            }
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(key, value)?;
        debug!("Store PUT for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn take(&self, key: &[u8]) -> Option<Vec<u8>> {
        let _guard = self.take_lock.lock().unwrap_or_else(|e| e.into_inner());
        let res: Result<Option<Vec<u8>>> = (|| {
            let value = self.read(key)?;
            if value.is_some() {
                self.delete(key)?;
            }
            Ok(value)
        })();

        match res {
            Ok(value) => {
                debug!("Store TAKE for key: {}", String::from_utf8_lossy(key));
                value
            }
            Err(e) => {
                debug!("DiskCollection take error: {}", e);
                None
            }
        }
    }
}
