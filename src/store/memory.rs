//! In-memory stores
//!
//! Backing for the `memory` backend and for tests. State lives in process
//! memory and disappears with it.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::RecordId;
use crate::{Error, Result};

#[derive(Default)]
pub struct MemoryPostingStore {
    buckets: RwLock<Option<HashMap<Vec<u8>, HashSet<RecordId>>>>,
}

impl MemoryPostingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create in one step, for tests and the memory backend's lazy paths.
    pub fn created() -> Self {
        Self {
            buckets: RwLock::new(Some(HashMap::new())),
        }
    }
}

#[async_trait]
impl super::PostingStore for MemoryPostingStore {
    async fn add_members(&self, key: &[u8], members: &HashSet<RecordId>) -> Result<()> {
        let mut guard = self.buckets.write().await;
        let buckets = guard
            .as_mut()
            .ok_or_else(|| Error::StoreMissing("posting store".into()))?;
        buckets
            .entry(key.to_vec())
            .or_default()
            .extend(members.iter().copied());
        Ok(())
    }

    async fn batch_get(&self, keys: &[Vec<u8>]) -> Result<HashMap<Vec<u8>, HashSet<RecordId>>> {
        let guard = self.buckets.read().await;
        let buckets = guard
            .as_ref()
            .ok_or_else(|| Error::StoreMissing("posting store".into()))?;
        let mut out = HashMap::new();
        for key in keys {
            if let Some(set) = buckets.get(key) {
                out.insert(key.clone(), set.clone());
            }
        }
        Ok(out)
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.buckets.read().await.is_some())
    }

    async fn create(&self) -> Result<()> {
        let mut guard = self.buckets.write().await;
        if guard.is_none() {
            *guard = Some(HashMap::new());
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        *self.buckets.write().await = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Option<HashMap<RecordId, HashMap<String, String>>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created() -> Self {
        Self {
            records: RwLock::new(Some(HashMap::new())),
        }
    }
}

#[async_trait]
impl super::RecordStore for MemoryRecordStore {
    async fn put(&self, id: RecordId, attrs: &HashMap<String, String>) -> Result<()> {
        let mut guard = self.records.write().await;
        let records = guard
            .as_mut()
            .ok_or_else(|| Error::StoreMissing("record store".into()))?;
        records.insert(id, attrs.clone());
        Ok(())
    }

    async fn batch_get(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, HashMap<String, String>>> {
        let guard = self.records.read().await;
        let records = guard
            .as_ref()
            .ok_or_else(|| Error::StoreMissing("record store".into()))?;
        let mut out = HashMap::new();
        for id in ids {
            if let Some(attrs) = records.get(id) {
                out.insert(*id, attrs.clone());
            }
        }
        Ok(out)
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.records.read().await.is_some())
    }

    async fn create(&self) -> Result<()> {
        let mut guard = self.records.write().await;
        if guard.is_none() {
            *guard = Some(HashMap::new());
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        *self.records.write().await = None;
        Ok(())
    }
}
