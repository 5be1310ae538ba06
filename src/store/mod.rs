//! Store abstraction layer
//!
//! The core talks to two external collaborators: a posting store (a keyed
//! multi-set of record ids) and a record store (a keyed attribute bag).
//! Both are abstract; this module ships an in-memory and a local
//! filesystem implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::RecordId;
use crate::Result;

pub mod local;
pub mod memory;

/// Keyed multi-set of record ids. Keys are opaque bytes produced by
/// [`crate::types::BucketKey::encode`]; members are sets, so retried
/// writes cannot introduce duplicates.
#[async_trait]
pub trait PostingStore: Send + Sync {
    /// Union `members` into the set stored under `key`.
    async fn add_members(&self, key: &[u8], members: &HashSet<RecordId>) -> Result<()>;

    /// Fetch the sets for the given keys. Absent keys are omitted from
    /// the result map.
    async fn batch_get(&self, keys: &[Vec<u8>]) -> Result<HashMap<Vec<u8>, HashSet<RecordId>>>;

    async fn exists(&self) -> Result<bool>;

    async fn create(&self) -> Result<()>;

    async fn destroy(&self) -> Result<()>;
}

/// Keyed attribute bag addressed by record id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, id: RecordId, attrs: &HashMap<String, String>) -> Result<()>;

    /// Fetch attribute bags for the given ids. Ids with no stored record
    /// are omitted from the result map.
    async fn batch_get(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, HashMap<String, String>>>;

    async fn exists(&self) -> Result<bool>;

    async fn create(&self) -> Result<()>;

    async fn destroy(&self) -> Result<()>;
}

/// Store backend configuration.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Memory,
    Local { root_path: String },
}

/// Create the posting and record stores for a backend config.
pub fn create_stores(
    config: &StoreConfig,
) -> Result<(Arc<dyn PostingStore>, Arc<dyn RecordStore>)> {
    match config {
        StoreConfig::Memory => {
            // In-memory stores live and die with the process; they are
            // born created so a single-process pipeline can use them
            // without a prior `prepare`.
            let postings = Arc::new(memory::MemoryPostingStore::created());
            let records = Arc::new(memory::MemoryRecordStore::created());
            Ok((postings, records))
        }
        StoreConfig::Local { root_path } => {
            let postings = Arc::new(local::LocalPostingStore::new(root_path));
            let records = Arc::new(local::LocalRecordStore::new(root_path));
            Ok((postings, records))
        }
    }
}
