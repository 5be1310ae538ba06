//! Signature index
//!
//! Accepts `(record_id, signature)` writes, staging each id under one
//! bucket per band. A bucket reaching the flush threshold is snapshotted
//! and handed to the posting store through the rate-limited writer. The
//! staging table is sharded: locks are held only across map mutation and
//! the snapshot swap, never across store I/O, so a flushing bucket never
//! blocks writes to other buckets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::limiter::RateLimiter;
use crate::store::PostingStore;
use crate::types::{BucketKey, RecordId, Signature};
use crate::Result;

const SHARD_COUNT: usize = 256;

pub struct SignatureIndex {
    shards: Vec<Mutex<HashMap<BucketKey, HashSet<RecordId>>>>,
    threshold: usize,
    store: Arc<dyn PostingStore>,
    writer: Arc<RateLimiter>,
}

impl SignatureIndex {
    pub fn new(store: Arc<dyn PostingStore>, writer: Arc<RateLimiter>, threshold: usize) -> Self {
        assert!(threshold >= 1, "flush threshold must be at least 1");
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shards,
            threshold,
            store,
            writer,
        }
    }

    fn shard_of(&self, key: BucketKey) -> &Mutex<HashMap<BucketKey, HashSet<RecordId>>> {
        let h = (key.value as usize) ^ ((key.band as usize) << 5);
        &self.shards[h & (SHARD_COUNT - 1)]
    }

    /// Stage `id` under every band bucket of `signature`, flushing any
    /// bucket that reaches the threshold. Success means the id is either
    /// flushed or staged for exactly one bucket per band.
    pub async fn write(&self, id: RecordId, signature: &Signature) -> Result<()> {
        let mut due: Vec<(BucketKey, HashSet<RecordId>)> = Vec::new();
        for key in signature.bucket_keys() {
            let shard = self.shard_of(key);
            let mut table = shard.lock();
            let bucket = table.entry(key).or_default();
            bucket.insert(id);
            if bucket.len() >= self.threshold {
                let snapshot = std::mem::take(bucket);
                due.push((key, snapshot));
            }
        }

        for (key, snapshot) in due {
            self.flush_bucket(key, snapshot).await?;
        }
        Ok(())
    }

    /// Drain every staged bucket to the store. Called at the end of
    /// ingestion; an immediate second call has nothing to do.
    pub async fn flush_all(&self) -> Result<()> {
        for shard in &self.shards {
            let drained: Vec<(BucketKey, HashSet<RecordId>)> = {
                let mut table = shard.lock();
                table.drain().filter(|(_, set)| !set.is_empty()).collect()
            };
            for (key, snapshot) in drained {
                self.flush_bucket(key, snapshot).await?;
            }
        }
        Ok(())
    }

    /// Total ids currently staged, across all buckets.
    pub fn staged(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().values().map(HashSet::len).sum::<usize>())
            .sum()
    }

    async fn flush_bucket(&self, key: BucketKey, snapshot: HashSet<RecordId>) -> Result<()> {
        let encoded = key.encode();
        let result = self
            .writer
            .run(|| self.store.add_members(&encoded, &snapshot))
            .await;
        if let Err(e) = result {
            // Re-stage the snapshot so a later flush_all can retry it.
            let mut table = self.shard_of(key).lock();
            table.entry(key).or_default().extend(snapshot);
            return Err(e);
        }
        Ok(())
    }
}
