//! Query and rank
//!
//! A query record runs through the same encode/sign path as ingestion,
//! then its band keys are fetched from the posting store in parallel
//! chunks. The number of buckets a candidate id appears in is its
//! agreement count, the ranking score.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;

use crate::encoder::Encoder;
use crate::store::{PostingStore, RecordStore};
use crate::template::Template;
use crate::types::{Record, RecordId, Signature};
use crate::Result;

/// Keys per batch-get request against the external store.
const FETCH_CHUNK: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    pub id: RecordId,
    /// Number of bands in which this record's signature agrees with the
    /// query signature.
    pub matches: usize,
    /// Full attributes fetched from the record store; empty when the
    /// record fetch returned nothing.
    pub attrs: HashMap<String, String>,
}

pub struct Searcher {
    encoder: Arc<Encoder>,
    template: Arc<Template>,
    postings: Arc<dyn PostingStore>,
    records: Arc<dyn RecordStore>,
}

impl Searcher {
    pub fn new(
        encoder: Arc<Encoder>,
        template: Arc<Template>,
        postings: Arc<dyn PostingStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            encoder,
            template,
            postings,
            records,
        }
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Encode and sign a record. A record of entirely novel terms encodes
    /// to the zero vector, whose signature is still well defined.
    pub fn sign(&self, record: &Record) -> Signature {
        self.template.sign(&self.encoder.encode(record))
    }

    /// Full query pipeline; `top_k` of `None` returns all matches.
    pub async fn query(&self, record: &Record, top_k: Option<usize>) -> Result<Vec<QueryMatch>> {
        let signature = self.sign(record);
        self.query_signature(&signature, top_k).await
    }

    /// Rank candidates for an already-computed signature.
    pub async fn query_signature(
        &self,
        signature: &Signature,
        top_k: Option<usize>,
    ) -> Result<Vec<QueryMatch>> {
        let keys: Vec<Vec<u8>> = signature
            .bucket_keys()
            .map(|k| k.encode().to_vec())
            .collect();

        let fetches = keys.chunks(FETCH_CHUNK).map(|chunk| {
            let chunk = chunk.to_vec();
            let store = Arc::clone(&self.postings);
            async move { store.batch_get(&chunk).await }
        });

        let mut counts: HashMap<RecordId, usize> = HashMap::new();
        for buckets in try_join_all(fetches).await? {
            for members in buckets.values() {
                for &id in members {
                    *counts.entry(id).or_insert(0) += 1;
                }
            }
        }

        let ids: Vec<RecordId> = counts.keys().copied().collect();
        let record_fetches = ids.chunks(FETCH_CHUNK).map(|chunk| {
            let chunk = chunk.to_vec();
            let store = Arc::clone(&self.records);
            async move { store.batch_get(&chunk).await }
        });

        let mut attrs_by_id: HashMap<RecordId, HashMap<String, String>> = HashMap::new();
        for fetched in try_join_all(record_fetches).await? {
            attrs_by_id.extend(fetched);
        }

        let mut results: Vec<QueryMatch> = counts
            .into_iter()
            .map(|(id, matches)| QueryMatch {
                id,
                matches,
                attrs: attrs_by_id.remove(&id).unwrap_or_default(),
            })
            .collect();
        results.sort_unstable_by(|a, b| b.matches.cmp(&a.matches).then(a.id.cmp(&b.id)));
        if let Some(k) = top_k {
            results.truncate(k);
        }
        Ok(results)
    }
}
