//! Fully in-memory index
//!
//! Keeps postings and records in process and ranks with the candidate
//! heap merge instead of a count map. Useful when the whole corpus fits
//! in memory; also the zero-I/O path tests lean on.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::candidate::merge_candidates;
use crate::query::QueryMatch;
use crate::types::{Record, RecordId, Signature};

struct Inner {
    /// Per band: band value → posting list.
    postings: Vec<HashMap<u16, Vec<RecordId>>>,
    records: HashMap<RecordId, HashMap<String, String>>,
}

pub struct MemoryIndex {
    inner: RwLock<Inner>,
}

impl MemoryIndex {
    pub fn new(bands: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                postings: (0..bands).map(|_| HashMap::new()).collect(),
                records: HashMap::new(),
            }),
        }
    }

    /// Store a record's attributes and its posting entries. An id already
    /// present under a bucket is not duplicated.
    pub fn write(&self, record: &Record, signature: &Signature) {
        let mut inner = self.inner.write();
        inner.records.insert(record.id, record.attrs.clone());
        for (band, &value) in signature.values().iter().enumerate() {
            let list = inner.postings[band].entry(value).or_default();
            if !list.contains(&record.id) {
                list.push(record.id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Rank candidates for a query signature via the k-way heap merge.
    pub fn query(&self, signature: &Signature, top_k: Option<usize>) -> Vec<QueryMatch> {
        let inner = self.inner.read();
        let sources: Vec<Vec<RecordId>> = signature
            .values()
            .iter()
            .enumerate()
            .map(|(band, value)| {
                inner.postings[band]
                    .get(value)
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();

        let mut merged = merge_candidates(sources);
        if let Some(k) = top_k {
            merged.truncate(k);
        }
        merged
            .into_iter()
            .map(|(id, matches)| QueryMatch {
                id,
                matches,
                attrs: inner.records.get(&id).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: RecordId, name: &str) -> Record {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), name.to_string());
        Record::new(id, attrs)
    }

    #[test]
    fn ranks_like_the_external_path() {
        let index = MemoryIndex::new(8);
        let a = Signature::new(vec![14, 255, 104, 172, 138, 51, 132, 248]);
        let b = Signature::new(vec![14, 255, 104, 172, 138, 51, 232, 177]);
        let c = Signature::new(vec![14, 255, 104, 197, 20, 149, 132, 62]);

        index.write(&record(0xa, "alice"), &a);
        index.write(&record(0xb, "bob"), &b);

        let results = index.query(&c, None);
        assert_eq!(results.len(), 2);
        assert_eq!((results[0].id, results[0].matches), (0xa, 4));
        assert_eq!((results[1].id, results[1].matches), (0xb, 3));
        assert_eq!(results[0].attrs["name"], "alice");
    }

    #[test]
    fn rewrites_are_idempotent() {
        let index = MemoryIndex::new(2);
        let sig = Signature::new(vec![7, 9]);
        index.write(&record(1, "x"), &sig);
        index.write(&record(1, "x"), &sig);

        let results = index.query(&sig, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matches, 2);
    }

    #[test]
    fn query_against_empty_index_is_empty() {
        let index = MemoryIndex::new(4);
        assert!(index.is_empty());
        assert!(index.query(&Signature::new(vec![0, 0, 0, 0]), None).is_empty());
    }
}
