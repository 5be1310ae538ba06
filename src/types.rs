//! Core types for matchbook

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Record identifier type
pub type RecordId = u32;

/// A single corpus record: a stable id plus a bag of string attributes.
///
/// Records are immutable once read from the source. A missing attribute
/// reads as the empty string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub attrs: HashMap<String, String>,
}

impl Record {
    pub fn new(id: RecordId, attrs: HashMap<String, String>) -> Self {
        Self { id, attrs }
    }

    /// Attribute lookup; absent attributes are empty.
    pub fn attr(&self, name: &str) -> &str {
        self.attrs.get(name).map(String::as_str).unwrap_or("")
    }
}

/// The LSH signature of a record: one small-integer value per band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u16>);

impl Signature {
    pub fn new(values: Vec<u16>) -> Self {
        Self(values)
    }

    pub fn bands(&self) -> usize {
        self.0.len()
    }

    pub fn band(&self, i: usize) -> u16 {
        self.0[i]
    }

    pub fn values(&self) -> &[u16] {
        &self.0
    }

    /// The bucket keys this signature addresses, one per band.
    pub fn bucket_keys(&self) -> impl Iterator<Item = BucketKey> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(i, &v)| BucketKey::new(i as u8, v))
    }

    /// Number of bands in which `self` and `other` carry the same value.
    pub fn agreement(&self, other: &Signature) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .filter(|(a, b)| a == b)
            .count()
    }
}

/// A `(band, band_value)` pair addressing one posting bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub band: u8,
    pub value: u16,
}

impl BucketKey {
    pub fn new(band: u8, value: u16) -> Self {
        Self { band, value }
    }

    /// Packed binary form: one byte of band index, two bytes of band value
    /// big-endian. External stores treat this as an opaque key.
    pub fn encode(&self) -> [u8; 3] {
        let v = self.value.to_be_bytes();
        [self.band, v[0], v[1]]
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 3 {
            return None;
        }
        Some(Self {
            band: bytes[0],
            value: u16::from_be_bytes([bytes[1], bytes[2]]),
        })
    }
}

/// Big-endian binary form of a record id, used as the record-store key.
pub fn record_key(id: RecordId) -> [u8; 4] {
    id.to_be_bytes()
}

pub fn decode_record_key(bytes: &[u8]) -> Option<RecordId> {
    Some(RecordId::from_be_bytes(bytes.try_into().ok()?))
}
