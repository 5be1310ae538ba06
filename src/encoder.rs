//! Field counting and the frozen TF-IDF encoder
//!
//! One pass over the training records learns, per logical field, a
//! term → id table and a per-term document frequency. Freezing produces
//! an encoder whose term ids, offsets, and `ln(N / df)` weights never
//! change; re-encoding the same record always yields the same sparse
//! vector.

use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::schema::Field;
use crate::types::Record;
use crate::vector::SparseVector;
use crate::{Error, Result};

/// Per-field term dictionary accumulated during learning. Terms map to
/// dense ids in first-seen order; the map is ordered so that a frozen
/// encoder serializes identically across runs.
#[derive(Debug, Default)]
struct FieldCounter {
    terms: BTreeMap<String, usize>,
    /// Document frequency, indexed by term id.
    counts: Vec<u32>,
}

impl FieldCounter {
    /// Register one occurrence-in-a-record of `term`. Empty terms are
    /// ignored; unseen terms get the next dense id.
    fn add(&mut self, term: &str) {
        if term.is_empty() {
            return;
        }
        match self.terms.get(term) {
            Some(&id) => self.counts[id] += 1,
            None => {
                let id = self.counts.len();
                self.counts.push(1);
                self.terms.insert(term.to_string(), id);
            }
        }
    }
}

/// Learns term dictionaries from a record stream; `freeze` turns the
/// accumulated counts into an [`Encoder`].
pub struct Counter {
    fields: Vec<Field>,
    dicts: Vec<FieldCounter>,
    records: u64,
}

impl Counter {
    pub fn new(fields: Vec<Field>) -> Self {
        let dicts = fields.iter().map(|_| FieldCounter::default()).collect();
        Self {
            fields,
            dicts,
            records: 0,
        }
    }

    /// Count one record. A term repeated within a single record bumps its
    /// document frequency once; the record count rises by one regardless
    /// of how many terms were produced.
    pub fn learn(&mut self, record: &Record) {
        for (field, dict) in self.fields.iter().zip(self.dicts.iter_mut()) {
            let mut seen = HashSet::new();
            for term in field.terms(record) {
                if seen.insert(term.clone()) {
                    dict.add(&term);
                }
            }
        }
        self.records += 1;
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Freeze into an immutable encoder: weights become `ln(N / df)` and
    /// each field gets its base offset into the global dimension.
    pub fn freeze(self) -> Encoder {
        let n = self.records as f64;
        let mut tables = Vec::with_capacity(self.dicts.len());
        let mut offset = 0;
        for dict in self.dicts {
            let weights: Vec<f64> = dict
                .counts
                .iter()
                .map(|&df| (n / df as f64).ln())
                .collect();
            let len = weights.len();
            tables.push(EncoderField {
                offset,
                terms: dict.terms,
                weights,
            });
            offset += len;
        }
        Encoder {
            dimension: offset,
            fields: self.fields,
            tables,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct EncoderField {
    offset: usize,
    terms: BTreeMap<String, usize>,
    weights: Vec<f64>,
}

/// Frozen TF-IDF encoder. Read-only and freely shared across workers.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Encoder {
    dimension: usize,
    fields: Vec<Field>,
    tables: Vec<EncoderField>,
}

impl Encoder {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The frozen IDF weight for a term of a field, if the term was seen
    /// during learning.
    pub fn weight(&self, field: usize, term: &str) -> Option<f64> {
        let table = self.tables.get(field)?;
        table.terms.get(term).map(|&id| table.weights[id])
    }

    /// Encode a record into an IDF-weighted sparse vector. Terms unknown
    /// to the dictionary contribute nothing; several known terms landing
    /// on the same index sum their contributions.
    pub fn encode(&self, record: &Record) -> SparseVector {
        let mut acc: BTreeMap<usize, f64> = BTreeMap::new();
        for (field, table) in self.fields.iter().zip(self.tables.iter()) {
            for term in field.terms(record) {
                if let Some(&id) = table.terms.get(&term) {
                    *acc.entry(table.offset + id).or_insert(0.0) += table.weights[id];
                }
            }
        }
        SparseVector::from_sorted(self.dimension, acc.into_iter().collect())
    }

    /// Serialize to a byte stream such that loading and re-encoding yields
    /// bit-identical sparse vectors.
    pub fn save_to<W: Write>(&self, mut writer: W) -> Result<()> {
        rmp_serde::encode::write(&mut writer, self)
            .map_err(|e| Error::encoding(format!("encoder serialize failed: {e}")))
    }

    pub fn load_from<R: Read>(reader: R) -> Result<Self> {
        rmp_serde::decode::from_read(reader)
            .map_err(|e| Error::encoding(format!("encoder deserialize failed: {e}")))
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.save_to(std::io::BufWriter::new(file))
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::load_from(std::io::BufReader::new(file))
    }
}
