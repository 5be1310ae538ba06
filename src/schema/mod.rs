//! Logical fields
//!
//! A logical field names the source attributes it draws from and the
//! transform pipeline that turns their concatenation into terms. Fields
//! are the unit over which term frequencies are counted.

use serde::{Deserialize, Serialize};

use crate::types::Record;

mod transform;

pub use transform::Transform;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    /// Free-form label, used only for logging and the grounding of config
    /// diagnostics.
    #[serde(default)]
    pub comment: String,
    /// Source attributes, concatenated in order before the transforms run.
    pub attrs: Vec<String>,
    #[serde(default)]
    pub transforms: Vec<Transform>,
}

impl Field {
    /// Produce this field's terms for a record. Empty terms are dropped;
    /// split-style transforms may produce more than one.
    pub fn terms(&self, record: &Record) -> Vec<String> {
        let mut joined = String::new();
        for attr in &self.attrs {
            joined.push_str(record.attr(attr));
        }

        let mut terms = vec![joined];
        for transform in &self.transforms {
            terms = transform.apply(terms);
        }
        terms.retain(|t| !t.is_empty());
        terms
    }
}
