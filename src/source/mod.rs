//! Record sources
//!
//! A source is a lazy, finite stream of records. The core consumes it
//! through a bounded channel; concurrency within the source is the
//! source's own business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::Record;
use crate::Result;

pub mod file;

pub use file::DelimitedSource;

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Stream every record into `tx`, then return. Per-row problems are
    /// logged and skipped; file-level failures abort the stream.
    async fn stream(&self, tx: mpsc::Sender<Record>) -> Result<()>;
}

/// Maps a 1-based column of a delimited row to an attribute name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub column: usize,
    pub name: String,
}
