//! Matchbook - a record-linkage / approximate-matching service
//!
//! Matchbook resolves structured records that name the same entity despite
//! spelling variance, missing fields, and rare-vs-common term skew:
//! - TF-IDF encoding of configured logical fields into sparse vectors
//! - random-hyperplane LSH signatures (band-agreement ≈ cosine)
//! - a bucketed posting index with batched, rate-limited store writes
//! - query-time candidate merge and rank by band agreement

pub mod api;
pub mod candidate;
pub mod config;
pub mod encoder;
pub mod error;
pub mod index;
pub mod limiter;
pub mod memory;
pub mod query;
pub mod schema;
pub mod source;
pub mod store;
pub mod template;
pub mod types;
pub mod vector;

pub use error::{Error, Result};
