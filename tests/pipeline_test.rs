//! Integration tests for matchbook
//!
//! These drive the full pipeline: learn a schema from records, freeze the
//! encoder, generate and load a hash template, ingest through the
//! signature index, and query back through the searcher.

use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;

use matchbook::encoder::{Counter, Encoder};
use matchbook::index::SignatureIndex;
use matchbook::limiter::RateLimiter;
use matchbook::memory::MemoryIndex;
use matchbook::query::Searcher;
use matchbook::schema::{Field, Transform};
use matchbook::store::memory::{MemoryPostingStore, MemoryRecordStore};
use matchbook::store::RecordStore;
use matchbook::template::Template;
use matchbook::types::Record;

fn fields() -> Vec<Field> {
    vec![
        Field {
            comment: "last name".into(),
            attrs: vec!["last_name".into()],
            transforms: vec![Transform::Upcase, Transform::Split],
        },
        Field {
            comment: "first name".into(),
            attrs: vec!["first_name".into()],
            transforms: vec![Transform::Upcase, Transform::Trim],
        },
        Field {
            comment: "city".into(),
            attrs: vec!["city".into()],
            transforms: vec![Transform::Upcase],
        },
    ]
}

fn record(id: u32, last: &str, first: &str, city: &str) -> Record {
    let mut attrs = HashMap::new();
    attrs.insert("last_name".to_string(), last.to_string());
    attrs.insert("first_name".to_string(), first.to_string());
    attrs.insert("city".to_string(), city.to_string());
    Record::new(id, attrs)
}

fn corpus() -> Vec<Record> {
    vec![
        record(1, "smith", "john", "tallahassee"),
        record(2, "smith", "jane", "miami"),
        record(3, "jones", "john", "tallahassee"),
        record(4, "de la cruz", "maria", "orlando"),
        record(5, "o'brien", "patrick", "miami"),
        record(6, "johnson", "emily", "tampa"),
    ]
}

fn train(records: &[Record]) -> Encoder {
    let mut counter = Counter::new(fields());
    for r in records {
        counter.learn(r);
    }
    counter.freeze()
}

#[tokio::test]
async fn end_to_end_index_and_query() {
    let records = corpus();
    let encoder = Arc::new(train(&records));

    let template_dir = TempDir::new().unwrap();
    Template::generate(template_dir.path(), encoder.dimension(), 32, 16, "phosphorus").unwrap();
    let template =
        Arc::new(Template::load(template_dir.path(), encoder.dimension(), 32, 16).unwrap());

    let postings: Arc<MemoryPostingStore> = Arc::new(MemoryPostingStore::created());
    let record_store: Arc<MemoryRecordStore> = Arc::new(MemoryRecordStore::created());

    let limiter = RateLimiter::start(1000);
    let index = SignatureIndex::new(postings.clone(), limiter.clone(), 4);
    for r in &records {
        record_store.put(r.id, &r.attrs).await.unwrap();
        let signature = template.sign(&encoder.encode(r));
        index.write(r.id, &signature).await.unwrap();
    }
    index.flush_all().await.unwrap();
    limiter.kill();

    let searcher = Searcher::new(encoder.clone(), template.clone(), postings, record_store);

    // An exact re-presentation of record 1 agrees with itself in every band.
    let results = searcher
        .query(&record(0, "smith", "john", "tallahassee"), None)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].id, 1);
    assert_eq!(results[0].matches, 32);
    assert_eq!(results[0].attrs["city"], "tallahassee");

    // A fuzzy query: every reported score must equal the actual number of
    // bands in which the candidate's signature matches the query's, and
    // results must come back ordered by score with ascending-id ties.
    let query = record(0, "smith", "jim", "tallahassee");
    let query_sig = template.sign(&encoder.encode(&query));
    let results = searcher.query(&query, None).await.unwrap();
    for m in &results {
        let indexed = records.iter().find(|r| r.id == m.id).unwrap();
        let indexed_sig = template.sign(&encoder.encode(indexed));
        assert_eq!(m.matches, query_sig.agreement(&indexed_sig), "id {}", m.id);
    }
    for pair in results.windows(2) {
        assert!(
            pair[0].matches > pair[1].matches
                || (pair[0].matches == pair[1].matches && pair[0].id < pair[1].id)
        );
    }
}

#[tokio::test]
async fn query_with_all_novel_terms_returns_nothing() {
    let records = corpus();
    let encoder = Arc::new(train(&records));

    let template_dir = TempDir::new().unwrap();
    Template::generate(template_dir.path(), encoder.dimension(), 16, 12, "phosphorus").unwrap();
    let template =
        Arc::new(Template::load(template_dir.path(), encoder.dimension(), 16, 12).unwrap());

    let postings: Arc<MemoryPostingStore> = Arc::new(MemoryPostingStore::created());
    let record_store: Arc<MemoryRecordStore> = Arc::new(MemoryRecordStore::created());

    let limiter = RateLimiter::start(1000);
    let index = SignatureIndex::new(postings.clone(), limiter, 4);
    for r in &records {
        let signature = template.sign(&encoder.encode(r));
        index.write(r.id, &signature).await.unwrap();
    }
    index.flush_all().await.unwrap();

    let searcher = Searcher::new(encoder.clone(), template.clone(), postings, record_store);
    // Every term is novel: the query encodes to the zero vector, whose
    // signature is still computable. Whatever comes back must be exactly
    // the corpus records whose signatures collide with it, band for band.
    let query = record(0, "zzyzx", "qwerty", "nowhere");
    let query_sig = template.sign(&encoder.encode(&query));
    let results = searcher.query(&query, None).await.unwrap();
    for r in &records {
        let agreement = query_sig.agreement(&template.sign(&encoder.encode(r)));
        let reported = results.iter().find(|m| m.id == r.id).map(|m| m.matches);
        if agreement > 0 {
            assert_eq!(reported, Some(agreement), "id {}", r.id);
        } else {
            assert_eq!(reported, None, "id {}", r.id);
        }
    }
}

#[tokio::test]
async fn memory_index_agrees_with_external_path() {
    let records = corpus();
    let encoder = Arc::new(train(&records));

    let template_dir = TempDir::new().unwrap();
    Template::generate(template_dir.path(), encoder.dimension(), 32, 16, "phosphorus").unwrap();
    let template =
        Arc::new(Template::load(template_dir.path(), encoder.dimension(), 32, 16).unwrap());

    let postings: Arc<MemoryPostingStore> = Arc::new(MemoryPostingStore::created());
    let record_store: Arc<MemoryRecordStore> = Arc::new(MemoryRecordStore::created());

    let limiter = RateLimiter::start(1000);
    let index = SignatureIndex::new(postings.clone(), limiter, 4);
    let memory = MemoryIndex::new(32);
    for r in &records {
        let signature = template.sign(&encoder.encode(r));
        record_store.put(r.id, &r.attrs).await.unwrap();
        index.write(r.id, &signature).await.unwrap();
        memory.write(r, &signature);
    }
    index.flush_all().await.unwrap();

    let searcher = Searcher::new(encoder.clone(), template.clone(), postings, record_store);

    let query = record(0, "smith", "john", "miami");
    let external = searcher.query(&query, None).await.unwrap();
    let local = memory.query(&template.sign(&encoder.encode(&query)), None);

    let externals: Vec<(u32, usize)> = external.iter().map(|m| (m.id, m.matches)).collect();
    let locals: Vec<(u32, usize)> = local.iter().map(|m| (m.id, m.matches)).collect();
    assert_eq!(externals, locals);
}

#[tokio::test]
async fn encoder_file_round_trip_preserves_encoding() {
    let records = corpus();
    let encoder = train(&records);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("encoder");
    encoder.save(&path).unwrap();
    let reloaded = Encoder::load(&path).unwrap();

    for r in &records {
        let a = encoder.encode(r);
        let b = reloaded.encode(r);
        assert_eq!(a.components().len(), b.components().len());
        for ((i1, v1), (i2, v2)) in a.components().iter().zip(b.components()) {
            assert_eq!(i1, i2);
            assert_eq!(v1.to_bits(), v2.to_bits(), "weight drifted for record {}", r.id);
        }
    }
}

#[tokio::test]
async fn two_identical_learning_runs_freeze_identical_encoders() {
    let records = corpus();
    let a = train(&records);
    let b = train(&records);

    let mut buf_a = Vec::new();
    let mut buf_b = Vec::new();
    a.save_to(&mut buf_a).unwrap();
    b.save_to(&mut buf_b).unwrap();
    assert_eq!(buf_a, buf_b);
}
