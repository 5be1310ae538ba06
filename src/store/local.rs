//! Local filesystem stores
//!
//! Postings live under `<root>/postings/<base64url(key)>` as packed
//! big-endian record ids; records under `<root>/records/<id>.json` as
//! their attribute map. Suitable for single-host deployments and for
//! exercising the full pipeline without cloud credentials.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::fs;
use tokio::sync::Mutex;

use crate::types::{record_key, RecordId};
use crate::{Error, Result};

const POSTINGS_DIR: &str = "postings";
const RECORDS_DIR: &str = "records";

pub struct LocalPostingStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on posting files.
    write_lock: Mutex<()>,
}

impl LocalPostingStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(POSTINGS_DIR),
            write_lock: Mutex::new(()),
        }
    }

    fn bucket_path(&self, key: &[u8]) -> PathBuf {
        self.dir.join(URL_SAFE_NO_PAD.encode(key))
    }
}

fn decode_posting(bytes: &[u8], path: &Path) -> Result<HashSet<RecordId>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::store(format!(
            "corrupt posting file {}: {} bytes",
            path.display(),
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| RecordId::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn encode_posting(members: &HashSet<RecordId>) -> Vec<u8> {
    let mut ids: Vec<RecordId> = members.iter().copied().collect();
    ids.sort_unstable();
    let mut out = Vec::with_capacity(ids.len() * 4);
    for id in ids {
        out.extend_from_slice(&id.to_be_bytes());
    }
    out
}

#[async_trait]
impl super::PostingStore for LocalPostingStore {
    async fn add_members(&self, key: &[u8], members: &HashSet<RecordId>) -> Result<()> {
        if !self.exists().await? {
            return Err(Error::StoreMissing("posting store".into()));
        }
        let path = self.bucket_path(key);
        let _guard = self.write_lock.lock().await;

        let mut merged = match fs::read(&path).await {
            Ok(bytes) => decode_posting(&bytes, &path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };
        merged.extend(members.iter().copied());
        fs::write(&path, encode_posting(&merged)).await?;
        Ok(())
    }

    async fn batch_get(&self, keys: &[Vec<u8>]) -> Result<HashMap<Vec<u8>, HashSet<RecordId>>> {
        if !self.exists().await? {
            return Err(Error::StoreMissing("posting store".into()));
        }
        let mut out = HashMap::new();
        for key in keys {
            let path = self.bucket_path(key);
            match fs::read(&path).await {
                Ok(bytes) => {
                    out.insert(key.clone(), decode_posting(&bytes, &path)?);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    async fn exists(&self) -> Result<bool> {
        Ok(fs::try_exists(&self.dir).await?)
    }

    async fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if self.exists().await? {
            fs::remove_dir_all(&self.dir).await?;
        }
        Ok(())
    }
}

pub struct LocalRecordStore {
    dir: PathBuf,
}

impl LocalRecordStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(RECORDS_DIR),
        }
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.dir
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(record_key(id))))
    }
}

#[async_trait]
impl super::RecordStore for LocalRecordStore {
    async fn put(&self, id: RecordId, attrs: &HashMap<String, String>) -> Result<()> {
        if !self.exists().await? {
            return Err(Error::StoreMissing("record store".into()));
        }
        let body = serde_json::to_vec(attrs)?;
        fs::write(self.record_path(id), body).await?;
        Ok(())
    }

    async fn batch_get(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, HashMap<String, String>>> {
        if !self.exists().await? {
            return Err(Error::StoreMissing("record store".into()));
        }
        let mut out = HashMap::new();
        for &id in ids {
            match fs::read(self.record_path(id)).await {
                Ok(bytes) => {
                    let attrs: HashMap<String, String> = serde_json::from_slice(&bytes)?;
                    out.insert(id, attrs);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    async fn exists(&self) -> Result<bool> {
        Ok(fs::try_exists(&self.dir).await?)
    }

    async fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if self.exists().await? {
            fs::remove_dir_all(&self.dir).await?;
        }
        Ok(())
    }
}
