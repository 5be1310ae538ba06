use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::schema::Field;
use crate::source::{ColumnSpec, DelimitedSource};
use crate::store::StoreConfig;
use crate::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MATCHBOOK_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "matchbook.toml";

/// Top-level application configuration loaded from file + environment.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub workspace: WorkspaceSection,
    pub signature: SignatureSection,
    pub indexing: IndexingSection,
    pub limiter: LimiterSection,
    pub store: StoreSection,
    pub source: SourceSection,
    pub schema: SchemaSection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from disk and environment and validate it.
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut builder = config::Config::builder();
        if Path::new(&config_path).exists() {
            builder = builder.add_source(config::File::from(PathBuf::from(&config_path)));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MATCHBOOK")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| Error::config(format!("{config_path}: {e}")))?;
        let mut loaded: Self = settings
            .try_deserialize()
            .map_err(|e| Error::config(format!("{config_path}: {e}")))?;

        if loaded.logging.level.trim().is_empty() {
            loaded.logging.level = "info".to_string();
        }

        loaded.validate()?;
        Ok(loaded)
    }

    /// Structural checks that hold for every command.
    pub fn validate(&self) -> Result<()> {
        let sig = &self.signature;
        if sig.bands == 0 || sig.bands > 256 {
            return Err(Error::config(format!(
                "signature.bands {} not in 1..=256",
                sig.bands
            )));
        }
        if sig.bits == 0 || sig.bits > 16 {
            return Err(Error::config(format!(
                "signature.bits {} not in 1..=16",
                sig.bits
            )));
        }
        if sig.seed.is_empty() {
            return Err(Error::config("signature.seed must not be empty"));
        }
        if self.indexing.flush_threshold == 0 {
            return Err(Error::config("indexing.flush_threshold must be > 0"));
        }
        if self.indexing.workers == 0 {
            return Err(Error::config("indexing.workers must be > 0"));
        }
        if self.limiter.posting_fill == 0 || self.limiter.record_fill == 0 {
            return Err(Error::config("limiter fills must be > 0"));
        }

        self.source.validate()?;
        self.schema.validate(&self.source)?;
        self.store.validate()?;
        Ok(())
    }

    pub fn store_runtime(&self) -> Result<StoreConfig> {
        self.store.to_runtime()
    }

    pub fn source_runtime(&self) -> Result<DelimitedSource> {
        self.source.to_runtime()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3456,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    pub dir: String,
}

impl WorkspaceSection {
    pub fn encoder_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join("encoder")
    }

    pub fn template_dir(&self) -> PathBuf {
        PathBuf::from(&self.dir).join("hash")
    }
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            dir: "./workspace".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignatureSection {
    /// Number of bands; each band contributes one posting bucket per record.
    pub bands: usize,
    /// Hyperplanes (bits) per band.
    pub bits: usize,
    /// Master seed for the hyperplane family.
    pub seed: String,
}

impl Default for SignatureSection {
    fn default() -> Self {
        Self {
            bands: 128,
            bits: 16,
            seed: "phosphorus".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexingSection {
    /// Staged ids per bucket before a flush to the posting store.
    pub flush_threshold: usize,
    /// Ingestion worker tasks.
    pub workers: usize,
    /// Bound of the source → worker record channel.
    pub channel_capacity: usize,
}

impl Default for IndexingSection {
    fn default() -> Self {
        Self {
            flush_threshold: 64,
            workers: 8,
            channel_capacity: 2048,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimiterSection {
    /// Initial tokens per refresh for posting-store writes.
    pub posting_fill: u32,
    /// Initial tokens per refresh for record-store writes.
    pub record_fill: u32,
}

impl Default for LimiterSection {
    fn default() -> Self {
        Self {
            posting_fill: 5000,
            record_fill: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackendKind,
    pub local: Option<LocalStoreSection>,
}

impl StoreSection {
    fn validate(&self) -> Result<()> {
        if matches!(self.backend, StoreBackendKind::Local) {
            let local = self
                .local
                .as_ref()
                .ok_or_else(|| Error::config("store.local required when backend is 'local'"))?;
            if local.root_path.trim().is_empty() {
                return Err(Error::config("store.local.root_path must not be empty"));
            }
        }
        Ok(())
    }

    fn to_runtime(&self) -> Result<StoreConfig> {
        match self.backend {
            StoreBackendKind::Memory => Ok(StoreConfig::Memory),
            StoreBackendKind::Local => {
                let local = self
                    .local
                    .clone()
                    .ok_or_else(|| Error::config("store.local required when backend is 'local'"))?;
                Ok(StoreConfig::Local {
                    root_path: local.root_path,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    Memory,
    #[default]
    Local,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LocalStoreSection {
    pub root_path: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SourceSection {
    pub dir: String,
    pub extension: Option<String>,
    pub delimiter: String,
    pub id_column: usize,
    pub columns: Vec<ColumnSpec>,
}

impl SourceSection {
    fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            // Source is optional; commands that need one fail when they
            // ask for the runtime.
            return Ok(());
        }
        if self.delimiter.chars().count() != 1 {
            return Err(Error::config(format!(
                "source.delimiter must be one character, got {:?}",
                self.delimiter
            )));
        }
        if self.id_column < 1 {
            return Err(Error::config("source.id_column must be >= 1"));
        }

        let mut names = HashSet::new();
        let mut positions = HashSet::new();
        for spec in &self.columns {
            if spec.name.is_empty() {
                return Err(Error::config("source column name must not be empty"));
            }
            if spec.column < 1 {
                return Err(Error::config(format!(
                    "source column {:?} position must be >= 1",
                    spec.name
                )));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate source column name {:?}",
                    spec.name
                )));
            }
            if !positions.insert(spec.column) {
                return Err(Error::config(format!(
                    "duplicate source column position {}",
                    spec.column
                )));
            }
        }
        Ok(())
    }

    fn to_runtime(&self) -> Result<DelimitedSource> {
        if self.columns.is_empty() {
            return Err(Error::config("source.columns must be configured"));
        }
        if self.dir.trim().is_empty() {
            return Err(Error::config("source.dir must be configured"));
        }
        let delimiter = self
            .delimiter
            .chars()
            .next()
            .ok_or_else(|| Error::config("source.delimiter must be one character"))?;
        Ok(DelimitedSource::new(
            &self.dir,
            self.extension.clone(),
            delimiter,
            self.id_column,
            self.columns.clone(),
        ))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SchemaSection {
    pub fields: Vec<Field>,
}

impl SchemaSection {
    fn validate(&self, source: &SourceSection) -> Result<()> {
        for field in &self.fields {
            if field.attrs.is_empty() {
                return Err(Error::config(format!(
                    "schema field {:?} names no attributes",
                    field.comment
                )));
            }
        }
        // Every field attribute must come from a configured source column,
        // when a source is configured at all.
        if !source.columns.is_empty() {
            let known: HashSet<&str> = source.columns.iter().map(|c| c.name.as_str()).collect();
            for field in &self.fields {
                for attr in &field.attrs {
                    if !known.contains(attr.as_str()) {
                        return Err(Error::config(format!(
                            "schema field {:?} references unknown attribute {:?}",
                            field.comment, attr
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Transform;

    fn source_with_columns() -> SourceSection {
        SourceSection {
            dir: "./data".into(),
            extension: Some("csv".into()),
            delimiter: ",".into(),
            id_column: 1,
            columns: vec![
                ColumnSpec {
                    column: 2,
                    name: "last_name".into(),
                },
                ColumnSpec {
                    column: 3,
                    name: "first_name".into(),
                },
            ],
        }
    }

    fn valid_config() -> AppConfig {
        AppConfig {
            source: source_with_columns(),
            schema: SchemaSection {
                fields: vec![Field {
                    comment: "surname".into(),
                    attrs: vec!["last_name".into()],
                    transforms: vec![Transform::Upcase],
                }],
            },
            store: StoreSection {
                backend: StoreBackendKind::Memory,
                local: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn unknown_field_attribute_is_a_config_error() {
        let mut config = valid_config();
        config.schema.fields[0].attrs = vec!["middle_name".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown attribute"), "{err}");
    }

    #[test]
    fn local_backend_requires_root_path() {
        let mut config = valid_config();
        config.store = StoreSection {
            backend: StoreBackendKind::Local,
            local: None,
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn multi_char_delimiter_rejected() {
        let mut config = valid_config();
        config.source.delimiter = "||".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_column_names_rejected() {
        let mut config = valid_config();
        config.source.columns[1].name = "last_name".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bits_out_of_range_rejected() {
        let mut config = valid_config();
        config.signature.bits = 17;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_source_is_fine_until_requested() {
        let mut config = valid_config();
        config.source = SourceSection::default();
        config.validate().unwrap();
        assert!(config.source_runtime().is_err());
    }
}
