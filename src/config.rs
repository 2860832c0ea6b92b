//! Explicit configuration values handed to each component.
//!
//! The environment is read once, at the binary edge, through
//! [`Settings::from_env`]; everything below that works on plain values.
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::translation::retry::RetryPolicy;
use crate::util::env::{db_url, env_flag, env_opt, env_parse, env_req};

pub const DEFAULT_SOURCE_TABLE: &str = "raw_conductivity_samples";
pub const DEFAULT_STAGING_TABLE: &str = "tmp_translate_result";
pub const DEFAULT_ID_COLUMN: &str = "sample_id";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error("'{0}' is not a valid SQL identifier")]
    BadIdentifier(String),
    #[error("target column '{0}' is written by more than one source column")]
    DuplicateTarget(String),
}

/// Accepts `name` or `schema.name`, ASCII letters, digits and underscores.
pub fn validate_identifier(name: &str) -> Result<(), ConfigError> {
    let part_ok = |p: &str| {
        let mut chars = p.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|p| part_ok(p)) {
        Ok(())
    } else {
        Err(ConfigError::BadIdentifier(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    /// One call per unique term, answer is one sentence.
    Single,
    /// One call per chunk of unique terms, answer is a keyed JSON array.
    Batch,
}

impl FromStr for TranslationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "batch" => Ok(Self::Batch),
            other => Err(ConfigError::Invalid {
                key: "mode".into(),
                reason: format!("expected single|batch, got '{other}'"),
            }),
        }
    }
}

/// A raw column and where its normalized text goes.
///
/// Parsed from `source:mode` or `source:mode:target`; the target column
/// defaults to the source name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub source: String,
    pub target: String,
    pub mode: TranslationMode,
}

impl ColumnSpec {
    pub fn new(source: &str, mode: TranslationMode) -> Self {
        Self {
            source: source.to_string(),
            target: source.to_string(),
            mode,
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("material_source_and_purity", TranslationMode::Single),
            Self::new("synthesis_method", TranslationMode::Batch),
            Self::new("processing_route", TranslationMode::Batch),
        ]
    }
}

impl FromStr for ColumnSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let (source, mode, target) = match parts.as_slice() {
            [source, mode] => (*source, mode.parse()?, *source),
            [source, mode, target] => (*source, mode.parse()?, *target),
            _ => {
                return Err(ConfigError::Invalid {
                    key: "column".into(),
                    reason: format!("expected source:mode[:target], got '{s}'"),
                })
            }
        };
        validate_identifier(source)?;
        validate_identifier(target)?;
        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            mode,
        })
    }
}

#[derive(Clone)]
pub struct CapabilityConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    /// Connect/read timeout of the HTTP client itself.
    pub http_timeout: Duration,
}

impl fmt::Debug for CapabilityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub source_table: String,
    pub staging_table: String,
    pub id_column: String,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("database_url", &"***")
            .field("max_connections", &self.max_connections)
            .field("source_table", &self.source_table)
            .field("staging_table", &self.staging_table)
            .field("id_column", &self.id_column)
            .finish()
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier(&self.source_table)?;
        validate_identifier(&self.staging_table)?;
        validate_identifier(&self.id_column)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub columns: Vec<ColumnSpec>,
    pub chunk_size: NonZeroUsize,
    pub max_concurrency: NonZeroUsize,
    pub update_batch_size: NonZeroUsize,
    pub retry: RetryPolicy,
    pub dry_run: bool,
    /// Create and seed the staging table once the capability answered.
    pub seed_staging: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            columns: ColumnSpec::defaults(),
            chunk_size: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            max_concurrency: NonZeroUsize::new(3).unwrap_or(NonZeroUsize::MIN),
            update_batch_size: NonZeroUsize::new(1000).unwrap_or(NonZeroUsize::MIN),
            retry: RetryPolicy::default(),
            dry_run: false,
            seed_staging: false,
        }
    }
}

fn non_zero(key: &str, value: usize) -> Result<NonZeroUsize, ConfigError> {
    NonZeroUsize::new(value).ok_or_else(|| ConfigError::Invalid {
        key: key.to_string(),
        reason: "must be greater than zero".into(),
    })
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let columns = match env_opt("TRANSLATE_COLUMNS") {
            Some(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<ColumnSpec>, _>>()?,
            None => defaults.columns,
        };
        let retry = RetryPolicy {
            max_attempts: env_parse("TRANSLATE_MAX_ATTEMPTS", defaults.retry.max_attempts).max(1),
            base_delay: Duration::from_millis(env_parse("TRANSLATE_BACKOFF_MS", 1000u64)),
            max_delay: Duration::from_millis(env_parse("TRANSLATE_MAX_BACKOFF_MS", 20_000u64)),
            call_timeout: Duration::from_secs(env_parse("TRANSLATE_TIMEOUT_SECS", 60u64)),
        };
        let cfg = Self {
            columns,
            chunk_size: non_zero(
                "TRANSLATE_CHUNK_SIZE",
                env_parse("TRANSLATE_CHUNK_SIZE", defaults.chunk_size.get()),
            )?,
            max_concurrency: non_zero(
                "TRANSLATE_MAX_CONCURRENCY",
                env_parse("TRANSLATE_MAX_CONCURRENCY", defaults.max_concurrency.get()),
            )?,
            update_batch_size: non_zero(
                "UPDATE_BATCH_SIZE",
                env_parse("UPDATE_BATCH_SIZE", defaults.update_batch_size.get()),
            )?,
            retry,
            dry_run: env_flag("TRANSLATE_DRY_RUN", false),
            seed_staging: env_flag("TRANSLATE_SEED_STAGING", false),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Each target column may be fed by one source column only.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::with_capacity(self.columns.len());
        for col in &self.columns {
            if !seen.insert(col.target.as_str()) {
                return Err(ConfigError::DuplicateTarget(col.target.clone()));
            }
        }
        Ok(())
    }

    /// Override from CLI flags; zero values are rejected.
    pub fn with_overrides(
        mut self,
        chunk_size: Option<usize>,
        max_concurrency: Option<usize>,
        update_batch_size: Option<usize>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = chunk_size {
            self.chunk_size = non_zero("--chunk-size", v)?;
        }
        if let Some(v) = max_concurrency {
            self.max_concurrency = non_zero("--concurrency", v)?;
        }
        if let Some(v) = update_batch_size {
            self.update_batch_size = non_zero("--batch-size", v)?;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub capability: CapabilityConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = |key: &str| env_req(key).map_err(|_| ConfigError::Missing(key.to_string()));
        let capability = CapabilityConfig {
            base_url: env_opt("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: required("OPENAI_API_KEY")?,
            model: required("MODEL_NAME")?,
            temperature: env_parse("LLM_TEMPERATURE", 0.0f32),
            http_timeout: Duration::from_secs(env_parse("LLM_HTTP_TIMEOUT_SECS", 90u64)),
        };
        let store = StoreConfig {
            database_url: db_url().map_err(|_| ConfigError::Missing("DATABASE_URL".into()))?,
            max_connections: env_parse("DB_MAX_CONNECTIONS", 5u32).max(1),
            source_table: env_opt("SOURCE_TABLE").unwrap_or_else(|| DEFAULT_SOURCE_TABLE.into()),
            staging_table: env_opt("STAGING_TABLE").unwrap_or_else(|| DEFAULT_STAGING_TABLE.into()),
            id_column: env_opt("ID_COLUMN").unwrap_or_else(|| DEFAULT_ID_COLUMN.into()),
        };
        store.validate()?;
        Ok(Self {
            capability,
            store,
            pipeline: PipelineConfig::from_env()?,
        })
    }
}
