//! Map raw rows through the term maps and write the staging table.
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::ColumnSpec;
use crate::translation::align::TermMap;

/// One source row; empty string means "no value".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: String,
    pub raw_fields: HashMap<String, String>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw_fields.insert(column.into(), value.into());
        self
    }

    pub fn field(&self, column: &str) -> &str {
        self.raw_fields.get(column).map(String::as_str).unwrap_or("")
    }
}

/// Target column -> normalized text, only for columns that resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateRecord {
    pub id: String,
    pub translated_fields: BTreeMap<String, String>,
}

/// Persistence seam for the staging table.
#[async_trait::async_trait]
pub trait StagingStore: Send + Sync {
    /// Make sure the table has every target column and one row per source id.
    /// Returns the number of rows inserted.
    async fn prepare(&self, targets: &[String]) -> anyhow::Result<u64>;

    /// Apply one batch inside a single transaction. `targets` lists every
    /// column the run may touch; fields absent from a record stay as they are.
    async fn apply_batch(&self, targets: &[String], batch: &[UpdateRecord]) -> anyhow::Result<u64>;
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("update batch {index} of {total} failed after {committed} committed batches: {source}")]
    Batch {
        index: usize,
        total: usize,
        committed: usize,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub rows_scanned: usize,
    pub update_records: usize,
    pub skipped_rows: usize,
    pub batches: usize,
    pub batches_applied: usize,
    pub rows_affected: u64,
}

/// Look every record up in the per-column term maps. Records that resolve
/// no column are dropped and counted as skipped.
pub fn build_updates(
    records: &[RawRecord],
    columns: &[(ColumnSpec, TermMap)],
) -> (Vec<UpdateRecord>, usize) {
    let mut updates = Vec::new();
    let mut skipped = 0usize;
    for record in records {
        let translated_fields: BTreeMap<String, String> = columns
            .iter()
            .filter_map(|(spec, map)| {
                map.value(record.field(&spec.source))
                    .map(|v| (spec.target.clone(), v.to_string()))
            })
            .collect();
        if translated_fields.is_empty() {
            skipped += 1;
        } else {
            updates.push(UpdateRecord {
                id: record.id.clone(),
                translated_fields,
            });
        }
    }
    (updates, skipped)
}

/// Apply `updates` in batches of at most `batch_size`, one transaction each.
/// A failing batch stops the run; earlier batches stay committed.
#[instrument(
    skip_all,
    fields(updates = updates.len(), batch_size = batch_size.get(), dry_run = dry_run)
)]
pub async fn apply_updates(
    store: &dyn StagingStore,
    targets: &[String],
    updates: &[UpdateRecord],
    batch_size: NonZeroUsize,
    dry_run: bool,
) -> Result<ReconcileStats, ReconcileError> {
    let total = updates.len().div_ceil(batch_size.get());
    let mut stats = ReconcileStats {
        update_records: updates.len(),
        batches: total,
        ..ReconcileStats::default()
    };
    if dry_run {
        info!(batches = total, "dry run; staging table left untouched");
        return Ok(stats);
    }
    for (index, batch) in updates.chunks(batch_size.get()).enumerate() {
        let affected = store
            .apply_batch(targets, batch)
            .await
            .map_err(|source| ReconcileError::Batch {
                index,
                total,
                committed: stats.batches_applied,
                source,
            })?;
        stats.batches_applied += 1;
        stats.rows_affected += affected;
        info!(batch = index + 1, total, rows = batch.len(), affected, "update batch committed");
    }
    Ok(stats)
}
