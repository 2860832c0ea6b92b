//! The run: translate each configured column in turn, then reconcile.
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{ColumnSpec, PipelineConfig, TranslationMode};
use crate::reconcile::{apply_updates, build_updates, RawRecord, StagingStore};
use crate::report::{ColumnReport, RunReport};
use crate::translation::align::TermMap;
use crate::translation::capability::TranslationCapability;
use crate::translation::dedup::unique_terms;
use crate::translation::limiter::ConcurrencyLimiter;
use crate::translation::{translate_chunks, translate_single_terms};

pub struct Pipeline<'a> {
    capability: &'a dyn TranslationCapability,
    store: &'a dyn StagingStore,
    config: &'a PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        capability: &'a dyn TranslationCapability,
        store: &'a dyn StagingStore,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            capability,
            store,
            config,
        }
    }

    /// Build the term map of one column.
    #[instrument(skip(self, records), fields(column = %spec.source, mode = ?spec.mode))]
    pub async fn translate_column(
        &self,
        spec: &ColumnSpec,
        records: &[RawRecord],
    ) -> (TermMap, ColumnReport) {
        let terms = unique_terms(
            records
                .iter()
                .map(|r| r.raw_fields.get(&spec.source).map(String::as_str)),
        );
        info!(rows = records.len(), unique_terms = terms.len(), "column deduplicated");

        let limiter = ConcurrencyLimiter::new(self.config.max_concurrency);
        let retry = &self.config.retry;
        let (map, stats, calls) = match spec.mode {
            TranslationMode::Batch => {
                translate_chunks(
                    self.capability,
                    &limiter,
                    retry,
                    &spec.source,
                    &terms,
                    self.config.chunk_size,
                )
                .await
            }
            TranslationMode::Single => {
                translate_single_terms(self.capability, &limiter, retry, &spec.source, &terms).await
            }
        };
        if stats.failed > 0 || stats.echoed > 0 {
            warn!(
                translated = stats.translated,
                echoed = stats.echoed,
                failed = stats.failed,
                "column finished with degraded terms"
            );
        } else {
            info!(translated = stats.translated, "column finished");
        }
        let report = ColumnReport::new(spec, terms.len(), calls, stats, &map);
        (map, report)
    }

    /// Full run over a snapshot of raw records. Columns are processed one
    /// after another; the staging table is only touched after all of them.
    pub async fn run(&self, records: &[RawRecord]) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, rows = records.len(), columns = self.config.columns.len(), "pipeline start");

        self.config.validate()?;
        self.capability
            .health_check()
            .await
            .context("translation capability unreachable")?;

        let targets: Vec<String> = self.config.columns.iter().map(|c| c.target.clone()).collect();
        if self.config.seed_staging && !self.config.dry_run {
            let seeded = self
                .store
                .prepare(&targets)
                .await
                .context("preparing staging table")?;
            info!(seeded, "staging table prepared");
        }

        let mut maps: Vec<(ColumnSpec, TermMap)> = Vec::with_capacity(self.config.columns.len());
        let mut column_reports = Vec::with_capacity(self.config.columns.len());
        for spec in &self.config.columns {
            let (map, report) = self.translate_column(spec, records).await;
            maps.push((spec.clone(), map));
            column_reports.push(report);
        }

        let (updates, skipped) = build_updates(records, &maps);
        info!(update_records = updates.len(), skipped_rows = skipped, "reconciliation planned");

        let mut reconcile = apply_updates(
            self.store,
            &targets,
            &updates,
            self.config.update_batch_size,
            self.config.dry_run,
        )
        .await?;
        reconcile.rows_scanned = records.len();
        reconcile.skipped_rows = skipped;

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.config.dry_run,
            columns: column_reports,
            reconcile,
        };
        info!(
            %run_id,
            clean = report.is_clean(),
            rows_affected = report.reconcile.rows_affected,
            "pipeline finished"
        );
        Ok(report)
    }
}
