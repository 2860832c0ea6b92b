use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ColumnSpec, TranslationMode};
use crate::reconcile::ReconcileStats;
use crate::translation::align::{AlignStats, TermMap};

#[derive(Debug, Clone, Serialize)]
pub struct FailedTerm {
    pub term: String,
    pub reason: String,
}

/// Per-column outcome counts; failed terms are listed so they can be re-run.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnReport {
    pub source: String,
    pub target: String,
    pub mode: TranslationMode,
    pub unique_terms: usize,
    pub calls: usize,
    #[serde(flatten)]
    pub outcomes: AlignStats,
    pub failed_terms: Vec<FailedTerm>,
}

impl ColumnReport {
    pub fn new(
        spec: &ColumnSpec,
        unique_terms: usize,
        calls: usize,
        outcomes: AlignStats,
        map: &TermMap,
    ) -> Self {
        Self {
            source: spec.source.clone(),
            target: spec.target.clone(),
            mode: spec.mode,
            unique_terms,
            calls,
            outcomes,
            failed_terms: map
                .failures()
                .map(|(term, reason)| FailedTerm {
                    term: term.to_string(),
                    reason: reason.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub columns: Vec<ColumnReport>,
    pub reconcile: ReconcileStats,
}

impl RunReport {
    /// True when every term got a value and every planned batch was applied.
    pub fn is_clean(&self) -> bool {
        self.columns.iter().all(|c| c.outcomes.failed == 0 && c.outcomes.echoed == 0)
            && (self.dry_run || self.reconcile.batches_applied == self.reconcile.batches)
    }
}
