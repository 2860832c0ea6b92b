//! Normalize mixed-language columns of a materials-science table into English.
//!
//! Raw column values are deduplicated, sent to a text-generation capability in
//! bounded, concurrent chunks, aligned back by correlation key, and written to
//! a staging table with idempotent batched updates.
pub mod config;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod logging;
pub mod translation;

pub mod util {
    pub mod db;
    pub mod env;
}

pub use config::{ColumnSpec, PipelineConfig, Settings, TranslationMode};
pub use pipeline::Pipeline;
pub use reconcile::{RawRecord, StagingStore, UpdateRecord};
pub use report::RunReport;
pub use translation::capability::TranslationCapability;
