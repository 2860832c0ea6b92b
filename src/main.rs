use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use matnorm::config::{ColumnSpec, Settings};
use matnorm::translation::capability::TranslationCapability;
use matnorm::translation::openai::ChatCompletionsClient;
use matnorm::util::db::{Db, PgStaging};
use matnorm::util::env as env_util;
use matnorm::{Pipeline, StagingStore};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "matnorm", version, about = "Normalize materials-science columns into English")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Translate the configured columns and update the staging table
    Run {
        /// Column to translate as source:mode[:target] (repeatable; default from env)
        #[arg(long = "column")]
        columns: Vec<ColumnSpec>,
        /// Terms per batch request
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Maximum capability calls in flight
        #[arg(long)]
        concurrency: Option<usize>,
        /// Rows per update transaction
        #[arg(long)]
        batch_size: Option<usize>,
        /// Translate and plan updates without writing
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Create/seed the staging table before updating it
        #[arg(long, default_value_t = false)]
        seed_staging: bool,
        /// Write the JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Create the staging table if needed and insert one row per source id
    PrepareStaging,
    /// Validate configuration and probe the database and the capability
    Check,
}

const PREFLIGHT_KEYS: &[&str] = &[
    "OPENAI_BASE_URL",
    "MODEL_NAME",
    "OPENAI_API_KEY",
    "DATABASE_URL",
    "DB_HOST",
    "DB_NAME",
    "SOURCE_TABLE",
    "STAGING_TABLE",
    "TRANSLATE_CHUNK_SIZE",
    "TRANSLATE_MAX_CONCURRENCY",
    "UPDATE_BATCH_SIZE",
];

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    matnorm::logging::init_logging("matnorm=info")?;
    let cli = Cli::parse();

    env_util::preflight_check("matnorm", &["OPENAI_API_KEY", "MODEL_NAME"], PREFLIGHT_KEYS)?;
    let mut settings = Settings::from_env().context("loading settings")?;

    match cli.command {
        Commands::Run {
            columns,
            chunk_size,
            concurrency,
            batch_size,
            dry_run,
            seed_staging,
            report,
        } => {
            settings.pipeline = settings
                .pipeline
                .with_overrides(chunk_size, concurrency, batch_size)?;
            if !columns.is_empty() {
                settings.pipeline.columns = columns;
            }
            settings.pipeline.dry_run |= dry_run;
            settings.pipeline.seed_staging |= seed_staging;
            settings.pipeline.validate()?;
            run(settings, report).await
        }
        Commands::PrepareStaging => {
            let db = Db::connect(&settings.store.database_url, settings.store.max_connections)
                .await?;
            let targets: Vec<String> =
                settings.pipeline.columns.iter().map(|c| c.target.clone()).collect();
            staging_for(db, &settings).prepare(&targets).await?;
            Ok(())
        }
        Commands::Check => {
            let db = Db::connect(&settings.store.database_url, settings.store.max_connections)
                .await?;
            let sources: Vec<String> =
                settings.pipeline.columns.iter().map(|c| c.source.clone()).collect();
            // a zero-row select catches missing tables or columns
            let check_sql = format!(
                "SELECT {} FROM {} LIMIT 0",
                sources
                    .iter()
                    .chain(std::iter::once(&settings.store.id_column))
                    .map(|c| matnorm::util::db::quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", "),
                matnorm::util::db::quote_ident(&settings.store.source_table)
            );
            sqlx::query(&check_sql)
                .execute(&db.pool)
                .await
                .context("source table check")?;
            let client = ChatCompletionsClient::new(settings.capability.clone())?;
            client
                .health_check()
                .await
                .context("translation capability unreachable")?;
            info!(columns = sources.len(), "check passed");
            Ok(())
        }
    }
}

fn staging_for(db: Db, settings: &Settings) -> PgStaging {
    PgStaging::new(
        db,
        &settings.store.staging_table,
        &settings.store.id_column,
        &settings.store.source_table,
    )
}

async fn run(settings: Settings, report_path: Option<PathBuf>) -> Result<()> {
    info!(store = ?settings.store, capability = ?settings.capability, "starting run");
    let db = Db::connect(&settings.store.database_url, settings.store.max_connections).await?;
    let client = ChatCompletionsClient::new(settings.capability.clone())?;

    let sources: Vec<String> = settings.pipeline.columns.iter().map(|c| c.source.clone()).collect();
    let records = db
        .fetch_raw_records(&settings.store.source_table, &settings.store.id_column, &sources)
        .await?;

    // seeding happens inside the run, after the capability health check
    let staging = staging_for(db, &settings);
    let report = Pipeline::new(&client, &staging, &settings.pipeline)
        .run(&records)
        .await?;

    let json = serde_json::to_string_pretty(&report)?;
    if let Some(path) = report_path {
        std::fs::write(&path, &json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "run report written");
    }
    println!("{json}");
    if !report.is_clean() {
        warn!("run finished with degraded or failed terms; see failed_terms in the report");
    }
    Ok(())
}
