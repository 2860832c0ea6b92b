use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Postgres, QueryBuilder, Row,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::reconcile::{RawRecord, StagingStore, UpdateRecord};

/// Postgres caps bind parameters per statement at 65535.
const MAX_BIND_PARAMS: usize = 65_535;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options =
            PgConnectOptions::from_str(database_url).context("parsing database URL")?;
        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .context("connecting to database")?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .context("database ping")?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Snapshot `id_column` plus the raw text columns. NULL cells read as "".
    #[instrument(skip(self))]
    pub async fn fetch_raw_records(
        &self,
        table: &str,
        id_column: &str,
        columns: &[String],
    ) -> Result<Vec<RawRecord>> {
        let mut sql = format!("SELECT {}::text AS id", quote_ident(id_column));
        for col in columns {
            sql.push_str(&format!(", {}::text", quote_ident(col)));
        }
        sql.push_str(&format!(" FROM {}", quote_ident(table)));

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("reading {table}"))?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Option<String> = row.try_get(0)?;
            let mut record = RawRecord::new(id.unwrap_or_default());
            for (i, col) in columns.iter().enumerate() {
                let v: Option<String> = row.try_get(i + 1)?;
                record = record.with_field(col.clone(), v.unwrap_or_default());
            }
            out.push(record);
        }
        info!(rows = out.len(), "raw records loaded");
        Ok(out)
    }

    /// Create the staging table if missing and make sure every target column exists.
    #[instrument(skip(self))]
    pub async fn ensure_staging_table(
        &self,
        table: &str,
        id_column: &str,
        targets: &[String],
    ) -> Result<()> {
        let table_q = quote_ident(table);
        sqlx::raw_sql(&format!(
            "CREATE TABLE IF NOT EXISTS {table_q} ({} TEXT PRIMARY KEY)",
            quote_ident(id_column)
        ))
        .execute(&self.pool)
        .await
        .with_context(|| format!("creating {table}"))?;
        for col in targets {
            sqlx::raw_sql(&format!(
                "ALTER TABLE {table_q} ADD COLUMN IF NOT EXISTS {} TEXT NULL",
                quote_ident(col)
            ))
            .execute(&self.pool)
            .await
            .with_context(|| format!("adding column {col} to {table}"))?;
        }
        Ok(())
    }

    /// Insert one staging row per source id that has none yet.
    #[instrument(skip(self))]
    pub async fn seed_staging(
        &self,
        staging_table: &str,
        source_table: &str,
        id_column: &str,
    ) -> Result<u64> {
        let id_q = quote_ident(id_column);
        let sql = format!(
            "INSERT INTO {staging} ({id_q}) \
             SELECT DISTINCT s.{id_q}::text FROM {source} s \
             WHERE s.{id_q} IS NOT NULL \
               AND NOT EXISTS (SELECT 1 FROM {staging} t WHERE t.{id_q}::text = s.{id_q}::text)",
            staging = quote_ident(staging_table),
            source = quote_ident(source_table),
        );
        let res = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .with_context(|| format!("seeding {staging_table} from {source_table}"))?;
        info!(inserted = res.rows_affected(), "staging rows seeded");
        Ok(res.rows_affected())
    }
}

/// Quote `name` or `schema.name` as Postgres identifiers.
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Staging table writer: one transaction per batch, one UPDATE ... FROM (VALUES ...)
/// statement per bind-parameter window.
#[derive(Clone)]
pub struct PgStaging {
    pub db: Db,
    pub table: String,
    pub id_column: String,
    /// Table whose ids seed the staging rows.
    pub source_table: String,
}

impl PgStaging {
    pub fn new(
        db: Db,
        table: impl Into<String>,
        id_column: impl Into<String>,
        source_table: impl Into<String>,
    ) -> Self {
        Self {
            db,
            table: table.into(),
            id_column: id_column.into(),
            source_table: source_table.into(),
        }
    }

    fn update_builder<'a>(
        &self,
        targets: &'a [String],
        rows: &'a [UpdateRecord],
    ) -> QueryBuilder<'a, Postgres> {
        let id_q = quote_ident(&self.id_column);
        let set_clause = targets
            .iter()
            .map(|c| {
                let q = quote_ident(c);
                format!("{q} = COALESCE(v.{q}, t.{q})")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let value_cols = std::iter::once(id_q.clone())
            .chain(targets.iter().map(|c| quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut qb: QueryBuilder<'a, Postgres> = QueryBuilder::new(format!(
            "UPDATE {} AS t SET {set_clause} FROM (",
            quote_ident(&self.table)
        ));
        qb.push_values(rows, |mut b, rec| {
            b.push_bind(rec.id.as_str());
            for col in targets {
                b.push_bind(rec.translated_fields.get(col).map(String::as_str));
            }
        });
        qb.push(format!(") AS v({value_cols}) WHERE t.{id_q}::text = v.{id_q}"));
        qb
    }
}

#[async_trait::async_trait]
impl StagingStore for PgStaging {
    async fn prepare(&self, targets: &[String]) -> Result<u64> {
        self.db
            .ensure_staging_table(&self.table, &self.id_column, targets)
            .await?;
        self.db
            .seed_staging(&self.table, &self.source_table, &self.id_column)
            .await
    }

    async fn apply_batch(&self, targets: &[String], batch: &[UpdateRecord]) -> Result<u64> {
        if batch.is_empty() || targets.is_empty() {
            return Ok(0);
        }
        let rows_per_statement = (MAX_BIND_PARAMS / (targets.len() + 1)).max(1);
        let mut tx = self.db.pool.begin().await?;
        let mut affected = 0u64;
        for rows in batch.chunks(rows_per_statement) {
            let mut qb = self.update_builder(targets, rows);
            let res = qb.build().persistent(false).execute(&mut *tx).await?;
            affected += res.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }
}
