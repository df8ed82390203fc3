// src/store/postgres.rs

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::data_model::{Record, UnitId};
use crate::error::{PipelineError, Result};
use crate::store::RecordStore;

// 15 binds per row keeps each statement well under the 65535 parameter cap.
const INSERT_CHUNK_SIZE: usize = 500;

const RECORD_COLUMNS: &str = "n, mqtt, invid, unit_guid, msg_id, text, context, class, level, \
                              area, addr, block, type, bit, invert_bit";

/// Record store backed by PostgreSQL.
///
/// Uses two tables: `files` holds processed file identifiers and `data` holds
/// the records, with a serial `id` that fixes insertion order.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Opens a pool against `url`. A failure here is fatal for startup.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| PipelineError::StoreUnavailable(e.to_string()))?;

        info!(max_connections, "Connected to PostgreSQL");
        Ok(PgStore { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Creates the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                processed_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS data (
                id BIGSERIAL PRIMARY KEY,
                n BIGINT NOT NULL,
                mqtt BYTEA NOT NULL,
                invid TEXT NOT NULL,
                unit_guid UUID NOT NULL,
                msg_id TEXT NOT NULL,
                text TEXT NOT NULL,
                context BYTEA NOT NULL,
                class TEXT NOT NULL,
                level BIGINT NOT NULL,
                area TEXT NOT NULL,
                addr TEXT NOT NULL,
                block TEXT NOT NULL,
                type TEXT NOT NULL,
                bit BIGINT NOT NULL,
                invert_bit BIGINT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS data_unit_guid_idx ON data (unit_guid, id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| PipelineError::StoreUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn record_from_row(row: &PgRow) -> std::result::Result<Record, sqlx::Error> {
    let unit: Uuid = row.try_get("unit_guid")?;
    Ok(Record {
        n: row.try_get("n")?,
        mqtt: row.try_get("mqtt")?,
        invid: row.try_get("invid")?,
        unit_guid: UnitId::new(unit),
        msg_id: row.try_get("msg_id")?,
        text: row.try_get("text")?,
        context: row.try_get("context")?,
        class: row.try_get("class")?,
        level: row.try_get("level")?,
        area: row.try_get("area")?,
        addr: row.try_get("addr")?,
        block: row.try_get("block")?,
        kind: row.try_get("type")?,
        bit: row.try_get("bit")?,
        invert_bit: row.try_get("invert_bit")?,
    })
}

fn to_sql_count(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| PipelineError::StoreError(format!("Row count {} out of range", value)))
}

#[async_trait]
impl RecordStore for PgStore {
    fn name(&self) -> &'static str {
        "PgStore"
    }

    async fn load_processed_file_ids(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT path FROM files")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreUnavailable(e.to_string()))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("path").map_err(PipelineError::from))
            .collect()
    }

    async fn mark_processed(&self, file_id: &str) -> Result<()> {
        sqlx::query("INSERT INTO files (path) VALUES ($1) ON CONFLICT (path) DO NOTHING")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(name = "pg_insert_batch", skip_all, fields(rows = records.len()))]
    async fn insert_batch(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO data ({}) ", RECORD_COLUMNS));

            query_builder.push_values(chunk.iter(), |mut b, record| {
                b.push_bind(record.n)
                    .push_bind(&record.mqtt)
                    .push_bind(&record.invid)
                    .push_bind(*record.unit_guid.as_uuid())
                    .push_bind(&record.msg_id)
                    .push_bind(&record.text)
                    .push_bind(&record.context)
                    .push_bind(&record.class)
                    .push_bind(record.level)
                    .push_bind(&record.area)
                    .push_bind(&record.addr)
                    .push_bind(&record.block)
                    .push_bind(&record.kind)
                    .push_bind(record.bit)
                    .push_bind(record.invert_bit);
            });

            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!("Committed record batch");
        Ok(())
    }

    async fn query_by_unit(
        &self,
        unit: &UnitId,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM data WHERE unit_guid = ", RECORD_COLUMNS));
        query_builder.push_bind(*unit.as_uuid());
        query_builder.push(" ORDER BY id");
        if let Some(limit) = limit {
            query_builder.push(" LIMIT ").push_bind(to_sql_count(limit)?);
        }
        query_builder.push(" OFFSET ").push_bind(to_sql_count(offset)?);

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| record_from_row(row).map_err(PipelineError::from))
            .collect()
    }
}
