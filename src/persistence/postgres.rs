//! PostgreSQL implementation of the persistence layer.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AutomationStore, CatalogueStore, JobFilter, JobStore, JobUpdate, SnapshotStore};
use crate::domain::{
    Automation, BackfillJob, ChunkKey, CrawlerSource, DedupKey, JobId, JobKind, JobLog,
    JobStatus, LogLevel, NormalizedPrice, SourceAuth, TypeMapping, ZoneMapping,
};
use crate::error::ServiceError;

/// Default page size for job and log listings.
const DEFAULT_PAGE: i64 = 50;

/// PostgreSQL-backed store using `sqlx::PgPool`. Implements every store
/// trait; one instance is shared across the manager, executor, and
/// scheduler.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err<E: std::fmt::Display>(e: E) -> ServiceError {
    ServiceError::Store(e.to_string())
}

/// Splits a [`JobKind`] into its `job_type` discriminator and `config`
/// JSON payload, the storage representation.
fn kind_to_columns(kind: &JobKind) -> Result<(&'static str, serde_json::Value), ServiceError> {
    let tagged = serde_json::to_value(kind).map_err(store_err)?;
    let config = tagged
        .get("config")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    Ok((kind.kind_str(), config))
}

/// Rebuilds a [`JobKind`] from its storage representation.
fn kind_from_columns(job_type: &str, config: serde_json::Value) -> Result<JobKind, ServiceError> {
    serde_json::from_value(serde_json::json!({
        "job_type": job_type,
        "config": config,
    }))
    .map_err(store_err)
}

type JobRow = (
    Uuid,
    Uuid,
    String,
    serde_json::Value,
    String,
    Option<NaiveDate>,
    Option<String>,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

const JOB_COLUMNS: &str = "id, source_id, job_type, config, status, cursor_day, \
     cursor_product_type, created_by, created_at, updated_at, started_at, finished_at";

fn job_from_row(row: JobRow) -> Result<BackfillJob, ServiceError> {
    let (
        id,
        source_id,
        job_type,
        config,
        status,
        cursor_day,
        cursor_product_type,
        created_by,
        created_at,
        updated_at,
        started_at,
        finished_at,
    ) = row;

    Ok(BackfillJob {
        id: JobId::from_uuid(id),
        source_id,
        kind: kind_from_columns(&job_type, config)?,
        status: status.parse::<JobStatus>().map_err(ServiceError::Store)?,
        progress_cursor: cursor_day.map(|day| ChunkKey {
            day,
            product_type: cursor_product_type,
        }),
        created_by,
        created_at,
        updated_at,
        started_at,
        finished_at,
    })
}

#[async_trait]
impl JobStore for PostgresStore {
    async fn insert_job(&self, job: &BackfillJob) -> Result<(), ServiceError> {
        let (job_type, config) = kind_to_columns(&job.kind)?;
        sqlx::query(
            "INSERT INTO backfill_jobs \
             (id, source_id, job_type, config, status, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(job.id.as_uuid())
        .bind(job.source_id)
        .bind(job_type)
        .bind(&config)
        .bind(job.status.as_str())
        .bind(&job.created_by)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<BackfillJob>, ServiceError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM backfill_jobs WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(job_from_row).transpose()
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<BackfillJob>, ServiceError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM backfill_jobs \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR source_id = $2) \
               AND ($3::text IS NULL OR job_type = $3) \
             ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(filter.status.map(JobStatus::as_str))
        .bind(filter.source_id)
        .bind(filter.job_type.as_deref())
        .bind(filter.limit.unwrap_or(DEFAULT_PAGE))
        .bind(filter.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(job_from_row).collect()
    }

    async fn update_job(&self, id: JobId, update: &JobUpdate) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE backfill_jobs SET \
               status = COALESCE($2, status), \
               started_at = COALESCE(started_at, $3), \
               finished_at = COALESCE($4, finished_at), \
               updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(update.status.map(JobStatus::as_str))
        .bind(update.started_at)
        .bind(update.finished_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::JobNotFound(id));
        }
        Ok(())
    }

    async fn update_cursor(&self, id: JobId, cursor: &ChunkKey) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE backfill_jobs SET \
               cursor_day = $2, cursor_product_type = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(cursor.day)
        .bind(cursor.product_type.as_deref())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::JobNotFound(id));
        }
        Ok(())
    }

    async fn delete_job(&self, id: JobId) -> Result<(), ServiceError> {
        // Logs go with the job via ON DELETE CASCADE.
        sqlx::query("DELETE FROM backfill_jobs WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn append_log(
        &self,
        id: JobId,
        level: LogLevel,
        message: &str,
        meta: Option<serde_json::Value>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "INSERT INTO backfill_job_logs (job_id, level, message, meta) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id.as_uuid())
        .bind(level.as_str())
        .bind(message)
        .bind(meta)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn list_logs(
        &self,
        id: JobId,
        level: Option<LogLevel>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JobLog>, ServiceError> {
        let rows = sqlx::query_as::<
            _,
            (
                i64,
                Uuid,
                String,
                String,
                Option<serde_json::Value>,
                DateTime<Utc>,
            ),
        >(
            "SELECT id, job_id, level, message, meta, created_at FROM backfill_job_logs \
             WHERE job_id = $1 AND ($2::text IS NULL OR level = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
        )
        .bind(id.as_uuid())
        .bind(level.map(LogLevel::as_str))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|(id, job_id, level, message, meta, created_at)| {
                Ok(JobLog {
                    id,
                    job_id: JobId::from_uuid(job_id),
                    level: level.parse::<LogLevel>().map_err(ServiceError::Store)?,
                    message,
                    meta,
                    created_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SnapshotStore for PostgresStore {
    async fn backfilled_exists(&self, key: &DedupKey) -> Result<bool, ServiceError> {
        let day_start = key.day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let day_end = day_start + chrono::Duration::days(1);

        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS( \
               SELECT 1 FROM price_snapshots \
               WHERE is_backfilled \
                 AND retailer_code = $1 AND province_code = $2 AND product_type_code = $3 \
                 AND created_at >= $4 AND created_at < $5)",
        )
        .bind(&key.retailer_code)
        .bind(&key.province_code)
        .bind(&key.product_type_code)
        .bind(day_start)
        .bind(day_end)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn insert_backfilled(&self, records: &[NormalizedPrice]) -> Result<u64, ServiceError> {
        let mut written = 0u64;
        for record in records {
            // The partial unique index is the last line of defense when
            // two executors race on the same key.
            let result = sqlx::query(
                "INSERT INTO price_snapshots \
                 (retailer_code, province_code, product_type_code, buy_price, sell_price, \
                  unit, created_at, is_backfilled) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(&record.retailer_code)
            .bind(&record.province_code)
            .bind(&record.product_type_code)
            .bind(record.buy_price)
            .bind(record.sell_price)
            .bind(&record.unit)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
            written += result.rows_affected();
        }
        Ok(written)
    }

    async fn delete_live_before(&self, before: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result =
            sqlx::query("DELETE FROM price_snapshots WHERE NOT is_backfilled AND created_at < $1")
                .bind(before)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(result.rows_affected())
    }
}

type SourceRow = (
    Uuid,
    String,
    String,
    String,
    bool,
    serde_json::Value,
    String,
    serde_json::Value,
    i32,
    i64,
    i32,
);

#[async_trait]
impl CatalogueStore for PostgresStore {
    async fn get_source(&self, id: Uuid) -> Result<Option<CrawlerSource>, ServiceError> {
        let row = sqlx::query_as::<_, SourceRow>(
            "SELECT id, name, api_url, api_type, is_enabled, headers, auth_type, auth_config, \
                    rate_limit_per_minute, timeout_seconds, priority \
             FROM crawler_sources WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some((
            id,
            name,
            api_url,
            api_type,
            is_enabled,
            headers,
            auth_type,
            auth_config,
            rate_limit_per_minute,
            timeout_seconds,
            priority,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(CrawlerSource {
            id,
            name,
            api_url,
            api_type,
            is_enabled,
            headers: serde_json::from_value(headers).map_err(store_err)?,
            auth_type: auth_type
                .parse::<SourceAuth>()
                .map_err(ServiceError::Store)?,
            auth_config: serde_json::from_value(auth_config).map_err(store_err)?,
            rate_limit_per_minute: u32::try_from(rate_limit_per_minute.max(0))
                .unwrap_or(u32::MAX),
            timeout_seconds: u64::try_from(timeout_seconds.max(0)).unwrap_or(u64::MAX),
            priority,
        }))
    }

    async fn type_mapping(
        &self,
        source_id: Uuid,
        external_code: &str,
    ) -> Result<Option<TypeMapping>, ServiceError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, bool, DateTime<Utc>)>(
            "SELECT source_id, external_code, product_type_code, is_enabled, created_at \
             FROM type_mappings WHERE source_id = $1 AND external_code = $2",
        )
        .bind(source_id)
        .bind(external_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(
            |(source_id, external_code, product_type_code, is_enabled, created_at)| TypeMapping {
                source_id,
                external_code,
                product_type_code,
                is_enabled,
                created_at,
            },
        ))
    }

    async fn zone_mapping(
        &self,
        source_id: Uuid,
        external_code: &str,
    ) -> Result<Option<ZoneMapping>, ServiceError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, bool, DateTime<Utc>)>(
            "SELECT source_id, external_code, province_code, is_enabled, created_at \
             FROM zone_mappings WHERE source_id = $1 AND external_code = $2",
        )
        .bind(source_id)
        .bind(external_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(
            |(source_id, external_code, province_code, is_enabled, created_at)| ZoneMapping {
                source_id,
                external_code,
                province_code,
                is_enabled,
                created_at,
            },
        ))
    }
}

#[async_trait]
impl AutomationStore for PostgresStore {
    async fn list_active(&self) -> Result<Vec<Automation>, ServiceError> {
        let rows = sqlx::query_as::<
            _,
            (
                Uuid,
                String,
                String,
                String,
                bool,
                Option<DateTime<Utc>>,
                serde_json::Value,
                DateTime<Utc>,
                DateTime<Utc>,
            ),
        >(
            "SELECT id, name, automation_type, schedule, is_active, last_run_at, config, \
                    created_at, updated_at \
             FROM automations WHERE is_active ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    name,
                    automation_type,
                    schedule,
                    is_active,
                    last_run_at,
                    config,
                    created_at,
                    updated_at,
                )| Automation {
                    id,
                    name,
                    automation_type,
                    schedule,
                    is_active,
                    last_run_at,
                    config,
                    created_at,
                    updated_at,
                },
            )
            .collect())
    }

    async fn set_last_run(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), ServiceError> {
        sqlx::query("UPDATE automations SET last_run_at = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
