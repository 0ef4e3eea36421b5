//! Postgres job store.
//!
//! Every transition is a single conditional `UPDATE ... WHERE status = ...`,
//! so concurrent callers cannot both win. Claiming takes the oldest queued
//! row with `FOR UPDATE SKIP LOCKED`; the partial unique index on
//! `(website_id, keyword_key)` enforces one in-flight job per keyword.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::queue::{
    CancelOutcome, GenerationJob, JobInput, JobStatus, JobStore, NewJob, Stage,
};
use crate::types::{AppError, AppResult};

const JOB_COLUMNS: &str = "id, website_id, keyword_id, input, status, current_stage, progress, \
     cancel_requested, article_id, error, failed_stage, retry_of, retried_as, \
     created_at, started_at, stage_started_at, finished_at, updated_at";

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    website_id: Uuid,
    keyword_id: Option<Uuid>,
    input: Json<JobInput>,
    status: String,
    current_stage: Option<String>,
    progress: i16,
    cancel_requested: bool,
    article_id: Option<Uuid>,
    error: Option<String>,
    failed_stage: Option<String>,
    retry_of: Option<Uuid>,
    retried_as: Option<Uuid>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    stage_started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

fn parse_stage(value: Option<String>) -> AppResult<Option<Stage>> {
    value
        .map(|s| Stage::parse(&s).ok_or_else(|| AppError::Internal(format!("unknown stage '{}'", s))))
        .transpose()
}

impl TryFrom<JobRow> for GenerationJob {
    type Error = AppError;

    fn try_from(row: JobRow) -> AppResult<Self> {
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| AppError::Internal(format!("unknown job status '{}'", row.status)))?;

        Ok(GenerationJob {
            id: row.id,
            website_id: row.website_id,
            keyword_id: row.keyword_id,
            input: row.input.0,
            status,
            current_stage: parse_stage(row.current_stage)?,
            progress: row.progress.clamp(0, 100) as u8,
            cancel_requested: row.cancel_requested,
            article_id: row.article_id,
            error: row.error,
            failed_stage: parse_stage(row.failed_stage)?,
            retry_of: row.retry_of,
            retried_as: row.retried_as,
            created_at: row.created_at,
            started_at: row.started_at,
            stage_started_at: row.stage_started_at,
            finished_at: row.finished_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_job(row: Option<JobRow>) -> AppResult<Option<GenerationJob>> {
    row.map(GenerationJob::try_from).transpose()
}

/// Map the in-flight unique index violation onto `Conflict`.
fn conflict_or_db(err: sqlx::Error, keyword: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(format!(
            "keyword '{}' already has a job in flight",
            keyword
        )),
        _ => AppError::Database(err),
    }
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert<'e>(executor: impl PgExecutor<'e>, job: &GenerationJob) -> AppResult<GenerationJob> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            INSERT INTO generation_jobs
                (id, website_id, keyword_id, keyword_key, input, status, progress, retry_of, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $8)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job.id)
        .bind(job.website_id)
        .bind(job.keyword_id)
        .bind(job.input.keyword_key())
        .bind(Json(&job.input))
        .bind(JobStatus::Queued.as_str())
        .bind(job.retry_of)
        .bind(job.created_at)
        .fetch_one(executor)
        .await
        .map_err(|e| conflict_or_db(e, &job.input.keyword))?;

        GenerationJob::try_from(row)
    }

    /// Explain why a conditional update matched no row.
    async fn rejected(&self, job_id: Uuid, action: &str) -> AppError {
        match self.get(job_id).await {
            Ok(Some(job)) => AppError::InvalidTransition(format!(
                "cannot {} job {} while {}",
                action, job_id, job.status
            )),
            Ok(None) => AppError::NotFound(format!("job {}", job_id)),
            Err(e) => e,
        }
    }

    async fn update_one(&self, sql: &str, job_id: Uuid, action: &str) -> AppResult<GenerationJob> {
        let row = sqlx::query_as::<_, JobRow>(sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        match into_job(row)? {
            Some(job) => Ok(job),
            None => Err(self.rejected(job_id, action).await),
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(&self, job: NewJob) -> AppResult<GenerationJob> {
        let job = GenerationJob::new(job);
        let stored = Self::insert(&self.pool, &job).await?;
        tracing::info!(job_id = %stored.id, keyword = %stored.input.keyword, "Job enqueued");
        Ok(stored)
    }

    async fn claim_next(&self) -> AppResult<Option<GenerationJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            WITH next_job AS (
                SELECT id
                FROM generation_jobs
                WHERE status = 'queued'
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE generation_jobs
            SET
                status = 'processing',
                current_stage = $1,
                progress = 0,
                started_at = NOW(),
                stage_started_at = NOW(),
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_job) AND status = 'queued'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(Stage::first().as_str())
        .fetch_optional(&self.pool)
        .await?;

        into_job(row)
    }

    async fn record_progress(&self, job_id: Uuid, stage: Stage, percent: u8) -> AppResult<()> {
        if percent > 100 {
            return Err(AppError::InvalidRequest(format!(
                "progress {} is out of range",
                percent
            )));
        }
        let order: Vec<&str> = Stage::ALL.iter().map(|s| s.as_str()).collect();

        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET
                stage_started_at = CASE
                    WHEN current_stage IS DISTINCT FROM $2 THEN NOW()
                    ELSE stage_started_at
                END,
                current_stage = $2,
                progress = $3,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'processing'
              AND progress <= $3
              AND (current_stage IS NULL
                   OR array_position($4::text[], current_stage) <= array_position($4::text[], $2))
            "#,
        )
        .bind(job_id)
        .bind(stage.as_str())
        .bind(percent as i16)
        .bind(&order)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejected(job_id, "record progress for").await);
        }
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, article_id: Uuid) -> AppResult<GenerationJob> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE generation_jobs
            SET status = 'completed', current_stage = $3, progress = 100, article_id = $2,
                finished_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job_id)
        .bind(article_id)
        .bind(Stage::ALL[Stage::COUNT - 1].as_str())
        .fetch_optional(&self.pool)
        .await?;

        match into_job(row)? {
            Some(job) => Ok(job),
            None => Err(self.rejected(job_id, "complete").await),
        }
    }

    async fn fail(&self, job_id: Uuid, stage: Stage, error: &str) -> AppResult<GenerationJob> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE generation_jobs
            SET status = 'failed', failed_stage = $2, error = $3,
                finished_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job_id)
        .bind(stage.as_str())
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        match into_job(row)? {
            Some(job) => Ok(job),
            None => Err(self.rejected(job_id, "fail").await),
        }
    }

    async fn cancel(&self, job_id: Uuid) -> AppResult<(CancelOutcome, GenerationJob)> {
        // CASE arms read the row as it was before the update
        let job = self
            .update_one(
                &format!(
                    r#"
                    UPDATE generation_jobs
                    SET
                        status = CASE WHEN status = 'queued' THEN 'cancelled' ELSE status END,
                        cancel_requested = CASE WHEN status = 'processing' THEN TRUE ELSE cancel_requested END,
                        finished_at = CASE WHEN status = 'queued' THEN NOW() ELSE finished_at END,
                        updated_at = NOW()
                    WHERE id = $1 AND status IN ('queued', 'processing')
                    RETURNING {}
                    "#,
                    JOB_COLUMNS
                ),
                job_id,
                "cancel",
            )
            .await?;

        let outcome = if job.status == JobStatus::Cancelled {
            CancelOutcome::Cancelled
        } else {
            CancelOutcome::Requested
        };
        Ok((outcome, job))
    }

    async fn finish_cancel(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        self.update_one(
            &format!(
                r#"
                UPDATE generation_jobs
                SET status = 'cancelled', finished_at = NOW(), updated_at = NOW()
                WHERE id = $1 AND status = 'processing' AND cancel_requested
                RETURNING {}
                "#,
                JOB_COLUMNS
            ),
            job_id,
            "finish cancelling",
        )
        .await
    }

    async fn is_cancel_requested(&self, job_id: Uuid) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT cancel_requested FROM generation_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))
    }

    async fn retry(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM generation_jobs WHERE id = $1 FOR UPDATE",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut original = into_job(row)?
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;

        let replacement = original.spawn_retry(Utc::now())?;
        let stored = Self::insert(&mut *tx, &replacement).await?;

        sqlx::query("UPDATE generation_jobs SET retried_as = $2, updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .bind(stored.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn recover_interrupted(&self) -> AppResult<Vec<GenerationJob>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE generation_jobs
            SET
                status = CASE WHEN cancel_requested THEN 'cancelled' ELSE 'queued' END,
                current_stage = CASE WHEN cancel_requested THEN current_stage ELSE NULL END,
                progress = CASE WHEN cancel_requested THEN progress ELSE 0 END,
                started_at = CASE WHEN cancel_requested THEN started_at ELSE NULL END,
                stage_started_at = CASE WHEN cancel_requested THEN stage_started_at ELSE NULL END,
                finished_at = CASE WHEN cancel_requested THEN NOW() ELSE NULL END,
                updated_at = NOW()
            WHERE status = 'processing'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GenerationJob::try_from).collect()
    }

    async fn requeue_interrupted(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        self.update_one(
            &format!(
                r#"
                UPDATE generation_jobs
                SET
                    status = CASE WHEN cancel_requested THEN 'cancelled' ELSE 'queued' END,
                    current_stage = CASE WHEN cancel_requested THEN current_stage ELSE NULL END,
                    progress = CASE WHEN cancel_requested THEN progress ELSE 0 END,
                    started_at = CASE WHEN cancel_requested THEN started_at ELSE NULL END,
                    stage_started_at = CASE WHEN cancel_requested THEN stage_started_at ELSE NULL END,
                    finished_at = CASE WHEN cancel_requested THEN NOW() ELSE NULL END,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'processing'
                RETURNING {}
                "#,
                JOB_COLUMNS
            ),
            job_id,
            "requeue",
        )
        .await
    }

    async fn list_by_website(&self, website_id: Uuid) -> AppResult<Vec<GenerationJob>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM generation_jobs WHERE website_id = $1 ORDER BY created_at DESC",
            JOB_COLUMNS
        ))
        .bind(website_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GenerationJob::try_from).collect()
    }

    async fn get(&self, job_id: Uuid) -> AppResult<Option<GenerationJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM generation_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        into_job(row)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, stage: Option<&str>) -> JobRow {
        let now = Utc::now();
        JobRow {
            id: Uuid::new_v4(),
            website_id: Uuid::new_v4(),
            keyword_id: None,
            input: Json(JobInput::new("invoice templates")),
            status: status.to_string(),
            current_stage: stage.map(str::to_string),
            progress: 42,
            cancel_requested: false,
            article_id: None,
            error: None,
            failed_stage: None,
            retry_of: None,
            retried_as: None,
            created_at: now,
            started_at: Some(now),
            stage_started_at: Some(now),
            finished_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_conversion() {
        let job = GenerationJob::try_from(row("processing", Some("tone"))).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.current_stage, Some(Stage::Tone));
        assert_eq!(job.progress, 42);
        assert_eq!(job.input.keyword, "invoice templates");
    }

    #[test]
    fn test_row_conversion_rejects_unknown_values() {
        assert!(GenerationJob::try_from(row("paused", None)).is_err());
        assert!(GenerationJob::try_from(row("queued", Some("polish"))).is_err());
    }

    #[test]
    fn test_non_unique_errors_stay_database_errors() {
        let err = conflict_or_db(sqlx::Error::RowNotFound, "invoice templates");
        assert!(matches!(err, AppError::Database(_)));
    }

    // The tests below need a Postgres database and return early when
    // DATABASE_URL is unset. Each one works inside its own website row and
    // holds PG_LOCK, since claims would otherwise pick up each other's jobs.

    static PG_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    async fn test_store() -> Option<(PgJobStore, Uuid)> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let website_id = Uuid::new_v4();
        sqlx::query("INSERT INTO websites (id, name) VALUES ($1, 'Test site')")
            .bind(website_id)
            .execute(&pool)
            .await
            .unwrap();
        Some((PgJobStore::new(pool), website_id))
    }

    async fn cleanup(store: &PgJobStore, website_id: Uuid) {
        sqlx::query("DELETE FROM websites WHERE id = $1")
            .bind(website_id)
            .execute(&store.pool)
            .await
            .unwrap();
    }

    async fn enqueue(store: &PgJobStore, website_id: Uuid, keyword: &str) -> GenerationJob {
        store
            .enqueue(NewJob {
                website_id,
                keyword_id: None,
                input: JobInput::new(keyword),
                retry_of: None,
            })
            .await
            .unwrap()
    }

    /// Put one job into `processing` without going through `claim_next`.
    async fn mark_processing(store: &PgJobStore, job_id: Uuid) {
        sqlx::query(
            "UPDATE generation_jobs SET status = 'processing', current_stage = 'research', \
             started_at = NOW(), stage_started_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&store.pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_pg_concurrent_claims_are_exclusive() {
        let _guard = PG_LOCK.lock().await;
        let Some((store, website_id)) = test_store().await else {
            return;
        };
        enqueue(&store, website_id, "invoice templates").await;
        enqueue(&store, website_id, "receipt scanner").await;

        let (first, second) = tokio::join!(store.claim_next(), store.claim_next());
        let first = first.unwrap().expect("first claim");
        let second = second.unwrap().expect("second claim");
        assert_ne!(first.id, second.id);

        for job in [&first, &second] {
            assert_eq!(job.status, JobStatus::Processing);
            assert_eq!(job.current_stage, Some(Stage::Research));
            if job.website_id != website_id {
                store.requeue_interrupted(job.id).await.unwrap();
            }
        }

        cleanup(&store, website_id).await;
    }

    #[tokio::test]
    async fn test_pg_progress_never_regresses() {
        let _guard = PG_LOCK.lock().await;
        let Some((store, website_id)) = test_store().await else {
            return;
        };
        let job = enqueue(&store, website_id, "invoice templates").await;

        let err = store.record_progress(job.id, Stage::Outline, 14).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        mark_processing(&store, job.id).await;
        store.record_progress(job.id, Stage::Draft, 28).await.unwrap();

        let err = store.record_progress(job.id, Stage::Outline, 42).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        let err = store.record_progress(job.id, Stage::Draft, 14).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        store.record_progress(job.id, Stage::Tone, 42).await.unwrap();
        let stored = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stage, Some(Stage::Tone));
        assert_eq!(stored.progress, 42);

        let err = store.record_progress(Uuid::new_v4(), Stage::Tone, 42).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        cleanup(&store, website_id).await;
    }

    #[tokio::test]
    async fn test_pg_in_flight_keyword_conflicts() {
        let _guard = PG_LOCK.lock().await;
        let Some((store, website_id)) = test_store().await else {
            return;
        };
        enqueue(&store, website_id, "Invoice Templates").await;

        let err = store
            .enqueue(NewJob {
                website_id,
                keyword_id: None,
                input: JobInput::new("  invoice templates "),
                retry_of: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        cleanup(&store, website_id).await;
    }

    #[tokio::test]
    async fn test_pg_cancel_and_requeue() {
        let _guard = PG_LOCK.lock().await;
        let Some((store, website_id)) = test_store().await else {
            return;
        };
        let queued = enqueue(&store, website_id, "invoice templates").await;
        let (outcome, job) = store.cancel(queued.id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);
        assert_eq!(job.status, JobStatus::Cancelled);

        let running = enqueue(&store, website_id, "receipt scanner").await;
        mark_processing(&store, running.id).await;
        store.record_progress(running.id, Stage::Outline, 14).await.unwrap();
        let requeued = store.requeue_interrupted(running.id).await.unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert_eq!(requeued.progress, 0);
        assert_eq!(requeued.current_stage, None);

        mark_processing(&store, running.id).await;
        let (outcome, job) = store.cancel(running.id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Requested);
        assert!(job.cancel_requested);
        let settled = store.requeue_interrupted(running.id).await.unwrap();
        assert_eq!(settled.status, JobStatus::Cancelled);

        let err = store.requeue_interrupted(running.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        cleanup(&store, website_id).await;
    }

    #[tokio::test]
    async fn test_pg_retry_links_both_jobs() {
        let _guard = PG_LOCK.lock().await;
        let Some((store, website_id)) = test_store().await else {
            return;
        };
        let job = enqueue(&store, website_id, "invoice templates").await;
        mark_processing(&store, job.id).await;
        store.fail(job.id, Stage::Draft, "model refused").await.unwrap();

        let retry = store.retry(job.id).await.unwrap();
        assert_eq!(retry.status, JobStatus::Queued);
        assert_eq!(retry.retry_of, Some(job.id));
        let original = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(original.retried_as, Some(retry.id));

        let err = store.retry(job.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        cleanup(&store, website_id).await;
    }
}
