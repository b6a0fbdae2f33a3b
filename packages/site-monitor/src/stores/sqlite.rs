//! SQLite storage implementation.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Local development
//! - Single-server deployments
//! - Surviving restarts (jobs, fingerprints and artifacts are durable)

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{MonitorError, Result};
use crate::traits::store::{JobStore, PageStore};
use crate::types::job::{Job, JobId, JobStatus};
use crate::types::page::Page;

const JOB_COLUMNS: &str = "id, url, status, content_hash, previous_content_hash, llm_text_content, \
     progress_percentage, progress_message, error_detail, monitoring_enabled, content_changed, \
     created_at, updated_at, last_crawled, last_monitored, crawl_started_at";

const PAGE_COLUMNS: &str = "job_id, url, title, description, content, content_hash, depth, \
     first_seen, last_seen, missed_cycles, etag, last_modified, links";

/// SQLite-based job and page store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://site_monitor.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, 5).await
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Every pooled connection to `:memory:` opens its own database, so the
    /// pool is pinned to a single connection.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(MonitorError::persistence)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                content_hash TEXT,
                previous_content_hash TEXT,
                llm_text_content TEXT,
                progress_percentage INTEGER NOT NULL DEFAULT 0,
                progress_message TEXT NOT NULL DEFAULT '',
                error_detail TEXT,
                monitoring_enabled BOOLEAN NOT NULL DEFAULT 1,
                content_changed BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_crawled TEXT,
                last_monitored TEXT,
                crawl_started_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pages (
                job_id TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT,
                description TEXT,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                depth INTEGER NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                missed_cycles INTEGER NOT NULL DEFAULT 0,
                etag TEXT,
                last_modified TEXT,
                links TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (job_id, url)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    // fixed-width so text ordering matches time ordering
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MonitorError::Persistence(format!("Invalid date {:?}: {}", value, e)))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn parse_job_id(value: &str) -> Result<JobId> {
    Uuid::parse_str(value)
        .map(JobId::from_uuid)
        .map_err(|e| MonitorError::Persistence(format!("Invalid job id {:?}: {}", value, e)))
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    url: String,
    status: String,
    content_hash: Option<String>,
    previous_content_hash: Option<String>,
    llm_text_content: Option<String>,
    progress_percentage: i64,
    progress_message: String,
    error_detail: Option<String>,
    monitoring_enabled: bool,
    content_changed: bool,
    created_at: String,
    updated_at: String,
    last_crawled: Option<String>,
    last_monitored: Option<String>,
    crawl_started_at: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            id: parse_job_id(&self.id)?,
            url: self.url,
            status: self.status.parse()?,
            content_hash: self.content_hash,
            previous_content_hash: self.previous_content_hash,
            llm_text_content: self.llm_text_content,
            progress_percentage: self.progress_percentage.clamp(0, 100) as u8,
            progress_message: self.progress_message,
            error_detail: self.error_detail,
            monitoring_enabled: self.monitoring_enabled,
            content_changed: self.content_changed,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            last_crawled: parse_optional_timestamp(self.last_crawled)?,
            last_monitored: parse_optional_timestamp(self.last_monitored)?,
            crawl_started_at: parse_optional_timestamp(self.crawl_started_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct PageRow {
    job_id: String,
    url: String,
    title: Option<String>,
    description: Option<String>,
    content: String,
    content_hash: String,
    depth: i64,
    first_seen: String,
    last_seen: String,
    missed_cycles: i64,
    etag: Option<String>,
    last_modified: Option<String>,
    /// JSON array of URLs
    links: String,
}

impl PageRow {
    fn into_page(self) -> Result<Page> {
        Ok(Page {
            job_id: parse_job_id(&self.job_id)?,
            url: self.url.clone(),
            title: self.title,
            description: self.description,
            content: self.content,
            content_hash: self.content_hash,
            depth: self.depth.max(0) as usize,
            first_seen: parse_timestamp(&self.first_seen)?,
            last_seen: parse_timestamp(&self.last_seen)?,
            missed_cycles: self.missed_cycles.max(0) as u32,
            etag: self.etag,
            last_modified: self.last_modified,
            links: serde_json::from_str(&self.links).map_err(|e| {
                MonitorError::Persistence(format!("Invalid links for {}: {}", self.url, e))
            })?,
        })
    }
}

fn collect_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>> {
    rows.into_iter().map(JobRow::into_job).collect()
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO jobs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            JOB_COLUMNS
        ))
        .bind(job.id.to_string())
        .bind(&job.url)
        .bind(job.status.as_str())
        .bind(&job.content_hash)
        .bind(&job.previous_content_hash)
        .bind(&job.llm_text_content)
        .bind(job.progress_percentage as i64)
        .bind(&job.progress_message)
        .bind(&job.error_detail)
        .bind(job.monitoring_enabled)
        .bind(job.content_changed)
        .bind(timestamp(&job.created_at))
        .bind(timestamp(&job.updated_at))
        .bind(job.last_crawled.as_ref().map(timestamp))
        .bind(job.last_monitored.as_ref().map(timestamp))
        .bind(job.crawl_started_at.as_ref().map(timestamp))
        .execute(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_job_by_url(&self, url: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE url = ?",
            JOB_COLUMNS
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                url = ?,
                status = ?,
                content_hash = ?,
                previous_content_hash = ?,
                llm_text_content = ?,
                progress_percentage = ?,
                progress_message = ?,
                error_detail = ?,
                content_changed = ?,
                updated_at = ?,
                last_crawled = ?,
                crawl_started_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.url)
        .bind(job.status.as_str())
        .bind(&job.content_hash)
        .bind(&job.previous_content_hash)
        .bind(&job.llm_text_content)
        .bind(job.progress_percentage as i64)
        .bind(&job.progress_message)
        .bind(&job.error_detail)
        .bind(job.content_changed)
        .bind(timestamp(&job.updated_at))
        .bind(job.last_crawled.as_ref().map(timestamp))
        .bind(job.crawl_started_at.as_ref().map(timestamp))
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        if result.rows_affected() == 0 {
            return Err(MonitorError::JobNotFound(job.id));
        }
        Ok(())
    }

    async fn set_monitoring_enabled(
        &self,
        id: JobId,
        enabled: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET monitoring_enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(timestamp(&at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(MonitorError::persistence)?;

        if result.rows_affected() == 0 {
            return Err(MonitorError::JobNotFound(id));
        }
        Ok(())
    }

    async fn stamp_last_monitored(&self, id: JobId, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET last_monitored = ? WHERE id = ?")
            .bind(timestamp(&at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(MonitorError::persistence)?;

        if result.rows_affected() == 0 {
            return Err(MonitorError::JobNotFound(id));
        }
        Ok(())
    }

    async fn delete_job(&self, id: JobId) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(MonitorError::persistence)?;

        sqlx::query("DELETE FROM pages WHERE job_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(MonitorError::persistence)?;

        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(MonitorError::persistence)?;

        tx.commit().await.map_err(MonitorError::persistence)
    }

    async fn list_jobs(&self, offset: usize, limit: usize) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            JOB_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        collect_jobs(rows)
    }

    async fn find_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE status = ? ORDER BY id",
            JOB_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        collect_jobs(rows)
    }

    async fn find_monitoring_candidates(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE monitoring_enabled = 1 AND status IN ('completed', 'error') ORDER BY id",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        collect_jobs(rows)
    }
}

#[async_trait]
impl PageStore for SqliteStore {
    async fn get_pages(&self, job_id: JobId) -> Result<Vec<Page>> {
        let rows = sqlx::query_as::<_, PageRow>(&format!(
            "SELECT {} FROM pages WHERE job_id = ? ORDER BY url",
            PAGE_COLUMNS
        ))
        .bind(job_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(MonitorError::persistence)?;

        rows.into_iter().map(PageRow::into_page).collect()
    }

    async fn commit_crawl(&self, job: &Job, pages: &[Page], evicted_urls: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(MonitorError::persistence)?;
        let job_id = job.id.to_string();

        for url in evicted_urls {
            sqlx::query("DELETE FROM pages WHERE job_id = ? AND url = ?")
                .bind(&job_id)
                .bind(url)
                .execute(&mut *tx)
                .await
                .map_err(MonitorError::persistence)?;
        }

        for page in pages {
            sqlx::query(
                r#"
                INSERT INTO pages (job_id, url, title, description, content, content_hash, depth, first_seen, last_seen, missed_cycles, etag, last_modified, links)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(job_id, url) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    content = excluded.content,
                    content_hash = excluded.content_hash,
                    depth = excluded.depth,
                    first_seen = excluded.first_seen,
                    last_seen = excluded.last_seen,
                    missed_cycles = excluded.missed_cycles,
                    etag = excluded.etag,
                    last_modified = excluded.last_modified,
                    links = excluded.links
                "#,
            )
            .bind(&job_id)
            .bind(&page.url)
            .bind(&page.title)
            .bind(&page.description)
            .bind(&page.content)
            .bind(&page.content_hash)
            .bind(page.depth as i64)
            .bind(timestamp(&page.first_seen))
            .bind(timestamp(&page.last_seen))
            .bind(page.missed_cycles as i64)
            .bind(&page.etag)
            .bind(&page.last_modified)
            .bind(serde_json::to_string(&page.links).map_err(MonitorError::persistence)?)
            .execute(&mut *tx)
            .await
            .map_err(MonitorError::persistence)?;
        }

        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?,
                content_hash = ?,
                previous_content_hash = ?,
                llm_text_content = ?,
                progress_percentage = ?,
                progress_message = ?,
                error_detail = ?,
                content_changed = ?,
                updated_at = ?,
                last_crawled = ?,
                crawl_started_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(&job.content_hash)
        .bind(&job.previous_content_hash)
        .bind(&job.llm_text_content)
        .bind(job.progress_percentage as i64)
        .bind(&job.progress_message)
        .bind(&job.error_detail)
        .bind(job.content_changed)
        .bind(timestamp(&job.updated_at))
        .bind(job.last_crawled.as_ref().map(timestamp))
        .bind(job.crawl_started_at.as_ref().map(timestamp))
        .bind(&job_id)
        .execute(&mut *tx)
        .await
        .map_err(MonitorError::persistence)?;

        if result.rows_affected() == 0 {
            // dropping the transaction rolls it back
            return Err(MonitorError::JobNotFound(job.id));
        }

        tx.commit().await.map_err(MonitorError::persistence)
    }
}
