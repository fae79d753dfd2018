//! PostgreSQL persistence backend — the production target.
//!
//! Same schema shape as [`crate::sqlite`], translated to Postgres types
//! (`TIMESTAMPTZ`, `JSONB`, `BIGSERIAL`) and Postgres JSON functions
//! (`jsonb_array_elements` in place of SQLite's `json_each`).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use tracker_model::{LinkDirection, StatusHistoryEntry, StatusMapping, Task, TaskLink};
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::{MetricType, RunOutcomeCounters, TrackerStorage};

#[derive(Debug, Clone)]
pub struct PostgresStorageConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub create_tables_if_missing: bool,
}

impl Default for PostgresStorageConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost:5432/tracker".to_string(),
            max_connections: 20,
            connection_timeout: Duration::from_secs(30),
            create_tables_if_missing: true,
        }
    }
}

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(config: PostgresStorageConfig) -> Result<Self, StorageError> {
        info!(url = %mask_db_url(&config.database_url), "opening postgres storage");

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout)
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        let storage = Self { pool };
        if config.create_tables_if_missing {
            storage.migrate().await?;
        }
        Ok(storage)
    }

    pub async fn with_pool(pool: PgPool, create_tables_if_missing: bool) -> Result<Self, StorageError> {
        let storage = Self { pool };
        if create_tables_if_missing {
            storage.migrate().await?;
        }
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        debug!("running postgres storage migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                natural_id TEXT PRIMARY KEY,
                key TEXT NOT NULL UNIQUE,
                summary TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                author TEXT,
                assignee TEXT,
                team TEXT,
                business_client TEXT,
                product_team TEXT,
                profit_forecast DOUBLE PRECISION,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                last_sync_at TIMESTAMPTZ NOT NULL,
                links JSONB NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_history (
                id BIGSERIAL PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(natural_id),
                status TEXT NOT NULL,
                status_display TEXT NOT NULL,
                start_date TIMESTAMPTZ NOT NULL,
                end_date TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_history_task_status_start ON task_history (task_id, status, start_date)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_span ON task_history (start_date, end_date)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_runs (
                id UUID PRIMARY KEY,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                status TEXT NOT NULL,
                tasks_processed BIGINT NOT NULL DEFAULT 0,
                tasks_created BIGINT NOT NULL DEFAULT 0,
                tasks_updated BIGINT NOT NULL DEFAULT 0,
                history_entries_processed BIGINT NOT NULL DEFAULT 0,
                errors_count BIGINT NOT NULL DEFAULT 0,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("postgres storage migrations completed");
        Ok(())
    }
}

fn mask_db_url(url: &str) -> String {
    match url.find('@') {
        Some(at) => format!("***{}", &url[at..]),
        None => url.to_string(),
    }
}

fn row_to_task(row: &PgRow) -> Result<Task, StorageError> {
    let links_json: serde_json::Value = row.get("links");
    let links: Vec<TaskLink> = serde_json::from_value(links_json)?;

    Ok(Task {
        natural_id: row.get("natural_id"),
        key: row.get("key"),
        summary: row.get("summary"),
        description: row.get("description"),
        status: row.get("status"),
        author: row.get("author"),
        assignee: row.get("assignee"),
        team: row.get("team"),
        business_client: row.get("business_client"),
        product_team: row.get("product_team"),
        profit_forecast: row.get("profit_forecast"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_sync_at: row.get("last_sync_at"),
        links,
    })
}

fn row_to_history(row: &PgRow) -> Result<StatusHistoryEntry, StorageError> {
    Ok(StatusHistoryEntry {
        natural_id: row.get("task_id"),
        status: row.get("status"),
        status_display: row.get("status_display"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
    })
}

#[async_trait]
impl TrackerStorage for PostgresStorage {
    async fn upsert_task(&self, task: &Task) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT natural_id FROM tasks WHERE natural_id = $1")
                .bind(&task.natural_id)
                .fetch_optional(&mut *tx)
                .await?;
        let created = existing.is_none();
        let links_json = serde_json::to_value(&task.links)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                natural_id, key, summary, description, status, author, assignee, team,
                business_client, product_team, profit_forecast, created_at, updated_at,
                last_sync_at, links
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (natural_id) DO UPDATE SET
                key = EXCLUDED.key,
                summary = EXCLUDED.summary,
                description = EXCLUDED.description,
                status = EXCLUDED.status,
                author = EXCLUDED.author,
                assignee = EXCLUDED.assignee,
                team = EXCLUDED.team,
                business_client = EXCLUDED.business_client,
                product_team = EXCLUDED.product_team,
                profit_forecast = EXCLUDED.profit_forecast,
                updated_at = EXCLUDED.updated_at,
                last_sync_at = EXCLUDED.last_sync_at,
                links = EXCLUDED.links
            "#,
        )
        .bind(&task.natural_id)
        .bind(&task.key)
        .bind(&task.summary)
        .bind(&task.description)
        .bind(&task.status)
        .bind(&task.author)
        .bind(&task.assignee)
        .bind(&task.team)
        .bind(&task.business_client)
        .bind(&task.product_team)
        .bind(task.profit_forecast)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.last_sync_at)
        .bind(&links_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn touch_last_sync(&self, natural_id: &str, now: DateTime<Utc>) -> Result<(), StorageError> {
        sqlx::query("UPDATE tasks SET last_sync_at = $1 WHERE natural_id = $2")
            .bind(now)
            .bind(natural_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_history(
        &self,
        natural_id: &str,
        entries: &[StatusHistoryEntry],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM task_history WHERE task_id = $1")
            .bind(natural_id)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                "INSERT INTO task_history (task_id, status, status_display, start_date, end_date) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(natural_id)
            .bind(&entry.status)
            .bind(&entry.status_display)
            .bind(entry.start_date)
            .bind(entry.end_date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn cleanup_duplicate_history(&self) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            WITH ranked AS (
                SELECT id, ROW_NUMBER() OVER (
                    PARTITION BY task_id, status, start_date ORDER BY id ASC
                ) AS rn
                FROM task_history
            )
            DELETE FROM task_history WHERE id IN (SELECT id FROM ranked WHERE rn > 1)
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn start_run(&self) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO sync_runs (id, started_at, status) VALUES ($1, $2, 'running')")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn complete_run(&self, id: Uuid, counters: RunOutcomeCounters) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE sync_runs SET
                completed_at = $1, status = 'completed', tasks_processed = $2, tasks_created = $3,
                tasks_updated = $4, history_entries_processed = $5, errors_count = $6
            WHERE id = $7
            "#,
        )
        .bind(Utc::now())
        .bind(counters.tasks_processed)
        .bind(counters.tasks_created)
        .bind(counters.tasks_updated)
        .bind(counters.history_entries_processed)
        .bind(counters.errors_count)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_run(
        &self,
        id: Uuid,
        error: &str,
        counters: RunOutcomeCounters,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE sync_runs SET
                completed_at = $1, status = 'failed', error_message = $2, tasks_processed = $3,
                tasks_created = $4, tasks_updated = $5, history_entries_processed = $6, errors_count = $7
            WHERE id = $8
            "#,
        )
        .bind(Utc::now())
        .bind(error)
        .bind(counters.tasks_processed)
        .bind(counters.tasks_created)
        .bind(counters.tasks_updated)
        .bind(counters.history_entries_processed)
        .bind(counters.errors_count)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn orphaned_running_runs(&self, max_age: Duration) -> Result<Vec<Uuid>, StorageError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        let rows = sqlx::query("SELECT id FROM sync_runs WHERE status = 'running' AND started_at < $1")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<Uuid, _>("id")).collect())
    }

    async fn tasks_in_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        mapping: &StatusMapping,
        metric_type: MetricType,
    ) -> Result<Vec<Task>, StorageError> {
        let statuses: Vec<String> = match metric_type {
            MetricType::Ttd => vec![mapping.ready_for_dev_status.clone()],
            MetricType::Ttm => mapping.done_statuses.iter().cloned().collect(),
        };
        if statuses.is_empty() {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            r#"
            SELECT DISTINCT t.* FROM tasks t
            JOIN task_history h ON h.task_id = t.natural_id
            WHERE h.status = ANY($1)
              AND h.start_date::date >= $2 AND h.start_date::date <= $3
            "#,
        )
        .bind(&statuses)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    async fn tasks_in_queue(
        &self,
        queue_prefix: &str,
        created_since: Option<NaiveDate>,
    ) -> Result<Vec<Task>, StorageError> {
        let like = format!("{queue_prefix}-%");
        let rows = match created_since {
            Some(since) => {
                sqlx::query("SELECT * FROM tasks WHERE key LIKE $1 AND created_at::date >= $2")
                    .bind(like)
                    .bind(since)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM tasks WHERE key LIKE $1")
                    .bind(like)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_task).collect()
    }

    async fn root_tasks_in_queue(
        &self,
        queue_prefix: &str,
        start_date: Option<NaiveDate>,
    ) -> Result<Vec<Task>, StorageError> {
        self.tasks_in_queue(queue_prefix, start_date).await
    }

    async fn history_for_task(&self, natural_id: &str) -> Result<Vec<StatusHistoryEntry>, StorageError> {
        let rows = sqlx::query("SELECT * FROM task_history WHERE task_id = $1 ORDER BY start_date ASC")
            .bind(natural_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_history).collect()
    }

    async fn histories_for_keys(
        &self,
        natural_ids: &[String],
    ) -> Result<HashMap<String, Vec<StatusHistoryEntry>>, StorageError> {
        if natural_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            "SELECT * FROM task_history WHERE task_id = ANY($1) ORDER BY task_id, start_date ASC",
        )
        .bind(natural_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut out: HashMap<String, Vec<StatusHistoryEntry>> = HashMap::new();
        for row in &rows {
            let entry = row_to_history(row)?;
            out.entry(entry.natural_id.clone()).or_default().push(entry);
        }
        for id in natural_ids {
            out.entry(id.clone()).or_default();
        }
        Ok(out)
    }

    async fn histories_for_task_keys(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<StatusHistoryEntry>>, StorageError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT t.key AS task_key, h.status, h.status_display, h.start_date, h.end_date
            FROM task_history h
            JOIN tasks t ON t.natural_id = h.task_id
            WHERE t.key = ANY($1)
            ORDER BY t.key, h.start_date ASC
            "#,
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        let mut out: HashMap<String, Vec<StatusHistoryEntry>> = HashMap::new();
        for row in &rows {
            let task_key: String = row.get("task_key");
            let entry = StatusHistoryEntry {
                natural_id: task_key.clone(),
                status: row.get("status"),
                status_display: row.get("status_display"),
                start_date: row.get("start_date"),
                end_date: row.get("end_date"),
            };
            out.entry(task_key).or_default().push(entry);
        }
        for key in keys {
            out.entry(key.clone()).or_default();
        }
        Ok(out)
    }

    async fn hierarchy_downstream_batch(
        &self,
        root_keys: &[String],
        queue_prefix: &str,
        link_type_id: &str,
        direction: LinkDirection,
        max_depth: u32,
    ) -> Result<HashMap<String, Vec<String>>, StorageError> {
        if root_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let direction_str = match direction {
            LinkDirection::Inward => "inward",
            LinkDirection::Outward => "outward",
        };
        let like = format!("{queue_prefix}-%");

        // Seeded from every root at once so the hierarchy resolver never
        // becomes a per-root query; `root_key` rides along through the
        // recursion so each root's closure is counted independently even
        // where two roots share descendants.
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE downstream(root_key, key, links, depth) AS (
                SELECT key, key, links, 0 FROM tasks WHERE key = ANY($1)
                UNION ALL
                SELECT d.root_key, t.key, t.links, d.depth + 1
                FROM downstream d
                CROSS JOIN LATERAL jsonb_array_elements(d.links) AS link(val)
                JOIN tasks t ON t.key = link.val ->> 'target_key'
                WHERE link.val ->> 'direction' = $2
                  AND link.val ->> 'link_type_id' = $3
                  AND d.depth < $4
            )
            SELECT DISTINCT root_key, key FROM downstream WHERE key LIKE $5
            "#,
        )
        .bind(root_keys)
        .bind(direction_str)
        .bind(link_type_id)
        .bind(max_depth as i32)
        .bind(like)
        .fetch_all(&self.pool)
        .await?;

        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        for root_key in root_keys {
            out.entry(root_key.clone()).or_default();
        }
        for row in &rows {
            let root_key: String = row.get("root_key");
            let key: String = row.get("key");
            out.entry(root_key).or_default().push(key);
        }
        Ok(out)
    }
}
