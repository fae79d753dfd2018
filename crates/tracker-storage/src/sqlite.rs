//! SQLite persistence backend.
//!
//! The backend used by the test suite and by single-instance/local
//! deployments, against the same table shapes as the Postgres backend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use tracker_model::{LinkDirection, StatusHistoryEntry, StatusMapping, Task, TaskLink};
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::{MetricType, RunOutcomeCounters, TrackerStorage};

/// Configuration for the SQLite backend.
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Database file path (use ":memory:" for ephemeral test databases).
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub create_tables_if_missing: bool,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tracker.db"),
            max_connections: 10,
            create_tables_if_missing: true,
        }
    }
}

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(config: SqliteStorageConfig) -> Result<Self, StorageError> {
        info!(path = %config.database_path.display(), "opening sqlite storage");

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true);

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        if config.create_tables_if_missing {
            storage.migrate().await?;
        }
        Ok(storage)
    }

    /// Opens an in-process sqlite database, migrated and ready to use.
    /// Not gated behind `#[cfg(test)]` so downstream crates' own test suites
    /// (e.g. `tracker-sync`'s orchestrator tests) can construct one too.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePool::connect(":memory:").await?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        debug!("running sqlite storage migrations");

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
                profit_forecast REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_sync_at TEXT NOT NULL,
                links TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL REFERENCES tasks(natural_id),
                status TEXT NOT NULL,
                status_display TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT
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
                id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                status TEXT NOT NULL,
                tasks_processed INTEGER NOT NULL DEFAULT 0,
                tasks_created INTEGER NOT NULL DEFAULT 0,
                tasks_updated INTEGER NOT NULL DEFAULT 0,
                history_entries_processed INTEGER NOT NULL DEFAULT 0,
                errors_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("sqlite storage migrations completed");
        Ok(())
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StorageError> {
    let links_json: String = row.get("links");
    let links: Vec<TaskLink> = serde_json::from_str(&links_json)?;

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
        created_at: parse_dt(row.get("created_at"))?,
        updated_at: parse_dt(row.get("updated_at"))?,
        last_sync_at: parse_dt(row.get("last_sync_at"))?,
        links,
    })
}

fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> Result<StatusHistoryEntry, StorageError> {
    let end_date: Option<String> = row.get("end_date");
    Ok(StatusHistoryEntry {
        natural_id: row.get("task_id"),
        status: row.get("status"),
        status_display: row.get("status_display"),
        start_date: parse_dt(row.get("start_date"))?,
        end_date: end_date.map(|s| parse_dt(&s)).transpose()?,
    })
}

fn parse_dt(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidRow(format!("bad timestamp {raw:?}: {e}")))
}

fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[async_trait]
impl TrackerStorage for SqliteStorage {
    async fn upsert_task(&self, task: &Task) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT natural_id FROM tasks WHERE natural_id = ?")
                .bind(&task.natural_id)
                .fetch_optional(&mut *tx)
                .await?;
        let created = existing.is_none();
        let links_json = serde_json::to_string(&task.links)?;

        if created {
            sqlx::query(
                r#"
                INSERT INTO tasks (
                    natural_id, key, summary, description, status, author, assignee, team,
                    business_client, product_team, profit_forecast, created_at, updated_at,
                    last_sync_at, links
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
            .bind(fmt_dt(task.created_at))
            .bind(fmt_dt(task.updated_at))
            .bind(fmt_dt(task.last_sync_at))
            .bind(&links_json)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE tasks SET
                    key = ?, summary = ?, description = ?, status = ?, author = ?, assignee = ?,
                    team = ?, business_client = ?, product_team = ?, profit_forecast = ?,
                    updated_at = ?, last_sync_at = ?, links = ?
                WHERE natural_id = ?
                "#,
            )
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
            .bind(fmt_dt(task.updated_at))
            .bind(fmt_dt(task.last_sync_at))
            .bind(&links_json)
            .bind(&task.natural_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn touch_last_sync(&self, natural_id: &str, now: DateTime<Utc>) -> Result<(), StorageError> {
        sqlx::query("UPDATE tasks SET last_sync_at = ? WHERE natural_id = ?")
            .bind(fmt_dt(now))
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

        sqlx::query("DELETE FROM task_history WHERE task_id = ?")
            .bind(natural_id)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                "INSERT INTO task_history (task_id, status, status_display, start_date, end_date) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(natural_id)
            .bind(&entry.status)
            .bind(&entry.status_display)
            .bind(fmt_dt(entry.start_date))
            .bind(entry.end_date.map(fmt_dt))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn cleanup_duplicate_history(&self) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            DELETE FROM task_history
            WHERE id IN (
                SELECT id FROM (
                    SELECT id, ROW_NUMBER() OVER (
                        PARTITION BY task_id, status, start_date ORDER BY id ASC
                    ) AS rn
                    FROM task_history
                )
                WHERE rn > 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn start_run(&self) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO sync_runs (id, started_at, status) VALUES (?, ?, 'running')",
        )
        .bind(id.to_string())
        .bind(fmt_dt(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn complete_run(&self, id: Uuid, counters: RunOutcomeCounters) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE sync_runs SET
                completed_at = ?, status = 'completed', tasks_processed = ?, tasks_created = ?,
                tasks_updated = ?, history_entries_processed = ?, errors_count = ?
            WHERE id = ?
            "#,
        )
        .bind(fmt_dt(Utc::now()))
        .bind(counters.tasks_processed)
        .bind(counters.tasks_created)
        .bind(counters.tasks_updated)
        .bind(counters.history_entries_processed)
        .bind(counters.errors_count)
        .bind(id.to_string())
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
                completed_at = ?, status = 'failed', error_message = ?, tasks_processed = ?,
                tasks_created = ?, tasks_updated = ?, history_entries_processed = ?, errors_count = ?
            WHERE id = ?
            "#,
        )
        .bind(fmt_dt(Utc::now()))
        .bind(error)
        .bind(counters.tasks_processed)
        .bind(counters.tasks_created)
        .bind(counters.tasks_updated)
        .bind(counters.history_entries_processed)
        .bind(counters.errors_count)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn orphaned_running_runs(&self, max_age: Duration) -> Result<Vec<Uuid>, StorageError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        let rows = sqlx::query("SELECT id FROM sync_runs WHERE status = 'running' AND started_at < ?")
            .bind(fmt_dt(cutoff))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                let raw: String = r.get("id");
                Uuid::parse_str(&raw).map_err(|e| StorageError::InvalidRow(e.to_string()))
            })
            .collect()
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

        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            r#"
            SELECT DISTINCT t.* FROM tasks t
            JOIN task_history h ON h.task_id = t.natural_id
            WHERE h.status IN ({placeholders})
              AND date(h.start_date) >= ? AND date(h.start_date) <= ?
            "#
        );

        let mut query = sqlx::query(&sql);
        for status in &statuses {
            query = query.bind(status);
        }
        query = query.bind(start.to_string()).bind(end.to_string());

        let rows = query.fetch_all(&self.pool).await?;
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
                sqlx::query("SELECT * FROM tasks WHERE key LIKE ? AND date(created_at) >= ?")
                    .bind(like)
                    .bind(since.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM tasks WHERE key LIKE ?")
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
        let rows = sqlx::query(
            "SELECT * FROM task_history WHERE task_id = ? ORDER BY start_date ASC",
        )
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

        let placeholders = natural_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT * FROM task_history WHERE task_id IN ({placeholders}) ORDER BY task_id, start_date ASC"
        );
        let mut query = sqlx::query(&sql);
        for id in natural_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut out: HashMap<String, Vec<StatusHistoryEntry>> = HashMap::new();
        for row in &rows {
            let entry = row_to_history(row)?;
            out.entry(entry.natural_id.clone()).or_default().push(entry);
        }
        // Tasks with no history rows still appear with an empty vec so
        // callers don't need to special-case a missing key.
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

        let placeholders = keys.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            r#"
            SELECT t.key AS task_key, h.status, h.status_display, h.start_date, h.end_date
            FROM task_history h
            JOIN tasks t ON t.natural_id = h.task_id
            WHERE t.key IN ({placeholders})
            ORDER BY t.key, h.start_date ASC
            "#
        );
        let mut query = sqlx::query(&sql);
        for key in keys {
            query = query.bind(key);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut out: HashMap<String, Vec<StatusHistoryEntry>> = HashMap::new();
        for row in &rows {
            let task_key: String = row.get("task_key");
            let end_date: Option<String> = row.get("end_date");
            let entry = StatusHistoryEntry {
                natural_id: task_key.clone(),
                status: row.get("status"),
                status_display: row.get("status_display"),
                start_date: parse_dt(row.get("start_date"))?,
                end_date: end_date.map(|s| parse_dt(&s)).transpose()?,
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

        // One recursive SQL walk over the JSON `links` column, seeded from
        // every root at once: no per-root fetch, depth-bounded to guarantee
        // termination on cycles. `root_key` rides along through the
        // recursion so each root's closure is counted independently even
        // where two roots share descendants.
        let direction_str = match direction {
            LinkDirection::Inward => "inward",
            LinkDirection::Outward => "outward",
        };
        let like = format!("{queue_prefix}-%");
        let placeholders = root_keys.iter().map(|_| "?").collect::<Vec<_>>().join(", ");

        let sql = format!(
            r#"
            WITH RECURSIVE downstream(root_key, key, links, depth) AS (
                SELECT key, key, links, 0 FROM tasks WHERE key IN ({placeholders})
                UNION ALL
                SELECT d.root_key, t.key, t.links, d.depth + 1
                FROM downstream d, json_each(d.links) je
                JOIN tasks t ON t.key = json_extract(je.value, '$.target_key')
                WHERE json_extract(je.value, '$.direction') = ?
                  AND json_extract(je.value, '$.link_type_id') = ?
                  AND d.depth < ?
            )
            SELECT DISTINCT root_key, key FROM downstream WHERE key LIKE ?
            "#
        );

        let mut query = sqlx::query(&sql);
        for root_key in root_keys {
            query = query.bind(root_key);
        }
        query = query
            .bind(direction_str)
            .bind(link_type_id)
            .bind(max_depth as i64)
            .bind(like);
        let rows = query.fetch_all(&self.pool).await?;

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
