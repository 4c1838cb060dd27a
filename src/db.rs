use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::item::Item;
use crate::pipeline::RunReport;
use crate::window::{self, TimeWindow};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, FromRow)]
struct ItemRow {
    source_label: String,
    title: String,
    link: String,
    summary: String,
    published: String,
    score: Option<f64>,
    dimension_scores: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RejectedItem {
    pub id: i64,
    pub source_label: String,
    pub title: String,
    pub link: String,
    pub relevance: f64,
    pub rejected_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: String,
    pub feeds_failed: i64,
    pub items_collected: i64,
    pub defaulted_timestamps: i64,
    pub unique_new: i64,
    pub scored: i64,
    pub rejected: i64,
    pub score_failures: i64,
    pub kept: i64,
    pub audit_failures: i64,
}

/// Rolling set of evaluated items plus the latest-results snapshot.
///
/// The rolling set lives in SQLite and is replaced wholesale inside one
/// transaction on every save. The snapshot is a JSON array with the same
/// content, written to a temporary file and renamed into place.
pub struct ResultStore {
    pool: SqlitePool,
    snapshot_path: PathBuf,
    window: TimeWindow,
}

impl ResultStore {
    pub async fn new(
        database_url: &str,
        snapshot_path: impl Into<PathBuf>,
        window: TimeWindow,
    ) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool,
            snapshot_path: snapshot_path.into(),
            window,
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub async fn initialize(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                position INTEGER PRIMARY KEY,
                source_label TEXT NOT NULL,
                title TEXT NOT NULL,
                link TEXT NOT NULL,
                summary TEXT NOT NULL,
                published TEXT NOT NULL,
                score REAL,
                dimension_scores TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rejected_items (
                id INTEGER PRIMARY KEY,
                source_label TEXT NOT NULL,
                title TEXT NOT NULL,
                link TEXT NOT NULL,
                summary TEXT NOT NULL,
                published TEXT NOT NULL,
                relevance REAL NOT NULL,
                rejected_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                feeds_failed INTEGER NOT NULL,
                items_collected INTEGER NOT NULL,
                defaulted_timestamps INTEGER NOT NULL,
                unique_new INTEGER NOT NULL,
                scored INTEGER NOT NULL,
                rejected INTEGER NOT NULL,
                score_failures INTEGER NOT NULL,
                kept INTEGER NOT NULL,
                audit_failures INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persisted items in stored order. Empty on a fresh store.
    pub async fn load(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT source_label, title, link, summary, published, score, dimension_scores
            FROM items
            ORDER BY position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let now = window::now_naive();
        rows.into_iter()
            .map(|row| -> Result<Item, StoreError> {
                let published = window::parse_or_default(&row.published, now);
                if published.is_defaulted() {
                    warn!(
                        "Stored item '{}' has unreadable timestamp '{}'",
                        row.title, row.published
                    );
                }
                let dimension_scores = row
                    .dimension_scores
                    .as_deref()
                    .map(|raw| serde_json::from_str(raw))
                    .transpose()?;

                Ok(Item {
                    source_label: row.source_label,
                    title: row.title,
                    link: row.link,
                    summary: row.summary,
                    published: published.value(),
                    score: row.score,
                    dimension_scores,
                })
            })
            .collect()
    }

    /// Drop items that aged out of the window at `now`, then replace both the
    /// rolling set and the snapshot with what is left. Returns the kept items.
    pub async fn save(&self, items: Vec<Item>, now: NaiveDateTime) -> Result<Vec<Item>, StoreError> {
        let before = items.len();
        let kept = self.window.retain(items, now);
        if kept.len() < before {
            info!("{} items aged out of the window", before - kept.len());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM items").execute(&mut *tx).await?;
        for (position, item) in kept.iter().enumerate() {
            let dimension_scores = item
                .dimension_scores
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO items (position, source_label, title, link, summary, published, score, dimension_scores)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(position as i64)
            .bind(&item.source_label)
            .bind(&item.title)
            .bind(&item.link)
            .bind(&item.summary)
            .bind(format_timestamp(item.published))
            .bind(item.score)
            .bind(dimension_scores)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.write_snapshot(&kept).await?;
        info!("Persisted {} items", kept.len());
        Ok(kept)
    }

    /// Contents of the latest-results snapshot. Empty when none was written.
    pub async fn latest_results(&self) -> Result<Vec<Item>, StoreError> {
        match tokio::fs::read(&self.snapshot_path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(StoreError::Snapshot {
                path: self.snapshot_path.clone(),
                source,
            }),
        }
    }

    async fn write_snapshot(&self, items: &[Item]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(items)?;
        let path = &self.snapshot_path;
        let snapshot_error = |source| StoreError::Snapshot {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(snapshot_error)?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(snapshot_error)?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(snapshot_error)?;
        Ok(())
    }

    /// Keep an audit copy of an item the relevance gate turned away.
    pub async fn record_rejected(
        &self,
        item: &Item,
        relevance: f64,
        rejected_at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rejected_items (source_label, title, link, summary, published, relevance, rejected_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.source_label)
        .bind(&item.title)
        .bind(&item.link)
        .bind(&item.summary)
        .bind(format_timestamp(item.published))
        .bind(relevance)
        .bind(format_timestamp(rejected_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn rejected_items(&self) -> Result<Vec<RejectedItem>, StoreError> {
        let rows = sqlx::query_as::<_, RejectedItem>(
            "SELECT id, source_label, title, link, relevance, rejected_at FROM rejected_items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn record_run(&self, report: &RunReport) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO runs (started_at, finished_at, feeds_failed, items_collected,
                              defaulted_timestamps, unique_new, scored, rejected,
                              score_failures, kept, audit_failures)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(format_timestamp(report.started_at))
        .bind(format_timestamp(report.finished_at))
        .bind(report.feeds_failed as i64)
        .bind(report.items_collected as i64)
        .bind(report.defaulted_timestamps as i64)
        .bind(report.unique_new as i64)
        .bind(report.scored as i64)
        .bind(report.rejected as i64)
        .bind(report.score_failures as i64)
        .bind(report.kept as i64)
        .bind(report.audit_failures as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<RunRecord>, StoreError> {
        let runs = sqlx::query_as::<_, RunRecord>("SELECT * FROM runs ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(runs)
    }
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}
