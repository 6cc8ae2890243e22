// SQLite bucket store. Point upserts read-modify-write one JSON document per
// filter key; batch aggregates are appended as finished documents.

use std::path::Path;
use std::str::FromStr;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::instrument;

use super::WriteSummary;
use super::document::apply_update;
use crate::models::{Document, UpsertDescription};

pub struct SqliteStore {
    pool: SqlitePool,
}

/// Filter documents are key-sorted maps, so their JSON text is a stable key.
fn filter_key(filter: &Document) -> anyhow::Result<String> {
    Ok(serde_json::to_string(filter)?)
}

fn parse_doc(text: &str) -> anyhow::Result<Document> {
    Ok(serde_json::from_str(text)?)
}

impl SqliteStore {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bucket_points (
                filter_key TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bucket_aggregates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply upserts in one transaction, in slice order.
    #[instrument(skip(self, upserts), fields(store = "sqlite", operation = "apply_upserts", upserts_count = upserts.len()))]
    pub async fn apply_upserts(
        &self,
        upserts: &[UpsertDescription],
    ) -> anyhow::Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        if upserts.is_empty() {
            return Ok(summary);
        }
        let mut tx = self.pool.begin().await?;

        for u in upserts {
            let key = filter_key(&u.filter)?;
            let existing: Option<String> =
                sqlx::query_scalar("SELECT doc FROM bucket_points WHERE filter_key = $1")
                    .bind(&key)
                    .fetch_optional(&mut *tx)
                    .await?;

            let (mut doc, inserting) = match existing {
                Some(text) => (parse_doc(&text)?, false),
                None if u.upsert => (u.filter.clone(), true),
                None => continue,
            };
            apply_update(&mut doc, &u.update)?;
            let text = serde_json::to_string(&doc)?;

            sqlx::query(
                "INSERT INTO bucket_points (filter_key, doc) VALUES ($1, $2)
                 ON CONFLICT(filter_key) DO UPDATE SET doc = excluded.doc",
            )
            .bind(&key)
            .bind(&text)
            .execute(&mut *tx)
            .await?;

            if inserting {
                summary.inserted += 1;
            } else {
                summary.modified += 1;
            }
        }
        tx.commit().await?;
        Ok(summary)
    }

    #[instrument(skip(self, docs), fields(store = "sqlite", operation = "insert_aggregates", docs_count = docs.len()))]
    pub async fn insert_aggregates(&self, docs: &[Document]) -> anyhow::Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        if docs.is_empty() {
            return Ok(summary);
        }
        let mut tx = self.pool.begin().await?;
        for doc in docs {
            sqlx::query("INSERT INTO bucket_aggregates (doc) VALUES ($1)")
                .bind(serde_json::to_string(doc)?)
                .execute(&mut *tx)
                .await?;
            summary.inserted += 1;
        }
        tx.commit().await?;
        Ok(summary)
    }

    /// Stored point document for an exact filter, if any.
    pub async fn get_point_document(&self, filter: &Document) -> anyhow::Result<Option<Document>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT doc FROM bucket_points WHERE filter_key = $1")
                .bind(filter_key(filter)?)
                .fetch_optional(&self.pool)
                .await?;
        row.as_deref().map(parse_doc).transpose()
    }

    pub async fn count_points(&self) -> anyhow::Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bucket_points")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    /// Most recently inserted aggregates, oldest first.
    pub async fn get_recent_aggregates(&self, limit: u32) -> anyhow::Result<Vec<Document>> {
        let rows = sqlx::query("SELECT doc FROM bucket_aggregates ORDER BY id DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let text: String = row.try_get("doc")?;
            out.push(parse_doc(&text)?);
        }
        out.reverse();
        Ok(out)
    }

    pub async fn count_aggregates(&self) -> anyhow::Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bucket_aggregates")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}
