//! Completion records in the `completions` table.

use async_trait::async_trait;

use super::Db;
use crate::error::Result;
use crate::model::completion_bucket;
use crate::queue::DedupCache;

/// Completion cache for one bucket (`<queue>:DOWNLOADED`).
#[derive(Debug, Clone)]
pub struct PgDedupCache {
    db: Db,
    bucket: String,
}

impl PgDedupCache {
    /// Cache for everything flowing through `queue_name`.
    pub fn for_queue(db: Db, queue_name: &str) -> Self {
        Self {
            db,
            bucket: completion_bucket(queue_name),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Number of completion records in this bucket.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM completions WHERE bucket = $1")
            .bind(&self.bucket)
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl DedupCache for PgDedupCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM completions WHERE bucket = $1 AND url = $2)",
        )
        .bind(&self.bucket)
        .bind(key)
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.0)
    }

    async fn mark(&self, key: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO completions (bucket, url) VALUES ($1, $2)
             ON CONFLICT (bucket, url) DO NOTHING",
        )
        .bind(&self.bucket)
        .bind(key)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}
