use crate::job::storage::object::{self, ProgressSink};

/// Blob store kept in a single SQLite table.
#[derive(Clone)]
pub struct LocalStorage {
    pool: sqlx::SqlitePool,
    chunk_size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SQL error: {0}")]
    Query(#[from] sqlx::Error),
}

impl LocalStorage {
    pub async fn open(url: &str) -> Result<Self, sqlx::Error> {
        let pool = super::open_pool(
            url,
            r#"
            CREATE TABLE IF NOT EXISTS blobs(
                path TEXT NOT NULL PRIMARY KEY,
                content_type TEXT NOT NULL,
                body BLOB NOT NULL
            );
        "#,
        )
        .await?;
        Ok(Self {
            pool,
            chunk_size: 64 * 1024,
        })
    }

    /// Size of the steps in which progress is reported.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub async fn get(&self, path: &str) -> Result<Option<(String, Vec<u8>)>, Error> {
        let row = sqlx::query_as::<_, (String, Vec<u8>)>(
            "SELECT content_type, body FROM blobs WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

impl object::Client for LocalStorage {
    type Error = Error;

    async fn put(
        &self,
        path: &str,
        content_type: &str,
        body: bytes::Bytes,
        progress: &ProgressSink,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO blobs(path, content_type, body)
            VALUES (?, ?, ?)
            ON CONFLICT(path)
            DO UPDATE SET
                content_type = EXCLUDED.content_type,
                body = EXCLUDED.body
        "#,
        )
        .bind(path)
        .bind(content_type)
        .bind(&body[..])
        .execute(&self.pool)
        .await?;
        let total = body.len() as u64;
        let step = self.chunk_size as u64;
        for transferred in (step..total).step_by(self.chunk_size).chain([total]) {
            progress.report(transferred);
        }
        Ok(())
    }

    /// Addresses are derived from the path alone, like public bucket URLs.
    async fn download_url(&self, path: &str) -> Result<String, Self::Error> {
        Ok(format!("local:///{path}"))
    }
}
