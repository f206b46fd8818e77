use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::{
    job::storage::catalog::{self, AlbumFile, NewFile},
    record::{AlbumId, AlbumRecord, CatalogFile, FileId, GeoData, UserId},
};

/// File and album catalog kept in SQLite.
pub struct LocalCatalog {
    pool: sqlx::SqlitePool,
}

/// A view of the catalog as seen by one session.
#[derive(Clone)]
pub struct CatalogClient {
    pool: sqlx::SqlitePool,
    user: Option<UserId>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SQL error: {0}")]
    Query(#[from] sqlx::Error),
    #[error("authentication required")]
    Unauthorized,
    #[error("album {0} not found")]
    AlbumNotFound(AlbumId),
}

#[derive(FromRow)]
struct FileRow {
    id: i64,
    author: i64,
    created_at: DateTime<Utc>,
    file: String,
    preview: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<FileRow> for CatalogFile {
    fn from(row: FileRow) -> Self {
        let geodata = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoData {
                latitude,
                longitude,
            }),
            _ => None,
        };
        Self {
            id: FileId(row.id as u64),
            author: UserId(row.author as u64),
            created_at: row.created_at,
            file: row.file,
            preview: row.preview,
            geodata,
        }
    }
}

#[derive(FromRow)]
struct AlbumRow {
    id: i64,
    title: String,
    author: i64,
    created_at: DateTime<Utc>,
    #[sqlx(json)]
    memberships: Vec<serde_json::Value>,
}

impl LocalCatalog {
    pub async fn open(url: &str) -> Result<Self, sqlx::Error> {
        let pool = super::open_pool(
            url,
            r#"
            CREATE TABLE IF NOT EXISTS files(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                author INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                file TEXT NOT NULL,
                preview TEXT,
                latitude REAL,
                longitude REAL
            );

            CREATE TABLE IF NOT EXISTS albums(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                author INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                memberships TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS album_files(
                album_id INTEGER NOT NULL REFERENCES albums(id),
                file_id INTEGER NOT NULL REFERENCES files(id),
                file TEXT NOT NULL,
                preview TEXT,
                PRIMARY KEY(album_id, file_id)
            );
        "#,
        )
        .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub fn client(&self, user: Option<UserId>) -> CatalogClient {
        CatalogClient {
            pool: self.pool.clone(),
            user,
        }
    }

    pub async fn create_album(&self, title: &str, author: UserId) -> Result<AlbumRecord, Error> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO albums(title, author, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(title)
        .bind(author.0 as i64)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        self.client(Some(author)).album(AlbumId(id as u64)).await
    }
}

impl CatalogClient {
    fn user(&self) -> Result<i64, Error> {
        self.user
            .map(|user| user.0 as i64)
            .ok_or(Error::Unauthorized)
    }

    async fn album_files(&self, album: i64) -> Result<Vec<CatalogFile>, Error> {
        let rows = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT files.* FROM album_files
            JOIN files ON files.id = album_files.file_id
            WHERE album_files.album_id = ?
            ORDER BY files.created_at DESC, files.id DESC
        "#,
        )
        .bind(album)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn snapshot(&self, row: AlbumRow) -> Result<AlbumRecord, Error> {
        let files = self.album_files(row.id).await?;
        Ok(AlbumRecord {
            id: AlbumId(row.id as u64),
            title: row.title,
            author_id: UserId(row.author as u64),
            created_at: row.created_at,
            memberships: row.memberships,
            files,
        })
    }

    async fn album(&self, album: AlbumId) -> Result<AlbumRecord, Error> {
        let row = sqlx::query_as::<_, AlbumRow>("SELECT * FROM albums WHERE id = ?")
            .bind(album.0 as i64)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::AlbumNotFound(album))?;
        self.snapshot(row).await
    }
}

impl catalog::Client for CatalogClient {
    type Error = Error;

    async fn create_files(&self, files: &[NewFile]) -> Result<Vec<CatalogFile>, Self::Error> {
        let author = self.user()?;
        let mut created = Vec::with_capacity(files.len());
        for file in files {
            let row = sqlx::query_as::<_, FileRow>(
                r#"
                INSERT INTO files(author, created_at, file, preview, latitude, longitude)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING *
            "#,
            )
            .bind(author)
            .bind(Utc::now())
            .bind(&file.file)
            .bind(&file.preview)
            .bind(file.geodata.map(|geo| geo.latitude))
            .bind(file.geodata.map(|geo| geo.longitude))
            .fetch_one(&self.pool)
            .await?;
            created.push(row.into());
        }
        Ok(created)
    }

    async fn list_files(&self) -> Result<Vec<CatalogFile>, Self::Error> {
        let rows = sqlx::query_as::<_, FileRow>(
            "SELECT * FROM files WHERE author = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(self.user()?)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_file(&self, id: FileId) -> Result<(), Self::Error> {
        let author = self.user()?;
        let id = id.0 as i64;
        sqlx::query(
            r#"
            DELETE FROM album_files
            WHERE file_id IN (SELECT id FROM files WHERE id = ? AND author = ?)
        "#,
        )
        .bind(id)
        .bind(author)
        .execute(&self.pool)
        .await?;
        sqlx::query("DELETE FROM files WHERE id = ? AND author = ?")
            .bind(id)
            .bind(author)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn link_album(
        &self,
        album: AlbumId,
        file: FileId,
        files: &[AlbumFile],
    ) -> Result<AlbumRecord, Self::Error> {
        self.user()?;
        let snapshot = self.album(album).await?;
        for entry in files {
            sqlx::query(
                r#"
                INSERT INTO album_files(album_id, file_id, file, preview)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(album_id, file_id)
                DO UPDATE SET
                    file = EXCLUDED.file,
                    preview = EXCLUDED.preview
            "#,
            )
            .bind(snapshot.id.0 as i64)
            .bind(file.0 as i64)
            .bind(&entry.file)
            .bind(&entry.preview)
            .execute(&self.pool)
            .await?;
        }
        self.album(album).await
    }

    async fn get_album(&self, album: AlbumId) -> Result<AlbumRecord, Self::Error> {
        self.user()?;
        self.album(album).await
    }

    async fn list_albums(&self) -> Result<Vec<AlbumRecord>, Self::Error> {
        let rows = sqlx::query_as::<_, AlbumRow>("SELECT * FROM albums ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut albums = Vec::with_capacity(rows.len());
        for row in rows {
            albums.push(self.snapshot(row).await?);
        }
        Ok(albums)
    }
}
