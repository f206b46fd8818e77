//! Records exchanged between the pipeline stages, the catalog and the gallery.

use chrono::{DateTime, Utc};
use derive_debug::Dbg;
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($name:ident) => {
        #[derive(
            Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

numeric_id!(FileId);
numeric_id!(AlbumId);
numeric_id!(UserId);

/// A user-selected file, consumed once by a pipeline.
#[derive(Dbg, Clone)]
pub struct RawFile {
    pub name: String,
    pub content_type: mime::Mime,
    #[dbg(skip)]
    pub body: bytes::Bytes,
}

impl RawFile {
    pub fn new(
        name: impl Into<String>,
        content_type: mime::Mime,
        body: impl Into<bytes::Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type,
            body: body.into(),
        }
    }

    /// Read a file from disk, guessing its content type from the extension.
    pub async fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let body = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        Ok(Self::new(name, content_type, body))
    }

    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GeoData {
    pub latitude: f64,
    pub longitude: f64,
}

/// Where the files of one batch end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadContext {
    #[default]
    Personal,
    Album(AlbumId),
}

impl UploadContext {
    /// Resolve the context from navigation path segments. A route targets an album
    /// when an `album` segment is followed by a numeric id.
    pub fn from_route<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut segments = segments.into_iter().filter(|segment| !segment.is_empty());
        while let Some(segment) = segments.next() {
            if segment == "album" || segment == "albums" {
                return segments
                    .next()
                    .and_then(|id| id.parse().ok())
                    .map(Self::Album)
                    .unwrap_or(Self::Personal);
            }
        }
        Self::Personal
    }
}

/// A file entry as the catalog returns it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CatalogFile {
    pub id: FileId,
    pub author: UserId,
    pub created_at: DateTime<Utc>,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geodata: Option<GeoData>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AlbumRecord {
    pub id: AlbumId,
    pub title: String,
    #[serde(rename = "author")]
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub memberships: Vec<serde_json::Value>,
    #[serde(default)]
    pub files: Vec<CatalogFile>,
}

/// Terminal artifact of one pipeline run, or one entry of a context fetch.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub id: FileId,
    pub name: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    pub storage_path: String,
    pub preview_path: Option<String>,
    pub geo_data: Option<GeoData>,
    pub download_url: String,
}

impl UploadRecord {
    pub fn from_catalog(file: CatalogFile, download_url: String) -> Self {
        Self {
            id: file.id,
            name: file_name_of(&file.file).to_owned(),
            author_id: file.author,
            created_at: file.created_at,
            storage_path: file.file,
            preview_path: file.preview,
            geo_data: file.geodata,
            download_url,
        }
    }
}

fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
