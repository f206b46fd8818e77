use serde::Serialize;

use crate::record::{AlbumId, AlbumRecord, CatalogFile, FileId, GeoData};

/// One entry of a file creation request.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewFile {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geodata: Option<GeoData>,
}

/// One entry of an album link request.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AlbumFile {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

#[derive(Serialize, Debug)]
pub(crate) struct Files<'a, T> {
    pub files: &'a [T],
}

pub trait Client {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `POST /api/v1/files/`
    fn create_files(
        &self,
        files: &[NewFile],
    ) -> impl Future<Output = Result<Vec<CatalogFile>, Self::Error>>;

    /// `GET /api/v1/files/`
    fn list_files(&self) -> impl Future<Output = Result<Vec<CatalogFile>, Self::Error>>;

    /// `DELETE /api/v1/files/{id}/`
    fn delete_file(&self, id: FileId) -> impl Future<Output = Result<(), Self::Error>>;

    /// `POST /api/v1/albums/{album}/files/{file}/`
    fn link_album(
        &self,
        album: AlbumId,
        file: FileId,
        files: &[AlbumFile],
    ) -> impl Future<Output = Result<AlbumRecord, Self::Error>>;

    /// `GET /api/v1/albums/{album}/`
    fn get_album(&self, album: AlbumId) -> impl Future<Output = Result<AlbumRecord, Self::Error>>;

    /// `GET /api/v1/albums/`
    fn list_albums(&self) -> impl Future<Output = Result<Vec<AlbumRecord>, Self::Error>>;
}
