//! Registration of uploaded blobs with the catalog.

use tracing::debug;

use super::storage::catalog::{self, AlbumFile, NewFile};
use crate::{
    ErrorContext, ErrorDetail,
    record::{AlbumId, AlbumRecord, CatalogFile, FileId, GeoData},
};

/// Create a single catalog entry. The catalog assigns id and creation time.
pub async fn register_file<C: catalog::Client>(
    catalog: &C,
    ctx: &ErrorContext,
    storage_path: &str,
    preview_path: Option<&str>,
    geo_data: Option<GeoData>,
) -> Result<CatalogFile, crate::Error> {
    let request = [NewFile {
        file: storage_path.to_owned(),
        preview: preview_path.map(ToOwned::to_owned),
        geodata: geo_data,
    }];
    let created = catalog
        .create_files(&request)
        .await
        .map_err(|error| ctx.error(ErrorDetail::Registration(Box::new(error))))?;
    let file = created
        .into_iter()
        .next_back()
        .ok_or_else(|| ctx.error(ErrorDetail::EmptyRegistration))?;
    debug!(id = %file.id, storage_path, "file registered");
    Ok(file)
}

/// Attach a registered file to an album. A failure here leaves the file in the
/// personal library.
pub async fn link_to_album<C: catalog::Client>(
    catalog: &C,
    ctx: &ErrorContext,
    album: AlbumId,
    file: FileId,
    storage_path: &str,
    preview_path: Option<&str>,
) -> Result<AlbumRecord, crate::Error> {
    let request = [AlbumFile {
        file: storage_path.to_owned(),
        preview: preview_path.map(ToOwned::to_owned),
    }];
    let album = catalog
        .link_album(album, file, &request)
        .await
        .map_err(|error| ctx.error(ErrorDetail::Link(Box::new(error))))?;
    debug!(album = %album.id, file = %file, "file linked to album");
    Ok(album)
}
