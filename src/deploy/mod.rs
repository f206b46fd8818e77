//! Backend implementations of the storage contracts in [`crate::job::storage`].

pub mod local;
pub mod r2;
pub mod rest;

use crate::{
    job::storage::{
        catalog::{self, AlbumFile, NewFile},
        object::{self, ProgressSink},
    },
    record::{AlbumId, AlbumRecord, CatalogFile, FileId},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Rest(#[from] rest::Error),
    #[error(transparent)]
    R2(#[from] r2::Error),
    #[error(transparent)]
    LocalCatalog(#[from] local::catalog::Error),
    #[error(transparent)]
    LocalStorage(#[from] local::storage::Error),
}

/// Catalog backend selected at runtime.
pub enum Catalog {
    Rest(rest::Client),
    Local(local::catalog::CatalogClient),
}

/// Object storage backend selected at runtime.
pub enum Storage {
    R2(r2::Client),
    Local(local::storage::LocalStorage),
}

impl catalog::Client for Catalog {
    type Error = Error;

    async fn create_files(&self, files: &[NewFile]) -> Result<Vec<CatalogFile>, Self::Error> {
        Ok(match self {
            Self::Rest(client) => client.create_files(files).await?,
            Self::Local(client) => client.create_files(files).await?,
        })
    }

    async fn list_files(&self) -> Result<Vec<CatalogFile>, Self::Error> {
        Ok(match self {
            Self::Rest(client) => client.list_files().await?,
            Self::Local(client) => client.list_files().await?,
        })
    }

    async fn delete_file(&self, id: FileId) -> Result<(), Self::Error> {
        match self {
            Self::Rest(client) => client.delete_file(id).await?,
            Self::Local(client) => client.delete_file(id).await?,
        }
        Ok(())
    }

    async fn link_album(
        &self,
        album: AlbumId,
        file: FileId,
        files: &[AlbumFile],
    ) -> Result<AlbumRecord, Self::Error> {
        Ok(match self {
            Self::Rest(client) => client.link_album(album, file, files).await?,
            Self::Local(client) => client.link_album(album, file, files).await?,
        })
    }

    async fn get_album(&self, album: AlbumId) -> Result<AlbumRecord, Self::Error> {
        Ok(match self {
            Self::Rest(client) => client.get_album(album).await?,
            Self::Local(client) => client.get_album(album).await?,
        })
    }

    async fn list_albums(&self) -> Result<Vec<AlbumRecord>, Self::Error> {
        Ok(match self {
            Self::Rest(client) => client.list_albums().await?,
            Self::Local(client) => client.list_albums().await?,
        })
    }
}

impl object::Client for Storage {
    type Error = Error;

    async fn put(
        &self,
        path: &str,
        content_type: &str,
        body: bytes::Bytes,
        progress: &ProgressSink,
    ) -> Result<(), Self::Error> {
        match self {
            Self::R2(client) => client.put(path, content_type, body, progress).await?,
            Self::Local(client) => client.put(path, content_type, body, progress).await?,
        }
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, Self::Error> {
        Ok(match self {
            Self::R2(client) => client.download_url(path).await?,
            Self::Local(client) => client.download_url(path).await?,
        })
    }
}
