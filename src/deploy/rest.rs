use serde::de::DeserializeOwned;
use tracing::{trace, warn};
use url::Url;

use crate::{
    job::storage::catalog::{self, AlbumFile, Files, NewFile},
    record::{AlbumId, AlbumRecord, CatalogFile, FileId},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(reqwest::Error),
    #[error("Catalog responded {status} for {url}: {body}")]
    Status {
        status: reqwest::StatusCode,
        url: Url,
        body: String,
    },
    #[error("Parse JSON error: {0}")]
    ParseJson(serde_json::Error),
    #[error("Invalid endpoint: {0}")]
    Endpoint(url::ParseError),
}

/// JSON-over-HTTPS catalog client.
pub struct Client {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl Client {
    pub fn new(mut base: Url, token: Option<String>) -> Self {
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Self {
            client: reqwest::Client::new(),
            base,
            token,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base.join(path).map_err(Error::Endpoint)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, Error> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(Error::Transport)?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await.map_err(Error::Transport)?;
        trace!(%url, %status, %body, "catalog response");
        if !status.is_success() {
            warn!(%url, %status, "catalog request failed");
            return Err(Error::Status { status, url, body });
        }
        Ok(body)
    }

    async fn send_json<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<R, Error> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(Error::ParseJson)
    }
}

impl catalog::Client for Client {
    type Error = Error;

    async fn create_files(&self, files: &[NewFile]) -> Result<Vec<CatalogFile>, Self::Error> {
        let url = self.endpoint("api/v1/files/")?;
        self.send_json(self.client.post(url).json(&Files { files }))
            .await
    }

    async fn list_files(&self) -> Result<Vec<CatalogFile>, Self::Error> {
        let url = self.endpoint("api/v1/files/")?;
        self.send_json(self.client.get(url)).await
    }

    async fn delete_file(&self, id: FileId) -> Result<(), Self::Error> {
        let url = self.endpoint(&format!("api/v1/files/{id}/"))?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn link_album(
        &self,
        album: AlbumId,
        file: FileId,
        files: &[AlbumFile],
    ) -> Result<AlbumRecord, Self::Error> {
        let url = self.endpoint(&format!("api/v1/albums/{album}/files/{file}/"))?;
        self.send_json(self.client.post(url).json(&Files { files }))
            .await
    }

    async fn get_album(&self, album: AlbumId) -> Result<AlbumRecord, Self::Error> {
        let url = self.endpoint(&format!("api/v1/albums/{album}/"))?;
        self.send_json(self.client.get(url)).await
    }

    async fn list_albums(&self) -> Result<Vec<AlbumRecord>, Self::Error> {
        let url = self.endpoint("api/v1/albums/")?;
        self.send_json(self.client.get(url)).await
    }
}
