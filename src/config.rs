use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{
    deploy::{self, local, r2, rest},
    job::DEFAULT_PREVIEW_WAIT,
    metadata::FfmpegDecoder,
    record::UserId,
};

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub session: Session,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub catalog: CatalogBackend,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub storage: StorageBackend,
    #[serde(default)]
    pub pipeline: Pipeline,
}

/// The signed-in user. Without a user, uploads are rejected and listings show
/// the first album.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Session {
    pub user: Option<UserId>,
    pub token: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum CatalogBackend {
    Rest { base_url: Url },
    Local { url: String },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    R2 {
        account_id: String,
        bucket: String,
        access_key_id: String,
        secret_access_key: String,
        public_url: Url,
    },
    Local {
        url: String,
    },
}

#[derive(Deserialize, Debug, Clone)]
pub struct Pipeline {
    #[serde(default = "default_preview_wait_ms")]
    pub preview_wait_ms: u64,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_part_size")]
    pub part_size: usize,
}

fn default_preview_wait_ms() -> u64 {
    DEFAULT_PREVIEW_WAIT.as_millis() as u64
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_part_size() -> usize {
    8 * 1024 * 1024
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            preview_wait_ms: default_preview_wait_ms(),
            ffmpeg: default_ffmpeg(),
            part_size: default_part_size(),
        }
    }
}

impl Pipeline {
    pub fn preview_wait(&self) -> Duration {
        Duration::from_millis(self.preview_wait_ms)
    }

    pub fn decoder(&self) -> FfmpegDecoder {
        FfmpegDecoder::new(&self.ffmpeg)
    }
}

impl Config {
    pub async fn catalog(&self) -> Result<deploy::Catalog, sqlx::Error> {
        Ok(match &self.catalog {
            CatalogBackend::Rest { base_url } => deploy::Catalog::Rest(rest::Client::new(
                base_url.clone(),
                self.session.token.clone(),
            )),
            CatalogBackend::Local { url } => deploy::Catalog::Local(
                local::catalog::LocalCatalog::open(url)
                    .await?
                    .client(self.session.user),
            ),
        })
    }

    pub async fn storage(&self) -> Result<deploy::Storage, sqlx::Error> {
        Ok(match &self.storage {
            StorageBackend::R2 {
                account_id,
                bucket,
                access_key_id,
                secret_access_key,
                public_url,
            } => deploy::Storage::R2(
                r2::Client::new(
                    account_id,
                    access_key_id,
                    secret_access_key,
                    bucket,
                    public_url.clone(),
                    self.pipeline.part_size,
                )
                .await,
            ),
            StorageBackend::Local { url } => {
                deploy::Storage::Local(local::storage::LocalStorage::open(url).await?)
            }
        })
    }
}
