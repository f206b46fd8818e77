//! The per-file pipeline: extract, register, link, transfer.
//!
//! Each stage consumes the accumulated state of the previous one by value, so
//! nothing is shared between the pipelines of a batch.

use std::pin::pin;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    Orchestrator, registrar,
    storage::{catalog, object},
    uploader,
};
use crate::{
    ErrorContext, ErrorDetail,
    metadata::{self, FrameDecoder},
    progress::EntryStatus,
    record::{AlbumRecord, CatalogFile, GeoData, RawFile, UploadContext, UploadRecord, UserId},
};

struct Extracted {
    file: RawFile,
    ctx: ErrorContext,
    geo_data: Option<GeoData>,
    preview_path: Option<String>,
}

struct Registered {
    extracted: Extracted,
    entry: CatalogFile,
    ctx: ErrorContext,
}

impl<C: catalog::Client, S: object::Client, D: FrameDecoder> Orchestrator<C, S, D> {
    async fn extract(&self, user: UserId, file: RawFile) -> Extracted {
        self.reporter.update_entry(&file.name, EntryStatus::Extracting);
        let ctx = ErrorContext::file(&file.name);
        let (geo_data, preview_path) = {
            let preview = pin!(metadata::render_preview(
                &self.decoder,
                &self.store,
                user,
                &file
            ));
            let geo_data = metadata::extract_geo_data(&file);
            if geo_data.is_none() {
                debug!(name = %file.name, "no geodata");
            }
            // registration goes ahead without a preview that is not ready in time
            let preview_path = match tokio::time::timeout(self.preview_wait, preview).await {
                Ok(path) => path,
                Err(_) => {
                    warn!(name = %file.name, wait = ?self.preview_wait, "preview not ready, registering without it");
                    None
                }
            };
            (geo_data, preview_path)
        };
        Extracted {
            file,
            ctx,
            geo_data,
            preview_path,
        }
    }

    async fn register(
        &self,
        user: UserId,
        extracted: Extracted,
    ) -> Result<Registered, crate::Error> {
        self.reporter
            .update_entry(&extracted.file.name, EntryStatus::Registering);
        let storage_path = uploader::blob_path(user, &extracted.file.name);
        let entry = registrar::register_file(
            &self.catalog,
            &extracted.ctx,
            &storage_path,
            extracted.preview_path.as_deref(),
            extracted.geo_data,
        )
        .await?;
        let ctx = extracted.ctx.with_id(entry.id);
        Ok(Registered {
            extracted,
            entry,
            ctx,
        })
    }

    async fn link(&self, registered: &Registered) -> Result<Option<AlbumRecord>, crate::Error> {
        let UploadContext::Album(album) = self.context else {
            return Ok(None);
        };
        self.reporter
            .update_entry(&registered.extracted.file.name, EntryStatus::Linking);
        registrar::link_to_album(
            &self.catalog,
            &registered.ctx,
            album,
            registered.entry.id,
            &registered.entry.file,
            registered.entry.preview.as_deref(),
        )
        .await
        .map(Some)
    }

    async fn transfer(&self, registered: Registered) -> Result<UploadRecord, crate::Error> {
        let Registered {
            extracted,
            entry,
            ctx,
        } = registered;
        let id = entry.id;
        let name = extracted.file.name.as_str();
        let upload = uploader::upload(&self.store, &extracted.file, &entry.file);
        let download_url = upload
            .drive(|event| {
                self.state
                    .send_modify(|state| state.progress.set(id, event.percent));
                self.reporter.update_entry(
                    name,
                    EntryStatus::Uploading {
                        percent: event.percent,
                    },
                );
            })
            .await
            .map_err(|error| ctx.error(ErrorDetail::Transfer(Box::new(error))))?;
        Ok(UploadRecord {
            id,
            name: extracted.file.name,
            author_id: entry.author,
            created_at: entry.created_at,
            storage_path: entry.file,
            preview_path: entry.preview,
            geo_data: entry.geodata,
            download_url,
        })
    }

    /// The blob is transferred even when the album link fails. The link error is
    /// returned once the transfer settles.
    async fn stages(&self, user: UserId, file: RawFile) -> Result<UploadRecord, crate::Error> {
        let extracted = self.extract(user, file).await;
        let registered = self.register(user, extracted).await?;
        let id = registered.entry.id;
        let linked = self.link(&registered).await;
        let transferred = self.transfer(registered).await;
        self.state.send_modify(|state| state.progress.remove(id));
        match linked {
            Ok(Some(album)) => {
                debug!(album = %album.id, files = album.files.len(), "album updated");
            }
            Ok(None) => {}
            Err(error) => {
                if let Err(transfer) = &transferred {
                    warn!(%transfer, "transfer of unlinked file failed too");
                }
                return Err(error);
            }
        }
        transferred
    }

    /// Run one file through every stage. Stops at the next suspension point once
    /// `cancel` fires.
    pub(super) async fn run_pipeline(
        &self,
        user: UserId,
        file: RawFile,
        cancel: &CancellationToken,
    ) -> Result<UploadRecord, crate::Error> {
        let name = file.name.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(ErrorContext::file(&name).error(ErrorDetail::Cancelled))
            }
            result = self.stages(user, file) => result,
        };
        match &result {
            Ok(record) => {
                debug!(%name, id = %record.id, "pipeline finished");
                self.reporter.update_entry(&name, EntryStatus::Done);
            }
            Err(error) => self
                .reporter
                .update_entry(&name, EntryStatus::Failed(error.detail.to_string())),
        }
        result
    }
}
