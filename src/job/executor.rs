//! Upload orchestrator
//!
//! Drives one pipeline per submitted file, merges the settled records into the
//! gallery view, loads the base set for the current context and removes files.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use itertools::Itertools as _;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::storage::{catalog, object};
use crate::{
    ErrorContext, ErrorDetail,
    gallery::{GalleryState, GalleryView},
    metadata::{FfmpegDecoder, FrameDecoder},
    progress::{BatchPhase, NullReporter, ProgressMap, ProgressReporter},
    record::{CatalogFile, FileId, RawFile, UploadContext, UploadRecord, UserId},
};

pub const DEFAULT_PREVIEW_WAIT: Duration = Duration::from_secs(5);

/// Settled result of one `submit` call.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Successful records, newest first.
    pub records: Vec<UploadRecord>,
    pub failures: Vec<crate::Error>,
}

pub struct Orchestrator<C, S, D = FfmpegDecoder> {
    pub(super) catalog: C,
    pub(super) store: S,
    pub(super) decoder: D,
    pub(super) user: Option<UserId>,
    pub(super) context: UploadContext,
    pub(super) preview_wait: Duration,
    pub(super) reporter: Arc<dyn ProgressReporter>,
    pub(super) state: watch::Sender<GalleryState>,
    cancel: Mutex<CancellationToken>,
    in_flight: AtomicUsize,
    /// Bumped every time a batch is merged.
    generation: AtomicU64,
    /// Merged records tagged with the generation of their batch.
    settled: Mutex<Vec<(u64, UploadRecord)>>,
}

/// Keeps `loading` set while at least one operation is running.
struct Loading<'a> {
    in_flight: &'a AtomicUsize,
    state: &'a watch::Sender<GalleryState>,
}

impl<'a> Loading<'a> {
    fn begin(in_flight: &'a AtomicUsize, state: &'a watch::Sender<GalleryState>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        state.send_if_modified(|state| !std::mem::replace(&mut state.loading, true));
        Self { in_flight, state }
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.send_modify(|state| state.loading = false);
        }
    }
}

impl<C: catalog::Client, S: object::Client, D: FrameDecoder> Orchestrator<C, S, D> {
    pub fn new(
        catalog: C,
        store: S,
        decoder: D,
        user: Option<UserId>,
        context: UploadContext,
    ) -> Self {
        Self {
            catalog,
            store,
            decoder,
            user,
            context,
            preview_wait: DEFAULT_PREVIEW_WAIT,
            reporter: Arc::new(NullReporter),
            state: watch::Sender::new(GalleryState::default()),
            cancel: Mutex::default(),
            in_flight: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            settled: Mutex::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_preview_wait(mut self, wait: Duration) -> Self {
        self.preview_wait = wait;
        self
    }

    pub fn context(&self) -> UploadContext {
        self.context
    }

    pub fn subscribe(&self) -> watch::Receiver<GalleryState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> GalleryState {
        self.state.borrow().clone()
    }

    /// Stop in-flight pipelines and drop their late results. Operations started
    /// afterwards run normally.
    pub fn cancel(&self) {
        info!("cancelling gallery operations");
        let mut current = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *current).cancel();
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn loading(&self) -> Loading<'_> {
        Loading::begin(&self.in_flight, &self.state)
    }

    /// Run every file through its pipeline concurrently and merge the successful
    /// records into the view. A failing file never fails the batch.
    pub async fn submit(&self, files: Vec<RawFile>) -> BatchOutcome {
        let Some(user) = self.user else {
            let failures = files
                .iter()
                .map(|file| ErrorContext::file(&file.name).error(ErrorDetail::Unauthenticated))
                .collect::<Vec<_>>();
            warn!(count = failures.len(), "upload rejected without a signed-in user");
            return BatchOutcome {
                records: Vec::new(),
                failures,
            };
        };
        if files.is_empty() {
            return BatchOutcome::default();
        }
        let _loading = self.loading();
        self.reporter.set_phase(BatchPhase::Uploading);
        self.reporter
            .register_entries(files.iter().map(|file| file.name.clone()).collect());
        debug!(count = files.len(), context = ?self.context, "batch started");

        let cancel = self.cancel_token();
        let settled = join_all(
            files
                .into_iter()
                .map(|file| self.run_pipeline(user, file, &cancel)),
        )
        .await;
        let (mut records, failures): (Vec<_>, Vec<_>) = settled.into_iter().partition_result();
        for failure in &failures {
            error!(error = %failure, "upload pipeline failed");
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if cancel.is_cancelled() {
            warn!(count = records.len(), "batch cancelled, results not merged");
            self.state
                .send_modify(|state| state.progress = ProgressMap::default());
            self.reporter.set_phase(BatchPhase::Failed("cancelled".into()));
        } else {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.settled
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(records.iter().map(|record| (generation, record.clone())));
            self.state.send_modify(|state| {
                state.records = state.records.merge(records.iter().cloned());
            });
            self.reporter.set_phase(BatchPhase::Completed);
            info!(
                uploaded = records.len(),
                failed = failures.len(),
                "batch settled"
            );
        }
        BatchOutcome { records, failures }
    }

    /// Records merged after generation `since`. Older entries are dropped once no
    /// other operation is running.
    fn settled_since(&self, since: u64) -> Vec<UploadRecord> {
        let mut settled = self.settled.lock().unwrap_or_else(PoisonError::into_inner);
        let recent = settled
            .iter()
            .filter(|(generation, _)| *generation > since)
            .map(|(_, record)| record.clone())
            .collect();
        if self.in_flight.load(Ordering::SeqCst) == 1 {
            settled.retain(|(generation, _)| *generation > since);
        }
        recent
    }

    async fn fetch_entries(&self) -> Result<Vec<CatalogFile>, C::Error> {
        match (self.user, self.context) {
            (Some(_), UploadContext::Personal) => self.catalog.list_files().await,
            (Some(_), UploadContext::Album(album)) => {
                Ok(self.catalog.get_album(album).await?.files)
            }
            (None, _) => Ok(self
                .catalog
                .list_albums()
                .await?
                .into_iter()
                .next()
                .map(|album| album.files)
                .unwrap_or_default()),
        }
    }

    /// Entries whose blob cannot be resolved are left out; only a failing listing
    /// fails the fetch.
    async fn fetch_records(&self) -> Result<Vec<UploadRecord>, crate::Error> {
        let entries = self.fetch_entries().await.map_err(|error| {
            ErrorContext::default().error(ErrorDetail::Fetch(Box::new(error)))
        })?;
        let resolved = join_all(entries.into_iter().map(|entry| async move {
            match self.store.download_url(&entry.file).await {
                Ok(url) => Some(UploadRecord::from_catalog(entry, url)),
                Err(error) => {
                    warn!(%error, id = %entry.id, path = %entry.file, "skipping entry without a resolvable blob");
                    None
                }
            }
        }))
        .await;
        Ok(resolved.into_iter().flatten().collect())
    }

    /// Load the existing entries of the current context as the base set. On failure
    /// the view keeps its last-known state.
    pub async fn fetch_context(&self) -> Result<usize, crate::Error> {
        let _loading = self.loading();
        self.reporter.set_phase(BatchPhase::FetchingContext);
        let cancel = self.cancel_token();
        let since = self.generation.load(Ordering::SeqCst);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(ErrorContext::default().error(ErrorDetail::Cancelled))
            }
            result = self.fetch_records() => result,
        };
        let records = result
            .inspect_err(|error| {
                error!(%error, "failed to fetch existing files");
                self.reporter
                    .set_phase(BatchPhase::Failed(error.detail.to_string()));
            })?;
        let count = records.len();
        // batches merged while the listing was in flight survive it
        let view = GalleryView::from_records(records).merge(self.settled_since(since));
        self.state.send_modify(|state| state.records = view);
        self.reporter.set_phase(BatchPhase::Completed);
        debug!(count, context = ?self.context, "context fetched");
        Ok(count)
    }

    /// Delete a file from the catalog, then prune it from the view. The delete is
    /// issued even when the id is not in the view.
    pub async fn remove(&self, id: FileId) -> Result<(), crate::Error> {
        let _loading = self.loading();
        self.reporter.set_phase(BatchPhase::Removing);
        let ctx = ErrorContext {
            id: Some(id),
            ..Default::default()
        };
        self.catalog
            .delete_file(id)
            .await
            .map_err(|error| ctx.error(ErrorDetail::Removal(Box::new(error))))
            .inspect_err(|error| {
                error!(%error, "failed to remove file");
                self.reporter
                    .set_phase(BatchPhase::Failed(error.detail.to_string()));
            })?;
        self.settled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(_, record)| record.id != id);
        self.state
            .send_modify(|state| state.records = state.records.remove(id));
        self.reporter.set_phase(BatchPhase::Completed);
        debug!(%id, "file removed");
        Ok(())
    }
}
