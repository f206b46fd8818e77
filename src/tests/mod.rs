use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use image::DynamicImage;
use tokio::sync::Notify;

use crate::{
    deploy::local::{
        catalog::{self as local_catalog, CatalogClient, LocalCatalog},
        storage::{self as local_storage, LocalStorage},
    },
    job::{
        Orchestrator,
        storage::{
            catalog::{self, AlbumFile, Client as _, NewFile},
            object::{self, ProgressSink},
        },
    },
    metadata::{self, FrameDecoder},
    progress::{BatchPhase, EntryStatus, ProgressReporter},
    record::{AlbumId, AlbumRecord, CatalogFile, FileId, RawFile, UploadContext, UserId},
};

mod gallery;
mod upload;

const USER: UserId = UserId(42);

#[derive(Debug, thiserror::Error)]
enum Fault {
    #[error("injected failure: {0}")]
    Injected(String),
    #[error(transparent)]
    Catalog(#[from] local_catalog::Error),
    #[error(transparent)]
    Storage(#[from] local_storage::Error),
}

/// Local catalog that fails selected calls on demand.
struct FaultyCatalog {
    inner: CatalogClient,
    fail_link: bool,
    fail_delete: bool,
    fail_listing: Arc<AtomicBool>,
    links: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
}

impl FaultyCatalog {
    fn listing(&self) -> Result<(), Fault> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Fault::Injected("listing".into()));
        }
        Ok(())
    }
}

impl catalog::Client for FaultyCatalog {
    type Error = Fault;

    async fn create_files(&self, files: &[NewFile]) -> Result<Vec<CatalogFile>, Self::Error> {
        Ok(self.inner.create_files(files).await?)
    }

    async fn list_files(&self) -> Result<Vec<CatalogFile>, Self::Error> {
        self.listing()?;
        Ok(self.inner.list_files().await?)
    }

    async fn delete_file(&self, id: FileId) -> Result<(), Self::Error> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(Fault::Injected(format!("delete {id}")));
        }
        Ok(self.inner.delete_file(id).await?)
    }

    async fn link_album(
        &self,
        album: AlbumId,
        file: FileId,
        files: &[AlbumFile],
    ) -> Result<AlbumRecord, Self::Error> {
        self.links.fetch_add(1, Ordering::SeqCst);
        if self.fail_link {
            return Err(Fault::Injected(format!("link {file} to {album}")));
        }
        Ok(self.inner.link_album(album, file, files).await?)
    }

    async fn get_album(&self, album: AlbumId) -> Result<AlbumRecord, Self::Error> {
        self.listing()?;
        Ok(self.inner.get_album(album).await?)
    }

    async fn list_albums(&self) -> Result<Vec<AlbumRecord>, Self::Error> {
        self.listing()?;
        Ok(self.inner.list_albums().await?)
    }
}

/// Local storage that fails or stalls puts whose path contains a pattern.
struct FaultyStore {
    inner: LocalStorage,
    fail_put: Option<&'static str>,
    stall_put: Option<(&'static str, Arc<Notify>)>,
}

impl object::Client for FaultyStore {
    type Error = Fault;

    async fn put(
        &self,
        path: &str,
        content_type: &str,
        body: bytes::Bytes,
        progress: &ProgressSink,
    ) -> Result<(), Self::Error> {
        if let Some(pattern) = self.fail_put
            && path.contains(pattern)
        {
            return Err(Fault::Injected(format!("put {path}")));
        }
        if let Some((pattern, entered)) = &self.stall_put
            && path.contains(pattern)
        {
            entered.notify_one();
            std::future::pending::<()>().await;
        }
        Ok(self.inner.put(path, content_type, body, progress).await?)
    }

    async fn download_url(&self, path: &str) -> Result<String, Self::Error> {
        Ok(self.inner.download_url(path).await?)
    }
}

/// Decodes every video to a blank frame.
struct StillDecoder;

impl FrameDecoder for StillDecoder {
    async fn first_frame(&self, _file: &RawFile) -> Result<DynamicImage, metadata::Error> {
        Ok(DynamicImage::new_rgb8(8, 8))
    }
}

struct BrokenDecoder;

impl FrameDecoder for BrokenDecoder {
    async fn first_frame(&self, _file: &RawFile) -> Result<DynamicImage, metadata::Error> {
        Err(metadata::Error::Io(std::io::Error::other("no decoder")))
    }
}

/// Never finishes within any reasonable preview wait.
struct StalledDecoder;

impl FrameDecoder for StalledDecoder {
    async fn first_frame(&self, _file: &RawFile) -> Result<DynamicImage, metadata::Error> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(DynamicImage::new_rgb8(8, 8))
    }
}

#[derive(Default)]
struct RecordingReporter {
    phases: Mutex<Vec<BatchPhase>>,
    entries: Mutex<Vec<(String, EntryStatus)>>,
}

impl RecordingReporter {
    fn statuses(&self, entry: &str) -> Vec<EntryStatus> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == entry)
            .map(|(_, status)| status.clone())
            .collect()
    }

    fn upload_percents(&self, entry: &str) -> Vec<u8> {
        self.statuses(entry)
            .into_iter()
            .filter_map(|status| match status {
                EntryStatus::Uploading { percent } => Some(percent),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn set_phase(&self, phase: BatchPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn register_entries(&self, entries: Vec<String>) {
        let mut recorded = self.entries.lock().unwrap();
        recorded.extend(entries.into_iter().map(|name| (name, EntryStatus::Pending)));
    }

    fn update_entry(&self, entry: &str, status: EntryStatus) {
        self.entries.lock().unwrap().push((entry.to_owned(), status));
    }

    fn finish(&self) {}
}

struct Fixture {
    catalog: LocalCatalog,
    storage: LocalStorage,
}

impl Fixture {
    async fn new() -> Self {
        let catalog = LocalCatalog::open("sqlite::memory:").await.unwrap();
        let storage = LocalStorage::open("sqlite::memory:")
            .await
            .unwrap()
            .with_chunk_size(16);
        Self { catalog, storage }
    }

    fn catalog_client(&self, user: Option<UserId>) -> FaultyCatalog {
        FaultyCatalog {
            inner: self.catalog.client(user),
            fail_link: false,
            fail_delete: false,
            fail_listing: Arc::default(),
            links: Arc::default(),
            deletes: Arc::default(),
        }
    }

    fn store(&self) -> FaultyStore {
        FaultyStore {
            inner: self.storage.clone(),
            fail_put: None,
            stall_put: None,
        }
    }

    fn orchestrator(
        &self,
        user: Option<UserId>,
        context: UploadContext,
    ) -> Orchestrator<FaultyCatalog, FaultyStore, StillDecoder> {
        Orchestrator::new(
            self.catalog_client(user),
            self.store(),
            StillDecoder,
            user,
            context,
        )
    }

    async fn stored_files(&self) -> Vec<CatalogFile> {
        self.catalog.client(Some(USER)).list_files().await.unwrap()
    }
}

fn photo(name: &str) -> RawFile {
    RawFile::new(name, mime::IMAGE_JPEG, vec![0xAB; 40])
}

fn clip(name: &str) -> RawFile {
    RawFile::new(name, "video/mp4".parse().unwrap(), vec![0; 64])
}

fn assert_newest_first<'a>(records: impl IntoIterator<Item = &'a crate::record::UploadRecord>) {
    let records = records.into_iter().collect::<Vec<_>>();
    for pair in records.windows(2) {
        assert!(
            pair[0].created_at >= pair[1].created_at,
            "{} listed before newer {}",
            pair[0].name,
            pair[1].name
        );
    }
}
