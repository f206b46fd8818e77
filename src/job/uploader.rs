//! Blob transfer into object storage with a progress stream.

use futures::{StreamExt as _, future::LocalBoxFuture};

use super::storage::object::{self, ProgressEvent, ProgressSink};
use crate::record::{RawFile, UserId};

pub fn blob_path(user: UserId, file_name: &str) -> String {
    format!("images/{user}/{file_name}")
}

pub fn preview_path(user: UserId, file_name: &str) -> String {
    format!("previews/{user}/{file_name}.jpeg")
}

/// An in-flight transfer. Progress ends when the transfer settles.
pub struct BlobUpload<'a, E> {
    progress: async_channel::Receiver<ProgressEvent>,
    transfer: LocalBoxFuture<'a, Result<String, E>>,
}

impl<'a, E> BlobUpload<'a, E> {
    pub fn progress(&self) -> async_channel::Receiver<ProgressEvent> {
        self.progress.clone()
    }

    /// Resolves with the download URL of the stored blob.
    pub async fn finish(self) -> Result<String, E> {
        self.transfer.await
    }

    /// Run the transfer, feeding each progress event to `on_progress`.
    pub async fn drive(self, mut on_progress: impl FnMut(ProgressEvent)) -> Result<String, E> {
        let Self { progress, transfer } = self;
        let watch = progress.for_each(|event| {
            on_progress(event);
            async {}
        });
        let (url, ()) = futures::join!(transfer, watch);
        url
    }
}

pub fn upload<'a, S: object::Client>(
    store: &'a S,
    file: &'a RawFile,
    path: &'a str,
) -> BlobUpload<'a, S::Error> {
    let (sender, progress) = async_channel::unbounded();
    let transfer = async move {
        // the sink owns the only sender, so progress closes once it is dropped here
        let sink = ProgressSink::new(file.size(), sender);
        store
            .put(path, file.content_type.as_ref(), file.body.clone(), &sink)
            .await?;
        sink.complete();
        drop(sink);
        store.download_url(path).await
    };
    BlobUpload {
        progress,
        transfer: Box::pin(transfer),
    }
}

/// Store a blob without observing progress.
pub async fn store<S: object::Client>(
    store: &S,
    path: &str,
    content_type: &str,
    body: bytes::Bytes,
) -> Result<(), S::Error> {
    let (sender, _) = async_channel::bounded(1);
    let sink = ProgressSink::new(body.len() as u64, sender);
    store.put(path, content_type, body, &sink).await
}
