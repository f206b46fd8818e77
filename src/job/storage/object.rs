use std::sync::atomic::{AtomicU8, Ordering};

/// Percent-complete of one blob transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
}

/// Receives transferred byte counts from an object store and forwards them as
/// non-decreasing percentages.
pub struct ProgressSink {
    total: u64,
    last: AtomicU8,
    sender: async_channel::Sender<ProgressEvent>,
}

impl ProgressSink {
    pub(crate) fn new(total: u64, sender: async_channel::Sender<ProgressEvent>) -> Self {
        let percent = percent_of(0, total);
        let _ = sender.try_send(ProgressEvent { percent });
        Self {
            total,
            last: AtomicU8::new(percent),
            sender,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Report the cumulative number of bytes transferred so far.
    pub fn report(&self, transferred: u64) {
        let percent = percent_of(transferred, self.total);
        let previous = self.last.fetch_max(percent, Ordering::Relaxed);
        if percent > previous {
            // the receiver is gone when nobody watches progress
            let _ = self.sender.try_send(ProgressEvent { percent });
        }
    }

    pub(crate) fn complete(&self) {
        if self.last.swap(100, Ordering::Relaxed) < 100 {
            let _ = self.sender.try_send(ProgressEvent { percent: 100 });
        }
    }
}

fn percent_of(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (transferred.min(total) as u128 * 100 / total as u128) as u8
}

pub trait Client {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Store `body` under `path`, reporting transferred bytes to `progress`.
    fn put(
        &self,
        path: &str,
        content_type: &str,
        body: bytes::Bytes,
        progress: &ProgressSink,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Publicly resolvable URL of a stored blob.
    fn download_url(&self, path: &str) -> impl Future<Output = Result<String, Self::Error>>;
}
