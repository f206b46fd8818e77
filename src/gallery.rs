//! Ordered, de-duplicated view over uploaded and fetched records.

use indexmap::IndexMap;

use crate::{
    progress::ProgressMap,
    record::{FileId, UploadRecord},
};

/// Records unique by id, ordered by creation time, newest first.
#[derive(Debug, Clone, Default)]
pub struct GalleryView(IndexMap<FileId, UploadRecord>);

impl GalleryView {
    pub fn from_records(records: impl IntoIterator<Item = UploadRecord>) -> Self {
        Self::default().merge(records)
    }

    /// Prepend incoming records not already present and restore the ordering.
    /// Ties keep incoming records ahead of older entries.
    pub fn merge(&self, incoming: impl IntoIterator<Item = UploadRecord>) -> Self {
        let mut merged = IndexMap::with_capacity(self.0.len());
        for record in incoming {
            if !self.0.contains_key(&record.id) {
                merged.entry(record.id).or_insert(record);
            }
        }
        merged.extend(self.0.iter().map(|(id, record)| (*id, record.clone())));
        merged.sort_by(|_, a, _, b| b.created_at.cmp(&a.created_at));
        Self(merged)
    }

    pub fn remove(&self, id: FileId) -> Self {
        let mut records = self.0.clone();
        records.shift_remove(&id);
        Self(records)
    }

    pub fn get(&self, id: FileId) -> Option<&UploadRecord> {
        self.0.get(&id)
    }

    pub fn contains(&self, id: FileId) -> bool {
        self.0.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadRecord> {
        self.0.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = FileId> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Views are equal when they hold the same records in the same order.
impl PartialEq for GalleryView {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().eq(other.0.iter())
    }
}

/// What a view layer observes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GalleryState {
    pub loading: bool,
    pub records: GalleryView,
    pub progress: ProgressMap,
}
