use crate::record::FileId;

pub mod config;
pub mod deploy;
pub mod gallery;
pub mod job;
pub mod metadata;
pub mod progress;
pub mod record;

#[cfg(test)]
mod tests;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[error("{context}: {detail}")]
pub struct Error {
    pub context: Box<ErrorContext>,
    pub detail: Box<ErrorDetail>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub file_name: Option<String>,
    pub id: Option<FileId>,
}

impl ErrorContext {
    pub(crate) fn file(name: impl Into<String>) -> Self {
        Self {
            file_name: Some(name.into()),
            id: None,
        }
    }

    pub(crate) fn with_id(&self, id: FileId) -> Self {
        Self {
            file_name: self.file_name.clone(),
            id: Some(id),
        }
    }

    pub(crate) fn error(&self, detail: ErrorDetail) -> Error {
        Error {
            context: Box::new(self.clone()),
            detail: Box::new(detail),
        }
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file_name, &self.id) {
            (Some(name), Some(id)) => write!(f, "{name}(#{id})"),
            (Some(name), None) => f.write_str(name),
            (None, Some(id)) => write!(f, "#{id}"),
            (None, None) => f.write_str("gallery"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorDetail {
    #[error("Failed to transfer blob: {0}")]
    Transfer(BoxError),
    #[error("Failed to register file: {0}")]
    Registration(BoxError),
    #[error("Catalog returned no record for the registered file")]
    EmptyRegistration,
    #[error("File registered but not linked to album: {0}")]
    Link(BoxError),
    #[error("Failed to fetch catalog entries: {0}")]
    Fetch(BoxError),
    #[error("Failed to remove file: {0}")]
    Removal(BoxError),
    #[error("No authenticated user")]
    Unauthenticated,
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.detail, ErrorDetail::Cancelled)
    }
}
