use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VfsError>;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("File has already been closed")]
    Closed,
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Cannot seek to negative position {0}")]
    InvalidSeek(i64),
    #[error("`{path}` on client {client_id} is not a directory")]
    NotDirectory { client_id: String, path: String },
    #[error("`{0}` is a directory")]
    IsDirectory(String),
    #[error("`{0}` was not found")]
    NotFound(String),
    #[error("Access forbidden: {0}")]
    AccessForbidden(String),
    #[error("Approval to access client {client_id} is missing: {reason}")]
    ApprovalMissing { client_id: String, reason: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Parsing error")]
    Parse,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VfsError {
    /// Turn a provider-level access denial into the domain failure
    /// naming the client that needs an approval. Other errors pass through.
    pub fn for_client(self, client_id: &str) -> Self {
        match self {
            VfsError::AccessForbidden(reason) => VfsError::ApprovalMissing {
                client_id: client_id.to_owned(),
                reason,
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for VfsError {
    fn from(_: serde_json::Error) -> Self {
        Self::Parse
    }
}

impl From<url::ParseError> for VfsError {
    fn from(_: url::ParseError) -> Self {
        Self::Parse
    }
}

impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        let kind = match &e {
            VfsError::Io(inner) => inner.kind(),
            VfsError::Unsupported(_) => io::ErrorKind::Unsupported,
            VfsError::InvalidSeek(_) => io::ErrorKind::InvalidInput,
            VfsError::NotFound(_) => io::ErrorKind::NotFound,
            VfsError::AccessForbidden(_) | VfsError::ApprovalMissing { .. } => {
                io::ErrorKind::PermissionDenied
            }
            _ => io::ErrorKind::Other,
        };
        match e {
            VfsError::Io(inner) => inner,
            other => io::Error::new(kind, other),
        }
    }
}
