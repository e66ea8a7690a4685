use serde::{Deserialize, Serialize};

use crate::source::Chunks;
use crate::Result;

/// Metadata of a single VFS entry as reported by the remote side.
#[derive(Eq, PartialEq, Hash, Clone, Debug, Deserialize, Serialize)]
pub struct StatEntry {
    /// Absolute client-side path, `/`-separated
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub modified: Option<u64>,
}

impl StatEntry {
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
            size: 0,
            modified: None,
        }
    }

    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            size,
            modified: None,
        }
    }

    /// Last path component, empty for the root.
    pub fn name(&self) -> &str {
        self.path
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// Access to the directory structure of one remote client.
///
/// Any call may fail with [`crate::VfsError::AccessForbidden`] when the
/// caller holds no approval for the client.
pub trait EntryProvider {
    /// Identity of the client the entries belong to.
    fn client_id(&self) -> &str;

    fn get(&self, path: &str) -> Result<StatEntry>;

    /// Immediate children of a directory entry, in provider order.
    fn list_children(&self, entry: &StatEntry) -> Result<Vec<StatEntry>>;

    /// Ask the remote side to resynchronize the metadata of `path`
    /// and wait until it is done.
    fn refresh(&self, path: &str) -> Result<()>;

    /// Same as [`EntryProvider::refresh`], descending up to `max_depth`
    /// levels below `path`.
    fn refresh_recursively(&self, path: &str, max_depth: u32) -> Result<()>;

    /// Check that the caller may read content of this client.
    fn verify_access(&self) -> Result<()>;
}

/// Access to file content of one remote client.
pub trait BlobSource {
    /// Content of the file at `path` starting at byte `offset`.
    fn fetch_blob(&self, path: &str, offset: u64) -> Result<Chunks>;
}
