use url::Url;

use crate::file::VfsFile;
use crate::provider::{BlobSource, EntryProvider, StatEntry};
use crate::source::{ChunkFetch, Chunks};
use crate::{Result, VfsConfig, VfsError};

/// Read-only view over the VFS of one remote client.
///
/// Every access failure reported by the provider is raised as
/// [`VfsError::ApprovalMissing`] naming the client.
pub struct Vfs<P> {
    provider: P,
    config: VfsConfig,
}

impl<P: EntryProvider> Vfs<P> {
    pub fn new(provider: P, config: VfsConfig) -> Self {
        Self { provider, config }
    }

    pub fn client_id(&self) -> &str {
        self.provider.client_id()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Lists contents of a directory.
    ///
    /// With `max_depth > 1` the result also includes the contents of
    /// subdirectories down to that depth: first the immediate children,
    /// then the descendants of each child in child order. Children that
    /// turn out not to be directories are kept but not descended into.
    pub fn list(&self, path: &str, max_depth: u32) -> Result<Vec<StatEntry>> {
        if max_depth < 1 {
            return Ok(vec![]);
        }

        let entry = self
            .provider
            .get(path)
            .map_err(|e| e.for_client(self.client_id()))?;
        if !entry.is_directory {
            return Err(VfsError::NotDirectory {
                client_id: self.client_id().to_owned(),
                path: path.to_owned(),
            });
        }

        log::debug!("listing {} (depth {})", path, max_depth);
        let mut entries = self
            .provider
            .list_children(&entry)
            .map_err(|e| e.for_client(self.client_id()))?;

        let mut inner = Vec::new();
        for child in &entries {
            match self.list(&child.path, max_depth - 1) {
                Ok(descendants) => inner.extend(descendants),
                Err(VfsError::NotDirectory { path, .. }) => {
                    log::trace!("{} is not a directory, skipping", path);
                }
                Err(e) => return Err(e),
            }
        }
        entries.extend(inner);
        Ok(entries)
    }

    /// Syncs the collected VFS with the current filesystem of the client,
    /// descending into subdirectories when `max_depth > 1`.
    pub fn refresh(&self, path: &str, max_depth: u32) -> Result<()> {
        log::info!(
            "refreshing {} on client {} (depth {})",
            path,
            self.client_id(),
            max_depth
        );
        let result = if max_depth > 1 {
            self.provider.refresh_recursively(path, max_depth)
        } else {
            self.provider.refresh(path)
        };
        result.map_err(|e| e.for_client(self.client_id()))
    }

    /// Direct link to the content of a file through the admin UI.
    pub fn download_url(&self, path: &str) -> Result<Url> {
        let base = self.config.admin_ui_url.as_ref().ok_or_else(|| {
            VfsError::Config("admin UI URL has not been specified".to_owned())
        })?;

        let entry = self
            .provider
            .get(path)
            .map_err(|e| e.for_client(self.client_id()))?;
        if entry.is_directory {
            return Err(VfsError::IsDirectory(path.to_owned()));
        }

        let link = format!(
            "{}/api/clients/{}/vfs-blob/{}",
            base.as_str().trim_end_matches('/'),
            self.client_id(),
            self.config.vfs_path(path)
        );
        Ok(Url::parse(&link)?)
    }
}

impl<P: EntryProvider + BlobSource> Vfs<P> {
    /// Opens a read-only file object for the file at `path`.
    ///
    /// No content is fetched until the first read.
    pub fn open(&self, path: &str) -> Result<VfsFile<impl ChunkFetch + '_>> {
        self.provider
            .verify_access()
            .map_err(|e| e.for_client(self.client_id()))?;

        let path = path.to_owned();
        let provider = &self.provider;
        Ok(VfsFile::new(move |offset: u64| -> Result<Chunks> {
            let client_id = provider.client_id().to_owned();
            let chunks = provider
                .fetch_blob(&path, offset)
                .map_err(|e| e.for_client(&client_id))?;
            Ok(Box::new(chunks.map(move |chunk| {
                chunk.map_err(|e| e.for_client(&client_id))
            })))
        }))
    }
}
