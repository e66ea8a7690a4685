use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use canonical_path::CanonicalPathBuf;

use crate::provider::{BlobSource, EntryProvider, StatEntry};
use crate::source::Chunks;
use crate::{Result, VfsError, DEFAULT_CHUNK_SIZE};

/// Provider serving a local directory tree as the VFS of one client.
///
/// Client path `/` is the root directory; local metadata never goes
/// stale, so refreshing only validates the path.
pub struct LocalFs {
    client_id: String,
    root: CanonicalPathBuf,
    chunk_size: usize,
}

impl LocalFs {
    pub fn new<P: AsRef<Path>>(
        client_id: impl Into<String>,
        root: P,
    ) -> Result<Self> {
        let root = CanonicalPathBuf::canonicalize(root.as_ref())?;
        if !root.as_path().is_dir() {
            return Err(VfsError::Config(format!(
                "{} is not a directory",
                root.as_path().display()
            )));
        }
        let client_id = client_id.into();
        log::info!(
            "serving client {} from {}",
            client_id,
            root.as_path().display()
        );
        Ok(Self {
            client_id,
            root,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Map a client path below the root, refusing anything that
    /// could climb out of it, including through symlinks.
    fn local_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(VfsError::NotFound(path.to_owned()));
        }
        let local = self.root.as_path().join(relative);
        self.confine(path, &local)?;
        Ok(local)
    }

    /// Resolve `local` and check that it still lies below the root.
    fn confine(&self, path: &str, local: &Path) -> Result<CanonicalPathBuf> {
        let resolved = CanonicalPathBuf::canonicalize(local)
            .map_err(|e| Self::map_io(path, e))?;
        if !resolved.as_path().starts_with(self.root.as_path()) {
            log::warn!(
                "{} resolves to {} outside of the root",
                path,
                resolved.as_path().display()
            );
            return Err(VfsError::NotFound(path.to_owned()));
        }
        Ok(resolved)
    }

    fn client_path(&self, local: &Path) -> Result<String> {
        let relative = pathdiff::diff_paths(local, self.root.as_path())
            .ok_or_else(|| {
                VfsError::NotFound(local.display().to_string())
            })?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(format!("/{}", parts.join("/")))
    }

    fn stat(&self, path: String, metadata: &Metadata) -> StatEntry {
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs());
        StatEntry {
            path,
            is_directory: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified,
        }
    }

    fn map_io(path: &str, e: io::Error) -> VfsError {
        match e.kind() {
            io::ErrorKind::PermissionDenied => {
                VfsError::AccessForbidden(format!("{}: {}", path, e))
            }
            io::ErrorKind::NotFound => VfsError::NotFound(path.to_owned()),
            _ => VfsError::Io(e),
        }
    }
}

impl EntryProvider for LocalFs {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn get(&self, path: &str) -> Result<StatEntry> {
        let local = self.local_path(path)?;
        let metadata =
            fs::metadata(&local).map_err(|e| Self::map_io(path, e))?;
        Ok(self.stat(self.client_path(&local)?, &metadata))
    }

    fn list_children(&self, entry: &StatEntry) -> Result<Vec<StatEntry>> {
        let local = self.local_path(&entry.path)?;
        let mut children = Vec::new();
        for dir_entry in
            fs::read_dir(&local).map_err(|e| Self::map_io(&entry.path, e))?
        {
            let child = dir_entry
                .map_err(|e| Self::map_io(&entry.path, e))?
                .path();
            let path = self.client_path(&child)?;
            match self.confine(&path, &child) {
                Ok(_) => {}
                Err(VfsError::NotFound(_)) => {
                    log::trace!("skipping {}", path);
                    continue;
                }
                Err(e) => return Err(e),
            }
            // Follows symlinks the same way `get` does.
            let metadata =
                fs::metadata(&child).map_err(|e| Self::map_io(&path, e))?;
            children.push(self.stat(path, &metadata));
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    fn refresh(&self, path: &str) -> Result<()> {
        self.refresh_recursively(path, 1)
    }

    fn refresh_recursively(&self, path: &str, max_depth: u32) -> Result<()> {
        log::debug!(
            "local metadata of {} is always current (depth {})",
            path,
            max_depth
        );
        self.get(path).map(|_| ())
    }

    fn verify_access(&self) -> Result<()> {
        Ok(())
    }
}

impl BlobSource for LocalFs {
    fn fetch_blob(&self, path: &str, offset: u64) -> Result<Chunks> {
        let local = self.local_path(path)?;
        if local.is_dir() {
            return Err(VfsError::IsDirectory(path.to_owned()));
        }
        let mut file = File::open(&local).map_err(|e| Self::map_io(path, e))?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(FileChunks {
            file,
            chunk_size: self.chunk_size,
            done: false,
        }))
    }
}

struct FileChunks {
    file: File,
    chunk_size: usize,
    done: bool,
}

impl Iterator for FileChunks {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = Vec::with_capacity(self.chunk_size);
        match (&mut self.file)
            .take(self.chunk_size as u64)
            .read_to_end(&mut chunk)
        {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => Some(Ok(chunk)),
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}
