use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::iter;
use std::rc::Rc;

use crate::provider::{BlobSource, EntryProvider, StatEntry};
use crate::source::{chunked, Chunks};
use crate::{Result, VfsError, DEFAULT_CHUNK_SIZE};

enum Node {
    Directory,
    File(Rc<[u8]>),
}

/// In-memory VFS of a single client.
///
/// Directories implied by inserted paths are created automatically.
/// Children are listed in path order. Individual paths can be marked as
/// forbidden to emulate a missing approval, and every provider call is
/// counted so callers can check how much traffic an operation caused.
pub struct MemoryVfs {
    client_id: String,
    nodes: BTreeMap<String, Node>,
    denied: BTreeSet<String>,
    listing_denied: BTreeSet<String>,
    revoked: BTreeMap<String, u64>,
    access_verified: bool,
    chunk_size: usize,
    gets: Cell<usize>,
    listings: Cell<usize>,
    fetches: RefCell<Vec<(String, u64)>>,
    refreshes: RefCell<Vec<(String, u32)>>,
}

impl MemoryVfs {
    pub fn new(client_id: impl Into<String>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_owned(), Node::Directory);
        Self {
            client_id: client_id.into(),
            nodes,
            denied: BTreeSet::new(),
            listing_denied: BTreeSet::new(),
            revoked: BTreeMap::new(),
            access_verified: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            gets: Cell::new(0),
            listings: Cell::new(0),
            fetches: RefCell::new(vec![]),
            refreshes: RefCell::new(vec![]),
        }
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        self.insert(path, Node::Directory);
        self
    }

    pub fn with_file(
        mut self,
        path: &str,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        let content: Vec<u8> = content.into();
        self.insert(path, Node::File(Rc::from(content)));
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Any access to `path` fails as forbidden.
    pub fn deny(mut self, path: &str) -> Self {
        self.denied.insert(path.to_owned());
        self
    }

    /// Only listing the children of `path` fails as forbidden.
    pub fn deny_listing(mut self, path: &str) -> Self {
        self.listing_denied.insert(path.to_owned());
        self
    }

    /// Content of `path` is served up to `offset`, after which the
    /// chunk sequence fails as forbidden.
    pub fn revoke_after(mut self, path: &str, offset: u64) -> Self {
        self.revoked.insert(path.to_owned(), offset);
        self
    }

    /// Content access of the whole client fails as forbidden.
    pub fn without_approval(mut self) -> Self {
        self.access_verified = false;
        self
    }

    pub fn get_count(&self) -> usize {
        self.gets.get()
    }

    pub fn list_count(&self) -> usize {
        self.listings.get()
    }

    /// Paths and offsets of all content fetches so far.
    pub fn fetches(&self) -> Vec<(String, u64)> {
        self.fetches.borrow().clone()
    }

    /// Paths and depths of all refresh requests so far.
    pub fn refreshes(&self) -> Vec<(String, u32)> {
        self.refreshes.borrow().clone()
    }

    fn insert(&mut self, path: &str, node: Node) {
        let mut parent = parent_of(path);
        while let Some(dir) = parent {
            self.nodes.entry(dir.to_owned()).or_insert(Node::Directory);
            parent = parent_of(dir);
        }
        self.nodes.insert(path.to_owned(), node);
    }

    fn check_access(&self, path: &str) -> Result<()> {
        if self.denied.contains(path) {
            return Err(VfsError::AccessForbidden(format!(
                "no approval to access {}",
                path
            )));
        }
        Ok(())
    }

    fn stat(&self, path: &str, node: &Node) -> StatEntry {
        match node {
            Node::Directory => StatEntry::directory(path),
            Node::File(content) => StatEntry::file(path, content.len() as u64),
        }
    }

    fn node(&self, path: &str) -> Result<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| VfsError::NotFound(path.to_owned()))
    }
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

impl EntryProvider for MemoryVfs {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn get(&self, path: &str) -> Result<StatEntry> {
        self.gets.set(self.gets.get() + 1);
        self.check_access(path)?;
        let node = self.node(path)?;
        Ok(self.stat(path, node))
    }

    fn list_children(&self, entry: &StatEntry) -> Result<Vec<StatEntry>> {
        self.listings.set(self.listings.get() + 1);
        self.check_access(&entry.path)?;
        if self.listing_denied.contains(&entry.path) {
            return Err(VfsError::AccessForbidden(format!(
                "no approval to list {}",
                entry.path
            )));
        }
        match self.node(&entry.path)? {
            Node::Directory => Ok(self
                .nodes
                .iter()
                .filter(|(path, _)| {
                    parent_of(path) == Some(entry.path.as_str())
                })
                .map(|(path, node)| self.stat(path, node))
                .collect()),
            Node::File(_) => Err(VfsError::NotDirectory {
                client_id: self.client_id.clone(),
                path: entry.path.clone(),
            }),
        }
    }

    fn refresh(&self, path: &str) -> Result<()> {
        self.refresh_recursively(path, 1)
    }

    fn refresh_recursively(&self, path: &str, max_depth: u32) -> Result<()> {
        self.check_access(path)?;
        self.node(path)?;
        self.refreshes.borrow_mut().push((path.to_owned(), max_depth));
        Ok(())
    }

    fn verify_access(&self) -> Result<()> {
        if !self.access_verified {
            return Err(VfsError::AccessForbidden(format!(
                "no approval for client {}",
                self.client_id
            )));
        }
        Ok(())
    }
}

impl BlobSource for MemoryVfs {
    fn fetch_blob(&self, path: &str, offset: u64) -> Result<Chunks> {
        self.fetches.borrow_mut().push((path.to_owned(), offset));
        self.check_access(path)?;
        match self.node(path)? {
            Node::File(content) => match self.revoked.get(path) {
                None => {
                    Ok(chunked(Rc::clone(content), offset, self.chunk_size))
                }
                Some(&limit) => {
                    let limit = usize::try_from(limit)
                        .unwrap_or(usize::MAX)
                        .min(content.len());
                    let served: Rc<[u8]> = Rc::from(&content[..limit]);
                    let revoked = VfsError::AccessForbidden(format!(
                        "approval for {} was revoked",
                        path
                    ));
                    Ok(Box::new(
                        chunked(served, offset, self.chunk_size)
                            .chain(iter::once(Err(revoked))),
                    ))
                }
            },
            Node::Directory => Err(VfsError::IsDirectory(path.to_owned())),
        }
    }
}
