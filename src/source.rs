use crate::{Result, VfsError};

/// Sequence of content chunks produced by a single fetch.
///
/// Chunks come in increasing, contiguous offset order starting at the
/// offset the fetch was made at. Exhaustion of the iterator means the
/// content has ended. The sequence may be dropped at any point.
pub type Chunks = Box<dyn Iterator<Item = Result<Vec<u8>>>>;

/// Restartable source of file content keyed by byte offset.
///
/// Every call yields an independent chunk sequence, so a reader can
/// abandon the current one and re-point at another offset.
pub trait ChunkFetch {
    fn fetch_at(&mut self, offset: u64) -> Result<Chunks>;
}

impl<F> ChunkFetch for F
where
    F: FnMut(u64) -> Result<Chunks>,
{
    fn fetch_at(&mut self, offset: u64) -> Result<Chunks> {
        self(offset)
    }
}

/// Serve `content[offset..]` lazily in chunks of at most `chunk_size` bytes.
pub fn chunked<C>(content: C, offset: u64, chunk_size: usize) -> Chunks
where
    C: AsRef<[u8]> + 'static,
{
    let chunk_size = chunk_size.max(1);
    let mut start = usize::try_from(offset).unwrap_or(usize::MAX);
    Box::new(std::iter::from_fn(move || {
        let bytes = content.as_ref();
        if start >= bytes.len() {
            return None;
        }
        let end = bytes.len().min(start.saturating_add(chunk_size));
        let chunk = bytes[start..end].to_vec();
        start = end;
        Some(Ok::<_, VfsError>(chunk))
    }))
}
