use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::iter::Fuse;

use crate::source::{ChunkFetch, Chunks};
use crate::{Result, VfsError};

/// Reference point of a seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    /// Remote content length is unknown, so seeking relative
    /// to the end is always rejected.
    End,
}

/// Read-only, seekable view over remote content.
pub trait SeekableStream {
    /// Read `size` bytes, or everything up to the end of content when
    /// `size` is `None`. Fewer bytes are returned only at the end.
    fn read_bytes(&mut self, size: Option<usize>) -> Result<Vec<u8>>;

    /// Read at most one chunk worth of data, capped at `size`.
    /// Performs at most one underlying fetch.
    fn read_chunk(&mut self, size: Option<usize>) -> Result<Vec<u8>>;

    /// Move the read position and return the new absolute position.
    fn seek_to(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    fn tell(&self) -> u64;

    fn close(&mut self);
}

/// Buffered stream over a [`ChunkFetch`] source.
///
/// Holds the most recently fetched chunk and reuses it for reads and
/// seeks that stay inside it. A seek outside the chunk drops the current
/// chunk sequence; the next one is only requested on the next read.
pub struct VfsFile<F> {
    fetch: F,
    source: Option<Fuse<Chunks>>,
    buffer: Vec<u8>,
    cursor: usize,
    position: u64,
    eof: bool,
    closed: bool,
}

impl<F: ChunkFetch> VfsFile<F> {
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            source: None,
            buffer: Vec::new(),
            cursor: 0,
            position: 0,
            eof: false,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn readable(&self) -> bool {
        true
    }

    pub fn seekable(&self) -> bool {
        true
    }

    pub fn writable(&self) -> bool {
        false
    }

    pub fn truncate(&mut self, _size: Option<u64>) -> Result<u64> {
        Err(VfsError::Unsupported("truncate".to_owned()))
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed {
            return Err(VfsError::Closed);
        }
        Ok(())
    }

    fn buffer_start(&self) -> u64 {
        self.position - self.cursor as u64
    }

    fn is_buffer_empty(&self) -> bool {
        self.cursor == self.buffer.len()
    }

    fn check_invariants(&self) {
        debug_assert!(self.cursor <= self.buffer.len());
        debug_assert!(self.cursor as u64 <= self.position);
        debug_assert!(!self.eof || self.buffer.is_empty());
        debug_assert!(!self.closed || self.source.is_none());
    }

    /// Replace the consumed buffer with the next chunk of the source,
    /// requesting a new chunk sequence first if there is none.
    fn load_buffer(&mut self) -> Result<()> {
        debug_assert!(self.is_buffer_empty());
        if self.eof {
            return Ok(());
        }

        let source = match self.source.take() {
            Some(source) => source,
            None => {
                log::debug!("fetching content at offset {}", self.position);
                self.fetch.fetch_at(self.position)?.fuse()
            }
        };
        let source = self.source.insert(source);

        loop {
            match source.next() {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    log::trace!(
                        "loaded {} bytes at offset {}",
                        chunk.len(),
                        self.position
                    );
                    self.buffer = chunk;
                    break;
                }
                Some(Err(e)) => return Err(e),
                None => {
                    log::trace!("end of content at offset {}", self.position);
                    self.buffer.clear();
                    self.eof = true;
                    break;
                }
            }
        }
        self.cursor = 0;
        self.check_invariants();
        Ok(())
    }

    /// Consume up to `size` bytes of the buffer, loading the next chunk
    /// if the buffer is exhausted. Returns an empty slice only at the end.
    fn read_from_buffer(&mut self, size: Option<usize>) -> Result<&[u8]> {
        if self.is_buffer_empty() {
            self.load_buffer()?;
        }
        let available = self.buffer.len() - self.cursor;
        let size = size.map_or(available, |size| size.min(available));

        let start = self.cursor;
        self.cursor += size;
        self.position += size as u64;
        Ok(&self.buffer[start..self.cursor])
    }
}

impl<F: ChunkFetch> SeekableStream for VfsFile<F> {
    fn read_bytes(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        self.ensure_not_closed()?;

        let mut data = Vec::new();
        while !self.eof && size.map_or(true, |size| data.len() < size) {
            let remaining = size.map(|size| size - data.len());
            let chunk = self.read_from_buffer(remaining)?;
            data.extend_from_slice(chunk);
        }
        self.check_invariants();
        Ok(data)
    }

    fn read_chunk(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        self.ensure_not_closed()?;
        if size == Some(0) {
            return Ok(Vec::new());
        }

        let data = self.read_from_buffer(size)?.to_vec();
        self.check_invariants();
        Ok(data)
    }

    fn seek_to(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.ensure_not_closed()?;

        let target = match whence {
            Whence::Start => Some(offset),
            Whence::Current => i64::try_from(self.position)
                .ok()
                .and_then(|position| position.checked_add(offset)),
            Whence::End => {
                return Err(VfsError::Unsupported(
                    "seeking relative to the end".to_owned(),
                ))
            }
        };
        let new_pos = match target.and_then(|t| u64::try_from(t).ok()) {
            Some(new_pos) => new_pos,
            None => return Err(VfsError::InvalidSeek(target.unwrap_or(offset))),
        };

        let buffer_start = self.buffer_start();
        let buffer_end = buffer_start + self.buffer.len() as u64;
        if (buffer_start..=buffer_end).contains(&new_pos) {
            log::trace!("seek to {} served from buffer", new_pos);
            self.cursor = (new_pos - buffer_start) as usize;
        } else {
            log::debug!(
                "seek to {} leaves buffer [{}, {}], dropping source",
                new_pos,
                buffer_start,
                buffer_end
            );
            self.source = None;
            self.buffer.clear();
            self.cursor = 0;
        }
        self.position = new_pos;
        self.eof = false;

        self.check_invariants();
        Ok(self.position)
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn close(&mut self) {
        self.closed = true;
        self.source = None;
        self.buffer = Vec::new();
        self.cursor = 0;
        self.check_invariants();
    }
}

impl<F: ChunkFetch> Read for VfsFile<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.read_chunk(Some(buf.len()))?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl<F: ChunkFetch> BufRead for VfsFile<F> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.ensure_not_closed()?;
        if self.is_buffer_empty() {
            self.load_buffer()?;
        }
        Ok(&self.buffer[self.cursor..])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.buffer.len() - self.cursor);
        self.cursor += amt;
        self.position += amt as u64;
    }
}

impl<F: ChunkFetch> Seek for VfsFile<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = match pos {
            SeekFrom::Start(offset) => {
                let offset = i64::try_from(offset).map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "seek offset overflows i64",
                    )
                })?;
                self.seek_to(offset, Whence::Start)?
            }
            SeekFrom::Current(offset) => {
                self.seek_to(offset, Whence::Current)?
            }
            SeekFrom::End(offset) => self.seek_to(offset, Whence::End)?,
        };
        Ok(position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.tell())
    }
}

impl<F: ChunkFetch> Write for VfsFile<F> {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(VfsError::Unsupported("write".to_owned()).into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rand::Rng;
    use rstest::rstest;

    use super::*;
    use crate::init_logging;
    use crate::source::chunked;

    const CONTENT: &[u8] = b"The quick brown fox jumps over the lazy dog";

    type Fetches = Rc<RefCell<Vec<u64>>>;

    fn open(
        content: &'static [u8],
        chunk_size: usize,
    ) -> (VfsFile<impl ChunkFetch>, Fetches) {
        init_logging();
        let fetches: Fetches = Rc::new(RefCell::new(vec![]));
        let calls = fetches.clone();
        let file = VfsFile::new(move |offset: u64| -> Result<Chunks> {
            calls.borrow_mut().push(offset);
            Ok(chunked(content, offset, chunk_size))
        });
        (file, fetches)
    }

    #[test]
    fn no_fetch_until_first_read() {
        let (mut file, fetches) = open(CONTENT, 4);
        assert_eq!(file.tell(), 0);
        assert!(fetches.borrow().is_empty());

        assert_eq!(file.read_bytes(Some(3)).unwrap(), b"The");
        assert_eq!(*fetches.borrow(), vec![0]);
        assert_eq!(file.tell(), 3);
    }

    #[test]
    fn read_to_end_spans_chunks() {
        let (mut file, fetches) = open(CONTENT, 5);
        assert_eq!(file.read_bytes(None).unwrap(), CONTENT);
        assert_eq!(file.tell(), CONTENT.len() as u64);
        assert!(file.read_bytes(None).unwrap().is_empty());
        assert!(file.read_bytes(Some(10)).unwrap().is_empty());
        assert_eq!(fetches.borrow().len(), 1);
    }

    #[test]
    fn read_past_end_returns_short() {
        let (mut file, _) = open(CONTENT, 7);
        file.seek_to(40, Whence::Start).unwrap();
        assert_eq!(file.read_bytes(Some(100)).unwrap(), b"dog");
        assert_eq!(file.tell(), 43);
    }

    #[test]
    fn zero_sized_read_does_not_fetch() {
        let (mut file, fetches) = open(CONTENT, 4);
        assert!(file.read_bytes(Some(0)).unwrap().is_empty());
        assert!(file.read_chunk(Some(0)).unwrap().is_empty());
        assert!(fetches.borrow().is_empty());
    }

    #[test]
    fn split_reads_match_single_read() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let chunk_size = rng.gen_range(1..=CONTENT.len() + 2);
            let total = rng.gen_range(0..=CONTENT.len() + 5);
            let split = rng.gen_range(0..=total);

            let (mut whole, _) = open(CONTENT, chunk_size);
            let expected = whole.read_bytes(Some(total)).unwrap();

            let (mut parts, _) = open(CONTENT, chunk_size);
            let mut actual = parts.read_bytes(Some(split)).unwrap();
            actual.extend(parts.read_bytes(Some(total - split)).unwrap());

            assert_eq!(actual, expected);
            assert_eq!(parts.tell(), whole.tell());
        }
    }

    #[test]
    fn read_chunk_stays_within_buffer() {
        let (mut file, fetches) = open(CONTENT, 8);
        assert_eq!(file.read_bytes(Some(2)).unwrap(), b"Th");

        // Buffer still holds "e quic", no further fetch allowed
        assert_eq!(file.read_chunk(Some(20)).unwrap(), b"e quic");
        assert_eq!(file.tell(), 8);

        // Buffer is empty now, so exactly one refill
        assert_eq!(file.read_chunk(None).unwrap(), b"k brown ");
        assert_eq!(file.read_chunk(Some(3)).unwrap(), b"fox");
        assert_eq!(file.tell(), 19);
        assert_eq!(fetches.borrow().len(), 1);
    }

    #[test]
    fn read_chunk_at_end_is_empty() {
        let (mut file, _) = open(b"abc", 8);
        assert_eq!(file.read_chunk(None).unwrap(), b"abc");
        assert!(file.read_chunk(None).unwrap().is_empty());
        assert!(file.read_chunk(Some(4)).unwrap().is_empty());
    }

    #[test]
    fn seek_inside_buffer_reuses_it() {
        let (mut file, fetches) = open(CONTENT, 10);
        assert_eq!(file.read_bytes(Some(4)).unwrap(), b"The ");

        assert_eq!(file.seek_to(1, Whence::Start).unwrap(), 1);
        assert_eq!(file.seek_to(8, Whence::Start).unwrap(), 8);
        assert_eq!(file.seek_to(-6, Whence::Current).unwrap(), 2);
        assert_eq!(file.read_bytes(Some(3)).unwrap(), b"e q");
        assert_eq!(*fetches.borrow(), vec![0]);
    }

    #[test]
    fn seek_to_buffer_upper_edge_reuses_it() {
        let (mut file, fetches) = open(CONTENT, 10);
        assert_eq!(file.read_bytes(Some(2)).unwrap(), b"Th");

        // Upper edge: no bytes left in the buffer but still in range
        assert_eq!(file.seek_to(10, Whence::Start).unwrap(), 10);
        assert_eq!(fetches.borrow().len(), 1);

        // Continues with the same source
        assert_eq!(file.read_bytes(Some(5)).unwrap(), b"brown");
        assert_eq!(*fetches.borrow(), vec![0]);
    }

    #[test]
    fn seek_outside_buffer_fetches_lazily() {
        let (mut file, fetches) = open(CONTENT, 10);
        assert_eq!(file.read_bytes(Some(3)).unwrap(), b"The");

        assert_eq!(file.seek_to(16, Whence::Start).unwrap(), 16);
        assert_eq!(file.seek_to(11, Whence::Start).unwrap(), 11);
        assert_eq!(file.tell(), 11);
        assert_eq!(*fetches.borrow(), vec![0]);

        assert_eq!(file.read_bytes(Some(5)).unwrap(), b"rown ");
        assert_eq!(*fetches.borrow(), vec![0, 11]);
    }

    #[test]
    fn seek_back_after_end_refetches() {
        let (mut file, fetches) = open(b"0123456789", 4);
        assert_eq!(file.read_bytes(None).unwrap(), b"0123456789");

        assert_eq!(file.seek_to(0, Whence::Start).unwrap(), 0);
        assert_eq!(file.read_bytes(Some(2)).unwrap(), b"01");
        assert_eq!(*fetches.borrow(), vec![0, 0]);
    }

    #[test]
    fn seek_to_end_position_after_eof_is_in_range() {
        let (mut file, fetches) = open(b"0123", 4);
        assert_eq!(file.read_bytes(None).unwrap(), b"0123");
        assert_eq!(file.seek_to(0, Whence::Current).unwrap(), 4);
        assert!(file.read_bytes(None).unwrap().is_empty());
        assert_eq!(fetches.borrow().len(), 1);
    }

    #[rstest]
    #[case(-1, Whence::Start)]
    #[case(-5, Whence::Current)]
    #[case(i64::MIN, Whence::Start)]
    fn negative_seek_is_rejected(#[case] offset: i64, #[case] whence: Whence) {
        let (mut file, _) = open(CONTENT, 4);
        file.seek_to(2, Whence::Start).unwrap();
        let err = file.seek_to(offset, whence).unwrap_err();
        assert!(matches!(err, VfsError::InvalidSeek(_)));
        assert_eq!(file.tell(), 2);
    }

    #[test]
    fn seek_from_end_is_unsupported() {
        let (mut file, _) = open(CONTENT, 4);
        let err = file.seek_to(0, Whence::End).unwrap_err();
        assert!(matches!(err, VfsError::Unsupported(_)));

        let io_err = file.seek(SeekFrom::End(-1)).unwrap_err();
        assert_eq!(io_err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn closed_stream_rejects_content_operations() {
        let (mut file, _) = open(CONTENT, 4);
        assert_eq!(file.read_bytes(Some(6)).unwrap(), b"The qu");
        file.close();
        file.close();

        assert!(file.is_closed());
        assert!(matches!(file.read_bytes(Some(1)), Err(VfsError::Closed)));
        assert!(matches!(file.read_chunk(None), Err(VfsError::Closed)));
        assert!(matches!(
            file.seek_to(0, Whence::Start),
            Err(VfsError::Closed)
        ));
        assert_eq!(file.tell(), 6);
    }

    #[test]
    fn write_family_is_unsupported() {
        let (mut file, _) = open(CONTENT, 4);
        assert!(!file.writable());
        assert!(matches!(file.truncate(None), Err(VfsError::Unsupported(_))));
        let err = file.write(b"data").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(file.flush().is_ok());
    }

    #[test]
    fn empty_chunks_are_skipped() {
        init_logging();
        let mut file = VfsFile::new(|_offset: u64| -> Result<Chunks> {
            let chunks = vec![vec![], b"ab".to_vec(), vec![], b"cd".to_vec()];
            Ok(Box::new(chunks.into_iter().map(Ok::<_, VfsError>)))
        });
        assert_eq!(file.read_chunk(None).unwrap(), b"ab");
        assert_eq!(file.read_bytes(None).unwrap(), b"cd");
    }

    #[test]
    fn source_errors_surface_immediately() {
        init_logging();
        let mut file = VfsFile::new(|_offset: u64| -> Result<Chunks> {
            let chunks: Vec<Result<Vec<u8>>> = vec![
                Ok(b"ab".to_vec()),
                Err(VfsError::AccessForbidden("denied".to_owned())),
            ];
            Ok(Box::new(chunks.into_iter()))
        });
        assert_eq!(file.read_chunk(None).unwrap(), b"ab");
        assert!(matches!(
            file.read_bytes(None),
            Err(VfsError::AccessForbidden(_))
        ));
        assert_eq!(file.tell(), 2);
    }

    #[test]
    fn std_io_adapters() {
        let (mut file, fetches) = open(CONTENT, 6);
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"The ");

        assert_eq!(file.seek(SeekFrom::Current(-4)).unwrap(), 0);
        let mut line = String::new();
        file.read_line(&mut line).unwrap();
        let expected: String = CONTENT.iter().map(|&b| b as char).collect();
        assert_eq!(line, expected);

        assert_eq!(file.seek(SeekFrom::Start(35)).unwrap(), 35);
        let mut rest = vec![];
        file.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"lazy dog");
        assert_eq!(file.stream_position().unwrap(), 43);
        assert_eq!(*fetches.borrow(), vec![0, 35]);
    }
}
