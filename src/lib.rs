pub mod config;
pub mod errors;
pub mod file;
pub mod local;
pub mod memory;
pub mod provider;
pub mod source;
pub mod vfs;

pub use config::VfsConfig;
pub use errors::{Result, VfsError};
pub use file::{SeekableStream, VfsFile, Whence};
pub use local::LocalFs;
pub use memory::MemoryVfs;
pub use provider::{BlobSource, EntryProvider, StatEntry};
pub use source::{ChunkFetch, Chunks};
pub use vfs::Vfs;

pub const DEFAULT_PATH_PREFIX: &str = "fs/os";

const KILOBYTE: usize = 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 512 * KILOBYTE;

#[cfg(test)]
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
