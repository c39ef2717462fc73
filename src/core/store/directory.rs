//! The `Directory` abstraction (§4.1): named append-only byte streams with
//! explicit sync and exclusive write-locking.

use crate::core::store::{IndexInput, IndexOutput};
use crate::error::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Hint describing why an output is being created, letting an
/// implementation choose buffering strategy (mirrors the teacher's
/// `IOContext`). Only `Flush`/`Merge` carry a size estimate; `Default` and
/// `ReadOnce` need none.
#[derive(Debug, Clone, Copy)]
pub enum IOContext {
    Default,
    Read(bool),
    Flush(FlushInfo),
    Merge(FlushInfo),
}

pub const IO_CONTEXT_READONCE: IOContext = IOContext::Read(true);

#[derive(Debug, Clone, Copy)]
pub struct FlushInfo {
    pub num_docs: u32,
    pub estimated_size_in_bytes: u64,
}

impl FlushInfo {
    pub fn new(num_docs: u32, estimated_size_in_bytes: u64) -> Self {
        FlushInfo {
            num_docs,
            estimated_size_in_bytes,
        }
    }
}

/// Exclusive, process-wide lock held for the life of a writer (§4.1
/// `makeLock`).
pub trait Lock: Send + Sync {
    fn ensure_valid(&self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

pub trait Directory: Send + Sync + fmt::Display {
    fn list_all(&self) -> Result<Vec<String>>;
    fn file_length(&self, name: &str) -> Result<i64>;
    fn file_exists(&self, name: &str) -> bool {
        self.file_length(name).is_ok()
    }

    fn create_output(&self, name: &str, ctx: &IOContext) -> Result<Box<dyn IndexOutput>>;

    /// Like `create_output` but with a directory-chosen unique name sharing
    /// `prefix`/`suffix`, used by the compound-file writer to spill a second
    /// concurrent stream (§4.2 "any others are spilled to the backing
    /// directory").
    fn create_temp_output(
        &self,
        prefix: &str,
        suffix: &str,
        ctx: &IOContext,
    ) -> Result<Box<dyn IndexOutput>>;

    fn delete_file(&self, name: &str) -> Result<()>;
    fn rename(&self, source: &str, dest: &str) -> Result<()>;

    fn open_input(&self, name: &str, ctx: &IOContext) -> Result<Box<dyn IndexInput>>;

    /// Durably persists the listed files; after this returns their contents
    /// survive a process crash (§4.1 guarantee).
    fn sync(&self, names: &HashSet<String>) -> Result<()>;
    fn sync_meta_data(&self) -> Result<()> {
        Ok(())
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn Lock>>;
}

pub type DirectoryRc = Arc<dyn Directory>;

/// Opens `name` wrapped in a running CRC32 so the caller can validate its
/// footer without a second read pass (§6).
pub fn open_checksum_input(
    dir: &dyn Directory,
    name: &str,
    ctx: &IOContext,
) -> Result<crate::core::store::ChecksumIndexInput<Box<dyn IndexInput>>> {
    let input = dir.open_input(name, ctx)?;
    Ok(crate::core::store::ChecksumIndexInput::new(input))
}
