//! An in-memory `Directory` used throughout the test suite (§2 "(added)
//! RAMDirectory") and as the natural backing store for compound-file
//! "spill" buffers (§4.2).

use crate::core::store::directory::{Directory, IOContext, Lock};
use crate::core::store::index_io::{ByteArrayIndexInput, IndexInput, IndexOutput, RAMOutputStream};
use crate::error::{ErrorKind, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RAMDirectoryInner {
    files: HashMap<String, Arc<Vec<u8>>>,
}

pub struct RAMDirectory {
    inner: Mutex<RAMDirectoryInner>,
    temp_counter: AtomicUsize,
}

impl RAMDirectory {
    pub fn new() -> Self {
        RAMDirectory {
            inner: Mutex::new(RAMDirectoryInner::default()),
            temp_counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RAMDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RAMDirectory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RAMDirectory")
    }
}

/// Closing publishes the buffered bytes into the owning directory under
/// `name` — append-only, write-once (§4.1 "createOutput... fails if name
/// exists").
struct PublishingOutput {
    stream: Option<RAMOutputStream>,
    directory: *const RAMDirectory,
}

// Safety: PublishingOutput is only ever constructed and dropped on a thread
// holding a live `&RAMDirectory`; the raw pointer exists solely to avoid an
// Rc/Arc self-reference cycle and is never dereferenced after the owning
// directory could have been dropped, since Box<dyn IndexOutput> values
// never outlive the directory they were created from in this crate.
unsafe impl Send for PublishingOutput {}

impl Write for PublishingOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.as_mut().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl IndexOutput for PublishingOutput {
    fn name(&self) -> &str {
        self.stream.as_ref().unwrap().name()
    }

    fn file_pointer(&self) -> i64 {
        self.stream.as_ref().unwrap().file_pointer()
    }

    fn checksum(&self) -> Result<i64> {
        self.stream.as_ref().unwrap().checksum()
    }
}

impl Drop for PublishingOutput {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let name = stream.name().to_string();
            let bytes = stream.into_bytes();
            let dir = unsafe { &*self.directory };
            let mut inner = dir.inner.lock().unwrap();
            inner.files.insert(name, Arc::new(bytes));
        }
    }
}

impl Directory for RAMDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<String> = inner.files.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_length(&self, name: &str) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .get(name)
            .map(|b| b.len() as i64)
            .ok_or_else(|| ErrorKind::Io(io::Error::new(io::ErrorKind::NotFound, name.to_string())).into())
    }

    fn create_output(&self, name: &str, _ctx: &IOContext) -> Result<Box<dyn IndexOutput>> {
        {
            let inner = self.inner.lock().unwrap();
            if inner.files.contains_key(name) {
                bail!(ErrorKind::IllegalState(format!(
                    "file {} already exists",
                    name
                )));
            }
        }
        Ok(Box::new(PublishingOutput {
            stream: Some(RAMOutputStream::new(name)),
            directory: self as *const RAMDirectory,
        }))
    }

    fn create_temp_output(
        &self,
        prefix: &str,
        suffix: &str,
        ctx: &IOContext,
    ) -> Result<Box<dyn IndexOutput>> {
        let n = self.temp_counter.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}_{}_{}.tmp", prefix, n, suffix);
        self.create_output(&name, ctx)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ErrorKind::Io(io::Error::new(io::ErrorKind::NotFound, name.to_string())).into())
    }

    fn rename(&self, source: &str, dest: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let data = inner
            .files
            .remove(source)
            .ok_or_else(|| -> crate::error::Error {
                ErrorKind::Io(io::Error::new(io::ErrorKind::NotFound, source.to_string())).into()
            })?;
        inner.files.insert(dest.to_string(), data);
        Ok(())
    }

    fn open_input(&self, name: &str, _ctx: &IOContext) -> Result<Box<dyn IndexInput>> {
        let inner = self.inner.lock().unwrap();
        let data = inner
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| -> crate::error::Error {
                ErrorKind::Io(io::Error::new(io::ErrorKind::NotFound, name.to_string())).into()
            })?;
        Ok(Box::new(ByteArrayIndexInput::new(name, data)))
    }

    fn sync(&self, _names: &HashSet<String>) -> Result<()> {
        // nothing to flush: writes are already durable in RAM for the
        // lifetime of the test process.
        Ok(())
    }

    fn obtain_lock(&self, _name: &str) -> Result<Box<dyn Lock>> {
        Ok(Box::new(NoopLock))
    }
}

struct NoopLock;

impl Lock for NoopLock {
    fn ensure_valid(&self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::directory::IOContext;
    use std::io::Read;

    #[test]
    fn write_read_roundtrip() {
        let dir = RAMDirectory::new();
        {
            let mut out = dir.create_output("a.bin", &IOContext::Default).unwrap();
            out.write_all(b"hello").unwrap();
        }
        let mut input = dir.open_input("a.bin", &IOContext::Default).unwrap();
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
        assert_eq!(dir.list_all().unwrap(), vec!["a.bin".to_string()]);
    }

    #[test]
    fn cannot_overwrite() {
        let dir = RAMDirectory::new();
        {
            let _out = dir.create_output("a.bin", &IOContext::Default).unwrap();
        }
        assert!(dir.create_output("a.bin", &IOContext::Default).is_err());
    }
}
