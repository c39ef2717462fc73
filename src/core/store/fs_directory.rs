//! Filesystem-backed `Directory` (§4.1, §2 "A concrete implementation uses
//! the filesystem"). Reads are positional (parallel-safe): every
//! `IndexInput` holds its own cloned file handle and seeks immediately
//! before each read, rather than sharing one handle's cursor.

use crate::core::store::directory::{Directory, IOContext, Lock};
use crate::core::store::index_io::{IndexInput, IndexOutput};
use crate::error::{ErrorKind, Result};
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct FSDirectory {
    path: PathBuf,
    temp_counter: AtomicUsize,
}

impl FSDirectory {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(FSDirectory {
            path,
            temp_counter: AtomicUsize::new(0),
        })
    }

    fn full_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl fmt::Display for FSDirectory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FSDirectory({})", self.path.display())
    }
}

pub struct FSIndexOutput {
    name: String,
    file: File,
    written: i64,
    crc: crc::crc32::Digest,
}

impl FSIndexOutput {
    fn create(path: &PathBuf, name: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| -> crate::error::Error {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    ErrorKind::IllegalState(format!("file {} already exists", name)).into()
                } else {
                    e.into()
                }
            })?;
        Ok(FSIndexOutput {
            name: name.to_string(),
            file,
            written: 0,
            crc: crc::crc32::Digest::new(crc::crc32::IEEE),
        })
    }
}

impl Write for FSIndexOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        use crc::crc32::Hasher32;
        self.file.write_all(buf)?;
        self.crc.write(buf);
        self.written += buf.len() as i64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl IndexOutput for FSIndexOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_pointer(&self) -> i64 {
        self.written
    }

    fn checksum(&self) -> Result<i64> {
        use crc::crc32::Hasher32;
        Ok(i64::from(self.crc.sum32()))
    }
}

pub struct FSIndexInput {
    name: String,
    file: File,
    base: i64,
    length: i64,
    pos: i64,
}

impl FSIndexInput {
    fn open(path: &PathBuf, name: &str) -> Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len() as i64;
        Ok(FSIndexInput {
            name: name.to_string(),
            file,
            base: 0,
            length,
            pos: 0,
        })
    }
}

impl Read for FSIndexInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let avail = (self.length - self.pos).max(0) as usize;
        let to_read = avail.min(buf.len());
        if to_read == 0 {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start((self.base + self.pos) as u64))?;
        let n = self.file.read(&mut buf[..to_read])?;
        self.pos += n as i64;
        Ok(n)
    }
}

impl IndexInput for FSIndexInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_pointer(&self) -> i64 {
        self.pos
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        if pos < 0 || pos > self.length {
            bail!(ErrorKind::IllegalArgument(format!(
                "seek out of bounds: {} (len {})",
                pos, self.length
            )));
        }
        self.pos = pos;
        Ok(())
    }

    fn len(&self) -> i64 {
        self.length
    }

    fn slice(&self, description: &str, offset: i64, length: i64) -> Result<Box<dyn IndexInput>> {
        if offset < 0 || length < 0 || offset + length > self.length {
            bail!(ErrorKind::IllegalArgument(format!(
                "slice out of bounds: offset={} length={} parent_len={}",
                offset, length, self.length
            )));
        }
        Ok(Box::new(FSIndexInput {
            name: description.to_string(),
            file: self.file.try_clone()?,
            base: self.base + offset,
            length,
            pos: 0,
        }))
    }

    fn clone_box(&self) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(FSIndexInput {
            name: self.name.clone(),
            file: self.file.try_clone()?,
            base: self.base,
            length: self.length,
            pos: self.pos,
        }))
    }
}

struct FSLock {
    path: PathBuf,
    _file: File,
}

impl Lock for FSLock {
    fn ensure_valid(&self) -> Result<()> {
        if !self.path.exists() {
            bail!(ErrorKind::IllegalState("lock file was removed".into()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let _ = fs::remove_file(&self.path);
        Ok(())
    }
}

impl Drop for FSLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl Directory for FSDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_length(&self, name: &str) -> Result<i64> {
        Ok(fs::metadata(self.full_path(name))?.len() as i64)
    }

    fn create_output(&self, name: &str, _ctx: &IOContext) -> Result<Box<dyn IndexOutput>> {
        Ok(Box::new(FSIndexOutput::create(&self.full_path(name), name)?))
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
        Ok(fs::remove_file(self.full_path(name))?)
    }

    fn rename(&self, source: &str, dest: &str) -> Result<()> {
        Ok(fs::rename(self.full_path(source), self.full_path(dest))?)
    }

    fn open_input(&self, name: &str, _ctx: &IOContext) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(FSIndexInput::open(&self.full_path(name), name)?))
    }

    fn sync(&self, names: &HashSet<String>) -> Result<()> {
        for name in names {
            let file = File::open(self.full_path(name))?;
            file.sync_all()?;
        }
        Ok(())
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        let path = self.full_path(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| -> crate::error::Error {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    ErrorKind::IllegalState(format!("lock {} already held", name)).into()
                } else {
                    e.into()
                }
            })?;
        Ok(Box::new(FSLock { path, _file: file }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::directory::IOContext;

    #[test]
    fn write_read_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FSDirectory::open(tmp.path()).unwrap();
        {
            let mut out = dir.create_output("a.bin", &IOContext::Default).unwrap();
            out.write_all(b"hello world").unwrap();
        }
        let mut input = dir.open_input("a.bin", &IOContext::Default).unwrap();
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello world");
    }

    #[test]
    fn lock_is_exclusive() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FSDirectory::open(tmp.path()).unwrap();
        let _lock = dir.obtain_lock("write.lock").unwrap();
        assert!(dir.obtain_lock("write.lock").is_err());
    }
}
