//! Records every file created through it so a flush or compound-file pack
//! knows exactly which names to register on a `SegmentInfo` (§4.4 step 3).

use crate::core::store::directory::{Directory, IOContext, Lock};
use crate::core::store::index_io::{IndexInput, IndexOutput};
use crate::error::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

pub struct TrackingDirectoryWrapper {
    inner: Arc<dyn Directory>,
    created: Mutex<HashSet<String>>,
}

impl TrackingDirectoryWrapper {
    pub fn new(inner: Arc<dyn Directory>) -> Self {
        TrackingDirectoryWrapper {
            inner,
            created: Mutex::new(HashSet::new()),
        }
    }

    pub fn create_files(&self) -> HashSet<String> {
        self.created.lock().unwrap().clone()
    }
}

impl fmt::Display for TrackingDirectoryWrapper {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TrackingDirectoryWrapper({})", self.inner)
    }
}

impl Directory for TrackingDirectoryWrapper {
    fn list_all(&self) -> Result<Vec<String>> {
        self.inner.list_all()
    }

    fn file_length(&self, name: &str) -> Result<i64> {
        self.inner.file_length(name)
    }

    fn create_output(&self, name: &str, ctx: &IOContext) -> Result<Box<dyn IndexOutput>> {
        let out = self.inner.create_output(name, ctx)?;
        self.created.lock().unwrap().insert(name.to_string());
        Ok(out)
    }

    fn create_temp_output(
        &self,
        prefix: &str,
        suffix: &str,
        ctx: &IOContext,
    ) -> Result<Box<dyn IndexOutput>> {
        let out = self.inner.create_temp_output(prefix, suffix, ctx)?;
        self.created.lock().unwrap().insert(out.name().to_string());
        Ok(out)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.created.lock().unwrap().remove(name);
        self.inner.delete_file(name)
    }

    fn rename(&self, source: &str, dest: &str) -> Result<()> {
        let mut created = self.created.lock().unwrap();
        if created.remove(source) {
            created.insert(dest.to_string());
        }
        drop(created);
        self.inner.rename(source, dest)
    }

    fn open_input(&self, name: &str, ctx: &IOContext) -> Result<Box<dyn IndexInput>> {
        self.inner.open_input(name, ctx)
    }

    fn sync(&self, names: &HashSet<String>) -> Result<()> {
        self.inner.sync(names)
    }

    fn sync_meta_data(&self) -> Result<()> {
        self.inner.sync_meta_data()
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        self.inner.obtain_lock(name)
    }
}
