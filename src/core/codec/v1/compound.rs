//! Compound-file container (§4.2): packs every non-`.si`/`.lock` file of a
//! segment into a `.cfs` data blob plus a `.cfe` entry table, so a merge or
//! a cold open touches two files instead of a dozen.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::core::codec::codec_util;
use crate::core::codec::format::CompoundFormat;
use crate::core::index::{segment_file_name, strip_segment_name, SegmentInfo};
use crate::core::store::{open_checksum_input, Directory, DirectoryRc, Lock};
use crate::core::store::{IOContext, IO_CONTEXT_READONCE};
use crate::core::store::{IndexInput, IndexOutput};
use crate::error::{ErrorKind, Result};

pub const DATA_EXTENSION: &str = "cfs";
pub const ENTRIES_EXTENSION: &str = "cfe";
pub const DATA_CODEC: &str = "IndexCompoundData";
pub const ENTRY_CODEC: &str = "IndexCompoundEntries";
pub const VERSION_START: i32 = 0;
pub const VERSION_CURRENT: i32 = VERSION_START;

pub struct CompoundFormatV1;

impl CompoundFormat for CompoundFormatV1 {
    fn get_compound_reader(&self, dir: DirectoryRc, si: &SegmentInfo, ctx: &IOContext) -> Result<DirectoryRc> {
        Ok(Arc::new(CompoundReader::open(dir, si, ctx)?))
    }

    fn write(&self, dir: &dyn Directory, si: &SegmentInfo, ctx: &IOContext) -> Result<()> {
        let data_file = segment_file_name(&si.name, "", DATA_EXTENSION);
        let entries_file = segment_file_name(&si.name, "", ENTRIES_EXTENSION);

        let mut data = dir.create_output(&data_file, ctx)?;
        let mut entries = dir.create_output(&entries_file, ctx)?;

        codec_util::write_index_header(data.as_mut(), DATA_CODEC, VERSION_CURRENT, si.get_id(), "")?;
        codec_util::write_index_header(entries.as_mut(), ENTRY_CODEC, VERSION_CURRENT, si.get_id(), "")?;

        let mut names: Vec<&String> = si.files().iter().collect();
        names.sort();
        entries.write_vint(names.len() as i32)?;
        for file in names {
            let start_offset = data.file_pointer();

            let mut input = open_checksum_input(dir, file, &IOContext::Read(true))?;
            codec_util::verify_and_copy_index_header(&mut input, data.as_mut(), si.get_id())?;

            let to_copy = input.len() as usize - codec_util::footer_length() - input.file_pointer() as usize;
            data.copy_bytes(&mut input, to_copy)?;

            let checksum = codec_util::check_footer(&mut input)?;
            data.write_int(codec_util::FOOTER_MAGIC)?;
            data.write_int(0)?;
            data.write_long(checksum)?;

            let end_offset = data.file_pointer();
            entries.write_string(strip_segment_name(file))?;
            entries.write_long(start_offset)?;
            entries.write_long(end_offset - start_offset)?;
        }

        codec_util::write_footer(data.as_mut())?;
        codec_util::write_footer(entries.as_mut())
    }
}

#[derive(Debug, Clone, Copy)]
struct FileEntry {
    offset: i64,
    length: i64,
}

/// A read-only `Directory` view over one segment's `.cfs`/`.cfe` pair.
pub struct CompoundReader {
    directory: DirectoryRc,
    name: String,
    entries: HashMap<String, FileEntry>,
    input: Box<dyn IndexInput>,
}

impl CompoundReader {
    pub fn open(directory: DirectoryRc, si: &SegmentInfo, ctx: &IOContext) -> Result<Self> {
        let data_file_name = segment_file_name(&si.name, "", DATA_EXTENSION);
        let entries_file_name = segment_file_name(&si.name, "", ENTRIES_EXTENSION);
        let (version, entries) = Self::read_entries(si.get_id(), directory.as_ref(), &entries_file_name)?;

        let mut expected_length = codec_util::index_header_length(DATA_CODEC, "") as i64;
        for e in entries.values() {
            expected_length += e.length;
        }
        expected_length += codec_util::footer_length() as i64;

        let mut input = directory.open_input(&data_file_name, ctx)?;
        codec_util::check_index_header(input.as_mut(), DATA_CODEC, version, version, si.get_id(), "")?;
        codec_util::retrieve_checksum(input.as_mut())?;
        if input.len() != expected_length {
            bail!(ErrorKind::CorruptIndex(format!(
                "compound file length should be {} bytes but is {}",
                expected_length,
                input.len()
            )));
        }

        Ok(CompoundReader {
            directory,
            name: si.name.clone(),
            entries,
            input,
        })
    }

    fn read_entries(
        segment_id: &[u8],
        directory: &dyn Directory,
        entries_file_name: &str,
    ) -> Result<(i32, HashMap<String, FileEntry>)> {
        let mut entries_stream = open_checksum_input(directory, entries_file_name, &IO_CONTEXT_READONCE)?;
        let version = codec_util::check_index_header(
            &mut entries_stream,
            ENTRY_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            segment_id,
            "",
        )?;
        let num_entries = entries_stream.read_vint()?;
        let mut mappings = HashMap::with_capacity(num_entries as usize);
        for _ in 0..num_entries {
            let id = entries_stream.read_string()?;
            let offset = entries_stream.read_long()?;
            let length = entries_stream.read_long()?;
            if mappings.insert(id.clone(), FileEntry { offset, length }).is_some() {
                bail!(ErrorKind::CorruptIndex(format!("duplicate cfs entry '{}'", id)));
            }
        }
        codec_util::check_footer(&mut entries_stream)?;
        Ok((version, mappings))
    }
}

impl fmt::Display for CompoundReader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CompoundReader({})", self.directory)
    }
}

impl Directory for CompoundReader {
    fn list_all(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().map(|n| format!("{}{}", self.name, n)).collect())
    }

    fn file_length(&self, name: &str) -> Result<i64> {
        self.entries
            .get(strip_segment_name(name))
            .map(|e| e.length)
            .ok_or_else(|| ErrorKind::IllegalArgument(format!("no such entry '{}'", name)).into())
    }

    fn create_output(&self, _name: &str, _ctx: &IOContext) -> Result<Box<dyn IndexOutput>> {
        bail!(ErrorKind::UnsupportedOperation(
            "compound reader is read-only".into()
        ))
    }

    fn create_temp_output(&self, _prefix: &str, _suffix: &str, _ctx: &IOContext) -> Result<Box<dyn IndexOutput>> {
        bail!(ErrorKind::UnsupportedOperation(
            "compound reader is read-only".into()
        ))
    }

    fn delete_file(&self, _name: &str) -> Result<()> {
        bail!(ErrorKind::UnsupportedOperation(
            "compound reader is read-only".into()
        ))
    }

    fn rename(&self, _source: &str, _dest: &str) -> Result<()> {
        bail!(ErrorKind::UnsupportedOperation(
            "compound reader is read-only".into()
        ))
    }

    fn open_input(&self, name: &str, _ctx: &IOContext) -> Result<Box<dyn IndexInput>> {
        let id = strip_segment_name(name);
        let entry = self.entries.get(id).ok_or_else(|| {
            ErrorKind::IllegalArgument(format!(
                "no sub-file '{}' in compound file (have: {:?})",
                id,
                self.entries.keys().collect::<Vec<_>>()
            ))
        })?;
        self.input.slice(name, entry.offset, entry.length)
    }

    fn sync(&self, _names: &HashSet<String>) -> Result<()> {
        bail!(ErrorKind::UnsupportedOperation(
            "compound reader is read-only".into()
        ))
    }

    fn obtain_lock(&self, _name: &str) -> Result<Box<dyn Lock>> {
        bail!(ErrorKind::UnsupportedOperation(
            "compound reader is read-only".into()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::RAMDirectory;
    use crate::core::util::string_util::random_id;
    use crate::core::util::VERSION_LATEST;
    use std::collections::HashMap as Map;

    #[test]
    fn round_trips_two_files() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let id = random_id();

        {
            let mut out = dir.create_output("_0.fld", &IOContext::Default).unwrap();
            codec_util::write_index_header(out.as_mut(), "Stub", 0, &id, "").unwrap();
            out.write_string("hello").unwrap();
            codec_util::write_footer(out.as_mut()).unwrap();
        }
        {
            let mut out = dir.create_output("_0.pst", &IOContext::Default).unwrap();
            codec_util::write_index_header(out.as_mut(), "Stub", 0, &id, "").unwrap();
            out.write_vint(42).unwrap();
            codec_util::write_footer(out.as_mut()).unwrap();
        }

        let mut si = SegmentInfo::new(
            VERSION_LATEST,
            "_0",
            10,
            Arc::clone(&dir),
            false,
            None,
            Map::new(),
            id,
            Map::new(),
        )
        .unwrap();
        si.add_files(
            &vec!["_0.fld".to_string(), "_0.pst".to_string()]
                .into_iter()
                .collect(),
        )
        .unwrap();

        CompoundFormatV1.write(dir.as_ref(), &si, &IOContext::Default).unwrap();

        let reader = CompoundFormatV1
            .get_compound_reader(Arc::clone(&dir), &si, &IOContext::Default)
            .unwrap();
        assert_eq!(reader.list_all().unwrap().len(), 2);

        let mut fld = reader.open_input("_0.fld", &IOContext::Default).unwrap();
        codec_util::check_index_header(fld.as_mut(), "Stub", 0, 0, &id, "").unwrap();
        assert_eq!(fld.read_string().unwrap(), "hello");
    }
}
