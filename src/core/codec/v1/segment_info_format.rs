//! Per-segment `.si` file (§4.4 step 4, §6 "Segments manifest": each segment
//! entry in `segments_N` points at a `SegmentInfo` persisted separately so
//! that the manifest itself stays small). Stores everything needed to
//! reconstruct a `SegmentInfo` without re-deriving it from the segment's own
//! data files: version, doc count, compound-file flag, diagnostics,
//! attributes, and the segment's file set.

use crate::core::codec::codec_util;
use crate::core::index::{segment_file_name, SegmentInfo};
use crate::core::store::{
    open_checksum_input, DataInput, DataOutput, Directory, DirectoryRc, IOContext, IndexInput, IndexOutput,
};
use crate::core::util::Version;
use crate::error::Result;
use std::collections::{HashMap, HashSet};

pub const EXTENSION: &str = "si";
pub const CODEC_NAME: &str = "LucerneSegmentInfo";
pub const VERSION_START: i32 = 0;
pub const VERSION_CURRENT: i32 = VERSION_START;

fn write_string_map(out: &mut dyn IndexOutput, map: &HashMap<String, String>) -> Result<()> {
    out.write_vint(map.len() as i32)?;
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    for k in keys {
        out.write_string(k)?;
        out.write_string(&map[k])?;
    }
    Ok(())
}

fn read_string_map(input: &mut dyn IndexInput) -> Result<HashMap<String, String>> {
    let count = input.read_vint()?;
    let mut map = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let k = input.read_string()?;
        let v = input.read_string()?;
        map.insert(k, v);
    }
    Ok(map)
}

pub struct SegmentInfoFormatV1;

impl crate::core::codec::format::SegmentInfoFormat for SegmentInfoFormatV1 {
    fn read(&self, dir: DirectoryRc, name: &str, id: &[u8], ctx: &IOContext) -> Result<SegmentInfo> {
        let file_name = segment_file_name(name, "", EXTENSION);
        let mut input = open_checksum_input(dir.as_ref(), &file_name, ctx)?;
        codec_util::check_index_header(&mut input, CODEC_NAME, VERSION_START, VERSION_CURRENT, id, "")?;

        let major = input.read_vint()?;
        let minor = input.read_vint()?;
        let bugfix = input.read_vint()?;
        let version = Version::new(major, minor, bugfix);

        let max_doc = input.read_int()?;
        let is_compound_file = input.read_byte()? != 0;
        let diagnostics = read_string_map(&mut input)?;
        let attributes = read_string_map(&mut input)?;

        let file_count = input.read_vint()?;
        let mut files = HashSet::with_capacity(file_count as usize);
        for _ in 0..file_count {
            files.insert(input.read_string()?);
        }
        codec_util::check_footer(&mut input)?;

        let mut segment_id = [0u8; crate::core::util::string_util::ID_LENGTH];
        segment_id.copy_from_slice(id);

        let mut info = SegmentInfo::new(
            version,
            name,
            max_doc,
            dir,
            is_compound_file,
            None,
            diagnostics,
            segment_id,
            attributes,
        )?;
        info.set_files(&files)?;
        Ok(info)
    }

    fn write(
        &self,
        dir: &dyn Directory,
        info: &mut SegmentInfo,
        created_files: &mut Vec<String>,
        ctx: &IOContext,
    ) -> Result<()> {
        let file_name = segment_file_name(&info.name, "", EXTENSION);
        let mut out = dir.create_output(&file_name, ctx)?;
        codec_util::write_index_header(out.as_mut(), CODEC_NAME, VERSION_CURRENT, info.get_id(), "")?;

        out.write_vint(info.version.major)?;
        out.write_vint(info.version.minor)?;
        out.write_vint(info.version.bugfix)?;

        out.write_int(info.max_doc())?;
        out.write_byte(info.is_compound_file() as u8)?;
        write_string_map(out.as_mut(), &info.diagnostics)?;
        write_string_map(out.as_mut(), &info.attributes)?;

        let files = info.files();
        out.write_vint(files.len() as i32)?;
        let mut names: Vec<&String> = files.iter().collect();
        names.sort();
        for f in names {
            out.write_string(f)?;
        }
        codec_util::write_footer(out.as_mut())?;
        created_files.push(file_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::format::SegmentInfoFormat;
    use crate::core::store::RAMDirectory;
    use crate::core::util::string_util::random_id;
    use crate::core::util::VERSION_LATEST;
    use std::sync::Arc;

    #[test]
    fn write_then_read_back() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let id = random_id();
        let mut info = SegmentInfo::new(
            VERSION_LATEST,
            "_3",
            17,
            Arc::clone(&dir),
            false,
            None,
            vec![("source".to_string(), "flush".to_string())].into_iter().collect(),
            id,
            HashMap::new(),
        )
        .unwrap();
        info.add_file("_3.fnm").unwrap();

        let format = SegmentInfoFormatV1;
        let mut created = Vec::new();
        format.write(dir.as_ref(), &mut info, &mut created, &IOContext::Default).unwrap();
        assert_eq!(created, vec!["_3.si".to_string()]);

        let read_back = format.read(Arc::clone(&dir), "_3", &id, &IOContext::Default).unwrap();
        assert_eq!(read_back.max_doc(), 17);
        assert!(!read_back.is_compound_file());
        assert_eq!(read_back.diagnostics.get("source"), Some(&"flush".to_string()));
        assert!(read_back.files().contains("_3.fnm"));
    }
}
