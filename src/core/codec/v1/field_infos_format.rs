//! Field-infos file (§4.4 step 4: "write the field-infos file (field-name
//! -> field-id, options)"). One `.fnm` file per segment, written once at
//! flush and never rewritten (field numbers are stable for the life of the
//! index, tracked separately by `FieldNumbers`).

use crate::core::codec::codec_util;
use crate::core::codec::format::FieldInfosFormat;
use crate::core::index::field_info::{FieldInfo, FieldInfos, IndexOptions};
use crate::core::index::{segment_file_name, SegmentInfo};
use crate::core::store::{open_checksum_input, DataInput, DataOutput, Directory, IOContext};
use crate::error::{ErrorKind, Result};

pub const EXTENSION: &str = "fnm";
pub const CODEC_NAME: &str = "LucerneFieldInfos";
pub const VERSION_START: i32 = 0;
/// Adds the per-field `store_payloads` byte.
pub const VERSION_PAYLOADS: i32 = 1;
pub const VERSION_CURRENT: i32 = VERSION_PAYLOADS;

fn index_options_byte(opts: IndexOptions) -> u8 {
    match opts {
        IndexOptions::None => 0,
        IndexOptions::Docs => 1,
        IndexOptions::DocsAndFreqs => 2,
        IndexOptions::DocsAndFreqsAndPositions => 3,
        IndexOptions::DocsAndFreqsAndPositionsAndOffsets => 4,
    }
}

fn index_options_from_byte(b: u8) -> Result<IndexOptions> {
    Ok(match b {
        0 => IndexOptions::None,
        1 => IndexOptions::Docs,
        2 => IndexOptions::DocsAndFreqs,
        3 => IndexOptions::DocsAndFreqsAndPositions,
        4 => IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
        _ => bail!(ErrorKind::CorruptIndex(format!("invalid index options byte {}", b))),
    })
}

pub struct FieldInfosFormatV1;

impl FieldInfosFormat for FieldInfosFormatV1 {
    fn read(
        &self,
        dir: &dyn Directory,
        segment_info: &SegmentInfo,
        segment_suffix: &str,
        ctx: &IOContext,
    ) -> Result<FieldInfos> {
        let name = segment_file_name(&segment_info.name, segment_suffix, EXTENSION);
        let mut input = open_checksum_input(dir, &name, ctx)?;
        let version = codec_util::check_index_header(
            &mut input,
            CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            segment_info.get_id(),
            segment_suffix,
        )?;

        let count = input.read_vint()?;
        let mut infos = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let field_name = input.read_string()?;
            let number = input.read_vint()?;
            let index_options = index_options_from_byte(input.read_byte()?)?;
            let has_norms = input.read_byte()? != 0;
            let store_payloads = version >= VERSION_PAYLOADS && input.read_byte()? != 0;
            infos.push(FieldInfo::new(field_name, number, index_options, has_norms).with_payloads(store_payloads));
        }
        codec_util::check_footer(&mut input)?;
        FieldInfos::new(infos)
    }

    fn write(
        &self,
        dir: &dyn Directory,
        segment_info: &SegmentInfo,
        segment_suffix: &str,
        infos: &FieldInfos,
        ctx: &IOContext,
    ) -> Result<()> {
        let name = segment_file_name(&segment_info.name, segment_suffix, EXTENSION);
        let mut out = dir.create_output(&name, ctx)?;
        codec_util::write_index_header(
            out.as_mut(),
            CODEC_NAME,
            VERSION_CURRENT,
            segment_info.get_id(),
            segment_suffix,
        )?;

        out.write_vint(infos.len() as i32)?;
        for field_name in infos.sorted_field_names() {
            let fi = infos.field_info_by_name(&field_name).unwrap();
            out.write_string(&fi.name)?;
            out.write_vint(fi.number)?;
            out.write_byte(index_options_byte(fi.index_options))?;
            out.write_byte(fi.has_norms as u8)?;
            out.write_byte(fi.store_payloads as u8)?;
        }
        codec_util::write_footer(out.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::RAMDirectory;
    use crate::core::util::string_util::random_id;
    use crate::core::util::VERSION_LATEST;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn write_then_read_back() {
        let dir = RAMDirectory::new();
        let id = random_id();
        let segment_info = SegmentInfo::new(
            VERSION_LATEST,
            "_0",
            3,
            Arc::new(RAMDirectory::new()),
            false,
            None,
            HashMap::new(),
            id,
            HashMap::new(),
        )
        .unwrap();

        let infos = FieldInfos::new(vec![
            FieldInfo::new("title".into(), 0, IndexOptions::DocsAndFreqsAndPositions, false).with_payloads(true),
            FieldInfo::new("body".into(), 1, IndexOptions::DocsAndFreqs, true),
        ])
        .unwrap();

        let format = FieldInfosFormatV1;
        format.write(&dir, &segment_info, "", &infos, &IOContext::Default).unwrap();
        let read_back = format.read(&dir, &segment_info, "", &IOContext::Default).unwrap();

        assert_eq!(read_back.len(), 2);
        let title = read_back.field_info_by_name("title").unwrap();
        assert_eq!(title.number, 0);
        assert_eq!(title.index_options, IndexOptions::DocsAndFreqsAndPositions);
        assert!(title.store_payloads);
        let body = read_back.field_info_by_name("body").unwrap();
        assert!(body.has_norms);
        assert!(!body.store_payloads);
    }
}
