//! Live-docs bitset file (§3 "Segment": "live-docs bitset (optional; absent
//! means 'all live')", delGen is "the base name of the bitset file"). One
//! `<segment>_<delGen>.live` file is written each time deletions are newly
//! applied to a segment; the previous generation's file is left for the
//! reader-reference-count policy to reclaim (§5).

use crate::core::codec::codec_util;
use crate::core::codec::format::LiveDocsFormat;
use crate::core::index::{file_name_from_generation, SegmentCommitInfo};
use crate::core::store::{open_checksum_input, DataInput, DataOutput, Directory, IOContext};
use crate::core::util::bit_set::FixedBitSet;
use crate::error::Result;
use std::collections::HashSet;

pub const EXTENSION: &str = "live";
pub const CODEC_NAME: &str = "LucerneLiveDocs";
pub const VERSION_START: i32 = 0;
pub const VERSION_CURRENT: i32 = VERSION_START;

pub struct LiveDocsFormatV1;

impl LiveDocsFormat for LiveDocsFormatV1 {
    fn new_live_docs(&self, size: usize) -> Result<Box<FixedBitSet>> {
        Ok(Box::new(FixedBitSet::all_set(size)))
    }

    fn read_live_docs(&self, dir: &dyn Directory, info: &SegmentCommitInfo, ctx: &IOContext) -> Result<FixedBitSet> {
        let name = file_name_from_generation(&info.info.name, EXTENSION, info.del_gen() as u64);
        let mut input = open_checksum_input(dir, &name, ctx)?;
        codec_util::check_index_header(
            &mut input,
            CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            info.info.get_id(),
            "",
        )?;
        let num_bits = input.read_vint()? as usize;
        let byte_len = input.read_vint()? as usize;
        let bytes = input.read_bytes(byte_len)?;
        codec_util::check_footer(&mut input)?;
        Ok(FixedBitSet::from_bytes(&bytes, num_bits))
    }

    fn write_live_docs(
        &self,
        bits: &FixedBitSet,
        dir: &dyn Directory,
        info: &SegmentCommitInfo,
        _new_del_count: i32,
        ctx: &IOContext,
    ) -> Result<()> {
        let name = file_name_from_generation(&info.info.name, EXTENSION, info.next_write_del_gen() as u64);
        let mut out = dir.create_output(&name, ctx)?;
        codec_util::write_index_header(out.as_mut(), CODEC_NAME, VERSION_CURRENT, info.info.get_id(), "")?;
        let bytes = bits.as_bytes();
        out.write_vint(bits.len() as i32)?;
        out.write_vint(bytes.len() as i32)?;
        out.write_bytes(&bytes)?;
        codec_util::write_footer(out.as_mut())
    }

    fn files(&self, info: &SegmentCommitInfo, files: &mut HashSet<String>) {
        if info.has_deletions() {
            files.insert(file_name_from_generation(&info.info.name, EXTENSION, info.del_gen() as u64));
        }
    }
}
