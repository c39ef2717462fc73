//! Per-concern format traits a `Codec` wires together (§2 component list).
//! Each format owns one file extension family and is swappable independent
//! of the others — the same seam Lucene/rucene use to let postings, terms,
//! field-infos and live-docs formats evolve on separate version tracks.

use crate::core::index::{FieldInfos, SegmentCommitInfo, SegmentInfo, SegmentReadState, SegmentWriteState};
use crate::core::store::{Directory, DirectoryRc, IOContext};
use crate::error::Result;
use std::collections::HashSet;

pub trait CompoundFormat: Send + Sync {
    fn get_compound_reader(
        &self,
        dir: DirectoryRc,
        si: &SegmentInfo,
        ctx: &IOContext,
    ) -> Result<DirectoryRc>;

    fn write(&self, dir: &dyn Directory, si: &SegmentInfo, ctx: &IOContext) -> Result<()>;
}

pub trait FieldInfosFormat: Send + Sync {
    fn read(
        &self,
        dir: &dyn Directory,
        segment_info: &SegmentInfo,
        segment_suffix: &str,
        ctx: &IOContext,
    ) -> Result<FieldInfos>;

    fn write(
        &self,
        dir: &dyn Directory,
        segment_info: &SegmentInfo,
        segment_suffix: &str,
        infos: &FieldInfos,
        ctx: &IOContext,
    ) -> Result<()>;
}

pub trait SegmentInfoFormat: Send + Sync {
    fn read(&self, dir: DirectoryRc, name: &str, id: &[u8], ctx: &IOContext) -> Result<SegmentInfo>;

    fn write(
        &self,
        dir: &dyn Directory,
        info: &mut SegmentInfo,
        created_files: &mut Vec<String>,
        ctx: &IOContext,
    ) -> Result<()>;
}

pub trait LiveDocsFormat: Send + Sync {
    fn new_live_docs(&self, size: usize) -> Result<Box<crate::core::util::bit_set::FixedBitSet>>;

    fn read_live_docs(
        &self,
        dir: &dyn Directory,
        info: &SegmentCommitInfo,
        ctx: &IOContext,
    ) -> Result<crate::core::util::bit_set::FixedBitSet>;

    fn write_live_docs(
        &self,
        bits: &crate::core::util::bit_set::FixedBitSet,
        dir: &dyn Directory,
        info: &SegmentCommitInfo,
        new_del_count: i32,
        ctx: &IOContext,
    ) -> Result<()>;

    fn files(&self, info: &SegmentCommitInfo, files: &mut HashSet<String>);
}

/// Consumes one field's sorted term stream at a time (§4.4 step 3: "iterate
/// its terms in byte-sort order and emit to the terms-dictionary writer").
pub trait FieldsConsumer {
    fn write(&mut self, fields: crate::core::index::doc_consumer::FlushedFields, state: &mut SegmentWriteState) -> Result<()>;
}

pub trait FieldsProducer: Send + Sync {
    fn terms(&self, field: &str) -> Result<Option<crate::core::codec::v1::blocktree::FieldReader>>;

    /// Doc-freq and raw postings bytes for one term in one field, decoded
    /// with the field's own `FieldReader`, or `None` if the field has no
    /// terms dictionary or the term isn't present. The deletes stream
    /// (§4.6) uses this instead of taking a direct dependency on any one
    /// format's on-disk term-lookup machinery.
    fn term_postings(&self, field: &str, term: &[u8]) -> Result<Option<(i32, Vec<u8>)>>;
}

pub trait PostingsFormat: Send + Sync {
    fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>>;

    fn fields_consumer(&self, state: &mut SegmentWriteState) -> Result<Box<dyn FieldsConsumer>>;
}
