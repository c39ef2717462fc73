//! Wires the block-tree terms dictionary (§4.5) into the `PostingsFormat`
//! seam: `.tim` holds the block bytes `BlockTreeWriter` produces, `.tip`
//! holds one FST-plus-stats entry per field so a reader can jump straight
//! to a field's root block without scanning `.tim` (§4.5.1 "FST over
//! block-leading terms").

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::codec::codec_util;
use crate::core::codec::format::{FieldsConsumer, FieldsProducer, PostingsFormat};
use crate::core::codec::v1::blocktree::{BlockTreeWriter, FieldReader, PendingTerm};
use crate::core::index::doc_consumer::FlushedFields;
use crate::core::index::field_info::IndexOptions;
use crate::core::index::{segment_file_name, SegmentReadState, SegmentWriteState};
use crate::core::store::{open_checksum_input, DataInput, DataOutput, Directory, DirectoryRc, IndexInput, IndexOutput};
use crate::error::Result;
use crate::fst::Fst;

pub const TERMS_EXTENSION: &str = "tim";
pub const TERMS_INDEX_EXTENSION: &str = "tip";
pub const TERMS_CODEC: &str = "BlockTreeTermsData";
pub const TERMS_INDEX_CODEC: &str = "BlockTreeTermsIndex";
pub const VERSION_START: i32 = 0;
pub const VERSION_CURRENT: i32 = VERSION_START;

fn docs_only(index_options: IndexOptions) -> bool {
    matches!(index_options, IndexOptions::None | IndexOptions::Docs)
}

pub struct BlockTreePostingsFormat;

impl PostingsFormat for BlockTreePostingsFormat {
    fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>> {
        Ok(Box::new(BlockTreeFieldsProducer::open(state)?))
    }

    fn fields_consumer(&self, state: &mut SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        Ok(Box::new(BlockTreeFieldsConsumer::new(state)?))
    }
}

struct FieldEntry {
    docs_only: bool,
    doc_count: i32,
    sum_doc_freq: i64,
    sum_total_term_freq: i64,
    fst: Fst,
}

/// Writes one field at a time; the `.tip` entry table is buffered in RAM
/// and flushed after the last field, since its length isn't known until
/// every field's FST has been built.
pub struct BlockTreeFieldsConsumer {
    directory: DirectoryRc,
    tim_name: String,
    tip_name: String,
    segment_id: [u8; crate::core::util::string_util::ID_LENGTH],
    tim_out: Box<dyn IndexOutput>,
    entries: Vec<(String, FieldEntry)>,
}

impl BlockTreeFieldsConsumer {
    fn new(state: &mut SegmentWriteState) -> Result<Self> {
        let tim_name = segment_file_name(&state.segment_info.name, &state.segment_suffix, TERMS_EXTENSION);
        let tip_name = segment_file_name(&state.segment_info.name, &state.segment_suffix, TERMS_INDEX_EXTENSION);
        let segment_id = state.segment_info.id;

        let mut tim_out = state.directory.create_output(&tim_name, &state.context)?;
        codec_util::write_index_header(tim_out.as_mut(), TERMS_CODEC, VERSION_CURRENT, &segment_id, &state.segment_suffix)?;

        Ok(BlockTreeFieldsConsumer {
            directory: Arc::clone(&state.directory),
            tim_name,
            tip_name,
            segment_id,
            tim_out,
            entries: Vec::new(),
        })
    }

    /// Writes the `.tip` entry table and both footers. Takes `&mut self`
    /// rather than `self` since the `FieldsConsumer` trait only hands out
    /// `&mut` — this is only ever called once, as the last step of `write`.
    fn finish(&mut self, state: &mut SegmentWriteState) -> Result<()> {
        codec_util::write_footer(self.tim_out.as_mut())?;

        let mut tip_out = self.directory.create_output(&self.tip_name, &state.context)?;
        codec_util::write_index_header(
            tip_out.as_mut(),
            TERMS_INDEX_CODEC,
            VERSION_CURRENT,
            &self.segment_id,
            &state.segment_suffix,
        )?;
        tip_out.write_vint(self.entries.len() as i32)?;
        for (name, entry) in &self.entries {
            tip_out.write_string(name)?;
            tip_out.write_byte(entry.docs_only as u8)?;
            tip_out.write_vint(entry.doc_count)?;
            tip_out.write_vlong(entry.sum_doc_freq)?;
            tip_out.write_vlong(entry.sum_total_term_freq)?;
            entry.fst.write_to(tip_out.as_mut())?;
        }
        codec_util::write_footer(tip_out.as_mut())?;

        state.segment_info.add_file(&self.tim_name)?;
        state.segment_info.add_file(&self.tip_name)?;
        Ok(())
    }
}

impl FieldsConsumer for BlockTreeFieldsConsumer {
    fn write(&mut self, fields: FlushedFields, state: &mut SegmentWriteState) -> Result<()> {
        for field in &fields {
            let docs_only_flag = docs_only(field.index_options);
            let writer = BlockTreeWriter::with_block_sizes(docs_only_flag, state.min_items_per_block, state.max_items_per_block);
            let pending: Vec<PendingTerm> = field
                .terms
                .iter()
                .map(|t| PendingTerm {
                    term: t.term.clone(),
                    doc_freq: t.doc_freq,
                    total_term_freq: t.total_term_freq,
                    postings: t.postings.clone(),
                })
                .collect();
            let meta = writer.write_field(self.tim_out.as_mut(), &pending)?;
            self.entries.push((
                field.field_name.clone(),
                FieldEntry {
                    docs_only: docs_only_flag,
                    doc_count: meta.doc_count,
                    sum_doc_freq: meta.sum_doc_freq,
                    sum_total_term_freq: meta.sum_total_term_freq,
                    fst: meta.fst,
                },
            ));
        }
        self.finish(state)
    }
}

/// Holds every field's FST-plus-stats entry read from `.tip`; `.tim` is
/// reopened on demand since a `SegmentTermsEnum` needs a mutable
/// `IndexInput` of its own to seek freely (§4.5.2).
pub struct BlockTreeFieldsProducer {
    directory: DirectoryRc,
    tim_name: String,
    fields: HashMap<String, FieldReader>,
}

impl BlockTreeFieldsProducer {
    fn open(state: &SegmentReadState) -> Result<Self> {
        let tim_name = segment_file_name(&state.segment_info.name, &state.segment_suffix, TERMS_EXTENSION);
        let tip_name = segment_file_name(&state.segment_info.name, &state.segment_suffix, TERMS_INDEX_EXTENSION);
        let segment_id = state.segment_info.get_id().to_vec();

        let mut tip_in = open_checksum_input(state.directory.as_ref(), &tip_name, state.context)?;
        codec_util::check_index_header(
            &mut tip_in,
            TERMS_INDEX_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            &segment_id,
            &state.segment_suffix,
        )?;
        let field_count = tip_in.read_vint()?;
        let mut fields = HashMap::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let name = tip_in.read_string()?;
            let docs_only_flag = tip_in.read_byte()? != 0;
            let doc_count = tip_in.read_vint()?;
            let sum_doc_freq = tip_in.read_vlong()?;
            let sum_total_term_freq = tip_in.read_vlong()?;
            let fst = Fst::read_from(&mut tip_in)?;
            fields.insert(
                name,
                FieldReader::new(fst, docs_only_flag, doc_count, sum_doc_freq, sum_total_term_freq),
            );
        }
        codec_util::check_footer(&mut tip_in)?;

        Ok(BlockTreeFieldsProducer {
            directory: Arc::clone(&state.directory),
            tim_name,
            fields,
        })
    }

    /// Opens a fresh handle on this segment's `.tim` data stream — callers
    /// drive a `FieldReader::iterator` over it to walk a field's terms.
    pub fn open_terms_input(&self, ctx: &crate::core::store::IOContext) -> Result<Box<dyn IndexInput>> {
        self.directory.open_input(&self.tim_name, ctx)
    }
}

impl FieldsProducer for BlockTreeFieldsProducer {
    fn terms(&self, field: &str) -> Result<Option<FieldReader>> {
        Ok(self.fields.get(field).cloned())
    }

    fn term_postings(&self, field: &str, term: &[u8]) -> Result<Option<(i32, Vec<u8>)>> {
        let reader = match self.fields.get(field) {
            Some(r) => r,
            None => return Ok(None),
        };
        let mut input = self.open_terms_input(&crate::core::store::IOContext::Default)?;
        let mut terms_enum = reader.iterator(input.as_mut());
        if !terms_enum.seek_exact(term)? {
            return Ok(None);
        }
        let doc_freq = terms_enum.doc_freq().expect("positioned term has doc_freq");
        let postings = terms_enum.postings().expect("positioned term has postings").to_vec();
        Ok(Some((doc_freq, postings)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::index::doc_consumer::FlushedField;
    use crate::core::index::field_info::{FieldInfo, FieldInfos};
    use crate::core::index::terms_hash_per_field::FlushedTerm;
    use crate::core::index::SegmentInfo;
    use crate::core::store::{IOContext, RAMDirectory};
    use crate::core::util::string_util::random_id;
    use crate::core::util::VERSION_LATEST;

    fn term(s: &str, docs: &[i32]) -> FlushedTerm {
        let mut postings = Vec::new();
        let mut prev = -1;
        for &d in docs {
            postings.write_vint(d - prev).unwrap();
            postings.write_vint(1).unwrap();
            prev = d;
        }
        FlushedTerm {
            term: s.as_bytes().to_vec(),
            doc_freq: docs.len() as i32,
            total_term_freq: docs.len() as i64,
            postings,
        }
    }

    fn make_segment_info(dir: DirectoryRc) -> SegmentInfo {
        SegmentInfo::new(
            VERSION_LATEST,
            "_0",
            10,
            dir,
            false,
            None,
            HashMap::new(),
            random_id(),
            HashMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn write_then_read_back_two_fields() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let segment_info = make_segment_info(Arc::clone(&dir));
        let field_infos = FieldInfos::new(vec![
            FieldInfo::new("title".into(), 0, IndexOptions::DocsAndFreqs, false),
            FieldInfo::new("body".into(), 1, IndexOptions::DocsAndFreqs, false),
        ])
        .unwrap();

        let mut state = SegmentWriteState::new(
            Arc::clone(&dir),
            segment_info,
            field_infos,
            None,
            IOContext::Default,
            String::new(),
        );

        let fields: FlushedFields = vec![
            FlushedField {
                field_name: "title".into(),
                index_options: IndexOptions::DocsAndFreqs,
                terms: vec![term("hello", &[0, 3]), term("world", &[1])],
            },
            FlushedField {
                field_name: "body".into(),
                index_options: IndexOptions::DocsAndFreqs,
                terms: vec![term("cat", &[0, 1, 2])],
            },
        ];

        let format = BlockTreePostingsFormat;
        let mut consumer = format.fields_consumer(&mut state).unwrap();
        consumer.write(fields, &mut state).unwrap();

        assert!(state.segment_info.files().contains("_0.tim"));
        assert!(state.segment_info.files().contains("_0.tip"));

        let field_infos_for_read = std::sync::Arc::new(state.field_infos.clone());
        let read_state = SegmentReadState::new(
            Arc::clone(&dir),
            &state.segment_info,
            field_infos_for_read,
            &IOContext::Default,
            String::new(),
        );
        let producer = format.fields_producer(&read_state).unwrap();

        let title_reader = producer.terms("title").unwrap().unwrap();
        assert_eq!(title_reader.sum_doc_freq, 3);
        let body_reader = producer.terms("body").unwrap().unwrap();
        assert_eq!(body_reader.sum_doc_freq, 3);
        assert!(producer.terms("missing").unwrap().is_none());
    }
}
