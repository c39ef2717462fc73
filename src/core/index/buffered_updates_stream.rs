//! Buffered-deletes stream (§4.6): holds the generation-ordered queue of
//! frozen delete packets and resolves them against already-flushed
//! segments at merge, NRT-open or commit boundaries.

use std::sync::{Arc, Mutex};

use crate::core::index::bufferd_updates::FrozenBufferUpdates;
use crate::core::index::field_info::IndexOptions;
use crate::core::index::terms_hash_per_field::decode_doc_ids;
use crate::core::index::{SegmentCommitInfo, SegmentReadState};
use crate::core::store::IOContext;
use crate::error::Result;

/// The generation-ordered queue of packets awaiting application (§4.6
/// "P"). `Codec`/`Directory`/field-infos access for each segment is
/// reopened from the segment's own `SegmentCommitInfo` rather than cached,
/// since apply runs infrequently relative to indexing.
pub struct BufferedUpdatesStream {
    packets: Mutex<Vec<Arc<FrozenBufferUpdates>>>,
}

impl BufferedUpdatesStream {
    pub fn new() -> Self {
        BufferedUpdatesStream {
            packets: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, packet: Arc<FrozenBufferUpdates>) {
        self.packets.lock().unwrap().push(packet);
    }

    pub fn packet_count(&self) -> usize {
        self.packets.lock().unwrap().len()
    }

    /// Drops packets no longer needed by any of the given segments: a
    /// packet at or below every segment's `bufferedDelGen` can never be
    /// consulted again (§8 "manifest monotonicity" sibling property for
    /// the deletes stream).
    pub fn prune(&self, segments: &[Arc<SegmentCommitInfo>]) {
        let floor = segments.iter().map(|s| s.buffered_deletes_gen()).min().unwrap_or(i64::MAX);
        self.packets.lock().unwrap().retain(|p| p.del_gen() > floor);
    }

    /// Applies every packet that's newer than a segment's own
    /// `bufferedDelGen` to that segment (§4.6 apply algorithm), walking
    /// segments from smallest `bufferedDelGen` to largest and packets from
    /// oldest generation to newest. Returns the total number of newly
    /// deleted documents across all segments.
    pub fn apply(&self, segments: &[Arc<SegmentCommitInfo>], ctx: &IOContext) -> Result<usize> {
        let mut ordered: Vec<&Arc<SegmentCommitInfo>> = segments.iter().collect();
        ordered.sort_by_key(|s| s.buffered_deletes_gen());

        let mut packets: Vec<Arc<FrozenBufferUpdates>> = self.packets.lock().unwrap().clone();
        packets.sort_by_key(|p| p.del_gen());

        let mut total = 0usize;
        for seg in ordered {
            total += apply_to_segment(seg, &packets, ctx)?;
        }
        Ok(total)
    }
}

impl Default for BufferedUpdatesStream {
    fn default() -> Self {
        BufferedUpdatesStream::new()
    }
}

pub(crate) fn docs_only(opts: IndexOptions) -> bool {
    matches!(opts, IndexOptions::None | IndexOptions::Docs)
}

pub(crate) fn has_positions(opts: IndexOptions) -> bool {
    matches!(
        opts,
        IndexOptions::DocsAndFreqsAndPositions | IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    )
}

fn apply_to_segment(seg: &Arc<SegmentCommitInfo>, packets: &[Arc<FrozenBufferUpdates>], ctx: &IOContext) -> Result<usize> {
    let own_gen = seg.buffered_deletes_gen();
    let applicable: Vec<&Arc<FrozenBufferUpdates>> = packets
        .iter()
        .filter(|p| p.del_gen() > own_gen || (p.del_gen() == own_gen && p.is_segment_private))
        .collect();
    if applicable.is_empty() {
        return Ok(0);
    }

    let codec = seg.info.codec().clone();
    let directory = Arc::clone(&seg.info.directory);
    // The live-docs file and `.si` always live in the segment's own
    // directory even for a compound segment (§4.8: they're written after
    // the `.cfs`/`.cfe` pair is sealed); the field-infos and postings
    // files are only reachable through the compound reader once packaged.
    let content_dir: crate::core::store::DirectoryRc = if seg.info.is_compound_file() {
        codec.compound_format().get_compound_reader(Arc::clone(&directory), &seg.info, ctx)?
    } else {
        Arc::clone(&directory)
    };
    let field_infos = codec.field_infos_format().read(content_dir.as_ref(), &seg.info, "", ctx)?;
    let field_infos = Arc::new(field_infos);

    let read_state = SegmentReadState::new(Arc::clone(&content_dir), &seg.info, Arc::clone(&field_infos), ctx, String::new());
    let fields_producer = codec.postings_format().fields_producer(&read_state)?;

    let mut live_docs = if seg.has_deletions() {
        codec.live_docs_format().read_live_docs(directory.as_ref(), seg, ctx)?
    } else {
        *codec.live_docs_format().new_live_docs(seg.info.max_doc() as usize)?
    };

    let mut new_deletes = 0usize;
    let mut max_gen_seen = own_gen;

    for pkt in &applicable {
        let apply_terms = pkt.del_gen() > own_gen;
        max_gen_seen = max_gen_seen.max(pkt.del_gen());

        if apply_terms {
            for (term, doc_id_upto) in &pkt.terms {
                let resolved = fields_producer.term_postings(&term.field, &term.bytes)?;
                let (doc_freq, postings) = match resolved {
                    Some(v) => v,
                    None => continue,
                };
                let field_info = field_infos.field_info_by_name(&term.field);
                let index_options = field_info.map(|fi| fi.index_options).unwrap_or(IndexOptions::Docs);
                let store_payloads = field_info.map(|fi| fi.store_payloads).unwrap_or(false);
                let doc_ids = decode_doc_ids(
                    &postings,
                    doc_freq,
                    docs_only(index_options),
                    has_positions(index_options),
                    store_payloads,
                )?;
                for doc_id in doc_ids {
                    if doc_id < *doc_id_upto && live_docs.get(doc_id as usize) {
                        live_docs.clear(doc_id as usize);
                        new_deletes += 1;
                    }
                }
            }
        }

        for q in &pkt.queries {
            let matches = q.query.matching_docs(fields_producer.as_ref(), seg.info.max_doc())?;
            for doc_id in matches {
                if doc_id < q.doc_id_upto && live_docs.get(doc_id as usize) {
                    live_docs.clear(doc_id as usize);
                    new_deletes += 1;
                }
            }
        }
    }

    if new_deletes > 0 {
        codec
            .live_docs_format()
            .write_live_docs(&live_docs, directory.as_ref(), seg, new_deletes as i32, ctx)?;
        seg.advance_del_gen();
        let new_del_count = seg.del_count() + new_deletes as i32;
        seg.set_del_count(new_del_count)?;
    }
    seg.set_buffered_deletes_gen(max_gen_seen);

    Ok(new_deletes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::Codec;
    use crate::core::codec::format::FieldsProducer;
    use crate::core::index::bufferd_updates::{BufferedUpdates, DeleteQuery};
    use crate::core::index::doc_consumer::{DefaultIndexingChain, DocConsumer};
    use crate::core::index::field_info::{FieldInfo, FieldInfos};
    use crate::core::index::segment_flusher::{flush_segment as flush_segment_impl, FlushSegmentRequest};
    use crate::core::index::terms_hash_per_field::TokenOccurrence;
    use crate::core::index::writer_config::WriterConfig;
    use crate::core::index::Term;
    use crate::core::store::{DirectoryRc, RAMDirectory};
    use crate::core::util::Counter;

    fn occ() -> TokenOccurrence {
        TokenOccurrence {
            position_increment: 1,
            payload: None,
        }
    }

    /// Thin test wrapper around the real segment flusher (§4.4), kept here
    /// so these apply-pass tests can build real on-disk segments without
    /// repeating the flush orchestration.
    fn flush_segment(dir: &DirectoryRc, name: &str, docs: &[(i32, &str)]) -> Arc<SegmentCommitInfo> {
        let infos = FieldInfos::new(vec![FieldInfo::new(
            "title".into(),
            0,
            crate::core::index::field_info::IndexOptions::DocsAndFreqs,
            false,
        )])
        .unwrap();

        let mut chain = DefaultIndexingChain::new(Counter::new(false));
        let mut max_doc = 0;
        for &(doc_id, text) in docs {
            chain
                .add_token(
                    doc_id,
                    "title",
                    crate::core::index::field_info::IndexOptions::DocsAndFreqs,
                    false,
                    text.as_bytes(),
                    &occ(),
                )
                .unwrap();
            chain.finish_document(doc_id);
            max_doc = max_doc.max(doc_id + 1);
        }

        let config = WriterConfig::default();
        let flushed = flush_segment_impl(
            &chain,
            FlushSegmentRequest {
                directory: Arc::clone(dir),
                name: name.to_string(),
                max_doc,
                codec: Codec::default_codec(),
                field_infos: infos,
                config: &config,
                deleted_before_flush: Vec::new(),
                segment_private_deletes: BufferedUpdates::new(),
                del_gen: 0,
                context: IOContext::Default,
            },
        )
        .unwrap();
        flushed.segment_info
    }

    #[test]
    fn apply_term_delete_marks_matching_docs_dead() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let seg = flush_segment(&dir, "_0", &[(0, "alpha"), (1, "beta"), (2, "alpha")]);

        let stream = BufferedUpdatesStream::new();
        let mut updates = BufferedUpdates::new();
        updates.add_term(Term::new("title".to_string(), b"alpha".to_vec()), i32::MAX);
        let frozen = Arc::new(FrozenBufferUpdates::new(&updates, false));
        frozen.set_del_gen(1);
        stream.push(frozen);

        let new_deletes = stream.apply(&[Arc::clone(&seg)], &IOContext::Default).unwrap();
        assert_eq!(new_deletes, 2);
        assert_eq!(seg.del_count(), 2);
        assert_eq!(seg.buffered_deletes_gen(), 1);

        let second_pass = stream.apply(&[seg], &IOContext::Default).unwrap();
        assert_eq!(second_pass, 0, "re-applying an already-seen generation must be a no-op");
    }

    struct MatchAllQuery;

    impl DeleteQuery for MatchAllQuery {
        fn matching_docs(&self, _fields: &dyn FieldsProducer, max_doc: i32) -> Result<Vec<i32>> {
            Ok((0..max_doc).collect())
        }
    }

    #[test]
    fn own_packet_reapplies_only_its_queries() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let seg = flush_segment(&dir, "_0", &[(0, "alpha"), (1, "beta")]);

        let mut updates = BufferedUpdates::new();
        updates.add_term(Term::new("title".to_string(), b"alpha".to_vec()), i32::MAX);
        updates.add_query(Arc::new(MatchAllQuery), 1);
        let frozen = Arc::new(FrozenBufferUpdates::new(&updates, true));
        frozen.set_del_gen(1);
        // Simulate this packet being this segment's own flush-time packet:
        // its term-deletes are already reflected in live-docs, so set
        // bufferedDelGen to its generation before the first apply.
        seg.set_buffered_deletes_gen(1);

        let stream = BufferedUpdatesStream::new();
        stream.push(frozen);

        let new_deletes = stream.apply(&[Arc::clone(&seg)], &IOContext::Default).unwrap();
        // doc 0 ("alpha") would double count if terms were reapplied; only
        // the query (doc_id_upto=1) should mark doc 0 dead here.
        assert_eq!(new_deletes, 1);
        assert_eq!(seg.del_count(), 1);
    }

    #[test]
    fn prune_drops_packets_below_every_segments_floor() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let seg = flush_segment(&dir, "_0", &[(0, "alpha")]);
        seg.set_buffered_deletes_gen(5);

        let stream = BufferedUpdatesStream::new();
        let mut updates = BufferedUpdates::new();
        updates.add_term(Term::new("title".to_string(), b"alpha".to_vec()), i32::MAX);
        let frozen = Arc::new(FrozenBufferUpdates::new(&updates, false));
        frozen.set_del_gen(3);
        stream.push(frozen);
        assert_eq!(stream.packet_count(), 1);

        stream.prune(&[seg]);
        assert_eq!(stream.packet_count(), 0);
    }
}
