//! Segment flusher (§4.4, §2 component 4): drains one indexing thread's
//! in-memory `DocConsumer` state to immutable segment files. This is the
//! real, reusable version of the orchestration previously only exercised
//! ad hoc inside `buffered_updates_stream`'s test helper.
//!
//! Ordering mirrors §4.4 exactly: freeze and apply the segment's own
//! pending deletes against the just-finished in-RAM postings (step 1),
//! materialize a live-docs bitset if anything was cleared (step 2), write
//! the terms dictionary and field-infos file (steps 3-4), optionally pack
//! the result into a compound file (§4.8), and hand back a `FlushedSegment`
//! (step 5) that the surrounding writer admits into the next manifest
//! generation — this module never touches `SegmentInfos` itself.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::codec::format::FieldsConsumer;
use crate::core::codec::Codec;
use crate::core::index::bufferd_updates::{BufferedUpdates, FrozenBufferUpdates};
use crate::core::index::buffered_updates_stream::{docs_only, has_positions};
use crate::core::index::doc_consumer::DocConsumer;
use crate::core::index::field_info::FieldInfos;
use crate::core::index::terms_hash_per_field::decode_doc_ids;
use crate::core::index::writer_config::WriterConfig;
use crate::core::index::{segment_file_name, SegmentCommitInfo, SegmentInfo, SegmentWriteState};
use crate::core::store::{DirectoryRc, IOContext};
use crate::core::util::bit_set::FixedBitSet;
use crate::core::util::string_util::random_id;
use crate::core::util::{DocId, VERSION_LATEST};
use crate::error::Result;

/// Everything `flush_segment` needs to turn one thread's accumulated
/// postings into on-disk segment files.
pub struct FlushSegmentRequest<'a> {
    pub directory: DirectoryRc,
    pub name: String,
    pub max_doc: i32,
    pub codec: Arc<Codec>,
    pub field_infos: FieldInfos,
    pub config: &'a WriterConfig,
    /// DocIDs marked deleted-before-flush by a non-fatal analyzer failure
    /// (§4.3: "the doc slot is marked deleted-before-flush"). A fatal
    /// failure instead discards the whole thread's state and never reaches
    /// this call.
    pub deleted_before_flush: Vec<DocId>,
    /// Deletes this same indexing thread issued against its own
    /// in-progress segment while still indexing it. Term-deletes in here
    /// are resolved against the just-built in-RAM postings below (§4.6:
    /// "term-deletes for a segment's own packet were already applied by
    /// the producing indexing thread"); query-deletes are left for a later
    /// `BufferedUpdatesStream::apply` pass, since evaluating an arbitrary
    /// query needs the segment's on-disk postings reader.
    pub segment_private_deletes: BufferedUpdates,
    /// The generation this segment's own private-delete packet will carry
    /// once pushed onto the deletes stream. Stamped onto both the frozen
    /// packet returned here and the new segment's starting
    /// `bufferedDelGen`, so a later `apply` pass sees `pkt.del_gen() ==
    /// seg.buffered_deletes_gen()` for its own packet and skips reapplying
    /// the terms already folded into the live-docs bitset here (§4.6,
    /// §8 "delete monotonicity").
    pub del_gen: i64,
    pub context: IOContext,
}

/// Result of a flush (§4.4 step 5): the new segment's committed metadata,
/// plus whichever of its own deletes still need to be applied later (the
/// query-deletes, if any; `None` if there's nothing left to apply).
pub struct FlushedSegment {
    pub segment_info: Arc<SegmentCommitInfo>,
    pub segment_private_deletes: Option<Arc<FrozenBufferUpdates>>,
}

/// Drains `chain`'s accumulated postings per `req` (§4.4).
pub fn flush_segment(chain: &dyn DocConsumer, req: FlushSegmentRequest) -> Result<FlushedSegment> {
    let FlushSegmentRequest {
        directory,
        name,
        max_doc,
        codec,
        field_infos,
        config,
        deleted_before_flush,
        segment_private_deletes,
        del_gen,
        context,
    } = req;

    let t0 = std::time::SystemTime::now();
    debug!("flush: segment '{}' max_doc={}", name, max_doc);

    let flushed_fields = chain.flush(&field_infos);

    // Step 1: resolve this segment's own private term-deletes against the
    // in-RAM postings we're about to write. Doc IDs are looked up directly
    // in `FlushedTerm::postings` rather than waiting for a disk round-trip.
    let mut deleted: Vec<DocId> = deleted_before_flush;
    for (term, doc_id_upto) in &segment_private_deletes.deleted_terms {
        let field = match flushed_fields.iter().find(|f| f.field_name == term.field) {
            Some(f) => f,
            None => continue,
        };
        let flushed_term = match field.terms.iter().find(|t| t.term == term.bytes) {
            Some(t) => t,
            None => continue,
        };
        let field_info = field_infos.field_info_by_name(&term.field);
        let store_payloads = field_info.map(|fi| fi.store_payloads).unwrap_or(false);
        let doc_ids = decode_doc_ids(
            &flushed_term.postings,
            flushed_term.doc_freq,
            docs_only(field.index_options),
            has_positions(field.index_options),
            store_payloads,
        )?;
        for doc_id in doc_ids {
            if doc_id < *doc_id_upto {
                deleted.push(doc_id);
            }
        }
    }

    // Step 2: materialize live-docs only if anything was actually cleared;
    // an all-live segment has no live-docs file at all (§3).
    let del_count = deleted.len() as i32;
    let mut live_docs = FixedBitSet::all_set(max_doc as usize);
    for doc_id in &deleted {
        live_docs.clear(*doc_id as usize);
    }

    // Steps 3-4: write the terms dictionary, then the field-infos file.
    let id = random_id();
    let segment_info = SegmentInfo::new(
        VERSION_LATEST,
        &name,
        max_doc,
        Arc::clone(&directory),
        false,
        Some(Arc::clone(&codec)),
        HashMap::new(),
        id,
        HashMap::new(),
    )?;

    let mut write_state = SegmentWriteState::new(
        Arc::clone(&directory),
        segment_info,
        field_infos.clone(),
        None,
        context,
        String::new(),
    )
    .with_block_sizes(config.min_items_per_block, config.max_items_per_block);

    let mut consumer = codec.postings_format().fields_consumer(&mut write_state)?;
    consumer.write(flushed_fields, &mut write_state)?;
    let mut segment_info = write_state.segment_info;

    codec
        .field_infos_format()
        .write(directory.as_ref(), &segment_info, "", &field_infos, &context)?;
    segment_info.add_file(&segment_file_name(&name, "", "fnm"))?;

    // §4.8: pack into a compound file when the segment is small enough.
    let flushed_size: i64 = segment_info
        .files()
        .iter()
        .filter_map(|f| directory.file_length(f).ok())
        .sum();
    if config.use_compound_file(flushed_size) {
        codec.compound_format().write(directory.as_ref(), &segment_info, &context)?;
        let component_files: Vec<String> = segment_info.files().iter().cloned().collect();
        for f in &component_files {
            directory.delete_file(f)?;
        }
        let cfs_files: std::collections::HashSet<String> = vec![
            segment_file_name(&name, "", crate::core::codec::v1::compound::DATA_EXTENSION),
            segment_file_name(&name, "", crate::core::codec::v1::compound::ENTRIES_EXTENSION),
        ]
        .into_iter()
        .collect();
        segment_info.set_files(&cfs_files)?;
        segment_info.set_use_compound_file();
    }

    let mut created_files = Vec::new();
    codec
        .segment_info_format()
        .write(directory.as_ref(), &mut segment_info, &mut created_files, &context)?;

    let commit_info = Arc::new(SegmentCommitInfo::new(
        segment_info,
        0,
        -1,
        -1,
        -1,
        HashMap::new(),
        Default::default(),
    ));

    if del_count > 0 {
        codec
            .live_docs_format()
            .write_live_docs(&live_docs, directory.as_ref(), &commit_info, del_count, &context)?;
        commit_info.advance_del_gen();
        commit_info.set_del_count(del_count)?;
    }
    commit_info.set_buffered_deletes_gen(del_gen);

    let frozen = FrozenBufferUpdates::new(&segment_private_deletes, true);
    frozen.set_del_gen(del_gen);
    let segment_private_deletes = if frozen.any() { Some(Arc::new(frozen)) } else { None };

    debug!(
        "flush: segment '{}' done in {:?}, del_count={}",
        commit_info.info.name,
        t0.elapsed().unwrap_or_default(),
        del_count
    );

    Ok(FlushedSegment {
        segment_info: commit_info,
        segment_private_deletes,
    })
}
