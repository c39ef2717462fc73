//! Per-field hashed term table (§4.3): a term seen for the first time in a
//! segment is assigned a dense `term_id`; every later occurrence of the
//! same bytes probes back to that id. Each term's docID/freq/position
//! stream is appended to byte-block-pool-backed slices as occurrences
//! arrive, never requiring the whole segment's postings to be resident as
//! one contiguous buffer.
//!
//! One decision worth calling out against the usual streaming design:
//! finishing a document flushes every term it touched immediately (no
//! "write the freq lazily on the next doc's first occurrence" dance,
//! since finish-document already tells us the doc is complete). The
//! mutable `(offset, level)` write cursor for each stream is kept as a
//! plain field; only each stream's fixed first-slice origin, needed at
//! flush time after the cursor has relocated, lives in the int-block
//! pool.

use std::collections::HashMap;

use crate::core::index::field_info::IndexOptions;
use crate::core::util::byte_block_pool::{next_level, ByteBlockPool, DirectTrackingAllocator, LEVEL_SIZE_ARRAY};
use crate::core::util::int_block_pool::{DirectIntAllocator, IntBlockPool};
use crate::core::util::{Counter, DocId};
use crate::core::store::DataOutput;
use crate::error::Result;

const INVALID_DOC: i32 = -1;

/// One token occurrence handed in by the external analysis stage (§1:
/// text analysis/tokenization is an outside collaborator). The position
/// increment is already delta-coded, as analyzers conventionally produce.
#[derive(Debug, Clone, Default)]
pub struct TokenOccurrence {
    pub position_increment: i32,
    pub payload: Option<Vec<u8>>,
}

/// One term's fully-decoded postings, ready to become a block-tree
/// `PendingTerm` once the caller sorts by `term` (§4.5.1).
#[derive(Debug, Clone)]
pub struct FlushedTerm {
    pub term: Vec<u8>,
    pub doc_freq: i32,
    pub total_term_freq: i64,
    pub postings: Vec<u8>,
}

struct StreamCursor {
    start_offset: usize,
    write_offset: usize,
    level: usize,
}

impl StreamCursor {
    fn new(start_offset: usize, level: usize) -> Self {
        StreamCursor {
            start_offset,
            write_offset: start_offset,
            level,
        }
    }
}

struct PostingsArray {
    last_doc_id: Vec<i32>,
    doc_freq_current_doc: Vec<i32>,
    doc_count: Vec<i32>,
    total_term_freq: Vec<i64>,
    last_position: Vec<i32>,
    // -1 until a term's first payload-bearing occurrence; tracked across
    // the whole segment (not reset per document) so a run of equal-length
    // payloads only pays for the length vint once.
    last_payload_len: Vec<i32>,
    // Mutable write cursors, advanced as occurrences stream in.
    doc_stream: Vec<StreamCursor>,
    pos_stream: Vec<StreamCursor>,
    // Int-pool slots holding each stream's first-slice origin, fixed at
    // stream creation — flush-time replay starts here, never from the
    // (by-then-relocated) write cursor.
    doc_stream_origin_slot: Vec<usize>,
    pos_stream_origin_slot: Vec<usize>,
}

impl PostingsArray {
    fn new() -> Self {
        PostingsArray {
            last_doc_id: Vec::new(),
            doc_freq_current_doc: Vec::new(),
            doc_count: Vec::new(),
            total_term_freq: Vec::new(),
            last_position: Vec::new(),
            last_payload_len: Vec::new(),
            doc_stream: Vec::new(),
            pos_stream: Vec::new(),
            doc_stream_origin_slot: Vec::new(),
            pos_stream_origin_slot: Vec::new(),
        }
    }

    fn grow(&mut self, int_pool: &mut IntBlockPool) {
        self.last_doc_id.push(INVALID_DOC);
        self.doc_freq_current_doc.push(0);
        self.doc_count.push(0);
        self.total_term_freq.push(0);
        self.last_position.push(0);
        self.last_payload_len.push(-1);
        self.doc_stream.push(StreamCursor::new(0, 0));
        self.pos_stream.push(StreamCursor::new(0, 0));
        self.doc_stream_origin_slot.push(int_pool.new_slot());
        self.pos_stream_origin_slot.push(int_pool.new_slot());
    }
}

/// Hashed term table plus postings streams for one field, within one
/// not-yet-flushed segment.
pub struct TermsHashPerField {
    pub field_name: String,
    pub index_options: IndexOptions,
    store_payloads: bool,

    term_bytes_pool: ByteBlockPool,
    postings_pool: ByteBlockPool,
    int_pool: IntBlockPool,

    ids: Vec<i32>,
    mask: usize,
    term_bytes_start: Vec<usize>,
    postings: PostingsArray,

    touched_this_doc: Vec<i32>,
    touched_flag: Vec<bool>,
}

impl TermsHashPerField {
    pub fn new(field_name: String, index_options: IndexOptions, store_payloads: bool, bytes_used: Counter) -> Self {
        let term_bytes_pool = ByteBlockPool::new(Box::new(DirectTrackingAllocator::new(bytes_used.shallow_copy())));
        let postings_pool = ByteBlockPool::new(Box::new(DirectTrackingAllocator::new(bytes_used.shallow_copy())));
        let int_pool = IntBlockPool::new(Box::new(DirectIntAllocator::new(bytes_used.shallow_copy())));
        TermsHashPerField {
            field_name,
            index_options,
            store_payloads,
            term_bytes_pool,
            postings_pool,
            int_pool,
            ids: vec![-1; 4],
            mask: 3,
            term_bytes_start: Vec::new(),
            postings: PostingsArray::new(),
            touched_this_doc: Vec::new(),
            touched_flag: Vec::new(),
        }
    }

    fn has_freqs(&self) -> bool {
        !matches!(self.index_options, IndexOptions::None | IndexOptions::Docs)
    }

    fn has_positions(&self) -> bool {
        matches!(
            self.index_options,
            IndexOptions::DocsAndFreqsAndPositions | IndexOptions::DocsAndFreqsAndPositionsAndOffsets
        )
    }

    fn hash_bytes(b: &[u8]) -> u32 {
        let mut h: u32 = 2_166_136_261;
        for &byte in b {
            h ^= u32::from(byte);
            h = h.wrapping_mul(16_777_619);
        }
        h
    }

    fn stored_term_bytes(&self, term_id: usize) -> Vec<u8> {
        let offset = self.term_bytes_start[term_id];
        let len_bytes = self.term_bytes_pool.read_bytes(offset, 2);
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        self.term_bytes_pool.read_bytes(offset + 2, len)
    }

    fn bytes_equal(&self, term_id: i32, key: &[u8]) -> bool {
        self.stored_term_bytes(term_id as usize) == key
    }

    fn store_new_term_bytes(&mut self, key: &[u8]) -> usize {
        let offset = self.term_bytes_pool.allocate(2 + key.len());
        let len = key.len() as u16;
        self.term_bytes_pool.write_bytes(offset, &len.to_be_bytes());
        self.term_bytes_pool.write_bytes(offset + 2, key);
        offset
    }

    /// Returns `key`'s dense term id, creating a new entry (and allocating
    /// its postings streams) on first sight. Rehashes at load factor ≥ ½,
    /// which only ever relocates hash slots — term ids, once assigned,
    /// never change (§4.3 invariant).
    pub fn add_or_get(&mut self, key: &[u8]) -> i32 {
        let hash = Self::hash_bytes(key);
        let mut slot = (hash as usize) & self.mask;
        loop {
            let id = self.ids[slot];
            if id == -1 {
                let term_id = self.term_bytes_start.len() as i32;
                let offset = self.store_new_term_bytes(key);
                self.term_bytes_start.push(offset);
                self.postings.grow(&mut self.int_pool);
                self.touched_flag.push(false);
                self.ids[slot] = term_id;
                self.maybe_rehash();
                return term_id;
            }
            if self.bytes_equal(id, key) {
                return id;
            }
            slot = (slot + 1) & self.mask;
        }
    }

    fn maybe_rehash(&mut self) {
        let count = self.term_bytes_start.len();
        if count * 2 < self.ids.len() {
            return;
        }
        let new_size = self.ids.len() * 2;
        let new_mask = new_size - 1;
        let mut new_ids = vec![-1i32; new_size];
        for &id in &self.ids {
            if id == -1 {
                continue;
            }
            let bytes = self.stored_term_bytes(id as usize);
            let hash = Self::hash_bytes(&bytes);
            let mut slot = (hash as usize) & new_mask;
            while new_ids[slot] != -1 {
                slot = (slot + 1) & new_mask;
            }
            new_ids[slot] = id;
        }
        self.ids = new_ids;
        self.mask = new_mask;
    }

    fn init_term_streams(&mut self, term_id: usize) {
        let (doc_start, _) = self.postings_pool.new_slice(0);
        self.postings.doc_stream[term_id] = StreamCursor::new(doc_start, 0);
        let doc_slot = self.postings.doc_stream_origin_slot[term_id];
        self.int_pool.set(doc_slot, doc_start as i32);
        if self.has_positions() {
            let (pos_start, _) = self.postings_pool.new_slice(0);
            self.postings.pos_stream[term_id] = StreamCursor::new(pos_start, 0);
            let pos_slot = self.postings.pos_stream_origin_slot[term_id];
            self.int_pool.set(pos_slot, pos_start as i32);
        }
    }

    fn write_stream_byte(pool: &mut ByteBlockPool, cursor: &mut StreamCursor, b: u8) {
        let usable = LEVEL_SIZE_ARRAY[cursor.level] - 4;
        if cursor.write_offset - cursor.start_offset == usable {
            let (new_offset, _) = pool.alloc_next_slice(cursor.start_offset, usable, cursor.level);
            cursor.level = next_level(cursor.level);
            cursor.start_offset = new_offset;
            cursor.write_offset = new_offset;
        }
        pool.write_byte(cursor.write_offset, b);
        cursor.write_offset += 1;
    }

    fn write_stream_vint(pool: &mut ByteBlockPool, cursor: &mut StreamCursor, mut v: i32) {
        loop {
            if (v & !0x7f) == 0 {
                Self::write_stream_byte(pool, cursor, v as u8);
                return;
            } else {
                Self::write_stream_byte(pool, cursor, ((v & 0x7f) | 0x80) as u8);
                v = ((v as u32) >> 7) as i32;
            }
        }
    }

    fn read_stream_byte(pool: &ByteBlockPool, cursor: &mut StreamCursor) -> u8 {
        let usable = LEVEL_SIZE_ARRAY[cursor.level] - 4;
        if cursor.write_offset - cursor.start_offset == usable {
            let next = pool.read_forward_pointer(cursor.start_offset, usable);
            cursor.level = next_level(cursor.level);
            cursor.start_offset = next;
            cursor.write_offset = next;
        }
        let b = pool.read_byte(cursor.write_offset);
        cursor.write_offset += 1;
        b
    }

    fn write_stream_bytes(pool: &mut ByteBlockPool, cursor: &mut StreamCursor, bytes: &[u8]) {
        for &b in bytes {
            Self::write_stream_byte(pool, cursor, b);
        }
    }

    fn read_stream_bytes(pool: &ByteBlockPool, cursor: &mut StreamCursor, len: usize) -> Vec<u8> {
        (0..len).map(|_| Self::read_stream_byte(pool, cursor)).collect()
    }

    fn read_stream_vint(pool: &ByteBlockPool, cursor: &mut StreamCursor) -> i32 {
        let mut b = Self::read_stream_byte(pool, cursor);
        let mut i = (b & 0x7f) as i32;
        let mut shift = 7;
        while b & 0x80 != 0 {
            b = Self::read_stream_byte(pool, cursor);
            i |= ((b & 0x7f) as i32) << shift;
            shift += 7;
        }
        i
    }

    /// Records one occurrence of `key` in `doc_id`. When the field stores
    /// payloads, each position is written as `vint((posDelta << 1) |
    /// payloadLenChanged)` followed by `vint(payloadLen)` (only when the
    /// length differs from the previous occurrence's) and then the raw
    /// payload bytes (§4.3 per-term postings byte stream layout).
    pub fn add_token(&mut self, doc_id: DocId, key: &[u8], occ: &TokenOccurrence) -> Result<()> {
        let term_id = self.add_or_get(key) as usize;
        if !self.touched_flag[term_id] {
            self.touched_flag[term_id] = true;
            self.touched_this_doc.push(term_id as i32);
            self.postings.doc_freq_current_doc[term_id] = 0;
            self.postings.last_position[term_id] = 0;
            if self.postings.last_doc_id[term_id] == INVALID_DOC {
                self.init_term_streams(term_id);
            }
        }
        self.postings.doc_freq_current_doc[term_id] += 1;
        self.postings.total_term_freq[term_id] += 1;
        if self.has_positions() {
            self.postings.last_position[term_id] += occ.position_increment;
            let pos_delta = occ.position_increment;
            let mut cursor = std::mem::replace(&mut self.postings.pos_stream[term_id], StreamCursor::new(0, 0));
            if self.store_payloads {
                let payload_len = occ.payload.as_ref().map_or(0, |p| p.len() as i32);
                let changed = payload_len != self.postings.last_payload_len[term_id];
                Self::write_stream_vint(&mut self.postings_pool, &mut cursor, (pos_delta << 1) | (changed as i32));
                if changed {
                    Self::write_stream_vint(&mut self.postings_pool, &mut cursor, payload_len);
                    self.postings.last_payload_len[term_id] = payload_len;
                }
                if let Some(payload) = occ.payload.as_ref() {
                    Self::write_stream_bytes(&mut self.postings_pool, &mut cursor, payload);
                }
            } else {
                Self::write_stream_vint(&mut self.postings_pool, &mut cursor, pos_delta);
            }
            self.postings.pos_stream[term_id] = cursor;
        }
        Ok(())
    }

    /// Finalizes every term touched by `doc_id`: now that the document is
    /// complete, the accumulated per-doc frequency is known and can be
    /// appended to the doc stream (§4.3 "finish-document ... finalizes the
    /// per-term state").
    pub fn finish_document(&mut self, doc_id: DocId) {
        let touched = std::mem::take(&mut self.touched_this_doc);
        for term_id in touched {
            let tid = term_id as usize;
            let delta = doc_id - self.postings.last_doc_id[tid];
            let freq = self.postings.doc_freq_current_doc[tid];

            let mut cursor = std::mem::replace(&mut self.postings.doc_stream[tid], StreamCursor::new(0, 0));
            Self::write_stream_vint(&mut self.postings_pool, &mut cursor, delta);
            if self.has_freqs() {
                Self::write_stream_vint(&mut self.postings_pool, &mut cursor, freq);
            }
            self.postings.doc_stream[tid] = cursor;

            self.postings.doc_count[tid] += 1;
            self.postings.last_doc_id[tid] = doc_id;
            self.postings.doc_freq_current_doc[tid] = 0;
            self.touched_flag[tid] = false;
        }
    }

    /// Replays every term's in-RAM stream into the final opaque postings
    /// blob the block-tree writer stores alongside each `PendingTerm`
    /// (§4.5.1). Terms are returned in hash-table order; the caller sorts
    /// by `term` before handing them to `BlockTreeWriter`.
    pub fn flush_terms(&self) -> Vec<FlushedTerm> {
        let docs_only = !self.has_freqs();
        let has_positions = self.has_positions();
        let mut out = Vec::with_capacity(self.term_bytes_start.len());
        for term_id in 0..self.term_bytes_start.len() {
            let doc_count = self.postings.doc_count[term_id];
            let total_term_freq = self.postings.total_term_freq[term_id];
            let mut blob = Vec::new();

            let doc_origin = self.int_pool.get(self.postings.doc_stream_origin_slot[term_id]) as usize;
            let pos_origin = self.int_pool.get(self.postings.pos_stream_origin_slot[term_id]) as usize;
            let mut doc_cursor = StreamCursor::new(doc_origin, 0);
            let mut pos_cursor = StreamCursor::new(pos_origin, 0);
            let mut last_payload_len: i32 = -1;
            for _ in 0..doc_count {
                let doc_delta = Self::read_stream_vint(&self.postings_pool, &mut doc_cursor);
                blob.write_vint(doc_delta).ok();
                let freq = if docs_only {
                    1
                } else {
                    let f = Self::read_stream_vint(&self.postings_pool, &mut doc_cursor);
                    blob.write_vint(f).ok();
                    f
                };
                if has_positions {
                    for _ in 0..freq {
                        if self.store_payloads {
                            let code = Self::read_stream_vint(&self.postings_pool, &mut pos_cursor);
                            let changed = code & 1 != 0;
                            blob.write_vint(code).ok();
                            if changed {
                                last_payload_len = Self::read_stream_vint(&self.postings_pool, &mut pos_cursor);
                                blob.write_vint(last_payload_len).ok();
                            }
                            if last_payload_len > 0 {
                                let bytes = Self::read_stream_bytes(&self.postings_pool, &mut pos_cursor, last_payload_len as usize);
                                blob.write_bytes(&bytes).ok();
                            }
                        } else {
                            let pos_delta = Self::read_stream_vint(&self.postings_pool, &mut pos_cursor);
                            blob.write_vint(pos_delta).ok();
                        }
                    }
                }
            }

            out.push(FlushedTerm {
                term: self.stored_term_bytes(term_id),
                doc_freq: doc_count,
                total_term_freq,
                postings: blob,
            });
        }
        out
    }

    pub fn num_terms(&self) -> usize {
        self.term_bytes_start.len()
    }
}

/// Decodes the docIDs covered by a postings blob produced by
/// [`TermsHashPerField::flush_terms`] (or the equivalent block-tree-stored
/// blob read back via `SegmentTermsEnum::postings`), without needing
/// position data — used by the buffered-deletes apply algorithm (§4.6) to
/// turn a delete term into concrete doc ids. `store_payloads` must match
/// the field's own flag so the position stream's optional payload-length
/// and payload-byte framing is skipped correctly rather than misread as
/// posDelta vints.
pub fn decode_doc_ids(
    postings: &[u8],
    doc_freq: i32,
    docs_only: bool,
    has_positions: bool,
    store_payloads: bool,
) -> Result<Vec<DocId>> {
    use crate::core::store::DataInput;
    let mut cur: &[u8] = postings;
    let mut doc_id = -1i32;
    let mut out = Vec::with_capacity(doc_freq as usize);
    let mut last_payload_len: i32 = -1;
    for _ in 0..doc_freq {
        let delta = cur.read_vint()?;
        doc_id += delta;
        out.push(doc_id);
        let freq = if docs_only { 1 } else { cur.read_vint()? };
        if has_positions {
            for _ in 0..freq {
                if store_payloads {
                    let code = cur.read_vint()?;
                    if code & 1 != 0 {
                        last_payload_len = cur.read_vint()?;
                    }
                    if last_payload_len > 0 {
                        cur.read_bytes(last_payload_len as usize)?;
                    }
                } else {
                    cur.read_vint()?;
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occ(pos: i32) -> TokenOccurrence {
        TokenOccurrence {
            position_increment: pos,
            payload: None,
        }
    }

    #[test]
    fn single_term_single_doc_roundtrip() {
        let mut field = TermsHashPerField::new(
            "body".into(),
            IndexOptions::DocsAndFreqsAndPositions,
            false,
            Counter::new(false),
        );
        field.add_token(0, b"cat", &occ(1)).unwrap();
        field.add_token(0, b"cat", &occ(1)).unwrap();
        field.finish_document(0);

        let flushed = field.flush_terms();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].term, b"cat");
        assert_eq!(flushed[0].doc_freq, 1);
        assert_eq!(flushed[0].total_term_freq, 2);

        let ids = decode_doc_ids(&flushed[0].postings, flushed[0].doc_freq, false, true, false).unwrap();
        assert_eq!(ids, vec![0]);
    }

    #[test]
    fn term_across_many_docs_preserves_deltas() {
        let mut field = TermsHashPerField::new(
            "body".into(),
            IndexOptions::DocsAndFreqs,
            false,
            Counter::new(false),
        );
        for doc in [0, 2, 7, 8] {
            field.add_token(doc, b"dog", &occ(1)).unwrap();
            field.finish_document(doc);
        }
        let flushed = field.flush_terms();
        assert_eq!(flushed[0].doc_freq, 4);
        let ids = decode_doc_ids(&flushed[0].postings, flushed[0].doc_freq, false, false, false).unwrap();
        assert_eq!(ids, vec![0, 2, 7, 8]);
    }

    #[test]
    fn rehash_preserves_term_identity_across_many_terms() {
        let mut field = TermsHashPerField::new(
            "body".into(),
            IndexOptions::Docs,
            false,
            Counter::new(false),
        );
        let terms: Vec<String> = (0..200).map(|i| format!("term{}", i)).collect();
        for (doc, t) in terms.iter().enumerate() {
            field.add_token(doc as DocId, t.as_bytes(), &occ(1)).unwrap();
            field.finish_document(doc as DocId);
        }
        assert_eq!(field.num_terms(), 200);
        let flushed = field.flush_terms();
        let by_term: HashMap<_, _> = flushed.iter().map(|f| (f.term.clone(), f.doc_freq)).collect();
        for t in &terms {
            assert_eq!(by_term.get(t.as_bytes()), Some(&1));
        }
    }

    #[test]
    fn payloads_round_trip_with_varying_and_repeated_lengths() {
        let mut field = TermsHashPerField::new(
            "body".into(),
            IndexOptions::DocsAndFreqsAndPositions,
            true,
            Counter::new(false),
        );
        let occ_with = |pos: i32, payload: &[u8]| TokenOccurrence {
            position_increment: pos,
            payload: Some(payload.to_vec()),
        };
        // Same length twice (length vint omitted on the repeat), then a
        // shorter payload (length vint re-emitted).
        field.add_token(0, b"cat", &occ_with(1, b"aaa")).unwrap();
        field.add_token(0, b"cat", &occ_with(2, b"bbb")).unwrap();
        field.add_token(0, b"cat", &occ_with(1, b"c")).unwrap();
        field.finish_document(0);

        let flushed = field.flush_terms();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].doc_freq, 1);
        assert_eq!(flushed[0].total_term_freq, 3);

        use crate::core::store::DataInput;
        let mut cur: &[u8] = &flushed[0].postings;
        assert_eq!(cur.read_vint().unwrap(), 0); // doc delta
        let freq = cur.read_vint().unwrap();
        assert_eq!(freq, 3);

        let mut last_len = -1i32;
        let mut decoded = Vec::new();
        for _ in 0..freq {
            let code = cur.read_vint().unwrap();
            let pos_delta = code >> 1;
            if code & 1 != 0 {
                last_len = cur.read_vint().unwrap();
            }
            let bytes = if last_len > 0 {
                cur.read_bytes(last_len as usize).unwrap()
            } else {
                Vec::new()
            };
            decoded.push((pos_delta, bytes));
        }
        assert_eq!(
            decoded,
            vec![(1, b"aaa".to_vec()), (2, b"bbb".to_vec()), (1, b"c".to_vec())]
        );
    }

    #[test]
    fn decode_doc_ids_skips_payload_bearing_positions() {
        let mut field = TermsHashPerField::new(
            "body".into(),
            IndexOptions::DocsAndFreqsAndPositions,
            true,
            Counter::new(false),
        );
        let occ_with = |pos: i32, payload: &[u8]| TokenOccurrence {
            position_increment: pos,
            payload: Some(payload.to_vec()),
        };
        field.add_token(0, b"cat", &occ_with(1, b"xx")).unwrap();
        field.finish_document(0);
        field.add_token(5, b"cat", &occ_with(1, b"y")).unwrap();
        field.finish_document(5);

        let flushed = field.flush_terms();
        let ids = decode_doc_ids(&flushed[0].postings, flushed[0].doc_freq, false, true, true).unwrap();
        assert_eq!(ids, vec![0, 5]);
    }
}
