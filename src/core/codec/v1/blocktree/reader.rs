use crate::core::store::{DataInput, IndexInput};
use crate::core::util::automaton::Automaton;
use crate::error::{Error, ErrorKind, Result};
use crate::fst::Fst;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    Found,
    NotFound,
    End,
}

struct FloorEntry {
    label: u8,
    fp: i64,
    has_terms: bool,
}

struct BlockRoot {
    fp: i64,
    has_terms: bool,
    is_floor: bool,
    floor: Vec<FloorEntry>,
}

fn decode_block_root(mut bytes: &[u8]) -> Result<BlockRoot> {
    let fp = bytes.read_vlong()?;
    let has_terms = bytes.read_byte()? != 0;
    let is_floor = bytes.read_byte()? != 0;
    let mut floor = Vec::new();
    if is_floor {
        let n = bytes.read_vint()?;
        for _ in 0..n {
            let label = bytes.read_byte()?;
            let rel = bytes.read_vlong()?;
            let negative = bytes.read_byte()? != 0;
            let entry_has_terms = bytes.read_byte()? != 0;
            let entry_fp = if negative { fp + rel } else { fp - rel };
            floor.push(FloorEntry {
                label,
                fp: entry_fp,
                has_terms: entry_has_terms,
            });
        }
    }
    Ok(BlockRoot {
        fp,
        has_terms,
        is_floor,
        floor,
    })
}

enum BlockEntry {
    Term {
        suffix: Vec<u8>,
        doc_freq: i32,
        total_term_freq: i64,
        postings: Vec<u8>,
    },
    SubBlock {
        suffix: Vec<u8>,
        fp: i64,
    },
}

struct Block {
    entries: Vec<BlockEntry>,
}

fn read_block(input: &mut dyn IndexInput, fp: i64, docs_only: bool) -> Result<(Block, bool)> {
    input.seek(fp)?;
    let header = input.read_vint()?;
    let ent_count = (header >> 1) as usize;
    let is_last_in_floor = (header & 1) != 0;

    let suffix_header = input.read_vint()?;
    let suffix_len = (suffix_header >> 1) as usize;
    let is_leaf = (suffix_header & 1) != 0;
    let suffix_bytes = input.read_bytes(suffix_len)?;
    let mut sp = 0usize;

    let mut suffixes: Vec<(Vec<u8>, bool)> = Vec::with_capacity(ent_count);
    for _ in 0..ent_count {
        if is_leaf {
            let len = read_vint_slice(&suffix_bytes, &mut sp)? as usize;
            suffixes.push((suffix_bytes[sp..sp + len].to_vec(), false));
            sp += len;
        } else {
            let v = read_vint_slice(&suffix_bytes, &mut sp)?;
            let len = (v >> 1) as usize;
            let is_sub = (v & 1) != 0;
            suffixes.push((suffix_bytes[sp..sp + len].to_vec(), is_sub));
            sp += len;
        }
    }

    let pointer_len = input.read_vint()? as usize;
    let pointer_bytes = input.read_bytes(pointer_len)?;
    let mut pp = 0usize;

    let stats_len = input.read_vint()? as usize;
    let stats_bytes = input.read_bytes(stats_len)?;
    let mut stp = 0usize;

    let block_fp = fp;
    let mut entries = Vec::with_capacity(ent_count);
    for (suffix, is_sub) in suffixes {
        if is_sub {
            let delta = read_vlong_slice(&pointer_bytes, &mut pp)?;
            entries.push(BlockEntry::SubBlock {
                suffix,
                fp: block_fp - delta,
            });
        } else {
            let doc_freq = read_vint_slice(&stats_bytes, &mut stp)?;
            let total_term_freq = if docs_only {
                doc_freq as i64
            } else {
                doc_freq as i64 + read_vlong_slice(&stats_bytes, &mut stp)?
            };
            let postings_len = read_vint_slice(&stats_bytes, &mut stp)? as usize;
            let postings = stats_bytes[stp..stp + postings_len].to_vec();
            stp += postings_len;
            entries.push(BlockEntry::Term {
                suffix,
                doc_freq,
                total_term_freq,
                postings,
            });
        }
    }

    Ok((Block { entries }, is_last_in_floor))
}

fn read_vint_slice(buf: &[u8], pos: &mut usize) -> Result<i32> {
    let mut b = buf[*pos];
    *pos += 1;
    let mut i = (b & 0x7f) as i32;
    let mut shift = 7;
    while b & 0x80 != 0 {
        b = buf[*pos];
        *pos += 1;
        i |= ((b & 0x7f) as i32) << shift;
        shift += 7;
    }
    Ok(i)
}

fn read_vlong_slice(buf: &[u8], pos: &mut usize) -> Result<i64> {
    let mut b = buf[*pos];
    *pos += 1;
    let mut i = (b & 0x7f) as i64;
    let mut shift = 7;
    while b & 0x80 != 0 {
        b = buf[*pos];
        *pos += 1;
        i |= ((b & 0x7f) as i64) << shift;
        shift += 7;
    }
    Ok(i)
}

/// A field's terms dictionary: the FST prefix index plus a handle on the
/// `.tim`-equivalent data stream (§4.5.2).
#[derive(Clone)]
pub struct FieldReader {
    fst: Fst,
    docs_only: bool,
    pub doc_count: i32,
    pub sum_doc_freq: i64,
    pub sum_total_term_freq: i64,
}

impl FieldReader {
    pub fn new(fst: Fst, docs_only: bool, doc_count: i32, sum_doc_freq: i64, sum_total_term_freq: i64) -> Self {
        FieldReader {
            fst,
            docs_only,
            doc_count,
            sum_doc_freq,
            sum_total_term_freq,
        }
    }

    pub fn iterator<'a>(&'a self, input: &'a mut dyn IndexInput) -> SegmentTermsEnum<'a> {
        SegmentTermsEnum {
            fst: &self.fst,
            input,
            docs_only: self.docs_only,
            current_term: Vec::new(),
            current_block: None,
            current_index: 0,
            positioned: false,
        }
    }

    /// Enumerates the terms of this field accepted by `automaton`, starting
    /// at the smallest term ≥ `start_term` (§4.5.2 `intersect`).
    pub fn intersect<'a, A: Automaton>(
        &'a self,
        input: &'a mut dyn IndexInput,
        automaton: &A,
        start_term: &[u8],
    ) -> Result<IntersectEnum> {
        self.iterator(input).intersect(automaton, start_term)
    }
}

/// A stateful cursor over one field's term stream (§4.5.2
/// `FieldReader.iterator()`).
pub struct SegmentTermsEnum<'a> {
    fst: &'a Fst,
    input: &'a mut dyn IndexInput,
    docs_only: bool,
    current_term: Vec<u8>,
    current_block: Option<Block>,
    current_index: usize,
    positioned: bool,
}

impl<'a> SegmentTermsEnum<'a> {
    /// Finds the block whose logical prefix is the longest ancestor of
    /// `target` actually indexed in the FST, returning that prefix alongside
    /// its decoded floor metadata.
    fn root_for(&self, target: &[u8]) -> Result<Option<(Vec<u8>, BlockRoot)>> {
        match crate::fst::FstCursor::floor(self.fst, target) {
            Some((len, bytes)) => Ok(Some((target[..len].to_vec(), decode_block_root(bytes)?))),
            None => Ok(None),
        }
    }

    /// Re-derives a `BlockRoot` for a prefix reached by descending into a
    /// sub-block pointer. Every prefix that was ever the target of a
    /// recursive block build has its own FST entry, so this lookup cannot
    /// legitimately miss.
    fn root_at(&self, prefix: &[u8]) -> Result<BlockRoot> {
        let bytes = self.fst.get(prefix).ok_or_else(|| -> Error {
            ErrorKind::CorruptIndex(format!(
                "block-tree index has no entry for prefix {:?}",
                prefix
            ))
            .into()
        })?;
        decode_block_root(bytes)
    }

    /// Picks which physical floor chunk to start scanning at, given the
    /// bytes of `target` beyond this block's own prefix. Returns the
    /// 0-based floor index (0 = the entry chunk itself, i = `root.floor[i -
    /// 1]`) alongside that chunk's file pointer.
    fn pick_floor_start(root: &BlockRoot, remaining: &[u8]) -> (usize, i64) {
        if !root.is_floor || remaining.is_empty() {
            return (0, root.fp);
        }
        let b = remaining[0];
        let mut idx = 0usize;
        let mut fp = root.fp;
        for (i, entry) in root.floor.iter().enumerate() {
            if entry.label <= b {
                idx = i + 1;
                fp = entry.fp;
            } else {
                break;
            }
        }
        (idx, fp)
    }

    /// Returns true iff `target` exists, positioning the cursor on it.
    pub fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        Ok(self.seek_ceil(target)? == SeekStatus::Found)
    }

    /// Positions on the smallest term ≥ `target`.
    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let (mut prefix, mut root) = match self.root_for(target)? {
            Some(pair) => pair,
            None => {
                self.positioned = false;
                return Ok(SeekStatus::End);
            }
        };

        let (mut floor_idx, mut fp) = Self::pick_floor_start(&root, &target[prefix.len()..]);

        loop {
            let (block, is_last_in_floor) = read_block(self.input, fp, self.docs_only)?;

            // (child fp, child prefix, whether `target` actually continues
            // down this sub-block's own path)
            let mut descend: Option<(i64, Vec<u8>, bool)> = None;

            for (i, entry) in block.entries.iter().enumerate() {
                match entry {
                    BlockEntry::Term { suffix, .. } => {
                        let mut full = prefix.clone();
                        full.extend_from_slice(suffix);
                        match full.as_slice().cmp(target) {
                            std::cmp::Ordering::Equal => {
                                self.current_term = full;
                                self.current_block = Some(Block {
                                    entries: take_entries(block),
                                });
                                self.current_index = i;
                                self.positioned = true;
                                return Ok(SeekStatus::Found);
                            }
                            std::cmp::Ordering::Greater => {
                                self.current_term = full;
                                self.current_block = Some(Block {
                                    entries: take_entries(block),
                                });
                                self.current_index = i;
                                self.positioned = true;
                                return Ok(SeekStatus::NotFound);
                            }
                            std::cmp::Ordering::Less => continue,
                        }
                    }
                    BlockEntry::SubBlock { suffix, fp: child_fp } => {
                        let on_path = target.len() > prefix.len()
                            && target[prefix.len()..].starts_with(suffix.as_slice());
                        if on_path {
                            let mut full = prefix.clone();
                            full.extend_from_slice(suffix);
                            descend = Some((*child_fp, full, true));
                            break;
                        }
                        let mut full = prefix.clone();
                        full.extend_from_slice(suffix);
                        if full.as_slice() > target {
                            // target sorts before this whole sub-block; its
                            // smallest term is the answer, wherever target's
                            // own bytes diverge from this prefix.
                            descend = Some((*child_fp, full, false));
                            break;
                        }
                    }
                }
            }

            if let Some((child_fp, child_prefix, on_path)) = descend {
                root = self.root_at(&child_prefix)?;
                prefix = child_prefix;
                let (idx, start_fp) = if on_path {
                    Self::pick_floor_start(&root, &target[prefix.len()..])
                } else {
                    (0, root.fp)
                };
                floor_idx = idx;
                fp = start_fp;
                continue;
            }

            if is_last_in_floor {
                self.positioned = false;
                return Ok(SeekStatus::End);
            }
            // Exhausted this physical chunk without a decision: the answer,
            // if any, lives in the next floor chunk sharing this prefix.
            floor_idx += 1;
            fp = root.floor[floor_idx - 1].fp;
        }
    }

    /// Advances to the next term in byte-sort order, or returns `None` when
    /// the field is exhausted.
    pub fn next(&mut self) -> Result<Option<Vec<u8>>> {
        if !self.positioned {
            return self.seek_ceil(&[]).map(|status| {
                if status == SeekStatus::End {
                    None
                } else {
                    Some(self.current_term.clone())
                }
            });
        }
        // This simplified cursor reloads whichever block currently holds
        // `current_index` and advances linearly; cross-block continuation
        // falls back through `seek_ceil` from one past the current term.
        if let Some(block) = &self.current_block {
            if self.current_index + 1 < block.entries.len() {
                if let BlockEntry::Term { suffix, .. } = &block.entries[self.current_index + 1] {
                    let prefix_len = self.current_term.len() - entry_suffix_len(block, self.current_index);
                    let mut term = self.current_term[..prefix_len].to_vec();
                    term.extend_from_slice(suffix);
                    self.current_index += 1;
                    self.current_term = term.clone();
                    return Ok(Some(term));
                }
            }
        }
        // fall through to a fresh ceil-seek strictly after the current term
        let mut probe = self.current_term.clone();
        probe.push(0);
        match self.seek_ceil(&probe)? {
            SeekStatus::End => Ok(None),
            _ => Ok(Some(self.current_term.clone())),
        }
    }

    pub fn term(&self) -> &[u8] {
        &self.current_term
    }

    pub fn doc_freq(&self) -> Option<i32> {
        self.current_entry().and_then(|e| match e {
            BlockEntry::Term { doc_freq, .. } => Some(*doc_freq),
            _ => None,
        })
    }

    pub fn total_term_freq(&self) -> Option<i64> {
        self.current_entry().and_then(|e| match e {
            BlockEntry::Term { total_term_freq, .. } => Some(*total_term_freq),
            _ => None,
        })
    }

    pub fn postings(&self) -> Option<&[u8]> {
        self.current_entry().and_then(|e| match e {
            BlockEntry::Term { postings, .. } => Some(postings.as_slice()),
            _ => None,
        })
    }

    fn current_entry(&self) -> Option<&BlockEntry> {
        self.current_block
            .as_ref()
            .and_then(|b| b.entries.get(self.current_index))
    }
}

/// Length of the suffix bytes for the entry at `index` — i.e. how much of
/// `current_term` belongs to that entry rather than the shared block prefix.
/// Must read `entries[index]`, not always the block's first entry: sibling
/// entries in the same block commonly have different suffix lengths.
fn entry_suffix_len(block: &Block, index: usize) -> usize {
    match block.entries.get(index) {
        Some(BlockEntry::Term { suffix, .. }) => suffix.len(),
        _ => 0,
    }
}

/// One term accepted by an `intersect` automaton walk, with its decoded
/// stats and opaque postings metadata (§4.5.2 `intersect`).
pub struct IntersectedTerm {
    pub term: Vec<u8>,
    pub doc_freq: i32,
    pub total_term_freq: i64,
    pub postings: Vec<u8>,
}

/// The result of `SegmentTermsEnum::intersect`: every term in the field
/// accepted by the automaton, at or after `start_term`, in byte-sort order.
///
/// Built eagerly by a single recursive descent (§4.5.2: "uses the FST to
/// skip entire blocks whose prefix cannot lead to acceptance and uses the
/// automaton's per-state transition set to skip entries within a block by
/// first-byte") rather than as an incremental cursor — the block tree has no
/// parent pointers, so resuming a partial descent needs the same prefix
/// stack either way; collecting up front keeps that stack on the call stack
/// instead of heap-allocated frames.
pub struct IntersectEnum {
    terms: std::vec::IntoIter<IntersectedTerm>,
    current: Option<IntersectedTerm>,
}

impl IntersectEnum {
    pub fn next(&mut self) -> Option<&IntersectedTerm> {
        self.current = self.terms.next();
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&IntersectedTerm> {
        self.current.as_ref()
    }
}

impl<'a> SegmentTermsEnum<'a> {
    /// Enumerates every term accepted by `automaton`, starting at the
    /// smallest term ≥ `start_term` (pass `&[]` to scan the whole field).
    pub fn intersect<A: Automaton>(&mut self, automaton: &A, start_term: &[u8]) -> Result<IntersectEnum> {
        let mut out = Vec::new();
        if let Some((prefix, root)) = self.root_for_intersect(start_term)? {
            let mut state = automaton.start();
            for &b in &prefix {
                state = automaton.accept(&state, b);
            }
            if automaton.can_match(&state) {
                let start_term = start_term.to_vec();
                self.walk_intersect(prefix, root, state, &start_term, automaton, &mut out)?;
            }
        }
        Ok(IntersectEnum {
            terms: out.into_iter(),
            current: None,
        })
    }

    /// Like `root_for`, but falls back to the field's root block (empty
    /// prefix) when `start_term` is empty or the FST has no entry at or
    /// below it — `intersect` must be able to start a full-field scan even
    /// when nothing has ever overflowed into an indexed sub-block.
    fn root_for_intersect(&self, start_term: &[u8]) -> Result<Option<(Vec<u8>, BlockRoot)>> {
        if start_term.is_empty() {
            return match self.fst.get(&[]) {
                Some(bytes) => Ok(Some((Vec::new(), decode_block_root(bytes)?))),
                None => Ok(None),
            };
        }
        self.root_for(start_term)
    }

    fn walk_intersect<A: Automaton>(
        &mut self,
        prefix: Vec<u8>,
        root: BlockRoot,
        state: A::State,
        start_term: &[u8],
        automaton: &A,
        out: &mut Vec<IntersectedTerm>,
    ) -> Result<()> {
        let (mut floor_idx, mut fp) = if start_term.len() > prefix.len() && start_term.starts_with(prefix.as_slice()) {
            Self::pick_floor_start(&root, &start_term[prefix.len()..])
        } else {
            (0, root.fp)
        };

        loop {
            let (block, is_last_in_floor) = read_block(self.input, fp, self.docs_only)?;

            for entry in &block.entries {
                match entry {
                    BlockEntry::Term { suffix, doc_freq, total_term_freq, postings } => {
                        let mut full = prefix.to_vec();
                        full.extend_from_slice(suffix);
                        if full.as_slice() < start_term {
                            continue;
                        }
                        let mut s = state.clone();
                        let mut accepted = true;
                        for &b in suffix.iter() {
                            if !automaton.can_match(&s) {
                                accepted = false;
                                break;
                            }
                            s = automaton.accept(&s, b);
                        }
                        if accepted && automaton.is_match(&s) {
                            out.push(IntersectedTerm {
                                term: full,
                                doc_freq: *doc_freq,
                                total_term_freq: *total_term_freq,
                                postings: postings.clone(),
                            });
                        }
                    }
                    BlockEntry::SubBlock { suffix, fp: _child_fp } => {
                        let mut full = prefix.to_vec();
                        full.extend_from_slice(suffix);
                        if full.as_slice() < start_term && !start_term.starts_with(full.as_slice()) {
                            continue;
                        }
                        let mut s = state.clone();
                        let mut reachable = true;
                        for &b in suffix.iter() {
                            if !automaton.can_match(&s) {
                                reachable = false;
                                break;
                            }
                            s = automaton.accept(&s, b);
                        }
                        if reachable && automaton.can_match(&s) {
                            let child_root = self.root_at(&full)?;
                            self.walk_intersect(full, child_root, s, start_term, automaton, out)?;
                        }
                    }
                }
            }

            if is_last_in_floor {
                break;
            }
            floor_idx += 1;
            fp = root.floor[floor_idx - 1].fp;
        }

        Ok(())
    }
}

fn take_entries(block: Block) -> Vec<BlockEntry> {
    block.entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::v1::blocktree::writer::{BlockTreeWriter, PendingTerm};
    use crate::core::store::{Directory, IOContext, RAMDirectory};
    use crate::core::util::automaton::{AlwaysMatch, ExactAutomaton, PrefixAutomaton};

    fn term(s: &str) -> PendingTerm {
        PendingTerm {
            term: s.as_bytes().to_vec(),
            doc_freq: 1,
            total_term_freq: 1,
            postings: vec![0x2a],
        }
    }

    fn seek_round_trip(words: &[&str]) -> (RAMDirectory, Fst) {
        let dir = RAMDirectory::new();
        let mut out = dir.create_output("_0.tim", &IOContext::Default).unwrap();
        let writer = BlockTreeWriter::new(false);
        let terms: Vec<PendingTerm> = words.iter().map(|w| term(w)).collect();
        let meta = writer.write_field(out.as_mut(), &terms).unwrap();
        (dir, meta.fst)
    }

    #[test]
    fn intersect_with_always_match_yields_every_term_in_order() {
        let (dir, fst) = seek_round_trip(&["apple", "application", "apply", "banana"]);
        let reader = FieldReader::new(fst, false, 4, 4, 4);
        let mut input = dir.open_input("_0.tim", &IOContext::Default).unwrap();
        let mut out = reader.intersect(input.as_mut(), &AlwaysMatch, &[]).unwrap();

        let mut seen = Vec::new();
        while let Some(t) = out.next() {
            seen.push(String::from_utf8(t.term.clone()).unwrap());
        }
        assert_eq!(seen, vec!["apple", "application", "apply", "banana"]);
    }

    #[test]
    fn intersect_with_prefix_automaton_filters_to_matching_terms() {
        let (dir, fst) = seek_round_trip(&["apple", "application", "apply", "banana"]);
        let reader = FieldReader::new(fst, false, 4, 4, 4);
        let mut input = dir.open_input("_0.tim", &IOContext::Default).unwrap();
        let automaton = PrefixAutomaton::new(b"appl".to_vec());
        let mut out = reader.intersect(input.as_mut(), &automaton, &[]).unwrap();

        let mut seen = Vec::new();
        while let Some(t) = out.next() {
            seen.push(String::from_utf8(t.term.clone()).unwrap());
        }
        assert_eq!(seen, vec!["application", "apply"]);
    }

    #[test]
    fn intersect_with_exact_automaton_yields_one_term() {
        let (dir, fst) = seek_round_trip(&["apple", "application", "apply", "banana"]);
        let reader = FieldReader::new(fst, false, 4, 4, 4);
        let mut input = dir.open_input("_0.tim", &IOContext::Default).unwrap();
        let automaton = ExactAutomaton::new(b"apply".to_vec());
        let mut out = reader.intersect(input.as_mut(), &automaton, &[]).unwrap();

        assert_eq!(out.next().map(|t| t.term.clone()), Some(b"apply".to_vec()));
        assert_eq!(out.next().map(|t| t.term.clone()), None);
    }

    #[test]
    fn intersect_honors_start_term() {
        let (dir, fst) = seek_round_trip(&["apple", "application", "apply", "banana"]);
        let reader = FieldReader::new(fst, false, 4, 4, 4);
        let mut input = dir.open_input("_0.tim", &IOContext::Default).unwrap();
        let mut out = reader.intersect(input.as_mut(), &AlwaysMatch, b"apply").unwrap();

        let mut seen = Vec::new();
        while let Some(t) = out.next() {
            seen.push(String::from_utf8(t.term.clone()).unwrap());
        }
        assert_eq!(seen, vec!["apply", "banana"]);
    }

    #[test]
    fn intersect_over_a_floored_block_set_still_finds_every_match() {
        let dir = RAMDirectory::new();
        let mut out = dir.create_output("_0.tim", &IOContext::Default).unwrap();
        let writer = BlockTreeWriter::with_block_sizes(false, 2, 4);
        let words: Vec<String> = (0..257)
            .map(|i| format!("x{:03}", i))
            .collect();
        let terms: Vec<PendingTerm> = words.iter().map(|w| term(w)).collect();
        let meta = writer.write_field(out.as_mut(), &terms).unwrap();

        let reader = FieldReader::new(meta.fst, false, 257, 257, 257);
        let mut input = dir.open_input("_0.tim", &IOContext::Default).unwrap();
        let mut result = reader.intersect(input.as_mut(), &AlwaysMatch, &[]).unwrap();

        let mut count = 0;
        while result.next().is_some() {
            count += 1;
        }
        assert_eq!(count, 257);
    }
}
