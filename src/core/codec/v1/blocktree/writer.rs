use std::collections::BTreeMap;

use crate::core::store::{DataOutput, IndexOutput};
use crate::error::Result;
use crate::fst::FstBuilder;

use super::{DEFAULT_MAX_ITEMS_PER_BLOCK, DEFAULT_MIN_ITEMS_PER_BLOCK};

/// One dictionary entry ready to be laid out by the block-tree writer:
/// a term, its stats, and its postings bytes (§4.3's per-term postings
/// stream, treated here as the opaque metadata blob §4.5.1 hands to the
/// terms dictionary).
#[derive(Debug, Clone)]
pub struct PendingTerm {
    pub term: Vec<u8>,
    pub doc_freq: i32,
    pub total_term_freq: i64,
    pub postings: Vec<u8>,
}

/// Output of writing one field's term stream: where the root block landed
/// and the prefix-indexed FST built over every block root.
pub struct FieldMeta {
    pub root_fp: i64,
    pub fst: crate::fst::Fst,
    pub doc_count: i32,
    pub sum_doc_freq: i64,
    pub sum_total_term_freq: i64,
}

pub struct BlockTreeWriter {
    min_items: usize,
    max_items: usize,
    docs_only: bool,
}

impl BlockTreeWriter {
    pub fn new(docs_only: bool) -> Self {
        BlockTreeWriter {
            min_items: DEFAULT_MIN_ITEMS_PER_BLOCK,
            max_items: DEFAULT_MAX_ITEMS_PER_BLOCK,
            docs_only,
        }
    }

    pub fn with_block_sizes(docs_only: bool, min_items: usize, max_items: usize) -> Self {
        assert!(min_items >= 2 && max_items >= min_items);
        BlockTreeWriter {
            min_items,
            max_items,
            docs_only,
        }
    }

    /// Writes every block for one field's (already sorted) term stream and
    /// returns the field's root pointer and prefix FST.
    pub fn write_field(&self, out: &mut dyn IndexOutput, terms: &[PendingTerm]) -> Result<FieldMeta> {
        let mut fst_entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut doc_count = 0i32;
        let mut sum_doc_freq = 0i64;
        let mut sum_total_term_freq = 0i64;
        for t in terms {
            doc_count = doc_count.max(t.doc_freq);
            sum_doc_freq += t.doc_freq as i64;
            sum_total_term_freq += t.total_term_freq;
        }

        let root = self.build_block(out, &[], terms, &mut fst_entries)?;

        fst_entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut builder = FstBuilder::new();
        for (prefix, output) in &fst_entries {
            builder.add(prefix, output.clone());
        }
        let fst = builder.finish();

        Ok(FieldMeta {
            root_fp: root,
            fst,
            doc_count,
            sum_doc_freq,
            sum_total_term_freq,
        })
    }

    /// Builds the block set for `entries` (all sharing `prefix`), writing
    /// bytes to `out` and recording `(prefix, fstOutput)` pairs for every
    /// block root created (including nested sub-blocks). Returns the file
    /// pointer of the first ("entry") chunk, which is what a parent block's
    /// sub-block pointer — or the field's root — refers to.
    fn build_block(
        &self,
        out: &mut dyn IndexOutput,
        prefix: &[u8],
        entries: &[PendingTerm],
        fst_entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<i64> {
        let chunks = if entries.len() <= self.max_items {
            vec![entries.iter().collect::<Vec<_>>()]
        } else {
            self.split_into_chunks(prefix.len(), entries)
        };

        let mut chunk_fps = Vec::with_capacity(chunks.len());
        let mut chunk_has_terms = Vec::with_capacity(chunks.len());
        let mut chunk_labels = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let label = chunk
                .first()
                .and_then(|t| t.term.get(prefix.len()).copied())
                .unwrap_or(0);
            let is_last_in_floor = i == chunks.len() - 1;
            let (fp, has_terms) =
                self.write_one_block(out, prefix, chunk, is_last_in_floor, fst_entries)?;
            chunk_fps.push(fp);
            chunk_has_terms.push(has_terms);
            chunk_labels.push(label);
        }

        let root_fp = chunk_fps[0];
        let is_floor = chunks.len() > 1;
        let has_terms_overall = chunk_has_terms.iter().any(|h| *h);

        let mut output = Vec::new();
        output.write_vlong(root_fp as i64).ok();
        output.push(if has_terms_overall { 1 } else { 0 });
        output.push(if is_floor { 1 } else { 0 });
        if is_floor {
            output.write_vint((chunks.len() - 1) as i32).ok();
            for i in 1..chunks.len() {
                output.push(chunk_labels[i]);
                let rel = root_fp - chunk_fps[i];
                output.write_vlong(rel.abs()).ok();
                output.push(if rel < 0 { 1 } else { 0 });
                output.push(if chunk_has_terms[i] { 1 } else { 0 });
            }
        }
        fst_entries.push((prefix.to_vec(), output));

        Ok(root_fp)
    }

    /// Greedily packs `entries` (already grouped contiguously by the byte at
    /// `depth`) into chunks of `[min_items, max_items]`, the last chunk
    /// possibly smaller (§4.5.1 blocking rule).
    fn split_into_chunks<'a>(&self, depth: usize, entries: &'a [PendingTerm]) -> Vec<Vec<&'a PendingTerm>> {
        let mut groups: BTreeMap<u8, Vec<&PendingTerm>> = BTreeMap::new();
        let mut exact: Vec<&PendingTerm> = Vec::new();
        for e in entries {
            if e.term.len() == depth {
                exact.push(e);
            } else {
                groups.entry(e.term[depth]).or_default().push(e);
            }
        }
        let ordered: Vec<(u8, Vec<&PendingTerm>)> = groups.into_iter().collect();

        let mut chunks: Vec<Vec<&PendingTerm>> = Vec::new();
        let mut current: Vec<&PendingTerm> = exact;
        for (_, group) in ordered {
            if !current.is_empty() && current.len() + group.len() > self.max_items {
                chunks.push(std::mem::take(&mut current));
            }
            current.extend(group);
            if current.len() >= self.max_items {
                chunks.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// Writes one physical block (entry or floor sub-block) for `prefix`.
    /// Any group inside `chunk` whose own count exceeds `max_items`
    /// recurses into a nested sub-block instead of inlining its terms.
    fn write_one_block(
        &self,
        out: &mut dyn IndexOutput,
        prefix: &[u8],
        chunk: &[&PendingTerm],
        is_last_in_floor: bool,
        fst_entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(i64, bool)> {
        enum Entry<'a> {
            Term(&'a PendingTerm),
            SubBlock { label: u8, suffix: Vec<u8>, child_fp: i64 },
        }

        let depth = prefix.len();
        let mut groups: BTreeMap<u8, Vec<&PendingTerm>> = BTreeMap::new();
        let mut block_entries: Vec<Entry> = Vec::new();
        let mut has_terms = false;
        for e in chunk {
            // a term exactly equal to `prefix` (no remaining bytes) can
            // never be split further — it terminates at this block
            // regardless of how the rest of the chunk groups.
            if e.term.len() == depth {
                has_terms = true;
                block_entries.push(Entry::Term(e));
            } else {
                groups.entry(e.term[depth]).or_default().push(e);
            }
        }

        for (label, group) in groups {
            if group.len() > self.max_items {
                let mut child_prefix = prefix.to_vec();
                child_prefix.push(label);
                let child_fp = self.build_block(
                    out,
                    &child_prefix,
                    &group.into_iter().cloned().collect::<Vec<_>>(),
                    fst_entries,
                )?;
                block_entries.push(Entry::SubBlock {
                    label,
                    suffix: vec![label],
                    child_fp,
                });
            } else {
                has_terms = true;
                for e in group {
                    block_entries.push(Entry::Term(e));
                }
            }
        }

        let is_leaf = block_entries.iter().all(|e| matches!(e, Entry::Term(_)));

        let mut suffix_buf = Vec::new();
        for e in &block_entries {
            match e {
                Entry::Term(t) => {
                    let suffix = &t.term[depth..];
                    if is_leaf {
                        suffix_buf.write_vint(suffix.len() as i32).ok();
                    } else {
                        suffix_buf.write_vint((suffix.len() as i32) << 1).ok();
                    }
                    suffix_buf.write_bytes(suffix).ok();
                }
                Entry::SubBlock { suffix, .. } => {
                    suffix_buf.write_vint(((suffix.len() as i32) << 1) | 1).ok();
                    suffix_buf.write_bytes(suffix).ok();
                }
            }
        }

        let block_fp = out.file_pointer();

        let mut stats_buf = Vec::new();
        for e in &block_entries {
            if let Entry::Term(t) = e {
                stats_buf.write_vint(t.doc_freq).ok();
                if !self.docs_only {
                    stats_buf
                        .write_vlong(t.total_term_freq - t.doc_freq as i64)
                        .ok();
                }
                stats_buf.write_vint(t.postings.len() as i32).ok();
                stats_buf.write_bytes(&t.postings).ok();
            }
        }

        // sub-block pointer deltas are written right after the suffix bytes
        // they belong to so a reader can resolve them while still in the
        // suffix-scan loop; collected here into one trailing section keeps
        // block writing single-pass.
        let mut pointer_buf = Vec::new();
        for e in &block_entries {
            if let Entry::SubBlock { child_fp, .. } = e {
                pointer_buf.write_vlong(block_fp - child_fp).ok();
            }
        }

        let ent_count = block_entries.len() as i32;
        out.write_vint((ent_count << 1) | (is_last_in_floor as i32))?;
        out.write_vint(((suffix_buf.len() as i32) << 1) | (is_leaf as i32))?;
        out.write_bytes(&suffix_buf)?;
        out.write_vint(pointer_buf.len() as i32)?;
        out.write_bytes(&pointer_buf)?;
        out.write_vint(stats_buf.len() as i32)?;
        out.write_bytes(&stats_buf)?;

        Ok((block_fp, has_terms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{IOContext, RAMDirectory};
    use crate::core::store::Directory;

    fn term(s: &str) -> PendingTerm {
        PendingTerm {
            term: s.as_bytes().to_vec(),
            doc_freq: 1,
            total_term_freq: 1,
            postings: vec![0x2a],
        }
    }

    #[test]
    fn single_leaf_block_for_small_field() {
        let dir = RAMDirectory::new();
        let mut out = dir.create_output("_0.tim", &IOContext::Default).unwrap();
        let writer = BlockTreeWriter::new(false);
        let terms = vec![term("apple"), term("banana"), term("cherry")];
        let meta = writer.write_field(out.as_mut(), &terms).unwrap();
        assert_eq!(meta.sum_doc_freq, 3);
        assert!(!meta.fst.is_empty());
        assert!(meta.fst.get(b"").is_some());
    }

    #[test]
    fn boundary_floor_blocking() {
        let dir = RAMDirectory::new();
        let mut out = dir.create_output("_0.tim", &IOContext::Default).unwrap();
        let writer = BlockTreeWriter::with_block_sizes(false, 2, 4);
        let terms = vec![term("xa"), term("xb"), term("xc"), term("xd"), term("xe")];
        let meta = writer.write_field(out.as_mut(), &terms).unwrap();
        // root prefix "" must floor-split since 5 > max(4); "x" becomes a
        // nested group requiring its own block set.
        assert!(meta.fst.get(b"").is_some());
    }
}
