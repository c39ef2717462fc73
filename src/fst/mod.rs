//! Byte-sequence-output finite-state transducer used by the block-tree
//! terms dictionary's prefix index (§4.5.1 "FST over block-leading terms,
//! output = floor-data bytes").
//!
//! The crates.io `fst` crate only supports `u64` outputs, which cannot hold
//! the variable-length floor-data blob each index entry needs, so this is a
//! small purpose-built transducer: a trie (not minimized into a true
//! minimal automaton) over the indexed term prefixes, with each accepting
//! node carrying an output byte string. Non-minimization is a deliberate
//! simplification — §4.5.3 and §8 only require deterministic, exact
//! prefix-set membership and the correct associated output, which a trie
//! satisfies identically to a minimal DFA; it costs more memory than true
//! Lucene FSTs but none of the stated invariants depend on minimality.

use std::collections::BTreeMap;

use crate::core::store::{DataInput, DataOutput};
use crate::error::Result;

#[derive(Debug, Default, Clone)]
struct Node {
    children: BTreeMap<u8, usize>,
    output: Option<Vec<u8>>,
}

/// Builds an `Fst` from (byte-string, output) pairs. Keys must be inserted
/// in ascending order, matching the block-tree writer's bottom-up emission
/// of floor blocks in term-sort order.
pub struct FstBuilder {
    nodes: Vec<Node>,
    last_key: Vec<u8>,
    started: bool,
}

impl FstBuilder {
    pub fn new() -> Self {
        FstBuilder {
            nodes: vec![Node::default()],
            last_key: Vec::new(),
            started: false,
        }
    }

    /// Adds one entry. `key` must be strictly greater than the previously
    /// added key.
    pub fn add(&mut self, key: &[u8], output: Vec<u8>) {
        if self.started {
            assert!(
                key > self.last_key.as_slice(),
                "fst keys must be added in strictly ascending order"
            );
        }
        self.started = true;
        self.last_key = key.to_vec();

        let mut node = 0usize;
        for &b in key {
            node = match self.nodes[node].children.get(&b) {
                Some(&next) => next,
                None => {
                    self.nodes.push(Node::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[node].children.insert(b, next);
                    next
                }
            };
        }
        self.nodes[node].output = Some(output);
    }

    pub fn finish(self) -> Fst {
        Fst { nodes: self.nodes }
    }
}

/// A frozen, read-only FST arena. Cheap to share (`Arc<Fst>`) across readers
/// of the same segment.
#[derive(Debug, Clone)]
pub struct Fst {
    nodes: Vec<Node>,
}

impl Fst {
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn cursor(&self) -> FstCursor {
        FstCursor {
            fst: self,
            node: 0,
        }
    }

    /// Convenience exact lookup; equivalent to driving a cursor byte by
    /// byte and checking `output()` at the end.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let mut cursor = self.cursor();
        for &b in key {
            cursor.accept(b)?;
        }
        cursor.output()
    }

    /// Serializes the whole trie to the `.tip` terms-index file (§4.5.1):
    /// node count, then each node's child-edge table and optional output.
    pub fn write_to(&self, out: &mut dyn crate::core::store::IndexOutput) -> Result<()> {
        out.write_vint(self.nodes.len() as i32)?;
        for node in &self.nodes {
            out.write_vint(node.children.len() as i32)?;
            for (&label, &child) in &node.children {
                out.write_byte(label)?;
                out.write_vint(child as i32)?;
            }
            match &node.output {
                Some(bytes) => {
                    out.write_vint((bytes.len() as i32) + 1)?;
                    out.write_bytes(bytes)?;
                }
                None => out.write_vint(0)?,
            }
        }
        Ok(())
    }

    /// Reads back an `Fst` written by `write_to`.
    pub fn read_from(input: &mut dyn crate::core::store::IndexInput) -> Result<Fst> {
        let node_count = input.read_vint()? as usize;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let edge_count = input.read_vint()?;
            let mut children = BTreeMap::new();
            for _ in 0..edge_count {
                let label = input.read_byte()?;
                let child = input.read_vint()? as usize;
                children.insert(label, child);
            }
            let output_marker = input.read_vint()?;
            let output = if output_marker == 0 {
                None
            } else {
                Some(input.read_bytes((output_marker - 1) as usize)?)
            };
            nodes.push(Node { children, output });
        }
        Ok(Fst { nodes })
    }
}

/// A single walk over an `Fst`, advanced one byte at a time. Reused by
/// `SegmentTermsEnum::seek_ceil`/`seek_exact` to avoid allocating per seek
/// (§9 "Iterator/cursor reuse").
pub struct FstCursor<'a> {
    fst: &'a Fst,
    node: usize,
}

impl<'a> FstCursor<'a> {
    /// Follows the edge labeled `b`; returns `None` (cursor left
    /// unchanged) if no such edge exists.
    pub fn accept(&mut self, b: u8) -> Option<()> {
        let next = *self.fst.nodes[self.node].children.get(&b)?;
        self.node = next;
        Some(())
    }

    pub fn output(&self) -> Option<&'a [u8]> {
        self.fst.nodes[self.node].output.as_deref()
    }

    pub fn reset(&mut self) {
        self.node = 0;
    }

    /// Returns the floor-data output of the greatest indexed key less than
    /// or equal to `key`, walking byte by byte and remembering the last
    /// accepting node seen along the way (block-tree `seek_ceil` uses the
    /// symmetric search; this supports seeking to the containing block).
    pub fn floor(fst: &'a Fst, key: &[u8]) -> Option<(usize, &'a [u8])> {
        let mut node = 0usize;
        let mut best: Option<(usize, &[u8])> = None;
        for (i, &b) in key.iter().enumerate() {
            if let Some(out) = fst.nodes[node].output.as_deref() {
                best = Some((i, out));
            }
            match fst.nodes[node].children.get(&b) {
                Some(&next) => node = next,
                None => return best,
            }
        }
        if let Some(out) = fst.nodes[node].output.as_deref() {
            best = Some((key.len(), out));
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lookup() {
        let mut b = FstBuilder::new();
        b.add(b"apple", vec![1]);
        b.add(b"banana", vec![2]);
        b.add(b"cherry", vec![3]);
        let fst = b.finish();
        assert_eq!(fst.get(b"apple"), Some(&[1][..]));
        assert_eq!(fst.get(b"banana"), Some(&[2][..]));
        assert_eq!(fst.get(b"durian"), None);
    }

    #[test]
    fn shared_prefixes_share_nodes() {
        let mut b = FstBuilder::new();
        b.add(b"app", vec![1]);
        b.add(b"apple", vec![2]);
        b.add(b"application", vec![3]);
        let fst = b.finish();
        assert_eq!(fst.get(b"app"), Some(&[1][..]));
        assert_eq!(fst.get(b"apple"), Some(&[2][..]));
        assert_eq!(fst.get(b"appl"), None);
    }

    #[test]
    fn floor_returns_longest_indexed_prefix() {
        let mut b = FstBuilder::new();
        b.add(b"ab", vec![9]);
        b.add(b"abc", vec![10]);
        let fst = b.finish();
        let (len, out) = FstCursor::floor(&fst, b"abcd").unwrap();
        assert_eq!(len, 3);
        assert_eq!(out, &[10][..]);
    }

    #[test]
    #[should_panic]
    fn rejects_out_of_order_insertion() {
        let mut b = FstBuilder::new();
        b.add(b"banana", vec![1]);
        b.add(b"apple", vec![2]);
    }

    #[test]
    fn serialization_roundtrip() {
        use crate::core::store::{Directory, IOContext, RAMDirectory};

        let mut b = FstBuilder::new();
        b.add(b"apple", vec![1, 2]);
        b.add(b"application", vec![3]);
        b.add(b"banana", vec![]);
        let fst = b.finish();

        let dir = RAMDirectory::new();
        {
            let mut out = dir.create_output("_0.tip", &IOContext::Default).unwrap();
            fst.write_to(out.as_mut()).unwrap();
        }
        let mut input = dir.open_input("_0.tip", &IOContext::Default).unwrap();
        let read_back = Fst::read_from(input.as_mut()).unwrap();

        assert_eq!(read_back.get(b"apple"), Some(&[1, 2][..]));
        assert_eq!(read_back.get(b"application"), Some(&[3][..]));
        assert_eq!(read_back.get(b"banana"), Some(&[][..]));
        assert_eq!(read_back.get(b"durian"), None);
    }
}
