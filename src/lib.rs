//! Segment lifecycle core of a full-text inverted-index engine: the
//! in-memory indexing chain, the segment flusher, the block-tree terms
//! dictionary with its FST prefix index, the buffered-deletes stream, the
//! segments manifest (two-phase commit), and the compound-file container.
//!
//! Analysis/tokenization, scoring, query parsing, merge-policy heuristics,
//! stored fields, norms and term vectors are external collaborators; this
//! crate only consumes or exposes the interfaces it needs from them.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

pub mod error;
pub mod fst;

pub mod core {
    pub mod codec;
    pub mod index;
    pub mod store;
    pub mod util;
}

pub use crate::error::{Error, ErrorKind, Result};
