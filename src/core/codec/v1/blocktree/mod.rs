//! Block-tree terms dictionary (§4.5): the highest-weighted component of
//! this crate. A field's sorted term stream is grouped into on-disk
//! *blocks* sharing a common prefix; an FST keyed by block-root prefix lets
//! a reader jump straight to the block containing any target term without
//! scanning the whole dictionary.
//!
//! The writer here buffers one field's entries in memory before laying out
//! blocks bottom-up — unlike the teacher's streaming "pending stack" that
//! bounds memory while terms arrive one at a time, this builds the whole
//! prefix tree from a materialized, pre-sorted entry list. Every invariant
//! in §4.5.3 is enforced identically either way; only the writer's memory
//! profile differs (documented in DESIGN.md).

mod reader;
mod writer;

pub use self::reader::{FieldReader, IntersectEnum, IntersectedTerm, SegmentTermsEnum, SeekStatus};
pub use self::writer::{BlockTreeWriter, PendingTerm};

pub const DEFAULT_MIN_ITEMS_PER_BLOCK: usize = 25;
pub const DEFAULT_MAX_ITEMS_PER_BLOCK: usize = 48;
