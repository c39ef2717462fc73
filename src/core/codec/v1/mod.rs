//! Version-1 concrete codec: one implementation per format seam in
//! `core::codec::format`, bundled into the single `Codec` value this crate
//! currently ships (§9 "keep one process-wide registry only for decoding
//! legacy segment headers by name" — here that registry has exactly one
//! entry, `LUCERNE_CODEC_NAME`).

pub mod blocktree;
pub mod blocktree_format;
pub mod compound;
pub mod field_infos_format;
pub mod live_docs_format;
pub mod segment_info_format;

pub use self::blocktree_format::BlockTreePostingsFormat;
pub use self::compound::CompoundFormatV1;
pub use self::field_infos_format::FieldInfosFormatV1;
pub use self::live_docs_format::LiveDocsFormatV1;
pub use self::segment_info_format::SegmentInfoFormatV1;
