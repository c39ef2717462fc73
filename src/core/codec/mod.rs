//! The `Codec` bundle: one concrete implementation per format seam (§2
//! component list), named so a reader can recover the right codec for a
//! segment written by an older binary (§9 Design Notes: "keep one
//! process-wide registry only for decoding legacy segment headers by
//! name" — everywhere else a `Codec` is passed explicitly as a
//! construction parameter, never looked up through ambient state).

pub mod codec_util;
pub mod format;
pub mod v1;

use std::collections::HashMap;
use std::sync::Arc;

use self::format::{CompoundFormat, FieldInfosFormat, LiveDocsFormat, PostingsFormat, SegmentInfoFormat};

/// Name under which the only codec this crate ships is registered (§9).
pub const LUCERNE_CODEC_NAME: &str = "Lucerne1";

/// One named bundle of formats. Segments record the name of the codec that
/// wrote them (`SegmentInfo::codec`); a reader resolves that name back to a
/// `Codec` value through `Codec::for_name` rather than assuming "whatever
/// codec this binary defaults to today".
pub struct Codec {
    name: String,
    postings_format: Arc<dyn PostingsFormat>,
    compound_format: Arc<dyn CompoundFormat>,
    field_infos_format: Arc<dyn FieldInfosFormat>,
    segment_info_format: Arc<dyn SegmentInfoFormat>,
    live_docs_format: Arc<dyn LiveDocsFormat>,
}

impl Codec {
    pub fn new(
        name: &str,
        postings_format: Arc<dyn PostingsFormat>,
        compound_format: Arc<dyn CompoundFormat>,
        field_infos_format: Arc<dyn FieldInfosFormat>,
        segment_info_format: Arc<dyn SegmentInfoFormat>,
        live_docs_format: Arc<dyn LiveDocsFormat>,
    ) -> Self {
        Codec {
            name: name.to_string(),
            postings_format,
            compound_format,
            field_infos_format,
            segment_info_format,
            live_docs_format,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn postings_format(&self) -> &Arc<dyn PostingsFormat> {
        &self.postings_format
    }

    pub fn compound_format(&self) -> &Arc<dyn CompoundFormat> {
        &self.compound_format
    }

    pub fn field_infos_format(&self) -> &Arc<dyn FieldInfosFormat> {
        &self.field_infos_format
    }

    pub fn segment_info_format(&self) -> &Arc<dyn SegmentInfoFormat> {
        &self.segment_info_format
    }

    pub fn live_docs_format(&self) -> &Arc<dyn LiveDocsFormat> {
        &self.live_docs_format
    }

    /// The codec a freshly-created writer uses.
    pub fn default_codec() -> Arc<Codec> {
        Codec::for_name(LUCERNE_CODEC_NAME).expect("default codec must be registered")
    }

    /// Resolves a codec previously recorded by name in a segment's `.si`
    /// file. Returns `None` for names this binary doesn't know how to read,
    /// which callers surface as a corrupt-index error rather than a panic.
    pub fn for_name(name: &str) -> Option<Arc<Codec>> {
        REGISTRY.get(name).cloned()
    }
}

lazy_static! {
    static ref REGISTRY: HashMap<String, Arc<Codec>> = {
        let mut m = HashMap::new();
        let codec = Arc::new(Codec::new(
            LUCERNE_CODEC_NAME,
            Arc::new(v1::BlockTreePostingsFormat),
            Arc::new(v1::CompoundFormatV1),
            Arc::new(v1::FieldInfosFormatV1),
            Arc::new(v1::SegmentInfoFormatV1),
            Arc::new(v1::LiveDocsFormatV1),
        ));
        m.insert(LUCERNE_CODEC_NAME.to_string(), codec);
        m
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_codec_resolves_by_name() {
        let codec = Codec::default_codec();
        assert_eq!(codec.name(), LUCERNE_CODEC_NAME);
        assert!(Codec::for_name(LUCERNE_CODEC_NAME).is_some());
        assert!(Codec::for_name("NoSuchCodec").is_none());
    }
}
