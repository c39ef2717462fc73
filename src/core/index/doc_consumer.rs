//! Default indexing chain (§4.4): turns the per-document tokens already
//! accumulated in a `TermsHash` into the sorted per-field term lists a
//! `FieldsConsumer` writes to disk at flush time.

use crate::core::index::field_info::{FieldInfos, IndexOptions};
use crate::core::index::terms_hash::TermsHash;
use crate::core::index::terms_hash_per_field::{FlushedTerm, TokenOccurrence};
use crate::core::util::{Counter, DocId};
use crate::error::Result;

/// One field's complete, sorted term stream, ready for
/// `FieldsConsumer::write` (§4.4 step 3).
pub struct FlushedField {
    pub field_name: String,
    pub index_options: IndexOptions,
    pub terms: Vec<FlushedTerm>,
}

/// Every field touched in this segment that has at least one term, in
/// ascending field-number order — the iteration order `BlockTreeWriter`
/// expects (§4.5.1).
pub type FlushedFields = Vec<FlushedField>;

/// Seam between document indexing and the codec's write side. A real
/// deployment could swap this for a chain that also feeds stored fields or
/// doc values; only the inverted-index path is implemented here (§1).
pub trait DocConsumer {
    #[allow(clippy::too_many_arguments)]
    fn add_token(
        &mut self,
        doc_id: DocId,
        field_name: &str,
        index_options: IndexOptions,
        store_payloads: bool,
        key: &[u8],
        occ: &TokenOccurrence,
    ) -> Result<()>;

    fn finish_document(&mut self, doc_id: DocId);

    fn flush(&self, field_infos: &FieldInfos) -> FlushedFields;

    fn bytes_used(&self) -> i64;
}

pub struct DefaultIndexingChain {
    terms_hash: TermsHash,
}

impl DefaultIndexingChain {
    pub fn new(bytes_used: Counter) -> Self {
        DefaultIndexingChain {
            terms_hash: TermsHash::new(bytes_used),
        }
    }
}

impl DocConsumer for DefaultIndexingChain {
    fn add_token(
        &mut self,
        doc_id: DocId,
        field_name: &str,
        index_options: IndexOptions,
        store_payloads: bool,
        key: &[u8],
        occ: &TokenOccurrence,
    ) -> Result<()> {
        self.terms_hash
            .add_token(doc_id, field_name, index_options, store_payloads, key, occ)
    }

    fn finish_document(&mut self, doc_id: DocId) {
        self.terms_hash.finish_document(doc_id);
    }

    fn flush(&self, field_infos: &FieldInfos) -> FlushedFields {
        field_infos
            .sorted_field_names()
            .into_iter()
            .filter_map(|name| {
                let fi = field_infos.field_info_by_name(&name)?;
                if !fi.is_indexed() {
                    return None;
                }
                let terms = self.terms_hash.flush_field(&name);
                if terms.is_empty() {
                    return None;
                }
                Some(FlushedField {
                    field_name: name,
                    index_options: fi.index_options,
                    terms,
                })
            })
            .collect()
    }

    fn bytes_used(&self) -> i64 {
        self.terms_hash.bytes_used()
    }
}
