//! Thin per-field dispatcher (§4.3): owns one `TermsHashPerField` per
//! indexed field, routing each token to the right one and fanning
//! `finish_document` out to every field touched by the current document.

use std::collections::HashMap;

use crate::core::index::field_info::IndexOptions;
use crate::core::index::terms_hash_per_field::{FlushedTerm, TermsHashPerField, TokenOccurrence};
use crate::core::util::{Counter, DocId};
use crate::error::Result;

pub struct TermsHash {
    bytes_used: Counter,
    fields: HashMap<String, TermsHashPerField>,
}

impl TermsHash {
    pub fn new(bytes_used: Counter) -> Self {
        TermsHash {
            bytes_used,
            fields: HashMap::new(),
        }
    }

    fn field_mut(&mut self, field_name: &str, index_options: IndexOptions, store_payloads: bool) -> &mut TermsHashPerField {
        self.fields.entry(field_name.to_string()).or_insert_with(|| {
            TermsHashPerField::new(
                field_name.to_string(),
                index_options,
                store_payloads,
                self.bytes_used.shallow_copy(),
            )
        })
    }

    pub fn add_token(
        &mut self,
        doc_id: DocId,
        field_name: &str,
        index_options: IndexOptions,
        store_payloads: bool,
        key: &[u8],
        occ: &TokenOccurrence,
    ) -> Result<()> {
        self.field_mut(field_name, index_options, store_payloads)
            .add_token(doc_id, key, occ)
    }

    /// Finalizes every field touched by `doc_id`. Since a field only ever
    /// sees occurrences belonging to the document currently being indexed,
    /// finishing is simply fanned out to all known fields (each one is a
    /// no-op for fields the document didn't touch, since their
    /// `touched_this_doc` list is empty).
    pub fn finish_document(&mut self, doc_id: DocId) {
        for field in self.fields.values_mut() {
            field.finish_document(doc_id);
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|f| f.num_terms() == 0)
    }

    /// Replays and clears one field's postings, ready to hand to the
    /// terms-dictionary writer (§4.5.1). Terms are returned sorted by term
    /// bytes, the order `BlockTreeWriter::write_field` requires.
    pub fn flush_field(&self, field_name: &str) -> Vec<FlushedTerm> {
        let mut terms = match self.fields.get(field_name) {
            Some(f) => f.flush_terms(),
            None => Vec::new(),
        };
        terms.sort_by(|a, b| a.term.cmp(&b.term));
        terms
    }

    pub fn bytes_used(&self) -> i64 {
        self.bytes_used.get()
    }
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
    fn routes_tokens_to_their_own_field() {
        let mut hash = TermsHash::new(Counter::new(false));
        hash.add_token(0, "title", IndexOptions::DocsAndFreqs, false, b"cat", &occ(1))
            .unwrap();
        hash.add_token(0, "body", IndexOptions::DocsAndFreqs, false, b"dog", &occ(1))
            .unwrap();
        hash.finish_document(0);

        let title_terms = hash.flush_field("title");
        let body_terms = hash.flush_field("body");
        assert_eq!(title_terms.len(), 1);
        assert_eq!(title_terms[0].term, b"cat");
        assert_eq!(body_terms.len(), 1);
        assert_eq!(body_terms[0].term, b"dog");
    }

    #[test]
    fn flush_field_sorts_by_term_bytes() {
        let mut hash = TermsHash::new(Counter::new(false));
        for (doc, term) in [(0, "zebra"), (1, "apple"), (2, "mango")] {
            hash.add_token(doc, "body", IndexOptions::Docs, false, term.as_bytes(), &occ(1))
                .unwrap();
            hash.finish_document(doc);
        }
        let terms = hash.flush_field("body");
        let names: Vec<_> = terms.iter().map(|t| t.term.clone()).collect();
        assert_eq!(names, vec![b"apple".to_vec(), b"mango".to_vec(), b"zebra".to_vec()]);
    }
}
