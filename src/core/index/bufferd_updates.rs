//! Per-segment pending deletes (§3 "Frozen delete packet", §4.6 "Buffered
//! deletes stream"). `BufferedUpdates` is the mutable accumulator a
//! `DocumentsWriterPerThread` fills in as documents are deleted by term,
//! query or docID; `FrozenBufferUpdates` is the immutable, generation
//! stamped snapshot the deletes stream actually stores and applies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::core::codec::format::FieldsProducer;
use crate::core::index::Term;
use crate::core::util::{Counter, DocId};
use crate::error::Result;

/// Conservative fixed per-entry RAM estimate, in the teacher's style of
/// accounting bytes without walking the actual heap layout (§4.3).
pub const BYTES_PER_DEL_TERM: i64 = 9 * 8 + 24;
pub const BYTES_PER_DEL_QUERY: i64 = 5 * 8;
pub const BYTES_PER_DEL_DOCID: i64 = 4 + 8;

/// External-collaborator seam (§1: scoring/query-evaluation is out of
/// scope): a delete-by-query only needs to resolve to the doc IDs it
/// matches within one already-open segment's postings. Query parsing and
/// matching logic itself lives outside this crate.
pub trait DeleteQuery: Send + Sync {
    fn matching_docs(&self, fields: &dyn FieldsProducer, max_doc: DocId) -> Result<Vec<DocId>>;
}

/// A delete-by-query paired with the docID count the issuing thread had
/// written at the time of the call: docs added after that point within the
/// segment the query was issued against must not be deleted by it.
#[derive(Clone)]
pub struct QueryAndLimit {
    pub query: Arc<dyn DeleteQuery>,
    pub doc_id_upto: DocId,
}

/// Mutable pending-deletes accumulator. One lives inside each
/// `DocumentsWriterPerThread`, holding deletes against the segment
/// currently being built; `DocumentsWriterDeleteQueue` holds a second one
/// as its global buffer.
pub struct BufferedUpdates {
    /// Delete term -> doc-count-at-time-of-delete. Only docs added to the
    /// owning segment before that count are affected (§4.6).
    pub deleted_terms: HashMap<Term, DocId>,
    pub deleted_queries: Vec<QueryAndLimit>,
    pub deleted_doc_ids: Vec<DocId>,
    pub bytes_used: Counter,
    pub num_term_deletes: i64,
}

impl BufferedUpdates {
    pub fn new() -> Self {
        BufferedUpdates {
            deleted_terms: HashMap::new(),
            deleted_queries: Vec::new(),
            deleted_doc_ids: Vec::new(),
            bytes_used: Counter::new(false),
            num_term_deletes: 0,
        }
    }

    pub fn add_term(&mut self, term: Term, doc_id_upto: DocId) {
        if let Some(existing) = self.deleted_terms.get(&term) {
            if *existing >= doc_id_upto {
                return;
            }
        } else {
            self.bytes_used.add_get(BYTES_PER_DEL_TERM + term.bytes.len() as i64);
        }
        self.deleted_terms.insert(term, doc_id_upto);
        self.num_term_deletes += 1;
    }

    pub fn add_query(&mut self, query: Arc<dyn DeleteQuery>, doc_id_upto: DocId) {
        self.deleted_queries.push(QueryAndLimit { query, doc_id_upto });
        self.bytes_used.add_get(BYTES_PER_DEL_QUERY);
    }

    pub fn add_doc_id(&mut self, doc_id: DocId) {
        self.deleted_doc_ids.push(doc_id);
        self.bytes_used.add_get(BYTES_PER_DEL_DOCID);
    }

    pub fn any(&self) -> bool {
        !self.deleted_terms.is_empty() || !self.deleted_queries.is_empty() || !self.deleted_doc_ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.deleted_terms.clear();
        self.deleted_queries.clear();
        self.deleted_doc_ids.clear();
        self.num_term_deletes = 0;
        self.bytes_used.add_get(-self.bytes_used.get());
    }
}

impl Default for BufferedUpdates {
    fn default() -> Self {
        BufferedUpdates::new()
    }
}

/// Immutable, generation-stamped snapshot of a `BufferedUpdates` (§3
/// "Frozen delete packet"). Terms are sorted field-major then term-major
/// (`Term`'s own `Ord`) so the deletes stream can walk a segment's terms
/// dictionary and the packet's terms in lockstep (§4.6).
pub struct FrozenBufferUpdates {
    pub terms: Vec<(Term, DocId)>,
    pub queries: Vec<QueryAndLimit>,
    pub bytes_used: i64,
    pub num_term_deletes: i64,
    /// True when this packet arose from a single segment's own flush and
    /// should have its term-deletes skipped at apply time (§4.6: "term
    /// deletes for a segment's own packet were already applied in-RAM by
    /// the producing thread").
    pub is_segment_private: bool,
    gen: AtomicI64,
}

impl FrozenBufferUpdates {
    pub fn new(updates: &BufferedUpdates, is_segment_private: bool) -> Self {
        let mut terms: Vec<(Term, DocId)> = updates
            .deleted_terms
            .iter()
            .map(|(t, &upto)| (t.clone(), upto))
            .collect();
        terms.sort_by(|a, b| a.0.cmp(&b.0));

        FrozenBufferUpdates {
            terms,
            queries: updates.deleted_queries.clone(),
            bytes_used: updates.bytes_used.get(),
            num_term_deletes: updates.num_term_deletes,
            is_segment_private,
            gen: AtomicI64::new(-1),
        }
    }

    pub fn any(&self) -> bool {
        !self.terms.is_empty() || !self.queries.is_empty()
    }

    pub fn set_del_gen(&self, gen: i64) {
        self.gen.store(gen, AtomicOrdering::Release);
    }

    pub fn del_gen(&self) -> i64 {
        self.gen.load(AtomicOrdering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(field: &str, text: &str) -> Term {
        Term::new(field.to_string(), text.as_bytes().to_vec())
    }

    #[test]
    fn add_term_keeps_the_larger_doc_id_upto() {
        let mut updates = BufferedUpdates::new();
        updates.add_term(term("f", "a"), 5);
        updates.add_term(term("f", "a"), 3);
        assert_eq!(*updates.deleted_terms.get(&term("f", "a")).unwrap(), 5);
        assert_eq!(updates.num_term_deletes, 2);
    }

    #[test]
    fn freeze_sorts_terms_field_major_then_term_major() {
        let mut updates = BufferedUpdates::new();
        updates.add_term(term("title", "zeta"), 1);
        updates.add_term(term("body", "alpha"), 1);
        updates.add_term(term("title", "alpha"), 1);

        let frozen = FrozenBufferUpdates::new(&updates, false);
        let fields: Vec<&str> = frozen.terms.iter().map(|(t, _)| t.field.as_str()).collect();
        assert_eq!(fields, vec!["body", "title", "title"]);
        assert_eq!(frozen.terms[1].0.bytes, b"alpha");
        assert_eq!(frozen.terms[2].0.bytes, b"zeta");
    }

    #[test]
    fn clear_resets_bytes_used_to_zero() {
        let mut updates = BufferedUpdates::new();
        updates.add_term(term("f", "a"), 1);
        assert!(updates.bytes_used.get() > 0);
        updates.clear();
        assert_eq!(updates.bytes_used.get(), 0);
        assert!(!updates.any());
    }
}
