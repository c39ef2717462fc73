//! The deterministic-automaton seam `FieldReader::intersect` (§4.5.2) walks
//! while enumerating a field's terms. Grounded on the `fst`/`tantivy_fst`
//! crate's `Automaton` trait — the same shape the wider retrieval pack uses
//! at this exact seam (`LevenshteinDfaWrapper` in the convex-backend example
//! implements `tantivy::fst::automaton::Automaton`; the clicktsdb example
//! drives a field's term dictionary with `fst::automaton::{AlwaysMatch, Str,
//! Levenshtein}`). The teacher has no terms-dictionary automaton seam of its
//! own to port, so this is adapted from those examples rather than `rucene`.

/// A deterministic automaton over byte strings. `State` is whatever the
/// implementation needs to remember between transitions; `intersect` clones
/// it once per block-tree entry it descends into, so it should stay cheap.
pub trait Automaton {
    type State: Clone;

    /// The state before any bytes have been read.
    fn start(&self) -> Self::State;

    /// Whether `state` is an accepting state (a complete match).
    fn is_match(&self, state: &Self::State) -> bool;

    /// Whether any continuation from `state` could still reach a match.
    /// Returning `false` lets `intersect` prune a whole sub-block without
    /// descending into it. The default admits every state.
    fn can_match(&self, _state: &Self::State) -> bool {
        true
    }

    /// The state reached by reading one more byte.
    fn accept(&self, state: &Self::State, byte: u8) -> Self::State;
}

/// Matches every byte string. `intersect(AlwaysMatch, start_term)` degenerates
/// into plain forward iteration from `start_term`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysMatch;

impl Automaton for AlwaysMatch {
    type State = ();

    fn start(&self) {}

    fn is_match(&self, _state: &()) -> bool {
        true
    }

    fn accept(&self, _state: &(), _byte: u8) {}
}

/// Matches exactly one literal term.
#[derive(Debug, Clone)]
pub struct ExactAutomaton {
    term: Vec<u8>,
}

impl ExactAutomaton {
    pub fn new(term: impl Into<Vec<u8>>) -> Self {
        ExactAutomaton { term: term.into() }
    }
}

impl Automaton for ExactAutomaton {
    // how many bytes of `term` have matched so far, or `None` once a byte
    // has diverged (a dead state).
    type State = Option<usize>;

    fn start(&self) -> Self::State {
        Some(0)
    }

    fn is_match(&self, state: &Self::State) -> bool {
        *state == Some(self.term.len())
    }

    fn can_match(&self, state: &Self::State) -> bool {
        state.is_some()
    }

    fn accept(&self, state: &Self::State, byte: u8) -> Self::State {
        match state {
            Some(matched) if *matched < self.term.len() && self.term[*matched] == byte => {
                Some(matched + 1)
            }
            _ => None,
        }
    }
}

/// Matches any term that starts with a fixed prefix.
#[derive(Debug, Clone)]
pub struct PrefixAutomaton {
    prefix: Vec<u8>,
}

impl PrefixAutomaton {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        PrefixAutomaton { prefix: prefix.into() }
    }
}

impl Automaton for PrefixAutomaton {
    // how many bytes of `prefix` have matched so far; once it reaches
    // `prefix.len()` every further byte keeps the state pinned there (a
    // `usize::MAX` sentinel marks the dead state).
    type State = usize;

    fn start(&self) -> Self::State {
        0
    }

    fn is_match(&self, state: &Self::State) -> bool {
        *state == self.prefix.len()
    }

    fn can_match(&self, state: &Self::State) -> bool {
        *state != usize::MAX
    }

    fn accept(&self, state: &Self::State, byte: u8) -> Self::State {
        if *state == self.prefix.len() {
            self.prefix.len()
        } else if self.prefix[*state] == byte {
            state + 1
        } else {
            usize::MAX
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_match_accepts_everything() {
        let a = AlwaysMatch;
        let s = a.start();
        assert!(a.is_match(&s));
        assert!(a.can_match(&s));
    }

    #[test]
    fn exact_automaton_matches_only_its_term() {
        let a = ExactAutomaton::new(b"apple".to_vec());
        let mut s = a.start();
        for &b in b"apple" {
            assert!(a.can_match(&s));
            s = a.accept(&s, b);
        }
        assert!(a.is_match(&s));

        let mut s2 = a.start();
        for &b in b"applz" {
            s2 = a.accept(&s2, b);
        }
        assert!(!a.is_match(&s2));
    }

    #[test]
    fn prefix_automaton_matches_extensions() {
        let a = PrefixAutomaton::new(b"app".to_vec());
        let mut s = a.start();
        for &b in b"application" {
            s = a.accept(&s, b);
        }
        assert!(a.is_match(&s));

        let mut dead = a.start();
        for &b in b"banana" {
            dead = a.accept(&dead, b);
        }
        assert!(!a.can_match(&dead));
    }
}
