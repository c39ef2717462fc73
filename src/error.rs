//! Error taxonomy for the index core (see SPEC_FULL.md §7).
//!
//! Mirrors the teacher's separate `error` crate: one `Result<T>` alias and
//! an `ErrorKind` enum that callers match on to decide whether a failure is
//! fatal to a segment (`Corruption`), propagates as-is (`Io`), or indicates
//! caller/programmer misuse (`IllegalArgument`, `IllegalState`).

use std::io;

error_chain! {
    foreign_links {
        Io(io::Error);
        Utf8(::std::string::FromUtf8Error);
        ParseInt(::std::num::ParseIntError);
    }

    errors {
        /// Magic/version mismatch, checksum failure, or structural
        /// inconsistency (zero-entry block, non-monotone floor labels, ...).
        /// Fatal to the affected segment.
        CorruptIndex(desc: String) {
            description("corrupt index")
            display("corrupt index: {}", desc)
        }
        IllegalArgument(desc: String) {
            description("illegal argument")
            display("illegal argument: {}", desc)
        }
        IllegalState(desc: String) {
            description("illegal state")
            display("illegal state: {}", desc)
        }
        UnsupportedOperation(desc: String) {
            description("unsupported operation")
            display("unsupported operation: {}", desc)
        }
        AlreadyClosed(desc: String) {
            description("already closed")
            display("already closed: {}", desc)
        }
    }
}
