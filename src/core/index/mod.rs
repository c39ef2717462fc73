//! Segment-level data model: naming conventions, per-segment metadata
//! (`SegmentInfo`/`SegmentCommitInfo`), and the read/write state handed to
//! codec formats while flushing or opening a segment (§3, §4.2).

pub mod field_info;
pub mod terms_hash;
pub mod terms_hash_per_field;
pub mod doc_consumer;
pub mod bufferd_updates;
pub mod doc_writer_delete_queue;
pub mod buffered_updates_stream;
pub mod segment_flusher;
pub mod segment_infos;
pub mod writer_config;

pub use self::field_info::{FieldInfo, FieldInfos, FieldNumbers};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::result;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;

use regex::Regex;

use crate::core::codec::Codec;
use crate::core::index::bufferd_updates::BufferedUpdates;
use crate::core::store::{DirectoryRc, IOContext};
use crate::core::util::bit_set::FixedBitSet;
use crate::core::util::string_util::ID_LENGTH;
use crate::core::util::{to_base36, Bits, Version};
use crate::error::{ErrorKind, Result};

pub const INDEX_FILE_SEGMENTS: &str = "segments";
pub const INDEX_FILE_PENDING_SEGMENTS: &str = "pending_segments";
pub const INDEX_FILE_OLD_SEGMENT_GEN: &str = "segments.gen";

const CODEC_FILE_PATTERN: &str = r"_[a-zA-Z0-9]+(_.*)?\..*";

pub fn matches_extension(filename: &str, ext: &str) -> bool {
    filename.ends_with(ext)
}

fn index_of_segment_name(filename: &str) -> Option<usize> {
    // if it's a .del-style file there's an '_' right after the first char
    let filename = &filename[1..];
    if let Some(i) = filename.find('_') {
        return Some(i + 1);
    }
    filename.find('.').map(|i| i + 1)
}

pub fn strip_segment_name(name: &str) -> &str {
    if let Some(idx) = index_of_segment_name(name) {
        &name[idx..]
    } else {
        name
    }
}

pub fn segment_file_name(name: &str, suffix: &str, ext: &str) -> String {
    if !ext.is_empty() || !suffix.is_empty() {
        assert!(!ext.starts_with('.'));
        let mut filename = String::with_capacity(name.len() + 2 + suffix.len() + ext.len());
        filename.push_str(name);
        if !suffix.is_empty() {
            filename.push('_');
            filename.push_str(suffix);
        }
        if !ext.is_empty() {
            filename.push('.');
            filename.push_str(ext);
        }
        filename
    } else {
        String::from(name)
    }
}

pub fn file_name_from_generation(base: &str, ext: &str, gen: u64) -> String {
    if gen == 0 {
        segment_file_name(base, "", ext)
    } else {
        let mut res = String::new();
        res.push_str(base);
        res.push('_');
        res += &to_base36(gen);
        if !ext.is_empty() {
            res.push('.');
            res.push_str(ext);
        }
        res
    }
}

/// Returns the generation encoded in a file name, or 0 if there is none.
pub fn parse_generation(filename: &str) -> Result<i64> {
    debug_assert!(filename.starts_with('_'));
    let parts: Vec<&str> = strip_extension(filename)[1..].split('_').collect();
    // segment.ext / segment_gen.ext / segment_codec_suffix.ext / segment_gen_codec_suffix.ext
    if parts.len() == 2 || parts.len() == 4 {
        Ok(parts[1].parse()?)
    } else {
        Ok(0)
    }
}

pub fn parse_segment_name(filename: &str) -> &str {
    if let Some(idx) = index_of_segment_name(filename) {
        &filename[..idx]
    } else {
        filename
    }
}

fn strip_extension(filename: &str) -> &str {
    if let Some(idx) = filename.find('.') {
        &filename[..idx]
    } else {
        filename
    }
}

/// A field + term-text pair identifying one dictionary entry (§3 "Term").
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Term {
    pub field: String,
    pub bytes: Vec<u8>,
}

impl Term {
    pub fn new(field: String, bytes: Vec<u8>) -> Term {
        Term { field, bytes }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn text(&self) -> Result<String> {
        Ok(String::from_utf8(self.bytes.clone())?)
    }

    pub fn is_empty(&self) -> bool {
        self.field.is_empty() && self.bytes.is_empty()
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        let res = self.field.cmp(&other.field);
        if res == Ordering::Equal {
            self.bytes.cmp(&other.bytes)
        } else {
            res
        }
    }
}

pub struct SegmentInfo {
    pub name: String,
    pub max_doc: i32,
    pub directory: DirectoryRc,
    pub is_compound_file: AtomicBool,
    pub id: [u8; ID_LENGTH],
    pub codec: Option<Arc<Codec>>,
    pub diagnostics: HashMap<String, String>,
    pub attributes: HashMap<String, String>,
    pub version: Version,
    pub set_files: HashSet<String>,
}

impl SegmentInfo {
    pub fn new(
        version: Version,
        name: &str,
        max_doc: i32,
        directory: DirectoryRc,
        is_compound_file: bool,
        codec: Option<Arc<Codec>>,
        diagnostics: HashMap<String, String>,
        id: [u8; ID_LENGTH],
        attributes: HashMap<String, String>,
    ) -> Result<SegmentInfo> {
        Ok(SegmentInfo {
            name: String::from(name),
            max_doc,
            directory,
            is_compound_file: AtomicBool::new(is_compound_file),
            id,
            version,
            codec,
            diagnostics,
            attributes,
            set_files: HashSet::new(),
        })
    }

    pub fn set_codec(&mut self, codec: Arc<Codec>) {
        self.codec = Some(codec);
    }

    pub fn codec(&self) -> &Arc<Codec> {
        self.codec.as_ref().expect("codec not yet assigned")
    }

    pub fn max_doc(&self) -> i32 {
        self.max_doc
    }

    pub fn is_compound_file(&self) -> bool {
        self.is_compound_file.load(AtomicOrdering::Acquire)
    }

    pub fn set_use_compound_file(&self) {
        self.is_compound_file.store(true, AtomicOrdering::Release)
    }

    pub fn get_id(&self) -> &[u8] {
        &self.id
    }

    pub fn files(&self) -> &HashSet<String> {
        &self.set_files
    }

    pub fn set_files(&mut self, files: &HashSet<String>) -> Result<()> {
        self.set_files = HashSet::with_capacity(files.len());
        self.add_files(files)
    }

    pub fn add_file(&mut self, file: &str) -> Result<()> {
        self.check_file_name(file)?;
        let file = self.named_for_this_segment(file);
        self.set_files.insert(file);
        Ok(())
    }

    pub fn add_files(&mut self, files: &HashSet<String>) -> Result<()> {
        for f in files {
            self.check_file_name(f)?;
        }
        for f in files {
            let file = self.named_for_this_segment(f);
            self.set_files.insert(file);
        }
        Ok(())
    }

    fn check_file_name(&self, file: &str) -> Result<()> {
        lazy_static! {
            static ref CODEC_FILE_RE: Regex = Regex::new(CODEC_FILE_PATTERN).unwrap();
        }
        if !CODEC_FILE_RE.is_match(file) {
            bail!(ErrorKind::IllegalArgument(format!(
                "invalid codec file name '{}'",
                file
            )));
        }
        if file.to_lowercase().ends_with(".tmp") {
            bail!(ErrorKind::IllegalArgument(
                "codec file name cannot end with .tmp".into()
            ));
        }
        Ok(())
    }

    fn named_for_this_segment(&self, file: &str) -> String {
        let mut name = self.name.clone();
        name.push_str(strip_segment_name(file));
        name
    }

    pub fn set_diagnostics(&mut self, diags: HashMap<String, String>) {
        self.diagnostics = diags;
    }

    pub fn set_max_doc(&mut self, max_doc: i32) -> Result<()> {
        if self.max_doc != -1 {
            bail!(ErrorKind::IllegalState("max_doc was already set".into()));
        }
        self.max_doc = max_doc;
        Ok(())
    }
}

impl Clone for SegmentInfo {
    fn clone(&self) -> Self {
        SegmentInfo {
            name: self.name.clone(),
            max_doc: self.max_doc,
            directory: Arc::clone(&self.directory),
            is_compound_file: AtomicBool::new(self.is_compound_file()),
            id: self.id,
            codec: self.codec.clone(),
            diagnostics: self.diagnostics.clone(),
            attributes: self.attributes.clone(),
            version: self.version.clone(),
            set_files: self.set_files.clone(),
        }
    }
}

impl Hash for SegmentInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.id.hash(state);
    }
}

impl Serialize for SegmentInfo {
    fn serialize<S>(&self, serializer: S) -> result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("SegmentInfo", 5)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("max_doc", &self.max_doc)?;
        s.serialize_field("is_compound_file", &self.is_compound_file())?;
        s.serialize_field("diagnostics", &self.diagnostics)?;
        s.serialize_field("attributes", &self.attributes)?;
        s.end()
    }
}

impl fmt::Debug for SegmentInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SegmentInfo(name={}, max_doc={}, cfs={})",
            self.name,
            self.max_doc,
            self.is_compound_file()
        )
    }
}

/// Wraps a read-only `SegmentInfo` with per-commit generation counters
/// (del gen, field-infos gen, doc-values gen) — the unit tracked in the
/// segments manifest (§4.7).
pub struct SegmentCommitInfo {
    pub info: SegmentInfo,
    pub del_count: AtomicI32,
    pub del_gen: AtomicI64,
    pub next_write_del_gen: AtomicI64,
    field_infos_gen: AtomicI64,
    pub next_write_field_infos_gen: AtomicI64,
    pub doc_values_gen: i64,
    pub next_write_doc_values_gen: AtomicI64,
    pub dv_updates_files: HashMap<i32, HashSet<String>>,
    pub field_infos_files: HashSet<String>,
    pub size_in_bytes: AtomicI64,
    /// Only used in-RAM to order buffered-deletes application; never
    /// persisted.
    pub buffered_deletes_gen: AtomicI64,
}

impl Hash for SegmentCommitInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.info.hash(state);
    }
}

impl SegmentCommitInfo {
    pub fn new(
        info: SegmentInfo,
        del_count: i32,
        del_gen: i64,
        field_infos_gen: i64,
        doc_values_gen: i64,
        dv_updates_files: HashMap<i32, HashSet<String>>,
        field_infos_files: HashSet<String>,
    ) -> SegmentCommitInfo {
        let next_field_infos_gen = if field_infos_gen == -1 {
            1
        } else {
            field_infos_gen + 1
        };
        SegmentCommitInfo {
            info,
            del_count: AtomicI32::new(del_count),
            del_gen: AtomicI64::new(del_gen),
            next_write_del_gen: AtomicI64::new(if del_gen == -1 { 1 } else { del_gen + 1 }),
            field_infos_gen: AtomicI64::new(field_infos_gen),
            next_write_field_infos_gen: AtomicI64::new(next_field_infos_gen),
            doc_values_gen,
            next_write_doc_values_gen: AtomicI64::new(if doc_values_gen == -1 {
                1
            } else {
                doc_values_gen + 1
            }),
            dv_updates_files,
            field_infos_files,
            size_in_bytes: AtomicI64::new(-1),
            buffered_deletes_gen: AtomicI64::new(0),
        }
    }

    pub fn files(&self) -> HashSet<String> {
        let mut files = HashSet::new();
        for f in self.info.files() {
            files.insert(f.clone());
        }
        for fs in self.dv_updates_files.values() {
            for f in fs {
                files.insert(f.clone());
            }
        }
        for f in &self.field_infos_files {
            files.insert(f.clone());
        }
        files
    }

    pub fn has_deletions(&self) -> bool {
        self.del_gen() != -1
    }

    pub fn del_count(&self) -> i32 {
        self.del_count.load(AtomicOrdering::Acquire)
    }

    pub fn set_del_count(&self, del_count: i32) -> Result<()> {
        if del_count < 0 || del_count > self.info.max_doc() {
            bail!(ErrorKind::IllegalArgument("invalid del_count".into()));
        }
        self.del_count.store(del_count, AtomicOrdering::Release);
        Ok(())
    }

    pub fn has_field_updates(&self) -> bool {
        self.field_infos_gen() != -1
    }

    pub fn field_infos_gen(&self) -> i64 {
        self.field_infos_gen.load(AtomicOrdering::Acquire)
    }

    pub fn next_write_field_infos_gen(&self) -> i64 {
        self.next_write_field_infos_gen.load(AtomicOrdering::Acquire)
    }

    pub fn set_next_write_field_infos_gen(&self, gen: i64) {
        self.next_write_field_infos_gen
            .store(gen, AtomicOrdering::Release)
    }

    pub fn next_write_doc_values_gen(&self) -> i64 {
        self.next_write_doc_values_gen.load(AtomicOrdering::Acquire)
    }

    pub fn set_next_write_doc_values_gen(&self, gen: i64) {
        self.next_write_doc_values_gen
            .store(gen, AtomicOrdering::Release);
    }

    pub fn advance_field_infos_gen(&self) {
        self.field_infos_gen
            .store(self.next_write_field_infos_gen(), AtomicOrdering::Release);
        self.next_write_field_infos_gen
            .store(self.field_infos_gen() + 1, AtomicOrdering::Release);
        self.size_in_bytes.store(-1, AtomicOrdering::Release);
    }

    pub fn next_write_del_gen(&self) -> i64 {
        self.next_write_del_gen.load(AtomicOrdering::Acquire)
    }

    pub fn set_next_write_del_gen(&self, gen: i64) {
        self.next_write_del_gen.store(gen, AtomicOrdering::Release)
    }

    pub fn advance_next_write_del_gen(&self) {
        self.next_write_del_gen.fetch_add(1, AtomicOrdering::Acquire);
    }

    pub fn del_gen(&self) -> i64 {
        self.del_gen.load(AtomicOrdering::Acquire)
    }

    pub fn advance_del_gen(&self) {
        self.del_gen.store(
            self.next_write_del_gen.load(AtomicOrdering::Acquire),
            AtomicOrdering::Release,
        );
        self.next_write_del_gen
            .store(self.del_gen() + 1, AtomicOrdering::Release);
        self.size_in_bytes.store(-1, AtomicOrdering::Release);
    }

    pub fn size_in_bytes(&self) -> i64 {
        let mut size = self.size_in_bytes.load(AtomicOrdering::Acquire);
        if size == -1 {
            let mut sum = 0;
            for name in self.files() {
                match self.info.directory.file_length(&name) {
                    Ok(l) => sum += l,
                    Err(e) => warn!("get file '{}' length failed: {:?}", name, e),
                }
            }
            size = sum;
            self.size_in_bytes.store(size, AtomicOrdering::Release);
        }
        size
    }

    pub fn buffered_deletes_gen(&self) -> i64 {
        self.buffered_deletes_gen.load(AtomicOrdering::Acquire)
    }

    pub fn set_buffered_deletes_gen(&self, v: i64) {
        self.buffered_deletes_gen.store(v, AtomicOrdering::Release);
        self.size_in_bytes.store(-1, AtomicOrdering::Release);
    }
}

impl Clone for SegmentCommitInfo {
    fn clone(&self) -> Self {
        let infos = SegmentCommitInfo::new(
            self.info.clone(),
            self.del_count(),
            self.del_gen(),
            self.field_infos_gen(),
            self.doc_values_gen,
            self.dv_updates_files.clone(),
            self.field_infos_files.clone(),
        );
        infos
            .next_write_del_gen
            .store(self.next_write_del_gen(), AtomicOrdering::Release);
        infos
            .next_write_field_infos_gen
            .store(self.next_write_field_infos_gen(), AtomicOrdering::Release);
        infos.set_next_write_doc_values_gen(self.next_write_doc_values_gen());
        infos
    }
}

impl Eq for SegmentCommitInfo {}

impl PartialEq for SegmentCommitInfo {
    fn eq(&self, other: &SegmentCommitInfo) -> bool {
        self.info.name.eq(&other.info.name)
    }
}

impl Serialize for SegmentCommitInfo {
    fn serialize<S>(&self, serializer: S) -> result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("SegmentCommitInfo", 8)?;
        s.serialize_field("info", &self.info)?;
        s.serialize_field("del_count", &self.del_count())?;
        s.serialize_field("del_gen", &self.del_gen())?;
        s.serialize_field("next_write_del_gen", &self.next_write_del_gen())?;
        s.serialize_field("field_infos_gen", &self.field_infos_gen())?;
        s.serialize_field("doc_values_gen", &self.doc_values_gen)?;
        s.serialize_field("dv_updates_files", &self.dv_updates_files)?;
        s.serialize_field("size_in_bytes", &self.size_in_bytes())?;
        s.end()
    }
}

impl fmt::Display for SegmentCommitInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Ok(s) = serde_json::to_string_pretty(self) {
            write!(f, "{}", s)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SegmentCommitInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Parameters handed to codec format writers while flushing one segment
/// (§4.4 step 3).
pub struct SegmentWriteState {
    pub directory: DirectoryRc,
    pub segment_info: SegmentInfo,
    pub field_infos: FieldInfos,
    pub del_count_on_flush: u32,
    /// Deletes/updates enrolled during indexing of this segment: a term
    /// maps to the doc-id-upto any doc below which should be considered
    /// deleted at flush time (§4.3 in-RAM delete application).
    pub seg_updates: Option<*const BufferedUpdates>,
    live_docs: Box<dyn Bits>,
    pub segment_suffix: String,
    pub context: IOContext,
    /// Block-tree blocking thresholds (§4.5.1), threaded from the
    /// writer's `WriterConfig` rather than hardcoded in the postings
    /// format so a writer-wide setting actually reaches the codec.
    pub min_items_per_block: usize,
    pub max_items_per_block: usize,
}

impl SegmentWriteState {
    pub fn new(
        directory: DirectoryRc,
        segment_info: SegmentInfo,
        field_infos: FieldInfos,
        seg_updates: Option<*const BufferedUpdates>,
        context: IOContext,
        segment_suffix: String,
    ) -> Self {
        debug_assert!(Self::assert_segment_suffix(&segment_suffix));
        SegmentWriteState {
            directory,
            segment_info,
            field_infos,
            del_count_on_flush: 0,
            seg_updates,
            live_docs: Box::new(FixedBitSet::new(0)),
            segment_suffix,
            context,
            min_items_per_block: crate::core::codec::v1::blocktree::DEFAULT_MIN_ITEMS_PER_BLOCK,
            max_items_per_block: crate::core::codec::v1::blocktree::DEFAULT_MAX_ITEMS_PER_BLOCK,
        }
    }

    pub fn with_block_sizes(mut self, min_items: usize, max_items: usize) -> Self {
        self.min_items_per_block = min_items;
        self.max_items_per_block = max_items;
        self
    }

    pub fn seg_updates(&self) -> &BufferedUpdates {
        unsafe { &*self.seg_updates.unwrap() }
    }

    pub fn live_docs(&self) -> &dyn Bits {
        self.live_docs.as_ref()
    }

    pub fn set_live_docs(&mut self, live_docs: Box<dyn Bits>) {
        self.live_docs = live_docs;
    }

    fn assert_segment_suffix(segment_suffix: &str) -> bool {
        if !segment_suffix.is_empty() {
            let parts: Vec<&str> = segment_suffix.split('_').collect();
            if parts.len() == 2 {
                true
            } else if parts.len() == 1 {
                segment_suffix.parse::<i64>().is_ok()
            } else {
                false
            }
        } else {
            true
        }
    }
}

impl Clone for SegmentWriteState {
    fn clone(&self) -> Self {
        SegmentWriteState {
            directory: Arc::clone(&self.directory),
            segment_info: self.segment_info.clone(),
            field_infos: self.field_infos.clone(),
            del_count_on_flush: self.del_count_on_flush,
            seg_updates: None,
            live_docs: Box::new(FixedBitSet::new(0)),
            segment_suffix: self.segment_suffix.clone(),
            context: self.context,
            min_items_per_block: self.min_items_per_block,
            max_items_per_block: self.max_items_per_block,
        }
    }
}

/// Parameters handed to codec format readers while opening one segment.
pub struct SegmentReadState<'a> {
    pub directory: DirectoryRc,
    pub segment_info: &'a SegmentInfo,
    pub field_infos: Arc<FieldInfos>,
    pub context: &'a IOContext,
    pub segment_suffix: String,
}

impl<'a> SegmentReadState<'a> {
    pub fn new(
        directory: DirectoryRc,
        segment_info: &'a SegmentInfo,
        field_infos: Arc<FieldInfos>,
        context: &'a IOContext,
        segment_suffix: String,
    ) -> SegmentReadState<'a> {
        SegmentReadState {
            directory,
            segment_info,
            field_infos,
            context,
            segment_suffix,
        }
    }

    pub fn with_suffix(state: &'a SegmentReadState, suffix: &str) -> SegmentReadState<'a> {
        Self::new(
            state.directory.clone(),
            state.segment_info,
            state.field_infos.clone(),
            state.context,
            String::from(suffix),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_file_name_with_suffix_and_ext() {
        assert_eq!(segment_file_name("_3", "", "si"), "_3.si");
        assert_eq!(segment_file_name("_3", "Lucene50_0", "dvd"), "_3_Lucene50_0.dvd");
        assert_eq!(segment_file_name("_3", "", ""), "_3");
    }

    #[test]
    fn generation_roundtrip() {
        let name = file_name_from_generation("_3", "del", 17);
        assert_eq!(parse_generation(&name).unwrap(), 17);
        let name0 = file_name_from_generation("_3", "del", 0);
        assert_eq!(parse_generation(&name0).unwrap(), 0);
    }

    #[test]
    fn strip_and_parse_segment_name() {
        assert_eq!(parse_segment_name("_3_1.del"), "_3_");
        assert_eq!(strip_segment_name("_3_1.del"), "1.del");
    }

    #[test]
    fn term_ordering_by_field_then_bytes() {
        let a = Term::new("title".into(), b"apple".to_vec());
        let b = Term::new("title".into(), b"banana".to_vec());
        let c = Term::new("body".into(), b"zzz".to_vec());
        assert!(a < b);
        assert!(c < a);
    }
}
