//! The segments manifest (§4.7, §3 "SegmentInfos"): the atomically
//! published list of live segments for one index, written via a lock-less
//! two-phase commit and located on open through the `segments.gen`
//! pointer file plus directory-listing fallback.
//!
//! This crate's `Directory` (§4.1) is deliberately write-once/append-only
//! (`createOutput` fails on an existing name; there is no positional
//! rewrite of an already-synced file). §4.7 step 1 asks for a placeholder
//! checksum written now and overwritten in place by `finishCommit` — not
//! expressible over that contract. The adaptation kept here (see
//! DESIGN.md) builds the full manifest body in memory, where the real
//! checksum is always known before any byte reaches the `Directory`, and
//! persists it under the already-reserved `pending_segments_<N>` name;
//! `finishCommit` then does the one rename that actually publishes the
//! generation, plus the `segments.gen` pointer write. A crash between
//! `prepareCommit` and `finishCommit` leaves only an orphaned
//! `pending_segments_<N>` file, never a `segments_<N>` with a bad
//! checksum — the same "readers never observe a partial commit" guarantee
//! the spec asks for, reached by a route this Directory contract allows.

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;

use log::{debug, warn};

use crate::core::codec::codec_util;
use crate::core::codec::Codec;
use crate::core::index::{
    file_name_from_generation, SegmentCommitInfo, SegmentInfo, INDEX_FILE_OLD_SEGMENT_GEN,
    INDEX_FILE_PENDING_SEGMENTS, INDEX_FILE_SEGMENTS,
};
use crate::core::store::{
    open_checksum_input, ChecksumIndexInput, DataInput, DataOutput, Directory, DirectoryRc, IOContext,
    IndexInput, IndexOutput, RAMOutputStream,
};
use crate::core::util::string_util::ID_LENGTH;
use crate::core::util::{from_base36, to_base36, Version, VERSION_LATEST};
use crate::error::{Error, ErrorKind, Result};

pub const CODEC_NAME: &str = "LucerneSegmentInfos";
pub const VERSION_START: i32 = 0;
pub const VERSION_CURRENT: i32 = VERSION_START;

/// Current format of the `segments.gen` pointer file (§6).
pub const SEGMENTS_GEN_FORMAT_CURRENT: i32 = -2;

/// Bound on retrying a failed read of the presumed-current `segments_<N>`
/// before falling back to `N-1` once (§4.7 reader side, step 3).
const READ_RETRY_COUNT: u32 = 2;

fn write_string_map(out: &mut dyn IndexOutput, map: &HashMap<String, String>) -> Result<()> {
    out.write_vint(map.len() as i32)?;
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    for k in keys {
        out.write_string(k)?;
        out.write_string(&map[k])?;
    }
    Ok(())
}

fn read_string_map(input: &mut dyn IndexInput) -> Result<HashMap<String, String>> {
    let count = input.read_vint()?;
    let mut map = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let k = input.read_string()?;
        let v = input.read_string()?;
        map.insert(k, v);
    }
    Ok(map)
}

/// A handle returned by `prepare_commit`, carrying everything
/// `finish_commit`/`rollback_commit` needs without re-deriving it (§4.7
/// writer side).
pub struct PendingCommit {
    generation: i64,
    pending_file: String,
    final_file: String,
}

impl PendingCommit {
    pub fn generation(&self) -> i64 {
        self.generation
    }
}

/// The in-memory view of one index's live segment list: generation,
/// monotonic version, the per-segment-name counter, user commit metadata,
/// and the segments themselves (§3 "SegmentInfos").
#[derive(Clone)]
pub struct SegmentInfos {
    /// Index-wide identity, written once at first commit and checked on
    /// every subsequent read/write so a manifest can't be silently read
    /// back against the wrong directory's files.
    pub id: [u8; ID_LENGTH],
    pub index_created_version: Version,
    /// Next ordinal to allocate for a new segment's base name (`_<counter>`
    /// in base 36).
    pub counter: i64,
    /// Commit generation this instance was read from, or 0 for a
    /// brand-new, uncommitted index.
    pub generation: i64,
    pub last_generation: i64,
    /// Millis timestamp, strictly increasing across commits (§8 "Manifest
    /// monotonicity").
    pub version: i64,
    /// The `version` of the most recently written `<version>.fnx` global
    /// field-number map, or -1 if none has been written yet (§4.7 step 2).
    pub field_numbers_version: i64,
    pub user_data: HashMap<String, String>,
    pub segments: Vec<Arc<SegmentCommitInfo>>,
}

impl SegmentInfos {
    /// A fresh, uncommitted manifest for a brand-new index.
    pub fn new() -> Self {
        SegmentInfos {
            id: crate::core::util::string_util::random_id(),
            index_created_version: VERSION_LATEST,
            counter: 0,
            generation: 0,
            last_generation: 0,
            version: 0,
            field_numbers_version: -1,
            user_data: HashMap::new(),
            segments: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn add(&mut self, info: Arc<SegmentCommitInfo>) {
        self.segments.push(info);
    }

    /// Allocates the next segment base name (`_0`, `_1`, ... in base 36)
    /// and advances the counter.
    pub fn new_segment_name(&mut self) -> String {
        let name = format!("_{}", to_base36(self.counter as u64));
        self.counter += 1;
        name
    }

    pub fn segments_file_name(&self) -> Option<String> {
        if self.generation == 0 {
            None
        } else {
            Some(file_name_from_generation(
                INDEX_FILE_SEGMENTS,
                "",
                self.generation as u64,
            ))
        }
    }

    /// Every file this manifest's own commit record touches: the
    /// `segments_<N>` file itself (when `include_segments_file`) plus
    /// every file of every live segment (§9 "the file-deletion policy must
    /// consult [reference counts] before unlinking retired files" — this
    /// is the file-name side of that bookkeeping).
    pub fn files(&self, include_segments_file: bool) -> std::collections::HashSet<String> {
        let mut files = std::collections::HashSet::new();
        if include_segments_file {
            if let Some(name) = self.segments_file_name() {
                files.insert(name);
            }
        }
        for seg in &self.segments {
            for f in seg.files() {
                files.insert(f);
            }
        }
        files
    }

    // ---- writer side: two-phase commit (§4.7) ----------------------------

    /// §4.7 step 1: serialize the full manifest body (the real checksum is
    /// already known, see module docs) and persist it under
    /// `pending_segments_<N>`, fsynced before returning.
    pub fn prepare_commit(&mut self, dir: &dyn Directory) -> Result<PendingCommit> {
        let next_generation = self.generation + 1;
        let pending_file = file_name_from_generation(INDEX_FILE_PENDING_SEGMENTS, "", next_generation as u64);
        let final_file = file_name_from_generation(INDEX_FILE_SEGMENTS, "", next_generation as u64);

        self.version = self.next_version();
        self.write_pending_file(dir, &pending_file)?;

        Ok(PendingCommit {
            generation: next_generation,
            pending_file,
            final_file,
        })
    }

    /// Serializes the full manifest body for the current in-memory state
    /// and (re)persists it under `pending_file`. Used both by
    /// `prepare_commit` and by `write_field_numbers`, which needs to
    /// refresh the already-written pending file once
    /// `field_numbers_version` changes — this `Directory` can't rewrite a
    /// byte range in place, so the pending file is simply rebuilt and
    /// rewritten in full before `finish_commit` ever reads it.
    fn write_pending_file(&self, dir: &dyn Directory, pending_file: &str) -> Result<()> {
        let mut body = RAMOutputStream::new(pending_file.to_string());
        codec_util::write_index_header(&mut body, CODEC_NAME, VERSION_CURRENT, &self.id, "")?;
        body.write_vint(self.index_created_version.major)?;
        body.write_vint(self.index_created_version.minor)?;
        body.write_vint(self.index_created_version.bugfix)?;
        body.write_vlong(self.counter)?;
        body.write_vlong(self.version)?;
        // `field_numbers_version` can be -1 (no snapshot written yet, §4.7
        // step 2 is optional), so it goes through the fixed-width signed
        // long rather than the non-negative-only VLong encoding.
        body.write_long(self.field_numbers_version)?;
        body.write_vint(self.segments.len() as i32)?;
        for seg in &self.segments {
            write_segment_entry(&mut body, seg)?;
        }
        write_string_map(&mut body, &self.user_data)?;
        codec_util::write_footer(&mut body)?;

        if dir.file_exists(pending_file) {
            dir.delete_file(pending_file)?;
        }
        let mut out = dir.create_output(pending_file, &IOContext::Default)?;
        out.write_all(body.bytes())?;
        let mut synced = std::collections::HashSet::new();
        synced.insert(pending_file.to_string());
        drop(out);
        dir.sync(&synced)
    }

    /// §4.7 step 2: writes a new global field-number map snapshot, in the
    /// window between `prepare_commit` and `finish_commit`, and refreshes
    /// the pending manifest so it records the new snapshot's version.
    pub fn write_field_numbers(
        &mut self,
        dir: &dyn Directory,
        pending: &PendingCommit,
        numbers: &crate::core::index::field_info::FieldNumbers,
    ) -> Result<String> {
        let file_name = numbers.write_to(dir, &self.id, self.version)?;
        let mut synced = std::collections::HashSet::new();
        synced.insert(file_name.clone());
        dir.sync(&synced)?;
        self.field_numbers_version = self.version;
        self.write_pending_file(dir, &pending.pending_file)?;
        Ok(file_name)
    }

    /// §4.7 step 3: publish the pending manifest (rename into its final
    /// `segments_<N>` name) and advance the `segments.gen` pointer.
    /// Returns the new generation.
    pub fn finish_commit(&mut self, dir: &dyn Directory, pending: PendingCommit) -> Result<i64> {
        debug!(
            "finishCommit: publishing '{}' as generation {}",
            pending.final_file, pending.generation
        );
        dir.rename(&pending.pending_file, &pending.final_file)?;
        let mut synced = std::collections::HashSet::new();
        synced.insert(pending.final_file.clone());
        dir.sync(&synced)?;

        write_segments_gen(dir, pending.generation)?;

        self.last_generation = self.generation;
        self.generation = pending.generation;
        debug!("finishCommit: done, generation now {}", self.generation);
        Ok(self.generation)
    }

    /// §4.7 step 4: abandon a prepared-but-not-finished commit, leaving
    /// the prior generation current.
    pub fn rollback_commit(&mut self, dir: &dyn Directory, pending: PendingCommit) -> Result<()> {
        if dir.file_exists(&pending.pending_file) {
            debug!(
                "rollbackCommit: deleting orphaned pending commit '{}'",
                pending.pending_file
            );
            dir.delete_file(&pending.pending_file)?;
        }
        Ok(())
    }

    /// A one-shot `prepare_commit` + `finish_commit`, for callers (tests,
    /// simple embedders) that don't need the fnx-writing window between
    /// the two phases.
    pub fn commit(&mut self, dir: &dyn Directory) -> Result<i64> {
        let pending = self.prepare_commit(dir)?;
        self.finish_commit(dir, pending)
    }

    fn next_version(&self) -> i64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        if now > self.version {
            now
        } else {
            self.version + 1
        }
    }

    // ---- reader side (§4.7) ----------------------------------------------

    /// Finds and reads the current commit generation, following the
    /// deterministic fallback sequence of §4.7's reader side.
    pub fn read_latest_commit(dir: &DirectoryRc) -> Result<SegmentInfos> {
        let candidate = Self::find_segments_generation(dir.as_ref())?;
        if candidate == 0 {
            bail!(ErrorKind::CorruptIndex("no segments_N file found".into()));
        }

        let mut last_err: Option<Error> = None;
        for gen in [candidate, candidate - 1] {
            if gen <= 0 {
                continue;
            }
            let file_name = file_name_from_generation(INDEX_FILE_SEGMENTS, "", gen as u64);
            if !dir.file_exists(&file_name) {
                continue;
            }
            let mut attempts = 0;
            loop {
                match Self::read_commit(dir, &file_name, gen) {
                    Ok(infos) => return Ok(infos),
                    Err(e) => {
                        attempts += 1;
                        warn!(
                            "readLatestCommit: reading '{}' failed (attempt {}/{}): {:?}",
                            file_name, attempts, READ_RETRY_COUNT, e
                        );
                        last_err = Some(e);
                        if attempts > READ_RETRY_COUNT {
                            warn!(
                                "readLatestCommit: giving up on generation {}, falling back to {}",
                                gen,
                                gen - 1
                            );
                            break;
                        }
                    }
                }
            }
            // only the presumed-current generation retries; a failure on
            // `candidate` falls through to the `candidate - 1` fallback.
        }
        Err(last_err.unwrap_or_else(|| ErrorKind::CorruptIndex("no segments_N file found".into()).into()))
    }

    /// Directory listing + `segments.gen` pointer cross-check (§4.7 reader
    /// side, steps 1-2). Returns 0 if no `segments_<N>` file exists at all.
    fn find_segments_generation(dir: &dyn Directory) -> Result<i64> {
        let names = dir.list_all()?;
        let prefix = format!("{}_", INDEX_FILE_SEGMENTS);
        let dir_max = names
            .iter()
            .filter_map(|n| n.strip_prefix(&prefix))
            .filter_map(from_base36)
            .max()
            .unwrap_or(0) as i64;

        let mut candidate = dir_max;
        if let Some(gen_pointer) = read_segments_gen(dir)? {
            if gen_pointer >= candidate {
                candidate = gen_pointer;
            }
        }
        Ok(candidate)
    }

    /// Parses one `segments_<N>` file (§6 "Segments manifest file").
    pub fn read_commit(dir: &DirectoryRc, file_name: &str, generation: i64) -> Result<SegmentInfos> {
        let mut input = open_checksum_input(dir.as_ref(), file_name, &IOContext::Default)?;
        Self::read_commit_from(dir, &mut input, generation)
    }

    fn read_commit_from(
        dir: &DirectoryRc,
        input: &mut ChecksumIndexInput<Box<dyn IndexInput>>,
        generation: i64,
    ) -> Result<SegmentInfos> {
        // the manifest's own index id is unknown before the first read, so
        // `check_index_header` can't cross-check it here the way every
        // other format does against a caller-supplied `SegmentInfo::id`;
        // read the raw header fields and treat whatever id is stored as
        // authoritative for this index from now on.
        let magic = input.read_int()?;
        if magic != codec_util::CODEC_MAGIC {
            bail!(ErrorKind::CorruptIndex("segments file header magic mismatch".into()));
        }
        let codec_name = input.read_string()?;
        if codec_name != CODEC_NAME {
            bail!(ErrorKind::CorruptIndex(format!(
                "segments file codec mismatch: got '{}'",
                codec_name
            )));
        }
        let version = input.read_int()?;
        if version < VERSION_START || version > VERSION_CURRENT {
            bail!(ErrorKind::CorruptIndex(format!("segments file version {} out of range", version)));
        }
        let mut id = [0u8; ID_LENGTH];
        id.copy_from_slice(&input.read_bytes(ID_LENGTH)?);
        let _suffix = input.read_string()?;

        let major = input.read_vint()?;
        let minor = input.read_vint()?;
        let bugfix = input.read_vint()?;
        let index_created_version = Version::new(major, minor, bugfix);

        let counter = input.read_vlong()?;
        let manifest_version = input.read_vlong()?;
        let field_numbers_version = input.read_long()?;
        let seg_count = input.read_vint()?;

        let mut segments = Vec::with_capacity(seg_count as usize);
        for _ in 0..seg_count {
            segments.push(read_segment_entry(dir, input)?);
        }
        let user_data = read_string_map(input)?;
        codec_util::check_footer(input)?;

        Ok(SegmentInfos {
            id,
            index_created_version,
            counter,
            generation,
            last_generation: generation,
            version: manifest_version,
            field_numbers_version,
            user_data,
            segments,
        })
    }
}

impl Default for SegmentInfos {
    fn default() -> Self {
        SegmentInfos::new()
    }
}

/// §6 lists each manifest entry as a direct tuple of everything a segment
/// carries (docCount, isCompoundFile, diagnostics, ...); this crate already
/// keeps exactly that metadata in a separately-versioned per-segment `.si`
/// file (`SegmentInfoFormat`, §4.4 step 4) so a segment's own commit-time
/// data doesn't have to be re-parsed from the middle of a, potentially
/// much larger, manifest file. What `segments_<N>` records directly is the
/// subset that's specific to *this commit* rather than to the segment
/// itself: the del/field-infos/doc-values generations a reader must pass
/// back in to reopen the right live-docs and field-update files. Name, id
/// and codec identify which `.si` to load for the rest.
fn write_segment_entry(out: &mut dyn IndexOutput, seg: &Arc<SegmentCommitInfo>) -> Result<()> {
    out.write_string(&seg.info.name)?;
    out.write_bytes(seg.info.get_id())?;
    out.write_string(seg.info.codec().name())?;
    out.write_vlong(seg.del_gen())?;
    out.write_vint(seg.del_count())?;
    out.write_vlong(seg.field_infos_gen())?;
    out.write_vlong(seg.doc_values_gen)?;
    Ok(())
}

fn read_segment_entry(dir: &DirectoryRc, input: &mut dyn IndexInput) -> Result<Arc<SegmentCommitInfo>> {
    let name = input.read_string()?;
    let mut id = [0u8; ID_LENGTH];
    id.copy_from_slice(&input.read_bytes(ID_LENGTH)?);
    let codec_name = input.read_string()?;
    let codec = Codec::for_name(&codec_name).ok_or_else(|| -> Error {
        ErrorKind::CorruptIndex(format!("unknown codec '{}' for segment '{}'", codec_name, name)).into()
    })?;
    let del_gen = input.read_vlong()?;
    let del_count = input.read_vint()?;
    let field_infos_gen = input.read_vlong()?;
    let doc_values_gen = input.read_vlong()?;

    let mut info = codec
        .segment_info_format()
        .read(Arc::clone(dir), &name, &id, &IOContext::Default)?;
    info.set_codec(Arc::clone(&codec));

    Ok(Arc::new(SegmentCommitInfo::new(
        info,
        del_count,
        del_gen,
        field_infos_gen,
        doc_values_gen,
        HashMap::new(),
        std::collections::HashSet::new(),
    )))
}

fn write_segments_gen(dir: &dyn Directory, generation: i64) -> Result<()> {
    let tmp_name = format!("segments.gen_{}.tmp", generation);
    {
        let mut out = dir.create_output(&tmp_name, &IOContext::Default)?;
        out.write_int(SEGMENTS_GEN_FORMAT_CURRENT)?;
        out.write_long(generation)?;
        out.write_long(generation)?;
    }
    let mut synced = std::collections::HashSet::new();
    synced.insert(tmp_name.clone());
    dir.sync(&synced)?;
    dir.rename(&tmp_name, INDEX_FILE_OLD_SEGMENT_GEN)?;
    let mut gen_file = std::collections::HashSet::new();
    gen_file.insert(INDEX_FILE_OLD_SEGMENT_GEN.to_string());
    dir.sync(&gen_file)
}

/// Reads `segments.gen`, returning `None` if it's absent or the file is a
/// torn write (its two generation longs disagree, §8 "Torn-write
/// detection": "readers ignore it and use the directory listing").
fn read_segments_gen(dir: &dyn Directory) -> Result<Option<i64>> {
    if !dir.file_exists(INDEX_FILE_OLD_SEGMENT_GEN) {
        return Ok(None);
    }
    let mut input = match dir.open_input(INDEX_FILE_OLD_SEGMENT_GEN, &IOContext::Default) {
        Ok(i) => i,
        Err(_) => return Ok(None),
    };
    let format = match input.read_int() {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    if format != SEGMENTS_GEN_FORMAT_CURRENT {
        return Ok(None);
    }
    let a = match input.read_long() {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    let b = match input.read_long() {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    if a != b {
        return Ok(None);
    }
    Ok(Some(a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::format::SegmentInfoFormat;
    use crate::core::codec::Codec;
    use crate::core::store::RAMDirectory;
    use crate::core::util::string_util::random_id;
    use std::collections::HashMap as Map;

    fn new_segment(dir: &DirectoryRc, name: &str, max_doc: i32) -> Arc<SegmentCommitInfo> {
        let codec = Codec::default_codec();
        let id = random_id();
        let mut info = SegmentInfo::new(
            VERSION_LATEST,
            name,
            max_doc,
            Arc::clone(dir),
            false,
            Some(codec.clone()),
            Map::new(),
            id,
            Map::new(),
        )
        .unwrap();
        let mut created = Vec::new();
        codec
            .segment_info_format()
            .write(dir.as_ref(), &mut info, &mut created, &IOContext::Default)
            .unwrap();
        Arc::new(SegmentCommitInfo::new(info, 0, -1, -1, -1, Map::new(), Default::default()))
    }

    #[test]
    fn commit_roundtrip_preserves_segments() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let mut infos = SegmentInfos::new();
        infos.add(new_segment(&dir, "_0", 10));
        infos.add(new_segment(&dir, "_1", 5));

        let gen = infos.commit(dir.as_ref()).unwrap();
        assert_eq!(gen, 1);
        assert_eq!(infos.segments_file_name().unwrap(), "segments_1");

        let reopened = SegmentInfos::read_latest_commit(&dir).unwrap();
        assert_eq!(reopened.generation, 1);
        assert_eq!(reopened.size(), 2);
        assert_eq!(reopened.id, infos.id);
        let names: Vec<&str> = reopened.segments.iter().map(|s| s.info.name.as_str()).collect();
        assert_eq!(names, vec!["_0", "_1"]);
    }

    #[test]
    fn commit_generation_and_version_strictly_increase() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let mut infos = SegmentInfos::new();
        infos.add(new_segment(&dir, "_0", 1));
        let gen1 = infos.commit(dir.as_ref()).unwrap();
        let version1 = infos.version;

        infos.add(new_segment(&dir, "_1", 1));
        let gen2 = infos.commit(dir.as_ref()).unwrap();

        assert!(gen2 > gen1);
        assert!(infos.version > version1);
    }

    #[test]
    fn no_op_commit_advances_generation_and_version_only() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let mut infos = SegmentInfos::new();
        infos.add(new_segment(&dir, "_0", 1));
        let gen1 = infos.commit(dir.as_ref()).unwrap();
        let segs1: Vec<String> = infos.segments.iter().map(|s| s.info.name.clone()).collect();

        let gen2 = infos.commit(dir.as_ref()).unwrap();
        let segs2: Vec<String> = infos.segments.iter().map(|s| s.info.name.clone()).collect();

        assert!(gen2 > gen1);
        assert_eq!(segs1, segs2);
    }

    #[test]
    fn rollback_leaves_no_new_segments_file() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let mut infos = SegmentInfos::new();
        infos.add(new_segment(&dir, "_0", 1));

        let pending = infos.prepare_commit(dir.as_ref()).unwrap();
        assert!(dir.file_exists("pending_segments_1"));
        infos.rollback_commit(dir.as_ref(), pending).unwrap();

        assert!(!dir.file_exists("pending_segments_1"));
        assert!(!dir.file_exists("segments_1"));
        assert_eq!(infos.generation, 0);
    }

    #[test]
    fn torn_segments_gen_falls_back_to_directory_listing() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let mut infos = SegmentInfos::new();
        infos.add(new_segment(&dir, "_0", 1));
        infos.commit(dir.as_ref()).unwrap();

        {
            let mut out = dir.create_output("segments.gen_bad.tmp", &IOContext::Default).unwrap();
            out.write_int(SEGMENTS_GEN_FORMAT_CURRENT).unwrap();
            out.write_long(7).unwrap();
            out.write_long(9).unwrap();
        }
        dir.delete_file(INDEX_FILE_OLD_SEGMENT_GEN).unwrap();
        dir.rename("segments.gen_bad.tmp", INDEX_FILE_OLD_SEGMENT_GEN).unwrap();

        let reopened = SegmentInfos::read_latest_commit(&dir).unwrap();
        assert_eq!(reopened.generation, 1);
    }

    #[test]
    fn prepare_commit_allows_writing_field_number_map_before_finish() {
        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let mut infos = SegmentInfos::new();
        infos.add(new_segment(&dir, "_0", 1));

        let pending = infos.prepare_commit(dir.as_ref()).unwrap();
        // Step 2 of §4.7: the writer may publish a global field-number map
        // file here, before the commit is made visible.
        assert!(!dir.file_exists("segments_1"));
        infos.finish_commit(dir.as_ref(), pending).unwrap();
        assert!(dir.file_exists("segments_1"));
    }

    #[test]
    fn field_number_map_roundtrips_through_a_commit() {
        use crate::core::index::field_info::FieldNumbers;

        let dir: DirectoryRc = Arc::new(RAMDirectory::new());
        let mut infos = SegmentInfos::new();
        infos.add(new_segment(&dir, "_0", 1));

        let numbers = FieldNumbers::new();
        numbers.add_or_get("title");
        numbers.add_or_get("body");

        let pending = infos.prepare_commit(dir.as_ref()).unwrap();
        let fnx_name = infos.write_field_numbers(dir.as_ref(), &pending, &numbers).unwrap();
        assert!(dir.file_exists(&fnx_name));
        infos.finish_commit(dir.as_ref(), pending).unwrap();

        let reopened = SegmentInfos::read_latest_commit(&dir).unwrap();
        assert_eq!(reopened.field_numbers_version, infos.version);
        let restored = FieldNumbers::read_from(dir.as_ref(), &reopened.id, reopened.field_numbers_version).unwrap();
        assert_eq!(restored.add_or_get("title"), numbers.add_or_get("title"));
        assert_eq!(restored.add_or_get("body"), numbers.add_or_get("body"));
    }
}
