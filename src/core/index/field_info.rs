//! Per-field metadata and the global field-number map that keeps field
//! numbers consistent across every segment in an index (§3 "Field info").

use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::codec::codec_util;
use crate::core::store::{open_checksum_input, DataInput, DataOutput, Directory, IOContext, IndexOutput};
use crate::error::{ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOptions {
    None,
    Docs,
    DocsAndFreqs,
    DocsAndFreqsAndPositions,
    DocsAndFreqsAndPositionsAndOffsets,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub number: i32,
    pub index_options: IndexOptions,
    pub has_norms: bool,
    pub store_payloads: bool,
    pub dv_gen: i64,
    pub attributes: HashMap<String, String>,
}

impl FieldInfo {
    pub fn new(name: String, number: i32, index_options: IndexOptions, has_norms: bool) -> Self {
        FieldInfo {
            name,
            number,
            index_options,
            has_norms,
            store_payloads: false,
            dv_gen: -1,
            attributes: HashMap::new(),
        }
    }

    /// Marks this field as carrying per-position payload bytes (§4.3
    /// postings accumulator's position stream only reserves payload-length
    /// framing when a field is flagged this way).
    pub fn with_payloads(mut self, store_payloads: bool) -> Self {
        self.store_payloads = store_payloads;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.index_options != IndexOptions::None
    }
}

/// The set of fields known to one segment, ordered by field number.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    pub by_number: HashMap<i32, FieldInfo>,
    pub by_name: HashMap<String, i32>,
    pub has_vectors: bool,
    pub has_norms: bool,
}

impl FieldInfos {
    pub fn new(infos: Vec<FieldInfo>) -> Result<Self> {
        let mut by_number = HashMap::new();
        let mut by_name = HashMap::new();
        let mut has_norms = false;
        for fi in infos {
            if by_number.contains_key(&fi.number) {
                bail!(ErrorKind::IllegalArgument(format!(
                    "duplicate field number {}",
                    fi.number
                )));
            }
            if by_name.contains_key(&fi.name) {
                bail!(ErrorKind::IllegalArgument(format!(
                    "duplicate field name '{}'",
                    fi.name
                )));
            }
            has_norms |= fi.has_norms;
            by_name.insert(fi.name.clone(), fi.number);
            by_number.insert(fi.number, fi);
        }
        Ok(FieldInfos {
            by_number,
            by_name,
            has_vectors: false,
            has_norms,
        })
    }

    pub fn field_info_by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).and_then(|n| self.by_number.get(n))
    }

    pub fn field_info_by_number(&self, number: i32) -> Option<&FieldInfo> {
        self.by_number.get(&number)
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Field names in ascending field-number order, the iteration order the
    /// block-tree terms writer uses when it flushes one `FieldsConsumer` per
    /// field (§4.4 step 3).
    pub fn sorted_field_names(&self) -> Vec<String> {
        let mut pairs: Vec<(i32, String)> = self
            .by_number
            .iter()
            .map(|(n, fi)| (*n, fi.name.clone()))
            .collect();
        pairs.sort_by_key(|(n, _)| *n);
        pairs.into_iter().map(|(_, name)| name).collect()
    }
}

/// Assigns stable field numbers across the lifetime of an index so that a
/// field keeps the same number whichever segment it first appeared in
/// (mirrors Lucene's `FieldNumbers`). Owned in RAM by the writer; a snapshot
/// can optionally be persisted to a `<version>.fnx` file during a commit's
/// prepare/finish window (§4.7 step 2) so a reopened writer can recover
/// number assignments without replaying every segment's field infos.
#[derive(Default)]
pub struct FieldNumbers {
    inner: Mutex<FieldNumbersInner>,
}

#[derive(Default)]
struct FieldNumbersInner {
    number_to_name: HashMap<i32, String>,
    name_to_number: HashMap<String, i32>,
    low_water_mark: i32,
}

impl FieldNumbers {
    pub fn new() -> Self {
        FieldNumbers::default()
    }

    /// Returns the number for `name`, assigning a new one if this is the
    /// first time this field name has been seen.
    pub fn add_or_get(&self, name: &str) -> i32 {
        let mut inner = self.inner.lock().unwrap();
        if let Some(n) = inner.name_to_number.get(name) {
            return *n;
        }
        let mut next = inner.low_water_mark;
        while inner.number_to_name.contains_key(&next) {
            next += 1;
        }
        inner.number_to_name.insert(next, name.to_string());
        inner.name_to_number.insert(name.to_string(), next);
        inner.low_water_mark = next + 1;
        next
    }

    pub fn name_for(&self, number: i32) -> Option<String> {
        self.inner.lock().unwrap().number_to_name.get(&number).cloned()
    }

    /// Snapshot of every name/number pair currently assigned, sorted by
    /// number (§4.7 step 2: "optionally write a new global field-number map
    /// file `<version>.fnx`").
    pub fn snapshot(&self) -> Vec<(i32, String)> {
        let inner = self.inner.lock().unwrap();
        let mut pairs: Vec<(i32, String)> = inner
            .number_to_name
            .iter()
            .map(|(n, name)| (*n, name.clone()))
            .collect();
        pairs.sort_by_key(|(n, _)| *n);
        pairs
    }

    /// Writes a new `<version>.fnx` file capturing every field name/number
    /// assigned so far, returning its file name.
    pub fn write_to(&self, dir: &dyn Directory, index_id: &[u8], version: i64) -> Result<String> {
        let file_name = fnx_file_name(version);
        let mut out = dir.create_output(&file_name, &IOContext::Default)?;
        codec_util::write_index_header(out.as_mut(), FNX_CODEC_NAME, FNX_VERSION_CURRENT, index_id, "")?;
        let pairs = self.snapshot();
        out.write_vint(pairs.len() as i32)?;
        for (number, name) in &pairs {
            out.write_vint(*number)?;
            out.write_string(name)?;
        }
        codec_util::write_footer(out.as_mut())?;
        Ok(file_name)
    }

    /// Reads a `<version>.fnx` file back into a fresh `FieldNumbers`, seeded
    /// with every assignment it recorded.
    pub fn read_from(dir: &dyn Directory, index_id: &[u8], version: i64) -> Result<FieldNumbers> {
        let file_name = fnx_file_name(version);
        let mut input = open_checksum_input(dir, &file_name, &IOContext::Default)?;
        codec_util::check_index_header(&mut input, FNX_CODEC_NAME, FNX_VERSION_START, FNX_VERSION_CURRENT, index_id, "")?;

        let count = input.read_vint()?;
        let mut number_to_name = HashMap::with_capacity(count as usize);
        let mut name_to_number = HashMap::with_capacity(count as usize);
        let mut low_water_mark = 0;
        for _ in 0..count {
            let number = input.read_vint()?;
            let name = input.read_string()?;
            low_water_mark = low_water_mark.max(number + 1);
            number_to_name.insert(number, name.clone());
            name_to_number.insert(name, number);
        }
        codec_util::check_footer(&mut input)?;

        Ok(FieldNumbers {
            inner: Mutex::new(FieldNumbersInner {
                number_to_name,
                name_to_number,
                low_water_mark,
            }),
        })
    }
}

pub const FNX_CODEC_NAME: &str = "LucerneFieldNumbers";
pub const FNX_VERSION_START: i32 = 0;
pub const FNX_VERSION_CURRENT: i32 = FNX_VERSION_START;

fn fnx_file_name(version: i64) -> String {
    format!("{}.fnx", version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::RAMDirectory;
    use crate::core::util::string_util::random_id;

    #[test]
    fn fnx_file_round_trips_assignments() {
        let dir = RAMDirectory::new();
        let id = random_id();
        let numbers = FieldNumbers::new();
        numbers.add_or_get("title");
        numbers.add_or_get("body");

        let file_name = numbers.write_to(&dir, &id, 7).unwrap();
        assert_eq!(file_name, "7.fnx");

        let restored = FieldNumbers::read_from(&dir, &id, 7).unwrap();
        assert_eq!(restored.name_for(0), Some("title".to_string()));
        assert_eq!(restored.name_for(1), Some("body".to_string()));
        // A name already present keeps its number rather than allocating
        // a new one past the restored low-water mark.
        assert_eq!(restored.add_or_get("title"), 0);
        assert_eq!(restored.add_or_get("summary"), 2);
    }

    #[test]
    fn field_numbers_stable_across_calls() {
        let fns = FieldNumbers::new();
        let a = fns.add_or_get("title");
        let b = fns.add_or_get("body");
        assert_eq!(fns.add_or_get("title"), a);
        assert_ne!(a, b);
    }

    #[test]
    fn field_infos_sorted_by_number() {
        let infos = FieldInfos::new(vec![
            FieldInfo::new("body".into(), 1, IndexOptions::DocsAndFreqs, false),
            FieldInfo::new("title".into(), 0, IndexOptions::DocsAndFreqsAndPositions, false),
        ])
        .unwrap();
        assert_eq!(infos.sorted_field_names(), vec!["title", "body"]);
    }

    #[test]
    fn rejects_duplicate_field_number() {
        let err = FieldInfos::new(vec![
            FieldInfo::new("a".into(), 0, IndexOptions::Docs, false),
            FieldInfo::new("b".into(), 0, IndexOptions::Docs, false),
        ]);
        assert!(err.is_err());
    }
}
