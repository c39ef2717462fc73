//! Codec header/footer format shared by every on-disk file in §6: magic +
//! codec name + version + segment id, and a CRC32 footer. Every format
//! writer/reader in `core::codec::v1` goes through this module so corruption
//! (magic/version mismatch, checksum failure) is detected uniformly (§7).

use crate::core::store::{ChecksumIndexInput, DataInput, DataOutput, IndexInput, IndexOutput};
use crate::error::{ErrorKind, Result};

pub const CODEC_MAGIC: i32 = 0x3fd7_6c17;
pub const FOOTER_MAGIC: i32 = 0x024d_6b8a;

pub fn write_index_header(
    out: &mut dyn IndexOutput,
    codec: &str,
    version: i32,
    segment_id: &[u8],
    suffix: &str,
) -> Result<()> {
    out.write_int(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_int(version)?;
    if segment_id.len() != crate::core::util::string_util::ID_LENGTH {
        bail!(ErrorKind::IllegalArgument(
            "segment id must be ID_LENGTH bytes".into()
        ));
    }
    out.write_bytes(segment_id)?;
    out.write_string(suffix)?;
    Ok(())
}

pub fn index_header_length(codec: &str, suffix: &str) -> usize {
    4 + vint_str_len(codec) + 4 + crate::core::util::string_util::ID_LENGTH + vint_str_len(suffix)
}

fn vint_str_len(s: &str) -> usize {
    let mut buf = Vec::new();
    buf.write_vint(s.len() as i32).ok();
    buf.len() + s.len()
}

/// Reads and validates a header, returning the actual version found.
pub fn check_index_header(
    input: &mut dyn IndexInput,
    codec: &str,
    min_version: i32,
    max_version: i32,
    expected_id: &[u8],
    expected_suffix: &str,
) -> Result<i32> {
    let magic = input.read_int()?;
    if magic != CODEC_MAGIC {
        bail!(ErrorKind::CorruptIndex(format!(
            "codec header magic mismatch: got {:#x}, expected {:#x}",
            magic, CODEC_MAGIC
        )));
    }
    let actual_codec = input.read_string()?;
    if actual_codec != codec {
        bail!(ErrorKind::CorruptIndex(format!(
            "codec mismatch: got '{}', expected '{}'",
            actual_codec, codec
        )));
    }
    let version = input.read_int()?;
    if version < min_version || version > max_version {
        bail!(ErrorKind::CorruptIndex(format!(
            "codec version {} out of range [{}, {}]",
            version, min_version, max_version
        )));
    }
    let id = input.read_bytes(crate::core::util::string_util::ID_LENGTH)?;
    if id != expected_id {
        bail!(ErrorKind::CorruptIndex(
            "segment id mismatch between file and SegmentInfo".into()
        ));
    }
    let suffix = input.read_string()?;
    if suffix != expected_suffix {
        bail!(ErrorKind::CorruptIndex(format!(
            "suffix mismatch: got '{}', expected '{}'",
            suffix, expected_suffix
        )));
    }
    Ok(version)
}

/// Copies a header from `input` to `out`, verifying the segment id matches
/// `expected_id` but not the codec name/version/suffix (§4.2 compound-file
/// write: "just copies the index header, verifying that its id matches").
pub fn verify_and_copy_index_header(
    input: &mut dyn IndexInput,
    out: &mut dyn IndexOutput,
    expected_id: &[u8],
) -> Result<()> {
    let magic = input.read_int()?;
    if magic != CODEC_MAGIC {
        bail!(ErrorKind::CorruptIndex("codec header magic mismatch".into()));
    }
    let codec = input.read_string()?;
    let version = input.read_int()?;
    let id = input.read_bytes(crate::core::util::string_util::ID_LENGTH)?;
    if id != expected_id {
        bail!(ErrorKind::CorruptIndex(
            "segment id mismatch while copying into compound file".into()
        ));
    }
    let suffix = input.read_string()?;

    out.write_int(magic)?;
    out.write_string(&codec)?;
    out.write_int(version)?;
    out.write_bytes(&id)?;
    out.write_string(&suffix)?;
    Ok(())
}

pub fn footer_length() -> usize {
    4 + 4 + 8
}

pub fn write_footer(out: &mut dyn IndexOutput) -> Result<()> {
    out.write_int(FOOTER_MAGIC)?;
    out.write_int(0)?;
    let checksum = out.checksum()?;
    out.write_long(checksum)?;
    Ok(())
}

/// Validates the footer of a `ChecksumIndexInput`, returning the stored
/// checksum. Used when the caller wants to compare it against an
/// independently computed value (§4.2 "verify footer (checksum) matches").
pub fn check_footer<T: IndexInput>(input: &mut ChecksumIndexInput<T>) -> Result<i64> {
    let expected_len = input.len() - footer_length() as i64;
    if input.file_pointer() != expected_len {
        bail!(ErrorKind::CorruptIndex(format!(
            "did not read all bytes before footer: read {}, expected {}",
            input.file_pointer(),
            expected_len
        )));
    }
    let actual_checksum = input.checksum();
    let magic = input.read_int()?;
    if magic != FOOTER_MAGIC {
        bail!(ErrorKind::CorruptIndex("footer magic mismatch".into()));
    }
    let algorithm_id = input.read_int()?;
    if algorithm_id != 0 {
        bail!(ErrorKind::CorruptIndex("unknown checksum algorithm".into()));
    }
    let stored_checksum = input.read_long()?;
    if stored_checksum != actual_checksum {
        bail!(ErrorKind::CorruptIndex(format!(
            "checksum mismatch: stored {}, computed {}",
            stored_checksum, actual_checksum
        )));
    }
    Ok(stored_checksum)
}

/// Reads the stored checksum from the footer of a plain (non-checksum)
/// input without validating it against a running digest — used right after
/// `check_index_header` when the caller only wants to confirm the file
/// isn't truncated (§4.2 compound reader construction).
pub fn retrieve_checksum(input: &mut dyn IndexInput) -> Result<i64> {
    let expected_pos = input.len() - footer_length() as i64;
    input.seek(expected_pos)?;
    let magic = input.read_int()?;
    if magic != FOOTER_MAGIC {
        bail!(ErrorKind::CorruptIndex("footer magic mismatch".into()));
    }
    let _algorithm_id = input.read_int()?;
    input.read_long()
}
