//! Variable-length integer coding shared by every on-disk format in §6:
//! VInt/VLong, UTF-8 strings, and the fixed-width int/long primitives.

use crate::error::{ErrorKind, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub trait DataOutput: Write {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_all(&[b])?;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)?;
        Ok(())
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.write_i32::<BigEndian>(v)?;
        Ok(())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.write_i64::<BigEndian>(v)?;
        Ok(())
    }

    /// VInt: 7 bits per byte, low-to-high, continuation in the high bit.
    fn write_vint(&mut self, mut v: i32) -> Result<()> {
        loop {
            if (v & !0x7f) == 0 {
                self.write_byte(v as u8)?;
                return Ok(());
            } else {
                self.write_byte(((v & 0x7f) | 0x80) as u8)?;
                v = ((v as u32) >> 7) as i32;
            }
        }
    }

    fn write_vlong(&mut self, mut v: i64) -> Result<()> {
        if v < 0 {
            bail!(ErrorKind::IllegalArgument(
                "cannot write negative vlong".into()
            ));
        }
        loop {
            if (v & !0x7f) == 0 {
                self.write_byte(v as u8)?;
                return Ok(());
            } else {
                self.write_byte(((v & 0x7f) | 0x80) as u8)?;
                v = ((v as u64) >> 7) as i64;
            }
        }
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        self.write_vint(bytes.len() as i32)?;
        self.write_bytes(bytes)
    }
}

pub trait DataInput: Read {
    fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_int(&mut self) -> Result<i32> {
        Ok(self.read_i32::<BigEndian>()?)
    }

    fn read_long(&mut self) -> Result<i64> {
        Ok(self.read_i64::<BigEndian>()?)
    }

    fn read_vint(&mut self) -> Result<i32> {
        let mut b = self.read_byte()?;
        let mut i = (b & 0x7f) as i32;
        let mut shift = 7;
        while b & 0x80 != 0 {
            b = self.read_byte()?;
            i |= ((b & 0x7f) as i32) << shift;
            shift += 7;
            if shift > 35 {
                bail!(ErrorKind::CorruptIndex("vint overflow".into()));
            }
        }
        Ok(i)
    }

    fn read_vlong(&mut self) -> Result<i64> {
        let mut b = self.read_byte()?;
        let mut i = (b & 0x7f) as i64;
        let mut shift = 7;
        while b & 0x80 != 0 {
            b = self.read_byte()?;
            i |= ((b & 0x7f) as i64) << shift;
            shift += 7;
            if shift > 70 {
                bail!(ErrorKind::CorruptIndex("vlong overflow".into()));
            }
        }
        Ok(i)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl<W: Write + ?Sized> DataOutput for W {}
impl<R: Read + ?Sized> DataInput for R {}

/// Zig-zag-free delta VInt coding used for monotonically increasing docID
/// postings (§3 "Posting" — "monotonically increasing docIDs with delta +
/// variable-length integer coding").
pub fn write_vint_to(buf: &mut Vec<u8>, mut v: i32) {
    loop {
        if (v & !0x7f) == 0 {
            buf.push(v as u8);
            return;
        } else {
            buf.push(((v & 0x7f) | 0x80) as u8);
            v = ((v as u32) >> 7) as i32;
        }
    }
}

pub fn read_vint_from(buf: &[u8], pos: &mut usize) -> io::Result<i32> {
    let mut b = buf[*pos];
    *pos += 1;
    let mut i = (b & 0x7f) as i32;
    let mut shift = 7;
    while b & 0x80 != 0 {
        b = buf[*pos];
        *pos += 1;
        i |= ((b & 0x7f) as i32) << shift;
        shift += 7;
    }
    Ok(i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn vint_roundtrip() {
        for v in [0i32, 1, 127, 128, 16384, i32::MAX] {
            let mut buf = Vec::new();
            buf.write_vint(v).unwrap();
            let mut cur = Cursor::new(buf);
            assert_eq!(cur.read_vint().unwrap(), v);
        }
    }

    #[test]
    fn vlong_roundtrip() {
        for v in [0i64, 1, 127, 128, 1i64 << 40, i64::MAX] {
            let mut buf = Vec::new();
            buf.write_vlong(v).unwrap();
            let mut cur = Cursor::new(buf);
            assert_eq!(cur.read_vlong().unwrap(), v);
        }
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = Vec::new();
        buf.write_string("hello, 世界").unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(cur.read_string().unwrap(), "hello, 世界");
    }
}
