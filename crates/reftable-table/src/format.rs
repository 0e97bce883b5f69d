//! Table binary format.
//!
//! ## Layout
//!
//! ```text
//! [DATA]   repeated: crc32(u32) | len(u32) | body
//! [INDEX]  repeated: key_len(u32) | key | data_offset(u64)
//! [FOOTER] min_update_index(u64) | max_update_index(u64) | index_offset(u64) | magic(u32 = "REF1")
//! ```
//!
//! Each DATA record's `body` is a tagged encoding of a [`crate::Record`]:
//! a one-byte discriminant (`0` = ref, `1` = log) followed by the fields of
//! that variant, each string/byte-string prefixed with a `u32` length. The
//! CRC32 covers the body only, mirroring the original table format's
//! end-to-end corruption check.

use crate::error::Error;
use crate::record::{LogRecord, Record, RefRecord};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{Read, Write};

/// Magic number identifying table files (ASCII "REF1").
pub const MAGIC: u32 = 0x5245_4631;

/// Footer size in bytes: 8 (min) + 8 (max) + 8 (index_offset) + 4 (magic).
pub const FOOTER_BYTES: u64 = 8 + 8 + 8 + 4;

const TAG_REF: u8 = 0;
const TAG_LOG: u8 = 1;

fn write_opt_bytes<W: Write>(w: &mut W, v: &Option<Vec<u8>>) -> std::io::Result<()> {
    match v {
        Some(b) => {
            w.write_u32::<LittleEndian>(b.len() as u32)?;
            w.write_all(b)?;
        }
        None => w.write_u32::<LittleEndian>(u32::MAX)?,
    }
    Ok(())
}

fn read_opt_bytes<R: Read>(r: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let len = r.read_u32::<LittleEndian>()?;
    if len == u32::MAX {
        return Ok(None);
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(Some(buf))
}

fn write_opt_str<W: Write>(w: &mut W, v: &Option<String>) -> std::io::Result<()> {
    write_opt_bytes(w, &v.as_ref().map(|s| s.as_bytes().to_vec()))
}

fn read_opt_str<R: Read>(r: &mut R) -> std::io::Result<Option<String>> {
    Ok(match read_opt_bytes(r)? {
        Some(b) => Some(
            String::from_utf8(b)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?,
        ),
        None => None,
    })
}

fn write_str<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_str<R: Read>(r: &mut R) -> std::io::Result<String> {
    let len = r.read_u32::<LittleEndian>()?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

/// Encodes `record`'s body (everything the CRC covers).
pub fn encode_record_body(record: &Record) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    match record {
        Record::Ref(r) => {
            buf.write_u8(TAG_REF)?;
            write_str(&mut buf, &r.ref_name)?;
            buf.write_u64::<LittleEndian>(r.update_index)?;
            write_opt_bytes(&mut buf, &r.value)?;
            write_opt_bytes(&mut buf, &r.target_value)?;
            write_opt_str(&mut buf, &r.target)?;
        }
        Record::Log(l) => {
            buf.write_u8(TAG_LOG)?;
            write_str(&mut buf, &l.ref_name)?;
            buf.write_u64::<LittleEndian>(l.update_index)?;
            write_opt_str(&mut buf, &l.new_hash)?;
            write_opt_str(&mut buf, &l.old_hash)?;
            write_opt_str(&mut buf, &l.name)?;
            write_opt_str(&mut buf, &l.email)?;
            buf.write_u64::<LittleEndian>(l.time)?;
            buf.write_u64::<LittleEndian>(l.tz_offset)?;
            write_opt_str(&mut buf, &l.message)?;
        }
    }
    Ok(buf)
}

/// Decodes a record body previously produced by [`encode_record_body`].
pub fn decode_record_body(mut body: &[u8]) -> Result<Record, Error> {
    let r = &mut body;
    let tag = r
        .read_u8()
        .map_err(|e| Error::Format(format!("truncated record tag: {e}")))?;
    match tag {
        TAG_REF => {
            let ref_name = read_str(r).map_err(|e| Error::Format(e.to_string()))?;
            let update_index = r.read_u64::<LittleEndian>().map_err(|e| Error::Format(e.to_string()))?;
            let value = read_opt_bytes(r).map_err(|e| Error::Format(e.to_string()))?;
            let target_value = read_opt_bytes(r).map_err(|e| Error::Format(e.to_string()))?;
            let target = read_opt_str(r).map_err(|e| Error::Format(e.to_string()))?;
            Ok(Record::Ref(RefRecord {
                ref_name,
                update_index,
                value,
                target_value,
                target,
            }))
        }
        TAG_LOG => {
            let ref_name = read_str(r).map_err(|e| Error::Format(e.to_string()))?;
            let update_index = r.read_u64::<LittleEndian>().map_err(|e| Error::Format(e.to_string()))?;
            let new_hash = read_opt_str(r).map_err(|e| Error::Format(e.to_string()))?;
            let old_hash = read_opt_str(r).map_err(|e| Error::Format(e.to_string()))?;
            let name = read_opt_str(r).map_err(|e| Error::Format(e.to_string()))?;
            let email = read_opt_str(r).map_err(|e| Error::Format(e.to_string()))?;
            let time = r.read_u64::<LittleEndian>().map_err(|e| Error::Format(e.to_string()))?;
            let tz_offset = r.read_u64::<LittleEndian>().map_err(|e| Error::Format(e.to_string()))?;
            let message = read_opt_str(r).map_err(|e| Error::Format(e.to_string()))?;
            Ok(Record::Log(LogRecord {
                ref_name,
                update_index,
                new_hash,
                old_hash,
                name,
                email,
                time,
                tz_offset,
                message,
            }))
        }
        other => Err(Error::Format(format!("unknown record tag {other}"))),
    }
}

/// Writes one DATA-section entry: `[crc32][len][body]`. Returns the byte
/// offset the entry was written at (the position of the CRC prefix).
pub fn write_data_entry<W: Write>(w: &mut W, offset: &mut u64, record: &Record) -> Result<u64, Error> {
    let body = encode_record_body(record).map_err(Error::Io)?;
    let mut hasher = Crc32::new();
    hasher.update(&body);
    let crc = hasher.finalize();

    let entry_offset = *offset;
    w.write_u32::<LittleEndian>(crc).map_err(Error::Io)?;
    w.write_u32::<LittleEndian>(body.len() as u32).map_err(Error::Io)?;
    w.write_all(&body).map_err(Error::Io)?;
    *offset += 4 + 4 + body.len() as u64;
    Ok(entry_offset)
}

/// Reads one DATA-section entry at the current reader position and verifies
/// its CRC32.
pub fn read_data_entry<R: Read>(r: &mut R) -> Result<Record, Error> {
    let crc = r.read_u32::<LittleEndian>().map_err(Error::Io)?;
    let len = r.read_u32::<LittleEndian>().map_err(Error::Io)? as usize;
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).map_err(Error::Io)?;

    let mut hasher = Crc32::new();
    hasher.update(&body);
    if hasher.finalize() != crc {
        return Err(Error::Format("CRC32 mismatch in data record".to_string()));
    }

    decode_record_body(&body)
}

/// Parsed table footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub min_update_index: u64,
    pub max_update_index: u64,
    pub index_offset: u64,
}

pub fn write_footer<W: Write>(w: &mut W, footer: &Footer) -> Result<(), Error> {
    w.write_u64::<LittleEndian>(footer.min_update_index).map_err(Error::Io)?;
    w.write_u64::<LittleEndian>(footer.max_update_index).map_err(Error::Io)?;
    w.write_u64::<LittleEndian>(footer.index_offset).map_err(Error::Io)?;
    w.write_u32::<LittleEndian>(MAGIC).map_err(Error::Io)?;
    Ok(())
}

pub fn read_footer(bytes: &[u8]) -> Result<Footer, Error> {
    if bytes.len() as u64 != FOOTER_BYTES {
        return Err(Error::Format("short footer".to_string()));
    }
    let mut r = bytes;
    let min_update_index = r.read_u64::<LittleEndian>().map_err(Error::Io)?;
    let max_update_index = r.read_u64::<LittleEndian>().map_err(Error::Io)?;
    let index_offset = r.read_u64::<LittleEndian>().map_err(Error::Io)?;
    let magic = r.read_u32::<LittleEndian>().map_err(Error::Io)?;
    if magic != MAGIC {
        return Err(Error::Format(format!("bad magic {magic:#x}")));
    }
    Ok(Footer {
        min_update_index,
        max_update_index,
        index_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_record_round_trips() {
        let rec = Record::Ref(RefRecord {
            ref_name: "refs/heads/main".to_string(),
            update_index: 7,
            value: Some(vec![1, 2, 3]),
            target_value: None,
            target: None,
        });
        let body = encode_record_body(&rec).unwrap();
        let decoded = decode_record_body(&body).unwrap();
        assert_eq!(rec, decoded);
    }

    #[test]
    fn deletion_round_trips() {
        let rec = Record::Ref(RefRecord::deletion("refs/a", 3));
        let body = encode_record_body(&rec).unwrap();
        let decoded = decode_record_body(&body).unwrap();
        assert!(decoded.is_deletion());
    }

    #[test]
    fn data_entry_detects_corruption() {
        let mut buf = Vec::new();
        let mut offset = 0u64;
        let rec = Record::Ref(RefRecord::deletion("refs/a", 1));
        write_data_entry(&mut buf, &mut offset, &rec).unwrap();
        // Flip a body byte without touching the CRC.
        let last = buf.len() - 1;
        buf[last] ^= 0xff;
        let err = read_data_entry(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn footer_round_trips() {
        let footer = Footer {
            min_update_index: 1,
            max_update_index: 3,
            index_offset: 42,
        };
        let mut buf = Vec::new();
        write_footer(&mut buf, &footer).unwrap();
        assert_eq!(buf.len() as u64, FOOTER_BYTES);
        assert_eq!(read_footer(&buf).unwrap(), footer);
    }
}
