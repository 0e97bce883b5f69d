use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Error;
use crate::format::{self, Footer};
use crate::record::Record;

/// Reads an immutable table file.
///
/// On [`open`](Reader::open) the whole record stream is parsed into memory
/// (ascending key order is already guaranteed by the writer contract, so no
/// sort is needed). This keeps the reader simple at the cost of holding one
/// table's records resident; the block-paged layout a production table
/// format would use is explicitly out of scope here.
pub struct Reader {
    name: String,
    records: Vec<Record>,
    footer: Footer,
    size: u64,
}

impl Reader {
    /// Opens a table file and loads its contents.
    ///
    /// `name` is the identifier the stack manager uses for this reader (the
    /// table's file name); it is independent of the bytes on disk.
    pub fn open<P: AsRef<Path>>(path: P, name: impl Into<String>) -> Result<Self, Error> {
        let mut file = BufReader::new(File::open(path.as_ref())?);
        let size = file.seek(SeekFrom::End(0))?;

        if size < format::FOOTER_BYTES {
            return Err(Error::Format("file too small for footer".to_string()));
        }

        file.seek(SeekFrom::Start(size - format::FOOTER_BYTES))?;
        let mut footer_bytes = vec![0u8; format::FOOTER_BYTES as usize];
        file.read_exact(&mut footer_bytes)?;
        let footer = format::read_footer(&footer_bytes)?;

        if footer.index_offset > size - format::FOOTER_BYTES {
            return Err(Error::Format("index_offset points outside file".to_string()));
        }

        // Load the index: key -> data offset.
        file.seek(SeekFrom::Start(footer.index_offset))?;
        let index_len = size - format::FOOTER_BYTES - footer.index_offset;
        let mut index_bytes = vec![0u8; index_len as usize];
        file.read_exact(&mut index_bytes)?;

        let mut cursor = Cursor::new(&index_bytes);
        let mut offsets = Vec::new();
        while (cursor.position() as u64) < index_len {
            let key_len = cursor.read_u32::<LittleEndian>()?;
            let mut key = vec![0u8; key_len as usize];
            cursor.read_exact(&mut key)?;
            let data_offset = cursor.read_u64::<LittleEndian>()?;
            offsets.push(data_offset);
        }

        // Re-read each DATA entry in order (offsets are already ascending by key).
        let mut records = Vec::with_capacity(offsets.len());
        for offset in offsets {
            file.seek(SeekFrom::Start(offset))?;
            records.push(format::read_data_entry(&mut file)?);
        }

        Ok(Self {
            name: name.into(),
            records,
            footer,
            size,
        })
    }

    /// The identifier this reader was opened with (normally the file name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn min_update_index(&self) -> u64 {
        self.footer.min_update_index
    }

    #[must_use]
    pub fn max_update_index(&self) -> u64 {
        self.footer.max_update_index
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns an iterator positioned at the first record with key >= `name`.
    pub fn seek_ref(&self, name: &str) -> TableIter<'_> {
        let pos = self.records.partition_point(|r| r.key() < name);
        TableIter {
            records: &self.records,
            pos,
        }
    }

    /// Returns an iterator over every record whose ref or peeled value equals
    /// `oid` (the consumed reader contract's `refs_for`).
    pub fn refs_for<'a>(&'a self, oid: &'a [u8]) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |r| match r {
            Record::Ref(rr) => {
                rr.value.as_deref() == Some(oid) || rr.target_value.as_deref() == Some(oid)
            }
            Record::Log(_) => false,
        })
    }
}

/// A forward iterator over a single table's records, starting from a seek
/// position.
pub struct TableIter<'a> {
    records: &'a [Record],
    pos: usize,
}

impl<'a> Iterator for TableIter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let rec = self.records.get(self.pos)?;
        self.pos += 1;
        Some(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RefRecord;
    use crate::writer::Writer;
    use reftable_config::WriteOptions;

    fn write_table(path: &std::path::Path, records: Vec<Record>) {
        let file = File::create(path).unwrap();
        let mut w = Writer::new(file, WriteOptions::default());
        w.set_limits(1, 10);
        for r in records {
            match r {
                Record::Ref(r) => w.add_ref(r).unwrap(),
                Record::Log(l) => w.add_log(l).unwrap(),
            }
        }
        w.close().unwrap();
    }

    #[test]
    fn seek_ref_finds_insertion_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.ref");
        write_table(
            &path,
            vec![
                Record::Ref(RefRecord {
                    ref_name: "refs/a".into(),
                    update_index: 1,
                    value: Some(vec![1]),
                    target_value: None,
                    target: None,
                }),
                Record::Ref(RefRecord {
                    ref_name: "refs/c".into(),
                    update_index: 2,
                    value: Some(vec![2]),
                    target_value: None,
                    target: None,
                }),
            ],
        );

        let reader = Reader::open(&path, "t.ref").unwrap();
        let keys: Vec<&str> = reader.seek_ref("refs/b").map(|r| r.key()).collect();
        assert_eq!(keys, vec!["refs/c"]);
        // The footer's range comes from `set_limits`, not the actual
        // records' update indices.
        assert_eq!(reader.min_update_index(), 1);
        assert_eq!(reader.max_update_index(), 10);
    }

    #[test]
    fn detects_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.ref");
        write_table(&path, vec![Record::Ref(RefRecord::deletion("refs/a", 1))]);

        let mut bytes = std::fs::read(&path).unwrap();
        let data_start = 0;
        bytes[data_start + 10] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(Reader::open(&path, "t.ref").is_err());
    }
}
