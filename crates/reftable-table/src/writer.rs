use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

use crate::error::Error;
use crate::format::{self, Footer};
use crate::record::{LogRecord, Record, RefRecord};
use reftable_config::WriteOptions;

/// Writes a single immutable table file.
///
/// The writer is a thin sequential encoder: records are streamed straight to
/// `sink` as they arrive via [`add_ref`](Writer::add_ref)/[`add_log`](Writer::add_log),
/// with only the small index (key -> offset) kept in memory. [`close`](Writer::close)
/// appends the index and footer sections.
///
/// Callers must call [`set_limits`](Writer::set_limits) before the first
/// `add_ref`/`add_log`, and must add records in strictly ascending key order —
/// both are enforced and reported as [`Error::Api`].
pub struct Writer<W: Write> {
    sink: W,
    #[allow(dead_code)]
    opts: WriteOptions,
    limits: Option<(u64, u64)>,
    last_key: Option<String>,
    offset: u64,
    index: Vec<(String, u64)>,
    min_update_index: u64,
    max_update_index: u64,
}

impl<W: Write> Writer<W> {
    /// Wraps `sink` in a new writer governed by `opts`.
    pub fn new(sink: W, opts: WriteOptions) -> Self {
        Self {
            sink,
            opts,
            limits: None,
            last_key: None,
            offset: 0,
            index: Vec::new(),
            min_update_index: 0,
            max_update_index: 0,
        }
    }

    /// Sets the `[min, max]` range of update indices for records this writer
    /// will accept. Must be called before the first `add_ref`/`add_log`.
    pub fn set_limits(&mut self, min: u64, max: u64) {
        self.limits = Some((min, max));
    }

    /// The lowest update index observed so far. Meaningful only after at
    /// least one `add_ref`/`add_log`.
    #[must_use]
    pub fn min_update_index(&self) -> u64 {
        self.min_update_index
    }

    /// The highest update index observed so far.
    #[must_use]
    pub fn max_update_index(&self) -> u64 {
        self.max_update_index
    }

    /// Adds a ref record. Must be called in ascending `ref_name` order and
    /// within the range set by `set_limits`.
    pub fn add_ref(&mut self, record: RefRecord) -> Result<(), Error> {
        self.add(Record::Ref(record))
    }

    /// Adds a log record. Same ordering/range contract as `add_ref`.
    pub fn add_log(&mut self, record: LogRecord) -> Result<(), Error> {
        self.add(Record::Log(record))
    }

    fn add(&mut self, record: Record) -> Result<(), Error> {
        let (min, max) = self
            .limits
            .ok_or_else(|| Error::Api("add called before set_limits".to_string()))?;

        if record.update_index() < min || record.update_index() > max {
            return Err(Error::Api(format!(
                "update_index {} outside writer limits [{min}, {max}]",
                record.update_index()
            )));
        }

        if let Some(last) = &self.last_key {
            if record.key() <= last.as_str() {
                return Err(Error::Api(format!(
                    "records must be added in ascending key order: {:?} after {:?}",
                    record.key(),
                    last
                )));
            }
        }
        self.last_key = Some(record.key().to_string());

        if self.index.is_empty() {
            self.min_update_index = record.update_index();
        }
        self.max_update_index = self.max_update_index.max(record.update_index());

        let offset = format::write_data_entry(&mut self.sink, &mut self.offset, &record)?;
        self.index.push((record.key().to_string(), offset));
        Ok(())
    }

    /// Flushes the index and footer sections and finalizes the table.
    ///
    /// Returns an error (without having written a footer) if `set_limits` was
    /// never called, matching the writer contract's requirement that every
    /// table declare its update-index range.
    pub fn close(mut self) -> Result<W, Error> {
        let (min, max) = self
            .limits
            .ok_or_else(|| Error::Api("close called before set_limits".to_string()))?;

        let index_offset = self.offset;
        for (key, data_offset) in &self.index {
            self.sink
                .write_u32::<LittleEndian>(key.len() as u32)
                .map_err(Error::Io)?;
            self.sink.write_all(key.as_bytes()).map_err(Error::Io)?;
            self.sink
                .write_u64::<LittleEndian>(*data_offset)
                .map_err(Error::Io)?;
        }

        let footer = Footer {
            min_update_index: min,
            max_update_index: max,
            index_offset,
        };
        format::write_footer(&mut self.sink, &footer)?;
        self.sink.flush().map_err(Error::Io)?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_add_before_limits() {
        let mut w = Writer::new(Vec::new(), WriteOptions::default());
        let err = w.add_ref(RefRecord::deletion("refs/a", 1)).unwrap_err();
        assert!(matches!(err, Error::Api(_)));
    }

    #[test]
    fn rejects_out_of_order_keys() {
        let mut w = Writer::new(Vec::new(), WriteOptions::default());
        w.set_limits(1, 2);
        w.add_ref(RefRecord::deletion("refs/b", 1)).unwrap();
        let err = w.add_ref(RefRecord::deletion("refs/a", 2)).unwrap_err();
        assert!(matches!(err, Error::Api(_)));
    }

    #[test]
    fn rejects_update_index_outside_limits() {
        let mut w = Writer::new(Vec::new(), WriteOptions::default());
        w.set_limits(5, 10);
        let err = w.add_ref(RefRecord::deletion("refs/a", 1)).unwrap_err();
        assert!(matches!(err, Error::Api(_)));
    }

    #[test]
    fn tracks_min_and_max_update_index() {
        let mut w = Writer::new(Vec::new(), WriteOptions::default());
        w.set_limits(1, 5);
        w.add_ref(RefRecord::deletion("refs/a", 2)).unwrap();
        w.add_ref(RefRecord::deletion("refs/b", 4)).unwrap();
        assert_eq!(w.min_update_index(), 2);
        assert_eq!(w.max_update_index(), 4);
    }
}
