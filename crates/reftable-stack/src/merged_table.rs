//! Owns a stack's open readers and produces merged, seekable iterators over
//! them.

use reftable_table::Reader;

use crate::merged_iter::{MergedIter, SubIter};

/// A merged view over an ordered list of table readers (oldest first).
///
/// Replacing a `MergedTable` on reload transfers surviving readers by name
/// and drops the rest — see [`crate::stack::Stack::reload_once`].
pub struct MergedTable {
    readers: Vec<Reader>,
}

struct ReaderSeek<'a> {
    inner: reftable_table::TableIter<'a>,
}

impl<'a> SubIter for ReaderSeek<'a> {
    fn next(&mut self) -> Option<reftable_table::Record> {
        self.inner.next().cloned()
    }
}

impl MergedTable {
    /// Takes ownership of `readers`, in stack order (index 0 = oldest).
    #[must_use]
    pub fn new(readers: Vec<Reader>) -> Self {
        Self { readers }
    }

    #[must_use]
    pub fn readers(&self) -> &[Reader] {
        &self.readers
    }

    /// Consumes the table, handing its readers back (used by reload to pool
    /// readers across a rebuild without closing-and-reopening them).
    #[must_use]
    pub fn into_readers(self) -> Vec<Reader> {
        self.readers
    }

    /// Seeks every reader to `name` and returns a merged iterator over the
    /// whole stack. Deletions are always surfaced — this is the read path,
    /// where "deleted" is itself the authoritative answer.
    #[must_use]
    pub fn seek_ref(&self, name: &str) -> MergedIter<'_> {
        self.seek_ref_impl(name, false)
    }

    /// Like `seek_ref`, but additionally drops any deletion that wins the
    /// merge. Used by the compaction writer when compacting a range that
    /// reaches the bottom of the stack, where a deletion can never be
    /// shadowing a still-live older value.
    #[must_use]
    pub fn seek_ref_for_compaction(&self, name: &str, skip_deletions_from_index_zero: bool) -> MergedIter<'_> {
        self.seek_ref_impl(name, skip_deletions_from_index_zero)
    }

    /// Like `seek_ref_for_compaction`, but merges only readers
    /// `[first, last]` (inclusive) instead of the whole stack. Used by range
    /// compaction so records from tables outside the compacted range — whose
    /// update indices fall outside the new table's declared limits — never
    /// reach the writer.
    #[must_use]
    pub fn seek_range_for_compaction(&self, first: usize, last: usize, skip_deletions_from_index_zero: bool) -> MergedIter<'_> {
        self.seek_impl(&self.readers[first..=last], "", skip_deletions_from_index_zero)
    }

    fn seek_ref_impl(&self, name: &str, skip_deletions_from_index_zero: bool) -> MergedIter<'_> {
        self.seek_impl(&self.readers, name, skip_deletions_from_index_zero)
    }

    fn seek_impl<'a>(&'a self, readers: &'a [Reader], name: &str, skip_deletions_from_index_zero: bool) -> MergedIter<'a> {
        let subs: Vec<Box<dyn SubIter + '_>> = readers
            .iter()
            .map(|r| {
                let b: Box<dyn SubIter + '_> = Box::new(ReaderSeek {
                    inner: r.seek_ref(name),
                });
                b
            })
            .collect();
        MergedIter::new(subs, skip_deletions_from_index_zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reftable_config::WriteOptions;
    use reftable_table::{RefRecord, Writer};

    fn write_reader(dir: &std::path::Path, name: &str, records: Vec<RefRecord>, min: u64, max: u64) -> Reader {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut w = Writer::new(file, WriteOptions::default());
        w.set_limits(min, max);
        for r in records {
            w.add_ref(r).unwrap();
        }
        w.close().unwrap();
        Reader::open(&path, name).unwrap()
    }

    #[test]
    fn seek_ref_shadows_across_tables() {
        let dir = tempfile::tempdir().unwrap();
        let r0 = write_reader(
            dir.path(),
            "t0",
            vec![RefRecord {
                ref_name: "refs/a".into(),
                update_index: 1,
                value: Some(vec![1]),
                target_value: None,
                target: None,
            }],
            1,
            1,
        );
        let r1 = write_reader(
            dir.path(),
            "t1",
            vec![RefRecord::deletion("refs/a", 2)],
            2,
            2,
        );

        let table = MergedTable::new(vec![r0, r1]);
        let mut iter = table.seek_ref("refs/a");
        let rec = iter.next().unwrap();
        assert!(rec.is_deletion());
        assert!(iter.next().is_none());
    }
}
