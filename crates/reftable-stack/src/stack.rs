//! The stack manager: owns a directory of immutable tables plus the list
//! file naming the active ones, and drives reload, append and compaction.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reftable_config::StackOptions;
use reftable_table::{Reader, Writer};

use crate::error::Error;
use crate::merged_table::MergedTable;
use crate::naming::format_name;

/// Running totals across every `compact_range` call on this stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionStats {
    pub bytes: u64,
    pub attempts: u64,
    pub failures: u64,
}

/// A reftable stack rooted at `dir`, with its active-table list at
/// `list_file` (conventionally `dir.join("tables.list")`).
pub struct Stack {
    dir: PathBuf,
    list_file: PathBuf,
    opts: StackOptions,
    merged: MergedTable,
    stats: CompactionStats,
}

/// Deletes `path` on drop unless [`disarm`](TempFileGuard::disarm) was
/// called — used to clean up a temp table or lock file on any early exit.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn read_list(path: &Path) -> Result<Vec<String>, Error> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::Io(e)),
    }
}

fn render_list(names: &[String]) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str(name);
        out.push('\n');
    }
    out
}

/// Opens `path` exclusively, mapping `AlreadyExists` to `Error::Retry` and
/// everything else to `Error::Io`. Shared by the list lock and every
/// sub-table lock acquired during compaction.
fn create_lock(path: &Path) -> Result<File, Error> {
    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => Ok(f),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::Retry),
        Err(e) => Err(Error::Io(e)),
    }
}

impl Stack {
    /// Opens (or creates) a stack, loading whatever tables `list_file`
    /// currently names.
    pub fn open(dir: impl Into<PathBuf>, list_file: impl Into<PathBuf>, opts: StackOptions) -> Result<Self, Error> {
        let mut stack = Self {
            dir: dir.into(),
            list_file: list_file.into(),
            opts,
            merged: MergedTable::new(Vec::new()),
            stats: CompactionStats::default(),
        };
        stack.reload()?;
        Ok(stack)
    }

    #[must_use]
    pub fn merged(&self) -> &MergedTable {
        &self.merged
    }

    #[must_use]
    pub fn compaction_stats(&self) -> CompactionStats {
        self.stats
    }

    /// The update index the next appended table must start at.
    #[must_use]
    pub fn next_update_index(&self) -> u64 {
        self.merged
            .readers()
            .last()
            .map_or(1, |r| r.max_update_index() + 1)
    }

    fn lock_path(&self) -> PathBuf {
        let mut s = self.list_file.clone().into_os_string();
        s.push(".lock");
        PathBuf::from(s)
    }

    /// Re-reads the list file and rebuilds the merged view, retrying for up
    /// to three seconds (after the first three attempts) if a listed table
    /// disappears out from under a concurrent compaction.
    pub fn reload(&mut self) -> Result<(), Error> {
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut delay = Duration::ZERO;
        let mut tries = 0u32;

        loop {
            tries += 1;
            if tries > 3 && Instant::now() >= deadline {
                return Err(Error::NotExist(
                    "stack reload did not converge within the retry deadline".to_string(),
                ));
            }

            let names = read_list(&self.list_file)?;
            match self.reload_once(&names) {
                Ok(()) => {
                    tracing::debug!(tables = names.len(), "stack reloaded");
                    return Ok(());
                }
                Err(Error::NotExist(missing)) => {
                    let names_after = read_list(&self.list_file)?;
                    if names_after == names {
                        return Err(Error::NotExist(missing));
                    }
                    let jitter = rand::random::<f64>();
                    delay = delay + delay.mul_f64(jitter) + Duration::from_micros(100);
                    tracing::warn!(table = %missing, delay_us = delay.as_micros() as u64, "reload race, retrying");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Rebuilds the merged table from `names`, reusing already-open readers
    /// by name and opening the rest from disk.
    fn reload_once(&mut self, names: &[String]) -> Result<(), Error> {
        let old = std::mem::replace(&mut self.merged, MergedTable::new(Vec::new()));
        let mut pool: std::collections::HashMap<String, Reader> =
            old.into_readers().into_iter().map(|r| (r.name().to_string(), r)).collect();

        let mut new_readers = Vec::with_capacity(names.len());
        for name in names {
            if let Some(reader) = pool.remove(name) {
                new_readers.push(reader);
                continue;
            }
            match Reader::open(self.dir.join(name), name.clone()) {
                Ok(reader) => new_readers.push(reader),
                Err(reftable_table::Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    return Err(Error::NotExist(name.clone()));
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.merged = MergedTable::new(new_readers);
        Ok(())
    }

    /// Checks whether this stack's view still matches what `list_file`
    /// names, on disk, right now.
    fn uptodate(&self) -> Result<(), Error> {
        let names = read_list(&self.list_file)?;
        let current: Vec<&str> = self.merged.readers().iter().map(Reader::name).collect();
        if names.iter().map(String::as_str).ne(current) {
            return Err(Error::Lock("stack view is stale relative to the on-disk list".to_string()));
        }
        Ok(())
    }

    /// Appends a new table built by `write_table`, then runs auto-compaction.
    ///
    /// On lock contention this reloads — so the stack's view picks up
    /// whatever the concurrent writer committed — but still returns the lock
    /// error, so the caller can tell their write did not land and retry
    /// `add` themselves rather than silently losing it.
    pub fn add(&mut self, write_table: impl FnOnce(&mut Writer<File>) -> Result<(), Error>) -> Result<(), Error> {
        match self.try_add(write_table) {
            Err(Error::Lock(msg)) => {
                self.reload()?;
                Err(Error::Lock(msg))
            }
            Err(e) => Err(e),
            Ok(()) => self.auto_compact(),
        }
    }

    fn try_add(&mut self, write_table: impl FnOnce(&mut Writer<File>) -> Result<(), Error>) -> Result<(), Error> {
        let lock_path = self.lock_path();
        let _lock_file = create_lock(&lock_path).map_err(|e| match e {
            Error::Retry => Error::Lock("list file is locked by another writer".to_string()),
            other => other,
        })?;
        let mut lock_guard = TempFileGuard::new(lock_path.clone());

        self.uptodate()?;

        let next_update_index = self.next_update_index();
        let stem = format_name(next_update_index, next_update_index)?;
        let temp_path = self.dir.join(format!("{}{}", stem.trim_end_matches(".ref"), temp_suffix()));
        let mut temp_guard = TempFileGuard::new(temp_path.clone());

        let file = File::create(&temp_path)?;
        let mut writer = Writer::new(file, self.opts.write_options);
        write_table(&mut writer)?;

        let min = writer.min_update_index();
        let max = writer.max_update_index();
        if min < next_update_index {
            return Err(Error::Api(format!(
                "table's min update index {min} precedes the stack's next update index {next_update_index}"
            )));
        }
        writer.close()?;

        let new_name = format_name(min, max)?;
        let new_path = self.dir.join(&new_name);
        fs::rename(&temp_path, &new_path)?;
        temp_guard.disarm();

        let mut names: Vec<String> = self.merged.readers().iter().map(|r| r.name().to_string()).collect();
        names.push(new_name);
        fs::write(&lock_path, render_list(&names))?;
        fs::rename(&lock_path, &self.list_file)?;
        lock_guard.disarm();

        self.reload()
    }

    /// Runs `stack_compact_range`'s size-tiered suggestion and compacts it if
    /// non-trivial. A no-op if nothing is worth compacting.
    pub fn auto_compact(&mut self) -> Result<(), Error> {
        let sizes: Vec<u64> = self
            .merged
            .readers()
            .iter()
            // Per-table overhead (24 + 68 bytes) excluded before segmenting,
            // so near-empty tables don't distort the size-tier buckets.
            .map(|r| r.size().saturating_sub(91))
            .collect();
        let segment = crate::planner::suggest_compaction_segment(&sizes);
        if segment.size() > 0 {
            return self.compact_range_stats(segment.start, segment.end - 1);
        }
        Ok(())
    }

    /// Compacts every table on the stack into one.
    pub fn compact_all(&mut self) -> Result<(), Error> {
        if self.merged.readers().is_empty() {
            return Ok(());
        }
        self.compact_range(0, self.merged.readers().len() - 1)
    }

    fn compact_range_stats(&mut self, first: usize, last: usize) -> Result<(), Error> {
        match self.compact_range(first, last) {
            Err(Error::Retry) => {
                self.stats.failures += 1;
                Ok(())
            }
            other => other,
        }
    }

    /// Merges tables `[first, last]` (inclusive, by current stack position)
    /// into one new table and commits the result, or returns `Error::Retry`
    /// if a concurrent writer or compactor holds a lock this call needs.
    pub fn compact_range(&mut self, first: usize, last: usize) -> Result<(), Error> {
        if first >= last {
            return Ok(());
        }
        self.stats.attempts += 1;

        let lock_path = self.lock_path();
        create_lock(&lock_path)?;
        let mut list_lock_held = true;

        let result = self.compact_range_locked(first, last, &lock_path, &mut list_lock_held);

        // The list lock is released mid-merge and reacquired for the commit
        // (see `compact_range_locked`); only remove it here if that sequence
        // left it held when we bail out.
        if list_lock_held {
            let _ = fs::remove_file(&lock_path);
        }

        result
    }

    fn compact_range_locked(
        &mut self,
        first: usize,
        last: usize,
        lock_path: &Path,
        list_lock_held: &mut bool,
    ) -> Result<(), Error> {
        self.uptodate()?;

        let names: Vec<String> = self.merged.readers().iter().map(|r| r.name().to_string()).collect();
        let mut subtable_locks = Vec::with_capacity(last - first + 1);
        for name in &names[first..=last] {
            let lock = self.dir.join(format!("{name}.lock"));
            match create_lock(&lock) {
                Ok(_file) => subtable_locks.push(lock),
                Err(e) => {
                    for l in &subtable_locks {
                        let _ = fs::remove_file(l);
                    }
                    return Err(e);
                }
            }
        }

        // Release the list lock while the (potentially slow) merge-write
        // runs, so appenders aren't blocked on compaction.
        fs::remove_file(lock_path)?;
        *list_lock_held = false;

        let write_result = self.write_compacted(first, last);

        let cleanup = |locks: &[PathBuf]| {
            for l in locks {
                let _ = fs::remove_file(l);
            }
        };

        let temp_path = match write_result {
            Ok(path) => path,
            Err(e) => {
                cleanup(&subtable_locks);
                return Err(e);
            }
        };

        if let Err(e) = create_lock(lock_path) {
            let _ = fs::remove_file(&temp_path);
            cleanup(&subtable_locks);
            return Err(e);
        }
        *list_lock_held = true;

        let new_name = match format_name(
            self.merged.readers()[first].min_update_index(),
            self.merged.readers()[last].max_update_index(),
        ) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                cleanup(&subtable_locks);
                return Err(e);
            }
        };
        let new_path = self.dir.join(&new_name);

        if let Err(e) = fs::rename(&temp_path, &new_path) {
            cleanup(&subtable_locks);
            return Err(e.into());
        }

        let mut new_list = Vec::with_capacity(names.len() - (last - first));
        new_list.extend_from_slice(&names[..first]);
        new_list.push(new_name.clone());
        new_list.extend_from_slice(&names[last + 1..]);

        if let Err(e) = fs::write(lock_path, render_list(&new_list)) {
            let _ = fs::remove_file(&new_path);
            cleanup(&subtable_locks);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(lock_path, &self.list_file) {
            let _ = fs::remove_file(&new_path);
            cleanup(&subtable_locks);
            return Err(e.into());
        }
        *list_lock_held = false;

        for name in &names[first..=last] {
            let _ = fs::remove_file(self.dir.join(name));
        }
        cleanup(&subtable_locks);

        tracing::info!(first, last, new_table = %new_name, "compacted tables");
        self.reload()
    }

    fn write_compacted(&mut self, first: usize, last: usize) -> Result<PathBuf, Error> {
        let readers = self.merged.readers();
        let stem = format_name(readers[first].min_update_index(), readers[first].min_update_index())?;
        let temp_path = self.dir.join(format!("{}{}", stem.trim_end_matches(".ref"), temp_suffix()));
        let mut guard = TempFileGuard::new(temp_path.clone());

        let min = readers[first].min_update_index();
        let max = readers[last].max_update_index();
        for r in &readers[first..=last] {
            self.stats.bytes += r.size();
        }

        let file = File::create(&temp_path)?;
        let mut writer = Writer::new(file, self.opts.write_options);
        writer.set_limits(min, max);

        let mut iter = self.merged.seek_range_for_compaction(first, last, first == 0);
        while let Some(record) = iter.next() {
            match record {
                reftable_table::Record::Ref(r) => writer.add_ref(r)?,
                reftable_table::Record::Log(l) => writer.add_log(l)?,
            }
        }
        writer.close()?;

        guard.disarm();
        Ok(temp_path)
    }
}

fn temp_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..6)
        .map(|_| ALPHABET[rand::random::<usize>() % ALPHABET.len()] as char)
        .collect()
}
