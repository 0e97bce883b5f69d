//! # reftable-table
//!
//! The on-disk table format the stack manager stores its data in: a sorted,
//! immutable file of ref and log records with a small in-memory-loaded index
//! and a CRC-checked footer.
//!
//! This crate owns record encoding and the writer/reader contract consumed
//! by the stack manager. It knows nothing about the list file, locking, or
//! compaction — those live in `reftable-stack`.

mod error;
mod format;
mod reader;
mod record;
mod writer;

pub use error::Error;
pub use format::MAGIC;
pub use reader::{Reader, TableIter};
pub use record::{LogRecord, Record, RefRecord};
pub use writer::Writer;
