use thiserror::Error;

/// The stack manager's error taxonomy.
///
/// Every fallible stack operation returns this type rather than `anyhow::Error`
/// so callers can branch on `Lock`/`Retry`/`NotExist` — the three variants
/// that carry a well-defined recovery path (reload-and-retry, or just retry).
#[derive(Debug, Error)]
pub enum Error {
    /// Unexpected failure of a file-system primitive.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A table or list file violates the format contract.
    #[error("format error: {0}")]
    Format(String),

    /// A file the list references is missing. Triggers the reload retry loop;
    /// fatal only once the list file confirms the reference is stable.
    #[error("not found: {0}")]
    NotExist(String),

    /// A concurrent writer holds the list lock, a sub-table lock, or the
    /// in-memory view is stale relative to the on-disk list.
    #[error("lock contention: {0}")]
    Lock(String),

    /// Caller violated an ordering or range contract. Programming error, no
    /// recovery.
    #[error("api misuse: {0}")]
    Api(String),

    /// Compaction-specific: a sub-table lock was already held by another
    /// compactor. Unlike `Lock`, the caller owes no reload — the same
    /// `compact_range` call may simply be retried later.
    #[error("compaction contention, retry")]
    Retry,
}

impl Error {
    /// The exit-visible integer code for this error, per the external
    /// contract. `Retry` has no negative code of its own — it is a positive,
    /// caller-visible "try again" signal, never confused with a fatal error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Error::Io(_) => -2,
            Error::Format(_) => -3,
            Error::NotExist(_) => -4,
            Error::Lock(_) => -5,
            Error::Api(_) => -6,
            Error::Retry => 1,
        }
    }
}

impl From<&Error> for i32 {
    fn from(e: &Error) -> i32 {
        e.code()
    }
}

impl From<reftable_table::Error> for Error {
    fn from(e: reftable_table::Error) -> Self {
        match e {
            reftable_table::Error::Io(io) => Error::Io(io),
            reftable_table::Error::Format(s) => Error::Format(s),
            reftable_table::Error::Api(s) => Error::Api(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_external_contract() {
        assert_eq!(Error::Io(std::io::Error::from(std::io::ErrorKind::Other)).code(), -2);
        assert_eq!(Error::Format(String::new()).code(), -3);
        assert_eq!(Error::NotExist(String::new()).code(), -4);
        assert_eq!(Error::Lock(String::new()).code(), -5);
        assert_eq!(Error::Api(String::new()).code(), -6);
        assert_eq!(Error::Retry.code(), 1);
    }
}
