use thiserror::Error;

/// Errors produced by the table writer/reader.
///
/// This is a subset of the stack manager's error taxonomy: the table layer
/// never needs `NotExist`, `Lock`, or `Retry` since it knows nothing about
/// the list file or lock protocol that give those errors meaning.
#[derive(Debug, Error)]
pub enum Error {
    /// Unexpected failure of a file-system primitive.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not conform to the table format (bad magic, truncated
    /// section, CRC mismatch, index pointing outside the file).
    #[error("format error: {0}")]
    Format(String),

    /// Caller violated the writer's ordering or range contract.
    #[error("api misuse: {0}")]
    Api(String),
}

impl Error {
    /// The exit-visible integer code for this error, per the external contract.
    #[must_use]
    pub fn code(self: &Error) -> i32 {
        match self {
            Error::Io(_) => -2,
            Error::Format(_) => -3,
            Error::Api(_) => -6,
        }
    }
}

impl From<&Error> for i32 {
    fn from(e: &Error) -> i32 {
        e.code()
    }
}
