/// A ref database entry: a name mapped to a target object id, with optional
/// peeled id and symbolic target.
///
/// A record whose `value`, `target_value`, and `target` are all `None`
/// represents a deletion of `ref_name` as of `update_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRecord {
    /// Name of the ref, e.g. `refs/heads/main`.
    pub ref_name: String,
    /// Logical timestamp at which this value was written.
    pub update_index: u64,
    /// Target object id, or `None` for a deletion/symref-only record.
    pub value: Option<Vec<u8>>,
    /// Peeled id of an annotated tag, if any.
    pub target_value: Option<Vec<u8>>,
    /// Symbolic ref target, if `ref_name` is a symref.
    pub target: Option<String>,
}

impl RefRecord {
    /// A record is a deletion iff every payload field is empty.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.value.is_none() && self.target_value.is_none() && self.target.is_none()
    }

    /// Builds a deletion record for `ref_name` at `update_index`.
    #[must_use]
    pub fn deletion(ref_name: impl Into<String>, update_index: u64) -> Self {
        Self {
            ref_name: ref_name.into(),
            update_index,
            value: None,
            target_value: None,
            target: None,
        }
    }
}

/// A single reflog entry for `ref_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub ref_name: String,
    pub update_index: u64,
    pub new_hash: Option<String>,
    pub old_hash: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub time: u64,
    pub tz_offset: u64,
    pub message: Option<String>,
}

/// The tagged payload a table record carries: either a ref record or a log
/// record, both keyed by `ref_name` for sorting and seeking purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Ref(RefRecord),
    Log(LogRecord),
}

impl Record {
    /// The sort key used by the priority-queue iterator and by seek.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Record::Ref(r) => &r.ref_name,
            Record::Log(l) => &l.ref_name,
        }
    }

    #[must_use]
    pub fn update_index(&self) -> u64 {
        match self {
            Record::Ref(r) => r.update_index,
            Record::Log(l) => l.update_index,
        }
    }

    /// Whether this record is a deletion. Log records are never deletions.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        match self {
            Record::Ref(r) => r.is_deletion(),
            Record::Log(_) => false,
        }
    }
}
