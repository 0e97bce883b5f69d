//! Table file naming: `<min>-<max>.ref`, 12 lowercase hex digits each.

use crate::error::Error;

/// Update indices must fit in the 12-hex-digit field, i.e. be below `2^48`.
const MAX_UPDATE_INDEX: u64 = 1 << 48;

/// Formats a table file name for the `[min, max]` update-index range.
///
/// Returns `Error::Api` rather than silently truncating when `min` or `max`
/// is too large to fit the fixed-width field (see the design notes on
/// `format_name`'s original fixed-width overflow).
pub fn format_name(min: u64, max: u64) -> Result<String, Error> {
    if min >= MAX_UPDATE_INDEX || max >= MAX_UPDATE_INDEX {
        return Err(Error::Api(format!(
            "update index out of range for table name: min={min}, max={max}"
        )));
    }
    Ok(format!("{min:012x}-{max:012x}.ref"))
}

/// Parses a table file name produced by [`format_name`], returning
/// `(min, max)`. Returns `None` for anything that doesn't match the
/// `<12 hex>-<12 hex>.ref` shape (including lock files and temp names).
#[must_use]
pub fn parse_name(name: &str) -> Option<(u64, u64)> {
    let stem = name.strip_suffix(".ref")?;
    let (min_s, max_s) = stem.split_once('-')?;
    if min_s.len() != 12 || max_s.len() != 12 {
        return None;
    }
    let min = u64::from_str_radix(min_s, 16).ok()?;
    let max = u64::from_str_radix(max_s, 16).ok()?;
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_and_parses_round_trip() {
        let name = format_name(1, 1).unwrap();
        assert_eq!(name, "000000000001-000000000001.ref");
        assert_eq!(parse_name(&name), Some((1, 1)));
    }

    #[test]
    fn rejects_update_index_above_2_48() {
        let err = format_name(0, 1u64 << 48).unwrap_err();
        assert!(matches!(err, Error::Api(_)));
    }

    #[test]
    fn parse_rejects_non_table_names() {
        assert_eq!(parse_name("list.lock"), None);
        assert_eq!(parse_name("000000000001-000000000001.ref.lock"), None);
    }
}
