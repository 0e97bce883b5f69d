//! Size-tiered compaction planner: picks the contiguous range of tables to
//! merge next, from a vector of table payload byte-sizes.

/// A contiguous run of tables sharing (approximately) the same size
/// magnitude, a candidate for compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub log: u32,
    pub bytes: u64,
}

impl Segment {
    /// Number of tables spanned. `<= 1` means "nothing worth doing".
    #[must_use]
    pub fn size(&self) -> usize {
        self.end - self.start
    }
}

/// `floor(log2(sz))`, with `sz == 0` treated as the smallest bucket (`0`)
/// rather than undefined — auto-compaction's overhead-adjusted sizes
/// (`size - 91`) legitimately hit zero for near-empty tables.
#[must_use]
pub fn fastlog2(sz: u64) -> u32 {
    if sz == 0 {
        return 0;
    }
    63 - sz.leading_zeros()
}

/// Partitions `sizes` into maximal runs of equal `fastlog2(size)`.
fn sizes_to_segments(sizes: &[u64]) -> Vec<Segment> {
    let mut segs = Vec::new();
    let mut cur = Segment::default();
    for (i, &size) in sizes.iter().enumerate() {
        let log = fastlog2(size);
        if cur.log != log && cur.bytes > 0 {
            segs.push(cur);
            cur = Segment {
                start: i,
                ..Segment::default()
            };
        }
        cur.log = log;
        cur.end = i + 1;
        cur.bytes += size;
    }
    segs.push(cur);
    segs
}

/// Picks the non-singleton segment with the smallest `log`, then extends it
/// leftward while the predecessor's magnitude doesn't exceed the segment's.
///
/// Returns a zero-length segment (`start == end`) if `sizes` is empty or
/// every table is its own singleton segment — "nothing worth doing".
#[must_use]
pub fn suggest_compaction_segment(sizes: &[u64]) -> Segment {
    if sizes.is_empty() {
        return Segment::default();
    }

    let segs = sizes_to_segments(sizes);
    let mut min_seg = Segment {
        log: 64,
        ..Segment::default()
    };
    for seg in &segs {
        if seg.size() == 1 {
            continue;
        }
        if seg.log < min_seg.log {
            min_seg = *seg;
        }
    }

    if min_seg.log == 64 {
        // No non-singleton segment found; report "nothing to do" rather
        // than the 64-sentinel value.
        return Segment::default();
    }

    while min_seg.start > 0 {
        let prev = min_seg.start - 1;
        if fastlog2(min_seg.bytes) < fastlog2(sizes[prev]) {
            break;
        }
        min_seg.start = prev;
        min_seg.bytes += sizes[prev];
    }

    min_seg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fastlog2_matches_bit_length_minus_one() {
        assert_eq!(fastlog2(1), 0);
        assert_eq!(fastlog2(2), 1);
        assert_eq!(fastlog2(100), 6);
        assert_eq!(fastlog2(1_000_000), 19);
    }

    #[test]
    fn empty_input_yields_zero_length_segment() {
        let seg = suggest_compaction_segment(&[]);
        assert_eq!(seg.size(), 0);
    }

    #[test]
    fn all_singletons_yield_zero_length_segment() {
        // Strictly increasing log2 magnitudes: each is its own segment of length 1.
        let seg = suggest_compaction_segment(&[1, 4, 64, 1024]);
        assert_eq!(seg.size(), 0);
    }

    #[test]
    fn selects_balanced_segment() {
        // S4: three equal-magnitude tables merge; the huge one stays alone.
        let seg = suggest_compaction_segment(&[100, 100, 100, 1_000_000]);
        assert_eq!(
            seg,
            Segment {
                start: 0,
                end: 3,
                log: 6,
                bytes: 300,
            }
        );
    }

    #[test]
    fn left_extends_into_smaller_predecessor() {
        // A size-50 predecessor (log 5) is absorbed into a log-6 segment
        // because 5 <= 6.
        let seg = suggest_compaction_segment(&[50, 100, 120]);
        assert_eq!(seg.start, 0);
        assert_eq!(seg.end, 3);
    }
}
