//! Extent store: an append-only, sortable list of (physical_offset, length)
//! pairs discovered during filesystem traversal.

/// A maximal contiguous run of physical blocks backing a region of a file.
///
/// Invariant: `length > 0`. Extents with zero length are never constructed;
/// callers that would produce one (e.g. a FIEMAP extent with `fe_length` of
/// zero) skip it instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub physical_offset: u64,
    pub length: u64,
}

impl Extent {
    pub fn new(physical_offset: u64, length: u64) -> Self {
        Self {
            physical_offset,
            length,
        }
    }

    pub fn end(&self) -> u64 {
        self.physical_offset + self.length
    }
}

/// Ordered sequence of extents with amortized-O(1) append and bulk sort.
///
/// Growth mirrors the C `extent_list_append`'s doubling strategy
/// (`original_source/disk-warmer/filesystem.c`): capacity starts at 16 and at
/// least doubles. `Vec` already gives us this; the struct exists to pin the
/// initial capacity and to host `merge_adjacent`.
#[derive(Debug, Default)]
pub struct ExtentStore {
    extents: Vec<Extent>,
}

const INITIAL_CAPACITY: usize = 16;

impl ExtentStore {
    pub fn new() -> Self {
        Self {
            extents: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn as_slice(&self) -> &[Extent] {
        &self.extents
    }

    /// Append a single extent. `length` of zero is a no-op — the spec's
    /// invariant is that every stored extent has positive length.
    pub fn append(&mut self, physical_offset: u64, length: u64) {
        if length == 0 {
            return;
        }
        self.extents.push(Extent::new(physical_offset, length));
    }

    /// Order by physical_offset ascending. Unstable is fine: the spec does
    /// not require tie-breaking among extents sharing an offset.
    pub fn sort(&mut self) {
        self.extents.sort_unstable_by_key(|e| e.physical_offset);
    }

    /// Coalesce adjacent extents in a single forward pass over the sorted
    /// list, capped so no merged extent exceeds `max_merge` bytes. A
    /// `max_merge` of 0 (or negative, in the C original's `long long`) means
    /// no cap.
    ///
    /// Returns the new extent count.
    pub fn merge_adjacent(&mut self, max_merge: i64) -> usize {
        if self.extents.is_empty() {
            return 0;
        }
        let mut write = 0usize;
        for read in 1..self.extents.len() {
            let (before, after) = self.extents.split_at_mut(read);
            let cur = &mut before[write];
            let next = after[0];
            let adjacent = cur.end() == next.physical_offset;
            let within_cap = max_merge <= 0 || (cur.length + next.length) as i64 <= max_merge;
            if adjacent && within_cap {
                cur.length += next.length;
            } else {
                write += 1;
                self.extents[write] = next;
            }
        }
        self.extents.truncate(write + 1);
        self.extents.len()
    }

    /// Total number of `stride`-sized reads phase 1 will issue across all
    /// extents: `Σ ⌈length_i / stride⌉` (spec §4.5).
    pub fn total_reads(&self, stride: u64) -> u64 {
        self.extents
            .iter()
            .map(|e| e.length.div_ceil(stride))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_skips_zero_length() {
        let mut s = ExtentStore::new();
        s.append(100, 0);
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn sort_orders_by_offset() {
        let mut s = ExtentStore::new();
        s.append(1_048_576, 524_288);
        s.append(524_288, 524_288);
        s.sort();
        assert_eq!(s.as_slice()[0].physical_offset, 524_288);
        assert_eq!(s.as_slice()[1].physical_offset, 1_048_576);
    }

    // E2 from spec §8
    #[test]
    fn merge_coalesces_adjacent_after_sort() {
        let mut s = ExtentStore::new();
        s.append(1_048_576, 524_288);
        s.append(524_288, 524_288);
        s.sort();
        let count = s.merge_adjacent(16 * 1024 * 1024);
        assert_eq!(count, 1);
        assert_eq!(s.as_slice()[0], Extent::new(524_288, 1_048_576));
    }

    // E3 from spec §8
    #[test]
    fn merge_respects_cap() {
        let mut s = ExtentStore::new();
        s.append(0, 512 * 1024);
        s.append(524_288, 512 * 1024);
        s.sort();
        let count = s.merge_adjacent(512 * 1024);
        assert_eq!(count, 2);
    }

    #[test]
    fn merge_uncapped_when_max_merge_non_positive() {
        let mut s = ExtentStore::new();
        s.append(0, 10);
        s.append(10, 10);
        s.sort();
        let count = s.merge_adjacent(0);
        assert_eq!(count, 1);
        assert_eq!(s.as_slice()[0].length, 20);
    }

    #[test]
    fn merge_preserves_total_bytes() {
        let mut s = ExtentStore::new();
        s.append(0, 100);
        s.append(100, 200);
        s.append(400, 50); // gap at 300 — not adjacent
        s.sort();
        let before: u64 = s.as_slice().iter().map(|e| e.length).sum();
        s.merge_adjacent(0);
        let after: u64 = s.as_slice().iter().map(|e| e.length).sum();
        assert_eq!(before, after);
    }

    // E1 from spec §8
    #[test]
    fn total_reads_matches_stride_math() {
        let mut s = ExtentStore::new();
        s.append(0, 1024 * 1024);
        assert_eq!(s.total_reads(512 * 1024), 2);
    }
}
