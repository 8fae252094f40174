//! # Range Set
//!
//! Sorted, coalescing set of half-open address intervals.
//!
//! The walker keeps two of these per walk: a *visited* set recording every
//! backing range already explored, and an *exclude* set covering its own
//! stack frames. Insertion reports whether anything new was added, which is
//! what makes the capability walk converge: a range that is already fully
//! covered is never explored again.
//!
//! There is no removal. The modelled address space is treated as stable for
//! the duration of one walk, and the sets are discarded when it ends.

use std::fmt;

use crate::types::Address;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range
{
    /// First address in the range
    pub start: Address,
    /// One past the last address in the range
    pub end: Address,
}

impl Range
{
    /// Build a range.
    pub const fn new(start: Address, end: Address) -> Self
    {
        Self { start, end }
    }

    /// `start <= address < end`
    pub fn contains(&self, address: Address) -> bool
    {
        self.start <= address && address < self.end
    }

    /// Whether `[start, end)` lies entirely within this range.
    pub fn covers(&self, start: Address, end: Address) -> bool
    {
        self.start <= start && end <= self.end
    }

    /// Length in bytes.
    pub fn len(&self) -> u64
    {
        self.end.offset_from(self.start)
    }

    /// Whether the range holds no addresses.
    pub fn is_empty(&self) -> bool
    {
        self.end <= self.start
    }
}

impl fmt::Display for Range
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:x}-{:x}", self.start, self.end)
    }
}

/// Ordered, non-overlapping set of [`Range`]s, merged on insert.
///
/// ## Example
///
/// ```rust
/// use capscope_core::range_set::RangeSet;
/// use capscope_core::types::Address;
///
/// let mut set = RangeSet::new(16);
/// assert!(set.add(Address::new(10), Address::new(20)));
/// assert!(set.add(Address::new(15), Address::new(25)));
/// assert!(set.add(Address::new(5), Address::new(12)));
/// assert_eq!(set.len(), 1);
///
/// // Already covered: nothing changes
/// assert!(!set.add(Address::new(6), Address::new(24)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RangeSet
{
    ranges: Vec<Range>,
}

impl RangeSet
{
    /// Create an empty set, reserving room for `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self
    {
        Self {
            ranges: Vec::with_capacity(capacity),
        }
    }

    /// Insert `[start, end)`.
    ///
    /// Returns `false` (and changes nothing) when the range is empty or a
    /// single existing entry already covers it. Otherwise the range is merged
    /// with every entry it overlaps or touches and `true` is returned.
    pub fn add(&mut self, start: Address, end: Address) -> bool
    {
        if end <= start {
            return false;
        }

        // First entry that could overlap or touch the new range
        let first = self.ranges.partition_point(|range| range.end < start);

        if let Some(range) = self.ranges.get(first) {
            if range.covers(start, end) {
                return false;
            }
        }

        let last = first + self.ranges[first..].partition_point(|range| range.start <= end);
        if last == first {
            self.ranges.insert(first, Range::new(start, end));
            return true;
        }

        let merged = Range::new(
            start.min(self.ranges[first].start),
            end.max(self.ranges[last - 1].end),
        );
        self.ranges[first] = merged;
        self.ranges.drain(first + 1..last);
        true
    }

    /// The entry containing `address`, if any.
    pub fn find(&self, address: Address) -> Option<Range>
    {
        let index = self.ranges.partition_point(|range| range.end <= address);
        self.ranges.get(index).copied().filter(|range| range.contains(address))
    }

    /// Whether `[start, end)` lies entirely inside one entry.
    pub fn covers(&self, start: Address, end: Address) -> bool
    {
        self.find(start).is_some_and(|range| range.covers(start, end))
    }

    /// Number of disjoint entries.
    pub fn len(&self) -> usize
    {
        self.ranges.len()
    }

    /// Whether the set holds no entries.
    pub fn is_empty(&self) -> bool
    {
        self.ranges.is_empty()
    }

    /// Drop every entry, keeping the allocation.
    pub fn reset(&mut self)
    {
        self.ranges.clear();
    }

    /// Entries in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Range>
    {
        self.ranges.iter()
    }

    /// Entries as a slice.
    pub fn as_slice(&self) -> &[Range]
    {
        &self.ranges
    }
}

impl<'a> IntoIterator for &'a RangeSet
{
    type Item = &'a Range;
    type IntoIter = std::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.ranges.iter()
    }
}

impl fmt::Display for RangeSet
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        writeln!(f, "Range set with {} entries:", self.ranges.len())?;
        for range in &self.ranges {
            writeln!(f, "{range}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn set_of(entries: &[(u64, u64)]) -> RangeSet
    {
        let mut set = RangeSet::new(entries.len());
        for &(start, end) in entries {
            set.add(Address::new(start), Address::new(end));
        }
        set
    }

    fn pairs(set: &RangeSet) -> Vec<(u64, u64)>
    {
        set.iter().map(|r| (r.start.value(), r.end.value())).collect()
    }

    #[test]
    fn test_disjoint_entries_stay_sorted()
    {
        let set = set_of(&[(50, 60), (10, 20), (30, 40)]);
        assert_eq!(pairs(&set), vec![(10, 20), (30, 40), (50, 60)]);
    }

    #[test]
    fn test_adjacent_entries_coalesce()
    {
        let set = set_of(&[(10, 20), (20, 30)]);
        assert_eq!(pairs(&set), vec![(10, 30)]);
    }

    #[test]
    fn test_bridging_insert_swallows_several_entries()
    {
        let mut set = set_of(&[(10, 20), (30, 40), (50, 60), (70, 80)]);
        assert!(set.add(Address::new(15), Address::new(55)));
        assert_eq!(pairs(&set), vec![(10, 60), (70, 80)]);
    }

    #[test]
    fn test_covered_insert_is_rejected()
    {
        let mut set = set_of(&[(10, 40)]);
        assert!(!set.add(Address::new(10), Address::new(40)));
        assert!(!set.add(Address::new(12), Address::new(13)));
        assert_eq!(pairs(&set), vec![(10, 40)]);
    }

    #[test]
    fn test_range_spanning_two_entries_is_not_covered()
    {
        let mut set = set_of(&[(10, 20), (30, 40)]);
        assert!(set.add(Address::new(15), Address::new(35)));
        assert_eq!(pairs(&set), vec![(10, 40)]);
    }

    #[test]
    fn test_empty_range_is_never_stored()
    {
        let mut set = set_of(&[(10, 20)]);
        assert!(!set.add(Address::new(50), Address::new(50)));
        assert!(!set.add(Address::new(60), Address::new(55)));
        assert!(!set.add(Address::new(20), Address::new(20)));
        assert_eq!(pairs(&set), vec![(10, 20)]);
    }

    #[test]
    fn test_find_uses_half_open_bounds()
    {
        let set = set_of(&[(10, 20)]);
        assert_eq!(set.find(Address::new(10)), Some(Range::new(Address::new(10), Address::new(20))));
        assert_eq!(set.find(Address::new(19)).map(|r| r.end), Some(Address::new(20)));
        assert_eq!(set.find(Address::new(20)), None);
        assert_eq!(set.find(Address::new(9)), None);
    }

    #[test]
    fn test_reset_empties_the_set()
    {
        let mut set = set_of(&[(10, 20)]);
        set.reset();
        assert!(set.is_empty());
        assert!(set.add(Address::new(10), Address::new(20)));
    }

    #[test]
    fn test_display_lists_entries()
    {
        let set = set_of(&[(0x10, 0x20)]);
        assert_eq!(set.to_string(), "Range set with 1 entries:\n10-20\n");
    }
}
