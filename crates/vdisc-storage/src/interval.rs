/// Half-open byte range `[start, end)` over 64-bit offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    /// Create an interval; `end` is clamped up to `start`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// The interval `[off, off + len)`, saturating at `u64::MAX`.
    pub fn at(off: u64, len: u64) -> Self {
        Self::new(off, off.saturating_add(len))
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, off: u64) -> bool {
        self.start <= off && off < self.end
    }

    /// The intersection of two intervals, or `None` if they do not overlap.
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Interval { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn overlapping() {
        let a = Interval::new(0, 10);
        let b = Interval::new(5, 15);
        assert_eq!(a.intersection(&b), Some(Interval::new(5, 10)));
        assert_eq!(b.intersection(&a), Some(Interval::new(5, 10)));
    }

    #[test]
    fn adjacent_does_not_intersect() {
        let a = Interval::new(0, 10);
        let b = Interval::new(10, 20);
        assert_eq!(a.intersection(&b), None);
    }

    #[test]
    fn contained() {
        let outer = Interval::new(0, 100);
        let inner = Interval::new(40, 60);
        assert_eq!(outer.intersection(&inner), Some(inner));
    }

    #[test]
    fn empty_never_intersects() {
        let e = Interval::at(5, 0);
        assert!(e.is_empty());
        assert_eq!(e.intersection(&Interval::new(0, 10)), None);
    }

    #[test]
    fn at_saturates() {
        let i = Interval::at(u64::MAX - 1, 10);
        assert_eq!(i.end, u64::MAX);
        assert_eq!(i.len(), 1);
    }

    proptest! {
        #[test]
        fn matches_set_intersection(
            a in 0u64..200, alen in 0u64..100,
            b in 0u64..200, blen in 0u64..100,
        ) {
            let x = Interval::at(a, alen);
            let y = Interval::at(b, blen);
            let expected: Vec<u64> = (x.start..x.end).filter(|o| y.contains(*o)).collect();
            match x.intersection(&y) {
                Some(i) => prop_assert_eq!((i.start..i.end).collect::<Vec<_>>(), expected),
                None => prop_assert!(expected.is_empty()),
            }
        }
    }
}
