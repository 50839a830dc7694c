use core::ops::Range;
use serde::{Deserialize, Serialize};
use crate::int_vect::IntVect;




#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]


/**
 * Represents a rectangular region in a discrete index space: the "box" of
 * block-structured AMR. The lower corner is inclusive and the upper corner is
 * exclusive, so the last cell on axis `d` is `end[d] - 1`. The space is empty
 * if `end[d] <= start[d]` on any axis; empty spaces are only produced by
 * `IndexSpace::empty` and are never stored in a `BoxSet`.
 */
pub struct IndexSpace<const D: usize> {
    start: IntVect<D>,
    end: IntVect<D>,
}




// ============================================================================
impl<const D: usize> IndexSpace<D> {


    pub fn new<S: Into<IntVect<D>>, E: Into<IntVect<D>>>(start: S, end: E) -> Self {
        let start = start.into();
        let end = end.into();

        assert!(
            (0..D).all(|d| start[d] <= end[d]),
            "index space has negative volume: {:?} .. {:?}", start, end);

        Self { start, end }
    }


    /**
     * Return an index space containing no cells.
     */
    pub fn empty() -> Self {
        Self { start: IntVect::zero(), end: IntVect::zero() }
    }


    /**
     * Return the index space of the given shape, starting at the origin.
     */
    pub fn from_shape<S: Into<IntVect<D>>>(shape: S) -> Self {
        Self::new(IntVect::zero(), shape.into())
    }


    /**
     * Return the index space containing just the given cell.
     */
    pub fn from_cell(index: IntVect<D>) -> Self {
        Self::new(index, index + IntVect::splat(1))
    }


    /**
     * Return the minimum index (inclusive).
     */
    pub fn start(&self) -> IntVect<D> {
        self.start
    }


    /**
     * Return the maximum index (exclusive).
     */
    pub fn end(&self) -> IntVect<D> {
        self.end
    }


    /**
     * Return the index range on the given axis.
     */
    pub fn range(&self, axis: usize) -> Range<i64> {
        self.start[axis]..self.end[axis]
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dim(&self) -> IntVect<D> {
        (self.end - self.start).map(|n| n.max(0))
    }


    /**
     * Return the number of elements in this index space.
     */
    pub fn len(&self) -> usize {
        self.dim().product() as usize
    }


    pub fn is_empty(&self) -> bool {
        (0..D).any(|d| self.end[d] <= self.start[d])
    }


    /**
     * Return the axis with the most indexes. Ties go to the lowest axis.
     */
    pub fn longest_axis(&self) -> usize {
        let dim = self.dim();
        (0..D).fold(0, |best, d| if dim[d] > dim[best] { d } else { best })
    }


    /**
     * Determine whether this index space contains the given index.
     */
    pub fn contains(&self, index: IntVect<D>) -> bool {
        (0..D).all(|d| self.start[d] <= index[d] && index[d] < self.end[d])
    }


    /**
     * Determine whether another index space is a subset of this one. The
     * empty space is a subset of everything.
     */
    pub fn contains_space(&self, other: &Self) -> bool {
        other.is_empty() || (0..D).all(|d| other.start[d] >= self.start[d] && other.end[d] <= self.end[d])
    }


    /**
     * Determine whether the two index spaces share at least one index.
     */
    pub fn intersects(&self, other: &Self) -> bool {
        (0..D).all(|d| self.start[d].max(other.start[d]) < self.end[d].min(other.end[d]))
    }


    /**
     * Return the overlap of two index spaces, or `None` if they are disjoint.
     */
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.intersects(other) {
            Some(Self {
                start: self.start.zip_map(other.start, i64::max),
                end: self.end.zip_map(other.end, i64::min),
            })
        } else {
            None
        }
    }


    /**
     * Return the smallest index space containing both of these. An empty
     * operand is ignored.
     */
    pub fn bounding_union(&self, other: &Self) -> Self {
        if self.is_empty() {
            *other
        } else if other.is_empty() {
            *self
        } else {
            Self {
                start: self.start.zip_map(other.start, i64::min),
                end: self.end.zip_map(other.end, i64::max),
            }
        }
    }


    /**
     * Expand this index space by the given number of elements on each axis.
     */
    pub fn extend_all(&self, delta: i64) -> Self {
        self.extend(IntVect::splat(delta))
    }


    /**
     * Expand this index space by a different number of elements on each axis.
     */
    pub fn extend(&self, delta: IntVect<D>) -> Self {
        Self::new(self.start - delta, self.end + delta)
    }


    /**
     * Trim this index space by the given number of elements on each axis.
     */
    pub fn trim_all(&self, delta: i64) -> Self {
        self.extend_all(-delta)
    }


    /**
     * Increase the size of this index space by the given factor on each axis:
     * the cells of a refined level covering the same region.
     */
    pub fn scale(&self, factor: IntVect<D>) -> Self {
        assert!(factor.all_positive(), "refinement ratio must be positive: {:?}", factor);
        Self::new(self.start * factor, self.end * factor)
    }


    /**
     * Return the cells of a coarser level which touch any cell of this index
     * space. The lower corner is floored and the upper corner ceiled, so the
     * result always covers the original.
     */
    pub fn coarsen(&self, ratio: IntVect<D>) -> Self {
        assert!(ratio.all_positive(), "coarsening ratio must be positive: {:?}", ratio);

        if self.is_empty() {
            return *self;
        }
        let start = self.start.div_floor(ratio);
        let end = (self.end - IntVect::splat(1)).div_floor(ratio) + IntVect::splat(1);
        Self::new(start, end)
    }


    /**
     * Translate this index space by the given offset.
     */
    pub fn shift(&self, offset: IntVect<D>) -> Self {
        Self { start: self.start + offset, end: self.end + offset }
    }


    /**
     * Split this index space into a lower and upper part at the given index on
     * the given axis. The index becomes the first index of the upper part.
     */
    pub fn split_at(&self, axis: usize, index: i64) -> (Self, Self) {
        assert!(
            self.start[axis] < index && index < self.end[axis],
            "split index {} is not interior to {:?} on axis {}", index, self.range(axis), axis);

        let mut lower = *self;
        let mut upper = *self;
        lower.end[axis] = index;
        upper.start[axis] = index;
        (lower, upper)
    }


    /**
     * Expand this index space outward so both corners are multiples of the
     * blocking factor.
     */
    pub fn snap_outward(&self, blocking_factor: IntVect<D>) -> Self {
        if self.is_empty() {
            return *self;
        }
        self.coarsen(blocking_factor).scale(blocking_factor)
    }


    /**
     * Determine whether both corners are multiples of the blocking factor.
     */
    pub fn is_aligned(&self, blocking_factor: IntVect<D>) -> bool {
        (0..D).all(|d| self.start[d] % blocking_factor[d] == 0 && self.end[d] % blocking_factor[d] == 0)
    }


    /**
     * Return the linear offset for the given index, in a row-major memory
     * buffer aligned with the start of this index space.
     */
    pub fn row_major_offset(&self, index: IntVect<D>) -> usize {
        let dim = self.dim();
        let mut offset = 0;

        for d in 0..D {
            offset = offset * dim[d] + (index[d] - self.start[d]);
        }
        offset as usize
    }


    /**
     * Return an iterator which traverses the index space in row-major order
     * (C-like; the final index increases fastest).
     */
    pub fn iter(&self) -> impl Iterator<Item = IntVect<D>> + '_ {
        let n = if self.is_empty() { 0 } else { self.len() };
        let dim = self.dim();
        let start = self.start;

        (0..n).map(move |mut k| {
            let mut index = start;
            for d in (0..D).rev() {
                let m = dim[d] as usize;
                index[d] += (k % m) as i64;
                k /= m;
            }
            index
        })
    }
}




// ============================================================================
impl From<(Range<i64>, Range<i64>)> for IndexSpace<2> {
    fn from(range: (Range<i64>, Range<i64>)) -> Self {
        Self::new([range.0.start, range.1.start], [range.0.end, range.1.end])
    }
}

impl<'a> From<(&'a Range<i64>, &'a Range<i64>)> for IndexSpace<2> {
    fn from(range: (&'a Range<i64>, &'a Range<i64>)) -> Self {
        Self::new([range.0.start, range.1.start], [range.0.end, range.1.end])
    }
}

impl From<IndexSpace<2>> for (Range<i64>, Range<i64>) {
    fn from(space: IndexSpace<2>) -> Self {
        (space.range(0), space.range(1))
    }
}




/**
 * Less imposing factory function to construct a 2D IndexSpace object.
 */
pub fn range2d(di: Range<i64>, dj: Range<i64>) -> IndexSpace<2> {
    IndexSpace::from((di, dj))
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{IndexSpace, range2d};
    use crate::int_vect::IntVect;

    #[test]
    fn row_major_iteration_visits_every_index_once() {
        let space = range2d(2..5, -1..3);
        let indexes: Vec<_> = space.iter().collect();
        assert_eq!(indexes.len(), 12);
        assert_eq!(indexes[0], IntVect::new([2, -1]));
        assert_eq!(indexes[1], IntVect::new([2, 0]));
        assert_eq!(indexes[11], IntVect::new([4, 2]));

        for (n, index) in space.iter().enumerate() {
            assert_eq!(space.row_major_offset(index), n);
        }
    }

    #[test]
    fn coarsen_covers_the_original() {
        let space = range2d(-3..9, 5..6);
        let coarse = space.coarsen(IntVect::splat(4));
        assert_eq!(coarse, range2d(-1..3, 1..2));
        assert!(coarse.scale(IntVect::splat(4)).contains_space(&space));
    }

    #[test]
    fn snap_outward_aligns_both_corners() {
        let space = range2d(58..63, 58..63);
        let snapped = space.snap_outward(IntVect::splat(8));
        assert_eq!(snapped, range2d(56..64, 56..64));
        assert!(snapped.is_aligned(IntVect::splat(8)));
        assert!(range2d(56..64, 0..16).is_aligned(IntVect::splat(8)));
        assert!(!space.is_aligned(IntVect::splat(8)));
    }

    #[test]
    fn intersection_and_split_work() {
        let a = range2d(0..10, 0..10);
        let b = range2d(5..15, 8..20);
        assert_eq!(a.intersect(&b), Some(range2d(5..10, 8..10)));
        assert_eq!(a.intersect(&range2d(10..12, 0..10)), None);

        let (lo, hi) = a.split_at(1, 4);
        assert_eq!(lo, range2d(0..10, 0..4));
        assert_eq!(hi, range2d(0..10, 4..10));
        assert_eq!(lo.len() + hi.len(), a.len());
    }

    #[test]
    fn three_dimensional_spaces_work() {
        let space = IndexSpace::new([0, 0, 0], [2, 3, 4]);
        assert_eq!(space.len(), 24);
        assert_eq!(space.longest_axis(), 2);
        assert_eq!(space.iter().count(), 24);
        assert!(space.extend_all(1).contains_space(&space));
        assert_eq!(space.extend_all(1).trim_all(1), space);
    }

    #[test]
    #[should_panic]
    fn negative_volume_is_rejected() {
        IndexSpace::new([0, 4], [2, 3]);
    }
}
