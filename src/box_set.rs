use std::sync::Arc;
use rayon::prelude::*;
use crate::index_space::IndexSpace;
use crate::int_vect::IntVect;




/**
 * An ordered collection of non-empty index spaces: the decomposition of one
 * refinement level. The storage is shared, so cloning a `BoxSet` is cheap and
 * an old decomposition stays valid while a new one is being prepared. Every
 * operation returns a new set; nothing is modified in place.
 *
 * Boxes in a level's decomposition are disjoint by convention. Operations
 * that can only be correct on disjoint input (`num_cells`, `covers` when
 * used as a volume argument) say so; `is_disjoint` checks it.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoxSet<const D: usize> {
    boxes: Arc<[IndexSpace<D>]>,
}




// ============================================================================
impl<const D: usize> BoxSet<D> {

    pub fn new() -> Self {
        Self { boxes: Arc::from(Vec::new()) }
    }

    /**
     * Build a set from the given boxes. Empty boxes are a contract violation.
     */
    pub fn from_boxes<I: IntoIterator<Item = IndexSpace<D>>>(boxes: I) -> Self {
        let boxes: Vec<_> = boxes.into_iter().collect();

        for b in &boxes {
            assert!(!b.is_empty(), "empty box {:?} in a box set", b);
        }
        Self { boxes: Arc::from(boxes) }
    }

    /**
     * Build a set from the given boxes, silently dropping empty ones.
     */
    fn from_nonempty<I: IntoIterator<Item = IndexSpace<D>>>(boxes: I) -> Self {
        Self::from_boxes(boxes.into_iter().filter(|b| !b.is_empty()))
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&IndexSpace<D>> {
        self.boxes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexSpace<D>> {
        self.boxes.iter()
    }

    pub fn as_slice(&self) -> &[IndexSpace<D>] {
        &self.boxes
    }

    /**
     * Return the total number of cells in the set. This counts overlapping
     * cells more than once.
     */
    pub fn num_cells(&self) -> usize {
        self.boxes.par_iter().map(|b| b.len()).sum()
    }

    /**
     * Return the smallest index space containing every box in the set.
     */
    pub fn minimal_box(&self) -> IndexSpace<D> {
        self.iter().fold(IndexSpace::empty(), |acc, b| acc.bounding_union(b))
    }

    pub fn contains_point(&self, index: IntVect<D>) -> bool {
        self.iter().any(|b| b.contains(index))
    }

    /**
     * Determine whether every index of `space` lies in some box of this set.
     */
    pub fn covers(&self, space: &IndexSpace<D>) -> bool {
        if space.is_empty() {
            return true;
        }
        let mut remainder = vec![*space];

        for b in self.iter() {
            remainder = remainder.iter().flat_map(|r| difference(r, b)).collect();

            if remainder.is_empty() {
                return true;
            }
        }
        remainder.is_empty()
    }

    /**
     * Determine whether no two boxes in the set share an index.
     */
    pub fn is_disjoint(&self) -> bool {
        let b = &self.boxes;
        (0..b.len()).all(|i| (i + 1..b.len()).all(|j| !b[i].intersects(&b[j])))
    }

    /**
     * Return the parts of the boxes in this set that lie in `space`.
     */
    pub fn intersect_box(&self, space: &IndexSpace<D>) -> Self {
        Self::from_boxes(self.iter().filter_map(|b| b.intersect(space)))
    }

    /**
     * Return the pairwise intersections of the boxes in the two sets. The
     * result is disjoint if both operands are.
     */
    pub fn intersect(&self, other: &Self) -> Self {
        Self::from_boxes(self.iter().flat_map(|a| other.iter().filter_map(move |b| a.intersect(b))))
    }

    /**
     * Return the indexes of `space` which are not in any box of this set, as
     * a disjoint set of boxes.
     */
    pub fn complement_in(&self, space: &IndexSpace<D>) -> Self {
        let mut remainder = vec![*space];

        for b in self.iter() {
            remainder = remainder.iter().flat_map(|r| difference(r, b)).collect();
        }
        Self::from_nonempty(remainder)
    }

    /**
     * Return the boxes of this set with the indexes of `other` removed.
     */
    pub fn difference(&self, other: &Self) -> Self {
        let mut remainder: Vec<_> = self.iter().copied().collect();

        for b in other.iter() {
            remainder = remainder.iter().flat_map(|r| difference(r, b)).collect();
        }
        Self::from_nonempty(remainder)
    }

    /**
     * Return the concatenation of the two sets. No attempt is made to remove
     * overlap.
     */
    pub fn concat(&self, other: &Self) -> Self {
        Self::from_boxes(self.iter().chain(other.iter()).copied())
    }

    pub fn extend_all(&self, delta: i64) -> Self {
        Self::from_boxes(self.iter().map(|b| b.extend_all(delta)))
    }

    pub fn refine(&self, ratio: IntVect<D>) -> Self {
        Self::from_boxes(self.iter().map(|b| b.scale(ratio)))
    }

    pub fn coarsen(&self, ratio: IntVect<D>) -> Self {
        Self::from_boxes(self.iter().map(|b| b.coarsen(ratio)))
    }

    pub fn shift(&self, offset: IntVect<D>) -> Self {
        Self::from_boxes(self.iter().map(|b| b.shift(offset)))
    }

    /**
     * Chop every box so that no side exceeds `max_size`, cutting only at
     * multiples of `blocking_factor`. Each box is divided on each axis into
     * the fewest pieces that fit, of nearly equal size. `max_size` must be a
     * multiple of `blocking_factor`, and the boxes must be aligned to it.
     */
    pub fn max_size(&self, max_size: IntVect<D>, blocking_factor: IntVect<D>) -> Self {
        for d in 0..D {
            assert!(
                max_size[d] >= blocking_factor[d] && max_size[d] % blocking_factor[d] == 0,
                "max size {:?} is not a multiple of blocking factor {:?}", max_size, blocking_factor);
        }
        let mut boxes: Vec<_> = self.iter().copied().collect();

        for axis in 0..D {
            boxes = boxes.into_iter().flat_map(|b| chop_axis(b, axis, max_size[axis], blocking_factor[axis])).collect();
        }
        Self::from_boxes(boxes)
    }

    /**
     * Merge pairs of boxes which share a whole face, until no more merges are
     * possible. The scan order is fixed, so the result is a deterministic
     * function of the input order.
     */
    pub fn simplify(&self) -> Self {
        let mut boxes: Vec<_> = self.iter().copied().collect();

        'merge: loop {
            for i in 0..boxes.len() {
                for j in i + 1..boxes.len() {
                    if let Some(joined) = join(&boxes[i], &boxes[j]) {
                        boxes[i] = joined;
                        boxes.remove(j);
                        continue 'merge;
                    }
                }
            }
            break;
        }
        Self::from_boxes(boxes)
    }
}




// ============================================================================
impl<const D: usize> Default for BoxSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> From<Vec<IndexSpace<D>>> for BoxSet<D> {
    fn from(boxes: Vec<IndexSpace<D>>) -> Self {
        Self::from_boxes(boxes)
    }
}

impl<const D: usize> core::iter::FromIterator<IndexSpace<D>> for BoxSet<D> {
    fn from_iter<I: IntoIterator<Item = IndexSpace<D>>>(iter: I) -> Self {
        Self::from_boxes(iter)
    }
}

impl<'a, const D: usize> IntoIterator for &'a BoxSet<D> {
    type Item = &'a IndexSpace<D>;
    type IntoIter = core::slice::Iter<'a, IndexSpace<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.iter()
    }
}




// ============================================================================
/**
 * Return the indexes of `a` not in `b` as at most 2D disjoint boxes. Slabs
 * below and above `b` are peeled off one axis at a time, each time shrinking
 * what is left of `a` to the extent of `b` on that axis.
 */
fn difference<const D: usize>(a: &IndexSpace<D>, b: &IndexSpace<D>) -> Vec<IndexSpace<D>> {
    if !a.intersects(b) {
        return vec![*a];
    }
    let mut pieces = Vec::new();
    let mut rest = *a;

    for d in 0..D {
        if rest.start()[d] < b.start()[d] {
            let (lower, upper) = rest.split_at(d, b.start()[d]);
            pieces.push(lower);
            rest = upper;
        }
        if b.end()[d] < rest.end()[d] {
            let (lower, upper) = rest.split_at(d, b.end()[d]);
            pieces.push(upper);
            rest = lower;
        }
    }
    pieces
}

/**
 * Return the union of two boxes if it is itself a box: they must match on
 * every axis but one, and abut on that one.
 */
fn join<const D: usize>(a: &IndexSpace<D>, b: &IndexSpace<D>) -> Option<IndexSpace<D>> {
    let differing: Vec<_> = (0..D).filter(|&d| a.range(d) != b.range(d)).collect();

    match differing.as_slice() {
        [d] if a.end()[*d] == b.start()[*d] || b.end()[*d] == a.start()[*d] => Some(a.bounding_union(b)),
        _ => None,
    }
}

fn chop_axis<const D: usize>(b: IndexSpace<D>, axis: usize, max_size: i64, blocking_factor: i64) -> Vec<IndexSpace<D>> {
    let len = b.dim()[axis];

    if len <= max_size {
        return vec![b];
    }
    let blocks = len / blocking_factor;
    let pieces = (len + max_size - 1) / max_size;
    let (base, extra) = (blocks / pieces, blocks % pieces);

    let mut result = Vec::with_capacity(pieces as usize);
    let mut rest = b;

    for n in 0..pieces - 1 {
        let size = (base + if n < extra { 1 } else { 0 }) * blocking_factor;
        let (lower, upper) = rest.split_at(axis, rest.start()[axis] + size);
        result.push(lower);
        rest = upper;
    }
    result.push(rest);
    result
}
