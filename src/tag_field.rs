use std::cell::RefCell;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::box_set::BoxSet;
use crate::error::Error;
use crate::geometry::Geometry;
use crate::index_space::IndexSpace;
use crate::int_vect::IntVect;
use crate::message::Communicator;




/**
 * A field of refinement flags over an index space, normally the whole domain
 * of one level. A cell is tagged if it needs to be covered by the next finer
 * level. Flags are stored one byte per cell in row-major order, so the field
 * serializes compactly and merges with a byte-wise OR.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagField<const D: usize> {
    space: IndexSpace<D>,
    data: Vec<u8>,
}




// ============================================================================
impl<const D: usize> TagField<D> {

    /**
     * Create a field over the given index space, with no cells tagged.
     */
    pub fn new(space: IndexSpace<D>) -> Self {
        Self { space, data: vec![0; space.len()] }
    }

    pub fn space(&self) -> &IndexSpace<D> {
        &self.space
    }

    /**
     * Determine whether the given cell is tagged. Cells outside the field are
     * never tagged.
     */
    pub fn is_tagged(&self, index: IntVect<D>) -> bool {
        self.space.contains(index) && self.data[self.space.row_major_offset(index)] != 0
    }

    pub fn tag(&mut self, index: IntVect<D>) {
        self.validate_index(index);
        let n = self.space.row_major_offset(index);
        self.data[n] = 1
    }

    pub fn untag(&mut self, index: IntVect<D>) {
        self.validate_index(index);
        let n = self.space.row_major_offset(index);
        self.data[n] = 0
    }

    /**
     * Tag every cell of `space`. Parts outside the domain across a periodic
     * boundary are wrapped back in; other parts outside the field are ignored.
     */
    pub fn set_box(&mut self, space: &IndexSpace<D>, geom: &Geometry<D>) {
        self.fill_box(space, geom, 1)
    }

    /**
     * Untag every cell of `space`, with the same wrapping as `set_box`.
     */
    pub fn clear_box(&mut self, space: &IndexSpace<D>, geom: &Geometry<D>) {
        self.fill_box(space, geom, 0)
    }

    /**
     * Untag every cell not covered by the given boxes.
     */
    pub fn clear_outside(&mut self, keep: &BoxSet<D>) {
        let mut data = vec![0; self.data.len()];

        for b in keep {
            if let Some(overlap) = b.intersect(&self.space) {
                for index in overlap.iter() {
                    let n = self.space.row_major_offset(index);
                    data[n] = self.data[n];
                }
            }
        }
        self.data = data
    }

    pub fn num_tagged(&self) -> usize {
        self.data.par_iter().filter(|&&t| t != 0).count()
    }

    pub fn num_tagged_in(&self, space: &IndexSpace<D>) -> usize {
        match space.intersect(&self.space) {
            None => 0,
            Some(overlap) => overlap.iter().filter(|&i| self.is_tagged(i)).count(),
        }
    }

    /**
     * Return the smallest index space containing every tagged cell within
     * `region`, or `None` if there are none.
     */
    pub fn bounding_box(&self, region: &IndexSpace<D>) -> Option<IndexSpace<D>> {
        let overlap = region.intersect(&self.space)?;

        overlap
            .iter()
            .filter(|&i| self.is_tagged(i))
            .fold(None, |acc: Option<IndexSpace<D>>, i| {
                let cell = IndexSpace::from_cell(i);
                Some(acc.map_or(cell, |b| b.bounding_union(&cell)))
            })
    }

    /**
     * Grow every tag by `n` cells in every direction, wrapping through
     * periodic boundaries and clipping at the others. Growth is done one axis
     * at a time, which is equivalent to tagging a cube of side `2n + 1`
     * around each tag.
     */
    pub fn buffer(&mut self, n: i64, geom: &Geometry<D>) {
        if n <= 0 {
            return;
        }
        for axis in 0..D {
            let mut data = self.data.clone();

            for index in self.space.iter().filter(|&i| self.is_tagged(i)) {
                for k in -n..=n {
                    let mut neighbor = index;
                    neighbor[axis] += k;

                    if let Some(neighbor) = geom.wrap(neighbor).filter(|j| self.space.contains(*j)) {
                        data[self.space.row_major_offset(neighbor)] = 1
                    }
                }
            }
            self.data = data
        }
    }

    /**
     * Return the number of tagged cells in each plane of `space` normal to
     * `axis`, ordered from the lower face to the upper one.
     */
    pub fn signature(&self, space: &IndexSpace<D>, axis: usize) -> Vec<usize> {
        let mut sig = vec![0; space.dim()[axis] as usize];
        let start = space.start()[axis];

        if let Some(overlap) = space.intersect(&self.space) {
            for index in overlap.iter().filter(|&i| self.is_tagged(i)) {
                sig[(index[axis] - start) as usize] += 1
            }
        }
        sig
    }

    /**
     * Return the tagged cells in row-major order.
     */
    pub fn collate(&self) -> Vec<IntVect<D>> {
        self.space.iter().filter(|&i| self.is_tagged(i)).collect()
    }

    /**
     * Tag every cell that is tagged in `other`. The two fields must cover the
     * same index space.
     */
    pub fn merge(&mut self, other: &Self) {
        assert!(
            self.space == other.space,
            "cannot merge tag fields over {:?} and {:?}", self.space, other.space);

        self.data.par_iter_mut().zip(other.data.par_iter()).for_each(|(a, &b)| *a |= b)
    }

    /**
     * Merge the tags of every rank, so that each rank holds the union of all
     * of them. This is a blocking collective: every rank must call it.
     */
    pub fn all_reduce<C: Communicator>(&self, comm: &C) -> Result<Self, Error> {
        let failure = RefCell::new(None);

        let merged = comm.all_reduce(
            |a, b| match merge_encoded::<D>(&a, &b) {
                Ok(bytes) => bytes,
                Err(e) => {
                    failure.borrow_mut().get_or_insert(e);
                    a
                }
            },
            encode(self)?);

        if let Some(e) = failure.into_inner() {
            return Err(e);
        }
        let merged: Self = decode(&merged)?;

        if merged.space != self.space {
            return Err(Error::Codec(format!("merged tags cover {:?}, expected {:?}", merged.space, self.space)));
        }
        Ok(merged)
    }

    fn fill_box(&mut self, space: &IndexSpace<D>, geom: &Geometry<D>, value: u8) {
        for piece in geom.wrap_space(space).iter() {
            if let Some(overlap) = piece.intersect(&self.space) {
                for index in overlap.iter() {
                    let n = self.space.row_major_offset(index);
                    self.data[n] = value
                }
            }
        }
    }

    fn validate_index(&self, index: IntVect<D>) {
        if !self.space.contains(index) {
            panic!("index {:?} out of range on tag field {:?}", index, self.space)
        }
    }
}




// ============================================================================
fn encode<const D: usize>(tags: &TagField<D>) -> Result<Vec<u8>, Error> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(tags, &mut buffer).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(buffer)
}

fn decode<const D: usize>(bytes: &[u8]) -> Result<TagField<D>, Error> {
    ciborium::de::from_reader(bytes).map_err(|e| Error::Codec(e.to_string()))
}

fn merge_encoded<const D: usize>(a: &[u8], b: &[u8]) -> Result<Vec<u8>, Error> {
    let mut a: TagField<D> = decode(a)?;
    let b: TagField<D> = decode(b)?;

    if a.space != b.space {
        return Err(Error::Codec(format!("ranks tagged different index spaces {:?} and {:?}", a.space, b.space)));
    }
    a.merge(&b);
    encode(&a)
}
