use crate::box_set::BoxSet;
use crate::geometry::Geometry;
use crate::index_space::IndexSpace;
use crate::int_vect::IntVect;




/**
 * The region of one level in which new finer grids may be placed: the cells
 * at least `n_proper` cells (at that level) away from anything not covered by
 * the base level's grids, with periodic images taken into account. It is
 * stored as its complement within the level's domain, which is what gets
 * grown and refined when the region is carried to finer levels.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct ProperNesting<const D: usize> {
    complement: BoxSet<D>,
    domain: IndexSpace<D>,
}




// ============================================================================
impl<const D: usize> ProperNesting<D> {

    /**
     * Build the nesting region of a level from that level's own grids.
     */
    pub fn new(geom: &Geometry<D>, grids: &BoxSet<D>, n_proper: i64) -> Self {
        let outside = grids.complement_in(geom.domain()).extend_all(n_proper);

        Self {
            complement: geom.proj_periodic(&outside),
            domain: *geom.domain(),
        }
    }

    /**
     * Return the cells excluded from the nesting region. Boxes may poke out
     * of the domain.
     */
    pub fn complement(&self) -> &BoxSet<D> {
        &self.complement
    }

    /**
     * Return the nesting region itself, as disjoint boxes inside the domain.
     */
    pub fn region(&self) -> BoxSet<D> {
        self.complement.complement_in(&self.domain)
    }

    /**
     * Determine whether `space` lies entirely in the nesting region.
     */
    pub fn contains(&self, space: &IndexSpace<D>) -> bool {
        !self.complement.iter().any(|b| b.intersects(space)) && self.domain.contains_space(space)
    }

    /**
     * Round the region down to whole blocks of the blocking factor: a block
     * stays in only if every one of its cells is in. Boxes clipped to the
     * blocked region stay aligned to the blocking factor.
     */
    pub fn blocked(&self, blocking_factor: IntVect<D>) -> Self {
        Self {
            complement: self.complement.coarsen(blocking_factor).refine(blocking_factor),
            domain: self.domain,
        }
    }

    /**
     * Return the region of cells in both this region and `other`, which must
     * belong to the same level.
     */
    pub fn intersect(&self, other: &Self) -> Self {
        assert!(self.domain == other.domain, "nesting regions belong to different levels");

        Self {
            complement: self.complement.concat(&other.complement),
            domain: self.domain,
        }
    }

    /**
     * Carry the region to the next finer level: a fine cell is excluded if it
     * lies within `n_proper` fine cells of an excluded coarse cell.
     */
    pub fn refine(&self, ratio: IntVect<D>, fine_geom: &Geometry<D>, n_proper: i64) -> Self {
        let outside = self.complement.refine(ratio).extend_all(n_proper);

        Self {
            complement: fine_geom.proj_periodic(&outside),
            domain: *fine_geom.domain(),
        }
    }
}




/**
 * Determine whether every fine box, coarsened by `ratio` and grown by
 * `n_proper`, is covered by the coarse grids. The grown box is first wrapped
 * through the coarse level's periodic boundaries; the parts outside a
 * non-periodic boundary need no cover.
 */
pub fn is_properly_nested<const D: usize>(
    fine: &BoxSet<D>,
    coarse: &BoxSet<D>,
    ratio: IntVect<D>,
    n_proper: i64,
    coarse_geom: &Geometry<D>) -> bool
{
    fine.iter().all(|b| {
        let grown = b.coarsen(ratio).extend_all(n_proper);
        coarse_geom.wrap_space(&grown).iter().all(|piece| coarse.covers(piece))
    })
}
