use std::any::Any;
use log::info;
use crate::box_set::BoxSet;
use crate::cluster::aligned_cut;
use crate::config::AmrParams;
use crate::distribution::{Distribute, DistributionMapping};
use crate::error::Error;
use crate::geometry::{CoordSys, Geometry, RealBox};
use crate::index_space::IndexSpace;
use crate::int_vect::IntVect;
use crate::message::Communicator;
use crate::nesting;
use crate::parmparse::ParmParse;
use crate::regrid::{ErrorEstimator, RegridResult, Regridder};




/**
 * Everything the hierarchy knows about one refinement level.
 */
#[derive(Clone, Debug)]
pub struct LevelRecord<const D: usize> {
    geom: Geometry<D>,
    grids: BoxSet<D>,
    dmap: DistributionMapping,
}




// ============================================================================
impl<const D: usize> LevelRecord<D> {
    pub fn geom(&self) -> &Geometry<D> {
        &self.geom
    }

    pub fn grids(&self) -> &BoxSet<D> {
        &self.grids
    }

    pub fn distribution_map(&self) -> &DistributionMapping {
        &self.dmap
    }
}




/**
 * A hierarchy of refinement levels `0..=finest_level`, with room for levels
 * up to `max_level`. Each level has a geometry (fixed at construction), a
 * decomposition into boxes, and an assignment of those boxes to ranks. The
 * parameters are frozen at construction.
 *
 * Passing a bad level index, or traversing a level whose boxes and owners
 * disagree in number, is a programming error and panics.
 */
pub struct Hierarchy<const D: usize> {
    params: AmrParams<D>,
    levels: Vec<LevelRecord<D>>,
    finest_level: usize,
    extension: Option<Box<dyn Any + Send + Sync>>,
}




// ============================================================================
impl<const D: usize> Hierarchy<D> {

    /**
     * Create a hierarchy over the given physical domain, with `n_cell` cells
     * on the coarsest level. No level has grids yet.
     */
    pub fn new(
        prob_domain: RealBox<D>,
        n_cell: IntVect<D>,
        coord: CoordSys,
        periodic: [bool; D],
        params: AmrParams<D>) -> Result<Self, Error>
    {
        if !n_cell.all_positive() {
            return Err(Error::invalid(format!("amr.n_cell must be positive, got {:?}", n_cell)));
        }
        let geom = Geometry::new(prob_domain, IndexSpace::from_shape(n_cell), coord, periodic);
        Self::with_geometry(geom, params)
    }

    /**
     * Create a hierarchy whose level 0 has the given geometry. Finer levels'
     * geometries are derived from it by the refinement ratios.
     *
     * An error here (e.g. a non-positive refinement ratio) is a broken
     * precondition of the whole run. Every rank sees the same error, and
     * callers must abort on it rather than continue with other parameters,
     * or the ranks fall out of step.
     */
    pub fn with_geometry(geom: Geometry<D>, params: AmrParams<D>) -> Result<Self, Error> {
        params.validate()?;

        let mut geoms = vec![geom];

        for lev in 0..params.max_level() {
            geoms.push(geoms[lev].refine(params.ref_ratio(lev)))
        }
        for (lev, geom) in geoms.iter().enumerate() {
            if !geom.domain().is_aligned(params.blocking_factor(lev)) {
                return Err(Error::invalid(format!(
                    "domain {:?} of level {} is not divisible by amr.blocking_factor {:?}",
                    geom.domain(), lev, params.blocking_factor(lev))));
            }
        }
        let levels = geoms
            .into_iter()
            .map(|geom| LevelRecord { geom, grids: BoxSet::new(), dmap: DistributionMapping::default() })
            .collect();

        Ok(Self { params, levels, finest_level: 0, extension: None })
    }

    /**
     * Create a hierarchy from a parameter table, reading the `amr` namespace
     * (including `amr.n_cell`) and the `geometry` namespace.
     */
    pub fn from_parm(pp: &ParmParse) -> Result<Self, Error> {
        let amr = pp.with_prefix("amr");
        let params = AmrParams::from_parm(&amr)?;
        let n_cell: [i64; D] = amr
            .get_arr::<i64>("n_cell")?
            .try_into()
            .map_err(|_| Error::invalid(format!("amr.n_cell needs {} values", D)))?;

        if n_cell.iter().any(|&n| n <= 0) {
            return Err(Error::invalid(format!("amr.n_cell must be positive, got {:?}", n_cell)));
        }
        let geom = Geometry::from_parm(&pp.with_prefix("geometry"), IndexSpace::from_shape(n_cell))?;
        Self::with_geometry(geom, params)
    }

    pub fn params(&self) -> &AmrParams<D> {
        &self.params
    }

    pub fn verbose(&self) -> i32 {
        self.params.verbose()
    }

    pub fn max_level(&self) -> usize {
        self.params.max_level()
    }

    pub fn finest_level(&self) -> usize {
        self.finest_level
    }

    pub fn ref_ratio(&self, lev: usize) -> IntVect<D> {
        self.params.ref_ratio(lev)
    }

    pub fn ref_ratios(&self) -> &[IntVect<D>] {
        self.params.ref_ratios()
    }

    /**
     * Return the largest component of the refinement ratio between `lev`
     * and `lev + 1`.
     */
    pub fn max_ref_ratio(&self, lev: usize) -> i64 {
        self.ref_ratio(lev).max_component()
    }

    pub fn use_fixed_coarse_grids(&self) -> bool {
        self.params.use_fixed_coarse_grids()
    }

    pub fn use_fixed_upto_level(&self) -> usize {
        self.params.use_fixed_upto_level()
    }

    pub fn n_error_buf(&self, lev: usize) -> i64 {
        self.params.n_error_buf(lev)
    }

    pub fn grid_eff(&self) -> f64 {
        self.params.grid_eff()
    }

    pub fn n_proper(&self) -> i64 {
        self.params.n_proper()
    }

    pub fn blocking_factor(&self, lev: usize) -> IntVect<D> {
        self.params.blocking_factor(lev)
    }

    pub fn max_grid_size(&self, lev: usize) -> IntVect<D> {
        self.params.max_grid_size(lev)
    }

    pub fn level(&self, lev: usize) -> &LevelRecord<D> {
        &self.levels[self.checked_level(lev)]
    }

    pub fn geom(&self, lev: usize) -> &Geometry<D> {
        &self.level(lev).geom
    }

    /**
     * Return the geometry of every level `0..=max_level`. Geometries exist
     * for levels that have no grids yet.
     */
    pub fn geoms(&self) -> Vec<&Geometry<D>> {
        self.levels.iter().map(|l| &l.geom).collect()
    }

    pub fn box_array(&self, lev: usize) -> &BoxSet<D> {
        &self.level(lev).grids
    }

    /**
     * Return the grids of every level `0..=finest_level`. Unlike `geoms`,
     * levels above the finest are left out.
     */
    pub fn box_arrays(&self) -> Vec<&BoxSet<D>> {
        self.levels[..=self.finest_level].iter().map(|l| &l.grids).collect()
    }

    pub fn distribution_map(&self, lev: usize) -> &DistributionMapping {
        &self.level(lev).dmap
    }

    /**
     * Return the distribution map of every level `0..=finest_level`, matching
     * `box_arrays`.
     */
    pub fn distribution_maps(&self) -> Vec<&DistributionMapping> {
        self.levels[..=self.finest_level].iter().map(|l| &l.dmap).collect()
    }

    pub fn set_box_array(&mut self, lev: usize, grids: BoxSet<D>) {
        let lev = self.checked_level(lev);
        self.levels[lev].grids = grids
    }

    pub fn set_distribution_map(&mut self, lev: usize, dmap: DistributionMapping) {
        let lev = self.checked_level(lev);
        self.levels[lev].dmap = dmap
    }

    pub fn clear_box_array(&mut self, lev: usize) {
        self.set_box_array(lev, BoxSet::new())
    }

    pub fn clear_distribution_map(&mut self, lev: usize) {
        self.set_distribution_map(lev, DistributionMapping::default())
    }

    pub fn set_finest_level(&mut self, lev: usize) {
        self.finest_level = self.checked_level(lev)
    }

    /**
     * Determine whether `lev` is at most the finest level and has grids.
     */
    pub fn level_defined(&self, lev: usize) -> bool {
        lev <= self.finest_level && !self.levels[lev].grids.is_empty()
    }

    /**
     * Return each box of a level together with its owning rank. The level's
     * grids and distribution map must have the same length.
     */
    pub fn boxes_with_ranks(&self, lev: usize) -> impl Iterator<Item = (&IndexSpace<D>, usize)> + '_ {
        let level = self.level(lev);

        assert!(
            level.grids.len() == level.dmap.len(),
            "level {} has {} boxes but {} owners", lev, level.grids.len(), level.dmap.len());

        level.grids.iter().zip(level.dmap.iter())
    }

    /**
     * Determine whether the grids of `lev` are properly nested in those of
     * `lev - 1`. Level 0 is trivially nested.
     */
    pub fn is_properly_nested(&self, lev: usize) -> bool {
        if lev == 0 {
            return true;
        }
        nesting::is_properly_nested(
            self.box_array(lev),
            self.box_array(lev - 1),
            self.ref_ratio(lev - 1),
            self.n_proper(),
            self.geom(lev - 1))
    }

    /**
     * Return a decomposition of the whole level-0 domain into boxes no
     * larger than `max_grid_size[0]`, by repeatedly halving boxes along
     * their longest axis at a multiple of `blocking_factor[0]`.
     */
    pub fn make_base_grids(&self) -> BoxSet<D> {
        let domain = *self.geom(0).domain();
        let mgs = self.max_grid_size(0);
        let bf = self.blocking_factor(0);
        let mut boxes = Vec::new();

        halve_until_fits(domain, mgs, bf, &mut boxes);
        BoxSet::from_boxes(boxes)
    }

    /**
     * Split the largest boxes of `grids` in two until there are at least
     * `target` boxes, cutting only at multiples of the level's blocking
     * factor. If no box is two blocking factors wide on any axis, the split
     * stops early and returns what it has.
     */
    pub fn chop_grids(&self, lev: usize, grids: &BoxSet<D>, target: usize) -> BoxSet<D> {
        let bf = self.blocking_factor(lev);
        let mut boxes: Vec<IndexSpace<D>> = grids.iter().copied().collect();

        while boxes.len() < target {
            let largest = boxes
                .iter()
                .enumerate()
                .filter(|(_, b)| (0..D).any(|d| b.dim()[d] >= 2 * bf[d]))
                .max_by_key(|(i, b)| (b.len(), core::cmp::Reverse(*i)))
                .map(|(i, _)| i);

            let i = match largest {
                Some(i) => i,
                None => {
                    if self.verbose() > 0 {
                        info!("chop_grids: level {} stops at {} of {} boxes; none can be split", lev, boxes.len(), target);
                    }
                    break;
                }
            };
            let b = boxes[i];
            let axis = (0..D)
                .filter(|&d| b.dim()[d] >= 2 * bf[d])
                .fold(None, |best: Option<usize>, d| match best {
                    Some(a) if b.dim()[a] >= b.dim()[d] => Some(a),
                    _ => Some(d),
                })
                .unwrap_or(0);

            let middle = (b.start()[axis] + b.end()[axis]) / 2;
            let (lower, upper) = b.split_at(axis, aligned_cut(&b, axis, middle, bf[axis]));
            boxes[i] = lower;
            boxes.insert(i + 1, upper);
        }
        BoxSet::from_boxes(boxes)
    }

    /**
     * Compute new grids for the levels above `lbase`. The hierarchy is not
     * modified; see `install`.
     */
    pub fn make_new_grids<E, C>(&self, lbase: usize, time: f64, estimator: &E, comm: &C) -> Result<RegridResult<D>, Error>
    where
        E: ErrorEstimator<D> + ?Sized,
        C: Communicator,
    {
        Regridder::new(self, estimator, comm).run(lbase, time)
    }

    /**
     * Commit a regrid result: levels `lbase + 1..=new_finest` get the new
     * grids (and fresh distribution maps if their grids changed), and levels
     * above `new_finest` are cleared.
     */
    pub fn install<M: Distribute<D> + ?Sized>(&mut self, result: &RegridResult<D>, distributor: &M, nranks: usize) {
        assert!(
            result.new_grids.len() == self.max_level() + 1,
            "regrid result has {} levels, hierarchy has {}", result.new_grids.len(), self.max_level() + 1);
        assert!(result.new_finest <= self.max_level(), "new finest level {} exceeds max_level", result.new_finest);

        for lev in result.lbase + 1..=self.max_level() {
            if lev > result.new_finest {
                self.clear_box_array(lev);
                self.clear_distribution_map(lev);
            } else if result.new_grids[lev] != self.levels[lev].grids || self.levels[lev].dmap.len() != result.new_grids[lev].len() {
                let dmap = distributor.distribute(&result.new_grids[lev], nranks);
                self.set_box_array(lev, result.new_grids[lev].clone());
                self.set_distribution_map(lev, dmap);
            }
        }
        if self.verbose() > 0 && result.new_finest != self.finest_level {
            info!("finest level changes from {} to {}", self.finest_level, result.new_finest);
        }
        self.set_finest_level(result.new_finest);

        if self.verbose() > 0 {
            for lev in 0..=self.finest_level {
                info!("level {}: {} grids, {} cells", lev, self.box_array(lev).len(), self.box_array(lev).num_cells());
            }
        }
    }

    /**
     * Attach an application object to the hierarchy (e.g. a particle
     * container), replacing any previous one.
     */
    pub fn attach_extension<T: Any + Send + Sync>(&mut self, extension: T) {
        self.extension = Some(Box::new(extension))
    }

    pub fn extension<T: Any>(&self) -> Option<&T> {
        self.extension.as_ref().and_then(|e| e.downcast_ref::<T>())
    }

    pub fn extension_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.extension.as_mut().and_then(|e| e.downcast_mut::<T>())
    }

    pub fn detach_extension(&mut self) -> Option<Box<dyn Any + Send + Sync>> {
        self.extension.take()
    }

    fn checked_level(&self, lev: usize) -> usize {
        assert!(lev <= self.max_level(), "level {} exceeds max_level {}", lev, self.max_level());
        lev
    }
}




// ============================================================================
fn halve_until_fits<const D: usize>(b: IndexSpace<D>, mgs: IntVect<D>, bf: IntVect<D>, out: &mut Vec<IndexSpace<D>>) {
    let dim = b.dim();
    let axis = (0..D)
        .filter(|&d| dim[d] > mgs[d])
        .fold(None, |best: Option<usize>, d| match best {
            Some(a) if dim[a] >= dim[d] => Some(a),
            _ => Some(d),
        });

    match axis {
        None => out.push(b),
        Some(axis) => {
            let middle = (b.start()[axis] + b.end()[axis]) / 2;
            let (lower, upper) = b.split_at(axis, aligned_cut(&b, axis, middle, bf[axis]));
            halve_until_fits(lower, mgs, bf, out);
            halve_until_fits(upper, mgs, bf, out);
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Hierarchy;
    use crate::box_set::BoxSet;
    use crate::config::AmrParams;
    use crate::distribution::{Distribute, DistributionMapping, KnapsackByCells, RoundRobin};
    use crate::geometry::{CoordSys, RealBox};
    use crate::index_space::{range2d, IndexSpace};
    use crate::int_vect::IntVect;
    use crate::parmparse::{ParmParse, Table};
    use crate::regrid::{RegridPhase, RegridResult};

    fn hierarchy() -> Hierarchy<2> {
        let params = AmrParams::new().with_max_level(2).with_ref_ratio(2).with_blocking_factor(4).with_max_grid_size(16);
        Hierarchy::new(RealBox::unit(), IntVect::splat(64), CoordSys::Cartesian, [false, false], params).unwrap()
    }

    #[test]
    fn geometries_are_refined_per_level() {
        let h = hierarchy();
        assert_eq!(h.geoms().len(), 3);
        assert_eq!(h.geom(2).domain(), &range2d(0..256, 0..256));
        assert_eq!(h.max_ref_ratio(1), 2);
        assert!(!h.level_defined(0));
    }

    #[test]
    fn base_grids_tile_a_domain_of_100_cells() {
        let params = AmrParams::new().with_blocking_factor(4).with_max_grid_size(40);
        let h = Hierarchy::<1>::new(RealBox::unit(), IntVect::splat(100), CoordSys::Cartesian, [false], params).unwrap();
        let grids = h.make_base_grids();

        assert!(grids.is_disjoint());
        assert_eq!(grids.num_cells(), 100);
        assert!(grids.covers(&IndexSpace::from_shape([100])));

        for b in &grids {
            assert!(b.dim()[0] <= 40);
            assert!(b.is_aligned(IntVect::splat(4)));
        }
    }

    #[test]
    fn base_grids_in_two_dimensions() {
        let params = AmrParams::new().with_blocking_factor(4).with_max_grid_size(40);
        let h = Hierarchy::<2>::new(RealBox::unit(), IntVect::new([100, 60]), CoordSys::Cartesian, [false, false], params).unwrap();
        let grids = h.make_base_grids();

        assert!(grids.is_disjoint());
        assert_eq!(grids.num_cells(), 6000);
        assert!(grids.iter().all(|b| b.dim().max_component() <= 40));
        assert_eq!(grids, h.make_base_grids());
    }

    #[test]
    fn chop_grids_reaches_the_target_when_it_can() {
        let h = hierarchy();
        let grids = BoxSet::from_boxes(vec![range2d(0..16, 0..16), range2d(16..24, 0..8)]);

        let chopped = h.chop_grids(0, &grids, 5);
        assert!(chopped.len() >= 5);
        assert_eq!(chopped.num_cells(), grids.num_cells());
        assert!(chopped.is_disjoint());
        assert!(chopped.iter().all(|b| b.is_aligned(IntVect::splat(4))));

        let stuck = h.chop_grids(0, &grids, 100);
        assert_eq!(stuck.len(), 16 + 4);
        assert!(stuck.iter().all(|b| b.dim().min_component() >= 4));
    }

    #[test]
    #[should_panic]
    fn mismatched_boxes_and_owners_panic() {
        let mut h = hierarchy();
        h.set_box_array(0, h.make_base_grids());
        h.set_distribution_map(0, DistributionMapping::new(vec![0]));
        let _ = h.boxes_with_ranks(0).count();
    }

    #[test]
    fn boxes_with_ranks_pairs_every_box() {
        let mut h = hierarchy();
        let grids = h.make_base_grids();
        h.set_distribution_map(0, KnapsackByCells.distribute(&grids, 3));
        h.set_box_array(0, grids);

        assert!(h.level_defined(0));
        assert_eq!(h.boxes_with_ranks(0).count(), 16);
        assert!(h.boxes_with_ranks(0).all(|(_, r)| r < 3));

        h.clear_box_array(0);
        h.clear_distribution_map(0);
        assert!(!h.level_defined(0));
    }

    #[test]
    #[should_panic]
    fn levels_beyond_max_level_panic() {
        hierarchy().geom(3);
    }

    #[test]
    fn non_positive_ratios_are_rejected() {
        let params = AmrParams::<2>::new().with_max_level(1).with_ref_ratios(vec![IntVect::new([2, 0])]);
        let result = Hierarchy::new(RealBox::unit(), IntVect::splat(64), CoordSys::Cartesian, [false, false], params);
        assert!(matches!(result, Err(crate::error::Error::InvalidParameter(_))));
    }

    #[test]
    fn blocking_factor_must_divide_the_domain() {
        let params = AmrParams::<2>::new().with_blocking_factor(8);
        assert!(Hierarchy::new(RealBox::unit(), IntVect::splat(100), CoordSys::Cartesian, [false, false], params).is_err());
    }

    #[test]
    fn extensions_are_retrieved_by_type() {
        let mut h = hierarchy();
        h.attach_extension(vec![1.0f64, 2.0]);
        assert_eq!(h.extension::<Vec<f64>>(), Some(&vec![1.0, 2.0]));
        assert!(h.extension::<String>().is_none());
        h.extension_mut::<Vec<f64>>().unwrap().push(3.0);
        assert_eq!(h.extension::<Vec<f64>>().map(|v| v.len()), Some(3));
        assert!(h.detach_extension().is_some());
    }

    #[test]
    fn install_replaces_and_clears_levels() {
        let mut h = hierarchy();
        let base = h.make_base_grids();
        h.set_distribution_map(0, RoundRobin.distribute(&base, 2));
        h.set_box_array(0, base);
        h.set_box_array(2, BoxSet::from_boxes(vec![range2d(0..8, 0..8)]));

        let result = RegridResult {
            lbase: 0,
            new_finest: 1,
            new_grids: vec![h.box_array(0).clone(), BoxSet::from_boxes(vec![range2d(8..24, 8..24)]), BoxSet::new()],
            stats: vec![None; 3],
            phase: RegridPhase::Installed,
        };
        h.install(&result, &RoundRobin, 2);

        assert_eq!(h.finest_level(), 1);
        assert_eq!(h.box_array(1).len(), 1);
        assert_eq!(h.distribution_map(1).len(), 1);
        assert!(h.box_array(2).is_empty());
        assert_eq!(h.box_arrays().len(), 2);
        assert_eq!(h.geoms().len(), 3);

        let dmaps = h.distribution_maps();
        assert_eq!(dmaps.len(), 2);
        assert_eq!(dmaps[0].len(), 16);
        assert_eq!(dmaps[1].as_slice(), &[0]);
    }

    #[test]
    fn builds_from_a_parameter_table() {
        let table = Table::parse("
            amr.n_cell          = 32 64
            amr.max_level       = 1
            amr.blocking_factor = 8
            amr.max_grid_size   = 32
            geometry.prob_lo    = -1.0 0.0
            geometry.prob_hi    = 1.0 4.0
            geometry.is_periodic = 1 0
        ").unwrap();
        let pp = ParmParse::new(table);
        let h = Hierarchy::<2>::from_parm(&pp).unwrap();

        assert_eq!(h.geom(0).domain(), &range2d(0..32, 0..64));
        assert!(h.geom(1).is_periodic(0));
        assert_eq!(h.geom(1).cell_size(), [2.0 / 64.0, 4.0 / 128.0]);
        assert!(pp.unused_entries().is_empty());
    }
}
