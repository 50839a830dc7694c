use log::{debug, info};
use crate::box_set::BoxSet;
use crate::cluster::{cluster, ClusterParams, ClusterStats};
use crate::error::Error;
use crate::hierarchy::Hierarchy;
use crate::int_vect::IntVect;
use crate::message::Communicator;
use crate::nesting::ProperNesting;
use crate::tag_field::TagField;




/**
 * The application's refinement criterion. Implementations must be
 * deterministic: every rank calls them with the same arguments and, after
 * the tags are merged across ranks, must agree on the result.
 */
pub trait ErrorEstimator<const D: usize> {

    /**
     * Tag the cells of level `lev` that need refinement. The field covers the
     * level's whole domain and arrives with no cells tagged. Tags from all
     * ranks are merged afterwards, so each rank may tag only the cells it
     * owns. `ngrow` is the number of buffer cells the engine will add around
     * each tag.
     */
    fn estimate(&self, lev: usize, tags: &mut TagField<D>, time: f64, ngrow: i64);

    /**
     * Return regions of level `lev` that must never be refined. Tags there
     * are cleared after buffering.
     */
    fn area_excluded(&self, _lev: usize) -> BoxSet<D> {
        BoxSet::new()
    }

    /**
     * Adjust the tags of level `lev` after `estimate`. `bf_lev[l]` is the
     * blocking factor that clustering on level `l` will use.
     */
    fn manual_override(&self, _lev: usize, _tags: &mut TagField<D>, _bf_lev: &[IntVect<D>]) {
    }
}




/**
 * The stages of a regrid pass. A pass starts `Idle`, goes through the middle
 * three stages once per coarse level, and ends in `Installed` (new grids were
 * produced) or `Rejected` (nothing above the base level needs refinement).
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegridPhase {
    Idle,
    TaggingInProgress,
    Clustering,
    NestingEnforcement,
    Installed,
    Rejected,
}




/**
 * The outcome of a regrid pass. `new_grids` has one entry per level
 * `0..=max_level`: levels up to `lbase` repeat the current grids, levels
 * `lbase + 1..=new_finest` hold the new grids, and higher levels are empty.
 * `stats[lev]` describes the clustering that produced level `lev`, if any.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct RegridResult<const D: usize> {
    pub lbase: usize,
    pub new_finest: usize,
    pub new_grids: Vec<BoxSet<D>>,
    pub stats: Vec<Option<ClusterStats>>,
    pub phase: RegridPhase,
}




// ============================================================================
impl<const D: usize> RegridResult<D> {
    pub fn is_installed(&self) -> bool {
        self.phase == RegridPhase::Installed
    }

    pub fn grids(&self, lev: usize) -> &BoxSet<D> {
        &self.new_grids[lev]
    }
}




/**
 * Runs one regrid pass over a hierarchy. The hierarchy is only read; the
 * caller commits the result with `Hierarchy::install`.
 */
pub struct Regridder<'a, const D: usize, E: ErrorEstimator<D> + ?Sized, C: Communicator> {
    hierarchy: &'a Hierarchy<D>,
    estimator: &'a E,
    comm: &'a C,
    history: Vec<RegridPhase>,
}




// ============================================================================
impl<'a, const D: usize, E: ErrorEstimator<D> + ?Sized, C: Communicator> Regridder<'a, D, E, C> {

    pub fn new(hierarchy: &'a Hierarchy<D>, estimator: &'a E, comm: &'a C) -> Self {
        Self { hierarchy, estimator, comm, history: vec![RegridPhase::Idle] }
    }

    /**
     * Return the stage the regridder is in.
     */
    pub fn phase(&self) -> RegridPhase {
        self.history.last().copied().unwrap_or(RegridPhase::Idle)
    }

    /**
     * Return every stage entered so far, starting with `Idle`.
     */
    pub fn history(&self) -> &[RegridPhase] {
        &self.history
    }

    /**
     * Generate new grids for the levels above `lbase`, which must be a
     * defined level. At most one level above the current finest is created.
     * Every rank must call this with the same arguments: the tag merge inside
     * is a blocking collective.
     */
    pub fn run(&mut self, lbase: usize, time: f64) -> Result<RegridResult<D>, Error> {
        let h = self.hierarchy;
        let max_level = h.max_level();
        let finest = h.finest_level();

        assert!(lbase <= finest, "regrid base level {} is above the finest level {}", lbase, finest);
        assert!(h.level_defined(lbase), "regrid base level {} has no grids", lbase);

        if lbase >= max_level {
            return Ok(self.reject(lbase));
        }
        let max_crse = finest.min(max_level - 1);
        let n_proper = h.n_proper();
        let bf_lev: Vec<IntVect<D>> = (0..max_level).map(|lev| h.params().coarse_blocking_factor(lev)).collect();
        let nesting = self.nesting_regions(lbase, max_crse, &bf_lev);

        let mut new_grids: Vec<BoxSet<D>> = (0..=max_level)
            .map(|lev| if lev <= lbase { h.box_array(lev).clone() } else { BoxSet::new() })
            .collect();
        let mut stats = vec![None; max_level + 1];
        let mut new_finest = lbase;

        for levc in (lbase..=max_crse).rev() {
            let levf = levc + 1;

            if self.is_frozen(levf) {
                debug!("level {} is fixed; reusing its {} grids", levf, h.box_array(levf).len());
                new_grids[levf] = h.box_array(levf).clone();
                new_finest = new_finest.max(levf);
                continue;
            }
            let geom = h.geom(levc);
            let ratio = h.ref_ratio(levc);
            let region = nesting[levc - lbase].region();

            self.enter(RegridPhase::TaggingInProgress);

            let mut tags = TagField::new(*geom.domain());
            self.estimator.estimate(levc, &mut tags, time, h.n_error_buf(levc));
            self.estimator.manual_override(levc, &mut tags, &bf_lev);

            let mut tags = tags.all_reduce(self.comm)?;
            tags.buffer(h.n_error_buf(levc), geom);

            for b in &self.estimator.area_excluded(levc) {
                tags.clear_box(b, geom)
            }
            if levf < new_finest {
                for b in &new_grids[levf + 1] {
                    let projected = b.coarsen(h.ref_ratio(levf)).extend_all(n_proper).coarsen(ratio);
                    tags.set_box(&projected, geom)
                }
            }
            tags.clear_outside(&region);

            self.enter(RegridPhase::Clustering);

            let params = ClusterParams {
                grid_eff: h.grid_eff(),
                blocking_factor: bf_lev[levc],
                max_grid_size: h.max_grid_size(levf) / ratio,
                max_split_depth: h.params().max_split_depth(),
            };
            let (clusters, cluster_stats) = cluster(&tags, &params);

            if h.verbose() > 0 && cluster_stats.accepted_split_budget > 0 {
                info!(
                    "regrid: {} boxes on level {} were accepted below grid_eff after {} splits",
                    cluster_stats.accepted_split_budget, levc, params.max_split_depth);
            }

            self.enter(RegridPhase::NestingEnforcement);

            let coarse_grids = clusters
                .intersect(&region)
                .simplify()
                .max_size(params.max_grid_size, params.blocking_factor);

            if h.verbose() > 0 {
                let efficiency = tags.num_tagged() as f64 / coarse_grids.num_cells().max(1) as f64;
                info!(
                    "regrid: level {} gets {} grids covering {} coarse cells (tag efficiency {:.3})",
                    levf, coarse_grids.len(), coarse_grids.num_cells(), efficiency);
            }
            let mut fine_grids = coarse_grids.refine(ratio);

            if h.params().refine_grid_layout() {
                fine_grids = h.chop_grids(levf, &fine_grids, self.comm.size());
            }
            stats[levf] = Some(cluster_stats);

            if !fine_grids.is_empty() {
                new_finest = new_finest.max(levf);
            }
            new_grids[levf] = fine_grids;
        }

        if new_finest == lbase {
            return Ok(self.reject(lbase));
        }
        for grids in new_grids.iter_mut().skip(new_finest + 1) {
            *grids = BoxSet::new()
        }
        self.enter(RegridPhase::Installed);

        Ok(RegridResult { lbase, new_finest, new_grids, stats, phase: RegridPhase::Installed })
    }

    fn is_frozen(&self, lev: usize) -> bool {
        let h = self.hierarchy;
        h.use_fixed_coarse_grids() && lev < h.use_fixed_upto_level() && h.level_defined(lev)
    }

    /**
     * Build the blocked nesting region of each level `lbase..=max_crse`,
     * starting from the grids of `lbase`.
     */
    fn nesting_regions(&self, lbase: usize, max_crse: usize, bf_lev: &[IntVect<D>]) -> Vec<ProperNesting<D>> {
        let h = self.hierarchy;
        let n_proper = h.n_proper();
        let mut regions = Vec::with_capacity(max_crse + 1 - lbase);
        let mut current = ProperNesting::new(h.geom(lbase), h.box_array(lbase), n_proper);

        for lev in lbase..=max_crse {
            let blocked = current.blocked(bf_lev[lev]);

            if lev < max_crse {
                current = blocked.refine(h.ref_ratio(lev), h.geom(lev + 1), n_proper);

                if self.is_frozen(lev + 1) {
                    current = current.intersect(&ProperNesting::new(h.geom(lev + 1), h.box_array(lev + 1), n_proper))
                }
            }
            regions.push(blocked);
        }
        regions
    }

    fn reject(&mut self, lbase: usize) -> RegridResult<D> {
        let h = self.hierarchy;
        let max_level = h.max_level();

        if h.verbose() > 0 {
            info!("regrid: nothing to refine above level {}; keeping the current grids", lbase);
        }
        self.enter(RegridPhase::Rejected);

        RegridResult {
            lbase,
            new_finest: h.finest_level(),
            new_grids: (0..=max_level).map(|lev| h.box_array(lev).clone()).collect(),
            stats: vec![None; max_level + 1],
            phase: RegridPhase::Rejected,
        }
    }

    fn enter(&mut self, phase: RegridPhase) {
        debug!("regrid phase: {:?}", phase);
        self.history.push(phase)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{ErrorEstimator, RegridPhase};
    use crate::box_set::BoxSet;
    use crate::config::AmrParams;
    use crate::distribution::RoundRobin;
    use crate::geometry::{CoordSys, RealBox};
    use crate::hierarchy::Hierarchy;
    use crate::index_space::{range2d, IndexSpace};
    use crate::int_vect::IntVect;
    use crate::message::{ChannelCommunicator, Communicator, SingleRank};
    use crate::nesting::is_properly_nested;
    use crate::tag_field::TagField;

    /**
     * Tags the cells of given boxes on given levels, and optionally only
     * every `stride`-th of them starting at `offset` (to split the work
     * between ranks).
     */
    struct TagBoxes {
        boxes: Vec<(usize, IndexSpace<2>)>,
        excluded: Vec<(usize, IndexSpace<2>)>,
        stride: usize,
        offset: usize,
    }

    impl TagBoxes {
        fn new(boxes: Vec<(usize, IndexSpace<2>)>) -> Self {
            Self { boxes, excluded: Vec::new(), stride: 1, offset: 0 }
        }
    }

    impl ErrorEstimator<2> for TagBoxes {
        fn estimate(&self, lev: usize, tags: &mut TagField<2>, _time: f64, _ngrow: i64) {
            let space = *tags.space();
            let mut n = 0;

            for (l, b) in &self.boxes {
                if *l == lev {
                    for index in b.iter().filter(|&i| space.contains(i)) {
                        if n % self.stride == self.offset {
                            tags.tag(index)
                        }
                        n += 1;
                    }
                }
            }
        }

        fn area_excluded(&self, lev: usize) -> BoxSet<2> {
            self.excluded.iter().filter(|(l, _)| *l == lev).map(|(_, b)| *b).collect()
        }
    }

    fn params() -> AmrParams<2> {
        AmrParams::new()
            .with_max_level(2)
            .with_ref_ratio(2)
            .with_blocking_factor(4)
            .with_max_grid_size(16)
            .with_n_error_buf(1)
            .with_refine_grid_layout(false)
    }

    fn hierarchy(params: AmrParams<2>, periodic: [bool; 2]) -> Hierarchy<2> {
        let mut h = Hierarchy::new(RealBox::unit(), IntVect::splat(64), CoordSys::Cartesian, periodic, params).unwrap();
        let base = h.make_base_grids();
        h.set_box_array(0, base.clone());
        h.set_distribution_map(0, crate::distribution::Distribute::distribute(&RoundRobin, &base, 1));
        h
    }

    fn assert_grid_invariants(h: &Hierarchy<2>, grids: &[BoxSet<2>], finest: usize) {
        for lev in 1..=finest {
            let bf = h.blocking_factor(lev);
            let mgs = h.max_grid_size(lev);

            assert!(grids[lev].is_disjoint());
            assert!(is_properly_nested(&grids[lev], &grids[lev - 1], h.ref_ratio(lev - 1), h.n_proper(), h.geom(lev - 1)));

            for b in &grids[lev] {
                assert!(b.is_aligned(bf), "{:?} is not aligned to {:?}", b, bf);
                assert!((0..2).all(|d| b.dim()[d] <= mgs[d]), "{:?} exceeds {:?}", b, mgs);
                assert!(h.geom(lev).domain().contains_space(b));
            }
        }
    }

    #[test]
    fn tags_on_the_base_level_create_one_new_level() {
        let h = hierarchy(params(), [false, false]);
        let est = TagBoxes::new(vec![(0, range2d(20..28, 22..26))]);
        let result = h.make_new_grids(0, 0.0, &est, &SingleRank).unwrap();

        assert_eq!(result.phase, RegridPhase::Installed);
        assert_eq!(result.new_finest, 1);
        assert!(result.new_grids[2].is_empty());
        assert_grid_invariants(&h, &result.new_grids, 1);

        for index in range2d(19..29, 21..27).iter() {
            let fine = IndexSpace::from_cell(index).scale(IntVect::splat(2));
            assert!(result.new_grids[1].iter().any(|b| b.contains_space(&fine)), "tag {:?} not covered", index);
        }
    }

    #[test]
    fn a_second_pass_adds_a_nested_third_level() {
        let mut h = hierarchy(params(), [false, false]);
        let est = TagBoxes::new(vec![(0, range2d(16..40, 16..40)), (1, range2d(60..64, 60..64))]);

        let first = h.make_new_grids(0, 0.0, &est, &SingleRank).unwrap();
        h.install(&first, &RoundRobin, 1);
        assert_eq!(h.finest_level(), 1);

        let second = h.make_new_grids(0, 0.0, &est, &SingleRank).unwrap();
        h.install(&second, &RoundRobin, 1);
        assert_eq!(h.finest_level(), 2);
        assert!(h.is_properly_nested(1));
        assert!(h.is_properly_nested(2));
        assert_grid_invariants(&h, &second.new_grids, 2);
        assert!(second.new_grids[2].iter().any(|b| b.contains(IntVect::new([121, 121]))));
    }

    #[test]
    fn no_tags_rejects_and_keeps_the_hierarchy() {
        let h = hierarchy(params(), [false, false]);
        let est = TagBoxes::new(vec![]);
        let mut regridder = super::Regridder::new(&h, &est, &SingleRank);
        let result = regridder.run(0, 0.0).unwrap();

        assert_eq!(result.phase, RegridPhase::Rejected);
        assert_eq!(result.new_finest, 0);
        assert_eq!(result.new_grids[0], *h.box_array(0));
        assert_eq!(regridder.phase(), RegridPhase::Rejected);
        assert_eq!(regridder.history(), &[
            RegridPhase::Idle,
            RegridPhase::TaggingInProgress,
            RegridPhase::Clustering,
            RegridPhase::NestingEnforcement,
            RegridPhase::Rejected,
        ]);
    }

    #[test]
    fn excluded_areas_are_not_refined() {
        let h = hierarchy(params(), [false, false]);
        let mut est = TagBoxes::new(vec![(0, range2d(8..16, 8..16)), (0, range2d(40..48, 40..48))]);
        est.excluded.push((0, range2d(0..32, 0..32)));

        let result = h.make_new_grids(0, 0.0, &est, &SingleRank).unwrap();
        let excluded_fine = range2d(0..64, 0..64);
        assert!(!result.new_grids[1].is_empty());
        assert!(result.new_grids[1].iter().all(|b| !b.intersects(&excluded_fine)));
    }

    #[test]
    fn frozen_levels_are_reused_verbatim() {
        let params = params().with_fixed_coarse_grids(2);
        let mut h = hierarchy(params, [false, false]);
        let fixed = BoxSet::from_boxes(vec![
            range2d(32..48, 32..48),
            range2d(48..64, 32..48),
            range2d(32..48, 48..64),
            range2d(48..64, 48..64),
        ]);
        h.set_box_array(1, fixed.clone());
        h.set_distribution_map(1, crate::distribution::Distribute::distribute(&RoundRobin, &fixed, 1));
        h.set_finest_level(1);

        let est = TagBoxes::new(vec![(0, range2d(0..8, 0..8)), (1, range2d(44..52, 44..52))]);
        let result = h.make_new_grids(0, 0.0, &est, &SingleRank).unwrap();

        assert_eq!(result.new_grids[1], fixed);
        assert!(std::ptr::eq(result.new_grids[1].as_slice(), fixed.as_slice()));
        assert_eq!(result.new_finest, 2);
        assert_grid_invariants(&h, &result.new_grids, 2);
    }

    #[test]
    fn periodic_tags_wrap_across_the_boundary() {
        let h = hierarchy(params(), [true, false]);
        let est = TagBoxes::new(vec![(0, range2d(0..2, 30..34))]);
        let result = h.make_new_grids(0, 0.0, &est, &SingleRank).unwrap();

        let fine = &result.new_grids[1];
        assert!(fine.contains_point(IntVect::new([127, 64])));
        assert!(fine.contains_point(IntVect::new([0, 64])));
        assert_grid_invariants(&h, &result.new_grids, 1);
    }

    #[test]
    fn refine_grid_layout_chops_for_the_rank_count() {
        let h = hierarchy(params().with_max_grid_size(32), [false, false]);
        let est = TagBoxes::new(vec![(0, range2d(17..23, 17..23))]);

        let handles: Vec<_> = ChannelCommunicator::group(4)
            .into_iter()
            .map(|comm| {
                let h = hierarchy(params().with_max_grid_size(32).with_refine_grid_layout(true), [false, false]);
                let est = TagBoxes::new(vec![(0, range2d(17..23, 17..23))]);
                std::thread::spawn(move || h.make_new_grids(0, 0.0, &est, &comm).unwrap())
            })
            .collect();

        let serial = h.make_new_grids(0, 0.0, &est, &SingleRank).unwrap();
        assert_eq!(serial.new_grids[1].len(), 1);

        for handle in handles {
            let result = handle.join().unwrap();
            assert!(result.new_grids[1].len() >= 4);
            assert_eq!(result.new_grids[1].num_cells(), serial.new_grids[1].num_cells());
        }
    }

    #[test]
    fn every_rank_computes_the_same_grids() {
        let boxes = vec![(0, range2d(4..12, 6..10)), (0, range2d(40..60, 44..50)), (0, range2d(30..31, 10..40))];
        let serial = hierarchy(params(), [true, true])
            .make_new_grids(0, 0.5, &TagBoxes::new(boxes.clone()), &SingleRank)
            .unwrap();

        let handles: Vec<_> = ChannelCommunicator::group(3)
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let est = TagBoxes { boxes: boxes.clone(), excluded: Vec::new(), stride: 3, offset: rank };
                std::thread::spawn(move || hierarchy(params(), [true, true]).make_new_grids(0, 0.5, &est, &comm).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), serial);
        }
    }

    /**
     * Places tags through the manual override hook only, and only on rank 0.
     */
    struct ManualTags {
        cells: Vec<(usize, IntVect<2>)>,
        rank: usize,
        max_level: usize,
    }

    impl ErrorEstimator<2> for ManualTags {
        fn estimate(&self, _lev: usize, _tags: &mut TagField<2>, _time: f64, _ngrow: i64) {
        }

        fn manual_override(&self, lev: usize, tags: &mut TagField<2>, bf_lev: &[IntVect<2>]) {
            assert_eq!(bf_lev.len(), self.max_level);
            assert_eq!(bf_lev[lev], IntVect::splat(2));

            if self.rank == 0 {
                for (l, cell) in &self.cells {
                    if *l == lev {
                        tags.tag(*cell)
                    }
                }
            }
        }
    }

    fn regrid_passes(params: AmrParams<2>, periodic: [bool; 2], est: &TagBoxes, passes: usize) -> Hierarchy<2> {
        let mut h = hierarchy(params, periodic);

        for _ in 0..passes {
            let result = h.make_new_grids(0, 0.0, est, &SingleRank).unwrap();
            assert_grid_invariants(&h, &result.new_grids, result.new_finest);
            h.install(&result, &RoundRobin, 1);

            for lev in 0..=h.finest_level() {
                assert!(h.is_properly_nested(lev));
            }
        }
        h
    }

    #[test]
    fn ratio_four_with_two_proper_nesting_cells() {
        let params = params().with_ref_ratio(4).with_n_proper(2);
        let est = TagBoxes::new(vec![(0, range2d(20..28, 20..28)), (1, range2d(100..108, 90..110))]);
        let h = regrid_passes(params, [false, false], &est, 3);

        assert_eq!(h.finest_level(), 2);
        assert_eq!(h.geom(2).domain(), &range2d(0..1024, 0..1024));
        assert!(h.box_array(2).contains_point(IntVect::new([417, 401])));
        assert!(h.box_array(1).contains_point(IntVect::new([104, 100])));
    }

    #[test]
    fn anisotropic_ratios_keep_the_invariants() {
        let params = params().with_ref_ratios(vec![IntVect::new([2, 4]), IntVect::new([4, 2])]);
        assert_eq!(params.coarse_blocking_factor(0), IntVect::new([2, 1]));
        assert_eq!(params.coarse_blocking_factor(1), IntVect::new([1, 2]));

        let est = TagBoxes::new(vec![(0, range2d(20..28, 20..28)), (1, range2d(44..52, 90..100))]);
        let h = regrid_passes(params, [false, false], &est, 3);

        assert_eq!(h.finest_level(), 2);
        assert_eq!(h.geom(1).domain(), &range2d(0..128, 0..256));
        assert_eq!(h.geom(2).domain(), &range2d(0..512, 0..512));
        assert!(h.box_array(2).contains_point(IntVect::new([193, 191])));
    }

    #[test]
    fn blocking_factor_below_the_ratio_clusters_single_cells() {
        let params = params().with_ref_ratio(4).with_blocking_factor(2);
        assert_eq!(params.coarse_blocking_factor(0), IntVect::splat(1));

        let est = TagBoxes::new(vec![(0, range2d(21..22, 33..36)), (1, range2d(85..87, 135..141))]);
        let h = regrid_passes(params, [true, true], &est, 3);

        assert_eq!(h.finest_level(), 2);
        assert!(h.box_array(1).contains_point(IntVect::new([86, 138])));
        assert!(h.box_array(2).contains_point(IntVect::new([345, 553])));
    }

    #[test]
    fn manual_tags_are_clustered_and_clipped_to_the_nesting_region() {
        let mut h = hierarchy(params(), [false, false]);
        let fixed = BoxSet::from_boxes(vec![
            range2d(32..48, 32..48),
            range2d(48..64, 32..48),
            range2d(32..48, 48..64),
            range2d(48..64, 48..64),
        ]);
        h.set_box_array(1, fixed);
        h.set_finest_level(1);

        let est = ManualTags {
            cells: vec![(1, IntVect::new([48, 48])), (1, IntVect::new([100, 100]))],
            rank: 0,
            max_level: 2,
        };
        let result = h.make_new_grids(1, 0.0, &est, &SingleRank).unwrap();

        assert_eq!(result.phase, RegridPhase::Installed);
        assert_eq!(result.new_finest, 2);
        assert!(result.new_grids[2].contains_point(IntVect::new([96, 96])));
        assert!(!result.new_grids[2].contains_point(IntVect::new([200, 200])));
        assert_eq!(result.new_grids[1], *h.box_array(1));
        assert_grid_invariants(&h, &result.new_grids, 2);
    }

    #[test]
    fn manual_tags_from_one_rank_reach_every_rank() {
        let cells = vec![(0, IntVect::new([30, 40]))];
        let serial = hierarchy(params(), [false, false])
            .make_new_grids(0, 0.0, &ManualTags { cells: cells.clone(), rank: 0, max_level: 2 }, &SingleRank)
            .unwrap();

        assert_eq!(serial.new_finest, 1);
        assert!(serial.new_grids[1].contains_point(IntVect::new([60, 80])));
        assert!(serial.new_grids[1].contains_point(IntVect::new([61, 81])));

        let handles: Vec<_> = ChannelCommunicator::group(3)
            .into_iter()
            .map(|comm| {
                let est = ManualTags { cells: cells.clone(), rank: comm.rank(), max_level: 2 };
                std::thread::spawn(move || hierarchy(params(), [false, false]).make_new_grids(0, 0.0, &est, &comm).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), serial);
        }
    }
}
