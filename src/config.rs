use serde::{Deserialize, Serialize};
use crate::error::Error;
use crate::int_vect::IntVect;
use crate::parmparse::{FromParm, ParmParse};




/**
 * The numeric knobs of a grid hierarchy. Per-level arrays have one entry per
 * level `0..=max_level`, except `ref_ratio` which has one entry per level
 * transition (`ref_ratio[lev]` relates `lev` to `lev + 1`). The parameters
 * are frozen once they are moved into a `Hierarchy`.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmrParams<const D: usize> {
    verbose: i32,
    max_level: usize,
    ref_ratio: Vec<IntVect<D>>,
    blocking_factor: Vec<IntVect<D>>,
    max_grid_size: Vec<IntVect<D>>,
    n_error_buf: Vec<i64>,
    grid_eff: f64,
    n_proper: i64,
    use_fixed_coarse_grids: bool,
    use_fixed_upto_level: usize,
    refine_grid_layout: bool,
    max_split_depth: usize,
}




// ============================================================================
impl<const D: usize> Default for AmrParams<D> {
    fn default() -> Self {
        Self {
            verbose: 0,
            max_level: 0,
            ref_ratio: Vec::new(),
            blocking_factor: vec![IntVect::splat(8)],
            max_grid_size: vec![IntVect::splat(32)],
            n_error_buf: vec![1],
            grid_eff: 0.7,
            n_proper: 1,
            use_fixed_coarse_grids: false,
            use_fixed_upto_level: 0,
            refine_grid_layout: true,
            max_split_depth: 32,
        }
    }
}




// ============================================================================
impl<const D: usize> AmrParams<D> {

    pub fn new() -> Self {
        Self::default()
    }

    /**
     * Set the finest allowed level. Per-level arrays are truncated, or
     * extended by repeating their last entry (2 for an empty `ref_ratio`).
     */
    pub fn with_max_level(mut self, max_level: usize) -> Self {
        self.max_level = max_level;
        resize_repeating(&mut self.ref_ratio, max_level, IntVect::splat(2));
        resize_repeating(&mut self.blocking_factor, max_level + 1, IntVect::splat(8));
        resize_repeating(&mut self.max_grid_size, max_level + 1, IntVect::splat(32));
        resize_repeating(&mut self.n_error_buf, max_level + 1, 1);
        self
    }

    pub fn with_ref_ratio(mut self, ratio: i64) -> Self {
        self.ref_ratio = vec![IntVect::splat(ratio); self.max_level];
        self
    }

    pub fn with_ref_ratios(mut self, ratios: Vec<IntVect<D>>) -> Self {
        self.ref_ratio = ratios;
        self
    }

    pub fn with_blocking_factor(mut self, bf: i64) -> Self {
        self.blocking_factor = vec![IntVect::splat(bf); self.max_level + 1];
        self
    }

    pub fn with_blocking_factors(mut self, bf: Vec<IntVect<D>>) -> Self {
        self.blocking_factor = bf;
        self
    }

    pub fn with_max_grid_size(mut self, mgs: i64) -> Self {
        self.max_grid_size = vec![IntVect::splat(mgs); self.max_level + 1];
        self
    }

    pub fn with_max_grid_sizes(mut self, mgs: Vec<IntVect<D>>) -> Self {
        self.max_grid_size = mgs;
        self
    }

    pub fn with_n_error_buf(mut self, n: i64) -> Self {
        self.n_error_buf = vec![n; self.max_level + 1];
        self
    }

    pub fn with_n_error_bufs(mut self, n: Vec<i64>) -> Self {
        self.n_error_buf = n;
        self
    }

    pub fn with_grid_eff(mut self, grid_eff: f64) -> Self {
        self.grid_eff = grid_eff;
        self
    }

    pub fn with_n_proper(mut self, n_proper: i64) -> Self {
        self.n_proper = n_proper;
        self
    }

    /**
     * Freeze the decomposition of every level below `upto_level`: regridding
     * reuses those levels' existing grids.
     */
    pub fn with_fixed_coarse_grids(mut self, upto_level: usize) -> Self {
        self.use_fixed_coarse_grids = true;
        self.use_fixed_upto_level = upto_level;
        self
    }

    pub fn with_refine_grid_layout(mut self, refine_grid_layout: bool) -> Self {
        self.refine_grid_layout = refine_grid_layout;
        self
    }

    pub fn with_max_split_depth(mut self, depth: usize) -> Self {
        self.max_split_depth = depth;
        self
    }

    pub fn with_verbose(mut self, verbose: i32) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn verbose(&self) -> i32 {
        self.verbose
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    pub fn ref_ratio(&self, lev: usize) -> IntVect<D> {
        assert!(lev < self.max_level, "no refinement ratio above level {} (max_level is {})", lev, self.max_level);
        self.ref_ratio[lev]
    }

    pub fn ref_ratios(&self) -> &[IntVect<D>] {
        &self.ref_ratio
    }

    pub fn blocking_factor(&self, lev: usize) -> IntVect<D> {
        self.blocking_factor[self.checked_level(lev)]
    }

    pub fn max_grid_size(&self, lev: usize) -> IntVect<D> {
        self.max_grid_size[self.checked_level(lev)]
    }

    pub fn n_error_buf(&self, lev: usize) -> i64 {
        self.n_error_buf[self.checked_level(lev)]
    }

    pub fn grid_eff(&self) -> f64 {
        self.grid_eff
    }

    pub fn n_proper(&self) -> i64 {
        self.n_proper
    }

    pub fn use_fixed_coarse_grids(&self) -> bool {
        self.use_fixed_coarse_grids
    }

    pub fn use_fixed_upto_level(&self) -> usize {
        self.use_fixed_upto_level
    }

    pub fn refine_grid_layout(&self) -> bool {
        self.refine_grid_layout
    }

    pub fn max_split_depth(&self) -> usize {
        self.max_split_depth
    }

    /**
     * Return the blocking factor used for clustering on level `levc`, whose
     * grids become level `levc + 1` after refinement.
     */
    pub fn coarse_blocking_factor(&self, levc: usize) -> IntVect<D> {
        let bf = self.blocking_factor(levc + 1);
        let ratio = self.ref_ratio(levc);
        (bf / ratio).map(|b| b.max(1))
    }

    /**
     * Check the parameters for consistency. Every failure names the
     * offending parameter.
     */
    pub fn validate(&self) -> Result<(), Error> {
        let nlev = self.max_level + 1;

        if self.ref_ratio.len() != self.max_level {
            return Err(Error::invalid(format!("amr.ref_ratio needs {} entries, has {}", self.max_level, self.ref_ratio.len())));
        }
        for (name, len) in [
            ("blocking_factor", self.blocking_factor.len()),
            ("max_grid_size", self.max_grid_size.len()),
            ("n_error_buf", self.n_error_buf.len()),
        ] {
            if len != nlev {
                return Err(Error::invalid(format!("amr.{} needs {} entries, has {}", name, nlev, len)));
            }
        }
        if let Some(r) = self.ref_ratio.iter().find(|r| !r.all_positive()) {
            return Err(Error::invalid(format!("amr.ref_ratio must be positive, got {:?}", r)));
        }
        if let Some(b) = self.blocking_factor.iter().find(|b| !b.all_positive()) {
            return Err(Error::invalid(format!("amr.blocking_factor must be positive, got {:?}", b)));
        }
        if !(self.grid_eff > 0.0 && self.grid_eff <= 1.0) {
            return Err(Error::invalid(format!("amr.grid_eff must be in (0, 1], got {}", self.grid_eff)));
        }
        if self.n_proper < 0 {
            return Err(Error::invalid(format!("amr.n_proper must be non-negative, got {}", self.n_proper)));
        }
        if let Some(n) = self.n_error_buf.iter().find(|&&n| n < 0) {
            return Err(Error::invalid(format!("amr.n_error_buf must be non-negative, got {}", n)));
        }
        for lev in 0..nlev {
            let bf = self.blocking_factor[lev];
            let mgs = self.max_grid_size[lev];

            for d in 0..D {
                if mgs[d] < bf[d] || mgs[d] % bf[d] != 0 {
                    return Err(Error::invalid(format!(
                        "amr.max_grid_size {:?} on level {} is not a multiple of amr.blocking_factor {:?}", mgs, lev, bf)));
                }
            }
        }
        for lev in 1..nlev {
            let bf = self.blocking_factor[lev];
            let mgs = self.max_grid_size[lev];
            let ratio = self.ref_ratio[lev - 1];

            for d in 0..D {
                if bf[d] % ratio[d] != 0 && ratio[d] % bf[d] != 0 {
                    return Err(Error::invalid(format!(
                        "amr.blocking_factor {:?} on level {} is incompatible with amr.ref_ratio {:?}", bf, lev, ratio)));
                }
                if mgs[d] < ratio[d] {
                    return Err(Error::invalid(format!(
                        "amr.max_grid_size {:?} on level {} is smaller than amr.ref_ratio {:?}", mgs, lev, ratio)));
                }
            }
        }
        Ok(())
    }

    /**
     * Read parameters from a view of the `amr` namespace, starting from the
     * defaults. Per-level values may be given once (applies to every level)
     * or once per level; a short list is extended by repeating its last
     * value. The result is validated.
     */
    pub fn from_parm(pp: &ParmParse) -> Result<Self, Error> {
        let mut params = Self::default();

        if let Some(verbose) = pp.query("v")? {
            params.verbose = verbose;
        }
        if let Some(verbose) = pp.query("verbose")? {
            params.verbose = verbose;
        }
        if let Some(max_level) = pp.query::<usize>("max_level")? {
            params = params.with_max_level(max_level);
        }
        let nlev = params.max_level + 1;

        if pp.contains("ref_ratio_vect") {
            let flat: Vec<i64> = pp.get_arr("ref_ratio_vect")?;

            if flat.len() < D * params.max_level {
                return Err(Error::invalid(format!("amr.ref_ratio_vect needs {} values", D * params.max_level)));
            }
            params.ref_ratio = (0..params.max_level).map(|lev| IntVect::from_fn(|d| flat[lev * D + d])).collect();
        } else if let Some(r) = per_level::<i64>(pp, "ref_ratio", params.max_level)? {
            params.ref_ratio = r.into_iter().map(IntVect::splat).collect();
        }
        if let Some(bf) = per_level::<i64>(pp, "blocking_factor", nlev)? {
            params.blocking_factor = bf.into_iter().map(IntVect::splat).collect();
        }
        if let Some(mgs) = per_level::<i64>(pp, "max_grid_size", nlev)? {
            params.max_grid_size = mgs.into_iter().map(IntVect::splat).collect();
        }
        if let Some(n) = per_level::<i64>(pp, "n_error_buf", nlev)? {
            params.n_error_buf = n;
        }
        if let Some(grid_eff) = pp.query("grid_eff")? {
            params.grid_eff = grid_eff;
        }
        if let Some(n_proper) = pp.query("n_proper")? {
            params.n_proper = n_proper;
        }
        if let Some(fixed) = pp.query("use_fixed_coarse_grids")? {
            params.use_fixed_coarse_grids = fixed;
        }
        if let Some(upto) = pp.query("use_fixed_upto_level")? {
            params.use_fixed_upto_level = upto;
        }
        if let Some(refine) = pp.query("refine_grid_layout")? {
            params.refine_grid_layout = refine;
        }
        if let Some(depth) = pp.query("max_split_depth")? {
            params.max_split_depth = depth;
        }
        params.validate()?;
        Ok(params)
    }

    fn checked_level(&self, lev: usize) -> usize {
        assert!(lev <= self.max_level, "level {} exceeds max_level {}", lev, self.max_level);
        lev
    }
}




// ============================================================================
fn resize_repeating<T: Copy>(values: &mut Vec<T>, len: usize, fallback: T) {
    let fill = values.last().copied().unwrap_or(fallback);
    values.resize(len, fill);
}

fn per_level<T: FromParm + Clone>(pp: &ParmParse, name: &str, nlev: usize) -> Result<Option<Vec<T>>, Error> {
    match pp.query_arr::<T>(name)? {
        None => Ok(None),
        Some(values) if values.is_empty() => Ok(None),
        Some(mut values) => {
            let last = values[values.len() - 1].clone();
            values.resize(nlev, last);
            Ok(Some(values))
        }
    }
}
