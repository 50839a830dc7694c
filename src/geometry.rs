use serde::{Deserialize, Serialize};
use crate::box_set::BoxSet;
use crate::error::Error;
use crate::index_space::IndexSpace;
use crate::int_vect::IntVect;
use crate::parmparse::ParmParse;




/**
 * A rectangle in physical space
 */
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RealBox<const D: usize> {
    #[serde(with = "crate::array")]
    lo: [f64; D],
    #[serde(with = "crate::array")]
    hi: [f64; D],
}




// ============================================================================
impl<const D: usize> RealBox<D> {
    pub fn new(lo: [f64; D], hi: [f64; D]) -> Self {
        assert!(
            (0..D).all(|d| lo[d] < hi[d]),
            "real box has non-positive extent: {:?} .. {:?}", lo, hi);
        Self { lo, hi }
    }

    pub fn unit() -> Self {
        Self::new([0.0; D], [1.0; D])
    }

    pub fn lo(&self) -> [f64; D] {
        self.lo
    }

    pub fn hi(&self) -> [f64; D] {
        self.hi
    }

    pub fn length(&self, axis: usize) -> f64 {
        self.hi[axis] - self.lo[axis]
    }
}




/**
 * Enum to identify the coordinate system of the physical domain
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordSys {
    Cartesian,
    Cylindrical,
    Spherical,
}




// ============================================================================
impl CoordSys {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CoordSys::Cartesian),
            1 => Some(CoordSys::Cylindrical),
            2 => Some(CoordSys::Spherical),
            _ => None,
        }
    }
}




/**
 * The geometry of one refinement level: the physical domain, the index space
 * of cells that discretize it at this level, the coordinate system, and which
 * axes are periodic. Levels share the physical box, coordinate system and
 * periodicity, and differ only in the index domain.
 */
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry<const D: usize> {
    prob_domain: RealBox<D>,
    domain: IndexSpace<D>,
    coord: CoordSys,
    #[serde(with = "crate::array")]
    periodic: [bool; D],
}




// ============================================================================
impl<const D: usize> Geometry<D> {

    pub fn new(prob_domain: RealBox<D>, domain: IndexSpace<D>, coord: CoordSys, periodic: [bool; D]) -> Self {
        assert!(!domain.is_empty(), "geometry index domain is empty");
        Self { prob_domain, domain, coord, periodic }
    }

    /**
     * Read the physical domain, coordinate system, and periodic flags from the
     * `geometry` namespace of the given parameter table. The index domain is
     * not part of that namespace, so it is passed in.
     */
    pub fn from_parm(pp: &ParmParse, domain: IndexSpace<D>) -> Result<Self, Error> {
        let lo: Vec<f64> = pp.query_arr("prob_lo")?.unwrap_or_else(|| vec![0.0; D]);
        let hi: Vec<f64> = pp.query_arr("prob_hi")?.unwrap_or_else(|| vec![1.0; D]);
        let code: i64 = pp.query("coord_sys")?.unwrap_or(0);
        let periodic: Vec<bool> = pp.query_arr("is_periodic")?.unwrap_or_else(|| vec![false; D]);

        let lo: [f64; D] = lo.try_into().map_err(|_| Error::invalid(format!("geometry.prob_lo needs {} values", D)))?;
        let hi: [f64; D] = hi.try_into().map_err(|_| Error::invalid(format!("geometry.prob_hi needs {} values", D)))?;
        let periodic: [bool; D] = periodic.try_into().map_err(|_| Error::invalid(format!("geometry.is_periodic needs {} values", D)))?;
        let coord = CoordSys::from_code(code).ok_or_else(|| Error::invalid(format!("unknown geometry.coord_sys {}", code)))?;

        if (0..D).any(|d| lo[d] >= hi[d]) {
            return Err(Error::invalid("geometry.prob_hi must exceed geometry.prob_lo on every axis"));
        }
        Ok(Self::new(RealBox::new(lo, hi), domain, coord, periodic))
    }

    pub fn prob_domain(&self) -> &RealBox<D> {
        &self.prob_domain
    }

    pub fn domain(&self) -> &IndexSpace<D> {
        &self.domain
    }

    pub fn coord(&self) -> CoordSys {
        self.coord
    }

    pub fn periodicity(&self) -> [bool; D] {
        self.periodic
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    pub fn is_any_periodic(&self) -> bool {
        self.periodic.iter().any(|&p| p)
    }

    /**
     * Return the number of cells in one period along the given axis.
     */
    pub fn period(&self, axis: usize) -> i64 {
        self.domain.dim()[axis]
    }

    pub fn cell_size(&self) -> [f64; D] {
        let dim = self.domain.dim();
        core::array::from_fn(|d| self.prob_domain.length(d) / dim[d] as f64)
    }

    /**
     * Return the geometry of the next finer level.
     */
    pub fn refine(&self, ratio: IntVect<D>) -> Self {
        Self { domain: self.domain.scale(ratio), ..*self }
    }

    /**
     * Return the geometry of the next coarser level. The domain must divide
     * evenly by the ratio.
     */
    pub fn coarsen(&self, ratio: IntVect<D>) -> Self {
        let domain = self.domain.coarsen(ratio);
        assert!(domain.scale(ratio) == self.domain, "domain {:?} is not coarsenable by {:?}", self.domain, ratio);
        Self { domain, ..*self }
    }

    /**
     * Return every non-zero shift by whole periods, -1, 0, or +1 period on
     * each periodic axis and 0 on the others. The order is fixed: the shifts
     * are enumerated lexicographically by multiplier.
     */
    pub fn periodic_shifts(&self) -> Vec<IntVect<D>> {
        let mut shifts = vec![IntVect::zero()];

        for d in 0..D {
            if self.periodic[d] {
                let period = self.period(d);
                shifts = shifts
                    .into_iter()
                    .flat_map(|s| (-1..=1).map(move |k| {
                        let mut t = s;
                        t[d] = k * period;
                        t
                    }))
                    .collect();
            }
        }
        shifts.into_iter().filter(|s| *s != IntVect::zero()).collect()
    }

    /**
     * Return the given boxes together with their periodic images, each image
     * clipped to the domain. Pieces of a box lying outside the domain across a
     * periodic boundary thereby reappear on the opposite side.
     */
    pub fn proj_periodic(&self, boxes: &BoxSet<D>) -> BoxSet<D> {
        let mut result: Vec<_> = boxes.iter().copied().collect();

        for shift in self.periodic_shifts() {
            for b in boxes.iter() {
                if let Some(image) = b.shift(shift).intersect(&self.domain) {
                    result.push(image)
                }
            }
        }
        BoxSet::from_boxes(result)
    }

    /**
     * Map an index into the domain through the periodic axes. Returns `None`
     * if the index lies outside the domain along a non-periodic axis.
     */
    pub fn wrap(&self, index: IntVect<D>) -> Option<IntVect<D>> {
        let mut wrapped = index;

        for d in 0..D {
            let lo = self.domain.start()[d];
            let hi = self.domain.end()[d];

            if wrapped[d] < lo || wrapped[d] >= hi {
                if self.periodic[d] {
                    wrapped[d] = lo + (wrapped[d] - lo).rem_euclid(hi - lo)
                } else {
                    return None;
                }
            }
        }
        Some(wrapped)
    }

    /**
     * Return the parts of `space` that lie in the domain, with parts outside
     * across a periodic boundary mapped back in, and parts outside across a
     * non-periodic boundary discarded.
     */
    pub fn wrap_space(&self, space: &IndexSpace<D>) -> BoxSet<D> {
        let mut result = Vec::new();

        if let Some(inside) = space.intersect(&self.domain) {
            result.push(inside)
        }
        for shift in self.periodic_shifts() {
            if let Some(image) = space.shift(shift).intersect(&self.domain) {
                result.push(image)
            }
        }
        BoxSet::from_boxes(result)
    }
}
