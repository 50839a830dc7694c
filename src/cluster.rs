use log::debug;
use crate::box_set::BoxSet;
use crate::index_space::IndexSpace;
use crate::int_vect::IntVect;
use crate::tag_field::TagField;




/**
 * Knobs for the grid generator.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterParams<const D: usize> {
    /// A box is accepted once this fraction of its cells is tagged.
    pub grid_eff: f64,
    /// Box corners are multiples of this, and no box is narrower.
    pub blocking_factor: IntVect<D>,
    /// Upper bound on box sides; a multiple of the blocking factor.
    pub max_grid_size: IntVect<D>,
    /// Splits deeper than this accept the box regardless of efficiency.
    pub max_split_depth: usize,
}




/**
 * Which rules the grid generator applied while clustering. Every output box
 * (before chopping to the size ceiling) is counted in exactly one of the
 * `accepted_*` fields.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClusterStats {
    pub accepted_efficient: usize,
    pub accepted_minimum_size: usize,
    pub accepted_split_budget: usize,
    pub holes: usize,
    pub valleys: usize,
    pub bisections: usize,
}




// ============================================================================
impl ClusterStats {
    pub fn boxes(&self) -> usize {
        self.accepted_efficient + self.accepted_minimum_size + self.accepted_split_budget
    }

    pub fn splits(&self) -> usize {
        self.holes + self.valleys + self.bisections
    }

    fn combine(self, other: Self) -> Self {
        Self {
            accepted_efficient: self.accepted_efficient + other.accepted_efficient,
            accepted_minimum_size: self.accepted_minimum_size + other.accepted_minimum_size,
            accepted_split_budget: self.accepted_split_budget + other.accepted_split_budget,
            holes: self.holes + other.holes,
            valleys: self.valleys + other.valleys,
            bisections: self.bisections + other.bisections,
        }
    }
}




#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SplitKind {
    Hole,
    Valley,
    Bisection,
}




/**
 * Cover the tagged cells with boxes aligned to the blocking factor. Starting
 * from the bounding box of the tags, a box whose fraction of tagged cells is
 * below `grid_eff` is split in two: at an empty plane if there is one, else
 * at the deepest valley of the tag histogram, else down the middle. Each half
 * is shrunk to the aligned bounding box of its own tags, and halves without
 * tags are dropped. A box is accepted without further splitting if it is
 * efficient, if it is less than two blocking factors wide on every axis, or
 * if `max_split_depth` splits led to it. The accepted boxes are finally
 * chopped to `max_grid_size`.
 *
 * The two halves of a split are clustered in parallel, but the output always
 * lists the lower half's boxes first, so the result depends only on the tags
 * and the parameters.
 */
pub fn cluster<const D: usize>(tags: &TagField<D>, params: &ClusterParams<D>) -> (BoxSet<D>, ClusterStats) {
    let bf = params.blocking_factor;

    match tags.bounding_box(tags.space()) {
        None => (BoxSet::new(), ClusterStats::default()),
        Some(bbox) => {
            let (boxes, stats) = split_recursive(tags, params, bbox.snap_outward(bf), 0);
            debug!("clustered {} tags into {} boxes ({:?})", tags.num_tagged(), boxes.len(), stats);
            (BoxSet::from_boxes(boxes).max_size(params.max_grid_size, bf), stats)
        }
    }
}

fn split_recursive<const D: usize>(
    tags: &TagField<D>,
    params: &ClusterParams<D>,
    space: IndexSpace<D>,
    depth: usize) -> (Vec<IndexSpace<D>>, ClusterStats)
{
    let bf = params.blocking_factor;
    let efficiency = tags.num_tagged_in(&space) as f64 / space.len() as f64;
    let splittable: Vec<usize> = (0..D).filter(|&d| space.dim()[d] >= 2 * bf[d]).collect();

    if efficiency >= params.grid_eff {
        return (vec![space], ClusterStats { accepted_efficient: 1, ..Default::default() });
    }
    if splittable.is_empty() {
        return (vec![space], ClusterStats { accepted_minimum_size: 1, ..Default::default() });
    }
    if depth >= params.max_split_depth {
        debug!("accepting {:?} at efficiency {:.3}: split budget exhausted", space, efficiency);
        return (vec![space], ClusterStats { accepted_split_budget: 1, ..Default::default() });
    }

    let (axis, index, kind) = choose_split(tags, &space, bf, &splittable);
    let (lower, upper) = space.split_at(axis, index);

    let child = |half: IndexSpace<D>| match tags.bounding_box(&half) {
        None => (Vec::new(), ClusterStats::default()),
        Some(tight) => split_recursive(tags, params, tight.snap_outward(bf), depth + 1),
    };
    let ((mut boxes, lower_stats), (upper_boxes, upper_stats)) = rayon::join(|| child(lower), || child(upper));

    let this_split = ClusterStats {
        holes: (kind == SplitKind::Hole) as usize,
        valleys: (kind == SplitKind::Valley) as usize,
        bisections: (kind == SplitKind::Bisection) as usize,
        ..Default::default()
    };
    boxes.extend(upper_boxes);
    (boxes, lower_stats.combine(upper_stats).combine(this_split))
}




// ============================================================================
/**
 * Choose an axis and a cut index for a box which is at least two blocking
 * factors wide on each of the `splittable` axes. The cut is a multiple of
 * the blocking factor at least one blocking factor from either end.
 */
fn choose_split<const D: usize>(
    tags: &TagField<D>,
    space: &IndexSpace<D>,
    bf: IntVect<D>,
    splittable: &[usize]) -> (usize, i64, SplitKind)
{
    let signatures: Vec<(usize, Vec<usize>)> = splittable.iter().map(|&d| (d, tags.signature(space, d))).collect();
    let middle = |d: usize| (space.start()[d] + space.end()[d]) / 2;

    // Empty plane nearest the middle of the box.
    let hole = signatures
        .iter()
        .flat_map(|(d, sig)| {
            sig.iter()
                .enumerate()
                .filter(|(_, n)| **n == 0)
                .map(move |(i, _)| (*d, space.start()[*d] + i as i64))
        })
        .min_by_key(|&(d, plane)| ((plane - middle(d)).abs(), d, plane));

    if let Some((d, plane)) = hole {
        return (d, aligned_cut(space, d, plane, bf[d]), SplitKind::Hole);
    }

    // Deepest strict local minimum, ties going to the one nearest the middle.
    let valley = signatures
        .iter()
        .flat_map(|(d, sig)| {
            (1..sig.len().saturating_sub(1))
                .filter(move |&i| sig[i] < sig[i - 1] && sig[i] < sig[i + 1])
                .map(move |i| (*d, space.start()[*d] + i as i64, sig[i - 1].min(sig[i + 1]) - sig[i]))
        })
        .min_by_key(|&(d, plane, depth)| (core::cmp::Reverse(depth), (plane - middle(d)).abs(), d, plane));

    if let Some((d, plane, _)) = valley {
        return (d, aligned_cut(space, d, plane, bf[d]), SplitKind::Valley);
    }

    let d = splittable
        .iter()
        .copied()
        .fold(splittable[0], |best, d| if space.dim()[d] > space.dim()[best] { d } else { best });

    (d, aligned_cut(space, d, middle(d), bf[d]), SplitKind::Bisection)
}

/**
 * Round `plane` to the nearest multiple of `bf`, then clamp it so each side
 * keeps at least one blocking factor.
 */
pub(crate) fn aligned_cut<const D: usize>(space: &IndexSpace<D>, axis: usize, plane: i64, bf: i64) -> i64 {
    let nearest = (plane + bf / 2).div_euclid(bf) * bf;
    nearest.clamp(space.start()[axis] + bf, space.end()[axis] - bf)
}
