use std::sync::Arc;
use log::debug;
use crate::box_set::BoxSet;




/**
 * The owning rank of each box in a level's decomposition: entry `i` owns box
 * `i` of the accompanying `BoxSet`. Like `BoxSet`, the storage is shared and
 * never modified.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionMapping {
    ranks: Arc<[usize]>,
}




// ============================================================================
impl DistributionMapping {

    pub fn new(ranks: Vec<usize>) -> Self {
        Self { ranks: Arc::from(ranks) }
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /**
     * Return the rank owning box `index`.
     */
    pub fn rank(&self, index: usize) -> usize {
        self.ranks[index]
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.ranks
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranks.iter().copied()
    }

    /**
     * Return the indexes of the boxes owned by the given rank.
     */
    pub fn owned_by(&self, rank: usize) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.ranks[i] == rank).collect()
    }
}

impl Default for DistributionMapping {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}




/**
 * Interface to a service that assigns boxes to ranks. Implementations must be
 * deterministic, since every rank computes the assignment independently.
 */
pub trait Distribute<const D: usize> {
    fn distribute(&self, boxes: &BoxSet<D>, nranks: usize) -> DistributionMapping;
}




/**
 * Deal the boxes out to the ranks in order.
 */
#[derive(Clone, Copy, Debug, Default)]
pub struct RoundRobin;

impl<const D: usize> Distribute<D> for RoundRobin {
    fn distribute(&self, boxes: &BoxSet<D>, nranks: usize) -> DistributionMapping {
        assert!(nranks > 0, "cannot distribute boxes over zero ranks");
        DistributionMapping::new((0..boxes.len()).map(|i| i % nranks).collect())
    }
}




/**
 * Greedy balancing of cell counts: boxes are taken largest first and each is
 * given to the rank with the fewest cells so far (lowest rank on ties).
 */
#[derive(Clone, Copy, Debug, Default)]
pub struct KnapsackByCells;

impl<const D: usize> Distribute<D> for KnapsackByCells {
    fn distribute(&self, boxes: &BoxSet<D>, nranks: usize) -> DistributionMapping {
        assert!(nranks > 0, "cannot distribute boxes over zero ranks");

        let mut order: Vec<usize> = (0..boxes.len()).collect();
        order.sort_by_key(|&i| (core::cmp::Reverse(boxes.as_slice()[i].len()), i));

        let mut load = vec![0usize; nranks];
        let mut ranks = vec![0; boxes.len()];

        for i in order {
            let r = (0..nranks).min_by_key(|&r| (load[r], r)).unwrap_or(0);
            ranks[i] = r;
            load[r] += boxes.as_slice()[i].len();
        }
        debug!("knapsack loads: {:?}", load);
        DistributionMapping::new(ranks)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{Distribute, KnapsackByCells, RoundRobin};
    use crate::box_set::BoxSet;
    use crate::index_space::range2d;

    fn boxes() -> BoxSet<2> {
        BoxSet::from_boxes(vec![
            range2d(0..8, 0..8),
            range2d(8..40, 0..32),
            range2d(0..8, 8..16),
            range2d(40..56, 0..16),
        ])
    }

    #[test]
    fn round_robin_cycles_through_ranks() {
        let map = RoundRobin.distribute(&boxes(), 3);
        assert_eq!(map.as_slice(), &[0, 1, 2, 0]);
        assert_eq!(map.owned_by(0), vec![0, 3]);
    }

    #[test]
    fn knapsack_gives_the_big_box_its_own_rank() {
        let map = KnapsackByCells.distribute(&boxes(), 2);
        assert_eq!(map.len(), 4);
        assert_eq!(map.rank(1), 0);
        assert_eq!(map.owned_by(1), vec![0, 2, 3]);
    }
}
