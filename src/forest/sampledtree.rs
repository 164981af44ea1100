use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

use crate::forest::sampler::{SamplerState, WeightedSampler};
use crate::forest::tree::{CutTree, TreeState};
use crate::store::pointstore::PointStoreView;
use crate::types::{Result, StoreFloat, StoreIndex};
use crate::visitor::{Visitor, VisitorInfo};

/// One member of the ensemble: a time-decayed sampler feeding a cut tree.
/// The pair owns an evolving seed chain, so an update sequence replays
/// identically regardless of how the ensemble schedules the trees.
pub struct SampledTree<C, P, N, F>
where
    C: StoreIndex,
    P: StoreIndex,
    N: StoreIndex,
    F: StoreFloat,
{
    tree: CutTree<C, P, N, F>,
    sampler: WeightedSampler<P>,
    time_decay: f64,
    initial_accept_fraction: f64,
    entries_seen: u64,
    random_seed: u64,
}

/// Captured state of a [`SampledTree`].
#[derive(Clone, Debug)]
pub struct SampledTreeState {
    pub time_decay: f64,
    pub initial_accept_fraction: f64,
    pub entries_seen: u64,
    pub random_seed: u64,
    pub sampler: SamplerState,
    pub tree: TreeState,
}

impl<C, P, N, F> SampledTree<C, P, N, F>
where
    C: StoreIndex,
    P: StoreIndex,
    N: StoreIndex,
    F: StoreFloat,
{
    pub fn new(
        dimensions: usize,
        capacity: usize,
        rotation_aware: bool,
        random_seed: u64,
        store_sequences: bool,
        time_decay: f64,
        initial_accept_fraction: f64,
        cache_fraction: f64,
    ) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(random_seed);
        let self_seed = rng.next_u64();
        SampledTree {
            tree: CutTree::new(
                dimensions,
                capacity,
                rotation_aware,
                cache_fraction,
                rng.next_u64(),
            ),
            sampler: WeightedSampler::new(capacity, store_sequences),
            time_decay,
            initial_accept_fraction,
            entries_seen: 0,
            random_seed: self_seed,
        }
    }

    /// Offer one point; returns (inserted, deleted) point indices from the
    /// point store's perspective, for reference count adjustment.
    pub fn update<PS: PointStoreView<F>>(
        &mut self,
        point_index: usize,
        point_store: &PS,
    ) -> Result<(Option<usize>, Option<usize>)> {
        let mut rng = ChaCha20Rng::seed_from_u64(self.random_seed);
        self.random_seed = rng.next_u64();
        let random: f64 = rng.gen();
        let weight = f64::ln(-f64::ln(random)) - self.entries_seen as f64 * self.time_decay;
        let initial = if !self.sampler.is_full() {
            let other: f64 = rng.gen();
            other < self.initial_accept_probability(self.sampler.fill_fraction())
        } else {
            false
        };
        let acceptance = self
            .sampler
            .accept_point(initial, weight as f32, self.entries_seen);
        self.entries_seen += 1;
        if acceptance.accepted {
            let deleted = match acceptance.evicted {
                Some((evicted_point, _sequence)) => {
                    Some(self.tree.delete(evicted_point, point_store)?)
                }
                None => None,
            };
            // the tree may return a reference to an existing equal point
            let added = self.tree.add(point_index, point_store)?;
            self.sampler.push_accepted(added)?;
            return Ok((Some(added), deleted));
        }
        Ok((None, None))
    }

    fn initial_accept_probability(&self, fill_fraction: f64) -> f64 {
        if fill_fraction < self.initial_accept_fraction {
            1.0
        } else if self.initial_accept_fraction >= 1.0 {
            0.0
        } else {
            1.0 - (fill_fraction - self.initial_accept_fraction)
                / (1.0 - self.initial_accept_fraction)
        }
    }

    pub fn traverse<PS, V, R>(
        &self,
        point: &[F],
        point_store: &PS,
        parameters: &[usize],
        visitor_info: &VisitorInfo<F>,
        visitor_factory: fn(usize, &[usize], &VisitorInfo<F>) -> V,
        default: &R,
    ) -> Result<R>
    where
        PS: PointStoreView<F>,
        V: Visitor<F, R>,
        R: Clone,
    {
        self.tree.traverse(
            point,
            parameters,
            visitor_factory,
            visitor_info,
            point_store,
            default,
        )
    }

    pub fn conditional_field<PS: PointStoreView<F>>(
        &self,
        missing: &[usize],
        centrality: f64,
        point: &[F],
        point_store: &PS,
        visitor_info: &VisitorInfo<F>,
    ) -> Result<(f64, usize, f64)> {
        self.tree.conditional_field(
            missing,
            point,
            point_store,
            centrality,
            self.random_seed,
            visitor_info,
        )
    }

    pub fn set_cache_fraction<PS: PointStoreView<F>>(
        &mut self,
        fraction: f64,
        point_store: &PS,
    ) -> Result<()> {
        self.tree.set_cache_fraction(fraction, point_store)
    }

    pub fn validate<PS: PointStoreView<F>>(&self, point_store: &PS) -> Result<()> {
        self.tree.validate(point_store)
    }

    pub fn collect_leaves(&self, answer: &mut Vec<(usize, usize)>) {
        self.tree.collect_leaves(answer);
    }

    pub fn sampler_size(&self) -> usize {
        self.sampler.size()
    }

    pub fn tree_mass(&self) -> usize {
        self.tree.mass()
    }

    pub fn to_state(&self) -> SampledTreeState {
        SampledTreeState {
            time_decay: self.time_decay,
            initial_accept_fraction: self.initial_accept_fraction,
            entries_seen: self.entries_seen,
            random_seed: self.random_seed,
            sampler: self.sampler.to_state(),
            tree: self.tree.to_state(),
        }
    }

    pub fn from_state<PS: PointStoreView<F>>(
        state: &SampledTreeState,
        point_store: &PS,
        validate_heap: bool,
    ) -> Result<Self> {
        Ok(SampledTree {
            tree: CutTree::from_state(&state.tree, point_store)?,
            sampler: WeightedSampler::from_state(&state.sampler, validate_heap)?,
            time_decay: state.time_decay,
            initial_accept_fraction: state.initial_accept_fraction,
            entries_seen: state.entries_seen,
            random_seed: state.random_seed,
        })
    }
}
