use crate::types::{Result, StoreIndex};
use crate::util::{check_index, check_state};

/// Outcome of offering a point to the sampler.
pub struct Acceptance {
    pub accepted: bool,
    /// point index and sequence index of the entry displaced by this
    /// acceptance, if any
    pub evicted: Option<(usize, u64)>,
}

/// Time-decayed reservoir over at most `capacity` points, kept as a max-heap
/// on weight `ln(-ln(U)) - lambda * sequence`. The largest weight is the
/// first to go, so recent points (more negative weights) tend to survive.
/// Ties are broken by insertion order through the strict heap comparisons.
pub struct WeightedSampler<P>
where
    P: StoreIndex,
{
    capacity: usize,
    current_size: usize,
    weights: Vec<f32>,
    point_indices: Vec<P>,
    sequence_indices: Vec<u64>,
    store_sequences: bool,
    // (weight, sequence) pending between accept_point and push_accepted
    accepted: Option<(f32, u64)>,
    evicted: Option<(usize, f32, u64)>,
}

/// Captured state of a [`WeightedSampler`]; the heap layout is preserved
/// verbatim so an in-order traversal reproduces exactly.
#[derive(Clone, Debug)]
pub struct SamplerState {
    pub capacity: usize,
    pub weights: Vec<f32>,
    pub point_indices: Vec<usize>,
    pub sequence_indices: Vec<u64>,
    pub store_sequences: bool,
}

impl<P> WeightedSampler<P>
where
    P: StoreIndex,
{
    pub fn new(capacity: usize, store_sequences: bool) -> Self {
        WeightedSampler {
            capacity,
            current_size: 0,
            weights: vec![0.0; capacity],
            point_indices: vec![P::MAX_INDEX; capacity],
            sequence_indices: if store_sequences {
                vec![0; capacity]
            } else {
                Vec::new()
            },
            store_sequences,
            accepted: None,
            evicted: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.current_size
    }

    pub fn is_full(&self) -> bool {
        self.current_size == self.capacity
    }

    pub fn fill_fraction(&self) -> f64 {
        if self.is_full() {
            1.0
        } else {
            self.current_size as f64 / self.capacity as f64
        }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights[0..self.current_size]
    }

    pub fn point_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.point_indices[0..self.current_size]
            .iter()
            .map(|x| x.to_usize())
    }

    pub fn sequence_indices(&self) -> Option<&[u64]> {
        if self.store_sequences {
            Some(&self.sequence_indices[0..self.current_size])
        } else {
            None
        }
    }

    /// the entry displaced by the last accepted point, cleared on the next
    /// acceptance
    pub fn evicted_point(&self) -> Option<(usize, f32, u64)> {
        self.evicted
    }

    /// Offer a point with the given weight. `initial` short-circuits the
    /// weight comparison while the sampler is filling.
    pub fn accept_point(&mut self, initial: bool, weight: f32, sequence_index: u64) -> Acceptance {
        if initial || (self.current_size > 0 && weight < self.weights[0]) {
            self.evicted = None;
            if !initial {
                let evicted = self.evict_max();
                self.evicted = Some(evicted);
            }
            self.accepted = Some((weight, sequence_index));
            let evicted = self.evicted.map(|(point, _w, sequence)| (point, sequence));
            return Acceptance {
                accepted: true,
                evicted,
            };
        }
        Acceptance {
            accepted: false,
            evicted: None,
        }
    }

    /// Complete an acceptance with the point index chosen by the tree (the
    /// tree may coalesce the insert into an existing equal point).
    pub fn push_accepted(&mut self, point_index: usize) -> Result<()> {
        let (weight, sequence) = self.accepted.take().ok_or(crate::errors::ForestError::IllegalState {
            msg: "push without a preceding acceptance",
        })?;
        check_state(self.current_size < self.capacity, "sampler overflow")?;
        self.weights[self.current_size] = weight;
        self.point_indices[self.current_size] = P::from_usize(point_index);
        if self.store_sequences {
            self.sequence_indices[self.current_size] = sequence;
        }
        let mut current = self.current_size;
        self.current_size += 1;
        while current > 0 {
            let parent = (current - 1) / 2;
            if self.weights[parent] < self.weights[current] {
                self.swap(parent, current);
                current = parent;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// evict the maximum weight entry; usable repeatedly to shrink the sample
    pub fn evict_max(&mut self) -> (usize, f32, u64) {
        let evicted = (
            self.point_indices[0].to_usize(),
            self.weights[0],
            if self.store_sequences {
                self.sequence_indices[0]
            } else {
                0
            },
        );
        self.current_size -= 1;
        let last = self.current_size;
        self.weights[0] = self.weights[last];
        self.point_indices[0] = self.point_indices[last];
        if self.store_sequences {
            self.sequence_indices[0] = self.sequence_indices[last];
        }
        let _ = self.sift_down(0, false);
        evicted
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.weights.swap(a, b);
        self.point_indices.swap(a, b);
        if self.store_sequences {
            self.sequence_indices.swap(a, b);
        }
    }

    fn sift_down(&mut self, start: usize, validate: bool) -> Result<()> {
        let mut current = start;
        while 2 * current + 1 < self.current_size {
            let mut max_child = 2 * current + 1;
            if 2 * current + 2 < self.current_size
                && self.weights[2 * current + 2] > self.weights[max_child]
            {
                max_child = 2 * current + 2;
            }
            if self.weights[max_child] > self.weights[current] {
                check_state(!validate, "heap property violated")?;
                self.swap(current, max_child);
                current = max_child;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// verify (or restore) the heap property over the stored weights
    pub fn reheap(&mut self, validate: bool) -> Result<()> {
        if self.current_size > 1 {
            for i in (0..=(self.current_size - 2) / 2).rev() {
                self.sift_down(i, validate)?;
            }
        }
        Ok(())
    }

    pub fn to_state(&self) -> SamplerState {
        SamplerState {
            capacity: self.capacity,
            weights: self.weights[..self.current_size].to_vec(),
            point_indices: self.point_indices[..self.current_size]
                .iter()
                .map(|x| x.to_usize())
                .collect(),
            sequence_indices: if self.store_sequences {
                self.sequence_indices[..self.current_size].to_vec()
            } else {
                Vec::new()
            },
            store_sequences: self.store_sequences,
        }
    }

    /// Reconstruct from state. With `validate_heap` set, a state that
    /// violates the heap property is rejected instead of silently reheaped.
    pub fn from_state(state: &SamplerState, validate_heap: bool) -> Result<Self> {
        check_state(
            state.weights.len() == state.point_indices.len(),
            "mismatched sampler arrays",
        )?;
        check_index(
            state.weights.len() <= state.capacity,
            "sampler state larger than capacity",
        )?;
        let current_size = state.weights.len();
        let mut weights = state.weights.clone();
        weights.resize(state.capacity, 0.0);
        let mut point_indices: Vec<P> = state
            .point_indices
            .iter()
            .map(|&x| P::from_usize(x))
            .collect();
        point_indices.resize(state.capacity, P::MAX_INDEX);
        let mut sequence_indices = if state.store_sequences {
            check_state(
                state.sequence_indices.len() == current_size,
                "mismatched sequence array",
            )?;
            state.sequence_indices.clone()
        } else {
            Vec::new()
        };
        if state.store_sequences {
            sequence_indices.resize(state.capacity, 0);
        }
        let mut sampler = WeightedSampler {
            capacity: state.capacity,
            current_size,
            weights,
            point_indices,
            sequence_indices,
            store_sequences: state.store_sequences,
            accepted: None,
            evicted: None,
        };
        sampler.reheap(validate_heap)?;
        Ok(sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_sampler() -> WeightedSampler<usize> {
        let mut sampler = WeightedSampler::<usize>::new(16, true);
        for i in 0..16 {
            let weight = ((i * 7919) % 97) as f32 / 97.0;
            assert!(sampler.accept_point(true, weight, i as u64).accepted);
            sampler.push_accepted(i).unwrap();
        }
        sampler
    }

    #[test]
    fn heap_property_holds() {
        let sampler = full_sampler();
        let weights = sampler.weights();
        for j in 0..weights.len() {
            if 2 * j + 1 < weights.len() {
                assert!(weights[j] >= weights[2 * j + 1]);
            }
            if 2 * j + 2 < weights.len() {
                assert!(weights[j] >= weights[2 * j + 2]);
            }
        }
    }

    #[test]
    fn eviction_reports_the_max_weight() {
        let mut sampler = full_sampler();
        let max_weight = sampler.weights()[0];
        let acceptance = sampler.accept_point(false, -10.0, 99);
        assert!(acceptance.accepted);
        assert!(acceptance.evicted.is_some());
        assert_eq!(sampler.evicted_point().unwrap().1, max_weight);
        sampler.push_accepted(99).unwrap();
        assert!(sampler.is_full());
    }

    #[test]
    fn rejects_heavier_points_when_full() {
        let mut sampler = full_sampler();
        let acceptance = sampler.accept_point(false, 10.0, 99);
        assert!(!acceptance.accepted);
    }

    #[test]
    fn state_round_trip_preserves_heap_order() {
        let sampler = full_sampler();
        let state = sampler.to_state();
        let restored = WeightedSampler::<usize>::from_state(&state, true).unwrap();
        assert_eq!(restored.weights(), sampler.weights());
        let a: Vec<usize> = restored.point_indices().collect();
        let b: Vec<usize> = sampler.point_indices().collect();
        assert_eq!(a, b);
        assert_eq!(
            restored.sequence_indices().unwrap(),
            sampler.sequence_indices().unwrap()
        );
    }

    #[test]
    fn corrupt_heap_is_rejected_on_validated_restore() {
        let sampler = full_sampler();
        let mut state = sampler.to_state();
        state.weights.swap(0, 15);
        assert!(WeightedSampler::<usize>::from_state(&state, true).is_err());
        // without validation the restore silently repairs the heap
        assert!(WeightedSampler::<usize>::from_state(&state, false).is_ok());
    }
}
