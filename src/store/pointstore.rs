use std::collections::HashMap;

use crate::errors::ForestError;
use crate::store::indexmanager::{IndexManager, IndexManagerState};
use crate::types::{Result, StoreFloat, StoreIndex};
use crate::util::{check_dimensions, check_index, check_state};

/// Read-only access to stored points, the seam between the arena and the
/// trees. Trees only ever read; all mutation goes through the ensemble.
pub trait PointStoreView<F: StoreFloat> {
    fn dimensions(&self) -> usize;
    /// copy in tree space (rotation applied when enabled)
    fn copy(&self, index: usize) -> Result<Vec<F>>;
    /// tree-space copy, narrowed for summarization
    fn copy_f32(&self, index: usize) -> Result<Vec<f32>>;
    /// compare a tree-space point with a stored point
    fn is_equal(&self, point: &[F], index: usize) -> Result<bool>;
    /// raw canonical slice plus its rotation offset
    fn reference_and_offset(&self, index: usize) -> Result<(&[F], usize)>;
    fn needs_rotation(&self) -> bool;
}

/// Arena of fixed-width numeric vectors with reference counts.
///
/// Frames are stored canonically (oldest first); consecutive shingled windows
/// overlap in storage, so appending usually costs one frame. In rotating mode
/// the arena additionally keeps every slice aligned so that a point stored at
/// frame location `l` has rotation offset `(l * base) % dimensions`; trees
/// then see the rotated layout, in which the insertion point of the newest
/// frame advances modulo the shingle instead of the window sliding.
pub struct DensePointStore<L, F>
where
    L: StoreIndex,
    F: StoreFloat,
{
    dimensions: usize,
    shingle_size: usize,
    capacity: usize,
    internal_shingling: bool,
    internal_rotation: bool,
    store: Vec<F>,
    location: Vec<L>,
    reference_count: Vec<u8>,
    overflow_counts: HashMap<usize, usize>,
    start_free_region: usize,
    index_manager: IndexManager,
    // canonical sliding window of the last shingle_size frames
    last_shingle: Vec<F>,
    next_sequence_index: usize,
    entries_seen: u64,
}

/// Captured state of a [`DensePointStore`]. The free-list interval order and
/// the rotation counters are preserved exactly; values are widened to f64 so
/// the state is precision-agnostic.
#[derive(Clone, Debug)]
pub struct PointStoreState {
    pub dimensions: usize,
    pub shingle_size: usize,
    pub capacity: usize,
    pub internal_shingling: bool,
    pub internal_rotation: bool,
    pub store: Vec<f64>,
    pub location: Vec<usize>,
    pub reference_count: Vec<usize>,
    pub start_free_region: usize,
    pub index_manager: IndexManagerState,
    pub last_shingle: Vec<f64>,
    pub next_sequence_index: usize,
    pub entries_seen: u64,
}

impl<L, F> DensePointStore<L, F>
where
    L: StoreIndex,
    F: StoreFloat,
{
    pub fn new(
        dimensions: usize,
        shingle_size: usize,
        capacity: usize,
        initial_capacity: usize,
        internal_shingling: bool,
        internal_rotation: bool,
    ) -> Self {
        let initial = if initial_capacity < capacity {
            initial_capacity
        } else {
            capacity
        };
        DensePointStore {
            dimensions,
            shingle_size,
            capacity,
            internal_shingling,
            internal_rotation,
            store: vec![F::zero(); initial * dimensions],
            location: vec![L::MAX_INDEX; initial],
            reference_count: vec![0; initial],
            overflow_counts: HashMap::new(),
            start_free_region: 0,
            index_manager: IndexManager::new(initial),
            last_shingle: vec![F::zero(); dimensions],
            next_sequence_index: 0,
            entries_seen: 0,
        }
    }

    fn base_dimension(&self) -> usize {
        self.dimensions / self.shingle_size
    }

    pub fn entries_seen(&self) -> u64 {
        self.entries_seen
    }

    pub fn is_internal_shingling(&self) -> bool {
        self.internal_shingling
    }

    pub fn is_internal_rotation(&self) -> bool {
        self.internal_rotation
    }

    // tree-space position of canonical element i for a point with sequence t
    fn rotate(&self, i: usize, sequence: usize) -> usize {
        if !self.internal_rotation {
            i
        } else {
            (i + sequence * self.base_dimension()) % self.dimensions
        }
    }

    /// the tree-space shingle that would result from appending `point`,
    /// without committing anything
    pub fn shingled_point(&self, point: &[f64]) -> Result<Vec<F>> {
        let base = self.base_dimension();
        let mut new_point = vec![F::zero(); self.dimensions];
        if point.len() == base && self.shingle_size > 1 {
            check_dimensions(
                self.internal_shingling,
                "frame-sized input requires internal shingling",
            )?;
            let sequence = self.next_sequence_index + 1;
            for i in 0..(self.dimensions - base) {
                new_point[self.rotate(i, sequence)] = self.last_shingle[i + base];
            }
            for i in 0..base {
                new_point[self.rotate(self.dimensions - base + i, sequence)] =
                    F::from_f64(point[i]);
            }
            return Ok(new_point);
        }
        check_dimensions(
            point.len() == self.dimensions,
            "expecting externally shingled input",
        )?;
        for (x, &y) in new_point.iter_mut().zip(point) {
            *x = F::from_f64(y);
        }
        Ok(new_point)
    }

    /// map frame-relative attribute offsets to tree-space offsets,
    /// `look_ahead` steps into the future
    pub fn missing_indices(&self, look_ahead: usize, values: &[usize]) -> Result<Vec<usize>> {
        if !self.internal_shingling {
            for &x in values {
                check_index(x < self.dimensions, "attribute offset out of range")?;
            }
            return Ok(Vec::from(values));
        }
        let base = self.base_dimension();
        let mut answer = Vec::with_capacity(values.len());
        for &value in values {
            check_index(value < base, "attribute offset out of range")?;
            if self.internal_rotation {
                answer.push(
                    ((self.next_sequence_index + look_ahead) * base + value) % self.dimensions,
                );
            } else {
                answer.push(self.dimensions - base + value);
            }
        }
        Ok(answer)
    }

    pub fn next_indices(&self, look_ahead: usize) -> Result<Vec<usize>> {
        let base = self.base_dimension();
        let values: Vec<usize> = (0..base).collect();
        self.missing_indices(look_ahead, &values)
    }

    /// copy in canonical order, oldest frame first
    pub fn canonical_copy(&self, index: usize) -> Result<Vec<f64>> {
        let (reference, _offset) = self.reference_and_offset(index)?;
        Ok(reference.iter().map(|x| x.into_f64()).collect())
    }

    pub fn point_equals(&self, index: usize, point: &[f64]) -> Result<bool> {
        check_dimensions(point.len() == self.dimensions, "incorrect point length")?;
        let (reference, _offset) = self.reference_and_offset(index)?;
        Ok(reference
            .iter()
            .zip(point)
            .all(|(&x, &y)| x == F::from_f64(y)))
    }

    fn inc_helper(
        index: usize,
        reference_counts: &mut [u8],
        overflow: &mut HashMap<usize, usize>,
    ) -> Result<()> {
        check_index(index < reference_counts.len(), "index out of range")?;
        if reference_counts[index] == u8::MAX {
            *overflow.entry(index).or_insert(0) += 1;
        } else {
            reference_counts[index] += 1;
        }
        Ok(())
    }

    fn dec_helper(
        index: usize,
        reference_counts: &mut [u8],
        overflow: &mut HashMap<usize, usize>,
    ) -> Result<()> {
        check_index(index < reference_counts.len(), "index out of range")?;
        check_index(reference_counts[index] != 0, "index not in use")?;
        if let Some(a) = overflow.remove(&index) {
            if a > 1 {
                overflow.insert(index, a - 1);
            }
        } else {
            reference_counts[index] -= 1;
        }
        Ok(())
    }

    pub fn inc(&mut self, index: usize) -> Result<()> {
        Self::inc_helper(index, &mut self.reference_count, &mut self.overflow_counts)
    }

    pub fn dec(&mut self, index: usize) -> Result<usize> {
        Self::dec_helper(index, &mut self.reference_count, &mut self.overflow_counts)?;
        let remaining = self.reference_count[index] as usize
            + self.overflow_counts.get(&index).copied().unwrap_or(0);
        if remaining == 0 {
            self.index_manager.release(index)?;
            self.location[index] = L::MAX_INDEX;
        }
        Ok(remaining)
    }

    pub fn reference_count(&self, index: usize) -> usize {
        if index >= self.reference_count.len() {
            return 0;
        }
        self.reference_count[index] as usize
            + self.overflow_counts.get(&index).copied().unwrap_or(0)
    }

    /// apply the per-tree (inserted, deleted) results of one update
    pub fn adjust_count(&mut self, result: &[(Option<usize>, Option<usize>)]) -> Result<()> {
        for (insert, delete) in result {
            if let Some(added) = insert {
                self.inc(*added)?;
                if let Some(deleted) = delete {
                    self.dec(*deleted)?;
                }
            }
        }
        Ok(())
    }

    // the trailing window of the store overlaps the new point except for the
    // newest frame; when that holds only the new frame needs to be written
    fn overlap_start(&self, point: &[F], sequence: usize) -> Option<usize> {
        let base = self.base_dimension();
        let extra = self.dimensions - base;
        if self.shingle_size == 1 || self.start_free_region < extra {
            return None;
        }
        let index = self.start_free_region - extra;
        if self.internal_rotation && (index / base) % self.shingle_size != sequence % self.shingle_size
        {
            return None;
        }
        if (0..extra).all(|i| self.store[index + i] == point[i]) {
            Some(index)
        } else {
            None
        }
    }

    fn ensure_room(&mut self, needed: usize) -> Result<()> {
        if needed + self.start_free_region > self.store.len() {
            self.compact()?;
            if needed + self.start_free_region > self.store.len() {
                if self.store.len() >= self.capacity * self.dimensions {
                    return Err(ForestError::Capacity {
                        msg: "point store is full",
                    });
                }
                let mut new_size = self.store.len() + self.store.len() / 5 + needed;
                if new_size > self.capacity * self.dimensions {
                    new_size = self.capacity * self.dimensions;
                }
                check_state(
                    needed + self.start_free_region <= new_size,
                    "point store cannot grow further",
                )?;
                self.store.resize(new_size, F::zero());
            }
        }
        Ok(())
    }

    pub fn add(&mut self, point: &[f64]) -> Result<Option<usize>> {
        let base = self.base_dimension();
        let sequence = self.next_sequence_index + 1;
        self.entries_seen += 1;

        let new_point: Vec<F> = if self.internal_shingling {
            check_dimensions(point.len() == base, "incorrect frame length")?;
            for i in 0..(self.dimensions - base) {
                self.last_shingle[i] = self.last_shingle[i + base];
            }
            for i in 0..base {
                self.last_shingle[self.dimensions - base + i] = F::from_f64(point[i]);
            }
            self.next_sequence_index = sequence;
            if sequence < self.shingle_size {
                return Ok(None);
            }
            self.last_shingle.clone()
        } else {
            check_dimensions(point.len() == self.dimensions, "incorrect point length")?;
            self.next_sequence_index = sequence;
            point.iter().map(|&x| F::from_f64(x)).collect()
        };

        // alignment padding keeps the rotation offset derivable from the
        // stored location; a full copy may need up to dimensions - base zeros
        let room = if self.internal_rotation {
            2 * self.dimensions
        } else {
            self.dimensions
        };
        self.ensure_room(room)?;

        if self.index_manager.is_exhausted() {
            if self.location.len() >= self.capacity {
                return Err(ForestError::Capacity {
                    msg: "point store index table is full",
                });
            }
            let mut new_size = self.location.len() + self.location.len() / 5 + 1;
            if new_size > self.capacity {
                new_size = self.capacity;
            }
            self.location.resize(new_size, L::MAX_INDEX);
            self.reference_count.resize(new_size, 0);
            self.index_manager.change_capacity(new_size);
        }

        let position = self.index_manager.take()?;
        check_state(self.reference_count[position] == 0, "stale reference count")?;
        self.reference_count[position] = 1;

        if let Some(start) = self.overlap_start(&new_point, sequence) {
            let extra = self.dimensions - base;
            self.location[position] = L::from_usize(start / base);
            let mut index = self.start_free_region;
            for i in 0..base {
                self.store[index] = new_point[extra + i];
                index += 1;
            }
            self.start_free_region += base;
        } else {
            if self.internal_rotation {
                while (self.start_free_region / base) % self.shingle_size
                    != sequence % self.shingle_size
                {
                    self.store[self.start_free_region] = F::zero();
                    self.start_free_region += 1;
                }
            }
            let start = self.start_free_region;
            self.location[position] = L::from_usize(start / base);
            for i in 0..self.dimensions {
                self.store[start + i] = new_point[i];
            }
            self.start_free_region = start + self.dimensions;
        }
        Ok(Some(position))
    }

    /// relocate live slices to the front of the arena, preserving the
    /// rotation alignment of every point
    pub fn compact(&mut self) -> Result<()> {
        let base = self.base_dimension();
        let mut reverse_reference: Vec<(usize, usize)> = Vec::new();
        for i in 0..self.location.len() {
            if self.location[i] != L::MAX_INDEX {
                reverse_reference.push((self.location[i].to_usize(), i));
            }
        }
        reverse_reference.sort();
        let mut fresh_start: usize = 0;
        let mut j_static: usize = 0;
        let end = reverse_reference.len();
        while j_static < end {
            let block_start = reverse_reference[j_static].0 * base;
            let mut block_end = block_start + self.dimensions;
            let initial = if self.internal_rotation {
                (self.dimensions - fresh_start % self.dimensions + block_start) % self.dimensions
            } else {
                0
            };

            // extend over overlapping shingled neighbors
            let mut k = j_static + 1;
            while k < end {
                let next = reverse_reference[k].0 * base;
                if block_end >= next {
                    if block_end < next + self.dimensions {
                        block_end = next + self.dimensions;
                    }
                    k += 1;
                } else {
                    break;
                }
            }

            for _ in 0..initial {
                self.store[fresh_start] = F::zero();
                fresh_start += 1;
            }

            for i in block_start..block_end {
                self.store[fresh_start] = self.store[i];
                check_state(
                    !self.internal_rotation
                        || fresh_start % self.dimensions == i % self.dimensions,
                    "rotation alignment lost in compaction",
                )?;
                if j_static < end && i == reverse_reference[j_static].0 * base {
                    let idx = reverse_reference[j_static].1;
                    self.location[idx] = L::from_usize(fresh_start / base);
                    j_static += 1;
                }
                fresh_start += 1;
            }
            check_state(j_static == k, "compaction index discrepancy")?;
        }
        self.start_free_region = fresh_start;
        Ok(())
    }

    pub fn to_state(&self) -> PointStoreState {
        PointStoreState {
            dimensions: self.dimensions,
            shingle_size: self.shingle_size,
            capacity: self.capacity,
            internal_shingling: self.internal_shingling,
            internal_rotation: self.internal_rotation,
            store: self.store[..self.start_free_region]
                .iter()
                .map(|x| x.into_f64())
                .collect(),
            location: self
                .location
                .iter()
                .map(|&x| {
                    if x == L::MAX_INDEX {
                        usize::MAX
                    } else {
                        x.to_usize()
                    }
                })
                .collect(),
            reference_count: (0..self.reference_count.len())
                .map(|i| self.reference_count(i))
                .collect(),
            start_free_region: self.start_free_region,
            index_manager: self.index_manager.to_state(),
            last_shingle: self.last_shingle.iter().map(|x| x.into_f64()).collect(),
            next_sequence_index: self.next_sequence_index,
            entries_seen: self.entries_seen,
        }
    }

    pub fn from_state(state: &PointStoreState) -> Result<Self> {
        check_state(
            state.location.len() == state.reference_count.len(),
            "mismatched location and refcount tables",
        )?;
        let index_manager = IndexManager::from_state(&state.index_manager)?;
        let mut store: Vec<F> = state.store.iter().map(|&x| F::from_f64(x)).collect();
        store.resize(state.start_free_region + 2 * state.dimensions, F::zero());
        let mut reference_count = vec![0u8; state.reference_count.len()];
        let mut overflow_counts = HashMap::new();
        for (i, &count) in state.reference_count.iter().enumerate() {
            if count > u8::MAX as usize {
                reference_count[i] = u8::MAX;
                overflow_counts.insert(i, count - u8::MAX as usize);
            } else {
                reference_count[i] = count as u8;
            }
        }
        Ok(DensePointStore {
            dimensions: state.dimensions,
            shingle_size: state.shingle_size,
            capacity: state.capacity,
            internal_shingling: state.internal_shingling,
            internal_rotation: state.internal_rotation,
            store,
            location: state
                .location
                .iter()
                .map(|&x| {
                    if x == usize::MAX {
                        L::MAX_INDEX
                    } else {
                        L::from_usize(x)
                    }
                })
                .collect(),
            reference_count,
            overflow_counts,
            start_free_region: state.start_free_region,
            index_manager,
            last_shingle: state.last_shingle.iter().map(|&x| F::from_f64(x)).collect(),
            next_sequence_index: state.next_sequence_index,
            entries_seen: state.entries_seen,
        })
    }
}

impl<L, F> PointStoreView<F> for DensePointStore<L, F>
where
    L: StoreIndex,
    F: StoreFloat,
{
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn copy(&self, index: usize) -> Result<Vec<F>> {
        let (reference, offset) = self.reference_and_offset(index)?;
        if offset == 0 {
            return Ok(Vec::from(reference));
        }
        let mut answer = vec![F::zero(); self.dimensions];
        for (i, &value) in reference.iter().enumerate() {
            answer[(i + offset) % self.dimensions] = value;
        }
        Ok(answer)
    }

    fn copy_f32(&self, index: usize) -> Result<Vec<f32>> {
        Ok(self.copy(index)?.iter().map(|x| x.into_f32()).collect())
    }

    fn is_equal(&self, point: &[F], index: usize) -> Result<bool> {
        let (reference, offset) = self.reference_and_offset(index)?;
        if offset == 0 {
            return Ok(reference.iter().zip(point).all(|(&x, &y)| x == y));
        }
        Ok(reference
            .iter()
            .enumerate()
            .all(|(i, &x)| point[(i + offset) % self.dimensions] == x))
    }

    fn reference_and_offset(&self, index: usize) -> Result<(&[F], usize)> {
        check_index(index < self.location.len(), "index out of range")?;
        check_index(self.reference_count[index] != 0, "index not in use")?;
        let base = self.base_dimension();
        let adjusted = self.location[index].to_usize() * base;
        let offset = if self.internal_rotation {
            adjusted % self.dimensions
        } else {
            0
        };
        Ok((&self.store[adjusted..adjusted + self.dimensions], offset))
    }

    fn needs_rotation(&self) -> bool {
        self.internal_rotation
    }
}
