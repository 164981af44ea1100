use std::collections::HashMap;

use crate::common::divector::DiVector;
use crate::forest::boundingbox::BoundingBox;
use crate::store::indexmanager::{IndexManager, IndexManagerState};
use crate::store::pointstore::PointStoreView;
use crate::forest::cut::Cut;
use crate::types::{Result, StoreFloat, StoreIndex};
use crate::util::{check_index, check_state};

/// Below this cache fraction, traversals maintain bounding boxes along the
/// path instead of asking the store.
const SWITCH_THRESHOLD: f64 = 0.5;

/// Packed storage for the nodes of one tree.
///
/// `capacity` is the number of leaves (the per-tree sample size). Leaves are
/// encoded as `point_index + capacity`; the value `capacity - 1` stands for
/// null, and `0..capacity-2` are the internal nodes. Internal node mass is
/// stored as mass-1 so that all values fit the index width, and duplicate
/// leaf mass lives in an overflow map.
///
/// Bounding boxes for a configurable fraction of nodes are cached in a flat
/// array; anything outside the cache is recomputed bottom-up on demand, and
/// scoring must be exactly equivalent either way.
pub struct PackedNodeStore<C, P, N, F>
where
    C: StoreIndex,
    P: StoreIndex,
    N: StoreIndex,
    F: StoreFloat,
{
    capacity: usize,
    dimensions: usize,
    rotation_aware: bool,
    cache_fraction: f64,
    left_index: Vec<P>,
    right_index: Vec<P>,
    cut_dimension: Vec<C>,
    cut_value: Vec<F>,
    mass: Vec<N>,
    bounding_box_data: Vec<F>,
    range_sum_data: Vec<f64>,
    leaf_mass_overflow: HashMap<usize, usize>,
    node_manager: IndexManager,
}

/// Captured state of a [`PackedNodeStore`]; every node field is preserved
/// exactly. The box cache is derived data and is rebuilt on restore.
#[derive(Clone, Debug)]
pub struct NodeStoreState {
    pub capacity: usize,
    pub dimensions: usize,
    pub rotation_aware: bool,
    pub cache_fraction: f64,
    pub left_index: Vec<usize>,
    pub right_index: Vec<usize>,
    pub cut_dimension: Vec<usize>,
    pub cut_value: Vec<f64>,
    pub mass: Vec<usize>,
    pub leaf_mass_overflow: Vec<(usize, usize)>,
    pub node_manager: IndexManagerState,
}

impl<C, P, N, F> PackedNodeStore<C, P, N, F>
where
    C: StoreIndex,
    P: StoreIndex,
    N: StoreIndex,
    F: StoreFloat,
{
    pub fn new(
        capacity: usize,
        dimensions: usize,
        rotation_aware: bool,
        cache_fraction: f64,
    ) -> Self {
        let cache_limit = (cache_fraction * capacity as f64) as usize;
        let null_node = capacity - 1;
        PackedNodeStore {
            capacity,
            dimensions,
            rotation_aware,
            cache_fraction,
            left_index: vec![P::from_usize(null_node); capacity - 1],
            right_index: vec![P::from_usize(null_node); capacity - 1],
            cut_dimension: vec![C::MAX_INDEX; capacity - 1],
            cut_value: vec![F::zero(); capacity - 1],
            mass: vec![N::from_usize(0); capacity - 1],
            bounding_box_data: vec![F::zero(); 2 * dimensions * cache_limit],
            range_sum_data: vec![0.0; cache_limit],
            leaf_mass_overflow: HashMap::new(),
            node_manager: IndexManager::new(capacity - 1),
        }
    }

    pub fn null_node(&self) -> usize {
        self.capacity - 1
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cache_fraction(&self) -> f64 {
        self.cache_fraction
    }

    pub fn is_leaf(&self, index: usize) -> bool {
        index != self.null_node() && index >= self.capacity
    }

    pub fn is_internal(&self, index: usize) -> bool {
        index != self.null_node() && index < self.capacity
    }

    pub fn leaf_index(&self, point_index: usize) -> usize {
        point_index + self.capacity
    }

    pub fn point_index(&self, index: usize) -> Result<usize> {
        check_index(self.is_leaf(index), "not a leaf index")?;
        Ok(index - self.capacity)
    }

    pub fn use_path_for_box(&self) -> bool {
        self.cache_fraction < SWITCH_THRESHOLD
    }

    // slot in the cache arrays, or usize::MAX when outside the cached range
    fn translate(&self, index: usize) -> usize {
        if index != self.null_node() && self.range_sum_data.len() <= index {
            usize::MAX
        } else {
            index
        }
    }

    pub fn mass_of(&self, index: usize) -> usize {
        if self.is_leaf(index) {
            let y = index - self.capacity;
            return 1 + self.leaf_mass_overflow.get(&y).copied().unwrap_or(0);
        }
        self.mass[index].to_usize() + 1
    }

    pub fn increase_leaf_mass(&mut self, index: usize) -> Result<()> {
        check_index(self.is_leaf(index), "not a leaf index")?;
        let y = index - self.capacity;
        *self.leaf_mass_overflow.entry(y).or_insert(0) += 1;
        Ok(())
    }

    /// returns 0 when the leaf held a single point (and should detach)
    pub fn decrease_leaf_mass(&mut self, index: usize) -> Result<usize> {
        check_index(self.is_leaf(index), "not a leaf index")?;
        let y = index - self.capacity;
        if let Some(a) = self.leaf_mass_overflow.remove(&y) {
            if a > 1 {
                self.leaf_mass_overflow.insert(y, a - 1);
            }
            Ok(a)
        } else {
            Ok(0)
        }
    }

    pub fn cut_value(&self, index: usize) -> F {
        self.cut_value[index]
    }

    pub fn cut_dimension(&self, index: usize) -> usize {
        self.cut_dimension[index].to_usize()
    }

    pub fn left_of(&self, index: usize) -> usize {
        self.left_index[index].to_usize()
    }

    pub fn right_of(&self, index: usize) -> usize {
        self.right_index[index].to_usize()
    }

    pub fn sibling_of(&self, node: usize, parent: usize) -> usize {
        let left = self.left_index[parent].to_usize();
        if node == left {
            self.right_index[parent].to_usize()
        } else {
            left
        }
    }

    pub fn is_left_of(&self, index: usize, point: &[F]) -> bool {
        point[self.cut_dimension[index].to_usize()] <= self.cut_value[index]
    }

    pub fn cut_and_children(&self, index: usize) -> (usize, F, usize, usize) {
        if self.is_internal(index) {
            (
                self.cut_dimension[index].to_usize(),
                self.cut_value[index],
                self.left_index[index].to_usize(),
                self.right_index[index].to_usize(),
            )
        } else {
            (usize::MAX, F::max_value(), usize::MAX, usize::MAX)
        }
    }

    pub fn distribution(&self, index: usize) -> (usize, F, usize, usize) {
        (
            self.cut_dimension[index].to_usize(),
            self.cut_value[index],
            self.mass_of(self.left_of(index)),
            self.mass_of(self.right_of(index)),
        )
    }

    /// root-to-leaf path of (node, sibling) pairs for `point`
    pub fn set_path(&self, answer: &mut Vec<(usize, usize)>, root: usize, point: &[F]) {
        let mut node = root;
        answer.push((root, self.null_node()));
        while !self.is_leaf(node) {
            if self.is_left_of(node, point) {
                answer.push((self.left_of(node), self.right_of(node)));
                node = self.left_of(node);
            } else {
                answer.push((self.right_of(node), self.left_of(node)));
                node = self.right_of(node);
            }
        }
    }

    fn leaf_point<PS: PointStoreView<F>>(
        &self,
        index: usize,
        point_store: &PS,
    ) -> Result<Vec<F>> {
        point_store.copy(self.point_index(index)?)
    }

    pub fn get_box<PS: PointStoreView<F>>(
        &self,
        index: usize,
        point_store: &PS,
    ) -> Result<BoundingBox<F>> {
        if self.is_leaf(index) {
            let point = self.leaf_point(index, point_store)?;
            return Ok(BoundingBox::from_point(&point));
        }
        let idx = self.translate(index);
        if idx != usize::MAX {
            return Ok(self.box_from_cache(idx));
        }
        let mut bounding_box = self.get_box(self.left_of(index), point_store)?;
        self.grow_node_box(&mut bounding_box, point_store, index, self.right_of(index))?;
        Ok(bounding_box)
    }

    fn box_from_cache(&self, idx: usize) -> BoundingBox<F> {
        let base = 2 * idx * self.dimensions;
        BoundingBox::new(
            &self.bounding_box_data[base..base + self.dimensions],
            &self.bounding_box_data[base + self.dimensions..base + 2 * self.dimensions],
        )
    }

    fn copy_box_to_cache(&mut self, index: usize, bounding_box: &BoundingBox<F>) {
        let idx = self.translate(index);
        if idx != usize::MAX {
            let base = 2 * idx * self.dimensions;
            let mid = base + self.dimensions;
            self.bounding_box_data[base..mid].copy_from_slice(bounding_box.min_values());
            self.bounding_box_data[mid..mid + self.dimensions]
                .copy_from_slice(bounding_box.max_values());
            self.range_sum_data[idx] = bounding_box.range_sum();
        }
    }

    // grow the cached box by a point; returns true when the box was unchanged
    fn check_contains_and_add_point(&mut self, index: usize, point: &[F]) -> bool {
        let idx = self.translate(index);
        if idx == usize::MAX {
            return false;
        }
        let base = 2 * idx * self.dimensions;
        let mid = base + self.dimensions;
        for (x, &y) in self.bounding_box_data[base..mid].iter_mut().zip(point) {
            if y < *x {
                *x = y;
            }
        }
        for (x, &y) in self.bounding_box_data[mid..mid + self.dimensions]
            .iter_mut()
            .zip(point)
        {
            if y > *x {
                *x = y;
            }
        }
        let new_sum: f64 = self.bounding_box_data[base..mid]
            .iter()
            .zip(&self.bounding_box_data[mid..mid + self.dimensions])
            .map(|(&x, &y)| (y - x).into_f64())
            .sum();
        let unchanged = self.range_sum_data[idx] == new_sum;
        self.range_sum_data[idx] = new_sum;
        unchanged
    }

    fn check_strictly_contains(&self, index: usize, point: &[F]) -> bool {
        let idx = self.translate(index);
        if idx == usize::MAX {
            return false;
        }
        let base = 2 * idx * self.dimensions;
        let mid = base + self.dimensions;
        !self.bounding_box_data[base..mid]
            .iter()
            .zip(point)
            .zip(&self.bounding_box_data[mid..mid + self.dimensions])
            .any(|((&low, &value), &high)| low >= value || value >= high)
    }

    fn reconstruct_box<PS: PointStoreView<F>>(
        &self,
        index: usize,
        point_store: &PS,
    ) -> Result<BoundingBox<F>> {
        let mut bounding_box = self.get_box(self.left_of(index), point_store)?;
        self.grow_node_box(&mut bounding_box, point_store, index, self.right_of(index))?;
        Ok(bounding_box)
    }

    fn check_contains_and_rebuild_box<PS: PointStoreView<F>>(
        &mut self,
        index: usize,
        point: &[F],
        point_store: &PS,
    ) -> Result<bool> {
        let idx = self.translate(index);
        if idx == usize::MAX {
            return Ok(false);
        }
        if !self.check_strictly_contains(index, point) {
            let bounding_box = self.reconstruct_box(index, point_store)?;
            self.copy_box_to_cache(index, &bounding_box);
            return Ok(false);
        }
        Ok(true)
    }

    /// grow `bounding_box` by the subtree rooted at `sibling`
    pub fn grow_node_box<PS: PointStoreView<F>>(
        &self,
        bounding_box: &mut BoundingBox<F>,
        point_store: &PS,
        _node: usize,
        sibling: usize,
    ) -> Result<()> {
        if self.is_leaf(sibling) {
            let point = self.leaf_point(sibling, point_store)?;
            bounding_box.check_contains_and_add_point(&point);
            return Ok(());
        }
        let idx = self.translate(sibling);
        if idx != usize::MAX {
            let base = 2 * idx * self.dimensions;
            bounding_box
                .check_contains_and_add_point(&self.bounding_box_data[base..base + self.dimensions]);
            bounding_box.check_contains_and_add_point(
                &self.bounding_box_data[base + self.dimensions..base + 2 * self.dimensions],
            );
            return Ok(());
        }
        self.grow_node_box(bounding_box, point_store, sibling, self.left_of(sibling))?;
        self.grow_node_box(bounding_box, point_store, sibling, self.right_of(sibling))
    }

    pub fn probability_of_cut<PS: PointStoreView<F>>(
        &self,
        index: usize,
        point: &[F],
        point_store: &PS,
    ) -> Result<f64> {
        let idx = self.translate(index);
        if idx != usize::MAX {
            let base = 2 * idx * self.dimensions;
            let mid = base + self.dimensions;
            let mut minsum = F::zero();
            let mut maxsum = F::zero();
            for i in 0..self.dimensions {
                let low_gap = self.bounding_box_data[base + i] - point[i];
                if low_gap > F::zero() {
                    minsum = minsum + low_gap;
                }
                let high_gap = point[i] - self.bounding_box_data[mid + i];
                if high_gap > F::zero() {
                    maxsum = maxsum + high_gap;
                }
            }
            let sum = (minsum + maxsum).into_f64();
            if sum == 0.0 {
                return Ok(0.0);
            }
            return Ok(sum / (self.range_sum_data[idx] + sum));
        }
        let bounding_box = self.get_box(index, point_store)?;
        Ok(bounding_box.probability_of_cut(point))
    }

    pub fn probability_of_cut_with_missing<PS: PointStoreView<F>>(
        &self,
        index: usize,
        point: &[F],
        missing: &[bool],
        point_store: &PS,
    ) -> Result<f64> {
        let idx = self.translate(index);
        if idx != usize::MAX {
            let base = 2 * idx * self.dimensions;
            let mid = base + self.dimensions;
            let mut minsum = F::zero();
            let mut maxsum = F::zero();
            for i in 0..self.dimensions {
                if missing[i] {
                    continue;
                }
                let low_gap = self.bounding_box_data[base + i] - point[i];
                if low_gap > F::zero() {
                    minsum = minsum + low_gap;
                }
                let high_gap = point[i] - self.bounding_box_data[mid + i];
                if high_gap > F::zero() {
                    maxsum = maxsum + high_gap;
                }
            }
            let sum = (minsum + maxsum).into_f64();
            if sum == 0.0 {
                return Ok(0.0);
            }
            return Ok(sum / (self.range_sum_data[idx] + sum));
        }
        let bounding_box = self.get_box(index, point_store)?;
        Ok(bounding_box.probability_of_cut_with_missing(point, missing))
    }

    pub fn assign_probability_of_cut<PS: PointStoreView<F>>(
        &self,
        index: usize,
        point: &[F],
        point_store: &PS,
        di_vector: &mut DiVector,
    ) -> Result<()> {
        let bounding_box = self.get_box(index, point_store)?;
        di_vector.assign_as_probability_of_cut(&bounding_box, point);
        Ok(())
    }

    /// create an internal node separating `point` from the subtree `child`
    pub fn add_node(
        &mut self,
        parent: usize,
        point: &[F],
        child: usize,
        point_index: usize,
        cut: Cut<F>,
        saved_box: &BoundingBox<F>,
    ) -> Result<usize> {
        let index = self.node_manager.take().map_err(|_| {
            crate::errors::ForestError::IllegalState {
                msg: "node store is full",
            }
        })?;
        self.cut_value[index] = cut.value;
        self.cut_dimension[index] = C::from_usize(cut.dimension);
        if point[cut.dimension] <= cut.value {
            self.left_index[index] = P::from_usize(self.leaf_index(point_index));
            self.right_index[index] = P::from_usize(child);
        } else {
            self.left_index[index] = P::from_usize(child);
            self.right_index[index] = P::from_usize(self.leaf_index(point_index));
        }
        // the new leaf is not added here; mass is stored as mass - 1
        self.mass[index] = N::from_usize(self.mass_of(child));
        if self.cache_fraction > 0.0 {
            self.copy_box_to_cache(index, saved_box);
            self.check_contains_and_add_point(index, point);
        }
        if parent != self.null_node() {
            self.replace_node(parent, child, index);
        }
        Ok(index)
    }

    pub fn replace_node(&mut self, grand_parent: usize, parent: usize, node: usize) {
        if parent == self.left_index[grand_parent].to_usize() {
            self.left_index[grand_parent] = P::from_usize(node);
        } else {
            self.right_index[grand_parent] = P::from_usize(node);
        }
    }

    pub fn delete_internal_node(&mut self, index: usize) -> Result<()> {
        check_index(self.is_internal(index), "not an internal node")?;
        check_state(
            self.left_index[index].to_usize() != self.null_node(),
            "node already free",
        )?;
        let null_node = self.null_node();
        self.left_index[index] = P::from_usize(null_node);
        self.right_index[index] = P::from_usize(null_node);
        self.mass[index] = N::from_usize(0);
        self.cut_dimension[index] = C::MAX_INDEX;
        self.cut_value[index] = F::zero();
        self.node_manager.release(index)
    }

    pub fn manage_ancestors_add<PS: PointStoreView<F>>(
        &mut self,
        path: &mut Vec<(usize, usize)>,
        point: &[F],
        _point_store: &PS,
        box_resolved: bool,
    ) {
        let mut resolved = box_resolved;
        while let Some((index, _sibling)) = path.pop() {
            let mass = self.mass[index].to_usize();
            self.mass[index] = N::from_usize(mass + 1);
            if self.cache_fraction > 0.0 && !resolved {
                resolved = self.check_contains_and_add_point(index, point);
            }
        }
    }

    pub fn manage_ancestors_delete<PS: PointStoreView<F>>(
        &mut self,
        path: &mut Vec<(usize, usize)>,
        point: &[F],
        point_store: &PS,
        box_resolved: bool,
    ) -> Result<()> {
        let mut resolved = box_resolved;
        while let Some((index, _sibling)) = path.pop() {
            let mass = self.mass[index].to_usize();
            check_state(mass > 0, "mass accounting underflow")?;
            self.mass[index] = N::from_usize(mass - 1);
            if self.cache_fraction > 0.0 && !resolved {
                resolved = self.check_contains_and_rebuild_box(index, point, point_store)?;
            }
        }
        Ok(())
    }

    /// change the cached fraction mid-stream; boxes are rebuilt from the tree
    pub fn set_cache_fraction<PS: PointStoreView<F>>(
        &mut self,
        fraction: f64,
        root: usize,
        point_store: &PS,
    ) -> Result<()> {
        let cache_limit = (fraction * self.capacity as f64) as usize;
        self.cache_fraction = fraction;
        self.bounding_box_data = vec![F::zero(); 2 * self.dimensions * cache_limit];
        self.range_sum_data = vec![0.0; cache_limit];
        self.rebuild_cache(root, point_store)
    }

    pub fn rebuild_cache<PS: PointStoreView<F>>(
        &mut self,
        root: usize,
        point_store: &PS,
    ) -> Result<()> {
        if self.range_sum_data.is_empty() || root == self.null_node() {
            return Ok(());
        }
        self.fill_boxes(root, point_store)?;
        Ok(())
    }

    fn fill_boxes<PS: PointStoreView<F>>(
        &mut self,
        index: usize,
        point_store: &PS,
    ) -> Result<BoundingBox<F>> {
        if self.is_leaf(index) {
            let point = self.leaf_point(index, point_store)?;
            return Ok(BoundingBox::from_point(&point));
        }
        let mut bounding_box = self.fill_boxes(self.left_of(index), point_store)?;
        let right_box = self.fill_boxes(self.right_of(index), point_store)?;
        bounding_box.add_box(&right_box);
        self.copy_box_to_cache(index, &bounding_box);
        Ok(bounding_box)
    }

    // consistency checks used by tests and state validation

    pub fn check_left<PS: PointStoreView<F>>(
        &self,
        index: usize,
        dim: usize,
        value: F,
        point_store: &PS,
    ) -> Result<bool> {
        if self.is_leaf(index) {
            let point = self.leaf_point(index, point_store)?;
            return Ok(point[dim] <= value);
        }
        Ok(self.check_left(self.left_of(index), dim, value, point_store)?
            && self.check_left(self.right_of(index), dim, value, point_store)?)
    }

    pub fn check_right<PS: PointStoreView<F>>(
        &self,
        index: usize,
        dim: usize,
        value: F,
        point_store: &PS,
    ) -> Result<bool> {
        if self.is_leaf(index) {
            let point = self.leaf_point(index, point_store)?;
            return Ok(point[dim] > value);
        }
        Ok(self.check_right(self.left_of(index), dim, value, point_store)?
            && self.check_right(self.right_of(index), dim, value, point_store)?)
    }

    pub fn to_state(&self) -> NodeStoreState {
        let mut leaf_mass_overflow: Vec<(usize, usize)> = self
            .leaf_mass_overflow
            .iter()
            .map(|(&k, &v)| (k, v))
            .collect();
        leaf_mass_overflow.sort();
        NodeStoreState {
            capacity: self.capacity,
            dimensions: self.dimensions,
            rotation_aware: self.rotation_aware,
            cache_fraction: self.cache_fraction,
            left_index: self.left_index.iter().map(|x| x.to_usize()).collect(),
            right_index: self.right_index.iter().map(|x| x.to_usize()).collect(),
            cut_dimension: self
                .cut_dimension
                .iter()
                .map(|&x| {
                    if x == C::MAX_INDEX {
                        usize::MAX
                    } else {
                        x.to_usize()
                    }
                })
                .collect(),
            cut_value: self.cut_value.iter().map(|x| x.into_f64()).collect(),
            mass: self.mass.iter().map(|x| x.to_usize()).collect(),
            leaf_mass_overflow,
            node_manager: self.node_manager.to_state(),
        }
    }

    pub fn from_state(state: &NodeStoreState) -> Result<Self> {
        let n = state.capacity - 1;
        check_state(
            state.left_index.len() == n
                && state.right_index.len() == n
                && state.cut_dimension.len() == n
                && state.cut_value.len() == n
                && state.mass.len() == n,
            "mismatched node arrays",
        )?;
        let cache_limit = (state.cache_fraction * state.capacity as f64) as usize;
        Ok(PackedNodeStore {
            capacity: state.capacity,
            dimensions: state.dimensions,
            rotation_aware: state.rotation_aware,
            cache_fraction: state.cache_fraction,
            left_index: state.left_index.iter().map(|&x| P::from_usize(x)).collect(),
            right_index: state
                .right_index
                .iter()
                .map(|&x| P::from_usize(x))
                .collect(),
            cut_dimension: state
                .cut_dimension
                .iter()
                .map(|&x| {
                    if x == usize::MAX {
                        C::MAX_INDEX
                    } else {
                        C::from_usize(x)
                    }
                })
                .collect(),
            cut_value: state.cut_value.iter().map(|&x| F::from_f64(x)).collect(),
            mass: state.mass.iter().map(|&x| N::from_usize(x)).collect(),
            bounding_box_data: vec![F::zero(); 2 * state.dimensions * cache_limit],
            range_sum_data: vec![0.0; cache_limit],
            leaf_mass_overflow: state.leaf_mass_overflow.iter().copied().collect(),
            node_manager: IndexManager::from_state(&state.node_manager)?,
        })
    }
}
