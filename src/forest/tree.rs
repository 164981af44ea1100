use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

use crate::forest::boundingbox::BoundingBox;
use crate::forest::cut::Cut;
use crate::forest::nodestore::{NodeStoreState, PackedNodeStore};
use crate::forest::nodeview::TraversalView;
use crate::store::pointstore::PointStoreView;
use crate::types::{Result, StoreFloat, StoreIndex};
use crate::util::check_state;
use crate::visitor::impute::ImputeVisitor;
use crate::visitor::{BranchVisitor, Visitor, VisitorInfo};

/// A random cut tree over points held in a shared point store. Structure
/// lives in a [`PackedNodeStore`]; the tree itself is the root, the mass and
/// the evolving seed for cut selection.
pub struct CutTree<C, P, N, F>
where
    C: StoreIndex,
    P: StoreIndex,
    N: StoreIndex,
    F: StoreFloat,
{
    dimensions: usize,
    capacity: usize,
    node_store: PackedNodeStore<C, P, N, F>,
    random_seed: u64,
    root: usize,
    tree_mass: usize,
}

/// Captured state of a [`CutTree`]; node fields are preserved exactly and
/// the box cache is rebuilt on restore.
#[derive(Clone, Debug)]
pub struct TreeState {
    pub dimensions: usize,
    pub capacity: usize,
    pub root: usize,
    pub tree_mass: usize,
    pub random_seed: u64,
    pub node_store: NodeStoreState,
}

impl<C, P, N, F> CutTree<C, P, N, F>
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
        cache_fraction: f64,
        random_seed: u64,
    ) -> Self {
        let node_store = PackedNodeStore::new(capacity, dimensions, rotation_aware, cache_fraction);
        let root = node_store.null_node();
        CutTree {
            dimensions,
            capacity,
            node_store,
            random_seed,
            root,
            tree_mass: 0,
        }
    }

    pub fn mass(&self) -> usize {
        self.tree_mass
    }

    pub fn is_empty(&self) -> bool {
        self.root == self.node_store.null_node()
    }

    /// Insert a point; returns the point index actually referenced, which is
    /// an existing equal point's index when the insert coalesces.
    pub fn add<PS: PointStoreView<F>>(
        &mut self,
        point_index: usize,
        point_store: &PS,
    ) -> Result<usize> {
        if self.is_empty() {
            self.root = self.node_store.leaf_index(point_index);
            self.tree_mass = 1;
            return Ok(point_index);
        }
        let point = point_store.copy(point_index)?;
        let mut path_to_root: Vec<(usize, usize)> = Vec::new();
        self.node_store.set_path(&mut path_to_root, self.root, &point);
        let (mut node, mut sibling) = path_to_root.pop().expect("path cannot be empty");

        let leaf_point_index = self.node_store.point_index(node)?;
        let old_point = point_store.copy(leaf_point_index)?;

        self.tree_mass += 1;
        if point == old_point {
            self.node_store.increase_leaf_mass(node)?;
            self.node_store
                .manage_ancestors_add(&mut path_to_root, &point, point_store, true);
            return Ok(leaf_point_index);
        }

        let null_node = self.node_store.null_node();
        let mut saved_parent = path_to_root.last().map(|x| x.0).unwrap_or(null_node);
        let mut saved_node = node;
        let mut current_box = BoundingBox::new(&old_point, &old_point);
        let mut saved_box = current_box.clone();
        let mut parent_path: Vec<(usize, usize)> = Vec::new();
        let mut rng = ChaCha20Rng::seed_from_u64(self.random_seed);
        self.random_seed = rng.next_u64();

        let mut parent = saved_parent;
        let mut saved_cut: Cut<F> = Cut::placeholder();
        loop {
            let factor: f64 = rng.gen();
            let (new_cut, separation) =
                Cut::random_cut_and_separation(&current_box, factor, &point);
            if separation {
                saved_cut = new_cut;
                saved_parent = parent;
                saved_node = node;
                saved_box = current_box.clone();
                parent_path.clear();
            } else {
                parent_path.push((node, sibling));
            }
            check_state(saved_cut.dimension != usize::MAX, "no separating cut found")?;

            if parent == null_node {
                break;
            }
            self.node_store
                .grow_node_box(&mut current_box, point_store, parent, sibling)?;
            let (a, b) = path_to_root.pop().expect("walk outran the path");
            node = a;
            sibling = b;
            parent = path_to_root.last().map(|x| x.0).unwrap_or(null_node);
        }

        if saved_parent != null_node {
            while let Some(entry) = parent_path.pop() {
                path_to_root.push(entry);
            }
            check_state(
                path_to_root.last().map(|x| x.0) == Some(saved_parent),
                "insertion point fell off the path",
            )?;
        } else {
            check_state(path_to_root.is_empty(), "dangling ancestors at the root")?;
        }

        let merged_node = self.node_store.add_node(
            saved_parent,
            &point,
            saved_node,
            point_index,
            saved_cut,
            &saved_box,
        )?;
        if saved_parent != null_node {
            self.node_store
                .manage_ancestors_add(&mut path_to_root, &point, point_store, false);
        } else {
            self.root = merged_node;
        }
        Ok(point_index)
    }

    /// Delete a point; the leaf collapses into its sibling when its mass
    /// reaches zero. Returns the point index that was referenced.
    pub fn delete<PS: PointStoreView<F>>(
        &mut self,
        point_index: usize,
        point_store: &PS,
    ) -> Result<usize> {
        check_state(!self.is_empty(), "deleting from an empty tree")?;
        self.tree_mass -= 1;
        let point = point_store.copy(point_index)?;
        let mut leaf_path: Vec<(usize, usize)> = Vec::new();
        self.node_store.set_path(&mut leaf_path, self.root, &point);
        let (leaf_node, leaf_sibling) = leaf_path.pop().expect("path cannot be empty");

        let leaf_point_index = self.node_store.point_index(leaf_node)?;
        if leaf_point_index != point_index && !point_store.is_equal(&point, leaf_point_index)? {
            return Err(crate::errors::ForestError::IllegalState {
                msg: "deleting a point absent from the tree",
            });
        }

        if self.node_store.decrease_leaf_mass(leaf_node)? == 0 {
            if leaf_path.is_empty() {
                self.root = self.node_store.null_node();
            } else {
                let (parent, _sibling) = leaf_path.pop().expect("checked");
                let null_node = self.node_store.null_node();
                let grand_parent = leaf_path.last().map(|x| x.0).unwrap_or(null_node);
                if grand_parent == null_node {
                    self.root = leaf_sibling;
                } else {
                    self.node_store.replace_node(grand_parent, parent, leaf_sibling);
                    self.node_store.manage_ancestors_delete(
                        &mut leaf_path,
                        &point,
                        point_store,
                        false,
                    )?;
                }
                self.node_store.delete_internal_node(parent)?;
            }
        } else {
            self.node_store
                .manage_ancestors_delete(&mut leaf_path, &point, point_store, true)?;
        }
        Ok(leaf_point_index)
    }

    pub fn traverse<PS, V, R>(
        &self,
        point: &[F],
        parameters: &[usize],
        visitor_factory: fn(usize, &[usize], &VisitorInfo<F>) -> V,
        visitor_info: &VisitorInfo<F>,
        point_store: &PS,
        default: &R,
    ) -> Result<R>
    where
        PS: PointStoreView<F>,
        V: Visitor<F, R>,
        R: Clone,
    {
        if self.is_empty() {
            return Ok(default.clone());
        }
        let mut visitor = visitor_factory(self.tree_mass, parameters, visitor_info);
        let maintain_box =
            visitor.needs_path_box() || self.node_store.use_path_for_box();
        let mut view = TraversalView::new(self.root, maintain_box, &self.node_store);
        self.traverse_recursive(point, &mut view, &mut visitor, visitor_info, point_store)?;
        visitor.result(visitor_info)
    }

    fn traverse_recursive<PS, V, R>(
        &self,
        point: &[F],
        view: &mut TraversalView<F>,
        visitor: &mut V,
        visitor_info: &VisitorInfo<F>,
        point_store: &PS,
    ) -> Result<()>
    where
        PS: PointStoreView<F>,
        V: Visitor<F, R>,
    {
        let current = view.current_node();
        if self.node_store.is_leaf(current) {
            view.update_at_leaf(point, current, &self.node_store, point_store)?;
            visitor.accept_leaf(point, visitor_info, view)?;
            if visitor.use_shadow_box() {
                view.set_use_shadow_box(&self.node_store, point_store)?;
            }
        } else {
            view.descend(point, &self.node_store);
            self.traverse_recursive(point, view, visitor, visitor_info, point_store)?;
            if !visitor.is_converged() {
                view.ascend(point, current, &self.node_store, point_store)?;
                visitor.accept(point, visitor_info, view)?;
            }
        }
        Ok(())
    }

    /// the likeliest conditional sample `(score, point_index, distance)` for
    /// a query with missing coordinates
    pub fn conditional_field<PS: PointStoreView<F>>(
        &self,
        missing: &[usize],
        point: &[F],
        point_store: &PS,
        centrality: f64,
        seed: u64,
        visitor_info: &VisitorInfo<F>,
    ) -> Result<(f64, usize, f64)> {
        if self.is_empty() {
            return Ok((0.0, usize::MAX, 0.0));
        }
        let mut visitor = ImputeVisitor::new(missing, centrality, self.tree_mass, seed);
        let maintain_box = self.node_store.use_path_for_box();
        let mut view = TraversalView::new(self.root, maintain_box, &self.node_store);
        let mut missing_flags = vec![false; self.dimensions];
        for &i in missing {
            missing_flags[i] = true;
        }
        self.traverse_branched_recursive::<PS, ImputeVisitor, (f64, usize, f64)>(
            point,
            &mut view,
            &mut visitor,
            visitor_info,
            &missing_flags,
            point_store,
        )?;
        Visitor::<F, (f64, usize, f64)>::result(&visitor, visitor_info)
    }

    fn traverse_branched_recursive<PS, V, R>(
        &self,
        point: &[F],
        view: &mut TraversalView<F>,
        visitor: &mut V,
        visitor_info: &VisitorInfo<F>,
        missing_flags: &[bool],
        point_store: &PS,
    ) -> Result<()>
    where
        PS: PointStoreView<F>,
        V: BranchVisitor<F, R>,
    {
        let current = view.current_node();
        if self.node_store.is_leaf(current) {
            view.update_at_leaf(point, current, &self.node_store, point_store)?;
            visitor.accept_leaf(point, visitor_info, view)?;
            return Ok(());
        }
        let parent = current;
        view.record_cut(&self.node_store);
        if missing_flags[self.node_store.cut_dimension(parent)] {
            // the cut cannot route the query; follow both children
            let second = self.node_store.left_of(parent);
            let first = self.node_store.right_of(parent);
            view.set_current_node(first);
            self.traverse_branched_recursive(
                point,
                view,
                visitor,
                visitor_info,
                missing_flags,
                point_store,
            )?;
            let saved_box = view.bounding_box();
            view.set_current_node(second);
            self.traverse_branched_recursive(
                point,
                view,
                visitor,
                visitor_info,
                missing_flags,
                point_store,
            )?;
            visitor.combine_branches(point, view, visitor_info)?;
            if !visitor.is_converged() {
                view.merge_paths(
                    parent,
                    saved_box,
                    point,
                    missing_flags,
                    &self.node_store,
                    point_store,
                )?;
            }
        } else {
            view.descend(point, &self.node_store);
            self.traverse_branched_recursive(
                point,
                view,
                visitor,
                visitor_info,
                missing_flags,
                point_store,
            )?;
            if !visitor.is_converged() {
                view.ascend_with_missing(
                    parent,
                    point,
                    missing_flags,
                    &self.node_store,
                    point_store,
                )?;
            }
        }
        if !visitor.is_converged() {
            visitor.accept(point, visitor_info, view)?;
        }
        Ok(())
    }

    pub fn set_cache_fraction<PS: PointStoreView<F>>(
        &mut self,
        fraction: f64,
        point_store: &PS,
    ) -> Result<()> {
        self.node_store
            .set_cache_fraction(fraction, self.root, point_store)
    }

    /// verify mass accounting and cut routing over the whole tree
    pub fn validate<PS: PointStoreView<F>>(&self, point_store: &PS) -> Result<()> {
        if self.is_empty() {
            check_state(self.tree_mass == 0, "empty tree with nonzero mass")?;
            return Ok(());
        }
        let mass = self.validate_node(self.root, point_store)?;
        check_state(mass == self.tree_mass, "tree mass does not add up")?;
        Ok(())
    }

    fn validate_node<PS: PointStoreView<F>>(
        &self,
        index: usize,
        point_store: &PS,
    ) -> Result<usize> {
        if self.node_store.is_leaf(index) {
            return Ok(self.node_store.mass_of(index));
        }
        let left = self.node_store.left_of(index);
        let right = self.node_store.right_of(index);
        let dim = self.node_store.cut_dimension(index);
        let value = self.node_store.cut_value(index);
        check_state(
            self.node_store.check_left(left, dim, value, point_store)?,
            "left subtree crosses the cut",
        )?;
        check_state(
            self.node_store.check_right(right, dim, value, point_store)?,
            "right subtree crosses the cut",
        )?;
        let left_mass = self.validate_node(left, point_store)?;
        let right_mass = self.validate_node(right, point_store)?;
        check_state(
            self.node_store.mass_of(index) == left_mass + right_mass,
            "internal mass does not equal the children",
        )?;
        Ok(left_mass + right_mass)
    }

    /// point indices of all leaves with multiplicity, for refcount audits
    pub fn collect_leaves(&self, answer: &mut Vec<(usize, usize)>) {
        if !self.is_empty() {
            self.collect_from(self.root, answer);
        }
    }

    fn collect_from(&self, index: usize, answer: &mut Vec<(usize, usize)>) {
        if self.node_store.is_leaf(index) {
            if let Ok(point_index) = self.node_store.point_index(index) {
                answer.push((point_index, self.node_store.mass_of(index)));
            }
            return;
        }
        self.collect_from(self.node_store.left_of(index), answer);
        self.collect_from(self.node_store.right_of(index), answer);
    }

    pub fn to_state(&self) -> TreeState {
        TreeState {
            dimensions: self.dimensions,
            capacity: self.capacity,
            root: self.root,
            tree_mass: self.tree_mass,
            random_seed: self.random_seed,
            node_store: self.node_store.to_state(),
        }
    }

    pub fn from_state<PS: PointStoreView<F>>(
        state: &TreeState,
        point_store: &PS,
    ) -> Result<Self> {
        let mut node_store = PackedNodeStore::from_state(&state.node_store)?;
        if state.root != state.capacity - 1 {
            node_store.rebuild_cache(state.root, point_store)?;
        }
        Ok(CutTree {
            dimensions: state.dimensions,
            capacity: state.capacity,
            node_store,
            random_seed: state.random_seed,
            root: state.root,
            tree_mass: state.tree_mass,
        })
    }
}
