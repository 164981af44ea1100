use crate::common::divector::DiVector;
use crate::forest::boundingbox::BoundingBox;
use crate::forest::nodestore::PackedNodeStore;
use crate::store::pointstore::PointStoreView;
use crate::types::{Result, StoreFloat, StoreIndex};
use crate::util::check_state;

/// The moving window a visitor sees while a tree is traversed. The view
/// tracks the current node, its mass and depth, the probability that a
/// random cut separates the query point, and optionally the merged bounding
/// box along the path (plus a shadow box that excludes the query's duplicate
/// when mass is being ignored).
pub struct TraversalView<F> {
    current_node: usize,
    probability_of_cut: f64,
    shadow_probability: f64,
    mass: usize,
    depth: usize,
    leaf_index: usize,
    leaf_duplicate: bool,
    use_shadow_box: bool,
    maintain_box: bool,
    current_box: Option<BoundingBox<F>>,
    shadow_box: Option<BoundingBox<F>>,
    cut_dimension: usize,
    cut_value: F,
    leaf_point: Vec<F>,
}

impl<F: StoreFloat> TraversalView<F> {
    pub fn new<C, P, N>(
        root: usize,
        maintain_box: bool,
        node_store: &PackedNodeStore<C, P, N, F>,
    ) -> Self
    where
        C: StoreIndex,
        P: StoreIndex,
        N: StoreIndex,
    {
        let (cut_dimension, cut_value, _left, _right) = node_store.cut_and_children(root);
        TraversalView {
            current_node: root,
            probability_of_cut: f64::MAX,
            shadow_probability: f64::MAX,
            mass: node_store.mass_of(root),
            depth: 0,
            leaf_index: usize::MAX,
            leaf_duplicate: false,
            use_shadow_box: false,
            maintain_box,
            current_box: None,
            shadow_box: None,
            cut_dimension,
            cut_value,
            leaf_point: Vec::new(),
        }
    }

    pub fn current_node(&self) -> usize {
        self.current_node
    }

    pub fn set_current_node(&mut self, index: usize) {
        self.current_node = index;
    }

    pub fn probability_of_cut(&self) -> f64 {
        self.probability_of_cut
    }

    pub fn shadow_probability_of_cut(&self) -> f64 {
        self.shadow_probability
    }

    pub fn mass(&self) -> usize {
        self.mass
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn leaf_index(&self) -> usize {
        self.leaf_index
    }

    pub fn is_duplicate(&self) -> bool {
        self.leaf_duplicate
    }

    pub fn cut_dimension(&self) -> usize {
        self.cut_dimension
    }

    pub fn cut_value(&self) -> F {
        self.cut_value
    }

    pub fn leaf_point(&self) -> &[F] {
        &self.leaf_point
    }

    pub fn bounding_box(&self) -> Option<BoundingBox<F>> {
        self.current_box.clone()
    }

    pub fn shadow_box(&self) -> Option<BoundingBox<F>> {
        self.shadow_box.clone()
    }

    pub fn assign_probability_of_cut(&self, di_vector: &mut DiVector, point: &[F]) {
        let bounding_box = self
            .current_box
            .as_ref()
            .expect("path box required for attribution");
        di_vector.assign_as_probability_of_cut(bounding_box, point);
    }

    pub fn assign_shadow_probability_of_cut(&self, di_vector: &mut DiVector, point: &[F]) {
        let bounding_box = self
            .shadow_box
            .as_ref()
            .expect("shadow box not initialized");
        di_vector.assign_as_probability_of_cut(bounding_box, point);
    }

    pub fn update_at_leaf<C, P, N, PS>(
        &mut self,
        point: &[F],
        index: usize,
        node_store: &PackedNodeStore<C, P, N, F>,
        point_store: &PS,
    ) -> Result<()>
    where
        C: StoreIndex,
        P: StoreIndex,
        N: StoreIndex,
        PS: PointStoreView<F>,
    {
        self.leaf_index = node_store.point_index(index)?;
        self.leaf_point = point_store.copy(self.leaf_index)?;
        self.mass = node_store.mass_of(index);
        self.leaf_duplicate = self.leaf_point.as_slice() == point;
        self.probability_of_cut = if self.leaf_duplicate { 0.0 } else { 1.0 };
        if self.maintain_box {
            self.current_box = Some(BoundingBox::from_point(&self.leaf_point));
        }
        Ok(())
    }

    pub fn descend<C, P, N>(&mut self, point: &[F], node_store: &PackedNodeStore<C, P, N, F>)
    where
        C: StoreIndex,
        P: StoreIndex,
        N: StoreIndex,
    {
        self.current_node = if node_store.is_left_of(self.current_node, point) {
            node_store.left_of(self.current_node)
        } else {
            node_store.right_of(self.current_node)
        };
        let (cut_dimension, cut_value, _left, _right) =
            node_store.cut_and_children(self.current_node);
        self.cut_dimension = cut_dimension;
        self.cut_value = cut_value;
        self.depth += 1;
    }

    pub fn ascend<C, P, N, PS>(
        &mut self,
        point: &[F],
        parent: usize,
        node_store: &PackedNodeStore<C, P, N, F>,
        point_store: &PS,
    ) -> Result<()>
    where
        C: StoreIndex,
        P: StoreIndex,
        N: StoreIndex,
        PS: PointStoreView<F>,
    {
        self.probability_of_cut = match &mut self.current_box {
            Some(bounding_box) => {
                let sibling = node_store.sibling_of(self.current_node, parent);
                if self.use_shadow_box {
                    let sibling_box = node_store.get_box(sibling, point_store)?;
                    bounding_box.add_box(&sibling_box);
                    match &mut self.shadow_box {
                        Some(shadow) => shadow.add_box(&sibling_box),
                        None => self.shadow_box = Some(sibling_box),
                    }
                    self.shadow_probability = self
                        .shadow_box
                        .as_ref()
                        .expect("just set")
                        .probability_of_cut(point);
                } else {
                    node_store.grow_node_box(bounding_box, point_store, parent, sibling)?;
                }
                bounding_box.probability_of_cut(point)
            }
            None => node_store.probability_of_cut(parent, point, point_store)?,
        };
        self.current_node = parent;
        let (cut_dimension, cut_value, _left, _right) = node_store.cut_and_children(parent);
        self.cut_dimension = cut_dimension;
        self.cut_value = cut_value;
        self.mass = node_store.mass_of(parent);
        check_state(self.depth > 0, "ascending above the root")?;
        self.depth -= 1;
        Ok(())
    }

    pub fn set_use_shadow_box<C, P, N, PS>(
        &mut self,
        node_store: &PackedNodeStore<C, P, N, F>,
        point_store: &PS,
    ) -> Result<()>
    where
        C: StoreIndex,
        P: StoreIndex,
        N: StoreIndex,
        PS: PointStoreView<F>,
    {
        self.use_shadow_box = true;
        // the shadow box excludes the current leaf; it first materializes one
        // level up, but the current box must exist from here on
        if self.current_box.is_none() {
            self.current_box = Some(node_store.get_box(self.current_node, point_store)?);
        }
        Ok(())
    }

    /// refresh the cut information before a branching traversal step
    pub fn record_cut<C, P, N>(&mut self, node_store: &PackedNodeStore<C, P, N, F>)
    where
        C: StoreIndex,
        P: StoreIndex,
        N: StoreIndex,
    {
        let (cut_dimension, cut_value, _left, _right) =
            node_store.cut_and_children(self.current_node);
        self.cut_dimension = cut_dimension;
        self.cut_value = cut_value;
    }

    pub fn ascend_with_missing<C, P, N, PS>(
        &mut self,
        parent: usize,
        point: &[F],
        missing: &[bool],
        node_store: &PackedNodeStore<C, P, N, F>,
        point_store: &PS,
    ) -> Result<()>
    where
        C: StoreIndex,
        P: StoreIndex,
        N: StoreIndex,
        PS: PointStoreView<F>,
    {
        if self.maintain_box {
            let sibling = node_store.sibling_of(self.current_node, parent);
            let bounding_box = self
                .current_box
                .as_mut()
                .expect("path box missing in branched traversal");
            node_store.grow_node_box(bounding_box, point_store, parent, sibling)?;
            self.probability_of_cut = bounding_box.probability_of_cut_with_missing(point, missing);
        } else {
            self.probability_of_cut =
                node_store.probability_of_cut_with_missing(parent, point, missing, point_store)?;
        }
        self.current_node = parent;
        Ok(())
    }

    /// join the boxes of two explored branches at `parent`
    pub fn merge_paths<C, P, N, PS>(
        &mut self,
        parent: usize,
        saved_box: Option<BoundingBox<F>>,
        point: &[F],
        missing: &[bool],
        node_store: &PackedNodeStore<C, P, N, F>,
        point_store: &PS,
    ) -> Result<()>
    where
        C: StoreIndex,
        P: StoreIndex,
        N: StoreIndex,
        PS: PointStoreView<F>,
    {
        if self.maintain_box {
            let bounding_box = self
                .current_box
                .as_mut()
                .expect("path box missing in branched traversal");
            bounding_box.add_box(saved_box.as_ref().expect("saved box missing"));
            self.probability_of_cut = bounding_box.probability_of_cut_with_missing(point, missing);
        } else {
            self.probability_of_cut =
                node_store.probability_of_cut_with_missing(parent, point, missing, point_store)?;
        }
        self.current_node = parent;
        Ok(())
    }
}
