use crate::forest::nodeview::TraversalView;
use crate::types::{Result, StoreFloat};
use crate::visitor::{Visitor, VisitorInfo};

/// Computes the anomaly score of one tree: the expected inverse depth of the
/// query under a random cut, folded bottom-up with separation probabilities.
pub struct ScoreVisitor {
    tree_mass: usize,
    ignore_mass: usize,
    leaf_index: usize,
    score: f64,
    converged: bool,
    use_shadow_box: bool,
}

impl ScoreVisitor {
    pub fn new<F: StoreFloat>(tree_mass: usize, visitor_info: &VisitorInfo<F>) -> Self {
        ScoreVisitor {
            tree_mass,
            ignore_mass: visitor_info.ignore_mass,
            leaf_index: usize::MAX,
            score: 0.0,
            converged: false,
            use_shadow_box: false,
        }
    }

    pub fn create<F: StoreFloat>(
        tree_mass: usize,
        _parameters: &[usize],
        visitor_info: &VisitorInfo<F>,
    ) -> Self {
        ScoreVisitor::new(tree_mass, visitor_info)
    }
}

impl<F: StoreFloat> Visitor<F, f64> for ScoreVisitor {
    fn accept_leaf(
        &mut self,
        _point: &[F],
        visitor_info: &VisitorInfo<F>,
        view: &TraversalView<F>,
    ) -> Result<()> {
        let mass = view.mass();
        self.leaf_index = view.leaf_index();
        if mass > self.ignore_mass {
            if view.is_duplicate() {
                self.score = (visitor_info.damp)(mass, self.tree_mass)
                    * (visitor_info.score_seen)(view.depth(), mass);
                self.converged = true;
            } else {
                self.score = (visitor_info.score_unseen)(view.depth(), mass);
            }
        } else {
            self.score = (visitor_info.score_unseen)(view.depth(), mass);
            self.use_shadow_box = true;
        }
        Ok(())
    }

    fn accept(
        &mut self,
        _point: &[F],
        visitor_info: &VisitorInfo<F>,
        view: &TraversalView<F>,
    ) -> Result<()> {
        if !self.converged {
            let probability = if !self.use_shadow_box {
                view.probability_of_cut()
            } else {
                view.shadow_probability_of_cut()
            };
            if probability == 0.0 {
                self.converged = true;
            } else {
                self.score = (1.0 - probability) * self.score
                    + probability * (visitor_info.score_unseen)(view.depth(), view.mass());
            }
        }
        Ok(())
    }

    fn result(&self, visitor_info: &VisitorInfo<F>) -> Result<f64> {
        Ok((visitor_info.normalizer)(self.score, self.tree_mass))
    }

    fn is_converged(&self) -> bool {
        self.converged
    }

    fn use_shadow_box(&self) -> bool {
        self.use_shadow_box
    }
}
