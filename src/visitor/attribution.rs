use crate::common::divector::DiVector;
use crate::forest::nodeview::TraversalView;
use crate::types::{Result, StoreFloat};
use crate::util::check_state;
use crate::visitor::{Visitor, VisitorInfo};

/// Splits the anomaly score of one tree across dimensions and directions.
/// The per-node separation probabilities are attributed to the coordinates
/// that produce them, then folded with the same recurrence as the score, so
/// the high/low totals sum back to the score.
pub struct AttributionVisitor {
    tree_mass: usize,
    leaf_index: usize,
    score: f64,
    converged: bool,
    hit_duplicate: bool,
    use_shadow_box: bool,
    attribution: DiVector,
    probability: DiVector,
}

impl AttributionVisitor {
    pub fn new(tree_mass: usize, dimensions: usize) -> Self {
        AttributionVisitor {
            tree_mass,
            leaf_index: usize::MAX,
            score: 0.0,
            converged: false,
            hit_duplicate: false,
            use_shadow_box: false,
            attribution: DiVector::empty(dimensions),
            probability: DiVector::empty(dimensions),
        }
    }

    pub fn create<F: StoreFloat>(
        tree_mass: usize,
        parameters: &[usize],
        _visitor_info: &VisitorInfo<F>,
    ) -> Self {
        AttributionVisitor::new(tree_mass, parameters[0])
    }
}

impl<F: StoreFloat> Visitor<F, DiVector> for AttributionVisitor {
    fn accept_leaf(
        &mut self,
        point: &[F],
        visitor_info: &VisitorInfo<F>,
        view: &TraversalView<F>,
    ) -> Result<()> {
        let mass = view.mass();
        self.leaf_index = view.leaf_index();
        if mass > visitor_info.ignore_mass {
            if view.is_duplicate() {
                self.score = (visitor_info.damp)(mass, self.tree_mass)
                    * (visitor_info.score_seen)(view.depth(), mass);
                self.hit_duplicate = true;
                self.use_shadow_box = true;
            } else {
                self.score = (visitor_info.score_unseen)(view.depth(), mass);
                view.assign_probability_of_cut(&mut self.probability, point);
                check_state(
                    (self.probability.total() - 1.0).abs() < 1e-6,
                    "leaf separation must have probability one",
                )?;
                self.attribution.add_from(&self.probability, self.score);
            }
        } else {
            self.score = (visitor_info.score_unseen)(view.depth(), mass);
            self.use_shadow_box = true;
        }
        Ok(())
    }

    fn accept(
        &mut self,
        point: &[F],
        visitor_info: &VisitorInfo<F>,
        view: &TraversalView<F>,
    ) -> Result<()> {
        if !self.converged {
            if !self.use_shadow_box {
                view.assign_probability_of_cut(&mut self.probability, point);
            } else {
                view.assign_shadow_probability_of_cut(&mut self.probability, point);
            }
            let probability = self.probability.total();
            if probability == 0.0 {
                self.converged = true;
            } else {
                let new_value = (visitor_info.score_unseen)(view.depth(), view.mass());
                if !self.hit_duplicate {
                    self.score = (1.0 - probability) * self.score + probability * new_value;
                }
                self.attribution.scale(1.0 - probability);
                self.attribution.add_from(&self.probability, new_value);
            }
        }
        Ok(())
    }

    fn result(&self, visitor_info: &VisitorInfo<F>) -> Result<DiVector> {
        let normalized = (visitor_info.normalizer)(self.score, self.tree_mass);
        let mut answer = self.attribution.clone();
        answer.normalize(normalized);
        Ok(answer)
    }

    fn is_converged(&self) -> bool {
        self.converged
    }

    fn use_shadow_box(&self) -> bool {
        self.use_shadow_box
    }

    fn needs_path_box(&self) -> bool {
        true
    }
}
