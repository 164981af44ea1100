use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::forest::nodeview::TraversalView;
use crate::types::{Result, StoreFloat};
use crate::util::check_state;
use crate::visitor::{BranchVisitor, Visitor, VisitorInfo};

/// Locates the likeliest leaf conditioned on the non-missing coordinates.
/// Used both for imputation/conditional fields (with missing coordinates,
/// branching where a cut lands on one) and as a near-neighbor probe (with
/// nothing missing). The result is `(score, point_index, distance)`.
pub struct ImputeVisitor {
    centrality: f64,
    tree_mass: usize,
    rng: ChaCha20Rng,
    missing: Vec<usize>,
    stack: Vec<ImputeStackEntry>,
    use_shadow_box: bool,
}

struct ImputeStackEntry {
    converged: bool,
    score: f64,
    random: f32,
    index: usize,
    distance: f64,
}

impl ImputeVisitor {
    pub fn new(missing: &[usize], centrality: f64, tree_mass: usize, seed: u64) -> Self {
        ImputeVisitor {
            centrality,
            tree_mass,
            rng: ChaCha20Rng::seed_from_u64(seed),
            missing: Vec::from(missing),
            stack: Vec::new(),
            use_shadow_box: false,
        }
    }

    /// near-neighbor probe; `parameters` carries (percentile, seed)
    pub fn create_nbr<F: StoreFloat>(
        tree_mass: usize,
        parameters: &[usize],
        _visitor_info: &VisitorInfo<F>,
    ) -> Self {
        let percentile = if !parameters.is_empty() {
            parameters[0]
        } else {
            50
        };
        let seed = if parameters.len() > 1 { parameters[1] } else { 0 };
        let centrality = if !(5..=95).contains(&percentile) {
            0.0
        } else {
            1.0 - (1.0 - percentile as f64 / 50.0).abs()
        };
        ImputeVisitor::new(&[], centrality, tree_mass, seed as u64)
    }

    // interpolates between the anomaly-score ordering and a uniformly random
    // ordering of the candidate leaves
    fn adjusted_score<F: StoreFloat>(
        &self,
        entry: &ImputeStackEntry,
        visitor_info: &VisitorInfo<F>,
    ) -> f64 {
        self.centrality * (visitor_info.normalizer)(entry.score, self.tree_mass)
            + (1.0 - self.centrality) * entry.random as f64
    }
}

impl<F: StoreFloat> Visitor<F, (f64, usize, f64)> for ImputeVisitor {
    fn accept_leaf(
        &mut self,
        point: &[F],
        visitor_info: &VisitorInfo<F>,
        view: &TraversalView<F>,
    ) -> Result<()> {
        let mass = view.mass();
        let leaf_point = view.leaf_point();
        let mut candidate = Vec::from(point);
        for &i in self.missing.iter() {
            candidate[i] = leaf_point[i];
        }
        let mut converged = false;
        let score;
        if mass > visitor_info.ignore_mass || !self.missing.is_empty() {
            if view.is_duplicate() {
                score = (visitor_info.damp)(mass, self.tree_mass)
                    * (visitor_info.score_seen)(view.depth(), mass);
                converged = true;
            } else {
                score = (visitor_info.score_unseen)(view.depth(), mass);
            }
        } else {
            // the shadow box is undefined over missing coordinates; for the
            // near-neighbor case this mirrors the score visitor
            score = (visitor_info.score_unseen)(view.depth(), mass);
            self.use_shadow_box = true;
        }
        let distance = (visitor_info.distance)(&candidate, leaf_point);
        self.stack.push(ImputeStackEntry {
            converged,
            score,
            random: self.rng.gen::<f32>(),
            index: view.leaf_index(),
            distance,
        });
        Ok(())
    }

    fn accept(
        &mut self,
        _point: &[F],
        visitor_info: &VisitorInfo<F>,
        view: &TraversalView<F>,
    ) -> Result<()> {
        let mut top = self
            .stack
            .pop()
            .ok_or(crate::errors::ForestError::IllegalState {
                msg: "impute traversal stack underflow",
            })?;
        if !top.converged {
            let probability = if !self.use_shadow_box {
                view.probability_of_cut()
            } else {
                view.shadow_probability_of_cut()
            };
            if probability == 0.0 {
                top.converged = true;
            } else {
                top.score = (1.0 - probability) * top.score
                    + probability * (visitor_info.score_unseen)(view.depth(), view.mass());
            }
        }
        self.stack.push(top);
        Ok(())
    }

    fn result(&self, visitor_info: &VisitorInfo<F>) -> Result<(f64, usize, f64)> {
        check_state(self.stack.len() == 1, "impute traversal left a branch open")?;
        let top = self.stack.last().expect("nonempty");
        let normalized = (visitor_info.normalizer)(top.score, self.tree_mass);
        Ok((normalized, top.index, top.distance))
    }

    fn is_converged(&self) -> bool {
        !self.stack.is_empty() && self.stack.last().expect("nonempty").converged
    }

    fn use_shadow_box(&self) -> bool {
        self.use_shadow_box
    }
}

impl<F: StoreFloat> BranchVisitor<F, (f64, usize, f64)> for ImputeVisitor {
    fn combine_branches(
        &mut self,
        _point: &[F],
        _view: &TraversalView<F>,
        visitor_info: &VisitorInfo<F>,
    ) -> Result<()> {
        check_state(self.stack.len() >= 2, "branch combination needs two entries")?;
        let mut top = self.stack.pop().expect("checked");
        let mut next = self.stack.pop().expect("checked");
        if self.adjusted_score(&top, visitor_info) < self.adjusted_score(&next, visitor_info) {
            top.converged = top.converged || next.converged;
            self.stack.push(top);
        } else {
            next.converged = top.converged || next.converged;
            self.stack.push(next);
        }
        Ok(())
    }
}
