pub mod attribution;
pub mod density;
pub mod impute;
pub mod score;

use crate::forest::nodeview::TraversalView;
use crate::types::{Result, StoreFloat};
use crate::util::l1;

// the expected-inverse-depth scoring functional family; the displacement
// variants weigh separation by sibling mass instead of depth

pub(crate) fn score_seen(depth: usize, mass: usize) -> f64 {
    1.0 / (depth as f64 + f64::log2(1.0 + mass as f64))
}

pub(crate) fn score_unseen(depth: usize, _mass: usize) -> f64 {
    1.0 / (depth as f64 + 1.0)
}

pub(crate) fn normalizer(score: f64, mass: usize) -> f64 {
    score * f64::log2(1.0 + mass as f64)
}

pub(crate) fn damp(leaf_mass: usize, tree_mass: usize) -> f64 {
    1.0 - (leaf_mass as f64) / (2.0 * tree_mass as f64)
}

pub(crate) fn score_seen_displacement(_depth: usize, mass: usize) -> f64 {
    1.0 / (1.0 + mass as f64)
}

pub(crate) fn score_unseen_displacement(_depth: usize, mass: usize) -> f64 {
    mass as f64
}

// normalization by tree size caps the displacement score at 1

pub(crate) fn displacement_normalizer(score: f64, mass: usize) -> f64 {
    score / (1.0 + mass as f64)
}

pub(crate) fn identity(score: f64, _mass: usize) -> f64 {
    score
}

/// The scoring functionals threaded through a traversal. Function pointers
/// rather than closures so a single info can fan out across threads.
pub struct VisitorInfo<F> {
    pub ignore_mass: usize,
    pub score_seen: fn(usize, usize) -> f64,
    pub score_unseen: fn(usize, usize) -> f64,
    pub damp: fn(usize, usize) -> f64,
    pub normalizer: fn(f64, usize) -> f64,
    pub distance: fn(&[F], &[F]) -> f64,
}

impl<F: StoreFloat> VisitorInfo<F> {
    pub fn default() -> Self {
        VisitorInfo {
            ignore_mass: 0,
            score_seen,
            score_unseen,
            damp,
            normalizer,
            distance: l1,
        }
    }

    pub fn displacement() -> Self {
        VisitorInfo {
            ignore_mass: 0,
            score_seen: score_seen_displacement,
            score_unseen: score_unseen_displacement,
            damp,
            normalizer: displacement_normalizer,
            distance: l1,
        }
    }

    pub fn density() -> Self {
        VisitorInfo {
            ignore_mass: 0,
            score_seen: score_seen_displacement,
            score_unseen: score_unseen_displacement,
            damp,
            normalizer: identity,
            distance: l1,
        }
    }

    pub fn use_score(
        ignore_mass: usize,
        score_seen: fn(usize, usize) -> f64,
        score_unseen: fn(usize, usize) -> f64,
        damp: fn(usize, usize) -> f64,
        normalizer: fn(f64, usize) -> f64,
    ) -> Self {
        VisitorInfo {
            ignore_mass,
            score_seen,
            score_unseen,
            damp,
            normalizer,
            distance: l1,
        }
    }

    pub fn use_distance(distance: fn(&[F], &[F]) -> f64) -> Self {
        VisitorInfo {
            ignore_mass: 0,
            score_seen,
            score_unseen,
            damp,
            normalizer,
            distance,
        }
    }
}

/// A visitor accumulates a result while a traversal unwinds from the leaf
/// back to the root.
pub trait Visitor<F: StoreFloat, R> {
    fn accept_leaf(
        &mut self,
        point: &[F],
        visitor_info: &VisitorInfo<F>,
        view: &TraversalView<F>,
    ) -> Result<()>;
    fn accept(
        &mut self,
        point: &[F],
        visitor_info: &VisitorInfo<F>,
        view: &TraversalView<F>,
    ) -> Result<()>;
    fn result(&self, visitor_info: &VisitorInfo<F>) -> Result<R>;
    fn is_converged(&self) -> bool;
    fn use_shadow_box(&self) -> bool;
    /// whether the traversal must maintain the merged path box for this
    /// visitor (attribution and density need per-dimension gaps)
    fn needs_path_box(&self) -> bool {
        false
    }
}

/// A visitor that can follow both children when a cut falls on a missing
/// coordinate, later combining the two partial answers.
pub trait BranchVisitor<F: StoreFloat, R>: Visitor<F, R> {
    fn combine_branches(
        &mut self,
        point: &[F],
        view: &TraversalView<F>,
        visitor_info: &VisitorInfo<F>,
    ) -> Result<()>;
}
