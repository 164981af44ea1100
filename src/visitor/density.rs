use crate::common::divector::DiVector;
use crate::forest::boundingbox::BoundingBox;
use crate::forest::nodeview::TraversalView;
use crate::types::{Result, StoreFloat};
use crate::util::check_state;
use crate::visitor::{Visitor, VisitorInfo};

/// Directional density estimate accumulated along a traversal: a measure per
/// side, the distances to the enclosing region per side, and the probability
/// mass of reaching each side.
#[derive(Clone)]
pub struct InterpolationMeasure {
    pub measure: DiVector,
    pub distance: DiVector,
    pub probability_mass: DiVector,
    pub sample_size: f32,
}

impl InterpolationMeasure {
    pub fn empty(dimensions: usize, sample_size: f32) -> Self {
        InterpolationMeasure {
            measure: DiVector::empty(dimensions),
            distance: DiVector::empty(dimensions),
            probability_mass: DiVector::empty(dimensions),
            sample_size,
        }
    }

    pub fn add_to(&self, other: &mut InterpolationMeasure) {
        self.measure.add_to(&mut other.measure);
        self.distance.add_to(&mut other.distance);
        self.probability_mass.add_to(&mut other.probability_mass);
        other.sample_size += self.sample_size;
    }

    pub fn scale(&mut self, factor: f64) {
        self.measure.scale(factor);
        self.distance.scale(factor);
        self.probability_mass.scale(factor);
    }

    pub fn divide(&mut self, num: usize) {
        self.scale(1.0 / num as f64);
        self.sample_size = (self.sample_size as f64 / num as f64) as f32;
    }

    /// fold one bounding box into the estimate; returns the separation
    /// probability of `point` against the box
    pub fn update<F: StoreFloat>(
        &mut self,
        point: &[F],
        bounding_box: &BoundingBox<F>,
        measure: f64,
    ) -> f64 {
        let min_values = bounding_box.min_values();
        let max_values = bounding_box.max_values();
        let mut minsum = F::zero();
        let mut maxsum = F::zero();
        for i in 0..point.len() {
            let low_gap = min_values[i] - point[i];
            if low_gap > F::zero() {
                minsum = minsum + low_gap;
            }
            let high_gap = point[i] - max_values[i];
            if high_gap > F::zero() {
                maxsum = maxsum + high_gap;
            }
        }
        let sum = (minsum + maxsum).into_f64();
        let new_range = sum + bounding_box.range_sum();
        if new_range == 0.0 {
            return 0.0;
        }
        let probability = sum / new_range;
        if probability > 0.0 {
            self.scale(1.0 - probability);
            for i in 0..point.len() {
                if point[i] > max_values[i] {
                    let t = (point[i] - max_values[i]).into_f64() / new_range;
                    self.distance.high[i] += t * (point[i] - min_values[i]).into_f64();
                    self.probability_mass.high[i] += t;
                    self.measure.high[i] += measure * t;
                } else if point[i] < min_values[i] {
                    let t = (min_values[i] - point[i]).into_f64() / new_range;
                    self.distance.low[i] += t * (max_values[i] - point[i]).into_f64();
                    self.probability_mass.low[i] += t;
                    self.measure.low[i] += measure * t;
                }
            }
        }
        probability
    }

    pub fn directional_measure(&self, threshold: f64, manifold_dimension: f64) -> DiVector {
        if self.sample_size <= 0.0 || self.measure.total() <= 0.0 {
            return DiVector::empty(self.measure.dimensions());
        }
        let mut sum_of_factors = 0.0;
        for i in 0..self.measure.dimensions() {
            let mut t = if self.probability_mass.high_low_sum(i) > 0.0 {
                self.distance.high_low_sum(i) / self.probability_mass.high_low_sum(i)
            } else {
                0.0
            };
            if t > 0.0 {
                t = f64::exp(f64::ln(t) * manifold_dimension) * self.probability_mass.high_low_sum(i);
            }
            sum_of_factors += t;
        }
        let density_factor = 1.0 / (threshold + sum_of_factors);
        let mut answer = self.measure.clone();
        answer.scale(density_factor);
        answer
    }

    pub fn directional_density(&self) -> DiVector {
        self.directional_measure(1e-3, self.measure.dimensions() as f64)
    }

    pub fn density(&self) -> f64 {
        self.directional_density().total()
    }
}

/// Accumulates an [`InterpolationMeasure`] for one tree; the per-side
/// distances back the distance-based scoring strategy and simple density.
pub struct DensityVisitor {
    tree_mass: usize,
    leaf_index: usize,
    score: f64,
    converged: bool,
    hit_duplicate: bool,
    use_shadow_box: bool,
    interpolation: InterpolationMeasure,
}

impl DensityVisitor {
    pub fn new(tree_mass: usize, dimensions: usize) -> Self {
        DensityVisitor {
            tree_mass,
            leaf_index: usize::MAX,
            score: 0.0,
            converged: false,
            hit_duplicate: false,
            use_shadow_box: false,
            interpolation: InterpolationMeasure::empty(dimensions, tree_mass as f32),
        }
    }

    pub fn create<F: StoreFloat>(
        tree_mass: usize,
        parameters: &[usize],
        _visitor_info: &VisitorInfo<F>,
    ) -> Self {
        DensityVisitor::new(tree_mass, parameters[0])
    }
}

impl<F: StoreFloat> Visitor<F, InterpolationMeasure> for DensityVisitor {
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
                let unseen = (visitor_info.score_unseen)(view.depth(), mass);
                self.score = unseen;
                let bounding_box = view.bounding_box();
                check_state(bounding_box.is_some(), "density requires path boxes")?;
                self.interpolation
                    .update(point, &bounding_box.expect("checked"), unseen);
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
            let bounding_box = if !self.use_shadow_box {
                view.bounding_box()
            } else {
                view.shadow_box()
            };
            let new_value = (visitor_info.score_unseen)(view.depth(), view.mass());
            check_state(bounding_box.is_some(), "density requires path boxes")?;
            let probability = self
                .interpolation
                .update(point, &bounding_box.expect("checked"), new_value);
            if probability == 0.0 {
                self.converged = true;
            } else if !self.hit_duplicate {
                self.score = (1.0 - probability) * self.score + probability * new_value;
            }
        }
        Ok(())
    }

    fn result(&self, visitor_info: &VisitorInfo<F>) -> Result<InterpolationMeasure> {
        let normalized = (visitor_info.normalizer)(self.score, self.tree_mass);
        let mut answer = self.interpolation.clone();
        answer.measure.normalize(normalized);
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
