use crate::forest::boundingbox::BoundingBox;
use crate::types::StoreFloat;

/// A per-dimension pair of (high, low) contributions. Attribution of an
/// anomaly score is a DiVector whose total equals the score; the high
/// component captures "value too large" and the low component "too small".
#[derive(Clone, Debug)]
pub struct DiVector {
    pub high: Vec<f64>,
    pub low: Vec<f64>,
}

impl DiVector {
    pub fn empty(dimensions: usize) -> Self {
        DiVector {
            high: vec![0.0; dimensions],
            low: vec![0.0; dimensions],
        }
    }

    pub fn new(high: &[f64], low: &[f64]) -> Self {
        assert!(high.len() == low.len(), "mismatched lengths");
        DiVector {
            high: Vec::from(high),
            low: Vec::from(low),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.high.len()
    }

    pub fn high_low_sum(&self, index: usize) -> f64 {
        self.high[index] + self.low[index]
    }

    pub fn total(&self) -> f64 {
        self.high.iter().sum::<f64>() + self.low.iter().sum::<f64>()
    }

    pub fn scale(&mut self, factor: f64) {
        for x in self.high.iter_mut() {
            *x *= factor;
        }
        for x in self.low.iter_mut() {
            *x *= factor;
        }
    }

    pub fn divide(&mut self, num: usize) {
        self.scale(1.0 / num as f64);
    }

    pub fn add_to(&self, other: &mut DiVector) {
        for (x, &y) in other.high.iter_mut().zip(&self.high) {
            *x += y;
        }
        for (x, &y) in other.low.iter_mut().zip(&self.low) {
            *x += y;
        }
    }

    pub fn add_from(&mut self, other: &DiVector, factor: f64) {
        for (x, &y) in self.high.iter_mut().zip(&other.high) {
            *x += y * factor;
        }
        for (x, &y) in self.low.iter_mut().zip(&other.low) {
            *x += y * factor;
        }
    }

    /// rescale so the total equals `value`; degenerate inputs get a flat split
    pub fn normalize(&mut self, value: f64) {
        let current = self.total();
        if current <= 0.0 {
            let v = value / (2.0 * self.high.len() as f64);
            for x in self.high.iter_mut() {
                *x = v;
            }
            for x in self.low.iter_mut() {
                *x = v;
            }
        } else {
            self.scale(value / current);
        }
    }

    /// index of the shingle block with the largest high+low contribution
    pub fn max_contribution(&self, base_dimension: usize) -> usize {
        let blocks = self.high.len() / base_dimension;
        let mut best = 0;
        let mut best_value = f64::MIN;
        for block in 0..blocks {
            let value: f64 = (0..base_dimension)
                .map(|j| self.high_low_sum(block * base_dimension + j))
                .sum();
            if value > best_value {
                best_value = value;
                best = block;
            }
        }
        best
    }

    /// overwrite this vector with the per-dimension separation probabilities
    /// of `point` against `bounding_box`
    pub fn assign_as_probability_of_cut<F: StoreFloat>(
        &mut self,
        bounding_box: &BoundingBox<F>,
        point: &[F],
    ) {
        let min_values = bounding_box.min_values();
        let max_values = bounding_box.max_values();
        let minsum: f64 = self
            .low
            .iter_mut()
            .zip(min_values)
            .zip(point)
            .map(|((x, &y), &z)| {
                let gap = y.into_f64() - z.into_f64();
                *x = if gap > 0.0 { gap } else { 0.0 };
                *x
            })
            .sum();
        let maxsum: f64 = self
            .high
            .iter_mut()
            .zip(point)
            .zip(max_values)
            .map(|((x, &y), &z)| {
                let gap = y.into_f64() - z.into_f64();
                *x = if gap > 0.0 { gap } else { 0.0 };
                *x
            })
            .sum();
        let sum = minsum + maxsum;
        if sum != 0.0 {
            self.scale(1.0 / (bounding_box.range_sum() + sum));
        }
    }

    pub fn assign_as_probability_of_cut_with_missing<F: StoreFloat>(
        &mut self,
        bounding_box: &BoundingBox<F>,
        point: &[F],
        missing: &[bool],
    ) {
        let min_values = bounding_box.min_values();
        let max_values = bounding_box.max_values();
        let minsum: f64 = self
            .low
            .iter_mut()
            .zip(min_values)
            .zip(point)
            .zip(missing)
            .map(|(((x, &y), &z), &skip)| {
                let gap = y.into_f64() - z.into_f64();
                *x = if !skip && gap > 0.0 { gap } else { 0.0 };
                *x
            })
            .sum();
        let maxsum: f64 = self
            .high
            .iter_mut()
            .zip(point)
            .zip(max_values)
            .zip(missing)
            .map(|(((x, &y), &z), &skip)| {
                let gap = y.into_f64() - z.into_f64();
                *x = if !skip && gap > 0.0 { gap } else { 0.0 };
                *x
            })
            .sum();
        let sum = minsum + maxsum;
        if sum != 0.0 {
            self.scale(1.0 / (bounding_box.range_sum() + sum));
        }
    }
}
