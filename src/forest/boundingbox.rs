use crate::types::StoreFloat;

/// Componentwise envelope of a set of points; `range_sum` is kept current so
/// cut probabilities avoid a second pass.
#[derive(Clone)]
pub struct BoundingBox<F> {
    range_sum: f64,
    min_values: Vec<F>,
    max_values: Vec<F>,
}

impl<F: StoreFloat> BoundingBox<F> {
    pub fn new(first: &[F], second: &[F]) -> Self {
        let min_values: Vec<F> = first
            .iter()
            .zip(second)
            .map(|(&x, &y)| if x < y { x } else { y })
            .collect();
        let max_values: Vec<F> = first
            .iter()
            .zip(second)
            .map(|(&x, &y)| if x > y { x } else { y })
            .collect();
        let range_sum = min_values
            .iter()
            .zip(&max_values)
            .map(|(&x, &y)| (y - x).into_f64())
            .sum();
        BoundingBox {
            range_sum,
            min_values,
            max_values,
        }
    }

    pub fn from_point(point: &[F]) -> Self {
        BoundingBox {
            range_sum: 0.0,
            min_values: Vec::from(point),
            max_values: Vec::from(point),
        }
    }

    pub fn range_sum(&self) -> f64 {
        self.range_sum
    }

    pub fn min_values(&self) -> &[F] {
        &self.min_values
    }

    pub fn max_values(&self) -> &[F] {
        &self.max_values
    }

    /// grow to contain `point`; returns true when the box was unchanged
    pub fn check_contains_and_add_point(&mut self, point: &[F]) -> bool {
        self.add_arrays(point, point)
    }

    pub fn add_box(&mut self, other: &BoundingBox<F>) {
        self.add_arrays(&other.min_values, &other.max_values);
    }

    fn add_arrays(&mut self, min_values: &[F], max_values: &[F]) -> bool {
        let old_sum = self.range_sum;
        for (x, &y) in self.min_values.iter_mut().zip(min_values) {
            if y < *x {
                *x = y;
            }
        }
        for (x, &y) in self.max_values.iter_mut().zip(max_values) {
            if y > *x {
                *x = y;
            }
        }
        self.range_sum = self
            .min_values
            .iter()
            .zip(&self.max_values)
            .map(|(&x, &y)| (y - x).into_f64())
            .sum();
        old_sum == self.range_sum
    }

    /// probability that a random cut of the merged box separates `point`
    pub fn probability_of_cut(&self, point: &[F]) -> f64 {
        let mut minsum = F::zero();
        let mut maxsum = F::zero();
        for i in 0..point.len() {
            let low_gap = self.min_values[i] - point[i];
            if low_gap > F::zero() {
                minsum = minsum + low_gap;
            }
            let high_gap = point[i] - self.max_values[i];
            if high_gap > F::zero() {
                maxsum = maxsum + high_gap;
            }
        }
        let sum = (minsum + maxsum).into_f64();
        if sum == 0.0 {
            return 0.0;
        } else if self.range_sum == 0.0 {
            return 1.0;
        }
        sum / (self.range_sum + sum)
    }

    pub fn probability_of_cut_with_missing(&self, point: &[F], missing: &[bool]) -> f64 {
        let mut minsum = F::zero();
        let mut maxsum = F::zero();
        for i in 0..point.len() {
            if missing[i] {
                continue;
            }
            let low_gap = self.min_values[i] - point[i];
            if low_gap > F::zero() {
                minsum = minsum + low_gap;
            }
            let high_gap = point[i] - self.max_values[i];
            if high_gap > F::zero() {
                maxsum = maxsum + high_gap;
            }
        }
        let sum = (minsum + maxsum).into_f64();
        if sum == 0.0 {
            return 0.0;
        } else if self.range_sum == 0.0 {
            return 1.0;
        }
        sum / (self.range_sum + sum)
    }

    pub fn contains(&self, point: &[F]) -> bool {
        self.min_values
            .iter()
            .zip(point)
            .zip(&self.max_values)
            .all(|((&low, &value), &high)| low <= value && value <= high)
    }
}
