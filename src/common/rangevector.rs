use num::Float;

use crate::types::Result;
use crate::util::check_dimensions;

/// A tracked quantity together with its upper and lower bounds.
#[derive(Clone, Debug)]
pub struct RangeVector<T> {
    pub values: Vec<T>,
    pub upper: Vec<T>,
    pub lower: Vec<T>,
}

impl<T: Float> RangeVector<T> {
    pub fn new(dimensions: usize) -> Self {
        RangeVector {
            values: vec![T::zero(); dimensions],
            upper: vec![T::zero(); dimensions],
            lower: vec![T::zero(); dimensions],
        }
    }

    pub fn from(values: Vec<T>) -> Self {
        RangeVector {
            upper: values.clone(),
            lower: values.clone(),
            values,
        }
    }

    pub fn create(values: &[T], upper: &[T], lower: &[T]) -> Self {
        assert!(
            values.len() == upper.len() && upper.len() == lower.len(),
            "mismatched lengths"
        );
        for i in 0..values.len() {
            assert!(values[i] <= upper[i], "incorrect upper bound");
            assert!(lower[i] <= values[i], "incorrect lower bound");
        }
        RangeVector {
            values: Vec::from(values),
            upper: Vec::from(upper),
            lower: Vec::from(lower),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.values.len()
    }

    pub fn shift(&mut self, i: usize, shift: T) {
        self.values[i] = self.values[i] + shift;
        self.upper[i] = self.upper[i] + shift;
        self.lower[i] = self.lower[i] + shift;
        // managing precision explicitly
        if self.upper[i] < self.values[i] {
            self.upper[i] = self.values[i];
        }
        if self.lower[i] > self.values[i] {
            self.lower[i] = self.values[i];
        }
    }

    pub fn scale(&mut self, i: usize, scale: T) {
        self.values[i] = self.values[i] * scale;
        self.upper[i] = self.upper[i] * scale;
        self.lower[i] = self.lower[i] * scale;
        if self.upper[i] < self.values[i] {
            self.upper[i] = self.values[i];
        }
        if self.lower[i] > self.values[i] {
            self.lower[i] = self.values[i];
        }
    }

    /// integrate a differenced forecast: each horizon block accumulates the
    /// running value per coordinate, starting from `base`
    pub fn cascaded_add(&mut self, base: &[T]) -> Result<()> {
        let input_length = base.len();
        check_dimensions(
            input_length > 0 && self.values.len() % input_length == 0,
            "base length must divide the forecast length",
        )?;
        let horizon = self.values.len() / input_length;
        let mut running = Vec::from(base);
        for i in 0..horizon {
            for j in 0..input_length {
                let pos = i * input_length + j;
                self.values[pos] = self.values[pos] + running[j];
                self.upper[pos] = self.upper[pos] + running[j];
                self.lower[pos] = self.lower[pos] + running[j];
                if self.upper[pos] < self.values[pos] {
                    self.upper[pos] = self.values[pos];
                }
                if self.lower[pos] > self.values[pos] {
                    self.lower[pos] = self.values[pos];
                }
                running[j] = self.values[pos];
            }
        }
        Ok(())
    }
}

/// A range forecast annotated with the projected timestamps of each horizon
/// step; the timestamp bounds are derived from the arrival-gap statistics.
#[derive(Clone, Debug)]
pub struct TimedRangeVector {
    pub range: RangeVector<f32>,
    pub timestamps: Vec<i64>,
    pub upper_timestamps: Vec<i64>,
    pub lower_timestamps: Vec<i64>,
}

impl TimedRangeVector {
    pub fn new(dimensions: usize, horizon: usize) -> Self {
        TimedRangeVector {
            range: RangeVector::new(dimensions * horizon),
            timestamps: vec![0; horizon],
            upper_timestamps: vec![0; horizon],
            lower_timestamps: vec![0; horizon],
        }
    }

    pub fn from_range(range: RangeVector<f32>, timestamps: Vec<i64>) -> Self {
        TimedRangeVector {
            upper_timestamps: timestamps.clone(),
            lower_timestamps: timestamps.clone(),
            timestamps,
            range,
        }
    }
}
