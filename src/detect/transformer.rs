use crate::common::deviation::{Deviation, DeviationState};
use crate::common::rangevector::RangeVector;
use crate::detect::types::TransformMethod;
use crate::types::Result;
use crate::util::{check_argument, check_dimensions};

// deviation lanes per input dimension: value, difference, smoothed scale,
// smoothed drift, smoothed difference deviation
pub(crate) const DEVIATION_STATES: usize = 5;

/// Applies the configured transform per input dimension and maintains the
/// streaming statistics needed to invert it, including for forecast ranges.
#[derive(Clone)]
pub struct WeightedTransformer {
    transform_method: TransformMethod,
    input_length: usize,
    weights: Vec<f64>,
    deviations: Vec<Deviation>,
}

#[derive(Clone, Debug)]
pub struct TransformerState {
    pub transform_method_centered: bool,
    pub input_length: usize,
    pub weights: Vec<f64>,
    pub deviations: Vec<DeviationState>,
}

impl WeightedTransformer {
    pub fn new(
        transform_method: TransformMethod,
        input_length: usize,
        transform_decay: f64,
        weights: &[f64],
    ) -> Result<Self> {
        check_argument(input_length == weights.len(), "incorrect weight length")?;
        check_argument(
            (0.0..=1.0).contains(&transform_decay),
            "transform decay must be in [0,1]",
        )?;
        if transform_method == TransformMethod::None {
            for w in weights {
                check_argument(*w == 1.0, "NONE transform requires unit weights")?;
            }
        }
        for w in weights {
            check_argument(*w >= 0.0, "weights cannot be negative")?;
        }
        let mut deviations = Vec::with_capacity(DEVIATION_STATES * input_length);
        for _ in 0..2 * input_length {
            deviations.push(Deviation::new(transform_decay)?);
        }
        for _ in 0..(DEVIATION_STATES - 2) * input_length {
            deviations.push(Deviation::new(0.1 * transform_decay)?);
        }
        Ok(WeightedTransformer {
            transform_method,
            input_length,
            weights: Vec::from(weights),
            deviations,
        })
    }

    pub fn method(&self) -> TransformMethod {
        self.transform_method
    }

    pub fn update(&mut self, input: &[f64], previous: &[f64]) -> Result<()> {
        check_dimensions(input.len() == self.input_length, "incorrect input length")?;
        check_dimensions(previous.len() == self.input_length, "incorrect input length")?;
        for i in 0..self.input_length {
            self.deviations[i].update(input[i]);
            let deviation = self.deviations[i].deviation();
            self.deviations[i + self.input_length].update(input[i] - previous[i]);
            let difference_mean = self.deviations[i + self.input_length].mean();
            let difference_deviation = self.deviations[i + self.input_length].deviation();
            self.deviations[i + 2 * self.input_length].update(deviation);
            self.deviations[i + 3 * self.input_length].update(difference_mean);
            self.deviations[i + 4 * self.input_length].update(difference_deviation);
        }
        Ok(())
    }

    fn normalized_scale(&self, i: usize) -> f64 {
        self.deviations[i + 2 * self.input_length].mean() + 1.0
    }

    fn basic_shift(&self, i: usize) -> f64 {
        self.deviations[i].mean()
    }

    fn basic_drift(&self, i: usize) -> f64 {
        self.deviations[i + 3 * self.input_length].mean()
    }

    pub fn transform(&self, input: &[f64], previous: &[f64]) -> Vec<f64> {
        let mut answer = Vec::from(input);
        match self.transform_method {
            TransformMethod::None => {}
            TransformMethod::Weighted => {
                for (x, w) in answer.iter_mut().zip(&self.weights) {
                    *x *= w;
                }
            }
            TransformMethod::Difference => {
                for (x, y) in answer.iter_mut().zip(previous) {
                    *x -= y;
                }
            }
            TransformMethod::SubtractMa => {
                for (i, x) in answer.iter_mut().enumerate() {
                    *x -= self.basic_shift(i);
                }
            }
            TransformMethod::Normalize => {
                for (i, x) in answer.iter_mut().enumerate() {
                    *x = (*x - self.basic_shift(i)) / self.normalized_scale(i);
                }
            }
            TransformMethod::NormalizeDifference => {
                for (i, x) in answer.iter_mut().enumerate() {
                    *x = (*x - previous[i]) / self.normalized_scale(i);
                }
            }
        }
        answer
    }

    /// invert a single transformed frame against the previous input frame
    pub fn invert(&self, values: &[f64], previous: &[f64]) -> Vec<f64> {
        let mut answer = Vec::from(values);
        match self.transform_method {
            TransformMethod::None => {}
            TransformMethod::Weighted => {
                for (x, w) in answer.iter_mut().zip(&self.weights) {
                    *x = if *w == 0.0 { 0.0 } else { *x / w };
                }
            }
            TransformMethod::Difference => {
                for (x, y) in answer.iter_mut().zip(previous) {
                    *x += y;
                }
            }
            TransformMethod::SubtractMa => {
                for (i, x) in answer.iter_mut().enumerate() {
                    *x += self.basic_shift(i);
                }
            }
            TransformMethod::Normalize => {
                for (i, x) in answer.iter_mut().enumerate() {
                    *x = *x * self.normalized_scale(i) + self.basic_shift(i);
                }
            }
            TransformMethod::NormalizeDifference => {
                for (i, x) in answer.iter_mut().enumerate() {
                    *x = *x * self.normalized_scale(i) + previous[i];
                }
            }
        }
        answer
    }

    /// map a forecast in transformed space back to input units
    pub fn invert_forecast(
        &self,
        forecast: &mut RangeVector<f32>,
        previous: &[f64],
    ) -> Result<()> {
        check_dimensions(
            forecast.values.len() % self.input_length == 0,
            "forecast length must be a multiple of the input length",
        )?;
        let horizon = forecast.values.len() / self.input_length;
        for i in 0..horizon {
            for j in 0..self.input_length {
                let pos = i * self.input_length + j;
                if self.transform_method != TransformMethod::None {
                    let factor = if self.weights[j] == 0.0 {
                        0.0
                    } else {
                        1.0 / self.weights[j]
                    };
                    forecast.scale(pos, factor as f32);
                }
                if self.transform_method.requires_normalization() {
                    forecast.scale(pos, self.normalized_scale(j) as f32);
                }
                forecast.shift(pos, (i as f64 * self.basic_drift(j)) as f32);
                if self.transform_method == TransformMethod::Normalize
                    || self.transform_method == TransformMethod::SubtractMa
                {
                    forecast.shift(pos, self.basic_shift(j) as f32);
                }
            }
        }
        if self.transform_method.is_differencing() {
            let previous_f32: Vec<f32> = previous.iter().map(|&x| x as f32).collect();
            forecast.cascaded_add(&previous_f32)?;
        }
        Ok(())
    }

    /// effective per-dimension scale of the transformed space
    pub fn scale(&self) -> Vec<f64> {
        let mut answer = self.weights.clone();
        if self.transform_method.requires_normalization() {
            for (i, x) in answer.iter_mut().enumerate() {
                *x *= self.normalized_scale(i);
            }
        }
        answer
    }

    /// effective per-dimension shift of the transformed space
    pub fn shift(&self) -> Vec<f64> {
        let mut answer = vec![0.0; self.input_length];
        if self.transform_method == TransformMethod::Normalize
            || self.transform_method == TransformMethod::SubtractMa
        {
            for (i, x) in answer.iter_mut().enumerate() {
                *x = self.basic_shift(i);
            }
        }
        answer
    }

    /// smoothed per-dimension deviation of successive differences
    pub fn difference_deviations(&self) -> Vec<f64> {
        (0..self.input_length)
            .map(|i| self.deviations[i + 4 * self.input_length].mean())
            .collect()
    }

    pub fn to_state(&self) -> TransformerState {
        TransformerState {
            transform_method_centered: self.transform_method.is_centered(),
            input_length: self.input_length,
            weights: self.weights.clone(),
            deviations: self.deviations.iter().map(|d| d.to_state()).collect(),
        }
    }

    pub fn restore_deviations(&mut self, state: &TransformerState) -> Result<()> {
        check_dimensions(
            state.deviations.len() == self.deviations.len(),
            "mismatched deviation states",
        )?;
        for (deviation, saved) in self.deviations.iter_mut().zip(&state.deviations) {
            *deviation = Deviation::from_state(saved)?;
        }
        Ok(())
    }
}
