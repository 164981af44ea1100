use crate::common::divector::DiVector;
use crate::common::rangevector::RangeVector;
use crate::detect::types::Calibration;
use crate::types::Result;
use crate::util::{check_argument, check_dimensions, check_state, maxf32, minf32};

// widening applied when too few errors exist for the requested percentile
const DEVIATION_WIDENING_FACTOR: f32 = 1.3;

/// Streaming calibration of forecast ranges from observed errors.
///
/// Ring buffers hold the last `error_horizon + forecast_horizon` forecasts
/// and actuals; for each forecast lead time the handler maintains the mean
/// error, sign-split RMSE, the empirical coverage of the stored intervals,
/// and an interpolated error distribution used to calibrate new forecasts.
pub struct ErrorHandler {
    input_length: usize,
    forecast_horizon: usize,
    error_horizon: usize,
    percentile: f32,
    sequence_index: usize,
    past_forecasts: Vec<RangeVector<f32>>,
    actuals: Vec<Vec<f32>>,
    error_distribution: RangeVector<f32>,
    error_rmse: DiVector,
    error_mean: Vec<f32>,
    interval_precision: Vec<f32>,
    last_deviations: Vec<f32>,
}

/// Captured state of an [`ErrorHandler`].
#[derive(Clone, Debug)]
pub struct ErrorHandlerState {
    pub input_length: usize,
    pub forecast_horizon: usize,
    pub error_horizon: usize,
    pub percentile: f32,
    pub sequence_index: usize,
    pub past_forecast_values: Vec<Vec<f32>>,
    pub past_forecast_upper: Vec<Vec<f32>>,
    pub past_forecast_lower: Vec<Vec<f32>>,
    pub actuals: Vec<Vec<f32>>,
    pub last_deviations: Vec<f32>,
}

impl ErrorHandler {
    pub fn new(
        input_length: usize,
        forecast_horizon: usize,
        error_horizon: usize,
        percentile: f32,
    ) -> Result<Self> {
        check_argument(input_length > 0, "input length cannot be zero")?;
        check_argument(forecast_horizon > 0, "forecast horizon cannot be zero")?;
        check_argument(
            error_horizon >= forecast_horizon,
            "error horizon must cover the forecast horizon",
        )?;
        check_argument(
            percentile > 0.0 && percentile < 0.5,
            "percentile must be in (0, 0.5)",
        )?;
        let length = input_length * forecast_horizon;
        Ok(ErrorHandler {
            input_length,
            forecast_horizon,
            error_horizon,
            percentile,
            sequence_index: 0,
            past_forecasts: Vec::new(),
            actuals: Vec::new(),
            error_distribution: RangeVector::new(length),
            error_rmse: DiVector::empty(length),
            error_mean: vec![0.0; length],
            interval_precision: vec![0.0; length],
            last_deviations: vec![0.0; input_length],
        })
    }

    fn buffer_length(&self) -> usize {
        self.error_horizon + self.forecast_horizon
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn error_mean(&self) -> &[f32] {
        &self.error_mean
    }

    pub fn error_rmse(&self) -> &DiVector {
        &self.error_rmse
    }

    pub fn interval_precision(&self) -> &[f32] {
        &self.interval_precision
    }

    pub fn error_distribution(&self) -> &RangeVector<f32> {
        &self.error_distribution
    }

    /// number of (forecast, actual) pairs available at lead time `index`
    fn pairs_at(sequence_index: usize, error_horizon: usize, index: usize) -> usize {
        if sequence_index > error_horizon + index + 1 {
            error_horizon
        } else if sequence_index < index + 1 {
            0
        } else {
            sequence_index - index - 1
        }
    }

    /// record the actual observed for the previous step and refresh all
    /// derived statistics
    pub fn update_actuals(&mut self, input: &[f64], deviations: &[f64]) -> Result<()> {
        check_dimensions(input.len() == self.input_length, "incorrect input length")?;
        check_dimensions(
            deviations.len() >= self.input_length,
            "incorrect deviation length",
        )?;
        let buffer = self.buffer_length();
        if self.sequence_index > 0 {
            let input_index = (self.sequence_index - 1) % buffer;
            let narrowed: Vec<f32> = input.iter().map(|&x| x as f32).collect();
            if self.actuals.len() <= input_index {
                check_state(self.actuals.len() == input_index, "actuals out of step")?;
                self.actuals.push(narrowed);
            } else {
                self.actuals[input_index] = narrowed;
            }
        }
        self.sequence_index += 1;
        for (x, &y) in self.last_deviations.iter_mut().zip(deviations) {
            *x = y as f32;
        }
        self.recompute_errors()
    }

    /// store the (already calibrated) forecast issued at this step
    pub fn update_forecasts(&mut self, range: &RangeVector<f32>) -> Result<()> {
        check_dimensions(
            range.values.len() == self.input_length * self.forecast_horizon,
            "incorrect forecast length",
        )?;
        check_state(self.sequence_index > 0, "forecast before any actuals")?;
        let buffer = self.buffer_length();
        let stored_index = (self.sequence_index - 1) % buffer;
        if self.past_forecasts.len() <= stored_index {
            check_state(
                self.past_forecasts.len() == stored_index,
                "forecasts out of step",
            )?;
            self.past_forecasts.push(range.clone());
        } else {
            self.past_forecasts[stored_index] = range.clone();
        }
        Ok(())
    }

    fn recompute_errors(&mut self) -> Result<()> {
        let buffer = self.buffer_length();
        if self.sequence_index < 2 || self.past_forecasts.is_empty() {
            return Ok(());
        }
        let input_index = (self.sequence_index + buffer - 2) % buffer;
        let mut errors = vec![0.0f32; self.error_horizon];

        for i in 0..self.forecast_horizon {
            let len = Self::pairs_at(self.sequence_index, self.error_horizon, i);
            let len = usize::min(len, usize::min(self.past_forecasts.len(), self.actuals.len()));
            for j in 0..self.input_length {
                let pos = i * self.input_length + j;
                if len == 0 {
                    self.error_mean[pos] = 0.0;
                    self.error_rmse.high[pos] = 0.0;
                    self.error_rmse.low[pos] = 0.0;
                    self.error_distribution.values[pos] = 0.0;
                    self.error_distribution.upper[pos] = 0.0;
                    self.error_distribution.lower[pos] = 0.0;
                    self.interval_precision[pos] = 0.0;
                    continue;
                }
                let mut positive_sum = 0.0f64;
                let mut positive_sq_sum = 0.0f64;
                let mut positive_count = 0usize;
                let mut negative_sum = 0.0f64;
                let mut negative_sq_sum = 0.0f64;
                let mut within_count = 0usize;
                for k in 0..len {
                    // the forecast made i+k+1 steps before the actual
                    let past_index = (input_index + buffer - i - k) % buffer;
                    let actual_index = (input_index + buffer - k) % buffer;
                    let actual = self.actuals[actual_index][j];
                    let forecast = &self.past_forecasts[past_index];
                    let error = (actual - forecast.values[pos]) as f64;
                    errors[k] = error as f32;
                    if forecast.upper[pos] >= actual && actual >= forecast.lower[pos] {
                        within_count += 1;
                    }
                    if error >= 0.0 {
                        positive_sum += error;
                        positive_sq_sum += error * error;
                        positive_count += 1;
                    } else {
                        negative_sum += error;
                        negative_sq_sum += error * error;
                    }
                }
                self.error_mean[pos] = ((positive_sum + negative_sum) / len as f64) as f32;
                self.error_rmse.high[pos] = if positive_count == 0 {
                    0.0
                } else {
                    f64::sqrt(positive_sq_sum / positive_count as f64)
                };
                self.error_rmse.low[pos] = if positive_count == len {
                    0.0
                } else {
                    -f64::sqrt(negative_sq_sum / (len - positive_count) as f64)
                };
                self.interval_precision[pos] = within_count as f32 / len as f32;

                let slice = &mut errors[0..len];
                slice.sort_by(|a, b| a.partial_cmp(b).expect("finite errors"));
                self.error_distribution.values[pos] = Self::interpolated_median(slice);
                self.error_distribution.upper[pos] =
                    Self::interpolated_upper_rank(slice, len as f32 * self.percentile);
                self.error_distribution.lower[pos] =
                    Self::interpolated_lower_rank(slice, len as f32 * self.percentile);
            }
        }
        Ok(())
    }

    /// apply the calibration policy to a fresh forecast, in place
    pub fn calibrate(&self, calibration: Calibration, ranges: &mut RangeVector<f32>) -> Result<()> {
        check_dimensions(
            ranges.values.len() == self.input_length * self.forecast_horizon,
            "incorrect forecast length",
        )?;
        if calibration == Calibration::None {
            return Ok(());
        }
        for i in 0..self.forecast_horizon {
            let len = Self::pairs_at(self.sequence_index, self.error_horizon, i);
            for j in 0..self.input_length {
                let pos = i * self.input_length + j;
                if len == 0 {
                    continue;
                }
                if (len as f32) * self.percentile < 1.0 {
                    // not enough errors for the requested rank: the
                    // interpolated bounds are infinite, widen by deviation
                    let deviation = self.last_deviations[j];
                    ranges.upper[pos] = maxf32(
                        ranges.upper[pos],
                        ranges.values[pos] + DEVIATION_WIDENING_FACTOR * deviation,
                    );
                    ranges.lower[pos] = minf32(
                        ranges.lower[pos],
                        ranges.values[pos] - DEVIATION_WIDENING_FACTOR * deviation,
                    );
                } else {
                    match calibration {
                        Calibration::Simple => {
                            Self::adjust(pos, ranges, &self.error_distribution);
                        }
                        Calibration::Minimal => {
                            Self::adjust_minimal(pos, ranges, &self.error_distribution);
                        }
                        Calibration::None => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn interpolated_median(ascending: &[f32]) -> f32 {
        let len = ascending.len();
        let lower = if len % 2 == 0 {
            ascending[len / 2 - 1]
        } else {
            (ascending[len / 2] + ascending[len / 2 - 1]) / 2.0
        };
        let upper = if len % 2 == 0 {
            ascending[len / 2]
        } else {
            (ascending[len / 2] + ascending[len / 2 - 1]) / 2.0
        };
        if lower <= 0.0 && 0.0 <= upper {
            0.0
        } else {
            (upper + lower) / 2.0
        }
    }

    // for fractional rank r = p * n the value interpolates between the
    // neighboring order statistics; a rank below one is unbounded

    fn interpolated_lower_rank(ascending: &[f32], fractional_rank: f32) -> f32 {
        if fractional_rank < 1.0 {
            return f32::NEG_INFINITY;
        }
        let rank = fractional_rank.floor() as usize;
        if rank >= ascending.len() {
            return ascending[ascending.len() - 1];
        }
        ascending[rank - 1]
            + (fractional_rank - rank as f32) * (ascending[rank] - ascending[rank - 1])
    }

    fn interpolated_upper_rank(ascending: &[f32], fractional_rank: f32) -> f32 {
        if fractional_rank < 1.0 {
            return f32::INFINITY;
        }
        let len = ascending.len();
        let rank = fractional_rank.floor() as usize;
        if rank >= len {
            return ascending[0];
        }
        ascending[len - rank]
            + (fractional_rank - rank as f32) * (ascending[len - rank - 1] - ascending[len - rank])
    }

    fn adjust(pos: usize, ranges: &mut RangeVector<f32>, errors: &RangeVector<f32>) {
        ranges.values[pos] += errors.values[pos];
        ranges.upper[pos] = maxf32(ranges.values[pos], ranges.upper[pos] + errors.upper[pos]);
        ranges.lower[pos] = minf32(ranges.values[pos], ranges.lower[pos] + errors.lower[pos]);
    }

    fn adjust_minimal(pos: usize, ranges: &mut RangeVector<f32>, errors: &RangeVector<f32>) {
        let old_value = ranges.values[pos];
        ranges.values[pos] += errors.values[pos];
        ranges.upper[pos] = maxf32(ranges.values[pos], old_value + errors.upper[pos]);
        ranges.lower[pos] = minf32(ranges.values[pos], old_value + errors.lower[pos]);
    }

    pub fn to_state(&self) -> ErrorHandlerState {
        ErrorHandlerState {
            input_length: self.input_length,
            forecast_horizon: self.forecast_horizon,
            error_horizon: self.error_horizon,
            percentile: self.percentile,
            sequence_index: self.sequence_index,
            past_forecast_values: self.past_forecasts.iter().map(|r| r.values.clone()).collect(),
            past_forecast_upper: self.past_forecasts.iter().map(|r| r.upper.clone()).collect(),
            past_forecast_lower: self.past_forecasts.iter().map(|r| r.lower.clone()).collect(),
            actuals: self.actuals.clone(),
            last_deviations: self.last_deviations.clone(),
        }
    }

    pub fn from_state(state: &ErrorHandlerState) -> Result<Self> {
        let mut handler = ErrorHandler::new(
            state.input_length,
            state.forecast_horizon,
            state.error_horizon,
            state.percentile,
        )?;
        check_state(
            state.past_forecast_values.len() == state.past_forecast_upper.len()
                && state.past_forecast_values.len() == state.past_forecast_lower.len(),
            "mismatched forecast buffers",
        )?;
        handler.sequence_index = state.sequence_index;
        handler.past_forecasts = state
            .past_forecast_values
            .iter()
            .zip(&state.past_forecast_upper)
            .zip(&state.past_forecast_lower)
            .map(|((values, upper), lower)| RangeVector {
                values: values.clone(),
                upper: upper.clone(),
                lower: lower.clone(),
            })
            .collect();
        handler.actuals = state.actuals.clone();
        handler.last_deviations = state.last_deviations.clone();
        handler.recompute_errors()?;
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_forecast(value: f32, lower: f32, upper: f32) -> RangeVector<f32> {
        let mut range = RangeVector::from(vec![value]);
        range.lower[0] = lower;
        range.upper[0] = upper;
        range
    }

    // coverage equals the empirical fraction of actuals inside the stored
    // intervals, over the configured error horizon
    #[test]
    fn interval_precision_matches_empirical_coverage() {
        let mut handler = ErrorHandler::new(1, 1, 4, 0.25).unwrap();
        let actuals = [0.5f64, 2.0, 0.5, 2.0, 0.5, 2.0, 0.5, 2.0];
        for &actual in &actuals {
            handler.update_actuals(&[actual], &[0.1]).unwrap();
            handler
                .update_forecasts(&constant_forecast(0.0, -1.0, 1.0))
                .unwrap();
        }
        // the last four recorded actuals alternate; half are inside [-1, 1]
        assert!((handler.interval_precision()[0] - 0.5).abs() < 1e-6);
        // errors are 0.5 and 2.0; the split RMSE is entirely positive
        assert!(handler.error_rmse().high[0] > 0.0);
        assert_eq!(handler.error_rmse().low[0], 0.0);
        assert!((handler.error_mean()[0] - 1.25).abs() < 1e-6);
    }

    #[test]
    fn sparse_errors_widen_by_deviation() {
        let mut handler = ErrorHandler::new(1, 1, 8, 0.1).unwrap();
        handler.update_actuals(&[1.0], &[2.0]).unwrap();
        handler
            .update_forecasts(&constant_forecast(1.0, 0.9, 1.1))
            .unwrap();
        handler.update_actuals(&[1.0], &[2.0]).unwrap();
        // two observations and percentile 0.1: fractional rank below one,
        // so calibration falls back to deviation widening
        let mut range = constant_forecast(1.0, 0.9, 1.1);
        handler.calibrate(Calibration::Simple, &mut range).unwrap();
        assert!(range.upper[0] >= 1.0 + 1.3 * 2.0);
        assert!(range.lower[0] <= 1.0 - 1.3 * 2.0);
    }

    #[test]
    fn state_round_trip_reproduces_statistics() {
        let mut handler = ErrorHandler::new(1, 1, 4, 0.25).unwrap();
        for i in 0..6 {
            handler.update_actuals(&[i as f64 * 0.3], &[0.5]).unwrap();
            handler
                .update_forecasts(&constant_forecast(0.2, -0.5, 0.9))
                .unwrap();
        }
        let restored = ErrorHandler::from_state(&handler.to_state()).unwrap();
        assert_eq!(restored.interval_precision(), handler.interval_precision());
        assert_eq!(restored.error_mean(), handler.error_mean());
        assert_eq!(
            restored.error_distribution().values,
            handler.error_distribution().values
        );
    }
}
