use crate::common::deviation::{Deviation, DeviationState};
use crate::common::rangevector::{RangeVector, TimedRangeVector};
use crate::detect::descriptor::AnomalyDescriptor;
use crate::detect::transformer::{TransformerState, WeightedTransformer};
use crate::detect::types::{ForestMode, ImputationMethod, TransformMethod};
use crate::ensemble::Forest;
use crate::types::Result;
use crate::util::{check_argument, check_dimensions};

const DEFAULT_START_NORMALIZATION: usize = 10;
const DEFAULT_STOP_NORMALIZATION: usize = usize::MAX;
const DEFAULT_USE_IMPUTED_FRACTION: f64 = 0.5;
// a long outage is treated as a restart rather than filled frame by frame
const MAX_IMPUTED_PER_OBSERVATION_FACTOR: usize = 3;

// timestamp deviation lanes: value, gap, smoothed value deviation,
// smoothed gap mean, smoothed gap deviation
const TIMESTAMP_DEVIATIONS: usize = 5;

/// Shingles, transforms and normalizes the input stream, imputes missing
/// values and missing frames, and inverts forecasts back into input units.
pub struct Preprocessor {
    forest_mode: ForestMode,
    transform_method: TransformMethod,
    imputation_method: ImputationMethod,
    input_dimensions: usize,
    shingle_size: usize,
    start_normalization: usize,
    stop_normalization: usize,
    weight_time: f64,
    transformer: WeightedTransformer,
    timestamp_deviations: Vec<Deviation>,
    data_quality: Deviation,
    previous_timestamps: Vec<i64>,
    initial_values: Vec<Vec<f64>>,
    initial_timestamps: Vec<i64>,
    last_shingled_input: Vec<f64>,
    last_shingled_point: Vec<f64>,
    values_seen: usize,
    internal_timestamp: usize,
    default_fill: Vec<f64>,
    use_imputed_fraction: f64,
    imputed_ring: Vec<bool>,
    number_of_imputed: usize,
}

/// Captured state of a [`Preprocessor`].
#[derive(Clone, Debug)]
pub struct PreprocessorState {
    pub transformer: TransformerState,
    pub timestamp_deviations: Vec<DeviationState>,
    pub data_quality: DeviationState,
    pub previous_timestamps: Vec<i64>,
    pub initial_values: Vec<Vec<f64>>,
    pub initial_timestamps: Vec<i64>,
    pub last_shingled_input: Vec<f64>,
    pub last_shingled_point: Vec<f64>,
    pub values_seen: usize,
    pub internal_timestamp: usize,
    pub imputed_ring: Vec<bool>,
    pub number_of_imputed: usize,
}

impl Preprocessor {
    pub fn input_dimensions(&self) -> usize {
        self.input_dimensions
    }

    pub fn shingle_size(&self) -> usize {
        self.shingle_size
    }

    /// one transformed frame, including the time column when augmented
    pub fn block_size(&self) -> usize {
        if self.forest_mode == ForestMode::TimeAugmented {
            self.input_dimensions + 1
        } else {
            self.input_dimensions
        }
    }

    pub fn dimensions(&self) -> usize {
        self.block_size() * self.shingle_size
    }

    pub fn forest_mode(&self) -> ForestMode {
        self.forest_mode
    }

    pub fn transform_method(&self) -> TransformMethod {
        self.transform_method
    }

    pub fn values_seen(&self) -> usize {
        self.values_seen
    }

    pub fn internal_timestamp(&self) -> usize {
        self.internal_timestamp
    }

    pub fn is_ready(&self) -> bool {
        self.internal_timestamp >= self.shingle_size
    }

    pub fn start_normalization(&self) -> usize {
        self.start_normalization
    }

    pub fn data_quality(&self) -> f64 {
        self.data_quality.mean()
    }

    fn past_initial(&self) -> bool {
        !self.transform_method.requires_normalization()
            || self.values_seen >= self.start_normalization
    }

    fn last_timestamp(&self) -> i64 {
        self.previous_timestamps[self.shingle_size - 1]
    }

    fn last_input_frame(&self) -> &[f64] {
        let dimension = self.last_shingled_input.len();
        &self.last_shingled_input[(dimension - self.input_dimensions)..dimension]
    }

    fn shift_vector<T: Copy>(shingle: &mut [T], point: &[T]) {
        let dimension = shingle.len();
        for i in 0..(dimension - point.len()) {
            shingle[i] = shingle[i + point.len()];
        }
        for (i, &value) in point.iter().enumerate() {
            shingle[dimension - point.len() + i] = value;
        }
    }

    fn timescale(&self) -> f64 {
        self.timestamp_deviations[4].mean() + 1.0
    }

    fn timedrift(&self) -> f64 {
        self.timestamp_deviations[3].mean()
    }

    fn mean_gap(&self) -> f64 {
        self.timestamp_deviations[1].mean()
    }

    fn update_timestamp_statistics(&mut self, timestamp: i64, previous: i64) {
        self.timestamp_deviations[0].update(timestamp as f64);
        self.timestamp_deviations[1].update((timestamp - previous) as f64);
        let deviation = self.timestamp_deviations[0].deviation();
        self.timestamp_deviations[2].update(deviation);
        let gap_mean = self.timestamp_deviations[1].mean();
        let gap_deviation = self.timestamp_deviations[1].deviation();
        self.timestamp_deviations[3].update(gap_mean);
        self.timestamp_deviations[4].update(gap_deviation);
    }

    /// per-dimension scale of the transformed space, time column included
    pub fn scale(&self) -> Vec<f64> {
        let mut answer = self.transformer.scale();
        if self.forest_mode == ForestMode::TimeAugmented {
            let factor = if self.weight_time == 0.0 {
                0.0
            } else {
                1.0 / self.weight_time
            };
            answer.push(factor * self.timescale());
        }
        answer
    }

    pub fn shift(&self) -> Vec<f64> {
        let mut answer = self.transformer.shift();
        if self.forest_mode == ForestMode::TimeAugmented {
            answer.push(self.last_timestamp() as f64 + self.timedrift());
        }
        answer
    }

    pub fn difference_deviations(&self) -> Vec<f64> {
        let mut answer = self.transformer.difference_deviations();
        if self.forest_mode == ForestMode::TimeAugmented {
            answer.push(self.weight_time * self.timestamp_deviations[1].deviation());
        }
        answer
    }

    /// fill the missing coordinates of one input per the imputation policy
    pub fn impute_input(
        &self,
        input: &[f64],
        missing: Option<&[usize]>,
        forest: &dyn Forest,
    ) -> Result<Vec<f64>> {
        check_dimensions(
            input.len() == self.input_dimensions,
            "incorrect input length",
        )?;
        let mut patched = Vec::from(input);
        let missing = match missing {
            Some(values) if !values.is_empty() => values,
            _ => return Ok(patched),
        };
        for &i in missing {
            check_dimensions(i < self.input_dimensions, "missing index out of range")?;
        }
        match self.imputation_method {
            ImputationMethod::Zero => {
                for &i in missing {
                    patched[i] = 0.0;
                }
            }
            ImputationMethod::FixedValues => {
                for &i in missing {
                    patched[i] = self.default_fill[i];
                }
            }
            ImputationMethod::Rcf => {
                if forest.is_output_ready() && self.is_ready() {
                    let transformed =
                        self.transform(&patched, self.last_timestamp() + 1);
                    let positions: Vec<usize> = missing.to_vec();
                    let imputed = forest.impute_missing(&positions, &transformed)?;
                    let dimensions = forest.dimensions();
                    let block = dimensions / self.shingle_size;
                    let inverted = self.transformer.invert(
                        &imputed[(dimensions - block)..(dimensions - block + self.input_dimensions)],
                        self.last_input_frame(),
                    );
                    for &i in missing {
                        patched[i] = inverted[i];
                    }
                } else {
                    let previous = self.last_input_frame();
                    for &i in missing {
                        patched[i] = previous[i];
                    }
                }
            }
            // previous, next and linear all collapse to the last known value
            // when only the current tuple is in hand
            _ => {
                let previous = self.last_input_frame();
                for &i in missing {
                    patched[i] = previous[i];
                }
            }
        }
        Ok(patched)
    }

    fn imputed_fraction(&self) -> f64 {
        self.number_of_imputed as f64 / self.shingle_size as f64
    }

    fn record_commit(&mut self, imputed: bool) {
        let slot = self.internal_timestamp % self.shingle_size;
        if self.imputed_ring[slot] {
            self.number_of_imputed -= 1;
        }
        self.imputed_ring[slot] = imputed;
        if imputed {
            self.number_of_imputed += 1;
        }
        self.data_quality.update(if imputed { 0.0 } else { 1.0 });
    }

    /// commit one (possibly imputed) observation: statistics, shingles and
    /// the forest update, gated by the imputed fraction
    fn commit(
        &mut self,
        input: &[f64],
        timestamp: i64,
        imputed: bool,
        forest: &mut dyn Forest,
    ) -> Result<Option<Vec<f64>>> {
        let transformed = self.transform(input, timestamp);
        if self.values_seen < self.stop_normalization {
            let previous: Vec<f64> = self.last_input_frame().to_vec();
            self.transformer.update(input, &previous)?;
            self.update_timestamp_statistics(timestamp, self.last_timestamp());
        }
        Self::shift_vector(&mut self.last_shingled_input, input);
        Self::shift_vector(&mut self.last_shingled_point, &transformed);
        Self::shift_vector(&mut self.previous_timestamps, &[timestamp]);
        self.record_commit(imputed);
        self.internal_timestamp += 1;
        if !imputed {
            self.values_seen += 1;
        }
        if self.forest_mode != ForestMode::StreamingImpute
            || self.imputed_fraction() < self.use_imputed_fraction
        {
            forest.update(&transformed, self.internal_timestamp as u64)?;
            Ok(Some(transformed))
        } else {
            Ok(None)
        }
    }

    fn impute_frame(&self, fraction: f64, next: &[f64], forest: &dyn Forest) -> Result<Vec<f64>> {
        let previous = self.last_input_frame();
        let mut frame = vec![0.0; self.input_dimensions];
        match self.imputation_method {
            ImputationMethod::Zero => {}
            ImputationMethod::FixedValues => frame.copy_from_slice(&self.default_fill),
            ImputationMethod::Previous => frame.copy_from_slice(previous),
            ImputationMethod::Next => frame.copy_from_slice(next),
            ImputationMethod::Linear => {
                for i in 0..self.input_dimensions {
                    frame[i] = previous[i] + fraction * (next[i] - previous[i]);
                }
            }
            ImputationMethod::Rcf => {
                if forest.is_output_ready() && self.is_ready() {
                    let forecast = forest.extrapolate(1, 1.0)?;
                    let inverted = {
                        let mut range = forecast;
                        self.transformer
                            .invert_forecast(&mut range, previous)?;
                        range
                    };
                    for i in 0..self.input_dimensions {
                        frame[i] = inverted.values[i] as f64;
                    }
                } else {
                    frame.copy_from_slice(previous);
                }
            }
        }
        Ok(frame)
    }

    /// fill frames for the gap between the last observation and `timestamp`
    pub fn fill_gaps(
        &mut self,
        input: &[f64],
        timestamp: i64,
        forest: &mut dyn Forest,
    ) -> Result<()> {
        if self.forest_mode != ForestMode::StreamingImpute
            || self.values_seen == 0
            || !self.past_initial()
        {
            return Ok(());
        }
        let gap_mean = self.mean_gap();
        if gap_mean <= 0.0 {
            return Ok(());
        }
        let gap = (timestamp - self.last_timestamp()) as f64;
        let mut count = (gap / gap_mean).round() as i64 - 1;
        let cap = (MAX_IMPUTED_PER_OBSERVATION_FACTOR * self.shingle_size) as i64;
        if count > cap {
            count = cap;
        }
        let base_timestamp = self.last_timestamp();
        for k in 0..count {
            let fraction = (k + 1) as f64 / (count + 1) as f64;
            let frame = self.impute_frame(fraction, input, forest)?;
            let frame_timestamp = base_timestamp + ((k + 1) as f64 * gap_mean) as i64;
            self.commit(&frame, frame_timestamp, true, forest)?;
        }
        Ok(())
    }

    /// one transformed frame for the given input; does not commit
    pub fn transform(&self, input: &[f64], timestamp: i64) -> Vec<f64> {
        let mut answer = self
            .transformer
            .transform(input, self.last_input_frame());
        if self.forest_mode == ForestMode::TimeAugmented {
            let previous = if self.values_seen > 0 {
                self.last_timestamp()
            } else {
                timestamp
            };
            answer.push((timestamp - previous) as f64 * self.weight_time / self.timescale());
        }
        answer
    }

    /// The scaled shingle for scoring, or None while normalization is still
    /// warming up. Drains the retained warm-up block into the forest on the
    /// first ready call.
    pub fn scaled_shingled_input(
        &mut self,
        input: &[f64],
        timestamp: i64,
        forest: &mut dyn Forest,
    ) -> Result<Option<Vec<f64>>> {
        check_dimensions(
            input.len() == self.input_dimensions,
            "incorrect input length",
        )?;
        for x in input {
            check_argument(x.is_finite(), "input values must be finite")?;
        }
        if !self.past_initial() {
            return Ok(None);
        }
        if !self.initial_values.is_empty() {
            self.drain(forest)?;
        }
        let transformed = self.transform(input, timestamp);
        let mut shingle = self.last_shingled_point.clone();
        Self::shift_vector(&mut shingle, &transformed);
        Ok(Some(shingle))
    }

    // replay the retained warm-up block: statistics first so the transform
    // is meaningful, then the transformed values into the forest
    fn drain(&mut self, forest: &mut dyn Forest) -> Result<()> {
        let values = std::mem::take(&mut self.initial_values);
        let timestamps = std::mem::take(&mut self.initial_timestamps);
        if values.is_empty() {
            return Ok(());
        }
        let mut previous = values[0].clone();
        let mut previous_timestamp = timestamps[0];
        for (value, &timestamp) in values.iter().zip(&timestamps) {
            self.transformer.update(value, &previous)?;
            self.update_timestamp_statistics(timestamp, previous_timestamp);
            previous = value.clone();
            previous_timestamp = timestamp;
        }
        self.previous_timestamps[self.shingle_size - 1] = timestamps[0];
        let dimension = self.last_shingled_input.len();
        for i in 0..self.input_dimensions {
            self.last_shingled_input[dimension - self.input_dimensions + i] = values[0][i];
        }
        for (value, &timestamp) in values.iter().zip(&timestamps) {
            let transformed = self.transform(value, timestamp);
            Self::shift_vector(&mut self.last_shingled_input, value);
            Self::shift_vector(&mut self.last_shingled_point, &transformed);
            Self::shift_vector(&mut self.previous_timestamps, &[timestamp]);
            self.record_commit(false);
            self.internal_timestamp += 1;
            forest.update(&transformed, self.internal_timestamp as u64)?;
        }
        Ok(())
    }

    /// commit the observation after detection ran (or during warm-up)
    pub fn update_state(
        &mut self,
        input: &[f64],
        shingle: Option<&[f64]>,
        timestamp: i64,
        forest: &mut dyn Forest,
    ) -> Result<()> {
        if shingle.is_some() {
            self.commit(input, timestamp, false, forest)?;
        } else {
            self.initial_values.push(Vec::from(input));
            self.initial_timestamps.push(timestamp);
            self.values_seen += 1;
        }
        Ok(())
    }

    /// map the expected point of a flagged descriptor back to input units
    pub fn invert_expectations(&self, descriptor: &mut AnomalyDescriptor) {
        let expected = match &descriptor.expected_rcf_point {
            Some(point) => point,
            None => return,
        };
        let block_size = self.block_size();
        let block = (self.shingle_size as i32 - 1 + descriptor.relative_index) as usize;
        let start = block * block_size;
        let input_start = block * self.input_dimensions;
        let past_values = if descriptor.relative_index == 0 {
            descriptor.current_values.clone()
        } else {
            self.last_shingled_input[input_start..input_start + self.input_dimensions].to_vec()
        };
        let previous_frame = if block > 0 {
            &self.last_shingled_input
                [(input_start - self.input_dimensions)..input_start]
        } else {
            &self.last_shingled_input[input_start..input_start + self.input_dimensions]
        };
        let expected_values = self.transformer.invert(
            &expected[start..start + self.input_dimensions],
            previous_frame,
        );
        descriptor.past_values = Some(past_values);
        descriptor.expected_values_list = vec![expected_values];
        descriptor.likelihood_of_values = vec![1.0];
    }

    /// map a forecast in transformed space to input units with projected
    /// timestamps
    pub fn invert_forecast_range(&self, range: RangeVector<f32>) -> Result<TimedRangeVector> {
        let gap = if self.mean_gap() > 0.0 {
            self.mean_gap()
        } else {
            1.0
        };
        let last_timestamp = self.last_timestamp();
        if self.forest_mode != ForestMode::TimeAugmented {
            let mut range = range;
            self.transformer
                .invert_forecast(&mut range, self.last_input_frame())?;
            let horizon = range.values.len() / self.input_dimensions;
            let timestamps: Vec<i64> = (0..horizon)
                .map(|i| last_timestamp + ((i + 1) as f64 * gap) as i64)
                .collect();
            return Ok(TimedRangeVector::from_range(range, timestamps));
        }
        let block_size = self.block_size();
        check_dimensions(
            range.values.len() % block_size == 0,
            "forecast length must be a multiple of the augmented frame",
        )?;
        let horizon = range.values.len() / block_size;
        let dimension = self.input_dimensions;
        let mut sub_range: RangeVector<f32> = RangeVector::new(horizon * dimension);
        let mut timestamps = vec![0i64; horizon];
        let mut upper_timestamps = vec![0i64; horizon];
        let mut lower_timestamps = vec![0i64; horizon];
        let mut running = last_timestamp as f64;
        let mut running_upper = last_timestamp as f64;
        let mut running_lower = last_timestamp as f64;
        for i in 0..horizon {
            for j in 0..dimension {
                sub_range.values[i * dimension + j] = range.values[i * block_size + j];
                sub_range.upper[i * dimension + j] = range.upper[i * block_size + j];
                sub_range.lower[i * dimension + j] = range.lower[i * block_size + j];
            }
            let time_position = i * block_size + dimension;
            running += self.invert_time(range.values[time_position]);
            running_upper += self.invert_time(range.upper[time_position]);
            running_lower += self.invert_time(range.lower[time_position]);
            timestamps[i] = running as i64;
            upper_timestamps[i] = running_upper.max(running) as i64;
            lower_timestamps[i] = running_lower.min(running) as i64;
        }
        self.transformer
            .invert_forecast(&mut sub_range, self.last_input_frame())?;
        Ok(TimedRangeVector {
            range: sub_range,
            timestamps,
            upper_timestamps,
            lower_timestamps,
        })
    }

    fn invert_time(&self, value: f32) -> f64 {
        let factor = if self.weight_time == 0.0 {
            0.0
        } else {
            1.0 / self.weight_time
        };
        (value as f64) * factor * self.timescale()
    }

    pub fn to_state(&self) -> PreprocessorState {
        PreprocessorState {
            transformer: self.transformer.to_state(),
            timestamp_deviations: self
                .timestamp_deviations
                .iter()
                .map(|d| d.to_state())
                .collect(),
            data_quality: self.data_quality.to_state(),
            previous_timestamps: self.previous_timestamps.clone(),
            initial_values: self.initial_values.clone(),
            initial_timestamps: self.initial_timestamps.clone(),
            last_shingled_input: self.last_shingled_input.clone(),
            last_shingled_point: self.last_shingled_point.clone(),
            values_seen: self.values_seen,
            internal_timestamp: self.internal_timestamp,
            imputed_ring: self.imputed_ring.clone(),
            number_of_imputed: self.number_of_imputed,
        }
    }

    pub fn restore(&mut self, state: &PreprocessorState) -> Result<()> {
        self.transformer.restore_deviations(&state.transformer)?;
        check_dimensions(
            state.timestamp_deviations.len() == self.timestamp_deviations.len(),
            "mismatched timestamp deviations",
        )?;
        for (deviation, saved) in self
            .timestamp_deviations
            .iter_mut()
            .zip(&state.timestamp_deviations)
        {
            *deviation = Deviation::from_state(saved)?;
        }
        self.data_quality = Deviation::from_state(&state.data_quality)?;
        self.previous_timestamps = state.previous_timestamps.clone();
        self.initial_values = state.initial_values.clone();
        self.initial_timestamps = state.initial_timestamps.clone();
        self.last_shingled_input = state.last_shingled_input.clone();
        self.last_shingled_point = state.last_shingled_point.clone();
        self.values_seen = state.values_seen;
        self.internal_timestamp = state.internal_timestamp;
        self.imputed_ring = state.imputed_ring.clone();
        self.number_of_imputed = state.number_of_imputed;
        Ok(())
    }
}

pub struct PreprocessorBuilder {
    input_dimensions: usize,
    shingle_size: usize,
    forest_mode: ForestMode,
    transform_method: TransformMethod,
    imputation_method: ImputationMethod,
    transform_decay: Option<f64>,
    weights: Option<Vec<f64>>,
    weight_time: f64,
    start_normalization: usize,
    stop_normalization: usize,
    default_fill: Option<Vec<f64>>,
    use_imputed_fraction: f64,
}

impl PreprocessorBuilder {
    pub fn new(input_dimensions: usize, shingle_size: usize) -> Self {
        PreprocessorBuilder {
            input_dimensions,
            shingle_size,
            forest_mode: ForestMode::Standard,
            transform_method: TransformMethod::Normalize,
            imputation_method: ImputationMethod::Rcf,
            transform_decay: None,
            weights: None,
            weight_time: 1.0,
            start_normalization: DEFAULT_START_NORMALIZATION,
            stop_normalization: DEFAULT_STOP_NORMALIZATION,
            default_fill: None,
            use_imputed_fraction: DEFAULT_USE_IMPUTED_FRACTION,
        }
    }

    pub fn forest_mode(&mut self, forest_mode: ForestMode) -> &mut Self {
        self.forest_mode = forest_mode;
        self
    }

    pub fn transform_method(&mut self, transform_method: TransformMethod) -> &mut Self {
        self.transform_method = transform_method;
        self
    }

    pub fn imputation_method(&mut self, imputation_method: ImputationMethod) -> &mut Self {
        self.imputation_method = imputation_method;
        self
    }

    pub fn transform_decay(&mut self, transform_decay: f64) -> &mut Self {
        self.transform_decay = Some(transform_decay);
        self
    }

    pub fn weights(&mut self, weights: &[f64]) -> &mut Self {
        self.weights = Some(Vec::from(weights));
        self
    }

    pub fn weight_time(&mut self, weight_time: f64) -> &mut Self {
        self.weight_time = weight_time;
        self
    }

    pub fn start_normalization(&mut self, start_normalization: usize) -> &mut Self {
        self.start_normalization = start_normalization;
        self
    }

    pub fn stop_normalization(&mut self, stop_normalization: usize) -> &mut Self {
        self.stop_normalization = stop_normalization;
        self
    }

    pub fn default_fill(&mut self, default_fill: &[f64]) -> &mut Self {
        self.default_fill = Some(Vec::from(default_fill));
        self
    }

    pub fn use_imputed_fraction(&mut self, use_imputed_fraction: f64) -> &mut Self {
        self.use_imputed_fraction = use_imputed_fraction;
        self
    }

    pub fn build(&self) -> Result<Preprocessor> {
        check_argument(self.input_dimensions > 0, "input dimensions cannot be zero")?;
        check_argument(self.shingle_size > 0, "shingle size cannot be zero")?;
        check_argument(
            self.forest_mode != ForestMode::StreamingImpute || self.shingle_size > 1,
            "streaming imputation requires shingle size above one",
        )?;
        check_argument(
            self.start_normalization <= self.stop_normalization,
            "cannot stop normalization before starting",
        )?;
        check_argument(
            self.start_normalization < 2000,
            "start of normalization is too large",
        )?;
        check_argument(
            self.start_normalization > 0
                || !self.transform_method.requires_normalization(),
            "normalizing transforms need warm-up observations",
        )?;
        let transform_decay = self.transform_decay.unwrap_or(0.001);
        let weights = match &self.weights {
            Some(values) => values.clone(),
            None => vec![1.0; self.input_dimensions],
        };
        check_argument(
            weights.len() == self.input_dimensions,
            "incorrect weight length",
        )?;
        let default_fill = match &self.default_fill {
            Some(values) => {
                check_argument(
                    values.len() == self.input_dimensions,
                    "incorrect fill length",
                )?;
                values.clone()
            }
            None => vec![0.0; self.input_dimensions],
        };
        let mut timestamp_deviations = Vec::with_capacity(TIMESTAMP_DEVIATIONS);
        timestamp_deviations.push(Deviation::new(transform_decay)?);
        timestamp_deviations.push(Deviation::new(transform_decay)?);
        for _ in 0..(TIMESTAMP_DEVIATIONS - 2) {
            timestamp_deviations.push(Deviation::new(0.1 * transform_decay)?);
        }
        let block = if self.forest_mode == ForestMode::TimeAugmented {
            self.input_dimensions + 1
        } else {
            self.input_dimensions
        };
        Ok(Preprocessor {
            forest_mode: self.forest_mode,
            transform_method: self.transform_method,
            imputation_method: self.imputation_method,
            input_dimensions: self.input_dimensions,
            shingle_size: self.shingle_size,
            start_normalization: self.start_normalization,
            stop_normalization: self.stop_normalization,
            weight_time: self.weight_time,
            transformer: WeightedTransformer::new(
                self.transform_method,
                self.input_dimensions,
                transform_decay,
                &weights,
            )?,
            timestamp_deviations,
            data_quality: Deviation::new(0.1 * transform_decay)?,
            previous_timestamps: vec![0; self.shingle_size],
            initial_values: Vec::new(),
            initial_timestamps: Vec::new(),
            last_shingled_input: vec![0.0; self.input_dimensions * self.shingle_size],
            last_shingled_point: vec![0.0; block * self.shingle_size],
            values_seen: 0,
            internal_timestamp: 0,
            default_fill,
            use_imputed_fraction: self.use_imputed_fraction,
            imputed_ring: vec![false; self.shingle_size],
            number_of_imputed: 0,
        })
    }
}
