use crate::common::deviation::{Deviation, DeviationState};
use crate::common::divector::DiVector;
use crate::detect::descriptor::AnomalyDescriptor;
use crate::detect::thresholder::{BasicThresholder, ThresholderState};
use crate::detect::types::{CorrectionMode, ScoringStrategy};
use crate::ensemble::Forest;
use crate::types::Result;
use crate::util::{check_argument, maxf64};

const DEFAULT_MAX_ATTRIBUTORS: usize = 5;
const DEFAULT_TRIGGER_FACTOR: f64 = 3.5;
const DEFAULT_IGNORE_SIMILAR_FACTOR: f64 = 0.3;
const DEFAULT_TRIGGER_THRESHOLD_FACTOR: f64 = 1.2;
const DEFAULT_SAMPLING_SUPPORT: f64 = 0.1;
const DEFAULT_NOISE_FACTOR: f64 = 1.0;
const DEFAULT_RUN_ALLOWED: usize = 2;
// regime tracking must follow a drifting level, not the lifetime average
const DEFAULT_DEVIATION_DISCOUNT: f64 = 0.02;
const SHIFT_NOISE_FACTOR: f64 = 0.01;
const PAST_CORRECTION_DECAY: f64 = 0.5;
const NEAR_NEIGHBOR_PERCENTILE: usize = 50;
const PRECISION_EPSILON: f64 = 1e-10;

/// Converts raw scores into calibrated anomaly grades.
///
/// A high score alone is not an anomaly: the corrector first explains away
/// what it can. Candidate explanations are the lingering effect of a recent
/// anomaly still inside the shingle, transform noise around zero, values
/// close to the forecasted expectation, values typical among conditional
/// samples, and sustained drift into a new regime. Whatever survives is
/// graded and attributed.
pub struct PredictorCorrector {
    primary_thresholder: BasicThresholder,
    secondary_thresholder: Option<BasicThresholder>,
    scoring_strategy: ScoringStrategy,
    shingle_size: usize,
    block_size: usize,
    deviations_actual: Vec<Deviation>,
    deviations_expected: Vec<Deviation>,
    ignore_near_expected_from_above: Vec<f64>,
    ignore_near_expected_from_below: Vec<f64>,
    ignore_near_expected_from_above_by_ratio: Vec<f64>,
    ignore_near_expected_from_below_by_ratio: Vec<f64>,
    sampling_support: f64,
    noise_factor: f64,
    max_attributors: usize,
    trigger_factor: f64,
    number_of_expected_values: usize,
    ignore_drift: bool,
    run_length: usize,
    time_augmented: bool,
}

/// Captured state of a [`PredictorCorrector`].
#[derive(Clone, Debug)]
pub struct PredictorCorrectorState {
    pub primary_thresholder: ThresholderState,
    pub secondary_thresholder: Option<ThresholderState>,
    pub deviations_actual: Vec<DeviationState>,
    pub deviations_expected: Vec<DeviationState>,
    pub run_length: usize,
}

impl PredictorCorrector {
    pub fn new(
        discount: f64,
        scoring_strategy: ScoringStrategy,
        shingle_size: usize,
        block_size: usize,
        time_augmented: bool,
    ) -> Result<Self> {
        check_argument(shingle_size > 0, "shingle size cannot be zero")?;
        check_argument(block_size > 0, "block size cannot be zero")?;
        let secondary_thresholder = if scoring_strategy != ScoringStrategy::ExpectedInverseDepth {
            let mut thresholder = BasicThresholder::new(discount)?;
            // distance scores have no natural unit; only the adaptive part
            // of the threshold family applies
            thresholder.set_absolute_threshold(0.0);
            thresholder.set_lower_threshold(0.0);
            thresholder.set_initial_threshold(0.0);
            Some(thresholder)
        } else {
            None
        };
        let mut deviations_actual = Vec::with_capacity(block_size);
        let mut deviations_expected = Vec::with_capacity(block_size);
        for _ in 0..block_size {
            deviations_actual.push(Deviation::new(DEFAULT_DEVIATION_DISCOUNT)?);
            deviations_expected.push(Deviation::new(DEFAULT_DEVIATION_DISCOUNT)?);
        }
        Ok(PredictorCorrector {
            primary_thresholder: BasicThresholder::new(discount)?,
            secondary_thresholder,
            scoring_strategy,
            shingle_size,
            block_size,
            deviations_actual,
            deviations_expected,
            ignore_near_expected_from_above: vec![0.0; block_size],
            ignore_near_expected_from_below: vec![0.0; block_size],
            ignore_near_expected_from_above_by_ratio: vec![0.0; block_size],
            ignore_near_expected_from_below_by_ratio: vec![0.0; block_size],
            sampling_support: DEFAULT_SAMPLING_SUPPORT,
            noise_factor: DEFAULT_NOISE_FACTOR,
            max_attributors: DEFAULT_MAX_ATTRIBUTORS,
            trigger_factor: DEFAULT_TRIGGER_FACTOR,
            number_of_expected_values: 1,
            ignore_drift: false,
            run_length: 0,
            time_augmented,
        })
    }

    pub fn set_z_factor(&mut self, factor: f64) {
        self.primary_thresholder.set_z_factor(factor);
        if let Some(secondary) = &mut self.secondary_thresholder {
            secondary.set_z_factor(factor);
        }
        if factor > self.trigger_factor {
            self.trigger_factor = factor;
        }
    }

    pub fn set_lower_threshold(&mut self, lower: f64) {
        self.primary_thresholder.set_lower_threshold(lower);
    }

    pub fn set_initial_threshold(&mut self, initial: f64) {
        self.primary_thresholder.set_initial_threshold(initial);
    }

    pub fn set_score_differencing(&mut self, value: f64) {
        self.primary_thresholder.set_score_differencing(value);
    }

    pub fn set_ignore_drift(&mut self, ignore_drift: bool) {
        self.ignore_drift = ignore_drift;
    }

    pub fn set_sampling_support(&mut self, support: f64) {
        self.sampling_support = support;
    }

    pub fn set_noise_factor(&mut self, factor: f64) {
        self.noise_factor = factor;
    }

    pub fn set_number_of_expected_values(&mut self, number: usize) -> Result<()> {
        check_argument(number >= 1, "need at least one expected value")?;
        self.number_of_expected_values = number;
        Ok(())
    }

    pub fn set_ignore_near_expected(
        &mut self,
        from_above: &[f64],
        from_below: &[f64],
        from_above_by_ratio: &[f64],
        from_below_by_ratio: &[f64],
    ) -> Result<()> {
        check_argument(
            from_above.len() == self.block_size
                && from_below.len() == self.block_size
                && from_above_by_ratio.len() == self.block_size
                && from_below_by_ratio.len() == self.block_size,
            "suppression arrays must match the block size",
        )?;
        self.ignore_near_expected_from_above.copy_from_slice(from_above);
        self.ignore_near_expected_from_below.copy_from_slice(from_below);
        self.ignore_near_expected_from_above_by_ratio
            .copy_from_slice(from_above_by_ratio);
        self.ignore_near_expected_from_below_by_ratio
            .copy_from_slice(from_below_by_ratio);
        Ok(())
    }

    pub fn run_length(&self) -> usize {
        self.run_length
    }

    /// substitute the still-visible past of the shingle with the expectation
    /// reconstructed at the last anomaly, plus a decaying shift correction
    fn apply_past_corrector(
        &self,
        point: &[f64],
        gap: usize,
        last: &AnomalyDescriptor,
    ) -> Vec<f64> {
        let block = self.block_size;
        let mut corrected = Vec::from(point);
        let last_expected = last.expected_rcf_point.as_ref().expect("checked by caller");
        let last_point = last.rcf_point.as_ref().expect("checked by caller");
        if gap < self.shingle_size {
            for i in gap * block..point.len() {
                corrected[i - gap * block] = last_expected[i];
            }
        }
        if last.relative_index == 0 {
            let decay = PAST_CORRECTION_DECAY.powi(gap as i32);
            if last.transform_method.is_differencing() {
                for j in 0..block {
                    let position = point.len() - gap * block + j;
                    corrected[position] += decay
                        * (last_point[point.len() - block + j]
                            - last_expected[point.len() - block + j]);
                }
            } else if self.time_augmented {
                // the time gap column is always differenced
                let position = point.len() - (gap - 1) * block - 1;
                corrected[position] += decay
                    * (last_point[point.len() - 1] - last_expected[point.len() - 1]);
            }
        }
        corrected
    }

    /// impute out the top contributing coordinates of the flagged block
    fn expected_point(
        &self,
        attribution: &DiVector,
        position: usize,
        point: &[f64],
        forest: &dyn Forest,
    ) -> Result<Option<Vec<f64>>> {
        let block = self.block_size;
        let mut likely_missing: Vec<usize> = Vec::new();
        if block == 1 {
            likely_missing.push(position);
        } else {
            let mut values: Vec<f64> = (0..block)
                .map(|i| attribution.high_low_sum(position + i))
                .collect();
            let sum: f64 = values.iter().sum();
            values.sort_by(|a, b| b.partial_cmp(a).expect("finite attribution"));
            let mut pick = 0;
            while pick < block && values[pick] >= sum * 0.5 / self.max_attributors as f64 {
                pick += 1;
            }
            if pick != 0 && pick <= self.max_attributors {
                let cutoff = values[pick - 1];
                for i in 0..block {
                    if attribution.high_low_sum(position + i) >= cutoff
                        && likely_missing.len() < self.max_attributors
                    {
                        likely_missing.push(position + i);
                    }
                }
            }
        }
        if likely_missing.is_empty() || 2 * likely_missing.len() >= forest.dimensions() {
            return Ok(None);
        }
        Ok(Some(forest.impute_missing(&likely_missing, point)?))
    }

    // the transformed-space noise floor per block coordinate
    fn noise_floor(&self, result: &AnomalyDescriptor, j: usize) -> f64 {
        let scale = result
            .scale
            .as_ref()
            .and_then(|s| s.get(j).copied())
            .unwrap_or(1.0);
        let sigma = result
            .difference_deviations
            .as_ref()
            .and_then(|s| s.get(j).copied())
            .unwrap_or(0.0);
        if scale > 0.0 {
            self.noise_factor * sigma / scale
        } else {
            0.0
        }
    }

    fn uncertainty_gap(&self, result: &AnomalyDescriptor, j: usize, expected_value: f64) -> (f64, f64) {
        let path_deviation = self.deviations_actual[j].deviation();
        let shift = result
            .shift
            .as_ref()
            .and_then(|s| s.get(j).copied())
            .unwrap_or(0.0);
        let scale = result
            .scale
            .as_ref()
            .and_then(|s| s.get(j).copied())
            .unwrap_or(1.0);
        let shift_noise = if scale > 0.0 {
            SHIFT_NOISE_FACTOR * (shift / scale).abs()
        } else {
            0.0
        };
        let gap = maxf64(path_deviation, self.noise_floor(result, j)) + shift_noise;
        let above = gap
            + maxf64(
                self.ignore_near_expected_from_above[j],
                self.ignore_near_expected_from_above_by_ratio[j] * expected_value.abs(),
            );
        let below = gap
            + maxf64(
                self.ignore_near_expected_from_below[j],
                self.ignore_near_expected_from_below_by_ratio[j] * expected_value.abs(),
            );
        (above, below)
    }

    fn within_uncertainty_box(
        &self,
        result: &AnomalyDescriptor,
        expected: &[f64],
        candidate: &[f64],
        position: usize,
    ) -> bool {
        for j in 0..self.block_size {
            let pos = position + j;
            let (above, below) = self.uncertainty_gap(result, j, expected[pos]);
            if candidate[pos] > expected[pos] + above || candidate[pos] < expected[pos] - below {
                return false;
            }
        }
        true
    }

    fn secondary_grade(&self, secondary: f64, previous: bool) -> f64 {
        match &self.secondary_thresholder {
            Some(thresholder) => thresholder.anomaly_grade(secondary, previous),
            None => 0.0,
        }
    }

    fn update_thresholders(&mut self, score: f64, corrected_score: f64, secondary: f64, in_anomaly: bool) {
        self.primary_thresholder
            .update(score, corrected_score, in_anomaly);
        if let Some(thresholder) = &mut self.secondary_thresholder {
            thresholder.update(secondary, secondary, in_anomaly);
        }
    }

    fn update_deviations(&mut self, point: &[f64], expected: Option<&[f64]>) {
        let start = point.len() - self.block_size;
        for j in 0..self.block_size {
            self.deviations_actual[j].update(point[start + j]);
            let expected_value = expected.map(|e| e[start + j]).unwrap_or(point[start + j]);
            self.deviations_expected[j].update(expected_value);
        }
    }

    // a run that settled into a new but consistent level, bounded by twice
    // the running deviation
    fn is_consistent_regime(&self, point: &[f64]) -> bool {
        let start = point.len() - self.block_size;
        for j in 0..self.block_size {
            let deviation = self.deviations_actual[j].deviation();
            let bound = 2.0 * maxf64(deviation, PRECISION_EPSILON.sqrt());
            if (point[start + j] - self.deviations_actual[j].mean()).abs() > bound {
                return false;
            }
        }
        true
    }

    /// The detection sequence. Mutates `result` with score, grade,
    /// attribution, expectation and correction mode; mutates the internal
    /// thresholds and deviations exactly once per call.
    pub fn detect(
        &mut self,
        result: &mut AnomalyDescriptor,
        last_anomaly: &AnomalyDescriptor,
        forest: &dyn Forest,
    ) -> Result<()> {
        let point = match &result.rcf_point {
            Some(point) => point.clone(),
            None => return Ok(()),
        };
        result.scoring_strategy = self.scoring_strategy;
        let score = forest.score(&point)?;
        result.rcf_score = score;
        if score == 0.0 {
            return Ok(());
        }
        let secondary = if self.secondary_thresholder.is_some() {
            forest.simple_density(&point)?.total()
        } else {
            0.0
        };
        result.secondary_score = secondary;

        let previous = self.primary_thresholder.in_potential_anomaly();
        let (threshold, primary_grade) = self
            .primary_thresholder
            .threshold_and_grade(score, previous);
        result.threshold = threshold;
        let secondary_grade = self.secondary_grade(secondary, previous);
        let grade = match self.scoring_strategy {
            ScoringStrategy::ExpectedInverseDepth => primary_grade,
            ScoringStrategy::Distance => secondary_grade,
            ScoringStrategy::MultiMode => f64::min(primary_grade, secondary_grade),
            ScoringStrategy::MultiModeRecall => f64::max(primary_grade, secondary_grade),
        };
        result.in_high_score_region = primary_grade > 0.0 || secondary_grade > 0.0;
        // the run counts consecutive observations in the anomalous region,
        // whether or not they surface as alerts
        if result.in_high_score_region {
            self.run_length += 1;
        } else {
            self.run_length = 0;
        }

        if grade == 0.0 {
            if result.in_high_score_region
                && (self.scoring_strategy == ScoringStrategy::MultiMode)
            {
                result.correction_mode = CorrectionMode::MultiMode;
            }
            self.update_thresholders(score, score, secondary, false);
            self.update_deviations(&point, None);
            return Ok(());
        }

        // a recent anomaly may still be visible through the shingle
        let gap = (result.internal_timestamp - last_anomaly.internal_timestamp) as usize;
        let recent = last_anomaly.expected_rcf_point.is_some()
            && last_anomaly.rcf_point.is_some()
            && gap > 0
            && gap <= self.shingle_size;
        let corrected_point = if recent {
            self.apply_past_corrector(&point, gap, last_anomaly)
        } else {
            point.clone()
        };

        // centered transforms read flat shingles as silence, not anomalies
        if result.transform_method.is_centered() {
            let noise = corrected_point.iter().enumerate().all(|(i, &value)| {
                let floor = maxf64(PRECISION_EPSILON, self.noise_floor(result, i % self.block_size));
                value.abs() <= floor
            });
            if noise {
                result.correction_mode = CorrectionMode::Noise;
                self.update_thresholders(score, score, secondary, false);
                self.update_deviations(&point, None);
                return Ok(());
            }
        }

        let corrected_score = if recent {
            forest.score(&corrected_point)?
        } else {
            score
        };
        if recent
            && self
                .primary_thresholder
                .anomaly_grade(corrected_score, true)
                == 0.0
        {
            // fixing the past makes this point unremarkable
            result.correction_mode = CorrectionMode::AnomalyInShingle;
            result.expected_rcf_point = Some(corrected_point);
            self.update_thresholders(score, corrected_score, secondary, true);
            self.update_deviations(&point, None);
            return Ok(());
        }

        let attribution = forest.attribution(&corrected_point)?;
        let index = attribution.max_contribution(self.block_size);
        let position = index * self.block_size;
        let relative_index = index as i32 - self.shingle_size as i32 + 1;
        let expected = self.expected_point(&attribution, position, &corrected_point, forest)?;

        // a repeat alarm must differ materially from the previous one
        if recent && last_anomaly.attribution.is_some() {
            if let Some(expected_point) = &expected {
                let ideal = forest.attribution(expected_point)?;
                let dimensions = attribution.dimensions();
                let difference = gap * self.block_size;
                if difference < dimensions {
                    let mut differential = 0.0;
                    for i in (dimensions - difference)..dimensions {
                        differential += (attribution.high[i] - ideal.high[i]).abs();
                        differential += (attribution.low[i] - ideal.low[i]).abs();
                    }
                    let significant = differential
                        > DEFAULT_IGNORE_SIMILAR_FACTOR * last_anomaly.rcf_score
                        && differential * dimensions as f64 / difference as f64
                            > DEFAULT_TRIGGER_THRESHOLD_FACTOR * threshold;
                    if !significant {
                        result.correction_mode = CorrectionMode::AnomalyInShingle;
                        self.update_thresholders(score, corrected_score, secondary, true);
                        self.update_deviations(&point, expected.as_deref());
                        return Ok(());
                    }
                }
            }
        }

        // close enough to the forecast is not an anomaly
        if let Some(expected_point) = &expected {
            if self.within_uncertainty_box(result, expected_point, &corrected_point, position) {
                result.correction_mode = CorrectionMode::Forecast;
                result.expected_rcf_point = Some(expected_point.clone());
                self.update_thresholders(score, corrected_score, secondary, true);
                self.update_deviations(&point, expected.as_deref());
                return Ok(());
            }

            // enough conditional support around the observed value makes the
            // point unsurprising even though it differs from the forecast
            if self.sampling_support > 0.0 {
                let neighbors =
                    forest.near_neighbor_list(&corrected_point, NEAR_NEIGHBOR_PERCENTILE)?;
                if !neighbors.is_empty() {
                    let within = neighbors
                        .iter()
                        .filter(|(_score, neighbor, _distance)| {
                            let candidate: Vec<f64> =
                                neighbor.iter().map(|&x| x as f64).collect();
                            self.within_uncertainty_box(
                                result,
                                &corrected_point,
                                &candidate,
                                position,
                            )
                        })
                        .count();
                    if within as f64 / neighbors.len() as f64 > self.sampling_support {
                        result.correction_mode = CorrectionMode::ConditionalForecast;
                        result.expected_rcf_point = Some(expected_point.clone());
                        self.update_thresholders(score, corrected_score, secondary, true);
                        self.update_deviations(&point, expected.as_deref());
                        return Ok(());
                    }
                }
            }
        }

        // values that stay consistent with the recent level are drift, not
        // isolated anomalies; long runs are always suppressed, and with the
        // flag set even the first alert of a run is held back
        if self.is_consistent_regime(&corrected_point) {
            let suppress = if self.run_length > DEFAULT_RUN_ALLOWED {
                Some(CorrectionMode::DataDrift)
            } else if self.ignore_drift {
                Some(CorrectionMode::AlertOnce)
            } else {
                None
            };
            if let Some(mode) = suppress {
                result.correction_mode = mode;
                self.update_thresholders(score, corrected_score, secondary, true);
                self.update_deviations(&point, expected.as_deref());
                return Ok(());
            }
        }

        result.anomaly_grade = grade;
        result.start_of_anomaly = !previous;
        result.relative_index = relative_index;
        let mut normalized = attribution;
        normalized.normalize(score);
        result.attribution = Some(normalized);
        if let Some(expected_point) = expected {
            if self.number_of_expected_values > 1 {
                if let Ok(summary) = forest.conditional_field(
                    &[position],
                    &corrected_point,
                    1.0,
                    false,
                    self.number_of_expected_values,
                ) {
                    let total: f64 = summary.relative_weight.iter().map(|&w| w as f64).sum();
                    for (candidate, weight) in summary
                        .summary_points
                        .iter()
                        .zip(&summary.relative_weight)
                        .take(self.number_of_expected_values)
                    {
                        let point_f64: Vec<f64> =
                            candidate.iter().map(|&x| x as f64).collect();
                        let likelihood = if total > 0.0 {
                            *weight as f64 / total
                        } else {
                            0.0
                        };
                        result.expected_point_candidates.push((point_f64, likelihood));
                    }
                }
            }
            result.expected_rcf_point = Some(expected_point);
        }
        self.update_thresholders(score, corrected_score, secondary, true);
        self.update_deviations(&point, result.expected_rcf_point.as_deref());
        Ok(())
    }

    pub fn to_state(&self) -> PredictorCorrectorState {
        PredictorCorrectorState {
            primary_thresholder: self.primary_thresholder.to_state(),
            secondary_thresholder: self.secondary_thresholder.as_ref().map(|t| t.to_state()),
            deviations_actual: self.deviations_actual.iter().map(|d| d.to_state()).collect(),
            deviations_expected: self
                .deviations_expected
                .iter()
                .map(|d| d.to_state())
                .collect(),
            run_length: self.run_length,
        }
    }

    pub fn restore(&mut self, state: &PredictorCorrectorState) -> Result<()> {
        self.primary_thresholder = BasicThresholder::from_state(&state.primary_thresholder)?;
        self.secondary_thresholder = match &state.secondary_thresholder {
            Some(saved) => Some(BasicThresholder::from_state(saved)?),
            None => None,
        };
        check_argument(
            state.deviations_actual.len() == self.block_size
                && state.deviations_expected.len() == self.block_size,
            "mismatched deviation states",
        )?;
        for (deviation, saved) in self.deviations_actual.iter_mut().zip(&state.deviations_actual) {
            *deviation = Deviation::from_state(saved)?;
        }
        for (deviation, saved) in self
            .deviations_expected
            .iter_mut()
            .zip(&state.deviations_expected)
        {
            *deviation = Deviation::from_state(saved)?;
        }
        self.run_length = state.run_length;
        Ok(())
    }
}
