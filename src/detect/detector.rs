use rand::Rng;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

use crate::common::rangevector::TimedRangeVector;
use crate::detect::descriptor::AnomalyDescriptor;
use crate::detect::predictorcorrector::{PredictorCorrector, PredictorCorrectorState};
use crate::detect::preprocessor::{Preprocessor, PreprocessorBuilder, PreprocessorState};
use crate::detect::types::{ForestMode, ImputationMethod, ScoringStrategy, TransformMethod};
use crate::ensemble::{forest_from_state, Forest, ForestBuilder, ForestState, Precision};
use crate::types::Result;
use crate::util::check_argument;

/// The streaming anomaly detector: preprocessor, forest and
/// predictor-corrector wired into the per-tuple pipeline. `process` is the
/// atomic unit of progress; all state mutation happens at its end, so an
/// aborted call leaves the detector as if the call had not been made.
pub struct StreamingDetector {
    forest: Box<dyn Forest>,
    preprocessor: Preprocessor,
    predictor_corrector: PredictorCorrector,
    last_anomaly: AnomalyDescriptor,
    last_timestamp: Option<i64>,
}

/// Captured state of a [`StreamingDetector`]; the builder configuration must
/// be supplied again on restore, as for the other components.
pub struct DetectorState {
    pub forest: ForestState,
    pub preprocessor: PreprocessorState,
    pub predictor_corrector: PredictorCorrectorState,
    pub last_anomaly: Option<AnomalyDescriptor>,
    pub last_timestamp: Option<i64>,
}

impl StreamingDetector {
    /// Score, grade and commit one observation.
    pub fn process(
        &mut self,
        input: &[f64],
        timestamp: i64,
        missing: Option<&[usize]>,
    ) -> Result<AnomalyDescriptor> {
        let patched = self
            .preprocessor
            .impute_input(input, missing, self.forest.as_ref())?;
        self.preprocessor
            .fill_gaps(&patched, timestamp, self.forest.as_mut())?;

        let mut result =
            AnomalyDescriptor::new(input, timestamp, missing.map(Vec::from));
        result.transform_method = self.preprocessor.transform_method();
        result.internal_timestamp = self.preprocessor.internal_timestamp() as u64;
        result.total_updates = self.forest.entries_seen();
        result.scale = Some(self.preprocessor.scale());
        result.shift = Some(self.preprocessor.shift());
        result.difference_deviations = Some(self.preprocessor.difference_deviations());

        let shingle =
            self.preprocessor
                .scaled_shingled_input(&patched, timestamp, self.forest.as_mut())?;
        if let Some(point) = &shingle {
            result.rcf_point = Some(point.clone());
            if self.preprocessor.is_ready() {
                self.predictor_corrector
                    .detect(&mut result, &self.last_anomaly, self.forest.as_ref())?;
            }
        }
        if result.anomaly_grade > 0.0 {
            self.preprocessor.invert_expectations(&mut result);
            self.last_anomaly = result.clone();
        }
        self.preprocessor
            .update_state(&patched, shingle.as_deref(), timestamp, self.forest.as_mut())?;
        self.last_timestamp = Some(timestamp);
        Ok(result)
    }

    /// Process a batch with strictly ascending timestamps, returning the
    /// descriptors selected by `filter`.
    pub fn process_sequentially(
        &mut self,
        data: &[(Vec<f64>, i64)],
        filter: fn(&AnomalyDescriptor) -> bool,
    ) -> Result<Vec<AnomalyDescriptor>> {
        let mut answer = Vec::new();
        let mut previous = self.last_timestamp;
        for (input, timestamp) in data {
            if let Some(last) = previous {
                check_argument(*timestamp > last, "timestamps must be strictly ascending")?;
            }
            previous = Some(*timestamp);
            let descriptor = self.process(input, *timestamp, None)?;
            if filter(&descriptor) {
                answer.push(descriptor);
            }
        }
        Ok(answer)
    }

    /// Range forecast over `horizon` future frames, in input units with
    /// projected timestamps. Uncalibrated; see `Forecaster` for calibration.
    pub fn extrapolate(&self, horizon: usize, centrality: f64) -> Result<TimedRangeVector> {
        let forecast = self.forest.extrapolate(horizon, centrality)?;
        self.preprocessor.invert_forecast_range(forecast)
    }

    pub fn is_output_ready(&self) -> bool {
        self.forest.is_output_ready() && self.preprocessor.is_ready()
    }

    pub fn forest(&self) -> &dyn Forest {
        self.forest.as_ref()
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn last_anomaly(&self) -> &AnomalyDescriptor {
        &self.last_anomaly
    }

    pub fn to_state(&self) -> DetectorState {
        DetectorState {
            forest: self.forest.to_state(),
            preprocessor: self.preprocessor.to_state(),
            predictor_corrector: self.predictor_corrector.to_state(),
            last_anomaly: if self.last_anomaly.rcf_point.is_some() {
                Some(self.last_anomaly.clone())
            } else {
                None
            },
            last_timestamp: self.last_timestamp,
        }
    }

    /// Restore from a state captured on an equally configured detector.
    pub fn restore(&mut self, state: &DetectorState, validate_heap: bool) -> Result<()> {
        self.forest = forest_from_state(&state.forest, validate_heap)?;
        self.preprocessor.restore(&state.preprocessor)?;
        self.predictor_corrector.restore(&state.predictor_corrector)?;
        self.last_anomaly = state
            .last_anomaly
            .clone()
            .unwrap_or_else(|| AnomalyDescriptor::new(&[], 0, None));
        self.last_timestamp = state.last_timestamp;
        Ok(())
    }
}

/// Plain configuration record for the detector; validation happens once in
/// `build`.
pub struct DetectorBuilder {
    input_dimensions: usize,
    shingle_size: usize,
    sample_size: usize,
    number_of_trees: usize,
    time_decay: Option<f64>,
    transform_decay: Option<f64>,
    initial_accept_fraction: f64,
    bounding_box_cache_fraction: f64,
    parallel_enabled: bool,
    output_after: Option<usize>,
    random_seed: Option<u64>,
    precision: Precision,
    forest_mode: ForestMode,
    transform_method: TransformMethod,
    imputation_method: ImputationMethod,
    scoring_strategy: ScoringStrategy,
    weights: Option<Vec<f64>>,
    weight_time: f64,
    start_normalization: usize,
    stop_normalization: usize,
    default_fill: Option<Vec<f64>>,
    use_imputed_fraction: f64,
    z_factor: Option<f64>,
    lower_threshold: Option<f64>,
    initial_threshold: Option<f64>,
    score_differencing: Option<f64>,
    alert_once: bool,
    sampling_support: Option<f64>,
    noise_factor: Option<f64>,
    number_of_expected_values: usize,
}

impl DetectorBuilder {
    pub fn new(input_dimensions: usize, shingle_size: usize) -> Self {
        DetectorBuilder {
            input_dimensions,
            shingle_size,
            sample_size: 256,
            number_of_trees: 30,
            time_decay: None,
            transform_decay: None,
            initial_accept_fraction: 0.125,
            bounding_box_cache_fraction: 1.0,
            parallel_enabled: false,
            output_after: None,
            random_seed: None,
            precision: Precision::Single,
            forest_mode: ForestMode::Standard,
            transform_method: TransformMethod::None,
            imputation_method: ImputationMethod::Rcf,
            scoring_strategy: ScoringStrategy::ExpectedInverseDepth,
            weights: None,
            weight_time: 1.0,
            start_normalization: 10,
            stop_normalization: usize::MAX,
            default_fill: None,
            use_imputed_fraction: 0.5,
            z_factor: None,
            lower_threshold: None,
            initial_threshold: None,
            score_differencing: None,
            alert_once: false,
            sampling_support: None,
            noise_factor: None,
            number_of_expected_values: 1,
        }
    }

    pub fn input_dimensions(&self) -> usize {
        self.input_dimensions
    }

    pub fn sample_size(&mut self, sample_size: usize) -> &mut Self {
        self.sample_size = sample_size;
        self
    }

    pub fn number_of_trees(&mut self, number_of_trees: usize) -> &mut Self {
        self.number_of_trees = number_of_trees;
        self
    }

    pub fn time_decay(&mut self, time_decay: f64) -> &mut Self {
        self.time_decay = Some(time_decay);
        self
    }

    pub fn transform_decay(&mut self, transform_decay: f64) -> &mut Self {
        self.transform_decay = Some(transform_decay);
        self
    }

    pub fn initial_accept_fraction(&mut self, fraction: f64) -> &mut Self {
        self.initial_accept_fraction = fraction;
        self
    }

    pub fn bounding_box_cache_fraction(&mut self, fraction: f64) -> &mut Self {
        self.bounding_box_cache_fraction = fraction;
        self
    }

    pub fn parallel_enabled(&mut self, parallel_enabled: bool) -> &mut Self {
        self.parallel_enabled = parallel_enabled;
        self
    }

    pub fn output_after(&mut self, output_after: usize) -> &mut Self {
        self.output_after = Some(output_after);
        self
    }

    pub fn random_seed(&mut self, random_seed: u64) -> &mut Self {
        self.random_seed = Some(random_seed);
        self
    }

    pub fn precision(&mut self, precision: Precision) -> &mut Self {
        self.precision = precision;
        self
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

    pub fn scoring_strategy(&mut self, scoring_strategy: ScoringStrategy) -> &mut Self {
        self.scoring_strategy = scoring_strategy;
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

    pub fn use_imputed_fraction(&mut self, fraction: f64) -> &mut Self {
        self.use_imputed_fraction = fraction;
        self
    }

    pub fn z_factor(&mut self, z_factor: f64) -> &mut Self {
        self.z_factor = Some(z_factor);
        self
    }

    pub fn lower_threshold(&mut self, lower_threshold: f64) -> &mut Self {
        self.lower_threshold = Some(lower_threshold);
        self
    }

    pub fn initial_threshold(&mut self, initial_threshold: f64) -> &mut Self {
        self.initial_threshold = Some(initial_threshold);
        self
    }

    pub fn score_differencing(&mut self, score_differencing: f64) -> &mut Self {
        self.score_differencing = Some(score_differencing);
        self
    }

    pub fn alert_once(&mut self, alert_once: bool) -> &mut Self {
        self.alert_once = alert_once;
        self
    }

    pub fn sampling_support(&mut self, sampling_support: f64) -> &mut Self {
        self.sampling_support = Some(sampling_support);
        self
    }

    pub fn noise_factor(&mut self, noise_factor: f64) -> &mut Self {
        self.noise_factor = Some(noise_factor);
        self
    }

    pub fn number_of_expected_values(&mut self, number: usize) -> &mut Self {
        self.number_of_expected_values = number;
        self
    }

    pub fn build(&self) -> Result<StreamingDetector> {
        check_argument(self.input_dimensions > 0, "input dimensions cannot be zero")?;
        check_argument(self.shingle_size > 0, "shingle size cannot be zero")?;
        let block_size = if self.forest_mode == ForestMode::TimeAugmented {
            self.input_dimensions + 1
        } else {
            self.input_dimensions
        };
        let dimensions = block_size * self.shingle_size;
        let time_decay = self.time_decay.unwrap_or(0.1 / self.sample_size as f64);
        let transform_decay = self
            .transform_decay
            .unwrap_or(0.1 / self.sample_size as f64);
        let random_seed = self
            .random_seed
            .unwrap_or_else(|| ChaCha20Rng::from_entropy().gen::<u64>());

        let forest = ForestBuilder::new(dimensions, self.shingle_size)
            .sample_size(self.sample_size)
            .number_of_trees(self.number_of_trees)
            .random_seed(random_seed)
            .parallel_enabled(self.parallel_enabled)
            .time_decay(time_decay)
            .initial_accept_fraction(self.initial_accept_fraction)
            .bounding_box_cache_fraction(self.bounding_box_cache_fraction)
            .output_after(self.output_after.unwrap_or(1 + self.sample_size / 4))
            .internal_shingling(true)
            .precision(self.precision)
            .build()?;

        let mut preprocessor_builder =
            PreprocessorBuilder::new(self.input_dimensions, self.shingle_size);
        preprocessor_builder
            .forest_mode(self.forest_mode)
            .transform_method(self.transform_method)
            .imputation_method(self.imputation_method)
            .transform_decay(transform_decay)
            .weight_time(self.weight_time)
            .start_normalization(self.start_normalization)
            .stop_normalization(self.stop_normalization)
            .use_imputed_fraction(self.use_imputed_fraction);
        if let Some(weights) = &self.weights {
            preprocessor_builder.weights(weights);
        }
        if let Some(fill) = &self.default_fill {
            preprocessor_builder.default_fill(fill);
        }
        let preprocessor = preprocessor_builder.build()?;

        let mut predictor_corrector = PredictorCorrector::new(
            transform_decay,
            self.scoring_strategy,
            self.shingle_size,
            block_size,
            self.forest_mode == ForestMode::TimeAugmented,
        )?;
        if let Some(z_factor) = self.z_factor {
            predictor_corrector.set_z_factor(z_factor);
        }
        if let Some(lower) = self.lower_threshold {
            predictor_corrector.set_lower_threshold(lower);
        }
        if let Some(initial) = self.initial_threshold {
            predictor_corrector.set_initial_threshold(initial);
        }
        if let Some(differencing) = self.score_differencing {
            predictor_corrector.set_score_differencing(differencing);
        }
        if let Some(support) = self.sampling_support {
            predictor_corrector.set_sampling_support(support);
        }
        if let Some(noise) = self.noise_factor {
            predictor_corrector.set_noise_factor(noise);
        }
        predictor_corrector.set_ignore_drift(self.alert_once);
        predictor_corrector.set_number_of_expected_values(self.number_of_expected_values)?;

        Ok(StreamingDetector {
            forest,
            preprocessor,
            predictor_corrector,
            last_anomaly: AnomalyDescriptor::new(&[], 0, None),
            last_timestamp: None,
        })
    }
}
