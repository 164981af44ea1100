use crate::common::divector::DiVector;
use crate::common::rangevector::{RangeVector, TimedRangeVector};
use crate::detect::types::{CorrectionMode, ScoringStrategy, TransformMethod};

/// Everything known about one processed tuple: the input, every intermediate
/// of the pipeline, and the outputs. Created per `process` call; a flagged
/// descriptor is retained as the last anomaly for shingle-aware suppression.
#[derive(Clone)]
pub struct AnomalyDescriptor {
    // input and provenance
    pub current_values: Vec<f64>,
    pub input_timestamp: i64,
    pub missing_values: Option<Vec<usize>>,
    pub internal_timestamp: u64,
    pub total_updates: u64,

    // the (transformed, shingled) point seen by the forest
    pub rcf_point: Option<Vec<f64>>,

    pub rcf_score: f64,
    pub secondary_score: f64,
    pub threshold: f64,
    pub anomaly_grade: f64,
    pub in_high_score_region: bool,
    pub start_of_anomaly: bool,
    pub correction_mode: CorrectionMode,

    // present only when the grade is positive
    pub attribution: Option<DiVector>,
    /// time slice of the most anomalous block, in [-shingle_size + 1, 0]
    pub relative_index: i32,
    pub expected_rcf_point: Option<Vec<f64>>,
    /// further tree-space candidates with likelihoods, when more than one
    /// expected value is configured
    pub expected_point_candidates: Vec<(Vec<f64>, f64)>,
    pub expected_values_list: Vec<Vec<f64>>,
    pub likelihood_of_values: Vec<f64>,
    pub past_values: Option<Vec<f64>>,

    // transform provenance for correctors and inversion
    pub transform_method: TransformMethod,
    pub scoring_strategy: ScoringStrategy,
    pub scale: Option<Vec<f64>>,
    pub shift: Option<Vec<f64>>,
    pub difference_deviations: Option<Vec<f64>>,
}

impl AnomalyDescriptor {
    pub fn new(point: &[f64], timestamp: i64, missing_values: Option<Vec<usize>>) -> Self {
        if let Some(missing) = &missing_values {
            for &i in missing {
                assert!(i < point.len(), "missing index out of range");
            }
        }
        AnomalyDescriptor {
            current_values: Vec::from(point),
            input_timestamp: timestamp,
            missing_values,
            internal_timestamp: 0,
            total_updates: 0,
            rcf_point: None,
            rcf_score: 0.0,
            secondary_score: 0.0,
            threshold: 0.0,
            anomaly_grade: 0.0,
            in_high_score_region: false,
            start_of_anomaly: false,
            correction_mode: CorrectionMode::None,
            attribution: None,
            relative_index: 0,
            expected_rcf_point: None,
            expected_point_candidates: Vec::new(),
            expected_values_list: Vec::new(),
            likelihood_of_values: Vec::new(),
            past_values: None,
            transform_method: TransformMethod::None,
            scoring_strategy: ScoringStrategy::ExpectedInverseDepth,
            scale: None,
            shift: None,
            difference_deviations: None,
        }
    }

    pub fn is_expected_values_present(&self) -> bool {
        !self.expected_values_list.is_empty()
    }
}

/// An [`AnomalyDescriptor`] augmented with the calibrated forecast of the
/// configured horizon and the observed error statistics behind it.
#[derive(Clone)]
pub struct ForecastDescriptor {
    pub anomaly: AnomalyDescriptor,
    pub timed_forecast: Option<TimedRangeVector>,
    pub observed_error_distribution: Option<RangeVector<f32>>,
    pub error_rmse: Option<DiVector>,
    pub error_mean: Vec<f32>,
    pub interval_precision: Vec<f32>,
}

impl ForecastDescriptor {
    pub fn new(anomaly: AnomalyDescriptor) -> Self {
        ForecastDescriptor {
            anomaly,
            timed_forecast: None,
            observed_error_distribution: None,
            error_rmse: None,
            error_mean: Vec::new(),
            interval_precision: Vec::new(),
        }
    }
}
