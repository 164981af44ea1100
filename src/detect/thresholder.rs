use crate::common::deviation::{Deviation, DeviationState};
use crate::types::Result;
use crate::util::{maxf64, minf64};

const DEFAULT_ELASTICITY: f64 = 0.01;
const DEFAULT_SCORE_DIFFERENCING: f64 = 0.5;
const DEFAULT_MINIMUM_SCORES: i32 = 10;
const DEFAULT_ABSOLUTE_THRESHOLD: f64 = 0.8;
const DEFAULT_LOWER_THRESHOLD: f64 = 1.0;
const DEFAULT_INITIAL_THRESHOLD: f64 = 1.5;
const DEFAULT_Z_FACTOR: f64 = 3.0;
const DEFAULT_UPPER_Z_FACTOR: f64 = 5.0;
const MINIMUM_Z_FACTOR: f64 = 2.0;

/// Converts raw scores into grades in [0,1] against adaptive thresholds.
///
/// The primary deviation tracks scores, the secondary tracks score
/// differences; `score_differencing` mixes the two, which damps the
/// threshold for periodic streams where successive scores correlate. Until
/// `minimum_scores` observations, the threshold ramps linearly from
/// `initial_threshold` toward the adaptive value.
#[derive(Clone)]
pub struct BasicThresholder {
    elasticity: f64,
    count: i32,
    minimum_scores: i32,
    score_differencing: f64,
    last_score: f64,
    primary_deviation: Deviation,
    secondary_deviation: Deviation,
    threshold_deviation: Deviation,
    absolute_threshold: f64,
    lower_threshold: f64,
    initial_threshold: f64,
    z_factor: f64,
    upper_z_factor: f64,
    in_potential_anomaly: bool,
}

/// Captured state of a [`BasicThresholder`]; deviations are bit-exact.
#[derive(Clone, Debug)]
pub struct ThresholderState {
    pub count: i32,
    pub minimum_scores: i32,
    pub score_differencing: f64,
    pub last_score: f64,
    pub primary_deviation: DeviationState,
    pub secondary_deviation: DeviationState,
    pub threshold_deviation: DeviationState,
    pub absolute_threshold: f64,
    pub lower_threshold: f64,
    pub initial_threshold: f64,
    pub z_factor: f64,
    pub upper_z_factor: f64,
    pub in_potential_anomaly: bool,
}

impl BasicThresholder {
    pub fn new(discount: f64) -> Result<Self> {
        Ok(BasicThresholder {
            elasticity: DEFAULT_ELASTICITY,
            count: 0,
            minimum_scores: DEFAULT_MINIMUM_SCORES,
            score_differencing: DEFAULT_SCORE_DIFFERENCING,
            last_score: 0.0,
            primary_deviation: Deviation::new(discount)?,
            secondary_deviation: Deviation::new(discount)?,
            threshold_deviation: Deviation::new(discount / 2.0)?,
            absolute_threshold: DEFAULT_ABSOLUTE_THRESHOLD,
            lower_threshold: DEFAULT_LOWER_THRESHOLD,
            initial_threshold: DEFAULT_INITIAL_THRESHOLD,
            z_factor: DEFAULT_Z_FACTOR,
            upper_z_factor: DEFAULT_UPPER_Z_FACTOR,
            in_potential_anomaly: false,
        })
    }

    pub fn is_deviation_ready(&self) -> bool {
        if self.count < self.minimum_scores {
            return false;
        }
        if self.score_differencing != 0.0 {
            self.primary_deviation.count() >= self.minimum_scores
        } else {
            true
        }
    }

    /// fraction of the linear ramp between the initial and adaptive regimes
    fn intermediate_term_fraction(&self) -> f64 {
        if self.count < self.minimum_scores {
            0.0
        } else if self.count > 2 * self.minimum_scores {
            1.0
        } else {
            (self.count - self.minimum_scores) as f64 / self.minimum_scores as f64
        }
    }

    fn mixed_deviation(&self) -> f64 {
        self.score_differencing * self.primary_deviation.deviation()
            + (1.0 - self.score_differencing) * self.secondary_deviation.deviation()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_with_factor(self.z_factor)
    }

    pub fn threshold_with_factor(&self, factor: f64) -> f64 {
        let factor = maxf64(factor, MINIMUM_Z_FACTOR);
        let adaptive = maxf64(
            self.lower_threshold,
            self.primary_deviation.mean() + factor * self.mixed_deviation(),
        );
        if !self.is_deviation_ready() {
            return maxf64(self.initial_threshold, self.absolute_threshold);
        }
        let fraction = self.intermediate_term_fraction();
        maxf64(
            fraction * adaptive + (1.0 - fraction) * self.initial_threshold,
            self.absolute_threshold,
        )
    }

    pub fn anomaly_grade(&self, score: f64, previous: bool) -> f64 {
        self.anomaly_grade_with_factor(score, previous, self.z_factor)
    }

    /// grade in [0,1]: the clipped z-score position between the trigger
    /// factor and the upper factor
    pub fn anomaly_grade_with_factor(&self, score: f64, previous: bool, factor: f64) -> f64 {
        if self.count < self.minimum_scores {
            return 0.0;
        }
        let factor = maxf64(factor, MINIMUM_Z_FACTOR);
        // tolerate hysteresis while already inside an anomalous run
        let elasticity = if previous { self.elasticity } else { 0.0 };
        let threshold = self.threshold_with_factor(factor);
        if score < threshold - elasticity || threshold <= 0.0 {
            return 0.0;
        }
        if !self.is_deviation_ready() {
            let t = (score - self.absolute_threshold) / self.absolute_threshold;
            return minf64(1.0, maxf64(t, 0.0));
        }
        let deviation = self.mixed_deviation();
        if deviation <= 0.0 {
            return 1.0;
        }
        let t_factor = minf64(
            (score - self.primary_deviation.mean()) / deviation,
            self.upper_z_factor,
        );
        let grade = (t_factor - factor) / (self.upper_z_factor - factor);
        minf64(1.0, maxf64(grade, 0.0))
    }

    pub fn threshold_and_grade(&self, score: f64, previous: bool) -> (f64, f64) {
        (self.threshold(), self.anomaly_grade(score, previous))
    }

    pub fn update(&mut self, primary: f64, secondary: f64, in_anomaly: bool) {
        let capped = minf64(primary, 2.0);
        self.primary_deviation.update(capped);
        self.secondary_deviation.update(secondary - self.last_score);
        let gap = primary - self.primary_deviation.mean();
        if gap > 0.0 {
            self.threshold_deviation.update(gap);
        }
        self.last_score = primary;
        self.count += 1;
        self.in_potential_anomaly = in_anomaly;
    }

    pub fn in_potential_anomaly(&self) -> bool {
        self.in_potential_anomaly
    }

    pub fn last_score(&self) -> f64 {
        self.last_score
    }

    pub fn primary_mean(&self) -> f64 {
        self.primary_deviation.mean()
    }

    pub fn primary_deviation(&self) -> f64 {
        self.primary_deviation.deviation()
    }

    pub fn z_factor(&self) -> f64 {
        self.z_factor
    }

    // the threshold family maintains absolute <= lower < initial and
    // z_factor < upper_z_factor; setters clamp toward those invariants

    pub fn set_z_factor(&mut self, factor: f64) {
        self.z_factor = maxf64(factor, MINIMUM_Z_FACTOR);
        if self.upper_z_factor < 2.0 * self.z_factor {
            self.upper_z_factor = 2.0 * self.z_factor;
        }
    }

    pub fn set_upper_z_factor(&mut self, factor: f64) {
        self.upper_z_factor = maxf64(factor, self.z_factor);
    }

    pub fn set_lower_threshold(&mut self, lower: f64) {
        self.lower_threshold = lower;
        if self.absolute_threshold > lower {
            self.absolute_threshold = lower;
        }
        if self.initial_threshold < lower {
            self.initial_threshold = lower;
        }
    }

    pub fn set_absolute_threshold(&mut self, value: f64) {
        self.absolute_threshold = value;
    }

    pub fn set_initial_threshold(&mut self, initial: f64) {
        self.initial_threshold = initial;
    }

    pub fn set_score_differencing(&mut self, score_differencing: f64) {
        assert!(
            (0.0..=1.0).contains(&score_differencing),
            "score differencing must be in [0,1]"
        );
        self.score_differencing = score_differencing;
    }

    pub fn to_state(&self) -> ThresholderState {
        ThresholderState {
            count: self.count,
            minimum_scores: self.minimum_scores,
            score_differencing: self.score_differencing,
            last_score: self.last_score,
            primary_deviation: self.primary_deviation.to_state(),
            secondary_deviation: self.secondary_deviation.to_state(),
            threshold_deviation: self.threshold_deviation.to_state(),
            absolute_threshold: self.absolute_threshold,
            lower_threshold: self.lower_threshold,
            initial_threshold: self.initial_threshold,
            z_factor: self.z_factor,
            upper_z_factor: self.upper_z_factor,
            in_potential_anomaly: self.in_potential_anomaly,
        }
    }

    pub fn from_state(state: &ThresholderState) -> Result<Self> {
        Ok(BasicThresholder {
            elasticity: DEFAULT_ELASTICITY,
            count: state.count,
            minimum_scores: state.minimum_scores,
            score_differencing: state.score_differencing,
            last_score: state.last_score,
            primary_deviation: Deviation::from_state(&state.primary_deviation)?,
            secondary_deviation: Deviation::from_state(&state.secondary_deviation)?,
            threshold_deviation: Deviation::from_state(&state.threshold_deviation)?,
            absolute_threshold: state.absolute_threshold,
            lower_threshold: state.lower_threshold,
            initial_threshold: state.initial_threshold,
            z_factor: state.z_factor,
            upper_z_factor: state.upper_z_factor,
            in_potential_anomaly: state.in_potential_anomaly,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warm_up_holds_grades_at_zero() {
        let mut thresholder = BasicThresholder::new(0.01).unwrap();
        assert_eq!(thresholder.threshold(), DEFAULT_INITIAL_THRESHOLD);
        // nothing grades before the minimum number of scores
        assert_eq!(thresholder.anomaly_grade(3.0, false), 0.0);
        for _ in 0..DEFAULT_MINIMUM_SCORES {
            thresholder.update(1.0, 1.0, false);
        }
        // past the minimum, a far outlier grades even mid-ramp
        assert!(thresholder.anomaly_grade(30.0, false) > 0.0);
        assert_eq!(thresholder.anomaly_grade(0.5, false), 0.0);
    }

    #[test]
    fn grade_saturates_at_the_upper_factor() {
        let mut thresholder = BasicThresholder::new(0.01).unwrap();
        for i in 0..100 {
            let score = 0.9 + 0.01 * ((i % 7) as f64);
            thresholder.update(score, score, false);
        }
        let huge = thresholder.primary_mean() + 100.0;
        assert!((thresholder.anomaly_grade(huge, false) - 1.0).abs() < 1e-12);
        let modest = thresholder.primary_mean();
        assert_eq!(thresholder.anomaly_grade(modest, false), 0.0);
    }

    #[test]
    fn state_round_trip() {
        let mut thresholder = BasicThresholder::new(0.02).unwrap();
        for i in 0..50 {
            thresholder.update(1.0 + 0.01 * (i as f64), 1.0, false);
        }
        let restored = BasicThresholder::from_state(&thresholder.to_state()).unwrap();
        assert_eq!(restored.threshold(), thresholder.threshold());
        assert_eq!(
            restored.anomaly_grade(2.5, false),
            thresholder.anomaly_grade(2.5, false)
        );
    }
}
