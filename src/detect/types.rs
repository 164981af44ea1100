use std::fmt;

/// How inputs are mapped into the forest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForestMode {
    /// shingled raw values; shingle size one corresponds to population
    /// analysis without a time axis
    Standard,
    /// the inter-arrival gap is appended to each frame, for event streams
    /// and sparse data
    TimeAugmented,
    /// gaps between observed timestamps are filled by an imputation policy;
    /// requires shingle size above one
    StreamingImpute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformMethod {
    None,
    Weighted,
    Difference,
    SubtractMa,
    Normalize,
    NormalizeDifference,
}

impl TransformMethod {
    /// transforms that recenter the data near zero; relevant to noise checks
    pub fn is_centered(&self) -> bool {
        matches!(
            self,
            TransformMethod::Difference
                | TransformMethod::Normalize
                | TransformMethod::NormalizeDifference
                | TransformMethod::SubtractMa
        )
    }

    pub fn requires_normalization(&self) -> bool {
        matches!(
            self,
            TransformMethod::Normalize | TransformMethod::NormalizeDifference
        )
    }

    pub fn is_differencing(&self) -> bool {
        matches!(
            self,
            TransformMethod::Difference | TransformMethod::NormalizeDifference
        )
    }
}

impl fmt::Display for TransformMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = match self {
            TransformMethod::None => "NONE",
            TransformMethod::Weighted => "WEIGHTED",
            TransformMethod::Difference => "DIFFERENCE",
            TransformMethod::SubtractMa => "SUBTRACT_MA",
            TransformMethod::Normalize => "NORMALIZE",
            TransformMethod::NormalizeDifference => "NORMALIZE_DIFFERENCE",
        };
        write!(f, "{}", printable)
    }
}

/// Fill-in policy for missing frames and missing input values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImputationMethod {
    Zero,
    /// last known value per dimension
    Previous,
    /// the next observed value per dimension
    Next,
    Linear,
    /// a configured fixed vector
    FixedValues,
    /// the forest's own conditional prediction; falls back to Previous until
    /// the forest is ready
    Rcf,
}

/// Alternate scorings that can be thresholded differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoringStrategy {
    ExpectedInverseDepth,
    /// distance estimates from the density interpolant; useful for shingle
    /// size one and population analysis
    Distance,
    /// both scores must agree (precision oriented)
    MultiMode,
    /// either score suffices (recall oriented)
    MultiModeRecall,
}

/// Why a high score did not surface as an anomaly, or NONE when it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrectionMode {
    None,
    /// within noise of the expected values under a centered transform
    Noise,
    /// eliminated by multi-mode disagreement
    MultiMode,
    /// explained by an anomaly still inside the shingle
    AnomalyInShingle,
    /// conditional samples make the point unsurprising
    ConditionalForecast,
    /// the forecasted value was not very different
    Forecast,
    /// a sustained shift into a new but consistent regime
    DataDrift,
    /// first suppressed alert of a drift run
    AlertOnce,
}

impl fmt::Display for CorrectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = match self {
            CorrectionMode::None => "NONE",
            CorrectionMode::Noise => "NOISE",
            CorrectionMode::MultiMode => "MULTI_MODE",
            CorrectionMode::AnomalyInShingle => "ANOMALY_IN_SHINGLE",
            CorrectionMode::ConditionalForecast => "CONDITIONAL_FORECAST",
            CorrectionMode::Forecast => "FORECAST",
            CorrectionMode::DataDrift => "DATA_DRIFT",
            CorrectionMode::AlertOnce => "ALERT_ONCE",
        };
        write!(f, "{}", printable)
    }
}

/// Post-hoc adjustment of forecast intervals from observed errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Calibration {
    None,
    /// widen intervals only; coverage approaches 1 - 2 * percentile
    Minimal,
    /// widen and shift values by the median error; wider but better covered
    Simple,
}
