//! Streaming anomaly detection and forecasting with random cut forests.
//!
//! A random cut forest is an ensemble of randomized binary space-partitioning
//! trees over a time-decayed sample of the stream. This crate provides the
//! forest itself (arena-backed trees over a shared point store, with
//! scoring, attribution, density estimation, imputation and extrapolation)
//! and the streaming layer around it: shingling and normalization, a
//! predictor-corrector that turns raw scores into calibrated anomaly grades,
//! and calibrated range forecasts.
//!
//! ```ignore
//! use cutstream::{DetectorBuilder, TransformMethod};
//!
//! let mut detector = DetectorBuilder::new(1, 8)
//!     .sample_size(256)
//!     .number_of_trees(40)
//!     .transform_method(TransformMethod::Normalize)
//!     .random_seed(42)
//!     .build()?;
//!
//! for (timestamp, value) in stream {
//!     let result = detector.process(&[value], timestamp, None)?;
//!     if result.anomaly_grade > 0.0 {
//!         println!("grade {} at {}", result.anomaly_grade, timestamp);
//!     }
//! }
//! # Ok::<(), cutstream::ForestError>(())
//! ```
//!
//! ### References
//!
//! Sudipto Guha, Nina Mishra, Gourav Roy, and Okke Schrijvers. *"Robust
//! random cut forest based anomaly detection on streams."* International
//! Conference on Machine Learning, pp. 2712-2721. PMLR, 2016.

pub mod common;
pub mod detect;
pub mod ensemble;
pub mod errors;
pub mod forest;
pub mod store;
pub mod types;
mod util;
pub mod visitor;

pub use common::datagen::MultiDimDataWithKey;
pub use common::deviation::{Deviation, DeviationState};
pub use common::divector::DiVector;
pub use common::rangevector::{RangeVector, TimedRangeVector};
pub use common::samplesummary::{iterative_clustering, summarize, Center, SampleSummary};
pub use detect::descriptor::{AnomalyDescriptor, ForecastDescriptor};
pub use detect::detector::{DetectorBuilder, DetectorState, StreamingDetector};
pub use detect::errorhandler::ErrorHandler;
pub use detect::forecaster::{Forecaster, ForecasterBuilder};
pub use detect::predictorcorrector::PredictorCorrector;
pub use detect::preprocessor::{Preprocessor, PreprocessorBuilder};
pub use detect::thresholder::BasicThresholder;
pub use detect::transformer::WeightedTransformer;
pub use detect::types::{
    Calibration, CorrectionMode, ForestMode, ImputationMethod, ScoringStrategy, TransformMethod,
};
pub use ensemble::{
    build_forest, forest_from_state, Forest, ForestBuilder, ForestOptions, ForestState, Precision,
};
pub use errors::ForestError;
pub use types::Result;
pub use util::{l1distance, l2distance, linfinitydistance};
