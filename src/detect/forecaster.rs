use crate::detect::descriptor::ForecastDescriptor;
use crate::detect::detector::{DetectorBuilder, StreamingDetector};
use crate::detect::errorhandler::ErrorHandler;
use crate::detect::types::Calibration;
use crate::types::Result;
use crate::util::check_argument;

pub const DEFAULT_ERROR_PERCENTILE: f32 = 0.1;
pub const MAX_ERROR_HORIZON: usize = 1024;

/// A detector that additionally maintains a calibrated range forecast for a
/// fixed horizon: each processed tuple records the realized error of earlier
/// forecasts and issues a freshly calibrated one.
pub struct Forecaster {
    detector: StreamingDetector,
    error_handler: ErrorHandler,
    forecast_horizon: usize,
    calibration: Calibration,
}

impl Forecaster {
    pub fn process(
        &mut self,
        input: &[f64],
        timestamp: i64,
        missing: Option<&[usize]>,
    ) -> Result<ForecastDescriptor> {
        let anomaly = self.detector.process(input, timestamp, missing)?;
        let mut result = ForecastDescriptor::new(anomaly);
        if self.detector.is_output_ready() {
            let deviations = self.detector.preprocessor().difference_deviations();
            self.error_handler.update_actuals(input, &deviations)?;
            result.error_mean = self.error_handler.error_mean().to_vec();
            result.interval_precision = self.error_handler.interval_precision().to_vec();
            result.error_rmse = Some(self.error_handler.error_rmse().clone());
            result.observed_error_distribution =
                Some(self.error_handler.error_distribution().clone());

            let mut timed = self.detector.extrapolate(self.forecast_horizon, 1.0)?;
            self.error_handler
                .calibrate(self.calibration, &mut timed.range)?;
            self.error_handler.update_forecasts(&timed.range)?;
            result.timed_forecast = Some(timed);
        }
        Ok(result)
    }

    pub fn process_sequentially(
        &mut self,
        data: &[(Vec<f64>, i64)],
        filter: fn(&ForecastDescriptor) -> bool,
    ) -> Result<Vec<ForecastDescriptor>> {
        let mut answer = Vec::new();
        for (input, timestamp) in data {
            let descriptor = self.process(input, *timestamp, None)?;
            if filter(&descriptor) {
                answer.push(descriptor);
            }
        }
        Ok(answer)
    }

    /// A forecast on demand; with `correct` set the interval bounds are
    /// calibrated against the observed errors.
    pub fn extrapolate(
        &self,
        horizon: usize,
        correct: bool,
        centrality: f64,
    ) -> Result<crate::common::rangevector::TimedRangeVector> {
        let mut timed = self.detector.extrapolate(horizon, centrality)?;
        if correct && horizon == self.forecast_horizon {
            self.error_handler
                .calibrate(self.calibration, &mut timed.range)?;
        }
        Ok(timed)
    }

    pub fn detector(&self) -> &StreamingDetector {
        &self.detector
    }

    pub fn error_handler(&self) -> &ErrorHandler {
        &self.error_handler
    }

    pub fn forecast_horizon(&self) -> usize {
        self.forecast_horizon
    }
}

pub struct ForecasterBuilder {
    detector: DetectorBuilder,
    forecast_horizon: usize,
    error_horizon: Option<usize>,
    calibration: Calibration,
    percentile: f32,
}

impl ForecasterBuilder {
    pub fn new(input_dimensions: usize, shingle_size: usize, forecast_horizon: usize) -> Self {
        ForecasterBuilder {
            detector: DetectorBuilder::new(input_dimensions, shingle_size),
            forecast_horizon,
            error_horizon: None,
            calibration: Calibration::Minimal,
            percentile: DEFAULT_ERROR_PERCENTILE,
        }
    }

    /// the shared detector configuration
    pub fn detector(&mut self) -> &mut DetectorBuilder {
        &mut self.detector
    }

    pub fn error_horizon(&mut self, error_horizon: usize) -> &mut Self {
        self.error_horizon = Some(error_horizon);
        self
    }

    pub fn calibration(&mut self, calibration: Calibration) -> &mut Self {
        self.calibration = calibration;
        self
    }

    pub fn percentile(&mut self, percentile: f32) -> &mut Self {
        self.percentile = percentile;
        self
    }

    pub fn build(&self) -> Result<Forecaster> {
        check_argument(self.forecast_horizon > 0, "forecast horizon cannot be zero")?;
        let error_horizon = self.error_horizon.unwrap_or(MAX_ERROR_HORIZON);
        check_argument(
            error_horizon <= MAX_ERROR_HORIZON,
            "error horizon is too large",
        )?;
        check_argument(
            error_horizon >= self.forecast_horizon,
            "error horizon must cover the forecast horizon",
        )?;
        let detector = self.detector.build()?;
        let error_handler = ErrorHandler::new(
            self.detector.input_dimensions(),
            self.forecast_horizon,
            error_horizon,
            self.percentile,
        )?;
        Ok(Forecaster {
            detector,
            error_handler,
            forecast_horizon: self.forecast_horizon,
            calibration: self.calibration,
        })
    }
}
