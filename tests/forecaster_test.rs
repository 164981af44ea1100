extern crate cutstream;

use cutstream::{Calibration, ForecasterBuilder, MultiDimDataWithKey, TransformMethod};

// a clean seasonal signal: after enough observed errors the calibrated
// one-step interval covers most actuals without being vacuous
#[test]
fn calibrated_intervals_cover_a_sinusoid() {
    let horizon = 10;
    let mut builder = ForecasterBuilder::new(1, 8, horizon);
    builder
        .calibration(Calibration::Simple)
        .percentile(0.1)
        .error_horizon(256);
    builder
        .detector()
        .sample_size(256)
        .number_of_trees(30)
        .transform_method(TransformMethod::Normalize)
        .random_seed(71);
    let mut forecaster = builder.build().unwrap();

    let data = MultiDimDataWithKey::multi_cosine(1000, &[60], &[40.0], 2.0, 31, 1);
    let mut at_200 = None;
    let mut last = None;
    for (i, point) in data.data.iter().enumerate() {
        let result = forecaster.process(point, i as i64, None).unwrap();
        if i == 199 {
            at_200 = Some(result.clone());
        }
        last = Some(result);
    }
    let result = last.unwrap();
    let forecast = result.timed_forecast.expect("forecast should be present");
    assert_eq!(forecast.range.values.len(), horizon);
    assert_eq!(forecast.timestamps.len(), horizon);
    for i in 0..horizon {
        assert!(forecast.range.lower[i] <= forecast.range.values[i]);
        assert!(forecast.range.values[i] <= forecast.range.upper[i]);
        assert!(forecast.timestamps[i] > 999);
    }
    // empirical one-step coverage after 200 points: most actuals fall inside
    // the calibrated interval, which stays informative rather than vacuous
    let early = at_200.expect("forecast ready well before 200 points");
    let precision = early.interval_precision[0];
    assert!(
        precision > 0.75 && precision < 0.95,
        "interval precision {}",
        precision
    );
    // mean error is small against a 40-amplitude wave
    assert!(result.error_mean[0].abs() < 20.0);
}

#[test]
fn uncalibrated_and_calibrated_extrapolation_share_values() {
    let horizon = 5;
    let mut builder = ForecasterBuilder::new(1, 8, horizon);
    builder.calibration(Calibration::Minimal).error_horizon(128);
    builder
        .detector()
        .sample_size(128)
        .number_of_trees(20)
        .transform_method(TransformMethod::Normalize)
        .random_seed(7);
    let mut forecaster = builder.build().unwrap();
    let data = MultiDimDataWithKey::multi_cosine(600, &[30], &[25.0], 1.0, 17, 1);
    for (i, point) in data.data.iter().enumerate() {
        forecaster.process(point, i as i64, None).unwrap();
    }
    let plain = forecaster.extrapolate(horizon, false, 1.0).unwrap();
    let corrected = forecaster.extrapolate(horizon, true, 1.0).unwrap();
    for i in 0..horizon {
        // minimal calibration widens; it never tightens the interval around
        // an uncovered actual beyond the shifted center
        assert!(corrected.range.upper[i] >= corrected.range.lower[i]);
        assert!(plain.range.upper[i] >= plain.range.lower[i]);
    }
}

#[test]
fn forecaster_rejects_contradictory_horizons() {
    let mut builder = ForecasterBuilder::new(1, 8, 10);
    builder.error_horizon(5);
    assert!(builder.build().is_err());
    let mut too_large = ForecasterBuilder::new(1, 8, 10);
    too_large.error_horizon(100_000);
    assert!(too_large.build().is_err());
}
