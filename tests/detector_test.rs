extern crate cutstream;

use cutstream::{
    CorrectionMode, DetectorBuilder, ForestError, MultiDimDataWithKey, TransformMethod,
};

fn gaussian(num: usize, dimensions: usize, seed: u64) -> Vec<Vec<f64>> {
    MultiDimDataWithKey::mixture(
        num,
        &[vec![0.0; dimensions]],
        &[vec![1.0; dimensions]],
        &[1.0],
        seed,
    )
    .data
}

// warm-up: nothing grades and every update still lands in the forest
#[test]
fn warm_up_produces_no_alerts() {
    let dimensions = 5;
    let mut detector = DetectorBuilder::new(dimensions, 1)
        .sample_size(128)
        .number_of_trees(20)
        .random_seed(1)
        .build()
        .unwrap();
    let data = gaussian(50, dimensions, 2);
    for (i, point) in data.iter().enumerate() {
        let result = detector.process(point, i as i64, None).unwrap();
        assert_eq!(result.anomaly_grade, 0.0);
    }
    assert_eq!(detector.forest().entries_seen(), 50);
}

// an injected spike grades high, uncorrected, with a sane expectation
#[test]
fn injected_spike_is_detected() {
    let shingle_size = 4;
    let mut detector = DetectorBuilder::new(1, shingle_size)
        .sample_size(256)
        .number_of_trees(30)
        .random_seed(10)
        .build()
        .unwrap();
    let data = gaussian(5000, 1, 20);
    for (i, point) in data.iter().enumerate() {
        detector.process(point, i as i64, None).unwrap();
    }
    let result = detector.process(&[20.0], 5000, None).unwrap();
    assert!(result.anomaly_grade > 0.5, "grade {}", result.anomaly_grade);
    assert_eq!(result.correction_mode, CorrectionMode::None);
    assert!(result.rcf_score > result.threshold);
    assert!(result.attribution.is_some());
    assert!(result.is_expected_values_present());
    let expected = result.expected_values_list[0][0];
    assert!(
        expected > -3.0 && expected < 3.0,
        "expected value {}",
        expected
    );
}

// one spike must not alert repeatedly while it transits the shingle
#[test]
fn spike_in_shingle_is_suppressed() {
    let shingle_size = 8;
    let mut detector = DetectorBuilder::new(1, shingle_size)
        .sample_size(256)
        .number_of_trees(30)
        .random_seed(3)
        .build()
        .unwrap();
    let data = MultiDimDataWithKey::multi_cosine(3000, &[60], &[20.0], 0.5, 7, 1);
    for (i, point) in data.data.iter().enumerate() {
        detector.process(point, i as i64, None).unwrap();
    }
    let spike = detector.process(&[80.0], 3000, None).unwrap();
    assert!(spike.anomaly_grade > 0.0, "spike was missed");

    let mut follow_up_alerts = 0;
    for k in 1..shingle_size {
        let value = data.data[(3000 + k) % 60].clone();
        let result = detector.process(&value, (3000 + k) as i64, None).unwrap();
        if result.anomaly_grade > 0.0 {
            follow_up_alerts += 1;
        } else if result.in_high_score_region {
            assert!(
                matches!(
                    result.correction_mode,
                    CorrectionMode::AnomalyInShingle
                        | CorrectionMode::Forecast
                        | CorrectionMode::ConditionalForecast
                ),
                "unexpected correction mode {}",
                result.correction_mode
            );
        }
    }
    assert!(
        follow_up_alerts == 0,
        "spike alerted {} extra times while inside the shingle",
        follow_up_alerts
    );
}

// a slow consistent ramp is drift, not a stream of anomalies
#[test]
fn drift_alerts_at_most_once() {
    let shingle_size = 4;
    let mut detector = DetectorBuilder::new(1, shingle_size)
        .sample_size(256)
        .number_of_trees(30)
        .random_seed(5)
        .alert_once(true)
        .build()
        .unwrap();
    let data = gaussian(3000, 1, 11);
    for (i, point) in data.iter().enumerate() {
        detector.process(point, i as i64, None).unwrap();
    }
    let mut alerts = 0;
    let mut drift_marks = 0;
    for i in 0..200 {
        let ramp = 3.0 * (i as f64) / 200.0;
        let value = data[i][0] + ramp;
        let result = detector.process(&[value], (3000 + i) as i64, None).unwrap();
        if result.anomaly_grade > 0.0 {
            alerts += 1;
        }
        if matches!(
            result.correction_mode,
            CorrectionMode::DataDrift | CorrectionMode::AlertOnce
        ) {
            drift_marks += 1;
            assert_eq!(result.anomaly_grade, 0.0);
        }
    }
    assert!(alerts <= 1, "ramp alerted {} times", alerts);
    assert!(drift_marks > 0, "ramp never entered the drift path");
}

#[test]
fn sequential_processing_requires_ascending_timestamps() {
    let mut detector = DetectorBuilder::new(1, 2)
        .sample_size(64)
        .number_of_trees(10)
        .random_seed(9)
        .build()
        .unwrap();
    let good = vec![(vec![1.0], 1i64), (vec![2.0], 2), (vec![3.0], 3)];
    let all = detector.process_sequentially(&good, |_| true).unwrap();
    assert_eq!(all.len(), 3);
    let bad = vec![(vec![4.0], 5i64), (vec![5.0], 4)];
    assert!(matches!(
        detector.process_sequentially(&bad, |_| true),
        Err(ForestError::InvalidConfiguration { .. })
    ));
}

// restoring captured state reproduces behavior on the future stream
#[test]
fn detector_state_round_trip_is_observationally_equivalent() {
    let build = || {
        DetectorBuilder::new(2, 4)
            .sample_size(128)
            .number_of_trees(20)
            .transform_method(TransformMethod::Normalize)
            .random_seed(77)
            .build()
            .unwrap()
    };
    let mut original = build();
    let data = gaussian(1500, 2, 33);
    for (i, point) in data.iter().enumerate() {
        original.process(point, i as i64, None).unwrap();
    }
    let state = original.to_state();
    let mut restored = build();
    restored.restore(&state, true).unwrap();

    let tail = gaussian(200, 2, 34);
    for (i, point) in tail.iter().enumerate() {
        let timestamp = (1500 + i) as i64;
        let a = original.process(point, timestamp, None).unwrap();
        let b = restored.process(point, timestamp, None).unwrap();
        assert!((a.rcf_score - b.rcf_score).abs() < 1e-10);
        assert_eq!(a.anomaly_grade, b.anomaly_grade);
        assert_eq!(a.correction_mode, b.correction_mode);
    }
}

#[test]
fn missing_values_are_imputed_before_scoring() {
    let mut detector = DetectorBuilder::new(2, 4)
        .sample_size(128)
        .number_of_trees(20)
        .random_seed(13)
        .build()
        .unwrap();
    let data = gaussian(2000, 2, 14);
    for (i, point) in data.iter().enumerate() {
        detector.process(point, i as i64, None).unwrap();
    }
    // a missing coordinate must not read as the garbage value it carries
    let result = detector
        .process(&[data[0][0], 1.0e6], 2000, Some(&[1]))
        .unwrap();
    assert_eq!(result.missing_values, Some(vec![1]));
    assert!(result.anomaly_grade == 0.0 || result.correction_mode != CorrectionMode::None);

    let invalid = detector.process(&[0.0, 0.0], 2001, Some(&[7]));
    assert!(matches!(
        invalid,
        Err(ForestError::DimensionMismatch { .. })
    ));
}

#[test]
fn builder_rejects_contradictions() {
    assert!(DetectorBuilder::new(0, 1).build().is_err());
    // streaming imputation needs a real shingle
    assert!(DetectorBuilder::new(1, 1)
        .forest_mode(cutstream::ForestMode::StreamingImpute)
        .build()
        .is_err());
    assert!(DetectorBuilder::new(1, 4)
        .number_of_expected_values(0)
        .build()
        .is_err());
}

// gap filling: three observations arrive late and the shingle keeps moving
#[test]
fn streaming_impute_fills_timestamp_gaps() {
    let mut detector = DetectorBuilder::new(1, 4)
        .sample_size(128)
        .number_of_trees(15)
        .forest_mode(cutstream::ForestMode::StreamingImpute)
        .imputation_method(cutstream::ImputationMethod::Linear)
        .random_seed(21)
        .build()
        .unwrap();
    // a regular cadence of one unit per observation
    let data = gaussian(500, 1, 22);
    for (i, point) in data.iter().enumerate() {
        detector.process(point, i as i64, None).unwrap();
    }
    let before = detector.preprocessor().internal_timestamp();
    // a hole of four missing cadence steps
    detector.process(&[0.0], 505, None).unwrap();
    let after = detector.preprocessor().internal_timestamp();
    assert!(
        after >= before + 3,
        "expected imputed frames: {} -> {}",
        before,
        after
    );
    // imputed frames lower the data quality average below one
    assert!(detector.preprocessor().data_quality() < 1.0);
}

// the time-augmented mode carries the arrival gap as an extra dimension
#[test]
fn time_augmented_mode_processes_irregular_arrivals() {
    let mut detector = DetectorBuilder::new(1, 4)
        .sample_size(128)
        .number_of_trees(15)
        .forest_mode(cutstream::ForestMode::TimeAugmented)
        .random_seed(43)
        .build()
        .unwrap();
    assert_eq!(detector.forest().dimensions(), 2 * 4);
    let data = gaussian(800, 1, 44);
    let mut timestamp = 0i64;
    for (i, point) in data.iter().enumerate() {
        timestamp += 1 + (i % 3) as i64;
        let result = detector.process(point, timestamp, None).unwrap();
        assert!(result.rcf_score.is_finite());
    }
    assert!(detector.forest().entries_seen() > 700);
}
