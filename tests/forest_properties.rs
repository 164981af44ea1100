extern crate cutstream;

use cutstream::{Forest, ForestBuilder, MultiDimDataWithKey, Precision};

fn build(
    dimensions: usize,
    shingle_size: usize,
    parallel: bool,
    cache_fraction: f64,
    precision: Precision,
    seed: u64,
) -> Box<dyn Forest> {
    ForestBuilder::new(dimensions, shingle_size)
        .sample_size(128)
        .number_of_trees(20)
        .random_seed(seed)
        .parallel_enabled(parallel)
        .bounding_box_cache_fraction(cache_fraction)
        .internal_shingling(shingle_size > 1)
        .precision(precision)
        .build()
        .unwrap()
}

fn gaussian_data(num: usize, dimensions: usize, seed: u64) -> Vec<Vec<f64>> {
    let mean = vec![vec![0.0; dimensions]];
    let scale = vec![vec![1.0; dimensions]];
    MultiDimDataWithKey::mixture(num, &mean, &scale, &[1.0], seed).data
}

#[test]
fn sequential_and_parallel_scores_agree() {
    let dimensions = 3;
    let data = gaussian_data(1500, dimensions, 11);
    let mut sequential = build(dimensions, 1, false, 1.0, Precision::Single, 77);
    let mut parallel = build(dimensions, 1, true, 1.0, Precision::Single, 77);
    for (i, point) in data.iter().enumerate() {
        let a = sequential.score(point).unwrap();
        let b = parallel.score(point).unwrap();
        assert!(
            (a - b).abs() < 1e-10,
            "scores diverged at {}: {} vs {}",
            i,
            a,
            b
        );
        sequential.update(point, i as u64).unwrap();
        parallel.update(point, i as u64).unwrap();
    }
}

#[test]
fn cached_and_uncached_boxes_score_identically() {
    let dimensions = 2;
    let data = gaussian_data(1200, dimensions, 5);
    let mut cached = build(dimensions, 1, false, 1.0, Precision::Single, 99);
    let mut uncached = build(dimensions, 1, false, 0.0, Precision::Single, 99);
    for (i, point) in data.iter().enumerate() {
        let a = cached.score(point).unwrap();
        let b = uncached.score(point).unwrap();
        assert!((a - b).abs() < 1e-10, "scores diverged at {}", i);
        let c = cached.attribution(point).unwrap();
        let d = uncached.attribution(point).unwrap();
        for j in 0..dimensions {
            assert!((c.high[j] - d.high[j]).abs() < 1e-10);
            assert!((c.low[j] - d.low[j]).abs() < 1e-10);
        }
        cached.update(point, i as u64).unwrap();
        uncached.update(point, i as u64).unwrap();
    }
}

#[test]
fn changing_the_cache_fraction_mid_stream_is_equivalent() {
    let dimensions = 2;
    let data = gaussian_data(1000, dimensions, 29);
    let mut reference = build(dimensions, 1, false, 1.0, Precision::Single, 31);
    let mut resized = build(dimensions, 1, false, 0.2, Precision::Single, 31);
    for (i, point) in data.iter().enumerate() {
        if i == 400 {
            resized.set_cache_fraction(1.0).unwrap();
        }
        if i == 700 {
            resized.set_cache_fraction(0.0).unwrap();
        }
        let a = reference.score(point).unwrap();
        let b = resized.score(point).unwrap();
        assert!((a - b).abs() < 1e-10, "scores diverged at {}", i);
        reference.update(point, i as u64).unwrap();
        resized.update(point, i as u64).unwrap();
    }
}

#[test]
fn single_and_double_precision_agree_to_quantization() {
    let dimensions = 2;
    let data = gaussian_data(1200, dimensions, 17);
    let mut single = build(dimensions, 1, false, 1.0, Precision::Single, 123);
    let mut double = build(dimensions, 1, false, 1.0, Precision::Double, 123);
    for (i, point) in data.iter().enumerate() {
        let a = single.score(point).unwrap();
        let b = double.score(point).unwrap();
        assert!(
            (a - b).abs() < 1e-3,
            "precision drift at {}: {} vs {}",
            i,
            a,
            b
        );
        single.update(point, i as u64).unwrap();
        double.update(point, i as u64).unwrap();
    }
}

#[test]
fn structural_invariants_hold_under_churn() {
    let dimensions = 4;
    let data = gaussian_data(2000, dimensions, 3);
    let mut forest = build(dimensions, 1, false, 1.0, Precision::Single, 7);
    for (i, point) in data.iter().enumerate() {
        forest.update(point, i as u64).unwrap();
        if i % 500 == 499 {
            // mass accounting, cut routing and reference counts
            forest.validate().unwrap();
        }
    }
    forest.validate().unwrap();
}

#[test]
fn separated_clusters_score_the_gap_high() {
    let dimensions = 8;
    let mut first = vec![0.0; dimensions];
    let mut second = vec![0.0; dimensions];
    first[0] = 5.0;
    second[0] = -5.0;
    let data = MultiDimDataWithKey::mixture(
        4000,
        &[first, second],
        &[vec![0.1; dimensions], vec![0.1; dimensions]],
        &[0.5, 0.5],
        0,
    );
    let mut forest = build(dimensions, 1, false, 1.0, Precision::Single, 42);
    for (i, point) in data.data.iter().enumerate() {
        forest.update(point, i as u64).unwrap();
    }
    // the empty region between the clusters is anomalous
    assert!(forest.score(&vec![0.0; dimensions]).unwrap() > 1.5);
    // cluster members are not
    assert!(forest.score(&data.data[10]).unwrap() < 1.2);
}

#[test]
fn attribution_sums_to_the_score() {
    let dimensions = 4;
    let data = gaussian_data(1500, dimensions, 23);
    let mut forest = build(dimensions, 1, false, 1.0, Precision::Single, 19);
    for (i, point) in data.iter().enumerate() {
        forest.update(point, i as u64).unwrap();
    }
    let query = vec![4.0, 0.0, 0.0, 0.0];
    let score = forest.score(&query).unwrap();
    let attribution = forest.attribution(&query).unwrap();
    assert!((attribution.total() - score).abs() < 1e-6 * score.max(1.0));
    // the spiked coordinate dominates
    let first = attribution.high_low_sum(0);
    for j in 1..dimensions {
        assert!(first > attribution.high_low_sum(j));
    }
    // and the spike is from above
    assert!(attribution.high[0] > attribution.low[0]);
}

#[test]
fn extrapolation_tracks_a_clean_wave() {
    let base = 1;
    let shingle_size = 8;
    let data = MultiDimDataWithKey::multi_cosine(2000, &[60], &[50.0], 1.0, 13, base);
    let mut forest = build(base * shingle_size, shingle_size, false, 1.0, Precision::Single, 101);
    for (i, point) in data.data.iter().enumerate() {
        forest.update(point, i as u64).unwrap();
    }
    let horizon = 5;
    let forecast = forest.extrapolate(horizon, 1.0).unwrap();
    assert_eq!(forecast.values.len(), horizon * base);
    for i in 0..horizon * base {
        assert!(forecast.lower[i] <= forecast.values[i]);
        assert!(forecast.values[i] <= forecast.upper[i]);
        // a 50-amplitude wave stays well inside these bounds
        assert!(forecast.values[i].abs() < 100.0);
    }
}

#[test]
fn forest_state_round_trip_reproduces_scores() {
    let dimensions = 3;
    let data = gaussian_data(1200, dimensions, 41);
    let mut forest = build(dimensions, 1, false, 1.0, Precision::Single, 53);
    for (i, point) in data.iter().enumerate() {
        forest.update(point, i as u64).unwrap();
    }
    let state = forest.to_state();
    let restored = cutstream::forest_from_state(&state, true).unwrap();
    restored.validate().unwrap();
    for point in data.iter().take(100) {
        let a = forest.score(point).unwrap();
        let b = restored.score(point).unwrap();
        assert!((a - b).abs() < 1e-10);
    }
    let probe = vec![3.0; dimensions];
    assert!(
        (forest.score(&probe).unwrap() - restored.score(&probe).unwrap()).abs() < 1e-10
    );
}

#[test]
fn misconfiguration_is_rejected_at_build_time() {
    assert!(ForestBuilder::new(5, 2).build().is_err());
    assert!(ForestBuilder::new(0, 1).build().is_err());
    assert!(ForestBuilder::new(4, 2)
        .bounding_box_cache_fraction(1.5)
        .build()
        .is_err());
    assert!(ForestBuilder::new(4, 2)
        .internal_shingling(false)
        .internal_rotation(true)
        .build()
        .is_err());
}
