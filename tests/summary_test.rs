extern crate cutstream;

use cutstream::{iterative_clustering, l1distance, l2distance, summarize, MultiDimDataWithKey};

fn two_cluster_points(dimension: usize, num: usize, seed: u64) -> Vec<(Vec<f32>, f32)> {
    let mut first = vec![0.0; dimension];
    let mut second = vec![0.0; dimension];
    first[0] = 5.0;
    second[0] = -5.0;
    let data = MultiDimDataWithKey::mixture(
        num,
        &[first, second],
        &[vec![0.1; dimension], vec![0.1; dimension]],
        &[0.5, 0.5],
        seed,
    );
    data.data
        .iter()
        .map(|point| (point.iter().map(|&x| x as f32).collect(), 1.0f32))
        .collect()
}

parameterized_test::create! { finds_two_separated_clusters, (dimension, distance), {
    let points = two_cluster_points(dimension, 20_000, 0);
    let summary = summarize(&points, distance, 2 * dimension + 3, false);
    assert_eq!(summary.summary_points.len(), 2, "expected two clusters");
    let mut firsts: Vec<f32> = summary.summary_points.iter().map(|p| p[0]).collect();
    firsts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!((firsts[0] + 5.0).abs() < 1.0);
    assert!((firsts[1] - 5.0).abs() < 1.0);
    // each cluster holds about half the weight
    for &weight in &summary.relative_weight {
        assert!(weight > 0.3 && weight < 0.7);
    }
}}

finds_two_separated_clusters! {
    one_dimensional_l1: (1, l1distance),
    two_dimensional_l1: (2, l1distance),
    two_dimensional_l2: (2, l2distance),
}

// reclustering a converged result is a fixed point: identical weights and
// extent measures
#[test]
fn reclustering_a_converged_result_is_idempotent() {
    let points = two_cluster_points(2, 5_000, 9);
    let borrowed: Vec<(&[f32], f32)> = points.iter().map(|(p, w)| (p.as_slice(), *w)).collect();
    let first_run = iterative_clustering(4, &borrowed, None, l1distance, false);
    assert!(!first_run.is_empty());
    let second_run =
        iterative_clustering(4, &borrowed, Some(first_run.as_slice()), l1distance, false);
    assert_eq!(first_run.len(), second_run.len());
    for (a, b) in first_run.iter().zip(&second_run) {
        assert_eq!(a.weight(), b.weight());
        assert_eq!(a.extent_measure(), b.extent_measure());
        assert_eq!(a.representative(), b.representative());
    }
}

#[test]
fn summary_statistics_are_weighted() {
    let points = vec![
        (vec![0.0f32], 3.0f32),
        (vec![10.0f32], 1.0f32),
    ];
    let summary = summarize(&points, l1distance, 0, false);
    assert!((summary.mean[0] - 2.5).abs() < 1e-6);
    assert_eq!(summary.median[0], 0.0);
    assert_eq!(summary.total_weight, 4.0);
}
