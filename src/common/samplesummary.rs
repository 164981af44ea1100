use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

const MAX_NUMBER_PER_DIMENSION: usize = 5;
const LENGTH_BOUND: usize = 1000;
const SEPARATION_RATIO_FOR_MERGE: f64 = 0.8;
const WEIGHT_THRESHOLD: f64 = 1.25;
const UPPER_FRACTION: f64 = 0.9;
const LOWER_FRACTION: f64 = 0.1;
const MAX_ITERATIONS: usize = 20;

/// Summary of a collection of weighted samples: global statistics plus a
/// bounded set of weighted representatives produced by clustering.
#[derive(Clone)]
pub struct SampleSummary {
    pub summary_points: Vec<Vec<f32>>,
    pub relative_weight: Vec<f32>,
    pub total_weight: f32,
    pub mean: Vec<f32>,
    pub median: Vec<f32>,
    pub upper: Vec<f32>,
    pub lower: Vec<f32>,
    pub deviation: Vec<f32>,
}

impl SampleSummary {
    /// index (and cumulative weight) of the first entry where the running
    /// weight reaches `weight`, resuming a previous scan
    pub fn pick(
        weighted_values: &[(f32, f32)],
        weight: f64,
        start: usize,
        initial_weight: f64,
    ) -> (usize, f64) {
        let mut running = initial_weight;
        let mut index = start;
        while index + 1 < weighted_values.len()
            && weighted_values[index].1 as f64 + running < weight
        {
            running += weighted_values[index].1 as f64;
            index += 1;
        }
        (index, running)
    }

    pub fn from_points(points: &[(Vec<f32>, f32)], lower_fraction: f64, upper_fraction: f64) -> Self {
        assert!(!points.is_empty(), "cannot summarize an empty list");
        assert!(lower_fraction < 0.5, "lower fraction must be below half");
        assert!(upper_fraction > 0.5, "upper fraction must be above half");
        let dimensions = points[0].0.len();
        let total_weight: f64 = points.iter().map(|x| x.1 as f64).sum();
        assert!(
            total_weight > 0.0 && total_weight.is_finite(),
            "weights must be positive and finite"
        );
        let mut mean = vec![0.0f32; dimensions];
        let mut deviation = vec![0.0f32; dimensions];
        let mut sum_values = vec![0.0f64; dimensions];
        let mut sum_values_sq = vec![0.0f64; dimensions];
        for (point, weight) in points {
            assert!(point.len() == dimensions, "inconsistent dimensions");
            for j in 0..dimensions {
                sum_values[j] += *weight as f64 * point[j] as f64;
                sum_values_sq[j] += *weight as f64 * point[j] as f64 * point[j] as f64;
            }
        }
        for j in 0..dimensions {
            mean[j] = (sum_values[j] / total_weight) as f32;
            let t = sum_values_sq[j] / total_weight
                - sum_values[j] * sum_values[j] / (total_weight * total_weight);
            deviation[j] = f64::sqrt(if t > 0.0 { t } else { 0.0 }) as f32;
        }
        let mut median = vec![0.0f32; dimensions];
        let mut upper = vec![0.0f32; dimensions];
        let mut lower = vec![0.0f32; dimensions];
        let half = total_weight / 2.0;
        let low_weight = total_weight * lower_fraction;
        let high_weight = total_weight * upper_fraction;
        for j in 0..dimensions {
            let mut column: Vec<(f32, f32)> = points.iter().map(|x| (x.0[j], x.1)).collect();
            column.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("finite values"));
            let first = Self::pick(&column, low_weight, 0, 0.0);
            lower[j] = column[first.0].0;
            let second = Self::pick(&column, half, first.0, first.1);
            median[j] = column[second.0].0;
            let third = Self::pick(&column, high_weight, second.0, second.1);
            upper[j] = column[third.0].0;
        }
        SampleSummary {
            summary_points: Vec::new(),
            relative_weight: Vec::new(),
            total_weight: total_weight as f32,
            mean,
            median,
            upper,
            lower,
            deviation,
        }
    }
}

/// A cluster with a single representative; assignment and recomputation are
/// deterministic so that reclustering a converged result is a fixed point.
#[derive(Clone)]
pub struct Center {
    representative: Vec<f32>,
    weight: f64,
    assigned: Vec<(usize, f32)>,
    sum_of_radii: f64,
}

impl Center {
    pub fn new(representative: &[f32], weight: f32) -> Self {
        Center {
            representative: Vec::from(representative),
            weight: weight as f64,
            assigned: Vec::new(),
            sum_of_radii: 0.0,
        }
    }

    pub fn representative(&self) -> &[f32] {
        &self.representative
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// average radius of the assigned points, the cluster's spread
    pub fn extent_measure(&self) -> f64 {
        if self.weight > 0.0 {
            self.sum_of_radii / self.weight
        } else {
            0.0
        }
    }

    fn reset(&mut self) {
        self.weight = 0.0;
        self.sum_of_radii = 0.0;
        self.assigned.clear();
    }

    fn add_point(&mut self, index: usize, weight: f32, distance: f64) {
        self.assigned.push((index, weight));
        self.weight += weight as f64;
        self.sum_of_radii += weight as f64 * distance;
    }

    // weighted per-dimension median of the assigned points
    fn recompute(&mut self, points: &[(&[f32], f32)], distance: fn(&[f32], &[f32]) -> f64) {
        if self.assigned.is_empty() {
            return;
        }
        let dimensions = self.representative.len();
        let total: f64 = self.assigned.iter().map(|a| a.1 as f64).sum();
        for i in 0..dimensions {
            self.assigned.sort_by(|a, b| {
                points[a.0].0[i]
                    .partial_cmp(&points[b.0].0[i])
                    .expect("finite values")
            });
            let mut running = 0.0f64;
            let mut position = 0;
            while position + 1 < self.assigned.len()
                && running + (self.assigned[position].1 as f64) < total / 2.0
            {
                running += self.assigned[position].1 as f64;
                position += 1;
            }
            self.representative[i] = points[self.assigned[position].0].0[i];
        }
        self.sum_of_radii = self
            .assigned
            .iter()
            .map(|a| a.1 as f64 * distance(points[a.0].0, &self.representative))
            .sum();
    }

    fn absorb(&mut self, other: &Center) {
        let combined = self.weight + other.weight;
        if combined > 0.0 {
            for (x, &y) in self.representative.iter_mut().zip(&other.representative) {
                *x = ((self.weight * *x as f64 + other.weight * y as f64) / combined) as f32;
            }
        }
        self.weight = combined;
        self.sum_of_radii += other.sum_of_radii;
    }
}

fn assign_points(
    centers: &mut [Center],
    points: &[(&[f32], f32)],
    distance: fn(&[f32], &[f32]) -> f64,
    parallel_enabled: bool,
) {
    for center in centers.iter_mut() {
        center.reset();
    }
    let representatives: Vec<Vec<f32>> =
        centers.iter().map(|c| c.representative.clone()).collect();
    let nearest = |entry: (usize, &(&[f32], f32))| {
        let (index, (point, weight)) = entry;
        let mut best = 0;
        let mut best_distance = f64::MAX;
        for (j, representative) in representatives.iter().enumerate() {
            let d = distance(point, representative);
            if d < best_distance {
                best_distance = d;
                best = j;
            }
        }
        (index, best, *weight, best_distance)
    };
    let assignments: Vec<(usize, usize, f32, f64)> = if parallel_enabled {
        points.par_iter().enumerate().map(nearest).collect()
    } else {
        points.iter().enumerate().map(nearest).collect()
    };
    for (index, center, weight, dist) in assignments {
        centers[center].add_point(index, weight, dist);
    }
}

/// Merge-or-evict clustering over weighted points. When `previous_clusters`
/// is provided those centers seed the iteration; reclustering a converged
/// result reproduces the same weights and extent measures.
pub fn iterative_clustering(
    max_allowed: usize,
    points: &[(&[f32], f32)],
    previous_clusters: Option<&[Center]>,
    distance: fn(&[f32], &[f32]) -> f64,
    parallel_enabled: bool,
) -> Vec<Center> {
    assert!(max_allowed > 0, "need at least one cluster");
    assert!(!points.is_empty(), "cannot cluster an empty list");
    let total_weight: f64 = points.iter().map(|x| x.1 as f64).sum();

    let mut centers: Vec<Center> = match previous_clusters {
        Some(seeds) if !seeds.is_empty() => seeds.to_vec(),
        _ => {
            let mut rng = ChaCha20Rng::seed_from_u64(max_allowed as u64);
            let wanted = usize::min(2 * max_allowed + 3, points.len());
            let mut picked: Vec<Center> = Vec::new();
            let mut guard = 0;
            while picked.len() < wanted && guard < 10 * wanted {
                guard += 1;
                let mut position = rng.gen::<f64>() * total_weight;
                let mut index = 0;
                while index + 1 < points.len() && position > points[index].1 as f64 {
                    position -= points[index].1 as f64;
                    index += 1;
                }
                if !picked
                    .iter()
                    .any(|c| distance(c.representative(), points[index].0) == 0.0)
                {
                    picked.push(Center::new(points[index].0, points[index].1));
                }
            }
            if picked.is_empty() {
                picked.push(Center::new(points[0].0, points[0].1));
            }
            picked
        }
    };

    let mut previous: Vec<Vec<f32>> = Vec::new();
    for _round in 0..MAX_ITERATIONS {
        assign_points(&mut centers, points, distance, parallel_enabled);
        for center in centers.iter_mut() {
            center.recompute(points, distance);
        }
        merge_or_evict(&mut centers, max_allowed, total_weight, distance);
        let current: Vec<Vec<f32>> = centers.iter().map(|c| c.representative.clone()).collect();
        if current == previous {
            break;
        }
        previous = current;
    }
    centers.sort_by(|a, b| b.weight.partial_cmp(&a.weight).expect("finite weights"));
    centers
}

fn merge_or_evict(
    centers: &mut Vec<Center>,
    max_allowed: usize,
    total_weight: f64,
    distance: fn(&[f32], &[f32]) -> f64,
) {
    loop {
        // merge any pair closer than the sum of their extents allows
        let mut merge_pair: Option<(usize, usize)> = None;
        let mut best_ratio = SEPARATION_RATIO_FOR_MERGE;
        for i in 0..centers.len() {
            for j in (i + 1)..centers.len() {
                let gap = distance(centers[i].representative(), centers[j].representative());
                let extent = centers[i].extent_measure() + centers[j].extent_measure() + 1e-10;
                let ratio = gap / extent;
                if ratio < best_ratio {
                    best_ratio = ratio;
                    merge_pair = Some((i, j));
                }
            }
        }
        if let Some((i, j)) = merge_pair {
            let other = centers.remove(j);
            centers[i].absorb(&other);
            continue;
        }
        if centers.len() > max_allowed {
            let mut least = 0;
            for i in 1..centers.len() {
                if centers[i].weight < centers[least].weight {
                    least = i;
                }
            }
            centers.remove(least);
            continue;
        }
        break;
    }
    // a cluster that explains almost nothing is noise
    if centers.len() > 1 {
        let floor = total_weight / (WEIGHT_THRESHOLD * LENGTH_BOUND as f64);
        let heavy = centers.iter().filter(|c| c.weight >= floor).count();
        if heavy > 0 {
            centers.retain(|c| c.weight >= floor);
        }
    }
}

/// Summarize weighted points: global statistics always, plus clustered
/// representatives when `max_number > 0`.
pub fn summarize(
    points: &[(Vec<f32>, f32)],
    distance: fn(&[f32], &[f32]) -> f64,
    max_number: usize,
    parallel_enabled: bool,
) -> SampleSummary {
    assert!(
        max_number < 51,
        "for many clusters, recursive elimination works better"
    );
    let mut summary = SampleSummary::from_points(points, LOWER_FRACTION, UPPER_FRACTION);
    if max_number > 0 {
        let dimensions = points[0].0.len();
        let max_allowed = usize::min(dimensions * MAX_NUMBER_PER_DIMENSION, max_number);
        let total_weight: f64 = points.iter().map(|x| x.1 as f64).sum();
        let mut rng = ChaCha20Rng::seed_from_u64(max_allowed as u64);

        // heavy points always participate; a long light tail is subsampled
        let mut sampled: Vec<(&[f32], f32)> = Vec::new();
        if points.len() < 5 * LENGTH_BOUND {
            for (point, weight) in points {
                sampled.push((point.as_slice(), *weight));
            }
        } else {
            let cutoff = (total_weight / LENGTH_BOUND as f64) as f32;
            let mut remainder = 0.0f64;
            for (point, weight) in points {
                if *weight > cutoff {
                    sampled.push((point.as_slice(), *weight));
                } else {
                    remainder += *weight as f64;
                }
            }
            let keep = 5.0 * LENGTH_BOUND as f64 / points.len() as f64;
            for (point, weight) in points {
                if *weight <= cutoff && rng.gen::<f64>() < keep {
                    let adjusted =
                        *weight as f64 / keep * (remainder / total_weight);
                    sampled.push((point.as_slice(), adjusted as f32));
                }
            }
        }

        let centers = iterative_clustering(max_allowed, &sampled, None, distance, parallel_enabled);
        let center_sum: f64 = centers.iter().map(|c| c.weight()).sum();
        let mut summary_points = Vec::new();
        let mut relative_weight = Vec::new();
        for center in &centers {
            summary_points.push(Vec::from(center.representative()));
            relative_weight.push((center.weight() / center_sum) as f32);
        }
        summary.summary_points = summary_points;
        summary.relative_weight = relative_weight;
    }
    summary
}
