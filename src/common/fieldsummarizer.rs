use crate::common::samplesummary::{summarize, SampleSummary};

const CONDITIONAL_UPPER_FRACTION: f64 = 0.9;
const CONDITIONAL_LOWER_FRACTION: f64 = 0.1;

fn project_missing(point: &[f32], positions: &[usize]) -> Vec<f32> {
    positions.iter().map(|&i| point[i]).collect()
}

/// Distills the per-tree conditional samples `(score, point, distance)` into
/// a [`SampleSummary`]. Samples far from the query (relative to a threshold
/// derived from the distance distribution and `centrality`) are downweighted
/// rather than dropped. With `project` set, only the missing coordinates are
/// summarized; otherwise the full point space is.
pub struct FieldSummarizer {
    centrality: f64,
    project: bool,
    max_number: usize,
    distance: fn(&[f32], &[f32]) -> f64,
}

impl FieldSummarizer {
    pub fn new(
        centrality: f64,
        project: bool,
        max_number: usize,
        distance: fn(&[f32], &[f32]) -> f64,
    ) -> Self {
        FieldSummarizer {
            centrality,
            project,
            max_number,
            distance,
        }
    }

    pub fn summarize_list(
        &self,
        points: &[Vec<f32>],
        distances: &[f64],
        missing: &[usize],
    ) -> SampleSummary {
        let mut distance_list: Vec<f64> = distances.to_vec();
        distance_list.sort_by(|a, b| a.partial_cmp(b).expect("finite distances"));
        let mut threshold = 0.0;
        if self.centrality > 0.0 {
            let mut always_include = 0;
            while always_include < distance_list.len() - 1 && distance_list[always_include] == 0.0 {
                always_include += 1;
            }
            let remaining = distance_list.len() - always_include;
            threshold = self.centrality
                * (distance_list[always_include + remaining / 3]
                    + distance_list[always_include + remaining / 2]);
        }
        threshold += (1.0 - self.centrality) * distance_list[distance_list.len() - 1];

        let projecting = self.project && !missing.is_empty();
        let mut weighted: Vec<(Vec<f32>, f32)> = Vec::with_capacity(points.len());
        for (point, &dist) in points.iter().zip(distances) {
            let projected = if projecting {
                project_missing(point, missing)
            } else {
                point.clone()
            };
            let weight = if dist <= threshold || threshold == 0.0 {
                1.0
            } else {
                (threshold / dist) as f32
            };
            weighted.push((projected, weight));
        }

        let mut summary = SampleSummary::from_points(
            &weighted,
            CONDITIONAL_LOWER_FRACTION,
            CONDITIONAL_UPPER_FRACTION,
        );
        if self.max_number > 0 {
            let clustered = summarize(&weighted, self.distance, self.max_number, false);
            summary.summary_points = clustered.summary_points;
            summary.relative_weight = clustered.relative_weight;
        }
        summary
    }
}
