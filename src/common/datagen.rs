use std::f32::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

/// Seeded synthetic streams with injected change keys, used throughout the
/// integration tests.
pub struct MultiDimDataWithKey {
    pub data: Vec<Vec<f64>>,
    pub change_indices: Vec<usize>,
    pub changes: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl MultiDimDataWithKey {
    pub fn multi_cosine(
        num: usize,
        period: &[usize],
        amplitude: &[f64],
        noise: f64,
        seed: u64,
        base_dimension: usize,
    ) -> Self {
        assert!(period.len() == base_dimension, "need a period per dimension");
        assert!(
            amplitude.len() == base_dimension,
            "need an amplitude per dimension"
        );
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut noise_rng = ChaCha20Rng::seed_from_u64(seed + 1);
        let mut phase = Vec::new();
        for i in 0..base_dimension {
            phase.push(rng.next_u64() as usize % period[i]);
        }
        let mut data: Vec<Vec<f64>> = Vec::new();
        let mut change_indices = Vec::new();
        let mut changes = Vec::new();
        for i in 0..num {
            let mut element = vec![0.0; base_dimension];
            let flag = noise_rng.gen::<f64>() < 0.01;
            let mut new_change = vec![0.0; base_dimension];
            let mut used = false;
            for j in 0..base_dimension {
                element[j] = amplitude[j]
                    * (2.0 * PI as f64 * (i + phase[j]) as f64 / period[j] as f64).cos()
                    + noise * noise_rng.gen::<f64>();
                if flag && noise_rng.gen::<f64>() < 0.3 {
                    let factor = 5.0 * (1.0 + noise_rng.gen::<f64>());
                    let mut change = factor * noise;
                    if noise_rng.gen::<f64>() < 0.5 {
                        change = -change;
                    }
                    element[j] += change;
                    new_change[j] = change;
                    used = true;
                }
            }
            data.push(element);
            if used {
                change_indices.push(i);
                changes.push(new_change);
            }
        }
        MultiDimDataWithKey {
            data,
            change_indices,
            changes,
            labels: Vec::new(),
        }
    }

    pub fn mixture(
        num: usize,
        mean: &[Vec<f64>],
        scale: &[Vec<f64>],
        weight: &[f64],
        seed: u64,
    ) -> Self {
        assert!(num > 0, "number of elements cannot be zero");
        assert!(!mean.is_empty(), "need at least one component");
        let base_dimension = mean[0].len();
        assert!(mean.len() == scale.len(), "scales and means must pair up");
        assert!(weight.len() == mean.len(), "weights and means must pair up");
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let sum: f64 = weight.iter().sum();
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..num {
            let mut i = 0;
            let mut w = sum * rng.gen::<f64>();
            while w > weight[i] {
                w -= weight[i];
                i += 1;
            }
            let mut element = Vec::with_capacity(base_dimension);
            for j in 0..base_dimension {
                element.push(mean[i][j] + scale[i][j] * gaussian(&mut rng));
            }
            data.push(element);
            labels.push(i);
        }
        MultiDimDataWithKey {
            data,
            change_indices: Vec::new(),
            changes: Vec::new(),
            labels,
        }
    }
}

fn gaussian(rng: &mut ChaCha20Rng) -> f64 {
    let mut r = f64::sqrt(-2.0 * f64::ln(rng.gen::<f64>()));
    // discard the infinity that ln(0) would produce
    while r.is_infinite() {
        r = f64::sqrt(-2.0 * f64::ln(rng.gen::<f64>()));
    }
    if rng.gen::<f64>() < 0.5 {
        r * f64::cos(2.0 * PI as f64 * rng.gen::<f64>())
    } else {
        r * f64::sin(2.0 * PI as f64 * rng.gen::<f64>())
    }
}
