use crate::types::Result;
use crate::util::check_argument;

/// A discounted streaming mean/variance estimator. Setters are avoided so the
/// estimator stays restartable from its captured state alone.
#[derive(Clone)]
pub struct Deviation {
    discount: f64,
    weight: f64,
    sum: f64,
    sum_squared: f64,
    count: i32,
}

/// Captured state of a [`Deviation`]; round-trips bit-exactly.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviationState {
    pub discount: f64,
    pub weight: f64,
    pub sum: f64,
    pub sum_squared: f64,
    pub count: i32,
}

impl Deviation {
    pub fn new(discount: f64) -> Result<Self> {
        check_argument(
            (0.0..1.0).contains(&discount),
            "discount must be in [0,1)",
        )?;
        Ok(Deviation {
            discount,
            weight: 0.0,
            sum: 0.0,
            sum_squared: 0.0,
            count: 0,
        })
    }

    pub fn default() -> Self {
        Deviation {
            discount: 0.0,
            weight: 0.0,
            sum: 0.0,
            sum_squared: 0.0,
            count: 0,
        }
    }

    pub fn update(&mut self, value: f64) {
        let factor = if self.discount == 0.0 {
            1.0
        } else {
            let a = 1.0 - self.discount;
            let b = 1.0 - 1.0 / (self.count + 2) as f64;
            if a < b {
                a
            } else {
                b
            }
        };
        self.sum = self.sum * factor + value;
        self.sum_squared = self.sum_squared * factor + value * value;
        self.weight = self.weight * factor + 1.0;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.sum / self.weight
        }
    }

    pub fn deviation(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let mean = self.sum / self.weight;
        let variance = self.sum_squared / self.weight - mean * mean;
        if variance > 0.0 {
            f64::sqrt(variance)
        } else {
            0.0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weight <= 0.0
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn reset(&mut self) {
        self.weight = 0.0;
        self.sum = 0.0;
        self.sum_squared = 0.0;
        self.count = 0;
    }

    pub fn to_state(&self) -> DeviationState {
        DeviationState {
            discount: self.discount,
            weight: self.weight,
            sum: self.sum,
            sum_squared: self.sum_squared,
            count: self.count,
        }
    }

    pub fn from_state(state: &DeviationState) -> Result<Self> {
        check_argument(
            (0.0..1.0).contains(&state.discount),
            "discount must be in [0,1)",
        )?;
        Ok(Deviation {
            discount: state.discount,
            weight: state.weight,
            sum: state.sum,
            sum_squared: state.sum_squared,
            count: state.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trip_is_bit_exact() {
        let mut deviation = Deviation::new(0.01).unwrap();
        for i in 0..100 {
            deviation.update(0.37 * i as f64);
        }
        let restored = Deviation::from_state(&deviation.to_state()).unwrap();
        assert_eq!(restored.to_state(), deviation.to_state());
        assert_eq!(restored.mean(), deviation.mean());
        assert_eq!(restored.deviation(), deviation.deviation());
    }

    #[test]
    fn undiscounted_matches_plain_statistics() {
        let mut deviation = Deviation::new(0.0).unwrap();
        for x in [1.0, 2.0, 3.0, 4.0] {
            deviation.update(x);
        }
        assert!((deviation.mean() - 2.5).abs() < 1e-12);
        assert!((deviation.deviation() - f64::sqrt(1.25)).abs() < 1e-12);
    }
}
