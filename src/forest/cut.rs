use crate::forest::boundingbox::BoundingBox;
use crate::types::StoreFloat;

/// Transient representation of a cut while a point is being inserted; the
/// node store keeps cuts in its packed arrays, not in this form.
pub struct Cut<F> {
    pub dimension: usize,
    pub value: F,
}

impl<F: StoreFloat> Cut<F> {
    pub fn new(dimension: usize, value: F) -> Self {
        Cut { dimension, value }
    }

    pub fn placeholder() -> Self {
        Cut {
            dimension: usize::MAX,
            value: F::zero(),
        }
    }

    /// Draw the cut determined by `factor` in the box merged with `point`;
    /// the dimension is chosen proportional to the merged side lengths and
    /// the value uniformly within the side. Also reports whether the cut
    /// separates `point` from the box.
    pub fn random_cut_and_separation(
        bounding_box: &BoundingBox<F>,
        factor: f64,
        point: &[F],
    ) -> (Cut<F>, bool) {
        let min_values = bounding_box.min_values();
        let max_values = bounding_box.max_values();
        let mut range: f64 = min_values
            .iter()
            .zip(max_values)
            .zip(point)
            .map(|((&low, &high), &value)| {
                if value < low {
                    (low - value).into_f64()
                } else if high < value {
                    (value - high).into_f64()
                } else {
                    0.0
                }
            })
            .sum();
        if range == 0.0 {
            return (Cut::placeholder(), false);
        }
        range += bounding_box.range_sum();
        range *= factor;

        let mut dim: usize = 0;
        let mut new_cut;
        loop {
            let low = if point[dim] < min_values[dim] {
                point[dim]
            } else {
                min_values[dim]
            };
            let high = if point[dim] > max_values[dim] {
                point[dim]
            } else {
                max_values[dim]
            };
            let gap = (high - low).into_f64();
            // rounding can leave a residual; the last dimension absorbs it
            if gap > range || dim == point.len() - 1 {
                let remainder = if range < gap { range } else { gap };
                new_cut = low + F::from_f64(remainder);
                // precision is lost above; keep the cut strictly inside
                if new_cut <= low || new_cut >= high {
                    new_cut = low;
                }
                break;
            }
            range -= gap;
            dim += 1;
        }

        let min_value = min_values[dim];
        let max_value = max_values[dim];
        let separation = (point[dim] <= new_cut && new_cut < min_value)
            || (max_value <= new_cut && new_cut < point[dim]);
        (Cut::new(dim, new_cut), separation)
    }
}
