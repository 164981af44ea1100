use crate::errors::ForestError;
use crate::types::{Result, StoreFloat};

/// If the test condition is false, return an InvalidConfiguration error with
/// the given message. Otherwise return Ok.
pub(crate) fn check_argument(test: bool, msg: &'static str) -> Result<()> {
    if test {
        Ok(())
    } else {
        Err(ForestError::InvalidConfiguration { msg })
    }
}

pub(crate) fn check_dimensions(test: bool, msg: &'static str) -> Result<()> {
    if test {
        Ok(())
    } else {
        Err(ForestError::DimensionMismatch { msg })
    }
}

pub(crate) fn check_index(test: bool, msg: &'static str) -> Result<()> {
    if test {
        Ok(())
    } else {
        Err(ForestError::InvalidIndex { msg })
    }
}

pub(crate) fn check_state(test: bool, msg: &'static str) -> Result<()> {
    if test {
        Ok(())
    } else {
        Err(ForestError::IllegalState { msg })
    }
}

pub(crate) fn maxf32(a: f32, b: f32) -> f32 {
    if a > b {
        a
    } else {
        b
    }
}

pub(crate) fn minf32(a: f32, b: f32) -> f32 {
    if a < b {
        a
    } else {
        b
    }
}

pub(crate) fn maxf64(a: f64, b: f64) -> f64 {
    if a > b {
        a
    } else {
        b
    }
}

pub(crate) fn minf64(a: f64, b: f64) -> f64 {
    if a < b {
        a
    } else {
        b
    }
}

// fold helpers used by the ensemble traversals

pub(crate) fn add_to(a: &f64, b: &mut f64) {
    *b += *a;
}

pub(crate) fn divide(a: &mut f64, b: usize) {
    *a /= b as f64;
}

pub(crate) fn add_nbr(a: &(f64, usize, f64), b: &mut Vec<(f64, usize, f64)>) {
    if a.1 != usize::MAX {
        b.push(*a);
    }
}

pub(crate) fn nbr_finish(_a: &mut Vec<(f64, usize, f64)>, _b: usize) {}

pub fn l1distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| ((x - y) as f64).abs())
        .sum()
}

pub fn l2distance(a: &[f32], b: &[f32]) -> f64 {
    f64::sqrt(
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) as f64 * (x - y) as f64)
            .sum(),
    )
}

pub fn linfinitydistance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| ((x - y) as f64).abs())
        .fold(0.0, maxf64)
}

/// l1 distance over the storage precision, used inside tree traversals
pub(crate) fn l1<F: StoreFloat>(a: &[F], b: &[F]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x.into_f64() - y.into_f64()).abs())
        .sum()
}
