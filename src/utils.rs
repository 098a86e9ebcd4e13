use num_traits::PrimInt;

use crate::errors::PoolgenError::EmptyProduct;
use crate::errors::Result;

/// Product of all values. An empty slice is an error rather than 1, so a
/// misconfigured dimension group surfaces instead of dispatching one workgroup.
pub fn array_product<T: PrimInt>(vals: &[T]) -> Result<T> {
    if vals.is_empty() {
        return Err(EmptyProduct);
    }
    Ok(vals.iter().fold(T::one(), |acc, v| acc * *v))
}

pub fn ceil_div<T: PrimInt>(num: T, den: T) -> T {
    (num + den - T::one()) / den
}

/// Row-major strides: the last dimension has stride 1.
pub fn shape_to_strides(shape: &[i64]) -> Vec<i64> {
    let mut res = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        res[i] = res[i + 1] * shape[i + 1];
    }
    res
}

pub fn flat_index(coords: &[i64], shape: &[i64]) -> i64 {
    shape_to_strides(shape)
        .iter()
        .zip(coords)
        .map(|(s, c)| s * c)
        .sum()
}

#[cfg(test)]
pub fn vec_close(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
}
