use std::cmp::Ordering;

use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use ndarray_linalg::{Eigh, Lapack, Norm, Scalar, UPLO};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;

use crate::{Error, Result};

/// Draw `num_samples` observations from a multivariate normal distribution
///
/// The result is (variables x samples). Samples are `mean + F z`, with `z` standard normal and
/// `F = V Λ^{1/2}` built from the eigendecomposition of `covariance`, so positive semi-definite
/// covariances are accepted. The draw is fully determined by the state of `rng`.
///
/// # Errors
/// - [`Error::ShapeMismatch`] if `covariance` is not square with one row per entry of `mean`
/// - [`Error::NotPositiveDefinite`] if `covariance` has a clearly negative eigenvalue
pub fn multivariate_normal<R: Rng + ?Sized>(
    mean: &Array1<f64>,
    covariance: &Array2<f64>,
    num_samples: usize,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let dimension = mean.len();
    if covariance.dim() != (dimension, dimension) {
        return Err(Error::ShapeMismatch(format!(
            "covariance has shape {:?} for a mean of length {dimension}",
            covariance.dim()
        )));
    }

    let (eigenvalues, eigenvectors) = covariance.eigh(UPLO::Lower)?;
    let largest = eigenvalues.iter().copied().fold(0.0, f64::max);
    let tolerance = largest * f64::EPSILON.sqrt();
    if let Some((index, value)) = eigenvalues
        .iter()
        .find_position(|value| **value < -tolerance)
    {
        return Err(Error::NotPositiveDefinite {
            index,
            value: *value,
        });
    }
    let factor = eigenvectors * &eigenvalues.mapv(|value| value.max(0.0).sqrt());

    let z: Array2<f64> = Array2::random_using((dimension, num_samples), StandardNormal, rng);
    Ok(factor.dot(&z) + &mean.view().insert_axis(Axis(1)))
}

/// Indices of the `count` columns of `x` with the largest Euclidean norm
///
/// Indices are ordered by increasing norm, so the most extreme sample comes last. All columns are
/// returned when `count` exceeds their number.
pub fn extreme_samples<E, S>(x: &ArrayBase<S, Ix2>, count: usize) -> Vec<usize>
where
    E: Scalar + Lapack,
    S: Data<Elem = E>,
{
    let ordered = x
        .columns()
        .into_iter()
        .map(|column| column.norm_l2())
        .enumerate()
        .sorted_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .map(|(index, _)| index)
        .collect::<Vec<_>>();

    let skip = ordered.len().saturating_sub(count);
    ordered.into_iter().skip(skip).collect()
}
