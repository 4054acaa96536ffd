use ndarray::{Array2, ArrayBase, Axis, Data, Ix2};
use ndarray_linalg::{Lapack, Norm, Scalar};
use num_traits::{Float, ToPrimitive};

use crate::{Error, Result};

/// The conjugate transpose of `a`. For real matrices this is the ordinary transpose.
pub fn conjugate_transpose<E: Scalar, S: Data<Elem = E>>(a: &ArrayBase<S, Ix2>) -> Array2<E> {
    a.t().mapv(|x| x.conj())
}

/// Compute the cross-product matrix `a · bᴴ` of two signals sharing a time axis
///
/// Both operands are (channels x samples). The result is (rows of `a` x rows of `b`).
///
/// # Examples
///
/// ```
/// use eog_regression::math::cross_product;
/// use ndarray::arr2;
///
/// let a = arr2(&[[1., 2., 3.]]);
/// let b = arr2(&[[1., 0., 1.], [0., 1., 0.]]);
/// let product = cross_product(&a, &b).unwrap();
///
/// assert_eq!(product, arr2(&[[4., 2.]]));
/// ```
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] when the operands have different sample counts.
pub fn cross_product<E, S, T>(a: &ArrayBase<S, Ix2>, b: &ArrayBase<T, Ix2>) -> Result<Array2<E>>
where
    E: Scalar,
    S: Data<Elem = E>,
    T: Data<Elem = E>,
{
    if a.ncols() != b.ncols() {
        return Err(Error::ShapeMismatch(format!(
            "cross product operands have {} and {} samples",
            a.ncols(),
            b.ncols()
        )));
    }
    Ok(a.dot(&conjugate_transpose(b)))
}

/// Sample covariance of `x`, where each row is a variable and each column an observation
///
/// Rows are centred on their mean and the cross product is normalised by `n - 1`.
///
/// # Errors
/// Returns [`Error::InvalidSignal`] when fewer than two observations are available.
pub fn covariance<E: Scalar, S: Data<Elem = E>>(x: &ArrayBase<S, Ix2>) -> Result<Array2<E>> {
    let observations = x.ncols();
    if observations < 2 {
        return Err(Error::InvalidSignal(format!(
            "covariance needs at least two observations, found {observations}"
        )));
    }
    let mean = x
        .mean_axis(Axis(1))
        .ok_or_else(|| Error::InvalidSignal("covariance of an empty signal".into()))?;
    let centred = x - &mean.insert_axis(Axis(1));
    let normalisation = E::from_real(E::real(observations - 1));

    Ok(cross_product(&centred, &centred)?.mapv(|v| v / normalisation))
}

/// Pearson correlation coefficients between the rows of `x`
///
/// # Errors
/// Propagates errors from [`covariance`].
pub fn correlation<E: Scalar, S: Data<Elem = E>>(x: &ArrayBase<S, Ix2>) -> Result<Array2<E>> {
    let covariance = covariance(x)?;
    let variances = covariance.diag().mapv(|v| v.re());

    Ok(Array2::from_shape_fn(covariance.raw_dim(), |(ii, jj)| {
        covariance[[ii, jj]] / E::from_real(Float::sqrt(variances[ii] * variances[jj]))
    }))
}

/// Frobenius residual of the linear system `a · x = b`, relative to the size of its operands
///
/// Returns `‖a·x − b‖ / (‖a‖‖x‖ + ‖b‖)`, or zero when every operand vanishes.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] when the operand dimensions are incompatible.
pub fn relative_residual<E, S, T, U>(
    a: &ArrayBase<S, Ix2>,
    x: &ArrayBase<T, Ix2>,
    b: &ArrayBase<U, Ix2>,
) -> Result<f64>
where
    E: Scalar + Lapack,
    S: Data<Elem = E>,
    T: Data<Elem = E>,
    U: Data<Elem = E>,
{
    if a.ncols() != x.nrows() || a.nrows() != b.nrows() || x.ncols() != b.ncols() {
        return Err(Error::ShapeMismatch(format!(
            "cannot compare {:?} · {:?} against {:?}",
            a.dim(),
            x.dim(),
            b.dim()
        )));
    }
    let residual = (&a.dot(x) - b).norm_l2();
    let scale = a.norm_l2() * x.norm_l2() + b.norm_l2();

    let residual = residual.to_f64().unwrap_or(f64::NAN);
    let scale = scale.to_f64().unwrap_or(f64::NAN);
    if scale == 0.0 {
        return Ok(residual);
    }
    Ok(residual / scale)
}
