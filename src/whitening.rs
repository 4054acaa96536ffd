use itertools::Itertools;
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use ndarray_linalg::{Eigh, Lapack, Norm, Scalar, UPLO};
use num_traits::{Float, ToPrimitive, Zero};

use crate::math::{conjugate_transpose, covariance};
use crate::{Error, Result};

/// Which decorrelating rotation to use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// Project onto the principal axes and rescale them: `Λ^{-1/2} Vᵀ`
    Pca,
    /// Rotate the rescaled principal axes back to the original frame: `V Λ^{-1/2} Vᵀ`
    ///
    /// Of all whitening matrices this one keeps the output closest to the input.
    Zca,
}

/// A whitening transform estimated from data
///
/// Applying the transform to data with covariance `Σ` yields data with identity covariance.
#[derive(Clone, Debug)]
pub struct Whitening<E: Scalar> {
    method: Method,
    eigenvalues: Array1<E::Real>,
    eigenvectors: Array2<E>,
    matrix: Array2<E>,
}

impl<E: Scalar + Lapack> Whitening<E> {
    /// Estimate the whitening matrix of `x`, where rows are variables and columns observations
    ///
    /// # Errors
    /// - [`Error::InvalidSignal`] if `x` has fewer than two observations
    /// - [`Error::NotPositiveDefinite`] if a covariance eigenvalue vanishes relative to the largest,
    /// in which case some direction carries no variance and cannot be rescaled
    pub fn fit<S: Data<Elem = E>>(x: &ArrayBase<S, Ix2>, method: Method) -> Result<Self> {
        let covariance = covariance(x)?;
        let (eigenvalues, eigenvectors) = covariance.eigh(UPLO::Lower)?;

        // Eigenvalues come back in ascending order
        let largest = eigenvalues
            .iter()
            .last()
            .copied()
            .unwrap_or_else(<E::Real as Zero>::zero);
        let tolerance = largest * Float::sqrt(<E::Real as Float>::epsilon());
        if let Some((index, value)) = eigenvalues
            .iter()
            .find_position(|value| **value <= tolerance)
        {
            return Err(Error::NotPositiveDefinite {
                index,
                value: value.to_f64().unwrap_or(f64::NAN),
            });
        }

        let scaling = Array2::from_diag(
            &eigenvalues.mapv(|value| E::from_real(Float::recip(Float::sqrt(value)))),
        );
        let projection = scaling.dot(&conjugate_transpose(&eigenvectors));
        let matrix = match method {
            Method::Pca => projection,
            Method::Zca => eigenvectors.dot(&projection),
        };
        debug!(
            "{method:?} whitening of {} variables, eigenvalues {eigenvalues}",
            x.nrows()
        );

        Ok(Self {
            method,
            eigenvalues,
            eigenvectors,
            matrix,
        })
    }

    /// Apply the whitening matrix to `x`
    ///
    /// The data is not re-centred, so `x` keeps whatever mean it had after rotation and scaling.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `x` does not have one row per fitted variable.
    pub fn transform<S: Data<Elem = E>>(&self, x: &ArrayBase<S, Ix2>) -> Result<Array2<E>> {
        if x.nrows() != self.matrix.ncols() {
            return Err(Error::ShapeMismatch(format!(
                "whitening fitted on {} variables, data has {}",
                self.matrix.ncols(),
                x.nrows()
            )));
        }
        Ok(self.matrix.dot(x))
    }

    /// Frobenius distance between `x` and its whitened version, a measure of how much the
    /// transform moves the data
    ///
    /// # Errors
    /// See [`Whitening::transform`].
    pub fn displacement<S: Data<Elem = E>>(&self, x: &ArrayBase<S, Ix2>) -> Result<f64> {
        let whitened = self.transform(x)?;
        Ok((&whitened - x).norm_l2().to_f64().unwrap_or(f64::NAN))
    }
}

impl<E: Scalar> Whitening<E> {
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Covariance eigenvalues in ascending order
    pub const fn eigenvalues(&self) -> &Array1<E::Real> {
        &self.eigenvalues
    }

    /// Covariance eigenvectors, one per column, matching [`Whitening::eigenvalues`]
    pub const fn eigenvectors(&self) -> &Array2<E> {
        &self.eigenvectors
    }

    pub const fn matrix(&self) -> &Array2<E> {
        &self.matrix
    }
}
