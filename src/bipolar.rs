use ndarray::{arr2, Array2, ArrayBase, Data, Ix2};
use ndarray_linalg::Scalar;

use crate::{Error, Result};

/// A fixed linear map from raw EOG electrodes to bipolar derivations
///
/// The matrix is (derivations x raw EOG channels): each row combines the raw channels into one
/// derivation, usually as the difference of two electrodes.
#[derive(Clone, Debug, PartialEq)]
pub struct BipolarTransform<E> {
    matrix: Array2<E>,
}

impl<E: Scalar> BipolarTransform<E> {
    /// Wrap an arbitrary transform matrix
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransform`] if the matrix has no rows or no columns.
    pub fn new(matrix: Array2<E>) -> Result<Self> {
        if matrix.is_empty() {
            return Err(Error::InvalidTransform(format!(
                "transform matrix must be non-empty, found shape {:?}",
                matrix.dim()
            )));
        }
        Ok(Self { matrix })
    }

    /// Build a transform from `(positive, negative)` electrode pairs
    ///
    /// Derivation `i` is raw channel `pairs[i].0` minus raw channel `pairs[i].1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use eog_regression::BipolarTransform;
    /// use ndarray::arr2;
    ///
    /// let transform = BipolarTransform::<f64>::from_pairs(3, &[(0, 1), (2, 1)]).unwrap();
    /// assert_eq!(transform.matrix(), &arr2(&[[1., -1., 0.], [0., -1., 1.]]));
    /// ```
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransform`] if `pairs` is empty, or if a pair references a channel
    /// outside `0..raw_channels` or uses the same channel twice.
    pub fn from_pairs(raw_channels: usize, pairs: &[(usize, usize)]) -> Result<Self> {
        if pairs.is_empty() {
            return Err(Error::InvalidTransform("no bipolar pairs given".into()));
        }
        let mut matrix = Array2::zeros((pairs.len(), raw_channels));
        for (ii, &(positive, negative)) in pairs.iter().enumerate() {
            if positive >= raw_channels || negative >= raw_channels {
                return Err(Error::InvalidTransform(format!(
                    "pair ({positive}, {negative}) references a channel outside 0..{raw_channels}"
                )));
            }
            if positive == negative {
                return Err(Error::InvalidTransform(format!(
                    "pair ({positive}, {negative}) subtracts a channel from itself"
                )));
            }
            matrix[[ii, positive]] = E::one();
            matrix[[ii, negative]] = -E::one();
        }
        Self::new(matrix)
    }

    /// The standard three-electrode layout: left minus centre, and right minus centre
    pub fn three_electrode() -> Self {
        let one = E::one();
        let zero = E::zero();
        Self {
            matrix: arr2(&[[one, -one, zero], [zero, -one, one]]),
        }
    }

    pub const fn matrix(&self) -> &Array2<E> {
        &self.matrix
    }

    /// Number of raw EOG channels the transform expects
    pub fn n_inputs(&self) -> usize {
        self.matrix.ncols()
    }

    /// Number of bipolar derivations produced
    pub fn n_outputs(&self) -> usize {
        self.matrix.nrows()
    }

    /// Map raw EOG channels (raw channels x samples) to bipolar derivations (derivations x samples)
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `raw` does not have [`Self::n_inputs`] rows.
    pub fn apply<S: Data<Elem = E>>(&self, raw: &ArrayBase<S, Ix2>) -> Result<Array2<E>> {
        if raw.nrows() != self.n_inputs() {
            return Err(Error::ShapeMismatch(format!(
                "bipolar transform expects {} EOG channels, found {}",
                self.n_inputs(),
                raw.nrows()
            )));
        }
        Ok(self.matrix.dot(raw))
    }
}
