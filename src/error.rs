use ndarray_linalg::error::LinalgError;
use thiserror::Error;

/// Errors raised while building signals or removing EOG artifacts
#[derive(Error, Debug)]
pub enum Error {
    /// Channel counts, sample counts or transform dimensions do not line up
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// The calibration EOG cross-product cannot be inverted
    #[error("singular regression: calibration EOG cross-product has reciprocal condition number {reciprocal_condition:e}")]
    SingularRegression { reciprocal_condition: f64 },
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
    #[error("invalid bipolar transform: {0}")]
    InvalidTransform(String),
    #[error("covariance is not positive definite: eigenvalue {value:e} at index {index}")]
    NotPositiveDefinite { index: usize, value: f64 },
    #[error(transparent)]
    Linalg(#[from] LinalgError),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}
