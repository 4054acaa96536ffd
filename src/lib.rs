#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

extern crate blas_src;

pub mod bipolar;
pub mod config;
pub mod error;
pub mod math;
pub mod regression;
pub mod sampling;
pub mod signal;
pub mod whitening;

pub use bipolar::BipolarTransform;
pub use config::Config;
pub use error::Error;
pub use regression::{remove_eog_artifacts, ArtifactRemover, RegressionCoefficients};
pub use signal::{ChannelKind, MultichannelSignal};

pub type Result<T> = ::std::result::Result<T, Error>;
