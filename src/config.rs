use std::fs;
use std::path::Path;

use log::debug;
use ndarray::Array2;
use ndarray_linalg::Scalar;
use serde::{Deserialize, Serialize};

use crate::bipolar::BipolarTransform;
use crate::regression::DEFAULT_MIN_RECIPROCAL_CONDITION;
use crate::signal::{ChannelKind, MultichannelSignal};
use crate::{Error, Result};

const fn default_min_reciprocal_condition() -> f64 {
    DEFAULT_MIN_RECIPROCAL_CONDITION
}

const fn default_scale() -> f64 {
    1.0
}

/// Recording layout and regression settings, usually read from a TOML file
///
/// ```toml
/// sampling_rate = 250.0
/// eeg_channels = 22
/// eog_channels = 3
/// bipolar_pairs = [[0, 1], [2, 1]]
/// scale = 1e-6
/// ```
///
/// Rows of a recording are expected to hold the EEG channels first, followed by the EOG channels.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    pub eeg_channels: usize,
    pub eog_channels: usize,
    /// `(positive, negative)` raw EOG channel indices of each bipolar derivation
    pub bipolar_pairs: Vec<(usize, usize)>,
    #[serde(default = "default_min_reciprocal_condition")]
    pub min_reciprocal_condition: f64,
    /// Factor applied to raw samples on load, for example `1e-6` for data stored in microvolts
    #[serde(default = "default_scale")]
    pub scale: f64,
}

impl Default for Config {
    /// 22 EEG and 3 EOG channels at 250 Hz, with left and right EOG referenced to the central
    /// electrode. Samples are left unscaled, set `scale = 1e-6` for data stored in microvolts.
    fn default() -> Self {
        Self {
            sampling_rate: 250.0,
            eeg_channels: 22,
            eog_channels: 3,
            bipolar_pairs: vec![(0, 1), (2, 1)],
            min_reciprocal_condition: DEFAULT_MIN_RECIPROCAL_CONDITION,
            scale: default_scale(),
        }
    }
}

impl Config {
    /// Read and validate a configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML for a [`Config`] or fails
    /// [`Config::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("reading configuration from {path:?}");
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a configuration
    ///
    /// # Errors
    /// Returns an error if `contents` is not valid TOML for a [`Config`] or fails
    /// [`Config::validate`].
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the layout is usable for regression
    ///
    /// # Errors
    /// - [`Error::InvalidSignal`] for an empty channel group, or a sampling rate, scale or
    /// threshold that is not a finite positive number
    /// - [`Error::InvalidTransform`] if the bipolar pairs do not fit the EOG channels
    pub fn validate(&self) -> Result<()> {
        if self.eeg_channels == 0 || self.eog_channels == 0 {
            return Err(Error::InvalidSignal(format!(
                "need at least one EEG and one EOG channel, found {} and {}",
                self.eeg_channels, self.eog_channels
            )));
        }
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return Err(Error::InvalidSignal(format!(
                "sampling rate must be positive, found {}",
                self.sampling_rate
            )));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(Error::InvalidSignal(format!(
                "scale must be positive, found {}",
                self.scale
            )));
        }
        if !(self.min_reciprocal_condition.is_finite() && self.min_reciprocal_condition >= 0.0) {
            return Err(Error::InvalidSignal(format!(
                "minimum reciprocal condition must be non-negative, found {}",
                self.min_reciprocal_condition
            )));
        }
        self.bipolar_transform::<f64>().map(|_| ())
    }

    /// EEG kinds followed by EOG kinds
    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        let mut kinds = vec![ChannelKind::Eeg; self.eeg_channels];
        kinds.extend(std::iter::repeat(ChannelKind::Eog).take(self.eog_channels));
        kinds
    }

    /// # Errors
    /// Returns [`Error::InvalidTransform`] if the pairs reference channels outside the EOG group.
    pub fn bipolar_transform<E: Scalar>(&self) -> Result<BipolarTransform<E>> {
        BipolarTransform::from_pairs(self.eog_channels, &self.bipolar_pairs)
    }

    /// Wrap raw (channels x samples) data in this layout, applying [`Config::scale`]
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `data` does not have one row per configured channel.
    pub fn signal<E: Scalar>(&self, data: Array2<E>) -> Result<MultichannelSignal<E>> {
        let signal = MultichannelSignal::new(data, self.channel_kinds(), self.sampling_rate)?;
        Ok(signal.scaled(E::from_real(E::real(self.scale))))
    }
}
