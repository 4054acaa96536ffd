use ndarray::{concatenate, Array2, Axis};
use ndarray_linalg::Scalar;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The role of a single recorded channel
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Electroencephalography, the signal of interest
    Eeg,
    /// Electrooculography, the eye-movement reference
    Eog,
}

/// A (channels x samples) recording split into EEG and EOG channel groups
///
/// Each row of `data` carries the [`ChannelKind`] at the same position in `kinds`. The groups keep
/// the order in which their rows appear in `data`.
#[derive(Clone, Debug, PartialEq)]
pub struct MultichannelSignal<E> {
    data: Array2<E>,
    kinds: Vec<ChannelKind>,
    /// Sampling rate in Hz
    sampling_rate: f64,
}

impl<E: Scalar> MultichannelSignal<E> {
    /// Create a signal from raw data and per-row channel kinds
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if `kinds` does not have one entry per row of `data`
    /// - [`Error::InvalidSignal`] if `sampling_rate` is not a positive, finite number
    pub fn new(data: Array2<E>, kinds: Vec<ChannelKind>, sampling_rate: f64) -> Result<Self> {
        if kinds.len() != data.nrows() {
            return Err(Error::ShapeMismatch(format!(
                "{} channel kinds given for {} rows of data",
                kinds.len(),
                data.nrows()
            )));
        }
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(Error::InvalidSignal(format!(
                "sampling rate must be positive, found {sampling_rate}"
            )));
        }
        Ok(Self {
            data,
            kinds,
            sampling_rate,
        })
    }

    /// Stack an EEG group on top of an EOG group
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the two groups have different sample counts.
    pub fn from_groups(eeg: &Array2<E>, eog: &Array2<E>, sampling_rate: f64) -> Result<Self> {
        if eeg.ncols() != eog.ncols() {
            return Err(Error::ShapeMismatch(format!(
                "EEG group has {} samples but EOG group has {}",
                eeg.ncols(),
                eog.ncols()
            )));
        }
        let data = concatenate(Axis(0), &[eeg.view(), eog.view()])?;
        let kinds = std::iter::repeat(ChannelKind::Eeg)
            .take(eeg.nrows())
            .chain(std::iter::repeat(ChannelKind::Eog).take(eog.nrows()))
            .collect();
        Self::new(data, kinds, sampling_rate)
    }

    pub const fn data(&self) -> &Array2<E> {
        &self.data
    }

    pub fn kinds(&self) -> &[ChannelKind] {
        &self.kinds
    }

    pub const fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Recording length in seconds
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        self.n_samples() as f64 / self.sampling_rate
    }

    fn indices_of(&self, kind: ChannelKind) -> Vec<usize> {
        self.kinds
            .iter()
            .enumerate()
            .filter_map(|(ii, k)| (*k == kind).then_some(ii))
            .collect()
    }

    /// Row indices of the EEG channels, in recording order
    pub fn eeg_indices(&self) -> Vec<usize> {
        self.indices_of(ChannelKind::Eeg)
    }

    /// Row indices of the EOG channels, in recording order
    pub fn eog_indices(&self) -> Vec<usize> {
        self.indices_of(ChannelKind::Eog)
    }

    pub fn n_eeg(&self) -> usize {
        self.kinds.iter().filter(|k| **k == ChannelKind::Eeg).count()
    }

    pub fn n_eog(&self) -> usize {
        self.kinds.iter().filter(|k| **k == ChannelKind::Eog).count()
    }

    /// A copy of the EEG group (EEG channels x samples)
    pub fn eeg(&self) -> Array2<E> {
        self.data.select(Axis(0), &self.eeg_indices())
    }

    /// A copy of the EOG group (EOG channels x samples)
    pub fn eog(&self) -> Array2<E> {
        self.data.select(Axis(0), &self.eog_indices())
    }

    /// Whether `other` assigns the same kind to every channel, in the same order
    pub fn has_same_layout(&self, other: &Self) -> bool {
        self.kinds == other.kinds
    }

    /// A new signal whose EEG rows are replaced by `eeg`. EOG rows are carried over untouched.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `eeg` is not (EEG channels x samples).
    pub fn with_eeg(&self, eeg: &Array2<E>) -> Result<Self> {
        let indices = self.eeg_indices();
        if eeg.dim() != (indices.len(), self.n_samples()) {
            return Err(Error::ShapeMismatch(format!(
                "replacement EEG has shape {:?}, expected {:?}",
                eeg.dim(),
                (indices.len(), self.n_samples())
            )));
        }
        let mut data = self.data.clone();
        for (row, index) in eeg.rows().into_iter().zip(indices) {
            data.row_mut(index).assign(&row);
        }
        Ok(Self {
            data,
            kinds: self.kinds.clone(),
            sampling_rate: self.sampling_rate,
        })
    }

    /// Multiply every sample by `factor`, for example `1e-6` to convert microvolts to volts
    #[must_use]
    pub fn scaled(&self, factor: E) -> Self {
        Self {
            data: self.data.mapv(|v| v * factor),
            kinds: self.kinds.clone(),
            sampling_rate: self.sampling_rate,
        }
    }

    /// Re-reference the EEG group to its common average
    ///
    /// At every sample the mean over all EEG channels is subtracted from each EEG channel. EOG
    /// channels do not contribute to, and are not changed by, the reference.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSignal`] if the signal has no EEG channels.
    pub fn average_referenced(&self) -> Result<Self> {
        let eeg = self.eeg();
        let reference = eeg
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::InvalidSignal("no EEG channels to average".into()))?;
        self.with_eeg(&(&eeg - &reference))
    }
}
