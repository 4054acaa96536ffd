use log::{debug, info, warn};
use ndarray::Array2;
use ndarray_linalg::{FactorizeC, Lapack, ReciprocalConditionNum, Scalar, SolveC, UPLO};
use num_traits::ToPrimitive;

use crate::bipolar::BipolarTransform;
use crate::config::Config;
use crate::math::{conjugate_transpose, cross_product, relative_residual};
use crate::signal::MultichannelSignal;
use crate::{Error, Result};

/// Smallest reciprocal condition number of the EOG cross-product accepted by default
pub const DEFAULT_MIN_RECIPROCAL_CONDITION: f64 = 1e-12;

/// Linear map from bipolar EOG derivations to their contribution in each EEG channel
///
/// The matrix is (derivations x EEG channels). Column `j` holds the weights with which each
/// derivation leaks into EEG channel `j`.
#[derive(Clone, Debug, PartialEq)]
pub struct RegressionCoefficients<E> {
    matrix: Array2<E>,
    /// Reciprocal condition number of the calibration cross-product `G`
    reciprocal_condition: f64,
}

impl<E: Scalar + Lapack> RegressionCoefficients<E> {
    /// Estimate the coefficients from a calibration recording
    ///
    /// With `X` the bipolar derivations of the calibration EOG and `Y` the calibration EEG, this
    /// solves `G · B = C` where `G = X Xᴴ` and `C = X Yᴴ`. `G` is Cholesky factorised and each
    /// EEG channel is solved against the factor, no explicit inverse is formed. The conditioning
    /// of `G` is estimated in the 1-norm from its LU factorisation.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if the calibration has no EEG channels, or the transform does
    /// not accept its EOG channels
    /// - [`Error::SingularRegression`] if `G` is not positive definite, or its reciprocal
    /// condition number is below `min_reciprocal_condition`
    pub fn fit(
        calibration: &MultichannelSignal<E>,
        transform: &BipolarTransform<E>,
        min_reciprocal_condition: f64,
    ) -> Result<Self> {
        if calibration.n_eeg() == 0 {
            return Err(Error::ShapeMismatch(
                "calibration recording has no EEG channels".into(),
            ));
        }
        let bipolar = transform.apply(&calibration.eog())?;
        let eeg = calibration.eeg();

        if calibration.n_samples() < 10 * transform.n_outputs() {
            warn!(
                "calibration has only {} samples for {} bipolar derivations, regression may be poorly conditioned",
                calibration.n_samples(),
                transform.n_outputs()
            );
        }

        let gram = cross_product(&bipolar, &bipolar)?;
        let cross = cross_product(&bipolar, &eeg)?;

        let factor = gram.factorizec(UPLO::Lower).map_err(|e| {
            debug!("Cholesky factorisation of the EOG cross-product failed: {e}");
            Error::SingularRegression {
                reciprocal_condition: 0.0,
            }
        })?;
        let reciprocal_condition = gram
            .rcond()
            .map_err(|e| {
                debug!("condition estimate of the EOG cross-product failed: {e}");
                Error::SingularRegression {
                    reciprocal_condition: 0.0,
                }
            })?
            .to_f64()
            .unwrap_or(f64::NAN);
        if reciprocal_condition.is_nan() || reciprocal_condition < min_reciprocal_condition {
            return Err(Error::SingularRegression {
                reciprocal_condition,
            });
        }

        let mut matrix = Array2::zeros(cross.raw_dim());
        for (mut column, rhs) in matrix.columns_mut().into_iter().zip(cross.columns()) {
            column.assign(&factor.solvec(&rhs)?);
        }

        debug!(
            "fitted {:?} regression, reciprocal condition {reciprocal_condition:e}, relative residual {:e}",
            matrix.dim(),
            relative_residual(&gram, &matrix, &cross)?
        );

        Ok(Self {
            matrix,
            reciprocal_condition,
        })
    }

    /// Subtract the EOG contamination predicted by these coefficients from `target`
    ///
    /// The contamination is `Bᴴ · X`, with `X` the bipolar derivations of the target EOG. Only the
    /// EEG rows of the returned signal differ from `target`.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `target` or `transform` do not match the dimensions
    /// the coefficients were estimated with.
    pub fn correct(
        &self,
        target: &MultichannelSignal<E>,
        transform: &BipolarTransform<E>,
    ) -> Result<MultichannelSignal<E>> {
        if transform.n_outputs() != self.matrix.nrows() {
            return Err(Error::ShapeMismatch(format!(
                "coefficients expect {} bipolar derivations, transform produces {}",
                self.matrix.nrows(),
                transform.n_outputs()
            )));
        }
        if target.n_eeg() != self.matrix.ncols() {
            return Err(Error::ShapeMismatch(format!(
                "coefficients expect {} EEG channels, target has {}",
                self.matrix.ncols(),
                target.n_eeg()
            )));
        }
        let bipolar = transform.apply(&target.eog())?;
        let contamination = conjugate_transpose(&self.matrix).dot(&bipolar);

        target.with_eeg(&(&target.eeg() - &contamination))
    }
}

impl<E> RegressionCoefficients<E> {
    pub const fn matrix(&self) -> &Array2<E> {
        &self.matrix
    }

    pub const fn reciprocal_condition(&self) -> f64 {
        self.reciprocal_condition
    }
}

/// Removes EOG artifacts using a fixed bipolar transform and conditioning threshold
#[derive(Clone, Debug)]
pub struct ArtifactRemover<E> {
    transform: BipolarTransform<E>,
    min_reciprocal_condition: f64,
}

impl<E: Scalar + Lapack> ArtifactRemover<E> {
    pub const fn new(transform: BipolarTransform<E>) -> Self {
        Self {
            transform,
            min_reciprocal_condition: DEFAULT_MIN_RECIPROCAL_CONDITION,
        }
    }

    #[must_use]
    pub fn with_min_reciprocal_condition(self, min_reciprocal_condition: f64) -> Self {
        Self {
            min_reciprocal_condition,
            ..self
        }
    }

    /// Build a remover from the bipolar pairs and threshold in `config`
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransform`] if the configured pairs are invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.bipolar_transform()?)
            .with_min_reciprocal_condition(config.min_reciprocal_condition))
    }

    pub const fn transform(&self) -> &BipolarTransform<E> {
        &self.transform
    }

    pub const fn min_reciprocal_condition(&self) -> f64 {
        self.min_reciprocal_condition
    }

    /// Estimate regression coefficients from `calibration`
    ///
    /// # Errors
    /// See [`RegressionCoefficients::fit`].
    pub fn fit(&self, calibration: &MultichannelSignal<E>) -> Result<RegressionCoefficients<E>> {
        RegressionCoefficients::fit(calibration, &self.transform, self.min_reciprocal_condition)
    }

    /// Estimate the regression on `calibration` and correct `target` with it
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if the two recordings differ in channel layout or sampling
    /// rate, or the transform does not fit their EOG group
    /// - [`Error::SingularRegression`] if the calibration EOG is degenerate
    pub fn remove(
        &self,
        calibration: &MultichannelSignal<E>,
        target: &MultichannelSignal<E>,
    ) -> Result<MultichannelSignal<E>> {
        if !calibration.has_same_layout(target) {
            return Err(Error::ShapeMismatch(format!(
                "calibration has {} EEG and {} EOG channels, target has {} EEG and {} EOG channels in a different layout",
                calibration.n_eeg(),
                calibration.n_eog(),
                target.n_eeg(),
                target.n_eog()
            )));
        }
        let (calibration_rate, target_rate) = (calibration.sampling_rate(), target.sampling_rate());
        if (calibration_rate - target_rate).abs() > f64::EPSILON * calibration_rate.max(target_rate)
        {
            return Err(Error::ShapeMismatch(format!(
                "calibration sampled at {calibration_rate} Hz, target at {target_rate} Hz"
            )));
        }
        if calibration.n_eog() != self.transform.n_inputs() {
            return Err(Error::ShapeMismatch(format!(
                "bipolar transform expects {} EOG channels, recordings have {}",
                self.transform.n_inputs(),
                calibration.n_eog()
            )));
        }

        let coefficients = self.fit(calibration)?;
        info!(
            "estimated EOG regression from {} calibration samples, correcting {} target samples",
            calibration.n_samples(),
            target.n_samples()
        );
        coefficients.correct(target, &self.transform)
    }
}

/// Remove EOG artifacts from `target` using a regression estimated on `calibration`
///
/// Both recordings must share the same channel layout. The default conditioning threshold
/// [`DEFAULT_MIN_RECIPROCAL_CONDITION`] is used.
///
/// # Errors
/// See [`ArtifactRemover::remove`].
pub fn remove_eog_artifacts<E: Scalar + Lapack>(
    calibration: &MultichannelSignal<E>,
    target: &MultichannelSignal<E>,
    transform: &BipolarTransform<E>,
) -> Result<MultichannelSignal<E>> {
    ArtifactRemover::new(transform.clone()).remove(calibration, target)
}

#[cfg(test)]
mod tests {
    use ndarray::{s, Array2};
    use ndarray_linalg::Norm;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use proptest::prelude::*;
    use rand_isaac::Isaac64Rng;

    use super::{remove_eog_artifacts, RegressionCoefficients, DEFAULT_MIN_RECIPROCAL_CONDITION};
    use crate::math::{cross_product, relative_residual};
    use crate::{BipolarTransform, ChannelKind, Error, MultichannelSignal, Result};

    /// A recording whose EEG is `brain_amplitude` uniform noise plus `coefficientsᵀ` applied to
    /// the three-electrode bipolar derivations of random EOG
    fn contaminated_recording(
        rng: &mut Isaac64Rng,
        coefficients: &Array2<f64>,
        num_samples: usize,
        brain_amplitude: f64,
    ) -> Result<MultichannelSignal<f64>> {
        let transform = BipolarTransform::three_electrode();
        let eog = Array2::random_using((3, num_samples), Uniform::new(-50., 50.), rng);
        let brain = Array2::random_using(
            (coefficients.ncols(), num_samples),
            Uniform::new(-1., 1.),
            rng,
        ) * brain_amplitude;
        let eeg = brain + coefficients.t().dot(&transform.apply(&eog)?);
        MultichannelSignal::from_groups(&eeg, &eog, 250.)
    }

    fn random_coefficients(rng: &mut Isaac64Rng, num_eeg: usize) -> Array2<f64> {
        Array2::random_using((2, num_eeg), Uniform::new(-0.5, 0.5), rng)
    }

    #[test]
    fn coefficients_are_recovered_from_noise_free_calibration() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let expected = random_coefficients(&mut rng, 8);
        let calibration = contaminated_recording(&mut rng, &expected, 400, 0.)?;

        let fitted = RegressionCoefficients::fit(
            &calibration,
            &BipolarTransform::three_electrode(),
            DEFAULT_MIN_RECIPROCAL_CONDITION,
        )?;

        for (expected, calculated) in expected.iter().zip(fitted.matrix()) {
            approx::assert_abs_diff_eq!(expected, calculated, epsilon = 1e-10);
        }
        assert!(fitted.reciprocal_condition() > DEFAULT_MIN_RECIPROCAL_CONDITION);
        Ok(())
    }

    #[test]
    fn coefficients_solve_the_normal_equations() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let coefficients = random_coefficients(&mut rng, 22);
        let calibration = contaminated_recording(&mut rng, &coefficients, 1000, 10.)?;
        let transform = BipolarTransform::three_electrode();

        let fitted =
            RegressionCoefficients::fit(&calibration, &transform, DEFAULT_MIN_RECIPROCAL_CONDITION)?;

        let bipolar = transform.apply(&calibration.eog())?;
        let gram = cross_product(&bipolar, &bipolar)?;
        let cross = cross_product(&bipolar, &calibration.eeg())?;
        assert!(relative_residual(&gram, fitted.matrix(), &cross)? < 1e-8);
        Ok(())
    }

    #[test]
    fn flat_calibration_eog_is_a_singular_regression() -> Result<()> {
        let eeg = Array2::from_shape_fn((4, 200), |(ii, jj)| (ii * jj) as f64);
        let eog = Array2::zeros((3, 200));
        let calibration = MultichannelSignal::from_groups(&eeg, &eog, 250.)?;

        let result = RegressionCoefficients::fit(
            &calibration,
            &BipolarTransform::three_electrode(),
            DEFAULT_MIN_RECIPROCAL_CONDITION,
        );

        assert!(matches!(result, Err(Error::SingularRegression { .. })));
        Ok(())
    }

    #[test]
    fn collinear_derivations_are_a_singular_regression() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let eeg = Array2::random_using((4, 300), Uniform::new(-1., 1.), &mut rng);
        let eog = Array2::random_using((3, 300), Uniform::new(-1., 1.), &mut rng);
        let calibration = MultichannelSignal::from_groups(&eeg, &eog, 250.)?;
        // Both derivations are the same electrode difference
        let transform = BipolarTransform::from_pairs(3, &[(0, 1), (0, 1)])?;

        let result =
            RegressionCoefficients::fit(&calibration, &transform, DEFAULT_MIN_RECIPROCAL_CONDITION);

        assert!(matches!(result, Err(Error::SingularRegression { .. })));
        Ok(())
    }

    #[test]
    fn nearly_collinear_derivations_are_a_singular_regression() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let eeg = Array2::random_using((4, 500), Uniform::new(-1., 1.), &mut rng);
        let mut eog = Array2::random_using((3, 500), Uniform::new(-50., 50.), &mut rng);
        // The right electrode mirrors the left one up to a vanishing perturbation
        let jitter = Array2::random_using((1, 500), Uniform::new(-1e-9, 1e-9), &mut rng);
        let left = eog.slice(s![0..1, ..]).to_owned();
        eog.slice_mut(s![2..3, ..]).assign(&(left + jitter));
        let calibration = MultichannelSignal::from_groups(&eeg, &eog, 250.)?;

        let result = RegressionCoefficients::fit(
            &calibration,
            &BipolarTransform::three_electrode(),
            DEFAULT_MIN_RECIPROCAL_CONDITION,
        );

        assert!(matches!(result, Err(Error::SingularRegression { .. })));
        Ok(())
    }

    #[test]
    fn well_conditioned_calibration_reports_its_condition() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let coefficients = random_coefficients(&mut rng, 4);
        let calibration = contaminated_recording(&mut rng, &coefficients, 500, 1.)?;

        let fitted = RegressionCoefficients::fit(
            &calibration,
            &BipolarTransform::three_electrode(),
            DEFAULT_MIN_RECIPROCAL_CONDITION,
        )?;

        assert!(fitted.reciprocal_condition() > 1e-3);
        assert!(fitted.reciprocal_condition() <= 1.0);

        // No matrix has a reciprocal condition number above one
        let strict = RegressionCoefficients::fit(
            &calibration,
            &BipolarTransform::three_electrode(),
            1.5,
        );
        assert!(matches!(strict, Err(Error::SingularRegression { .. })));
        Ok(())
    }

    #[test]
    fn calibration_without_eeg_is_a_shape_mismatch() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let eog = Array2::random_using((3, 300), Uniform::new(-50., 50.), &mut rng);
        let calibration = MultichannelSignal::new(eog, vec![ChannelKind::Eog; 3], 250.)?;

        let result = RegressionCoefficients::fit(
            &calibration,
            &BipolarTransform::three_electrode(),
            DEFAULT_MIN_RECIPROCAL_CONDITION,
        );

        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
        Ok(())
    }

    #[test]
    fn corrected_signal_keeps_target_layout_and_eog() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let coefficients = random_coefficients(&mut rng, 6);
        let calibration = contaminated_recording(&mut rng, &coefficients, 600, 5.)?;
        let target = contaminated_recording(&mut rng, &coefficients, 250, 5.)?;

        let corrected =
            remove_eog_artifacts(&calibration, &target, &BipolarTransform::three_electrode())?;

        assert_eq!(corrected.data().dim(), target.data().dim());
        assert_eq!(corrected.kinds(), target.kinds());
        assert_eq!(corrected.eog(), target.eog());
        assert!(corrected.eeg() != target.eeg());
        Ok(())
    }

    #[test]
    fn correction_removes_most_of_the_contamination() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let coefficients = random_coefficients(&mut rng, 10);
        let calibration = contaminated_recording(&mut rng, &coefficients, 2000, 1.)?;
        let target = contaminated_recording(&mut rng, &coefficients, 500, 0.)?;

        let corrected =
            remove_eog_artifacts(&calibration, &target, &BipolarTransform::three_electrode())?;

        // The target carries no brain signal, so anything left over is residual contamination
        assert!(corrected.eeg().norm_l2() < 0.05 * target.eeg().norm_l2());
        Ok(())
    }

    #[test]
    fn refitting_a_corrected_calibration_gives_vanishing_coefficients() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let coefficients = random_coefficients(&mut rng, 12);
        let calibration = contaminated_recording(&mut rng, &coefficients, 1000, 3.)?;
        let transform = BipolarTransform::three_electrode();

        let first =
            RegressionCoefficients::fit(&calibration, &transform, DEFAULT_MIN_RECIPROCAL_CONDITION)?;
        let cleaned = first.correct(&calibration, &transform)?;
        let second =
            RegressionCoefficients::fit(&cleaned, &transform, DEFAULT_MIN_RECIPROCAL_CONDITION)?;

        assert!(second.matrix().norm_l2() < 1e-8 * first.matrix().norm_l2());
        Ok(())
    }

    #[test]
    fn mismatched_layouts_are_rejected() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let five_channels = random_coefficients(&mut rng, 5);
        let four_channels = random_coefficients(&mut rng, 4);
        let calibration = contaminated_recording(&mut rng, &five_channels, 300, 1.)?;
        let target = contaminated_recording(&mut rng, &four_channels, 300, 1.)?;
        let transform = BipolarTransform::three_electrode();

        assert!(matches!(
            remove_eog_artifacts(&calibration, &target, &transform),
            Err(Error::ShapeMismatch(_))
        ));

        let resampled = MultichannelSignal::new(
            calibration.data().clone(),
            calibration.kinds().to_vec(),
            500.,
        )?;
        assert!(matches!(
            remove_eog_artifacts(&calibration, &resampled, &transform),
            Err(Error::ShapeMismatch(_))
        ));

        let four_electrodes = BipolarTransform::from_pairs(4, &[(0, 1), (2, 3)])?;
        assert!(matches!(
            remove_eog_artifacts(&calibration, &calibration, &four_electrodes),
            Err(Error::ShapeMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn coefficients_reject_targets_with_other_eeg_counts() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let coefficients = random_coefficients(&mut rng, 5);
        let calibration = contaminated_recording(&mut rng, &coefficients, 300, 1.)?;
        let transform = BipolarTransform::three_electrode();
        let fitted =
            RegressionCoefficients::fit(&calibration, &transform, DEFAULT_MIN_RECIPROCAL_CONDITION)?;

        let eog_only = MultichannelSignal::new(
            calibration.eog(),
            vec![ChannelKind::Eog; 3],
            calibration.sampling_rate(),
        )?;
        assert!(matches!(
            fitted.correct(&eog_only, &transform),
            Err(Error::ShapeMismatch(_))
        ));
        Ok(())
    }

    proptest! {
        #[test]
        fn correction_is_deterministic_and_preserves_eog(seed in 0..1000u64, num_eeg in 1..16usize) {
            let mut rng = Isaac64Rng::seed_from_u64(seed);
            let coefficients = random_coefficients(&mut rng, num_eeg);
            let calibration = contaminated_recording(&mut rng, &coefficients, 200, 2.).unwrap();
            let target = contaminated_recording(&mut rng, &coefficients, 120, 2.).unwrap();
            let transform = BipolarTransform::three_electrode();

            let first = remove_eog_artifacts(&calibration, &target, &transform).unwrap();
            let second = remove_eog_artifacts(&calibration, &target, &transform).unwrap();

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.eog(), target.eog());
            prop_assert_eq!(first.data().dim(), target.data().dim());
        }
    }
}
