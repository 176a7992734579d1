//! Kalman state and update equations shared by all motion models
//!
//! The motion models are mildly nonlinear, so prediction takes the already
//! propagated mean together with the transition Jacobian evaluated at the
//! current state (extended Kalman filter form):
//!
//! - x_pred = f(x)
//! - P_pred = F * P * F^T + Q
//!
//! Correction is the standard linear update in Joseph form:
//!
//! - y = z - H * x (innovation)
//! - S = H * P * H^T + R (innovation covariance)
//! - K = P * H^T * S^{-1} (Kalman gain)
//! - x_upd = x + K * y
//! - P_upd = (I - K*H) * P * (I - K*H)^T + K * R * K^T
//!
//! Covariances are re-symmetrized after every step so they stay positive
//! semi-definite under floating-point drift.

use nalgebra::{SMatrix, SVector};

use crate::{Result, TrackError};

/// Mean and covariance of one motion-model state.
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState<const N: usize> {
    /// State estimate mean
    pub mean: SVector<f64, N>,
    /// State estimate covariance
    pub covariance: SMatrix<f64, N, N>,
}

impl<const N: usize> KalmanState<N> {
    /// Creates a state from mean and covariance.
    #[inline]
    pub fn new(mean: SVector<f64, N>, covariance: SMatrix<f64, N, N>) -> Self {
        Self { mean, covariance }
    }

    /// Sum of variances; grows with prediction, shrinks with correction.
    #[inline]
    pub fn uncertainty(&self) -> f64 {
        self.covariance.trace()
    }

    /// True when mean and covariance contain only finite values and every
    /// variance is non-negative.
    pub fn is_healthy(&self) -> bool {
        self.mean.iter().all(|v| v.is_finite())
            && self.covariance.iter().all(|v| v.is_finite())
            && (0..N).all(|i| self.covariance[(i, i)] >= 0.0)
    }

    /// Applies one prediction step.
    ///
    /// # Arguments
    /// - `predicted_mean`: f(x), the mean already propagated by the model
    /// - `jacobian`: F, the transition Jacobian evaluated at the current mean
    /// - `process_noise`: Q for this time step
    pub fn predict_with(
        &mut self,
        predicted_mean: SVector<f64, N>,
        jacobian: &SMatrix<f64, N, N>,
        process_noise: &SMatrix<f64, N, N>,
    ) {
        self.mean = predicted_mean;
        self.covariance = jacobian * self.covariance * jacobian.transpose() + process_noise;
        symmetrize(&mut self.covariance);
    }

    /// Applies one correction step in Joseph form.
    ///
    /// # Errors
    /// [`TrackError::SingularInnovation`] when S cannot be inverted,
    /// [`TrackError::NumericalInstability`] when the updated state would not
    /// be finite; the state is left untouched in either case.
    pub fn correct<const M: usize>(
        &mut self,
        measurement: &SVector<f64, M>,
        observation: &SMatrix<f64, M, N>,
        measurement_noise: &SMatrix<f64, M, M>,
    ) -> Result<()> {
        let innovation = measurement - observation * self.mean;
        let innovation_cov =
            observation * self.covariance * observation.transpose() + measurement_noise;
        let s_inv = innovation_cov
            .try_inverse()
            .ok_or(TrackError::SingularInnovation)?;
        let gain = self.covariance * observation.transpose() * s_inv;

        let updated_mean = self.mean + gain * innovation;

        let identity = SMatrix::<f64, N, N>::identity();
        let ikh = identity - gain * observation;
        let mut updated_cov = ikh * self.covariance * ikh.transpose()
            + gain * measurement_noise * gain.transpose();
        symmetrize(&mut updated_cov);

        if !updated_mean.iter().all(|v| v.is_finite())
            || !updated_cov.iter().all(|v| v.is_finite())
        {
            return Err(TrackError::NumericalInstability);
        }

        self.mean = updated_mean;
        self.covariance = updated_cov;
        Ok(())
    }

    /// Squared Mahalanobis distance of a measurement from the predicted one.
    ///
    /// # Returns
    /// `None` when the innovation covariance is singular.
    pub fn mahalanobis_squared<const M: usize>(
        &self,
        measurement: &SVector<f64, M>,
        observation: &SMatrix<f64, M, N>,
        measurement_noise: &SMatrix<f64, M, M>,
    ) -> Option<f64> {
        let innovation = measurement - observation * self.mean;
        let innovation_cov =
            observation * self.covariance * observation.transpose() + measurement_noise;
        let s_inv = innovation_cov.try_inverse()?;
        Some((innovation.transpose() * s_inv * innovation)[(0, 0)])
    }
}

/// Forces exact symmetry: P = (P + P^T) / 2.
#[inline]
pub fn symmetrize<const N: usize>(matrix: &mut SMatrix<f64, N, N>) {
    *matrix = (*matrix + matrix.transpose()) * 0.5;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{matrix, vector};

    fn cv_state() -> KalmanState<4> {
        // [x, y, vx, vy] at the origin moving +x at 10 m/s
        KalmanState::new(
            vector![0.0, 0.0, 10.0, 0.0],
            SMatrix::<f64, 4, 4>::identity(),
        )
    }

    fn cv_predict(state: &mut KalmanState<4>, dt: f64) {
        let f = matrix![
            1.0, 0.0, dt, 0.0;
            0.0, 1.0, 0.0, dt;
            0.0, 0.0, 1.0, 0.0;
            0.0, 0.0, 0.0, 1.0
        ];
        let q = SMatrix::<f64, 4, 4>::identity() * (0.1 * dt * dt);
        let next = f * state.mean;
        state.predict_with(next, &f, &q);
    }

    #[test]
    fn test_predict_advances_mean_and_grows_covariance() {
        let mut state = cv_state();
        let before = state.uncertainty();
        cv_predict(&mut state, 1.0);
        assert_relative_eq!(state.mean[0], 10.0, epsilon = 1e-10);
        assert_relative_eq!(state.mean[2], 10.0, epsilon = 1e-10);
        assert!(state.uncertainty() > before);
    }

    #[test]
    fn test_correct_moves_toward_measurement_and_shrinks_covariance() {
        let mut state = cv_state();
        cv_predict(&mut state, 1.0);
        let before = state.uncertainty();

        let h = matrix![
            1.0, 0.0, 0.0, 0.0;
            0.0, 1.0, 0.0, 0.0
        ];
        let r = SMatrix::<f64, 2, 2>::identity() * 0.5;
        state.correct(&vector![11.0, 0.5], &h, &r).unwrap();

        assert!(state.mean[0] > 10.0 && state.mean[0] < 11.0);
        assert!(state.mean[1] > 0.0 && state.mean[1] < 0.5);
        assert!(state.uncertainty() < before);
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let mut state = cv_state();
        let h = matrix![
            1.0, 0.0, 0.0, 0.0;
            0.0, 1.0, 0.0, 0.0
        ];
        let r = matrix![0.25, 0.05; 0.05, 0.16];
        for step in 0..25 {
            cv_predict(&mut state, 0.1);
            state
                .correct(&vector![step as f64, 0.1 * step as f64], &h, &r)
                .unwrap();
        }
        let p = state.covariance;
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(p[(i, j)], p[(j, i)], epsilon = 1e-12);
            }
            assert!(p[(i, i)] > 0.0);
        }
        assert!(state.is_healthy());
    }

    #[test]
    fn test_singular_innovation_is_rejected_without_mutation() {
        let mut state = cv_state();
        state.covariance = SMatrix::zeros();
        let before = state.clone();
        let h = matrix![
            1.0, 0.0, 0.0, 0.0;
            0.0, 1.0, 0.0, 0.0
        ];
        let r = SMatrix::<f64, 2, 2>::zeros();
        let err = state.correct(&vector![1.0, 1.0], &h, &r);
        assert_eq!(err, Err(TrackError::SingularInnovation));
        assert_eq!(state, before);
    }

    #[test]
    fn test_non_finite_update_is_rejected_without_mutation() {
        let mut state = cv_state();
        let before = state.clone();
        let h = matrix![
            1.0, 0.0, 0.0, 0.0;
            0.0, 1.0, 0.0, 0.0
        ];
        let r = SMatrix::<f64, 2, 2>::identity() * 0.5;
        let err = state.correct(&vector![f64::NAN, 0.0], &h, &r);
        assert_eq!(err, Err(TrackError::NumericalInstability));
        assert_eq!(state, before);
    }

    #[test]
    fn test_mahalanobis_grows_with_distance() {
        let state = cv_state();
        let h = matrix![
            1.0, 0.0, 0.0, 0.0;
            0.0, 1.0, 0.0, 0.0
        ];
        let r = SMatrix::<f64, 2, 2>::identity();
        let near = state
            .mahalanobis_squared(&vector![0.5, 0.0], &h, &r)
            .unwrap();
        let far = state
            .mahalanobis_squared(&vector![5.0, 0.0], &h, &r)
            .unwrap();
        assert!(near < far);
        assert_relative_eq!(near, 0.125, epsilon = 1e-12); // 0.5^2 / (1 + 1)
    }
}
