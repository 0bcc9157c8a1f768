//! Adam optimizer for the value network.
//!
//! This module implements the Adam optimizer with momentum and adaptive
//! learning rate for stable gradient updates during TD training.
//!
//! # Overview
//!
//! Adam (Adaptive Moment Estimation) maintains two moment estimates:
//! - First moment (m): Exponential moving average of gradients
//! - Second moment (v): Exponential moving average of squared gradients
//!
//! # Memory Layout
//!
//! Moments are flat vectors aligned index-for-index with the network's flat
//! parameter vector, so one call to [`AdamOptimizer::step`] updates every
//! parameter.

use bincode::{Decode, Encode};

/// Default learning rate (alpha)
pub const DEFAULT_ALPHA: f32 = 1e-3;

/// Default first moment decay rate (beta1)
pub const DEFAULT_BETA1: f32 = 0.9;

/// Default second moment decay rate (beta2)
pub const DEFAULT_BETA2: f32 = 0.999;

/// Default epsilon for numerical stability
pub const DEFAULT_EPSILON: f32 = 1e-8;

/// Adam optimizer over a flat parameter vector.
///
/// # Example
///
/// ```
/// use evalforge::learning::adam::AdamOptimizer;
///
/// let mut params = vec![0.5_f32, -0.5];
/// let mut adam = AdamOptimizer::new(params.len(), 0.01);
/// adam.step(&mut params, &[1.0, -1.0]);
/// assert!(params[0] < 0.5);
/// assert!(params[1] > -0.5);
/// ```
#[derive(Debug, Clone, Encode, Decode)]
pub struct AdamOptimizer {
    /// Learning rate
    alpha: f32,
    /// First moment decay rate
    beta1: f32,
    /// Second moment decay rate
    beta2: f32,
    /// Numerical stability term
    epsilon: f32,
    /// Global timestep counter
    t: u64,
    /// First moment vector
    m: Vec<f32>,
    /// Second moment vector
    v: Vec<f32>,
}

impl AdamOptimizer {
    /// Create an optimizer for `num_params` parameters with default betas.
    pub fn new(num_params: usize, alpha: f32) -> Self {
        Self::with_params(num_params, alpha, DEFAULT_BETA1, DEFAULT_BETA2, DEFAULT_EPSILON)
    }

    /// Create optimizer with custom hyperparameters.
    ///
    /// # Arguments
    ///
    /// * `num_params` - Length of the parameter vector
    /// * `alpha` - Learning rate
    /// * `beta1` - First moment decay rate
    /// * `beta2` - Second moment decay rate
    /// * `epsilon` - Numerical stability term
    pub fn with_params(num_params: usize, alpha: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            alpha,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: vec![0.0; num_params],
            v: vec![0.0; num_params],
        }
    }

    /// Apply one descent step to every parameter.
    ///
    /// Computes the bias-corrected update using the Adam algorithm:
    /// 1. m = beta1 * m + (1 - beta1) * g
    /// 2. v = beta2 * v + (1 - beta2) * g^2
    /// 3. m_hat = m / (1 - beta1^t), v_hat = v / (1 - beta2^t)
    /// 4. param -= alpha * m_hat / (sqrt(v_hat) + epsilon)
    ///
    /// # Panics
    ///
    /// Panics in debug builds when `params`, `grads` and the moments differ in
    /// length.
    pub fn step(&mut self, params: &mut [f32], grads: &[f32]) {
        debug_assert_eq!(params.len(), self.m.len());
        debug_assert_eq!(grads.len(), self.m.len());

        self.t += 1;
        let t = self.t as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);

        for (((p, &g), m), v) in params
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= self.alpha * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    /// Number of parameters this optimizer tracks.
    pub fn num_params(&self) -> usize {
        self.m.len()
    }

    /// Get current timestep.
    pub fn timestep(&self) -> u64 {
        self.t
    }

    /// Get learning rate (alpha).
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Set learning rate (alpha).
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha;
    }

    /// Get first moment decay rate (beta1).
    pub fn beta1(&self) -> f32 {
        self.beta1
    }

    /// Get second moment decay rate (beta2).
    pub fn beta2(&self) -> f32 {
        self.beta2
    }

    /// Reset optimizer state.
    ///
    /// Clears all moment values and resets timestep to 0.
    pub fn reset(&mut self) {
        self.t = 0;
        self.m.fill(0.0);
        self.v.fill(0.0);
    }
}
