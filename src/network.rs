//! Scalar value network.
//!
//! [`ValueModel`] is what the evaluation cache and the training loop need
//! from a model: single and batched forward passes, one gradient step on a
//! batch, and byte serialization for checkpoints. [`ValueNetwork`] is a
//! one-hidden-layer perceptron (ReLU hidden, tanh output) trained with Adam.

use bincode::{Decode, Encode};
use rand::Rng;
use thiserror::Error;

use crate::learning::adam::AdamOptimizer;

/// Model-level failures (serialization and shape checks).
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model encode failed: {0}")]
    Encode(String),

    #[error("Model decode failed: {0}")]
    Decode(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: usize, actual: usize },
}

/// Dense row-major `f32` matrix; one row per position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Empty matrix with `cols` columns and room for `rows` rows.
    pub fn with_capacity(rows: usize, cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::with_capacity(rows * cols),
        }
    }

    /// Build from flat row-major data.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, ModelError> {
        if data.len() != rows * cols {
            return Err(ModelError::Shape {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Append one row.
    pub fn push_row(&mut self, row: &[f32]) -> Result<(), ModelError> {
        if row.len() != self.cols {
            return Err(ModelError::Shape {
                expected: self.cols,
                actual: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// What the cache and the training loop need from a scalar model.
///
/// Outputs are White-relative values in `[-1, 1]`.
pub trait ValueModel: Clone + Send + Sync + 'static {
    /// Intermediate values kept from a batched forward pass for backprop.
    type Activations: Send;

    /// Input dimensionality.
    fn num_inputs(&self) -> usize;

    /// Forward one feature vector.
    fn forward_single(&self, input: &[f32]) -> f32;

    /// Forward every row of `inputs`, keeping activations.
    fn forward_batch(&self, inputs: &Matrix) -> (Vec<f32>, Self::Activations);

    /// One gradient step towards `targets` (mean squared error).
    ///
    /// `activations` must come from `forward_batch` on the same `inputs`
    /// with the current weights. Returns the pre-update loss.
    fn train(&mut self, inputs: &Matrix, activations: &Self::Activations, targets: &[f32]) -> f32;

    /// Serialize weights (and optimizer state) for a checkpoint.
    fn to_bytes(&self) -> Result<Vec<u8>, ModelError>;

    /// Inverse of [`ValueModel::to_bytes`].
    fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError>;
}

/// Activations of [`ValueNetwork`]: hidden ReLU outputs and final outputs.
#[derive(Debug, Clone)]
pub struct NetworkActivations {
    hidden: Matrix,
    outputs: Vec<f32>,
}

/// One-hidden-layer value network.
///
/// Parameter layout in `params`:
/// `[w1 (hidden x inputs) | b1 (hidden) | w2 (hidden) | b2 (1)]`
#[derive(Debug, Clone, Encode, Decode)]
pub struct ValueNetwork {
    num_inputs: usize,
    hidden: usize,
    params: Vec<f32>,
    optimizer: AdamOptimizer,
}

impl ValueNetwork {
    /// Randomly initialised network (Glorot uniform weights, zero biases).
    pub fn new<R: Rng + ?Sized>(num_inputs: usize, hidden: usize, learning_rate: f32, rng: &mut R) -> Self {
        let num_params = Self::param_count(num_inputs, hidden);
        let mut params = vec![0.0; num_params];

        let r1 = (6.0 / (num_inputs + hidden) as f32).sqrt();
        for w in &mut params[..hidden * num_inputs] {
            *w = rng.random_range(-r1..r1);
        }
        let r2 = (6.0 / (hidden + 1) as f32).sqrt();
        let w2_start = hidden * num_inputs + hidden;
        for w in &mut params[w2_start..w2_start + hidden] {
            *w = rng.random_range(-r2..r2);
        }

        Self {
            num_inputs,
            hidden,
            params,
            optimizer: AdamOptimizer::new(num_params, learning_rate),
        }
    }

    pub fn param_count(num_inputs: usize, hidden: usize) -> usize {
        hidden * num_inputs + hidden + hidden + 1
    }

    pub fn hidden_units(&self) -> usize {
        self.hidden
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn optimizer(&self) -> &AdamOptimizer {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut AdamOptimizer {
        &mut self.optimizer
    }

    fn split(&self) -> (&[f32], &[f32], &[f32], f32) {
        let (w1, rest) = self.params.split_at(self.hidden * self.num_inputs);
        let (b1, rest) = rest.split_at(self.hidden);
        let (w2, b2) = rest.split_at(self.hidden);
        (w1, b1, w2, b2[0])
    }

    /// Hidden layer into `hidden_out`; returns the tanh output.
    #[inline]
    fn forward_into(&self, input: &[f32], hidden_out: &mut [f32]) -> f32 {
        let (w1, b1, w2, b2) = self.split();
        let mut acc = b2;
        for j in 0..self.hidden {
            let row = &w1[j * self.num_inputs..(j + 1) * self.num_inputs];
            let z: f32 = b1[j] + row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>();
            let a = z.max(0.0);
            hidden_out[j] = a;
            acc += w2[j] * a;
        }
        acc.tanh()
    }
}

impl ValueModel for ValueNetwork {
    type Activations = NetworkActivations;

    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn forward_single(&self, input: &[f32]) -> f32 {
        debug_assert_eq!(input.len(), self.num_inputs);
        let mut hidden = vec![0.0; self.hidden];
        self.forward_into(input, &mut hidden)
    }

    fn forward_batch(&self, inputs: &Matrix) -> (Vec<f32>, NetworkActivations) {
        debug_assert_eq!(inputs.cols(), self.num_inputs);
        let mut hidden = Matrix::zeros(inputs.rows(), self.hidden);
        let outputs: Vec<f32> = (0..inputs.rows())
            .map(|i| self.forward_into(inputs.row(i), hidden.row_mut(i)))
            .collect();
        (
            outputs.clone(),
            NetworkActivations { hidden, outputs },
        )
    }

    fn train(&mut self, inputs: &Matrix, activations: &NetworkActivations, targets: &[f32]) -> f32 {
        let n = inputs.rows();
        debug_assert_eq!(targets.len(), n);
        debug_assert_eq!(activations.outputs.len(), n);
        if n == 0 {
            return 0.0;
        }

        let (w1_len, hidden, num_inputs) = (self.hidden * self.num_inputs, self.hidden, self.num_inputs);
        let b1_off = w1_len;
        let w2_off = b1_off + hidden;
        let b2_off = w2_off + hidden;

        let mut grads = vec![0.0_f32; self.params.len()];
        let mut loss = 0.0_f32;
        let inv_n = 1.0 / n as f32;

        for i in 0..n {
            let y = activations.outputs[i];
            let err = y - targets[i];
            loss += err * err;

            // d(mse)/d(pre-tanh)
            let d_out = 2.0 * err * inv_n * (1.0 - y * y);
            let h = activations.hidden.row(i);
            let x = inputs.row(i);

            grads[b2_off] += d_out;
            for j in 0..hidden {
                grads[w2_off + j] += d_out * h[j];
                if h[j] > 0.0 {
                    let d_hidden = d_out * self.params[w2_off + j];
                    grads[b1_off + j] += d_hidden;
                    let row = &mut grads[j * num_inputs..(j + 1) * num_inputs];
                    for (g, &xv) in row.iter_mut().zip(x) {
                        *g += d_hidden * xv;
                    }
                }
            }
        }

        self.optimizer.step(&mut self.params, &grads);
        loss * inv_n
    }

    fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ModelError::Encode(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let (net, _): (ValueNetwork, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| ModelError::Decode(e.to_string()))?;
        let expected = Self::param_count(net.num_inputs, net.hidden);
        if net.params.len() != expected {
            return Err(ModelError::Shape {
                expected,
                actual: net.params.len(),
            });
        }
        if net.optimizer.num_params() != expected {
            return Err(ModelError::Shape {
                expected,
                actual: net.optimizer.num_params(),
            });
        }
        Ok(net)
    }
}
