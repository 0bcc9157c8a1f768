//! Optional material pretraining.
//!
//! Before the first TD iteration the network can be fitted to a plain
//! material evaluation of corpus positions, so rollouts start from a
//! network that already prefers having more discs. Positions whose
//! material score is zero carry no signal and are not sampled.

use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::board::Position;
use crate::evaluator::MaterialEvaluator;
use crate::features::FeatureConverter;
use crate::learning::LearningError;
use crate::network::{Matrix, ValueModel};
use crate::score::unscale;

/// Draw attempts allowed per requested position.
const ATTEMPTS_PER_POSITION: usize = 64;

/// Material pretraining settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of sampled positions.
    pub positions: usize,
    /// Passes over the sampled positions.
    pub epochs: usize,
    /// Rows per gradient step.
    pub minibatch_size: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            positions: 4096,
            epochs: 10,
            minibatch_size: 256,
        }
    }
}

impl BootstrapConfig {
    /// Reject zero-sized settings.
    pub fn validate(&self) -> Result<(), LearningError> {
        if self.positions == 0 || self.epochs == 0 || self.minibatch_size == 0 {
            return Err(LearningError::Config(
                "bootstrap positions, epochs and minibatch_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a bootstrap run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BootstrapStats {
    /// Rows actually sampled (may fall short if the corpus is mostly level).
    pub rows: usize,
    /// Mean minibatch loss of the first epoch.
    pub first_loss: f32,
    /// Mean minibatch loss of the last epoch.
    pub last_loss: f32,
}

/// Fit `model` to the material evaluation of random corpus positions.
///
/// Returns zeroed stats without training when no position with non-zero
/// material is found.
pub fn bootstrap_material<P, F, M, R>(
    model: &mut M,
    features: &F,
    roots: &[P],
    config: &BootstrapConfig,
    rng: &mut R,
) -> Result<BootstrapStats, LearningError>
where
    P: Position,
    F: FeatureConverter<P>,
    M: ValueModel,
    R: Rng + ?Sized,
{
    config.validate()?;
    if roots.is_empty() {
        return Err(LearningError::EmptyCorpus);
    }

    let mut inputs = Matrix::with_capacity(config.positions, features.num_features());
    let mut targets = Vec::with_capacity(config.positions);
    let mut buf = Vec::with_capacity(features.num_features());
    let max_attempts = config.positions.saturating_mul(ATTEMPTS_PER_POSITION);

    for _ in 0..max_attempts {
        if targets.len() == config.positions {
            break;
        }
        let pos = &roots[rng.random_range(0..roots.len())];
        let score = MaterialEvaluator::material_score(pos);
        if score == 0 {
            continue;
        }
        features.convert_into(pos, &mut buf);
        inputs.push_row(&buf)?;
        targets.push(unscale(score));
    }

    if targets.is_empty() {
        warn!("Bootstrap skipped: no corpus position with non-zero material");
        return Ok(BootstrapStats::default());
    }
    if targets.len() < config.positions {
        warn!(
            "Bootstrap sampled {} of {} requested positions",
            targets.len(),
            config.positions
        );
    }

    let mut stats = BootstrapStats {
        rows: targets.len(),
        ..Default::default()
    };

    let cols = inputs.cols();
    for epoch in 0..config.epochs {
        let mut loss_sum = 0.0;
        let mut steps = 0;
        for start in (0..targets.len()).step_by(config.minibatch_size) {
            let end = (start + config.minibatch_size).min(targets.len());
            let block = Matrix::from_vec(
                end - start,
                cols,
                inputs.as_slice()[start * cols..end * cols].to_vec(),
            )?;
            let (_, activations) = model.forward_batch(&block);
            loss_sum += model.train(&block, &activations, &targets[start..end]);
            steps += 1;
        }
        let mean = loss_sum / steps as f32;
        if epoch == 0 {
            stats.first_loss = mean;
        }
        stats.last_loss = mean;
    }

    info!(
        "Bootstrap on {} positions: loss {:.5} -> {:.5}",
        stats.rows, stats.first_loss, stats.last_loss
    );
    Ok(stats)
}
