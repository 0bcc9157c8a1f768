//! TD(lambda) target computation over rollout blocks.
//!
//! # Algorithm
//!
//! For each rollout block, walk the leaves in order. For leaf `i`:
//!
//! - FIXED: the target is its stored ground-truth score.
//! - EVAL: the target starts at the leaf's fresh prediction and accumulates
//!   `lambda^(k-i) * (value[k] - value[k-1])` for every later leaf `k` in the
//!   same rollout, where `value[j]` is the ground truth for a FIXED leaf and
//!   the fresh prediction otherwise. `value[i]` is leaf `i`'s prediction.
//!
//! `lambda = 0` leaves the prediction unchanged; `lambda = 1` telescopes to
//! the value of the final leaf.
//!
//! Predictions are recomputed before every optimization pass, so targets
//! move with the weights.

use super::batch::TrainingBatch;
use super::rollout::PositionKind;

/// Compute one target per batch row.
///
/// `predictions` must have one entry per row of `batch`.
pub fn compute_targets(batch: &TrainingBatch, predictions: &[f32], lambda: f32) -> Vec<f32> {
    debug_assert_eq!(predictions.len(), batch.len());

    let kinds = batch.kinds();
    let scores = batch.scores();
    let value = |row: usize| match kinds[row] {
        PositionKind::Fixed => scores[row],
        PositionKind::Eval => predictions[row],
    };

    let mut targets = vec![0.0; batch.len()];
    for block in batch.blocks() {
        let rows = block.range();
        for i in rows.clone() {
            targets[i] = match kinds[i] {
                PositionKind::Fixed => scores[i],
                PositionKind::Eval => {
                    let mut target = predictions[i];
                    let mut prev = target;
                    let mut discount = lambda;
                    for k in i + 1..rows.end {
                        let v = value(k);
                        target += discount * (v - prev);
                        prev = v;
                        discount *= lambda;
                    }
                    target
                }
            };
        }
    }
    targets
}
