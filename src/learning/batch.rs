//! Training batch assembly.
//!
//! Concatenates the leaves of every rollout into one row-major matrix.
//! Each rollout keeps its leaves contiguous and in order, which the TD
//! target computation relies on.

use super::rollout::{PositionKind, RolloutRecord};
use crate::network::{Matrix, ModelError};

/// Rows `start..start + len` of the batch belong to one rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloutBlock {
    pub start: usize,
    pub len: usize,
}

impl RolloutBlock {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// Dense batch plus per-row kind and ground-truth score.
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    inputs: Matrix,
    kinds: Vec<PositionKind>,
    scores: Vec<f32>,
    blocks: Vec<RolloutBlock>,
}

impl TrainingBatch {
    /// Pack `records` into one batch.
    ///
    /// Empty records contribute no rows and no block.
    ///
    /// # Errors
    ///
    /// `ModelError::Shape` if a leaf does not have `num_features` entries.
    pub fn assemble(records: &[RolloutRecord], num_features: usize) -> Result<Self, ModelError> {
        let total: usize = records.iter().map(RolloutRecord::len).sum();
        let mut inputs = Matrix::with_capacity(total, num_features);
        let mut kinds = Vec::with_capacity(total);
        let mut scores = Vec::with_capacity(total);
        let mut blocks = Vec::with_capacity(records.len());

        for record in records.iter().filter(|r| !r.is_empty()) {
            blocks.push(RolloutBlock {
                start: inputs.rows(),
                len: record.len(),
            });
            for leaf in record.leaves() {
                inputs.push_row(leaf)?;
            }
            kinds.extend_from_slice(record.kinds());
            scores.extend_from_slice(record.scores());
        }

        Ok(Self {
            inputs,
            kinds,
            scores,
            blocks,
        })
    }

    pub fn inputs(&self) -> &Matrix {
        &self.inputs
    }

    pub fn kinds(&self) -> &[PositionKind] {
        &self.kinds
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn blocks(&self) -> &[RolloutBlock] {
        &self.blocks
    }

    /// Total number of leaves.
    pub fn len(&self) -> usize {
        self.inputs.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.rows() == 0
    }

    pub fn fixed_count(&self) -> usize {
        self.kinds.iter().filter(|&&k| k == PositionKind::Fixed).count()
    }
}
