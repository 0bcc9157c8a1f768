//! TD(lambda) self-play training for the value network.
//!
//! Each training iteration runs four phases:
//!
//! 1. **Rollouts**: parallel workers play short self-play rollouts from
//!    random corpus positions, each with a private evaluator snapshot,
//!    transposition table, search heuristics and random stream.
//! 2. **Batch assembly**: rollout leaves are packed into one matrix with
//!    each rollout kept as a contiguous block.
//! 3. **Optimization**: repeated passes of forward, TD(lambda) target
//!    computation and one gradient step on the canonical network.
//! 4. **Checkpoint**: the network is written to disk every
//!    `checkpoint_interval` iterations.
//!
//! # Architecture
//!
//! ```text
//! TrainingEngine
//!     |-- RandomContext (seeds worker streams)
//!     |-- rollout workers (rayon scope, mpsc results)
//!     |       |-- EvalCache snapshot
//!     |       |-- TranspositionTable
//!     |       |-- SearchHeuristics
//!     |-- TrainingBatch + compute_targets (sequential)
//!     |-- CheckpointManager
//!     |-- TrainingLogger
//! ```
//!
//! # Example
//!
//! ```ignore
//! use evalforge::learning::{TrainingConfig, TrainingEngine};
//!
//! let config = TrainingConfig::default();
//! let mut engine = TrainingEngine::othello("corpus.txt", config)?;
//! let stats = engine.train()?;
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::network::ModelError;

// Submodules
pub mod adam;
pub mod batch;
pub mod bootstrap;
pub mod checkpoint;
pub mod corpus;
pub mod error_handler;
pub mod logger;
pub mod random;
pub mod rollout;
pub mod td_targets;
pub mod training_engine;

// Re-export public types
pub use adam::AdamOptimizer;
pub use batch::{RolloutBlock, TrainingBatch};
pub use bootstrap::{BootstrapConfig, BootstrapStats, bootstrap_material};
pub use checkpoint::{CHECKPOINT_MAGIC, CHECKPOINT_VERSION, CheckpointManager, CheckpointMeta};
pub use corpus::load_corpus;
pub use error_handler::{load_latest_valid, save_checkpoint_with_retry};
pub use logger::{IterationSummary, TrainingLogger};
pub use random::RandomContext;
pub use rollout::{PositionKind, RolloutRecord, RolloutSettings, RolloutWorker, classify_leaf, split_quota};
pub use td_targets::compute_targets;
pub use training_engine::{IterationStats, TrainingConfig, TrainingEngine, TrainingStats};

/// Learning system error type
///
/// # Recovery Strategies
///
/// | Variant | Recovery |
/// |---------|----------|
/// | `Io` | Retry once for checkpoint saves; log and continue for logging |
/// | `CorpusOpen` | Abort before training starts |
/// | `MalformedCorpus` | Abort before training starts |
/// | `EmptyCorpus` | Abort before training starts |
/// | `InvalidCheckpoint` | Report error, allow fresh start |
/// | `Model` | Abort |
/// | `Config` | Report configuration issue, abort |
/// | `Interrupted` | Save checkpoint, exit gracefully |
#[derive(Error, Debug)]
pub enum LearningError {
    /// I/O errors (file, checkpoint)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The corpus file could not be opened.
    #[error("Cannot open corpus {path}: {source}")]
    CorpusOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A corpus line is empty or does not parse as a position.
    #[error("Malformed corpus line {line}: {reason}")]
    MalformedCorpus { line: usize, reason: String },

    /// The corpus file contains no positions.
    #[error("Corpus contains no positions")]
    EmptyCorpus,

    /// Checkpoint corruption or version mismatch
    ///
    /// Occurs when loading a checkpoint with:
    /// - Invalid magic header
    /// - Version mismatch
    /// - CRC mismatch, truncated or corrupted data
    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// Model serialization or shape error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Configuration error
    ///
    /// Occurs when configuration values are invalid:
    /// - Invalid hyperparameters (lambda, learning rate)
    /// - Zero-sized quotas or tables
    /// - Unparseable configuration file
    #[error("Configuration error: {0}")]
    Config(String),

    /// Training interrupted (SIGINT/SIGTERM)
    ///
    /// Observed between iterations only. The engine saves a checkpoint
    /// before returning it.
    #[error("Training interrupted")]
    Interrupted,
}
