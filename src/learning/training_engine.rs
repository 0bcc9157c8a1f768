//! Training engine for TD(lambda) self-play learning.
//!
//! This module drives the iteration loop: parallel rollout generation,
//! sequential batch assembly and optimization, periodic checkpoints and
//! graceful shutdown.
//!
//! # Architecture
//!
//! ```text
//! TrainingEngine
//!     |-- rayon ThreadPool (num_workers rollout workers per iteration)
//!     |-- EvalCache (canonical network, snapshotted per worker)
//!     |-- RandomContext (per-iteration, per-worker streams)
//!     |-- CheckpointManager (every checkpoint_interval iterations)
//!     |-- TrainingLogger (iteration/checkpoint logs)
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use log::{info, warn};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::board::{BitBoard, Position};
use crate::evaluator::EvalCache;
use crate::features::{FeatureConverter, OthelloFeatures};
use crate::learning::LearningError;
use crate::learning::batch::TrainingBatch;
use crate::learning::bootstrap::{BootstrapConfig, BootstrapStats, bootstrap_material};
use crate::learning::checkpoint::CheckpointManager;
use crate::learning::corpus::load_corpus;
use crate::learning::error_handler::{load_latest_valid, save_checkpoint_with_retry};
use crate::learning::logger::{IterationSummary, TrainingLogger};
use crate::learning::random::RandomContext;
use crate::learning::rollout::{RolloutRecord, RolloutSettings, RolloutWorker, split_quota};
use crate::learning::td_targets::compute_targets;
use crate::network::{ValueModel, ValueNetwork};
use crate::tt::NodeBudget;

/// Result type for signal handler setup
type SignalHandlerResult = Result<Arc<AtomicBool>, String>;

/// Global interrupt flag shared by all TrainingEngine instances.
/// The signal handler can only be registered once per process.
static GLOBAL_INTERRUPTED: OnceLock<SignalHandlerResult> = OnceLock::new();

/// Setup the global signal handler.
///
/// Safe to call multiple times. Every call returns the same flag, which is
/// set to true when SIGINT/SIGTERM is received.
fn setup_signal_handler() -> Result<Arc<AtomicBool>, LearningError> {
    let result = GLOBAL_INTERRUPTED.get_or_init(|| {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);

        ctrlc::set_handler(move || {
            flag_clone.store(true, Ordering::SeqCst);
        })
        .map(|_| flag)
        .map_err(|e| format!("Failed to set signal handler: {}", e))
    });

    match result {
        Ok(flag) => Ok(Arc::clone(flag)),
        Err(e) => Err(LearningError::Config(e.clone())),
    }
}

fn default_num_workers() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Training configuration.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of iterations to run (iteration indices `0..iterations`).
    pub iterations: u64,
    /// Rollouts generated per iteration, split across workers.
    pub rollouts_per_iteration: usize,
    /// Maximum half-moves searched per rollout.
    pub max_rollout_half_moves: usize,
    /// Node budget of every search.
    pub search_node_budget: NodeBudget,
    /// TD decay parameter in `[0, 1]`.
    pub td_lambda: f32,
    /// Forward/target/gradient rounds per iteration.
    pub optimization_passes: usize,
    /// Iterations between checkpoints (iteration 0 included).
    pub checkpoint_interval: u64,
    /// Parallel rollout workers.
    pub num_workers: usize,
    /// Transposition table size of each worker, in bytes.
    pub tt_size_bytes: usize,
    /// Evaluation cache size of each snapshot, in bytes.
    pub eval_cache_bytes: usize,
    /// Hidden layer width of a freshly created network.
    pub hidden_units: usize,
    /// Adam step size of a freshly created network.
    pub learning_rate: f32,
    /// Master seed. `None` draws one from OS entropy.
    pub seed: Option<u64>,
    /// Checkpoint output directory.
    pub checkpoint_dir: PathBuf,
    /// Log output directory.
    pub log_dir: PathBuf,
    /// Gzip checkpoint payloads.
    pub compress_checkpoints: bool,
    /// Delay before the single checkpoint retry, in milliseconds.
    pub checkpoint_retry_delay_ms: u64,
    /// Material pretraining before iteration 0. Disabled when `None`.
    pub bootstrap: Option<BootstrapConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            iterations: 100_000,
            rollouts_per_iteration: 256,
            max_rollout_half_moves: 12,
            search_node_budget: 256,
            td_lambda: 0.7,
            optimization_passes: 10,
            checkpoint_interval: 10,
            num_workers: default_num_workers(),
            tt_size_bytes: 1 << 20,
            eval_cache_bytes: 1 << 20,
            hidden_units: 32,
            learning_rate: 1e-3,
            seed: None,
            checkpoint_dir: PathBuf::from("trainingResults"),
            log_dir: PathBuf::from("logs"),
            compress_checkpoints: true,
            checkpoint_retry_delay_ms: 1000,
            bootstrap: None,
        }
    }
}

impl TrainingConfig {
    /// Load a configuration from a JSON file and validate it.
    ///
    /// # Errors
    ///
    /// - `LearningError::Io` if the file cannot be read
    /// - `LearningError::Config` if it does not parse or fails validation
    pub fn from_json_file<Q: AsRef<Path>>(path: Q) -> Result<Self, LearningError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| LearningError::Config(format!("Cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), LearningError> {
        let positive = [
            ("rollouts_per_iteration", self.rollouts_per_iteration),
            ("max_rollout_half_moves", self.max_rollout_half_moves),
            ("optimization_passes", self.optimization_passes),
            ("num_workers", self.num_workers),
            ("tt_size_bytes", self.tt_size_bytes),
            ("eval_cache_bytes", self.eval_cache_bytes),
            ("hidden_units", self.hidden_units),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(LearningError::Config(format!("{} must be > 0", name)));
        }
        if self.search_node_budget <= 0 {
            return Err(LearningError::Config("search_node_budget must be > 0".to_string()));
        }
        if self.checkpoint_interval == 0 {
            return Err(LearningError::Config("checkpoint_interval must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.td_lambda) {
            return Err(LearningError::Config(format!(
                "td_lambda must be in [0, 1], got {}",
                self.td_lambda
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(LearningError::Config(format!(
                "learning_rate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }
        if let Some(bootstrap) = &self.bootstrap {
            bootstrap.validate()?;
        }
        Ok(())
    }

    fn rollout_settings(&self) -> RolloutSettings {
        RolloutSettings {
            max_half_moves: self.max_rollout_half_moves,
            node_budget: self.search_node_budget,
        }
    }
}

/// Outcome of one iteration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IterationStats {
    /// Counts, losses and phase timings.
    pub summary: IterationSummary,
    /// Checkpoint written by this iteration, if any.
    pub checkpoint: Option<PathBuf>,
}

/// Training statistics summary.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingStats {
    /// Iterations completed in this session.
    pub iterations_completed: u64,
    /// Index of the last completed iteration.
    pub last_iteration: Option<u64>,
    /// Rollouts generated in this session.
    pub total_rollouts: usize,
    /// Leaves trained on in this session.
    pub total_leaves: usize,
    /// Loss of the last optimization pass of the last iteration.
    pub last_loss: f32,
    /// Checkpoints written in this session.
    pub checkpoints_written: usize,
    /// Bootstrap outcome, when it ran.
    pub bootstrap: Option<BootstrapStats>,
    /// Total elapsed time in seconds.
    pub elapsed_secs: f64,
}

impl TrainingStats {
    fn record(&mut self, stats: &IterationStats) {
        self.iterations_completed += 1;
        self.last_iteration = Some(stats.summary.iteration);
        self.total_rollouts += stats.summary.rollouts;
        self.total_leaves += stats.summary.leaves;
        self.last_loss = stats.summary.last_loss;
        if stats.checkpoint.is_some() {
            self.checkpoints_written += 1;
        }
    }
}

/// Main training engine.
///
/// Owns the canonical network (inside an [`EvalCache`]) and the corpus.
/// Workers only ever see snapshots; weights change only between rollout
/// phases.
pub struct TrainingEngine<P: Position, F, M> {
    /// Corpus positions rollouts start from.
    roots: Vec<P>,
    /// Canonical evaluator.
    evaluator: EvalCache<P, F, M>,
    /// Training configuration.
    config: TrainingConfig,
    /// Per-run random streams.
    random: RandomContext,
    /// Rollout worker pool.
    pool: rayon::ThreadPool,
    /// Checkpoint manager.
    checkpoint_mgr: CheckpointManager,
    /// Training logger.
    logger: TrainingLogger,
    /// Next iteration index to run.
    next_iteration: u64,
    /// Training start time.
    start_time: Instant,
    /// Interrupt flag (shared globally via Arc).
    interrupted: Arc<AtomicBool>,
}

impl TrainingEngine<BitBoard, OthelloFeatures, ValueNetwork> {
    /// Load an Othello corpus and build a fresh network for it.
    ///
    /// # Errors
    ///
    /// - `LearningError::CorpusOpen`, `MalformedCorpus` or `EmptyCorpus`
    /// - anything [`TrainingEngine::new`] returns
    pub fn othello<Q: AsRef<Path>>(corpus_path: Q, mut config: TrainingConfig) -> Result<Self, LearningError> {
        config.validate()?;
        let roots: Vec<BitBoard> = load_corpus(corpus_path)?;

        let random = RandomContext::new(config.seed);
        config.seed = Some(random.master_seed());

        let features = OthelloFeatures;
        let network = ValueNetwork::new(
            features.num_features(),
            config.hidden_units,
            config.learning_rate,
            &mut random.init_rng(),
        );
        Self::new(roots, features, network, config)
    }
}

impl<P, F, M> TrainingEngine<P, F, M>
where
    P: Position,
    F: FeatureConverter<P>,
    M: ValueModel,
{
    /// Initialize training engine.
    ///
    /// # Errors
    ///
    /// - `LearningError::EmptyCorpus` if `roots` is empty
    /// - `LearningError::Config` on invalid settings, a model whose input
    ///   width differs from the feature converter, or pool creation failure
    /// - `LearningError::Io` if checkpoint/log directories cannot be created
    pub fn new(roots: Vec<P>, features: F, model: M, config: TrainingConfig) -> Result<Self, LearningError> {
        config.validate()?;
        if roots.is_empty() {
            return Err(LearningError::EmptyCorpus);
        }
        if model.num_inputs() != features.num_features() {
            return Err(LearningError::Config(format!(
                "Model expects {} inputs, feature converter produces {}",
                model.num_inputs(),
                features.num_features()
            )));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_workers)
            .thread_name(|i| format!("rollout-{}", i))
            .build()
            .map_err(|e| LearningError::Config(format!("Failed to create thread pool: {}", e)))?;

        let checkpoint_mgr = CheckpointManager::new(&config.checkpoint_dir, config.compress_checkpoints)?;
        let logger = TrainingLogger::new(&config.log_dir)?;
        let random = RandomContext::new(config.seed);
        let evaluator = EvalCache::with_size_bytes(model, features, config.eval_cache_bytes);

        // Setup interrupt handler (uses global OnceLock for single registration)
        let interrupted = setup_signal_handler()?;

        info!(
            "Training engine ready: {} corpus positions, {} workers, master seed {}",
            roots.len(),
            config.num_workers,
            random.master_seed()
        );

        Ok(Self {
            roots,
            evaluator,
            config,
            random,
            pool,
            checkpoint_mgr,
            logger,
            next_iteration: 0,
            start_time: Instant::now(),
            interrupted,
        })
    }

    /// Continue from the newest loadable checkpoint in `checkpoint_dir`.
    ///
    /// Replaces the network and sets the next iteration to the checkpoint's
    /// iteration + 1. Returns the resumed iteration, or `None` when no
    /// usable checkpoint exists (training then starts from scratch).
    ///
    /// # Errors
    ///
    /// - `LearningError::Io` if the directory cannot be listed
    /// - `LearningError::Config` if the checkpointed model has a different
    ///   input width
    pub fn resume(&mut self) -> Result<Option<u64>, LearningError> {
        let Some((model, meta, path)) = load_latest_valid::<M>(&self.checkpoint_mgr)? else {
            self.logger.log_info("No checkpoint to resume from, starting fresh");
            return Ok(None);
        };

        if model.num_inputs() != self.evaluator.features().num_features() {
            return Err(LearningError::Config(format!(
                "Checkpoint {} expects {} inputs, feature converter produces {}",
                path.display(),
                model.num_inputs(),
                self.evaluator.features().num_features()
            )));
        }

        *self.evaluator.model_mut() = model;
        self.evaluator.clear_cache();
        self.next_iteration = meta.iteration + 1;

        let msg = format!(
            "Resumed from {} (iteration {}), continuing at iteration {}",
            path.display(),
            meta.iteration,
            self.next_iteration
        );
        info!("{}", msg);
        self.logger.log_info(&msg);
        Ok(Some(meta.iteration))
    }

    /// Run iterations `next_iteration..config.iterations`.
    ///
    /// Runs material bootstrap first when configured and starting from
    /// iteration 0. The interrupt flag is checked between iterations; on
    /// interrupt the last completed iteration is checkpointed and
    /// `LearningError::Interrupted` is returned.
    pub fn train(&mut self) -> Result<TrainingStats, LearningError> {
        let mut stats = TrainingStats::default();
        let target = self.config.iterations;
        let first = self.next_iteration;

        self.logger.log_info(&format!(
            "Training iterations {}..{} ({} rollouts each)",
            first, target, self.config.rollouts_per_iteration
        ));

        if first == 0
            && let Some(bootstrap) = self.config.bootstrap.clone()
        {
            let features = self.evaluator.features().clone();
            let result = bootstrap_material(
                self.evaluator.model_mut(),
                &features,
                &self.roots,
                &bootstrap,
                &mut self.random.coordinator_rng(),
            )?;
            self.evaluator.clear_cache();
            self.logger.log_info(&format!(
                "Bootstrap: {} positions, loss {:.5} -> {:.5}",
                result.rows, result.first_loss, result.last_loss
            ));
            stats.bootstrap = Some(result);
        }

        while self.next_iteration < target {
            if self.interrupted.load(Ordering::SeqCst) {
                warn!("Training interrupted by signal");
                self.logger.log_warning("Training interrupted by signal");
                if let Some(last) = self.next_iteration.checked_sub(1) {
                    self.save_checkpoint(last);
                }
                return Err(LearningError::Interrupted);
            }

            let iteration = self.next_iteration;
            let result = self.run_iteration(iteration)?;
            stats.record(&result);
            self.next_iteration += 1;

            self.logger
                .log_progress(self.next_iteration - first, target.saturating_sub(first));
        }

        stats.elapsed_secs = self.start_time.elapsed().as_secs_f64();
        info!(
            "Training finished: {} iterations, {} rollouts, {:.1}s",
            stats.iterations_completed, stats.total_rollouts, stats.elapsed_secs
        );
        Ok(stats)
    }

    /// Run a single iteration: rollouts, batch, optimization, checkpoint.
    pub fn run_iteration(&mut self, iteration: u64) -> Result<IterationStats, LearningError> {
        let rollout_start = Instant::now();
        let records = self.generate_rollouts(iteration);
        let rollout_secs = rollout_start.elapsed().as_secs_f64();

        let batch = TrainingBatch::assemble(&records, self.evaluator.features().num_features())?;

        let train_start = Instant::now();
        let (first_loss, last_loss) = self.optimize(&batch);
        let train_secs = train_start.elapsed().as_secs_f64();

        let summary = IterationSummary {
            iteration,
            rollouts: records.len(),
            leaves: batch.len(),
            fixed_leaves: batch.fixed_count(),
            first_loss,
            last_loss,
            rollout_secs,
            train_secs,
        };
        info!(
            "Iteration {}: {} rollouts, {} leaves ({} fixed), loss {:.5} -> {:.5}",
            iteration, summary.rollouts, summary.leaves, summary.fixed_leaves, first_loss, last_loss
        );
        self.logger.log_iteration(&summary);
        self.logger.check_loss_divergence(last_loss);

        let checkpoint = if iteration % self.config.checkpoint_interval == 0 {
            self.save_checkpoint(iteration)
        } else {
            None
        };

        Ok(IterationStats { summary, checkpoint })
    }

    /// Phase A: fork one worker per quota share, join, collect records.
    fn generate_rollouts(&self, iteration: u64) -> Vec<RolloutRecord> {
        let quotas = split_quota(self.config.rollouts_per_iteration, self.config.num_workers);
        let settings = self.config.rollout_settings();
        let roots = &self.roots;
        let (sender, receiver) = mpsc::channel();

        self.pool.scope(|s| {
            for (id, quota) in quotas.into_iter().enumerate() {
                let sender = sender.clone();
                let mut worker = RolloutWorker::new(
                    id,
                    self.evaluator.snapshot(),
                    self.config.tt_size_bytes,
                    settings,
                    self.worker_rng(iteration, id),
                );
                s.spawn(move |_| {
                    worker.run(roots, quota, &sender);
                });
            }
        });
        drop(sender);

        receiver.into_iter().collect()
    }

    fn worker_rng(&self, iteration: u64, worker: usize) -> StdRng {
        self.random.worker_rng(iteration, worker)
    }

    /// Phase C: `optimization_passes` rounds of forward, targets, step.
    ///
    /// Returns the first and last pass losses. An empty batch is skipped.
    fn optimize(&mut self, batch: &TrainingBatch) -> (f32, f32) {
        if batch.is_empty() {
            warn!("Empty training batch, skipping optimization");
            self.logger.log_warning("Empty training batch, skipping optimization");
            return (0.0, 0.0);
        }

        let lambda = self.config.td_lambda;
        let model = self.evaluator.model_mut();
        let mut first_loss = 0.0;
        let mut last_loss = 0.0;
        for pass in 0..self.config.optimization_passes {
            let (predictions, activations) = model.forward_batch(batch.inputs());
            let targets = compute_targets(batch, &predictions, lambda);
            let loss = model.train(batch.inputs(), &activations, &targets);
            if pass == 0 {
                first_loss = loss;
            }
            last_loss = loss;
        }

        // Cached values belong to the old weights
        self.evaluator.clear_cache();
        (first_loss, last_loss)
    }

    /// Phase D. Failures are logged and never stop training.
    fn save_checkpoint(&mut self, iteration: u64) -> Option<PathBuf> {
        let delay = Duration::from_millis(self.config.checkpoint_retry_delay_ms);
        let checkpoint_mgr = &self.checkpoint_mgr;
        let model = self.evaluator.model();

        match save_checkpoint_with_retry(delay, || checkpoint_mgr.save(iteration, model)) {
            Ok((path, bytes, _)) => {
                self.logger.log_checkpoint(iteration, &path, bytes);
                Some(path)
            }
            Err(e) => {
                warn!("Checkpoint for iteration {} not written: {}", iteration, e);
                self.logger
                    .log_warning(&format!("Checkpoint save failed after retry: {}", e));
                None
            }
        }
    }

    /// Replace the interrupt flag observed between iterations.
    ///
    /// Lets an embedding application stop training without a signal.
    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.interrupted = flag;
    }

    pub fn evaluator(&self) -> &EvalCache<P, F, M> {
        &self.evaluator
    }

    pub fn model(&self) -> &M {
        self.evaluator.model()
    }

    pub fn roots(&self) -> &[P] {
        &self.roots
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn next_iteration(&self) -> u64 {
        self.next_iteration
    }

    pub fn master_seed(&self) -> u64 {
        self.random.master_seed()
    }

    pub fn log_path(&self) -> &Path {
        self.logger.log_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Color;
    use crate::features::OTHELLO_NUM_FEATURES;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn small_config(dir: &TempDir) -> TrainingConfig {
        TrainingConfig {
            iterations: 2,
            rollouts_per_iteration: 4,
            max_rollout_half_moves: 3,
            search_node_budget: 32,
            optimization_passes: 2,
            checkpoint_interval: 1,
            num_workers: 2,
            tt_size_bytes: 16 * 1024,
            eval_cache_bytes: 16 * 1024,
            hidden_units: 4,
            seed: Some(11),
            checkpoint_dir: dir.path().join("ckpt"),
            log_dir: dir.path().join("logs"),
            checkpoint_retry_delay_ms: 0,
            ..Default::default()
        }
    }

    fn engine(config: TrainingConfig) -> TrainingEngine<BitBoard, OthelloFeatures, ValueNetwork> {
        let mut rng = StdRng::seed_from_u64(1);
        let net = ValueNetwork::new(OTHELLO_NUM_FEATURES, config.hidden_units, 0.01, &mut rng);
        TrainingEngine::new(vec![BitBoard::new()], OthelloFeatures, net, config).unwrap()
    }

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.iterations, 100_000);
        assert_eq!(config.rollouts_per_iteration, 256);
        assert_eq!(config.max_rollout_half_moves, 12);
        assert_eq!(config.search_node_budget, 256);
        assert_eq!(config.td_lambda, 0.7);
        assert_eq!(config.optimization_passes, 10);
        assert_eq!(config.checkpoint_interval, 10);
        assert!(config.num_workers >= 1);
        assert_eq!(config.checkpoint_dir, PathBuf::from("trainingResults"));
        assert!(config.seed.is_none());
        assert!(config.bootstrap.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            TrainingConfig {
                td_lambda: 1.5,
                ..Default::default()
            },
            TrainingConfig {
                num_workers: 0,
                ..Default::default()
            },
            TrainingConfig {
                checkpoint_interval: 0,
                ..Default::default()
            },
            TrainingConfig {
                search_node_budget: 0,
                ..Default::default()
            },
            TrainingConfig {
                learning_rate: f32::NAN,
                ..Default::default()
            },
            TrainingConfig {
                bootstrap: Some(BootstrapConfig {
                    positions: 0,
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(LearningError::Config(_))), "{:?}", config);
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrainingConfig = serde_json::from_str(r#"{"iterations": 5, "seed": 9}"#).unwrap();
        assert_eq!(config.iterations, 5);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.td_lambda, 0.7);
    }

    #[test]
    fn test_training_stats_default() {
        let stats = TrainingStats::default();
        assert_eq!(stats.iterations_completed, 0);
        assert!(stats.last_iteration.is_none());
        assert_eq!(stats.checkpoints_written, 0);
    }

    #[test]
    fn test_new_rejects_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let net = ValueNetwork::new(OTHELLO_NUM_FEATURES, 4, 0.01, &mut rng);
        let result = TrainingEngine::<BitBoard, _, _>::new(vec![], OthelloFeatures, net, small_config(&dir));
        assert!(matches!(result, Err(LearningError::EmptyCorpus)));
    }

    #[test]
    fn test_new_rejects_width_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let net = ValueNetwork::new(7, 4, 0.01, &mut rng);
        let result = TrainingEngine::new(vec![BitBoard::new()], OthelloFeatures, net, small_config(&dir));
        assert!(matches!(result, Err(LearningError::Config(_))));
    }

    #[test]
    fn test_run_iteration_collects_quota() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(small_config(&dir));
        let stats = engine.run_iteration(0).unwrap();

        assert_eq!(stats.summary.rollouts, 4);
        assert!(stats.summary.leaves >= 1);
        assert!(stats.summary.leaves <= 4 * 3);
        assert!(stats.checkpoint.as_ref().is_some_and(|p| p.exists()));
    }

    #[test]
    fn test_optimization_changes_weights() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(small_config(&dir));
        let before = engine.model().params().to_vec();
        let stats = engine.run_iteration(1).unwrap();
        assert!(stats.summary.leaves > 0);
        assert_ne!(engine.model().params(), &before[..]);
    }

    #[test]
    fn test_checkpoint_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig {
            checkpoint_interval: 2,
            ..small_config(&dir)
        };
        let mut engine = engine(config);
        assert!(engine.run_iteration(0).unwrap().checkpoint.is_some());
        assert!(engine.run_iteration(1).unwrap().checkpoint.is_none());
        assert!(engine.run_iteration(2).unwrap().checkpoint.is_some());
    }

    #[test]
    fn test_train_then_resume() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(&dir);
        let mut first = engine(config.clone());
        let stats = first.train().unwrap();
        assert_eq!(stats.iterations_completed, 2);
        assert_eq!(stats.last_iteration, Some(1));
        assert_eq!(stats.checkpoints_written, 2);
        assert_eq!(first.next_iteration(), 2);

        let mut second = engine(TrainingConfig { iterations: 3, ..config });
        assert_eq!(second.resume().unwrap(), Some(1));
        assert_eq!(second.next_iteration(), 2);
        assert_eq!(second.model().params(), first.model().params());

        let stats = second.train().unwrap();
        assert_eq!(stats.iterations_completed, 1);
        assert_eq!(stats.last_iteration, Some(2));
    }

    #[test]
    fn test_resume_without_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(small_config(&dir));
        assert_eq!(engine.resume().unwrap(), None);
        assert_eq!(engine.next_iteration(), 0);
    }

    #[test]
    fn test_interrupt_between_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(small_config(&dir));
        let flag = Arc::new(AtomicBool::new(true));
        engine.set_interrupt_flag(Arc::clone(&flag));

        assert!(matches!(engine.train(), Err(LearningError::Interrupted)));
        assert_eq!(engine.next_iteration(), 0);

        flag.store(false, Ordering::SeqCst);
        engine.run_iteration(0).unwrap();
    }

    #[test]
    fn test_bootstrap_runs_before_iteration_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig {
            iterations: 1,
            bootstrap: Some(BootstrapConfig {
                positions: 8,
                epochs: 2,
                minibatch_size: 4,
            }),
            ..small_config(&dir)
        };
        let mut rng = StdRng::seed_from_u64(1);
        let net = ValueNetwork::new(OTHELLO_NUM_FEATURES, 4, 0.01, &mut rng);
        // Black to move after one black move: 4 black, 1 white
        let mut pos = BitBoard::new();
        let mv = pos.legal_moves()[0];
        pos.apply_move(mv);
        assert_eq!(pos.side_to_move(), Color::White);

        let mut engine = TrainingEngine::new(vec![pos], OthelloFeatures, net, config).unwrap();
        let stats = engine.train().unwrap();
        let bootstrap = stats.bootstrap.unwrap();
        assert_eq!(bootstrap.rows, 8);
    }
}
