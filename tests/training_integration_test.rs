//! Integration tests for the complete training flow.
//!
//! - Rollout length and FIXED termination with a depth cap of 2
//! - One-iteration, one-worker end-to-end run with checkpoint placement
//! - Checkpoint failures do not stop training
//! - Corpus loading and JSON configuration through the public API

use std::fs;
use std::sync::mpsc;

use evalforge::board::{BitBoard, Color, Position};
use evalforge::evaluator::EvalCache;
use evalforge::features::{OTHELLO_NUM_FEATURES, OthelloFeatures};
use evalforge::learning::*;
use evalforge::network::{ValueModel, ValueNetwork};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::{TempDir, tempdir};

/// Black owns everything except A1/B1 and G8/H8; White holds B1 and G8.
/// Black must fill one corner, White passes, Black ends the game.
fn nearly_finished() -> BitBoard {
    let white = (1u64 << 1) | (1u64 << 62);
    let black = !(white | 1 | (1u64 << 63));
    BitBoard::from_masks(black, white, Color::Black)
}

fn network(seed: u64) -> ValueNetwork {
    let mut rng = StdRng::seed_from_u64(seed);
    ValueNetwork::new(OTHELLO_NUM_FEATURES, 8, 0.01, &mut rng)
}

fn worker(max_half_moves: usize, seed: u64) -> RolloutWorker<BitBoard, OthelloFeatures, ValueNetwork> {
    RolloutWorker::new(
        0,
        EvalCache::new(network(5), OthelloFeatures, 1 << 12),
        64 * 1024,
        RolloutSettings {
            max_half_moves,
            node_budget: 64,
        },
        StdRng::seed_from_u64(seed),
    )
}

fn config(dir: &TempDir) -> TrainingConfig {
    TrainingConfig {
        iterations: 1,
        rollouts_per_iteration: 1,
        max_rollout_half_moves: 2,
        search_node_budget: 64,
        optimization_passes: 3,
        checkpoint_interval: 5,
        num_workers: 1,
        tt_size_bytes: 64 * 1024,
        eval_cache_bytes: 64 * 1024,
        hidden_units: 8,
        seed: Some(2024),
        checkpoint_dir: dir.path().join("trainingResults"),
        log_dir: dir.path().join("logs"),
        checkpoint_retry_delay_ms: 0,
        ..Default::default()
    }
}

// ========== Rollout shape ==========

#[test]
fn test_rollout_length_respects_cap() {
    let mut worker = worker(2, 9);
    let roots = [BitBoard::new()];

    for _ in 0..20 {
        let record = worker.generate_rollout(&roots);
        assert!(!record.is_empty());
        assert!(record.len() <= 2, "rollout of length {}", record.len());
        if record.kinds()[0] == PositionKind::Fixed {
            assert_eq!(record.len(), 1);
        }
        assert_eq!(record.leaves().len(), record.scores().len());
        assert!(record.leaves().iter().all(|l| l.len() == OTHELLO_NUM_FEATURES));
        assert!(record.scores().iter().all(|s| (-1.0..=1.0).contains(s)));
    }
}

#[test]
fn test_decided_game_gives_single_fixed_leaf() {
    let root = nearly_finished();
    assert!(!root.status().is_terminal());

    let mut worker = worker(2, 1);
    let record = worker.generate_rollout(&[root]);

    assert_eq!(record.len(), 1);
    assert_eq!(record.kinds(), &[PositionKind::Fixed]);
    // Black wins, so the White-relative truth saturates at -1
    assert_eq!(record.scores(), &[-1.0]);
}

#[test]
fn test_terminal_root_gives_empty_rollout() {
    let all_black = BitBoard::from_masks(!0, 0, Color::White);
    assert!(all_black.status().is_terminal());

    let mut worker = worker(4, 1);
    assert!(worker.generate_rollout(&[all_black]).is_empty());
}

#[test]
fn test_worker_run_sends_quota() {
    let mut worker = worker(3, 4);
    let (sender, receiver) = mpsc::channel();
    let sent = worker.run(&[BitBoard::new()], 5, &sender);
    drop(sender);

    assert_eq!(sent, 5);
    assert_eq!(receiver.into_iter().count(), 5);
}

#[test]
fn test_split_quota_sums_to_total() {
    assert_eq!(split_quota(10, 4), vec![3, 3, 2, 2]);
    assert_eq!(split_quota(2, 4), vec![1, 1, 0, 0]);
    assert_eq!(split_quota(7, 0), vec![7]);
}

// ========== End-to-end ==========

#[test]
fn test_single_iteration_end_to_end() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    let mut engine = TrainingEngine::new(vec![BitBoard::new()], OthelloFeatures, network(3), config).unwrap();

    let stats = engine.train().unwrap();
    assert_eq!(stats.iterations_completed, 1);
    assert_eq!(stats.total_rollouts, 1);
    assert!((1..=2).contains(&stats.total_leaves));

    let manager = CheckpointManager::new(dir.path().join("trainingResults"), true).unwrap();
    let listed = manager.list_checkpoints().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0, 0);
    assert!(listed[0].1.ends_with("eval_000000.net"));

    let (restored, meta): (ValueNetwork, _) = manager.load(&listed[0].1).unwrap();
    assert_eq!(meta.iteration, 0);
    assert_eq!(restored.params(), engine.model().params());
}

#[test]
fn test_checkpoints_follow_interval() {
    let dir = tempdir().unwrap();
    let config = TrainingConfig {
        iterations: 7,
        checkpoint_interval: 3,
        optimization_passes: 1,
        ..config(&dir)
    };
    let mut engine = TrainingEngine::new(vec![BitBoard::new()], OthelloFeatures, network(3), config).unwrap();
    let stats = engine.train().unwrap();
    assert_eq!(stats.checkpoints_written, 3);

    let manager = CheckpointManager::new(dir.path().join("trainingResults"), true).unwrap();
    let iterations: Vec<u64> = manager.list_checkpoints().unwrap().into_iter().map(|(i, _)| i).collect();
    assert_eq!(iterations, vec![0, 3, 6]);
}

#[test]
fn test_multi_worker_iteration() {
    let dir = tempdir().unwrap();
    let config = TrainingConfig {
        rollouts_per_iteration: 9,
        num_workers: 4,
        max_rollout_half_moves: 4,
        ..config(&dir)
    };
    let mut engine = TrainingEngine::new(vec![BitBoard::new()], OthelloFeatures, network(3), config).unwrap();
    let stats = engine.run_iteration(0).unwrap();

    assert_eq!(stats.summary.rollouts, 9);
    assert!(stats.summary.leaves <= 9 * 4);
    assert!(stats.summary.fixed_leaves <= stats.summary.rollouts);
    assert!(stats.summary.last_loss.is_finite());
}

#[test]
fn test_checkpoint_failure_is_not_fatal() {
    let dir = tempdir().unwrap();
    let config = TrainingConfig {
        iterations: 2,
        checkpoint_interval: 1,
        ..config(&dir)
    };
    let ckpt_dir = config.checkpoint_dir.clone();
    let mut engine = TrainingEngine::new(vec![BitBoard::new()], OthelloFeatures, network(3), config).unwrap();

    // Replace the directory with a plain file so every save fails
    fs::remove_dir_all(&ckpt_dir).unwrap();
    fs::write(&ckpt_dir, b"not a directory").unwrap();

    let stats = engine.train().unwrap();
    assert_eq!(stats.iterations_completed, 2);
    assert_eq!(stats.checkpoints_written, 0);

    // Dropping the engine flushes the log writer
    let log_path = engine.log_path().to_path_buf();
    drop(engine);
    let log = fs::read_to_string(log_path).unwrap();
    assert!(log.contains("Checkpoint save failed after retry"));
}

// ========== Corpus and configuration ==========

#[test]
fn test_othello_engine_from_corpus_file() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.txt");
    let mut moved = BitBoard::new();
    let mv = moved.legal_moves()[0];
    moved.apply_move(mv);
    fs::write(&corpus, format!("{}\n{}\n", BitBoard::new(), moved)).unwrap();

    let engine = TrainingEngine::othello(&corpus, config(&dir)).unwrap();
    assert_eq!(engine.roots().len(), 2);
    assert_eq!(engine.roots()[1], moved);
    assert_eq!(engine.master_seed(), 2024);
    assert_eq!(engine.model().num_inputs(), OTHELLO_NUM_FEATURES);
}

#[test]
fn test_same_seed_same_initial_network() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.txt");
    fs::write(&corpus, format!("{}\n", BitBoard::new())).unwrap();

    let a = TrainingEngine::othello(&corpus, config(&dir)).unwrap();
    let b = TrainingEngine::othello(&corpus, config(&dir)).unwrap();
    assert_eq!(a.model().params(), b.model().params());
}

#[test]
fn test_corpus_errors() {
    let dir = tempdir().unwrap();

    let missing = dir.path().join("missing.txt");
    let result = TrainingEngine::othello(&missing, config(&dir));
    assert!(matches!(result, Err(LearningError::CorpusOpen { .. })));

    let blank = dir.path().join("blank.txt");
    fs::write(&blank, format!("{}\n\n", BitBoard::new())).unwrap();
    let result = TrainingEngine::othello(&blank, config(&dir));
    assert!(matches!(result, Err(LearningError::MalformedCorpus { line: 2, .. })));

    let empty = dir.path().join("empty.txt");
    fs::write(&empty, "").unwrap();
    let result = TrainingEngine::othello(&empty, config(&dir));
    assert!(matches!(result, Err(LearningError::EmptyCorpus)));
}

#[test]
fn test_config_from_json_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("train.json");
    fs::write(
        &path,
        r#"{
            "iterations": 12,
            "td_lambda": 0.5,
            "num_workers": 3,
            "bootstrap": { "positions": 100 }
        }"#,
    )
    .unwrap();

    let config = TrainingConfig::from_json_file(&path).unwrap();
    assert_eq!(config.iterations, 12);
    assert_eq!(config.td_lambda, 0.5);
    assert_eq!(config.num_workers, 3);
    assert_eq!(config.rollouts_per_iteration, 256);
    let bootstrap = config.bootstrap.unwrap();
    assert_eq!(bootstrap.positions, 100);
    assert_eq!(bootstrap.epochs, 10);

    fs::write(&path, r#"{ "td_lambda": 2.0 }"#).unwrap();
    assert!(matches!(
        TrainingConfig::from_json_file(&path),
        Err(LearningError::Config(_))
    ));

    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        TrainingConfig::from_json_file(&path),
        Err(LearningError::Config(_))
    ));
}
