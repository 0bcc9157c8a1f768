//! TD(lambda) self-play trainer for the Othello value network.
//!
//! Usage: td-train --corpus positions.txt [--config train.json] [--resume]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use evalforge::learning::{LearningError, TrainingConfig, TrainingEngine};

/// Train an evaluation network by TD(lambda) over self-play rollouts
#[derive(Parser, Debug)]
#[command(name = "td-train")]
#[command(about = "Self-play TD(lambda) training", long_about = None)]
struct Args {
    /// Corpus of root positions, one per line
    #[arg(long)]
    corpus: PathBuf,

    /// JSON training configuration (missing keys use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of iterations
    #[arg(long)]
    iterations: Option<u64>,

    /// Override the number of rollout workers
    #[arg(long)]
    workers: Option<usize>,

    /// Master random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the checkpoint directory
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Continue from the newest valid checkpoint
    #[arg(long)]
    resume: bool,
}

impl Args {
    fn training_config(&self) -> Result<TrainingConfig, LearningError> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_json_file(path)?,
            None => TrainingConfig::default(),
        };
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(workers) = self.workers {
            config.num_workers = workers;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(dir) = &self.checkpoint_dir {
            config.checkpoint_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<(), LearningError> {
    let config = args.training_config()?;
    let mut engine = TrainingEngine::othello(&args.corpus, config)?;
    info!("Master seed {}, log file {}", engine.master_seed(), engine.log_path().display());

    if args.resume {
        engine.resume()?;
    }

    let stats = engine.train()?;
    println!(
        "Trained {} iterations ({} rollouts, {} leaves), final loss {:.5}, {} checkpoints, {:.1}s",
        stats.iterations_completed,
        stats.total_rollouts,
        stats.total_leaves,
        stats.last_loss,
        stats.checkpoints_written,
        stats.elapsed_secs
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(LearningError::Interrupted) => {
            info!("Stopped by signal");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
