//! Training log file output.
//!
//! Writes per-iteration summaries, checkpoint records and warnings to
//! `logs/training_YYYYMMDD_HHMMSS.log` from a background thread so that
//! file I/O never stalls the training loop.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;

use crate::learning::LearningError;

/// Loss above which training is reported as diverging.
///
/// Targets lie in `[-1, 1]`, so the mean squared error is at most 4.
pub const LOSS_DIVERGENCE_THRESHOLD: f32 = 4.0;

/// Summary of one training iteration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IterationSummary {
    /// Iteration index.
    pub iteration: u64,
    /// Number of rollouts collected.
    pub rollouts: usize,
    /// Number of leaves in the batch.
    pub leaves: usize,
    /// Number of FIXED leaves in the batch.
    pub fixed_leaves: usize,
    /// Loss of the first optimization pass.
    pub first_loss: f32,
    /// Loss of the last optimization pass.
    pub last_loss: f32,
    /// Wall time of the rollout phase in seconds.
    pub rollout_secs: f64,
    /// Wall time of the optimization phase in seconds.
    pub train_secs: f64,
}

impl IterationSummary {
    /// Average number of leaves per rollout.
    pub fn mean_rollout_len(&self) -> f64 {
        if self.rollouts == 0 {
            0.0
        } else {
            self.leaves as f64 / self.rollouts as f64
        }
    }
}

/// Log message types for async logging.
#[derive(Clone, Debug)]
enum LogMessage {
    /// Per-iteration summary.
    Iteration(IterationSummary),
    /// Checkpoint written: iteration, path, size in bytes.
    Checkpoint(u64, PathBuf, u64),
    /// Progress report with ETA.
    Progress(u64, u64, Duration),
    /// Warning message.
    Warning(String),
    /// Info message.
    Info(String),
    /// Shutdown signal.
    Shutdown,
}

/// Non-blocking training logger.
///
/// # Example
///
/// ```ignore
/// use evalforge::learning::logger::TrainingLogger;
///
/// let logger = TrainingLogger::new("logs/")?;
/// logger.log_info("starting");
/// logger.shutdown()?;
/// ```
pub struct TrainingLogger {
    /// Sender for async log messages.
    sender: Sender<LogMessage>,
    /// Background writer thread handle.
    writer_handle: Option<JoinHandle<()>>,
    /// Training start time.
    start_time: Instant,
    /// Log file path.
    log_path: PathBuf,
}

impl TrainingLogger {
    /// Create a new training logger.
    ///
    /// Creates the log directory if it doesn't exist and starts the
    /// background writer thread.
    ///
    /// # Errors
    ///
    /// - `LearningError::Io` if directory creation or file open fails
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self, LearningError> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("training_{}.log", timestamp));

        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

        let (sender, receiver) = mpsc::channel();
        let writer_handle = Self::start_writer_thread(file, receiver);

        let logger = Self {
            sender,
            writer_handle: Some(writer_handle),
            start_time: Instant::now(),
            log_path,
        };
        logger.log_info("Training logger initialized");
        Ok(logger)
    }

    /// Start the background writer thread.
    fn start_writer_thread(file: File, receiver: Receiver<LogMessage>) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut writer = BufWriter::new(file);

            while let Ok(msg) = receiver.recv() {
                if let LogMessage::Shutdown = msg {
                    break;
                }
                if let Err(e) = Self::write_message(&mut writer, &msg) {
                    eprintln!("Logger error: {}", e);
                }
            }

            let _ = writer.flush();
        })
    }

    /// Write a log message to the file.
    fn write_message<W: Write>(writer: &mut W, msg: &LogMessage) -> std::io::Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

        match msg {
            LogMessage::Iteration(s) => {
                writeln!(
                    writer,
                    "[{}] ITER {:>8} | rollouts:{} leaves:{} fixed:{} len:{:.2} | loss:{:.5}->{:.5} | rollout:{:.2}s train:{:.2}s",
                    timestamp,
                    s.iteration,
                    s.rollouts,
                    s.leaves,
                    s.fixed_leaves,
                    s.mean_rollout_len(),
                    s.first_loss,
                    s.last_loss,
                    s.rollout_secs,
                    s.train_secs
                )?;
            }
            LogMessage::Checkpoint(iteration, path, bytes) => {
                writeln!(
                    writer,
                    "[{}] CHECKPOINT {:>8} | {} ({} bytes)",
                    timestamp,
                    iteration,
                    path.display(),
                    bytes
                )?;
            }
            LogMessage::Progress(current, target, eta) => {
                let progress = *current as f64 / (*target).max(1) as f64 * 100.0;
                let eta_secs = eta.as_secs();
                writeln!(
                    writer,
                    "[{}] PROGRESS {:>8}/{} ({:.1}%) | ETA: {}h {:02}m",
                    timestamp,
                    current,
                    target,
                    progress,
                    eta_secs / 3600,
                    (eta_secs % 3600) / 60
                )?;
            }
            LogMessage::Warning(msg) => {
                writeln!(writer, "[{}] WARNING: {}", timestamp, msg)?;
            }
            LogMessage::Info(msg) => {
                writeln!(writer, "[{}] INFO: {}", timestamp, msg)?;
            }
            LogMessage::Shutdown => {}
        }

        writer.flush()
    }

    /// Log an iteration summary. Non-blocking.
    pub fn log_iteration(&self, summary: &IterationSummary) {
        let _ = self.sender.send(LogMessage::Iteration(summary.clone()));
    }

    /// Log a written checkpoint. Non-blocking.
    pub fn log_checkpoint(&self, iteration: u64, path: &Path, bytes: u64) {
        let _ = self
            .sender
            .send(LogMessage::Checkpoint(iteration, path.to_path_buf(), bytes));
    }

    /// Log progress with estimated time remaining.
    ///
    /// `completed` iterations have finished since this logger was created.
    pub fn log_progress(&self, completed: u64, target: u64) {
        let eta = self.eta(completed, target);
        let _ = self.sender.send(LogMessage::Progress(completed, target, eta));
    }

    /// Log warning message.
    pub fn log_warning(&self, message: &str) {
        let _ = self.sender.send(LogMessage::Warning(message.to_string()));
    }

    /// Log info message.
    pub fn log_info(&self, message: &str) {
        let _ = self.sender.send(LogMessage::Info(message.to_string()));
    }

    /// Warn if a training loss is NaN, infinite or above
    /// [`LOSS_DIVERGENCE_THRESHOLD`]. Returns true when a warning was logged.
    pub fn check_loss_divergence(&self, loss: f32) -> bool {
        if loss.is_nan() {
            self.log_warning("Loss divergence: NaN detected");
            return true;
        }
        if loss.is_infinite() {
            self.log_warning("Loss divergence: Infinite value detected");
            return true;
        }
        if loss > LOSS_DIVERGENCE_THRESHOLD {
            self.log_warning(&format!(
                "Loss divergence: {} exceeds {}",
                loss, LOSS_DIVERGENCE_THRESHOLD
            ));
            return true;
        }
        false
    }

    /// Estimated time remaining from the completion rate so far.
    pub fn eta(&self, completed: u64, target: u64) -> Duration {
        if completed == 0 {
            return Duration::ZERO;
        }

        let per_sec = completed as f64 / self.start_time.elapsed().as_secs_f64();
        if per_sec <= 0.0 || !per_sec.is_finite() {
            return Duration::ZERO;
        }

        Duration::from_secs_f64(target.saturating_sub(completed) as f64 / per_sec)
    }

    /// Elapsed time since the logger was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get the log file path.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Shutdown the logger and wait for background thread to finish.
    pub fn shutdown(mut self) -> Result<(), LearningError> {
        let _ = self.sender.send(LogMessage::Shutdown);

        if let Some(handle) = self.writer_handle.take() {
            handle
                .join()
                .map_err(|_| LearningError::Io(std::io::Error::other("Logger thread panicked")))?;
        }

        Ok(())
    }
}

impl Drop for TrainingLogger {
    fn drop(&mut self) {
        let _ = self.sender.send(LogMessage::Shutdown);

        if let Some(handle) = self.writer_handle.take() {
            let _ = handle.join();
        }
    }
}
