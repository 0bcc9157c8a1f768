//! Checkpoint management for the value network.
//!
//! One file per checkpointed iteration, named `eval_NNNNNN.net`.
//!
//! # Binary Format
//!
//! | Offset | Size | Field | Description |
//! |--------|------|-------|-------------|
//! | 0 | 4 | magic | "TDEV" |
//! | 4 | 4 | version | u32 (current: 1) |
//! | 8 | 4 | flags | bit 0: gzip compressed |
//! | 12 | 4 | checksum | CRC32 of the data section |
//! | 16 | 8 | iteration | u64 little-endian |
//! | 24 | 8 | timestamp | i64 Unix timestamp |
//! | 32 | .. | data | `ValueModel::to_bytes` (optionally compressed) |
//!
//! Saves are atomic: the file is written under a `.tmp` name and renamed.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crc32fast::Hasher as Crc32Hasher;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::learning::LearningError;
use crate::network::ValueModel;

/// 4-byte magic header ("TDEV").
pub const CHECKPOINT_MAGIC: &[u8; 4] = b"TDEV";

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Flag bit indicating compression is enabled.
pub const FLAG_COMPRESSED: u32 = 1;

const FILE_PREFIX: &str = "eval_";
const FILE_SUFFIX: &str = ".net";

#[inline]
fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
fn le_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Checkpoint metadata read back from a file header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointMeta {
    /// Training iteration the checkpoint was taken after.
    pub iteration: u64,
    /// Unix timestamp when checkpoint was created.
    pub created_at: i64,
    /// Whether the data section is gzip compressed.
    pub compressed: bool,
}

/// Fixed 32-byte checkpoint header.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointHeader {
    /// Magic bytes for format identification ("TDEV").
    pub magic: [u8; 4],
    /// Format version number.
    pub version: u32,
    /// Flags (bit 0: compressed).
    pub flags: u32,
    /// CRC32 checksum of the data section.
    pub checksum: u32,
    /// Iteration index.
    pub iteration: u64,
    /// Unix timestamp when checkpoint was created.
    pub timestamp: i64,
}

impl CheckpointHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 32;

    /// Create a new checkpoint header with a zero checksum.
    pub fn new(iteration: u64, compressed: bool) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            magic: *CHECKPOINT_MAGIC,
            version: CHECKPOINT_VERSION,
            flags: if compressed { FLAG_COMPRESSED } else { 0 },
            checksum: 0,
            iteration,
            timestamp,
        }
    }

    /// Check if compression flag is set.
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.flags.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.iteration.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the slice is short, the magic bytes don't match or
    /// the version is incompatible.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LearningError> {
        if bytes.len() < Self::SIZE {
            return Err(LearningError::InvalidCheckpoint(format!(
                "Header too small: expected {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if &magic != CHECKPOINT_MAGIC {
            return Err(LearningError::InvalidCheckpoint(format!(
                "Invalid magic header: expected {:?}, got {:?}",
                CHECKPOINT_MAGIC, magic
            )));
        }

        let version = le_u32(&bytes[4..8]);
        if version != CHECKPOINT_VERSION {
            return Err(LearningError::InvalidCheckpoint(format!(
                "Incompatible checkpoint version: expected {}, got {}",
                CHECKPOINT_VERSION, version
            )));
        }

        Ok(Self {
            magic,
            version,
            flags: le_u32(&bytes[8..12]),
            checksum: le_u32(&bytes[12..16]),
            iteration: le_u64(&bytes[16..24]),
            timestamp: le_u64(&bytes[24..32]) as i64,
        })
    }

    fn meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            iteration: self.iteration,
            created_at: self.timestamp,
            compressed: self.is_compressed(),
        }
    }
}

/// Checkpoint manager for value network persistence.
///
/// # Example
///
/// ```ignore
/// use evalforge::learning::checkpoint::CheckpointManager;
///
/// let manager = CheckpointManager::new("trainingResults", true)?;
/// let (path, size, secs) = manager.save(0, &network)?;
/// let (network, meta): (ValueNetwork, _) = manager.load(&path)?;
/// ```
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    /// Directory for checkpoint files.
    checkpoint_dir: PathBuf,
    /// Whether to gzip the data section.
    compression_enabled: bool,
}

impl CheckpointManager {
    /// Create a manager, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P, compression_enabled: bool) -> Result<Self, LearningError> {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();
        fs::create_dir_all(&checkpoint_dir)?;
        Ok(Self {
            checkpoint_dir,
            compression_enabled,
        })
    }

    /// File name for an iteration, e.g. `eval_000042.net`.
    pub fn checkpoint_filename(iteration: u64) -> String {
        format!("{FILE_PREFIX}{iteration:06}{FILE_SUFFIX}")
    }

    /// Full path for an iteration.
    pub fn checkpoint_path(&self, iteration: u64) -> PathBuf {
        self.checkpoint_dir.join(Self::checkpoint_filename(iteration))
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn compression_enabled(&self) -> bool {
        self.compression_enabled
    }

    /// Save a model checkpoint for `iteration`.
    ///
    /// # Returns
    ///
    /// Tuple of (path, file_size_bytes, save_duration_secs).
    pub fn save<M: ValueModel>(&self, iteration: u64, model: &M) -> Result<(PathBuf, u64, f64), LearningError> {
        let start_time = Instant::now();
        let checkpoint_path = self.checkpoint_path(iteration);
        let temp_path = checkpoint_path.with_extension("tmp");

        let payload = model.to_bytes()?;
        let data = if self.compression_enabled {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(&payload)?;
            encoder.finish()?
        } else {
            payload
        };

        let mut hasher = Crc32Hasher::new();
        hasher.update(&data);

        let mut header = CheckpointHeader::new(iteration, self.compression_enabled);
        header.checksum = hasher.finalize();

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header.to_bytes())?;
        writer.write_all(&data)?;
        writer.flush()?;
        drop(writer);

        fs::rename(&temp_path, &checkpoint_path)?;

        let file_size = fs::metadata(&checkpoint_path)?.len();
        let duration = start_time.elapsed().as_secs_f64();

        log::info!(
            "Checkpoint saved: {} ({} bytes, {:.2}s, compression: {})",
            checkpoint_path.display(),
            file_size,
            duration,
            self.compression_enabled
        );

        Ok((checkpoint_path, file_size, duration))
    }

    /// Read header and data section, verifying the checksum.
    fn read_verified(checkpoint_path: &Path) -> Result<(CheckpointHeader, Vec<u8>), LearningError> {
        let file = File::open(checkpoint_path)?;
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; CheckpointHeader::SIZE];
        reader.read_exact(&mut header_bytes).map_err(|e| {
            LearningError::InvalidCheckpoint(format!("Cannot read header: {e}"))
        })?;
        let header = CheckpointHeader::from_bytes(&header_bytes)?;

        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let mut hasher = Crc32Hasher::new();
        hasher.update(&data);
        let computed = hasher.finalize();
        if computed != header.checksum {
            return Err(LearningError::InvalidCheckpoint(format!(
                "Checksum mismatch: expected {:#010x}, computed {:#010x}. Data may be corrupted.",
                header.checksum, computed
            )));
        }

        Ok((header, data))
    }

    /// Load a checkpoint with CRC32 verification.
    pub fn load<M: ValueModel>(&self, checkpoint_path: &Path) -> Result<(M, CheckpointMeta), LearningError> {
        let (header, data) = Self::read_verified(checkpoint_path)?;

        let payload = if header.is_compressed() {
            let mut decoder = GzDecoder::new(Cursor::new(data));
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            decompressed
        } else {
            data
        };

        let model = M::from_bytes(&payload)
            .map_err(|e| LearningError::InvalidCheckpoint(format!("Undecodable model: {e}")))?;

        log::info!(
            "Checkpoint loaded: {} (iteration {})",
            checkpoint_path.display(),
            header.iteration
        );
        Ok((model, header.meta()))
    }

    /// Load the latest checkpoint in the directory, if any.
    pub fn load_latest<M: ValueModel>(&self) -> Result<Option<(M, CheckpointMeta)>, LearningError> {
        match self.find_latest()? {
            Some(path) => Ok(Some(self.load(&path)?)),
            None => Ok(None),
        }
    }

    /// Verify checkpoint integrity without decoding the model.
    ///
    /// Returns `Ok(false)` on checksum mismatch; header errors propagate.
    pub fn verify(&self, checkpoint_path: &Path) -> Result<bool, LearningError> {
        match Self::read_verified(checkpoint_path) {
            Ok(_) => Ok(true),
            Err(LearningError::InvalidCheckpoint(msg)) if msg.starts_with("Checksum mismatch") => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List checkpoint iterations present in the directory, ascending.
    pub fn list_checkpoints(&self) -> Result<Vec<(u64, PathBuf)>, LearningError> {
        let mut checkpoints = Vec::new();
        for entry in fs::read_dir(&self.checkpoint_dir)? {
            let path = entry?.path();
            if let Some(iteration) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(Self::parse_checkpoint_filename)
            {
                checkpoints.push((iteration, path));
            }
        }
        checkpoints.sort_by_key(|(iteration, _)| *iteration);
        Ok(checkpoints)
    }

    /// Find the checkpoint with the highest iteration.
    pub fn find_latest(&self) -> Result<Option<PathBuf>, LearningError> {
        Ok(self.list_checkpoints()?.pop().map(|(_, path)| path))
    }

    /// Parse the iteration from a checkpoint filename.
    pub fn parse_checkpoint_filename(filename: &str) -> Option<u64> {
        filename
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?
            .parse()
            .ok()
    }
}
