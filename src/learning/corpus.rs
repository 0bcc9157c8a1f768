//! Root-position corpus loading.
//!
//! A corpus is a text file with one position record per line, parsed with
//! the position type's [`FromStr`](std::str::FromStr). Empty lines are
//! malformed input.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;

use super::LearningError;
use crate::board::Position;

/// Parse every record of a corpus from a reader.
///
/// Line numbers in errors are 1-based.
pub fn parse_corpus<P, R>(reader: R) -> Result<Vec<P>, LearningError>
where
    P: Position,
    P::Err: Display,
    R: BufRead,
{
    let mut positions = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let record = line.trim_end_matches('\r');
        if record.trim().is_empty() {
            return Err(LearningError::MalformedCorpus {
                line: idx + 1,
                reason: "empty line".to_string(),
            });
        }
        let pos = record
            .parse::<P>()
            .map_err(|e| LearningError::MalformedCorpus {
                line: idx + 1,
                reason: e.to_string(),
            })?;
        positions.push(pos);
    }

    if positions.is_empty() {
        return Err(LearningError::EmptyCorpus);
    }
    Ok(positions)
}

/// Load a corpus file.
///
/// # Errors
///
/// - `CorpusOpen` if the file cannot be opened
/// - `MalformedCorpus` for an empty or unparseable line
/// - `EmptyCorpus` if the file has no records
pub fn load_corpus<P, Q>(path: Q) -> Result<Vec<P>, LearningError>
where
    P: Position,
    P::Err: Display,
    Q: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LearningError::CorpusOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let positions = parse_corpus(BufReader::new(file))?;
    info!("Loaded {} root positions from {}", positions.len(), path.display());
    Ok(positions)
}
