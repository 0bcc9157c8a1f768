//! Score scaling between search integers and network outputs.
//!
//! Search works on integer scores so that a cached evaluation and a search
//! result can be compared for exact equality. The value network works on
//! `f32` values in `[-1, 1]`. This module converts between the two.
//!
//! # Ranges
//!
//! | Range | Meaning |
//! |-------|---------|
//! | `-EVAL_LIMIT..=EVAL_LIMIT` | Static evaluation (network output scaled) |
//! | `WIN_SCORE..` / `..=-WIN_SCORE` | Decided game (terminal), includes margin |
//! | `SCORE_MIN`, `SCORE_MAX` | Search window bounds |

/// Integer score used by search, the table and the eval cache.
pub type Score = i32;

/// Scale between a network output of `1.0` and a search score.
pub const SCORE_SCALE: f32 = 10_000.0;

/// Largest magnitude a static evaluation may take.
///
/// Kept strictly below [`WIN_SCORE`] so a static evaluation never equals a
/// decided-game score.
pub const EVAL_LIMIT: Score = 9_999;

/// Base score of a decided game; the final margin is added on top.
pub const WIN_SCORE: Score = 10_000;

/// Lower search window bound.
pub const SCORE_MIN: Score = -30_000;

/// Upper search window bound.
pub const SCORE_MAX: Score = 30_000;

/// Convert a network output to a search score.
///
/// NaN maps to 0 so that a diverged network cannot poison the table.
#[inline]
pub fn scale(value: f32) -> Score {
    if value.is_nan() {
        return 0;
    }
    let scaled = (value * SCORE_SCALE).round();
    (scaled as Score).clamp(-EVAL_LIMIT, EVAL_LIMIT)
}

/// Convert a search score to a training target in `[-1, 1]`.
///
/// Decided-game scores saturate at `±1.0`.
#[inline]
pub fn unscale(score: Score) -> f32 {
    (score as f32 / SCORE_SCALE).clamp(-1.0, 1.0)
}

/// Score of a decided game from White's point of view.
///
/// `balance` is White's discs minus Black's discs (or the equivalent
/// material margin for another game).
#[inline]
pub fn decided_score(balance: i32) -> Score {
    match balance.signum() {
        1 => WIN_SCORE + balance,
        -1 => -WIN_SCORE + balance,
        _ => 0,
    }
}

/// Whether a score can only come from a decided game.
#[inline]
pub fn is_decided(score: Score) -> bool {
    score.abs() >= WIN_SCORE
}
