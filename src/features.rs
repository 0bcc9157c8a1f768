//! Position-to-vector feature conversion.
//!
//! The value network consumes a fixed-length `f32` vector per position.
//! [`FeatureConverter`] is the seam; [`OthelloFeatures`] is the converter
//! used with [`BitBoard`].

use crate::board::{BitBoard, Color, OthelloMove, Position};

/// Maps a position to a fixed-length numeric vector.
pub trait FeatureConverter<P: Position>: Clone + Send + Sync + 'static {
    /// Fixed dimensionality of the output vector.
    fn num_features(&self) -> usize;

    /// Write the features of `pos` into `out` (cleared first).
    fn convert_into(&self, pos: &P, out: &mut Vec<f32>);

    /// Convenience wrapper returning a fresh vector.
    fn convert(&self, pos: &P) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.num_features());
        self.convert_into(pos, &mut out);
        out
    }
}

/// Number of features produced by [`OthelloFeatures`].
///
/// 64 black-occupancy + 64 white-occupancy + side to move + disc balance
/// + mobility balance.
pub const OTHELLO_NUM_FEATURES: usize = 64 + 64 + 3;

/// Occupancy and mobility features for Othello.
///
/// Features are absolute (not side-relative) because the network scores
/// positions from White's point of view.
#[derive(Clone, Copy, Debug, Default)]
pub struct OthelloFeatures;

impl FeatureConverter<BitBoard> for OthelloFeatures {
    fn num_features(&self) -> usize {
        OTHELLO_NUM_FEATURES
    }

    fn convert_into(&self, pos: &BitBoard, out: &mut Vec<f32>) {
        out.clear();
        out.reserve(OTHELLO_NUM_FEATURES);

        for sq in 0..64 {
            out.push(((pos.black >> sq) & 1) as f32);
        }
        for sq in 0..64 {
            out.push(((pos.white >> sq) & 1) as f32);
        }

        out.push(match pos.side_to_move() {
            Color::White => 1.0,
            Color::Black => -1.0,
        });

        out.push(pos.material_balance() as f32 / 64.0);

        let mobility = pos.legal_mask().count_ones() as f32;
        let mut flipped = *pos;
        flipped.apply_move(OthelloMove::PASS);
        let opp_mobility = flipped.legal_mask().count_ones() as f32;
        let white_mobility = match pos.side_to_move() {
            Color::White => mobility - opp_mobility,
            Color::Black => opp_mobility - mobility,
        };
        out.push(white_mobility / 32.0);

        debug_assert_eq!(out.len(), OTHELLO_NUM_FEATURES);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_length() {
        let features = OthelloFeatures.convert(&BitBoard::new());
        assert_eq!(features.len(), OTHELLO_NUM_FEATURES);
        assert_eq!(OthelloFeatures.num_features(), OTHELLO_NUM_FEATURES);
    }

    #[test]
    fn test_initial_position_features() {
        let features = OthelloFeatures.convert(&BitBoard::new());
        let black_count: f32 = features[..64].iter().sum();
        let white_count: f32 = features[64..128].iter().sum();
        assert_eq!(black_count, 2.0);
        assert_eq!(white_count, 2.0);
        assert_eq!(features[128], -1.0); // black to move
        assert_eq!(features[129], 0.0);
        assert_eq!(features[130], 0.0); // symmetric mobility
    }

    #[test]
    fn test_convert_into_reuses_buffer() {
        let mut buf = vec![9.0; 500];
        OthelloFeatures.convert_into(&BitBoard::new(), &mut buf);
        assert_eq!(buf.len(), OTHELLO_NUM_FEATURES);
    }
}
