//! evalforge - 自己対戦TD(λ)学習による評価関数の強化
//!
//! 置換表・評価キャッシュ付きのノード予算探索で自己対戦ロールアウトを生成し、
//! TD(λ)目標値で価値ネットワークを再学習する。

pub mod board;
pub mod evaluator;
pub mod features;
pub mod learning;
pub mod network;
pub mod score;
pub mod search;
pub mod tt;

pub use board::{BitBoard, Color, Position};
pub use evaluator::{EvalCache, Evaluator, MaterialEvaluator};
pub use features::{FeatureConverter, OthelloFeatures};
pub use network::{ValueModel, ValueNetwork};
pub use score::Score;
pub use search::{SearchHeuristics, SearchResult, search_node_limited};
pub use tt::{Bound, NodeBudget, TranspositionTable};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitboard_size() {
        // 盤面2枚と手番で24バイト以内
        assert!(std::mem::size_of::<BitBoard>() <= 24);
    }

    #[test]
    fn test_color_opposite() {
        assert_eq!(Color::White.opposite(), Color::Black);
        assert_eq!(Color::Black.opposite(), Color::White);
    }

    #[test]
    fn test_bitboard_traits() {
        // Copy, PartialEq, Debug
        let board1 = BitBoard::new();
        let board2 = board1;

        assert_eq!(board1, board2);
        assert_eq!(board1.side_to_move(), Color::Black);
        assert!(!format!("{:?}", board1).is_empty());
    }

    #[test]
    fn test_default_stack_dimensions_agree() {
        let mut rng = rand::rng();
        let net = ValueNetwork::new(OthelloFeatures.num_features(), 4, 0.01, &mut rng);
        let cache: EvalCache<BitBoard, _, _> = EvalCache::new(net, OthelloFeatures, 16);
        assert_eq!(cache.model().num_inputs(), features::OTHELLO_NUM_FEATURES);
    }
}
