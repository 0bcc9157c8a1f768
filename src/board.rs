//! 盤面表現と`Position`トレイト
//!
//! 学習ループと探索が必要とする盤面操作を`Position`トレイトとして定義し、
//! その具体実装としてオセロのBitBoardを提供する。

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::score::{Score, decided_score};

/// 石の色（手番）を表す列挙型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    /// 黒（先手）
    Black = 0,
    /// 白
    White = 1,
}

impl Color {
    /// 反対の色を返す
    ///
    /// # Examples
    ///
    /// ```
    /// use evalforge::board::Color;
    ///
    /// assert_eq!(Color::Black.opposite(), Color::White);
    /// assert_eq!(Color::White.opposite(), Color::Black);
    /// ```
    #[inline]
    pub fn opposite(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// 白視点の評価値をこの色の視点に変換する符号
    #[inline]
    pub fn white_sign(self) -> Score {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }
}

/// ゲーム状態
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameStatus {
    /// 進行中
    Ongoing,
    /// 白勝ち
    WhiteWins,
    /// 黒勝ち
    BlackWins,
    /// 引き分け
    Draw,
}

impl GameStatus {
    /// 終局しているか
    #[inline]
    pub fn is_terminal(self) -> bool {
        self != GameStatus::Ongoing
    }
}

/// 探索・学習ループから見た盤面の契約
///
/// ハッシュ（フィンガープリント）、手番、合法手列挙、終局判定、
/// 着手の適用を提供する。コーパスの1行から`FromStr`で復元できること。
pub trait Position: Clone + Send + Sync + FromStr + 'static {
    /// 着手の型
    type Move: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    /// 着手インデックスの総数（履歴・カウンタームーブ表のサイズ）
    const MOVE_SLOTS: usize;

    /// 64ビットのフィンガープリント
    fn fingerprint(&self) -> u64;

    /// 手番
    fn side_to_move(&self) -> Color;

    /// 合法手を`moves`に書き込む（パスしかない場合はパスを1手として返す）
    fn generate_legal_moves(&self, moves: &mut Vec<Self::Move>);

    /// ゲーム状態
    fn status(&self) -> GameStatus;

    /// 着手を適用する
    fn apply_move(&mut self, mv: Self::Move);

    /// 着手列（PV）を順に適用する
    fn apply_variation(&mut self, variation: &[Self::Move]) {
        for &mv in variation {
            self.apply_move(mv);
        }
    }

    /// 着手を`0..MOVE_SLOTS`のインデックスに写像する
    fn move_index(mv: Self::Move) -> usize;

    /// 白視点の駒得（オセロでは白石数 - 黒石数）
    fn material_balance(&self) -> i32;

    /// 合法手をベクタで返す
    fn legal_moves(&self) -> Vec<Self::Move> {
        let mut moves = Vec::new();
        self.generate_legal_moves(&mut moves);
        moves
    }

    /// 終局局面の白視点スコア（進行中ならNone）
    fn decided_score_for_white(&self) -> Option<Score> {
        match self.status() {
            GameStatus::Ongoing => None,
            GameStatus::Draw => Some(0),
            _ => Some(decided_score(self.material_balance())),
        }
    }
}

/// 盤面文字列のパースエラー
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BoardParseError {
    /// マス数が64でない
    #[error("expected 64 cells, found {0}")]
    CellCount(usize),

    /// 不正なマス文字
    #[error("invalid cell character {0:?} at index {1}")]
    InvalidCell(char, usize),

    /// 手番の指定がない、または不正
    #[error("invalid side to move: {0:?}")]
    InvalidSide(String),
}

/// オセロの着手（0-63のマス、64=パス）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OthelloMove(u8);

impl OthelloMove {
    /// パス
    pub const PASS: OthelloMove = OthelloMove(64);

    /// マス番号から着手を作る
    #[inline]
    pub fn square(sq: u8) -> Self {
        debug_assert!(sq < 64);
        OthelloMove(sq)
    }

    /// パスかどうか
    #[inline]
    pub fn is_pass(self) -> bool {
        self.0 == 64
    }

    /// マス番号（パスなら64）
    #[inline]
    pub fn index(self) -> u8 {
        self.0
    }
}

/// Zobristハッシュテーブル
///
/// 固定シードのLCGで生成し、コンパイル時定数として保持する。
struct ZobristTable {
    black: [u64; 64],
    white: [u64; 64],
    turn: u64,
}

impl ZobristTable {
    const fn new() -> Self {
        const SEED: u64 = 0x1234_5678_9ABC_DEF0;

        let mut black = [0u64; 64];
        let mut white = [0u64; 64];
        let mut rng = SEED;

        let mut i = 0;
        while i < 64 {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            black[i] = rng;

            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            white[i] = rng;
            i += 1;
        }

        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);

        Self {
            black,
            white,
            turn: rng,
        }
    }
}

static ZOBRIST: ZobristTable = ZobristTable::new();

/// A列を除くマスク（東向きシフト後の折り返し防止）
const NOT_A_FILE: u64 = 0xfefe_fefe_fefe_fefe;
/// H列を除くマスク（西向きシフト後の折り返し防止）
const NOT_H_FILE: u64 = 0x7f7f_7f7f_7f7f_7f7f;

/// 8方向シフト
#[inline]
fn shift(bits: u64, dir: usize) -> u64 {
    match dir {
        0 => (bits << 1) & NOT_A_FILE, // 東
        1 => (bits >> 1) & NOT_H_FILE, // 西
        2 => bits << 8,                // 南
        3 => bits >> 8,                // 北
        4 => (bits << 9) & NOT_A_FILE, // 南東
        5 => (bits << 7) & NOT_H_FILE, // 南西
        6 => (bits >> 7) & NOT_A_FILE, // 北東
        _ => (bits >> 9) & NOT_H_FILE, // 北西
    }
}

/// `me`の合法手ビットマスク
fn legal_mask(me: u64, opp: u64) -> u64 {
    let empty = !(me | opp);
    let mut moves = 0u64;

    for dir in 0..8 {
        let mut x = shift(me, dir) & opp;
        for _ in 0..5 {
            x |= shift(x, dir) & opp;
        }
        moves |= shift(x, dir) & empty;
    }

    moves
}

/// `sq`に打ったときに返る石
fn flips_for(me: u64, opp: u64, sq: u8) -> u64 {
    let placed = 1u64 << sq;
    let mut flips = 0u64;

    for dir in 0..8 {
        let mut line = 0u64;
        let mut x = shift(placed, dir);
        while x & opp != 0 {
            line |= x;
            x = shift(x, dir);
        }
        if x & me != 0 {
            flips |= line;
        }
    }

    flips
}

/// オセロ盤面を表すBitBoard構造体
///
/// A1=bit 0, B1=bit 1, ..., H8=bit 63のマッピング。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitBoard {
    /// 黒石の配置ビットマスク
    pub black: u64,
    /// 白石の配置ビットマスク
    pub white: u64,
    turn: Color,
}

impl fmt::Debug for BitBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitBoard")
            .field("black", &format_args!("{:#018x}", self.black))
            .field("white", &format_args!("{:#018x}", self.white))
            .field("turn", &self.turn)
            .finish()
    }
}

impl BitBoard {
    /// 初期盤面を生成
    ///
    /// D4白、E4黒、D5黒、E5白の標準配置、黒番。
    ///
    /// # Examples
    ///
    /// ```
    /// use evalforge::board::BitBoard;
    ///
    /// let board = BitBoard::new();
    /// assert_eq!(board.black.count_ones(), 2);
    /// assert_eq!(board.white.count_ones(), 2);
    /// ```
    pub fn new() -> Self {
        Self {
            black: (1u64 << 28) | (1u64 << 35),
            white: (1u64 << 27) | (1u64 << 36),
            turn: Color::Black,
        }
    }

    /// 石配置と手番から盤面を作る（重なりがあれば黒を優先）
    pub fn from_masks(black: u64, white: u64, turn: Color) -> Self {
        Self {
            black,
            white: white & !black,
            turn,
        }
    }

    /// 現在の手番
    #[inline]
    pub fn turn(&self) -> Color {
        self.turn
    }

    /// 手番側の石
    #[inline]
    pub fn current_player(&self) -> u64 {
        match self.turn {
            Color::Black => self.black,
            Color::White => self.white,
        }
    }

    /// 相手側の石
    #[inline]
    pub fn opponent(&self) -> u64 {
        match self.turn {
            Color::Black => self.white,
            Color::White => self.black,
        }
    }

    /// 手番側の合法手ビットマスク
    #[inline]
    pub fn legal_mask(&self) -> u64 {
        legal_mask(self.current_player(), self.opponent())
    }

    /// 空きマス
    #[inline]
    pub fn empty(&self) -> u64 {
        !(self.black | self.white)
    }
}

impl Default for BitBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Position for BitBoard {
    type Move = OthelloMove;

    const MOVE_SLOTS: usize = 65;

    fn fingerprint(&self) -> u64 {
        let mut hash = 0u64;

        let mut bits = self.black;
        while bits != 0 {
            hash ^= ZOBRIST.black[bits.trailing_zeros() as usize];
            bits &= bits - 1;
        }

        let mut bits = self.white;
        while bits != 0 {
            hash ^= ZOBRIST.white[bits.trailing_zeros() as usize];
            bits &= bits - 1;
        }

        if self.turn == Color::White {
            hash ^= ZOBRIST.turn;
        }

        hash
    }

    #[inline]
    fn side_to_move(&self) -> Color {
        self.turn
    }

    fn generate_legal_moves(&self, moves: &mut Vec<OthelloMove>) {
        moves.clear();
        let mut mask = self.legal_mask();
        if mask == 0 {
            // 相手に手があればパスのみ
            if legal_mask(self.opponent(), self.current_player()) != 0 {
                moves.push(OthelloMove::PASS);
            }
            return;
        }
        while mask != 0 {
            moves.push(OthelloMove::square(mask.trailing_zeros() as u8));
            mask &= mask - 1;
        }
    }

    fn status(&self) -> GameStatus {
        let me = self.current_player();
        let opp = self.opponent();
        if legal_mask(me, opp) != 0 || legal_mask(opp, me) != 0 {
            return GameStatus::Ongoing;
        }
        match self.material_balance().signum() {
            1 => GameStatus::WhiteWins,
            -1 => GameStatus::BlackWins,
            _ => GameStatus::Draw,
        }
    }

    fn apply_move(&mut self, mv: OthelloMove) {
        if !mv.is_pass() {
            let me = self.current_player();
            let opp = self.opponent();
            debug_assert!(legal_mask(me, opp) & (1u64 << mv.0) != 0, "illegal move {mv:?}");

            let flips = flips_for(me, opp, mv.0);
            let me = me | flips | (1u64 << mv.0);
            let opp = opp & !flips;

            match self.turn {
                Color::Black => {
                    self.black = me;
                    self.white = opp;
                }
                Color::White => {
                    self.white = me;
                    self.black = opp;
                }
            }
        }
        self.turn = self.turn.opposite();
    }

    #[inline]
    fn move_index(mv: OthelloMove) -> usize {
        mv.0 as usize
    }

    #[inline]
    fn material_balance(&self) -> i32 {
        self.white.count_ones() as i32 - self.black.count_ones() as i32
    }
}

/// コーパス1行の形式: 64文字（`X`=黒, `O`=白, `-`=空）+ 空白 + 手番（`X`/`O`）
impl FromStr for BitBoard {
    type Err = BoardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let cells = parts.next().unwrap_or("");
        let side = parts.next().unwrap_or("");

        let count = cells.chars().count();
        if count != 64 {
            return Err(BoardParseError::CellCount(count));
        }

        let mut black = 0u64;
        let mut white = 0u64;
        for (i, c) in cells.chars().enumerate() {
            match c {
                'X' | 'x' | '*' => black |= 1u64 << i,
                'O' | 'o' => white |= 1u64 << i,
                '-' | '.' => {}
                other => return Err(BoardParseError::InvalidCell(other, i)),
            }
        }

        let turn = match side {
            "X" | "x" | "*" => Color::Black,
            "O" | "o" => Color::White,
            other => return Err(BoardParseError::InvalidSide(other.to_string())),
        };

        Ok(Self { black, white, turn })
    }
}

impl fmt::Display for BitBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sq in 0..64 {
            let bit = 1u64 << sq;
            let c = if self.black & bit != 0 {
                'X'
            } else if self.white & bit != 0 {
                'O'
            } else {
                '-'
            };
            write!(f, "{c}")?;
        }
        let side = match self.turn {
            Color::Black => 'X',
            Color::White => 'O',
        };
        write!(f, " {side}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_legal_moves() {
        // 初期局面の黒の合法手は4つ: D3(19), C4(26), F5(37), E6(44)
        let board = BitBoard::new();
        let moves = board.legal_moves();
        let squares: Vec<u8> = moves.iter().map(|m| m.index()).collect();
        assert_eq!(squares, vec![19, 26, 37, 44]);
    }

    #[test]
    fn test_apply_move_flips() {
        let mut board = BitBoard::new();
        board.apply_move(OthelloMove::square(19)); // D3
        assert_eq!(board.black.count_ones(), 4);
        assert_eq!(board.white.count_ones(), 1);
        assert_eq!(board.turn(), Color::White);
        assert_eq!(board.black & board.white, 0);
    }

    #[test]
    fn test_fingerprint_depends_on_turn() {
        let board = BitBoard::new();
        let mut passed = board;
        passed.apply_move(OthelloMove::PASS);
        assert_ne!(board.fingerprint(), passed.fingerprint());
        assert_eq!(board.fingerprint(), BitBoard::new().fingerprint());
    }

    #[test]
    fn test_record_round_trip() {
        let board = BitBoard::new();
        let text = board.to_string();
        let parsed: BitBoard = text.parse().unwrap();
        assert_eq!(parsed, board);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "".parse::<BitBoard>(),
            Err(BoardParseError::CellCount(0))
        );
        let bad_cell = format!("{}Z X", "-".repeat(63));
        assert!(matches!(
            bad_cell.parse::<BitBoard>(),
            Err(BoardParseError::InvalidCell('Z', 63))
        ));
        let no_side = "-".repeat(64);
        assert!(matches!(
            no_side.parse::<BitBoard>(),
            Err(BoardParseError::InvalidSide(_))
        ));
    }

    #[test]
    fn test_full_board_is_terminal() {
        // 全マス白 → 白勝ち
        let board = BitBoard::from_masks(0, u64::MAX, Color::Black);
        assert_eq!(board.status(), GameStatus::WhiteWins);
        assert!(board.legal_moves().is_empty());
        assert!(board.decided_score_for_white().unwrap() > 0);
    }

    #[test]
    fn test_pass_when_only_opponent_can_move() {
        // 黒: A1、白: B1、C1は空 → 白は打てず、黒はC1に打てる
        let board = BitBoard::from_masks(1, 1 << 1, Color::White);
        assert_eq!(board.status(), GameStatus::Ongoing);
        assert_eq!(board.legal_moves(), vec![OthelloMove::PASS]);
    }

    #[test]
    fn test_apply_variation() {
        let mut board = BitBoard::new();
        let first = board.legal_moves()[0];
        let mut expected = board;
        expected.apply_move(first);
        let second = expected.legal_moves()[0];
        expected.apply_move(second);

        board.apply_variation(&[first, second]);
        assert_eq!(board, expected);
    }
}
