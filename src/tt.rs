//! 置換表（トランスポジションテーブル）
//!
//! フィンガープリントで直接インデックスするサイズ固定のハッシュ表。
//! チェイニングは行わず、衝突は保存時の置換戦略で解決する。
//!
//! # 置換戦略
//!
//! 占有スロットへの保存は、以下のいずれかを満たすときに既存エントリを置き換える
//! （上から順に判定）:
//!
//! 1. 既存エントリが同じフィンガープリント
//! 2. 既存エントリが古い世代（`birthday < generation`、`clear_table`済みを含む）
//! 3. 新しいエントリのノード予算が既存以上
//!
//! いずれも満たさない場合は保存を破棄し、コールバックも呼ばない。
//!
//! # スレッド安全性
//!
//! 1つのテーブルは1スレッドのみが使用する。コールバックに同期は不要。

use std::mem;

use crate::board::Position;
use crate::score::Score;

/// 探索ノード予算
pub type NodeBudget = i64;

/// `clear_table`で設定される世代（常に現世代より古い）
const STALE_BIRTHDAY: u32 = 0;

/// 置換表エントリの境界タイプ
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    /// 正確な評価値
    Exact,
    /// 下限（fail-high）
    Lower,
    /// 上限（fail-low）
    Upper,
}

/// 置換表エントリ
///
/// 保存されたフィンガープリントが照会キーと一致する場合のみ有効。
/// 部分的な更新は行わない。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TTEntry<M> {
    /// フィンガープリント（完全一致確認用）
    pub fingerprint: u64,
    /// 最善手
    pub best_move: Option<M>,
    /// 保存時の世代
    pub birthday: u32,
    /// 評価値（手番視点）
    pub score: Score,
    /// この結果の計算に使ったノード予算
    pub node_budget: NodeBudget,
    /// 境界タイプ
    pub kind: Bound,
}

/// 保存コールバック
pub type StoreCallback<P> = Box<dyn FnMut(&P, &TTEntry<<P as Position>::Move>) + Send>;

/// 照会統計
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TTStats {
    /// 照会回数
    pub probes: u64,
    /// ヒット回数
    pub hits: u64,
    /// 実際に書き込んだ回数
    pub stores: u64,
    /// 置換戦略で破棄された保存回数
    pub rejected: u64,
}

impl TTStats {
    /// ヒット率
    pub fn hit_rate(&self) -> f64 {
        if self.probes == 0 {
            0.0
        } else {
            self.hits as f64 / self.probes as f64
        }
    }
}

/// 置換表
pub struct TranspositionTable<P: Position> {
    /// エントリ配列
    entries: Vec<Option<TTEntry<P::Move>>>,
    /// 現在の世代
    generation: u32,
    /// 保存コールバック
    store_callback: Option<StoreCallback<P>>,
    /// 統計
    stats: TTStats,
}

impl<P: Position> std::fmt::Debug for TranspositionTable<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspositionTable")
            .field("capacity", &self.entries.len())
            .field("generation", &self.generation)
            .field("has_callback", &self.store_callback.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<P: Position> TranspositionTable<P> {
    /// エントリ数を指定して作成（最低1）
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity.max(1)],
            generation: STALE_BIRTHDAY + 1,
            store_callback: None,
            stats: TTStats::default(),
        }
    }

    /// バイト数を指定して作成
    pub fn with_size_bytes(bytes: usize) -> Self {
        Self::new(bytes / Self::entry_size())
    }

    /// 1エントリのバイト数
    pub fn entry_size() -> usize {
        mem::size_of::<Option<TTEntry<P::Move>>>()
    }

    /// サイズ変更（既存の内容は破棄）
    pub fn resize(&mut self, capacity: usize) {
        self.entries = vec![None; capacity.max(1)];
    }

    /// エントリ数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// 現在の世代
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    fn index(&self, fingerprint: u64) -> usize {
        (fingerprint % self.entries.len() as u64) as usize
    }

    /// 局面を検索
    ///
    /// 保存済みフィンガープリントが完全一致した場合のみヒット。
    pub fn probe(&mut self, fingerprint: u64) -> Option<&TTEntry<P::Move>> {
        self.stats.probes += 1;
        let idx = self.index(fingerprint);
        match &self.entries[idx] {
            Some(entry) if entry.fingerprint == fingerprint => {
                self.stats.hits += 1;
                Some(entry)
            }
            _ => None,
        }
    }

    /// 統計を更新しない検索
    pub fn peek(&self, fingerprint: u64) -> Option<&TTEntry<P::Move>> {
        match &self.entries[self.index(fingerprint)] {
            Some(entry) if entry.fingerprint == fingerprint => Some(entry),
            _ => None,
        }
    }

    /// 照会予定のスロットをキャッシュに先読みする（正しさには影響しない）
    #[inline]
    pub fn prefetch(&self, fingerprint: u64) {
        let ptr = &self.entries[self.index(fingerprint)] as *const Option<TTEntry<P::Move>>;

        #[cfg(target_arch = "x86_64")]
        {
            use std::arch::x86_64::{_MM_HINT_T0, _mm_prefetch};
            // SAFETY: ptrはentries内の有効な要素を指す。prefetchはヒントのみ。
            unsafe {
                _mm_prefetch(ptr as *const i8, _MM_HINT_T0);
            }
        }

        #[cfg(not(target_arch = "x86_64"))]
        {
            std::hint::black_box(ptr);
        }
    }

    /// 局面を保存
    ///
    /// 書き込みが行われた場合、登録済みのコールバックを同期的に呼び出す。
    pub fn store(
        &mut self,
        board: &P,
        best_move: Option<P::Move>,
        score: Score,
        node_budget: NodeBudget,
        kind: Bound,
    ) {
        let fingerprint = board.fingerprint();
        let idx = self.index(fingerprint);

        let replace = match &self.entries[idx] {
            None => true,
            Some(existing) => {
                existing.fingerprint == fingerprint
                    || existing.birthday < self.generation
                    || node_budget >= existing.node_budget
            }
        };

        if !replace {
            self.stats.rejected += 1;
            return;
        }

        let entry = TTEntry {
            fingerprint,
            best_move,
            birthday: self.generation,
            score,
            node_budget,
            kind,
        };
        self.entries[idx] = Some(entry);
        self.stats.stores += 1;

        if let Some(callback) = self.store_callback.as_mut() {
            callback(board, &entry);
        }
    }

    /// 世代を進める
    pub fn age_table(&mut self) {
        self.generation = self.generation.wrapping_add(1).max(STALE_BIRTHDAY + 1);
    }

    /// 全エントリを古い世代にする（次の保存で必ず置換される）
    ///
    /// メモリは解放せず、照会は引き続きヒットする。
    pub fn clear_table(&mut self) {
        for entry in self.entries.iter_mut().flatten() {
            entry.birthday = STALE_BIRTHDAY;
        }
    }

    /// 全エントリを無効化する（以後の照会はすべてミス）
    pub fn invalidate_all_entries(&mut self) {
        for slot in self.entries.iter_mut() {
            *slot = None;
        }
    }

    /// 保存コールバックを登録する（既存のものは置き換える）
    pub fn set_store_callback(&mut self, callback: StoreCallback<P>) {
        self.store_callback = Some(callback);
    }

    /// 保存コールバックを解除する
    pub fn clear_store_callback(&mut self) {
        self.store_callback = None;
    }

    /// 占有スロットの割合
    pub fn occupancy(&self) -> f64 {
        let used = self.entries.iter().filter(|e| e.is_some()).count();
        used as f64 / self.entries.len() as f64
    }

    /// 統計
    pub fn stats(&self) -> TTStats {
        self.stats
    }

    /// 統計をリセット
    pub fn reset_stats(&mut self) {
        self.stats = TTStats::default();
    }
}
