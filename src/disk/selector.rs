use rand::Rng;
use std::fmt::Debug;

/// 特定のVMに紐付かない操作(e.g., イメージのアップロード)を実行するノードを選択するためのトレイト.
pub trait NodeSelector: Debug + Send + Sync {
    /// `candidates`(VIOSのUUID群)の中から一つを選び、そのインデックスを返す.
    ///
    /// `candidates`が空の場合には`None`を返す.
    fn select(&self, candidates: &[String]) -> Option<usize>;
}

/// 候補の中から一様ランダムにノードを選択する`NodeSelector`の実装.
#[derive(Debug, Default, Clone)]
pub struct RandomNodeSelector;
impl NodeSelector for RandomNodeSelector {
    fn select(&self, candidates: &[String]) -> Option<usize> {
        if candidates.is_empty() {
            None
        } else {
            Some(rand::thread_rng().gen_range(0..candidates.len()))
        }
    }
}

/// 常に先頭のノードを選択する`NodeSelector`の実装.
///
/// 結果を決定的にしたいテスト等で使う.
#[derive(Debug, Default, Clone)]
pub struct FirstNodeSelector;
impl NodeSelector for FirstNodeSelector {
    fn select(&self, candidates: &[String]) -> Option<usize> {
        if candidates.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}
