/// 論理パーティション(LPAR).
///
/// 仮想マシン一つに対応する.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// パーティションのUUID.
    pub uuid: String,

    /// パーティション名.
    ///
    /// オーケストレータ側のインスタンス名と等しい.
    pub name: String,

    /// ホスト内でのパーティションID.
    pub id: u32,

    /// 管理APIが報告する稼働状態 (e.g., `"running"`).
    pub state: String,

    /// 管理APIサービスが稼働している管理パーティションかどうか.
    pub is_mgmt_partition: bool,
}

/// パーティション検索時の条件.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionFilter {
    /// 名前の完全一致.
    Name(String),

    /// 管理パーティションのみ.
    ManagementPartition,
}
impl PartitionFilter {
    /// `partition`がこの条件を満たすかどうかを判定する.
    pub fn matches(&self, partition: &Partition) -> bool {
        match self {
            PartitionFilter::Name(name) => partition.name == *name,
            PartitionFilter::ManagementPartition => partition.is_mgmt_partition,
        }
    }
}
