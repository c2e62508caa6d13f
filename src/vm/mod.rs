//! VM(パーティション)の識別と状態参照.
//!
//! オーケストレータ側のインスタンス名から、ハイパーバイザ側のパーティションUUIDを解決するための
//! キャッシュ([UuidCache])と、パーティションの稼働状態を参照するための[InstanceInfo]を提供する.
//!
//! [UuidCache]: struct.UuidCache.html
//! [InstanceInfo]: struct.InstanceInfo.html
use crate::api::ManagementApi;
use crate::model::{Partition, PartitionFilter};
use crate::{ErrorKind, Result};

pub use self::cache::UuidCache;
pub use self::info::{InstanceInfo, PowerState};

mod cache;
mod info;

/// オーケストレータ側のVMインスタンスの記述子.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// インスタンス名.
    ///
    /// ハイパーバイザ側のパーティション名と等しい.
    pub name: String,

    /// オーケストレータが割り当てた安定な識別子.
    pub uuid: String,

    /// インスタンスの形状.
    pub flavor: Flavor,
}
impl Instance {
    /// 新しい`Instance`インスタンスを生成する.
    pub fn new(name: &str, uuid: &str, flavor: Flavor) -> Self {
        Instance {
            name: name.to_owned(),
            uuid: uuid.to_owned(),
            flavor,
        }
    }
}

/// インスタンスの形状(フレーバー).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flavor {
    /// メモリ量(MB単位).
    pub memory_mb: u64,

    /// 仮想CPU数.
    pub vcpus: u32,

    /// ルートディスクのサイズ(GB単位).
    pub root_gb: u64,
}

/// イメージのメタデータ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    /// イメージストア上での識別子.
    pub id: String,

    /// イメージのサイズ(バイト単位).
    pub size: u64,
}
impl ImageMeta {
    /// 新しい`ImageMeta`インスタンスを生成する.
    pub fn new(id: &str, size: u64) -> Self {
        ImageMeta {
            id: id.to_owned(),
            size,
        }
    }
}

/// 管理パーティションを取得する.
///
/// 管理パーティションはちょうど一つだけ存在する必要があり、
/// そうではない場合には`ErrorKind::InvalidAttribute`エラーが返される.
pub fn get_mgmt_partition<A: ManagementApi>(api: &A) -> Result<Partition> {
    let mut partitions = track!(api.search_partitions(&PartitionFilter::ManagementPartition))?;
    track_assert_eq!(
        partitions.len(),
        1,
        ErrorKind::InvalidAttribute,
        "Expected exactly one management partition"
    );
    Ok(partitions.remove(0))
}

/// ホスト上の全パーティションの名前一覧を返す.
pub fn get_partition_list<A: ManagementApi>(api: &A, host_uuid: &str) -> Result<Vec<String>> {
    let partitions = track!(api.list_partitions(host_uuid))?;
    Ok(partitions.into_iter().map(|p| p.name).collect())
}

/// インスタンスに対応するパーティションを取得する.
///
/// UUIDの解決には`cache`が使われる.
pub fn get_instance_partition<A: ManagementApi>(
    api: &A,
    cache: &mut UuidCache<A>,
    instance: &Instance,
) -> Result<Partition> {
    let uuid = track!(cache.lookup_required(&instance.name))?;
    match api.read_partition(&uuid) {
        Err(ref e) if e.is_not_found() => {
            cache.remove(&instance.name);
            track_panic!(ErrorKind::InstanceNotFound, "instance={}", instance.name);
        }
        result => track!(result),
    }
}
