//! ハイパーバイザ管理APIのインタフェース定義と実装群.
//!
//! このモジュールは、ディスクアダプタが利用する外部協調者を抽象化する:
//!
//! - [ManagementApi]: ハイパーバイザの管理API(REST)に対する同期的なクライアント
//! - [ImageStore]: イメージのバイト列を取得するためのAPI
//!
//! HTTP通信やタイムアウト、リトライ等はこれらの実装側の責務であり、このcrateは関与しない.
//!
//! [ManagementApi]: trait.ManagementApi.html
//! [ImageStore]: trait.ImageStore.html
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::Read;

pub use self::memory::{MemoryApi, MemoryImageStore, UploadRecord};

use crate::model::{
    Cluster, LogicalUnit, Partition, PartitionFilter, SharedStoragePool, VirtualDisk,
    VirtualIoServer, VolumeGroup,
};
use crate::Result;

mod memory;

/// VIOSの読み書き時に取得・更新対象とする拡張属性グループ.
///
/// 指定されなかったグループの属性は、読み込み結果に含まれない.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Xag {
    /// SCSIマッピング.
    ScsiMapping,

    /// ストレージ(ボリュームグループ等).
    Storage,
}

/// ハイパーバイザの管理APIを表すトレイト.
///
/// 全ての呼び出しは同期的であり、リモート呼び出しが完了するまで呼び出しスレッドをブロックする.
///
/// # エラー
///
/// 実装は、管理APIのエラーを以下の種別で報告する必要がある:
///
/// - `ErrorKind::Http(404)`: 対象のエンティティが存在しない
/// - `ErrorKind::Http(409)`: 名前の衝突等、リクエストが現在の状態と競合している
/// - `ErrorKind::Http(412)`: 更新時に指定されたetagが最新のものと一致しない
/// - `ErrorKind::JobFailed`: 管理API上のジョブ(e.g., アップロード)が失敗した
///
/// ディスクアダプタはこれらのエラーを変換せずに、そのまま利用者へ伝搬する.
pub trait ManagementApi: Clone + Debug {
    /// ホスト上のパーティション一覧を取得する.
    fn list_partitions(&self, host_uuid: &str) -> Result<Vec<Partition>>;

    /// 条件に一致するパーティションを検索する.
    fn search_partitions(&self, filter: &PartitionFilter) -> Result<Vec<Partition>>;

    /// パーティションを取得する.
    fn read_partition(&self, partition_uuid: &str) -> Result<Partition>;

    /// パーティションの単一のプロパティ(e.g., `"PartitionState"`)の値を取得する.
    ///
    /// 返り値は、管理APIが返した生の文字列 (引用符等を含み得る).
    fn read_partition_property(&self, partition_uuid: &str, property: &str) -> Result<String>;

    /// ホスト上のVIOS一覧を取得する.
    fn list_vioses(&self, host_uuid: &str, xags: &[Xag]) -> Result<Vec<VirtualIoServer>>;

    /// 名前でVIOSを検索する.
    fn search_vioses(&self, name: &str) -> Result<Vec<VirtualIoServer>>;

    /// VIOSを取得する.
    fn read_vios(&self, vios_uuid: &str, xags: &[Xag]) -> Result<VirtualIoServer>;

    /// VIOSを更新する.
    ///
    /// `xags`で指定された拡張属性グループのみが更新対象となる.
    /// `vios.etag`が最新のものと異なる場合には`ErrorKind::Http(412)`エラーが返される.
    fn update_vios(&self, vios: &VirtualIoServer, xags: &[Xag]) -> Result<VirtualIoServer>;

    /// VIOS上のボリュームグループ一覧を取得する.
    fn list_volume_groups(&self, vios_uuid: &str) -> Result<Vec<VolumeGroup>>;

    /// ボリュームグループを取得する.
    fn read_volume_group(&self, vios_uuid: &str, vg_uuid: &str) -> Result<VolumeGroup>;

    /// ボリュームグループを更新する.
    ///
    /// 仮想ディスクの削除や容量変更に使われる.
    fn update_volume_group(&self, vios_uuid: &str, vg: &VolumeGroup) -> Result<VolumeGroup>;

    /// ボリュームグループ内に新しい仮想ディスクを作成し、そこにイメージを書き込む.
    ///
    /// 作成されるディスクのサイズは`disk_bytes`バイト.
    /// `image`からは`image_size`バイトが読み込まれる.
    fn upload_new_virtual_disk(
        &self,
        vios_uuid: &str,
        vg_uuid: &str,
        disk_name: &str,
        image: &mut dyn Read,
        image_size: u64,
        disk_bytes: u64,
    ) -> Result<VirtualDisk>;

    /// 名前でクラスタを検索する.
    fn search_clusters(&self, name: &str) -> Result<Vec<Cluster>>;

    /// 全てのクラスタを取得する.
    fn list_clusters(&self) -> Result<Vec<Cluster>>;

    /// クラスタを取得する.
    ///
    /// `etag`が指定されており、それが最新のものと一致する場合には`None`(i.e., 未変更)が返される.
    fn read_cluster(&self, cluster_uuid: &str, etag: Option<&str>) -> Result<Option<Cluster>>;

    /// 共有ストレージプールを取得する.
    ///
    /// `etag`が指定されており、それが最新のものと一致する場合には`None`(i.e., 未変更)が返される.
    fn read_shared_storage_pool(
        &self,
        ssp_uuid: &str,
        etag: Option<&str>,
    ) -> Result<Option<SharedStoragePool>>;

    /// 共有ストレージプールを更新する.
    ///
    /// `logical_units`の内容がそのまま反映される.
    /// 追加されたLU(i.e., UDIDが空のもの)には、管理API側で新しいUDIDが割り当てられる.
    fn update_shared_storage_pool(&self, ssp: &SharedStoragePool) -> Result<SharedStoragePool>;

    /// 作成済みのイメージLUに対して、VIOS経由でイメージのバイト列を書き込む.
    fn upload_logical_unit(
        &self,
        vios_uuid: &str,
        lu: &LogicalUnit,
        image: &mut dyn Read,
        image_size: u64,
    ) -> Result<()>;
}

/// イメージのバイト列を取得するためのトレイト.
pub trait ImageStore: Debug {
    /// 指定されたイメージのバイト列を読み込むためのストリームを返す.
    fn download(&self, image_id: &str) -> Result<Box<dyn Read>>;
}

/// ホスト上のVIOSの名前からUUIDへのマップを返す.
pub fn vios_name_map<A: ManagementApi>(api: &A, host_uuid: &str) -> Result<HashMap<String, String>> {
    let vioses = track!(api.list_vioses(host_uuid, &[]))?;
    Ok(vioses.into_iter().map(|v| (v.name, v.uuid)).collect())
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn vios_name_map_works() -> TestResult {
        let api = MemoryApi::new();
        api.add_vios("host", "vios1", "V1");
        api.add_vios("host", "vios2", "V2");
        api.add_vios("other_host", "vios3", "V3");

        let map = track!(vios_name_map(&api, "host"))?;
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("vios1").map(String::as_str), Some("V1"));
        assert_eq!(map.get("vios2").map(String::as_str), Some("V2"));
        Ok(())
    }
}
