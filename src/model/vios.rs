use crate::model::StorageElement;

/// 仮想I/Oサーバ(VIOS).
///
/// ゲストVMに対するストレージやネットワークのアクセスを仲介するサービスパーティション.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualIoServer {
    /// VIOSのUUID.
    pub uuid: String,

    /// VIOS名.
    pub name: String,

    /// VIOSが稼働しているホスト(managed system)のUUID.
    pub host_uuid: String,

    /// VIOS上のSCSIマッピング群.
    ///
    /// 読み込み時に`Xag::ScsiMapping`が指定されていない場合には、常に空となる.
    pub scsi_mappings: Vec<ScsiMapping>,

    /// 楽観的排他制御用のetag.
    pub etag: String,
}

/// ストレージ要素とVMの対応付け.
///
/// マッピングはVIOS単位で存在し、これによりゲストからディスクが見えるようになる.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScsiMapping {
    /// マッピング先のパーティションのUUID (大文字に正規化されたもの).
    pub client_partition_uuid: String,

    /// マッピングの裏付けとなるストレージ要素.
    pub backing_storage: StorageElement,
}
impl ScsiMapping {
    /// 新しい`ScsiMapping`インスタンスを生成する.
    pub fn new(client_partition_uuid: &str, backing_storage: StorageElement) -> Self {
        ScsiMapping {
            client_partition_uuid: client_partition_uuid.to_uppercase(),
            backing_storage,
        }
    }

    /// マッピング先が`partition_uuid`かどうかを判定する (大文字小文字は区別しない).
    pub fn is_client(&self, partition_uuid: &str) -> bool {
        self.client_partition_uuid
            .eq_ignore_ascii_case(partition_uuid)
    }
}
