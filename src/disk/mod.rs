//! VMのブートディスクを管理するためのディスクアダプタ群.
//!
//! [DiskAdapter]トレイトが、ストレージバックエンドに依らない共通のインタフェースを定義する.
//! 実装は以下の二つ:
//!
//! - [LocalDiskAdapter]: 単一のVIOS上のボリュームグループを使う
//! - [SspDiskAdapter]: 複数のVIOSに跨る共有ストレージプールを使う
//!
//! どちらを使うかは設定([DiskDriver])によって決まり、[DiskAdapterBuilder]経由で生成される.
//!
//! # ディスク名
//!
//! ディスクの名前は「インスタンスの識別情報」と「ディスク種別」から決定的に導出される([disk_name]).
//! そのため、作成後のディスクを拡張・切断する際にも、別途対応表を保存しておく必要はない.
//!
//! [DiskAdapter]: trait.DiskAdapter.html
//! [LocalDiskAdapter]: struct.LocalDiskAdapter.html
//! [SspDiskAdapter]: struct.SspDiskAdapter.html
//! [DiskDriver]: enum.DiskDriver.html
//! [DiskAdapterBuilder]: struct.DiskAdapterBuilder.html
//! [disk_name]: fn.disk_name.html
use slog::Logger;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use self::builder::{ConnectionInfo, DiskAdapterBuilder};
pub use self::local::LocalDiskAdapter;
pub use self::selector::{FirstNodeSelector, NodeSelector, RandomNodeSelector};
pub use self::ssp::SspDiskAdapter;

use crate::api::{ImageStore, ManagementApi, Xag};
use crate::mapping::{find_maps, DiskMatcher, MappingOp, MappingTransaction};
use crate::metrics::{AdapterMetrics, MappingMetrics};
use crate::model::{ElementKind, Partition, ScsiMapping, StorageElement};
use crate::vm::{get_mgmt_partition, ImageMeta, Instance, UuidCache};
use crate::{Error, ErrorKind, Result};

mod builder;
mod local;
mod selector;
mod ssp;

/// 1GBのバイト数.
pub const GIB: u64 = 1 << 30;

/// 短い形式のディスク名の最大長.
pub const MAX_SHORT_NAME_LEN: usize = 15;

/// 長い形式のディスク名の最大長.
pub const MAX_LONG_NAME_LEN: usize = 79;

/// ディスク種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiskType {
    /// ブートディスク.
    Boot,

    /// レスキュー用ディスク.
    Rescue,

    /// イメージ.
    Image,
}
impl DiskType {
    /// 種別を表す文字列を返す.
    pub fn as_str(self) -> &'static str {
        match self {
            DiskType::Boot => "boot",
            DiskType::Rescue => "rescue",
            DiskType::Image => "image",
        }
    }

    /// この種別のディスク名が持つ接頭辞を返す.
    pub fn name_prefix(self, style: DiskNameStyle) -> String {
        match style {
            DiskNameStyle::Short => format!("{}_", &self.as_str()[..1]),
            DiskNameStyle::Long => format!("{}_", self.as_str()),
        }
    }
}
impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for DiskType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "boot" => Ok(DiskType::Boot),
            "rescue" => Ok(DiskType::Rescue),
            "image" => Ok(DiskType::Image),
            _ => track_panic!(ErrorKind::InvalidAttribute, "Unknown disk type: {:?}", s),
        }
    }
}

/// ディスク名の形式.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiskNameStyle {
    /// 短い形式 (最大15文字).
    ///
    /// ボリュームグループ内の論理ボリューム名の長さ制限に合わせたもの.
    Short,

    /// 長い形式 (最大79文字).
    Long,
}

/// 管理APIが受け付けない文字を`_`に置換する.
///
/// 使用可能な文字は、英数字と`_`、`.`、`-`のみ.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '_',
        })
        .collect()
}

/// インスタンスとディスク種別から、ディスク名を導出する.
///
/// 同じ入力に対しては常に同じ名前が返される.
///
/// # Examples
///
/// ```
/// use viostor::disk::{disk_name, DiskNameStyle, DiskType};
/// use viostor::vm::{Flavor, Instance};
///
/// let instance = Instance::new("Inst Name", "d5065c2c-ac43-3fa6-af32-ea84a3960291", Flavor::default());
/// assert_eq!(disk_name(DiskType::Boot, &instance, DiskNameStyle::Short), "b_Inst_Nam_d506");
/// assert_eq!(disk_name(DiskType::Boot, &instance, DiskNameStyle::Long), "boot_Inst_Name");
/// ```
pub fn disk_name(disk_type: DiskType, instance: &Instance, style: DiskNameStyle) -> String {
    let (name, max_len) = match style {
        DiskNameStyle::Short => {
            let name = instance.name.chars().take(8).collect::<String>();
            let uuid = instance.uuid.chars().take(4).collect::<String>();
            (format!("{}{}_{}", disk_type.name_prefix(style), name, uuid), MAX_SHORT_NAME_LEN)
        }
        DiskNameStyle::Long => (
            format!("{}{}", disk_type.name_prefix(style), instance.name),
            MAX_LONG_NAME_LEN,
        ),
    };
    sanitize_name(&name).chars().take(max_len).collect()
}

/// イメージIDから、イメージLUの名前を導出する.
pub fn image_name(image_id: &str) -> String {
    sanitize_name(&format!("image_{}", image_id))
        .chars()
        .take(MAX_LONG_NAME_LEN)
        .collect()
}

/// GB単位のディスクサイズをバイト単位に変換する.
///
/// 結果が`floor`(通常はイメージのサイズ)未満の場合には`floor`が返される.
/// 結果がゼロの場合や`u64`で表現できない場合には`ErrorKind::ImageTooLarge`エラーが返される.
///
/// # Examples
///
/// ```
/// use viostor::disk::disk_gb_to_bytes;
///
/// assert_eq!(disk_gb_to_bytes(20, 50).unwrap(), 21474836480);
/// assert_eq!(disk_gb_to_bytes(0, 50).unwrap(), 50);
/// assert!(disk_gb_to_bytes(0, 0).is_err());
/// ```
pub fn disk_gb_to_bytes(disk_size_gb: u64, floor: u64) -> Result<u64> {
    let bytes = track_assert_some!(
        disk_size_gb.checked_mul(GIB),
        ErrorKind::ImageTooLarge,
        "disk_size_gb={}",
        disk_size_gb
    );
    let bytes = std::cmp::max(bytes, floor);
    track_assert!(bytes != 0, ErrorKind::ImageTooLarge, "Effective disk size is zero");
    Ok(bytes)
}

/// バイト数をGB単位に変換する (端数は切り上げ).
pub fn bytes_to_gb_ceil(bytes: u64) -> u64 {
    bytes / GIB + if bytes % GIB == 0 { 0 } else { 1 }
}

/// 共有ストレージの判定に使われる不透明なトークン.
///
/// `DiskAdapter::check_shared_storage_local`で生成され、
/// 他ホストの`DiskAdapter::check_shared_storage_remote`に渡される.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SharedStorageToken(String);
impl SharedStorageToken {
    /// 新しい`SharedStorageToken`インスタンスを生成する.
    pub fn new(token: &str) -> Self {
        SharedStorageToken(token.to_owned())
    }

    /// トークンの文字列表現を返す.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// ディスクドライバ(アダプタの種類).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiskDriver {
    /// ローカルのボリュームグループ (`"localdisk"`).
    Local,

    /// 共有ストレージプール (`"ssp"`).
    SharedStoragePool,
}
impl FromStr for DiskDriver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "localdisk" => Ok(DiskDriver::Local),
            "ssp" => Ok(DiskDriver::SharedStoragePool),
            _ => track_panic!(ErrorKind::InvalidAttribute, "Unknown disk driver: {:?}", s),
        }
    }
}

/// ディスクアダプタのインタフェース.
///
/// 全ての操作は同期的に管理APIを呼び出す.
/// 一つのインスタンスに対して、同時に複数の操作を実行してはいけない.
///
/// `tx`引数を取る操作は、以下の二通りの方法で実行できる:
///
/// - `None`を渡した場合: 使い捨てのトランザクションが内部で生成され、操作の完了前に実行される
/// - `Some`を渡した場合: 操作は渡されたトランザクションに積まれるだけで、実行は呼び出し元が行う
pub trait DiskAdapter {
    /// アダプタが使用する管理APIの型.
    type Api: ManagementApi;

    /// 管理APIを返す.
    fn api(&self) -> &Self::Api;

    /// ロガーを返す.
    fn logger(&self) -> &Logger;

    /// メトリクスを返す.
    fn metrics(&self) -> &AdapterMetrics;

    /// インスタンス名とパーティションUUIDの対応キャッシュを返す.
    fn uuid_cache(&mut self) -> &mut UuidCache<Self::Api>;

    /// このアダプタの設定を引き継いだ、新しいマッピングトランザクションを生成する.
    fn new_transaction(&self, name: &str) -> MappingTransaction<Self::Api>;

    /// ストレージプールの全体容量(GB単位)を返す.
    fn capacity(&mut self) -> Result<f64>;

    /// ストレージプールの使用量(GB単位)を返す.
    fn capacity_used(&mut self) -> Result<f64>;

    /// イメージからディスクを作成する.
    ///
    /// ディスクのサイズは、`disk_size_gb`とイメージのサイズの大きい方となる.
    fn create_disk_from_image(
        &mut self,
        instance: &Instance,
        image: &ImageMeta,
        disk_size_gb: u64,
        disk_type: DiskType,
    ) -> Result<StorageElement>;

    /// ディスクをインスタンスに接続する.
    fn connect_disk(
        &mut self,
        instance: &Instance,
        disk: &StorageElement,
        tx: Option<&mut MappingTransaction<Self::Api>>,
    ) -> Result<()>;

    /// インスタンスからディスクを切断し、切断されたストレージ要素群を返す.
    ///
    /// `disk_types`が`None`の場合には、このアダプタが管理する全てのディスクが対象となる.
    /// 同じ要素が複数のVIOSでマッピングされていた場合でも、結果に含まれるのは一つだけ.
    ///
    /// 結果は、トランザクションへの登録時点でのVIOSのスナップショットから計算される.
    fn disconnect_disk(
        &mut self,
        instance: &Instance,
        tx: Option<&mut MappingTransaction<Self::Api>>,
        disk_types: Option<&[DiskType]>,
    ) -> Result<Vec<StorageElement>>;

    /// ストレージ要素群を削除する.
    ///
    /// 既に存在しない要素は無視される.
    fn delete_disks(&mut self, elements: &[StorageElement]) -> Result<()>;

    /// インスタンスのディスクを`new_size_gb`に拡張する.
    ///
    /// 対象のディスクが存在しない場合には`ErrorKind::DiskNotFound`エラーが返される.
    fn extend_disk(&mut self, instance: &Instance, disk_type: DiskType, new_size_gb: u64)
        -> Result<()>;

    /// 共有ストレージ判定の第一段階: 比較用のトークンを生成する.
    ///
    /// ストレージを共有し得ないアダプタは`None`を返す.
    fn check_shared_storage_local(&mut self) -> Result<Option<SharedStorageToken>>;

    /// 共有ストレージ判定の第二段階: 他ホストで生成されたトークンと自身のものを比較する.
    fn check_shared_storage_remote(&mut self, token: Option<&SharedStorageToken>) -> Result<bool>;

    /// 共有ストレージ判定の後始末.
    fn check_shared_storage_cleanup(&mut self, token: Option<SharedStorageToken>) -> Result<()> {
        let _ = token;
        Ok(())
    }

    /// インスタンスのブートディスクと、それをパーティション`partition_uuid`にマッピングしているVIOSの組を列挙する.
    fn instance_disk_iter(
        &mut self,
        instance: &Instance,
        partition_uuid: &str,
    ) -> Result<Vec<(StorageElement, String)>>;

    /// インスタンスのブートディスクを管理パーティションに接続する.
    ///
    /// `mgmt`が`None`の場合には、管理パーティションは管理APIから探索される.
    /// ディスクを持つ最初のVIOSで接続に成功した時点で、(ディスク、VIOSのUUID、管理パーティション)を返す.
    /// 全てのVIOSで失敗した場合には`ErrorKind::InstanceDiskMappingFailed`エラーが返される.
    fn connect_instance_disk_to_mgmt(
        &mut self,
        instance: &Instance,
        mgmt: Option<&Partition>,
    ) -> Result<(StorageElement, String, Partition)> {
        let mgmt = match mgmt {
            Some(p) => p.clone(),
            None => track!(get_mgmt_partition(self.api()))?,
        };
        let partition_uuid = track!(self.uuid_cache().lookup_required(&instance.name))?;
        let disks = track!(self.instance_disk_iter(instance, &partition_uuid))?;
        for (disk, vios_uuid) in disks {
            let mut tx = self.new_transaction("connect_instance_disk_to_mgmt");
            tx.add_op(
                &vios_uuid,
                MappingOp::Add(ScsiMapping::new(&mgmt.uuid, disk.clone())),
            );
            match tx.execute() {
                Ok(_) => {
                    info!(self.logger(), "Connected instance disk to management partition";
                          "instance" => &instance.name, "disk" => %disk, "vios" => &vios_uuid);
                    return Ok((disk, vios_uuid, mgmt));
                }
                Err(e) => {
                    warn!(self.logger(), "Cannot map instance disk to management partition";
                          "instance" => &instance.name, "vios" => &vios_uuid, "error" => %e);
                }
            }
        }
        track_panic!(
            ErrorKind::InstanceDiskMappingFailed,
            "instance={}, mgmt={}",
            instance.name,
            mgmt.name
        );
    }

    /// `connect_instance_disk_to_mgmt`で作成したマッピングを削除する.
    fn disconnect_disk_from_mgmt(&mut self, vios_uuid: &str, disk_name: &str) -> Result<()> {
        let mgmt = track!(get_mgmt_partition(self.api()))?;
        let mut tx = self.new_transaction("disconnect_disk_from_mgmt");
        tx.add_op(
            vios_uuid,
            MappingOp::Remove {
                client_partition_uuid: mgmt.uuid.clone(),
                matcher: DiskMatcher::any().name(disk_name),
            },
        );
        track!(tx.execute())?;
        info!(self.logger(), "Disconnected disk from management partition";
              "disk" => disk_name, "vios" => vios_uuid);
        Ok(())
    }
}

/// 設定によって選択される、いずれかのディスクアダプタ.
#[derive(Debug)]
pub enum StorageAdapter<A> {
    /// ローカルのボリュームグループ.
    Local(LocalDiskAdapter<A>),

    /// 共有ストレージプール.
    SharedStoragePool(SspDiskAdapter<A>),
}
impl<A: ManagementApi> StorageAdapter<A> {
    /// アダプタの種類を返す.
    pub fn driver(&self) -> DiskDriver {
        match self {
            StorageAdapter::Local(_) => DiskDriver::Local,
            StorageAdapter::SharedStoragePool(_) => DiskDriver::SharedStoragePool,
        }
    }
}
macro_rules! delegate {
    ($self:expr, $a:ident => $e:expr) => {
        match $self {
            StorageAdapter::Local($a) => $e,
            StorageAdapter::SharedStoragePool($a) => $e,
        }
    };
}
impl<A: ManagementApi> DiskAdapter for StorageAdapter<A> {
    type Api = A;

    fn api(&self) -> &A {
        delegate!(self, a => a.api())
    }

    fn logger(&self) -> &Logger {
        delegate!(self, a => a.logger())
    }

    fn metrics(&self) -> &AdapterMetrics {
        delegate!(self, a => a.metrics())
    }

    fn uuid_cache(&mut self) -> &mut UuidCache<A> {
        delegate!(self, a => a.uuid_cache())
    }

    fn new_transaction(&self, name: &str) -> MappingTransaction<A> {
        delegate!(self, a => a.new_transaction(name))
    }

    fn capacity(&mut self) -> Result<f64> {
        delegate!(self, a => track!(a.capacity()))
    }

    fn capacity_used(&mut self) -> Result<f64> {
        delegate!(self, a => track!(a.capacity_used()))
    }

    fn create_disk_from_image(
        &mut self,
        instance: &Instance,
        image: &ImageMeta,
        disk_size_gb: u64,
        disk_type: DiskType,
    ) -> Result<StorageElement> {
        delegate!(self, a => track!(a.create_disk_from_image(instance, image, disk_size_gb, disk_type)))
    }

    fn connect_disk(
        &mut self,
        instance: &Instance,
        disk: &StorageElement,
        tx: Option<&mut MappingTransaction<A>>,
    ) -> Result<()> {
        delegate!(self, a => track!(a.connect_disk(instance, disk, tx)))
    }

    fn disconnect_disk(
        &mut self,
        instance: &Instance,
        tx: Option<&mut MappingTransaction<A>>,
        disk_types: Option<&[DiskType]>,
    ) -> Result<Vec<StorageElement>> {
        delegate!(self, a => track!(a.disconnect_disk(instance, tx, disk_types)))
    }

    fn delete_disks(&mut self, elements: &[StorageElement]) -> Result<()> {
        delegate!(self, a => track!(a.delete_disks(elements)))
    }

    fn extend_disk(
        &mut self,
        instance: &Instance,
        disk_type: DiskType,
        new_size_gb: u64,
    ) -> Result<()> {
        delegate!(self, a => track!(a.extend_disk(instance, disk_type, new_size_gb)))
    }

    fn check_shared_storage_local(&mut self) -> Result<Option<SharedStorageToken>> {
        delegate!(self, a => track!(a.check_shared_storage_local()))
    }

    fn check_shared_storage_remote(&mut self, token: Option<&SharedStorageToken>) -> Result<bool> {
        delegate!(self, a => track!(a.check_shared_storage_remote(token)))
    }

    fn check_shared_storage_cleanup(&mut self, token: Option<SharedStorageToken>) -> Result<()> {
        delegate!(self, a => track!(a.check_shared_storage_cleanup(token)))
    }

    fn instance_disk_iter(
        &mut self,
        instance: &Instance,
        partition_uuid: &str,
    ) -> Result<Vec<(StorageElement, String)>> {
        delegate!(self, a => track!(a.instance_disk_iter(instance, partition_uuid)))
    }
}

/// 二つのアダプタ実装が共有する状態.
#[derive(Debug)]
pub(crate) struct AdapterCore<A> {
    api: A,
    image_store: Arc<dyn ImageStore>,
    host_uuid: String,
    cache: UuidCache<A>,
    logger: Logger,
    metrics: AdapterMetrics,
    mapping_metrics: MappingMetrics,
    etag_retries: usize,
}
impl<A: ManagementApi> AdapterCore<A> {
    fn new_transaction(&self, name: &str) -> MappingTransaction<A> {
        let mut tx = MappingTransaction::new(name, self.api.clone())
            .with_metrics(self.mapping_metrics.clone());
        tx.set_logger(self.logger.clone())
            .set_etag_retries(self.etag_retries);
        tx
    }

    fn partition_uuid(&mut self, instance: &Instance) -> Result<String> {
        track!(self.cache.lookup_required(&instance.name))
    }

    /// `tx`が`None`の場合には、使い捨てのトランザクションに`register`で操作を積んで即座に実行する.
    fn run_or_defer<F, T>(
        &self,
        name: &str,
        tx: Option<&mut MappingTransaction<A>>,
        register: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut MappingTransaction<A>) -> Result<T>,
    {
        match tx {
            Some(tx) => track!(register(tx)),
            None => {
                let mut tx = self.new_transaction(name);
                let value = track!(register(&mut tx))?;
                track!(tx.execute())?;
                Ok(value)
            }
        }
    }
}

fn disk_matcher(kind: ElementKind, disk_types: Option<&[DiskType]>, style: DiskNameStyle) -> DiskMatcher {
    let mut matcher = DiskMatcher::any().kind(kind);
    for t in disk_types.unwrap_or(&[]) {
        matcher = matcher.prefix(&t.name_prefix(style));
    }
    matcher
}

fn register_connect<A: ManagementApi>(
    tx: &mut MappingTransaction<A>,
    vios_uuids: &[String],
    partition_uuid: &str,
    disk: &StorageElement,
) {
    for vios_uuid in vios_uuids {
        let mapping = ScsiMapping::new(partition_uuid, disk.clone());
        tx.add_op(vios_uuid, MappingOp::Add(mapping));
    }
}

fn register_disconnect<A: ManagementApi>(
    tx: &mut MappingTransaction<A>,
    vios_uuids: &[String],
    partition_uuid: &str,
    matcher: &DiskMatcher,
) -> Result<Vec<StorageElement>> {
    let mut elements = Vec::new();
    for vios_uuid in vios_uuids {
        let wrapper = track!(tx.wrapper(vios_uuid))?;
        for m in find_maps(&wrapper.scsi_mappings, partition_uuid, matcher) {
            if !elements.contains(&m.backing_storage) {
                elements.push(m.backing_storage.clone());
            }
        }
        tx.add_op(
            vios_uuid,
            MappingOp::Remove {
                client_partition_uuid: partition_uuid.to_owned(),
                matcher: matcher.clone(),
            },
        );
    }
    Ok(elements)
}

fn find_instance_disks<A: ManagementApi>(
    api: &A,
    vios_uuids: &[String],
    partition_uuid: &str,
    disk_name: &str,
) -> Result<Vec<(StorageElement, String)>> {
    let matcher = DiskMatcher::any().name(disk_name);
    let mut disks = Vec::new();
    for vios_uuid in vios_uuids {
        let vios = track!(api.read_vios(vios_uuid, &[Xag::ScsiMapping]))?;
        for m in find_maps(&vios.scsi_mappings, partition_uuid, &matcher) {
            disks.push((m.backing_storage.clone(), vios_uuid.clone()));
        }
    }
    Ok(disks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Flavor;

    fn instance(name: &str) -> Instance {
        Instance::new(name, "d5065c2c-ac43-3fa6-af32-ea84a3960291", Flavor::default())
    }

    #[test]
    fn disk_name_works() {
        let i = instance("Inst Name");
        let short = disk_name(DiskType::Boot, &i, DiskNameStyle::Short);
        assert_eq!(short, "b_Inst_Nam_d506");
        assert_eq!(short, disk_name(DiskType::Boot, &i, DiskNameStyle::Short));

        let i = instance("Name Of Instance");
        assert_eq!(
            disk_name(DiskType::Boot, &i, DiskNameStyle::Short),
            "b_Name_Of__d506"
        );
        assert_eq!(
            disk_name(DiskType::Rescue, &i, DiskNameStyle::Short),
            "r_Name_Of__d506"
        );
        assert_eq!(
            disk_name(DiskType::Boot, &i, DiskNameStyle::Long),
            "boot_Name_Of_Instance"
        );

        let i = instance(&"x".repeat(100));
        let long = disk_name(DiskType::Rescue, &i, DiskNameStyle::Long);
        assert_eq!(long.len(), MAX_LONG_NAME_LEN);
        assert!(long.starts_with("rescue_xxx"));
    }

    #[test]
    fn image_name_works() {
        assert_eq!(image_name("fake_id"), "image_fake_id");
        assert_eq!(image_name("a b/c"), "image_a_b_c");
    }

    #[test]
    fn disk_gb_to_bytes_works() {
        assert_eq!(disk_gb_to_bytes(20, 50).ok(), Some(21_474_836_480));
        assert_eq!(disk_gb_to_bytes(1, 2 * GIB).ok(), Some(2 * GIB));

        let e = disk_gb_to_bytes(0, 0).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::ImageTooLarge));

        let e = disk_gb_to_bytes(u64::max_value(), 0).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::ImageTooLarge));
    }

    #[test]
    fn bytes_to_gb_ceil_works() {
        assert_eq!(bytes_to_gb_ceil(0), 0);
        assert_eq!(bytes_to_gb_ceil(50), 1);
        assert_eq!(bytes_to_gb_ceil(GIB), 1);
        assert_eq!(bytes_to_gb_ceil(GIB + 1), 2);
    }

    #[test]
    fn parse_works() {
        assert_eq!("boot".parse::<DiskType>().ok(), Some(DiskType::Boot));
        assert_eq!("rescue".parse::<DiskType>().ok(), Some(DiskType::Rescue));
        let e = "swap".parse::<DiskType>().err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidAttribute));

        assert_eq!("localdisk".parse::<DiskDriver>().ok(), Some(DiskDriver::Local));
        assert_eq!(
            "ssp".parse::<DiskDriver>().ok(),
            Some(DiskDriver::SharedStoragePool)
        );
        let e = "iscsi".parse::<DiskDriver>().err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidAttribute));
    }
}
