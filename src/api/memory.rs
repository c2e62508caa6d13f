use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::api::{ImageStore, ManagementApi, Xag};
use crate::model::{
    Cluster, LogicalUnit, Partition, PartitionFilter, ScsiMapping, SharedStoragePool, VirtualDisk,
    VirtualIoServer, VolumeGroup,
};
use crate::{Error, ErrorKind, Result};

const GIB: f64 = (1u64 << 30) as f64;

/// メモリベースの`ManagementApi`の実装.
///
/// ハイパーバイザの状態(パーティション、VIOS、ボリュームグループ、クラスタ、共有ストレージプール)を
/// メモリ上に保持し、管理APIと同じエラー規約(404/409/412等)で応答する.
///
/// インスタンスは`clone`で共有可能であり、クローン間では同じ状態が参照される.
///
/// # 注意
///
/// これは主にテスト用途を意図した実装である.
/// そのため、各操作の呼び出し回数の取得や、エラーの注入といった補助機能も備えている.
#[derive(Debug, Clone, Default)]
pub struct MemoryApi {
    state: Arc<Mutex<State>>,
}
impl MemoryApi {
    /// 空の`MemoryApi`インスタンスを生成する.
    pub fn new() -> Self {
        Self::default()
    }

    /// ホスト上にパーティションを追加する.
    pub fn add_partition(&self, host_uuid: &str, partition: Partition) {
        self.setup(|s| s.partitions.push((host_uuid.to_owned(), partition)));
    }

    /// パーティションを削除する.
    pub fn remove_partition(&self, partition_uuid: &str) {
        self.setup(|s| {
            s.partitions
                .retain(|(_, p)| !p.uuid.eq_ignore_ascii_case(partition_uuid))
        });
    }

    /// ホスト上にVIOSを追加する.
    pub fn add_vios(&self, host_uuid: &str, name: &str, vios_uuid: &str) {
        self.setup(|s| {
            let etag = s.next_etag();
            s.vioses.push(VirtualIoServer {
                uuid: vios_uuid.to_owned(),
                name: name.to_owned(),
                host_uuid: host_uuid.to_owned(),
                scsi_mappings: Vec::new(),
                etag,
            });
        });
    }

    /// VIOSを削除する.
    pub fn remove_vios(&self, vios_uuid: &str) {
        self.setup(|s| s.vioses.retain(|v| v.uuid != vios_uuid));
    }

    /// VIOSにSCSIマッピングを直接追加する.
    pub fn add_scsi_mapping(&self, vios_uuid: &str, mapping: ScsiMapping) {
        self.setup(|s| {
            let etag = s.next_etag();
            if let Some(v) = s.vioses.iter_mut().find(|v| v.uuid == vios_uuid) {
                v.scsi_mappings.push(mapping);
                v.etag = etag;
            }
        });
    }

    /// VIOSのetagだけを更新する.
    ///
    /// 他のクライアントによる並行更新を模擬するために使う.
    pub fn touch_vios(&self, vios_uuid: &str) {
        self.setup(|s| {
            let etag = s.next_etag();
            if let Some(v) = s.vioses.iter_mut().find(|v| v.uuid == vios_uuid) {
                v.etag = etag;
            }
        });
    }

    /// VIOSの現在の状態(全ての属性を含む)を返す.
    pub fn vios(&self, vios_uuid: &str) -> Option<VirtualIoServer> {
        self.inspect(|s| s.vioses.iter().find(|v| v.uuid == vios_uuid).cloned())
    }

    /// VIOS上にボリュームグループを追加する.
    ///
    /// `vg.etag`の値は無視され、新しいetagが割り当てられる.
    pub fn add_volume_group(&self, vios_uuid: &str, mut vg: VolumeGroup) {
        self.setup(|s| {
            vg.etag = s.next_etag();
            s.volume_groups.push((vios_uuid.to_owned(), vg));
        });
    }

    /// ボリュームグループの現在の状態を返す.
    pub fn volume_group(&self, vg_uuid: &str) -> Option<VolumeGroup> {
        self.inspect(|s| {
            s.volume_groups
                .iter()
                .find(|(_, vg)| vg.uuid == vg_uuid)
                .map(|(_, vg)| vg.clone())
        })
    }

    /// クラスタと、それが提供する共有ストレージプールを追加する.
    ///
    /// `cluster.ssp_uuid`は`ssp.uuid`で上書きされる.
    pub fn add_cluster(&self, mut cluster: Cluster, mut ssp: SharedStoragePool) {
        self.setup(|s| {
            cluster.ssp_uuid = ssp.uuid.clone();
            cluster.etag = s.next_etag();
            ssp.etag = s.next_etag();
            s.clusters.push(cluster);
            s.pools.push(ssp);
        });
    }

    /// クラスタを削除する.
    pub fn remove_cluster(&self, cluster_uuid: &str) {
        self.setup(|s| s.clusters.retain(|c| c.uuid != cluster_uuid));
    }

    /// 共有ストレージプールを削除する.
    pub fn remove_shared_storage_pool(&self, ssp_uuid: &str) {
        self.setup(|s| s.pools.retain(|p| p.uuid != ssp_uuid));
    }

    /// 共有ストレージプールの現在の状態を返す.
    pub fn shared_storage_pool(&self, ssp_uuid: &str) -> Option<SharedStoragePool> {
        self.inspect(|s| s.pools.iter().find(|p| p.uuid == ssp_uuid).cloned())
    }

    /// これまでに行われたアップロードの記録を返す.
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.inspect(|s| s.uploads.clone())
    }

    /// 指定された操作(`ManagementApi`のメソッド名)が呼び出された回数を返す.
    pub fn call_count(&self, call: &str) -> usize {
        self.inspect(|s| s.calls.get(call).cloned().unwrap_or(0))
    }

    /// 全ての操作の呼び出し回数をリセットする.
    pub fn reset_call_counts(&self) {
        self.setup(|s| s.calls.clear());
    }

    /// 指定された操作の次回の呼び出しを、`kind`のエラーで失敗させる.
    pub fn inject_error(&self, call: &'static str, kind: ErrorKind) {
        self.setup(|s| {
            s.injected.insert(call, kind);
        });
    }

    fn setup<F>(&self, f: F)
    where
        F: FnOnce(&mut State),
    {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }

    fn inspect<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&State) -> T,
    {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    fn call<F, T>(&self, call: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut State) -> Result<T>,
    {
        let mut state = track!(self.state.lock().map_err(Error::from))?;
        *state.calls.entry(call).or_insert(0) += 1;
        if let Some(kind) = state.injected.remove(call) {
            track_panic!(kind, "Injected error: call={}", call);
        }
        track!(f(&mut state))
    }
}
impl ManagementApi for MemoryApi {
    fn list_partitions(&self, host_uuid: &str) -> Result<Vec<Partition>> {
        self.call("list_partitions", |s| {
            Ok(s.partitions
                .iter()
                .filter(|(h, _)| h == host_uuid)
                .map(|(_, p)| p.clone())
                .collect())
        })
    }

    fn search_partitions(&self, filter: &PartitionFilter) -> Result<Vec<Partition>> {
        self.call("search_partitions", |s| {
            Ok(s.partitions
                .iter()
                .filter(|(_, p)| filter.matches(p))
                .map(|(_, p)| p.clone())
                .collect())
        })
    }

    fn read_partition(&self, partition_uuid: &str) -> Result<Partition> {
        self.call("read_partition", |s| {
            let p = track!(s.partition(partition_uuid))?;
            Ok(p.clone())
        })
    }

    fn read_partition_property(&self, partition_uuid: &str, property: &str) -> Result<String> {
        self.call("read_partition_property", |s| {
            let p = track!(s.partition(partition_uuid))?;
            match property {
                "PartitionState" => Ok(format!(" \"{}\"", p.state)),
                "PartitionName" => Ok(format!(" \"{}\"", p.name)),
                "PartitionID" => Ok(p.id.to_string()),
                _ => track_panic!(ErrorKind::Http(400), "Unknown property: {}", property),
            }
        })
    }

    fn list_vioses(&self, host_uuid: &str, xags: &[Xag]) -> Result<Vec<VirtualIoServer>> {
        self.call("list_vioses", |s| {
            Ok(s.vioses
                .iter()
                .filter(|v| v.host_uuid == host_uuid)
                .map(|v| project(v, xags))
                .collect())
        })
    }

    fn search_vioses(&self, name: &str) -> Result<Vec<VirtualIoServer>> {
        self.call("search_vioses", |s| {
            Ok(s.vioses
                .iter()
                .filter(|v| v.name == name)
                .map(|v| project(v, &[]))
                .collect())
        })
    }

    fn read_vios(&self, vios_uuid: &str, xags: &[Xag]) -> Result<VirtualIoServer> {
        self.call("read_vios", |s| {
            let v = track!(s.vios_mut(vios_uuid))?;
            Ok(project(v, xags))
        })
    }

    fn update_vios(&self, vios: &VirtualIoServer, xags: &[Xag]) -> Result<VirtualIoServer> {
        self.call("update_vios", |s| {
            let etag = s.next_etag();
            let current = track!(s.vios_mut(&vios.uuid))?;
            track_assert_eq!(
                current.etag,
                vios.etag,
                ErrorKind::Http(412),
                "Etag mismatch: vios={}",
                vios.uuid
            );
            if xags.contains(&Xag::ScsiMapping) {
                current.scsi_mappings = vios.scsi_mappings.clone();
            }
            current.etag = etag;
            Ok(project(current, xags))
        })
    }

    fn list_volume_groups(&self, vios_uuid: &str) -> Result<Vec<VolumeGroup>> {
        self.call("list_volume_groups", |s| {
            track!(s.vios_mut(vios_uuid))?;
            Ok(s.volume_groups
                .iter()
                .filter(|(v, _)| v == vios_uuid)
                .map(|(_, vg)| vg.clone())
                .collect())
        })
    }

    fn read_volume_group(&self, vios_uuid: &str, vg_uuid: &str) -> Result<VolumeGroup> {
        self.call("read_volume_group", |s| {
            let vg = track!(s.volume_group_mut(vios_uuid, vg_uuid))?;
            Ok(vg.clone())
        })
    }

    fn update_volume_group(&self, vios_uuid: &str, vg: &VolumeGroup) -> Result<VolumeGroup> {
        self.call("update_volume_group", |s| {
            let etag = s.next_etag();
            let current = track!(s.volume_group_mut(vios_uuid, &vg.uuid))?;
            track_assert_eq!(
                current.etag,
                vg.etag,
                ErrorKind::Http(412),
                "Etag mismatch: volume_group={}",
                vg.uuid
            );
            let used_before: f64 = current.virtual_disks.iter().map(|d| d.capacity_gb).sum();
            let used_after: f64 = vg.virtual_disks.iter().map(|d| d.capacity_gb).sum();
            current.available_gb -= used_after - used_before;
            current.virtual_disks = vg.virtual_disks.clone();
            current.etag = etag;
            Ok(current.clone())
        })
    }

    fn upload_new_virtual_disk(
        &self,
        vios_uuid: &str,
        vg_uuid: &str,
        disk_name: &str,
        image: &mut dyn Read,
        image_size: u64,
        disk_bytes: u64,
    ) -> Result<VirtualDisk> {
        self.call("upload_new_virtual_disk", |s| {
            let etag = s.next_etag();
            let udid = new_udid();
            let vg = track!(s.volume_group_mut(vios_uuid, vg_uuid))?;
            track_assert!(
                vg.virtual_disks.iter().all(|d| d.name != disk_name),
                ErrorKind::Http(409),
                "Virtual disk already exists: {}",
                disk_name
            );
            track!(consume_image(image, image_size))?;

            let disk = VirtualDisk {
                name: disk_name.to_owned(),
                udid,
                capacity_gb: disk_bytes as f64 / GIB,
            };
            vg.available_gb -= disk.capacity_gb;
            vg.virtual_disks.push(disk.clone());
            vg.etag = etag;
            s.uploads.push(UploadRecord {
                vios_uuid: vios_uuid.to_owned(),
                name: disk_name.to_owned(),
                image_size,
                disk_bytes,
            });
            Ok(disk)
        })
    }

    fn search_clusters(&self, name: &str) -> Result<Vec<Cluster>> {
        self.call("search_clusters", |s| {
            Ok(s.clusters.iter().filter(|c| c.name == name).cloned().collect())
        })
    }

    fn list_clusters(&self) -> Result<Vec<Cluster>> {
        self.call("list_clusters", |s| Ok(s.clusters.clone()))
    }

    fn read_cluster(&self, cluster_uuid: &str, etag: Option<&str>) -> Result<Option<Cluster>> {
        self.call("read_cluster", |s| {
            let cluster = track_assert_some!(
                s.clusters.iter().find(|c| c.uuid == cluster_uuid),
                ErrorKind::Http(404),
                "Cluster not found: {}",
                cluster_uuid
            );
            if etag == Some(cluster.etag.as_str()) {
                Ok(None)
            } else {
                Ok(Some(cluster.clone()))
            }
        })
    }

    fn read_shared_storage_pool(
        &self,
        ssp_uuid: &str,
        etag: Option<&str>,
    ) -> Result<Option<SharedStoragePool>> {
        self.call("read_shared_storage_pool", |s| {
            let ssp = track!(s.pool_mut(ssp_uuid))?;
            if etag == Some(ssp.etag.as_str()) {
                Ok(None)
            } else {
                Ok(Some(ssp.clone()))
            }
        })
    }

    fn update_shared_storage_pool(&self, ssp: &SharedStoragePool) -> Result<SharedStoragePool> {
        self.call("update_shared_storage_pool", |s| {
            let etag = s.next_etag();
            let current = track!(s.pool_mut(&ssp.uuid))?;
            track_assert_eq!(
                current.etag,
                ssp.etag,
                ErrorKind::Http(412),
                "Etag mismatch: shared_storage_pool={}",
                ssp.uuid
            );
            for (i, lu) in ssp.logical_units.iter().enumerate() {
                track_assert!(
                    ssp.logical_units[..i].iter().all(|x| x.name != lu.name),
                    ErrorKind::Http(409),
                    "Logical unit already exists: {}",
                    lu.name
                );
            }

            let used_before: f64 = current.logical_units.iter().map(|lu| lu.capacity_gb).sum();
            let used_after: f64 = ssp.logical_units.iter().map(|lu| lu.capacity_gb).sum();
            current.free_space_gb -= used_after - used_before;
            current.logical_units = ssp
                .logical_units
                .iter()
                .cloned()
                .map(|mut lu| {
                    if lu.udid.is_empty() {
                        lu.udid = new_udid();
                    }
                    lu
                })
                .collect();
            current.etag = etag;
            Ok(current.clone())
        })
    }

    fn upload_logical_unit(
        &self,
        vios_uuid: &str,
        lu: &LogicalUnit,
        image: &mut dyn Read,
        image_size: u64,
    ) -> Result<()> {
        self.call("upload_logical_unit", |s| {
            track!(s.vios_mut(vios_uuid))?;
            track_assert!(
                s.pools
                    .iter()
                    .any(|p| p.logical_units.iter().any(|x| x.udid == lu.udid)),
                ErrorKind::Http(404),
                "Logical unit not found: {}",
                lu.udid
            );
            track!(consume_image(image, image_size))?;
            s.uploads.push(UploadRecord {
                vios_uuid: vios_uuid.to_owned(),
                name: lu.name.clone(),
                image_size,
                disk_bytes: (lu.capacity_gb * GIB) as u64,
            });
            Ok(())
        })
    }
}

/// `MemoryApi`が受け付けたアップロードの記録.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    /// アップロードを中継したVIOSのUUID.
    pub vios_uuid: String,

    /// アップロード先のディスク(ないしLU)の名前.
    pub name: String,

    /// イメージのサイズ(バイト単位).
    pub image_size: u64,

    /// アップロード先のディスクのサイズ(バイト単位).
    pub disk_bytes: u64,
}

/// メモリベースの`ImageStore`の実装.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageStore {
    images: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}
impl MemoryImageStore {
    /// 空の`MemoryImageStore`インスタンスを生成する.
    pub fn new() -> Self {
        Self::default()
    }

    /// イメージを登録する.
    pub fn add_image(&self, image_id: &str, bytes: Vec<u8>) {
        let mut images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        images.insert(image_id.to_owned(), bytes);
    }
}
impl ImageStore for MemoryImageStore {
    fn download(&self, image_id: &str) -> Result<Box<dyn Read>> {
        let images = track!(self.images.lock().map_err(Error::from))?;
        let bytes = track_assert_some!(
            images.get(image_id).cloned(),
            ErrorKind::Http(404),
            "Image not found: {}",
            image_id
        );
        Ok(Box::new(Cursor::new(bytes)))
    }
}

#[derive(Debug, Default)]
struct State {
    last_etag: u64,
    partitions: Vec<(String, Partition)>,
    vioses: Vec<VirtualIoServer>,
    volume_groups: Vec<(String, VolumeGroup)>,
    clusters: Vec<Cluster>,
    pools: Vec<SharedStoragePool>,
    uploads: Vec<UploadRecord>,
    calls: HashMap<&'static str, usize>,
    injected: HashMap<&'static str, ErrorKind>,
}
impl State {
    fn next_etag(&mut self) -> String {
        self.last_etag += 1;
        self.last_etag.to_string()
    }

    fn partition(&self, partition_uuid: &str) -> Result<&Partition> {
        let p = track_assert_some!(
            self.partitions
                .iter()
                .map(|(_, p)| p)
                .find(|p| p.uuid.eq_ignore_ascii_case(partition_uuid)),
            ErrorKind::Http(404),
            "Partition not found: {}",
            partition_uuid
        );
        Ok(p)
    }

    fn vios_mut(&mut self, vios_uuid: &str) -> Result<&mut VirtualIoServer> {
        let v = track_assert_some!(
            self.vioses.iter_mut().find(|v| v.uuid == vios_uuid),
            ErrorKind::Http(404),
            "VIOS not found: {}",
            vios_uuid
        );
        Ok(v)
    }

    fn volume_group_mut(&mut self, vios_uuid: &str, vg_uuid: &str) -> Result<&mut VolumeGroup> {
        let vg = track_assert_some!(
            self.volume_groups
                .iter_mut()
                .find(|(v, vg)| v == vios_uuid && vg.uuid == vg_uuid)
                .map(|(_, vg)| vg),
            ErrorKind::Http(404),
            "Volume group not found: vios={}, vg={}",
            vios_uuid,
            vg_uuid
        );
        Ok(vg)
    }

    fn pool_mut(&mut self, ssp_uuid: &str) -> Result<&mut SharedStoragePool> {
        let p = track_assert_some!(
            self.pools.iter_mut().find(|p| p.uuid == ssp_uuid),
            ErrorKind::Http(404),
            "Shared storage pool not found: {}",
            ssp_uuid
        );
        Ok(p)
    }
}

fn project(vios: &VirtualIoServer, xags: &[Xag]) -> VirtualIoServer {
    let mut v = vios.clone();
    if !xags.contains(&Xag::ScsiMapping) {
        v.scsi_mappings.clear();
    }
    v
}

fn consume_image(image: &mut dyn Read, image_size: u64) -> Result<()> {
    let mut buf = Vec::new();
    track!(image.read_to_end(&mut buf).map_err(Error::from))?;
    track_assert_eq!(
        buf.len() as u64,
        image_size,
        ErrorKind::JobFailed,
        "Image size mismatch"
    );
    Ok(())
}

fn new_udid() -> String {
    format!("27{}", Uuid::new_v4().to_simple())
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    fn vg(uuid: &str, name: &str) -> VolumeGroup {
        VolumeGroup {
            uuid: uuid.to_owned(),
            name: name.to_owned(),
            capacity_gb: 100.0,
            available_gb: 100.0,
            virtual_disks: Vec::new(),
            etag: String::new(),
        }
    }

    #[test]
    fn update_with_stale_etag_fails() -> TestResult {
        let api = MemoryApi::new();
        api.add_vios("host", "vios1", "V1");

        let vios = track!(api.read_vios("V1", &[Xag::ScsiMapping]))?;
        api.touch_vios("V1");
        let e = api.update_vios(&vios, &[Xag::ScsiMapping]).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::Http(412)));

        let vios = track!(api.read_vios("V1", &[Xag::ScsiMapping]))?;
        let updated = track!(api.update_vios(&vios, &[Xag::ScsiMapping]))?;
        assert_ne!(updated.etag, vios.etag);
        Ok(())
    }

    #[test]
    fn missing_entities_are_reported_as_404() {
        let api = MemoryApi::new();
        let e = api.read_vios("nothing", &[]).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::Http(404)));

        let e = api.read_shared_storage_pool("nothing", None).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::Http(404)));

        let e = api.read_partition_property("nothing", "PartitionState").err();
        assert_eq!(e.map(|e| e.is_not_found()), Some(true));
    }

    #[test]
    fn upload_new_virtual_disk_works() -> TestResult {
        let api = MemoryApi::new();
        api.add_vios("host", "vios1", "V1");
        api.add_volume_group("V1", vg("VG1", "rootvg"));

        let mut image = Cursor::new(vec![0; 50]);
        let disk = track!(api.upload_new_virtual_disk(
            "V1",
            "VG1",
            "b_disk",
            &mut image,
            50,
            1 << 30
        ))?;
        assert_eq!(disk.capacity_gb, 1.0);
        assert!(!disk.udid.is_empty());

        let vg = api.volume_group("VG1").expect("Never fails");
        assert_eq!(vg.available_gb, 99.0);
        assert_eq!(vg.virtual_disks, vec![disk]);

        // 同名のディスクは作れない
        let mut image = Cursor::new(vec![0; 50]);
        let e = api
            .upload_new_virtual_disk("V1", "VG1", "b_disk", &mut image, 50, 1 << 30)
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::Http(409)));

        // イメージのサイズが合わない
        let mut image = Cursor::new(vec![0; 10]);
        let e = api
            .upload_new_virtual_disk("V1", "VG1", "b_other", &mut image, 50, 1 << 30)
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::JobFailed));
        Ok(())
    }

    #[test]
    fn injected_error_fires_once() -> TestResult {
        let api = MemoryApi::new();
        api.inject_error("list_clusters", ErrorKind::Http(500));

        let e = api.list_clusters().err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::Http(500)));
        assert!(track!(api.list_clusters())?.is_empty());
        assert_eq!(api.call_count("list_clusters"), 2);
        Ok(())
    }
}
