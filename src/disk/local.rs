use slog::Logger;

use super::{
    disk_gb_to_bytes, disk_matcher, disk_name, find_instance_disks, register_connect,
    register_disconnect, AdapterCore, DiskAdapter, DiskNameStyle, DiskType, SharedStorageToken,
};
use crate::api::ManagementApi;
use crate::mapping::MappingTransaction;
use crate::metrics::AdapterMetrics;
use crate::model::{ElementKind, StorageElement, VolumeGroup};
use crate::vm::{ImageMeta, Instance, UuidCache};
use crate::{ErrorKind, Result};

/// 単一のVIOS上のボリュームグループを使うディスクアダプタ.
///
/// 全てのマッピング操作は、ボリュームグループを持つVIOS一つだけを対象とする.
/// ディスクは作成の度にイメージから直接アップロードされる (イメージの共有は行わない).
///
/// ボリュームグループの識別子は生成時に一度だけ解決される.
/// 外部でボリュームグループが再作成された場合には、アダプタを作り直す必要がある.
#[derive(Debug)]
pub struct LocalDiskAdapter<A> {
    core: AdapterCore<A>,
    vg_name: String,
    vios_uuid: String,
    vg_uuid: String,
}
impl<A: ManagementApi> LocalDiskAdapter<A> {
    pub(crate) fn new(
        core: AdapterCore<A>,
        vg_name: &str,
        vios_name: Option<&str>,
        preferred_vios_uuid: Option<&str>,
    ) -> Result<Self> {
        track_assert!(
            !vg_name.is_empty(),
            ErrorKind::InvalidAttribute,
            "Volume group name must be specified"
        );
        let (vios_uuid, vg_uuid) = track!(find_volume_group(
            &core,
            vg_name,
            vios_name,
            preferred_vios_uuid
        ))?;
        info!(core.logger, "Local disk adapter initialized";
              "volume_group" => vg_name, "vios" => &vios_uuid);
        Ok(LocalDiskAdapter {
            core,
            vg_name: vg_name.to_owned(),
            vios_uuid,
            vg_uuid,
        })
    }

    /// ボリュームグループの名前を返す.
    pub fn volume_group_name(&self) -> &str {
        &self.vg_name
    }

    /// ボリュームグループを持つVIOSのUUIDを返す.
    pub fn vios_uuid(&self) -> &str {
        &self.vios_uuid
    }

    /// ボリュームグループのUUIDを返す.
    pub fn volume_group_uuid(&self) -> &str {
        &self.vg_uuid
    }

    fn volume_group(&self) -> Result<VolumeGroup> {
        track!(self
            .core
            .api
            .read_volume_group(&self.vios_uuid, &self.vg_uuid))
    }

    fn vios_uuids(&self) -> Vec<String> {
        vec![self.vios_uuid.clone()]
    }
}
impl<A: ManagementApi> DiskAdapter for LocalDiskAdapter<A> {
    type Api = A;

    fn api(&self) -> &A {
        &self.core.api
    }

    fn logger(&self) -> &Logger {
        &self.core.logger
    }

    fn metrics(&self) -> &AdapterMetrics {
        &self.core.metrics
    }

    fn uuid_cache(&mut self) -> &mut UuidCache<A> {
        &mut self.core.cache
    }

    fn new_transaction(&self, name: &str) -> MappingTransaction<A> {
        self.core.new_transaction(name)
    }

    fn capacity(&mut self) -> Result<f64> {
        let vg = track!(self.volume_group())?;
        Ok(vg.capacity_gb)
    }

    fn capacity_used(&mut self) -> Result<f64> {
        let vg = track!(self.volume_group())?;
        Ok(vg.capacity_gb - vg.available_gb)
    }

    fn create_disk_from_image(
        &mut self,
        instance: &Instance,
        image: &ImageMeta,
        disk_size_gb: u64,
        disk_type: DiskType,
    ) -> Result<StorageElement> {
        let name = disk_name(disk_type, instance, DiskNameStyle::Short);
        let disk_bytes = track!(disk_gb_to_bytes(disk_size_gb, image.size))?;
        info!(self.core.logger, "Creating disk";
              "instance" => &instance.name, "disk" => &name, "bytes" => disk_bytes);

        let mut stream = track!(self.core.image_store.download(&image.id))?;
        let vdisk = track!(self.core.api.upload_new_virtual_disk(
            &self.vios_uuid,
            &self.vg_uuid,
            &name,
            &mut stream,
            image.size,
            disk_bytes,
        ))?;
        self.core.metrics.uploaded_images.increment();
        self.core.metrics.created_disks.increment();
        Ok(vdisk.into())
    }

    fn connect_disk(
        &mut self,
        instance: &Instance,
        disk: &StorageElement,
        tx: Option<&mut MappingTransaction<A>>,
    ) -> Result<()> {
        let partition_uuid = track!(self.core.partition_uuid(instance))?;
        let vios_uuids = self.vios_uuids();
        track!(self.core.run_or_defer("connect_disk", tx, |tx| {
            register_connect(tx, &vios_uuids, &partition_uuid, disk);
            Ok(())
        }))?;
        info!(self.core.logger, "Connected disk";
              "instance" => &instance.name, "disk" => %disk, "vios" => &self.vios_uuid);
        self.core.metrics.connected_disks.increment();
        Ok(())
    }

    fn disconnect_disk(
        &mut self,
        instance: &Instance,
        tx: Option<&mut MappingTransaction<A>>,
        disk_types: Option<&[DiskType]>,
    ) -> Result<Vec<StorageElement>> {
        let partition_uuid = track!(self.core.partition_uuid(instance))?;
        let vios_uuids = self.vios_uuids();
        let matcher = disk_matcher(ElementKind::VirtualDisk, disk_types, DiskNameStyle::Short);
        let elements = track!(self.core.run_or_defer("disconnect_disk", tx, |tx| {
            track!(register_disconnect(tx, &vios_uuids, &partition_uuid, &matcher))
        }))?;
        info!(self.core.logger, "Disconnected disks";
              "instance" => &instance.name, "disks" => elements.len());
        self.core
            .metrics
            .disconnected_disks
            .add_u64(elements.len() as u64);
        Ok(elements)
    }

    fn delete_disks(&mut self, elements: &[StorageElement]) -> Result<()> {
        let mut vg = track!(self.volume_group())?;
        let before = vg.virtual_disks.len();
        vg.virtual_disks.retain(|d| {
            !elements
                .iter()
                .any(|e| e.kind() == ElementKind::VirtualDisk && e.name() == d.name)
        });
        let deleted = before - vg.virtual_disks.len();
        if deleted == 0 {
            debug!(self.core.logger, "No disks to delete"; "volume_group" => &self.vg_name);
            return Ok(());
        }

        track!(self.core.api.update_volume_group(&self.vios_uuid, &vg))?;
        for e in elements {
            info!(self.core.logger, "Deleted disk"; "disk" => %e, "volume_group" => &self.vg_name);
        }
        self.core.metrics.deleted_disks.add_u64(deleted as u64);
        Ok(())
    }

    fn extend_disk(
        &mut self,
        instance: &Instance,
        disk_type: DiskType,
        new_size_gb: u64,
    ) -> Result<()> {
        let name = disk_name(disk_type, instance, DiskNameStyle::Short);
        info!(self.core.logger, "Extending disk";
              "instance" => &instance.name, "disk" => &name, "size_gb" => new_size_gb);

        let mut vg = track!(self.volume_group())?;
        {
            let disk = track_assert_some!(
                vg.virtual_disks.iter_mut().find(|d| d.name == name),
                ErrorKind::DiskNotFound,
                "{}/{}",
                self.vg_name,
                name
            );
            disk.capacity_gb = new_size_gb as f64;
        }
        track!(self.core.api.update_volume_group(&self.vios_uuid, &vg))?;
        self.core.metrics.extended_disks.increment();
        Ok(())
    }

    fn check_shared_storage_local(&mut self) -> Result<Option<SharedStorageToken>> {
        Ok(None)
    }

    fn check_shared_storage_remote(&mut self, _token: Option<&SharedStorageToken>) -> Result<bool> {
        Ok(false)
    }

    fn instance_disk_iter(
        &mut self,
        instance: &Instance,
        partition_uuid: &str,
    ) -> Result<Vec<(StorageElement, String)>> {
        let name = disk_name(DiskType::Boot, instance, DiskNameStyle::Short);
        track!(find_instance_disks(
            &self.core.api,
            &self.vios_uuids(),
            partition_uuid,
            &name
        ))
    }
}

fn find_volume_group<A: ManagementApi>(
    core: &AdapterCore<A>,
    vg_name: &str,
    vios_name: Option<&str>,
    preferred_vios_uuid: Option<&str>,
) -> Result<(String, String)> {
    let mut vioses = if let Some(name) = vios_name {
        track!(core.api.search_vioses(name))?
    } else {
        track!(core.api.list_vioses(&core.host_uuid, &[]))?
    };
    if let Some(preferred) = preferred_vios_uuid {
        vioses.sort_by_key(|v| v.uuid != preferred);
    }

    for vios in vioses {
        let vgs = track!(core.api.list_volume_groups(&vios.uuid))?;
        for vg in vgs {
            debug!(core.logger, "Volume group found"; "vios" => &vios.name, "volume_group" => &vg.name);
            if vg.name == vg_name {
                return Ok((vios.uuid, vg.uuid));
            }
        }
    }
    track_panic!(
        ErrorKind::VolumeGroupNotFound,
        "volume_group={}, host={}",
        vg_name,
        core.host_uuid
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use trackable::result::TestResult;

    use super::*;
    use crate::api::{MemoryApi, MemoryImageStore, Xag};
    use crate::disk::{ConnectionInfo, DiskAdapterBuilder};
    use crate::mapping::MappingOp;
    use crate::model::{
        LogicalUnit, LuType, Partition, ScsiMapping, VirtualDisk, VirtualOpticalMedia,
    };
    use crate::vm::Flavor;

    const INSTANCE_UUID: &str = "d5065c2c-ac43-3fa6-af32-ea84a3960291";

    fn partition(name: &str, uuid: &str, mgmt: bool) -> Partition {
        Partition {
            uuid: uuid.to_owned(),
            name: name.to_owned(),
            id: 3,
            state: "running".to_owned(),
            is_mgmt_partition: mgmt,
        }
    }

    fn volume_group(uuid: &str, name: &str) -> VolumeGroup {
        VolumeGroup {
            uuid: uuid.to_owned(),
            name: name.to_owned(),
            capacity_gb: 5120.0,
            available_gb: 2048.0,
            virtual_disks: Vec::new(),
            etag: String::new(),
        }
    }

    fn instance() -> Instance {
        Instance::new("Inst Name", INSTANCE_UUID, Flavor::default())
    }

    fn setup() -> (MemoryApi, ConnectionInfo<MemoryApi>) {
        let api = MemoryApi::new();
        api.add_vios("host", "vios1", "V1");
        api.add_volume_group("V1", volume_group("VG0", "rootvg"));
        api.add_volume_group("V1", volume_group("VG1", "datavg"));
        api.add_partition("host", partition("Inst Name", "p1", false));
        api.add_partition("host", partition("mgmt", "m1", true));

        let images = MemoryImageStore::new();
        images.add_image("fake_id", vec![1; 50]);
        let conn = ConnectionInfo::new(api.clone(), Arc::new(images), "host");
        (api, conn)
    }

    fn adapter(conn: ConnectionInfo<MemoryApi>) -> Result<LocalDiskAdapter<MemoryApi>> {
        track!(DiskAdapterBuilder::new()
            .volume_group_name("datavg")
            .local(conn))
    }

    #[test]
    fn volume_group_discovery_works() -> TestResult {
        let (api, conn) = setup();
        let a = track!(adapter(conn.clone()))?;
        assert_eq!(a.vios_uuid(), "V1");
        assert_eq!(a.volume_group_uuid(), "VG1");

        // 指定されたVIOSが優先される
        api.add_vios("host", "vios2", "V2");
        api.add_volume_group("V2", volume_group("VG2", "datavg"));
        let a = track!(adapter(conn.clone().vios("V2", "vios2")))?;
        assert_eq!(a.volume_group_uuid(), "VG2");

        // VIOS名による絞り込み
        let a = track!(DiskAdapterBuilder::new()
            .volume_group_name("datavg")
            .volume_group_vios_name("vios2")
            .local(conn))?;
        assert_eq!(a.vios_uuid(), "V2");
        Ok(())
    }

    #[test]
    fn construction_errors() {
        let (_api, conn) = setup();
        let e = DiskAdapterBuilder::new().local(conn.clone()).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidAttribute));

        let e = DiskAdapterBuilder::new()
            .volume_group_name("nothing")
            .local(conn)
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::VolumeGroupNotFound));
    }

    #[test]
    fn capacity_works() -> TestResult {
        let (_api, conn) = setup();
        let mut a = track!(adapter(conn))?;
        assert_eq!(track!(a.capacity())?, 5120.0);
        assert_eq!(track!(a.capacity_used())?, 3072.0);
        Ok(())
    }

    #[test]
    fn create_disk_from_image_works() -> TestResult {
        let (api, conn) = setup();
        let mut a = track!(adapter(conn))?;

        let image = ImageMeta::new("fake_id", 50);
        let disk = track!(a.create_disk_from_image(&instance(), &image, 20, DiskType::Boot))?;
        assert_eq!(disk.name(), "b_Inst_Nam_d506");
        assert_eq!(disk.kind(), ElementKind::VirtualDisk);

        let uploads = api.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].disk_bytes, 21_474_836_480);
        assert_eq!(uploads[0].image_size, 50);
        assert_eq!(a.metrics().created_disks(), 1);

        // 同じディスクを二度作ることはできない
        let e = a
            .create_disk_from_image(&instance(), &image, 20, DiskType::Boot)
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::Http(409)));
        Ok(())
    }

    #[test]
    fn create_then_extend_works() -> TestResult {
        let (api, conn) = setup();
        let mut a = track!(adapter(conn))?;

        let image = ImageMeta::new("fake_id", 50);
        track!(a.create_disk_from_image(&instance(), &image, 20, DiskType::Boot))?;
        track!(a.extend_disk(&instance(), DiskType::Boot, 40))?;

        let vg = api.volume_group("VG1").expect("Never fails");
        assert_eq!(vg.virtual_disks[0].capacity_gb, 40.0);
        assert_eq!(vg.available_gb, 2048.0 - 40.0);

        let e = a.extend_disk(&instance(), DiskType::Rescue, 40).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::DiskNotFound));
        Ok(())
    }

    #[test]
    fn connect_and_disconnect_work() -> TestResult {
        let (api, conn) = setup();
        let mut a = track!(adapter(conn))?;
        let image = ImageMeta::new("fake_id", 50);
        let disk = track!(a.create_disk_from_image(&instance(), &image, 1, DiskType::Boot))?;

        track!(a.connect_disk(&instance(), &disk, None))?;
        let vios = api.vios("V1").expect("Never fails");
        assert_eq!(vios.scsi_mappings, vec![ScsiMapping::new("p1", disk.clone())]);

        // 種別が一致しないものは切断されない
        let removed = track!(a.disconnect_disk(&instance(), None, Some(&[DiskType::Rescue])))?;
        assert!(removed.is_empty());

        let removed = track!(a.disconnect_disk(&instance(), None, Some(&[DiskType::Boot])))?;
        assert_eq!(removed, vec![disk]);
        assert!(api.vios("V1").expect("Never fails").scsi_mappings.is_empty());
        Ok(())
    }

    #[test]
    fn deferred_transaction_works() -> TestResult {
        let (api, conn) = setup();
        let mut a = track!(adapter(conn))?;
        let image = ImageMeta::new("fake_id", 50);
        let disk = track!(a.create_disk_from_image(&instance(), &image, 1, DiskType::Boot))?;

        let mut tx = a.new_transaction("spawn");
        track!(a.connect_disk(&instance(), &disk, Some(&mut tx)))?;
        assert_eq!(api.call_count("update_vios"), 0);
        assert_eq!(tx.tasks()[0].ops().len(), 1);
        if let MappingOp::Add(ref m) = tx.tasks()[0].ops()[0] {
            assert_eq!(m.client_partition_uuid, "P1");
        }

        track!(tx.execute())?;
        assert_eq!(api.call_count("update_vios"), 1);
        let vios = track!(api.read_vios("V1", &[Xag::ScsiMapping]))?;
        assert_eq!(vios.scsi_mappings.len(), 1);
        Ok(())
    }

    #[test]
    fn delete_disks_works() -> TestResult {
        let (api, conn) = setup();
        let mut a = track!(adapter(conn))?;
        let image = ImageMeta::new("fake_id", 50);
        let disk = track!(a.create_disk_from_image(&instance(), &image, 1, DiskType::Boot))?;

        // 名前が同じでも仮想ディスク以外の要素は対象外
        let same_name_lu = StorageElement::from(LogicalUnit {
            name: disk.name().to_owned(),
            udid: disk.udid().unwrap_or("").to_owned(),
            capacity_gb: 1.0,
            lu_type: LuType::Disk,
            cloned_from: None,
        });
        let same_name_media = StorageElement::VirtualOpticalMedia(VirtualOpticalMedia {
            name: disk.name().to_owned(),
        });
        track!(a.delete_disks(&[same_name_lu, same_name_media]))?;
        let vg = api.volume_group("VG1").expect("Never fails");
        assert_eq!(vg.virtual_disks.len(), 1);
        assert_eq!(api.call_count("update_volume_group"), 0);

        track!(a.delete_disks(&[disk.clone()]))?;
        let vg = api.volume_group("VG1").expect("Never fails");
        assert!(vg.virtual_disks.is_empty());
        assert_eq!(api.call_count("update_volume_group"), 1);

        // 既に存在しない要素の削除はエラーにならない
        track!(a.delete_disks(&[disk]))?;
        let missing = StorageElement::from(VirtualDisk {
            name: "b_missing".to_owned(),
            udid: "00".to_owned(),
            capacity_gb: 1.0,
        });
        track!(a.delete_disks(&[missing]))?;
        assert_eq!(api.call_count("update_volume_group"), 1);
        assert_eq!(a.metrics().deleted_disks(), 1);
        Ok(())
    }

    #[test]
    fn shared_storage_is_not_supported() -> TestResult {
        let (_api, conn) = setup();
        let mut a = track!(adapter(conn))?;
        let token = track!(a.check_shared_storage_local())?;
        assert_eq!(token, None);
        assert!(!track!(a.check_shared_storage_remote(token.as_ref()))?);
        track!(a.check_shared_storage_cleanup(token))?;
        Ok(())
    }

    #[test]
    fn mgmt_partition_mapping_works() -> TestResult {
        let (api, conn) = setup();
        let mut a = track!(adapter(conn))?;

        // ディスクがまだ接続されていない
        let e = a.connect_instance_disk_to_mgmt(&instance(), None).err();
        assert_eq!(
            e.map(|e| *e.kind()),
            Some(ErrorKind::InstanceDiskMappingFailed)
        );

        let image = ImageMeta::new("fake_id", 50);
        let disk = track!(a.create_disk_from_image(&instance(), &image, 1, DiskType::Boot))?;
        track!(a.connect_disk(&instance(), &disk, None))?;

        let (found, vios_uuid, mgmt) = track!(a.connect_instance_disk_to_mgmt(&instance(), None))?;
        assert_eq!(found, disk);
        assert_eq!(vios_uuid, "V1");
        assert_eq!(mgmt.uuid, "m1");
        let vios = api.vios("V1").expect("Never fails");
        assert!(vios.scsi_mappings.iter().any(|m| m.is_client("m1")));

        track!(a.disconnect_disk_from_mgmt(&vios_uuid, disk.name()))?;
        let vios = api.vios("V1").expect("Never fails");
        assert!(!vios.scsi_mappings.iter().any(|m| m.is_client("m1")));
        assert!(vios.scsi_mappings.iter().any(|m| m.is_client("p1")));
        Ok(())
    }
}
