use slog::Logger;
use std::cmp;
use std::sync::Arc;

use super::selector::NodeSelector;
use super::{
    bytes_to_gb_ceil, disk_gb_to_bytes, disk_matcher, disk_name, find_instance_disks, image_name,
    register_connect, register_disconnect, AdapterCore, DiskAdapter, DiskNameStyle, DiskType,
    SharedStorageToken,
};
use crate::api::ManagementApi;
use crate::mapping::MappingTransaction;
use crate::metrics::AdapterMetrics;
use crate::model::{Cluster, ElementKind, LogicalUnit, LuType, SharedStoragePool, StorageElement};
use crate::vm::{ImageMeta, Instance, UuidCache};
use crate::{ErrorKind, Result};

/// 共有ストレージプール(SSP)を使うディスクアダプタ.
///
/// # クラスタの決定
///
/// 生成時に、使用するクラスタがちょうど一つに決まる必要がある:
///
/// - クラスタ名が設定されている場合:
///   - その名前のクラスタが無ければ`ErrorKind::ClusterNotFoundByName`
///   - 複数あれば`ErrorKind::TooManyClustersFound`
/// - 設定されていない場合:
///   - クラスタが一つも無ければ`ErrorKind::NoConfigNoClusterFound`
///   - 複数あれば`ErrorKind::NoConfigTooManyClusters`
///
/// 生成後のクラスタやプールの取得失敗は、管理APIのエラーがそのまま返される.
///
/// # スナップショット
///
/// クラスタとプールの内容は、操作の度に(etagを用いた条件付き読み込みで)更新される.
/// 更新の結果は新しい`Arc`として保持され、以前に取得した`Arc`の内容は変化しない.
///
/// # 対象となるVIOS
///
/// マッピング操作の対象は、クラスタのノードの内、VIOSのUUIDとURIを持ち、
/// かつアダプタと同じホスト上で稼働しているもののみとなる.
/// それ以外のノードは黙って無視される.
#[derive(Debug)]
pub struct SspDiskAdapter<A> {
    core: AdapterCore<A>,
    cluster: Arc<Cluster>,
    ssp: Option<Arc<SharedStoragePool>>,
    node_selector: Arc<dyn NodeSelector>,
}
impl<A: ManagementApi> SspDiskAdapter<A> {
    pub(crate) fn new(
        core: AdapterCore<A>,
        cluster_name: Option<&str>,
        node_selector: Arc<dyn NodeSelector>,
    ) -> Result<Self> {
        let cluster = track!(resolve_cluster(&core.api, cluster_name))?;
        info!(core.logger, "SSP disk adapter initialized";
              "cluster" => &cluster.name, "ssp" => &cluster.ssp_uuid);
        Ok(SspDiskAdapter {
            core,
            cluster: Arc::new(cluster),
            ssp: None,
            node_selector,
        })
    }

    /// 現在保持しているクラスタのスナップショットを返す.
    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// クラスタのスナップショットを更新して返す.
    pub fn refresh_cluster(&mut self) -> Result<Arc<Cluster>> {
        let fetched = track!(self
            .core
            .api
            .read_cluster(&self.cluster.uuid, Some(&self.cluster.etag)))?;
        if let Some(cluster) = fetched {
            debug!(self.core.logger, "Cluster refreshed"; "cluster" => &cluster.name);
            self.cluster = Arc::new(cluster);
        }
        Ok(Arc::clone(&self.cluster))
    }

    /// 共有ストレージプールのスナップショットを更新して返す.
    ///
    /// 初回呼び出し時には、プールの全体が読み込まれる.
    pub fn refresh_ssp(&mut self) -> Result<Arc<SharedStoragePool>> {
        let etag = self.ssp.as_ref().map(|ssp| ssp.etag.clone());
        let fetched = track!(self.core.api.read_shared_storage_pool(
            &self.cluster.ssp_uuid,
            etag.as_ref().map(String::as_str)
        ))?;
        if let Some(ssp) = fetched {
            debug!(self.core.logger, "Shared storage pool refreshed"; "ssp" => &ssp.name);
            self.ssp = Some(Arc::new(ssp));
        }
        let ssp = track_assert_some!(
            self.ssp.clone(),
            ErrorKind::Other,
            "Shared storage pool is not fetched: {}",
            self.cluster.ssp_uuid
        );
        Ok(ssp)
    }

    /// マッピング操作の対象となるVIOSのUUID群を返す.
    pub fn vios_uuids(&mut self) -> Result<Vec<String>> {
        let cluster = track!(self.refresh_cluster())?;
        let mut vios_uuids = Vec::new();
        for node in &cluster.nodes {
            match node.vios_uuid {
                Some(ref uuid) if node.is_usable_on(&self.core.host_uuid) => {
                    vios_uuids.push(uuid.clone());
                }
                _ => {
                    debug!(self.core.logger, "Cluster node skipped";
                           "node" => &node.hostname, "cluster" => &cluster.name);
                }
            }
        }
        Ok(vios_uuids)
    }

    fn update_ssp(&mut self, ssp: &SharedStoragePool) -> Result<Arc<SharedStoragePool>> {
        let updated = Arc::new(track!(self.core.api.update_shared_storage_pool(ssp))?);
        self.ssp = Some(Arc::clone(&updated));
        Ok(updated)
    }

    fn get_or_upload_image_lu(&mut self, image: &ImageMeta) -> Result<LogicalUnit> {
        let name = image_name(&image.id);
        let ssp = track!(self.refresh_ssp())?;
        if let Some(lu) = find_lu(&ssp, LuType::Image, &name) {
            info!(self.core.logger, "Reusing image LU"; "image" => &image.id, "lu" => &lu.name);
            self.core.metrics.reused_images.increment();
            return Ok(lu.clone());
        }

        let vios_uuids = track!(self.vios_uuids())?;
        let i = track_assert_some!(
            self.node_selector.select(&vios_uuids),
            ErrorKind::Other,
            "No usable VIOS in cluster: {}",
            self.cluster.name
        );
        let vios_uuid = &vios_uuids[i];

        let mut new_ssp = (*ssp).clone();
        new_ssp.logical_units.push(LogicalUnit {
            name: name.clone(),
            udid: String::new(),
            capacity_gb: cmp::max(1, bytes_to_gb_ceil(image.size)) as f64,
            lu_type: LuType::Image,
            cloned_from: None,
        });
        let ssp = track!(self.update_ssp(&new_ssp))?;
        let lu = track_assert_some!(
            find_lu(&ssp, LuType::Image, &name).cloned(),
            ErrorKind::Other,
            "Created image LU is missing: {}",
            name
        );

        info!(self.core.logger, "Uploading image";
              "image" => &image.id, "lu" => &lu.name, "vios" => vios_uuid);
        if let Err(e) = track!(self.upload_image(vios_uuid, &lu, image)) {
            // 中身の無いイメージLUが再利用されないように削除しておく
            warn!(self.core.logger, "Cannot upload image";
                  "image" => &image.id, "lu" => &lu.name, "error" => %e);
            if let Err(cleanup_error) = track!(self.discard_lu(&lu.udid)) {
                warn!(self.core.logger, "Cannot discard image LU";
                      "lu" => &lu.name, "error" => %cleanup_error);
            }
            return Err(e);
        }
        self.core.metrics.uploaded_images.increment();
        Ok(lu)
    }

    fn upload_image(&self, vios_uuid: &str, lu: &LogicalUnit, image: &ImageMeta) -> Result<()> {
        let mut stream = track!(self.core.image_store.download(&image.id))?;
        track!(self
            .core
            .api
            .upload_logical_unit(vios_uuid, lu, &mut stream, image.size))?;
        Ok(())
    }

    fn discard_lu(&mut self, udid: &str) -> Result<()> {
        let ssp = track!(self.refresh_ssp())?;
        let mut new_ssp = (*ssp).clone();
        new_ssp.logical_units.retain(|lu| lu.udid != udid);
        if new_ssp.logical_units.len() != ssp.logical_units.len() {
            track!(self.update_ssp(&new_ssp))?;
        }
        Ok(())
    }
}
impl<A: ManagementApi> DiskAdapter for SspDiskAdapter<A> {
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
        let ssp = track!(self.refresh_ssp())?;
        Ok(ssp.capacity_gb)
    }

    fn capacity_used(&mut self) -> Result<f64> {
        let ssp = track!(self.refresh_ssp())?;
        Ok(ssp.capacity_gb - ssp.free_space_gb)
    }

    fn create_disk_from_image(
        &mut self,
        instance: &Instance,
        image: &ImageMeta,
        disk_size_gb: u64,
        disk_type: DiskType,
    ) -> Result<StorageElement> {
        let size_gb = cmp::max(disk_size_gb, bytes_to_gb_ceil(image.size));
        track!(disk_gb_to_bytes(size_gb, image.size))?;

        let image_lu = track!(self.get_or_upload_image_lu(image))?;
        let name = disk_name(disk_type, instance, DiskNameStyle::Long);
        info!(self.core.logger, "Creating disk";
              "instance" => &instance.name, "disk" => &name, "size_gb" => size_gb,
              "image_lu" => &image_lu.name);

        let ssp = track!(self.refresh_ssp())?;
        let mut new_ssp = (*ssp).clone();
        new_ssp.logical_units.push(LogicalUnit {
            name: name.clone(),
            udid: String::new(),
            capacity_gb: size_gb as f64,
            lu_type: LuType::Disk,
            cloned_from: Some(image_lu.udid.clone()),
        });
        let ssp = track!(self.update_ssp(&new_ssp))?;
        let lu = track_assert_some!(
            find_lu(&ssp, LuType::Disk, &name).cloned(),
            ErrorKind::Other,
            "Created LU is missing: {}",
            name
        );
        self.core.metrics.created_disks.increment();
        Ok(lu.into())
    }

    fn connect_disk(
        &mut self,
        instance: &Instance,
        disk: &StorageElement,
        tx: Option<&mut MappingTransaction<A>>,
    ) -> Result<()> {
        let partition_uuid = track!(self.core.partition_uuid(instance))?;
        let vios_uuids = track!(self.vios_uuids())?;
        track!(self.core.run_or_defer("connect_disk", tx, |tx| {
            register_connect(tx, &vios_uuids, &partition_uuid, disk);
            Ok(())
        }))?;
        info!(self.core.logger, "Connected disk";
              "instance" => &instance.name, "disk" => %disk, "vioses" => vios_uuids.len());
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
        let vios_uuids = track!(self.vios_uuids())?;
        let matcher = disk_matcher(ElementKind::LogicalUnit, disk_types, DiskNameStyle::Long);
        let elements = track!(self.core.run_or_defer("disconnect_disk", tx, |tx| {
            track!(register_disconnect(tx, &vios_uuids, &partition_uuid, &matcher))
        }))?;
        info!(self.core.logger, "Disconnected disks";
              "instance" => &instance.name, "disks" => elements.len(),
              "vioses" => vios_uuids.len());
        self.core
            .metrics
            .disconnected_disks
            .add_u64(elements.len() as u64);
        Ok(elements)
    }

    fn delete_disks(&mut self, elements: &[StorageElement]) -> Result<()> {
        let ssp = track!(self.refresh_ssp())?;
        let mut new_ssp = (*ssp).clone();
        new_ssp
            .logical_units
            .retain(|lu| elements.iter().all(|e| e.udid() != Some(lu.udid.as_str())));
        let deleted = ssp.logical_units.len() - new_ssp.logical_units.len();
        if deleted == 0 {
            debug!(self.core.logger, "No LUs to delete"; "ssp" => &ssp.name);
            return Ok(());
        }

        track!(self.update_ssp(&new_ssp))?;
        for e in elements {
            info!(self.core.logger, "Deleted LU"; "disk" => %e, "ssp" => &ssp.name);
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
        let name = disk_name(disk_type, instance, DiskNameStyle::Long);
        info!(self.core.logger, "Extending disk";
              "instance" => &instance.name, "disk" => &name, "size_gb" => new_size_gb);

        let ssp = track!(self.refresh_ssp())?;
        let mut new_ssp = (*ssp).clone();
        {
            let lu = track_assert_some!(
                new_ssp
                    .logical_units
                    .iter_mut()
                    .find(|lu| lu.lu_type == LuType::Disk && lu.name == name),
                ErrorKind::DiskNotFound,
                "{}/{}",
                ssp.name,
                name
            );
            lu.capacity_gb = new_size_gb as f64;
        }
        track!(self.update_ssp(&new_ssp))?;
        self.core.metrics.extended_disks.increment();
        Ok(())
    }

    fn check_shared_storage_local(&mut self) -> Result<Option<SharedStorageToken>> {
        Ok(Some(SharedStorageToken::new(&self.cluster.ssp_uuid)))
    }

    fn check_shared_storage_remote(&mut self, token: Option<&SharedStorageToken>) -> Result<bool> {
        Ok(token.map_or(false, |t| t.as_str() == self.cluster.ssp_uuid))
    }

    fn instance_disk_iter(
        &mut self,
        instance: &Instance,
        partition_uuid: &str,
    ) -> Result<Vec<(StorageElement, String)>> {
        let name = disk_name(DiskType::Boot, instance, DiskNameStyle::Long);
        let vios_uuids = track!(self.vios_uuids())?;
        track!(find_instance_disks(
            &self.core.api,
            &vios_uuids,
            partition_uuid,
            &name
        ))
    }
}

fn resolve_cluster<A: ManagementApi>(api: &A, cluster_name: Option<&str>) -> Result<Cluster> {
    let mut clusters = if let Some(name) = cluster_name {
        let clusters = track!(api.search_clusters(name))?;
        track_assert!(
            !clusters.is_empty(),
            ErrorKind::ClusterNotFoundByName,
            "cluster={}",
            name
        );
        track_assert_eq!(
            clusters.len(),
            1,
            ErrorKind::TooManyClustersFound,
            "cluster={}",
            name
        );
        clusters
    } else {
        let clusters = track!(api.list_clusters())?;
        track_assert!(!clusters.is_empty(), ErrorKind::NoConfigNoClusterFound);
        track_assert_eq!(clusters.len(), 1, ErrorKind::NoConfigTooManyClusters);
        clusters
    };
    Ok(clusters.remove(0))
}

fn find_lu<'a>(ssp: &'a SharedStoragePool, lu_type: LuType, name: &str) -> Option<&'a LogicalUnit> {
    ssp.logical_units
        .iter()
        .find(|lu| lu.lu_type == lu_type && lu.name == name)
}
