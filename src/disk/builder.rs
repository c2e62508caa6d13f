use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::sync::Arc;

use super::local::LocalDiskAdapter;
use super::selector::{NodeSelector, RandomNodeSelector};
use super::ssp::SspDiskAdapter;
use super::{AdapterCore, DiskDriver, StorageAdapter};
use crate::api::{ImageStore, ManagementApi};
use crate::mapping::DEFAULT_ETAG_RETRIES;
use crate::metrics::{AdapterMetrics, MappingMetrics};
use crate::vm::UuidCache;
use crate::Result;

/// ディスクアダプタが接続する先の情報.
#[derive(Debug, Clone)]
pub struct ConnectionInfo<A> {
    /// 管理API.
    pub api: A,

    /// イメージの取得先.
    pub image_store: Arc<dyn ImageStore>,

    /// アダプタが稼働するホストのUUID.
    pub host_uuid: String,

    /// (ローカルアダプタ用) 優先的に使用するVIOSのUUID.
    pub vios_uuid: Option<String>,

    /// (ローカルアダプタ用) 優先的に使用するVIOSの名前.
    pub vios_name: Option<String>,
}
impl<A: ManagementApi> ConnectionInfo<A> {
    /// 新しい`ConnectionInfo`インスタンスを生成する.
    pub fn new(api: A, image_store: Arc<dyn ImageStore>, host_uuid: &str) -> Self {
        ConnectionInfo {
            api,
            image_store,
            host_uuid: host_uuid.to_owned(),
            vios_uuid: None,
            vios_name: None,
        }
    }

    /// VIOSを指定する.
    pub fn vios(mut self, vios_uuid: &str, vios_name: &str) -> Self {
        self.vios_uuid = Some(vios_uuid.to_owned());
        self.vios_name = Some(vios_name.to_owned());
        self
    }
}

/// ディスクアダプタのビルダ.
#[derive(Debug, Clone)]
pub struct DiskAdapterBuilder {
    pub(crate) logger: Logger,
    pub(crate) metrics: MetricBuilder,
    pub(crate) cluster_name: Option<String>,
    pub(crate) volume_group_name: String,
    pub(crate) volume_group_vios_name: Option<String>,
    pub(crate) node_selector: Arc<dyn NodeSelector>,
    pub(crate) etag_retries: usize,
}
impl DiskAdapterBuilder {
    /// デフォルト設定で`DiskAdapterBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        DiskAdapterBuilder {
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
            cluster_name: None,
            volume_group_name: String::new(),
            volume_group_vios_name: None,
            node_selector: Arc::new(RandomNodeSelector),
            etag_retries: DEFAULT_ETAG_RETRIES,
        }
    }

    /// ロガーを登録する.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// (SSP用) 使用するクラスタの名前を設定する.
    ///
    /// 空文字列が指定された場合や、本メソッドが呼ばれていない場合には、
    /// 管理APIからクラスタが探索される (その場合、クラスタはちょうど一つだけ存在する必要がある).
    pub fn cluster_name(&mut self, name: &str) -> &mut Self {
        self.cluster_name = if name.is_empty() {
            None
        } else {
            Some(name.to_owned())
        };
        self
    }

    /// (ローカル用) 使用するボリュームグループの名前を設定する.
    ///
    /// ローカルアダプタを生成する場合には必須.
    pub fn volume_group_name(&mut self, name: &str) -> &mut Self {
        self.volume_group_name = name.to_owned();
        self
    }

    /// (ローカル用) ボリュームグループを持つVIOSの名前を設定する.
    ///
    /// 同名のボリュームグループが複数のVIOS上に存在する場合にのみ必要.
    pub fn volume_group_vios_name(&mut self, name: &str) -> &mut Self {
        self.volume_group_vios_name = if name.is_empty() {
            None
        } else {
            Some(name.to_owned())
        };
        self
    }

    /// (SSP用) イメージのアップロード等に使うノードの選択方法を設定する.
    ///
    /// デフォルトは`RandomNodeSelector`.
    pub fn node_selector<S>(&mut self, selector: S) -> &mut Self
    where
        S: NodeSelector + 'static,
    {
        self.node_selector = Arc::new(selector);
        self
    }

    /// マッピングトランザクションで、etagの不一致時に再適用を行う回数を設定する.
    ///
    /// デフォルト値は`3`.
    pub fn etag_retries(&mut self, n: usize) -> &mut Self {
        self.etag_retries = n;
        self
    }

    /// ローカルアダプタを生成する.
    ///
    /// ボリュームグループが見つからない場合には`ErrorKind::VolumeGroupNotFound`エラーが返される.
    pub fn local<A: ManagementApi>(&self, conn: ConnectionInfo<A>) -> Result<LocalDiskAdapter<A>> {
        let vios_uuid = conn.vios_uuid.clone();
        let core = self.core(conn, "local");
        track!(LocalDiskAdapter::new(
            core,
            &self.volume_group_name,
            self.volume_group_vios_name.as_ref().map(String::as_str),
            vios_uuid.as_ref().map(String::as_str),
        ))
    }

    /// SSPアダプタを生成する.
    ///
    /// クラスタが一意に定まらない場合にはエラーが返される.
    pub fn ssp<A: ManagementApi>(&self, conn: ConnectionInfo<A>) -> Result<SspDiskAdapter<A>> {
        let core = self.core(conn, "ssp");
        track!(SspDiskAdapter::new(
            core,
            self.cluster_name.as_ref().map(String::as_str),
            Arc::clone(&self.node_selector),
        ))
    }

    /// `driver`に対応するアダプタを生成する.
    pub fn build<A: ManagementApi>(
        &self,
        driver: DiskDriver,
        conn: ConnectionInfo<A>,
    ) -> Result<StorageAdapter<A>> {
        match driver {
            DiskDriver::Local => track!(self.local(conn)).map(StorageAdapter::Local),
            DiskDriver::SharedStoragePool => {
                track!(self.ssp(conn)).map(StorageAdapter::SharedStoragePool)
            }
        }
    }

    fn core<A: ManagementApi>(&self, conn: ConnectionInfo<A>, backend: &str) -> AdapterCore<A> {
        let logger = self.logger.new(o!("backend" => backend.to_owned()));
        let mut cache = UuidCache::new(conn.api.clone(), &conn.host_uuid);
        cache.set_logger(logger.clone());
        AdapterCore {
            api: conn.api,
            image_store: conn.image_store,
            host_uuid: conn.host_uuid,
            cache,
            logger,
            metrics: AdapterMetrics::new(&self.metrics, backend),
            mapping_metrics: MappingMetrics::new(&self.metrics),
            etag_retries: self.etag_retries,
        }
    }
}
impl Default for DiskAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
