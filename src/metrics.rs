//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, MetricBuilder};

/// ディスクアダプタのメトリクス.
///
/// 全てのカウンタは、アダプタの種類を示す`backend`ラベル(`"local"`ないし`"ssp"`)を持つ.
#[derive(Debug, Clone)]
pub struct AdapterMetrics {
    pub(crate) created_disks: Counter,
    pub(crate) uploaded_images: Counter,
    pub(crate) reused_images: Counter,
    pub(crate) connected_disks: Counter,
    pub(crate) disconnected_disks: Counter,
    pub(crate) deleted_disks: Counter,
    pub(crate) extended_disks: Counter,
}
impl AdapterMetrics {
    /// イメージから作成されたディスクの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_disk_adapter_created_disks_total { backend="local|ssp" } <COUNTER>
    /// ```
    pub fn created_disks(&self) -> u64 {
        self.created_disks.value() as u64
    }

    /// イメージのバイト列がアップロードされた回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_disk_adapter_uploaded_images_total { backend="local|ssp" } <COUNTER>
    /// ```
    pub fn uploaded_images(&self) -> u64 {
        self.uploaded_images.value() as u64
    }

    /// 既存のイメージLUが再利用された回数.
    ///
    /// ローカルアダプタでは常に`0`.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_disk_adapter_reused_images_total { backend="local|ssp" } <COUNTER>
    /// ```
    pub fn reused_images(&self) -> u64 {
        self.reused_images.value() as u64
    }

    /// VMに接続されたディスクの数.
    ///
    /// VIOS毎ではなく、接続操作毎に一つ加算される.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_disk_adapter_connected_disks_total { backend="local|ssp" } <COUNTER>
    /// ```
    pub fn connected_disks(&self) -> u64 {
        self.connected_disks.value() as u64
    }

    /// VMから切断されたディスクの数 (重複排除後).
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_disk_adapter_disconnected_disks_total { backend="local|ssp" } <COUNTER>
    /// ```
    pub fn disconnected_disks(&self) -> u64 {
        self.disconnected_disks.value() as u64
    }

    /// 削除されたディスクの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_disk_adapter_deleted_disks_total { backend="local|ssp" } <COUNTER>
    /// ```
    pub fn deleted_disks(&self) -> u64 {
        self.deleted_disks.value() as u64
    }

    /// 拡張されたディスクの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_disk_adapter_extended_disks_total { backend="local|ssp" } <COUNTER>
    /// ```
    pub fn extended_disks(&self) -> u64 {
        self.extended_disks.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder, backend: &str) -> Self {
        let mut builder = builder.clone();
        builder.namespace("viostor").subsystem("disk_adapter");
        let counter = |name, help| {
            builder
                .counter(name)
                .help(help)
                .label("backend", backend)
                .finish()
                .expect("Never fails")
        };
        AdapterMetrics {
            created_disks: counter("created_disks_total", "Number of disks created from images"),
            uploaded_images: counter("uploaded_images_total", "Number of image uploads"),
            reused_images: counter("reused_images_total", "Number of reused image elements"),
            connected_disks: counter("connected_disks_total", "Number of disk connections"),
            disconnected_disks: counter(
                "disconnected_disks_total",
                "Number of disconnected storage elements",
            ),
            deleted_disks: counter("deleted_disks_total", "Number of deleted storage elements"),
            extended_disks: counter("extended_disks_total", "Number of extended disks"),
        }
    }
}

/// マッピングトランザクションのメトリクス.
#[derive(Debug, Clone)]
pub struct MappingMetrics {
    pub(crate) executed_transactions: Counter,
    pub(crate) vios_updates: Counter,
    pub(crate) etag_conflicts: Counter,
}
impl MappingMetrics {
    /// 実行されたトランザクションの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_mapping_executed_transactions_total <COUNTER>
    /// ```
    pub fn executed_transactions(&self) -> u64 {
        self.executed_transactions.value() as u64
    }

    /// トランザクションの実行に伴って発行されたVIOSの更新リクエストの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_mapping_vios_updates_total <COUNTER>
    /// ```
    pub fn vios_updates(&self) -> u64 {
        self.vios_updates.value() as u64
    }

    /// VIOSの更新時にetagの不一致が検出された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// viostor_mapping_etag_conflicts_total <COUNTER>
    /// ```
    pub fn etag_conflicts(&self) -> u64 {
        self.etag_conflicts.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("viostor").subsystem("mapping");
        MappingMetrics {
            executed_transactions: builder
                .counter("executed_transactions_total")
                .help("Number of executed mapping transactions")
                .finish()
                .expect("Never fails"),
            vios_updates: builder
                .counter("vios_updates_total")
                .help("Number of VIOS update requests")
                .finish()
                .expect("Never fails"),
            etag_conflicts: builder
                .counter("etag_conflicts_total")
                .help("Number of etag mismatches detected on VIOS updates")
                .finish()
                .expect("Never fails"),
        }
    }
}
