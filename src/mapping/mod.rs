//! VIOSのSCSIマッピング更新を一括で適用するためのトランザクション.
//!
//! 一つの[MappingTransaction]は、VIOS毎の遅延操作([MappingOp])の列を保持する.
//! 操作は`execute`が呼ばれるまでは管理APIに送られず、`execute`時にVIOS毎に一回の更新としてまとめて適用される.
//!
//! トランザクションは、ディスクアダプタ内で即座に実行されることもあれば(単発の接続・切断)、
//! 呼び出し元から渡されて複数の操作を積んだ後に、呼び出し元の都合で実行されることもある.
//!
//! # 一貫性
//!
//! 複数のVIOSに跨る更新は原子的ではない.
//! あるVIOSの更新に失敗した場合、それ以前に更新が完了したVIOSの変更は取り消されずに残る.
//!
//! [MappingTransaction]: struct.MappingTransaction.html
//! [MappingOp]: enum.MappingOp.html
use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use crate::api::{ManagementApi, Xag};
use crate::metrics::MappingMetrics;
use crate::model::{ElementKind, ScsiMapping, StorageElement, VirtualIoServer};
use crate::Result;

/// etagの不一致時に、トランザクションを再適用する回数のデフォルト値.
pub const DEFAULT_ETAG_RETRIES: usize = 3;

/// VIOSに対する遅延操作.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingOp {
    /// マッピングを追加する.
    ///
    /// 既に同一のマッピングが存在する場合には何もしない.
    Add(ScsiMapping),

    /// 条件に一致するマッピングを削除する.
    Remove {
        /// 対象とするマッピング先パーティションのUUID.
        client_partition_uuid: String,

        /// 削除対象のストレージ要素の条件.
        matcher: DiskMatcher,
    },
}

/// マッピングの裏付けとなるストレージ要素の条件.
///
/// 名前に関する条件(接頭辞と完全一致)が一つも指定されていない場合には、全ての名前に一致する.
/// 指定されている場合には、そのいずれかを満たせば一致とみなす.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskMatcher {
    kind: Option<ElementKind>,
    prefixes: Vec<String>,
    names: Vec<String>,
}
impl DiskMatcher {
    /// 全ての要素に一致する`DiskMatcher`を生成する.
    pub fn any() -> Self {
        Self::default()
    }

    /// 要素の種類を条件に加える.
    pub fn kind(mut self, kind: ElementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// 名前の接頭辞を条件に加える.
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefixes.push(prefix.to_owned());
        self
    }

    /// 名前(完全一致)を条件に加える.
    pub fn name(mut self, name: &str) -> Self {
        self.names.push(name.to_owned());
        self
    }

    /// `element`が条件を満たすかどうかを判定する.
    pub fn matches(&self, element: &StorageElement) -> bool {
        if self.kind.map_or(false, |k| k != element.kind()) {
            return false;
        }
        if self.prefixes.is_empty() && self.names.is_empty() {
            return true;
        }
        let name = element.name();
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || self.names.iter().any(|n| n == name)
    }
}

/// `vios`にマッピングを追加する.
///
/// 同一のマッピング(マッピング先と裏付け要素が等しいもの)が既に存在する場合には何もせずに`false`を返す.
pub fn add_map(vios: &mut VirtualIoServer, mapping: ScsiMapping) -> bool {
    if vios.scsi_mappings.contains(&mapping) {
        false
    } else {
        vios.scsi_mappings.push(mapping);
        true
    }
}

/// `vios`から条件に一致するマッピングを削除し、削除されたマッピング群を返す.
pub fn remove_maps(
    vios: &mut VirtualIoServer,
    client_partition_uuid: &str,
    matcher: &DiskMatcher,
) -> Vec<ScsiMapping> {
    let (removed, kept): (Vec<_>, Vec<_>) = vios
        .scsi_mappings
        .drain(..)
        .partition(|m| m.is_client(client_partition_uuid) && matcher.matches(&m.backing_storage));
    vios.scsi_mappings = kept;
    removed
}

/// 条件に一致するマッピング群を返す.
pub fn find_maps<'a>(
    mappings: &'a [ScsiMapping],
    client_partition_uuid: &str,
    matcher: &DiskMatcher,
) -> Vec<&'a ScsiMapping> {
    mappings
        .iter()
        .filter(|m| m.is_client(client_partition_uuid) && matcher.matches(&m.backing_storage))
        .collect()
}

/// 単一のVIOSに対する遅延操作群.
#[derive(Debug, Clone)]
pub struct WrapperTask {
    vios_uuid: String,
    wrapper: Option<VirtualIoServer>,
    ops: Vec<MappingOp>,
}
impl WrapperTask {
    /// 対象VIOSのUUIDを返す.
    pub fn vios_uuid(&self) -> &str {
        &self.vios_uuid
    }

    /// 登録済みの操作群を返す.
    pub fn ops(&self) -> &[MappingOp] {
        &self.ops
    }

    fn apply(&self, vios: &mut VirtualIoServer) -> (bool, Vec<ScsiMapping>) {
        let mut changed = false;
        let mut removed = Vec::new();
        for op in &self.ops {
            match op {
                MappingOp::Add(m) => {
                    changed |= add_map(vios, m.clone());
                }
                MappingOp::Remove {
                    client_partition_uuid,
                    matcher,
                } => {
                    let maps = remove_maps(vios, client_partition_uuid, matcher);
                    changed |= !maps.is_empty();
                    removed.extend(maps);
                }
            }
        }
        (changed, removed)
    }
}

/// トランザクションの実行結果.
#[derive(Debug, Clone, Default)]
pub struct TransactionOutcome {
    /// 更新されたVIOS群 (更新後の状態).
    pub updated: Vec<VirtualIoServer>,

    /// VIOS毎の、削除されたマッピング群.
    pub removed: Vec<(String, Vec<ScsiMapping>)>,
}
impl TransactionOutcome {
    /// 削除されたマッピングの裏付け要素群を、重複を除いて返す.
    ///
    /// 要素の順番は、最初に出現した順となる.
    pub fn removed_elements(&self) -> Vec<StorageElement> {
        let mut elements = Vec::new();
        for m in self.removed.iter().flat_map(|(_, maps)| maps) {
            if !elements.contains(&m.backing_storage) {
                elements.push(m.backing_storage.clone());
            }
        }
        elements
    }
}

/// VIOS毎の遅延操作をまとめて適用するためのトランザクション.
///
/// 各VIOSの状態(ラッパー)は初回参照時に一度だけ読み込まれ、以後は`execute`までそのスナップショットが使われる.
/// `execute`時にetagの不一致(i.e., 並行更新)が検出された場合には、
/// 最新の状態を読み直して操作を再適用する (最大で`etag_retries`回まで).
#[derive(Debug)]
pub struct MappingTransaction<A> {
    name: String,
    api: A,
    xags: Vec<Xag>,
    tasks: Vec<WrapperTask>,
    etag_retries: usize,
    logger: Logger,
    metrics: MappingMetrics,
}
impl<A: ManagementApi> MappingTransaction<A> {
    /// 新しい`MappingTransaction`インスタンスを生成する.
    pub fn new(name: &str, api: A) -> Self {
        MappingTransaction {
            name: name.to_owned(),
            api,
            xags: vec![Xag::ScsiMapping],
            tasks: Vec::new(),
            etag_retries: DEFAULT_ETAG_RETRIES,
            logger: Logger::root(Discard, o!()),
            metrics: MappingMetrics::new(&MetricBuilder::new()),
        }
    }

    /// ロガーを設定する.
    pub fn set_logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクスの登録先を設定する.
    pub fn set_metrics(&mut self, metrics: &MetricBuilder) -> &mut Self {
        self.metrics = MappingMetrics::new(metrics);
        self
    }

    /// etagの不一致時の再適用回数を設定する.
    ///
    /// デフォルト値は`DEFAULT_ETAG_RETRIES`.
    pub fn set_etag_retries(&mut self, retries: usize) -> &mut Self {
        self.etag_retries = retries;
        self
    }

    pub(crate) fn with_metrics(mut self, metrics: MappingMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// トランザクション名を返す.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// ロガーを返す.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// メトリクスを返す.
    pub fn metrics(&self) -> &MappingMetrics {
        &self.metrics
    }

    /// etagの不一致時の再適用回数を返す.
    pub fn etag_retries(&self) -> usize {
        self.etag_retries
    }

    /// 登録済みのVIOS毎の操作群を、登録順で返す.
    pub fn tasks(&self) -> &[WrapperTask] {
        &self.tasks
    }

    /// 操作が一つも登録されていない場合には`true`を返す.
    pub fn is_empty(&self) -> bool {
        self.tasks.iter().all(|t| t.ops.is_empty())
    }

    /// `vios_uuid`に対する操作を登録する.
    ///
    /// 同じVIOSに対する操作は、登録された順番で適用される.
    pub fn add_op(&mut self, vios_uuid: &str, op: MappingOp) {
        let i = self.task_index(vios_uuid);
        self.tasks[i].ops.push(op);
    }

    /// `vios_uuid`の(トランザクション内での)スナップショットを返す.
    ///
    /// 初回呼び出し時には管理APIから読み込まれる.
    pub fn wrapper(&mut self, vios_uuid: &str) -> Result<&VirtualIoServer> {
        let i = self.task_index(vios_uuid);
        let task = &mut self.tasks[i];
        let vios = match task.wrapper.take() {
            Some(vios) => vios,
            None => track!(self.api.read_vios(vios_uuid, &self.xags))?,
        };
        Ok(task.wrapper.get_or_insert(vios))
    }

    /// 登録済みの操作を全て適用する.
    ///
    /// VIOSは登録順に一つずつ更新される.
    /// 操作を適用しても内容が変わらないVIOSに対しては、更新リクエストは発行されない.
    pub fn execute(self) -> Result<TransactionOutcome> {
        info!(self.logger, "Executing mapping transaction";
              "transaction" => &self.name, "vioses" => self.tasks.len());
        self.metrics.executed_transactions.increment();

        let mut outcome = TransactionOutcome::default();
        for task in &self.tasks {
            if task.ops.is_empty() {
                continue;
            }
            let mut vios = match task.wrapper.clone() {
                Some(w) => w,
                None => track!(self.api.read_vios(&task.vios_uuid, &self.xags))?,
            };

            let mut retries = 0;
            loop {
                let (changed, removed) = task.apply(&mut vios);
                if !changed {
                    debug!(self.logger, "No mapping changes; skipped";
                           "transaction" => &self.name, "vios" => &task.vios_uuid);
                    break;
                }

                match self.api.update_vios(&vios, &self.xags) {
                    Ok(updated) => {
                        self.metrics.vios_updates.increment();
                        outcome.removed.push((task.vios_uuid.clone(), removed));
                        outcome.updated.push(updated);
                        break;
                    }
                    Err(e) => {
                        if !e.is_etag_mismatch() {
                            return Err(track!(e, "vios={}", task.vios_uuid));
                        }
                        self.metrics.etag_conflicts.increment();
                        if retries >= self.etag_retries {
                            return Err(track!(e, "vios={}, retries={}", task.vios_uuid, retries));
                        }
                        retries += 1;
                        warn!(self.logger, "Etag mismatch; re-applying mapping operations";
                              "transaction" => &self.name, "vios" => &task.vios_uuid,
                              "retries" => retries);
                        vios = track!(self.api.read_vios(&task.vios_uuid, &self.xags))?;
                    }
                }
            }
        }
        Ok(outcome)
    }

    fn task_index(&mut self, vios_uuid: &str) -> usize {
        if let Some(i) = self.tasks.iter().position(|t| t.vios_uuid == vios_uuid) {
            i
        } else {
            self.tasks.push(WrapperTask {
                vios_uuid: vios_uuid.to_owned(),
                wrapper: None,
                ops: Vec::new(),
            });
            self.tasks.len() - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::api::MemoryApi;
    use crate::model::{LogicalUnit, LuType, VirtualOpticalMedia};
    use crate::ErrorKind;

    fn lu(name: &str, udid: &str) -> StorageElement {
        StorageElement::LogicalUnit(LogicalUnit {
            name: name.to_owned(),
            udid: udid.to_owned(),
            capacity_gb: 1.0,
            lu_type: LuType::Disk,
            cloned_from: None,
        })
    }

    fn api_with_vioses(n: usize) -> MemoryApi {
        let api = MemoryApi::new();
        for i in 0..n {
            api.add_vios("host", &format!("vios{}", i), &format!("V{}", i));
        }
        api
    }

    #[test]
    fn disk_matcher_works() {
        let boot = lu("boot_inst", "01");
        let media = StorageElement::VirtualOpticalMedia(VirtualOpticalMedia {
            name: "cfg_inst.iso".to_owned(),
        });

        assert!(DiskMatcher::any().matches(&boot));
        assert!(DiskMatcher::any().matches(&media));
        assert!(DiskMatcher::any().prefix("boot_").matches(&boot));
        assert!(!DiskMatcher::any().prefix("boot_").matches(&media));
        assert!(DiskMatcher::any().name("cfg_inst.iso").matches(&media));
        assert!(DiskMatcher::any()
            .prefix("boot_")
            .name("cfg_inst.iso")
            .matches(&media));
        assert!(!DiskMatcher::any()
            .kind(ElementKind::VirtualDisk)
            .matches(&boot));
    }

    #[test]
    fn add_map_is_idempotent() -> TestResult {
        let api = api_with_vioses(1);
        let mut vios = track!(api.read_vios("V0", &[Xag::ScsiMapping]))?;

        assert!(add_map(&mut vios, ScsiMapping::new("p1", lu("boot_a", "01"))));
        assert!(!add_map(&mut vios, ScsiMapping::new("P1", lu("boot_a", "01"))));
        assert!(add_map(&mut vios, ScsiMapping::new("p2", lu("boot_a", "01"))));
        assert_eq!(vios.scsi_mappings.len(), 2);

        let found = find_maps(&vios.scsi_mappings, "p1", &DiskMatcher::any());
        assert_eq!(found.len(), 1);

        let removed = remove_maps(&mut vios, "p1", &DiskMatcher::any());
        assert_eq!(removed.len(), 1);
        assert_eq!(vios.scsi_mappings.len(), 1);
        Ok(())
    }

    #[test]
    fn execute_updates_each_vios_once() -> TestResult {
        let api = api_with_vioses(3);
        let mut tx = MappingTransaction::new("connect", api.clone());
        for i in 0..3 {
            let vios = format!("V{}", i);
            tx.add_op(&vios, MappingOp::Add(ScsiMapping::new("p1", lu("boot_a", "01"))));
            tx.add_op(&vios, MappingOp::Add(ScsiMapping::new("p1", lu("cfg", "02"))));
        }
        let outcome = track!(tx.execute())?;
        assert_eq!(outcome.updated.len(), 3);
        assert_eq!(api.call_count("update_vios"), 3);
        for i in 0..3 {
            let vios = api.vios(&format!("V{}", i)).expect("Never fails");
            assert_eq!(vios.scsi_mappings.len(), 2);
        }
        Ok(())
    }

    #[test]
    fn vioses_are_updated_in_registration_order() -> TestResult {
        let api = api_with_vioses(3);
        let mut tx = MappingTransaction::new("connect", api.clone());
        for vios in &["V2", "V0", "V1"] {
            tx.add_op(vios, MappingOp::Add(ScsiMapping::new("p1", lu("boot_a", "01"))));
        }
        // 既に登録済みのVIOSへの追加は、順序を変えない
        tx.add_op("V2", MappingOp::Add(ScsiMapping::new("p1", lu("cfg", "02"))));

        let outcome = track!(tx.execute())?;
        let order = outcome
            .updated
            .iter()
            .map(|v| v.uuid.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, ["V2", "V0", "V1"]);
        Ok(())
    }

    #[test]
    fn unchanged_vioses_are_skipped() -> TestResult {
        let api = api_with_vioses(2);
        api.add_scsi_mapping("V0", ScsiMapping::new("p1", lu("boot_a", "01")));

        let mut tx = MappingTransaction::new("connect", api.clone());
        tx.add_op("V0", MappingOp::Add(ScsiMapping::new("p1", lu("boot_a", "01"))));
        tx.add_op("V1", MappingOp::Add(ScsiMapping::new("p1", lu("boot_a", "01"))));
        let outcome = track!(tx.execute())?;
        assert_eq!(outcome.updated.len(), 1);
        assert_eq!(outcome.updated[0].uuid, "V1");
        assert_eq!(api.call_count("update_vios"), 1);
        Ok(())
    }

    #[test]
    fn removed_elements_are_deduplicated() -> TestResult {
        let api = api_with_vioses(3);
        for i in 0..3 {
            api.add_scsi_mapping(&format!("V{}", i), ScsiMapping::new("p1", lu("boot_a", "01")));
        }

        let mut tx = MappingTransaction::new("disconnect", api.clone());
        for i in 0..3 {
            let op = MappingOp::Remove {
                client_partition_uuid: "p1".to_owned(),
                matcher: DiskMatcher::any(),
            };
            tx.add_op(&format!("V{}", i), op);
        }
        let outcome = track!(tx.execute())?;
        assert_eq!(outcome.removed.len(), 3);
        assert_eq!(outcome.removed_elements(), vec![lu("boot_a", "01")]);
        Ok(())
    }

    #[test]
    fn etag_conflict_is_retried() -> TestResult {
        let api = api_with_vioses(1);
        let mut tx = MappingTransaction::new("connect", api.clone());
        track!(tx.wrapper("V0"))?;
        tx.add_op("V0", MappingOp::Add(ScsiMapping::new("p1", lu("boot_a", "01"))));

        // 他のクライアントによる更新
        api.add_scsi_mapping("V0", ScsiMapping::new("p2", lu("boot_b", "02")));

        let metrics = tx.metrics().clone();
        track!(tx.execute())?;
        assert_eq!(metrics.etag_conflicts(), 1);
        assert_eq!(metrics.vios_updates(), 1);

        let vios = api.vios("V0").expect("Never fails");
        assert_eq!(vios.scsi_mappings.len(), 2);
        Ok(())
    }

    #[test]
    fn etag_conflict_retries_are_bounded() {
        let api = api_with_vioses(1);
        let mut tx = MappingTransaction::new("connect", api.clone());
        tx.set_etag_retries(0);
        tx.add_op("V0", MappingOp::Add(ScsiMapping::new("p1", lu("boot_a", "01"))));
        api.inject_error("update_vios", ErrorKind::Http(412));

        let e = tx.execute().err();
        assert_eq!(e.map(|e| e.is_etag_mismatch()), Some(true));
    }

    #[test]
    fn partial_failure_is_not_rolled_back() {
        let api = api_with_vioses(2);
        let mut tx = MappingTransaction::new("connect", api.clone());
        tx.add_op("V0", MappingOp::Add(ScsiMapping::new("p1", lu("boot_a", "01"))));
        tx.add_op("V1", MappingOp::Add(ScsiMapping::new("p1", lu("boot_a", "01"))));
        api.remove_vios("V1");

        assert!(tx.execute().is_err());
        let vios = api.vios("V0").expect("Never fails");
        assert_eq!(vios.scsi_mappings.len(), 1);
    }
}
