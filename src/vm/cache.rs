use slog::{Discard, Logger};
use std::collections::HashMap;

use crate::api::ManagementApi;
use crate::model::Partition;
use crate::{ErrorKind, Result};

/// インスタンス名からパーティションUUIDへの対応を保持するキャッシュ.
///
/// キャッシュの内容は永続化されず、インスタンスの寿命の間だけ有効.
/// ミス時には、ホスト上の全パーティション一覧を一度だけ取得し、キャッシュ全体を置き換える.
///
/// UUIDは常に大文字に正規化された状態で保持・返却される.
///
/// # 注意
///
/// 内部で同期は行わないので、複数のスレッドから同時に更新してはいけない.
#[derive(Debug)]
pub struct UuidCache<A> {
    api: A,
    host_uuid: String,
    cache: HashMap<String, String>,
    logger: Logger,
}
impl<A: ManagementApi> UuidCache<A> {
    /// 新しい`UuidCache`インスタンスを生成する.
    ///
    /// 生成直後のキャッシュは空.
    pub fn new(api: A, host_uuid: &str) -> Self {
        UuidCache {
            api,
            host_uuid: host_uuid.to_owned(),
            cache: HashMap::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// ロガーを設定する.
    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    /// `name`に対応するUUIDを返す.
    ///
    /// キャッシュに存在せず、かつ`fetch`が`true`の場合には、
    /// 管理APIからパーティション一覧を取得してキャッシュを再構築した上で、もう一度だけ検索を行う.
    /// それでも見つからない場合には`ErrorKind::InstanceNotFound`エラーが返される.
    ///
    /// `fetch`が`false`の場合には、キャッシュにない名前に対して`Ok(None)`が返される.
    pub fn lookup(&mut self, name: &str, fetch: bool) -> Result<Option<String>> {
        if let Some(uuid) = self.cache.get(name) {
            return Ok(Some(uuid.clone()));
        }
        if !fetch {
            return Ok(None);
        }

        debug!(self.logger, "UUID cache miss; fetching partition feed"; "instance" => name);
        let partitions = match self.api.list_partitions(&self.host_uuid) {
            Err(ref e) if e.is_not_found() => {
                track_panic!(ErrorKind::InstanceNotFound, "instance={}", name);
            }
            result => track!(result)?,
        };
        self.load_from_feed(&partitions);

        let uuid = track_assert_some!(
            self.cache.get(name).cloned(),
            ErrorKind::InstanceNotFound,
            "instance={}, host={}",
            name,
            self.host_uuid
        );
        Ok(Some(uuid))
    }

    /// `lookup(name, true)`と同様だが、結果を`Option`で包まずに返す.
    pub fn lookup_required(&mut self, name: &str) -> Result<String> {
        let uuid = track!(self.lookup(name, true))?;
        let uuid = track_assert_some!(uuid, ErrorKind::InstanceNotFound, "instance={}", name);
        Ok(uuid)
    }

    /// 対応を追加する.
    ///
    /// 既に`name`のエントリが存在する場合には上書きされる.
    pub fn add(&mut self, name: &str, uuid: &str) {
        self.cache.insert(name.to_owned(), uuid.to_uppercase());
    }

    /// 対応を削除する.
    ///
    /// エントリが存在しない場合には何もしない.
    pub fn remove(&mut self, name: &str) {
        self.cache.remove(name);
    }

    /// キャッシュの内容を、パーティション一覧から抽出した対応で置き換える.
    pub fn load_from_feed(&mut self, partitions: &[Partition]) {
        self.cache = partitions
            .iter()
            .map(|p| (p.name.clone(), p.uuid.to_uppercase()))
            .collect();
        debug!(self.logger, "UUID cache reloaded"; "entries" => self.cache.len());
    }

    /// キャッシュされているエントリの数を返す.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// キャッシュが空の場合には`true`を返す.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::api::MemoryApi;
    use crate::vm::tests::partition;

    #[test]
    fn add_and_lookup_works() -> TestResult {
        let api = MemoryApi::new();
        let mut cache = UuidCache::new(api.clone(), "host");

        cache.add("inst", "d5065c2c-ac43");
        assert_eq!(
            track!(cache.lookup("inst", false))?,
            Some("D5065C2C-AC43".to_owned())
        );

        cache.add("inst", "ffff");
        assert_eq!(track!(cache.lookup("inst", false))?, Some("FFFF".to_owned()));
        assert_eq!(track!(cache.lookup("other", false))?, None);
        assert_eq!(api.call_count("list_partitions"), 0);
        Ok(())
    }

    #[test]
    fn remove_absent_entry_is_noop() -> TestResult {
        let mut cache = UuidCache::new(MemoryApi::new(), "host");
        cache.add("a", "1");
        cache.remove("b");
        assert_eq!(cache.len(), 1);
        assert_eq!(track!(cache.lookup("a", false))?, Some("1".to_owned()));

        cache.remove("a");
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn fetch_on_miss_works() -> TestResult {
        let api = MemoryApi::new();
        api.add_partition("host", partition("inst", "abc"));
        api.add_partition("host", partition("inst2", "def"));
        let mut cache = UuidCache::new(api.clone(), "host");

        assert_eq!(track!(cache.lookup("inst", true))?, Some("ABC".to_owned()));
        assert_eq!(api.call_count("list_partitions"), 1);
        assert_eq!(cache.len(), 2);

        // 二回目以降はキャッシュから返される
        assert_eq!(track!(cache.lookup("inst2", true))?, Some("DEF".to_owned()));
        assert_eq!(api.call_count("list_partitions"), 1);
        Ok(())
    }

    #[test]
    fn fetch_miss_fails_with_instance_not_found() {
        let api = MemoryApi::new();
        api.add_partition("host", partition("inst", "abc"));
        let mut cache = UuidCache::new(api.clone(), "host");

        let e = cache.lookup("nothing", true).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InstanceNotFound));
        assert_eq!(api.call_count("list_partitions"), 1);
    }

    #[test]
    fn remote_errors_are_distinguished() {
        let api = MemoryApi::new();
        let mut cache = UuidCache::new(api.clone(), "host");

        api.inject_error("list_partitions", ErrorKind::Http(404));
        let e = cache.lookup("inst", true).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InstanceNotFound));

        api.inject_error("list_partitions", ErrorKind::Http(500));
        let e = cache.lookup("inst", true).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::Http(500)));
    }
}
