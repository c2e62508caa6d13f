use std::fmt;

use crate::api::ManagementApi;
use crate::{ErrorKind, Result};

/// VMの稼働状態.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    /// 稼働中.
    Running,

    /// 停止中.
    Stopped,

    /// 一時停止中.
    Paused,

    /// エラーにより停止.
    Crashed,

    /// 構築中.
    Building,

    /// 不明.
    Unknown,

    /// 遷移中、ないし管理APIが状態を報告できない.
    NoState,
}
impl PowerState {
    /// 管理APIが報告する状態文字列を`PowerState`に変換する.
    ///
    /// 大文字小文字は区別されない.
    /// 未知の文字列は`PowerState::NoState`に変換される.
    ///
    /// # Examples
    ///
    /// ```
    /// use viostor::vm::PowerState;
    ///
    /// assert_eq!(PowerState::from_partition_state("running"), PowerState::Running);
    /// assert_eq!(PowerState::from_partition_state("Not Activated"), PowerState::Stopped);
    /// assert_eq!(PowerState::from_partition_state("???"), PowerState::NoState);
    /// ```
    pub fn from_partition_state(state: &str) -> Self {
        match state.to_lowercase().as_str() {
            "running" | "starting" | "migrating running" | "open firmware" => PowerState::Running,
            "not activated" | "migrating not active" => PowerState::Stopped,
            "suspended" => PowerState::Paused,
            "error" => PowerState::Crashed,
            "hardware discovery" => PowerState::Building,
            "unknown" => PowerState::Unknown,
            "not available" | "resuming" | "shutting down" | "suspending" => PowerState::NoState,
            _ => PowerState::NoState,
        }
    }
}
impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            PowerState::Running => "running",
            PowerState::Stopped => "stopped",
            PowerState::Paused => "paused",
            PowerState::Crashed => "crashed",
            PowerState::Building => "building",
            PowerState::Unknown => "unknown",
            PowerState::NoState => "no-state",
        };
        f.write_str(s)
    }
}

/// VMの実行時情報を参照するためのアクセサ.
///
/// 保持するのは識別情報のみで、状態は呼び出しの度に管理APIから取得される.
#[derive(Debug, Clone)]
pub struct InstanceInfo<A> {
    api: A,
    name: String,
    uuid: String,
}
impl<A: ManagementApi> InstanceInfo<A> {
    /// 新しい`InstanceInfo`インスタンスを生成する.
    pub fn new(api: A, name: &str, uuid: &str) -> Self {
        InstanceInfo {
            api,
            name: name.to_owned(),
            uuid: uuid.to_uppercase(),
        }
    }

    /// インスタンス名を返す.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// パーティションのUUIDを返す.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// 現在の稼働状態を取得する.
    ///
    /// パーティションが存在しない場合には`ErrorKind::InstanceNotFound`エラーが返される.
    pub fn state(&self) -> Result<PowerState> {
        let raw = match self.api.read_partition_property(&self.uuid, "PartitionState") {
            Err(ref e) if e.is_not_found() => {
                track_panic!(ErrorKind::InstanceNotFound, "instance={}", self.name);
            }
            result => track!(result)?,
        };
        let state = raw.trim_matches(|c| c == ' ' || c == '"');
        Ok(PowerState::from_partition_state(state))
    }
}
impl<A> PartialEq for InstanceInfo<A> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.uuid == other.uuid
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::api::MemoryApi;
    use crate::vm::tests::partition;

    #[test]
    fn state_table_is_total() {
        let table = [
            ("running", PowerState::Running),
            ("starting", PowerState::Running),
            ("migrating running", PowerState::Running),
            ("open firmware", PowerState::Running),
            ("not activated", PowerState::Stopped),
            ("migrating not active", PowerState::Stopped),
            ("suspended", PowerState::Paused),
            ("error", PowerState::Crashed),
            ("hardware discovery", PowerState::Building),
            ("unknown", PowerState::Unknown),
            ("not available", PowerState::NoState),
            ("resuming", PowerState::NoState),
            ("shutting down", PowerState::NoState),
            ("suspending", PowerState::NoState),
            ("", PowerState::NoState),
        ];
        for (raw, expected) in table.iter() {
            assert_eq!(PowerState::from_partition_state(raw), *expected, "{}", raw);
        }
    }

    #[test]
    fn state_is_read_on_demand() -> TestResult {
        let api = MemoryApi::new();
        let mut p = partition("inst", "p1");
        p.state = "not activated".to_owned();
        api.add_partition("host", p);

        let info = InstanceInfo::new(api.clone(), "inst", "p1");
        assert_eq!(track!(info.state())?, PowerState::Stopped);
        assert_eq!(track!(info.state())?, PowerState::Stopped);
        assert_eq!(api.call_count("read_partition_property"), 2);

        api.remove_partition("p1");
        let e = info.state().err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InstanceNotFound));
        Ok(())
    }

    #[test]
    fn equality_ignores_state() {
        let api = MemoryApi::new();
        let a = InstanceInfo::new(api.clone(), "inst", "p1");
        let b = InstanceInfo::new(api.clone(), "inst", "P1");
        let c = InstanceInfo::new(api, "other", "p1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
