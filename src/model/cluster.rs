/// 共有ストレージプールを構成するクラスタ.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// クラスタのUUID.
    pub uuid: String,

    /// クラスタ名.
    pub name: String,

    /// クラスタが提供する共有ストレージプールのUUID.
    pub ssp_uuid: String,

    /// クラスタを構成するノード(VIOS)群.
    pub nodes: Vec<ClusterNode>,

    /// 楽観的排他制御用のetag.
    pub etag: String,
}

/// クラスタのノード.
///
/// 他ホスト上のノードや、まだクラスタへの参加処理中のノードの場合には、
/// `vios_uuid`や`vios_uri`が欠けていることがある.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    /// ノードのホスト名.
    pub hostname: String,

    /// ノードに対応するVIOSのUUID.
    pub vios_uuid: Option<String>,

    /// ノードに対応するVIOSのURI.
    ///
    /// `/ManagedSystem/{ホストUUID}/VirtualIOServer/{VIOSのUUID}`という形式となる.
    pub vios_uri: Option<String>,
}
impl ClusterNode {
    /// VIOSのURIから、そのVIOSが稼働しているホストのUUIDを取り出す.
    ///
    /// # Examples
    ///
    /// ```
    /// use viostor::model::ClusterNode;
    ///
    /// let node = ClusterNode {
    ///     hostname: "vios1".to_owned(),
    ///     vios_uuid: Some("3443DB77".to_owned()),
    ///     vios_uri: Some("https://hmc:12443/rest/api/uom/ManagedSystem/67dca605/VirtualIOServer/3443DB77".to_owned()),
    /// };
    /// assert_eq!(node.host_uuid(), Some("67dca605"));
    /// ```
    pub fn host_uuid(&self) -> Option<&str> {
        let uri = self.vios_uri.as_ref()?;
        let mut segments = uri.split('/');
        segments.find(|s| *s == "ManagedSystem")?;
        segments.next().filter(|s| !s.is_empty())
    }

    /// `host_uuid`上で操作可能なノードかどうかを判定する.
    ///
    /// VIOSのUUIDとURIの両方を持ち、かつURIが示すホストが`host_uuid`と一致する場合にのみ`true`となる.
    pub fn is_usable_on(&self, host_uuid: &str) -> bool {
        if self.vios_uuid.is_none() {
            return false;
        }
        self.host_uuid()
            .map_or(false, |h| h.eq_ignore_ascii_case(host_uuid))
    }
}
