use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl Error {
    /// 管理APIが"見つからない"(HTTP 404)を返したことを示すエラーかどうかを判定する.
    pub fn is_not_found(&self) -> bool {
        *self.kind() == ErrorKind::Http(404)
    }

    /// 管理APIがetagの不一致(HTTP 412)を返したことを示すエラーかどうかを判定する.
    pub fn is_etag_mismatch(&self) -> bool {
        *self.kind() == ErrorKind::Http(412)
    }
}
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ErrorKind::Other.cause(e.to_string()).into()
    }
}

/// 発生し得るエラーの種別.
///
/// `Http`と`JobFailed`は管理APIの実装が返すものであり、
/// このcrateはそれらを別の種別に変換せずにそのまま呼び出し元へ伝搬する.
/// そのため利用者は「このcrateが拒否した」のか「バックエンドが拒否した」のかを区別できる.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// VM(パーティション)が見つからない.
    ///
    /// # 典型的な対応策
    ///
    /// - VMが既に削除されていないかを確認する
    InstanceNotFound,

    /// VMとディスク種別から導出された名前のディスクが存在しない.
    DiskNotFound,

    /// 設定で指定された名前のクラスタが存在しない.
    ClusterNotFoundByName,

    /// 設定で指定された名前のクラスタが複数存在する.
    TooManyClustersFound,

    /// クラスタ名が未設定で、かつクラスタが一つも見つからない.
    NoConfigNoClusterFound,

    /// クラスタ名が未設定で、かつ複数のクラスタが見つかったため一つに決められない.
    ///
    /// # 典型的な対応策
    ///
    /// - 使用するクラスタの名前を明示的に設定する
    NoConfigTooManyClusters,

    /// 設定で指定された名前のボリュームグループが、どのVIOS上にも存在しない.
    VolumeGroupNotFound,

    /// 利用者が指定した属性ないし設定値が不正.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側の設定やプログラムを修正して入力を正しくする
    InvalidAttribute,

    /// 作成しようとしたディスクのサイズが不正 (ゼロ、ないし表現可能な範囲を超えている).
    ImageTooLarge,

    /// インスタンスのディスクを管理パーティションに接続できなかった.
    InstanceDiskMappingFailed,

    /// 管理APIがHTTPのエラーステータスを返した.
    ///
    /// 典型的には`404`(存在しない)と`412`(etag不一致による楽観的排他の失敗)が使われる.
    Http(u16),

    /// 管理API上のジョブ(e.g., イメージのアップロード)が失敗した.
    JobFailed,

    /// その他エラー.
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
