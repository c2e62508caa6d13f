//! Virtual I/O Server Storage.
//!
//! `viostor`は、パーティション型ハイパーバイザ上の仮想マシン(LPAR)のブートディスクを管理するためのライブラリ.
//!
//! コンピュート・オーケストレータと、ハイパーバイザの仮想I/Oサブシステム(VIOS)の間に位置し、
//! 以下のいずれかを裏付けとするディスクのライフサイクルを扱う:
//!
//! - ホストローカルなボリュームグループ(VG)
//! - 複数のVIOSに跨る共有ストレージプール(SSP)
//!
//! # 特徴
//!
//! - 二種類のストレージバックエンドに対して、共通の[DiskAdapter]インタフェースを提供
//! - ディスク名は「VMの識別情報 + ディスク種別」から決定的に導出されるため、
//!   別途マッピング表を永続化する必要がない
//! - VM名からパーティションのUUIDへの対応はキャッシュされ([UuidCache])、ミス時にのみ管理APIに問い合わせる
//! - VIOSのSCSIマッピング更新は、VIOS単位のトランザクション([MappingTransaction])に積まれて一括で適用される
//! - 永続的な状態は一切保持しない (全てはハイパーバイザ側のメタデータに存在する)
//!
//! # モジュールの依存関係
//!
//! ```text
//! disk => mapping => vm => model
//!   \________________\___=> api
//! ```
//!
//! - [disk]モジュール:
//!   - [DiskAdapter]トレイトと、その実装である[LocalDiskAdapter]および[SspDiskAdapter]を提供
//!   - 利用者が直接触るのは主にこのモジュール
//! - [mapping]モジュール:
//!   - VIOS毎のSCSIマッピング更新を遅延実行するためのトランザクションを提供
//! - [vm]モジュール:
//!   - VM名とUUIDの対応キャッシュ、および稼働状態の参照を提供
//! - [api]モジュール:
//!   - ハイパーバイザの管理APIを表す[ManagementApi]トレイトと、そのメモリ上の実装を提供
//!
//! 全ての操作は同期的(ブロッキング)であり、タイムアウトやリトライは管理APIの実装側に委ねられる.
//!
//! [DiskAdapter]: ./disk/trait.DiskAdapter.html
//! [LocalDiskAdapter]: ./disk/struct.LocalDiskAdapter.html
//! [SspDiskAdapter]: ./disk/struct.SspDiskAdapter.html
//! [UuidCache]: ./vm/struct.UuidCache.html
//! [MappingTransaction]: ./mapping/struct.MappingTransaction.html
//! [ManagementApi]: ./api/trait.ManagementApi.html
//! [disk]: ./disk/index.html
//! [mapping]: ./mapping/index.html
//! [vm]: ./vm/index.html
//! [api]: ./api/index.html
#![warn(missing_docs)]
extern crate prometrics;
extern crate rand;
#[macro_use]
extern crate trackable;
extern crate uuid;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

pub mod api;
pub mod disk;
pub mod mapping;
pub mod metrics;
pub mod model;
pub mod vm;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
