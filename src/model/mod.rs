//! 管理APIが返すエンティティのスナップショット群.
//!
//! ここで定義されている構造体は、いずれも「ある時点で管理APIから取得した内容」を表すだけであり、
//! 自分自身を更新したりはしない.
//! 最新の状態が必要な場合には、再度[ManagementApi](../api/trait.ManagementApi.html)経由で取得し直すこと.
//!
//! 更新可能なエンティティは`etag`を保持しており、更新時の楽観的排他制御に使用される.
pub use self::cluster::{Cluster, ClusterNode};
pub use self::partition::{Partition, PartitionFilter};
pub use self::storage::{
    ElementKind, LogicalUnit, LuType, PhysicalVolume, SharedStoragePool, StorageElement,
    VirtualDisk, VirtualOpticalMedia, VolumeGroup,
};
pub use self::vios::{ScsiMapping, VirtualIoServer};

mod cluster;
mod partition;
mod storage;
mod vios;
