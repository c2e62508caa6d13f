use std::fmt;
use std::hash::{Hash, Hasher};

/// 仮想ディスク(ボリュームグループ内の論理ボリューム).
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualDisk {
    /// ディスク名.
    pub name: String,

    /// ストレージ層が割り当てた一意な識別子(UDID).
    pub udid: String,

    /// 容量(GB単位).
    pub capacity_gb: f64,
}

/// 共有ストレージプール内の論理ユニット(LU)の種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuType {
    /// VMのディスクとして使われるLU.
    Disk,

    /// 読み込み専用のイメージ(テンプレート)LU.
    Image,
}

/// 共有ストレージプール内の論理ユニット(LU).
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalUnit {
    /// LU名.
    pub name: String,

    /// ストレージ層が割り当てた一意な識別子(UDID).
    ///
    /// 未作成のLUを表す場合には空文字列となり、作成時に管理API側で割り当てられる.
    pub udid: String,

    /// 容量(GB単位).
    pub capacity_gb: f64,

    /// LUの種別.
    pub lu_type: LuType,

    /// クローン元となったイメージLUのUDID.
    pub cloned_from: Option<String>,
}

/// 物理ボリューム.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalVolume {
    /// ボリューム名 (e.g., `"hdisk4"`).
    pub name: String,

    /// ストレージ層が割り当てた一意な識別子(UDID).
    pub udid: String,
}

/// 仮想光学メディア.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualOpticalMedia {
    /// メディア名.
    pub name: String,
}

/// `StorageElement`の種類.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `StorageElement::VirtualDisk`.
    VirtualDisk,

    /// `StorageElement::LogicalUnit`.
    LogicalUnit,

    /// `StorageElement::PhysicalVolume`.
    PhysicalVolume,

    /// `StorageElement::VirtualOpticalMedia`.
    VirtualOpticalMedia,
}

/// SCSIマッピングの裏付けとなるストレージ要素.
///
/// 等価性およびハッシュ値は「種類・名前・UDID」のみで決まり、容量等の属性は考慮されない.
/// 同一の要素が複数のVIOSから取得された場合でも、等しいものとして扱えるようにするため.
#[derive(Debug, Clone)]
pub enum StorageElement {
    /// 仮想ディスク.
    VirtualDisk(VirtualDisk),

    /// 論理ユニット.
    LogicalUnit(LogicalUnit),

    /// 物理ボリューム.
    PhysicalVolume(PhysicalVolume),

    /// 仮想光学メディア.
    VirtualOpticalMedia(VirtualOpticalMedia),
}
impl StorageElement {
    /// 要素の名前を返す.
    pub fn name(&self) -> &str {
        match self {
            StorageElement::VirtualDisk(d) => &d.name,
            StorageElement::LogicalUnit(lu) => &lu.name,
            StorageElement::PhysicalVolume(pv) => &pv.name,
            StorageElement::VirtualOpticalMedia(m) => &m.name,
        }
    }

    /// 要素のUDIDを返す.
    ///
    /// 仮想光学メディアはUDIDを持たないので`None`となる.
    pub fn udid(&self) -> Option<&str> {
        match self {
            StorageElement::VirtualDisk(d) => Some(&d.udid),
            StorageElement::LogicalUnit(lu) => Some(&lu.udid),
            StorageElement::PhysicalVolume(pv) => Some(&pv.udid),
            StorageElement::VirtualOpticalMedia(_) => None,
        }
    }

    /// 要素の種類を返す.
    pub fn kind(&self) -> ElementKind {
        match self {
            StorageElement::VirtualDisk(_) => ElementKind::VirtualDisk,
            StorageElement::LogicalUnit(_) => ElementKind::LogicalUnit,
            StorageElement::PhysicalVolume(_) => ElementKind::PhysicalVolume,
            StorageElement::VirtualOpticalMedia(_) => ElementKind::VirtualOpticalMedia,
        }
    }
}
impl PartialEq for StorageElement {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.name() == other.name() && self.udid() == other.udid()
    }
}
impl Eq for StorageElement {}
impl Hash for StorageElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.name().hash(state);
        self.udid().hash(state);
    }
}
impl fmt::Display for StorageElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.udid() {
            Some(udid) => write!(f, "{}({})", self.name(), udid),
            None => write!(f, "{}", self.name()),
        }
    }
}
impl From<VirtualDisk> for StorageElement {
    fn from(f: VirtualDisk) -> Self {
        StorageElement::VirtualDisk(f)
    }
}
impl From<LogicalUnit> for StorageElement {
    fn from(f: LogicalUnit) -> Self {
        StorageElement::LogicalUnit(f)
    }
}

/// ボリュームグループ.
///
/// 単一のVIOSに属するホストローカルなストレージプール.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGroup {
    /// ボリュームグループのUUID.
    pub uuid: String,

    /// ボリュームグループ名.
    pub name: String,

    /// 全体容量(GB単位).
    pub capacity_gb: f64,

    /// 空き容量(GB単位).
    pub available_gb: f64,

    /// グループ内の仮想ディスク群.
    pub virtual_disks: Vec<VirtualDisk>,

    /// 楽観的排他制御用のetag.
    pub etag: String,
}

/// 共有ストレージプール(SSP).
#[derive(Debug, Clone, PartialEq)]
pub struct SharedStoragePool {
    /// プールのUUID.
    pub uuid: String,

    /// プール名.
    pub name: String,

    /// ストレージ層が割り当てた一意な識別子(UDID).
    pub udid: String,

    /// 全体容量(GB単位).
    pub capacity_gb: f64,

    /// 空き容量(GB単位).
    pub free_space_gb: f64,

    /// プール内の論理ユニット群.
    pub logical_units: Vec<LogicalUnit>,

    /// 楽観的排他制御用のetag.
    pub etag: String,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn lu(name: &str, udid: &str, capacity_gb: f64) -> StorageElement {
        StorageElement::LogicalUnit(LogicalUnit {
            name: name.to_owned(),
            udid: udid.to_owned(),
            capacity_gb,
            lu_type: LuType::Disk,
            cloned_from: None,
        })
    }

    #[test]
    fn element_identity_ignores_capacity() {
        assert_eq!(lu("boot_a", "01", 1.0), lu("boot_a", "01", 20.0));
        assert_ne!(lu("boot_a", "01", 1.0), lu("boot_a", "02", 1.0));

        let vdisk = StorageElement::VirtualDisk(VirtualDisk {
            name: "boot_a".to_owned(),
            udid: "01".to_owned(),
            capacity_gb: 1.0,
        });
        assert_ne!(lu("boot_a", "01", 1.0), vdisk);

        let set = vec![lu("boot_a", "01", 1.0), lu("boot_a", "01", 1.0), vdisk]
            .into_iter()
            .collect::<HashSet<_>>();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn optical_media_has_no_udid() {
        let media = StorageElement::VirtualOpticalMedia(VirtualOpticalMedia {
            name: "cfg_inst.iso".to_owned(),
        });
        assert_eq!(media.udid(), None);
        assert_eq!(media.to_string(), "cfg_inst.iso");
        assert_eq!(lu("boot_a", "01", 1.0).to_string(), "boot_a(01)");
    }
}
