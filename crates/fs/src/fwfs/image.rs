//! 固件镜像布局
//!
//! ```text
//! 头部 (16 B): magic "FWFS" | version u16 | object_count u16 | image_len u32 | reserved u32
//! 条目 (24 B): name_off u32 | data_off u32 | size u32 | mtime u32 |
//!              name_len u16 | attr u8 | read_role u8 | write_role u8 | reserved [u8; 3]
//! 名称与数据: 由条目中的偏移引用
//! ```
//!
//! 所有字段均为小端，偏移相对镜像起始，且必须落在 `image_len` 以内。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use device::FlashMedia;
use vfs::{FileAcl, FileAttr, FileStat, FileSystemType, FsError, UserRole};

use crate::bytes::{get_u16, get_u32};
use crate::config::{FWFS_MAGIC, FWFS_VERSION, MAX_NAME_LEN};

/// 头部大小
pub const HEADER_SIZE: usize = 16;
/// 条目大小
pub const ENTRY_SIZE: usize = 24;

/// 镜像中的一个对象（不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// 在镜像中的序号
    pub id: u16,
    /// 完整名称
    pub name: String,
    /// 数据大小
    pub size: u32,
    /// 数据偏移
    pub data_offset: u32,
    /// 属性
    pub attr: FileAttr,
    /// 访问控制
    pub acl: FileAcl,
    /// 修改时间
    pub mtime: u32,
}

impl ObjectRecord {
    /// 转换为元数据
    pub fn to_stat(&self) -> FileStat {
        FileStat {
            name: self.name.clone(),
            size: self.size,
            id: self.id as u32,
            attr: self.attr,
            acl: self.acl,
            mtime: self.mtime,
            fs_type: FileSystemType::Firmware,
        }
    }
}

/// 挂载后的镜像索引
#[derive(Debug, Default)]
pub struct ImageIndex {
    /// 镜像长度
    pub image_len: u32,
    /// 按镜像顺序排列的对象
    pub records: Vec<ObjectRecord>,
    /// 名称到序号
    pub by_name: BTreeMap<String, u16>,
}

impl ImageIndex {
    /// 按名称查找
    pub fn lookup(&self, name: &str) -> Option<&ObjectRecord> {
        self.by_name
            .get(name)
            .and_then(|&id| self.records.get(id as usize))
    }
}

fn in_image(offset: u32, len: u32, image_len: u32) -> bool {
    offset.checked_add(len).is_some_and(|end| end <= image_len)
}

fn role(v: u8) -> Result<UserRole, FsError> {
    UserRole::from_u8(v).ok_or(FsError::Integrity)
}

/// 校验并索引镜像
///
/// 任何结构错误都返回 [`FsError::Integrity`]。
pub fn parse(flash: &dyn FlashMedia) -> Result<ImageIndex, FsError> {
    let mut header = [0u8; HEADER_SIZE];
    flash.read(0, &mut header).map_err(|_| FsError::Integrity)?;

    if header[0..4] != FWFS_MAGIC {
        log::error!("fwfs: bad image magic on {}", flash.get_id());
        return Err(FsError::Integrity);
    }
    let version = get_u16(&header, 4);
    if version != FWFS_VERSION {
        log::error!("fwfs: unsupported image version {}", version);
        return Err(FsError::Integrity);
    }
    let count = get_u16(&header, 6) as usize;
    let image_len = get_u32(&header, 8);
    if image_len as usize > flash.size() {
        log::error!(
            "fwfs: image length {} exceeds region size {}",
            image_len,
            flash.size()
        );
        return Err(FsError::Integrity);
    }
    let table_len = (HEADER_SIZE + count * ENTRY_SIZE) as u32;
    if table_len > image_len {
        return Err(FsError::Integrity);
    }

    let mut table = vec![0u8; count * ENTRY_SIZE];
    flash.read(HEADER_SIZE, &mut table)?;

    let mut index = ImageIndex {
        image_len,
        ..Default::default()
    };
    for (id, entry) in table.chunks_exact(ENTRY_SIZE).enumerate() {
        let name_off = get_u32(entry, 0);
        let data_off = get_u32(entry, 4);
        let size = get_u32(entry, 8);
        let mtime = get_u32(entry, 12);
        let name_len = get_u16(entry, 16) as u32;

        if name_len == 0
            || name_len as usize > MAX_NAME_LEN
            || !in_image(name_off, name_len, image_len)
            || !in_image(data_off, size, image_len)
        {
            log::error!("fwfs: entry {} out of bounds", id);
            return Err(FsError::Integrity);
        }

        let mut raw_name = vec![0u8; name_len as usize];
        flash.read(name_off as usize, &mut raw_name)?;
        let name = String::from_utf8(raw_name).map_err(|_| FsError::Integrity)?;
        if index.by_name.insert(name.clone(), id as u16).is_some() {
            log::error!("fwfs: duplicate name {:?}", name);
            return Err(FsError::Integrity);
        }

        index.records.push(ObjectRecord {
            id: id as u16,
            name,
            size,
            data_offset: data_off,
            attr: FileAttr::from_bits_truncate(entry[18]),
            acl: FileAcl::new(role(entry[19])?, role(entry[20])?),
            mtime,
        });
    }

    Ok(index)
}
