//! 文件元数据
//!
//! [`FileStat`] 是两个后端共用的描述结构，混合文件系统会在其中标注来源存储的
//! [`FileSystemType`]，调用方可凭此用 `fopen` 回到同一个存储。

use alloc::string::String;
use bitflags::bitflags;
use core::fmt;

/// 用户角色，按权限从低到高排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum UserRole {
    /// 无权限
    #[default]
    None = 0,
    /// 访客
    Guest = 1,
    /// 普通用户
    User = 2,
    /// 管理者
    Manager = 3,
    /// 管理员
    Admin = 4,
}

impl UserRole {
    /// 从存储的字节解析，越界值返回 None
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(UserRole::None),
            1 => Some(UserRole::Guest),
            2 => Some(UserRole::User),
            3 => Some(UserRole::Manager),
            4 => Some(UserRole::Admin),
            _ => None,
        }
    }

    /// 角色名称
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::None => "none",
            UserRole::Guest => "guest",
            UserRole::User => "user",
            UserRole::Manager => "manager",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文件访问控制：读写各自需要的最低角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileAcl {
    /// 读取所需最低角色
    pub read: UserRole,
    /// 写入所需最低角色
    pub write: UserRole,
}

impl FileAcl {
    /// 创建访问控制
    pub const fn new(read: UserRole, write: UserRole) -> Self {
        Self { read, write }
    }
}

impl fmt::Display for FileAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r:{},w:{}", self.read, self.write)
    }
}

bitflags! {
    /// 文件属性
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttr: u8 {
        /// 只读
        const READ_ONLY = 0x01;
        /// 已修改，待归档
        const ARCHIVE = 0x02;
        /// 内容已压缩（例如 gzip 的网页资源）
        const COMPRESSED = 0x04;
    }
}

impl fmt::Display for FileAttr {
    /// 紧凑的标志串，例如 `"RA-"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.contains(FileAttr::READ_ONLY), 'R'),
            flag(self.contains(FileAttr::ARCHIVE), 'A'),
            flag(self.contains(FileAttr::COMPRESSED), 'C'),
        )
    }
}

/// 文件系统类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileSystemType {
    /// 未知（没有激活的文件系统）
    #[default]
    Unknown,
    /// 固件只读对象存储
    Firmware,
    /// 可写闪存卷
    Flash,
    /// 混合文件系统
    Hybrid,
}

impl FileSystemType {
    /// 四字符的类型标识
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSystemType::Unknown => "unkn",
            FileSystemType::Firmware => "fwfs",
            FileSystemType::Flash => "ffs",
            FileSystemType::Hybrid => "hyfs",
        }
    }
}

impl fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文件元数据
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileStat {
    /// 文件名（相对根的完整名称）
    pub name: String,
    /// 文件大小（字节）
    pub size: u32,
    /// 存储内部的文件 ID
    pub id: u32,
    /// 属性
    pub attr: FileAttr,
    /// 访问控制
    pub acl: FileAcl,
    /// 修改时间（Unix 秒）
    pub mtime: u32,
    /// 来源存储
    pub fs_type: FileSystemType,
}

/// 文件系统信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileSystemInfo {
    /// 文件系统类型
    pub fs_type: FileSystemType,
    /// 卷大小（字节）
    pub volume_size: u32,
    /// 剩余空间（字节）
    pub free_space: u32,
}
