//! 文件系统抽象

use bitflags::bitflags;

use crate::{
    DirHandle, FileAcl, FileAttr, FileHandle, FileStat, FileSystemInfo, FileSystemType, FsError,
    OpenFlags, SeekWhence,
};

bitflags! {
    /// 文件系统能力
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FsCapabilities: u8 {
        /// 可读
        const READ = 0x01;
        /// 可写（创建、修改、删除）
        const WRITE = 0x02;
        /// 可枚举目录
        const DIRECTORY = 0x04;
        /// 可格式化
        const FORMAT = 0x08;
        /// 可检查修复
        const CHECK = 0x10;
    }
}

/// 文件系统 trait
///
/// 所有后端和混合文件系统都实现此 trait，激活后通过
/// [`ActiveFilesystemRegistry`](crate::ActiveFilesystemRegistry) 统一调用。
///
/// 句柄只在产生它的实例内有效。修改类操作默认返回 [`FsError::NotSupported`]，
/// 只读存储无需实现它们。
pub trait FileSystem: Send + Sync {
    /// 文件系统类型
    fn fs_type(&self) -> FileSystemType;

    /// 支持的能力
    fn capabilities(&self) -> FsCapabilities;

    /// 挂载
    fn mount(&self) -> Result<(), FsError>;

    /// 获取卷信息
    fn get_info(&self) -> Result<FileSystemInfo, FsError>;

    /// 按路径打开文件
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle, FsError>;

    /// 按已有的元数据打开文件（不再做路径查找）
    fn fopen(&self, stat: &FileStat, flags: OpenFlags) -> Result<FileHandle, FsError> {
        self.open(&stat.name, flags)
    }

    /// 关闭文件
    fn close(&self, file: FileHandle) -> Result<(), FsError>;

    /// 从当前位置读取，返回读取的字节数（文件末尾返回 0）
    fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, FsError>;

    /// 在当前位置写入，返回写入的字节数
    fn write(&self, _file: FileHandle, _data: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotSupported)
    }

    /// 移动读写位置，返回新位置（限制在 `[0, size]`）
    fn lseek(&self, file: FileHandle, offset: i32, whence: SeekWhence) -> Result<u32, FsError>;

    /// 是否已到文件末尾
    fn eof(&self, file: FileHandle) -> Result<bool, FsError>;

    /// 当前读写位置
    fn tell(&self, file: FileHandle) -> Result<u32, FsError>;

    /// 在当前位置截断文件
    fn truncate(&self, _file: FileHandle) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 把缓存的修改写入介质
    fn flush(&self, file: FileHandle) -> Result<(), FsError>;

    /// 按路径获取元数据
    fn stat(&self, path: &str) -> Result<FileStat, FsError>;

    /// 按句柄获取元数据
    fn fstat(&self, file: FileHandle) -> Result<FileStat, FsError>;

    /// 设置访问控制
    fn set_acl(&self, _file: FileHandle, _acl: FileAcl) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 设置属性
    fn set_attr(&self, _file: FileHandle, _attr: FileAttr) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 设置修改时间
    fn set_time(&self, _file: FileHandle, _mtime: u32) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 按路径删除文件
    fn remove(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 删除已打开的文件（句柄随之关闭）
    fn fremove(&self, _file: FileHandle) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 重命名
    fn rename(&self, _old: &str, _new: &str) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 打开目录遍历会话
    fn opendir(&self, path: &str) -> Result<DirHandle, FsError>;

    /// 读取下一个条目，遍历结束时返回 [`FsError::NoMoreFiles`]
    fn readdir(&self, dir: DirHandle) -> Result<FileStat, FsError>;

    /// 关闭目录遍历会话
    fn closedir(&self, dir: DirHandle) -> Result<(), FsError>;

    /// 格式化（清空所有可写内容）
    fn format(&self) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 检查并修复，返回修复的问题数（0 表示完好）
    fn check(&self) -> Result<u32, FsError> {
        Ok(0)
    }

    /// 把错误码的描述写入 `buf`，返回完整文本长度
    fn error_text(&self, code: i32, buf: &mut [u8]) -> usize {
        crate::error_text(code, buf)
    }
}
