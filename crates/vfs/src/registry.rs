//! 当前激活的文件系统
//!
//! 进程内最多只有一个激活的文件系统。所有调用都先检查是否已激活，
//! 未激活时返回 [`FsError::NoFileSystem`]，不产生任何副作用。
//!
//! 替换激活实例必须发生在两次使用之间：旧实例的句柄在替换后全部失效，
//! 调用方负责不再使用它们。

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use sync::RwLock;

use crate::guard::{Dir, File};
use crate::{
    DirHandle, FileAcl, FileAttr, FileHandle, FileStat, FileSystem, FileSystemInfo,
    FileSystemType, FsError, OpenFlags, SeekWhence,
};

/// 激活文件系统注册表
pub struct ActiveFilesystemRegistry {
    active: RwLock<Option<Box<dyn FileSystem>>>,
}

impl Default for ActiveFilesystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveFilesystemRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            active: RwLock::new(None),
        }
    }

    /// 设置激活的文件系统
    ///
    /// 先释放旧实例，再安装新实例。传入 `None` 只释放。
    pub fn set_active(&self, fs: Option<Box<dyn FileSystem>>) {
        let mut active = self.active.write();
        if let Some(old) = active.take() {
            log::info!("vfs: release active filesystem ({})", old.fs_type());
            drop(old);
        }
        if let Some(fs) = &fs {
            log::info!("vfs: activate filesystem ({})", fs.fs_type());
        }
        *active = fs;
    }

    /// 释放激活的文件系统
    pub fn release(&self) {
        self.set_active(None);
    }

    /// 是否有激活的文件系统
    pub fn is_active(&self) -> bool {
        self.active.read().is_some()
    }

    /// 激活文件系统的类型，未激活时为 [`FileSystemType::Unknown`]
    pub fn fs_type(&self) -> FileSystemType {
        self.active
            .read()
            .as_deref()
            .map_or(FileSystemType::Unknown, |fs| fs.fs_type())
    }

    fn with<R>(&self, f: impl FnOnce(&dyn FileSystem) -> Result<R, FsError>) -> Result<R, FsError> {
        let active = self.active.read();
        match active.as_deref() {
            Some(fs) => f(fs),
            None => Err(FsError::NoFileSystem),
        }
    }

    /// 获取卷信息
    pub fn get_info(&self) -> Result<FileSystemInfo, FsError> {
        self.with(|fs| fs.get_info())
    }

    /// 打开文件
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle, FsError> {
        self.with(|fs| fs.open(path, flags))
    }

    /// 按元数据打开文件
    pub fn fopen(&self, stat: &FileStat, flags: OpenFlags) -> Result<FileHandle, FsError> {
        self.with(|fs| fs.fopen(stat, flags))
    }

    /// 关闭文件
    pub fn close(&self, file: FileHandle) -> Result<(), FsError> {
        self.with(|fs| fs.close(file))
    }

    /// 读取
    pub fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        self.with(|fs| fs.read(file, buf))
    }

    /// 写入
    pub fn write(&self, file: FileHandle, data: &[u8]) -> Result<usize, FsError> {
        self.with(|fs| fs.write(file, data))
    }

    /// 移动读写位置
    pub fn lseek(&self, file: FileHandle, offset: i32, whence: SeekWhence) -> Result<u32, FsError> {
        self.with(|fs| fs.lseek(file, offset, whence))
    }

    /// 是否到达文件末尾
    pub fn eof(&self, file: FileHandle) -> Result<bool, FsError> {
        self.with(|fs| fs.eof(file))
    }

    /// 当前读写位置
    pub fn tell(&self, file: FileHandle) -> Result<u32, FsError> {
        self.with(|fs| fs.tell(file))
    }

    /// 在当前位置截断
    pub fn truncate(&self, file: FileHandle) -> Result<(), FsError> {
        self.with(|fs| fs.truncate(file))
    }

    /// 刷新缓存
    pub fn flush(&self, file: FileHandle) -> Result<(), FsError> {
        self.with(|fs| fs.flush(file))
    }

    /// 按路径获取元数据
    pub fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        self.with(|fs| fs.stat(path))
    }

    /// 按句柄获取元数据
    pub fn fstat(&self, file: FileHandle) -> Result<FileStat, FsError> {
        self.with(|fs| fs.fstat(file))
    }

    /// 设置访问控制
    pub fn set_acl(&self, file: FileHandle, acl: FileAcl) -> Result<(), FsError> {
        self.with(|fs| fs.set_acl(file, acl))
    }

    /// 设置属性
    pub fn set_attr(&self, file: FileHandle, attr: FileAttr) -> Result<(), FsError> {
        self.with(|fs| fs.set_attr(file, attr))
    }

    /// 设置修改时间
    pub fn set_time(&self, file: FileHandle, mtime: u32) -> Result<(), FsError> {
        self.with(|fs| fs.set_time(file, mtime))
    }

    /// 删除文件
    pub fn remove(&self, path: &str) -> Result<(), FsError> {
        self.with(|fs| fs.remove(path))
    }

    /// 删除已打开的文件
    pub fn fremove(&self, file: FileHandle) -> Result<(), FsError> {
        self.with(|fs| fs.fremove(file))
    }

    /// 重命名
    pub fn rename(&self, old: &str, new: &str) -> Result<(), FsError> {
        self.with(|fs| fs.rename(old, new))
    }

    /// 打开目录
    pub fn opendir(&self, path: &str) -> Result<DirHandle, FsError> {
        self.with(|fs| fs.opendir(path))
    }

    /// 读取目录条目
    pub fn readdir(&self, dir: DirHandle) -> Result<FileStat, FsError> {
        self.with(|fs| fs.readdir(dir))
    }

    /// 关闭目录
    pub fn closedir(&self, dir: DirHandle) -> Result<(), FsError> {
        self.with(|fs| fs.closedir(dir))
    }

    /// 格式化
    pub fn format(&self) -> Result<(), FsError> {
        self.with(|fs| fs.format())
    }

    /// 检查并修复
    pub fn check(&self) -> Result<u32, FsError> {
        self.with(|fs| fs.check())
    }

    /// 错误码描述，写入 `buf`
    pub fn error_text(&self, code: i32, buf: &mut [u8]) -> Result<usize, FsError> {
        self.with(|fs| Ok(fs.error_text(code, buf)))
    }

    // ========== 便捷操作 ==========

    /// 打开文件，返回离开作用域时自动关闭的 [`File`]
    pub fn open_file(&self, path: &str, flags: OpenFlags) -> Result<File<'_>, FsError> {
        self.open(path, flags).map(|handle| File::new(self, handle))
    }

    /// 打开目录，返回自动关闭的条目迭代器 [`Dir`]
    pub fn open_dir(&self, path: &str) -> Result<Dir<'_>, FsError> {
        self.opendir(path).map(|handle| Dir::new(self, handle))
    }

    /// 创建或替换文件内容
    pub fn set_content(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let mut file = self.open_file(path, OpenFlags::CREATE_NEW_ALWAYS | OpenFlags::WRITE)?;
        file.write_all(data)?;
        file.close()
    }

    /// 读取整个文件
    pub fn get_content(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let mut file = self.open_file(path, OpenFlags::READ)?;
        let content = file.read_to_end()?;
        file.close()?;
        Ok(content)
    }

    /// 把文件内容读入 `buf` 并以 nul 结尾，返回内容长度
    ///
    /// `buf` 为空时返回 [`FsError::InvalidArgument`]；其余情况下 `buf[0]` 先被置 0，
    /// 打开失败时调用方拿到的是空字符串。文件放不下（含结尾 nul）时写入截断的内容并返回
    /// [`FsError::BufferTooSmall`]。
    pub fn get_content_into(&self, path: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        let Some(first) = buf.first_mut() else {
            return Err(FsError::InvalidArgument);
        };
        *first = 0;
        let mut file = self.open_file(path, OpenFlags::READ)?;
        let size = file.stat()?.size as usize;
        let limit = buf.len() - 1;
        let n = file.read_up_to(&mut buf[..limit])?;
        buf[n] = 0;
        file.close()?;
        if size > n {
            Err(FsError::BufferTooSmall)
        } else {
            Ok(n)
        }
    }

    /// 文件大小，出错时为 0
    pub fn get_size(&self, path: &str) -> u32 {
        self.stat(path).map_or(0, |s| s.size)
    }

    /// 文件是否存在
    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// 列出目录下的全部名称
    pub fn list(&self, path: &str) -> Result<Vec<String>, FsError> {
        self.open_dir(path)?
            .map(|entry| entry.map(|stat| stat.name))
            .collect()
    }

    /// 更新文件的修改时间（写入 0 字节）
    pub fn touch(&self, file: FileHandle) -> Result<(), FsError> {
        self.write(file, &[]).map(|_| ())
    }
}
