//! 自动关闭的文件与目录
//!
//! [`File`] 和 [`Dir`] 持有激活文件系统中的一个句柄，离开作用域时关闭它，
//! 中途出错返回也不会泄漏句柄表槽位。需要关闭结果时调用 [`File::close`]。

use alloc::vec::Vec;

use crate::{
    ActiveFilesystemRegistry, DirHandle, FileAcl, FileAttr, FileHandle, FileStat, FsError,
    SeekWhence,
};

/// 已打开的文件，drop 时关闭
///
/// ```ignore
/// let mut file = registry.open_file("config.json", OpenFlags::READ)?;
/// let content = file.read_to_end()?;
/// // 离开作用域时关闭
/// ```
pub struct File<'a> {
    registry: &'a ActiveFilesystemRegistry,
    handle: Option<FileHandle>,
}

impl<'a> File<'a> {
    pub(crate) fn new(registry: &'a ActiveFilesystemRegistry, handle: FileHandle) -> Self {
        Self {
            registry,
            handle: Some(handle),
        }
    }

    fn handle_or_closed(&self) -> Result<FileHandle, FsError> {
        self.handle.ok_or(FsError::InvalidHandle)
    }

    /// 底层句柄
    pub fn handle(&self) -> Option<FileHandle> {
        self.handle
    }

    /// 读取，返回读到的字节数（0 表示文件末尾）
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        self.registry.read(self.handle_or_closed()?, buf)
    }

    /// 尽量填满 `buf`，只在文件末尾提前结束
    pub fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// 从当前位置读到文件末尾
    pub fn read_to_end(&mut self) -> Result<Vec<u8>, FsError> {
        let size = self.stat()?.size;
        let pos = self.tell()?;
        let mut content = alloc::vec![0u8; size.saturating_sub(pos) as usize];
        let n = self.read_up_to(&mut content)?;
        content.truncate(n);
        Ok(content)
    }

    /// 写入，返回写入的字节数
    pub fn write(&mut self, data: &[u8]) -> Result<usize, FsError> {
        self.registry.write(self.handle_or_closed()?, data)
    }

    /// 写入全部数据，卷写不进时返回 [`FsError::NoSpace`]
    pub fn write_all(&mut self, mut data: &[u8]) -> Result<(), FsError> {
        while !data.is_empty() {
            let n = self.write(data)?;
            if n == 0 {
                return Err(FsError::NoSpace);
            }
            data = &data[n..];
        }
        Ok(())
    }

    /// 移动读写位置，返回新位置
    pub fn seek(&mut self, offset: i32, whence: SeekWhence) -> Result<u32, FsError> {
        self.registry.lseek(self.handle_or_closed()?, offset, whence)
    }

    /// 当前读写位置
    pub fn tell(&self) -> Result<u32, FsError> {
        self.registry.tell(self.handle_or_closed()?)
    }

    /// 是否到达文件末尾
    pub fn eof(&self) -> Result<bool, FsError> {
        self.registry.eof(self.handle_or_closed()?)
    }

    /// 在当前位置截断
    pub fn truncate(&mut self) -> Result<(), FsError> {
        self.registry.truncate(self.handle_or_closed()?)
    }

    /// 刷新缓存
    pub fn flush(&mut self) -> Result<(), FsError> {
        self.registry.flush(self.handle_or_closed()?)
    }

    /// 元数据
    pub fn stat(&self) -> Result<FileStat, FsError> {
        self.registry.fstat(self.handle_or_closed()?)
    }

    /// 设置访问控制
    pub fn set_acl(&mut self, acl: FileAcl) -> Result<(), FsError> {
        self.registry.set_acl(self.handle_or_closed()?, acl)
    }

    /// 设置属性
    pub fn set_attr(&mut self, attr: FileAttr) -> Result<(), FsError> {
        self.registry.set_attr(self.handle_or_closed()?, attr)
    }

    /// 设置修改时间
    pub fn set_time(&mut self, mtime: u32) -> Result<(), FsError> {
        self.registry.set_time(self.handle_or_closed()?, mtime)
    }

    /// 删除这个文件，句柄随之释放
    pub fn remove(mut self) -> Result<(), FsError> {
        let handle = self.handle.take().ok_or(FsError::InvalidHandle)?;
        self.registry.fremove(handle)
    }

    /// 关闭并返回关闭结果
    pub fn close(mut self) -> Result<(), FsError> {
        match self.handle.take() {
            Some(handle) => self.registry.close(handle),
            None => Ok(()),
        }
    }
}

impl Drop for File<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.registry.close(handle) {
                log::warn!("vfs: close {} on drop failed: {}", handle, e);
            }
        }
    }
}

/// 已打开的目录，按条目迭代，drop 时关闭
pub struct Dir<'a> {
    registry: &'a ActiveFilesystemRegistry,
    handle: DirHandle,
    done: bool,
}

impl<'a> Dir<'a> {
    pub(crate) fn new(registry: &'a ActiveFilesystemRegistry, handle: DirHandle) -> Self {
        Self {
            registry,
            handle,
            done: false,
        }
    }

    /// 底层句柄
    pub fn handle(&self) -> DirHandle {
        self.handle
    }
}

impl Iterator for Dir<'_> {
    type Item = Result<FileStat, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.registry.readdir(self.handle) {
            Ok(stat) => Some(Ok(stat)),
            Err(FsError::NoMoreFiles) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for Dir<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.registry.closedir(self.handle) {
            log::warn!("vfs: closedir {} on drop failed: {}", self.handle, e);
        }
    }
}
