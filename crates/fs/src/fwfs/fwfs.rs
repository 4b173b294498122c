//! 固件对象存储

use alloc::string::String;
use alloc::sync::Arc;

use device::FlashMedia;
use sync::SpinLock;
use vfs::{
    DirHandle, FileHandle, FileStat, FileSystem, FileSystemInfo, FileSystemType, FsCapabilities,
    FsError, HandleTable, OpenFlags, SeekWhence, dir_prefix, file_name, strip_dir,
};

use super::image::{self, ImageIndex};
use crate::config::MAX_OPEN_DIRS;
use crate::ops::fs_ops;

/// 打开的对象
#[derive(Debug)]
struct OpenObject {
    id: u16,
    pos: u32,
}

/// 目录遍历游标
#[derive(Debug)]
struct DirCursor {
    prefix: String,
    next: usize,
}

struct FwState {
    index: Option<ImageIndex>,
    files: HandleTable<FileHandle, OpenObject>,
    dirs: HandleTable<DirHandle, DirCursor>,
}

impl FwState {
    fn index(&self) -> Result<&ImageIndex, FsError> {
        self.index.as_ref().ok_or(FsError::NotMounted)
    }

    fn open_object(&mut self, file: FileHandle) -> Result<(&ImageIndex, &mut OpenObject), FsError> {
        let index = self.index.as_ref().ok_or(FsError::NotMounted)?;
        let obj = self.files.get_mut(file)?;
        Ok((index, obj))
    }
}

/// 固件只读对象存储
///
/// 镜像内容在构建时生成，挂载时只建立名称索引，文件数据按需从介质读取。
/// 所有修改操作都返回 [`FsError::NotSupported`]。
pub struct FirmwareFileSystem {
    flash: Arc<dyn FlashMedia>,
    state: SpinLock<FwState>,
}

impl FirmwareFileSystem {
    /// 在镜像所在的介质上创建（尚未挂载）
    pub fn new(flash: Arc<dyn FlashMedia>) -> Self {
        Self {
            flash,
            state: SpinLock::new(FwState {
                index: None,
                files: HandleTable::new(fs_ops().max_open_files()),
                dirs: HandleTable::new(MAX_OPEN_DIRS),
            }),
        }
    }

    /// 镜像中的对象数量（未挂载时为 0）
    pub fn object_count(&self) -> usize {
        self.state
            .lock()
            .index
            .as_ref()
            .map_or(0, |index| index.records.len())
    }
}

impl FileSystem for FirmwareFileSystem {
    fn fs_type(&self) -> FileSystemType {
        FileSystemType::Firmware
    }

    fn capabilities(&self) -> FsCapabilities {
        FsCapabilities::READ | FsCapabilities::DIRECTORY
    }

    fn mount(&self) -> Result<(), FsError> {
        let mut state = self.state.lock();
        if state.index.is_some() {
            return Ok(());
        }
        let index = image::parse(self.flash.as_ref())?;
        log::info!(
            "fwfs: mounted {} ({} objects, {} bytes)",
            self.flash.get_id(),
            index.records.len(),
            index.image_len
        );
        state.index = Some(index);
        Ok(())
    }

    fn get_info(&self) -> Result<FileSystemInfo, FsError> {
        let state = self.state.lock();
        Ok(FileSystemInfo {
            fs_type: FileSystemType::Firmware,
            volume_size: state.index()?.image_len,
            free_space: 0,
        })
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle, FsError> {
        let mut state = self.state.lock();
        let index = state.index()?;
        let name = file_name(path)?;
        if flags.wants_write() {
            return Err(FsError::ReadOnly);
        }
        let id = index.lookup(&name).ok_or(FsError::NotFound)?.id;
        let file = state.files.alloc(OpenObject { id, pos: 0 })?;
        log::debug!("fwfs: open {:?} -> {}", name, file);
        Ok(file)
    }

    fn close(&self, file: FileHandle) -> Result<(), FsError> {
        let mut state = self.state.lock();
        state.index()?;
        state.files.remove(file).map(|_| ())
    }

    fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut state = self.state.lock();
        let (index, obj) = state.open_object(file)?;
        let record = &index.records[obj.id as usize];
        let n = buf.len().min((record.size - obj.pos) as usize);
        self.flash
            .read((record.data_offset + obj.pos) as usize, &mut buf[..n])?;
        obj.pos += n as u32;
        Ok(n)
    }

    fn lseek(&self, file: FileHandle, offset: i32, whence: SeekWhence) -> Result<u32, FsError> {
        let mut state = self.state.lock();
        let (index, obj) = state.open_object(file)?;
        obj.pos = whence.resolve(offset, obj.pos, index.records[obj.id as usize].size);
        Ok(obj.pos)
    }

    fn eof(&self, file: FileHandle) -> Result<bool, FsError> {
        let mut state = self.state.lock();
        let (index, obj) = state.open_object(file)?;
        Ok(obj.pos >= index.records[obj.id as usize].size)
    }

    fn tell(&self, file: FileHandle) -> Result<u32, FsError> {
        let mut state = self.state.lock();
        let (_, obj) = state.open_object(file)?;
        Ok(obj.pos)
    }

    fn flush(&self, file: FileHandle) -> Result<(), FsError> {
        let mut state = self.state.lock();
        state.open_object(file).map(|_| ())
    }

    fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let state = self.state.lock();
        let index = state.index()?;
        let name = file_name(path)?;
        index
            .lookup(&name)
            .map(|r| r.to_stat())
            .ok_or(FsError::NotFound)
    }

    fn fstat(&self, file: FileHandle) -> Result<FileStat, FsError> {
        let mut state = self.state.lock();
        let (index, obj) = state.open_object(file)?;
        Ok(index.records[obj.id as usize].to_stat())
    }

    fn opendir(&self, path: &str) -> Result<DirHandle, FsError> {
        let mut state = self.state.lock();
        state.index()?;
        state.dirs.alloc(DirCursor {
            prefix: dir_prefix(path),
            next: 0,
        })
    }

    fn readdir(&self, dir: DirHandle) -> Result<FileStat, FsError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let index = state.index.as_ref().ok_or(FsError::NotMounted)?;
        let cursor = state.dirs.get_mut(dir)?;
        while let Some(record) = index.records.get(cursor.next) {
            cursor.next += 1;
            if strip_dir(&cursor.prefix, &record.name).is_some() {
                return Ok(record.to_stat());
            }
        }
        Err(FsError::NoMoreFiles)
    }

    fn closedir(&self, dir: DirHandle) -> Result<(), FsError> {
        let mut state = self.state.lock();
        state.index()?;
        state.dirs.remove(dir).map(|_| ())
    }

    fn check(&self) -> Result<u32, FsError> {
        self.state.lock().index().map(|_| 0)
    }
}
