//! 混合文件系统
//!
//! 把固件对象存储和可写闪存卷合成一个命名空间：
//!
//! - 可写卷中的文件遮盖对象存储中的同名文件
//! - 带写意图的打开只进入可写卷；对象存储中的文件不会被复制过来（没有写时复制）
//! - 只读打开先查可写卷，未命中再回退到对象存储
//! - 句柄操作始终发往打开它的那个存储
//! - 目录遍历先列出可写卷，再列出未被遮盖的对象存储文件，每个名称只出现一次

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;

use sync::SpinLock;
use vfs::{
    DirHandle, FileAcl, FileAttr, FileHandle, FileStat, FileSystem, FileSystemInfo,
    FileSystemType, FsCapabilities, FsError, HandleTable, OpenFlags, SeekWhence, file_name,
};

use crate::config::MAX_OPEN_DIRS;
use crate::ops::fs_ops;

/// 句柄来自哪个存储
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Object,
    Writable,
}

#[derive(Debug, Clone, Copy)]
struct HybridFile {
    origin: Origin,
    inner: FileHandle,
}

/// 目录遍历会话：先遍历可写卷，结束后再遍历对象存储
#[derive(Debug)]
struct HybridDir {
    writable: Option<DirHandle>,
    object: Option<DirHandle>,
    /// 可写卷已列出的名称
    seen: BTreeSet<String>,
}

struct HybridState {
    /// `None` 表示槽位已预留、内层文件尚在打开
    files: HandleTable<FileHandle, Option<HybridFile>>,
    dirs: HandleTable<DirHandle, HybridDir>,
}

/// 对象存储拒绝修改时统一报告为只读
fn read_only(e: FsError) -> FsError {
    match e {
        FsError::NotSupported => FsError::ReadOnly,
        e => e,
    }
}

/// 可写卷中没有该文件（或可写卷不可用）
fn writable_miss(e: FsError) -> bool {
    matches!(e, FsError::NotFound | FsError::NotMounted)
}

/// 混合文件系统
pub struct HybridFileSystem {
    object: Box<dyn FileSystem>,
    writable: Box<dyn FileSystem>,
    state: SpinLock<HybridState>,
}

impl HybridFileSystem {
    /// 由对象存储和可写卷组合（尚未挂载）
    pub fn new(object: Box<dyn FileSystem>, writable: Box<dyn FileSystem>) -> Self {
        Self {
            object,
            writable,
            state: SpinLock::new(HybridState {
                files: HandleTable::new(fs_ops().max_open_files()),
                dirs: HandleTable::new(MAX_OPEN_DIRS),
            }),
        }
    }

    fn store(&self, origin: Origin) -> &dyn FileSystem {
        match origin {
            Origin::Object => self.object.as_ref(),
            Origin::Writable => self.writable.as_ref(),
        }
    }

    fn file(&self, file: FileHandle) -> Result<HybridFile, FsError> {
        let slot = *self.state.lock().files.get(file)?;
        slot.ok_or(FsError::InvalidHandle)
    }

    /// 释放已打开的槽位（预留中的槽位不受影响）
    fn untrack(&self, file: FileHandle) -> Result<HybridFile, FsError> {
        let mut state = self.state.lock();
        let hf = state.files.get(file)?.ok_or(FsError::InvalidHandle)?;
        state.files.remove(file)?;
        Ok(hf)
    }

    /// 对句柄所属存储执行修改操作
    fn mutate<R>(
        &self,
        file: FileHandle,
        f: impl FnOnce(&dyn FileSystem, FileHandle) -> Result<R, FsError>,
    ) -> Result<R, FsError> {
        let hf = self.file(file)?;
        let store = self.store(hf.origin);
        if !store.capabilities().contains(FsCapabilities::WRITE) {
            return Err(FsError::ReadOnly);
        }
        f(store, hf.inner).map_err(read_only)
    }

    /// 先预留混合句柄，再打开内层文件
    ///
    /// 句柄表已满时内层存储完全不会被访问，`CREATE`/`TRUNCATE` 不会留下痕迹。
    fn open_tracked(
        &self,
        open: impl FnOnce() -> Result<(Origin, FileHandle), FsError>,
    ) -> Result<FileHandle, FsError> {
        let handle = self.state.lock().files.alloc(None)?;
        let (origin, inner) = match open() {
            Ok(opened) => opened,
            Err(e) => {
                let _ = self.state.lock().files.remove(handle);
                return Err(e);
            }
        };

        let mut state = self.state.lock();
        match state.files.get_mut(handle) {
            Ok(slot) => {
                *slot = Some(HybridFile { origin, inner });
                Ok(handle)
            }
            Err(e) => {
                drop(state);
                let _ = self.store(origin).close(inner);
                Err(e)
            }
        }
    }

    fn open_writable(&self, path: &str, flags: OpenFlags) -> Result<FileHandle, FsError> {
        if !self.writable.capabilities().contains(FsCapabilities::WRITE) {
            return Err(FsError::ReadOnly);
        }
        match self.writable.open(path, flags) {
            Err(FsError::NotFound) if !flags.contains(OpenFlags::CREATE) => {
                // 只存在于对象存储中的文件不可写
                match self.object.stat(path) {
                    Ok(_) => Err(FsError::ReadOnly),
                    Err(_) => Err(FsError::NotFound),
                }
            }
            r => r,
        }
    }
}

impl FileSystem for HybridFileSystem {
    fn fs_type(&self) -> FileSystemType {
        FileSystemType::Hybrid
    }

    fn capabilities(&self) -> FsCapabilities {
        self.object.capabilities() | self.writable.capabilities()
    }

    fn mount(&self) -> Result<(), FsError> {
        self.object.mount()?;
        match self.writable.mount() {
            Ok(()) => Ok(()),
            Err(FsError::NotFormatted | FsError::Integrity) => {
                log::warn!("hyfs: writable volume not formatted");
                Err(FsError::NotFormatted)
            }
            Err(e) => Err(e),
        }
    }

    fn get_info(&self) -> Result<FileSystemInfo, FsError> {
        let info = self.writable.get_info()?;
        Ok(FileSystemInfo {
            fs_type: FileSystemType::Hybrid,
            ..info
        })
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle, FsError> {
        file_name(path)?;
        if flags.wants_write() {
            return self.open_tracked(|| {
                let inner = self.open_writable(path, flags)?;
                Ok((Origin::Writable, inner))
            });
        }

        self.open_tracked(|| match self.writable.open(path, flags) {
            Ok(inner) => Ok((Origin::Writable, inner)),
            Err(e) if writable_miss(e) => Ok((Origin::Object, self.object.open(path, flags)?)),
            Err(e) => Err(e),
        })
    }

    fn fopen(&self, stat: &FileStat, flags: OpenFlags) -> Result<FileHandle, FsError> {
        match stat.fs_type {
            FileSystemType::Firmware => {
                self.open_tracked(|| Ok((Origin::Object, self.object.fopen(stat, flags)?)))
            }
            FileSystemType::Flash => {
                self.open_tracked(|| Ok((Origin::Writable, self.writable.fopen(stat, flags)?)))
            }
            _ => self.open(&stat.name, flags),
        }
    }

    fn close(&self, file: FileHandle) -> Result<(), FsError> {
        let hf = self.untrack(file)?;
        self.store(hf.origin).close(hf.inner)
    }

    fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        let hf = self.file(file)?;
        self.store(hf.origin).read(hf.inner, buf)
    }

    fn write(&self, file: FileHandle, data: &[u8]) -> Result<usize, FsError> {
        self.mutate(file, |fs, inner| fs.write(inner, data))
    }

    fn lseek(&self, file: FileHandle, offset: i32, whence: SeekWhence) -> Result<u32, FsError> {
        let hf = self.file(file)?;
        self.store(hf.origin).lseek(hf.inner, offset, whence)
    }

    fn eof(&self, file: FileHandle) -> Result<bool, FsError> {
        let hf = self.file(file)?;
        self.store(hf.origin).eof(hf.inner)
    }

    fn tell(&self, file: FileHandle) -> Result<u32, FsError> {
        let hf = self.file(file)?;
        self.store(hf.origin).tell(hf.inner)
    }

    fn truncate(&self, file: FileHandle) -> Result<(), FsError> {
        self.mutate(file, |fs, inner| fs.truncate(inner))
    }

    fn flush(&self, file: FileHandle) -> Result<(), FsError> {
        let hf = self.file(file)?;
        self.store(hf.origin).flush(hf.inner)
    }

    fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        match self.writable.stat(path) {
            Err(e) if writable_miss(e) => self.object.stat(path),
            r => r,
        }
    }

    fn fstat(&self, file: FileHandle) -> Result<FileStat, FsError> {
        let hf = self.file(file)?;
        self.store(hf.origin).fstat(hf.inner)
    }

    fn set_acl(&self, file: FileHandle, acl: FileAcl) -> Result<(), FsError> {
        self.mutate(file, |fs, inner| fs.set_acl(inner, acl))
    }

    fn set_attr(&self, file: FileHandle, attr: FileAttr) -> Result<(), FsError> {
        self.mutate(file, |fs, inner| fs.set_attr(inner, attr))
    }

    fn set_time(&self, file: FileHandle, mtime: u32) -> Result<(), FsError> {
        self.mutate(file, |fs, inner| fs.set_time(inner, mtime))
    }

    fn remove(&self, path: &str) -> Result<(), FsError> {
        match self.writable.remove(path) {
            Err(e) if writable_miss(e) && self.object.stat(path).is_ok() => Err(FsError::ReadOnly),
            r => r,
        }
    }

    fn fremove(&self, file: FileHandle) -> Result<(), FsError> {
        self.mutate(file, |fs, inner| fs.fremove(inner))?;
        // 内层句柄已随删除关闭
        self.untrack(file).map(|_| ())
    }

    fn rename(&self, old: &str, new: &str) -> Result<(), FsError> {
        if self.object.stat(new).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        match self.writable.rename(old, new) {
            Err(e) if writable_miss(e) && self.object.stat(old).is_ok() => Err(FsError::ReadOnly),
            r => r,
        }
    }

    fn opendir(&self, path: &str) -> Result<DirHandle, FsError> {
        let writable = match self.writable.opendir(path) {
            Ok(dir) => Some(dir),
            Err(FsError::NotMounted) => None,
            Err(e) => return Err(e),
        };
        let object = match self.object.opendir(path) {
            Ok(dir) => Some(dir),
            Err(e) => {
                if let Some(dir) = writable {
                    let _ = self.writable.closedir(dir);
                }
                return Err(e);
            }
        };

        let handle = self.state.lock().dirs.alloc(HybridDir {
            writable,
            object,
            seen: BTreeSet::new(),
        });
        if handle.is_err() {
            if let Some(dir) = writable {
                let _ = self.writable.closedir(dir);
            }
            if let Some(dir) = object {
                let _ = self.object.closedir(dir);
            }
        }
        handle
    }

    fn readdir(&self, dir: DirHandle) -> Result<FileStat, FsError> {
        let mut state = self.state.lock();
        let session = state.dirs.get_mut(dir)?;

        if let Some(inner) = session.writable {
            match self.writable.readdir(inner) {
                Ok(stat) => {
                    session.seen.insert(stat.name.clone());
                    return Ok(stat);
                }
                Err(FsError::NoMoreFiles) => {
                    session.writable = None;
                    self.writable.closedir(inner)?;
                }
                Err(e) => return Err(e),
            }
        }

        let Some(inner) = session.object else {
            return Err(FsError::NoMoreFiles);
        };
        loop {
            let stat = self.object.readdir(inner)?;
            if !session.seen.contains(&stat.name) {
                return Ok(stat);
            }
        }
    }

    fn closedir(&self, dir: DirHandle) -> Result<(), FsError> {
        let session = self.state.lock().dirs.remove(dir)?;
        let mut result = Ok(());
        if let Some(inner) = session.writable {
            result = self.writable.closedir(inner);
        }
        if let Some(inner) = session.object {
            result = result.and(self.object.closedir(inner));
        }
        result
    }

    fn format(&self) -> Result<(), FsError> {
        if !self.writable.capabilities().contains(FsCapabilities::FORMAT) {
            return Err(FsError::NotSupported);
        }
        self.writable.format()?;

        // 可写卷的句柄已被格式化作废
        let mut state = self.state.lock();
        let stale: Vec<FileHandle> = state
            .files
            .iter()
            .filter(|(_, f)| matches!(f, Some(f) if f.origin == Origin::Writable))
            .map(|(h, _)| h)
            .collect();
        for file in stale {
            let _ = state.files.remove(file);
        }
        for (_, session) in state.dirs.iter_mut() {
            session.writable = None;
        }
        Ok(())
    }

    fn check(&self) -> Result<u32, FsError> {
        if !self.writable.capabilities().contains(FsCapabilities::CHECK) {
            return Ok(0);
        }
        self.writable.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashfs::FlashFileSystem;
    use crate::fwfs::FirmwareFileSystem;
    use crate::test_utils::{blank_flash, sample_image};
    use alloc::vec;

    fn hybrid() -> HybridFileSystem {
        let fs = HybridFileSystem::new(
            Box::new(FirmwareFileSystem::new(sample_image())),
            Box::new(FlashFileSystem::new(blank_flash())),
        );
        assert_eq!(fs.mount(), Err(FsError::NotFormatted));
        fs.format().unwrap();
        fs.mount().unwrap();
        fs
    }

    fn put(fs: &HybridFileSystem, name: &str, data: &[u8]) {
        let file = fs.open(name, OpenFlags::CREATE_NEW_ALWAYS | OpenFlags::WRITE).unwrap();
        fs.write(file, data).unwrap();
        fs.close(file).unwrap();
    }

    fn names(fs: &HybridFileSystem, path: &str) -> Vec<String> {
        let dir = fs.opendir(path).unwrap();
        let mut out = Vec::new();
        loop {
            match fs.readdir(dir) {
                Ok(stat) => out.push(stat.name),
                Err(FsError::NoMoreFiles) => break,
                Err(e) => panic!("readdir: {e}"),
            }
        }
        fs.closedir(dir).unwrap();
        out
    }

    #[test]
    fn test_writable_shadows_object() {
        let fs = hybrid();
        assert_eq!(fs.stat("index.html").unwrap().fs_type, FileSystemType::Firmware);

        put(&fs, "index.html", b"<p>local</p>");
        let stat = fs.stat("index.html").unwrap();
        assert_eq!(stat.fs_type, FileSystemType::Flash);
        assert_eq!(stat.size, 12);

        let file = fs.open("index.html", OpenFlags::READ).unwrap();
        let mut buf = vec![0u8; 64];
        assert_eq!(fs.read(file, &mut buf).unwrap(), 12);
        fs.close(file).unwrap();

        // 删除可写副本后重新露出对象存储中的版本
        fs.remove("index.html").unwrap();
        assert_eq!(fs.stat("index.html").unwrap().size, 500);
    }

    #[test]
    fn test_object_only_files_are_read_only() {
        let fs = hybrid();
        assert_eq!(
            fs.open("index.html", OpenFlags::READ_WRITE),
            Err(FsError::ReadOnly)
        );
        assert_eq!(fs.remove("web/app.js"), Err(FsError::ReadOnly));
        assert_eq!(fs.rename("web/app.js", "x.js"), Err(FsError::ReadOnly));
        assert_eq!(fs.rename("nope", "x.js"), Err(FsError::NotFound));

        let file = fs.open("index.html", OpenFlags::READ).unwrap();
        assert_eq!(fs.write(file, b"x"), Err(FsError::ReadOnly));
        assert_eq!(fs.set_time(file, 1), Err(FsError::ReadOnly));
        assert_eq!(fs.fremove(file), Err(FsError::ReadOnly));
        assert_eq!(fs.tell(file).unwrap(), 0);
        fs.close(file).unwrap();
    }

    #[test]
    fn test_create_does_not_copy_object() {
        let fs = hybrid();
        let file = fs
            .open("index.html", OpenFlags::CREATE | OpenFlags::READ_WRITE)
            .unwrap();
        assert_eq!(fs.fstat(file).unwrap().size, 0);
        fs.close(file).unwrap();
        assert_eq!(fs.stat("index.html").unwrap().size, 0);
    }

    #[test]
    fn test_rename_onto_object_name() {
        let fs = hybrid();
        put(&fs, "a.txt", b"a");
        assert_eq!(fs.rename("a.txt", "index.html"), Err(FsError::AlreadyExists));
        fs.rename("a.txt", "b.txt").unwrap();
        assert_eq!(fs.stat("b.txt").unwrap().size, 1);
    }

    #[test]
    fn test_listing_deduplicates() {
        let fs = hybrid();
        assert_eq!(names(&fs, ""), ["index.html", "web/app.js"]);

        put(&fs, "web/app.js", b"local");
        put(&fs, "config.json", b"{}");
        assert_eq!(names(&fs, "/"), ["config.json", "web/app.js", "index.html"]);
        assert_eq!(names(&fs, "web"), ["web/app.js"]);
    }

    #[test]
    fn test_format_drops_writable_handles() {
        let fs = hybrid();
        put(&fs, "a.txt", b"a");
        let writable = fs.open("a.txt", OpenFlags::READ).unwrap();
        let object = fs.open("index.html", OpenFlags::READ).unwrap();
        let dir = fs.opendir("").unwrap();
        assert_eq!(fs.readdir(dir).unwrap().name, "a.txt");

        fs.format().unwrap();
        assert_eq!(fs.tell(writable), Err(FsError::InvalidHandle));
        assert_eq!(fs.tell(object).unwrap(), 0);
        assert_eq!(fs.readdir(dir).unwrap().name, "index.html");
        fs.closedir(dir).unwrap();
        fs.close(object).unwrap();
        assert_eq!(fs.check().unwrap(), 0);
    }

    #[test]
    fn test_full_table_leaves_volume_untouched() {
        let fs = hybrid();
        put(&fs, "a.txt", b"hello");

        let max = test_support::mock::fs::MOCK_FS_OPS.max_open_files();
        let held: Vec<FileHandle> = (0..max)
            .map(|_| fs.open("index.html", OpenFlags::READ).unwrap())
            .collect();
        assert_eq!(
            fs.open("a.txt", OpenFlags::CREATE_NEW_ALWAYS | OpenFlags::WRITE),
            Err(FsError::TooManyOpenFiles)
        );
        assert_eq!(
            fs.open("fresh.txt", OpenFlags::CREATE | OpenFlags::WRITE),
            Err(FsError::TooManyOpenFiles)
        );
        assert_eq!(fs.stat("a.txt").unwrap().size, 5);
        assert_eq!(fs.stat("fresh.txt"), Err(FsError::NotFound));

        for file in held {
            fs.close(file).unwrap();
        }
        let file = fs.open("a.txt", OpenFlags::READ).unwrap();
        assert_eq!(fs.fstat(file).unwrap().size, 5);
        fs.close(file).unwrap();
    }

    #[test]
    fn test_store_without_write_capability() {
        let fs = HybridFileSystem::new(
            Box::new(FirmwareFileSystem::new(sample_image())),
            Box::new(FirmwareFileSystem::new(sample_image())),
        );
        fs.mount().unwrap();
        assert!(!fs.capabilities().contains(FsCapabilities::WRITE));

        assert_eq!(
            fs.open("new.txt", OpenFlags::CREATE | OpenFlags::WRITE),
            Err(FsError::ReadOnly)
        );
        assert_eq!(fs.format(), Err(FsError::NotSupported));

        let file = fs.open("index.html", OpenFlags::READ).unwrap();
        assert_eq!(fs.write(file, b"x"), Err(FsError::ReadOnly));
        assert_eq!(fs.truncate(file), Err(FsError::ReadOnly));
        fs.close(file).unwrap();
    }

    #[test]
    fn test_fopen_routes_by_origin() {
        let fs = hybrid();
        put(&fs, "index.html", b"local");
        let mut stat = fs.stat("index.html").unwrap();
        stat.fs_type = FileSystemType::Firmware;
        let file = fs.fopen(&stat, OpenFlags::READ).unwrap();
        assert_eq!(fs.fstat(file).unwrap().size, 500);
        fs.close(file).unwrap();
    }
}
