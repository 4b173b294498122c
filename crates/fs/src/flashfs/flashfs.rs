//! 日志结构的可写闪存卷

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::ops::Bound;

use device::{FlashAccess, FlashMedia};
use sync::SpinLock;
use vfs::{
    DirHandle, FileAcl, FileAttr, FileHandle, FileStat, FileSystem, FileSystemInfo,
    FileSystemType, FsCapabilities, FsError, HandleTable, OpenFlags, SeekWhence, dir_prefix,
    file_name, strip_dir,
};

use super::layout::{
    EntryMeta, RECORD_HEADER_SIZE, RecordKind, Scan, VolumeHeader, encode_record, read_record,
};
use crate::config::{MAX_NAME_LEN, MAX_OPEN_DIRS};
use crate::ops::fs_ops;

/// 卷中的一个文件
#[derive(Debug, Clone)]
struct Entry {
    id: u32,
    data_offset: u32,
    size: u32,
    meta: EntryMeta,
}

bitflags! {
    /// 打开文件的状态
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct FileState: u8 {
        /// 有尚未写入介质的修改
        const DIRTY = 0x01;
        /// 修改时间已被显式设置
        const TIME_SET = 0x02;
        /// 文件已被删除，不再写回
        const ORPHANED = 0x04;
    }
}

/// 打开的文件，内容缓存在内存中
#[derive(Debug)]
struct OpenFile {
    name: String,
    id: Option<u32>,
    data: Vec<u8>,
    pos: u32,
    flags: OpenFlags,
    meta: EntryMeta,
    state: FileState,
}

impl OpenFile {
    fn stat(&self) -> FileStat {
        FileStat {
            name: self.name.clone(),
            size: self.data.len() as u32,
            id: self.id.unwrap_or(0),
            attr: self.meta.attr,
            acl: self.meta.acl,
            mtime: self.meta.mtime,
            fs_type: FileSystemType::Flash,
        }
    }

    fn check_writable(&self) -> Result<(), FsError> {
        if self.flags.wants_write() {
            Ok(())
        } else {
            Err(FsError::AccessDenied)
        }
    }
}

/// 目录遍历游标（记住上一个返回的名称，遍历期间的修改不会导致重复）
#[derive(Debug)]
struct DirCursor {
    prefix: String,
    last: Option<String>,
}

/// 一次提交中的修改
enum Change<'a> {
    Put {
        name: &'a str,
        meta: EntryMeta,
        data: &'a [u8],
        id: Option<u32>,
    },
    Delete {
        name: &'a str,
    },
}

impl Change<'_> {
    fn encode(&self) -> Vec<u8> {
        match self {
            Change::Put {
                name, meta, data, ..
            } => encode_record(RecordKind::Put, name, meta, data),
            Change::Delete { name } => {
                encode_record(RecordKind::Delete, name, &EntryMeta::default(), &[])
            }
        }
    }
}

/// 已挂载的卷
#[derive(Debug, Default)]
struct Volume {
    entries: BTreeMap<String, Entry>,
    /// 下一条记录的写入位置
    log_end: u32,
    /// 日志尾部的损坏记录数，非零时 `log_end` 之后不是擦除状态
    damaged: u32,
    next_id: u32,
}

impl Volume {
    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

struct FlashState {
    volume: Option<Volume>,
    files: HandleTable<FileHandle, OpenFile>,
    dirs: HandleTable<DirHandle, DirCursor>,
}

impl FlashState {
    fn volume(&self) -> Result<&Volume, FsError> {
        self.volume.as_ref().ok_or(FsError::NotMounted)
    }

    fn file(&mut self, file: FileHandle) -> Result<&mut OpenFile, FsError> {
        if self.volume.is_none() {
            return Err(FsError::NotMounted);
        }
        self.files.get_mut(file)
    }

    /// 对其他打开同名文件的句柄执行 `f`
    fn for_each_open(&mut self, name: &str, mut f: impl FnMut(&mut OpenFile)) {
        let handles: Vec<FileHandle> = self
            .files
            .iter()
            .filter(|(_, open)| open.name == name)
            .map(|(h, _)| h)
            .collect();
        for h in handles {
            if let Ok(open) = self.files.get_mut(h) {
                f(open);
            }
        }
    }
}

/// 可写闪存卷
///
/// 扇区 0 是卷头，其余扇区组成只追加的记录日志。文件的每次写回都追加一条完整的 Put 记录，
/// 删除追加一条 Delete 记录；挂载时按顺序回放日志建立索引。日志写满时把有效文件重新写入
/// 擦除后的日志区（压缩），仍放不下则返回 [`FsError::NoSpace`]。
///
/// 打开的文件内容缓存在内存中，只在 `flush`/`close` 时写回。
pub struct FlashFileSystem {
    flash: Arc<dyn FlashMedia>,
    state: SpinLock<FlashState>,
}

impl FlashFileSystem {
    /// 在可写介质上创建（尚未挂载）
    pub fn new(flash: Arc<dyn FlashMedia>) -> Self {
        Self {
            flash,
            state: SpinLock::new(FlashState {
                volume: None,
                files: HandleTable::new(fs_ops().max_open_files()),
                dirs: HandleTable::new(MAX_OPEN_DIRS),
            }),
        }
    }

    fn log_start(&self) -> u32 {
        self.flash.erase_block_size() as u32
    }

    fn log_end(&self) -> u32 {
        (self.flash.sector_count() * self.flash.erase_block_size()) as u32
    }

    fn check_media_writable(&self) -> Result<(), FsError> {
        match self.flash.access() {
            FlashAccess::ReadWrite => Ok(()),
            FlashAccess::ReadOnly => Err(FsError::ReadOnly),
        }
    }

    /// 校验卷头并回放日志
    fn scan(&self) -> Result<Volume, FsError> {
        if VolumeHeader::read(self.flash.as_ref())?.is_none() {
            return Err(FsError::NotFormatted);
        }

        let end = self.log_end();
        let mut volume = Volume::default();
        let mut offset = self.log_start();
        loop {
            match read_record(self.flash.as_ref(), offset, end)? {
                Scan::Record(rec) => {
                    offset += rec.total_len;
                    match rec.kind {
                        RecordKind::Put => {
                            let id = volume
                                .entries
                                .get(&rec.name)
                                .map(|e| e.id)
                                .unwrap_or_else(|| volume.alloc_id());
                            let entry = Entry {
                                id,
                                data_offset: rec.data_offset,
                                size: rec.data_len,
                                meta: rec.meta,
                            };
                            volume.entries.insert(rec.name, entry);
                        }
                        RecordKind::Delete => {
                            volume.entries.remove(&rec.name);
                        }
                    }
                }
                Scan::End => break,
                Scan::Damaged => {
                    log::warn!(
                        "flashfs: damaged record at {:#x} on {}, log truncated",
                        offset,
                        self.flash.get_id()
                    );
                    volume.damaged = 1;
                    break;
                }
            }
        }
        volume.log_end = offset;
        Ok(volume)
    }

    fn read_data(&self, entry: &Entry) -> Result<Vec<u8>, FsError> {
        let mut data = vec![0u8; entry.size as usize];
        self.flash.read(entry.data_offset as usize, &mut data)?;
        Ok(data)
    }

    /// 把一组修改写入日志，空间不足或尾部损坏时先压缩
    fn commit(&self, volume: &mut Volume, changes: &[Change<'_>]) -> Result<(), FsError> {
        self.check_media_writable()?;
        let records: Vec<Vec<u8>> = changes.iter().map(Change::encode).collect();
        let need: u64 = records.iter().map(|r| r.len() as u64).sum();

        if volume.damaged > 0 || volume.log_end as u64 + need > self.log_end() as u64 {
            return self.compact(volume, changes);
        }

        for (change, rec) in changes.iter().zip(&records) {
            let offset = volume.log_end;
            if let Err(e) = self.flash.write(offset as usize, rec) {
                // 写了一半的记录会在下次挂载时被识别为损坏
                volume.damaged = 1;
                return Err(e.into());
            }
            volume.log_end += rec.len() as u32;
            self.apply_change(volume, change, offset);
        }
        Ok(())
    }

    fn apply_change(&self, volume: &mut Volume, change: &Change<'_>, record_offset: u32) {
        match change {
            Change::Put {
                name,
                meta,
                data,
                id,
            } => {
                let id = match (*id, volume.entries.get(*name)) {
                    (Some(id), _) => id,
                    (None, Some(old)) => old.id,
                    (None, None) => volume.alloc_id(),
                };
                let entry = Entry {
                    id,
                    data_offset: record_offset + (RECORD_HEADER_SIZE + name.len()) as u32,
                    size: data.len() as u32,
                    meta: *meta,
                };
                volume.entries.insert(String::from(*name), entry);
            }
            Change::Delete { name } => {
                volume.entries.remove(*name);
            }
        }
    }

    /// 擦除日志区并只写回有效文件（连同 `changes`）
    ///
    /// 调用方持有屏蔽中断的状态锁，逐扇区擦除期间中断一直关闭，
    /// 时长上限见 [`device::latency::SECTOR_ERASE_MAX_MS`]。
    fn compact(&self, volume: &mut Volume, changes: &[Change<'_>]) -> Result<(), FsError> {
        // 先在内存中得到压缩后的文件集合
        let mut live: BTreeMap<String, (u32, EntryMeta, Vec<u8>)> = BTreeMap::new();
        for (name, entry) in &volume.entries {
            live.insert(name.clone(), (entry.id, entry.meta, self.read_data(entry)?));
        }
        for change in changes {
            match change {
                Change::Put {
                    name,
                    meta,
                    data,
                    id,
                } => {
                    let id = id
                        .or_else(|| live.get(*name).map(|l| l.0))
                        .unwrap_or_else(|| volume.alloc_id());
                    live.insert(String::from(*name), (id, *meta, data.to_vec()));
                }
                Change::Delete { name } => {
                    live.remove(*name);
                }
            }
        }

        let records: Vec<(Change<'_>, Vec<u8>)> = live
            .iter()
            .map(|(name, (id, meta, data))| {
                let change = Change::Put {
                    name,
                    meta: *meta,
                    data,
                    id: Some(*id),
                };
                let rec = change.encode();
                (change, rec)
            })
            .collect();
        let need: u64 = records.iter().map(|(_, r)| r.len() as u64).sum();
        if self.log_start() as u64 + need > self.log_end() as u64 {
            log::warn!("flashfs: compaction needs {} bytes, volume full", need);
            return Err(FsError::NoSpace);
        }

        log::info!(
            "flashfs: compacting {} ({} live files, {} bytes)",
            self.flash.get_id(),
            records.len(),
            need
        );
        for sector in 1..self.flash.sector_count() {
            self.flash.erase(sector)?;
        }

        volume.entries.clear();
        volume.damaged = 0;
        volume.log_end = self.log_start();
        for (change, rec) in &records {
            let offset = volume.log_end;
            if let Err(e) = self.flash.write(offset as usize, rec) {
                volume.damaged = 1;
                return Err(e.into());
            }
            volume.log_end += rec.len() as u32;
            self.apply_change(volume, change, offset);
        }
        Ok(())
    }

    /// 把打开文件的修改写回
    fn flush_file(&self, volume: &mut Volume, file: &mut OpenFile) -> Result<(), FsError> {
        if !file.state.contains(FileState::DIRTY) || file.state.contains(FileState::ORPHANED) {
            return Ok(());
        }
        if !file.state.contains(FileState::TIME_SET) {
            file.meta.mtime = fs_ops().now();
        }
        self.commit(
            volume,
            &[Change::Put {
                name: &file.name,
                meta: file.meta,
                data: &file.data,
                id: file.id,
            }],
        )?;
        file.id = volume.entries.get(&file.name).map(|e| e.id);
        file.state.remove(FileState::DIRTY | FileState::TIME_SET);
        log::debug!(
            "flashfs: wrote {:?} ({} bytes), log end {:#x}",
            file.name,
            file.data.len(),
            volume.log_end
        );
        Ok(())
    }

    /// 按路径得到合法的存储名称
    fn entry_name(path: &str) -> Result<String, FsError> {
        let name = file_name(path)?;
        if name.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }
        Ok(name)
    }
}

impl FileSystem for FlashFileSystem {
    fn fs_type(&self) -> FileSystemType {
        FileSystemType::Flash
    }

    fn capabilities(&self) -> FsCapabilities {
        FsCapabilities::all()
    }

    fn mount(&self) -> Result<(), FsError> {
        let mut state = self.state.lock();
        if state.volume.is_some() {
            return Ok(());
        }
        let volume = self.scan().inspect_err(|e| {
            log::error!("flashfs: mount {} failed: {}", self.flash.get_id(), e);
        })?;
        log::info!(
            "flashfs: mounted {} ({} files, log end {:#x})",
            self.flash.get_id(),
            volume.entries.len(),
            volume.log_end
        );
        state.volume = Some(volume);
        Ok(())
    }

    fn get_info(&self) -> Result<FileSystemInfo, FsError> {
        let state = self.state.lock();
        let volume = state.volume()?;
        let free_space = match volume.damaged {
            0 => self.log_end() - volume.log_end,
            _ => 0,
        };
        Ok(FileSystemInfo {
            fs_type: FileSystemType::Flash,
            volume_size: self.flash.size() as u32,
            free_space,
        })
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle, FsError> {
        let mut state = self.state.lock();
        let volume = state.volume()?;
        let name = Self::entry_name(path)?;
        if flags.wants_write() {
            self.check_media_writable()?;
        }

        let mut open = match volume.entries.get(&name) {
            Some(entry) => OpenFile {
                data: if flags.contains(OpenFlags::TRUNCATE) {
                    Vec::new()
                } else {
                    self.read_data(entry)?
                },
                name,
                id: Some(entry.id),
                pos: 0,
                flags,
                meta: entry.meta,
                state: FileState::empty(),
            },
            None if flags.contains(OpenFlags::CREATE) => OpenFile {
                name,
                id: None,
                data: Vec::new(),
                pos: 0,
                flags,
                meta: EntryMeta::default(),
                state: FileState::DIRTY,
            },
            None => return Err(FsError::NotFound),
        };
        if flags.contains(OpenFlags::TRUNCATE) {
            open.state.insert(FileState::DIRTY);
        }

        log::debug!("flashfs: open {:?} {:?}", open.name, flags);
        state.files.alloc(open)
    }

    fn close(&self, file: FileHandle) -> Result<(), FsError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let volume = state.volume.as_mut().ok_or(FsError::NotMounted)?;
        let mut open = state.files.remove(file)?;
        self.flush_file(volume, &mut open)
    }

    fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut state = self.state.lock();
        let open = state.file(file)?;
        if !open.flags.readable() {
            return Err(FsError::AccessDenied);
        }
        let start = open.pos as usize;
        let n = buf.len().min(open.data.len() - start);
        buf[..n].copy_from_slice(&open.data[start..start + n]);
        open.pos += n as u32;
        Ok(n)
    }

    fn write(&self, file: FileHandle, data: &[u8]) -> Result<usize, FsError> {
        let mut state = self.state.lock();
        let open = state.file(file)?;
        open.check_writable()?;
        if open.flags.contains(OpenFlags::APPEND) {
            open.pos = open.data.len() as u32;
        }
        let start = open.pos as usize;
        let end = start + data.len();
        if end > u32::MAX as usize {
            return Err(FsError::NoSpace);
        }
        if end > open.data.len() {
            open.data.resize(end, 0);
        }
        open.data[start..end].copy_from_slice(data);
        open.pos = end as u32;
        open.state.insert(FileState::DIRTY);
        Ok(data.len())
    }

    fn lseek(&self, file: FileHandle, offset: i32, whence: SeekWhence) -> Result<u32, FsError> {
        let mut state = self.state.lock();
        let open = state.file(file)?;
        open.pos = whence.resolve(offset, open.pos, open.data.len() as u32);
        Ok(open.pos)
    }

    fn eof(&self, file: FileHandle) -> Result<bool, FsError> {
        let mut state = self.state.lock();
        let open = state.file(file)?;
        Ok(open.pos as usize >= open.data.len())
    }

    fn tell(&self, file: FileHandle) -> Result<u32, FsError> {
        let mut state = self.state.lock();
        Ok(state.file(file)?.pos)
    }

    fn truncate(&self, file: FileHandle) -> Result<(), FsError> {
        let mut state = self.state.lock();
        let open = state.file(file)?;
        open.check_writable()?;
        open.data.truncate(open.pos as usize);
        open.state.insert(FileState::DIRTY);
        Ok(())
    }

    fn flush(&self, file: FileHandle) -> Result<(), FsError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let volume = state.volume.as_mut().ok_or(FsError::NotMounted)?;
        let open = state.files.get_mut(file)?;
        self.flush_file(volume, open)
    }

    fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let state = self.state.lock();
        let volume = state.volume()?;
        let name = Self::entry_name(path)?;
        let entry = volume.entries.get(&name).ok_or(FsError::NotFound)?;
        Ok(FileStat {
            size: entry.size,
            id: entry.id,
            attr: entry.meta.attr,
            acl: entry.meta.acl,
            mtime: entry.meta.mtime,
            fs_type: FileSystemType::Flash,
            name,
        })
    }

    fn fstat(&self, file: FileHandle) -> Result<FileStat, FsError> {
        let mut state = self.state.lock();
        Ok(state.file(file)?.stat())
    }

    fn set_acl(&self, file: FileHandle, acl: FileAcl) -> Result<(), FsError> {
        self.check_media_writable()?;
        let mut state = self.state.lock();
        let open = state.file(file)?;
        open.meta.acl = acl;
        open.state.insert(FileState::DIRTY);
        Ok(())
    }

    fn set_attr(&self, file: FileHandle, attr: FileAttr) -> Result<(), FsError> {
        self.check_media_writable()?;
        let mut state = self.state.lock();
        let open = state.file(file)?;
        open.meta.attr = attr;
        open.state.insert(FileState::DIRTY);
        Ok(())
    }

    fn set_time(&self, file: FileHandle, mtime: u32) -> Result<(), FsError> {
        self.check_media_writable()?;
        let mut state = self.state.lock();
        let open = state.file(file)?;
        open.meta.mtime = mtime;
        open.state.insert(FileState::DIRTY | FileState::TIME_SET);
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), FsError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let volume = state.volume.as_mut().ok_or(FsError::NotMounted)?;
        let name = Self::entry_name(path)?;
        if !volume.entries.contains_key(&name) {
            return Err(FsError::NotFound);
        }
        self.commit(volume, &[Change::Delete { name: &name }])?;
        state.for_each_open(&name, |open| open.state.insert(FileState::ORPHANED));
        log::debug!("flashfs: removed {:?}", name);
        Ok(())
    }

    fn fremove(&self, file: FileHandle) -> Result<(), FsError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let volume = state.volume.as_mut().ok_or(FsError::NotMounted)?;
        let name = state.files.get(file)?.name.clone();
        if volume.entries.contains_key(&name) {
            self.commit(volume, &[Change::Delete { name: &name }])?;
        }
        state.files.remove(file)?;
        state.for_each_open(&name, |open| open.state.insert(FileState::ORPHANED));
        Ok(())
    }

    fn rename(&self, old: &str, new: &str) -> Result<(), FsError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let volume = state.volume.as_mut().ok_or(FsError::NotMounted)?;
        let old = Self::entry_name(old)?;
        let new = Self::entry_name(new)?;
        let entry = volume.entries.get(&old).ok_or(FsError::NotFound)?.clone();
        if old == new {
            return Ok(());
        }
        if volume.entries.contains_key(&new) {
            return Err(FsError::AlreadyExists);
        }

        let data = self.read_data(&entry)?;
        self.commit(
            volume,
            &[
                Change::Put {
                    name: &new,
                    meta: entry.meta,
                    data: &data,
                    id: Some(entry.id),
                },
                Change::Delete { name: &old },
            ],
        )?;
        state.for_each_open(&old, |open| open.name = new.clone());
        log::debug!("flashfs: renamed {:?} -> {:?}", old, new);
        Ok(())
    }

    fn opendir(&self, path: &str) -> Result<DirHandle, FsError> {
        let mut state = self.state.lock();
        state.volume()?;
        state.dirs.alloc(DirCursor {
            prefix: dir_prefix(path),
            last: None,
        })
    }

    fn readdir(&self, dir: DirHandle) -> Result<FileStat, FsError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let volume = state.volume.as_ref().ok_or(FsError::NotMounted)?;
        let cursor = state.dirs.get_mut(dir)?;

        let lower = match &cursor.last {
            Some(last) => Bound::Excluded(last.as_str()),
            None => Bound::Unbounded,
        };
        let found = volume
            .entries
            .range::<str, _>((lower, Bound::Unbounded))
            .find(|(name, _)| strip_dir(&cursor.prefix, name).is_some());

        match found {
            Some((name, entry)) => {
                cursor.last = Some(name.clone());
                Ok(FileStat {
                    name: name.clone(),
                    size: entry.size,
                    id: entry.id,
                    attr: entry.meta.attr,
                    acl: entry.meta.acl,
                    mtime: entry.meta.mtime,
                    fs_type: FileSystemType::Flash,
                })
            }
            None => Err(FsError::NoMoreFiles),
        }
    }

    fn closedir(&self, dir: DirHandle) -> Result<(), FsError> {
        let mut state = self.state.lock();
        state.volume()?;
        state.dirs.remove(dir).map(|_| ())
    }

    /// 在状态锁内擦除整个分区，中断最长关闭 `扇区数 × SECTOR_ERASE_MAX_MS` 毫秒
    fn format(&self) -> Result<(), FsError> {
        self.check_media_writable()?;
        if self.flash.sector_count() < 2 {
            return Err(FsError::NoSpace);
        }

        let mut state = self.state.lock();
        let dropped = state.files.take_all().len();
        state.dirs.take_all();
        state.volume = None;
        if dropped > 0 {
            log::warn!("flashfs: format discards {} open files", dropped);
        }

        log::info!(
            "flashfs: formatting {} ({} sectors, interrupts off up to {} ms)",
            self.flash.get_id(),
            self.flash.sector_count(),
            device::latency::erase_budget_ms(self.flash.sector_count())
        );
        for sector in 0..self.flash.sector_count() {
            self.flash.erase(sector)?;
        }
        let header = VolumeHeader::for_media(self.flash.as_ref());
        self.flash.write(0, &header.encode())?;

        state.volume = Some(Volume {
            log_end: self.log_start(),
            ..Default::default()
        });
        Ok(())
    }

    fn check(&self) -> Result<u32, FsError> {
        let mut state = self.state.lock();
        let mut volume = match self.scan() {
            Ok(volume) => volume,
            Err(FsError::NotFormatted) => return Err(FsError::Integrity),
            Err(e) => return Err(e),
        };

        let repairs = volume.damaged;
        if repairs == 0 {
            if state.volume.is_none() {
                state.volume = Some(volume);
            }
            return Ok(0);
        }

        if let Some(current) = &state.volume {
            volume.next_id = volume.next_id.max(current.next_id);
        }
        self.compact(&mut volume, &[])?;
        log::info!("flashfs: check repaired {} damaged log tail(s)", repairs);
        state.volume = Some(volume);
        Ok(repairs)
    }
}
