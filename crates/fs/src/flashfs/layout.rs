//! 可写卷的介质布局
//!
//! ```text
//! 扇区 0: 卷头 (16 B) magic "FFSV" | version u16 | reserved u16 | sector_size u32 | sector_count u32
//! 扇区 1..: 只追加的记录日志
//!   记录头 (20 B): magic u16 | kind u8 | name_len u8 | attr u8 | read_role u8 | write_role u8 |
//!                 reserved u8 | mtime u32 | data_len u32 | checksum u32
//!   随后是名称和数据
//! ```
//!
//! 校验和是记录头前 16 字节、名称和数据的 FNV-1a。
//! 日志在第一个全 `0xFF` 的记录头处结束。

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use device::FlashMedia;
use vfs::{FileAcl, FileAttr, FsError, UserRole};

use crate::bytes::{Fnv1a, get_u16, get_u32, put_u16, put_u32};
use crate::config::{FLASHFS_MAGIC, FLASHFS_RECORD_MAGIC, FLASHFS_VERSION, MAX_NAME_LEN};

/// 卷头大小
pub const VOLUME_HEADER_SIZE: usize = 16;
/// 记录头大小
pub const RECORD_HEADER_SIZE: usize = 20;

const ERASED: u8 = 0xFF;

/// 卷头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeHeader {
    pub sector_size: u32,
    pub sector_count: u32,
}

impl VolumeHeader {
    /// 与介质几何一致的卷头
    pub fn for_media(flash: &dyn FlashMedia) -> Self {
        Self {
            sector_size: flash.erase_block_size() as u32,
            sector_count: flash.sector_count() as u32,
        }
    }

    pub fn encode(&self) -> [u8; VOLUME_HEADER_SIZE] {
        let mut buf = [0u8; VOLUME_HEADER_SIZE];
        buf[0..4].copy_from_slice(&FLASHFS_MAGIC);
        put_u16(&mut buf, 4, FLASHFS_VERSION);
        put_u32(&mut buf, 8, self.sector_size);
        put_u32(&mut buf, 12, self.sector_count);
        buf
    }

    pub fn decode(buf: &[u8; VOLUME_HEADER_SIZE]) -> Option<Self> {
        if buf[0..4] != FLASHFS_MAGIC || get_u16(buf, 4) != FLASHFS_VERSION {
            return None;
        }
        Some(Self {
            sector_size: get_u32(buf, 8),
            sector_count: get_u32(buf, 12),
        })
    }

    /// 从介质读取卷头，格式或几何不符时返回 None
    pub fn read(flash: &dyn FlashMedia) -> Result<Option<Self>, FsError> {
        let mut buf = [0u8; VOLUME_HEADER_SIZE];
        flash.read(0, &mut buf)?;
        Ok(Self::decode(&buf).filter(|h| *h == Self::for_media(flash)))
    }
}

/// 记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// 写入（新建或替换）文件
    Put = 1,
    /// 删除文件
    Delete = 2,
}

/// 文件元数据（随每条 Put 记录保存）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryMeta {
    pub attr: FileAttr,
    pub acl: FileAcl,
    pub mtime: u32,
}

/// 编码一条记录
pub fn encode_record(kind: RecordKind, name: &str, meta: &EntryMeta, data: &[u8]) -> Vec<u8> {
    let mut rec = vec![0u8; RECORD_HEADER_SIZE + name.len() + data.len()];
    put_u16(&mut rec, 0, FLASHFS_RECORD_MAGIC);
    rec[2] = kind as u8;
    rec[3] = name.len() as u8;
    rec[4] = meta.attr.bits();
    rec[5] = meta.acl.read as u8;
    rec[6] = meta.acl.write as u8;
    put_u32(&mut rec, 8, meta.mtime);
    put_u32(&mut rec, 12, data.len() as u32);

    let body = RECORD_HEADER_SIZE;
    rec[body..body + name.len()].copy_from_slice(name.as_bytes());
    rec[body + name.len()..].copy_from_slice(data);

    let checksum = Fnv1a::new()
        .update(&rec[..16])
        .update(&rec[body..])
        .finish();
    put_u32(&mut rec, 16, checksum);
    rec
}

/// 解码出的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub kind: RecordKind,
    pub name: String,
    pub meta: EntryMeta,
    /// 数据在介质上的偏移
    pub data_offset: u32,
    pub data_len: u32,
    /// 整条记录的长度
    pub total_len: u32,
}

/// 日志扫描结果
#[derive(Debug)]
pub enum Scan {
    /// 有效记录
    Record(DecodedRecord),
    /// 日志结束（擦除状态）
    End,
    /// 损坏或写了一半的记录
    Damaged,
}

/// 读取 `offset` 处的记录，日志区域截止于 `end`
pub fn read_record(flash: &dyn FlashMedia, offset: u32, end: u32) -> Result<Scan, FsError> {
    let remaining = end.saturating_sub(offset) as usize;
    if remaining < RECORD_HEADER_SIZE {
        // 尾部放不下一个记录头，必须保持擦除状态
        let mut tail = vec![0u8; remaining];
        flash.read(offset as usize, &mut tail)?;
        return Ok(if tail.iter().all(|&b| b == ERASED) {
            Scan::End
        } else {
            Scan::Damaged
        });
    }

    let mut header = [0u8; RECORD_HEADER_SIZE];
    flash.read(offset as usize, &mut header)?;
    if header.iter().all(|&b| b == ERASED) {
        return Ok(Scan::End);
    }

    if get_u16(&header, 0) != FLASHFS_RECORD_MAGIC {
        return Ok(Scan::Damaged);
    }
    let kind = match header[2] {
        1 => RecordKind::Put,
        2 => RecordKind::Delete,
        _ => return Ok(Scan::Damaged),
    };
    let name_len = header[3] as usize;
    let (Some(read), Some(write)) = (UserRole::from_u8(header[5]), UserRole::from_u8(header[6]))
    else {
        return Ok(Scan::Damaged);
    };
    let data_len = get_u32(&header, 12);
    let total = RECORD_HEADER_SIZE as u64 + name_len as u64 + data_len as u64;
    if name_len == 0 || name_len > MAX_NAME_LEN || total > remaining as u64 {
        return Ok(Scan::Damaged);
    }

    let mut body = vec![0u8; name_len + data_len as usize];
    flash.read(offset as usize + RECORD_HEADER_SIZE, &mut body)?;
    let checksum = Fnv1a::new().update(&header[..16]).update(&body).finish();
    if checksum != get_u32(&header, 16) {
        return Ok(Scan::Damaged);
    }

    body.truncate(name_len);
    let Ok(name) = String::from_utf8(body) else {
        return Ok(Scan::Damaged);
    };

    Ok(Scan::Record(DecodedRecord {
        kind,
        name,
        meta: EntryMeta {
            attr: FileAttr::from_bits_truncate(header[4]),
            acl: FileAcl::new(read, write),
            mtime: get_u32(&header, 8),
        },
        data_offset: offset + (RECORD_HEADER_SIZE + name_len) as u32,
        data_len,
        total_len: total as u32,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init;
    use device::{FlashAccess, FlashRegion};

    fn meta() -> EntryMeta {
        EntryMeta {
            attr: FileAttr::ARCHIVE,
            acl: FileAcl::new(UserRole::Guest, UserRole::Manager),
            mtime: 1234,
        }
    }

    #[test]
    fn test_volume_header_matches_geometry() {
        init();
        let flash = FlashRegion::new(0, 4096, 1024, FlashAccess::ReadWrite);
        assert_eq!(VolumeHeader::read(flash.as_ref()).unwrap(), None);

        let header = VolumeHeader::for_media(flash.as_ref());
        flash.write(0, &header.encode()).unwrap();
        assert_eq!(VolumeHeader::read(flash.as_ref()).unwrap(), Some(header));

        // 同样的卷头放到几何不同的介质上无效
        let other = FlashRegion::new(0, 8192, 1024, FlashAccess::ReadWrite);
        other.write(0, &header.encode()).unwrap();
        assert_eq!(VolumeHeader::read(other.as_ref()).unwrap(), None);
    }

    #[test]
    fn test_record_scan() {
        init();
        let flash = FlashRegion::new(0, 2048, 1024, FlashAccess::ReadWrite);
        let rec = encode_record(RecordKind::Put, "a.txt", &meta(), b"hello");
        flash.write(1024, &rec).unwrap();

        let Scan::Record(r) = read_record(flash.as_ref(), 1024, 2048).unwrap() else {
            panic!("expected record");
        };
        assert_eq!(r.kind, RecordKind::Put);
        assert_eq!(r.name, "a.txt");
        assert_eq!(r.meta, meta());
        assert_eq!(r.data_len, 5);
        assert_eq!(r.data_offset, 1024 + 20 + 5);
        assert_eq!(r.total_len as usize, rec.len());

        let next = 1024 + r.total_len;
        assert!(matches!(read_record(flash.as_ref(), next, 2048).unwrap(), Scan::End));
    }

    #[test]
    fn test_corrupted_record_detected() {
        init();
        let flash = FlashRegion::new(0, 2048, 1024, FlashAccess::ReadWrite);
        let rec = encode_record(RecordKind::Put, "a.txt", &meta(), b"hello");
        flash.write(1024, &rec).unwrap();
        // 翻转数据中的一个字节
        flash.corrupt(1024 + rec.len() - 1, &[b'X']).unwrap();
        assert!(matches!(
            read_record(flash.as_ref(), 1024, 2048).unwrap(),
            Scan::Damaged
        ));
    }

    #[test]
    fn test_record_crossing_end_is_damaged() {
        init();
        let flash = FlashRegion::new(0, 2048, 1024, FlashAccess::ReadWrite);
        let rec = encode_record(RecordKind::Put, "big", &meta(), &[0u8; 64]);
        flash.write(1024, &rec).unwrap();
        assert!(matches!(
            read_record(flash.as_ref(), 1024, 1024 + 50).unwrap(),
            Scan::Damaged
        ));
    }
}
