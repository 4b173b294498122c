//! 内存模拟的闪存区域

use super::{FlashAccess, FlashError, FlashMedia};
use crate::driver::{DeviceType, Driver};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::SpinLock;

/// 擦除后的字节值
const ERASED: u8 = 0xFF;

/// 内存模拟的闪存区域
///
/// 用于主机测试以及把链接进固件的镜像包装成只读介质
pub struct FlashRegion {
    /// 存储数据
    data: SpinLock<Vec<u8>>,

    /// 物理起始地址
    base_address: usize,

    /// 擦除块大小
    erase_block_size: usize,

    /// 访问模式
    access: FlashAccess,

    /// 累计擦除次数
    erase_count: AtomicUsize,
}

impl FlashRegion {
    /// 创建指定大小、处于擦除状态的闪存区域
    pub fn new(
        base_address: usize,
        size: usize,
        erase_block_size: usize,
        access: FlashAccess,
    ) -> Arc<Self> {
        Self::from_bytes(base_address, vec![ERASED; size], erase_block_size, access)
    }

    /// 从已有内容创建（例如固件镜像）
    pub fn from_bytes(
        base_address: usize,
        data: Vec<u8>,
        erase_block_size: usize,
        access: FlashAccess,
    ) -> Arc<Self> {
        Arc::new(Self {
            data: SpinLock::new(data),
            base_address,
            erase_block_size: erase_block_size.max(1),
            access,
            erase_count: AtomicUsize::new(0),
        })
    }

    /// 获取原始数据（用于调试）
    pub fn raw_data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// 累计擦除的扇区次数
    pub fn erase_count(&self) -> usize {
        self.erase_count.load(Ordering::Relaxed)
    }

    /// 直接修改底层字节，绕过只读和编程语义（用于注入损坏）
    pub fn corrupt(&self, offset: usize, bytes: &[u8]) -> Result<(), FlashError> {
        self.check_range(offset, bytes.len())?;
        self.data.lock()[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl Driver for FlashRegion {
    fn device_type(&self) -> DeviceType {
        DeviceType::Flash
    }

    fn get_id(&self) -> String {
        alloc::format!("flash@{:#x}", self.base_address)
    }

    fn as_flash(&self) -> Option<&dyn FlashMedia> {
        Some(self)
    }

    fn as_flash_arc(self: Arc<Self>) -> Option<Arc<dyn FlashMedia>> {
        Some(self)
    }
}

impl FlashMedia for FlashRegion {
    fn base_address(&self) -> usize {
        self.base_address
    }

    fn size(&self) -> usize {
        self.data.lock().len()
    }

    fn erase_block_size(&self) -> usize {
        self.erase_block_size
    }

    fn access(&self) -> FlashAccess {
        self.access
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError> {
        self.check_range(offset, buf.len())?;
        let data = self.data.lock();
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&self, offset: usize, src: &[u8]) -> Result<(), FlashError> {
        if self.access == FlashAccess::ReadOnly {
            return Err(FlashError::ReadOnly);
        }
        self.check_range(offset, src.len())?;

        let mut data = self.data.lock();
        for (dst, byte) in data[offset..offset + src.len()].iter_mut().zip(src) {
            *dst &= *byte;
        }
        Ok(())
    }

    fn erase(&self, sector: usize) -> Result<(), FlashError> {
        if self.access == FlashAccess::ReadOnly {
            return Err(FlashError::ReadOnly);
        }
        let offset = sector
            .checked_mul(self.erase_block_size)
            .ok_or(FlashError::OutOfRange)?;
        self.check_range(offset, self.erase_block_size)?;

        self.data.lock()[offset..offset + self.erase_block_size].fill(ERASED);
        self.erase_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_sync_arch_ops;

    #[test]
    fn test_region_read_write_roundtrip() {
        init_sync_arch_ops();
        let flash = FlashRegion::new(0x10_0000, 4096, 1024, FlashAccess::ReadWrite);
        assert_eq!(flash.sector_count(), 4);

        flash.write(1000, &[0x12, 0x34, 0x56]).unwrap();
        let mut buf = [0u8; 5];
        flash.read(999, &mut buf).unwrap();
        assert_eq!(buf, [0xFF, 0x12, 0x34, 0x56, 0xFF]);
    }

    #[test]
    fn test_erase_budget_scales_with_sectors() {
        use crate::flash::latency::{SECTOR_ERASE_MAX_MS, erase_budget_ms};

        init_sync_arch_ops();
        let flash = FlashRegion::new(0, 16 * 1024, 4096, FlashAccess::ReadWrite);
        assert_eq!(erase_budget_ms(flash.sector_count()), 4 * SECTOR_ERASE_MAX_MS);
        assert_eq!(erase_budget_ms(0), 0);
        assert_eq!(erase_budget_ms(usize::MAX >> 1), u32::MAX);
    }

    #[test]
    fn test_program_only_clears_bits() {
        init_sync_arch_ops();
        let flash = FlashRegion::new(0, 1024, 1024, FlashAccess::ReadWrite);
        flash.write(0, &[0b1010_1010]).unwrap();
        flash.write(0, &[0b1111_0000]).unwrap();
        let mut buf = [0u8; 1];
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf[0], 0b1010_0000);

        flash.erase(0).unwrap();
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf[0], 0xFF);
        assert_eq!(flash.erase_count(), 1);
    }

    #[test]
    fn test_bounds_checked() {
        init_sync_arch_ops();
        let flash = FlashRegion::new(0, 2048, 1024, FlashAccess::ReadWrite);
        let mut buf = [0u8; 16];
        assert_eq!(flash.read(2040, &mut buf), Err(FlashError::OutOfRange));
        assert_eq!(flash.read(usize::MAX, &mut buf), Err(FlashError::OutOfRange));
        assert_eq!(flash.write(2047, &[0, 0]), Err(FlashError::OutOfRange));
        assert_eq!(flash.erase(2), Err(FlashError::OutOfRange));
        // 恰好到末尾是允许的
        assert!(flash.read(2032, &mut buf).is_ok());
    }

    #[test]
    fn test_read_only_region_rejects_mutation() {
        init_sync_arch_ops();
        let flash = FlashRegion::from_bytes(0x4000, vec![7u8; 1024], 1024, FlashAccess::ReadOnly);
        assert_eq!(flash.write(0, &[0]), Err(FlashError::ReadOnly));
        assert_eq!(flash.erase(0), Err(FlashError::ReadOnly));
        // 越界的写入同样先报告只读
        assert_eq!(flash.write(5000, &[0]), Err(FlashError::ReadOnly));
        assert_eq!(flash.raw_data(), vec![7u8; 1024]);
        assert_eq!(flash.erase_count(), 0);
    }

    #[test]
    fn test_driver_identity() {
        init_sync_arch_ops();
        let flash = FlashRegion::new(0x30_0000, 1024, 1024, FlashAccess::ReadWrite);
        assert_eq!(flash.device_type(), DeviceType::Flash);
        assert_eq!(flash.get_id(), "flash@0x300000");
        assert!(flash.as_flash().is_some());
    }
}
