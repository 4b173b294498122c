//! 闪存设备模块
//!
//! 包含闪存区域的访问接口和内存模拟实现。
//!
//! # 延迟约定
//!
//! 所有操作都是同步阻塞的，调用期间不会让出控制权。调度协作式任务时应按下表预留时间：
//!
//! | 操作 | 典型耗时 |
//! |------|----------|
//! | 读取 | 每 KiB 约 [`latency::READ_US_PER_KIB`] 微秒 |
//! | 编程 | 每 256 字节页约 [`latency::PROGRAM_US_PER_PAGE`] 微秒 |
//! | 扇区擦除 | 最长约 [`latency::SECTOR_ERASE_MAX_MS`] 毫秒 |
//!
//! 格式化会擦除分区内的每一个扇区，是最慢的操作。
//!
//! 文件系统在屏蔽中断的 [`sync::SpinLock`] 内执行擦除：格式化和日志压缩期间，
//! 中断最长关闭约 `扇区数 × SECTOR_ERASE_MAX_MS` 毫秒，即
//! [`latency::erase_budget_ms`]。对中断延迟敏感的系统应在空闲时格式化，
//! 并为可写分区预留足够空间以减少压缩次数。

mod region;

use core::fmt;

use crate::driver::Driver;

pub use region::FlashRegion;

/// 闪存操作延迟上限（用于调用方的时间预算）
pub mod latency {
    /// 读取每 KiB 的典型耗时（微秒）
    pub const READ_US_PER_KIB: u32 = 25;
    /// 编程一个 256 字节页的典型耗时（微秒）
    pub const PROGRAM_US_PER_PAGE: u32 = 700;
    /// 擦除一个扇区的最长耗时（毫秒）
    pub const SECTOR_ERASE_MAX_MS: u32 = 50;

    /// 连续擦除 `sectors` 个扇区的最长耗时（毫秒）
    ///
    /// 格式化和日志压缩在屏蔽中断的锁内擦除，这也是中断关闭时长的上限。
    pub const fn erase_budget_ms(sectors: usize) -> u32 {
        let sectors = if sectors > u32::MAX as usize {
            u32::MAX
        } else {
            sectors as u32
        };
        sectors.saturating_mul(SECTOR_ERASE_MAX_MS)
    }
}

/// 闪存区域访问模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashAccess {
    /// 只读（例如固件镜像）
    ReadOnly,
    /// 可读写
    ReadWrite,
}

/// 闪存操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// 访问范围超出区域大小
    OutOfRange,
    /// 对只读区域执行写入或擦除
    ReadOnly,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::OutOfRange => f.write_str("flash access out of range"),
            FlashError::ReadOnly => f.write_str("flash region is read-only"),
        }
    }
}

/// 闪存介质接口
///
/// 偏移量均相对于区域起始地址。实现不做任何缓存，缓存由调用方负责。
pub trait FlashMedia: Driver {
    /// 区域的物理起始地址
    fn base_address(&self) -> usize;

    /// 区域大小（字节）
    fn size(&self) -> usize;

    /// 擦除块（扇区）大小
    fn erase_block_size(&self) -> usize;

    /// 访问模式
    fn access(&self) -> FlashAccess;

    /// 从 `offset` 读取 `buf.len()` 字节
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError>;

    /// 向 `offset` 写入 `data`
    ///
    /// 与 NOR 闪存一致，编程只能把位从 1 变为 0，重新置 1 需要擦除。
    fn write(&self, offset: usize, data: &[u8]) -> Result<(), FlashError>;

    /// 擦除指定扇区（擦除后读回全 `0xFF`）
    fn erase(&self, sector: usize) -> Result<(), FlashError>;

    /// 扇区数量
    fn sector_count(&self) -> usize {
        self.size() / self.erase_block_size()
    }

    /// 检查 `[offset, offset + len)` 是否落在区域内
    fn check_range(&self, offset: usize, len: usize) -> Result<(), FlashError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size() => Ok(()),
            _ => Err(FlashError::OutOfRange),
        }
    }
}
