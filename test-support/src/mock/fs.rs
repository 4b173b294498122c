//! FS 相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `fs` crate（避免循环依赖）。
//! `fs` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `FsOps`）。

use core::sync::atomic::{AtomicU32, Ordering};

/// Mock 的 FS 运行时操作
///
/// 时钟每读取一次前进一秒，便于测试断言修改时间单调递增。
pub struct MockFsOps {
    pub now: AtomicU32,
}

impl MockFsOps {
    pub const fn new() -> Self {
        Self {
            now: AtomicU32::new(1_546_300_800),
        }
    }

    /// 读取并推进时钟
    pub fn tick(&self) -> u32 {
        self.now.fetch_add(1, Ordering::Relaxed)
    }

    /// 默认最大打开文件数
    pub fn max_open_files(&self) -> usize {
        8
    }
}

impl Default for MockFsOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_FS_OPS: MockFsOps = MockFsOps::new();
