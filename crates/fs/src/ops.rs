//! FS 运行时操作 trait 定义和注册
//!
//! 文件系统需要的外部能力（时钟、句柄表大小）由固件在启动时注册，
//! 文件系统 crate 本身不依赖任何具体平台。

use core::sync::atomic::{AtomicUsize, Ordering};

/// FS 运行时操作
pub trait FsOps: Send + Sync {
    // ========== 时间 ==========

    /// 当前时间（Unix 秒），用于文件修改时间
    fn now(&self) -> u32;

    // ========== 配置 ==========

    /// 每个文件系统实例最多同时打开的文件数
    fn max_open_files(&self) -> usize;
}

// ========== FsOps 注册 ==========

static FS_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static FS_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册 FS 操作实现
///
/// # Safety
/// 必须在单线程环境下调用；重复注册时后一次覆盖前一次
pub unsafe fn register_fs_ops(ops: &'static dyn FsOps) {
    let ptr = ops as *const dyn FsOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn FsOps, (usize, usize)>(ptr) };
    FS_OPS_VTABLE.store(vtable, Ordering::Release);
    FS_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的 FS 操作实现
///
/// # Panics
/// 如果尚未调用 [`register_fs_ops`] 注册实现，则 panic
#[inline]
pub fn fs_ops() -> &'static dyn FsOps {
    let data = FS_OPS_DATA.load(Ordering::Acquire);
    let vtable = FS_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("fs: FsOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn FsOps>((data, vtable)) }
}
