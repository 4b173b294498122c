//! 原始自旋锁
//!
//! 只有一个原子标志，不携带数据。获取锁之前先关闭本地中断，
//! 因此中断处理程序不会在持锁期间重入同一把锁。

use core::hint;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::intr_guard::IntrGuard;

/// 原始自旋锁（不可重入）
///
/// ```ignore
/// let lock = RawSpinLock::new();
/// let guard = lock.lock();
/// // 中断已关闭，临界区
/// drop(guard); // 释放锁，恢复中断
/// ```
#[derive(Debug, Default)]
pub struct RawSpinLock {
    held: AtomicBool,
}

impl RawSpinLock {
    /// 创建未上锁的实例
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// 关中断后自旋直到拿到锁
    pub fn lock(&self) -> RawSpinLockGuard<'_> {
        let intr = IntrGuard::new();
        while !self.try_acquire() {
            // 只读等待，避免反复争抢缓存行
            while self.held.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
        RawSpinLockGuard { lock: self, _intr: intr }
    }

    /// 只尝试一次；失败时中断状态立即恢复
    pub fn try_lock(&self) -> Option<RawSpinLockGuard<'_>> {
        let intr = IntrGuard::new();
        if self.held.load(Ordering::Relaxed) {
            return None;
        }
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RawSpinLockGuard { lock: self, _intr: intr })
    }

    /// 锁当前是否被持有（调试用）
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

/// 持锁凭证
///
/// 字段按声明顺序析构：先在 `drop` 中清除锁标志，再由 `_intr` 恢复中断。
pub struct RawSpinLockGuard<'a> {
    lock: &'a RawSpinLock,
    _intr: IntrGuard,
}

impl Drop for RawSpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}
