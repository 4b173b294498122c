//! 句柄表
//!
//! 带代数校验的槽位数组，文件系统用它管理打开的文件和目录遍历会话。
//!
//! 约定与语义：
//!
//! - `alloc()` 总是分配“最小可用槽位”
//! - 槽位释放时代数递增，已关闭或已复用槽位的旧句柄返回 [`FsError::InvalidHandle`]
//! - 槽位数量受 `max` 限制，耗尽时返回 [`FsError::TooManyOpenFiles`]
//!
//! 表本身不加锁，由持有它的文件系统放在自己的锁内。

use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;

use crate::FsError;
use crate::handle::{Handle, RawHandle};

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// 句柄表
pub struct HandleTable<H: Handle, T> {
    slots: Vec<Slot<T>>,
    max: usize,
    _handle: PhantomData<H>,
}

impl<H: Handle, T> fmt::Debug for HandleTable<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("max", &self.max)
            .field("slots", &self.slots.len())
            .field("used", &self.len())
            .finish()
    }
}

impl<H: Handle, T> HandleTable<H, T> {
    /// 创建最多容纳 `max` 个句柄的表（上限不超过 65536）
    pub fn new(max: usize) -> Self {
        Self {
            slots: Vec::new(),
            max: max.min(u16::MAX as usize + 1),
            _handle: PhantomData,
        }
    }

    /// 最大句柄数
    pub fn capacity(&self) -> usize {
        self.max
    }

    /// 当前占用的句柄数
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    /// 是否没有任何占用的句柄
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.value.is_none())
    }

    /// 分配一个新句柄
    pub fn alloc(&mut self, value: T) -> Result<H, FsError> {
        // 查找最小可用槽位
        if let Some((index, slot)) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.value.is_none())
        {
            slot.value = Some(value);
            return Ok(H::from_raw_handle(RawHandle::new(
                index as u16,
                slot.generation,
            )));
        }

        // 没有空闲槽位，扩展数组
        let index = self.slots.len();
        if index >= self.max {
            return Err(FsError::TooManyOpenFiles);
        }
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        Ok(H::from_raw_handle(RawHandle::new(index as u16, 1)))
    }

    fn slot(&self, handle: H) -> Result<&Slot<T>, FsError> {
        let raw = handle.raw_handle();
        match self.slots.get(raw.index()) {
            Some(slot) if slot.generation == raw.generation() && slot.value.is_some() => Ok(slot),
            _ => Err(FsError::InvalidHandle),
        }
    }

    /// 获取句柄对应的对象
    pub fn get(&self, handle: H) -> Result<&T, FsError> {
        self.slot(handle)?
            .value
            .as_ref()
            .ok_or(FsError::InvalidHandle)
    }

    /// 获取句柄对应的可变对象
    pub fn get_mut(&mut self, handle: H) -> Result<&mut T, FsError> {
        self.slot(handle)?;
        let raw = handle.raw_handle();
        self.slots[raw.index()]
            .value
            .as_mut()
            .ok_or(FsError::InvalidHandle)
    }

    /// 释放句柄并取回对象
    pub fn remove(&mut self, handle: H) -> Result<T, FsError> {
        self.slot(handle)?;
        let slot = &mut self.slots[handle.raw_handle().index()];
        slot.generation = RawHandle::next_generation(slot.generation);
        slot.value.take().ok_or(FsError::InvalidHandle)
    }

    /// 遍历所有占用的句柄
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|v| {
                (
                    H::from_raw_handle(RawHandle::new(index as u16, slot.generation)),
                    v,
                )
            })
        })
    }

    /// 遍历所有占用的句柄（可变）
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (H, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|v| {
                (
                    H::from_raw_handle(RawHandle::new(index as u16, generation)),
                    v,
                )
            })
        })
    }

    /// 取走并释放所有句柄
    pub fn take_all(&mut self) -> Vec<(H, T)> {
        let mut out = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                out.push((
                    H::from_raw_handle(RawHandle::new(index as u16, slot.generation)),
                    value,
                ));
                slot.generation = RawHandle::next_generation(slot.generation);
            }
        }
        out
    }
}
