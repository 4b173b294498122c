//! 文件句柄与目录句柄
//!
//! 句柄是 `槽位索引 + 代数` 的组合，对外表现为一个正整数。
//! 槽位被关闭或复用后代数会递增，旧句柄因此失效，不会误用到新打开的文件上。

use core::fmt;

use crate::FsError;

/// 代数的有效位数（保证编码后的整数为正）
const GENERATION_MASK: u16 = 0x7FFF;

/// 原始句柄：槽位索引 + 代数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle {
    index: u16,
    generation: u16,
}

impl RawHandle {
    /// 由槽位索引和代数构造
    ///
    /// 代数取低 15 位，0 会被替换为 1。
    pub fn new(index: u16, generation: u16) -> Self {
        let generation = match generation & GENERATION_MASK {
            0 => 1,
            g => g,
        };
        Self { index, generation }
    }

    /// 槽位索引
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// 代数
    pub fn generation(&self) -> u16 {
        self.generation
    }

    /// 编码为正整数
    pub fn raw(&self) -> i32 {
        ((self.generation as i32) << 16) | self.index as i32
    }

    /// 从整数解码，非正数或代数为 0 时返回 [`FsError::InvalidHandle`]
    pub fn from_raw(raw: i32) -> Result<Self, FsError> {
        if raw <= 0 {
            return Err(FsError::InvalidHandle);
        }
        let generation = (raw >> 16) as u16;
        if generation == 0 {
            return Err(FsError::InvalidHandle);
        }
        Ok(Self {
            index: (raw & 0xFFFF) as u16,
            generation,
        })
    }

    /// 下一代数（跳过 0）
    pub(crate) fn next_generation(generation: u16) -> u16 {
        match generation.wrapping_add(1) & GENERATION_MASK {
            0 => 1,
            g => g,
        }
    }
}

/// 可由 [`RawHandle`] 构造的强类型句柄
pub trait Handle: Copy + fmt::Debug {
    /// 由原始句柄构造
    fn from_raw_handle(raw: RawHandle) -> Self;

    /// 取出原始句柄
    fn raw_handle(&self) -> RawHandle;

    /// 编码为正整数
    fn raw(&self) -> i32 {
        self.raw_handle().raw()
    }

    /// 从整数解码
    fn from_raw(raw: i32) -> Result<Self, FsError> {
        RawHandle::from_raw(raw).map(Self::from_raw_handle)
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(RawHandle);

        impl Handle for $name {
            fn from_raw_handle(raw: RawHandle) -> Self {
                Self(raw)
            }

            fn raw_handle(&self) -> RawHandle {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0.raw())
            }
        }
    };
}

define_handle!(
    /// 打开文件的句柄
    FileHandle
);

define_handle!(
    /// 目录遍历会话的句柄
    DirHandle
);
