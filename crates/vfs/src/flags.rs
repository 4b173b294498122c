//! 打开标志与定位基准

use bitflags::bitflags;

bitflags! {
    /// 文件打开标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// 读
        const READ = 0x01;
        /// 写
        const WRITE = 0x02;
        /// 不存在时创建
        const CREATE = 0x04;
        /// 每次写入前定位到文件末尾
        const APPEND = 0x08;
        /// 打开时截断为空
        const TRUNCATE = 0x10;

        /// 读写
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
        /// 创建并截断（替换整个文件内容）
        const CREATE_NEW_ALWAYS = Self::CREATE.bits() | Self::TRUNCATE.bits();
    }
}

impl OpenFlags {
    /// 是否带有修改意图（写、创建、追加或截断）
    pub fn wants_write(&self) -> bool {
        self.intersects(Self::WRITE | Self::CREATE | Self::APPEND | Self::TRUNCATE)
    }

    /// 是否允许读取
    ///
    /// 未指定任何访问位时按只读处理。
    pub fn readable(&self) -> bool {
        self.contains(Self::READ) || !self.wants_write()
    }
}

/// 定位基准
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    /// 相对文件开头
    Start,
    /// 相对当前位置
    Current,
    /// 相对文件末尾
    End,
}

impl SeekWhence {
    /// 以 `pos`（当前位置）和 `size`（文件大小）计算新位置，结果限制在 `[0, size]`
    pub fn resolve(self, offset: i32, pos: u32, size: u32) -> u32 {
        let base = match self {
            SeekWhence::Start => 0i64,
            SeekWhence::Current => pos as i64,
            SeekWhence::End => size as i64,
        };
        (base + offset as i64).clamp(0, size as i64) as u32
    }
}
