//! 测试支持 crate
//!
//! 提供 Mock 实现和测试工具

#![no_std]

pub mod mock;

/// 生成确定性的测试数据（按下标循环的字节序列）
pub fn pattern(len: usize, seed: u8) -> impl Iterator<Item = u8> {
    (0..len).map(move |i| (i as u8).wrapping_mul(31).wrapping_add(seed))
}
