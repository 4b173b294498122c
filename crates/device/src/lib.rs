//! 设备驱动框架
//!
//! 此 crate 提供文件系统所依赖的设备抽象，包括：
//!
//! - [`Driver`] trait - 设备驱动基础接口
//! - [`FlashMedia`] trait - 闪存区域的有界读/写/擦除接口
//! - [`FlashRegion`] - 内存模拟的闪存区域（固件镜像与可写分区均可用）

#![no_std]
#![allow(clippy::module_inception)]

extern crate alloc;

pub mod driver;
pub mod flash;

// Re-export driver
pub use driver::{DeviceType, Driver};

// Re-export flash
pub use flash::{FlashAccess, FlashError, FlashMedia, FlashRegion, latency};
