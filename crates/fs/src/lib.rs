//! # 文件系统实现 (FS)
//!
//! 本 crate 提供三种实现 VFS [`FileSystem`] trait 的文件系统：
//!
//! - **[fwfs]**: 固件对象存储，构建时生成、随固件烧录的只读镜像
//! - **[flashfs]**: 可写闪存卷，日志结构，运行时增删改文件
//! - **[hybrid]**: 混合文件系统，可写卷遮盖对象存储中的同名文件
//!
//! 运行时需要的外部能力（时钟、句柄表大小）通过 [`register_fs_ops`] 注册。
//!
//! 典型的启动流程：
//!
//! 1. 用 [`create_hybrid_filesystem`] 组合镜像和可写分区
//! 2. 挂载；可写卷返回 [`FsError::NotFormatted`] 时格式化后重新挂载
//! 3. 交给调用方持有的 [`vfs::ActiveFilesystemRegistry`] 激活

#![no_std]
#![allow(clippy::module_inception)]

extern crate alloc;

mod bytes;
pub mod config;
pub mod flashfs;
pub mod fwfs;
pub mod hybrid;
pub mod ops;

use alloc::boxed::Box;
use alloc::sync::Arc;

use device::FlashMedia;
use vfs::{FileSystem, FsError};

// Re-export ops
pub use ops::{FsOps, fs_ops, register_fs_ops};

// Re-export filesystems
pub use flashfs::FlashFileSystem;
pub use fwfs::{DEFAULT_ACL, FirmwareFileSystem, ImageBuilder};
pub use hybrid::HybridFileSystem;

/// 创建并挂载固件对象存储
pub fn create_firmware_filesystem(
    image: Arc<dyn FlashMedia>,
) -> Result<Box<dyn FileSystem>, FsError> {
    let fs = FirmwareFileSystem::new(image);
    fs.mount()?;
    Ok(Box::new(fs))
}

/// 创建可写闪存卷（未挂载）
pub fn create_flash_filesystem(flash: Arc<dyn FlashMedia>) -> Box<dyn FileSystem> {
    Box::new(FlashFileSystem::new(flash))
}

/// 组合固件镜像和可写分区（未挂载）
///
/// 调用者负责挂载；可写分区尚未格式化时挂载返回 [`FsError::NotFormatted`]，
/// 此时可以 `format()` 后重新挂载。
pub fn create_hybrid_filesystem(
    image: Arc<dyn FlashMedia>,
    flash: Arc<dyn FlashMedia>,
) -> Box<dyn FileSystem> {
    Box::new(HybridFileSystem::new(
        Box::new(FirmwareFileSystem::new(image)),
        Box::new(FlashFileSystem::new(flash)),
    ))
}
