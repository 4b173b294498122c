//! 虚拟文件系统层
//!
//! 此 crate 提供面向句柄的统一文件系统接口，包括：
//!
//! - [`FileSystem`] trait - 所有存储后端与混合文件系统的公共接口
//! - [`FsError`] - 统一错误类型及整数错误码
//! - [`FileStat`] / [`FileAcl`] / [`FileAttr`] - 文件元数据
//! - [`HandleTable`] - 带代数校验的句柄表
//! - [`ActiveFilesystemRegistry`] - 当前激活的文件系统
//! - [`File`] / [`Dir`] - 离开作用域时自动关闭的句柄
//! - [`access`] - 系统文件访问约定
//! - 路径规范化

#![no_std]
#![allow(clippy::module_inception)]

extern crate alloc;

pub mod access;
pub mod error;

mod file_system;
mod flags;
mod guard;
mod handle;
mod handle_table;
mod path;
mod registry;
mod stat;

// Re-export error
pub use error::{ErrorKind, FsError, error_string, error_text};

// Re-export flags
pub use flags::{OpenFlags, SeekWhence};

// Re-export stat
pub use stat::{FileAcl, FileAttr, FileStat, FileSystemInfo, FileSystemType, UserRole};

// Re-export handle
pub use handle::{DirHandle, FileHandle, Handle, RawHandle};
pub use handle_table::HandleTable;

// Re-export file_system
pub use file_system::{FileSystem, FsCapabilities};

// Re-export registry
pub use guard::{Dir, File};
pub use registry::ActiveFilesystemRegistry;

// Re-export path
pub use path::{PathComponent, dir_prefix, file_name, normalize_path, parse_path, strip_dir};
