//! Mock 实现模块
//!
//! 提供架构和文件系统运行时操作的 Mock 实现，用于测试

pub mod arch;
pub mod fs;
