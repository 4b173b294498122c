//! 可写闪存卷 (flashfs)
//!
//! 运行时可增删改的文件存放在这里，混合文件系统用它遮盖固件镜像中的同名文件。

mod flashfs;
pub mod layout;

pub use flashfs::FlashFileSystem;
