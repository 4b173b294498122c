//! 固件对象存储 (fwfs)
//!
//! 构建时生成的只读镜像，随固件一起烧录。

mod builder;
mod fwfs;
pub mod image;

pub use builder::{DEFAULT_ACL, ImageBuilder};
pub use fwfs::FirmwareFileSystem;
pub use image::ObjectRecord;
