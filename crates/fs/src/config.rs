//! 编译期配置常量

/// 文件名最大长度（字节，不含结尾 nul）
pub const MAX_NAME_LEN: usize = 64;

/// 每个文件系统实例最多同时打开的目录遍历会话数
pub const MAX_OPEN_DIRS: usize = 4;

/// 固件镜像魔数
pub const FWFS_MAGIC: [u8; 4] = *b"FWFS";

/// 固件镜像格式版本
pub const FWFS_VERSION: u16 = 1;

/// 可写卷魔数
pub const FLASHFS_MAGIC: [u8; 4] = *b"FFSV";

/// 可写卷格式版本
pub const FLASHFS_VERSION: u16 = 1;

/// 可写卷日志记录魔数
pub const FLASHFS_RECORD_MAGIC: u16 = 0x5246;
