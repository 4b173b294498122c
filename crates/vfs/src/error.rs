//! VFS 错误类型
//!
//! 所有后端（固件对象存储、可写闪存卷）的错误都在混合文件系统边界处转换为 [`FsError`]，
//! 上层永远看不到后端特有的错误码。
//!
//! 整数错误码空间：非负表示成功，负数表示错误，可通过 [`FsError::to_errno()`] /
//! [`FsError::from_errno()`] 相互转换；[`error_text`] 为任意错误码生成以 nul 结尾的描述文本。

use alloc::string::String;
use core::fmt;

use device::FlashError;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 配置错误：没有激活的文件系统
    Configuration,
    /// 参数校验失败：非法参数、无效句柄、缓冲区过小
    Validation,
    /// 资源耗尽：目录遍历结束、内存或句柄不足、空间不足
    Exhaustion,
    /// 完整性错误：镜像损坏、挂载失败
    Integrity,
    /// 权限错误：修改只读内容或受 ACL 保护的内容
    Permission,
    /// 后端不支持该操作
    NotSupported,
    /// 路径在所有后端中都不存在（或命名冲突）
    NotFound,
}

/// VFS 错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    // 配置
    /// 没有激活的文件系统
    NoFileSystem,

    // 参数
    /// 无效参数
    InvalidArgument,
    /// 无效或已失效的句柄
    InvalidHandle,
    /// 缓冲区过小
    BufferTooSmall,
    /// 文件名过长
    NameTooLong,

    // 资源
    /// 目录中没有更多条目
    NoMoreFiles,
    /// 内存不足
    OutOfMemory,
    /// 打开的文件过多
    TooManyOpenFiles,
    /// 卷空间不足
    NoSpace,

    // 完整性
    /// 镜像或卷结构损坏
    Integrity,
    /// 卷未格式化
    NotFormatted,
    /// 文件系统尚未挂载
    NotMounted,
    /// 介质 I/O 错误
    Io,

    // 权限
    /// 目标只读
    ReadOnly,
    /// 访问被拒绝
    AccessDenied,

    // 其他
    /// 操作不支持
    NotSupported,
    /// 文件不存在
    NotFound,
    /// 文件已存在
    AlreadyExists,
}

/// 全部错误变体，用于错误码反查
const ALL_ERRORS: [FsError; 18] = [
    FsError::NoFileSystem,
    FsError::InvalidArgument,
    FsError::InvalidHandle,
    FsError::BufferTooSmall,
    FsError::NameTooLong,
    FsError::NoMoreFiles,
    FsError::OutOfMemory,
    FsError::TooManyOpenFiles,
    FsError::NoSpace,
    FsError::Integrity,
    FsError::NotFormatted,
    FsError::NotMounted,
    FsError::Io,
    FsError::ReadOnly,
    FsError::AccessDenied,
    FsError::NotSupported,
    FsError::NotFound,
    FsError::AlreadyExists,
];

impl FsError {
    /// 转换为错误码（负数）
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound => -2,
            FsError::Io => -5,
            FsError::NotMounted => -6,
            FsError::InvalidHandle => -9,
            FsError::OutOfMemory => -12,
            FsError::AccessDenied => -13,
            FsError::AlreadyExists => -17,
            FsError::NoFileSystem => -19,
            FsError::InvalidArgument => -22,
            FsError::TooManyOpenFiles => -24,
            FsError::NoSpace => -28,
            FsError::ReadOnly => -30,
            FsError::NameTooLong => -36,
            FsError::NoMoreFiles => -61,
            FsError::Integrity => -74,
            FsError::NotSupported => -95,
            FsError::BufferTooSmall => -105,
            FsError::NotFormatted => -117,
        }
    }

    /// 由错误码反查错误，未知错误码返回 None
    pub fn from_errno(code: i32) -> Option<Self> {
        ALL_ERRORS.iter().copied().find(|e| e.to_errno() == code)
    }

    /// 错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::NoFileSystem => ErrorKind::Configuration,
            FsError::InvalidArgument
            | FsError::InvalidHandle
            | FsError::BufferTooSmall
            | FsError::NameTooLong => ErrorKind::Validation,
            FsError::NoMoreFiles
            | FsError::OutOfMemory
            | FsError::TooManyOpenFiles
            | FsError::NoSpace => ErrorKind::Exhaustion,
            FsError::Integrity | FsError::NotFormatted | FsError::NotMounted | FsError::Io => {
                ErrorKind::Integrity
            }
            FsError::ReadOnly | FsError::AccessDenied => ErrorKind::Permission,
            FsError::NotSupported => ErrorKind::NotSupported,
            FsError::NotFound | FsError::AlreadyExists => ErrorKind::NotFound,
        }
    }

    /// 错误描述文本
    pub fn as_str(&self) -> &'static str {
        match self {
            FsError::NoFileSystem => "No file system",
            FsError::InvalidArgument => "Bad parameter",
            FsError::InvalidHandle => "Invalid handle",
            FsError::BufferTooSmall => "Buffer too small",
            FsError::NameTooLong => "Name too long",
            FsError::NoMoreFiles => "No more files",
            FsError::OutOfMemory => "Out of memory",
            FsError::TooManyOpenFiles => "Too many open files",
            FsError::NoSpace => "No space on volume",
            FsError::Integrity => "Bad image or volume structure",
            FsError::NotFormatted => "Volume not formatted",
            FsError::NotMounted => "File system not mounted",
            FsError::Io => "Media I/O error",
            FsError::ReadOnly => "Read-only",
            FsError::AccessDenied => "Access denied",
            FsError::NotSupported => "Operation not supported",
            FsError::NotFound => "File not found",
            FsError::AlreadyExists => "File exists",
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FlashError> for FsError {
    fn from(e: FlashError) -> Self {
        match e {
            FlashError::OutOfRange => FsError::Io,
            FlashError::ReadOnly => FsError::ReadOnly,
        }
    }
}

/// 截断写入固定缓冲区的格式化器，始终保留一个字节给 nul
struct TruncatingWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    full_len: usize,
}

impl fmt::Write for TruncatingWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.full_len += s.len();
        let room = self.buf.len().saturating_sub(1).saturating_sub(self.len);
        let n = room.min(s.len());
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

fn write_code_text(code: i32, w: &mut impl fmt::Write) -> fmt::Result {
    if code >= 0 {
        return w.write_str("Success");
    }
    match FsError::from_errno(code) {
        Some(e) => w.write_str(e.as_str()),
        None => write!(w, "Unknown error {}", code),
    }
}

/// 把错误码的描述文本写入 `buf`
///
/// 只要 `buf` 非空就会写入 nul 结尾（文本可能被截断）。
/// 返回完整文本的长度（不含 nul），与 `buf` 大小无关，调用方可据此判断是否截断。
pub fn error_text(code: i32, buf: &mut [u8]) -> usize {
    let mut w = TruncatingWriter {
        buf,
        len: 0,
        full_len: 0,
    };
    // TruncatingWriter 从不返回错误
    let _ = write_code_text(code, &mut w);
    let end = w.len;
    if !w.buf.is_empty() {
        w.buf[end] = 0;
    }
    w.full_len
}

/// 错误码的描述文本
pub fn error_string(code: i32) -> String {
    let mut s = String::new();
    let _ = write_code_text(code, &mut s);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_roundtrip_is_unique() {
        for e in ALL_ERRORS {
            assert!(e.to_errno() < 0);
            assert_eq!(FsError::from_errno(e.to_errno()), Some(e));
        }
        assert_eq!(FsError::from_errno(-9999), None);
        assert_eq!(FsError::from_errno(0), None);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(FsError::NoFileSystem.kind(), ErrorKind::Configuration);
        assert_eq!(FsError::ReadOnly.kind(), ErrorKind::Permission);
        assert_eq!(FsError::NoMoreFiles.kind(), ErrorKind::Exhaustion);
        assert_eq!(FsError::Integrity.kind(), ErrorKind::Integrity);
        assert_eq!(FsError::NotSupported.kind(), ErrorKind::NotSupported);
        assert_eq!(FsError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(FsError::BufferTooSmall.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_error_text_nul_terminated() {
        let mut buf = [0xAAu8; 32];
        let n = error_text(FsError::NotFound.to_errno(), &mut buf);
        assert_eq!(n, "File not found".len());
        assert_eq!(&buf[..n], b"File not found");
        assert_eq!(buf[n], 0);
    }

    #[test]
    fn test_error_text_truncates() {
        let mut buf = [0xAAu8; 5];
        let n = error_text(FsError::NotFound.to_errno(), &mut buf);
        assert_eq!(n, 14);
        assert_eq!(&buf, b"File\0");

        // 空缓冲区不写入任何内容
        let mut empty: [u8; 0] = [];
        assert_eq!(error_text(-2, &mut empty), 14);
    }

    #[test]
    fn test_error_text_unknown_and_success() {
        assert_eq!(error_string(-4242), "Unknown error -4242");
        assert_eq!(error_string(0), "Success");
        assert_eq!(error_string(17), "Success");
    }

    #[test]
    fn test_flash_error_conversion() {
        assert_eq!(FsError::from(FlashError::ReadOnly), FsError::ReadOnly);
        assert_eq!(FsError::from(FlashError::OutOfRange), FsError::Io);
    }
}
