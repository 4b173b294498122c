//! 路径规范化
//!
//! 两个后端都是扁平命名空间：文件以相对根的完整名称存储（例如 `web/app.js`），
//! 不存在真正的目录节点。本模块把调用方给出的路径转换为这种存储名称。
//!
//! 支持的语义：
//!
//! - 开头的 `/` 可有可无，`/index.html` 与 `index.html` 是同一个文件
//! - 连续的 `/` 视为一个
//! - `.` 跳过；`..` 回到上一级，但不能越过根

use alloc::string::String;
use alloc::vec::Vec;

use crate::FsError;

/// 路径组件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathComponent {
    /// 根目录 "/"
    Root,
    /// 当前目录 "."
    Current,
    /// 父目录 ".."
    Parent,
    /// 正常的文件名
    Normal(String),
}

/// 将路径字符串解析为组件列表
pub fn parse_path(path: &str) -> Vec<PathComponent> {
    let mut components = Vec::new();

    if path.starts_with('/') {
        components.push(PathComponent::Root);
    }

    for part in path.split('/').filter(|s| !s.is_empty()) {
        let component = match part {
            "." => PathComponent::Current,
            ".." => PathComponent::Parent,
            name => PathComponent::Normal(String::from(name)),
        };
        components.push(component);
    }

    components
}

/// 规范化为相对根的存储名称，根目录本身得到空串
pub fn normalize_path(path: &str) -> String {
    let mut stack: Vec<String> = Vec::new();

    for component in parse_path(path) {
        match component {
            PathComponent::Root | PathComponent::Current => {}
            PathComponent::Parent => {
                // 不能越过根目录
                stack.pop();
            }
            PathComponent::Normal(name) => stack.push(name),
        }
    }

    stack.join("/")
}

/// 把文件路径转换为存储名称
///
/// 指向根目录或以 `/` 结尾的路径不是文件，返回 [`FsError::InvalidArgument`]。
pub fn file_name(path: &str) -> Result<String, FsError> {
    if path.ends_with('/') {
        return Err(FsError::InvalidArgument);
    }
    let name = normalize_path(path);
    if name.is_empty() {
        return Err(FsError::InvalidArgument);
    }
    Ok(name)
}

/// 把目录路径转换为名称前缀：根目录为空串，其余为 `"dir/"`
pub fn dir_prefix(path: &str) -> String {
    let mut prefix = normalize_path(path);
    if !prefix.is_empty() {
        prefix.push('/');
    }
    prefix
}

/// 若 `name` 位于 `prefix` 目录下，返回目录内的相对名称
pub fn strip_dir<'a>(prefix: &str, name: &'a str) -> Option<&'a str> {
    match name.strip_prefix(prefix) {
        Some(rest) if !rest.is_empty() => Some(rest),
        _ => None,
    }
}

/// 存储名称是否以 `.` 开头（开头的 `/` 不计）
pub fn is_dot_name(name: &str) -> bool {
    name.trim_start_matches('/').starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_prefix() {
        assert_eq!(dir_prefix(""), "");
        assert_eq!(dir_prefix("/"), "");
        assert_eq!(dir_prefix("/web"), "web/");
        assert_eq!(dir_prefix("web/"), "web/");
    }

    #[test]
    fn test_strip_dir() {
        assert_eq!(strip_dir("", "index.html"), Some("index.html"));
        assert_eq!(strip_dir("web/", "web/app.js"), Some("app.js"));
        assert_eq!(strip_dir("web/", "webapp.js"), None);
        assert_eq!(strip_dir("web/", "web/"), None);
    }

    #[test]
    fn test_dot_names() {
        assert!(is_dot_name(".pwd"));
        assert!(is_dot_name("/.pwd"));
        assert!(is_dot_name(".config/readme"));
        assert!(!is_dot_name("index.html"));
        assert!(!is_dot_name("web/.secret"));
    }
}
