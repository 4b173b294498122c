//! 访问控制约定
//!
//! 名称以 `.` 开头的文件是系统文件，无论存储的 ACL 是什么，读写都只对管理员开放。
//! 文件系统本身不做检查，由上层（例如 Web 服务）在访问前调用这里的函数。

use crate::path::is_dot_name;
use crate::{FileAcl, FileStat, UserRole};

/// 系统文件的有效 ACL
pub const SYSTEM_FILE_ACL: FileAcl = FileAcl::new(UserRole::Admin, UserRole::Admin);

/// 是否是系统文件
pub fn is_system_file(name: &str) -> bool {
    is_dot_name(name)
}

/// 有效 ACL
pub fn effective_acl(stat: &FileStat) -> FileAcl {
    if is_system_file(&stat.name) {
        SYSTEM_FILE_ACL
    } else {
        stat.acl
    }
}

/// `role` 是否可以读取该文件
pub fn can_read(role: UserRole, stat: &FileStat) -> bool {
    role >= effective_acl(stat).read
}

/// `role` 是否可以写入该文件
pub fn can_write(role: UserRole, stat: &FileStat) -> bool {
    role >= effective_acl(stat).write
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    fn stat(name: &str, read: UserRole, write: UserRole) -> FileStat {
        FileStat {
            name: String::from(name),
            acl: FileAcl::new(read, write),
            ..Default::default()
        }
    }

    #[test]
    fn test_system_file_forced_admin() {
        let s = stat(".pwd", UserRole::Guest, UserRole::Guest);
        assert_eq!(effective_acl(&s), SYSTEM_FILE_ACL);
        assert!(!can_read(UserRole::Manager, &s));
        assert!(can_read(UserRole::Admin, &s));
        assert!(!can_write(UserRole::User, &s));
    }

    #[test]
    fn test_regular_file_uses_stored_acl() {
        let s = stat("index.html", UserRole::None, UserRole::Manager);
        assert_eq!(effective_acl(&s), s.acl);
        assert!(can_read(UserRole::None, &s));
        assert!(can_read(UserRole::Guest, &s));
        assert!(!can_write(UserRole::User, &s));
        assert!(can_write(UserRole::Manager, &s));
        assert!(can_write(UserRole::Admin, &s));
    }
}
