//! 固件镜像构建器
//!
//! 在构建阶段（或测试中）把一组文件打包成 [`image`](super::image) 描述的镜像。

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use vfs::{FileAcl, FileAttr, FsError, UserRole, file_name};

use super::image::{ENTRY_SIZE, HEADER_SIZE};
use crate::bytes::{put_u16, put_u32};
use crate::config::{FWFS_MAGIC, FWFS_VERSION, MAX_NAME_LEN};

/// 镜像默认的访问控制：任何人可读，管理员可写
pub const DEFAULT_ACL: FileAcl = FileAcl::new(UserRole::None, UserRole::Admin);

struct Object {
    name: String,
    data: Vec<u8>,
    attr: FileAttr,
    acl: FileAcl,
    mtime: u32,
}

/// 固件镜像构建器
#[derive(Default)]
pub struct ImageBuilder {
    objects: Vec<Object>,
}

impl ImageBuilder {
    /// 创建空构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加文件（默认属性与访问控制）
    pub fn add(&mut self, path: &str, data: &[u8]) -> &mut Self {
        self.add_with(path, data, FileAttr::READ_ONLY, DEFAULT_ACL, 0)
    }

    /// 添加文件并指定元数据
    pub fn add_with(
        &mut self,
        path: &str,
        data: &[u8],
        attr: FileAttr,
        acl: FileAcl,
        mtime: u32,
    ) -> &mut Self {
        self.objects.push(Object {
            // 非法路径保留原样，由 build() 报错
            name: file_name(path).unwrap_or_default(),
            data: data.to_vec(),
            attr,
            acl,
            mtime,
        });
        self
    }

    /// 生成镜像
    ///
    /// 空名称返回 [`FsError::InvalidArgument`]，名称过长返回 [`FsError::NameTooLong`]，
    /// 重名返回 [`FsError::AlreadyExists`]。
    pub fn build(&self) -> Result<Vec<u8>, FsError> {
        let count = u16::try_from(self.objects.len()).map_err(|_| FsError::NoSpace)?;

        let mut seen = BTreeSet::new();
        for obj in &self.objects {
            if obj.name.is_empty() {
                return Err(FsError::InvalidArgument);
            }
            if obj.name.len() > MAX_NAME_LEN {
                return Err(FsError::NameTooLong);
            }
            if !seen.insert(obj.name.as_str()) {
                return Err(FsError::AlreadyExists);
            }
        }

        let table_end = HEADER_SIZE + self.objects.len() * ENTRY_SIZE;
        let payload: usize = self
            .objects
            .iter()
            .map(|o| o.name.len() + o.data.len())
            .sum();
        let image_len = u32::try_from(table_end + payload).map_err(|_| FsError::NoSpace)?;

        let mut image = vec![0u8; image_len as usize];
        image[0..4].copy_from_slice(&FWFS_MAGIC);
        put_u16(&mut image, 4, FWFS_VERSION);
        put_u16(&mut image, 6, count);
        put_u32(&mut image, 8, image_len);

        let mut cursor = table_end;
        for (i, obj) in self.objects.iter().enumerate() {
            let name_off = cursor;
            image[name_off..name_off + obj.name.len()].copy_from_slice(obj.name.as_bytes());
            let data_off = name_off + obj.name.len();
            image[data_off..data_off + obj.data.len()].copy_from_slice(&obj.data);
            cursor = data_off + obj.data.len();

            let e = HEADER_SIZE + i * ENTRY_SIZE;
            put_u32(&mut image, e, name_off as u32);
            put_u32(&mut image, e + 4, data_off as u32);
            put_u32(&mut image, e + 8, obj.data.len() as u32);
            put_u32(&mut image, e + 12, obj.mtime);
            put_u16(&mut image, e + 16, obj.name.len() as u16);
            image[e + 18] = obj.attr.bits();
            image[e + 19] = obj.acl.read as u8;
            image[e + 20] = obj.acl.write as u8;
        }

        Ok(image)
    }
}
