//! 设备驱动基础类型
//!
//! 包含 Driver trait 和 DeviceType 枚举

use alloc::{string::String, sync::Arc};

use crate::flash::FlashMedia;

/// 设备类型枚举
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeviceType {
    /// 闪存设备
    Flash,
}

/// 设备驱动程序特征
pub trait Driver: Send + Sync {
    /// 返回对应的设备类型，请参阅 DeviceType
    fn device_type(&self) -> DeviceType;

    /// 获取此设备的唯一标识符
    /// 每个实例的标识符应该不同
    fn get_id(&self) -> String;

    /// 将驱动程序转换为闪存驱动程序（如果适用）
    fn as_flash(&self) -> Option<&dyn FlashMedia> {
        None
    }

    /// 将驱动程序转换为闪存驱动程序 Arc（如果适用）
    fn as_flash_arc(self: Arc<Self>) -> Option<Arc<dyn FlashMedia>> {
        None
    }
}
