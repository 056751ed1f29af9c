//! 读取器能力与工厂
//!
//! 读取分两步：
//! 1. `read_file` 把文件解析到读取器私有的中间表示（可并发执行）
//! 2. `transfer` 把中间表示转移到目标文档（由编排器串行执行）

use crate::document::Document;
use crate::format::Format;
use crate::parameters::Parameters;
use std::path::Path;
use std::sync::Arc;
use zcad_core::id::EntityId;
use zcad_core::messenger::Messenger;
use zcad_core::progress::Progress;

/// 读取器（每次文件操作一个实例）
pub trait Reader: Send {
    fn set_messenger(&mut self, messenger: Arc<dyn Messenger>) {
        let _ = messenger;
    }

    fn apply_properties(&mut self, parameters: &Parameters) {
        let _ = parameters;
    }

    /// 解析文件，返回是否成功
    fn read_file(&mut self, path: &Path, progress: &Progress) -> bool;

    /// 转移到目标文档，返回产生的实体；空序列表示失败
    fn transfer(&mut self, document: &mut dyn Document, progress: &Progress) -> Vec<EntityId>;
}

/// 读取器工厂
pub trait FactoryReader: Send + Sync {
    /// 支持的格式
    fn formats(&self) -> &[Format];

    fn create(&self, format: Format) -> Option<Box<dyn Reader>>;

    /// 该格式的默认参数
    fn create_parameters(&self, format: Format) -> Option<Parameters> {
        let _ = format;
        None
    }
}
