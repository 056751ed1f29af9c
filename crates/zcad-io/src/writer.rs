//! 写入器能力与工厂

use crate::document::ApplicationItem;
use crate::format::Format;
use crate::parameters::Parameters;
use std::path::Path;
use std::sync::Arc;
use zcad_core::messenger::Messenger;
use zcad_core::progress::Progress;

/// 写入器（每次导出一个实例）
pub trait Writer: Send {
    fn set_messenger(&mut self, messenger: Arc<dyn Messenger>) {
        let _ = messenger;
    }

    fn apply_properties(&mut self, parameters: &Parameters) {
        let _ = parameters;
    }

    /// 把应用条目转为写入器内部的可导出表示
    fn transfer(&mut self, items: &[ApplicationItem], progress: &Progress) -> bool;

    fn write_file(&mut self, path: &Path, progress: &Progress) -> bool;
}

/// 写入器工厂
pub trait FactoryWriter: Send + Sync {
    fn formats(&self) -> &[Format];

    fn create(&self, format: Format) -> Option<Box<dyn Writer>>;

    fn create_parameters(&self, format: Format) -> Option<Parameters> {
        let _ = format;
        None
    }
}
