//! ZCAD 文件导入导出
//!
//! 提供：
//! - 文件格式识别（内容探测 + 扩展名回退）
//! - 读取器/写入器工厂注册表
//! - 多文件并发导入：解析并行，转移到文档串行
//! - 导出与链式构造器
//!
//! 具体格式的解析器由使用方通过 [`reader::FactoryReader`] / [`writer::FactoryWriter`] 注册。

pub mod document;
pub mod error;
pub mod format;
pub mod operation;
pub mod parameters;
pub mod probe;
pub mod reader;
pub mod system;
pub mod writer;

pub use document::{ApplicationItem, Document};
pub use error::{FactoryRole, IoError};
pub use format::Format;
pub use operation::{ExportOperation, ImportOperation};
pub use parameters::{Parameters, ParametersMap, ParametersProvider};
pub use probe::{predefined_format_probes, FormatProbe, FormatProbeInput};
pub use reader::{FactoryReader, Reader};
pub use system::{ExportArgs, ImportArgs, System};
pub use writer::{FactoryWriter, Writer};
