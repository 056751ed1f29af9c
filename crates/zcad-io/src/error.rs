//! 导入/导出错误定义
//!
//! 编排流程中的错误不会越过 `System` 的公开接口返回，而是格式化后
//! 发送到消息通道；这里的类型负责统一错误分类和文案。

use crate::format::Format;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parameters error: {0}")]
    Parameters(#[from] serde_json::Error),

    #[error("Unknown format")]
    UnknownFormat,

    #[error("No supporting {role} for format {format}")]
    NoMatchingFactory { role: FactoryRole, format: Format },

    #[error("File read problem{}", detail_suffix(.0))]
    ReadFailure(Option<String>),

    #[error("File transfer problem")]
    TransferFailure,

    #[error("File write problem")]
    WriteFailure,

    #[error("No target document")]
    NoTargetDocument,
}

/// 工厂角色（读取器或写入器）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryRole {
    Reader,
    Writer,
}

impl std::fmt::Display for FactoryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactoryRole::Reader => f.write_str("reader"),
            FactoryRole::Writer => f.write_str("writer"),
        }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {}", detail),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(IoError::UnknownFormat.to_string(), "Unknown format");
        assert_eq!(
            IoError::NoMatchingFactory {
                role: FactoryRole::Writer,
                format: Format::Step,
            }
            .to_string(),
            "No supporting writer for format STEP"
        );
        assert_eq!(IoError::ReadFailure(None).to_string(), "File read problem");
        assert_eq!(
            IoError::ReadFailure(Some("task panicked".into())).to_string(),
            "File read problem: task panicked"
        );
    }
}
