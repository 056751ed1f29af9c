//! ZCAD 核心基础设施
//!
//! 为文件导入/导出流水线提供与具体格式无关的基础组件。
//!
//! # 架构设计
//!
//! - `progress`: 带权重的层级进度树，根部持有取消标志
//! - `task`: 任务调度器，在线程池上并发执行并汇总全局进度
//! - `messenger`: 错误/警告/提示消息通道
//! - `id`: 实体、文档、任务的强类型标识
//!
//! # 示例
//!
//! ```rust
//! use zcad_core::prelude::*;
//! use std::time::Duration;
//!
//! let manager = TaskManager::new();
//! let id = manager.new_task(|progress: &Progress| {
//!     progress.set_value(100.0);
//!     42
//! });
//! manager.run(id, TaskAutoDestroy::Off);
//! assert!(manager.wait_for_done(id, Duration::from_secs(5)));
//! assert_eq!(manager.take_result(id), Some(Ok(42)));
//! ```

pub mod id;
pub mod messenger;
pub mod progress;
pub mod task;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::id::{DocumentId, EntityId, TaskId};
    pub use crate::messenger::{
        Message, MessageCollection, MessageType, Messenger, MessengerByCallback, NullMessenger,
        TracingMessenger,
    };
    pub use crate::progress::{Progress, ProgressTree};
    pub use crate::task::{ProgressChanged, TaskAutoDestroy, TaskError, TaskManager, TaskState};
}
