//! 消息通道
//!
//! 导入/导出过程中产生的错误、警告与提示通过 [`Messenger`] 汇报给调用方，
//! 从不以 panic 或错误返回值的形式越过流程边界。
//!
//! 实现需要 `Send + Sync`：并发读取任务会从工作线程直接发送消息。

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Trace,
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Trace => "trace",
            MessageType::Info => "info",
            MessageType::Warning => "warning",
            MessageType::Error => "error",
        };
        f.write_str(name)
    }
}

/// 一条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_type: MessageType,
    pub text: String,
}

/// 消息接收端
pub trait Messenger: Send + Sync {
    fn emit_message(&self, message_type: MessageType, text: &str);

    fn emit_trace(&self, text: &str) {
        self.emit_message(MessageType::Trace, text);
    }

    fn emit_info(&self, text: &str) {
        self.emit_message(MessageType::Info, text);
    }

    fn emit_warning(&self, text: &str) {
        self.emit_message(MessageType::Warning, text);
    }

    fn emit_error(&self, text: &str) {
        self.emit_message(MessageType::Error, text);
    }
}

/// 丢弃所有消息（未提供消息通道时的默认值）
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMessenger;

impl Messenger for NullMessenger {
    fn emit_message(&self, _message_type: MessageType, _text: &str) {}
}

/// 由闭包构造的消息通道，省去单独实现 trait
pub struct MessengerByCallback<F> {
    callback: F,
}

impl<F> MessengerByCallback<F>
where
    F: Fn(MessageType, &str) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> Messenger for MessengerByCallback<F>
where
    F: Fn(MessageType, &str) + Send + Sync,
{
    fn emit_message(&self, message_type: MessageType, text: &str) {
        (self.callback)(message_type, text);
    }
}

/// 转发到 `tracing` 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMessenger;

impl Messenger for TracingMessenger {
    fn emit_message(&self, message_type: MessageType, text: &str) {
        match message_type {
            MessageType::Trace => tracing::trace!("{}", text),
            MessageType::Info => tracing::info!("{}", text),
            MessageType::Warning => tracing::warn!("{}", text),
            MessageType::Error => tracing::error!("{}", text),
        }
    }
}

/// 收集全部消息，便于事后检查
#[derive(Debug, Default)]
pub struct MessageCollection {
    messages: Mutex<Vec<Message>>,
}

impl MessageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已收集消息的快照
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// 指定级别的消息数量
    pub fn count(&self, message_type: MessageType) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.message_type == message_type)
            .count()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl Messenger for MessageCollection {
    fn emit_message(&self, message_type: MessageType, text: &str) {
        self.messages.lock().push(Message {
            message_type,
            text: text.to_string(),
        });
    }
}
