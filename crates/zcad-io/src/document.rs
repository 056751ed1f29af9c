//! 导入目标与导出源
//!
//! 文档模型本身不在本 crate 中定义，这里只声明编排流程需要的能力。

use serde::{Deserialize, Serialize};
use zcad_core::id::{DocumentId, EntityId};

/// 导入目标文档
///
/// 只在串行的转移阶段通过 `&mut` 访问，同一时刻最多一个读取器在写入。
pub trait Document {
    /// 新建实体（由读取器在转移时调用）
    fn create_entity(&mut self, name: &str) -> EntityId;

    /// 把实体挂到文档的模型树上
    fn add_entity_tree_node(&mut self, entity: EntityId);
}

/// 应用层条目（导出的输入）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationItem {
    /// 整个文档
    Document(DocumentId),
    /// 文档中的单个实体
    Entity {
        document: DocumentId,
        entity: EntityId,
    },
}

impl ApplicationItem {
    pub fn document(&self) -> DocumentId {
        match *self {
            ApplicationItem::Document(document) => document,
            ApplicationItem::Entity { document, .. } => document,
        }
    }

    pub fn entity(&self) -> Option<EntityId> {
        match *self {
            ApplicationItem::Document(_) => None,
            ApplicationItem::Entity { entity, .. } => Some(entity),
        }
    }
}
