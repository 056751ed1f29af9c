//! 进度树
//!
//! 层级式、带权重的进度统计：
//! - 每个节点持有 0-100 的本地进度值和它在父节点区间中所占的权重
//! - 节点值变化时按 `权重/100 * 增量` 逐级累加到父节点，直到根节点
//! - 根节点的值就是对外可见的总进度
//! - 取消标志只存在于根部，所有后代都能读取
//!
//! 节点存放在一个共享的 arena 中，父引用只是下标，不持有所有权。
//! 作用域句柄 drop 后其槽位被回收复用；槽位带代数标记，
//! 指向已回收节点的旧句柄对复用后的新节点不产生任何影响。
//!
//! # 示例
//!
//! ```rust
//! use zcad_core::progress::ProgressTree;
//!
//! let tree = ProgressTree::new();
//! let root = tree.root();
//! {
//!     let read = root.child(40.0, "Reading file");
//!     read.set_value(50.0);
//!     assert_eq!(root.value(), 20.0);
//! } // 作用域结束时子节点自动置满
//! assert_eq!(root.value(), 40.0);
//! assert_eq!(tree.node_count(), 1);
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 根节点值变化时的回调
pub type ProgressListener = Box<dyn Fn(f64) + Send + Sync>;

/// 带代数的节点引用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeRef {
    index: usize,
    generation: u64,
}

const ROOT: NodeRef = NodeRef {
    index: 0,
    generation: 0,
};

#[derive(Debug)]
struct Node {
    parent: Option<NodeRef>,
    /// 在父节点区间中所占的百分比
    weight: f64,
    value: f64,
    step: String,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    node: Option<Node>,
}

/// 节点 arena，空闲槽位通过 `free` 复用
#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Arena {
    fn get(&self, node: NodeRef) -> Option<&Node> {
        self.slots
            .get(node.index)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, node: NodeRef) -> Option<&mut Node> {
        self.slots
            .get_mut(node.index)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn insert(&mut self, node: Node) -> NodeRef {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                NodeRef {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeRef {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    fn remove(&mut self, node: NodeRef) {
        if node == ROOT {
            return;
        }
        if let Some(slot) = self.slots.get_mut(node.index) {
            if slot.generation == node.generation && slot.node.take().is_some() {
                slot.generation += 1;
                self.free.push(node.index);
            }
        }
    }

    fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

struct TreeInner {
    nodes: Mutex<Arena>,
    abort_requested: AtomicBool,
    listener: Option<ProgressListener>,
}

/// 一棵进度树（廉价克隆，内部共享）
#[derive(Clone)]
pub struct ProgressTree {
    inner: Arc<TreeInner>,
}

impl ProgressTree {
    /// 创建只有根节点的进度树
    pub fn new() -> Self {
        Self::build(None)
    }

    /// 创建进度树，根节点值变化时回调 `listener`
    pub fn with_listener(listener: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self::build(Some(Box::new(listener)))
    }

    fn build(listener: Option<ProgressListener>) -> Self {
        let mut arena = Arena::default();
        arena.insert(Node {
            parent: None,
            weight: 100.0,
            value: 0.0,
            step: String::new(),
        });

        Self {
            inner: Arc::new(TreeInner {
                nodes: Mutex::new(arena),
                abort_requested: AtomicBool::new(false),
                listener,
            }),
        }
    }

    /// 根节点句柄
    pub fn root(&self) -> Progress {
        Progress {
            link: Some(NodeLink {
                tree: self.inner.clone(),
                node: ROOT,
            }),
            scoped: false,
        }
    }

    /// 根节点当前值
    pub fn value(&self) -> f64 {
        self.inner.nodes.lock().get(ROOT).map_or(0.0, |node| node.value)
    }

    /// 请求取消，对所有节点可见
    pub fn request_abort(&self) {
        self.inner.abort_requested.store(true, Ordering::Release);
    }

    pub fn is_abort_requested(&self) -> bool {
        self.inner.abort_requested.load(Ordering::Acquire)
    }

    /// 存活节点数量（含根节点）
    pub fn node_count(&self) -> usize {
        self.inner.nodes.lock().live_count()
    }
}

impl Default for ProgressTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProgressTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTree")
            .field("value", &self.value())
            .field("abort_requested", &self.is_abort_requested())
            .finish()
    }
}

struct NodeLink {
    tree: Arc<TreeInner>,
    node: NodeRef,
}

/// 进度节点句柄
///
/// 通过 [`Progress::child`] 得到的句柄是一个"进度作用域"：drop 时自动把
/// 自身置为 100，即把分配给它的整段区间交还给父节点，随后释放节点。
/// [`Progress::null`] 接受所有操作但什么也不做。
pub struct Progress {
    link: Option<NodeLink>,
    scoped: bool,
}

impl Progress {
    /// 空进度：所有操作均为空操作
    pub const fn null() -> Self {
        Self {
            link: None,
            scoped: false,
        }
    }

    pub fn is_null(&self) -> bool {
        self.link.is_none()
    }

    /// 在当前节点下开辟一段占 `weight` 百分比的子区间
    pub fn child(&self, weight: f64, step: impl Into<String>) -> Progress {
        let Some(link) = &self.link else {
            return Progress::null();
        };

        let step = step.into();
        if !step.is_empty() {
            tracing::trace!("Progress step: {}", step);
        }

        let node = link.tree.nodes.lock().insert(Node {
            parent: Some(link.node),
            weight: weight.clamp(0.0, 100.0),
            value: 0.0,
            step,
        });

        Progress {
            link: Some(NodeLink {
                tree: link.tree.clone(),
                node,
            }),
            scoped: true,
        }
    }

    /// 指向同一节点的非作用域句柄，drop 时不会置满
    ///
    /// 用于把进度交给其他线程或回调闭包。原作用域结束后，别名上的操作均为空操作。
    pub fn shared(&self) -> Progress {
        Progress {
            link: self.link.as_ref().map(|link| NodeLink {
                tree: link.tree.clone(),
                node: link.node,
            }),
            scoped: false,
        }
    }

    pub fn value(&self) -> f64 {
        match &self.link {
            Some(link) => link.tree.nodes.lock().get(link.node).map_or(0.0, |node| node.value),
            None => 0.0,
        }
    }

    /// 设置本地进度值（截断到 [0, 100]），并把加权增量逐级传给父节点
    ///
    /// 请求取消后不再更新。
    pub fn set_value(&self, value: f64) {
        let Some(link) = &self.link else {
            return;
        };
        if link.tree.abort_requested.load(Ordering::Acquire) {
            return;
        }

        let root_value = {
            let mut nodes = link.tree.nodes.lock();
            let mut current = link.node;
            let mut new_value = value.clamp(0.0, 100.0);
            loop {
                let Some(node) = nodes.get_mut(current) else {
                    break None;
                };
                let delta = new_value - node.value;
                node.value = new_value;
                if delta == 0.0 {
                    break None;
                }

                let (parent, weight) = (node.parent, node.weight);
                match parent {
                    Some(parent) => {
                        let Some(parent_node) = nodes.get(parent) else {
                            break None;
                        };
                        new_value = (parent_node.value + weight / 100.0 * delta).clamp(0.0, 100.0);
                        current = parent;
                    }
                    None => break Some(new_value),
                }
            }
        };

        if let (Some(root_value), Some(listener)) = (root_value, &link.tree.listener) {
            listener(root_value);
        }
    }

    pub fn set_step(&self, step: impl Into<String>) {
        if let Some(link) = &self.link {
            let step = step.into();
            tracing::trace!("Progress step: {}", step);
            if let Some(node) = link.tree.nodes.lock().get_mut(link.node) {
                node.step = step;
            }
        }
    }

    pub fn step(&self) -> String {
        match &self.link {
            Some(link) => link
                .tree
                .nodes
                .lock()
                .get(link.node)
                .map(|node| node.step.clone())
                .unwrap_or_default(),
            None => String::new(),
        }
    }

    pub fn is_abort_requested(&self) -> bool {
        self.link
            .as_ref()
            .map(|link| link.tree.abort_requested.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if !self.scoped {
            return;
        }

        self.set_value(100.0);
        if let Some(link) = &self.link {
            link.tree.nodes.lock().remove(link.node);
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.link {
            Some(link) => f
                .debug_struct("Progress")
                .field("index", &link.node.index)
                .field("value", &self.value())
                .field("scoped", &self.scoped)
                .finish(),
            None => f.write_str("Progress(null)"),
        }
    }
}
