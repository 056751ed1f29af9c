//! 任务调度器
//!
//! 并发执行相互独立的工作单元：
//! - 每个任务有私有的进度树，调度器汇总出全局进度
//! - 调用方以有限超时轮询单个任务是否完成
//! - 任务内部 panic 不会拖垮调度器，而是作为该任务的结果保存下来
//!
//! 任务在 rayon 线程池上执行。完成信号通过丢弃任务持有的 crossbeam
//! `Sender` 发出，之后对同一任务的等待都会立即返回。

use crate::id::TaskId;
use crate::progress::{Progress, ProgressTree};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;

/// 调度错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl From<rayon::ThreadPoolBuildError> for TaskError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        TaskError::ThreadPool(err.to_string())
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Done,
}

/// 任务完成后是否立即清除其记录
///
/// 需要在完成后读取结果或进度时必须用 `Off`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAutoDestroy {
    On,
    Off,
}

/// 进度变化通知
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressChanged {
    pub task_id: TaskId,
    /// 该任务自身的进度
    pub task_value: f64,
    /// 所有在册任务的平均进度
    pub global_value: f64,
}

type Job<T> = Box<dyn FnOnce(&Progress) -> T + Send + 'static>;
type ProgressObserver = Box<dyn Fn(&ProgressChanged) + Send + Sync>;

struct TaskEntry<T> {
    job: Option<Job<T>>,
    state: TaskState,
    progress: ProgressTree,
    done: Receiver<()>,
    /// 执行期间由工作线程持有，丢弃即表示完成
    done_signal: Option<Sender<()>>,
    result: Option<Result<T, TaskError>>,
}

struct Shared<T> {
    tasks: Mutex<HashMap<TaskId, TaskEntry<T>>>,
    observer: RwLock<Option<ProgressObserver>>,
    /// 串行化进度通知，保证观察者看到的全局进度不倒退
    notify_lock: Mutex<()>,
}

impl<T> Shared<T> {
    fn global_progress(&self) -> f64 {
        let tasks = self.tasks.lock();
        if tasks.is_empty() {
            return 0.0;
        }

        let sum: f64 = tasks.values().map(|entry| entry.progress.value()).sum();
        (sum / tasks.len() as f64).clamp(0.0, 100.0)
    }

    fn notify(&self, task_id: TaskId, task_value: f64) {
        let _guard = self.notify_lock.lock();
        let global_value = self.global_progress();
        if let Some(observer) = &*self.observer.read() {
            observer(&ProgressChanged {
                task_id,
                task_value,
                global_value,
            });
        }
    }
}

/// 任务管理器
pub struct TaskManager<T> {
    shared: Arc<Shared<T>>,
    pool: Option<Arc<rayon::ThreadPool>>,
    next_id: AtomicU64,
}

impl<T: Send + 'static> TaskManager<T> {
    /// 使用 rayon 全局线程池
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tasks: Mutex::new(HashMap::new()),
                observer: RwLock::new(None),
                notify_lock: Mutex::new(()),
            }),
            pool: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// 使用独立线程池，最多 `max_threads` 个工作线程
    pub fn with_max_threads(max_threads: usize) -> Result<Self, TaskError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_threads.max(1))
            .thread_name(|i| format!("zcad-task-{}", i))
            .build()?;

        let mut manager = Self::new();
        manager.pool = Some(Arc::new(pool));
        Ok(manager)
    }

    /// 设置进度观察者（任一任务进度变化时回调，可能来自工作线程）
    pub fn set_progress_observer(&self, observer: impl Fn(&ProgressChanged) + Send + Sync + 'static) {
        *self.shared.observer.write() = Some(Box::new(observer));
    }

    /// 登记新任务，不会立即执行
    pub fn new_task(&self, job: impl FnOnce(&Progress) -> T + Send + 'static) -> TaskId {
        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        let progress = ProgressTree::with_listener(move |value| {
            if let Some(shared) = weak.upgrade() {
                shared.notify(id, value);
            }
        });
        let (done_signal, done) = channel::bounded(0);

        self.shared.tasks.lock().insert(
            id,
            TaskEntry {
                job: Some(Box::new(job)),
                state: TaskState::Pending,
                progress,
                done,
                done_signal: Some(done_signal),
                result: None,
            },
        );

        id
    }

    /// 开始并发执行任务
    pub fn run(&self, id: TaskId, auto_destroy: TaskAutoDestroy) {
        let (job, done_signal, progress) = {
            let mut tasks = self.shared.tasks.lock();
            let Some(entry) = tasks.get_mut(&id) else {
                tracing::warn!("Cannot run {}: not found", id);
                return;
            };
            let Some(job) = entry.job.take() else {
                tracing::warn!("Cannot run {}: already started", id);
                return;
            };
            entry.state = TaskState::Running;
            (job, entry.done_signal.take(), entry.progress.clone())
        };

        let shared = self.shared.clone();
        let work = move || {
            let root = progress.root();
            let result = catch_panic(|| job(&root)).map_err(TaskError::Panicked);
            if let Err(err) = &result {
                tracing::warn!("{} failed: {}", id, err);
            }

            {
                let mut tasks = shared.tasks.lock();
                match auto_destroy {
                    TaskAutoDestroy::On => {
                        tasks.remove(&id);
                    }
                    TaskAutoDestroy::Off => {
                        if let Some(entry) = tasks.get_mut(&id) {
                            entry.state = TaskState::Done;
                            entry.result = Some(result);
                        }
                    }
                }
            }

            drop(done_signal);
        };

        match &self.pool {
            Some(pool) => pool.spawn(work),
            None => rayon::spawn(work),
        }
    }

    /// 最多等待 `timeout`，返回任务是否已完成
    ///
    /// 不存在（或已自动销毁）的任务视为已完成。
    pub fn wait_for_done(&self, id: TaskId, timeout: Duration) -> bool {
        let done = {
            let tasks = self.shared.tasks.lock();
            match tasks.get(&id) {
                None => return true,
                Some(entry) if entry.state == TaskState::Done => return true,
                Some(entry) => entry.done.clone(),
            }
        };

        matches!(done.recv_timeout(timeout), Err(RecvTimeoutError::Disconnected))
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.shared.tasks.lock().get(&id).map(|entry| entry.state)
    }

    /// 任务私有进度树的根节点
    pub fn task_progress(&self, id: TaskId) -> Option<Progress> {
        self.shared.tasks.lock().get(&id).map(|entry| entry.progress.root())
    }

    /// 取走已完成任务的结果
    pub fn take_result(&self, id: TaskId) -> Option<Result<T, TaskError>> {
        self.shared
            .tasks
            .lock()
            .get_mut(&id)
            .and_then(|entry| entry.result.take())
    }

    /// 清除任务记录
    pub fn remove_task(&self, id: TaskId) -> bool {
        self.shared.tasks.lock().remove(&id).is_some()
    }

    /// 所有在册任务进度的平均值（0-100）
    pub fn global_progress(&self) -> f64 {
        self.shared.global_progress()
    }

    pub fn task_count(&self) -> usize {
        self.shared.tasks.lock().len()
    }
}

impl<T: Send + 'static> Default for TaskManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 在当前线程执行 `f`，panic 时返回其消息而不是继续展开
pub fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// 从 panic 负载中取出消息文本
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn test_run_and_collect_results() {
        let manager = TaskManager::new();
        let ids: Vec<TaskId> = (0..4).map(|i| manager.new_task(move |_| i * 10)).collect();
        for &id in &ids {
            assert_eq!(manager.state(id), Some(TaskState::Pending));
            manager.run(id, TaskAutoDestroy::Off);
        }

        for (i, &id) in ids.iter().enumerate() {
            assert!(manager.wait_for_done(id, WAIT));
            assert_eq!(manager.state(id), Some(TaskState::Done));
            assert_eq!(manager.take_result(id), Some(Ok(i * 10)));
            // 结果只能取一次
            assert_eq!(manager.take_result(id), None);
        }
    }

    #[test]
    fn test_wait_times_out_while_running() {
        let manager = TaskManager::with_max_threads(2).unwrap();
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        let id = manager.new_task(move |_| {
            let _ = gate_rx.recv();
        });
        manager.run(id, TaskAutoDestroy::Off);

        assert!(!manager.wait_for_done(id, Duration::from_millis(25)));
        drop(gate_tx);
        assert!(manager.wait_for_done(id, WAIT));
        // 重复轮询依旧返回完成
        assert!(manager.wait_for_done(id, Duration::from_millis(1)));
    }

    #[test]
    fn test_pending_task_is_not_done() {
        let manager: TaskManager<()> = TaskManager::new();
        let id = manager.new_task(|_| ());
        assert!(!manager.wait_for_done(id, Duration::from_millis(10)));
    }

    #[test]
    fn test_panic_is_captured() {
        let manager: TaskManager<u32> = TaskManager::new();
        let id = manager.new_task(|_| panic!("parse exploded"));
        manager.run(id, TaskAutoDestroy::Off);

        assert!(manager.wait_for_done(id, WAIT));
        match manager.take_result(id) {
            Some(Err(TaskError::Panicked(msg))) => assert!(msg.contains("parse exploded")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_catch_panic_on_caller_thread() {
        assert_eq!(catch_panic(|| 7), Ok(7));
        let err = catch_panic(|| -> u32 { panic!("boom {}", 3) }).unwrap_err();
        assert_eq!(err, "boom 3");
    }

    #[test]
    fn test_auto_destroy_purges_entry() {
        let manager = TaskManager::new();
        let id = manager.new_task(|_| 1u8);
        manager.run(id, TaskAutoDestroy::On);

        assert!(manager.wait_for_done(id, WAIT));
        assert_eq!(manager.state(id), None);
        assert_eq!(manager.task_count(), 0);
    }

    #[test]
    fn test_global_progress_is_average() {
        let manager = TaskManager::new();
        let a = manager.new_task(|progress: &Progress| progress.set_value(100.0));
        let b = manager.new_task(|progress: &Progress| progress.set_value(50.0));
        assert_eq!(manager.global_progress(), 0.0);

        manager.run(a, TaskAutoDestroy::Off);
        manager.run(b, TaskAutoDestroy::Off);
        assert!(manager.wait_for_done(a, WAIT));
        assert!(manager.wait_for_done(b, WAIT));
        assert_eq!(manager.global_progress(), 75.0);

        manager.task_progress(b).unwrap().set_value(100.0);
        assert_eq!(manager.global_progress(), 100.0);
    }

    #[test]
    fn test_observer_sees_non_decreasing_global_progress() {
        let manager = TaskManager::with_max_threads(4).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.set_progress_observer(move |event| sink.lock().push(event.global_value));

        let ids: Vec<TaskId> = (0..6)
            .map(|_| {
                manager.new_task(|progress: &Progress| {
                    for step in 1..=10 {
                        progress.set_value(step as f64 * 10.0);
                    }
                })
            })
            .collect();
        for &id in &ids {
            manager.run(id, TaskAutoDestroy::Off);
        }
        for &id in &ids {
            assert!(manager.wait_for_done(id, WAIT));
        }

        let values = seen.lock().clone();
        assert!(!values.is_empty());
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*values.last().unwrap(), 100.0);
    }

    #[test]
    fn test_unknown_task() {
        let manager: TaskManager<()> = TaskManager::new();
        let ghost = TaskId::new(999);
        assert!(manager.wait_for_done(ghost, Duration::from_millis(1)));
        assert!(manager.task_progress(ghost).is_none());
        assert!(!manager.remove_task(ghost));
        manager.run(ghost, TaskAutoDestroy::Off);
    }
}
