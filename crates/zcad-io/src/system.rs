//! 导入/导出编排
//!
//! [`System`] 同时承担格式注册表的角色：
//! - 探测谓词链与扩展名回退
//! - 读取器/写入器工厂的注册与查找
//! - 多文件导入：解析并发执行，转移到文档严格串行
//! - 导出：转移 + 写文件，任一步失败立即终止
//!
//! 所有错误都发送到消息通道，公开接口只返回是否成功。

use crate::document::{ApplicationItem, Document};
use crate::error::{FactoryRole, IoError};
use crate::format::Format;
use crate::parameters::{Parameters, ParametersProvider};
use crate::probe::{predefined_format_probes, FormatProbe, FormatProbeInput};
use crate::reader::{FactoryReader, Reader};
use crate::writer::{FactoryWriter, Writer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use zcad_core::id::{EntityId, TaskId};
use zcad_core::messenger::{Messenger, NullMessenger};
use zcad_core::progress::Progress;
use zcad_core::task::{catch_panic, TaskAutoDestroy, TaskManager};

/// 读取阶段占单个文件进度的百分比
pub const READ_PROGRESS_PORTION: f64 = 40.0;
/// 转移阶段占单个文件进度的百分比
pub const TRANSFER_PROGRESS_PORTION: f64 = 60.0;
/// 轮询读取任务完成的超时
pub const TASK_POLL_TIMEOUT: Duration = Duration::from_millis(25);

/// 实体后处理回调
pub type EntityPostProcessFn<'a> = Box<dyn Fn(EntityId, &Progress) + 'a>;
/// 判断某格式是否需要后处理
pub type EntityPostProcessRequiredIfFn<'a> = Box<dyn Fn(Format) -> bool + 'a>;

/// 导入参数
#[derive(Default)]
pub struct ImportArgs<'a> {
    pub filepaths: Vec<PathBuf>,
    pub parameters_provider: Option<&'a dyn ParametersProvider>,
    pub messenger: Option<Arc<dyn Messenger>>,
    pub progress: Option<&'a Progress>,
    pub entity_post_process: Option<EntityPostProcessFn<'a>>,
    pub entity_post_process_required_if: Option<EntityPostProcessRequiredIfFn<'a>>,
    /// 后处理占单个文件进度的百分比，从读取+转移的预算中扣除
    pub entity_post_process_progress_size: f64,
    pub entity_post_process_progress_step: String,
}

/// 导出参数
#[derive(Default)]
pub struct ExportArgs<'a> {
    pub target_filepath: PathBuf,
    pub target_format: Format,
    pub items: &'a [ApplicationItem],
    pub parameters: Option<&'a Parameters>,
    pub messenger: Option<Arc<dyn Messenger>>,
    pub progress: Option<&'a Progress>,
}

/// 格式注册表与导入/导出编排器
#[derive(Default)]
pub struct System {
    probes: Vec<FormatProbe>,
    reader_formats: Vec<Format>,
    writer_formats: Vec<Format>,
    factory_readers: Vec<Arc<dyn FactoryReader>>,
    factory_writers: Vec<Arc<dyn FactoryWriter>>,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加探测谓词（按追加顺序尝试）
    pub fn add_format_probe(&mut self, probe: impl Fn(&FormatProbeInput) -> Format + Send + Sync + 'static) {
        self.probes.push(Box::new(probe));
    }

    /// 安装全部预置探测谓词
    pub fn add_predefined_format_probes(&mut self) {
        self.probes.extend(predefined_format_probes());
    }

    pub fn format_probe_count(&self) -> usize {
        self.probes.len()
    }

    /// 注册读取器工厂；同一工厂重复注册无效
    pub fn add_factory_reader(&mut self, factory: Arc<dyn FactoryReader>) {
        if self.factory_readers.iter().any(|f| same_factory(f, &factory)) {
            return;
        }

        for &format in factory.formats() {
            if !self.reader_formats.contains(&format) {
                self.reader_formats.push(format);
            }
        }

        self.factory_readers.push(factory);
    }

    /// 注册写入器工厂；同一工厂重复注册无效
    pub fn add_factory_writer(&mut self, factory: Arc<dyn FactoryWriter>) {
        if self.factory_writers.iter().any(|f| same_factory(f, &factory)) {
            return;
        }

        for &format in factory.formats() {
            if !self.writer_formats.contains(&format) {
                self.writer_formats.push(format);
            }
        }

        self.factory_writers.push(factory);
    }

    /// 有读取器的格式（按首次注册顺序）
    pub fn reader_formats(&self) -> &[Format] {
        &self.reader_formats
    }

    /// 有写入器的格式（按首次注册顺序）
    pub fn writer_formats(&self) -> &[Format] {
        &self.writer_formats
    }

    pub fn find_factory_reader(&self, format: Format) -> Option<&dyn FactoryReader> {
        self.factory_readers
            .iter()
            .find(|f| f.formats().contains(&format))
            .map(|f| f.as_ref())
    }

    pub fn find_factory_writer(&self, format: Format) -> Option<&dyn FactoryWriter> {
        self.factory_writers
            .iter()
            .find(|f| f.formats().contains(&format))
            .map(|f| f.as_ref())
    }

    pub fn create_reader(&self, format: Format) -> Option<Box<dyn Reader>> {
        self.find_factory_reader(format)?.create(format)
    }

    pub fn create_writer(&self, format: Format) -> Option<Box<dyn Writer>> {
        self.find_factory_writer(format)?.create(format)
    }

    fn is_registered(&self, format: Format) -> bool {
        self.reader_formats.contains(&format) || self.writer_formats.contains(&format)
    }

    /// 探测文件格式
    ///
    /// 文件打不开时不报错，直接按扩展名猜测。
    pub fn probe_format(&self, path: &Path) -> Format {
        match FormatProbeInput::from_file(path) {
            Ok(input) => self.probe_format_input(&input),
            Err(err) => {
                tracing::debug!("Cannot sample {} for probing: {}", path.display(), err);
                self.format_from_suffix(path)
            }
        }
    }

    /// 对给定样本执行探测链，未命中时按 `input.filepath` 的扩展名猜测
    ///
    /// 谓词给出的格式若没有任何已注册的工厂则被忽略。
    pub fn probe_format_input(&self, input: &FormatProbeInput) -> Format {
        for probe in &self.probes {
            let format = probe(input);
            if format != Format::Unknown && self.is_registered(format) {
                return format;
            }
        }

        self.format_from_suffix(&input.filepath)
    }

    /// 按扩展名匹配：先读取器格式，再写入器格式
    pub fn format_from_suffix(&self, path: &Path) -> Format {
        let suffix = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        self.reader_formats
            .iter()
            .chain(self.writer_formats.iter())
            .copied()
            .find(|format| format.matches_suffix(suffix))
            .unwrap_or(Format::Unknown)
    }

    /// 把若干文件导入到目标文档
    ///
    /// 单个文件在调用线程上同步完成；多个文件时解析并发执行，转移按完成
    /// 先后逐个进行。某个文件失败不影响其他文件，但整体返回 `false`。
    pub fn import_in_document(&self, document: &mut dyn Document, args: ImportArgs<'_>) -> bool {
        let null_progress = Progress::null();
        let root = args.progress.unwrap_or(&null_progress);
        let messenger: Arc<dyn Messenger> = args
            .messenger
            .clone()
            .unwrap_or_else(|| Arc::new(NullMessenger));

        tracing::info!("Importing {} file(s)", args.filepaths.len());

        let mut import = Import {
            system: self,
            args: &args,
            root,
            messenger,
            ok: true,
        };

        let completed = if args.filepaths.len() == 1 {
            import.run_single(document, &args.filepaths[0]);
            !root.is_abort_requested()
        } else {
            import.run_many(document)
        };

        if completed {
            root.set_value(100.0);
        } else {
            tracing::warn!("Import aborted");
        }

        let ok = import.ok && completed;
        tracing::info!("Import finished (success: {})", ok);
        ok
    }

    /// 把应用条目导出到单个文件，任一步失败立即终止
    pub fn export_application_items(&self, args: ExportArgs<'_>) -> bool {
        let null_progress = Progress::null();
        let progress = args.progress.unwrap_or(&null_progress);
        let messenger: Arc<dyn Messenger> = args
            .messenger
            .clone()
            .unwrap_or_else(|| Arc::new(NullMessenger));

        let fail = |err: IoError| {
            tracing::warn!("Export to {} failed: {}", args.target_filepath.display(), err);
            messenger.emit_error(&format!(
                "Error during export to '{}'\n{}",
                args.target_filepath.display(),
                err
            ));
            false
        };

        let Some(mut writer) = self.create_writer(args.target_format) else {
            return fail(IoError::NoMatchingFactory {
                role: FactoryRole::Writer,
                format: args.target_format,
            });
        };

        writer.set_messenger(messenger.clone());
        let default_parameters = self
            .find_factory_writer(args.target_format)
            .and_then(|factory| factory.create_parameters(args.target_format));
        if let Some(parameters) = args.parameters.or(default_parameters.as_ref()) {
            writer.apply_properties(parameters);
        }

        {
            let transfer_progress = progress.child(READ_PROGRESS_PORTION, "Transfer");
            if !writer.transfer(args.items, &transfer_progress) {
                return fail(IoError::TransferFailure);
            }
        }

        {
            let write_progress = progress.child(TRANSFER_PROGRESS_PORTION, "Write");
            if !writer.write_file(&args.target_filepath, &write_progress) {
                return fail(IoError::WriteFailure);
            }
        }

        tracing::info!(
            "Exported {} item(s) to {} as {}",
            args.items.len(),
            args.target_filepath.display(),
            args.target_format
        );
        true
    }
}

fn same_factory<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// 读取任务的产出
struct ReadOutcome {
    reader: Box<dyn Reader>,
    ok: bool,
}

/// 已提交、尚未转移的文件
struct PendingRead {
    task_id: TaskId,
    filepath: PathBuf,
    format: Format,
}

/// 单次导入调用的状态
struct Import<'s, 'a> {
    system: &'s System,
    args: &'s ImportArgs<'a>,
    /// 调用方的根进度，取消标志以它为准
    root: &'s Progress,
    messenger: Arc<dyn Messenger>,
    ok: bool,
}

impl Import<'_, '_> {
    fn add_error(&mut self, path: &Path, err: &IoError) {
        self.ok = false;
        tracing::warn!("Import of {} failed: {}", path.display(), err);
        self.messenger
            .emit_error(&format!("Error during import of '{}'\n{}", path.display(), err));
    }

    fn post_process_required(&self, format: Format) -> bool {
        match (&self.args.entity_post_process, &self.args.entity_post_process_required_if) {
            (Some(_), Some(required_if)) => required_if(format),
            _ => false,
        }
    }

    /// 后处理需要时按比例缩小读取/转移预算
    fn scaled_portion(&self, portion: f64, format: Format) -> f64 {
        if self.post_process_required(format) {
            let size = self.args.entity_post_process_progress_size.clamp(0.0, 100.0);
            portion * (100.0 - size) / 100.0
        } else {
            portion
        }
    }

    /// 探测格式并创建、配置读取器
    fn prepare_reader(&mut self, path: &Path) -> Option<(Format, Box<dyn Reader>)> {
        let format = self.system.probe_format(path);
        if format == Format::Unknown {
            self.add_error(path, &IoError::UnknownFormat);
            return None;
        }

        let Some(mut reader) = self.system.create_reader(format) else {
            self.add_error(
                path,
                &IoError::NoMatchingFactory {
                    role: FactoryRole::Reader,
                    format,
                },
            );
            return None;
        };

        reader.set_messenger(self.messenger.clone());
        let parameters = self
            .args
            .parameters_provider
            .and_then(|provider| provider.find_reader_parameters(format))
            .or_else(|| {
                self.system
                    .find_factory_reader(format)
                    .and_then(|factory| factory.create_parameters(format))
            });
        if let Some(parameters) = parameters {
            reader.apply_properties(&parameters);
        }

        tracing::debug!("Probed {} as {}", path.display(), format);
        Some((format, reader))
    }

    fn transfer(
        &mut self,
        document: &mut dyn Document,
        reader: &mut dyn Reader,
        path: &Path,
        format: Format,
        parent: &Progress,
    ) -> Vec<EntityId> {
        let progress = parent.child(
            self.scaled_portion(TRANSFER_PROGRESS_PORTION, format),
            "Transferring file",
        );
        if progress.is_abort_requested() || self.root.is_abort_requested() {
            return Vec::new();
        }

        match catch_panic(|| reader.transfer(document, &progress)) {
            Ok(entities) if !entities.is_empty() => entities,
            Ok(_) => {
                self.add_error(path, &IoError::TransferFailure);
                Vec::new()
            }
            Err(msg) => {
                tracing::warn!("Reader panicked while transferring {}: {}", path.display(), msg);
                self.add_error(path, &IoError::TransferFailure);
                Vec::new()
            }
        }
    }

    fn post_process(&mut self, entities: &[EntityId], path: &Path, format: Format, parent: &Progress) {
        if !self.post_process_required(format) {
            return;
        }
        let args = self.args;
        let Some(process) = &args.entity_post_process else {
            return;
        };

        let progress = parent.child(
            args.entity_post_process_progress_size,
            args.entity_post_process_progress_step.clone(),
        );
        if entities.is_empty() {
            return;
        }

        let sub_portion = 100.0 / entities.len() as f64;
        let outcome = catch_panic(|| {
            for &entity in entities {
                let sub_progress = progress.child(sub_portion, "");
                process(entity, &sub_progress);
            }
        });
        if let Err(msg) = outcome {
            tracing::warn!("Entity post-process panicked for {}: {}", path.display(), msg);
            self.add_error(path, &IoError::TransferFailure);
        }
    }

    /// 转移 → 后处理 → 挂到模型树
    fn commit(
        &mut self,
        document: &mut dyn Document,
        reader: &mut dyn Reader,
        path: &Path,
        format: Format,
        progress: &Progress,
    ) {
        let entities = self.transfer(document, reader, path, format, progress);
        self.post_process(&entities, path, format, progress);
        for &entity in &entities {
            document.add_entity_tree_node(entity);
        }

        tracing::debug!("Imported {} entities from {}", entities.len(), path.display());
    }

    fn run_single(&mut self, document: &mut dyn Document, path: &Path) {
        let root = self.root;
        let Some((format, mut reader)) = self.prepare_reader(path) else {
            return;
        };

        let read_progress = root.child(self.scaled_portion(READ_PROGRESS_PORTION, format), "Reading file");
        let read = catch_panic(|| reader.read_file(path, &read_progress));
        drop(read_progress);
        match read {
            Ok(true) => {}
            Ok(false) => {
                self.add_error(path, &IoError::ReadFailure(None));
                return;
            }
            Err(msg) => {
                self.add_error(path, &IoError::ReadFailure(Some(msg)));
                return;
            }
        }

        self.commit(document, reader.as_mut(), path, format, root);
    }

    /// 返回是否处理完全部文件（未被取消）
    fn run_many(&mut self, document: &mut dyn Document) -> bool {
        let root = self.root;
        let manager: TaskManager<ReadOutcome> = TaskManager::new();
        let root_link = root.shared();
        manager.set_progress_observer(move |event| root_link.set_value(event.global_value));

        let mut pending = Vec::with_capacity(self.args.filepaths.len());
        for path in &self.args.filepaths {
            let Some((format, reader)) = self.prepare_reader(path) else {
                continue;
            };

            let read_portion = self.scaled_portion(READ_PROGRESS_PORTION, format);
            let filepath = path.clone();
            let task_id = manager.new_task(move |progress: &Progress| {
                let mut reader = reader;
                let ok = {
                    let read_progress = progress.child(read_portion, "Reading file");
                    reader.read_file(&filepath, &read_progress)
                };
                ReadOutcome { reader, ok }
            });

            pending.push(PendingRead {
                task_id,
                filepath: path.clone(),
                format,
            });
        }

        for read in &pending {
            manager.run(read.task_id, TaskAutoDestroy::Off);
        }

        while !pending.is_empty() {
            if root.is_abort_requested() {
                tracing::debug!("Abort requested, {} file(s) left untransferred", pending.len());
                return false;
            }

            let Some(index) = pending
                .iter()
                .position(|read| manager.wait_for_done(read.task_id, TASK_POLL_TIMEOUT))
            else {
                continue;
            };

            let read = pending.remove(index);
            let task_progress = manager
                .task_progress(read.task_id)
                .unwrap_or_else(Progress::null);

            match manager.take_result(read.task_id) {
                Some(Ok(ReadOutcome { mut reader, ok: true })) => {
                    self.commit(document, reader.as_mut(), &read.filepath, read.format, &task_progress);
                }
                Some(Ok(ReadOutcome { ok: false, .. })) => {
                    self.add_error(&read.filepath, &IoError::ReadFailure(None));
                }
                Some(Err(err)) => {
                    self.add_error(&read.filepath, &IoError::ReadFailure(Some(err.to_string())));
                }
                None => {
                    self.add_error(
                        &read.filepath,
                        &IoError::ReadFailure(Some("read task result missing".to_string())),
                    );
                }
            }

            // 失败的文件也占满自己的份额，保证总进度能到 100
            task_progress.set_value(100.0);
        }

        true
    }
}
