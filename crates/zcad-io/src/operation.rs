//! 导入/导出的链式构造器
//!
//! ```rust,no_run
//! # use zcad_io::{System, document::Document};
//! # fn demo(system: &System, document: &mut dyn Document) {
//! let ok = system
//!     .import()
//!     .target_document(document)
//!     .with_filepath("part.step")
//!     .execute();
//! # }
//! ```

use crate::document::{ApplicationItem, Document};
use crate::error::IoError;
use crate::format::Format;
use crate::parameters::{Parameters, ParametersProvider};
use crate::system::{ExportArgs, ImportArgs, System};
use std::path::PathBuf;
use std::sync::Arc;
use zcad_core::id::EntityId;
use zcad_core::messenger::Messenger;
use zcad_core::progress::Progress;

/// 导入构造器，由 [`System::import`] 创建
pub struct ImportOperation<'s, 'a> {
    system: &'s System,
    document: Option<&'a mut dyn Document>,
    args: ImportArgs<'a>,
}

impl<'s, 'a> ImportOperation<'s, 'a> {
    pub fn target_document(mut self, document: &'a mut dyn Document) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_filepath(mut self, filepath: impl Into<PathBuf>) -> Self {
        self.args.filepaths.push(filepath.into());
        self
    }

    pub fn with_filepaths<I, P>(mut self, filepaths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.args.filepaths.extend(filepaths.into_iter().map(Into::into));
        self
    }

    pub fn with_parameters_provider(mut self, provider: &'a dyn ParametersProvider) -> Self {
        self.args.parameters_provider = Some(provider);
        self
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.args.messenger = Some(messenger);
        self
    }

    pub fn with_task_progress(mut self, progress: &'a Progress) -> Self {
        self.args.progress = Some(progress);
        self
    }

    pub fn with_entity_post_process(mut self, process: impl Fn(EntityId, &Progress) + 'a) -> Self {
        self.args.entity_post_process = Some(Box::new(process));
        self
    }

    pub fn with_entity_post_process_required_if(mut self, required_if: impl Fn(Format) -> bool + 'a) -> Self {
        self.args.entity_post_process_required_if = Some(Box::new(required_if));
        self
    }

    /// 后处理在单个文件进度中所占比例及其步骤名
    pub fn with_entity_post_process_info_progress(mut self, size: f64, step: impl Into<String>) -> Self {
        self.args.entity_post_process_progress_size = size;
        self.args.entity_post_process_progress_step = step.into();
        self
    }

    /// 执行导入；未指定目标文档时报错并返回 `false`
    pub fn execute(self) -> bool {
        let Some(document) = self.document else {
            report_missing_document(self.args.messenger.as_deref());
            return false;
        };

        self.system.import_in_document(document, self.args)
    }
}

/// 导出构造器，由 [`System::export`] 创建
pub struct ExportOperation<'s, 'a> {
    system: &'s System,
    args: ExportArgs<'a>,
}

impl<'s, 'a> ExportOperation<'s, 'a> {
    pub fn target_file(mut self, filepath: impl Into<PathBuf>) -> Self {
        self.args.target_filepath = filepath.into();
        self
    }

    pub fn target_format(mut self, format: Format) -> Self {
        self.args.target_format = format;
        self
    }

    pub fn with_items(mut self, items: &'a [ApplicationItem]) -> Self {
        self.args.items = items;
        self
    }

    pub fn with_parameters(mut self, parameters: &'a Parameters) -> Self {
        self.args.parameters = Some(parameters);
        self
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.args.messenger = Some(messenger);
        self
    }

    pub fn with_task_progress(mut self, progress: &'a Progress) -> Self {
        self.args.progress = Some(progress);
        self
    }

    pub fn execute(self) -> bool {
        self.system.export_application_items(self.args)
    }
}

impl System {
    /// 开始构造一次导入
    pub fn import<'a>(&self) -> ImportOperation<'_, 'a> {
        ImportOperation {
            system: self,
            document: None,
            args: ImportArgs::default(),
        }
    }

    /// 开始构造一次导出
    pub fn export<'a>(&self) -> ExportOperation<'_, 'a> {
        ExportOperation {
            system: self,
            args: ExportArgs::default(),
        }
    }
}

fn report_missing_document(messenger: Option<&dyn Messenger>) {
    let err = IoError::NoTargetDocument;
    tracing::warn!("Import not started: {}", err);
    if let Some(messenger) = messenger {
        messenger.emit_error(&err.to_string());
    }
}
