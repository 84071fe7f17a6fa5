//! 阶段调度 - 流程层
//!
//! 核心职责：根据条目当前所处的阶段，决定调用哪个服务
//!
//! | 当前阶段         | 执行的步骤 | 成功后     |
//! |------------------|------------|------------|
//! | Discovered       | 上传资料   | SourcesAdded |
//! | SourcesAdded     | 请求报告   | ReportsRequested |
//! | ReportsRequested | 等待报告   | ReportsReady |
//! | ReportsReady     | 请求音频   | AudioRequested |
//! | AudioRequested   | 等待音频   | AudioReady |
//! | AudioReady       | 导出产物   | Exported |
//! | Exported         | 收尾校验   | Done |

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ObstructionPolicy, Timeouts};
use crate::error::SurfaceUnavailable;
use crate::infrastructure::Surface;
use crate::models::{Stage, StageResult, WorkItem};
use crate::services::{
    AudioService, ExportService, Interaction, ReportService, SourceUploadService, Transcoder,
};
use crate::workflow::ItemCtx;

/// 执行条目当前阶段的步骤
///
/// 失败以 `StageResult` 返回；只有界面不可达才返回 `Err`
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(
        &self,
        item: &WorkItem,
        ctx: &ItemCtx,
        cancel: &CancellationToken,
    ) -> Result<StageResult, SurfaceUnavailable>;
}

/// 基于 `Surface` 的完整流程
///
/// - 不持有界面，只借用编排层传入的引用
/// - 每次执行只调用一个服务
pub struct NotebookStages<'a> {
    surface: &'a dyn Surface,
    timeouts: Timeouts,
    obstruction: ObstructionPolicy,
    upload: SourceUploadService,
    reports: ReportService,
    audio: AudioService,
    export: ExportService,
}

impl<'a> NotebookStages<'a> {
    pub fn new(surface: &'a dyn Surface, config: &Config, transcoder: Box<dyn Transcoder>) -> Self {
        Self {
            surface,
            timeouts: config.timeouts.clone(),
            obstruction: config.obstruction.clone(),
            upload: SourceUploadService::new(),
            reports: ReportService::new(config),
            audio: AudioService::new(config),
            export: ExportService::new(config, transcoder),
        }
    }
}

#[async_trait]
impl StageExecutor for NotebookStages<'_> {
    async fn execute(
        &self,
        item: &WorkItem,
        ctx: &ItemCtx,
        cancel: &CancellationToken,
    ) -> Result<StageResult, SurfaceUnavailable> {
        let ui = Interaction::new(self.surface, &self.timeouts, &self.obstruction, cancel);

        match item.stage {
            Stage::Discovered => self.upload.upload(&ui, item, ctx).await,
            Stage::SourcesAdded => self.reports.request(&ui, item, ctx).await,
            Stage::ReportsRequested => self.reports.await_ready(&ui, item, ctx).await,
            Stage::ReportsReady => self.audio.request(&ui, item, ctx).await,
            Stage::AudioRequested => self.audio.await_ready(&ui, item, ctx).await,
            Stage::AudioReady => self.export.export(&ui, item, ctx).await,
            Stage::Exported => self.export.finalize(&ui, item, ctx).await,
            Stage::Done | Stage::Failed => Ok(StageResult::fatal(format!(
                "条目已处于终态 ({})，不应再执行",
                item.stage
            ))),
        }
    }
}
