//! 资料上传服务 - 业务能力层
//!
//! Discovered → SourcesAdded：新建工作区、上传源文件、等待索引完成。
//! 新建工作区和提交文件都不可撤销，重试时跳过已经做过的部分。

use tracing::{info, warn};

use crate::error::SurfaceUnavailable;
use crate::models::{StageResult, WorkItem};
use crate::services::interaction::{conclude, Interaction, StepContext, StepError, StepResult};
use crate::workflow::ItemCtx;

/// 新建工作区的触发键
pub const WORKSPACE_TRIGGER: &str = "workspace";

pub fn source_trigger(path: &std::path::Path) -> String {
    format!("source:{}", path.display())
}

/// 资料上传服务
#[derive(Debug, Clone, Default)]
pub struct SourceUploadService;

impl SourceUploadService {
    pub fn new() -> Self {
        Self
    }

    pub async fn upload(
        &self,
        ui: &Interaction<'_>,
        item: &WorkItem,
        ctx: &ItemCtx,
    ) -> Result<StageResult, SurfaceUnavailable> {
        let mut triggered = Vec::new();
        let outcome = self.run(ui, item, ctx, &mut triggered).await;
        conclude(outcome, triggered)
    }

    async fn run(
        &self,
        ui: &Interaction<'_>,
        item: &WorkItem,
        ctx: &ItemCtx,
        triggered: &mut Vec<String>,
    ) -> StepResult<()> {
        let surface = ui.surface;

        for path in &item.document.paths {
            if !path.is_file() {
                return Err(StepError::Fatal(format!(
                    "源文件不存在: {}",
                    path.display()
                )));
            }
        }

        let fresh_workspace = !item.trigger_sent(WORKSPACE_TRIGGER);
        if fresh_workspace {
            info!("{} 📒 新建工作区: {}", ctx, item.title);
            ui.clear_obstruction().await?;
            surface.create_workspace().await.step("新建工作区")?;
            triggered.push(WORKSPACE_TRIGGER.to_string());
        }

        ui.wait_for(
            "工作区打开",
            ui.patience(ui.timeouts.workspace_open_secs),
            move || surface.workspace_open(),
        )
        .await?;

        if fresh_workspace {
            // 重命名失败不影响后续流程
            if let Err(err) = surface.name_workspace(&item.title).await {
                let reason = err.escalate()?;
                warn!("{} ⚠️ 工作区重命名失败，保留默认标题: {}", ctx, reason);
            }
        }

        for path in &item.document.paths {
            let key = source_trigger(path);
            if item.trigger_sent(&key) {
                continue;
            }
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            info!("{} 📤 上传资料: {}", ctx, name);
            ui.clear_obstruction().await?;
            surface
                .submit_source(path)
                .await
                .step(&format!("上传 {}", name))?;
            triggered.push(key);
        }

        for path in &item.document.paths {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            ui.wait_for(
                &format!("资料 {} 索引", name),
                ui.patience(ui.timeouts.source_index_secs),
                move || surface.source_indexed(path),
            )
            .await?;
        }

        info!("{} ✓ {} 个资料已就绪", ctx, item.document.paths.len());
        Ok(())
    }
}
