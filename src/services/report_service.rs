//! 报告服务 - 业务能力层
//!
//! - SourcesAdded → ReportsRequested：逐个格式触发生成，并确认界面已受理
//! - ReportsRequested → ReportsReady：等待全部报告完成或失败
//!
//! 可用格式由界面决定，随时可能变化。请求的格式不在列表中时直接判定失败，
//! 不会悄悄跳过。

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ProbeError, SurfaceUnavailable};
use crate::infrastructure::{ArtifactKind, ArtifactRequest, ArtifactStatus, Panel, Surface};
use crate::models::{StageResult, WorkItem};
use crate::services::interaction::{conclude, Interaction, StepContext, StepError, StepResult};
use crate::workflow::ItemCtx;

/// 报告服务
#[derive(Debug, Clone)]
pub struct ReportService {
    formats: Vec<String>,
    prompt: String,
    accept_partial: bool,
}

impl ReportService {
    pub fn new(config: &Config) -> Self {
        Self {
            formats: config.report_formats.clone(),
            prompt: config.report_prompt.clone(),
            accept_partial: config.accept_partial_reports,
        }
    }

    /// 触发所有格式的报告生成
    pub async fn request(
        &self,
        ui: &Interaction<'_>,
        item: &WorkItem,
        ctx: &ItemCtx,
    ) -> Result<StageResult, SurfaceUnavailable> {
        let mut triggered = Vec::new();
        let outcome = self.request_all(ui, item, ctx, &mut triggered).await;
        conclude(outcome, triggered)
    }

    async fn request_all(
        &self,
        ui: &Interaction<'_>,
        item: &WorkItem,
        ctx: &ItemCtx,
        triggered: &mut Vec<String>,
    ) -> StepResult<()> {
        let surface = ui.surface;
        ui.ensure_panel(Panel::Studio).await?;

        for format in &self.formats {
            let kind = ArtifactKind::Report(format.clone());
            let key = kind.trigger_key();

            if item.trigger_sent(&key) {
                debug!("{} 报告「{}」已触发过，只等待受理", ctx, format);
            } else {
                ui.clear_obstruction().await?;
                ui.ensure_panel(Panel::ReportPicker).await?;
                self.ensure_offered(ui, format).await?;

                info!("{} 📝 请求报告: {}", ctx, format);
                let request = ArtifactRequest::Report {
                    format: format.clone(),
                    prompt: self.prompt.clone(),
                };
                surface
                    .request_artifact(&request)
                    .await
                    .step(&format!("请求报告「{}」", format))?;
                triggered.push(key);
            }

            let kind = &kind;
            ui.wait_for(
                &format!("报告「{}」受理", format),
                ui.patience(ui.timeouts.request_accept_secs),
                move || async move { Ok::<_, ProbeError>(surface.artifact_status(kind).await?.is_accepted()) },
            )
            .await?;
        }

        info!("{} ✓ 已请求 {} 个报告", ctx, self.formats.len());
        Ok(())
    }

    /// 等待格式出现在对话框中；超时后仍不在列表里则判定为不可用
    async fn ensure_offered(&self, ui: &Interaction<'_>, format: &str) -> StepResult<()> {
        let surface = ui.surface;
        let waited = ui
            .wait_for(
                &format!("格式「{}」出现", format),
                ui.patience(ui.timeouts.format_offer_secs),
                move || async move {
                    let offered = surface.offered_formats().await?;
                    Ok::<_, ProbeError>(offered.iter().any(|f| f == format))
                },
            )
            .await;

        match waited {
            Ok(()) => Ok(()),
            Err(StepError::Retry(reason)) => {
                let offered = surface.offered_formats().await.step("读取可用格式")?;
                if offered.is_empty() {
                    // 列表还没加载出来，不能断定格式不存在
                    Err(StepError::Retry(reason))
                } else {
                    Err(StepError::Fatal(format!(
                        "报告格式未提供: {} (可用格式: {})",
                        format,
                        offered.join(", ")
                    )))
                }
            }
            Err(other) => Err(other),
        }
    }

    /// 等待所有报告完成
    pub async fn await_ready(
        &self,
        ui: &Interaction<'_>,
        _item: &WorkItem,
        ctx: &ItemCtx,
    ) -> Result<StageResult, SurfaceUnavailable> {
        let outcome = self.await_all(ui, ctx).await;
        conclude(outcome, Vec::new())
    }

    async fn await_all(&self, ui: &Interaction<'_>, ctx: &ItemCtx) -> StepResult<()> {
        let surface = ui.surface;
        let formats = &self.formats;
        info!("{} ⏳ 等待 {} 个报告生成...", ctx, formats.len());

        let settled = ui
            .wait_for(
                "报告生成",
                ui.patience(ui.timeouts.report_generation_secs),
                move || async move {
                    let statuses = collect_statuses(surface, formats).await?;
                    Ok::<_, ProbeError>(statuses.iter().all(|(_, s)| s.is_settled()))
                },
            )
            .await;

        if let Err(err) = settled {
            let StepError::Retry(reason) = err else {
                return Err(err);
            };
            let statuses = collect_statuses(surface, formats)
                .await
                .step("读取报告状态")?;
            let pending: Vec<&str> = statuses
                .iter()
                .filter(|(_, s)| !s.is_settled())
                .map(|(f, _)| f.as_str())
                .collect();
            return Err(StepError::Retry(format!(
                "{}，未完成: {}",
                reason,
                pending.join(", ")
            )));
        }

        let statuses = collect_statuses(surface, formats)
            .await
            .step("读取报告状态")?;

        let failed: Vec<String> = statuses
            .iter()
            .filter_map(|(format, status)| match status {
                ArtifactStatus::Failed(detail) if detail.is_empty() => Some(format.clone()),
                ArtifactStatus::Failed(detail) => Some(format!("{} ({})", format, detail)),
                _ => None,
            })
            .collect();

        if failed.is_empty() {
            info!("{} ✓ 报告全部完成", ctx);
            return Ok(());
        }

        let completed = statuses.len() - failed.len();
        if self.accept_partial && completed > 0 {
            warn!(
                "{} ⚠️ 部分报告生成失败，按配置继续: {}",
                ctx,
                failed.join(", ")
            );
            return Ok(());
        }

        Err(StepError::Retry(format!(
            "报告生成失败 ({}/{}): {}",
            failed.len(),
            statuses.len(),
            failed.join(", ")
        )))
    }
}

async fn collect_statuses(
    surface: &dyn Surface,
    formats: &[String],
) -> Result<Vec<(String, ArtifactStatus)>, ProbeError> {
    let mut statuses = Vec::with_capacity(formats.len());
    for format in formats {
        let status = surface
            .artifact_status(&ArtifactKind::Report(format.clone()))
            .await?;
        statuses.push((format.clone(), status));
    }
    Ok(statuses)
}
