//! 音频服务 - 业务能力层
//!
//! - ReportsReady → AudioRequested：设置选项并触发音频生成，确认已受理
//! - AudioRequested → AudioReady：等待生成完成；生成失败与仍在生成、超时分开处理

use std::time::Duration;

use tracing::{debug, info};

use crate::config::{AudioOptions, Config};
use crate::error::{ProbeError, SurfaceUnavailable};
use crate::infrastructure::{ArtifactKind, ArtifactRequest, ArtifactStatus, Panel, WaitSpec};
use crate::models::{StageResult, WorkItem};
use crate::services::interaction::{conclude, Interaction, StepContext, StepError, StepResult};
use crate::workflow::ItemCtx;

/// 音频服务
#[derive(Debug, Clone)]
pub struct AudioService {
    options: AudioOptions,
}

impl AudioService {
    pub fn new(config: &Config) -> Self {
        Self {
            options: config.audio.clone(),
        }
    }

    /// 触发音频生成
    pub async fn request(
        &self,
        ui: &Interaction<'_>,
        item: &WorkItem,
        ctx: &ItemCtx,
    ) -> Result<StageResult, SurfaceUnavailable> {
        let mut triggered = Vec::new();
        let outcome = self.request_audio(ui, item, ctx, &mut triggered).await;
        conclude(outcome, triggered)
    }

    async fn request_audio(
        &self,
        ui: &Interaction<'_>,
        item: &WorkItem,
        ctx: &ItemCtx,
        triggered: &mut Vec<String>,
    ) -> StepResult<()> {
        let surface = ui.surface;
        let kind = &ArtifactKind::Audio;
        let key = kind.trigger_key();

        if item.trigger_sent(&key) {
            debug!("{} 音频已触发过，只等待受理", ctx);
        } else {
            ui.ensure_panel(Panel::Studio).await?;
            ui.clear_obstruction().await?;

            info!(
                "{} 🎙️ 请求音频概览 (格式: {}, 长度: {})",
                ctx,
                self.options.format.as_deref().unwrap_or("默认"),
                self.options.length.as_deref().unwrap_or("默认")
            );
            let request = ArtifactRequest::Audio {
                format: self.options.format.clone(),
                length: self.options.length.clone(),
                focus_prompt: self.options.focus_prompt.clone(),
            };
            surface
                .request_artifact(&request)
                .await
                .step("请求音频概览")?;
            triggered.push(key);
        }

        ui.wait_for(
            "音频请求受理",
            ui.patience(ui.timeouts.request_accept_secs),
            move || async move { Ok::<_, ProbeError>(surface.artifact_status(kind).await?.is_accepted()) },
        )
        .await
    }

    /// 等待音频生成完成
    pub async fn await_ready(
        &self,
        ui: &Interaction<'_>,
        _item: &WorkItem,
        ctx: &ItemCtx,
    ) -> Result<StageResult, SurfaceUnavailable> {
        let outcome = self.await_audio(ui, ctx).await;
        conclude(outcome, Vec::new())
    }

    async fn await_audio(&self, ui: &Interaction<'_>, ctx: &ItemCtx) -> StepResult<()> {
        let surface = ui.surface;
        let kind = &ArtifactKind::Audio;
        let spec = WaitSpec::new(
            Duration::from_secs(ui.timeouts.audio_generation_secs),
            ui.timeouts.audio_poll_interval(),
        );
        info!(
            "{} ⏳ 等待音频生成 (每 {} 秒检查一次，最长 {} 秒)",
            ctx, ui.timeouts.audio_poll_interval_secs, ui.timeouts.audio_generation_secs
        );

        ui.wait_for("音频生成", spec, move || async move {
            let status = surface.artifact_status(kind).await?;
            debug!("{} 音频状态: {:?}", ctx, status);
            Ok::<_, ProbeError>(status.is_settled())
        })
        .await?;

        match surface.artifact_status(kind).await.step("读取音频状态")? {
            ArtifactStatus::Completed => {
                info!("{} ✓ 音频生成完成", ctx);
                Ok(())
            }
            ArtifactStatus::Failed(detail) => Err(StepError::Fatal(format!(
                "音频生成失败: {}",
                if detail.is_empty() { "界面报告失败" } else { detail.as_str() }
            ))),
            other => Err(StepError::Retry(format!("音频状态异常: {:?}", other))),
        }
    }
}
