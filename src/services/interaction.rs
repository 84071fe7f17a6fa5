//! 阶段内的交互工具
//!
//! 每个阶段都由"动作 + 有上限的等待"组成。`StepError` 让服务内部可以直接用 `?`，
//! 最后统一转换成 `StageResult`（或运行级的 `SurfaceUnavailable`）。

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ObstructionPolicy, Timeouts};
use crate::error::{ProbeError, SurfaceUnavailable};
use crate::infrastructure::{
    await_condition, dismiss_transient_obstruction, ObstructionOutcome, Panel, Surface,
    WaitOutcome, WaitSpec,
};
use crate::models::StageResult;

/// 阶段内部的失败
#[derive(Debug)]
pub enum StepError {
    Retry(String),
    Fatal(String),
    /// 运行被取消，不是条目本身的失败
    Cancelled,
    Surface(SurfaceUnavailable),
}

pub type StepResult<T> = Result<T, StepError>;

impl From<ProbeError> for StepError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::NotReady(reason) => StepError::Retry(reason),
            ProbeError::Unavailable(reason) => StepError::Surface(SurfaceUnavailable::new(reason)),
        }
    }
}

impl From<SurfaceUnavailable> for StepError {
    fn from(err: SurfaceUnavailable) -> Self {
        StepError::Surface(err)
    }
}

/// 把阶段内部结果转换为状态机能消费的结果，`triggered` 是本次已执行的触发动作
pub fn conclude(
    result: StepResult<()>,
    triggered: Vec<String>,
) -> Result<StageResult, SurfaceUnavailable> {
    match result {
        Ok(()) => Ok(StageResult::Success),
        Err(StepError::Retry(reason)) => Ok(StageResult::retry_after_trigger(reason, triggered)),
        Err(StepError::Fatal(reason)) => Ok(StageResult::fatal(reason)),
        Err(StepError::Cancelled) => Ok(StageResult::Interrupted),
        Err(StepError::Surface(err)) => Err(err),
    }
}

/// 给动作失败加上说明
pub trait StepContext<T> {
    fn step(self, what: &str) -> StepResult<T>;
}

impl<T> StepContext<T> for Result<T, ProbeError> {
    fn step(self, what: &str) -> StepResult<T> {
        self.map_err(|err| match err {
            ProbeError::NotReady(reason) => StepError::Retry(format!("{}失败: {}", what, reason)),
            ProbeError::Unavailable(reason) => {
                StepError::Surface(SurfaceUnavailable::new(reason))
            }
        })
    }
}

/// 一次阶段执行期间使用的界面句柄
pub struct Interaction<'a> {
    pub surface: &'a dyn Surface,
    pub timeouts: &'a Timeouts,
    pub obstruction: &'a ObstructionPolicy,
    pub cancel: &'a CancellationToken,
}

impl<'a> Interaction<'a> {
    pub fn new(
        surface: &'a dyn Surface,
        timeouts: &'a Timeouts,
        obstruction: &'a ObstructionPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            surface,
            timeouts,
            obstruction,
            cancel,
        }
    }

    /// 常规轮询间隔下等待 `timeout_secs` 秒
    pub fn patience(&self, timeout_secs: u64) -> WaitSpec {
        WaitSpec::secs(timeout_secs, self.timeouts.poll_interval())
    }

    /// 等待条件成立；超时按可重试处理，取消单独上报
    pub async fn wait_for<F, Fut>(&self, what: &str, spec: WaitSpec, predicate: F) -> StepResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ProbeError>>,
    {
        match await_condition(predicate, spec, self.cancel).await? {
            WaitOutcome::Satisfied { elapsed } => {
                debug!("{}完成，用时 {:?}", what, elapsed);
                Ok(())
            }
            WaitOutcome::TimedOut { elapsed } => Err(StepError::Retry(format!(
                "等待{}超时 ({} 秒)",
                what,
                elapsed.as_secs()
            ))),
            WaitOutcome::Cancelled => Err(StepError::Cancelled),
        }
    }

    /// 交互之前先处理遮挡层；无法清除时照常继续（强制交互）
    pub async fn clear_obstruction(&self) -> StepResult<()> {
        match dismiss_transient_obstruction(self.surface, self.obstruction, self.cancel).await? {
            ObstructionOutcome::Cleared => {}
            ObstructionOutcome::Forced { attempts } => {
                debug!("遮挡层在第 {} 次强制关闭后消失", attempts)
            }
            ObstructionOutcome::Persisting { attempts } => {
                warn!("⚠️ 遮挡层 {} 次强制关闭后仍存在，继续执行", attempts)
            }
            ObstructionOutcome::Cancelled => return Err(StepError::Cancelled),
        }
        Ok(())
    }

    /// 确保面板已打开
    pub async fn ensure_panel(&self, panel: Panel) -> StepResult<()> {
        let surface = self.surface;
        if surface.panel_open(panel).await.step(&format!("检查{}", panel))? {
            return Ok(());
        }
        self.clear_obstruction().await?;
        surface
            .open_panel(panel)
            .await
            .step(&format!("打开{}", panel))?;
        self.wait_for(
            &format!("{}打开", panel),
            self.patience(self.timeouts.panel_secs),
            move || surface.panel_open(panel),
        )
        .await
    }
}
