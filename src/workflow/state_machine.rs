//! 条目状态机 - 流程层
//!
//! `advance` 执行条目当前阶段一次，并根据结果推进、重试或判定失败。
//! 条目只会沿固定顺序前进；重试停留在同一阶段；终态不再变化。

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::SurfaceUnavailable;
use crate::models::{RetryPolicies, Stage, StageResult, WorkItem};
use crate::workflow::{ItemCtx, StageExecutor};

/// 一次 `advance` 造成的变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Advanced { from: Stage, to: Stage },
    /// 留在原阶段，等待 `delay` 后再试
    Retrying {
        stage: Stage,
        attempt: u32,
        delay: Duration,
    },
    Failed { stage: Stage, reason: String },
    /// 条目已是终态
    Unchanged,
    /// 收到取消信号；只有阶段自身报告被取消时才会出现，失败结果照常记录
    Interrupted,
}

/// 推进条目一步
///
/// 返回 `Err` 时条目已被标记为失败，调用方应停止整个运行
pub async fn advance(
    item: &mut WorkItem,
    executor: &dyn StageExecutor,
    ctx: &ItemCtx,
    policies: &RetryPolicies,
    cancel: &CancellationToken,
) -> Result<Transition, SurfaceUnavailable> {
    if item.is_terminal() {
        return Ok(Transition::Unchanged);
    }
    if cancel.is_cancelled() {
        return Ok(Transition::Interrupted);
    }

    let stage = item.stage;
    let policy = policies.for_stage(stage);
    let failures = item.attempts(stage);
    if policy.is_exhausted(failures) {
        let reason = exhausted_reason(stage, failures, item.last_error.as_deref());
        return Ok(fail(item, ctx, reason));
    }

    info!("{} ▶ {} ({})", ctx, stage.step_label(), stage);
    let result = match executor.execute(item, ctx, cancel).await {
        Ok(result) => result,
        Err(err) => {
            error!("{} ❌ 外部界面不可达: {}", ctx, err.reason);
            item.fail(err.to_string());
            return Err(err);
        }
    };

    match result {
        StageResult::Success => {
            let Some(next) = stage.next() else {
                return Ok(Transition::Unchanged);
            };
            item.advance_to(next);
            info!("{} ✓ {} → {}", ctx, stage, next);
            Ok(Transition::Advanced {
                from: stage,
                to: next,
            })
        }
        StageResult::RetryableFailure { reason, triggered } => {
            let attempt = item.record_retry(reason.clone(), triggered);
            if policy.is_exhausted(attempt) {
                return Ok(fail(item, ctx, exhausted_reason(stage, attempt, Some(&reason))));
            }

            let delay = policy.delay_for(attempt);
            warn!(
                "{} ⚠️ {} 失败 (第 {}/{} 次): {}，{:?} 后重试",
                ctx,
                stage.step_label(),
                attempt,
                policy.max_attempts,
                reason,
                delay
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(Transition::Interrupted),
                _ = tokio::time::sleep(delay) => {}
            }
            Ok(Transition::Retrying {
                stage,
                attempt,
                delay,
            })
        }
        StageResult::FatalFailure(reason) => Ok(fail(item, ctx, reason)),
        StageResult::Interrupted => {
            warn!("{} ⏹ 运行已取消，停在 {}", ctx, stage);
            Ok(Transition::Interrupted)
        }
    }
}

fn exhausted_reason(stage: Stage, failures: u32, last: Option<&str>) -> String {
    format!(
        "{} 重试 {} 次后仍失败: {}",
        stage.step_label(),
        failures,
        last.unwrap_or("未知错误")
    )
}

fn fail(item: &mut WorkItem, ctx: &ItemCtx, reason: String) -> Transition {
    let stage = item.stage;
    error!("{} ❌ 在 {} 阶段失败: {}", ctx, stage, reason);
    item.fail(reason.clone());
    Transition::Failed { stage, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RetryPolicy, SourceDocument};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// 按脚本依次返回结果；脚本用完后一律成功
    struct Scripted {
        results: Mutex<VecDeque<Result<StageResult, SurfaceUnavailable>>>,
        calls: Mutex<Vec<Stage>>,
    }

    impl Scripted {
        fn new(results: Vec<Result<StageResult, SurfaceUnavailable>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Stage> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StageExecutor for Scripted {
        async fn execute(
            &self,
            item: &WorkItem,
            _ctx: &ItemCtx,
            _cancel: &CancellationToken,
        ) -> Result<StageResult, SurfaceUnavailable> {
            self.calls.lock().unwrap().push(item.stage);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(StageResult::Success))
        }
    }

    fn setup() -> (WorkItem, ItemCtx) {
        let item = WorkItem::new(SourceDocument::chapter(
            "Book",
            "Chapter 01",
            PathBuf::from("Chapter_01.pdf"),
        ));
        let ctx = ItemCtx::new(1, 1, &item, Path::new("/tmp/run"));
        (item, ctx)
    }

    fn policies(max_attempts: u32) -> RetryPolicies {
        RetryPolicies::uniform(RetryPolicy::fixed(max_attempts, Duration::from_secs(5)))
    }

    #[tokio::test(start_paused = true)]
    async fn success_moves_to_next_stage() {
        let (mut item, ctx) = setup();
        let executor = Scripted::new(vec![]);
        let cancel = CancellationToken::new();

        let t = advance(&mut item, &executor, &ctx, &policies(3), &cancel)
            .await
            .unwrap();
        assert_eq!(
            t,
            Transition::Advanced {
                from: Stage::Discovered,
                to: Stage::SourcesAdded
            }
        );
        assert_eq!(item.stage, Stage::SourcesAdded);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stays_in_stage_and_records_triggers() {
        let (mut item, ctx) = setup();
        let executor = Scripted::new(vec![Ok(StageResult::retry_after_trigger(
            "索引超时",
            vec!["workspace".into()],
        ))]);
        let cancel = CancellationToken::new();

        let t = advance(&mut item, &executor, &ctx, &policies(3), &cancel)
            .await
            .unwrap();
        assert_eq!(
            t,
            Transition::Retrying {
                stage: Stage::Discovered,
                attempt: 1,
                delay: Duration::from_secs(5)
            }
        );
        assert_eq!(item.stage, Stage::Discovered);
        assert!(item.trigger_sent("workspace"));
        assert_eq!(item.last_error.as_deref(), Some("索引超时"));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_last_allowed_attempt() {
        let (mut item, ctx) = setup();
        let executor = Scripted::new(vec![
            Ok(StageResult::retryable("慢")),
            Ok(StageResult::retryable("慢")),
            Ok(StageResult::Success),
        ]);
        let cancel = CancellationToken::new();
        let policies = policies(3);

        for _ in 0..3 {
            advance(&mut item, &executor, &ctx, &policies, &cancel)
                .await
                .unwrap();
        }
        assert_eq!(item.stage, Stage::SourcesAdded);
        assert_eq!(item.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_retries_fails_item() {
        let (mut item, ctx) = setup();
        let executor = Scripted::new(vec![
            Ok(StageResult::retryable("慢")),
            Ok(StageResult::retryable("还是慢")),
        ]);
        let cancel = CancellationToken::new();
        let policies = policies(2);

        advance(&mut item, &executor, &ctx, &policies, &cancel)
            .await
            .unwrap();
        let t = advance(&mut item, &executor, &ctx, &policies, &cancel)
            .await
            .unwrap();

        assert!(matches!(t, Transition::Failed { stage: Stage::Discovered, .. }));
        assert_eq!(item.stage, Stage::Failed);
        assert!(item.last_error.as_deref().unwrap().contains("还是慢"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_is_terminal() {
        let (mut item, ctx) = setup();
        let executor = Scripted::new(vec![Ok(StageResult::fatal("源文件不存在"))]);
        let cancel = CancellationToken::new();

        advance(&mut item, &executor, &ctx, &policies(3), &cancel)
            .await
            .unwrap();
        assert_eq!(item.stage, Stage::Failed);

        let t = advance(&mut item, &executor, &ctx, &policies(3), &cancel)
            .await
            .unwrap();
        assert_eq!(t, Transition::Unchanged);
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn surface_unavailable_fails_item_and_propagates() {
        let (mut item, ctx) = setup();
        let executor = Scripted::new(vec![Err(SurfaceUnavailable::new("websocket closed"))]);
        let cancel = CancellationToken::new();

        let err = advance(&mut item, &executor, &ctx, &policies(3), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.reason, "websocket closed");
        assert_eq!(item.stage, Stage::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_does_not_execute() {
        let (mut item, ctx) = setup();
        let executor = Scripted::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let t = advance(&mut item, &executor, &ctx, &policies(3), &cancel)
            .await
            .unwrap();
        assert_eq!(t, Transition::Interrupted);
        assert!(executor.calls().is_empty());
        assert_eq!(item.stage, Stage::Discovered);
    }

    #[tokio::test(start_paused = true)]
    async fn stages_never_regress() {
        let (mut item, ctx) = setup();
        let executor = Scripted::new(vec![
            Ok(StageResult::Success),
            Ok(StageResult::retryable("格式列表未加载")),
            Ok(StageResult::Success),
            Ok(StageResult::Success),
        ]);
        let cancel = CancellationToken::new();
        let policies = policies(3);

        while !item.is_terminal() {
            advance(&mut item, &executor, &ctx, &policies, &cancel)
                .await
                .unwrap();
        }
        assert_eq!(item.stage, Stage::Done);
        for pair in item.history().windows(2) {
            assert!(pair[0] <= pair[1], "{:?} 之后出现了 {:?}", pair[0], pair[1]);
        }
    }

    /// 执行期间触发取消，然后返回给定结果
    struct CancelsThen(StageResult);

    #[async_trait]
    impl StageExecutor for CancelsThen {
        async fn execute(
            &self,
            _item: &WorkItem,
            _ctx: &ItemCtx,
            cancel: &CancellationToken,
        ) -> Result<StageResult, SurfaceUnavailable> {
            cancel.cancel();
            Ok(self.0.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_result_stands_even_when_cancelled() {
        let (mut item, ctx) = setup();
        let executor = CancelsThen(StageResult::fatal("报告格式未提供: Study Guide"));
        let cancel = CancellationToken::new();

        let t = advance(&mut item, &executor, &ctx, &policies(3), &cancel)
            .await
            .unwrap();
        assert!(matches!(t, Transition::Failed { stage: Stage::Discovered, .. }));
        assert_eq!(item.stage, Stage::Failed);
        assert_eq!(
            item.last_error.as_deref(),
            Some("报告格式未提供: Study Guide")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_is_recorded_before_cancellation_stops_the_wait() {
        let (mut item, ctx) = setup();
        let executor = CancelsThen(StageResult::retry_after_trigger(
            "索引超时",
            vec!["workspace".into()],
        ));
        let cancel = CancellationToken::new();

        let t = advance(&mut item, &executor, &ctx, &policies(3), &cancel)
            .await
            .unwrap();
        assert_eq!(t, Transition::Interrupted);
        assert_eq!(item.attempts(Stage::Discovered), 1);
        assert!(item.trigger_sent("workspace"));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_stage_is_not_counted() {
        let (mut item, ctx) = setup();
        let executor = CancelsThen(StageResult::Interrupted);
        let cancel = CancellationToken::new();

        let t = advance(&mut item, &executor, &ctx, &policies(3), &cancel)
            .await
            .unwrap();
        assert_eq!(t, Transition::Interrupted);
        assert_eq!(item.stage, Stage::Discovered);
        assert_eq!(item.attempts(Stage::Discovered), 0);
        assert_eq!(item.last_error, None);
    }
}
