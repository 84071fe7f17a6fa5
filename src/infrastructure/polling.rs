//! 同步原语
//!
//! 外部界面没有事件回调，只能反复观察。这里提供唯一的轮询循环：
//! 每次等待都有明确的上限，并且在两次观察之间响应取消信号。

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ObstructionPolicy;
use crate::error::{ProbeError, SurfaceUnavailable};
use crate::infrastructure::surface::Surface;

/// 一次等待的耐心：总时限 + 轮询间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSpec {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitSpec {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn secs(timeout_secs: u64, poll_interval: Duration) -> Self {
        Self::new(Duration::from_secs(timeout_secs), poll_interval)
    }
}

/// 等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied { elapsed: Duration },
    TimedOut { elapsed: Duration },
    Cancelled,
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied { .. })
    }
}

/// 反复执行 `predicate`，直到返回 true 或超时
///
/// - `NotReady` 视为"尚未满足"，继续轮询
/// - `Unavailable` 立即返回 `SurfaceUnavailable`
/// - 截止时刻会再观察一次，因此条件恰好在截止时满足也算成功
/// - 返回 `Satisfied` 时 `elapsed` 不会超过 `spec.timeout`
pub async fn await_condition<F, Fut>(
    mut predicate: F,
    spec: WaitSpec,
    cancel: &CancellationToken,
) -> Result<WaitOutcome, SurfaceUnavailable>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ProbeError>>,
{
    let start = Instant::now();
    let deadline = start + spec.timeout;

    loop {
        if cancel.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }

        // 单次观察不能越过截止时刻；剩余为 0 时仍会先轮询一次，立即返回的结果照常生效
        let budget = deadline.saturating_duration_since(Instant::now());
        match timeout(budget, predicate()).await {
            Ok(Ok(true)) => {
                return Ok(WaitOutcome::Satisfied {
                    elapsed: start.elapsed(),
                })
            }
            Ok(Ok(false)) => {}
            Ok(Err(ProbeError::NotReady(reason))) => debug!("条件暂未满足: {}", reason),
            Ok(Err(ProbeError::Unavailable(reason))) => {
                return Err(SurfaceUnavailable::new(reason))
            }
            Err(_) => debug!("单次观察超过 {:?}，视为未满足", budget),
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(WaitOutcome::TimedOut {
                elapsed: start.elapsed(),
            });
        }

        let nap = spec.poll_interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            _ = sleep(nap) => {}
        }
    }
}

/// 遮挡层处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstructionOutcome {
    /// 没有遮挡，或在宽限期内自行消失
    Cleared,
    /// 第 `attempts` 次强制关闭后消失
    Forced { attempts: u32 },
    /// 强制关闭次数用尽仍然存在，调用方应直接强制交互
    Persisting { attempts: u32 },
    Cancelled,
}

/// 在交互之前等待遮挡层消失
///
/// 先在宽限期内等待；仍存在时最多强制关闭 `max_forced_attempts` 次。
/// 返回 `Persisting` 时不再等待，由调用方强制执行交互
pub async fn dismiss_transient_obstruction(
    surface: &dyn Surface,
    policy: &ObstructionPolicy,
    cancel: &CancellationToken,
) -> Result<ObstructionOutcome, SurfaceUnavailable> {
    let clear = move || async move { surface.obstruction_present().await.map(|present| !present) };

    match await_condition(
        clear,
        WaitSpec::new(policy.grace(), policy.poll_interval()),
        cancel,
    )
    .await?
    {
        WaitOutcome::Satisfied { .. } => return Ok(ObstructionOutcome::Cleared),
        WaitOutcome::Cancelled => return Ok(ObstructionOutcome::Cancelled),
        WaitOutcome::TimedOut { elapsed } => {
            debug!("遮挡层 {:?} 内未消失，尝试强制关闭", elapsed)
        }
    }

    for attempt in 1..=policy.max_forced_attempts {
        if let Err(err) = surface.force_dismiss_obstruction().await {
            let reason = err.escalate()?;
            debug!("第 {} 次强制关闭遮挡层失败: {}", attempt, reason);
        }

        let settled = await_condition(
            clear,
            WaitSpec::new(policy.poll_interval(), policy.poll_interval()),
            cancel,
        )
        .await?;
        match settled {
            WaitOutcome::Satisfied { .. } => {
                debug!("第 {} 次强制关闭后遮挡层已消失", attempt);
                return Ok(ObstructionOutcome::Forced { attempts: attempt });
            }
            WaitOutcome::Cancelled => return Ok(ObstructionOutcome::Cancelled),
            WaitOutcome::TimedOut { .. } => {}
        }
    }

    warn!(
        "⚠️ 遮挡层在 {} 次强制关闭后仍然存在，强制执行交互",
        policy.max_forced_attempts
    );
    Ok(ObstructionOutcome::Persisting {
        attempts: policy.max_forced_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn spec(timeout_secs: u64, interval_secs: u64) -> WaitSpec {
        WaitSpec::new(
            Duration::from_secs(timeout_secs),
            Duration::from_secs(interval_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn satisfied_when_condition_turns_true_before_deadline() {
        let start = Instant::now();
        let cancel = CancellationToken::new();
        let outcome = await_condition(
            || async move { Ok(start.elapsed() >= Duration::from_secs(3)) },
            spec(5, 1),
            &cancel,
        )
        .await
        .unwrap();

        match outcome {
            WaitOutcome::Satisfied { elapsed } => {
                assert!(elapsed >= Duration::from_secs(3));
                assert!(elapsed <= Duration::from_secs(5));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_the_boundary() {
        let evaluations = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let outcome = await_condition(
            || {
                evaluations.fetch_add(1, Ordering::SeqCst);
                async { Ok(false) }
            },
            spec(5, 2),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            WaitOutcome::TimedOut {
                elapsed: Duration::from_secs(5)
            }
        );
        // t = 0, 2, 4, 5
        assert_eq!(evaluations.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn condition_true_exactly_at_deadline_counts() {
        let start = Instant::now();
        let cancel = CancellationToken::new();
        let outcome = await_condition(
            || async move { Ok(start.elapsed() >= Duration::from_secs(5)) },
            spec(5, 2),
            &cancel,
        )
        .await
        .unwrap();
        assert!(outcome.is_satisfied());
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_errors_keep_polling() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let outcome = await_condition(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProbeError::not_ready("按钮未出现"))
                    } else {
                        Ok(true)
                    }
                }
            },
            spec(10, 1),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            WaitOutcome::Satisfied {
                elapsed: Duration::from_secs(2)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_aborts_immediately() {
        let cancel = CancellationToken::new();
        let err = await_condition(
            || async { Err(ProbeError::unavailable("websocket closed")) },
            spec(10, 1),
            &cancel,
        )
        .await
        .unwrap_err();
        assert_eq!(err.reason, "websocket closed");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let outcome = await_condition(|| async { Ok(false) }, spec(60, 10), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_predicate_is_bounded() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let outcome = await_condition(
            || async {
                std::future::pending::<()>().await;
                Ok(true)
            },
            spec(3, 1),
            &cancel,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, WaitOutcome::TimedOut { .. }));
        assert!(start.elapsed() <= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_predicate_never_succeeds_past_the_deadline() {
        let start = Instant::now();
        let cancel = CancellationToken::new();
        let outcome = await_condition(
            || async move {
                sleep(Duration::from_millis(800)).await;
                Ok(start.elapsed() >= Duration::from_secs(3))
            },
            spec(4, 1),
            &cancel,
        )
        .await
        .unwrap();

        // 第三次观察从 3.6s 开始，到 4s 被截断
        assert_eq!(
            outcome,
            WaitOutcome::TimedOut {
                elapsed: Duration::from_secs(4)
            }
        );
    }
}
