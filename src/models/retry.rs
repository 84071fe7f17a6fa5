//! 重试策略
//!
//! 每个阶段有自己的最大尝试次数和退避方式，属于配置而不是运行状态

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::stage::Stage;

/// 退避方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// 不等待
    None,
    /// 固定间隔
    Fixed { delay_ms: u64 },
    /// 指数退避：base * 2^(n-1)，不超过 cap
    Exponential { base_ms: u64, cap_ms: u64 },
}

/// 单个阶段的重试策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最多失败几次（含第一次）之后判定为失败
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base_ms: 2_000,
                cap_ms: 30_000,
            },
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed {
                delay_ms: delay.as_millis() as u64,
            },
        }
    }

    /// 已失败 `failures` 次时是否还允许再执行
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }

    /// 第 `failures` 次失败之后的等待时间
    pub fn delay_for(&self, failures: u32) -> Duration {
        match &self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            Backoff::Exponential { base_ms, cap_ms } => {
                let exponent = failures.saturating_sub(1).min(20);
                let delay = base_ms.saturating_mul(1u64 << exponent);
                Duration::from_millis(delay.min(*cap_ms))
            }
        }
    }
}

/// 各阶段的重试策略；未单独配置的阶段使用 `default`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicies {
    pub default: RetryPolicy,
    pub upload: Option<RetryPolicy>,
    pub request_reports: Option<RetryPolicy>,
    pub await_reports: Option<RetryPolicy>,
    pub request_audio: Option<RetryPolicy>,
    pub await_audio: Option<RetryPolicy>,
    pub export: Option<RetryPolicy>,
    pub finalize: Option<RetryPolicy>,
}

impl RetryPolicies {
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            default: policy,
            ..Default::default()
        }
    }

    /// 第一个 `max_attempts` 为 0 的配置项名称
    pub fn zero_attempt_stage(&self) -> Option<&'static str> {
        let overrides = [
            ("upload", &self.upload),
            ("request_reports", &self.request_reports),
            ("await_reports", &self.await_reports),
            ("request_audio", &self.request_audio),
            ("await_audio", &self.await_audio),
            ("export", &self.export),
            ("finalize", &self.finalize),
        ];
        if self.default.max_attempts == 0 {
            return Some("default");
        }
        overrides
            .into_iter()
            .find(|(_, policy)| policy.as_ref().is_some_and(|p| p.max_attempts == 0))
            .map(|(name, _)| name)
    }

    /// 在 `stage` 执行的步骤所使用的策略
    pub fn for_stage(&self, stage: Stage) -> &RetryPolicy {
        let specific = match stage {
            Stage::Discovered => &self.upload,
            Stage::SourcesAdded => &self.request_reports,
            Stage::ReportsRequested => &self.await_reports,
            Stage::ReportsReady => &self.request_audio,
            Stage::AudioRequested => &self.await_audio,
            Stage::AudioReady => &self.export,
            Stage::Exported => &self.finalize,
            Stage::Done | Stage::Failed => return &self.default,
        };
        specific.as_ref().unwrap_or(&self.default)
    }
}
