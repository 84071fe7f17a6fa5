//! 单次阶段执行的结果，交给状态机立即消费

/// 阶段执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    /// 阶段完成，进入下一阶段
    Success,
    /// 可重试的失败；`triggered` 记录本次已经执行过的不可逆动作，重试时跳过
    RetryableFailure {
        reason: String,
        triggered: Vec<String>,
    },
    /// 条目级不可恢复的失败
    FatalFailure(String),
    /// 等待期间收到取消信号，不计入重试
    Interrupted,
}

impl StageResult {
    pub fn retryable(reason: impl Into<String>) -> Self {
        StageResult::RetryableFailure {
            reason: reason.into(),
            triggered: Vec::new(),
        }
    }

    pub fn retry_after_trigger(reason: impl Into<String>, triggered: Vec<String>) -> Self {
        StageResult::RetryableFailure {
            reason: reason.into(),
            triggered,
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        StageResult::FatalFailure(reason.into())
    }
}
