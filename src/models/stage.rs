//! 流程阶段
//!
//! 阶段表示条目"已经到达的里程碑"，只能沿固定顺序前进：
//! Discovered → SourcesAdded → ReportsRequested → ReportsReady
//! → AudioRequested → AudioReady → Exported → Done
//!
//! 任何阶段都可以转入 `Failed`；重试停留在原阶段，不会倒退。

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    SourcesAdded,
    ReportsRequested,
    ReportsReady,
    AudioRequested,
    AudioReady,
    Exported,
    Done,
    Failed,
}

impl Stage {
    /// 正常流程中的阶段（不含 `Failed`）
    pub const PIPELINE: [Stage; 8] = [
        Stage::Discovered,
        Stage::SourcesAdded,
        Stage::ReportsRequested,
        Stage::ReportsReady,
        Stage::AudioRequested,
        Stage::AudioReady,
        Stage::Exported,
        Stage::Done,
    ];

    /// 成功后的下一阶段；终态没有下一阶段
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Discovered => Some(Stage::SourcesAdded),
            Stage::SourcesAdded => Some(Stage::ReportsRequested),
            Stage::ReportsRequested => Some(Stage::ReportsReady),
            Stage::ReportsReady => Some(Stage::AudioRequested),
            Stage::AudioRequested => Some(Stage::AudioReady),
            Stage::AudioReady => Some(Stage::Exported),
            Stage::Exported => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// 在该阶段执行的步骤名称（用于日志）
    pub fn step_label(self) -> &'static str {
        match self {
            Stage::Discovered => "上传资料",
            Stage::SourcesAdded => "请求报告",
            Stage::ReportsRequested => "等待报告",
            Stage::ReportsReady => "请求音频",
            Stage::AudioRequested => "等待音频",
            Stage::AudioReady => "导出产物",
            Stage::Exported => "收尾校验",
            Stage::Done => "完成",
            Stage::Failed => "失败",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discovered => "discovered",
            Stage::SourcesAdded => "sources_added",
            Stage::ReportsRequested => "reports_requested",
            Stage::ReportsReady => "reports_ready",
            Stage::AudioRequested => "audio_requested",
            Stage::AudioReady => "audio_ready",
            Stage::Exported => "exported",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_follows_next_chain() {
        for pair in Stage::PIPELINE.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
        assert_eq!(Stage::Done.next(), None);
        assert_eq!(Stage::Failed.next(), None);
    }

    #[test]
    fn ordering_matches_pipeline() {
        let mut sorted = Stage::PIPELINE;
        sorted.sort();
        assert_eq!(sorted, Stage::PIPELINE);
        assert!(Stage::Failed > Stage::Done);
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        let terminal: Vec<Stage> = Stage::PIPELINE
            .iter()
            .copied()
            .chain(std::iter::once(Stage::Failed))
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![Stage::Done, Stage::Failed]);
    }

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(Stage::ReportsRequested.to_string(), "reports_requested");
        assert_eq!(Stage::AudioReady.to_string(), "audio_ready");
    }
}
