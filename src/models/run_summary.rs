//! 运行汇总
//!
//! 批次的唯一对外输出：每个条目一行，外加成功 / 失败 / 跳过计数。
//! 运行期间由 `RunSummaryBuilder` 逐条累积，`finish()` 之后不可再修改。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::stage::Stage;
use crate::models::work_item::WorkItem;

/// 条目最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded,
    Failed,
    /// 因取消或运行中止而未处理完
    Skipped,
}

/// 汇总中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub id: String,
    pub title: String,
    pub final_stage: Stage,
    pub outcome: ItemOutcome,
    pub last_error: Option<String>,
    pub retries: u32,
}

/// 运行提前结束的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum RunHalt {
    /// 外部界面不可达，属于硬失败
    SurfaceUnavailable(String),
    /// 收到取消信号
    Cancelled,
}

/// 运行汇总（只读）
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    entries: Vec<SummaryEntry>,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    halted: Option<RunHalt>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn entries(&self) -> &[SummaryEntry] {
        &self.entries
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn halted(&self) -> Option<&RunHalt> {
        self.halted.as_ref()
    }

    /// 只有界面不可达才算整个运行失败；个别条目失败不影响
    pub fn is_hard_failure(&self) -> bool {
        matches!(self.halted, Some(RunHalt::SurfaceUnavailable(_)))
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{}", rule)?;
        writeln!(f, "运行汇总")?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "  条目总数 : {}", self.total())?;
        writeln!(f, "  成功     : {}", self.succeeded)?;
        writeln!(f, "  失败     : {}", self.failed)?;
        writeln!(f, "  跳过     : {}", self.skipped)?;
        match &self.halted {
            Some(RunHalt::SurfaceUnavailable(reason)) => {
                writeln!(f, "  中止原因 : 外部界面不可达 — {}", reason)?
            }
            Some(RunHalt::Cancelled) => writeln!(f, "  中止原因 : 已取消")?,
            None => {}
        }
        let failures: Vec<&SummaryEntry> = self
            .entries
            .iter()
            .filter(|e| e.outcome == ItemOutcome::Failed)
            .collect();
        if !failures.is_empty() {
            writeln!(f, "  失败条目 ({}):", failures.len())?;
            for entry in failures {
                writeln!(
                    f,
                    "    - {} [{}]: {}",
                    entry.title,
                    entry.final_stage,
                    entry.last_error.as_deref().unwrap_or("未知错误")
                )?;
            }
        }
        write!(f, "{}", rule)
    }
}

/// 运行期间累积汇总
#[derive(Debug)]
pub struct RunSummaryBuilder {
    entries: Vec<SummaryEntry>,
    halted: Option<RunHalt>,
    started_at: DateTime<Utc>,
}

impl Default for RunSummaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummaryBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            halted: None,
            started_at: Utc::now(),
        }
    }

    /// 记录一个已到达终态的条目
    pub fn record_terminal(&mut self, item: &WorkItem) {
        let outcome = if item.stage == Stage::Done {
            ItemOutcome::Succeeded
        } else {
            ItemOutcome::Failed
        };
        self.push(item, outcome, item.last_error.clone());
    }

    /// 记录一个未处理完的条目
    pub fn record_skipped(&mut self, item: &WorkItem, reason: impl Into<String>) {
        self.push(item, ItemOutcome::Skipped, Some(reason.into()));
    }

    pub fn halt(&mut self, reason: RunHalt) {
        if self.halted.is_none() {
            self.halted = Some(reason);
        }
    }

    pub fn finish(self) -> RunSummary {
        let count = |outcome| self.entries.iter().filter(|e| e.outcome == outcome).count();
        let succeeded = count(ItemOutcome::Succeeded);
        let failed = count(ItemOutcome::Failed);
        let skipped = count(ItemOutcome::Skipped);
        RunSummary {
            entries: self.entries,
            succeeded,
            failed,
            skipped,
            halted: self.halted,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    fn push(&mut self, item: &WorkItem, outcome: ItemOutcome, last_error: Option<String>) {
        self.entries.push(SummaryEntry {
            id: item.id.clone(),
            title: item.title.clone(),
            final_stage: item.stage,
            outcome,
            last_error,
            retries: item.total_attempts(),
        });
    }
}
