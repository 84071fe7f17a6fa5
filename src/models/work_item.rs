//! 工作条目（一个章节 / 一组 PDF）

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::stage::Stage;

/// 上游（领取 / 拆分）产出的源文档引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// 所属书名（或下载分组的主题）
    pub book: String,
    /// 章节名，分组来源时为空
    pub chapter: String,
    /// 需要上传的文件
    pub paths: Vec<PathBuf>,
}

impl SourceDocument {
    pub fn chapter(book: impl Into<String>, chapter: impl Into<String>, path: PathBuf) -> Self {
        Self {
            book: book.into(),
            chapter: chapter.into(),
            paths: vec![path],
        }
    }

    pub fn group(topic: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            book: topic.into(),
            chapter: String::new(),
            paths,
        }
    }

    /// 标题："书名 — 章节名"
    pub fn title(&self) -> String {
        if self.chapter.is_empty() {
            self.book.clone()
        } else {
            format!("{} — {}", self.book, self.chapter)
        }
    }

    /// 唯一标识：源文件路径
    pub fn reference(&self) -> String {
        self.paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// 一个工作条目在本次运行中的全部状态
///
/// 只由状态机修改；字段对外只读
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub document: SourceDocument,
    pub stage: Stage,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    attempts: BTreeMap<Stage, u32>,
    triggered: BTreeMap<Stage, BTreeSet<String>>,
    history: Vec<Stage>,
}

impl WorkItem {
    pub fn new(document: SourceDocument) -> Self {
        Self {
            id: document.reference(),
            title: document.title(),
            document,
            stage: Stage::Discovered,
            last_error: None,
            created_at: Utc::now(),
            attempts: BTreeMap::new(),
            triggered: BTreeMap::new(),
            history: vec![Stage::Discovered],
        }
    }

    /// 从源文档构建条目列表，按标识去重并保持提交顺序
    pub fn from_documents(documents: Vec<SourceDocument>) -> Vec<WorkItem> {
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(documents.len());
        for document in documents {
            let reference = document.reference();
            if !seen.insert(reference.clone()) {
                warn!("⚠️ 重复的源文档已忽略: {}", reference);
                continue;
            }
            items.push(WorkItem::new(document));
        }
        items
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// 某阶段已失败的次数
    pub fn attempts(&self, stage: Stage) -> u32 {
        self.attempts.get(&stage).copied().unwrap_or(0)
    }

    /// 所有阶段累计失败次数
    pub fn total_attempts(&self) -> u32 {
        self.attempts.values().sum()
    }

    /// 当前阶段的某个触发动作是否已经执行过
    pub fn trigger_sent(&self, key: &str) -> bool {
        self.triggered
            .get(&self.stage)
            .map(|keys| keys.contains(key))
            .unwrap_or(false)
    }

    /// 阶段轨迹（包含重试时的重复记录）
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    // ========== 仅供状态机调用 ==========

    pub(crate) fn advance_to(&mut self, next: Stage) {
        self.stage = next;
        self.attempts.remove(&next);
        self.triggered.remove(&next);
        self.last_error = None;
        self.history.push(next);
    }

    pub(crate) fn record_retry(&mut self, reason: String, triggered: Vec<String>) -> u32 {
        let stage = self.stage;
        self.triggered.entry(stage).or_default().extend(triggered);
        let count = self.attempts.entry(stage).or_insert(0);
        *count += 1;
        self.last_error = Some(reason);
        self.history.push(stage);
        *count
    }

    pub(crate) fn fail(&mut self, reason: String) {
        self.last_error = Some(reason);
        self.stage = Stage::Failed;
        self.history.push(Stage::Failed);
    }
}
