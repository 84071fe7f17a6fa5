//! 外部界面能力接口
//!
//! 各阶段只依赖这里的语义（提交、请求、检查就绪、取回），
//! 不关心具体怎样在页面上找到元素。界面改版只影响实现这个 trait 的适配器。

use std::path::Path;

use async_trait::async_trait;

use crate::error::ProbeError;

pub type ProbeResult<T> = Result<T, ProbeError>;

/// 可以打开的面板 / 视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    /// 生成报告和音频的工作室面板
    Studio,
    /// 选择报告格式的对话框
    ReportPicker,
}

impl std::fmt::Display for Panel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Panel::Studio => write!(f, "Studio 面板"),
            Panel::ReportPicker => write!(f, "报告格式对话框"),
        }
    }
}

/// 生成产物的种类
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    /// 指定格式的报告
    Report(String),
    /// 音频概览
    Audio,
}

impl ArtifactKind {
    /// 触发动作的去重键
    pub fn trigger_key(&self) -> String {
        match self {
            ArtifactKind::Report(format) => format!("report:{}", format),
            ArtifactKind::Audio => "audio".to_string(),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Report(format) => write!(f, "报告「{}」", format),
            ArtifactKind::Audio => write!(f, "音频概览"),
        }
    }
}

/// 生成请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRequest {
    Report {
        format: String,
        /// 追加到格式描述后的提示词
        prompt: String,
    },
    Audio {
        /// 找不到对应选项时跳过
        format: Option<String>,
        length: Option<String>,
        focus_prompt: String,
    },
}

impl ArtifactRequest {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactRequest::Report { format, .. } => ArtifactKind::Report(format.clone()),
            ArtifactRequest::Audio { .. } => ArtifactKind::Audio,
        }
    }
}

/// 产物的当前状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// 界面上还没有这个产物（请求尚未被受理）
    Absent,
    Generating,
    Completed,
    /// 界面报告生成失败
    Failed(String),
}

impl ArtifactStatus {
    /// 请求已被界面受理
    pub fn is_accepted(&self) -> bool {
        !matches!(self, ArtifactStatus::Absent)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, ArtifactStatus::Completed | ArtifactStatus::Failed(_))
    }
}

/// 取回产物的方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    /// 直接拿到内容（报告正文）
    Content { file_name: String, bytes: Vec<u8> },
    /// 已触发下载，文件会出现在目标目录中
    Download,
}

/// 外部界面
///
/// 观察类方法返回 `ProbeError::NotReady` 表示"现在还看不到"，
/// `ProbeError::Unavailable` 表示界面本身已不可达
#[async_trait]
pub trait Surface: Send + Sync {
    /// 是否已登录并停留在应用内
    async fn session_ready(&self) -> ProbeResult<bool>;

    /// 新建一个空的工作区（每个条目一个）
    async fn create_workspace(&self) -> ProbeResult<()>;
    async fn workspace_open(&self) -> ProbeResult<bool>;
    /// 重命名当前工作区；失败不影响后续流程
    async fn name_workspace(&self, title: &str) -> ProbeResult<()>;

    async fn submit_source(&self, path: &Path) -> ProbeResult<()>;
    async fn source_indexed(&self, path: &Path) -> ProbeResult<bool>;

    async fn panel_open(&self, panel: Panel) -> ProbeResult<bool>;
    async fn open_panel(&self, panel: Panel) -> ProbeResult<()>;
    /// 报告格式对话框中当前列出的格式
    async fn offered_formats(&self) -> ProbeResult<Vec<String>>;

    async fn request_artifact(&self, request: &ArtifactRequest) -> ProbeResult<()>;
    async fn artifact_status(&self, kind: &ArtifactKind) -> ProbeResult<ArtifactStatus>;
    async fn retrieve_artifact(&self, kind: &ArtifactKind, dest_dir: &Path) -> ProbeResult<Retrieval>;

    /// 是否有遮挡层（弹窗背景等）挡住交互
    async fn obstruction_present(&self) -> ProbeResult<bool>;
    async fn force_dismiss_obstruction(&self) -> ProbeResult<()>;

    /// 回到主页，为下一个条目做准备
    async fn return_home(&self) -> ProbeResult<()>;
}
