//! 集成测试共用的脚本化界面
//!
//! `FakeSurface` 用 tokio 的（可暂停）时钟模拟一个会话：
//! 请求在 `accept_delay` 后被受理，在 `generation_delay` 后生成完成。
//! 每次新建工作区都会清空产物状态，并记录调用次数供断言使用。

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use notebook_batch::config::Config;
use notebook_batch::error::ProbeError;
use notebook_batch::infrastructure::{
    ArtifactKind, ArtifactRequest, ArtifactStatus, Panel, ProbeResult, Retrieval, Surface,
};
use notebook_batch::models::{RetryPolicies, RetryPolicy, SourceDocument, WorkItem};

/// MP3 文件头（ID3）
pub const MP3_BYTES: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00fake-audio";

/// 遮挡层的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obstruction {
    None,
    /// 出现后经过一段时间自行消失
    ClearsAfter(Duration),
    /// 强制关闭若干次后消失
    ClearsAfterForces(u32),
    /// 永远不消失
    Stuck,
}

/// 模拟界面的行为脚本
#[derive(Debug, Clone)]
pub struct Script {
    pub offered_formats: Vec<String>,
    /// 工作区新建后格式列表保持为空的时长
    pub offers_empty_for: Duration,
    /// 第 n 个工作区（从1开始）不提供某个格式
    pub withhold_format: Option<(usize, String)>,
    /// 资料提交后多久完成索引
    pub index_delay: Duration,
    pub accept_delay: Duration,
    pub generation_delay: Duration,
    pub failed_reports: HashSet<String>,
    pub audio_fails: bool,
    /// 新建第 n 个工作区时界面断开
    pub unavailable_on_workspace: Option<usize>,
    /// 新建第 n 个工作区时触发取消
    pub cancel_on_workspace: Option<(usize, CancellationToken)>,
    /// 在第 n 个工作区读取格式列表时触发取消
    pub cancel_on_format_wait: Option<(usize, CancellationToken)>,
    /// 下载到的音频文件内容
    pub audio_bytes: Vec<u8>,
    pub obstruction: Obstruction,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            offered_formats: vec!["Briefing Doc".into(), "Study Guide".into()],
            offers_empty_for: Duration::ZERO,
            withhold_format: None,
            index_delay: Duration::ZERO,
            accept_delay: Duration::from_secs(2),
            generation_delay: Duration::from_secs(20),
            failed_reports: HashSet::new(),
            audio_fails: false,
            unavailable_on_workspace: None,
            cancel_on_workspace: None,
            cancel_on_format_wait: None,
            audio_bytes: MP3_BYTES.to_vec(),
            obstruction: Obstruction::None,
        }
    }
}

/// 调用计数
#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub workspaces: usize,
    pub sources: Vec<PathBuf>,
    /// 每个工作区内每种产物的请求次数：(工作区序号, 触发键)
    pub requests: HashMap<(usize, String), u32>,
    pub forced_dismissals: u32,
    pub returned_home: usize,
}

impl Calls {
    pub fn requests_for(&self, workspace: usize, kind: &ArtifactKind) -> u32 {
        self.requests
            .get(&(workspace, kind.trigger_key()))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct State {
    workspace_open: bool,
    workspace_created_at: Option<Instant>,
    submitted_at: HashMap<PathBuf, Instant>,
    open_panels: HashSet<Panel>,
    requested_at: HashMap<ArtifactKind, Instant>,
    obstruction_since: Option<Instant>,
    calls: Calls,
}

pub struct FakeSurface {
    script: Script,
    state: Mutex<State>,
}

impl FakeSurface {
    pub fn new(script: Script) -> Self {
        let state = State {
            obstruction_since: match script.obstruction {
                Obstruction::None => None,
                _ => Some(Instant::now()),
            },
            ..State::default()
        };
        Self {
            script,
            state: Mutex::new(state),
        }
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls.clone()
    }

    fn status_of(&self, state: &State, kind: &ArtifactKind) -> ArtifactStatus {
        let Some(at) = state.requested_at.get(kind) else {
            return ArtifactStatus::Absent;
        };
        let elapsed = at.elapsed();
        if elapsed < self.script.accept_delay {
            return ArtifactStatus::Absent;
        }
        if elapsed < self.script.accept_delay + self.script.generation_delay {
            return ArtifactStatus::Generating;
        }
        let failed = match kind {
            ArtifactKind::Report(format) => self.script.failed_reports.contains(format),
            ArtifactKind::Audio => self.script.audio_fails,
        };
        if failed {
            ArtifactStatus::Failed("generation error".into())
        } else {
            ArtifactStatus::Completed
        }
    }
}

#[async_trait]
impl Surface for FakeSurface {
    async fn session_ready(&self) -> ProbeResult<bool> {
        Ok(true)
    }

    async fn create_workspace(&self) -> ProbeResult<()> {
        let mut state = self.state.lock().unwrap();
        let number = state.calls.workspaces + 1;
        if self.script.unavailable_on_workspace == Some(number) {
            return Err(ProbeError::unavailable("websocket closed"));
        }
        if let Some((n, token)) = &self.script.cancel_on_workspace {
            if *n == number {
                token.cancel();
            }
        }
        state.calls.workspaces = number;
        state.workspace_open = true;
        state.workspace_created_at = Some(Instant::now());
        state.submitted_at.clear();
        state.open_panels.clear();
        state.requested_at.clear();
        Ok(())
    }

    async fn workspace_open(&self) -> ProbeResult<bool> {
        Ok(self.state.lock().unwrap().workspace_open)
    }

    async fn name_workspace(&self, _title: &str) -> ProbeResult<()> {
        Ok(())
    }

    async fn submit_source(&self, path: &Path) -> ProbeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.sources.push(path.to_path_buf());
        state.submitted_at.insert(path.to_path_buf(), Instant::now());
        Ok(())
    }

    async fn source_indexed(&self, path: &Path) -> ProbeResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .submitted_at
            .get(path)
            .is_some_and(|at| at.elapsed() >= self.script.index_delay))
    }

    async fn panel_open(&self, panel: Panel) -> ProbeResult<bool> {
        Ok(self.state.lock().unwrap().open_panels.contains(&panel))
    }

    async fn open_panel(&self, panel: Panel) -> ProbeResult<()> {
        self.state.lock().unwrap().open_panels.insert(panel);
        Ok(())
    }

    async fn offered_formats(&self) -> ProbeResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        if let Some((n, token)) = &self.script.cancel_on_format_wait {
            if *n == state.calls.workspaces {
                token.cancel();
            }
        }
        let loaded = state
            .workspace_created_at
            .is_some_and(|at| at.elapsed() >= self.script.offers_empty_for);
        if !loaded {
            return Ok(Vec::new());
        }
        let mut offered = self.script.offered_formats.clone();
        if let Some((n, format)) = &self.script.withhold_format {
            if *n == state.calls.workspaces {
                offered.retain(|f| f != format);
            }
        }
        Ok(offered)
    }

    async fn request_artifact(&self, request: &ArtifactRequest) -> ProbeResult<()> {
        let mut state = self.state.lock().unwrap();
        let kind = request.kind();
        let workspace = state.calls.workspaces;
        *state
            .calls
            .requests
            .entry((workspace, kind.trigger_key()))
            .or_insert(0) += 1;
        state.open_panels.remove(&Panel::ReportPicker);
        state.requested_at.entry(kind).or_insert_with(Instant::now);
        Ok(())
    }

    async fn artifact_status(&self, kind: &ArtifactKind) -> ProbeResult<ArtifactStatus> {
        let state = self.state.lock().unwrap();
        Ok(self.status_of(&state, kind))
    }

    async fn retrieve_artifact(&self, kind: &ArtifactKind, dest_dir: &Path) -> ProbeResult<Retrieval> {
        match kind {
            ArtifactKind::Report(format) => Ok(Retrieval::Content {
                file_name: format!("{}.md", format),
                bytes: format!("# {}\n\nbody", format).into_bytes(),
            }),
            ArtifactKind::Audio => {
                std::fs::write(dest_dir.join("Audio Overview.mp3"), &self.script.audio_bytes)
                    .map_err(|e| ProbeError::not_ready(e.to_string()))?;
                Ok(Retrieval::Download)
            }
        }
    }

    async fn obstruction_present(&self) -> ProbeResult<bool> {
        let state = self.state.lock().unwrap();
        let present = match (self.script.obstruction, state.obstruction_since) {
            (_, None) | (Obstruction::None, _) => false,
            (Obstruction::ClearsAfter(delay), Some(since)) => since.elapsed() < delay,
            (Obstruction::ClearsAfterForces(n), Some(_)) => state.calls.forced_dismissals < n,
            (Obstruction::Stuck, Some(_)) => true,
        };
        Ok(present)
    }

    async fn force_dismiss_obstruction(&self) -> ProbeResult<()> {
        self.state.lock().unwrap().calls.forced_dismissals += 1;
        Ok(())
    }

    async fn return_home(&self) -> ProbeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.returned_home += 1;
        state.workspace_open = false;
        Ok(())
    }
}

/// 测试用配置：短超时、不转码、重试不等待
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.report_formats = vec!["Briefing Doc".into(), "Study Guide".into()];
    config.transcode.enabled = false;
    config.timeouts.report_generation_secs = 120;
    config.timeouts.audio_generation_secs = 300;
    config.retry = RetryPolicies::uniform(RetryPolicy::fixed(3, Duration::ZERO));
    config
}

/// 在临时目录中创建源文件并生成条目
pub fn work_items(dir: &Path, chapters: &[&str]) -> Vec<WorkItem> {
    let documents = chapters
        .iter()
        .map(|name| {
            let path = dir.join(format!("{}.pdf", name.replace(' ', "_")));
            std::fs::write(&path, b"%PDF-1.7").unwrap();
            SourceDocument::chapter("Rust in Action", *name, path)
        })
        .collect();
    WorkItem::from_documents(documents)
}
