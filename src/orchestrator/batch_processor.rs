//! 批量条目处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责条目的批量处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：连接（或启动）浏览器、创建 JsExecutor 和 ChromiumSurface
//! 2. **登录等待**：确认界面处于已登录状态后才开始处理
//! 3. **条目加载**：按运行模式收集源文档，生成 `Vec<WorkItem>`
//! 4. **顺序处理**：一次只处理一个条目，上一个到达终态后才开始下一个
//! 5. **失败隔离**：单个条目失败不影响后续条目；界面不可达时停止整个运行
//! 6. **运行汇总**：每个条目在 `RunSummary` 中都有一行
//! 7. **页面诊断**：`--diagnose` 时只导出页面结构和选择器命中情况
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有 Browser 和界面的模块，以引用方式传给下层
//! - **无并发**：界面只有一个会话，并发操作会互相干扰
//! - **向下委托**：委托 item_processor 处理单个条目

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser;
use crate::config::Config;
use crate::error::{AppResult, SurfaceUnavailable};
use crate::infrastructure::{await_condition, ChromiumSurface, JsExecutor, Surface, WaitOutcome, WaitSpec};
use crate::models::{collect_documents, RunHalt, RunMode, RunSummary, RunSummaryBuilder, WorkItem};
use crate::orchestrator::item_processor::{drive_item, ItemEnd};
use crate::services::FfmpegTranscoder;
use crate::utils::logging;
use crate::workflow::{ItemCtx, NotebookStages, StageExecutor};

const DIAGNOSE_FILENAME: &str = "diagnose.json";

/// 按提交顺序逐个处理条目，返回运行汇总
///
/// 无论条目成败，汇总中都恰好有 `items.len()` 行
pub async fn run_batch(
    items: Vec<WorkItem>,
    executor: &dyn StageExecutor,
    config: &Config,
    run_dir: &Path,
    cancel: &CancellationToken,
) -> RunSummary {
    let total = items.len();
    let mut summary = RunSummaryBuilder::new();
    let mut halted: Option<String> = None;

    for (index, mut item) in items.into_iter().enumerate() {
        if let Some(reason) = &halted {
            summary.record_skipped(&item, reason.clone());
            continue;
        }
        if cancel.is_cancelled() {
            summary.halt(RunHalt::Cancelled);
            halted = Some("运行已取消".to_string());
            summary.record_skipped(&item, "运行已取消");
            continue;
        }

        let ctx = ItemCtx::new(index + 1, total, &item, run_dir);
        match drive_item(&mut item, executor, &ctx, &config.retry, cancel).await {
            Ok(ItemEnd::Terminal) => summary.record_terminal(&item),
            Ok(ItemEnd::Interrupted) => {
                warn!("{} ⏹ 运行已取消，条目停在 {}", ctx, item.stage);
                summary.halt(RunHalt::Cancelled);
                halted = Some("运行已取消".to_string());
                summary.record_skipped(&item, format!("运行已取消 (停在 {})", item.stage));
            }
            Err(err) => {
                summary.record_terminal(&item);
                summary.halt(RunHalt::SurfaceUnavailable(err.reason.clone()));
                halted = Some(format!("外部界面不可达，未处理: {}", err.reason));
            }
        }
    }

    summary.finish()
}

/// 应用主结构
pub struct App {
    config: Config,
    mode: RunMode,
    run_dir: PathBuf,
    _browser: Browser,
    surface: ChromiumSurface,
    cancel: CancellationToken,
}

impl App {
    /// 初始化应用：连接或启动浏览器
    pub async fn initialize(
        config: Config,
        mode: RunMode,
        run_dir: PathBuf,
        cancel: CancellationToken,
    ) -> AppResult<Self> {
        let (browser, page) = if config.launch_browser {
            browser::launch_browser(&config.user_data_dir, &config.target_url).await?
        } else {
            browser::connect_to_browser_and_page(
                config.browser_debug_port,
                &config.target_url,
                &config.selectors.app_url_fragment,
            )
            .await?
        };

        // 创建 JsExecutor（持有 page）
        let executor = JsExecutor::new(page);
        let surface = ChromiumSurface::new(
            executor,
            config.selectors.clone(),
            config.timeouts.clone(),
            config.target_url.clone(),
            cancel.clone(),
        );

        Ok(Self {
            config,
            mode,
            run_dir,
            _browser: browser,
            surface,
            cancel,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunSummary> {
        if !self.wait_for_session().await? {
            let mut summary = RunSummaryBuilder::new();
            summary.halt(RunHalt::Cancelled);
            return Ok(summary.finish());
        }

        info!("\n📁 正在收集待处理的源文档 ({})...", self.mode);
        let documents = collect_documents(self.mode, &self.config).await?;
        let items = WorkItem::from_documents(documents);
        if items.is_empty() {
            warn!("⚠️ 没有找到待处理的条目");
        }
        logging::log_items_loaded(items.len());

        let transcoder = Box::new(FfmpegTranscoder::from_settings(&self.config.transcode));
        let stages = NotebookStages::new(&self.surface, &self.config, transcoder);

        Ok(run_batch(items, &stages, &self.config, &self.run_dir, &self.cancel).await)
    }

    /// 登录后采集页面结构并写入运行目录，不处理任何条目
    pub async fn diagnose(&self) -> Result<PathBuf> {
        if !self.wait_for_session().await? {
            anyhow::bail!("等待登录期间已取消");
        }

        let report = self.surface.diagnose().await?;
        info!("🔎 当前页面: {}", report.url);
        for hit in report.misses() {
            warn!("⚠️ 选择器未命中: {}", hit.name);
        }

        let path = self.run_dir.join(DIAGNOSE_FILENAME);
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("无法写入诊断结果: {}", path.display()))?;
        Ok(path)
    }

    /// 等待用户登录；返回 `false` 表示等待期间被取消
    async fn wait_for_session(&self) -> AppResult<bool> {
        info!("🔐 等待登录完成 (最长 {} 秒)...", self.config.timeouts.page_load_secs);
        let surface = &self.surface;
        let spec = WaitSpec::secs(
            self.config.timeouts.page_load_secs,
            self.config.timeouts.poll_interval(),
        );

        match await_condition(move || surface.session_ready(), spec, &self.cancel).await? {
            WaitOutcome::Satisfied { elapsed } => {
                info!("✓ 已登录 (用时 {} 秒)", elapsed.as_secs());
                Ok(true)
            }
            WaitOutcome::TimedOut { elapsed } => Err(SurfaceUnavailable::new(format!(
                "{} 秒内未检测到登录状态",
                elapsed.as_secs()
            ))
            .into()),
            WaitOutcome::Cancelled => Ok(false),
        }
    }
}
