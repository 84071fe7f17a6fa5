//! # Notebook Batch
//!
//! 把一批书籍章节逐个送进笔记工作区，生成报告和音频概览并导出到本地
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `Surface` - 界面能力接口（提交、请求、检查就绪、取回）
//! - `ChromiumSurface` - 唯一依赖页面结构的适配器，选择器全部来自配置
//! - `polling` - 有上限的轮询等待、遮挡层处理
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个条目的单个阶段
//! - `SourceUploadService` - 新建工作区并上传资料
//! - `ReportService` / `AudioService` - 请求生成并等待完成
//! - `ExportService` - 取回产物、校验、转码
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个条目"怎样一步步推进
//! - `ItemCtx` - 上下文封装（序号 + 输出目录）
//! - `NotebookStages` - 阶段 → 服务的调度
//! - `advance` - 状态机：推进、重试或失败
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理器，管理资源并生成运行汇总
//! - `orchestrator/item_processor` - 单个条目处理器，推进到终态
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{connect_to_browser_and_page, launch_browser};
pub use config::Config;
pub use error::{AppError, AppResult, ProbeError, SurfaceUnavailable};
pub use infrastructure::{ChromiumSurface, JsExecutor, Surface};
pub use models::{RunMode, RunSummary, Stage, StageResult, WorkItem};
pub use orchestrator::{run_batch, App};
pub use workflow::{advance, ItemCtx, NotebookStages, StageExecutor, Transition};
