//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量条目处理器
//! - 管理应用生命周期（初始化、等待登录、运行）
//! - 收集源文档并生成条目（Vec<WorkItem>）
//! - 按顺序逐个处理条目，汇总为 `RunSummary`
//! - 管理浏览器资源（Browser、ChromiumSurface）
//!
//! ### `item_processor` - 单个条目处理器
//! - 反复推进一个条目直到终态
//! - 输出单个条目的开始 / 结束日志
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<WorkItem>)
//!     ↓
//! item_processor (处理单个 WorkItem)
//!     ↓
//! workflow::advance + NotebookStages (处理单个阶段)
//!     ↓
//! services (能力层：上传 / 报告 / 音频 / 导出)
//!     ↓
//! infrastructure (基础设施：Surface、轮询)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，item_processor 管单个
//! 2. **资源隔离**：只有编排层持有 Browser 和界面
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod batch_processor;
pub mod item_processor;

// 重新导出主要类型
pub use batch_processor::{run_batch, App};
pub use item_processor::{drive_item, ItemEnd};
