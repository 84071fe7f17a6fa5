//! 单个条目处理器 - 编排层
//!
//! ## 职责
//!
//! 反复调用状态机推进一个条目，直到它到达终态（Done / Failed）或运行被取消。
//! 条目之间互不影响：这里返回的 `Err` 只代表外部界面不可达。

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::SurfaceUnavailable;
use crate::models::{RetryPolicies, Stage, WorkItem};
use crate::utils::truncate_text;
use crate::workflow::{advance, ItemCtx, StageExecutor, Transition};

/// 条目处理的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEnd {
    /// 已到达 Done 或 Failed
    Terminal,
    /// 运行被取消，条目停在中间阶段
    Interrupted,
}

/// 处理单个条目直到终态
pub async fn drive_item(
    item: &mut WorkItem,
    executor: &dyn StageExecutor,
    ctx: &ItemCtx,
    policies: &RetryPolicies,
    cancel: &CancellationToken,
) -> Result<ItemEnd, SurfaceUnavailable> {
    log_item_start(ctx, item);

    loop {
        match advance(item, executor, ctx, policies, cancel).await? {
            Transition::Interrupted => return Ok(ItemEnd::Interrupted),
            _ if item.is_terminal() => break,
            _ => {}
        }
    }

    log_item_end(ctx, item);
    Ok(ItemEnd::Terminal)
}

// ========== 日志辅助函数 ==========

fn log_item_start(ctx: &ItemCtx, item: &WorkItem) {
    info!("\n{}", "=".repeat(60));
    info!("{} 开始处理: {}", ctx, item.title);
    info!("{} 📄 资料: {} 个文件", ctx, item.document.paths.len());
    info!("{}", "=".repeat(60));
}

fn log_item_end(ctx: &ItemCtx, item: &WorkItem) {
    info!("{}", "─".repeat(60));
    if item.stage == Stage::Done {
        info!(
            "{} ✅ 处理完成 (累计重试 {} 次): {}",
            ctx,
            item.total_attempts(),
            ctx.item_dir.display()
        );
    } else {
        error!(
            "{} ❌ 处理失败: {}",
            ctx,
            truncate_text(item.last_error.as_deref().unwrap_or("未知错误"), 200)
        );
    }
    info!("{}", "─".repeat(60));
}
