//! 日志工具模块
//!
//! 控制台输出 INFO 及以上（`RUST_LOG` 可覆盖），运行目录下的 `run.log` 记录 DEBUG 及以上

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::Config;
use crate::models::RunSummary;

pub const LOG_FILENAME: &str = "run.log";
pub const SUMMARY_FILENAME: &str = "summary.json";
const RUN_DIR_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// 初始化 tracing：控制台 + 文件
///
/// # 参数
/// - `run_dir`: 本次运行的输出目录，日志文件写在这里
/// - `verbose`: 控制台默认级别是否为 debug
pub fn init(run_dir: &Path, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_path = run_dir.join(LOG_FILENAME);
    let log_file = File::create(&log_path)
        .with_context(|| format!("无法创建日志文件: {}", log_path.display()))?;

    let console_layer = fmt::layer().with_target(false).with_filter(console_filter);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .with_filter(EnvFilter::new("debug,chromiumoxide=info,tungstenite=info"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("初始化日志失败: {}", e))?;

    Ok(())
}

/// 创建带时间戳的运行目录：`<root>/<YYYY-MM-DDTHH-MM-SS>`
pub fn create_run_dir(output_root: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format(RUN_DIR_FORMAT).to_string();
    let run_dir = output_root.join(stamp);
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("无法创建输出目录: {}", run_dir.display()))?;
    Ok(run_dir)
}

/// 把汇总写成 `summary.json`
pub fn write_summary(run_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let path = run_dir.join(SUMMARY_FILENAME);
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&path, json).with_context(|| format!("无法写入汇总: {}", path.display()))?;
    Ok(path)
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, mode: &str, run_dir: &Path) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 顺序批处理模式 ({})", mode);
    info!("📂 输出目录: {}", run_dir.display());
    info!("📝 报告格式: {}", config.report_formats.join(", "));
    info!("{}", "=".repeat(60));
}

/// 记录条目加载信息
pub fn log_items_loaded(total: usize) {
    info!("✓ 找到 {} 个待处理的条目", total);
    info!("💡 条目逐个处理，上一个结束后再开始下一个\n");
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &RunSummary, run_dir: &Path) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    let finished = summary.finished_at().with_timezone(&chrono::Local);
    let took = summary.finished_at() - summary.started_at();
    info!(
        "完成时间: {} (耗时 {} 分 {} 秒)",
        finished.format("%Y-%m-%d %H:%M:%S"),
        took.num_minutes(),
        took.num_seconds() % 60
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.succeeded(), summary.total());
    info!("❌ 失败: {}", summary.failed());
    info!("⏭️ 跳过: {}", summary.skipped());
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", run_dir.join(LOG_FILENAME).display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_dir_is_created_under_root() {
        let root = tempfile::tempdir().unwrap();
        let run_dir = create_run_dir(root.path()).unwrap();
        assert!(run_dir.is_dir());
        assert_eq!(run_dir.parent(), Some(root.path()));
    }
}
