use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use notebook_batch::models::RunMode;
use notebook_batch::utils::logging;
use notebook_batch::{App, Config};

/// 批量生成章节报告与音频概览
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML 配置文件
    #[arg(short, long, env = "NOTEBOOK_BATCH_CONFIG")]
    config: Option<PathBuf>,

    /// 运行模式
    #[arg(short, long, value_enum, default_value_t = RunMode::Resume)]
    mode: RunMode,

    /// 已拆分章节所在目录（每本书一个子目录）
    #[arg(long)]
    books_dir: Option<PathBuf>,

    /// 浏览器下载目录（完整模式下扫描最近的 PDF）
    #[arg(long)]
    downloads_dir: Option<PathBuf>,

    /// 输出根目录
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// 自行启动浏览器，而不是连接已运行的浏览器
    #[arg(long)]
    launch: bool,

    /// 启动浏览器时使用的用户数据目录（保存登录状态）
    #[arg(long)]
    user_data_dir: Option<PathBuf>,

    /// 控制台输出调试日志
    #[arg(short, long)]
    verbose: bool,

    /// 导出当前页面结构和选择器命中情况后退出，用于界面改版后修正选择器
    #[arg(long)]
    diagnose: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(dir) = self.books_dir {
            config.books_dir = dir;
        }
        if let Some(dir) = self.downloads_dir {
            config.downloads_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_root = dir;
        }
        if let Some(dir) = self.user_data_dir {
            config.user_data_dir = dir;
        }
        config.launch_browser |= self.launch;
        config.verbose_logging |= self.verbose;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mode = cli.mode;
    let diagnose = cli.diagnose;

    // 加载配置
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    // 初始化日志
    let run_dir = logging::create_run_dir(&config.output_root)?;
    logging::init(&run_dir, config.verbose_logging)?;
    logging::log_startup(&config, &mode.to_string(), &run_dir);

    // Ctrl+C：处理完当前轮询后停止
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹ 收到中断信号，当前步骤结束后停止...");
            on_signal.cancel();
        }
    });

    // 初始化并运行应用
    let app = App::initialize(config, mode, run_dir.clone(), cancel).await?;
    if diagnose {
        let path = app.diagnose().await?;
        info!("🔎 诊断结果已保存至: {}", path.display());
        return Ok(());
    }
    let summary = app.run().await?;

    info!("\n{}", summary);
    let summary_path = logging::write_summary(&run_dir, &summary)?;
    info!("汇总已保存至: {}", summary_path.display());
    logging::print_final_stats(&summary, &run_dir);

    if summary.is_hard_failure() {
        bail!("运行中止: 外部界面不可达");
    }
    Ok(())
}
