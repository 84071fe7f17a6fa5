use std::path::Path;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::browser::connection::open_page;
use crate::error::BrowserError;

/// 启动带界面的浏览器，使用持久化的用户目录保存登录状态
pub async fn launch_browser(user_data_dir: &Path, url: &str) -> Result<(Browser, Page), BrowserError> {
    info!("🚀 启动浏览器 (用户目录: {})", user_data_dir.display());

    std::fs::create_dir_all(user_data_dir)
        .map_err(|e| BrowserError::LaunchFailed(format!("无法创建用户目录: {}", e)))?;

    let config = BrowserConfig::builder()
        .with_head()
        .user_data_dir(user_data_dir)
        .args(vec![
            "--disable-blink-features=AutomationControlled",
            "--disable-dev-shm-usage",
        ])
        .build()
        .map_err(|e| {
            error!("配置浏览器失败: {}", e);
            BrowserError::LaunchFailed(e)
        })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        BrowserError::LaunchFailed(e.to_string())
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = open_page(&browser, url).await?;
    info!("✅ 浏览器已导航到: {}", url);
    Ok((browser, page))
}
