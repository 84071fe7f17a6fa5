//! 需要本机浏览器和已登录会话的测试
//!
//! 浏览器需以 `--remote-debugging-port=9222` 启动，手动运行：
//! `cargo test --test live_browser_test -- --ignored`

use notebook_batch::browser::connect_to_browser_and_page;
use notebook_batch::config::Config;
use notebook_batch::infrastructure::{ChromiumSurface, JsExecutor, Panel, Surface};
use tokio_util::sync::CancellationToken;

async fn surface() -> (chromiumoxide::Browser, ChromiumSurface) {
    let config = Config::from_env().expect("加载配置失败");
    let (browser, page) = connect_to_browser_and_page(
        config.browser_debug_port,
        &config.target_url,
        &config.selectors.app_url_fragment,
    )
    .await
    .expect("连接浏览器失败");
    let surface = ChromiumSurface::new(
        JsExecutor::new(page),
        config.selectors,
        config.timeouts,
        config.target_url,
        CancellationToken::new(),
    );
    (browser, surface)
}

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_session_is_ready() {
    let (_browser, surface) = surface().await;
    let ready = surface.session_ready().await.expect("检查登录状态失败");
    assert!(ready, "应该已经登录");
}

#[tokio::test]
#[ignore]
async fn test_obstruction_probe_runs() {
    let (_browser, surface) = surface().await;
    let result = surface.obstruction_present().await;
    assert!(result.is_ok(), "遮挡层检查不应该报错: {:?}", result);
}

#[tokio::test]
#[ignore]
async fn test_studio_panel_probe_runs() {
    let (_browser, surface) = surface().await;
    let result = surface.panel_open(Panel::Studio).await;
    assert!(result.is_ok(), "面板检查不应该报错: {:?}", result);
}

#[tokio::test]
#[ignore]
async fn test_diagnose_reports_every_selector() {
    let (_browser, surface) = surface().await;
    let config = Config::from_env().expect("加载配置失败");
    let report = surface.diagnose().await.expect("页面诊断失败");
    let expected = config.selectors.css_selectors().len() + config.selectors.label_groups().len();
    assert_eq!(report.selectors.len(), expected);
    assert!(report.url.contains(&config.selectors.app_url_fragment));
}
