//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"和少量 CDP 命令的能力

use std::path::Path;

use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::ProbeError;

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力和文件上传 / 下载路由
/// - 不认识工作条目和阶段
/// - 不处理业务流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, ProbeError> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
    ) -> Result<T, ProbeError> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 导航到指定地址
    pub async fn goto(&self, url: &str) -> Result<(), ProbeError> {
        debug!("导航到: {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    /// 当前页面地址
    pub async fn current_url(&self) -> Result<String, ProbeError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    /// 把本地文件设置到文件输入框上，不经过系统文件选择对话框
    pub async fn set_input_files(&self, selector: &str, paths: &[&Path]) -> Result<(), ProbeError> {
        let element = self.page.find_element(selector).await?;
        let files = paths.iter().map(|p| p.display().to_string()).collect();
        let mut params = SetFileInputFilesParams::new(files);
        params.backend_node_id = Some(element.backend_node_id);
        self.page.execute(params).await?;
        Ok(())
    }

    /// 把之后的下载都保存到 `dir`
    pub async fn route_downloads(&self, dir: &Path) -> Result<(), ProbeError> {
        let mut params = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
        params.download_path = Some(dir.display().to_string());
        self.page.execute(params).await?;
        debug!("下载目录已设置为: {}", dir.display());
        Ok(())
    }
}
