//! 程序配置
//!
//! 先读可选的 TOML 文件，再用环境变量覆盖。整个配置对象显式传入编排层，
//! 不存在全局可变状态，同样的输入总能复现同样的运行行为。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::RetryPolicies;

/// 程序配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 浏览器调试端口（连接已运行的浏览器）
    pub browser_debug_port: u16,
    /// 为 true 时自己启动浏览器，而不是连接调试端口
    pub launch_browser: bool,
    /// 启动浏览器时使用的用户目录（保存登录状态）
    pub user_data_dir: PathBuf,
    /// 目标URL
    pub target_url: String,
    /// 输出根目录，每次运行在其下创建一个带时间戳的子目录
    pub output_root: PathBuf,
    /// 已拆分章节所在目录（每本书一个子目录）
    pub books_dir: PathBuf,
    /// 下载目录（完整模式下扫描最近的 PDF）
    pub downloads_dir: PathBuf,
    /// 最近 PDF 的最大文件年龄（小时）
    pub pdf_max_age_hours: u64,
    /// 完整模式下，在枚举章节之前执行的领取 / 拆分命令（可选）
    pub claim_command: Option<Vec<String>>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 要生成的报告格式，必须与界面上显示的名称完全一致
    pub report_formats: Vec<String>,
    /// 追加到报告描述末尾的提示词
    pub report_prompt: String,
    /// 部分报告失败时是否继续后续阶段
    pub accept_partial_reports: bool,
    pub audio: AudioOptions,
    pub transcode: TranscodeSettings,
    pub timeouts: Timeouts,
    pub obstruction: ObstructionPolicy,
    pub retry: RetryPolicies,
    pub selectors: UiSelectors,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            launch_browser: false,
            user_data_dir: default_profile_dir(),
            target_url: "https://notebooklm.google.com/".to_string(),
            output_root: PathBuf::from("output"),
            books_dir: PathBuf::from("packt-books"),
            downloads_dir: default_downloads_dir(),
            pdf_max_age_hours: 24,
            claim_command: None,
            verbose_logging: false,
            report_formats: vec!["Briefing Doc".to_string(), "Study Guide".to_string()],
            report_prompt: DEFAULT_PROMPT.to_string(),
            accept_partial_reports: false,
            audio: AudioOptions::default(),
            transcode: TranscodeSettings::default(),
            timeouts: Timeouts::default(),
            obstruction: ObstructionPolicy::default(),
            retry: RetryPolicies::default(),
            selectors: UiSelectors::default(),
        }
    }
}

const DEFAULT_PROMPT: &str = "cover the primary secondary and tertiary concepts, walk through how they \
connect and what they mean in a larger context. opt for a casual tone and simpler language avoid \
academic jargon but not at the cost of diluting definitions or shallow explanations of difficult concepts.";

/// 音频生成选项；界面上找不到某个选项时跳过，不算错误
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOptions {
    pub format: Option<String>,
    pub length: Option<String>,
    pub focus_prompt: String,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            format: Some("Deep Dive".to_string()),
            length: Some("Long".to_string()),
            focus_prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// 音频转码设置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    pub enabled: bool,
    pub ffmpeg_path: String,
    pub timeout_secs: u64,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ffmpeg_path: "ffmpeg".to_string(),
            timeout_secs: 120,
        }
    }
}

/// 等待时限；每一处等待都有明确上限
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// 等待登录 / 主页加载
    pub page_load_secs: u64,
    /// 新建工作区后等待其打开
    pub workspace_open_secs: u64,
    /// 等待上传的资料完成索引
    pub source_index_secs: u64,
    /// 等待面板打开
    pub panel_secs: u64,
    /// 等待报告格式出现在选择框中（智能推荐格式加载较慢）
    pub format_offer_secs: u64,
    /// 触发生成后等待界面确认已受理
    pub request_accept_secs: u64,
    /// 等待报告生成完成
    pub report_generation_secs: u64,
    /// 等待音频生成完成
    pub audio_generation_secs: u64,
    /// 等待下载完成
    pub download_secs: u64,
    /// 常规轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 音频轮询间隔（秒）
    pub audio_poll_interval_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load_secs: 600,
            workspace_open_secs: 30,
            source_index_secs: 180,
            panel_secs: 15,
            format_offer_secs: 90,
            request_accept_secs: 30,
            report_generation_secs: 300,
            audio_generation_secs: 1800,
            download_secs: 60,
            poll_interval_ms: 1_500,
            audio_poll_interval_secs: 15,
        }
    }
}

impl Timeouts {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn audio_poll_interval(&self) -> Duration {
        Duration::from_secs(self.audio_poll_interval_secs)
    }
}

/// 遮挡层处理策略
///
/// 先在宽限期内等待遮挡自行消失；仍未消失时最多强制关闭 `max_forced_attempts` 次，
/// 之后不再等待，直接强制执行交互
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstructionPolicy {
    pub grace_ms: u64,
    pub poll_interval_ms: u64,
    pub max_forced_attempts: u32,
}

impl Default for ObstructionPolicy {
    fn default() -> Self {
        Self {
            grace_ms: 3_000,
            poll_interval_ms: 250,
            max_forced_attempts: 3,
        }
    }
}

impl ObstructionPolicy {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 界面查找字符串
///
/// 界面改版时只需要改这里（或配置文件），状态机和各阶段逻辑不受影响
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSelectors {
    /// 应用所在域名片段；地址不含它说明还在登录页
    pub app_url_fragment: String,
    /// 主页加载完成的标志元素
    pub home_marker: String,
    /// 工作区页面的地址片段
    pub workspace_url_fragment: String,
    pub new_workspace_labels: Vec<String>,
    pub title_input: String,
    pub add_source_labels: Vec<String>,
    pub upload_choice_labels: Vec<String>,
    pub file_input: String,
    pub insert_labels: Vec<String>,
    /// 资料列表中的一项
    pub source_item: String,
    /// 资料仍在处理中的标志
    pub source_loading: String,
    /// Studio 面板打开时可见的文字
    pub studio_anchor_text: String,
    pub studio_toggle_labels: Vec<String>,
    pub reports_card_labels: Vec<String>,
    pub dialog: String,
    /// 报告格式对话框中可见的标志文字
    pub report_picker_marker: String,
    /// 格式编辑按钮 aria-label 的前缀，其余部分即格式名称
    pub format_edit_label_prefix: String,
    /// `{name}` 会被替换为格式名称
    pub format_edit_button: String,
    pub description_textarea: String,
    pub generate_labels: Vec<String>,
    /// 已完成的产物
    pub artifact_item: String,
    /// 正在生成的产物
    pub artifact_generating: String,
    /// 生成失败的产物
    pub artifact_failed: String,
    /// 打开的产物正文
    pub artifact_body: String,
    pub audio_customize: String,
    pub audio_player: String,
    pub audio_download: String,
    /// 遮挡层（如弹窗背景）
    pub overlay: String,
    pub close_labels: Vec<String>,
}

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for UiSelectors {
    fn default() -> Self {
        Self {
            app_url_fragment: "notebooklm.google.com".to_string(),
            home_marker: "mat-card.project-button-card, button[aria-label*='notebook' i]".to_string(),
            workspace_url_fragment: "/notebook/".to_string(),
            new_workspace_labels: labels(&["New notebook", "Create new notebook"]),
            title_input: "input.title-input".to_string(),
            add_source_labels: labels(&["Add source"]),
            upload_choice_labels: labels(&["Upload file", "Upload from computer", "From computer"]),
            file_input: "input[type='file']".to_string(),
            insert_labels: labels(&["Insert", "Upload", "Add", "Done"]),
            source_item: "[class*='single-source'], [class*='source-item']".to_string(),
            source_loading: "[class*='source'] [role='progressbar'], [class*='source'] mat-spinner".to_string(),
            studio_anchor_text: "Audio Overview".to_string(),
            studio_toggle_labels: labels(&["Studio"]),
            reports_card_labels: labels(&["Reports"]),
            dialog: "mat-dialog-container, [role='dialog']".to_string(),
            report_picker_marker: "Create report".to_string(),
            format_edit_label_prefix: "Edit ".to_string(),
            format_edit_button: "button[aria-label=\"Edit {name}\"], button[mattooltip=\"Edit {name}\"]".to_string(),
            description_textarea: "textarea".to_string(),
            generate_labels: labels(&["Generate"]),
            artifact_item: "button.artifact-button-content".to_string(),
            artifact_generating: "[aria-label*='Generating' i], [class*='generating' i], .progress-indicator".to_string(),
            artifact_failed: "[class*='artifact'][class*='error' i], [aria-label*='failed' i]".to_string(),
            artifact_body: "[class*='artifact-content'], [class*='note-content'], .markdown".to_string(),
            audio_customize: "button[aria-label='Customize Audio Overview']".to_string(),
            audio_player: "audio-player, [class*='audio-player']".to_string(),
            audio_download: "button[aria-label*='Download' i], a[aria-label*='Download' i]".to_string(),
            overlay: ".cdk-overlay-backdrop.cdk-overlay-backdrop-showing".to_string(),
            close_labels: labels(&["Close"]),
        }
    }
}

impl UiSelectors {
    /// 可以直接在页面上计数的 CSS 选择器，用于界面改版后的排查
    pub fn css_selectors(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("home_marker", self.home_marker.as_str()),
            ("title_input", self.title_input.as_str()),
            ("file_input", self.file_input.as_str()),
            ("source_item", self.source_item.as_str()),
            ("source_loading", self.source_loading.as_str()),
            ("dialog", self.dialog.as_str()),
            ("description_textarea", self.description_textarea.as_str()),
            ("artifact_item", self.artifact_item.as_str()),
            ("artifact_generating", self.artifact_generating.as_str()),
            ("artifact_failed", self.artifact_failed.as_str()),
            ("artifact_body", self.artifact_body.as_str()),
            ("audio_customize", self.audio_customize.as_str()),
            ("audio_player", self.audio_player.as_str()),
            ("audio_download", self.audio_download.as_str()),
            ("overlay", self.overlay.as_str()),
        ]
    }

    /// 按可见文字 / aria-label 查找的按钮
    pub fn label_groups(&self) -> Vec<(&'static str, &[String])> {
        vec![
            ("new_workspace_labels", self.new_workspace_labels.as_slice()),
            ("add_source_labels", self.add_source_labels.as_slice()),
            ("upload_choice_labels", self.upload_choice_labels.as_slice()),
            ("insert_labels", self.insert_labels.as_slice()),
            ("studio_toggle_labels", self.studio_toggle_labels.as_slice()),
            ("reports_card_labels", self.reports_card_labels.as_slice()),
            ("generate_labels", self.generate_labels.as_slice()),
            ("close_labels", self.close_labels.as_slice()),
        ]
    }
}

impl Config {
    /// 加载配置：TOML 文件（可选）→ 环境变量覆盖 → 校验
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(port) = env_parse::<u16>("BROWSER_DEBUG_PORT")? {
            self.browser_debug_port = port;
        }
        if let Some(launch) = env_parse::<bool>("LAUNCH_BROWSER")? {
            self.launch_browser = launch;
        }
        if let Ok(dir) = std::env::var("USER_DATA_DIR") {
            self.user_data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("TARGET_URL") {
            self.target_url = url;
        }
        if let Ok(dir) = std::env::var("OUTPUT_ROOT") {
            self.output_root = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("BOOKS_DIR") {
            self.books_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DOWNLOADS_DIR") {
            self.downloads_dir = PathBuf::from(dir);
        }
        if let Some(hours) = env_parse::<u64>("PDF_MAX_AGE_HOURS")? {
            self.pdf_max_age_hours = hours;
        }
        if let Some(verbose) = env_parse::<bool>("VERBOSE_LOGGING")? {
            self.verbose_logging = verbose;
        }
        if let Ok(formats) = std::env::var("REPORT_FORMATS") {
            self.report_formats = formats
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(accept) = env_parse::<bool>("ACCEPT_PARTIAL_REPORTS")? {
            self.accept_partial_reports = accept;
        }
        if let Ok(ffmpeg) = std::env::var("FFMPEG_PATH") {
            self.transcode.ffmpeg_path = ffmpeg;
        }
        Ok(self)
    }

    /// 检查明显不合理的配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.poll_interval_ms == 0 || self.timeouts.audio_poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("轮询间隔必须大于 0".to_string()));
        }
        if self.obstruction.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("遮挡层轮询间隔必须大于 0".to_string()));
        }
        if let Some(name) = self.report_formats.iter().find(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("报告格式名称不能为空: {:?}", name)));
        }
        if let Some(stage) = self.retry.zero_attempt_stage() {
            return Err(ConfigError::Invalid(format!(
                "max_attempts 必须大于 0: retry.{}",
                stage
            )));
        }
        if let Some(command) = &self.claim_command {
            if command.is_empty() {
                return Err(ConfigError::Invalid("claim_command 不能为空数组".to_string()));
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn default_profile_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_default()
        .join(".notebook-batch")
        .join("chrome-profile")
}

fn default_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Backoff, Stage};

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.report_formats, vec!["Briefing Doc", "Study Guide"]);
        assert_eq!(config.obstruction.max_forced_attempts, 3);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            report_formats = ["Study Guide"]
            accept_partial_reports = true

            [timeouts]
            audio_generation_secs = 900

            [retry.await_audio]
            max_attempts = 2
            backoff = { kind = "fixed", delay_ms = 60000 }

            [selectors]
            overlay = ".my-overlay"
            "#,
        )
        .unwrap();

        assert_eq!(config.report_formats, vec!["Study Guide"]);
        assert!(config.accept_partial_reports);
        assert_eq!(config.timeouts.audio_generation_secs, 900);
        assert_eq!(config.timeouts.report_generation_secs, 300);
        assert_eq!(config.selectors.overlay, ".my-overlay");
        assert_eq!(config.selectors.title_input, "input.title-input");
        let policy = config.retry.for_stage(Stage::AudioRequested);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.backoff, Backoff::Fixed { delay_ms: 60_000 });
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = Config::default();
        config.timeouts.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        let mut config = Config::default();
        config.retry.default.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.retry.export = Some(crate::models::RetryPolicy::fixed(0, Duration::ZERO));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.export"));
    }

    #[test]
    fn default_dirs_are_absolute_when_home_is_known() {
        if dirs::home_dir().is_none() {
            return;
        }
        let config = Config::default();
        assert!(config.downloads_dir.is_absolute());
        assert!(config.user_data_dir.is_absolute());
    }

    #[test]
    fn diagnostic_selector_names_follow_overrides() {
        let config = Config::from_toml_str(
            r#"
            [selectors]
            overlay = ".my-overlay"
            close_labels = ["Dismiss"]
            "#,
        )
        .unwrap();
        let css = config.selectors.css_selectors();
        assert!(css.contains(&("overlay", ".my-overlay")));
        assert!(css.iter().all(|(_, selector)| !selector.contains("{name}")));
        let (_, close) = config
            .selectors
            .label_groups()
            .into_iter()
            .find(|(name, _)| *name == "close_labels")
            .unwrap();
        assert_eq!(close, ["Dismiss".to_string()]);
    }

    #[test]
    fn blank_format_name_is_rejected() {
        let mut config = Config::default();
        config.report_formats.push("  ".to_string());
        assert!(config.validate().is_err());
    }
}
