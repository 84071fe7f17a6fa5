//! 错误类型定义
//!
//! - `ProbeError`：单次界面观察失败，区分"还没就绪"与"界面不可达"
//! - `SurfaceUnavailable`：运行级致命错误，终止整个批次
//! - `AppError`：应用层错误（浏览器、配置、界面不可达）
//! - `ArtifactError`：导出文件校验失败
//! - `TranscodeError`：音频转码失败

use chromiumoxide::error::CdpError;
use thiserror::Error;

/// 单次界面观察（predicate / action）的失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// 界面暂未就绪（元素未出现、脚本异常等），轮询时视为"条件尚未满足"
    #[error("界面未就绪: {0}")]
    NotReady(String),
    /// 界面不可达（连接断开、页面已关闭），对整个运行是致命的
    #[error("界面不可达: {0}")]
    Unavailable(String),
}

impl ProbeError {
    pub fn not_ready(reason: impl Into<String>) -> Self {
        ProbeError::NotReady(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        ProbeError::Unavailable(reason.into())
    }

    /// 把不可达错误提升为运行级错误，其余情况原样返回
    pub fn escalate(self) -> Result<String, SurfaceUnavailable> {
        match self {
            ProbeError::NotReady(reason) => Ok(reason),
            ProbeError::Unavailable(reason) => Err(SurfaceUnavailable::new(reason)),
        }
    }
}

/// 外部界面不可达 —— 整个运行无法继续
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("外部界面不可达: {reason}")]
pub struct SurfaceUnavailable {
    pub reason: String,
}

impl SurfaceUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<SurfaceUnavailable> for ProbeError {
    fn from(err: SurfaceUnavailable) -> Self {
        ProbeError::Unavailable(err.reason)
    }
}

// 连接层面的错误（websocket 断开、通道关闭、无响应）意味着浏览器已经不在了，
// 其余错误（节点不存在、脚本异常等）都只是页面暂时没准备好
impl From<CdpError> for ProbeError {
    fn from(err: CdpError) -> Self {
        match err {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                ProbeError::Unavailable(err.to_string())
            }
            other => ProbeError::NotReady(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::NotReady(format!("脚本返回值解析失败: {}", err))
    }
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: CdpError,
    },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {0}")]
    LaunchFailed(String),
    /// 创建页面失败
    #[error("创建页面失败: {source}")]
    PageCreationFailed {
        #[source]
        source: CdpError,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: CdpError,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置内容不合法
    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 导出产物校验失败
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("文件不存在: {path}")]
    Missing { path: String },
    #[error("文件为空: {path}")]
    Empty { path: String },
    #[error("无法识别的音频格式 '{extension}': {path}")]
    UnrecognisedFormat { path: String, extension: String },
    /// 文件头与扩展名不符，通常是下载不完整或内容损坏
    #[error("{format} 文件头不匹配，文件可能已损坏: {path}")]
    CorruptHeader { path: String, format: String },
    #[error("读取文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 音频转码错误
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// 找不到 ffmpeg 可执行文件
    #[error("未找到 FFmpeg ({program})，请确认已安装并在 PATH 中")]
    FfmpegMissing { program: String },
    /// 转码超时
    #[error("FFmpeg 转码超时 ({seconds}秒): {input}")]
    TimedOut { input: String, seconds: u64 },
    /// ffmpeg 返回非零退出码
    #[error("FFmpeg 转码失败 (退出码 {code:?}): {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    /// 启动进程失败
    #[error("无法启动 FFmpeg: {0}")]
    Io(#[from] std::io::Error),
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 外部界面不可达
    #[error(transparent)]
    Surface(#[from] SurfaceUnavailable),
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// 尽力而为的动作只吞掉"尚未就绪"
    fn best_effort(result: Result<bool, ProbeError>) -> Result<(), ProbeError> {
        if let Err(err) = result {
            err.escalate()?;
        }
        Ok(())
    }

    #[test]
    fn best_effort_keeps_unavailable() {
        assert!(best_effort(Err(ProbeError::not_ready("没有关闭按钮"))).is_ok());
        assert_eq!(
            best_effort(Err(ProbeError::unavailable("websocket closed"))),
            Err(ProbeError::Unavailable("websocket closed".into()))
        );
    }

    #[test]
    fn escalate_keeps_not_ready_reason() {
        let reason = ProbeError::not_ready("按钮未出现").escalate().unwrap();
        assert_eq!(reason, "按钮未出现");
    }

    #[test]
    fn escalate_turns_unavailable_into_run_error() {
        let err = ProbeError::unavailable("websocket closed")
            .escalate()
            .unwrap_err();
        assert_eq!(err.reason, "websocket closed");
    }

    #[test]
    fn cdp_no_response_is_unavailable() {
        let probe: ProbeError = CdpError::NoResponse.into();
        assert!(matches!(probe, ProbeError::Unavailable(_)));
    }

    #[test]
    fn cdp_not_found_is_not_ready() {
        let probe: ProbeError = CdpError::NotFound.into();
        assert!(matches!(probe, ProbeError::NotReady(_)));
    }
}
