//! 音频转码 - 业务能力层
//!
//! 把下载到的音频转成 MP3，具体转码交给外部 ffmpeg

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::TranscodeSettings;
use crate::error::TranscodeError;

/// 音频转码能力
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn to_mp3(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

/// 调用 ffmpeg 转码
pub struct FfmpegTranscoder {
    program: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &TranscodeSettings) -> Self {
        Self::new(
            settings.ffmpeg_path.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_mp3(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        debug!("🎵 {} → {}", input.display(), output.display());

        let child = Command::new(&self.program)
            .arg("-i")
            .arg(input)
            .arg("-y")
            .args(["-codec:a", "libmp3lame", "-qscale:a", "2"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TranscodeError::FfmpegMissing {
                    program: self.program.clone(),
                },
                _ => TranscodeError::Io(e),
            })?;

        let result = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TranscodeError::TimedOut {
                input: input.display().to_string(),
                seconds: self.timeout.as_secs(),
            })??;

        if !result.status.success() {
            return Err(TranscodeError::Failed {
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        info!(
            "✓ 已转码: {} → {}",
            input.file_name().unwrap_or_default().to_string_lossy(),
            output.file_name().unwrap_or_default().to_string_lossy()
        );
        Ok(())
    }
}
