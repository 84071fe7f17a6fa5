//! 导出服务 - 业务能力层
//!
//! - AudioReady → Exported：把报告和音频取回到条目目录，校验文件，按需转码为 MP3
//! - Exported → Done：重新校验磁盘上的产物，界面回到主页
//!
//! 这是唯一一个不依赖界面就能确认结果的阶段。所有文件只写入该条目自己的目录。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ArtifactError, ProbeError, SurfaceUnavailable, TranscodeError};
use crate::infrastructure::{ArtifactKind, ArtifactStatus, Retrieval};
use crate::models::{StageResult, WorkItem};
use crate::services::artifact_verifier::{verify_audio, verify_non_empty, AudioFormat};
use crate::services::interaction::{conclude, Interaction, StepContext, StepError, StepResult};
use crate::services::transcoder::Transcoder;
use crate::utils::sanitize_filename;
use crate::workflow::ItemCtx;

/// 浏览器下载过程中的临时文件后缀
const PARTIAL_SUFFIXES: [&str; 3] = ["crdownload", "part", "tmp"];

impl From<ArtifactError> for StepError {
    fn from(err: ArtifactError) -> Self {
        StepError::Retry(err.to_string())
    }
}

impl From<TranscodeError> for StepError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::FfmpegMissing { .. } => StepError::Fatal(err.to_string()),
            other => StepError::Retry(other.to_string()),
        }
    }
}

/// 导出服务
pub struct ExportService {
    formats: Vec<String>,
    accept_partial: bool,
    transcode: bool,
    transcoder: Box<dyn Transcoder>,
}

impl ExportService {
    pub fn new(config: &Config, transcoder: Box<dyn Transcoder>) -> Self {
        Self {
            formats: config.report_formats.clone(),
            accept_partial: config.accept_partial_reports,
            transcode: config.transcode.enabled,
            transcoder,
        }
    }

    /// 取回并校验全部产物
    pub async fn export(
        &self,
        ui: &Interaction<'_>,
        _item: &WorkItem,
        ctx: &ItemCtx,
    ) -> Result<StageResult, SurfaceUnavailable> {
        let outcome = self.export_all(ui, ctx).await;
        conclude(outcome, Vec::new())
    }

    async fn export_all(&self, ui: &Interaction<'_>, ctx: &ItemCtx) -> StepResult<()> {
        let dir = &ctx.item_dir;
        fs::create_dir_all(dir)
            .await
            .map_err(|e| StepError::Retry(format!("创建目录失败 ({}): {}", dir.display(), e)))?;

        for format in &self.formats {
            let kind = ArtifactKind::Report(format.clone());
            let status = ui
                .surface
                .artifact_status(&kind)
                .await
                .step(&format!("读取报告「{}」状态", format))?;
            if let ArtifactStatus::Failed(_) = status {
                if self.accept_partial {
                    warn!("{} ⚠️ 报告「{}」生成失败，跳过导出", ctx, format);
                    continue;
                }
                return Err(StepError::Retry(format!("报告「{}」生成失败，无法导出", format)));
            }

            let path = self.export_report(ui, ctx, format).await?;
            let size = verify_non_empty(&path).await?;
            info!("{} 💾 报告「{}」已保存: {} ({} 字节)", ctx, format, path.display(), size);
        }

        let audio = self.export_audio(ui, ctx).await?;
        info!("{} 🎧 音频已保存: {}", ctx, audio.display());
        Ok(())
    }

    async fn export_report(
        &self,
        ui: &Interaction<'_>,
        ctx: &ItemCtx,
        format: &str,
    ) -> StepResult<PathBuf> {
        let dir = &ctx.item_dir;
        let stem = sanitize_filename(format);
        let before = snapshot(dir).await?;
        let kind = ArtifactKind::Report(format.to_string());

        ui.clear_obstruction().await?;
        let retrieval = ui
            .surface
            .retrieve_artifact(&kind, dir)
            .await
            .step(&format!("取回报告「{}」", format))?;

        match retrieval {
            Retrieval::Content { bytes, .. } => {
                let path = dir.join(format!("{}.md", stem));
                write_file(&path, &bytes).await?;
                Ok(path)
            }
            Retrieval::Download => {
                let downloaded = self
                    .await_download(ui, dir, &before, &format!("报告「{}」下载", format), |_| true)
                    .await?;
                let extension = downloaded
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_else(|| "md".to_string());
                rename_to(&downloaded, &dir.join(format!("{}.{}", stem, extension))).await
            }
        }
    }

    async fn export_audio(&self, ui: &Interaction<'_>, ctx: &ItemCtx) -> StepResult<PathBuf> {
        let dir = &ctx.item_dir;
        let stem = ctx.file_stem();
        let before = snapshot(dir).await?;

        ui.clear_obstruction().await?;
        let retrieval = ui
            .surface
            .retrieve_artifact(&ArtifactKind::Audio, dir)
            .await
            .step("取回音频")?;

        let raw = match retrieval {
            Retrieval::Content { file_name, bytes } => {
                let path = dir.join(file_name);
                write_file(&path, &bytes).await?;
                path
            }
            Retrieval::Download => {
                self.await_download(ui, dir, &before, "音频下载", is_audio_file)
                    .await?
            }
        };

        let format = match verify_audio(&raw).await {
            Ok(format) => format,
            Err(err) => {
                // 留在目录里会进入下次快照，重试就再也认不出新下载
                discard(&raw).await;
                return Err(err.into());
            }
        };
        let audio = rename_to(&raw, &dir.join(format!("{}.{}", stem, format.extension()))).await?;
        debug!("{} 音频格式: {}", ctx, format);

        if format == AudioFormat::Mp3 || !self.transcode {
            return Ok(audio);
        }

        let mp3 = dir.join(format!("{}.mp3", stem));
        info!("{} 🔄 转码为 MP3: {}", ctx, mp3.display());
        self.transcoder.to_mp3(&audio, &mp3).await?;
        verify_audio(&mp3).await?;
        Ok(mp3)
    }

    /// 等待目录中出现新的、下载完成的文件
    async fn await_download(
        &self,
        ui: &Interaction<'_>,
        dir: &Path,
        before: &HashSet<PathBuf>,
        what: &str,
        accept: fn(&Path) -> bool,
    ) -> StepResult<PathBuf> {
        ui.wait_for(
            what,
            ui.patience(ui.timeouts.download_secs),
            move || async move {
                Ok::<_, ProbeError>(new_file(dir, before, accept).await.is_some())
            },
        )
        .await?;

        new_file(dir, before, accept)
            .await
            .ok_or_else(|| StepError::Retry(format!("{}: 未找到下载文件", what)))
    }

    /// 重新校验导出文件，并让界面回到主页
    pub async fn finalize(
        &self,
        ui: &Interaction<'_>,
        _item: &WorkItem,
        ctx: &ItemCtx,
    ) -> Result<StageResult, SurfaceUnavailable> {
        let outcome = self.finalize_item(ui, ctx).await;
        conclude(outcome, Vec::new())
    }

    async fn finalize_item(&self, ui: &Interaction<'_>, ctx: &ItemCtx) -> StepResult<()> {
        let dir = &ctx.item_dir;
        let files = list_files(dir).await?;

        for format in &self.formats {
            let stem = sanitize_filename(format);
            match files.iter().find(|p| file_stem(p) == stem) {
                Some(report) => {
                    verify_non_empty(report).await?;
                }
                None if self.accept_partial => {
                    debug!("{} 报告「{}」未导出，按配置忽略", ctx, format);
                }
                None => {
                    return Err(StepError::Fatal(format!("导出的报告「{}」不存在", format)));
                }
            }
        }

        let stem = ctx.file_stem();
        let audio: Vec<&PathBuf> = files
            .iter()
            .filter(|p| file_stem(p) == stem && is_audio_file(p))
            .collect();
        if audio.is_empty() {
            return Err(StepError::Fatal(format!(
                "导出的音频不存在: {}/{}.*",
                dir.display(),
                stem
            )));
        }
        for path in audio {
            verify_audio(path).await?;
        }

        if let Err(err) = ui.surface.return_home().await {
            let reason = err.escalate()?;
            warn!("{} ⚠️ 返回主页失败: {}", ctx, reason);
        }

        info!("{} ✅ 产物校验通过: {}", ctx, dir.display());
        Ok(())
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .map(|e| {
            let e = e.to_string_lossy().to_ascii_lowercase();
            PARTIAL_SUFFIXES.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| AudioFormat::from_extension(&e.to_string_lossy()))
        .is_some()
}

async fn list_files(dir: &Path) -> StepResult<Vec<PathBuf>> {
    let io_err = |e: std::io::Error| StepError::Retry(format!("读取目录失败 ({}): {}", dir.display(), e));
    let mut files = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(io_err(e)),
    };
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn snapshot(dir: &Path) -> StepResult<HashSet<PathBuf>> {
    Ok(list_files(dir).await?.into_iter().collect())
}

/// 目录中第一个不在快照里、已下载完成且非空的文件
async fn new_file(
    dir: &Path,
    before: &HashSet<PathBuf>,
    accept: fn(&Path) -> bool,
) -> Option<PathBuf> {
    let files = list_files(dir).await.ok()?;
    for path in files {
        if before.contains(&path) || is_partial(&path) || !accept(&path) {
            continue;
        }
        if verify_non_empty(&path).await.is_ok() {
            return Some(path);
        }
    }
    None
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!("⚠️ 删除损坏文件失败 ({}): {}", path.display(), e);
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> StepResult<()> {
    fs::write(path, bytes)
        .await
        .map_err(|e| StepError::Retry(format!("写入文件失败 ({}): {}", path.display(), e)))
}

async fn rename_to(from: &Path, to: &Path) -> StepResult<PathBuf> {
    if from != to {
        fs::rename(from, to).await.map_err(|e| {
            StepError::Retry(format!(
                "重命名失败 ({} → {}): {}",
                from.display(),
                to.display(),
                e
            ))
        })?;
    }
    Ok(to.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_downloads_are_recognised() {
        assert!(is_partial(Path::new("a/Overview.webm.crdownload")));
        assert!(is_partial(Path::new("a/x.TMP")));
        assert!(!is_partial(Path::new("a/Overview.webm")));
    }

    #[test]
    fn transcode_errors_split_into_fatal_and_retry() {
        let missing: StepError = TranscodeError::FfmpegMissing {
            program: "ffmpeg".into(),
        }
        .into();
        assert!(matches!(missing, StepError::Fatal(_)));

        let timed_out: StepError = TranscodeError::TimedOut {
            input: "a.wav".into(),
            seconds: 120,
        }
        .into();
        assert!(matches!(timed_out, StepError::Retry(_)));
    }

    #[tokio::test]
    async fn new_file_skips_snapshot_partial_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.wav");
        std::fs::write(&old, b"RIFF....WAVE").unwrap();
        let before = snapshot(dir.path()).await.unwrap();

        std::fs::write(dir.path().join("Overview.webm.crdownload"), b"x").unwrap();
        std::fs::write(dir.path().join("empty.ogg"), b"").unwrap();
        assert_eq!(new_file(dir.path(), &before, is_audio_file).await, None);

        let fresh = dir.path().join("Overview.webm");
        std::fs::write(&fresh, [0x1A, 0x45, 0xDF, 0xA3, 0, 0]).unwrap();
        assert_eq!(new_file(dir.path(), &before, is_audio_file).await, Some(fresh));
    }

    #[tokio::test]
    async fn missing_directory_lists_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = list_files(&dir.path().join("nope")).await.unwrap();
        assert!(files.is_empty());
    }
}
