//! 外部领取 / 拆分命令
//!
//! 领取书籍和拆分章节由外部工具完成，这里只负责在枚举之前执行它，
//! 并在失败时中止整个运行

use std::path::Path;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::info;

/// 在 `books_dir` 作为工作目录执行领取命令；非零退出码视为失败
pub async fn run_claim_command(command: &[String], books_dir: &Path) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        anyhow::bail!("领取命令为空");
    };

    tokio::fs::create_dir_all(books_dir)
        .await
        .with_context(|| format!("无法创建章节目录: {}", books_dir.display()))?;

    info!("📦 执行领取 / 拆分命令: {}", command.join(" "));
    let output = Command::new(program)
        .args(args)
        .current_dir(books_dir)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("无法启动领取命令: {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "领取命令失败 (退出码 {:?}): {}",
            output.status.code(),
            stderr.trim()
        );
    }

    info!("✅ 领取 / 拆分完成");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let command = vec!["sh".to_string(), "-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let err = run_claim_command(&command, dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn command_runs_inside_books_dir() {
        let dir = tempfile::tempdir().unwrap();
        let books = dir.path().join("books");
        let command = vec!["sh".to_string(), "-c".to_string(), "touch claimed".to_string()];
        run_claim_command(&command, &books).await.unwrap();
        assert!(books.join("claimed").exists());
    }
}
