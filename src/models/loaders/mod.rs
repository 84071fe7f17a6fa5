//! 工作条目来源
//!
//! - 续跑模式：只读取已拆分好的章节目录
//! - 完整模式：先执行外部领取 / 拆分命令，再读取章节目录和下载目录中最近的 PDF

pub mod chapter_loader;
pub mod claim_command;
pub mod downloads_loader;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::models::work_item::SourceDocument;

pub use chapter_loader::{is_junk_chapter, list_chapter_files, load_chapter_documents};
pub use claim_command::run_claim_command;
pub use downloads_loader::{find_recent_pdfs, group_by_topic, load_download_groups, tokenize};

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// 领取 + 拆分 + 处理
    Full,
    /// 跳过领取和拆分，直接处理已有章节
    Resume,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Full => write!(f, "完整模式"),
            RunMode::Resume => write!(f, "续跑模式"),
        }
    }
}

/// 按运行模式收集源文档，顺序即处理顺序
pub async fn collect_documents(mode: RunMode, config: &Config) -> Result<Vec<SourceDocument>> {
    match mode {
        RunMode::Resume => load_chapter_documents(&config.books_dir).await,
        RunMode::Full => {
            if let Some(command) = &config.claim_command {
                run_claim_command(command, &config.books_dir).await?;
            }

            let mut documents = if config.books_dir.exists() {
                load_chapter_documents(&config.books_dir).await?
            } else {
                Vec::new()
            };

            let known: HashSet<PathBuf> = documents
                .iter()
                .flat_map(|d| d.paths.iter().cloned())
                .collect();
            documents.extend(
                load_download_groups(&config.downloads_dir, max_age(config), &known).await?,
            );
            Ok(documents)
        }
    }
}

fn max_age(config: &Config) -> Duration {
    Duration::from_secs(config.pdf_max_age_hours.saturating_mul(3600))
}
