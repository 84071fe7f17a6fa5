//! 续跑模式：从已拆分好的章节目录枚举工作条目
//!
//! 目录约定：`books_dir/<书名>/Chapter_*.pdf`，其次 `Part_*.pdf`，各自按文件名排序

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::fs;
use tracing::{info, warn};

use crate::models::work_item::SourceDocument;
use crate::utils::chapter_display_name;

/// 前言、版权页、目录、索引等非正文章节
fn junk_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let sep = r"[_\s-]*";
        let patterns = [
            "cover".to_string(),
            format!("title{sep}page"),
            format!("copy{sep}right"),
            "credits".to_string(),
            "preface".to_string(),
            "foreword".to_string(),
            "acknowledge?ment".to_string(),
            format!("table{sep}of{sep}contents"),
            r"\btoc\b".to_string(),
            format!("who{sep}is{sep}this{sep}book{sep}for"),
            format!("about{sep}the{sep}(author|reviewer)"),
            "contributors".to_string(),
            format!("join{sep}our{sep}(discord|community)"),
            format!("other{sep}books{sep}you{sep}may{sep}enjoy"),
            format!("packt{sep}page"),
            "dedication".to_string(),
            "index$".to_string(),
        ];
        Regex::new(&format!("(?i){}", patterns.join("|"))).expect("合法的正则")
    })
}

/// 章节文件名是否属于非正文内容
pub fn is_junk_chapter(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| junk_pattern().is_match(&stem.to_string_lossy()))
        .unwrap_or(false)
}

/// 列出一本书目录下的章节文件（Chapter_* 在前，Part_* 在后）
pub async fn list_chapter_files(book_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut chapters = Vec::new();
    let mut parts = Vec::new();

    let mut entries = fs::read_dir(book_dir)
        .await
        .with_context(|| format!("无法读取目录: {}", book_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if !name.to_lowercase().ends_with(".pdf") {
            continue;
        }
        if name.starts_with("Chapter_") {
            chapters.push(path);
        } else if name.starts_with("Part_") {
            parts.push(path);
        }
    }

    chapters.sort();
    parts.sort();
    chapters.extend(parts);
    Ok(chapters)
}

/// 枚举 `books_dir` 下所有书的章节，按书名排序；没有章节的书会被跳过
pub async fn load_chapter_documents(books_dir: &Path) -> Result<Vec<SourceDocument>> {
    if !books_dir.exists() {
        anyhow::bail!("章节目录不存在: {}", books_dir.display());
    }

    let mut book_dirs = Vec::new();
    let mut entries = fs::read_dir(books_dir)
        .await
        .with_context(|| format!("无法读取章节目录: {}", books_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_dir() {
            book_dirs.push(path);
        }
    }
    book_dirs.sort();

    let mut documents = Vec::new();
    for book_dir in book_dirs {
        let book = book_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let files = list_chapter_files(&book_dir).await?;
        if files.is_empty() {
            warn!("⚠️ '{}' 中没有章节 PDF，跳过", book);
            continue;
        }

        let mut kept = 0;
        for file in files {
            if is_junk_chapter(&file) {
                tracing::debug!("跳过非正文章节: {}", file.display());
                continue;
            }
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            documents.push(SourceDocument::chapter(
                book.clone(),
                chapter_display_name(&stem),
                file,
            ));
            kept += 1;
        }
        info!("📚 发现书籍: {} ({} 个章节)", book, kept);
    }

    info!("共收集 {} 个章节，来自 {}", documents.len(), books_dir.display());
    Ok(documents)
}
