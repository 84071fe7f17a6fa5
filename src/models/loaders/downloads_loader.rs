//! 完整模式：扫描下载目录中最近的 PDF，并按文件名主题分组
//!
//! 两个文件只要共享一个有意义的词就算相关，相关关系的连通分量即为一组，
//! 每组成为一个多来源的工作条目

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::models::work_item::SourceDocument;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "in", "on", "at", "to", "for", "with", "by", "from", "is",
    "are", "was", "were", "be", "been", "this", "that", "it", "its", "as", "up", "out", "if", "so",
    "pdf", "doc", "document", "file", "report", "paper", "draft", "final", "v1", "v2", "v3",
    "copy", "new", "old", "rev",
];

const MIN_TOKEN_LEN: usize = 3;

/// 列出下载目录中修改时间在 `max_age` 之内的 PDF；目录不存在时返回空列表
pub async fn find_recent_pdfs(downloads_dir: &Path, max_age: Duration) -> Result<Vec<PathBuf>> {
    if !downloads_dir.exists() {
        warn!("⚠️ 下载目录不存在: {}", downloads_dir.display());
        return Ok(Vec::new());
    }

    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut results = Vec::new();
    let mut entries = fs::read_dir(downloads_dir)
        .await
        .with_context(|| format!("无法读取下载目录: {}", downloads_dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("无法读取文件信息 {}: {}", path.display(), e);
                continue;
            }
        };
        match metadata.modified() {
            Ok(mtime) if mtime >= cutoff => results.push(path),
            Ok(_) => {}
            Err(e) => warn!("无法读取修改时间 {}: {}", path.display(), e),
        }
    }

    results.sort();
    Ok(results)
}

/// 文件名 → 有意义的小写词
///
/// 按 `_`、`-`、空白切分，再在数字和字母的边界处切开（`report2024` → `report`, `2024`）
pub fn tokenize(stem: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for part in stem.split(|c: char| c == '_' || c == '-' || c.is_whitespace()) {
        for piece in split_digit_boundaries(part) {
            let token = piece.to_lowercase();
            if token.chars().count() >= MIN_TOKEN_LEN
                && !STOP_WORDS.contains(&token.as_str())
                && !token.chars().all(|c| c.is_ascii_digit())
            {
                tokens.push(token);
            }
        }
    }
    tokens
}

fn split_digit_boundaries(part: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut previous: Option<bool> = None;
    for (idx, c) in part.char_indices() {
        let is_digit = c.is_ascii_digit();
        if let Some(prev) = previous {
            if prev != is_digit {
                pieces.push(&part[start..idx]);
                start = idx;
            }
        }
        previous = Some(is_digit);
    }
    if start < part.len() {
        pieces.push(&part[start..]);
    }
    pieces
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn topic_from_stem(stem: &str) -> String {
    let tokens = tokenize(stem);
    if !tokens.is_empty() {
        return title_case(&tokens.join(" "));
    }
    let spaced: String = stem
        .split(|c| c == '_' || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    title_case(spaced.trim())
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// 按主题分组；每个文件恰好出现在一个组里，组内保持输入顺序
pub fn group_by_topic(paths: &[PathBuf]) -> Vec<SourceDocument> {
    let token_sets: Vec<BTreeSet<String>> = paths
        .iter()
        .map(|p| tokenize(&stem_of(p)).into_iter().collect())
        .collect();

    let mut visited = vec![false; paths.len()];
    let mut groups = Vec::new();

    for start in 0..paths.len() {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(node) = stack.pop() {
            component.push(node);
            for other in 0..paths.len() {
                if !visited[other] && !token_sets[node].is_disjoint(&token_sets[other]) {
                    visited[other] = true;
                    stack.push(other);
                }
            }
        }
        component.sort_unstable();

        let mut common: Option<BTreeSet<String>> = None;
        for &idx in &component {
            common = Some(match common {
                None => token_sets[idx].clone(),
                Some(acc) => acc.intersection(&token_sets[idx]).cloned().collect(),
            });
        }
        let common = common.unwrap_or_default();
        let topic = if common.is_empty() {
            topic_from_stem(&stem_of(&paths[component[0]]))
        } else {
            title_case(&common.into_iter().collect::<Vec<_>>().join(" "))
        };

        let members: Vec<PathBuf> = component.iter().map(|&i| paths[i].clone()).collect();
        debug!("主题 '{}' 包含 {} 个文件", topic, members.len());
        groups.push(SourceDocument::group(topic, members));
    }

    groups
}

/// 扫描下载目录并分组，排除已经出现在其他来源中的文件
pub async fn load_download_groups(
    downloads_dir: &Path,
    max_age: Duration,
    exclude: &HashSet<PathBuf>,
) -> Result<Vec<SourceDocument>> {
    let pdfs: Vec<PathBuf> = find_recent_pdfs(downloads_dir, max_age)
        .await?
        .into_iter()
        .filter(|p| !exclude.contains(p))
        .collect();
    let groups = group_by_topic(&pdfs);
    info!(
        "📥 下载目录中找到 {} 个最近的 PDF，分为 {} 组",
        pdfs.len(),
        groups.len()
    );
    Ok(groups)
}
