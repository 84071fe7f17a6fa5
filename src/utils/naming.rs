//! 文件名 / 标题处理

use std::sync::OnceLock;

use regex::Regex;

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\-]+").expect("合法的正则"))
}

fn repeated_underscores() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_+").expect("合法的正则"))
}

/// 把标题转换为可以安全用作文件名的字符串（不含扩展名）
///
/// - 非字母数字 / 连字符 / 下划线的字符替换为 `_`
/// - 连续下划线合并，去掉首尾下划线
/// - 结果为空时返回 `untitled`
pub fn sanitize_filename(title: &str) -> String {
    let replaced = unsafe_chars().replace_all(title.trim(), "_");
    let collapsed = repeated_underscores().replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 章节文件名 → 展示名：`Chapter_03_Ownership` → `Chapter 03 Ownership`
pub fn chapter_display_name(stem: &str) -> String {
    stem.split('_')
        .filter(|part| !part.is_empty())
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_and_collapses() {
        assert_eq!(
            sanitize_filename("  Rust in Action — Chapter 01: Intro!  "),
            "Rust_in_Action_Chapter_01_Intro"
        );
        assert_eq!(sanitize_filename("a__b--c"), "a_b--c");
    }

    #[test]
    fn sanitize_falls_back_to_untitled() {
        assert_eq!(sanitize_filename("???"), "untitled");
        assert_eq!(sanitize_filename(""), "untitled");
    }

    #[test]
    fn chapter_names_are_title_cased() {
        assert_eq!(
            chapter_display_name("Chapter_03_OWNERSHIP_and_borrowing"),
            "Chapter 03 Ownership And Borrowing"
        );
        assert_eq!(chapter_display_name("Part_2"), "Part 2");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("章节标题很长", 4), "章节标题...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}
