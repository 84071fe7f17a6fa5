//! 条目处理上下文
//!
//! 封装"我正在处理第几个条目、它的文件写到哪里"这一信息

use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::models::WorkItem;
use crate::utils::sanitize_filename;

/// 条目处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 条目序号（从1开始，仅用于日志显示）
    pub index: usize,

    /// 本次运行的条目总数
    pub total: usize,

    /// 条目标题
    pub title: String,

    /// 该条目的输出目录，只有这个条目会写入
    pub item_dir: PathBuf,
}

impl ItemCtx {
    /// 创建新的条目上下文
    pub fn new(index: usize, total: usize, item: &WorkItem, run_dir: &Path) -> Self {
        let dir_name = format!("{:03}_{}", index, sanitize_filename(&item.title));
        Self {
            index,
            total,
            title: item.title.clone(),
            item_dir: run_dir.join(dir_name),
        }
    }

    /// 导出文件的基础名称（不含扩展名）
    pub fn file_stem(&self) -> String {
        sanitize_filename(&self.title)
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[条目 {}/{}]", self.index, self.total)
    }
}
