//! 文章写入服务 - 业务能力层
//!
//! 只负责"把一篇文章写成 markdown 文件"，不关心流程

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{Article, ArticleStatus};

/// 文件头部的 TOML front matter
#[derive(Debug, Serialize)]
struct FrontMatter<'a> {
    title: &'a str,
    keywords: &'a [String],
    excerpt: &'a str,
    word_count: usize,
    status: ArticleStatus,
    created_at: DateTime<Utc>,
}

/// 文章写入服务
pub struct ArticleWriter {
    output_dir: PathBuf,
}

impl ArticleWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 写入文章，返回文件路径
    ///
    /// 文件名为 `<name>.md`，同名文件会被覆盖
    pub fn write(&self, name: &str, article: &Article) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| AppError::file_write_failed(self.output_dir.display().to_string(), e))?;

        let path = self.output_dir.join(format!("{}.md", sanitize_file_name(name)));
        debug!("写入文章: {} ({} 字)", path.display(), article.word_count);

        let document = render(article)?;
        fs::write(&path, document).map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        Ok(path)
    }
}

/// `+++` 包裹的 front matter + 标题 + 正文
pub fn render(article: &Article) -> AppResult<String> {
    let front_matter = toml::to_string(&FrontMatter {
        title: &article.title,
        keywords: &article.keywords,
        excerpt: &article.excerpt,
        word_count: article.word_count,
        status: article.status,
        created_at: article.created_at,
    })
    .map_err(crate::error::FileError::from)?;

    Ok(format!(
        "+++\n{}+++\n\n# {}\n\n{}\n",
        front_matter,
        article.title,
        article.content.trim_end()
    ))
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "article".to_string()
    } else {
        cleaned
    }
}
