//! 文章组装 - 业务能力层
//!
//! 按顺序拼接章节正文，补齐 essential 关键词、清除 ng 关键词，生成摘要

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::models::{Article, ArticleOutline, ArticleStatus};
use crate::services::keyword_guard::{missing_essential, scrub_ng, weave_essential};
use crate::services::length::{measure, strip_markdown};

/// 摘要长度（字）
pub const EXCERPT_CHARS: usize = 120;

/// 按大纲顺序用空行拼接已生成的章节正文
pub fn join_sections(outline: &ArticleOutline) -> Result<String, PipelineError> {
    if outline.sections.is_empty() {
        return Err(PipelineError::EmptyOutline);
    }

    let mut parts = Vec::with_capacity(outline.sections.len());
    for section in &outline.sections {
        match section.content.as_deref().map(str::trim) {
            Some(content) if !content.is_empty() => parts.push(content),
            _ => warn!("⚠️ 章节没有正文，跳过: {}", section.title),
        }
    }
    if parts.is_empty() {
        return Err(PipelineError::EmptyOutline);
    }
    Ok(parts.join("\n\n"))
}

/// 由最终正文构建文章
pub fn build_article(outline: &ArticleOutline, content: &str) -> Article {
    let preferences = &outline.keyword_preferences;
    let essential = preferences.essential();
    let ng = preferences.ng();

    let missing = missing_essential(content, &essential);
    let content = if missing.is_empty() {
        content.to_string()
    } else {
        debug!("补充缺失的必含关键词: {:?}", missing);
        let (lead, rest) = split_lead(content);
        let lead = weave_essential(lead, &missing);
        if rest.is_empty() {
            lead
        } else {
            format!("{}\n\n{}", lead, rest)
        }
    };
    let content = scrub_ng(&content, &ng);

    let mut keywords = vec![outline.keyword.clone()];
    for keyword in essential {
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }

    Article {
        id: uuid::Uuid::new_v4().to_string(),
        title: outline.title.clone(),
        excerpt: excerpt(split_lead(&content).0, &content),
        word_count: measure(&content),
        content,
        keywords,
        status: ArticleStatus::Draft,
        created_at: Utc::now(),
    }
}

/// 拼接 + 构建
pub fn assemble(outline: &ArticleOutline) -> Result<Article, PipelineError> {
    let content = join_sections(outline)?;
    Ok(build_article(outline, &content))
}

/// 拆分为 (导言, 其余部分)：导言是第一个标题行之前的内容
fn split_lead(content: &str) -> (&str, &str) {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            return (content[..offset].trim_end(), &content[offset..]);
        }
        offset += line.len();
    }
    (content.trim_end(), "")
}

fn excerpt(lead: &str, content: &str) -> String {
    let source = if lead.trim().is_empty() { content } else { lead };
    let plain = strip_markdown(source).replace('\n', "");
    if plain.chars().count() > EXCERPT_CHARS {
        plain.chars().take(EXCERPT_CHARS).collect::<String>() + "…"
    } else {
        plain
    }
}
