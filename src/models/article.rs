use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Published,
}

/// 组装完成的文章，交给下游发布 / 存储
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub keywords: Vec<String>,
    /// 实际字数（按去除 markdown 标记后的字符数计算）
    pub word_count: usize,
    pub status: ArticleStatus,
    pub created_at: DateTime<Utc>,
}
