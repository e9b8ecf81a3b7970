//! 趋势分析结果
//!
//! 步骤 1 的产物，生成后不可变，供标题和大纲生成使用

use serde::{Deserialize, Serialize};

/// 竞争程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Competition {
    Low,
    #[default]
    Medium,
    High,
}

impl Competition {
    pub fn label(self) -> &'static str {
        match self {
            Competition::Low => "低",
            Competition::Medium => "中",
            Competition::High => "高",
        }
    }
}

/// 竞品文章
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorArticle {
    pub title: String,
    pub url: String,
    pub domain: String,
    pub word_count: usize,
    #[serde(default)]
    pub headings: Vec<String>,
}

/// 竞品分析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorAnalysis {
    #[serde(default)]
    pub top_articles: Vec<CompetitorArticle>,
    #[serde(default)]
    pub average_word_count: usize,
    #[serde(default)]
    pub common_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SeoData {
    #[serde(default)]
    pub difficulty: u8,
    #[serde(default)]
    pub recommended_word_count: usize,
    #[serde(default)]
    pub top_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserInterest {
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

/// 趋势分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysisResult {
    pub keyword: String,
    pub trend_score: f64,
    pub search_volume: u64,
    #[serde(default)]
    pub competition: Competition,
    /// 有序，生成章节时取前 5 个
    #[serde(default)]
    pub related_keywords: Vec<String>,
    #[serde(default)]
    pub hot_topics: Vec<String>,
    #[serde(default)]
    pub competitor_analysis: CompetitorAnalysis,
    #[serde(default)]
    pub seo_data: SeoData,
    #[serde(default)]
    pub user_interest: UserInterest,
}

impl TrendAnalysisResult {
    /// 竞品标题列表
    pub fn competitor_titles(&self) -> impl Iterator<Item = &str> {
        self.competitor_analysis
            .top_articles
            .iter()
            .map(|a| a.title.as_str())
    }

    /// 竞品小标题（去重，保持顺序）
    pub fn competitor_headings(&self, limit: usize) -> Vec<String> {
        let mut seen = Vec::new();
        for heading in self
            .competitor_analysis
            .top_articles
            .iter()
            .flat_map(|a| a.headings.iter())
        {
            if !seen.contains(heading) {
                seen.push(heading.clone());
            }
            if seen.len() >= limit {
                break;
            }
        }
        seen
    }
}
