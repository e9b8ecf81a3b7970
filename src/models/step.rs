use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::article::Article;
use crate::models::outline::ArticleOutline;
use crate::models::title::TitleSuggestion;
use crate::models::trend::TrendAnalysisResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// 步骤产物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepData {
    Trend(TrendAnalysisResult),
    Titles(Vec<TitleSuggestion>),
    Outline(ArticleOutline),
    Article(Article),
    /// 失败信息
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 1-4
    pub step: u8,
    pub status: StepStatus,
    pub data: StepData,
    pub timestamp: DateTime<Utc>,
}

impl StepResult {
    pub fn completed(step: u8, data: StepData) -> Self {
        Self {
            step,
            status: StepStatus::Completed,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(step: u8, message: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            data: StepData::Error(message.into()),
            timestamp: Utc::now(),
        }
    }
}
