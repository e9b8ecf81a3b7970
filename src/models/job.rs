use serde::{Deserialize, Serialize};

use crate::models::keyword::KeywordPreferences;
use crate::models::options::{ArticleLength, GenerationOptions};

/// 一个无人值守的文章生成任务（来自 TOML 文件）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub target_word_count: Option<usize>,
    #[serde(default)]
    pub article_length: ArticleLength,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub selected_title: Option<String>,
    #[serde(default)]
    pub essential_keywords: Vec<String>,
    #[serde(default)]
    pub ng_keywords: Vec<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
    /// 文件路径（加载时填充）
    #[serde(skip)]
    pub file_path: Option<String>,
}

impl GenerationJob {
    pub fn options(&self) -> GenerationOptions {
        let default = GenerationOptions::default();
        GenerationOptions {
            tone: self.tone.clone().unwrap_or(default.tone),
            article_length: self.article_length,
            target_word_count: self.target_word_count,
            selected_title: self.selected_title.clone(),
            custom_instructions: self.custom_instructions.clone(),
        }
    }

    pub fn keyword_preferences(&self) -> KeywordPreferences {
        KeywordPreferences::from_lists(&self.essential_keywords, &self.ng_keywords)
    }

    /// 会话标识：优先使用文件名
    pub fn session_id(&self) -> String {
        self.file_path
            .as_deref()
            .and_then(|p| std::path::Path::new(p).file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.keywords.join("_"))
    }
}
