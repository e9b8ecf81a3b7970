use serde::{Deserialize, Serialize};

/// 文章长度档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArticleLength {
    Short,
    #[default]
    Medium,
    Long,
    ExtraLong,
}

impl ArticleLength {
    /// 档位默认目标字数
    pub fn default_target(self) -> usize {
        match self {
            ArticleLength::Short => 1500,
            ArticleLength::Medium => 3000,
            ArticleLength::Long => 6000,
            ArticleLength::ExtraLong => 10000,
        }
    }

    /// 根据目标字数推断档位
    pub fn from_target(target: usize) -> Self {
        match target {
            0..=1500 => ArticleLength::Short,
            1501..=3000 => ArticleLength::Medium,
            3001..=6000 => ArticleLength::Long,
            _ => ArticleLength::ExtraLong,
        }
    }

    /// 提示词中的 H2 数量建议
    pub fn heading_guidance(self) -> &'static str {
        match self {
            ArticleLength::Short => "H2見出しを3〜4個",
            ArticleLength::Medium => "H2見出しを4〜6個、必要に応じてH3見出し",
            ArticleLength::Long => "H2見出しを6〜8個、各H2に2〜3個のH3見出し",
            ArticleLength::ExtraLong => "H2見出しを8個以上、各H2に複数のH3見出し",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArticleLength::Short => "短め",
            ArticleLength::Medium => "標準",
            ArticleLength::Long => "長め",
            ArticleLength::ExtraLong => "超長文",
        }
    }
}

/// 步骤 3 / 4 的生成选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// 文体
    pub tone: String,
    pub article_length: ArticleLength,
    /// 目标字数（优先于档位）
    pub target_word_count: Option<usize>,
    /// 用户选定的标题，始终覆盖模型给出的标题
    pub selected_title: Option<String>,
    pub custom_instructions: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            tone: "です・ます調の親しみやすい文体".to_string(),
            article_length: ArticleLength::default(),
            target_word_count: None,
            selected_title: None,
            custom_instructions: None,
        }
    }
}

impl GenerationOptions {
    /// 实际生效的档位
    pub fn effective_length(&self) -> ArticleLength {
        self.target_word_count
            .map(ArticleLength::from_target)
            .unwrap_or(self.article_length)
    }

    pub fn effective_target(&self) -> usize {
        self.target_word_count
            .unwrap_or_else(|| self.article_length.default_target())
    }

    /// 选定标题（去掉空白后非空）
    pub fn selected_title(&self) -> Option<&str> {
        self.selected_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_tier_thresholds() {
        assert_eq!(ArticleLength::from_target(1000), ArticleLength::Short);
        assert_eq!(ArticleLength::from_target(1500), ArticleLength::Short);
        assert_eq!(ArticleLength::from_target(1501), ArticleLength::Medium);
        assert_eq!(ArticleLength::from_target(6000), ArticleLength::Long);
        assert_eq!(ArticleLength::from_target(6001), ArticleLength::ExtraLong);
    }

    #[test]
    fn test_blank_selected_title_is_ignored() {
        let options = GenerationOptions {
            selected_title: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(options.selected_title().is_none());
    }
}
