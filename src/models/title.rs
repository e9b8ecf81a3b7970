use serde::{Deserialize, Serialize};

/// 标题候选
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleSuggestion {
    pub id: String,
    pub title: String,
    /// 推荐理由
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// SEO 评分 (0-100)
    #[serde(default)]
    pub seo_score: u8,
    /// 点击潜力 (0-100)
    #[serde(default)]
    pub click_potential: u8,
}

impl TitleSuggestion {
    pub fn total_score(&self) -> u16 {
        self.seo_score as u16 + self.click_potential as u16
    }
}

/// 选出综合得分最高的标题（同分保持原顺序）
pub fn best_title(suggestions: &[TitleSuggestion]) -> Option<&TitleSuggestion> {
    suggestions
        .iter()
        .enumerate()
        .max_by_key(|(idx, s)| (s.total_score(), std::cmp::Reverse(*idx)))
        .map(|(_, s)| s)
}
