//! 文章大纲
//!
//! 步骤 3 的产物，也是唯一允许用户在流程外编辑的实体（步骤 3 与步骤 4 之间）

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::keyword::KeywordPreferences;
use crate::models::trend::TrendAnalysisResult;

/// 大纲章节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineSection {
    pub id: String,
    pub title: String,
    /// 2 = H2（含导言），3 = H3
    pub level: u8,
    pub description: String,
    /// 本章节目标字数
    pub estimated_word_count: usize,
    pub order: usize,
    pub is_generated: bool,
    /// 导言不输出标题
    pub is_lead: bool,
    pub content: Option<String>,
    /// 章节专属关键词
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl OutlineSection {
    pub fn new(title: impl Into<String>, level: u8, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            level: level.clamp(2, 3),
            description: description.into(),
            estimated_word_count: 0,
            order: 0,
            is_generated: false,
            is_lead: false,
            content: None,
            keywords: Vec::new(),
        }
    }

    pub fn lead(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            is_lead: true,
            ..Self::new(title, 2, description)
        }
    }

    pub fn with_estimate(mut self, estimated_word_count: usize) -> Self {
        self.estimated_word_count = estimated_word_count;
        self
    }

    /// 章节对应的 markdown 标题前缀
    pub fn heading_marker(&self) -> &'static str {
        if self.level >= 3 {
            "###"
        } else {
            "##"
        }
    }
}

/// 文章大纲
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleOutline {
    pub id: String,
    pub title: String,
    /// 主关键词
    pub keyword: String,
    pub sections: Vec<OutlineSection>,
    pub trend_data: Option<TrendAnalysisResult>,
    /// 各章节目标字数之和
    pub estimated_word_count: usize,
    pub keyword_preferences: KeywordPreferences,
}

impl ArticleOutline {
    pub fn new(
        title: impl Into<String>,
        keyword: impl Into<String>,
        sections: Vec<OutlineSection>,
        trend_data: Option<TrendAnalysisResult>,
        keyword_preferences: KeywordPreferences,
    ) -> Self {
        let mut outline = Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            keyword: keyword.into(),
            sections,
            trend_data,
            estimated_word_count: 0,
            keyword_preferences,
        };
        outline.renumber();
        outline
    }

    /// 校验导言约束：至多一个导言，且必须排在第一位
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.sections.is_empty() {
            return Err(PipelineError::EmptyOutline);
        }
        let leads: Vec<usize> = self
            .sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_lead)
            .map(|(i, _)| i)
            .collect();
        match leads.as_slice() {
            [] | [0] => Ok(()),
            _ => Err(PipelineError::LeadPlacement),
        }
    }

    pub fn has_lead(&self) -> bool {
        self.sections.first().is_some_and(|s| s.is_lead)
    }

    /// 重新编号并汇总字数
    pub fn renumber(&mut self) {
        for (idx, section) in self.sections.iter_mut().enumerate() {
            section.order = idx;
        }
        self.estimated_word_count = self
            .sections
            .iter()
            .map(|s| s.estimated_word_count)
            .sum();
    }

    /// 将目标字数平均分配到所有章节（向下取整）
    pub fn distribute_word_count(&mut self, target: usize) {
        if self.sections.is_empty() {
            return;
        }
        let per_section = target / self.sections.len();
        for section in &mut self.sections {
            section.estimated_word_count = per_section;
        }
        self.renumber();
    }

    /// 插入章节；未指定字数时取现有章节的平均值
    pub fn add_section(
        &mut self,
        mut section: OutlineSection,
        position: Option<usize>,
    ) -> Result<(), PipelineError> {
        let position = position.unwrap_or(self.sections.len());
        if position > self.sections.len() {
            return Err(PipelineError::IndexOutOfRange {
                index: position,
                max_index: self.sections.len(),
            });
        }
        if section.estimated_word_count == 0 && !self.sections.is_empty() {
            section.estimated_word_count = self.estimated_word_count / self.sections.len();
        }
        self.sections.insert(position, section);
        self.commit_or_rollback(|outline| {
            outline.sections.remove(position);
        })
    }

    pub fn remove_section(&mut self, section_id: &str) -> Result<OutlineSection, PipelineError> {
        let idx = self.index_of(section_id)?;
        let removed = self.sections.remove(idx);
        self.renumber();
        Ok(removed)
    }

    pub fn move_section(&mut self, from: usize, to: usize) -> Result<(), PipelineError> {
        let max_index = self.sections.len().saturating_sub(1);
        if from > max_index || to > max_index {
            return Err(PipelineError::IndexOutOfRange {
                index: from.max(to),
                max_index,
            });
        }
        let section = self.sections.remove(from);
        self.sections.insert(to, section);
        self.commit_or_rollback(|outline| {
            let section = outline.sections.remove(to);
            outline.sections.insert(from, section);
        })
    }

    pub fn update_section<F>(&mut self, section_id: &str, edit: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut OutlineSection),
    {
        let idx = self.index_of(section_id)?;
        let backup = self.sections[idx].clone();
        edit(&mut self.sections[idx]);
        self.commit_or_rollback(move |outline| outline.sections[idx] = backup)
    }

    /// 生成供提示词使用的大纲文本
    pub fn to_outline_text(&self) -> String {
        let mut lines = vec![format!("タイトル: {}", self.title)];
        for section in &self.sections {
            let line = if section.is_lead {
                format!("リード: {}", section.title)
            } else if section.level >= 3 {
                format!("  ### {}", section.title)
            } else {
                format!("## {}", section.title)
            };
            lines.push(line);
        }
        lines.join("\n")
    }

    fn index_of(&self, section_id: &str) -> Result<usize, PipelineError> {
        self.sections
            .iter()
            .position(|s| s.id == section_id)
            .ok_or_else(|| PipelineError::SectionNotFound {
                section_id: section_id.to_string(),
            })
    }

    fn commit_or_rollback(
        &mut self,
        rollback: impl FnOnce(&mut Self),
    ) -> Result<(), PipelineError> {
        if let Err(e) = self.validate() {
            rollback(self);
            self.renumber();
            return Err(e);
        }
        self.renumber();
        Ok(())
    }
}
