//! 关键词偏好
//!
//! 每个关键词同一时刻至多一种偏好，切换顺序为 default → ng → essential → default

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeywordPreference {
    #[default]
    Default,
    /// 禁止出现
    Ng,
    /// 必须出现
    Essential,
}

impl KeywordPreference {
    pub fn next(self) -> Self {
        match self {
            KeywordPreference::Default => KeywordPreference::Ng,
            KeywordPreference::Ng => KeywordPreference::Essential,
            KeywordPreference::Essential => KeywordPreference::Default,
        }
    }
}

/// 关键词偏好表（保持插入顺序）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeywordPreferences {
    entries: Vec<(String, KeywordPreference)>,
}

impl KeywordPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lists(essential: &[String], ng: &[String]) -> Self {
        let mut prefs = Self::new();
        for kw in essential {
            prefs.set(kw, KeywordPreference::Essential);
        }
        for kw in ng {
            prefs.set(kw, KeywordPreference::Ng);
        }
        prefs
    }

    /// 添加关键词（已存在则保持原偏好）
    pub fn add(&mut self, keyword: &str) {
        let keyword = keyword.trim();
        if keyword.is_empty() || self.position(keyword).is_some() {
            return;
        }
        self.entries.push((keyword.to_string(), KeywordPreference::Default));
    }

    pub fn set(&mut self, keyword: &str, preference: KeywordPreference) {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return;
        }
        match self.position(keyword) {
            Some(idx) => self.entries[idx].1 = preference,
            None => self.entries.push((keyword.to_string(), preference)),
        }
    }

    /// 循环切换偏好，返回切换后的值
    pub fn toggle(&mut self, keyword: &str) -> KeywordPreference {
        let next = self.preference_of(keyword).next();
        self.set(keyword, next);
        next
    }

    pub fn remove(&mut self, keyword: &str) -> bool {
        match self.position(keyword.trim()) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn preference_of(&self, keyword: &str) -> KeywordPreference {
        self.position(keyword.trim())
            .map(|idx| self.entries[idx].1)
            .unwrap_or_default()
    }

    pub fn ng(&self) -> Vec<String> {
        self.with_preference(KeywordPreference::Ng)
    }

    pub fn essential(&self) -> Vec<String> {
        self.with_preference(KeywordPreference::Essential)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, KeywordPreference)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), *p))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn with_preference(&self, preference: KeywordPreference) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, p)| *p == preference)
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn position(&self, keyword: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_cycles_through_all_states() {
        let mut prefs = KeywordPreferences::new();
        assert_eq!(prefs.toggle("価格"), KeywordPreference::Ng);
        assert_eq!(prefs.toggle("価格"), KeywordPreference::Essential);
        assert_eq!(prefs.toggle("価格"), KeywordPreference::Default);
        assert_eq!(prefs.toggle("価格"), KeywordPreference::Ng);
        assert_eq!(prefs.iter().count(), 1);
    }

    #[test]
    fn test_single_preference_per_keyword() {
        let prefs = KeywordPreferences::from_lists(
            &["抽出".to_string()],
            &["抽出".to_string(), "安い".to_string()],
        );
        assert_eq!(prefs.preference_of("抽出"), KeywordPreference::Ng);
        assert!(prefs.essential().is_empty());
        assert_eq!(prefs.ng(), vec!["抽出".to_string(), "安い".to_string()]);
    }

    #[test]
    fn test_add_keeps_existing_preference() {
        let mut prefs = KeywordPreferences::new();
        prefs.set("豆", KeywordPreference::Essential);
        prefs.add("豆");
        prefs.add("  ");
        assert_eq!(prefs.preference_of("豆"), KeywordPreference::Essential);
        assert!(prefs.remove("豆"));
        assert!(prefs.is_empty());
    }
}
