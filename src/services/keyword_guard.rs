//! 关键词约束 - 业务能力层
//!
//! ng 关键词：从标题、大纲、正文中清除；essential 关键词：缺失时补进导言

use regex::Regex;
use std::sync::OnceLock;

fn sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^。！？!?]+[。！？!?]*").expect("valid regex"))
}

fn excess_blank_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| !k.is_empty() && text.contains(k.as_str()))
}

/// 单行文本（标题 / 描述）：直接删掉 ng 字面量
pub fn scrub_ng_plain(text: &str, ng_keywords: &[String]) -> String {
    let mut result = text.to_string();
    for keyword in ng_keywords.iter().filter(|k| !k.is_empty()) {
        while result.contains(keyword.as_str()) {
            result = result.replace(keyword.as_str(), "");
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 正文：删除含 ng 关键词的句子；标题行删除字面量
pub fn scrub_ng(text: &str, ng_keywords: &[String]) -> String {
    if !contains_any(text, ng_keywords) {
        return text.to_string();
    }

    let mut lines = Vec::new();
    for line in text.lines() {
        if !contains_any(line, ng_keywords) {
            lines.push(line.to_string());
            continue;
        }
        if line.trim_start().starts_with('#') {
            lines.push(scrub_ng_plain(line, ng_keywords));
            continue;
        }
        let kept: String = sentence_re()
            .find_iter(line)
            .map(|m| m.as_str())
            .filter(|sentence| !contains_any(sentence, ng_keywords))
            .collect();
        // 句子切分后仍残留（例如关键词跨越了句号以外的结构）时删除字面量
        let kept = if contains_any(&kept, ng_keywords) {
            scrub_ng_plain(&kept, ng_keywords)
        } else {
            kept
        };
        if !kept.trim().is_empty() {
            lines.push(kept.trim_end().to_string());
        }
    }

    let joined = lines.join("\n");
    excess_blank_re()
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

/// 文本中缺失的 essential 关键词（保持原顺序）
pub fn missing_essential(text: &str, essential_keywords: &[String]) -> Vec<String> {
    essential_keywords
        .iter()
        .filter(|k| !k.is_empty() && !text.contains(k.as_str()))
        .cloned()
        .collect()
}

/// 把缺失的 essential 关键词以一句话补进导言末尾
pub fn weave_essential(lead: &str, missing: &[String]) -> String {
    if missing.is_empty() {
        return lead.to_string();
    }
    let quoted = missing
        .iter()
        .map(|k| format!("「{}」", k))
        .collect::<String>();
    let sentence = format!("本記事では{}についても詳しく解説します。", quoted);
    if lead.trim().is_empty() {
        sentence
    } else {
        format!("{}\n\n{}", lead.trim_end(), sentence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scrub_ng_removes_whole_sentences() {
        let text = "## 激安モデルの選び方\n\n安さだけで選ぶのは危険です。激安品は壊れやすいです。手入れも大切です。";
        let result = scrub_ng(text, &kws(&["激安"]));
        assert!(!result.contains("激安"));
        assert!(result.starts_with("## モデルの選び方"));
        assert!(result.contains("安さだけで選ぶのは危険です。手入れも大切です。"));
    }

    #[test]
    fn test_scrub_ng_drops_emptied_lines() {
        let text = "最初の段落です。\n\n激安です。\n\n最後の段落です。";
        let result = scrub_ng(text, &kws(&["激安"]));
        assert_eq!(result, "最初の段落です。\n\n最後の段落です。");
    }

    #[test]
    fn test_scrub_without_ng_is_identity() {
        let text = "そのままの文章です。";
        assert_eq!(scrub_ng(text, &[]), text);
        assert_eq!(scrub_ng(text, &kws(&["激安"])), text);
    }

    #[test]
    fn test_scrub_ng_plain_collapses_spaces() {
        assert_eq!(
            scrub_ng_plain("激安 エスプレッソマシン 比較", &kws(&["激安"])),
            "エスプレッソマシン 比較"
        );
        assert_eq!(scrub_ng_plain("ああ激激安安", &kws(&["激安"])), "ああ");
    }

    #[test]
    fn test_missing_and_weave_essential() {
        let missing = missing_essential("ミルクの話", &kws(&["ミルク", "グラインダー", ""]));
        assert_eq!(missing, kws(&["グラインダー"]));
        let lead = weave_essential("導入文です。", &missing);
        assert_eq!(
            lead,
            "導入文です。\n\n本記事では「グラインダー」についても詳しく解説します。"
        );
        assert_eq!(weave_essential("導入文です。", &[]), "導入文です。");
    }
}
