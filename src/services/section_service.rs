//! 章节正文生成服务 - 业务能力层
//!
//! 按大纲顺序逐个生成章节。每次调用都带上完整大纲和此前已写的正文（截取末尾），
//! 生成结果先经过字数控制，再清除 ng 关键词，最后补上 markdown 标题

use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::{max_tokens_for_chars, CompletionProvider, CompletionRequest};
use crate::error::ProviderError;
use crate::models::{ArticleOutline, GenerationOptions, OutlineSection};
use crate::services::keyword_guard::scrub_ng;
use crate::services::length::{measure, EnforceMode, LengthEnforcer, SupplementContext};
use crate::utils::logging::truncate_text;

/// 每个章节参与提示词的相关关键词数量上限
const RELATED_KEYWORD_LIMIT: usize = 5;

/// 章节生成进度
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionProgress {
    /// 已完成的章节数
    pub index: usize,
    pub total: usize,
    /// 当前（或刚完成）的章节标题
    pub title: String,
    pub percent: u8,
}

impl SectionProgress {
    fn new(index: usize, total: usize, title: &str) -> Self {
        let percent = if total == 0 { 100 } else { (index * 100 / total) as u8 };
        Self {
            index,
            total,
            title: title.to_string(),
            percent,
        }
    }
}

/// 单个章节的生成请求
#[derive(Debug, Clone, Copy)]
pub struct SectionRequest<'a> {
    pub outline: &'a ArticleOutline,
    pub section: &'a OutlineSection,
    /// 此前已生成的正文
    pub previous: &'a str,
    pub options: &'a GenerationOptions,
}

pub struct SectionService {
    provider: Arc<dyn CompletionProvider>,
    enforcer: LengthEnforcer,
    context_char_limit: usize,
}

impl SectionService {
    pub fn new(provider: Arc<dyn CompletionProvider>, context_char_limit: usize) -> Self {
        Self {
            enforcer: LengthEnforcer::new(provider.clone(), false),
            provider,
            context_char_limit,
        }
    }

    /// 依次生成所有章节，写回 `outline.sections[*].content`
    ///
    /// 任一章节的 LLM 调用失败即返回错误（已生成的章节保留在 outline 中）
    pub async fn generate_all(
        &self,
        outline: &mut ArticleOutline,
        options: &GenerationOptions,
        mut on_progress: impl FnMut(SectionProgress) + Send,
    ) -> Result<(), ProviderError> {
        let total = outline.sections.len();
        let first_title = outline.sections.first().map(|s| s.title.clone()).unwrap_or_default();
        on_progress(SectionProgress::new(0, total, &first_title));

        let mut written = String::new();
        for idx in 0..total {
            let content = self
                .generate_section(SectionRequest {
                    outline: &*outline,
                    section: &outline.sections[idx],
                    previous: &written,
                    options,
                })
                .await?;

            if !written.is_empty() {
                written.push_str("\n\n");
            }
            written.push_str(&content);

            let section = &mut outline.sections[idx];
            section.content = Some(content);
            section.is_generated = true;
            info!("✓ 章节 {}/{} 完成: {}", idx + 1, total, section.title);
            on_progress(SectionProgress::new(idx + 1, total, &section.title));
        }
        Ok(())
    }

    /// 生成单个章节，返回最终正文（非导言带标题）
    pub async fn generate_section(&self, request: SectionRequest<'_>) -> Result<String, ProviderError> {
        let section = request.section;
        let preferences = &request.outline.keyword_preferences;
        let ng = preferences.ng();
        let target = body_target(section);

        let prompt = build_section_prompt(&request, target, self.carried_context(request.previous));
        let completion = CompletionRequest::new(prompt)
            .with_system("あなたは読者に寄り添う日本語のSEO記事ライターです。指示された部分の本文だけを出力します。")
            .with_max_tokens(max_tokens_for_chars(target));

        let reply = self.provider.complete(&completion).await?;
        let body = strip_echoed_headings(&reply, section);
        debug!(
            "章节初稿: {} ({} 字) {}",
            section.title,
            body.chars().count(),
            truncate_text(&body, 40)
        );

        let enforced = self
            .enforcer
            .enforce(
                &body,
                target,
                EnforceMode::Section,
                &SupplementContext {
                    title: &section.title,
                    keyword: &request.outline.keyword,
                    ng_keywords: &ng,
                },
            )
            .await;
        let body = scrub_ng(&enforced.text, &ng);

        if section.is_lead {
            Ok(body)
        } else {
            Ok(format!("{} {}\n\n{}", section.heading_marker(), section.title, body))
        }
    }

    fn carried_context<'a>(&self, previous: &'a str) -> &'a str {
        carry_context(previous, self.context_char_limit)
    }
}

/// 正文的目标字数
///
/// 非导言章节的标题行和它前后的两个换行也计入整篇字数，从章节预算中扣除
pub fn body_target(section: &OutlineSection) -> usize {
    if section.is_lead || section.estimated_word_count == 0 {
        return section.estimated_word_count;
    }
    section
        .estimated_word_count
        .saturating_sub(measure(&section.title) + 2)
}

/// 截取末尾 `limit` 个字符（0 表示不限制）
pub fn carry_context(previous: &str, limit: usize) -> &str {
    if limit == 0 {
        return previous;
    }
    let count = previous.chars().count();
    if count <= limit {
        return previous;
    }
    let start = previous
        .char_indices()
        .nth(count - limit)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &previous[start..]
}

/// 主关键词 ∪ 前 5 个相关关键词 ∪ 章节关键词（去重，保持顺序）
pub fn effective_keywords(outline: &ArticleOutline, section: &OutlineSection) -> Vec<String> {
    let related = outline
        .trend_data
        .as_ref()
        .map(|t| t.related_keywords.as_slice())
        .unwrap_or_default();

    let mut keywords: Vec<String> = Vec::new();
    for keyword in std::iter::once(&outline.keyword)
        .chain(related.iter().take(RELATED_KEYWORD_LIMIT))
        .chain(section.keywords.iter())
    {
        let keyword = keyword.trim();
        if !keyword.is_empty() && !keywords.iter().any(|k| k == keyword) {
            keywords.push(keyword.to_string());
        }
    }
    keywords
}

/// 去掉开头的标题行，以及任何与章节标题相同的标题行；导言去掉全部标题行
fn strip_echoed_headings(reply: &str, section: &OutlineSection) -> String {
    let mut lines = Vec::new();
    let mut leading = true;
    for line in reply.trim().lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            if leading || section.is_lead || heading == section.title {
                continue;
            }
        } else if !trimmed.is_empty() {
            leading = false;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

fn build_section_prompt(request: &SectionRequest<'_>, target: usize, context: &str) -> String {
    let section = request.section;
    let preferences = &request.outline.keyword_preferences;
    let keywords = effective_keywords(request.outline, section);
    let essential = preferences.essential();
    let ng = preferences.ng();

    let mut constraints = String::new();
    if !essential.is_empty() {
        constraints.push_str(&format!(
            "- 次のキーワードを自然な形で含める: {}\n",
            essential.join("、")
        ));
    }
    if !ng.is_empty() {
        constraints.push_str(&format!("- 次の語句は絶対に使わない: {}\n", ng.join("、")));
    }

    let part_rules = if section.is_lead {
        "- これは記事冒頭のリード文です。見出し（#記号）は一切書かない\n\
         - 読者の悩みや関心に寄り添い、続きを読みたくなる書き出しにする\n\
         - この記事で何がわかるかを簡潔に伝える"
    } else {
        "- 見出し行は書かず、本文のみを出力する（見出しはこちらで付ける）\n\
         - 前の章と内容を重複させない"
    };

    let previous = if context.trim().is_empty() {
        "（まだありません）".to_string()
    } else {
        context.trim().to_string()
    };

    let custom = request
        .options
        .custom_instructions
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| format!("- {}\n", c))
        .unwrap_or_default();

    format!(
        r#"記事「{article_title}」の一部を執筆してください。

【記事の構成】
{outline_text}

【これまでに書いた本文】
{previous}

【執筆する見出し】{title}
【内容の説明】{description}
【目標文字数】約{target}文字
【関連キーワード】{keywords}

【ルール】
{part_rules}
- 文体: {tone}
- 1段落は2〜4文程度に短くまとめる
- キーワードは不自然に詰め込まず、出現率は3%程度までにする
- 「このセクションでは〜について解説します」のような前置きやメタな説明を書かない
- 「さて」「それでは」などの定型的なつなぎ言葉を使わない
- 文は必ず「。」などの文末記号で終える
{constraints}{custom}"#,
        article_title = request.outline.title,
        outline_text = request.outline.to_outline_text(),
        title = section.title,
        description = section.description,
        target = target,
        keywords = keywords.join("、"),
        tone = request.options.tone,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::HeuristicTrendSource;
    use crate::models::{KeywordPreference, KeywordPreferences};
    use crate::services::length::measure;
    use crate::test_support::{japanese_paragraph, rate_limited, ScriptedProvider};

    fn outline(preferences: KeywordPreferences) -> ArticleOutline {
        let mut sections = vec![
            OutlineSection::lead("導入", "読者の悩みに共感する").with_estimate(100),
            OutlineSection::new("エスプレッソマシンとは", 2, "基本の説明").with_estimate(100),
            OutlineSection::new("家庭用の選び方", 3, "選ぶポイント").with_estimate(100),
        ];
        sections[1].keywords = vec!["抽出".to_string(), "エスプレッソマシン".to_string()];
        ArticleOutline::new(
            "エスプレッソマシン入門",
            "エスプレッソマシン",
            sections,
            Some(HeuristicTrendSource.build("エスプレッソマシン")),
            preferences,
        )
    }

    fn service(provider: &Arc<ScriptedProvider>) -> SectionService {
        SectionService::new(provider.clone(), 6000)
    }

    #[tokio::test]
    async fn test_generate_all_sequential_with_progress() {
        let provider = Arc::new(
            ScriptedProvider::new(japanese_paragraph(100))
                .on("【執筆する見出し】導入", format!("# 導入\n\n{}", japanese_paragraph(100)))
                .on(
                    "【執筆する見出し】エスプレッソマシンとは",
                    format!("## エスプレッソマシンとは\n\n{}", japanese_paragraph(100)),
                ),
        );
        let mut outline = outline(KeywordPreferences::new());
        let mut progress = Vec::new();

        service(&provider)
            .generate_all(&mut outline, &GenerationOptions::default(), |p| progress.push(p.percent))
            .await
            .unwrap();

        assert_eq!(progress, vec![0, 33, 66, 100]);
        assert!(outline.sections.iter().all(|s| s.is_generated));

        let lead = outline.sections[0].content.as_deref().unwrap();
        assert!(!lead.contains('#'));
        assert_eq!(measure(lead), 100);

        let second = outline.sections[1].content.as_deref().unwrap();
        assert!(second.starts_with("## エスプレッソマシンとは\n\n"));
        assert_eq!(second.matches("エスプレッソマシンとは").count(), 1);

        let third = outline.sections[2].content.as_deref().unwrap();
        assert!(third.starts_with("### 家庭用の選び方\n\n"));

        // 后面的章节能看到前面已写的正文
        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("（まだありません）"));
        assert!(prompts[2].contains("## エスプレッソマシンとは"));
        assert!(prompts[1].contains("リード: 導入"));
    }

    #[tokio::test]
    async fn test_under_length_section_is_supplemented() {
        let provider = Arc::new(
            ScriptedProvider::new(japanese_paragraph(40))
                .on("不足しています", japanese_paragraph(60)),
        );
        let mut outline = outline(KeywordPreferences::new());
        // 标题 11 字 + 2 个换行，正文目标 100
        outline.sections[1].estimated_word_count = 113;
        let content = service(&provider)
            .generate_section(SectionRequest {
                outline: &outline,
                section: &outline.sections[1],
                previous: "",
                options: &GenerationOptions::default(),
            })
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 2);
        let prompts = provider.prompts();
        assert!(prompts[0].contains("【目標文字数】約100文字"));
        assert!(prompts[1].contains("約60文字不足"));
        let body = content.trim_start_matches("## エスプレッソマシンとは\n\n");
        // 段落之间的换行也计入字数
        assert_eq!(measure(body), 101);
    }

    #[tokio::test]
    async fn test_ng_keywords_removed_from_body() {
        let reply = format!("激安モデルは壊れやすいです。{}", japanese_paragraph(100));
        let provider = Arc::new(ScriptedProvider::new(reply));
        let mut prefs = KeywordPreferences::new();
        prefs.set("激安", KeywordPreference::Ng);
        let outline = outline(prefs);

        let content = service(&provider)
            .generate_section(SectionRequest {
                outline: &outline,
                section: &outline.sections[1],
                previous: "",
                options: &GenerationOptions::default(),
            })
            .await
            .unwrap();

        assert!(!content.contains("激安"));
        assert!(provider.prompts()[0].contains("次の語句は絶対に使わない: 激安"));
    }

    #[tokio::test]
    async fn test_provider_error_bubbles() {
        let provider = Arc::new(ScriptedProvider::failing(rate_limited()));
        let mut outline = outline(KeywordPreferences::new());
        let result = service(&provider)
            .generate_all(&mut outline, &GenerationOptions::default(), |_| {})
            .await;
        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
        assert!(outline.sections.iter().all(|s| !s.is_generated));
    }

    #[test]
    fn test_effective_keywords_deduplicated_in_order() {
        let outline = outline(KeywordPreferences::new());
        let keywords = effective_keywords(&outline, &outline.sections[1]);
        assert_eq!(
            keywords,
            vec![
                "エスプレッソマシン",
                "エスプレッソマシン おすすめ",
                "エスプレッソマシン 選び方",
                "エスプレッソマシン 使い方",
                "エスプレッソマシン 比較",
                "エスプレッソマシン 初心者",
                "抽出",
            ]
        );
    }

    #[test]
    fn test_body_target_excludes_heading() {
        let outline = outline(KeywordPreferences::new());
        assert_eq!(body_target(&outline.sections[0]), 100);
        assert_eq!(body_target(&outline.sections[1]), 87);
        assert_eq!(body_target(&outline.sections[2]), 91);
        assert_eq!(body_target(&OutlineSection::new("見出し", 2, "")), 0);
    }

    #[test]
    fn test_carry_context_keeps_tail() {
        assert_eq!(carry_context("あいうえお", 3), "うえお");
        assert_eq!(carry_context("あいうえお", 0), "あいうえお");
        assert_eq!(carry_context("あい", 10), "あい");
    }

    #[test]
    fn test_strip_echoed_headings() {
        let section = OutlineSection::new("選び方", 2, "");
        let reply = "## 選び方\n\n本文です。\n\n### 価格帯\n\n安いです。\n\n## 選び方\n続きです。";
        assert_eq!(
            strip_echoed_headings(reply, &section),
            "本文です。\n\n### 価格帯\n\n安いです。\n\n続きです。"
        );
    }
}
