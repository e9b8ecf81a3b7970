//! 大纲生成服务 - 业务能力层
//!
//! 构建结构化提示词 → 调用 LLM → 解析回复 → 规范化
//!
//! - 解析失败时换成固定的兜底大纲，不向上报错
//! - 目标字数 ≤ 1500 时强制为「导言 + 2 个 H2」共 3 个章节
//! - 指定了目标字数时，各章节字数一律改为 `floor(目标 / 章节数)`
//! - 用户选定的标题始终优先

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::{CompletionProvider, CompletionRequest};
use crate::error::ProviderError;
use crate::models::{
    ArticleLength, ArticleOutline, GenerationOptions, KeywordPreferences, OutlineSection,
    TrendAnalysisResult,
};
use crate::services::keyword_guard::scrub_ng_plain;
use crate::services::outline_parser::{parse_outline, ParsedSection};

/// 触发固定三章节结构的目标字数上限
pub const SHORT_ARTICLE_LIMIT: usize = 1500;

/// 大纲生成请求
#[derive(Debug, Clone, Copy)]
pub struct OutlineRequest<'a> {
    pub keywords: &'a [String],
    pub trend: Option<&'a TrendAnalysisResult>,
    pub options: &'a GenerationOptions,
    pub preferences: &'a KeywordPreferences,
}

impl OutlineRequest<'_> {
    /// 主关键词：第一个非空关键词，否则退回选定标题
    pub fn primary_keyword(&self) -> String {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .find(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.options.selected_title().map(str::to_string))
            .unwrap_or_default()
    }

    fn is_short(&self) -> bool {
        self.options
            .target_word_count
            .is_some_and(|t| t <= SHORT_ARTICLE_LIMIT)
    }
}

pub struct OutlineService {
    provider: Arc<dyn CompletionProvider>,
}

impl OutlineService {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// 生成文章大纲
    ///
    /// 只有 LLM 调用本身的错误会返回；回复格式错误在内部兜底
    pub async fn generate(&self, request: OutlineRequest<'_>) -> Result<ArticleOutline, ProviderError> {
        let keyword = request.primary_keyword();
        let tier = request.options.effective_length();
        debug!("生成大纲，主关键词: {}，档位: {}", keyword, tier.label());

        let prompt = build_outline_prompt(&request, &keyword);
        let completion = CompletionRequest::new(prompt)
            .with_system("あなたはSEOに精通した日本語コンテンツの編集者です。指定されたフォーマットだけで記事構成を出力します。")
            .with_temperature(0.5)
            .with_max_tokens(2000);

        let reply = self.provider.complete(&completion).await?;

        let parsed = match parse_outline(&reply) {
            Ok(sections) => {
                info!("✓ 大纲解析成功，共 {} 个章节", sections.len());
                sections
            }
            Err(e) => {
                warn!("⚠️ 大纲解析失败 ({})，使用兜底大纲", e);
                fallback_sections(&keyword, tier)
            }
        };

        Ok(assemble_outline(&request, &keyword, parsed))
    }
}

/// 把解析结果规范化为最终大纲
fn assemble_outline(
    request: &OutlineRequest<'_>,
    keyword: &str,
    parsed: Vec<ParsedSection>,
) -> ArticleOutline {
    let ng = request.preferences.ng();
    let tier = request.options.effective_length();

    let mut sections: Vec<OutlineSection> = parsed
        .into_iter()
        .filter_map(|p| {
            let title = scrub_ng_plain(&p.title, &ng);
            if title.is_empty() {
                return None;
            }
            let mut section = OutlineSection::new(title, p.level, scrub_ng_plain(&p.description, &ng));
            section.is_lead = p.is_lead;
            section.estimated_word_count = p.estimated_word_count.unwrap_or(0);
            Some(section)
        })
        .collect();

    normalize_lead(&mut sections, keyword, &ng);

    if request.is_short() {
        sections = enforce_short_structure(sections, keyword, &ng);
    } else if sections.len() == 1 {
        // 只有导言时补上兜底章节
        let fallback = fallback_sections(keyword, tier);
        sections.extend(to_sections(fallback.into_iter().skip(1), &ng));
    }

    let title = request
        .options
        .selected_title()
        .map(str::to_string)
        .unwrap_or_else(|| scrub_ng_plain(&default_title(keyword), &ng));

    let mut outline = ArticleOutline::new(
        title,
        keyword,
        sections,
        request.trend.cloned(),
        request.preferences.clone(),
    );

    match request.options.target_word_count {
        Some(target) => outline.distribute_word_count(target),
        None => {
            let per_section = tier.default_target() / outline.sections.len().max(1);
            for section in outline.sections.iter_mut() {
                if section.estimated_word_count == 0 {
                    section.estimated_word_count = per_section;
                }
            }
            outline.renumber();
        }
    }

    outline
}

/// 保证至多一个导言且位于第一位；没有导言时补一个
fn normalize_lead(sections: &mut Vec<OutlineSection>, keyword: &str, ng: &[String]) {
    let first_lead = sections.iter().position(|s| s.is_lead);
    for (idx, section) in sections.iter_mut().enumerate() {
        if section.is_lead && Some(idx) != first_lead {
            section.is_lead = false;
        }
    }
    match first_lead {
        Some(0) => {}
        Some(idx) => {
            let lead = sections.remove(idx);
            sections.insert(0, lead);
        }
        None => {
            let lead = OutlineSection::lead(
                scrub_ng_plain(&format!("{}の導入", keyword), ng),
                "読者の悩みに共感し、記事を読むメリットを伝える",
            );
            sections.insert(0, lead);
        }
    }
    if let Some(lead) = sections.first_mut() {
        lead.level = 2;
    }
}

/// 短文：导言 + 恰好 2 个 H2
fn enforce_short_structure(
    sections: Vec<OutlineSection>,
    keyword: &str,
    ng: &[String],
) -> Vec<OutlineSection> {
    let mut iter = sections.into_iter();
    let mut result: Vec<OutlineSection> = iter.next().into_iter().collect();
    result.extend(iter.filter(|s| !s.is_lead && s.level == 2).take(2));

    if result.len() < 3 {
        let needed = 3 - result.len();
        let padding: Vec<ParsedSection> = fallback_sections(keyword, ArticleLength::ExtraLong)
            .into_iter()
            .filter(|p| !p.is_lead)
            .filter(|p| !result.iter().any(|s| s.title == p.title))
            .collect();
        let extra = to_sections(padding.into_iter(), ng);
        result.extend(extra.into_iter().take(needed));
    }
    result
}

fn to_sections(
    parsed: impl Iterator<Item = ParsedSection>,
    ng: &[String],
) -> Vec<OutlineSection> {
    parsed
        .filter_map(|p| {
            let title = scrub_ng_plain(&p.title, ng);
            (!title.is_empty()).then(|| OutlineSection::new(title, p.level, scrub_ng_plain(&p.description, ng)))
        })
        .collect()
}

/// 固定兜底大纲；档位不超过 Long 时裁剪为 3 个章节
pub fn fallback_sections(keyword: &str, tier: ArticleLength) -> Vec<ParsedSection> {
    let section = |title: String, description: &str, is_lead: bool| ParsedSection {
        title,
        level: 2,
        is_lead,
        description: description.to_string(),
        estimated_word_count: None,
    };
    let mut sections = vec![
        section(
            format!("{}について", keyword),
            "読者の疑問に寄り添い、記事で分かることを簡潔に伝える",
            true,
        ),
        section(format!("{}とは", keyword), "基本的な定義と概要を説明する", false),
        section(format!("{}の特徴", keyword), "主な特徴やメリットを整理する", false),
        section(format!("{}の使い方", keyword), "具体的な使い方と注意点を紹介する", false),
        section("まとめ".to_string(), "記事全体の要点を振り返る", false),
    ];
    if tier <= ArticleLength::Long {
        sections.truncate(3);
    }
    sections
}

/// 未选定标题时的模板标题
pub fn default_title(keyword: &str) -> String {
    format!("{}とは？特徴や選び方をわかりやすく解説", keyword)
}

fn build_outline_prompt(request: &OutlineRequest<'_>, keyword: &str) -> String {
    let options = request.options;
    let essential = request.preferences.essential();
    let ng = request.preferences.ng();

    let related = request
        .trend
        .map(|t| t.related_keywords.iter().take(10).cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    let related = related
        .into_iter()
        .chain(request.keywords.iter().skip(1).cloned())
        .filter(|k| !ng.iter().any(|n| k.contains(n.as_str())))
        .collect::<Vec<_>>();

    let mut trend_block = String::new();
    if let Some(trend) = request.trend {
        trend_block.push_str(&format!(
            "- 月間検索ボリューム: {}\n- 競合性: {}\n",
            trend.search_volume,
            trend.competition.label()
        ));
        if !trend.hot_topics.is_empty() {
            trend_block.push_str(&format!("- 注目トピック: {}\n", trend.hot_topics.join("、")));
        }
        let headings = trend.competitor_headings(10);
        if !headings.is_empty() {
            trend_block.push_str(&format!("- 上位記事の見出し: {}\n", headings.join(" / ")));
        }
        if !trend.user_interest.questions.is_empty() {
            trend_block.push_str(&format!(
                "- 読者の疑問: {}\n",
                trend.user_interest.questions.join(" / ")
            ));
        }
    }

    let length_directive = if request.is_short() {
        format!(
            "目標文字数は{}文字です。構成は必ず「リード + H2見出しちょうど2個」の合計3セクションにしてください。H3見出しは使わないでください。",
            options.effective_target()
        )
    } else {
        format!(
            "目標文字数は約{}文字（{}）です。{}で構成してください。",
            options.effective_target(),
            options.effective_length().label(),
            options.effective_length().heading_guidance()
        )
    };

    let mut constraints = String::new();
    if !essential.is_empty() {
        constraints.push_str(&format!(
            "- 次のキーワードを必ず見出しか説明に含める: {}\n",
            essential.join("、")
        ));
    }
    if !ng.is_empty() {
        constraints.push_str(&format!(
            "- 次の語句は見出しにも説明にも絶対に使わない: {}\n",
            ng.join("、")
        ));
    }

    let title_line = options
        .selected_title()
        .map(|t| format!("記事タイトル: {}\n", t))
        .unwrap_or_default();

    let custom = options
        .custom_instructions
        .as_deref()
        .map(|c| format!("\n【追加の指示】\n{}\n", c))
        .unwrap_or_default();

    format!(
        r#"「{keyword}」をテーマにしたSEO記事の構成案を作成してください。
{title_line}関連キーワード: {related}
文体: {tone}

【市場・競合データ】
{trend_block}
【文字数】
{length_directive}

【キーワード制約】
{constraints}{custom}
【出力フォーマット】（この形式以外は出力しない）
【リード】リード文のテーマ
説明: このセクションで書く内容
推定文字数: 数字

## H2見出し
説明: このセクションで書く内容
推定文字数: 数字

  ### H3見出し
説明: このセクションで書く内容
推定文字数: 数字
"#,
        related = if related.is_empty() { "なし".to_string() } else { related.join("、") },
        tone = options.tone,
        trend_block = if trend_block.is_empty() { "- データなし\n".to_string() } else { trend_block },
        constraints = if constraints.is_empty() { "- 特になし\n".to_string() } else { constraints },
    )
}
