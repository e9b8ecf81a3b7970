//! 标题候选生成服务 - 业务能力层
//!
//! 任何失败（LLM 错误或回复无法解析）都退回到固定模板标题，
//! 保证步骤 2 不会卡住

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::{CompletionProvider, CompletionRequest};
use crate::models::{KeywordPreferences, TitleSuggestion, TrendAnalysisResult};
use crate::services::outline_parser::ParseError;

/// 标题生成请求
#[derive(Debug, Clone, Copy)]
pub struct TitleRequest<'a> {
    pub keyword: &'a str,
    pub trend: &'a TrendAnalysisResult,
    pub preferences: &'a KeywordPreferences,
}

#[derive(Debug, Deserialize)]
struct RawTitle {
    title: String,
    #[serde(default, alias = "rationale", alias = "reason")]
    description: String,
    #[serde(default, alias = "seoScore")]
    seo_score: f64,
    #[serde(default, alias = "clickPotential")]
    click_potential: f64,
}

pub struct TitleService {
    provider: Arc<dyn CompletionProvider>,
    candidate_count: usize,
}

impl TitleService {
    pub fn new(provider: Arc<dyn CompletionProvider>, candidate_count: usize) -> Self {
        Self {
            provider,
            candidate_count: candidate_count.max(1),
        }
    }

    /// 生成标题候选（从不失败）
    pub async fn generate(&self, request: TitleRequest<'_>) -> Vec<TitleSuggestion> {
        let ng = request.preferences.ng();
        let prompt = build_title_prompt(&request, self.candidate_count);
        let completion = CompletionRequest::new(prompt)
            .with_system("あなたはクリック率の高い記事タイトルを考える日本語のSEOコピーライターです。")
            .with_temperature(0.8)
            .with_max_tokens(1500);

        let parsed = match self.provider.complete(&completion).await {
            Ok(reply) => parse_titles(&reply),
            Err(e) => {
                warn!("⚠️ 标题生成调用失败，使用模板标题: {}", e);
                Err(ParseError::EmptyReply)
            }
        };

        let candidates = match parsed {
            Ok(raw) => {
                let list = to_suggestions(raw, request.keyword, &ng, self.candidate_count);
                if list.is_empty() {
                    warn!("⚠️ 标题候选全部被过滤，使用模板标题");
                }
                list
            }
            Err(e) => {
                debug!("标题回复解析失败: {}", e);
                Vec::new()
            }
        };

        if candidates.is_empty() {
            return fallback_titles(request.keyword, &ng, self.candidate_count);
        }

        info!("✓ 生成 {} 个标题候选", candidates.len());
        candidates
    }
}

fn build_title_prompt(request: &TitleRequest<'_>, count: usize) -> String {
    let essential = request.preferences.essential();
    let ng = request.preferences.ng();
    let competitor_titles: Vec<&str> = request.trend.competitor_titles().take(10).collect();
    let competitor_headings = request.trend.competitor_headings(10);

    let mut constraints = String::new();
    if !essential.is_empty() {
        constraints.push_str(&format!(
            "- 次のキーワードをできるだけタイトルに含める: {}\n",
            essential.join("、")
        ));
    }
    if !ng.is_empty() {
        constraints.push_str(&format!(
            "- 次の語句はタイトルに絶対に使わない: {}\n",
            ng.join("、")
        ));
    }

    format!(
        r#"キーワード「{keyword}」で検索上位を狙う記事タイトルを{count}個提案してください。

【競合記事のタイトル】
{titles}

【競合記事の見出し】
{headings}

【制約】
- 32文字前後で、キーワードをできるだけ前半に入れる
- 競合と差別化できる切り口にする
{constraints}
【出力形式】
次のJSON配列のみを出力してください。
[{{"title": "タイトル", "description": "このタイトルを勧める理由", "seoScore": 0-100, "clickPotential": 0-100}}]"#,
        keyword = request.keyword,
        titles = bullet_list(competitor_titles.iter().copied()),
        headings = bullet_list(competitor_headings.iter().map(String::as_str)),
    )
}

fn bullet_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let list: Vec<String> = items.map(|i| format!("- {}", i)).collect();
    if list.is_empty() {
        "- なし".to_string()
    } else {
        list.join("\n")
    }
}

/// 解析标题回复：优先 JSON 数组，其次编号 / 项目符号列表
fn parse_titles(reply: &str) -> Result<Vec<RawTitle>, ParseError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(ParseError::EmptyReply);
    }

    if let (Some(start), Some(end)) = (reply.find('['), reply.rfind(']')) {
        if start < end {
            if let Ok(list) = serde_json::from_str::<Vec<RawTitle>>(&reply[start..=end]) {
                if !list.is_empty() {
                    return Ok(list);
                }
            }
        }
    }

    let list: Vec<RawTitle> = reply
        .lines()
        .filter_map(parse_list_line)
        .collect();
    if list.is_empty() {
        Err(ParseError::NoTitles)
    } else {
        Ok(list)
    }
}

/// "1. " / "2) " / "3．" 形式的序号；数字后面没有分隔符（如 "2024年版"）不算序号
fn strip_list_number(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == line.len() {
        return None;
    }
    rest.strip_prefix(['.', ')', '．', '、']).map(str::trim_start)
}

fn parse_list_line(line: &str) -> Option<RawTitle> {
    let line = line.trim();
    let body = match strip_list_number(line) {
        Some(body) => body,
        None => line.strip_prefix("- ").or_else(|| line.strip_prefix("・"))?,
    };

    let (title, description) = match body.split_once(" - ").or_else(|| body.split_once("：")) {
        Some((t, d)) => (t, d),
        None => (body, ""),
    };
    let title = title.trim().trim_matches(['「', '」', '"', '*']).trim();
    (!title.is_empty()).then(|| RawTitle {
        title: title.to_string(),
        description: description.trim().to_string(),
        seo_score: 0.0,
        click_potential: 0.0,
    })
}

fn to_suggestions(
    raw: Vec<RawTitle>,
    keyword: &str,
    ng: &[String],
    limit: usize,
) -> Vec<TitleSuggestion> {
    let mut seen: Vec<String> = Vec::new();
    raw.into_iter()
        .filter(|r| !r.title.trim().is_empty())
        .filter(|r| !ng.iter().any(|n| !n.is_empty() && r.title.contains(n.as_str())))
        .filter(|r| {
            let fresh = !seen.contains(&r.title);
            if fresh {
                seen.push(r.title.clone());
            }
            fresh
        })
        .take(limit)
        .map(|r| TitleSuggestion {
            id: uuid::Uuid::new_v4().to_string(),
            title: r.title.trim().to_string(),
            description: r.description,
            keywords: vec![keyword.to_string()],
            seo_score: r.seo_score.clamp(0.0, 100.0) as u8,
            click_potential: r.click_potential.clamp(0.0, 100.0) as u8,
        })
        .collect()
}

/// 固定模板标题（过滤 ng 关键词）
pub fn fallback_titles(keyword: &str, ng: &[String], limit: usize) -> Vec<TitleSuggestion> {
    let templates: [(String, &str, u8, u8); 5] = [
        (format!("{}とは？初心者にもわかりやすく徹底解説", keyword), "基本を知りたい読者向けの網羅型タイトル", 80, 70),
        (format!("{}の選び方と失敗しないためのポイント", keyword), "比較検討中の読者の悩みに応える", 75, 75),
        (format!("今さら聞けない{}の基本と活用法", keyword), "気軽に読める入門タイトル", 65, 70),
        (format!("{}で後悔しないために知っておきたい5つのこと", keyword), "数字で具体性を出したタイトル", 70, 80),
        (format!("【保存版】{}の特徴・使い方・注意点まとめ", keyword), "保存需要を狙ったまとめ型タイトル", 70, 65),
    ];

    let mut list: Vec<TitleSuggestion> = templates
        .into_iter()
        .filter(|(title, ..)| !ng.iter().any(|n| !n.is_empty() && title.contains(n.as_str())))
        .take(limit)
        .enumerate()
        .map(|(idx, (title, description, seo, click))| TitleSuggestion {
            id: format!("fallback-{}", idx + 1),
            title,
            description: description.to_string(),
            keywords: vec![keyword.to_string()],
            seo_score: seo,
            click_potential: click,
        })
        .collect();

    if list.is_empty() {
        list.push(TitleSuggestion {
            id: "fallback-generic".to_string(),
            title: "知っておきたい基本と選び方のポイント".to_string(),
            description: "キーワードを含まない汎用タイトル".to_string(),
            keywords: Vec::new(),
            seo_score: 50,
            click_potential: 50,
        });
    }
    list
}
