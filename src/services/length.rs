//! 字数计量与字数控制 - 业务能力层
//!
//! ## 计量
//! 去掉标题标记、粗体 / 斜体标记、列表符号并合并空行后，按字符数计算。
//! 这是全系统唯一的字数口径（提示词目标、容差判断、截断都用它）。
//!
//! ## 控制策略（单次）
//! - 容差窗口：`[floor(0.9 × 目标), ceil(1.1 × 目标)]`
//! - 不足：发起一次补充请求，补充内容插在"まとめ"类结尾章节之前；
//!   拼接后若超过上限，从末尾按段落整段删除，不在段落中间截断
//! - 超出：章节模式按段落截断；整篇模式的摘要压缩默认关闭
//! - 任何内部失败都返回当前最好的文本，不向上抛错

use phf::phf_set;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::clients::{max_tokens_for_chars, CompletionProvider, CompletionRequest};

/// 视为"结尾章节"的标题词汇
static CONCLUSION_HEADINGS: phf::Set<&'static str> = phf_set! {
    "まとめ",
    "結論",
    "おわりに",
    "終わりに",
    "最後に",
    "さいごに",
    "総括",
};

/// 补充内容中不允许出现的收尾句式
static CONCLUSION_OPENERS: phf::Set<&'static str> = phf_set! {
    "まとめると",
    "まとめ",
    "結論として",
    "結論から言うと",
    "以上のように",
    "以上より",
    "最後に",
    "総じて",
    "要するに",
    "いかがでしたか",
};

// ========== 计量 ==========

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]*").expect("valid regex"))
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*(?:[-*+・]|\d+[.)])[ \t]+").expect("valid regex"))
}

fn emphasis_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\*{1,3}([^*\n]+?)\*{1,3}|__([^_\n]+?)__").expect("valid regex")
    })
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("valid regex"))
}

fn paragraph_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"))
}

/// 去掉 markdown 标记后的纯文本
pub fn strip_markdown(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = heading_re().replace_all(&text, "");
    let text = bullet_re().replace_all(&text, "");
    let text = emphasis_re().replace_all(&text, |caps: &regex::Captures<'_>| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    });
    let text = blank_lines_re().replace_all(&text, "\n");
    text.trim().to_string()
}

/// 统一的字数计量
pub fn measure(text: &str) -> usize {
    strip_markdown(text).chars().count()
}

/// 按空行切分段落（去掉空段落）
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    paragraph_break_re()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// 容差窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToleranceWindow {
    pub target: usize,
    pub lower: usize,
    pub upper: usize,
}

impl ToleranceWindow {
    pub fn for_target(target: usize) -> Self {
        Self {
            target,
            lower: target * 9 / 10,
            upper: (target * 11).div_ceil(10),
        }
    }

    pub fn contains(&self, len: usize) -> bool {
        (self.lower..=self.upper).contains(&len)
    }
}

// ========== 结尾章节 ==========

/// 找到最后一个"まとめ"类标题，返回其所在行的字节偏移
pub fn find_summary_heading(text: &str) -> Option<usize> {
    let mut offset = 0;
    let mut found = None;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with('#') && is_conclusion_heading(trimmed.trim_start_matches('#')) {
            found = Some(offset);
        }
        offset += line.len();
    }
    found
}

fn is_conclusion_heading(heading: &str) -> bool {
    let heading = heading.trim();
    CONCLUSION_HEADINGS.iter().any(|word| heading.contains(word))
}

fn starts_with_conclusion(paragraph: &str) -> bool {
    let paragraph = paragraph.trim_start_matches(['「', ' ', '　']);
    CONCLUSION_OPENERS.iter().any(|word| paragraph.starts_with(word))
}

/// 拆分为 (正文, 结尾章节)
fn split_summary(text: &str) -> (&str, Option<&str>) {
    match find_summary_heading(text) {
        Some(idx) => (&text[..idx], Some(&text[idx..])),
        None => (text, None),
    }
}

// ========== 截断 ==========

/// 从末尾整段删除，直到总字数不超过上限（至少保留第一段）
///
/// 截断后末尾只剩标题行的段落一并删除
pub fn truncate_to_paragraphs(text: &str, upper: usize) -> String {
    let paragraphs = split_paragraphs(text);
    let mut kept: Vec<&str> = Vec::new();
    for paragraph in paragraphs {
        kept.push(paragraph);
        if kept.len() > 1 && measure(&kept.join("\n\n")) > upper {
            kept.pop();
            while kept.len() > 1 && kept.last().is_some_and(|p| is_heading_only(p)) {
                kept.pop();
            }
            break;
        }
    }
    kept.join("\n\n")
}

fn is_heading_only(paragraph: &str) -> bool {
    paragraph
        .lines()
        .filter(|line| !line.trim().is_empty())
        .all(|line| line.trim_start().starts_with('#'))
}

// ========== 字数控制 ==========

/// 控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforceMode {
    /// 单个章节：补充内容不带标题
    Section,
    /// 整篇文章：补充内容可使用 ##/### 标题
    Article,
}

/// 执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthAction {
    WithinTolerance,
    Supplemented,
    SupplementedAndTruncated,
    /// 补充请求失败或结果为空，保留原文
    SupplementFailed,
    Truncated,
    Summarized,
    /// 整篇超长且摘要关闭
    OverLengthKept,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcedText {
    pub text: String,
    pub original_len: usize,
    pub final_len: usize,
    pub action: LengthAction,
}

/// 补充请求所需的上下文
#[derive(Debug, Clone, Default)]
pub struct SupplementContext<'a> {
    pub title: &'a str,
    pub keyword: &'a str,
    pub ng_keywords: &'a [String],
}

/// 字数控制器
pub struct LengthEnforcer {
    provider: Arc<dyn CompletionProvider>,
    enable_article_summarization: bool,
}

impl LengthEnforcer {
    pub fn new(provider: Arc<dyn CompletionProvider>, enable_article_summarization: bool) -> Self {
        Self {
            provider,
            enable_article_summarization,
        }
    }

    /// 把文本调整到目标字数的容差窗口内（尽力而为，从不失败）
    pub async fn enforce(
        &self,
        text: &str,
        target: usize,
        mode: EnforceMode,
        ctx: &SupplementContext<'_>,
    ) -> EnforcedText {
        let window = ToleranceWindow::for_target(target);
        let original_len = measure(text);
        debug!(
            "字数检查: 实际 {} / 目标 {} (允许 {}-{})",
            original_len, target, window.lower, window.upper
        );

        if target == 0 || window.contains(original_len) {
            return finished(text.to_string(), original_len, LengthAction::WithinTolerance);
        }

        if original_len > window.upper {
            return self.handle_over_length(text, window, mode, original_len).await;
        }

        self.supplement(text, window, mode, ctx, original_len).await
    }

    async fn supplement(
        &self,
        text: &str,
        window: ToleranceWindow,
        mode: EnforceMode,
        ctx: &SupplementContext<'_>,
        original_len: usize,
    ) -> EnforcedText {
        let shortfall = window.target.saturating_sub(original_len);
        let (body, summary) = split_summary(text);
        info!(
            "✍️ 字数不足 ({} < {})，补充约 {} 字{}",
            original_len,
            window.lower,
            shortfall,
            if summary.is_some() { "（插入到结尾章节之前）" } else { "" }
        );

        let prompt = build_supplement_prompt(body, shortfall, mode, ctx);
        let request = CompletionRequest::new(prompt)
            .with_system("あなたは日本語のSEO記事ライターです。指示された追記部分だけを出力します。")
            .with_max_tokens(max_tokens_for_chars(shortfall));

        let reply = match self.provider.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("⚠️ 补充请求失败，保留原文: {}", e);
                return finished(text.to_string(), original_len, LengthAction::SupplementFailed);
            }
        };

        let addition = sanitize_supplement(&reply, mode);
        if addition.is_empty() {
            warn!("⚠️ 补充内容清洗后为空，保留原文");
            return finished(text.to_string(), original_len, LengthAction::SupplementFailed);
        }

        let mut combined = body.trim_end().to_string();
        if !combined.is_empty() {
            combined.push_str("\n\n");
        }
        combined.push_str(&addition);
        if let Some(summary) = summary {
            combined.push_str("\n\n");
            combined.push_str(summary.trim());
        }

        let combined_len = measure(&combined);
        if combined_len > window.upper {
            let truncated = truncate_to_paragraphs(&combined, window.upper);
            let len = measure(&truncated);
            debug!("补充后超出上限 ({} > {})，截断为 {} 字", combined_len, window.upper, len);
            return finished(truncated, len, LengthAction::SupplementedAndTruncated);
        }

        finished(combined, combined_len, LengthAction::Supplemented)
    }

    async fn handle_over_length(
        &self,
        text: &str,
        window: ToleranceWindow,
        mode: EnforceMode,
        original_len: usize,
    ) -> EnforcedText {
        match mode {
            EnforceMode::Section => {
                let truncated = truncate_to_paragraphs(text, window.upper);
                let len = measure(&truncated);
                info!("✂️ 章节超长 ({} > {})，按段落截断为 {} 字", original_len, window.upper, len);
                finished(truncated, len, LengthAction::Truncated)
            }
            EnforceMode::Article if self.enable_article_summarization => {
                match self.summarize(text, window.target).await {
                    Some(summarized) => {
                        let len = measure(&summarized);
                        info!("📉 整篇超长，摘要压缩: {} → {} 字", original_len, len);
                        finished(summarized, len, LengthAction::Summarized)
                    }
                    None => finished(text.to_string(), original_len, LengthAction::OverLengthKept),
                }
            }
            EnforceMode::Article => {
                debug!("整篇超长 ({} > {})，摘要压缩未启用，保留原文", original_len, window.upper);
                finished(text.to_string(), original_len, LengthAction::OverLengthKept)
            }
        }
    }

    /// 摘要压缩（整篇模式，受配置开关控制）
    ///
    /// 结果为空或没有变短时返回 `None`
    pub async fn summarize(&self, text: &str, target: usize) -> Option<String> {
        let prompt = format!(
            r#"以下の記事を、見出し構成（##/###）を保ったまま約{target}文字に要約・圧縮してください。

【ルール】
- 見出しの順番と文言は変更しない
- 各見出しの下の本文を短くまとめる
- 文は必ず「。」などの文末記号で終える
- 記事本文のみを出力し、前置きや説明は書かない

【記事】
{text}"#
        );
        let request = CompletionRequest::new(prompt)
            .with_temperature(0.3)
            .with_max_tokens(max_tokens_for_chars(target));

        match self.provider.complete(&request).await {
            Ok(reply) => {
                let reply = reply.trim().to_string();
                (!reply.is_empty() && measure(&reply) < measure(text)).then_some(reply)
            }
            Err(e) => {
                warn!("⚠️ 摘要压缩失败，保留原文: {}", e);
                None
            }
        }
    }
}

fn finished(text: String, original_len: usize, action: LengthAction) -> EnforcedText {
    let final_len = measure(&text);
    EnforcedText {
        text,
        original_len,
        final_len,
        action,
    }
}

fn build_supplement_prompt(
    body: &str,
    shortfall: usize,
    mode: EnforceMode,
    ctx: &SupplementContext<'_>,
) -> String {
    let structure_rule = match mode {
        EnforceMode::Section => "- 見出し（#記号）は一切使わず、段落のみで書く",
        EnforceMode::Article => "- 既存のMarkdown構造に合わせ、必要なら「##」「###」見出しを使う",
    };
    let ng_rule = if ctx.ng_keywords.is_empty() {
        String::new()
    } else {
        format!("- 次の語句は絶対に使わない: {}\n", ctx.ng_keywords.join("、"))
    };

    format!(
        r#"以下の文章は「{title}」（キーワード: {keyword}）の一部ですが、文字数が約{shortfall}文字不足しています。
既存の文章の続きとして自然につながる追記部分を、約{shortfall}文字で書いてください。

【ルール】
- 追記部分のみを出力する（既存の文章を繰り返さない）
- タイトルは書かない
- 「まとめ」「結論」「おわりに」などの締めくくりの見出しを作らない
- 「まとめると」「以上のように」などの結論めいた書き方をしない
{structure_rule}
{ng_rule}- 最後の文は必ず「。」などの文末記号で終える

【既存の文章】
{body}"#,
        title = ctx.title,
        keyword = ctx.keyword,
        body = body.trim(),
    )
}

/// 清洗补充内容：删除结尾类标题段落、结论式开头段落；章节模式去掉标题行
pub fn sanitize_supplement(reply: &str, mode: EnforceMode) -> String {
    let mut kept = Vec::new();
    for paragraph in split_paragraphs(reply) {
        let first_line = paragraph.lines().next().unwrap_or_default().trim();
        if first_line.starts_with('#') && is_conclusion_heading(first_line.trim_start_matches('#')) {
            continue;
        }
        if starts_with_conclusion(paragraph) {
            continue;
        }
        let paragraph = match mode {
            EnforceMode::Section => paragraph
                .lines()
                .filter(|line| !line.trim_start().starts_with('#'))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string(),
            EnforceMode::Article => paragraph.to_string(),
        };
        if !paragraph.is_empty() {
            kept.push(paragraph);
        }
    }
    kept.join("\n\n")
}
