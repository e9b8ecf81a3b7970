//! 大纲回复解析
//!
//! 按行扫描的小型递归下降解析器，只认固定的记号：
//!
//! ```text
//! outline  := section*
//! section  := heading field*
//! heading  := LEAD title | "##" title | INDENT? "###" title
//! field    := "説明:" text | "推定文字数:" number
//! ```
//!
//! 不认识的行直接跳过；没有解析出任何章节时返回 `ParseError`，
//! 由调用方换成固定的兜底大纲。这不是通用的 markdown 解析器。

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// 结构化回复不符合预期格式（只在生成器内部使用，不会传给用户）
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("回复为空")]
    EmptyReply,
    #[error("没有解析出任何章节")]
    NoSections,
    #[error("没有解析出任何标题")]
    NoTitles,
}

/// 解析出的章节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSection {
    pub title: String,
    pub level: u8,
    pub is_lead: bool,
    pub description: String,
    pub estimated_word_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Lead(String),
    H2(String),
    H3(String),
    Description(String),
    Estimate(usize),
}

fn lead_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:【リード(?:文)?】|\[リード(?:文)?\]|リード(?:文)?\s*[:：])\s*(.*)$")
            .expect("valid regex")
    })
}

fn h2_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^##\s+(.+)$").expect("valid regex"))
}

fn h3_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*###\s+(.+)$").expect("valid regex"))
}

fn description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-・*]\s*)?説明\s*[:：]\s*(.*)$").expect("valid regex"))
}

fn estimate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-・*]\s*)?推定文字数\s*[:：]\s*(?:約)?\s*([0-9０-９,，]+)")
            .expect("valid regex")
    })
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches('*')
        .trim()
        .trim_start_matches('「')
        .trim_end_matches('」')
        .trim()
        .to_string()
}

fn parse_number(raw: &str) -> Option<usize> {
    let digits: String = raw
        .chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32),
            _ => None,
        })
        .collect();
    digits.parse().ok()
}

/// 词法：逐行识别记号
fn tokenize(reply: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for line in reply.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(caps) = lead_re().captures(line) {
            tokens.push(Token::Lead(clean_title(&caps[1])));
        } else if let Some(caps) = h3_re().captures(line) {
            tokens.push(Token::H3(clean_title(&caps[1])));
        } else if let Some(caps) = h2_re().captures(line) {
            tokens.push(Token::H2(clean_title(&caps[1])));
        } else if let Some(caps) = description_re().captures(line) {
            tokens.push(Token::Description(caps[1].trim().to_string()));
        } else if let Some(n) = estimate_re().captures(line).and_then(|c| parse_number(&c[1])) {
            tokens.push(Token::Estimate(n));
        }
    }
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_outline(&mut self) -> Vec<ParsedSection> {
        let mut sections = Vec::new();
        while self.peek().is_some() {
            match self.parse_section() {
                Some(section) => sections.push(section),
                // 标题之前的孤立字段
                None => {
                    self.advance();
                }
            }
        }
        sections
    }

    fn parse_section(&mut self) -> Option<ParsedSection> {
        let (title, level, is_lead) = match self.peek()? {
            Token::Lead(t) => (t.clone(), 2, true),
            Token::H2(t) => (t.clone(), 2, false),
            Token::H3(t) => (t.clone(), 3, false),
            _ => return None,
        };
        self.advance();

        let mut section = ParsedSection {
            title,
            level,
            is_lead,
            description: String::new(),
            estimated_word_count: None,
        };
        self.parse_fields(&mut section);

        if section.is_lead && section.title.is_empty() {
            section.title = "導入".to_string();
        }
        (!section.title.is_empty()).then_some(section)
    }

    fn parse_fields(&mut self, section: &mut ParsedSection) {
        while let Some(token) = self.peek() {
            match token {
                Token::Description(d) => {
                    if section.description.is_empty() {
                        section.description = d.clone();
                    }
                }
                Token::Estimate(n) => {
                    section.estimated_word_count.get_or_insert(*n);
                }
                _ => break,
            }
            self.advance();
        }
    }
}

/// 解析大纲回复
pub fn parse_outline(reply: &str) -> Result<Vec<ParsedSection>, ParseError> {
    if reply.trim().is_empty() {
        return Err(ParseError::EmptyReply);
    }
    let mut parser = Parser {
        tokens: tokenize(reply),
        pos: 0,
    };
    let sections = parser.parse_outline();
    if sections.is_empty() {
        return Err(ParseError::NoSections);
    }
    Ok(sections)
}
