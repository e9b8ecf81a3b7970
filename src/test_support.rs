//! 单元测试用的脚本化 LLM

use async_trait::async_trait;
use std::sync::Mutex;

use crate::clients::{CompletionProvider, CompletionRequest};
use crate::error::ProviderError;

type Rule = (String, Result<String, ProviderError>);

/// 按提示词中的关键片段返回预设回复；都不匹配时返回默认回复
pub(crate) struct ScriptedProvider {
    rules: Vec<Rule>,
    default_reply: Result<String, ProviderError>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub(crate) fn new(default_reply: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: Ok(default_reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(err: ProviderError) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: Err(err),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Ok(reply.into())));
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn model(&self) -> String {
        "scripted".to_string()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.rules
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

/// 生成指定字数的日文段落（以句号结尾）
pub(crate) fn japanese_paragraph(chars: usize) -> String {
    const SENTENCE: &str = "エスプレッソは抽出圧力が大切です。";
    let sentence_len = SENTENCE.chars().count();
    let mut text = SENTENCE.repeat(chars / sentence_len);
    let rest = chars % sentence_len;
    if rest > 0 {
        text.push_str(&"あ".repeat(rest - 1));
        text.push('。');
    }
    text
}

pub(crate) fn rate_limited() -> ProviderError {
    ProviderError::RateLimited {
        model: "scripted".to_string(),
        retry_after: None,
    }
}
