//! LLM 补全能力
//!
//! 对上层只暴露"提交提示词、拿回文本"这一能力，
//! 并把限流 / 认证失败区分为不同的错误类型
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ProviderError;

/// 单次补全请求
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_message: Option<String>,
    /// 为空时使用客户端配置的默认温度
    pub temperature: Option<f32>,
    /// 不超过客户端配置的 `llm_max_tokens`
    pub max_tokens: u32,
    /// 为空时使用客户端默认模型
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_message: None,
            temperature: None,
            max_tokens: 4096,
            model: None,
        }
    }

    pub fn with_system(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// 按目标字数估算 max_tokens（日文约 1 字 1 token，留出余量）
pub fn max_tokens_for_chars(target_chars: usize) -> u32 {
    (target_chars * 2 + 500).clamp(512, 8000) as u32
}

/// 补全能力
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 模型名称（仅用于日志）
    fn model(&self) -> String;

    /// 提交提示词，返回生成文本
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

/// 基于 OpenAI 兼容接口的实现
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model_name: String,
    default_temperature: f32,
    max_tokens_cap: u32,
}

impl OpenAiProvider {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            default_temperature: config.llm_temperature,
            max_tokens_cap: config.llm_max_tokens,
        }
    }

    /// 请求未指定温度时取配置值；max_tokens 以配置值为上限
    fn sampling(&self, request: &CompletionRequest) -> (f32, u32) {
        let temperature = request.temperature.unwrap_or(self.default_temperature);
        let max_tokens = if self.max_tokens_cap == 0 {
            request.max_tokens
        } else {
            request.max_tokens.min(self.max_tokens_cap)
        };
        (temperature, max_tokens)
    }

    fn build_messages(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages = Vec::new();

        if let Some(sys_msg) = &request.system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg.as_str())
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.as_str())
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        Ok(messages)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn model(&self) -> String {
        self.model_name.clone()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.model_name.clone());
        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符", request.prompt.chars().count());

        let messages = self
            .build_messages(request)
            .map_err(|e| classify_openai_error(&model, e))?;

        let (temperature, max_tokens) = self.sampling(request);
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&model)
            .messages(messages)
            .temperature(temperature)
            .max_tokens(max_tokens)
            .build()
            .map_err(|e| classify_openai_error(&model, e))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            classify_openai_error(&model, e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ProviderError::EmptyContent { model })?;

        Ok(content)
    }
}

fn classify_openai_error(model: &str, err: OpenAIError) -> ProviderError {
    match err {
        OpenAIError::ApiError(api) => classify(
            model,
            &api.message,
            api.r#type.as_deref(),
            api.code.as_deref(),
        ),
        other => classify(model, &other.to_string(), None, None),
    }
}

/// 根据错误信息判断错误类型
fn classify(model: &str, message: &str, kind: Option<&str>, code: Option<&str>) -> ProviderError {
    let haystack = format!(
        "{} {} {}",
        message,
        kind.unwrap_or_default(),
        code.unwrap_or_default()
    )
    .to_lowercase();

    if haystack.contains("429") || haystack.contains("rate_limit") || haystack.contains("rate limit") {
        ProviderError::RateLimited {
            model: model.to_string(),
            retry_after: None,
        }
    } else if haystack.contains("401")
        || haystack.contains("403")
        || haystack.contains("invalid_api_key")
        || haystack.contains("authentication")
        || haystack.contains("model_not_found")
        || haystack.contains("does not exist")
    {
        ProviderError::Auth {
            model: model.to_string(),
            message: message.to_string(),
        }
    } else {
        ProviderError::Generation {
            model: model.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let err = classify("m", "Rate limit reached for requests", Some("requests"), Some("rate_limit_exceeded"));
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        let err = classify("m", "HTTP status 429 Too Many Requests", None, None);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth() {
        let err = classify("m", "Incorrect API key provided", Some("invalid_request_error"), Some("invalid_api_key"));
        assert!(matches!(err, ProviderError::Auth { .. }));
        let err = classify("m", "The model `gpt-9` does not exist", None, Some("model_not_found"));
        assert!(matches!(err, ProviderError::Auth { .. }));
    }

    #[test]
    fn test_classify_generic() {
        let err = classify("m", "connection reset by peer", None, None);
        assert!(matches!(err, ProviderError::Generation { .. }));
    }

    #[test]
    fn test_max_tokens_is_clamped() {
        assert_eq!(max_tokens_for_chars(0), 512);
        assert_eq!(max_tokens_for_chars(1000), 2500);
        assert_eq!(max_tokens_for_chars(100_000), 8000);
    }

    #[test]
    fn test_config_supplies_default_temperature_and_token_cap() {
        let config = Config {
            llm_temperature: 0.4,
            llm_max_tokens: 1000,
            ..Config::default()
        };
        let provider = OpenAiProvider::new(&config);

        let request = CompletionRequest::new("p").with_max_tokens(4000);
        assert_eq!(provider.sampling(&request), (0.4, 1000));

        let request = CompletionRequest::new("p").with_temperature(0.9).with_max_tokens(600);
        assert_eq!(provider.sampling(&request), (0.9, 600));
    }

    /// 测试 LLM API 连接性（需要真实的 API Key）
    #[tokio::test]
    #[ignore]
    async fn test_openai_provider_connectivity() {
        let _ = tracing_subscriber::fmt::try_init();

        let provider = OpenAiProvider::new(&Config::from_env());
        let result = provider
            .complete(&CompletionRequest::new("「こんにちは」と一言だけ返してください").with_max_tokens(32))
            .await;

        match result {
            Ok(response) => {
                println!("LLM 响应: {}", response);
                assert!(!response.is_empty());
            }
            Err(e) => panic!("LLM 调用失败: {}", e),
        }
    }
}
