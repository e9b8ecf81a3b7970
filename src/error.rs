use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Provider(#[from] ProviderError),
    /// 流程状态错误
    #[error("流程错误: {0}")]
    Pipeline(#[from] PipelineError),
    /// 趋势分析错误
    #[error("趋势分析错误: {0}")]
    Trend(#[from] TrendError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// LLM 服务错误
///
/// Display 文本带有内部错误码前缀，展示给用户前通过
/// [`AppError::user_message`] 去掉。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// 请求频率限制（HTTP 429）
    #[error("RATE_LIMIT: 请求频率受限 (模型: {model})，请稍后重试")]
    RateLimited {
        model: String,
        retry_after: Option<u64>,
    },
    /// 认证失败或模型不存在
    #[error("AUTH_ERROR: 认证失败 (模型: {model}): {message}")]
    Auth { model: String, message: String },
    /// 其他调用失败
    #[error("GENERATION_ERROR: LLM API调用失败 (模型: {model}): {message}")]
    Generation { model: String, message: String },
    /// 返回内容为空
    #[error("GENERATION_ERROR: LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

impl ProviderError {
    /// 是否值得稍后重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// 流程状态错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("缺少趋势分析数据，请先执行步骤 1")]
    MissingTrendData,
    #[error("关键词和选定标题不能同时为空")]
    MissingKeywordsOrTitle,
    #[error("大纲为空或不包含任何章节")]
    EmptyOutline,
    #[error("关键词不能为空")]
    EmptyKeywords,
    #[error("会话 {session_id} 正在生成中")]
    SessionBusy { session_id: String },
    #[error("导言章节必须唯一且位于第一位")]
    LeadPlacement,
    #[error("章节不存在: {section_id}")]
    SectionNotFound { section_id: String },
    #[error("索引 {index} 超出范围 [0, {max_index}]")]
    IndexOutOfRange { index: usize, max_index: usize },
}

/// 趋势分析错误
#[derive(Debug, Error)]
pub enum TrendError {
    #[error("趋势接口请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("趋势接口返回错误状态 ({endpoint}): {status}")]
    BadStatus { endpoint: String, status: u16 },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("TOML序列化失败: {0}")]
    TomlSerializeFailed(#[from] toml::ser::Error),
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件无效 ({path}): {message}")]
    InvalidFile { path: String, message: String },
}

// ========== 便捷方法 ==========

fn code_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z_]+:\s*").expect("valid regex"))
}

impl AppError {
    /// 面向用户的失败信息（去掉内部错误码前缀）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Provider(e) => code_prefix().replace(&e.to_string(), "").into_owned(),
            other => other.to_string(),
        }
    }

    /// 是否值得稍后重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Provider(e) if e.is_retryable())
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
