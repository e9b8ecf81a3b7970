use crate::error::{AppError, AppResult, ConfigError, FileError};
use serde::Deserialize;
use std::path::Path;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时处理的生成任务数量
    pub max_concurrent_sessions: usize,
    /// 任务 TOML 文件存放目录
    pub jobs_folder: String,
    /// 生成文章输出目录
    pub output_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 趋势分析配置 ---
    /// 未配置时使用启发式趋势数据
    pub trend_api_base_url: Option<String>,
    pub trend_region: String,
    pub trend_timeframe: String,
    // --- 生成策略 ---
    /// 携带的前文上限（字符数），0 表示不限制
    pub context_char_limit: usize,
    /// 整篇超长时是否启用摘要压缩
    pub enable_article_summarization: bool,
    /// 标题候选数量
    pub title_candidate_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 4,
            jobs_folder: "jobs".to_string(),
            output_folder: "output_articles".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.7,
            llm_max_tokens: 4096,
            trend_api_base_url: None,
            trend_region: "JP".to_string(),
            trend_timeframe: "today 3-m".to_string(),
            context_char_limit: 6000,
            enable_article_summarization: false,
            title_candidate_count: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 先读取 TOML 配置文件（若存在），再用环境变量覆盖
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)
                    .map_err(|e| AppError::file_read_failed(p.display().to_string(), e))?;
                toml::from_str::<Config>(&content).map_err(|e| FileError::TomlParseFailed {
                    path: p.display().to_string(),
                    source: e,
                })?
            }
            _ => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(self) -> Self {
        let default = self;
        Self {
            max_concurrent_sessions: env_parse("MAX_CONCURRENT_SESSIONS").unwrap_or(default.max_concurrent_sessions),
            jobs_folder: std::env::var("JOBS_FOLDER").unwrap_or(default.jobs_folder),
            output_folder: std::env::var("OUTPUT_FOLDER").unwrap_or(default.output_folder),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE").unwrap_or(default.llm_temperature),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(default.llm_max_tokens),
            trend_api_base_url: std::env::var("TREND_API_BASE_URL").ok().or(default.trend_api_base_url),
            trend_region: std::env::var("TREND_REGION").unwrap_or(default.trend_region),
            trend_timeframe: std::env::var("TREND_TIMEFRAME").unwrap_or(default.trend_timeframe),
            context_char_limit: env_parse("CONTEXT_CHAR_LIMIT").unwrap_or(default.context_char_limit),
            enable_article_summarization: env_parse("ENABLE_ARTICLE_SUMMARIZATION").unwrap_or(default.enable_article_summarization),
            title_candidate_count: env_parse("TITLE_CANDIDATE_COUNT").unwrap_or(default.title_candidate_count),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_sessions == 0 {
            return Err(ConfigError::InvalidFile {
                path: "max_concurrent_sessions".to_string(),
                message: "必须大于 0".to_string(),
            });
        }
        if self.title_candidate_count == 0 {
            return Err(ConfigError::InvalidFile {
                path: "title_candidate_count".to_string(),
                message: "必须大于 0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    std::env::var(var_name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keeps_summarization_off() {
        let config = Config::default();
        assert!(!config.enable_article_summarization);
        assert_eq!(config.context_char_limit, 6000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "llm_model_name = \"test-model\"\ncontext_char_limit = 1200\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        // 环境变量可能覆盖模型名，这里只校验未被覆盖的字段
        assert_eq!(config.jobs_folder, "jobs");
        if std::env::var("CONTEXT_CHAR_LIMIT").is_err() {
            assert_eq!(config.context_char_limit, 1200);
        }
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.title_candidate_count, Config::default().title_candidate_count);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "max_concurrent_sessions = \"many\"").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(AppError::File(FileError::TomlParseFailed { .. }))
        ));
    }
}
