//! 趋势数据来源
//!
//! 趋势 / 竞品数据对本系统是不透明的输入；这里只负责取回
//! `TrendAnalysisResult`，失败时由流程层切换到启发式来源

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error::TrendError;
use crate::models::trend::{
    Competition, CompetitorAnalysis, CompetitorArticle, SeoData, TrendAnalysisResult,
    UserInterest,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn analyze(
        &self,
        keyword: &str,
        region: &str,
        timeframe: &str,
    ) -> Result<TrendAnalysisResult, TrendError>;
}

/// 通过 HTTP 接口获取趋势数据
pub struct HttpTrendSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTrendSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 配置了趋势接口时返回 HTTP 来源
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .trend_api_base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl TrendSource for HttpTrendSource {
    async fn analyze(
        &self,
        keyword: &str,
        region: &str,
        timeframe: &str,
    ) -> Result<TrendAnalysisResult, TrendError> {
        let endpoint = format!("{}/trends", self.base_url);
        debug!("请求趋势接口: {} (关键词: {})", endpoint, keyword);

        let response = self
            .client
            .get(&endpoint)
            .query(&[("keyword", keyword), ("region", region), ("timeframe", timeframe)])
            .send()
            .await
            .map_err(|e| TrendError::RequestFailed {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(TrendError::BadStatus {
                endpoint,
                status: response.status().as_u16(),
            });
        }

        response
            .json::<TrendAnalysisResult>()
            .await
            .map_err(|e| TrendError::RequestFailed { endpoint, source: e })
    }
}

/// 启发式（低精度）趋势数据，不依赖外部服务，结果确定
#[derive(Debug, Default, Clone)]
pub struct HeuristicTrendSource;

impl HeuristicTrendSource {
    pub fn build(&self, keyword: &str) -> TrendAnalysisResult {
        let keyword = keyword.trim();
        let seed = keyword.chars().map(|c| c as u64).sum::<u64>();
        let competition = match seed % 3 {
            0 => Competition::Low,
            1 => Competition::Medium,
            _ => Competition::High,
        };

        let related_keywords = ["おすすめ", "選び方", "使い方", "比較", "初心者", "メリット"]
            .iter()
            .map(|suffix| format!("{} {}", keyword, suffix))
            .collect();

        let top_articles = vec![
            CompetitorArticle {
                title: format!("{}とは？基本から徹底解説", keyword),
                url: "https://example.com/guide".to_string(),
                domain: "example.com".to_string(),
                word_count: 4000,
                headings: vec![
                    format!("{}とは", keyword),
                    format!("{}の特徴", keyword),
                    format!("{}の選び方", keyword),
                ],
            },
            CompetitorArticle {
                title: format!("{}のおすすめ10選", keyword),
                url: "https://example.org/ranking".to_string(),
                domain: "example.org".to_string(),
                word_count: 6000,
                headings: vec![
                    format!("{}の選び方", keyword),
                    "おすすめランキング".to_string(),
                    "よくある質問".to_string(),
                ],
            },
        ];

        TrendAnalysisResult {
            keyword: keyword.to_string(),
            trend_score: 50.0 + (seed % 40) as f64,
            search_volume: 1000 + (seed % 9000),
            competition,
            related_keywords,
            hot_topics: vec![
                format!("{}の最新モデル", keyword),
                format!("{}の口コミ", keyword),
            ],
            competitor_analysis: CompetitorAnalysis {
                average_word_count: 5000,
                common_topics: vec!["選び方".to_string(), "比較".to_string()],
                top_articles,
            },
            seo_data: SeoData {
                difficulty: (seed % 100) as u8,
                recommended_word_count: 3000,
                top_keywords: vec![keyword.to_string()],
            },
            user_interest: UserInterest {
                questions: vec![format!("{}はどう選べばいい？", keyword)],
                concerns: vec!["価格".to_string(), "手入れ".to_string()],
            },
        }
    }
}

#[async_trait]
impl TrendSource for HeuristicTrendSource {
    async fn analyze(
        &self,
        keyword: &str,
        _region: &str,
        _timeframe: &str,
    ) -> Result<TrendAnalysisResult, TrendError> {
        Ok(self.build(keyword))
    }
}
