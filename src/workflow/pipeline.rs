//! 文章生成流程 - 流程层
//!
//! 核心职责：定义"一篇文章"的四步生成流程
//!
//! ```text
//! idle → analyzing → analyzed
//!      → title_generating → titles_ready
//!      → outline_generating → outline_ready
//!      → section_generating → assembled
//! ```
//!
//! 1. 趋势分析（失败时改用启发式数据，不中断流程）
//! 2. 标题候选
//! 3. 大纲
//! 4. 逐章节生成 + 组装
//!
//! 任何一步失败：记录 `error`、复位 `is_generating`、状态回到该步开始前，
//! 之前步骤的数据保持不变，调用方可以只重试失败的那一步。

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clients::{CompletionProvider, HeuristicTrendSource, HttpTrendSource, TrendSource};
use crate::config::Config;
use crate::error::{AppError, AppResult, PipelineError};
use crate::models::title::best_title;
use crate::models::{
    Article, ArticleOutline, GenerationOptions, KeywordPreference, KeywordPreferences, StepData,
    StepResult, TitleSuggestion, TrendAnalysisResult,
};
use crate::services::assembler::{build_article, join_sections};
use crate::services::length::{EnforceMode, LengthEnforcer, SupplementContext};
use crate::services::{
    OutlineRequest, OutlineService, SectionProgress, SectionService, TitleRequest, TitleService,
};
use crate::workflow::session::{SessionLease, SessionRegistry};

/// 流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Analyzing,
    Analyzed,
    TitleGenerating,
    TitlesReady,
    OutlineGenerating,
    OutlineReady,
    SectionGenerating,
    Assembled,
}

/// 文章生成流程（一个会话一个实例）
///
/// - 步骤严格顺序执行，章节也逐个生成
/// - 同一会话标识同时只允许一个实例运行（见 `SessionRegistry`）
/// - 只依赖业务能力（services）
pub struct ArticlePipeline {
    session_id: String,
    registry: SessionRegistry,
    lease: Option<SessionLease>,

    trend_source: Option<Arc<dyn TrendSource>>,
    trend_region: String,
    trend_timeframe: String,
    title_service: TitleService,
    outline_service: OutlineService,
    section_service: SectionService,
    article_enforcer: LengthEnforcer,

    state: PipelineState,
    current_step: u8,
    keywords: Vec<String>,
    trend_data: Option<TrendAnalysisResult>,
    title_suggestions: Vec<TitleSuggestion>,
    outline: Option<ArticleOutline>,
    article: Option<Article>,
    step_results: Vec<StepResult>,
    keyword_preferences: KeywordPreferences,
    is_generating: bool,
    error: Option<String>,
}

impl ArticlePipeline {
    /// 创建新的生成流程
    ///
    /// 配置了趋势接口时使用 HTTP 来源，否则直接使用启发式数据
    pub fn new(
        session_id: impl Into<String>,
        config: &Config,
        provider: Arc<dyn CompletionProvider>,
        registry: SessionRegistry,
    ) -> Self {
        let trend_source =
            HttpTrendSource::from_config(config).map(|s| Arc::new(s) as Arc<dyn TrendSource>);
        Self {
            session_id: session_id.into(),
            registry,
            lease: None,
            trend_source,
            trend_region: config.trend_region.clone(),
            trend_timeframe: config.trend_timeframe.clone(),
            title_service: TitleService::new(provider.clone(), config.title_candidate_count),
            outline_service: OutlineService::new(provider.clone()),
            section_service: SectionService::new(provider.clone(), config.context_char_limit),
            article_enforcer: LengthEnforcer::new(provider, config.enable_article_summarization),
            state: PipelineState::Idle,
            current_step: 1,
            keywords: Vec::new(),
            trend_data: None,
            title_suggestions: Vec::new(),
            outline: None,
            article: None,
            step_results: Vec::new(),
            keyword_preferences: KeywordPreferences::new(),
            is_generating: false,
            error: None,
        }
    }

    /// 替换趋势数据来源
    pub fn with_trend_source(mut self, source: Arc<dyn TrendSource>) -> Self {
        self.trend_source = Some(source);
        self
    }

    /// 预置关键词偏好（例如来自任务文件）
    pub fn with_keyword_preferences(mut self, preferences: KeywordPreferences) -> Self {
        self.keyword_preferences = preferences;
        self
    }

    // ========== 步骤 1: 趋势分析 ==========

    /// 已有趋势数据时直接返回（不重复分析，也不追加记录）
    pub async fn execute_step1(&mut self, keywords: &[String]) -> AppResult<TrendAnalysisResult> {
        if let Some(trend) = &self.trend_data {
            debug!("{} 已有趋势数据，跳过步骤 1", self.tag());
            return Ok(trend.clone());
        }

        let previous = self.state;
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        let Some(primary) = keywords.first().cloned() else {
            return Err(self.fail(1, previous, PipelineError::EmptyKeywords.into()));
        };
        if let Err(e) = self.ensure_lease() {
            return Err(self.fail(1, previous, e.into()));
        }

        self.begin(PipelineState::Analyzing);
        info!("{} 📈 步骤 1: 分析关键词「{}」", self.tag(), primary);

        let trend = self.analyze_trend(&primary).await;
        for keyword in &keywords {
            self.keyword_preferences.add(keyword);
        }
        self.keywords = keywords;
        self.trend_data = Some(trend.clone());

        self.finish(
            StepResult::completed(1, StepData::Trend(trend.clone())),
            PipelineState::Analyzed,
        );
        Ok(trend)
    }

    async fn analyze_trend(&self, keyword: &str) -> TrendAnalysisResult {
        if let Some(source) = &self.trend_source {
            match source
                .analyze(keyword, &self.trend_region, &self.trend_timeframe)
                .await
            {
                Ok(trend) => return trend,
                Err(e) => warn!("{} ⚠️ 趋势分析失败，改用启发式数据: {}", self.tag(), e),
            }
        }
        HeuristicTrendSource.build(keyword)
    }

    // ========== 步骤 2: 标题候选 ==========

    /// 生成标题候选，替换之前的步骤 2 结果
    pub async fn execute_step2(&mut self) -> AppResult<Vec<TitleSuggestion>> {
        let previous = self.state;
        let Some(trend) = self.trend_data.clone() else {
            return Err(self.fail(2, previous, PipelineError::MissingTrendData.into()));
        };
        if let Err(e) = self.ensure_lease() {
            return Err(self.fail(2, previous, e.into()));
        }

        self.begin(PipelineState::TitleGenerating);
        info!("{} 💡 步骤 2: 生成标题候选", self.tag());

        let keyword = self
            .keywords
            .first()
            .cloned()
            .unwrap_or_else(|| trend.keyword.clone());
        let titles = self
            .title_service
            .generate(TitleRequest {
                keyword: &keyword,
                trend: &trend,
                preferences: &self.keyword_preferences,
            })
            .await;

        self.title_suggestions = titles.clone();
        self.finish(
            StepResult::completed(2, StepData::Titles(titles.clone())),
            PipelineState::TitlesReady,
        );
        Ok(titles)
    }

    // ========== 步骤 3: 大纲 ==========

    /// 生成大纲，替换之前的步骤 3 结果
    ///
    /// 关键词和选定标题至少要有一个；选定标题始终覆盖模型给出的标题
    pub async fn execute_step3(
        &mut self,
        keywords: &[String],
        options: &GenerationOptions,
    ) -> AppResult<ArticleOutline> {
        let previous = self.state;
        let has_keywords = keywords.iter().any(|k| !k.trim().is_empty());
        if !has_keywords && options.selected_title().is_none() {
            return Err(self.fail(3, previous, PipelineError::MissingKeywordsOrTitle.into()));
        }
        if let Err(e) = self.ensure_lease() {
            return Err(self.fail(3, previous, e.into()));
        }

        self.begin(PipelineState::OutlineGenerating);
        info!(
            "{} 🧭 步骤 3: 生成大纲 (目标 {} 字)",
            self.tag(),
            options.effective_target()
        );

        let result = self
            .outline_service
            .generate(OutlineRequest {
                keywords,
                trend: self.trend_data.as_ref(),
                options,
                preferences: &self.keyword_preferences,
            })
            .await;

        let outline = match result {
            Ok(outline) => outline,
            Err(e) => return Err(self.fail(3, previous, e.into())),
        };

        info!(
            "{} ✓ 大纲: 「{}」，{} 个章节，合计 {} 字",
            self.tag(),
            outline.title,
            outline.sections.len(),
            outline.estimated_word_count
        );
        self.outline = Some(outline.clone());
        self.finish(
            StepResult::completed(3, StepData::Outline(outline.clone())),
            PipelineState::OutlineReady,
        );
        Ok(outline)
    }

    // ========== 步骤 4: 章节生成 + 组装 ==========

    /// 按顺序生成全部章节并组装文章；完成后释放会话租约
    pub async fn execute_step4(
        &mut self,
        options: &GenerationOptions,
        on_progress: impl FnMut(SectionProgress) + Send,
    ) -> AppResult<Article> {
        let previous = self.state;
        let mut outline = match self.outline.clone() {
            Some(outline) if !outline.sections.is_empty() => outline,
            _ => return Err(self.fail(4, previous, PipelineError::EmptyOutline.into())),
        };
        if let Err(e) = outline.validate().and_then(|_| self.ensure_lease()) {
            return Err(self.fail(4, previous, e.into()));
        }

        self.begin(PipelineState::SectionGenerating);
        info!(
            "{} ✍️ 步骤 4: 生成 {} 个章节",
            self.tag(),
            outline.sections.len()
        );

        if let Err(e) = self
            .section_service
            .generate_all(&mut outline, options, on_progress)
            .await
        {
            return Err(self.fail(4, previous, e.into()));
        }

        let content = match join_sections(&outline) {
            Ok(content) => content,
            Err(e) => return Err(self.fail(4, previous, e.into())),
        };

        let ng = outline.keyword_preferences.ng();
        let enforced = self
            .article_enforcer
            .enforce(
                &content,
                outline.estimated_word_count,
                EnforceMode::Article,
                &SupplementContext {
                    title: &outline.title,
                    keyword: &outline.keyword,
                    ng_keywords: &ng,
                },
            )
            .await;
        debug!(
            "{} 整篇字数: {} → {} ({:?})",
            self.tag(),
            enforced.original_len,
            enforced.final_len,
            enforced.action
        );

        let article = build_article(&outline, &enforced.text);
        info!(
            "{} ✅ 文章组装完成: 「{}」 {} 字",
            self.tag(),
            article.title,
            article.word_count
        );

        self.outline = Some(outline);
        self.article = Some(article.clone());
        self.finish(
            StepResult::completed(4, StepData::Article(article.clone())),
            PipelineState::Assembled,
        );
        self.lease = None;
        Ok(article)
    }

    // ========== 大纲编辑（步骤 3 与步骤 4 之间） ==========

    /// 用编辑后的大纲替换当前大纲
    pub fn update_outline(&mut self, mut outline: ArticleOutline) -> Result<(), PipelineError> {
        self.ensure_idle()?;
        outline.validate()?;
        outline.renumber();
        self.outline = Some(outline);
        self.state = PipelineState::OutlineReady;
        Ok(())
    }

    /// 在当前大纲的副本上执行编辑，成功后才替换
    pub fn edit_outline<F>(&mut self, edit: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut ArticleOutline) -> Result<(), PipelineError>,
    {
        let mut outline = self.outline.clone().ok_or(PipelineError::EmptyOutline)?;
        edit(&mut outline)?;
        self.update_outline(outline)
    }

    // ========== 关键词偏好（任意步骤可用，只影响之后的步骤 2/3） ==========

    /// default → ng → essential → default
    pub fn toggle_keyword_preference(&mut self, keyword: &str) -> KeywordPreference {
        self.keyword_preferences.toggle(keyword)
    }

    pub fn add_keyword(&mut self, keyword: &str) {
        self.keyword_preferences.add(keyword);
    }

    pub fn set_keyword_preference(&mut self, keyword: &str, preference: KeywordPreference) {
        self.keyword_preferences.set(keyword, preference);
    }

    pub fn remove_keyword(&mut self, keyword: &str) -> bool {
        self.keyword_preferences.remove(keyword)
    }

    // ========== 步骤导航 ==========

    pub fn next_step(&mut self) -> u8 {
        if self.current_step < 4 {
            self.current_step += 1;
        }
        self.current_step
    }

    pub fn previous_step(&mut self) -> u8 {
        if self.current_step > 1 {
            self.current_step -= 1;
        }
        self.current_step
    }

    /// 放弃当前会话的全部数据并释放租约
    pub fn reset(&mut self) {
        info!("{} 🔄 重置会话", self.tag());
        self.lease = None;
        self.state = PipelineState::Idle;
        self.current_step = 1;
        self.keywords.clear();
        self.trend_data = None;
        self.title_suggestions.clear();
        self.outline = None;
        self.article = None;
        self.step_results.clear();
        self.is_generating = false;
        self.error = None;
    }

    // ========== 只读访问 ==========

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn current_step(&self) -> u8 {
        self.current_step
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn trend_data(&self) -> Option<&TrendAnalysisResult> {
        self.trend_data.as_ref()
    }

    pub fn title_suggestions(&self) -> &[TitleSuggestion] {
        &self.title_suggestions
    }

    /// 综合得分最高的标题候选
    pub fn best_title(&self) -> Option<&TitleSuggestion> {
        best_title(&self.title_suggestions)
    }

    pub fn outline(&self) -> Option<&ArticleOutline> {
        self.outline.as_ref()
    }

    pub fn article(&self) -> Option<&Article> {
        self.article.as_ref()
    }

    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    pub fn keyword_preferences(&self) -> &KeywordPreferences {
        &self.keyword_preferences
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn holds_lease(&self) -> bool {
        self.lease.is_some()
    }

    // ========== 内部状态维护 ==========

    fn tag(&self) -> String {
        format!("[会话 {}]", self.session_id)
    }

    fn ensure_lease(&mut self) -> Result<(), PipelineError> {
        if self.lease.is_none() {
            self.lease = Some(self.registry.acquire(&self.session_id)?);
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), PipelineError> {
        if self.is_generating {
            return Err(PipelineError::SessionBusy {
                session_id: self.session_id.clone(),
            });
        }
        Ok(())
    }

    fn begin(&mut self, state: PipelineState) {
        self.state = state;
        self.is_generating = true;
        self.error = None;
    }

    fn finish(&mut self, result: StepResult, state: PipelineState) {
        self.current_step = (result.step + 1).min(4);
        self.record(result);
        self.state = state;
        self.is_generating = false;
    }

    fn fail(&mut self, step: u8, revert_to: PipelineState, err: AppError) -> AppError {
        let message = err.user_message();
        error!("{} ❌ 步骤 {} 失败: {}", self.tag(), step, message);
        self.error = Some(message.clone());
        self.is_generating = false;
        self.state = revert_to;
        self.record(StepResult::failed(step, message));
        err
    }

    /// 步骤 1 追加记录；步骤 2/3/4 按步骤号替换
    fn record(&mut self, result: StepResult) {
        if result.step > 1 {
            self.step_results.retain(|r| r.step != result.step);
        }
        self.step_results.push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::llm_client::MockCompletionProvider;
    use crate::clients::trend_client::MockTrendSource;
    use crate::error::{ProviderError, TrendError};
    use crate::models::{OutlineSection, StepStatus};
    use crate::test_support::{japanese_paragraph, ScriptedProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OUTLINE_REPLY: &str = "【リード】導入\n説明: 共感\n## 選び方\n説明: ポイント\n## 手入れ\n説明: 掃除";

    fn scripted() -> Arc<ScriptedProvider> {
        Arc::new(
            ScriptedProvider::new(japanese_paragraph(50))
                .on(
                    "記事タイトルを",
                    r#"[{"title": "エスプレッソマシンの選び方", "description": "比較", "seoScore": 90, "clickPotential": 80}]"#,
                )
                .on("構成案を作成してください", OUTLINE_REPLY)
                .on("【執筆する見出し】", japanese_paragraph(333)),
        )
    }

    fn pipeline(provider: Arc<dyn CompletionProvider>, registry: &SessionRegistry) -> ArticlePipeline {
        ArticlePipeline::new("espresso", &Config::default(), provider, registry.clone())
    }

    fn keywords() -> Vec<String> {
        vec!["エスプレッソマシン".to_string()]
    }

    fn target(n: usize) -> GenerationOptions {
        GenerationOptions {
            target_word_count: Some(n),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_flow_reaches_assembled() {
        let registry = SessionRegistry::new();
        let mut p = pipeline(scripted(), &registry);

        p.execute_step1(&keywords()).await.unwrap();
        assert_eq!(p.state(), PipelineState::Analyzed);
        assert_eq!(p.current_step(), 2);
        assert!(registry.is_active("espresso"));

        let titles = p.execute_step2().await.unwrap();
        assert_eq!(titles[0].title, "エスプレッソマシンの選び方");

        let options = GenerationOptions {
            selected_title: Some(titles[0].title.clone()),
            ..target(1000)
        };
        let outline = p.execute_step3(&keywords(), &options).await.unwrap();
        assert_eq!(outline.title, "エスプレッソマシンの選び方");
        assert_eq!(outline.sections.len(), 3);

        let mut progress = Vec::new();
        let article = p
            .execute_step4(&options, |s| progress.push(s.percent))
            .await
            .unwrap();

        assert_eq!(progress.first(), Some(&0));
        assert_eq!(progress.last(), Some(&100));
        assert_eq!(p.state(), PipelineState::Assembled);
        assert!((900..=1100).contains(&article.word_count));
        assert!(!p.holds_lease());
        assert!(!registry.is_active("espresso"));

        let steps: Vec<u8> = p.step_results().iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_sections_at_upper_edge_keep_article_in_window() {
        use crate::services::length::{measure, ToleranceWindow};
        use crate::services::section_service::body_target;

        // 每个章节的正文都写到自己窗口的上限
        let upper = |section: OutlineSection| {
            ToleranceWindow::for_target(body_target(&section.with_estimate(333))).upper
        };
        let lead = upper(OutlineSection::lead("導入", ""));
        let choose = upper(OutlineSection::new("選び方", 2, ""));
        let care = upper(OutlineSection::new("手入れ", 2, ""));
        let provider = Arc::new(
            ScriptedProvider::new(japanese_paragraph(50))
                .on("構成案を作成してください", OUTLINE_REPLY)
                .on("【執筆する見出し】導入", japanese_paragraph(lead))
                .on("【執筆する見出し】選び方", japanese_paragraph(choose))
                .on("【執筆する見出し】手入れ", japanese_paragraph(care)),
        );
        let mut p = pipeline(provider.clone(), &SessionRegistry::new());

        p.execute_step1(&keywords()).await.unwrap();
        p.execute_step3(&keywords(), &target(1000)).await.unwrap();
        let article = p.execute_step4(&target(1000), |_| {}).await.unwrap();

        // 没有触发补充或截断
        assert!(provider.prompts().iter().all(|prompt| !prompt.contains("不足しています")));
        let outline = p.outline().unwrap();
        assert_eq!(measure(outline.sections[0].content.as_deref().unwrap()), lead);
        assert!(
            (900..=1100).contains(&article.word_count),
            "article length {} outside [900,1100]",
            article.word_count
        );
    }

    #[tokio::test]
    async fn test_step1_is_idempotent_and_falls_back_on_trend_failure() {
        let mut trend = MockTrendSource::new();
        trend.expect_analyze().times(1).returning(|_, _, _| {
            Err(TrendError::BadStatus {
                endpoint: "http://localhost/trends".to_string(),
                status: 500,
            })
        });
        let registry = SessionRegistry::new();
        let mut p = pipeline(scripted(), &registry).with_trend_source(Arc::new(trend));

        let first = p.execute_step1(&keywords()).await.unwrap();
        assert_eq!(first.keyword, "エスプレッソマシン");
        assert!(!first.related_keywords.is_empty());

        let second = p.execute_step1(&["別のキーワード".to_string()]).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(p.step_results().len(), 1);
    }

    #[tokio::test]
    async fn test_step2_replaces_previous_result() {
        let registry = SessionRegistry::new();
        let mut p = pipeline(scripted(), &registry);
        p.execute_step1(&keywords()).await.unwrap();
        p.execute_step2().await.unwrap();
        p.execute_step2().await.unwrap();
        p.execute_step3(&keywords(), &target(1000)).await.unwrap();
        p.execute_step3(&keywords(), &target(1000)).await.unwrap();

        let steps: Vec<u8> = p.step_results().iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_step2_requires_trend_data() {
        let registry = SessionRegistry::new();
        let mut p = pipeline(scripted(), &registry);

        let err = p.execute_step2().await.unwrap_err();
        assert!(matches!(err, AppError::Pipeline(PipelineError::MissingTrendData)));
        assert_eq!(p.state(), PipelineState::Idle);
        assert!(p.error().is_some());
        assert_eq!(p.step_results()[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_step3_requires_keywords_or_title() {
        let registry = SessionRegistry::new();
        let mut p = pipeline(scripted(), &registry);
        let err = p.execute_step3(&[], &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Pipeline(PipelineError::MissingKeywordsOrTitle)));

        let options = GenerationOptions {
            selected_title: Some("エスプレッソの基本".to_string()),
            ..target(1000)
        };
        let outline = p.execute_step3(&[], &options).await.unwrap();
        assert_eq!(outline.title, "エスプレッソの基本");
        assert!(p.error().is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_leaves_prior_data_and_step_is_retryable() {
        let outline_calls = Arc::new(AtomicUsize::new(0));
        let calls = outline_calls.clone();
        let mut provider = MockCompletionProvider::new();
        provider.expect_model().returning(|| "mock".to_string());
        provider.expect_complete().returning(move |request| {
            if !request.prompt.contains("構成案を作成してください") {
                // 标题回复无法解析，走模板标题
                return Ok(String::new());
            }
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderError::RateLimited {
                    model: "mock".to_string(),
                    retry_after: None,
                })
            } else {
                Ok(OUTLINE_REPLY.to_string())
            }
        });

        let registry = SessionRegistry::new();
        let mut p = pipeline(Arc::new(provider), &registry);
        p.execute_step1(&keywords()).await.unwrap();
        let titles = p.execute_step2().await.unwrap();
        assert_eq!(titles[0].id, "fallback-1");

        let err = p.execute_step3(&keywords(), &target(1000)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(p.error(), Some("请求频率受限 (模型: mock)，请稍后重试"));
        assert!(!p.is_generating());
        assert_eq!(p.state(), PipelineState::TitlesReady);
        assert_eq!(p.title_suggestions().len(), 5);
        assert!(p.trend_data().is_some());
        assert!(p.outline().is_none());
        let last = p.step_results().last().unwrap();
        assert_eq!((last.step, last.status), (3, StepStatus::Failed));

        p.execute_step3(&keywords(), &target(1000)).await.unwrap();
        assert!(p.error().is_none());
        assert_eq!(p.state(), PipelineState::OutlineReady);
        let step3: Vec<_> = p.step_results().iter().filter(|r| r.step == 3).collect();
        assert_eq!(step3.len(), 1);
        assert_eq!(step3[0].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_session_is_rejected() {
        let registry = SessionRegistry::new();
        let mut first = pipeline(scripted(), &registry);
        let mut second = pipeline(scripted(), &registry);

        first.execute_step1(&keywords()).await.unwrap();
        let err = second.execute_step1(&keywords()).await.unwrap_err();
        assert!(matches!(err, AppError::Pipeline(PipelineError::SessionBusy { .. })));
        assert_eq!(second.state(), PipelineState::Idle);

        drop(first);
        assert!(second.execute_step1(&keywords()).await.is_ok());
    }

    #[test]
    fn test_step4_requires_outline() {
        let registry = SessionRegistry::new();
        let mut p = pipeline(scripted(), &registry);
        let result = tokio_test::block_on(p.execute_step4(&GenerationOptions::default(), |_| {}));
        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(AppError::Pipeline(PipelineError::EmptyOutline))));
        assert!(!p.holds_lease());
    }

    #[tokio::test]
    async fn test_outline_edits_are_validated() {
        let registry = SessionRegistry::new();
        let mut p = pipeline(scripted(), &registry);
        p.execute_step1(&keywords()).await.unwrap();
        p.execute_step3(&keywords(), &target(1000)).await.unwrap();

        let err = p.edit_outline(|o| o.move_section(0, 2)).unwrap_err();
        assert_eq!(err, PipelineError::LeadPlacement);

        p.edit_outline(|o| o.add_section(OutlineSection::new("豆の保存方法", 3, "鮮度"), None))
            .unwrap();
        let outline = p.outline().unwrap();
        assert_eq!(outline.sections.len(), 4);
        assert_eq!(outline.sections[3].order, 3);
        assert_eq!(outline.sections[3].estimated_word_count, 333);
    }

    #[tokio::test]
    async fn test_keyword_preferences_only_affect_later_steps() {
        let provider = scripted();
        let registry = SessionRegistry::new();
        let mut p = pipeline(provider.clone(), &registry);
        p.execute_step1(&keywords()).await.unwrap();
        p.execute_step3(&keywords(), &target(1000)).await.unwrap();
        let before = p.outline().unwrap().keyword_preferences.clone();

        p.add_keyword("激安");
        assert_eq!(p.toggle_keyword_preference("激安"), KeywordPreference::Ng);
        assert!(p.outline().unwrap().keyword_preferences == before);

        p.execute_step3(&keywords(), &target(1000)).await.unwrap();
        assert_eq!(p.outline().unwrap().keyword_preferences.ng(), vec!["激安"]);
        assert!(provider
            .prompts()
            .last()
            .unwrap()
            .contains("見出しにも説明にも絶対に使わない: 激安"));
    }

    #[test]
    fn test_step_navigation_is_bounded() {
        let registry = SessionRegistry::new();
        let mut p = pipeline(scripted(), &registry);
        assert_eq!(p.previous_step(), 1);
        for _ in 0..5 {
            p.next_step();
        }
        assert_eq!(p.current_step(), 4);
        assert_eq!(p.previous_step(), 3);
    }
}
