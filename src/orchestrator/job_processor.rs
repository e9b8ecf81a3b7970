//! 单个任务处理器 - 编排层
//!
//! ## 职责
//!
//! 无人值守地跑完一个生成任务：
//!
//! 1. **创建流程**：一个任务一个 `ArticlePipeline` 会话
//! 2. **顺序执行**：趋势 → 标题 → 大纲 → 章节 + 组装
//! 3. **选定标题**：任务指定的标题优先，否则取得分最高的候选
//! 4. **写入文件**：文章保存为 markdown

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::clients::CompletionProvider;
use crate::config::Config;
use crate::models::GenerationJob;
use crate::services::ArticleWriter;
use crate::workflow::{ArticlePipeline, SessionRegistry};

/// 任务结果
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub session_id: String,
    pub title: String,
    pub word_count: usize,
    pub output_path: PathBuf,
}

/// 处理单个生成任务
///
/// # 参数
/// - `job`: 任务数据
/// - `job_index`: 任务序号（仅用于日志）
/// - `config`: 配置
/// - `provider`: LLM 能力
/// - `registry`: 会话登记表（同名任务不会同时运行）
pub async fn process_job(
    job: GenerationJob,
    job_index: usize,
    config: &Config,
    provider: Arc<dyn CompletionProvider>,
    registry: SessionRegistry,
) -> Result<JobOutcome> {
    let session_id = job.session_id();
    log_job_start(job_index, &session_id, &job);

    let mut pipeline = ArticlePipeline::new(&session_id, config, provider, registry)
        .with_keyword_preferences(job.keyword_preferences());
    let mut options = job.options();

    // 没有关键词时用选定标题作为分析对象
    let keywords = if job.keywords.iter().any(|k| !k.trim().is_empty()) {
        job.keywords.clone()
    } else {
        options.selected_title().map(str::to_string).into_iter().collect()
    };

    pipeline
        .execute_step1(&keywords)
        .await
        .with_context(|| format!("[任务 {}] 趋势分析失败", job_index))?;

    pipeline
        .execute_step2()
        .await
        .with_context(|| format!("[任务 {}] 标题生成失败", job_index))?;

    if options.selected_title().is_none() {
        let best = pipeline
            .best_title()
            .map(|t| t.title.clone())
            .context("没有可用的标题候选")?;
        info!("[任务 {}] 🏷️ 自动选定标题: {}", job_index, best);
        options.selected_title = Some(best);
    }

    pipeline
        .execute_step3(&keywords, &options)
        .await
        .with_context(|| format!("[任务 {}] 大纲生成失败", job_index))?;

    let article = pipeline
        .execute_step4(&options, |progress| {
            info!(
                "[任务 {}] ⏳ 章节进度 {}/{} ({}%) {}",
                job_index, progress.index, progress.total, progress.percent, progress.title
            );
        })
        .await
        .with_context(|| format!("[任务 {}] 正文生成失败", job_index))?;

    let writer = ArticleWriter::new(&config.output_folder);
    let output_path = writer
        .write(&session_id, &article)
        .with_context(|| format!("[任务 {}] 写入文章失败", job_index))?;

    info!(
        "[任务 {}] ✅ 完成: 「{}」 {} 字 → {}",
        job_index,
        article.title,
        article.word_count,
        output_path.display()
    );

    Ok(JobOutcome {
        session_id,
        title: article.title,
        word_count: article.word_count,
        output_path,
    })
}

fn log_job_start(job_index: usize, session_id: &str, job: &GenerationJob) {
    info!("\n{}", "=".repeat(60));
    info!("[任务 {}] 📝 开始处理: {}", job_index, session_id);
    info!("[任务 {}] 关键词: {}", job_index, job.keywords.join("、"));
    if let Some(target) = job.target_word_count {
        info!("[任务 {}] 目标字数: {}", job_index, target);
    }
    info!("{}", "=".repeat(60));
}
