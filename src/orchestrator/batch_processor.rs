//! 批量任务处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量生成任务的调度和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：写日志文件头、创建 LLM 客户端
//! 2. **批量加载**：扫描并加载所有待处理的任务（`Vec<GenerationJob>`）
//! 3. **并发控制**：使用 Semaphore 限制并发数量
//! 4. **分批处理**：将任务分批次处理，每批完成后再开始下一批
//! 5. **全局统计**：汇总所有任务的处理结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单篇文章的细节
//! - **资源所有者**：唯一创建 LLM 客户端和会话登记表的模块
//! - **向下委托**：委托 job_processor 处理单个任务

use crate::clients::{CompletionProvider, OpenAiProvider};
use crate::config::Config;
use crate::models::GenerationJob;
use crate::orchestrator::job_processor;
use crate::utils::logging;
use crate::workflow::SessionRegistry;
use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    provider: Arc<dyn CompletionProvider>,
    registry: SessionRegistry,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let provider = Arc::new(OpenAiProvider::new(&config));
        Self::with_provider(config, provider)
    }

    /// 使用指定的 LLM 能力初始化
    pub fn with_provider(config: Config, provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(config.max_concurrent_sessions, &provider.model());

        Ok(Self {
            config,
            provider,
            registry: SessionRegistry::new(),
        })
    }

    /// 运行应用主逻辑，返回统计
    pub async fn run(&self) -> Result<ProcessingStats> {
        let all_jobs = self.load_jobs().await?;

        if all_jobs.is_empty() {
            warn!("⚠️ 没有找到待处理的任务文件，程序结束");
            return Ok(ProcessingStats::default());
        }

        logging::log_jobs_loaded(all_jobs.len(), self.config.max_concurrent_sessions);

        let stats = self.process_all_jobs(all_jobs).await?;

        logging::print_final_stats(
            stats.success,
            stats.failed,
            stats.total,
            &self.config.output_log_file,
        );

        Ok(stats)
    }

    /// 加载任务
    async fn load_jobs(&self) -> Result<Vec<GenerationJob>> {
        info!("\n📁 正在扫描待处理的任务...");
        Ok(crate::models::load_all_jobs(&self.config.jobs_folder).await?)
    }

    /// 处理所有任务
    async fn process_all_jobs(&self, all_jobs: Vec<GenerationJob>) -> Result<ProcessingStats> {
        let batch_size = self.config.max_concurrent_sessions.max(1);
        let semaphore = Arc::new(Semaphore::new(batch_size));
        let total_jobs = all_jobs.len();
        let total_batches = total_jobs.div_ceil(batch_size);
        let mut stats = ProcessingStats {
            total: total_jobs,
            ..Default::default()
        };

        // 分批处理
        for (batch_idx, batch_jobs) in all_jobs.chunks(batch_size).enumerate() {
            let batch_start = batch_idx * batch_size;
            logging::log_batch_start(
                batch_idx + 1,
                total_batches,
                batch_start + 1,
                batch_start + batch_jobs.len(),
                total_jobs,
            );

            let batch_result = self
                .process_batch(batch_jobs, batch_start, semaphore.clone())
                .await?;

            stats.success += batch_result.success;
            stats.failed += batch_result.failed;

            logging::log_batch_complete(
                batch_idx + 1,
                batch_result.success,
                batch_result.success + batch_result.failed,
            );
        }

        Ok(stats)
    }

    /// 处理单个批次
    async fn process_batch(
        &self,
        batch_jobs: &[GenerationJob],
        batch_start: usize,
        semaphore: Arc<Semaphore>,
    ) -> Result<BatchResult> {
        let mut batch_handles = Vec::new();

        for (idx, job) in batch_jobs.iter().enumerate() {
            let job_index = batch_start + idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;

            let job = job.clone();
            let config = self.config.clone();
            let provider = self.provider.clone();
            let registry = self.registry.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                job_processor::process_job(job, job_index, &config, provider, registry)
                    .await
                    .map_err(|e| {
                        error!("[任务 {}] ❌ 处理过程中发生错误: {:#}", job_index, e);
                        e
                    })
            });
            batch_handles.push((job_index, handle));
        }

        // 等待本批所有任务完成
        let (indices, handles): (Vec<usize>, Vec<_>) = batch_handles.into_iter().unzip();
        let outcomes = join_all(handles).await;
        let mut result = BatchResult::default();

        for (job_index, outcome) in indices.into_iter().zip(outcomes) {
            match outcome {
                Ok(Ok(_)) => result.success += 1,
                Ok(Err(_)) => result.failed += 1,
                Err(e) => {
                    error!("[任务 {}] 任务执行失败: {}", job_index, e);
                    result.failed += 1;
                }
            }
        }

        Ok(result)
    }
}

/// 处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStats {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// 批次处理结果
#[derive(Debug, Default)]
struct BatchResult {
    success: usize,
    failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{japanese_paragraph, ScriptedProvider};

    fn write_job(dir: &std::path::Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn test_run_processes_every_job() {
        let root = tempfile::tempdir().unwrap();
        let jobs = root.path().join("jobs");
        std::fs::create_dir_all(&jobs).unwrap();
        write_job(&jobs, "a.toml", "keywords = [\"エスプレッソ\"]\ntarget_word_count = 900\n");
        write_job(&jobs, "b.toml", "keywords = [\"ラテアート\"]\ntarget_word_count = 900\n");
        write_job(&jobs, "broken.toml", "keywords = ");

        let config = Config {
            jobs_folder: jobs.display().to_string(),
            output_folder: root.path().join("out").display().to_string(),
            output_log_file: root.path().join("run.log").display().to_string(),
            max_concurrent_sessions: 1,
            ..Config::default()
        };
        let provider = Arc::new(ScriptedProvider::new(japanese_paragraph(300)));

        let app = App::with_provider(config, provider).unwrap();
        let stats = app.run().await.unwrap();

        assert_eq!(
            stats,
            ProcessingStats {
                success: 2,
                failed: 0,
                total: 2
            }
        );
        assert!(root.path().join("out/a.md").exists());
        assert!(root.path().join("out/b.md").exists());
        assert!(std::fs::read_to_string(root.path().join("run.log"))
            .unwrap()
            .contains("文章生成日志"));
    }

    #[tokio::test]
    async fn test_missing_jobs_folder_is_error() {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            jobs_folder: root.path().join("nope").display().to_string(),
            output_log_file: root.path().join("run.log").display().to_string(),
            ..Config::default()
        };
        let provider = Arc::new(ScriptedProvider::new(""));
        let app = App::with_provider(config, provider).unwrap();
        assert!(app.run().await.is_err());
    }
}
