//! # Article Pipeline
//!
//! 一个分步调用 LLM 生成长篇 SEO 文章的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 持有外部连接，只暴露能力
//! - `CompletionProvider` - 补全能力（`OpenAiProvider` 基于 async-openai）
//! - `TrendSource` - 趋势数据（HTTP 接口 / 启发式数据）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务只做一件事
//! - `TitleService` / `OutlineService` / `SectionService` - 标题、大纲、章节生成
//! - `LengthEnforcer` - 字数计量与控制
//! - `assembler` / `keyword_guard` - 组装文章、关键词约束
//! - `ArticleWriter` - 写出 markdown 文件
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇文章"的完整生成流程
//! - `ArticlePipeline` - 四步状态机（趋势 → 标题 → 大纲 → 章节 + 组装）
//! - `SessionRegistry` - 同一会话同时只允许一个流程运行
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量任务处理器，管理资源和并发
//! - `orchestrator/job_processor` - 单个任务处理器，跑完四个步骤并写出文件
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
mod test_support;

// 重新导出常用类型
pub use clients::{CompletionProvider, CompletionRequest, OpenAiProvider, TrendSource};
pub use config::Config;
pub use error::{AppError, AppResult, PipelineError, ProviderError};
pub use models::{Article, ArticleOutline, GenerationJob, GenerationOptions, KeywordPreference};
pub use orchestrator::{process_job, App};
pub use services::SectionProgress;
pub use workflow::{ArticlePipeline, PipelineState, SessionRegistry};
