//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和任务调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量任务处理器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载任务（Vec<GenerationJob>）
//! - 控制并发数量（Semaphore）
//! - 持有 LLM 客户端和会话登记表
//! - 输出全局统计信息
//!
//! ### `job_processor` - 单个任务处理器
//! - 为任务创建 ArticlePipeline 会话
//! - 依次执行四个步骤并选定标题
//! - 写出文章文件
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<GenerationJob>)
//!     ↓
//! job_processor (处理单个 GenerationJob)
//!     ↓
//! workflow::ArticlePipeline (四步状态机)
//!     ↓
//! services (能力层：title / outline / section / length / assembler)
//!     ↓
//! clients (LLM、趋势数据)
//! ```

pub mod batch_processor;
pub mod job_processor;

// 重新导出主要类型
pub use batch_processor::{App, ProcessingStats};
pub use job_processor::{process_job, JobOutcome};
