//! 业务能力层（Services）
//!
//! 每个服务只描述"我能做什么"：生成标题、生成大纲、生成一个章节、控制字数、组装文章。
//! 服务之间不互相调度，调度交给 `workflow::ArticlePipeline`。

pub mod article_writer;
pub mod assembler;
pub mod keyword_guard;
pub mod length;
pub mod outline_parser;
pub mod outline_service;
pub mod section_service;
pub mod title_service;

pub use article_writer::ArticleWriter;
pub use length::{measure, EnforceMode, EnforcedText, LengthAction, LengthEnforcer, ToleranceWindow};
pub use outline_service::{OutlineRequest, OutlineService};
pub use section_service::{SectionProgress, SectionService};
pub use title_service::{TitleRequest, TitleService};
