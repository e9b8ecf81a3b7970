pub mod article;
pub mod job;
pub mod keyword;
pub mod loaders;
pub mod options;
pub mod outline;
pub mod step;
pub mod title;
pub mod trend;

pub use article::{Article, ArticleStatus};
pub use job::GenerationJob;
pub use keyword::{KeywordPreference, KeywordPreferences};
pub use loaders::{load_all_jobs, load_job};
pub use options::{ArticleLength, GenerationOptions};
pub use outline::{ArticleOutline, OutlineSection};
pub use step::{StepData, StepResult, StepStatus};
pub use title::TitleSuggestion;
pub use trend::{Competition, CompetitorAnalysis, CompetitorArticle, TrendAnalysisResult};
