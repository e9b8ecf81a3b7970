pub mod llm_client;
pub mod trend_client;

pub use llm_client::{max_tokens_for_chars, CompletionProvider, CompletionRequest, OpenAiProvider};
pub use trend_client::{HeuristicTrendSource, HttpTrendSource, TrendSource};
