pub mod pipeline;
pub mod session;

pub use pipeline::{ArticlePipeline, PipelineState};
pub use session::{SessionLease, SessionRegistry};
