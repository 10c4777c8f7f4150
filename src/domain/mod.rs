//! 领域模型模块
//!
//! 纯数据结构，不依赖 tokio

pub mod credentials;
pub mod deploy;
pub mod pipeline;
pub mod project;

// Re-exports for convenience
pub use credentials::{Credentials, EncodedSecret, Secret};
pub use deploy::{DeployRequest, ExecutionResult, ExecutionResultBuilder, LogLine};
pub use pipeline::{PipelineState, Stage, StageRecord, StageStatus};
pub use project::{BuildArtifact, BuildStyle, ProjectConfiguration, ProjectDescriptor};
