//! 服务层模块
//!
//! 流水线各阶段的执行逻辑：凭据校验、构建、部署，以及串联它们的流水线

pub mod build;
pub mod credentials;
pub mod deploy;
pub mod pipeline;

pub use build::{BuildOrchestrator, BuildProject};
pub use credentials::{ScriptCredentialValidator, ValidateCredentials};
pub use deploy::{ExecuteDeploy, ScriptDeployExecutor};
pub use pipeline::{
    DeployHandle, DeployOutcome, Pipeline, PipelineEvent, PipelineReporter, PipelineRequest,
    PromptCredentials, TracingReporter,
};
