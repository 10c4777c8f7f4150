//! IIS Deploy - .NET 项目到 IIS 的部署工具
//!
//! 流水线：解析部署配置 → 校验凭据 → 构建/发布 → 运行部署脚本（实时输出）

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

pub use config::{DeployConfiguration, ToolConfig};
pub use error::PipelineError;
pub use services::{DeployHandle, DeployOutcome, Pipeline, PipelineRequest};
