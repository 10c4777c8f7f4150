//! 配置模块
//!
//! 项目部署配置与环境变量解析

pub mod deploy;
pub mod env;

pub use deploy::{resolve, ConfigFallback, DeployConfiguration, ExclusionList, ResolvedConfig};
pub use env::{ScriptHost, ToolConfig};
