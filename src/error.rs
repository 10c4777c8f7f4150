//! 统一错误处理
//!
//! 每个阶段（配置、凭据、构建、部署）都有自己的错误类型，
//! 外部进程的失败在阶段内部被分类，不会以原始错误的形式越过阶段边界。

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::pipeline::Stage;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件不存在
    #[error("Configuration file not found: {}", .path.display())]
    FileMissing { path: PathBuf },

    /// JSON 无法解析
    #[error("Invalid JSON in configuration file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// 必填字段缺失或为空
    #[error("{field} is required in {}", file_name(.path))]
    Validation { path: PathBuf, field: &'static str },
}

impl ConfigError {
    /// 创建必填字段错误
    pub fn validation(path: impl Into<PathBuf>, field: &'static str) -> Self {
        Self::Validation {
            path: path.into(),
            field,
        }
    }
}

/// 凭据校验错误
#[derive(Debug, Error)]
pub enum CredentialError {
    /// 校验脚本无法启动
    #[error("Credential check could not run: {0}")]
    ProcessFailure(String),

    /// 服务器拒绝了凭据
    #[error("Credential validation failed: {0}")]
    InvalidCredentials(String),
}

/// 构建错误
#[derive(Debug, Error)]
pub enum BuildError {
    /// 构建工具返回非零退出码
    #[error("Build failed with exit code {code}")]
    ExitCode { code: i32, diagnostics: String },

    /// 工具报告成功，但产物目录不存在
    #[error("Build output not found at {}", .path.display())]
    ArtifactMissing { path: PathBuf },

    /// 项目没有声明所请求的构建配置
    #[error("Configuration '{requested}' is not declared by the project (available: {})", .available.join(", "))]
    ConfigurationNotFound {
        requested: String,
        available: Vec<String>,
    },

    /// 意外错误
    #[error("Build error: {message}")]
    Unexpected { message: String, detail: String },
}

impl BuildError {
    /// 创建意外错误，保留技术细节用于诊断
    pub fn unexpected(message: impl Into<String>, detail: impl std::fmt::Debug) -> Self {
        Self::Unexpected {
            message: message.into(),
            detail: format!("{:?}", detail),
        }
    }

    /// 失败时工具输出的诊断文本
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            BuildError::ExitCode { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics)
            }
            BuildError::Unexpected { detail, .. } => Some(detail),
            _ => None,
        }
    }
}

/// 部署错误
#[derive(Debug, Error)]
pub enum DeployError {
    /// 部署脚本无法启动或读取失败
    #[error("Deployment process failed: {0}")]
    ProcessFailure(String),

    /// 脚本报告失败（非零退出码或 stderr 输出）
    #[error("Deployment failed: {errors}")]
    NonZeroExit { code: Option<i32>, errors: String },
}

/// 流水线错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 操作员取消了凭据输入
    #[error("Deployment cancelled by operator")]
    Cancelled,

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

impl PipelineError {
    /// 失败所在的阶段
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config(_) => Stage::Config,
            PipelineError::Cancelled => Stage::Credentials,
            PipelineError::Build(_) => Stage::Build,
            PipelineError::Deploy(_) => Stage::Deploy,
        }
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field_and_file() {
        let err = ConfigError::validation("/proj/deploy.prod.config.json", "poolName");
        assert_eq!(err.to_string(), "poolName is required in deploy.prod.config.json");
    }

    #[test]
    fn test_pipeline_error_stage() {
        assert_eq!(PipelineError::Cancelled.stage(), Stage::Credentials);
        let err: PipelineError = BuildError::ArtifactMissing {
            path: PathBuf::from("/out"),
        }
        .into();
        assert_eq!(err.stage(), Stage::Build);
    }

    #[test]
    fn test_unexpected_keeps_detail() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = BuildError::unexpected("could not read project", &io);
        assert_eq!(err.to_string(), "Build error: could not read project");
        assert!(err.diagnostics().unwrap().contains("PermissionDenied"));
    }
}
