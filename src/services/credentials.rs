//! 凭据校验
//!
//! 针对目标服务器运行一次校验脚本。退出码为 0 且 stderr 为空即为通过。

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::config::ScriptHost;
use crate::domain::{ExecutionResult, ExecutionResultBuilder, Secret};
use crate::error::CredentialError;
use crate::infra::command::{exit_code, CommandRunner};

/// 脚本失败但没有给出原因时使用的消息
const UNKNOWN_FAILURE: &str = "Unknown authentication error occurred.";

/// 针对服务器校验操作员凭据
#[async_trait]
pub trait ValidateCredentials: Send + Sync {
    async fn validate(
        &self,
        server: &str,
        username: &str,
        secret: &Secret,
        target_path: &str,
    ) -> ExecutionResult;
}

/// 基于外部脚本的凭据校验器
pub struct ScriptCredentialValidator {
    host: ScriptHost,
}

impl ScriptCredentialValidator {
    pub fn new(host: ScriptHost) -> Self {
        Self { host }
    }

    /// 生成程序名和参数
    ///
    /// 密码在这里编码，编码后的副本随参数列表一起在 drop 时清零。
    fn command_line(
        &self,
        server: &str,
        username: &str,
        secret: &Secret,
        target_path: &str,
    ) -> (String, Zeroizing<Vec<String>>) {
        let (program, mut args) = self.host.command_line();

        if !server.is_empty() {
            args.extend(["-Server".to_string(), server.to_string()]);
        }
        if !username.is_empty() {
            args.extend(["-Username".to_string(), username.to_string()]);
        }
        if !secret.is_empty() {
            let encoded = secret.to_base64();
            args.extend(["-PasswordBase64".to_string(), encoded.as_str().to_string()]);
        }
        if !target_path.is_empty() {
            args.extend(["-TestPath".to_string(), target_path.to_string()]);
        }

        (program, Zeroizing::new(args))
    }
}

#[async_trait]
impl ValidateCredentials for ScriptCredentialValidator {
    async fn validate(
        &self,
        server: &str,
        username: &str,
        secret: &Secret,
        target_path: &str,
    ) -> ExecutionResult {
        let (program, args) = self.command_line(server, username, secret, target_path);
        let mut result = ExecutionResultBuilder::new();

        match CommandRunner::run_captured(&program, &args, None).await {
            Ok(output) => {
                for line in output.stdout.lines() {
                    result.push_line(line);
                }
                result.push_errors(&output.stderr);
                result.exit_code(exit_code(&output.status));
            }
            Err(e) => {
                tracing::error!(server, script = %self.host.script.display(), error = %e, "Failed to run credential check");
                result.fault(e);
            }
        }
        drop(args);

        let result = result.finish();
        tracing::debug!(
            server,
            username,
            success = result.success(),
            exit_code = ?result.exit_code(),
            "Credential check finished"
        );
        result
    }
}

/// 对校验结果分类
pub fn check(result: &ExecutionResult) -> Result<(), CredentialError> {
    if result.success() {
        return Ok(());
    }

    let message = result.errors().trim();
    let message = if message.is_empty() {
        UNKNOWN_FAILURE.to_string()
    } else {
        message.to_string()
    };

    if result.faulted() {
        Err(CredentialError::ProcessFailure(message))
    } else {
        Err(CredentialError::InvalidCredentials(message))
    }
}
