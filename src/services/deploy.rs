//! 部署执行
//!
//! 用完整参数运行一次部署脚本。stdout 的进度行实时转发，stderr 在进程退出后检查。

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::config::{ExclusionList, ScriptHost};
use crate::domain::deploy::{ERROR_PREFIX, EXCEPTION_PREFIX};
use crate::domain::{DeployRequest, ExecutionResult, ExecutionResultBuilder};
use crate::error::DeployError;
use crate::infra::command::{exit_code, CommandError, CommandRunner};

/// 执行部署，进度逐行交给 `on_line`
#[async_trait]
pub trait ExecuteDeploy: Send + Sync {
    async fn deploy(
        &self,
        request: DeployRequest,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> ExecutionResult;
}

/// 基于外部脚本的部署执行器
pub struct ScriptDeployExecutor {
    host: ScriptHost,
}

impl ScriptDeployExecutor {
    pub fn new(host: ScriptHost) -> Self {
        Self { host }
    }

    /// 生成程序名和参数，消耗请求
    ///
    /// 返回时凭据已被释放，只有参数列表中的编码副本保留到进程启动。
    fn command_line(&self, request: DeployRequest) -> (String, Zeroizing<Vec<String>>) {
        let DeployRequest {
            server,
            credentials,
            pool_name,
            app_folder,
            artifact_path,
            backup_folder,
            exclude_from_cleanup,
            exclude_from_copy,
        } = request;

        let (program, mut args) = self.host.command_line();

        args.extend([
            "-Server".to_string(),
            server,
            "-Username".to_string(),
            credentials.username.clone(),
        ]);
        // 空密码不传参数，由脚本按无密码处理
        if !credentials.secret.is_empty() {
            let encoded = credentials.secret.to_base64();
            args.extend(["-PasswordBase64".to_string(), encoded.as_str().to_string()]);
        }
        args.extend([
            "-AppPoolName".to_string(),
            pool_name,
            "-AppFolderLocation".to_string(),
            app_folder,
            "-NewFilesPath".to_string(),
            artifact_path.to_string_lossy().into_owned(),
            "-BackupFolder".to_string(),
            backup_folder,
        ]);

        if let Some(list) = ExclusionList::new(exclude_from_cleanup).to_argument() {
            args.extend(["-ExcludeFromCleanup".to_string(), list]);
        }
        if let Some(list) = ExclusionList::new(exclude_from_copy).to_argument() {
            args.extend(["-ExcludeFromCopy".to_string(), list]);
        }

        (program, Zeroizing::new(args))
    }
}

#[async_trait]
impl ExecuteDeploy for ScriptDeployExecutor {
    async fn deploy(
        &self,
        request: DeployRequest,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> ExecutionResult {
        let server = request.server.clone();
        let (program, args) = self.command_line(request);
        let mut result = ExecutionResultBuilder::new();

        tracing::info!(server = %server, script = %self.host.script.display(), "Starting deploy script");

        let outcome = {
            let mut sink = |line: &str| {
                result.push_line(line);
                on_line(line);
            };
            CommandRunner::run_streaming(&program, &args, None, &mut sink).await
        };
        drop(args);

        match outcome {
            Ok(output) => {
                result.push_errors(&output.stderr);
                if let Some(status) = output.status {
                    result.exit_code(exit_code(&status));
                }
                if let Some(e) = output.read_error {
                    result.fault(CommandError::ReadFailed(e));
                }
            }
            Err(e) => {
                tracing::error!(server = %server, error = %e, "Failed to run deploy script");
                result.fault(e);
            }
        }

        let result = result.finish();
        if !result.success() {
            let prefix = if result.faulted() {
                EXCEPTION_PREFIX
            } else {
                ERROR_PREFIX
            };
            on_line(&format!("{}{}", prefix, result.errors().trim_end()));
        }

        tracing::info!(
            server = %server,
            success = result.success(),
            exit_code = ?result.exit_code(),
            lines = result.output().len(),
            "Deploy script finished"
        );
        result
    }
}

/// 对部署结果分类
pub fn into_outcome(result: ExecutionResult) -> Result<ExecutionResult, DeployError> {
    if result.success() {
        return Ok(result);
    }

    let errors = result.errors().trim_end().to_string();
    if result.faulted() || !result.process_ran() {
        Err(DeployError::ProcessFailure(errors))
    } else {
        Err(DeployError::NonZeroExit {
            code: result.exit_code(),
            errors,
        })
    }
}
