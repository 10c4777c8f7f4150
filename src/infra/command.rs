//! 命令执行器
//!
//! 提供统一的命令执行接口，支持：
//! - 一次性捕获 stdout/stderr（凭据校验、构建）
//! - stdout 逐行流式输出，stderr 在退出后整体读取（部署）

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{error, warn};

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 读取输出失败
    ReadFailed(std::io::Error),
    /// 等待命令完成失败
    WaitFailed(std::io::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::ReadFailed(e) => write!(f, "Failed to read command output: {}", e),
            CommandError::WaitFailed(e) => write!(f, "Failed to wait for command: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e)
            | CommandError::ReadFailed(e)
            | CommandError::WaitFailed(e) => Some(e),
        }
    }
}

/// 捕获模式的执行结果
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// 流式模式的执行结果
#[derive(Debug)]
pub struct StreamedOutput {
    /// 退出状态；读取失败时仍会等待进程退出
    pub status: Option<ExitStatus>,
    /// 完整的 stderr 文本
    pub stderr: String,
    /// stdout 读取过程中遇到的错误
    pub read_error: Option<std::io::Error>,
}

/// 去掉行尾的 `\r?\n`，按 UTF-8 宽松解码
///
/// 脚本可能以控制台代码页输出，无效字节替换为 U+FFFD 而不是中断读取。
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// 退出码；被信号终止时为 -1
pub fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

impl CommandRunner {
    /// 执行命令并捕获全部输出
    ///
    /// # Arguments
    /// * `program` - 要执行的程序
    /// * `args` - 命令行参数
    /// * `work_dir` - 工作目录（None 表示继承当前目录）
    pub async fn run_captured(
        program: &str,
        args: &[String],
        work_dir: Option<&Path>,
    ) -> Result<CapturedOutput, CommandError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = work_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(CommandError::SpawnFailed)?;

        Ok(CapturedOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// 执行命令，stdout 逐行交给 `on_line`
    ///
    /// 每一行在读取下一行之前同步回调，顺序与进程输出顺序一致。
    /// stderr 在后台完整收集（避免管道写满阻塞进程），只在进程退出后返回。
    pub async fn run_streaming(
        program: &str,
        args: &[String],
        work_dir: Option<&Path>,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<StreamedOutput, CommandError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = work_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(CommandError::SpawnFailed)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // 启动 stderr 收集任务
        let stderr_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            if let Some(mut stderr) = stderr {
                if let Err(e) = stderr.read_to_end(&mut buffer).await {
                    warn!(error = %e, "Failed to read stderr");
                }
            }
            String::from_utf8_lossy(&buffer).into_owned()
        });

        let mut read_error = None;
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout);
            let mut buffer = Vec::new();
            loop {
                buffer.clear();
                match reader.read_until(b'\n', &mut buffer).await {
                    Ok(0) => break,
                    Ok(_) => on_line(&decode_line(&buffer)),
                    Err(e) => {
                        error!(program, error = %e, "Failed to read stdout");
                        read_error = Some(e);
                        // 管道不能在进程运行时关闭，否则脚本下一次写入会收到 SIGPIPE
                        if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                            warn!(program, error = %e, "Failed to drain stdout");
                        }
                        break;
                    }
                }
            }
        }

        // stdout 读取中断时进程可能仍在运行，继续等待其退出
        let status = child.wait().await;
        let stderr = stderr_task.await.unwrap_or_default();

        match status {
            Ok(status) => Ok(StreamedOutput {
                status: Some(status),
                stderr,
                read_error,
            }),
            Err(e) if read_error.is_some() => {
                warn!(program, error = %e, "Failed to wait for command after read error");
                Ok(StreamedOutput {
                    status: None,
                    stderr,
                    read_error,
                })
            }
            Err(e) => Err(CommandError::WaitFailed(e)),
        }
    }
}
