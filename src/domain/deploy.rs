//! 部署相关领域模型

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use super::credentials::Credentials;

/// 失败诊断转发到输出流时使用的前缀
pub const ERROR_PREFIX: &str = "ERROR: ";
/// 进程启动或读取异常转发到输出流时使用的前缀
pub const EXCEPTION_PREFIX: &str = "EXCEPTION: ";

/// 日志行
#[derive(Clone, Debug, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: String, // stdout | error
    pub content: String,
}

impl LogLine {
    /// 创建新日志行
    pub fn new(stream: &str, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: stream.to_string(),
            content: content.into(),
        }
    }

    /// 创建 stdout 日志行
    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new("stdout", content)
    }

    /// 根据前缀区分脚本输出与转发的诊断信息
    pub fn classify(content: &str) -> Self {
        if content.starts_with(ERROR_PREFIX) || content.starts_with(EXCEPTION_PREFIX) {
            Self::new("error", content)
        } else {
            Self::stdout(content)
        }
    }

    /// 是否为错误行
    pub fn is_error(&self) -> bool {
        self.stream == "error"
    }
}

/// 一次外部进程调用的结果
///
/// 通过 [`ExecutionResultBuilder`] 在执行过程中累积，结束后冻结，不再可变。
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionResult {
    success: bool,
    output: Vec<String>,
    errors: String,
    exit_code: Option<i32>,
    faulted: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.success
    }

    /// 按顺序捕获的 stdout 行
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// 汇总的诊断文本
    pub fn errors(&self) -> &str {
        &self.errors
    }

    /// 进程退出码；进程未能运行到退出时为 None
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// 进程是否真正运行并退出
    pub fn process_ran(&self) -> bool {
        self.exit_code.is_some()
    }

    /// 是否发生了启动或读取异常
    pub fn faulted(&self) -> bool {
        self.faulted
    }
}

/// [`ExecutionResult`] 的累积器
#[derive(Debug, Default)]
pub struct ExecutionResultBuilder {
    output: Vec<String>,
    errors: String,
    exit_code: Option<i32>,
    faulted: bool,
}

impl ExecutionResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一行 stdout
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    /// 追加 stderr 文本；只含空白的文本不算诊断
    pub fn push_errors(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.errors.push_str(text);
    }

    /// 记录进程退出码
    pub fn exit_code(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    /// 记录启动/读取异常，结果必定为失败
    pub fn fault(&mut self, message: impl std::fmt::Display) {
        self.faulted = true;
        if !self.errors.is_empty() && !self.errors.ends_with('\n') {
            self.errors.push('\n');
        }
        self.errors.push_str(&message.to_string());
    }

    /// 冻结结果
    ///
    /// 成功条件：无异常、stderr 为空且退出码为 0。stderr 为空但退出码非零时
    /// 合成 `Exit code: <n>` 作为诊断文本。
    pub fn finish(mut self) -> ExecutionResult {
        let success = !self.faulted && self.errors.is_empty() && self.exit_code == Some(0);

        if !success && self.errors.is_empty() {
            match self.exit_code {
                Some(code) => self.errors = format!("Exit code: {}", code),
                None => self.errors = "Process did not report an exit code".to_string(),
            }
        }

        ExecutionResult {
            success,
            output: self.output,
            errors: self.errors,
            exit_code: self.exit_code,
            faulted: self.faulted,
        }
    }
}

/// 部署脚本的完整参数集
#[derive(Debug)]
pub struct DeployRequest {
    pub server: String,
    /// 凭据在编码为进程参数后立即释放
    pub credentials: Credentials,
    pub pool_name: String,
    pub app_folder: String,
    /// 构建产物目录
    pub artifact_path: PathBuf,
    pub backup_folder: String,
    pub exclude_from_cleanup: Vec<String>,
    pub exclude_from_copy: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_exit_is_success() {
        let mut builder = ExecutionResultBuilder::new();
        builder.push_line("Backing up...");
        builder.push_line("Copying...");
        builder.exit_code(0);
        let result = builder.finish();

        assert!(result.success());
        assert_eq!(result.output(), ["Backing up...", "Copying..."]);
        assert_eq!(result.errors(), "");
    }

    #[test]
    fn test_stderr_fails_despite_zero_exit() {
        let mut builder = ExecutionResultBuilder::new();
        builder.push_errors("Access denied\n");
        builder.exit_code(0);
        let result = builder.finish();

        assert!(!result.success());
        assert_eq!(result.errors(), "Access denied\n");
    }

    #[test]
    fn test_whitespace_stderr_is_ignored() {
        let mut builder = ExecutionResultBuilder::new();
        builder.push_errors("  \r\n");
        builder.exit_code(0);
        assert!(builder.finish().success());
    }

    #[test]
    fn test_nonzero_exit_synthesizes_message() {
        let mut builder = ExecutionResultBuilder::new();
        builder.exit_code(3);
        let result = builder.finish();

        assert!(!result.success());
        assert_eq!(result.errors(), "Exit code: 3");
        assert_eq!(result.exit_code(), Some(3));
    }

    #[test]
    fn test_fault_without_exit() {
        let mut builder = ExecutionResultBuilder::new();
        builder.fault("No such file or directory");
        let result = builder.finish();

        assert!(!result.success());
        assert!(!result.process_ran());
        assert!(result.faulted());
        assert_eq!(result.errors(), "No such file or directory");
    }

    #[test]
    fn test_log_line_classify() {
        assert!(LogLine::classify("ERROR: boom").is_error());
        assert!(LogLine::classify("EXCEPTION: gone").is_error());
        assert!(!LogLine::classify("Copying files").is_error());
    }
}
