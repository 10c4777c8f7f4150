//! 环境变量配置加载
//!
//! 外部工具（脚本解释器、dotnet、msbuild）和部署脚本的位置

use std::env;
use std::path::{Path, PathBuf};

use crate::config::env::constants::{
    DEFAULT_DOTNET, DEFAULT_MSBUILD, DEPLOY_SCRIPT, SCRIPTS_DIR_NAME, VALIDATION_SCRIPT,
};

/// 脚本宿主
///
/// 解释器 + 参数 + 脚本路径；解释器为空时直接执行脚本。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptHost {
    pub interpreter: Option<String>,
    pub interpreter_args: Vec<String>,
    pub script: PathBuf,
}

impl ScriptHost {
    /// 使用 PowerShell 运行脚本
    pub fn powershell(program: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: Some(program.into()),
            interpreter_args: ["-ExecutionPolicy", "Bypass", "-File"]
                .into_iter()
                .map(String::from)
                .collect(),
            script: script.into(),
        }
    }

    /// 直接执行脚本（脚本本身可执行）
    pub fn direct(script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: None,
            interpreter_args: Vec::new(),
            script: script.into(),
        }
    }

    /// 根据解释器设置创建；空字符串表示直接执行
    pub fn with_shell(shell: &str, script: impl Into<PathBuf>) -> Self {
        if shell.trim().is_empty() {
            Self::direct(script)
        } else {
            Self::powershell(shell.trim(), script)
        }
    }

    /// 程序名与前置参数（脚本参数由调用方追加）
    pub fn command_line(&self) -> (String, Vec<String>) {
        let script = self.script.to_string_lossy().into_owned();
        match &self.interpreter {
            Some(program) => {
                let mut args = self.interpreter_args.clone();
                args.push(script);
                (program.clone(), args)
            }
            None => (script, Vec::new()),
        }
    }

    pub fn exists(&self) -> bool {
        self.script.is_file()
    }
}

/// 工具配置
#[derive(Clone, Debug)]
pub struct ToolConfig {
    /// 部署脚本所在目录
    pub scripts_dir: PathBuf,
    /// 脚本解释器；空字符串表示直接执行脚本
    pub shell: String,
    /// dotnet CLI
    pub dotnet: String,
    /// MSBuild
    pub msbuild: String,
}

impl ToolConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let scripts_dir = env::var("IIS_DEPLOY_SCRIPTS_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_scripts_dir);

        // 空值有意义（直接执行脚本），所以不过滤空字符串
        let shell = env::var("IIS_DEPLOY_SHELL").unwrap_or_else(|_| default_shell().to_string());

        let dotnet = load_non_empty("IIS_DEPLOY_DOTNET").unwrap_or_else(|| DEFAULT_DOTNET.to_string());
        let msbuild =
            load_non_empty("IIS_DEPLOY_MSBUILD").unwrap_or_else(|| DEFAULT_MSBUILD.to_string());

        Self {
            scripts_dir,
            shell,
            dotnet,
            msbuild,
        }
    }

    /// 凭据校验脚本
    pub fn validation_script(&self) -> ScriptHost {
        ScriptHost::with_shell(&self.shell, self.scripts_dir.join(VALIDATION_SCRIPT))
    }

    /// 部署脚本
    pub fn deploy_script(&self) -> ScriptHost {
        ScriptHost::with_shell(&self.shell, self.scripts_dir.join(DEPLOY_SCRIPT))
    }
}

/// 默认脚本目录：可执行文件旁边的 Scripts 目录
fn default_scripts_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SCRIPTS_DIR_NAME)
}

fn default_shell() -> &'static str {
    if cfg!(windows) {
        "powershell.exe"
    } else {
        "pwsh"
    }
}

/// 加载非空环境变量
fn load_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// 常量
pub mod constants {
    /// 基础配置文件名
    pub const BASE_CONFIG_FILE: &str = "deploy.config.json";

    /// 未指定时的构建配置
    pub const DEFAULT_BUILD_CONFIGURATION: &str = "Release";

    /// 脚本目录名
    pub const SCRIPTS_DIR_NAME: &str = "Scripts";

    /// 凭据校验脚本
    pub const VALIDATION_SCRIPT: &str = "test-credentials.ps1";

    /// 部署脚本
    pub const DEPLOY_SCRIPT: &str = "deploy-template.ps1";

    pub const DEFAULT_DOTNET: &str = "dotnet";

    pub const DEFAULT_MSBUILD: &str = "msbuild";

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powershell_command_line() {
        let host = ScriptHost::powershell("powershell.exe", "/scripts/deploy-template.ps1");
        let (program, args) = host.command_line();
        assert_eq!(program, "powershell.exe");
        assert_eq!(
            args,
            ["-ExecutionPolicy", "Bypass", "-File", "/scripts/deploy-template.ps1"]
        );
    }

    #[test]
    fn test_empty_shell_runs_directly() {
        let host = ScriptHost::with_shell("  ", "/scripts/check.sh");
        let (program, args) = host.command_line();
        assert_eq!(program, "/scripts/check.sh");
        assert!(args.is_empty());
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("IIS_DEPLOY_SCRIPTS_DIR", "/opt/iis-deploy/scripts");
        env::set_var("IIS_DEPLOY_SHELL", "");
        env::set_var("IIS_DEPLOY_DOTNET", "/usr/share/dotnet/dotnet");

        let config = ToolConfig::from_env();
        assert_eq!(config.scripts_dir, PathBuf::from("/opt/iis-deploy/scripts"));
        assert_eq!(config.shell, "");
        assert_eq!(config.dotnet, "/usr/share/dotnet/dotnet");
        assert_eq!(
            config.deploy_script(),
            ScriptHost::direct("/opt/iis-deploy/scripts/deploy-template.ps1")
        );

        env::remove_var("IIS_DEPLOY_SCRIPTS_DIR");
        env::remove_var("IIS_DEPLOY_SHELL");
        env::remove_var("IIS_DEPLOY_DOTNET");
    }
}
