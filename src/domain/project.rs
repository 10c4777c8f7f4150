//! 项目文件相关领域模型

use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// 旧式 Web 应用项目的 ProjectTypeGuid
const WEB_APPLICATION_GUID: &str = "349c5851-65df-11da-9384-00065b846f21";

static OUTPUT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<OutputType>\s*([^<\s]+)\s*</OutputType>").unwrap());
static TARGET_FRAMEWORK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<TargetFramework>([^<]+)</TargetFramework>").unwrap());
static TARGET_FRAMEWORKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<TargetFrameworks>([^<]+)</TargetFrameworks>").unwrap());
static PROPERTY_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<PropertyGroup\s+Condition\s*=\s*"([^"]*)"\s*>(.*?)</PropertyGroup>"#)
        .unwrap()
});
static CONDITION_CONFIGURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"==\s*'([^'|]+)(?:\|[^']*)?'").unwrap());
static OUTPUT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<OutputPath>([^<]+)</OutputPath>").unwrap());

/// 构建方式
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildStyle {
    /// SDK 风格项目，使用 `dotnet publish`
    Sdk,
    /// 旧式项目，使用 MSBuild 按解决方案配置构建
    Legacy,
}

impl BuildStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStyle::Sdk => "sdk",
            BuildStyle::Legacy => "legacy",
        }
    }
}

/// 项目声明的构建配置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectConfiguration {
    pub name: String,
    /// 项目文件中的原始 OutputPath
    pub output_path: Option<String>,
}

/// 项目文件描述
///
/// 在流水线开始时读取一次，构建方式随之确定，之后不再重新检测。
#[derive(Clone, Debug)]
pub struct ProjectDescriptor {
    pub project_file: PathBuf,
    pub project_dir: PathBuf,
    pub style: BuildStyle,
    pub target_framework: Option<String>,
    pub output_type: Option<String>,
    pub is_web: bool,
    /// 旧式项目按声明顺序列出的配置
    pub configurations: Vec<ProjectConfiguration>,
}

impl ProjectDescriptor {
    /// 读取并解析项目文件
    pub fn load(project_file: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(project_file)?;
        let project_dir = project_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::parse(project_file.to_path_buf(), project_dir, &content))
    }

    /// 从项目文件内容解析
    pub fn parse(project_file: PathBuf, project_dir: PathBuf, content: &str) -> Self {
        let style = if content.contains("<Project Sdk=\"") || content.contains("Sdk=\"Microsoft.NET.Sdk")
        {
            BuildStyle::Sdk
        } else {
            BuildStyle::Legacy
        };

        let target_framework = TARGET_FRAMEWORK
            .captures(content)
            .map(|c| c[1].trim().to_string())
            .or_else(|| {
                TARGET_FRAMEWORKS.captures(content).and_then(|c| {
                    c[1].split(';')
                        .map(str::trim)
                        .find(|s| !s.is_empty())
                        .map(str::to_string)
                })
            });

        let output_type = OUTPUT_TYPE.captures(content).map(|c| c[1].to_string());

        let is_web = content.contains("Microsoft.NET.Sdk.Web")
            || content.to_ascii_lowercase().contains(WEB_APPLICATION_GUID);

        Self {
            project_file,
            project_dir,
            style,
            target_framework,
            output_type,
            is_web,
            configurations: parse_configurations(content),
        }
    }

    /// 项目是否可部署（可执行程序或 Web 应用）
    pub fn is_runnable(&self) -> bool {
        let executable = self
            .output_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case("Exe") || t.eq_ignore_ascii_case("WinExe"))
            .unwrap_or(false);
        executable || self.is_web
    }

    /// 大小写不敏感地查找配置，第一个匹配项胜出
    pub fn find_configuration(&self, name: &str) -> Option<&ProjectConfiguration> {
        self.configurations
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// 项目名称（文件名去掉扩展名）
    pub fn name(&self) -> String {
        self.project_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// 解析 `'$(Configuration)|$(Platform)' == 'Release|AnyCPU'` 形式的 PropertyGroup
fn parse_configurations(content: &str) -> Vec<ProjectConfiguration> {
    let mut configurations: Vec<ProjectConfiguration> = Vec::new();

    for group in PROPERTY_GROUP.captures_iter(content) {
        let condition = &group[1];
        if !condition.contains("$(Configuration)") {
            continue;
        }
        let Some(name) = CONDITION_CONFIGURATION
            .captures(condition)
            .map(|c| c[1].trim().to_string())
        else {
            continue;
        };
        let output_path = OUTPUT_PATH
            .captures(&group[2])
            .map(|c| c[1].trim().to_string());

        match configurations
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&name))
        {
            // 同一配置的多个平台：保留第一个声明的输出路径
            Some(existing) => {
                if existing.output_path.is_none() {
                    existing.output_path = output_path;
                }
            }
            None => configurations.push(ProjectConfiguration { name, output_path }),
        }
    }

    configurations
}

/// 构建产物
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct BuildArtifact {
    /// 产物目录（绝对路径）
    pub output_path: PathBuf,
}
