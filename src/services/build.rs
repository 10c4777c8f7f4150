//! 项目构建
//!
//! SDK 风格项目用 `dotnet publish` 发布到指定目录；
//! 旧式项目用 MSBuild 按项目声明的某个配置构建。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::env::constants::{DEFAULT_BUILD_CONFIGURATION, DEFAULT_DOTNET, DEFAULT_MSBUILD};
use crate::config::ToolConfig;
use crate::domain::{BuildArtifact, BuildStyle, ProjectDescriptor};
use crate::error::BuildError;
use crate::infra::command::{exit_code, CapturedOutput, CommandRunner};

/// 将项目构建为可部署的目录
#[async_trait]
pub trait BuildProject: Send + Sync {
    async fn build(
        &self,
        project: &ProjectDescriptor,
        configuration: Option<&str>,
    ) -> Result<BuildArtifact, BuildError>;
}

/// 基于 dotnet CLI 和 MSBuild 的构建器
pub struct BuildOrchestrator {
    dotnet: String,
    msbuild: String,
}

impl Default for BuildOrchestrator {
    fn default() -> Self {
        Self {
            dotnet: DEFAULT_DOTNET.to_string(),
            msbuild: DEFAULT_MSBUILD.to_string(),
        }
    }
}

impl BuildOrchestrator {
    pub fn new(dotnet: impl Into<String>, msbuild: impl Into<String>) -> Self {
        Self {
            dotnet: dotnet.into(),
            msbuild: msbuild.into(),
        }
    }

    pub fn from_config(config: &ToolConfig) -> Self {
        Self::new(config.dotnet.clone(), config.msbuild.clone())
    }

    /// SDK 风格项目的发布目录
    pub fn publish_dir(project_dir: &Path, configuration: &str) -> PathBuf {
        project_dir.join("bin").join(configuration).join("publish")
    }

    async fn publish(
        &self,
        project: &ProjectDescriptor,
        configuration: &str,
    ) -> Result<BuildArtifact, BuildError> {
        let publish_dir = absolute(&Self::publish_dir(&project.project_dir, configuration))?;
        info!(
            project = %project.project_file.display(),
            configuration,
            output = %publish_dir.display(),
            "Publishing project"
        );

        let args = vec![
            "publish".to_string(),
            project.project_file.to_string_lossy().into_owned(),
            "-c".to_string(),
            configuration.to_string(),
            "-o".to_string(),
            publish_dir.to_string_lossy().into_owned(),
            "--no-self-contained".to_string(),
        ];

        let output = CommandRunner::run_captured(&self.dotnet, &args, Some(&project.project_dir))
            .await
            .map_err(|e| BuildError::unexpected(format!("could not run {}: {}", self.dotnet, e), &e))?;
        ensure_success(&output)?;

        // 退出码为 0 但没有产物目录，同样视为发布失败
        if !publish_dir.is_dir() {
            warn!(output = %publish_dir.display(), "Publish reported success but produced no output");
            return Err(BuildError::ArtifactMissing { path: publish_dir });
        }

        Ok(BuildArtifact {
            output_path: publish_dir,
        })
    }

    async fn build_legacy(
        &self,
        project: &ProjectDescriptor,
        configuration: &str,
    ) -> Result<BuildArtifact, BuildError> {
        let Some(selected) = project.find_configuration(configuration) else {
            return Err(BuildError::ConfigurationNotFound {
                requested: configuration.to_string(),
                available: project
                    .configurations
                    .iter()
                    .map(|c| c.name.clone())
                    .collect(),
            });
        };

        info!(
            project = %project.project_file.display(),
            configuration = %selected.name,
            "Building legacy project"
        );

        let args = vec![
            project.project_file.to_string_lossy().into_owned(),
            "/t:Build".to_string(),
            format!("/p:Configuration={}", selected.name),
            "/nologo".to_string(),
            "/v:minimal".to_string(),
        ];

        let output = CommandRunner::run_captured(&self.msbuild, &args, Some(&project.project_dir))
            .await
            .map_err(|e| BuildError::unexpected(format!("could not run {}: {}", self.msbuild, e), &e))?;
        ensure_success(&output)?;

        let declared = selected
            .output_path
            .clone()
            .unwrap_or_else(|| format!("bin/{}", selected.name));
        let declared = native_path(&declared);
        let output_path = if declared.is_absolute() {
            declared
        } else {
            project.project_dir.join(declared)
        };
        let output_path = absolute(&output_path)?;

        if !output_path.is_dir() {
            return Err(BuildError::ArtifactMissing { path: output_path });
        }

        Ok(BuildArtifact { output_path })
    }
}

#[async_trait]
impl BuildProject for BuildOrchestrator {
    async fn build(
        &self,
        project: &ProjectDescriptor,
        configuration: Option<&str>,
    ) -> Result<BuildArtifact, BuildError> {
        let configuration = configuration
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_BUILD_CONFIGURATION);

        match project.style {
            BuildStyle::Sdk => self.publish(project, configuration).await,
            BuildStyle::Legacy => self.build_legacy(project, configuration).await,
        }
    }
}

fn ensure_success(output: &CapturedOutput) -> Result<(), BuildError> {
    if output.status.success() {
        return Ok(());
    }

    let code = exit_code(&output.status);
    // dotnet 和 MSBuild 的错误大多输出在 stdout
    let diagnostics = [output.stderr.trim(), output.stdout.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    warn!(exit_code = code, "Build tool failed");
    Err(BuildError::ExitCode { code, diagnostics })
}

fn absolute(path: &Path) -> Result<PathBuf, BuildError> {
    std::path::absolute(path)
        .map_err(|e| BuildError::unexpected(format!("could not resolve {}", path.display()), &e))
}

/// 项目文件中的路径使用 Windows 分隔符
fn native_path(raw: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(raw)
    } else {
        PathBuf::from(raw.replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"<Project ToolsVersion="15.0">
  <PropertyGroup Condition=" '$(Configuration)|$(Platform)' == 'Debug|AnyCPU' ">
    <OutputPath>bin\Debug\</OutputPath>
  </PropertyGroup>
  <PropertyGroup Condition=" '$(Configuration)|$(Platform)' == 'Release|AnyCPU' ">
    <OutputPath>bin\Release\</OutputPath>
  </PropertyGroup>
</Project>"#;

    const SDK: &str = r#"<Project Sdk="Microsoft.NET.Sdk.Web"></Project>"#;

    fn project(dir: &Path, content: &str) -> ProjectDescriptor {
        let file = dir.join("App.csproj");
        std::fs::write(&file, content).unwrap();
        ProjectDescriptor::load(&file).unwrap()
    }

    #[test]
    fn test_publish_dir_layout() {
        assert_eq!(
            BuildOrchestrator::publish_dir(Path::new("/src/App"), "Release"),
            PathBuf::from("/src/App/bin/Release/publish")
        );
    }

    #[tokio::test]
    async fn test_unknown_legacy_configuration_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path(), LEGACY);
        let orchestrator = BuildOrchestrator::new("dotnet", "nonexistent_msbuild_12345");

        let err = orchestrator.build(&project, Some("Staging")).await.unwrap_err();
        match err {
            BuildError::ConfigurationNotFound {
                requested,
                available,
            } => {
                assert_eq!(requested, "Staging");
                assert_eq!(available, ["Debug", "Release"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_tool_is_unexpected() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path(), SDK);
        let orchestrator = BuildOrchestrator::new("nonexistent_dotnet_12345", "msbuild");

        let err = orchestrator.build(&project, None).await.unwrap_err();
        assert!(matches!(err, BuildError::Unexpected { .. }));
        assert!(err.diagnostics().is_some());
    }

    #[cfg(unix)]
    mod stubs {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// 在项目目录下写入可执行的工具桩
        fn tool(dir: &Path, name: &str, body: &str) -> String {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        #[tokio::test]
        async fn test_publish_without_output_is_artifact_missing() {
            let dir = tempfile::tempdir().unwrap();
            let project = project(dir.path(), SDK);
            let dotnet = tool(dir.path(), "dotnet", "echo 'Publish succeeded.'; exit 0");
            let orchestrator = BuildOrchestrator::new(dotnet, "msbuild");

            let err = orchestrator.build(&project, None).await.unwrap_err();
            match err {
                BuildError::ArtifactMissing { path } => {
                    assert!(path.ends_with("bin/Release/publish"));
                }
                other => panic!("unexpected: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_publish_success() {
            let dir = tempfile::tempdir().unwrap();
            let project = project(dir.path(), SDK);
            // $6 是 -o 的值
            let dotnet = tool(dir.path(), "dotnet", "mkdir -p \"$6\"");
            let orchestrator = BuildOrchestrator::new(dotnet, "msbuild");

            let artifact = orchestrator.build(&project, Some("Debug")).await.unwrap();
            assert!(artifact.output_path.is_absolute());
            assert!(artifact.output_path.ends_with("bin/Debug/publish"));
            assert!(artifact.output_path.is_dir());
        }

        #[tokio::test]
        async fn test_publish_failure_carries_diagnostics() {
            let dir = tempfile::tempdir().unwrap();
            let project = project(dir.path(), SDK);
            let dotnet = tool(
                dir.path(),
                "dotnet",
                "echo 'error CS1002: ; expected'; exit 1",
            );
            let orchestrator = BuildOrchestrator::new(dotnet, "msbuild");

            let err = orchestrator.build(&project, None).await.unwrap_err();
            match err {
                BuildError::ExitCode { code, diagnostics } => {
                    assert_eq!(code, 1);
                    assert!(diagnostics.contains("CS1002"));
                }
                other => panic!("unexpected: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_legacy_build_resolves_declared_output() {
            let dir = tempfile::tempdir().unwrap();
            let project = project(dir.path(), LEGACY);
            std::fs::create_dir_all(dir.path().join("bin/Release")).unwrap();
            let msbuild = tool(dir.path(), "msbuild", "echo \"$3\"");
            let orchestrator = BuildOrchestrator::new("dotnet", msbuild);

            let artifact = orchestrator.build(&project, Some("release")).await.unwrap();
            assert!(artifact.output_path.ends_with("bin/Release"));
        }

        #[tokio::test]
        async fn test_legacy_build_errors() {
            let dir = tempfile::tempdir().unwrap();
            let project = project(dir.path(), LEGACY);
            let msbuild = tool(dir.path(), "msbuild", "echo '1 Error(s)'; exit 1");
            let orchestrator = BuildOrchestrator::new("dotnet", msbuild);

            let err = orchestrator.build(&project, None).await.unwrap_err();
            assert!(matches!(err, BuildError::ExitCode { code: 1, .. }));
        }
    }
}
