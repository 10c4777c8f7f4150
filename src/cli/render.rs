//! 终端输出
//!
//! 文本模式输出横幅和进度；JSON 模式每个事件、每行输出一个 JSON 对象。

use serde::Serialize;
use std::path::Path;

use crate::config::env::constants::BASE_CONFIG_FILE;
use crate::config::{ExclusionList, ResolvedConfig};
use crate::domain::{BuildStyle, LogLine, PipelineState, StageRecord, StageStatus};
use crate::error::DeployError;
use crate::services::{DeployOutcome, PipelineEvent, PipelineReporter};

const RULE: &str = "========================================";

/// 输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// 部署结束时的摘要
#[derive(Debug, Serialize)]
struct Summary<'a> {
    success: bool,
    state: PipelineState,
    stages: &'a [StageRecord],
    exit_code: Option<i32>,
    output_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<String>,
}

/// 终端渲染器，同时作为流水线的 reporter
#[derive(Clone, Copy, Debug)]
pub struct Renderer {
    format: OutputFormat,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// 事件的显示文本；不需要显示的事件返回 None
    pub fn format_event(&self, event: &PipelineEvent) -> Option<String> {
        if self.format == OutputFormat::Json {
            return Some(to_json(event));
        }

        match event {
            PipelineEvent::ConfigResolved { source } => {
                Some(format!("Using configuration file: {}", file_name(source)))
            }
            PipelineEvent::ConfigFallback {
                requested,
                missing_path,
            } => Some(format!(
                "Configuration '{}' not found. File '{}' does not exist.\nUsing default: {}",
                requested,
                file_name(missing_path),
                BASE_CONFIG_FILE
            )),
            // 凭据输入界面自己显示失败原因
            PipelineEvent::CredentialsRejected { .. } => None,
            PipelineEvent::CredentialsValidated { configuration, .. } => Some(format!(
                "{RULE}\nCredentials validated successfully!\nConfiguration: {configuration}\n{RULE}"
            )),
            PipelineEvent::BuildStarted {
                project,
                style,
                configuration,
                target_framework,
            } => {
                let verb = match style {
                    BuildStyle::Sdk => "Publishing",
                    BuildStyle::Legacy => "Building",
                };
                let framework = target_framework
                    .as_deref()
                    .map(|f| format!(", {}", f))
                    .unwrap_or_default();
                Some(format!(
                    "\n{} {} ({}{})...",
                    verb, project, configuration, framework
                ))
            }
            PipelineEvent::BuildCompleted { output_path } => Some(format!(
                "Build completed successfully!\nOutput path: {}",
                output_path.display()
            )),
            PipelineEvent::DeployStarted { server, pool_name } => Some(format!(
                "\n{RULE}\nStarting deployment to {server} ({pool_name})...\n{RULE}\n"
            )),
            PipelineEvent::StageFinished { .. } => None,
        }
    }

    pub fn format_line(&self, line: &LogLine) -> String {
        match self.format {
            OutputFormat::Text => line.content.clone(),
            OutputFormat::Json => to_json(line),
        }
    }

    pub fn format_outcome(&self, outcome: &DeployOutcome) -> String {
        let (exit_code, errors) = match &outcome.result {
            Ok(result) => (result.exit_code(), None),
            Err(e) => {
                let code = match e {
                    DeployError::NonZeroExit { code, .. } => *code,
                    DeployError::ProcessFailure(_) => None,
                };
                (code, Some(e.to_string()))
            }
        };

        if self.format == OutputFormat::Json {
            return to_json(&Summary {
                success: outcome.success(),
                state: outcome.state,
                stages: &outcome.stages,
                exit_code,
                output_lines: outcome.output_lines,
                errors,
            });
        }

        let mut text = String::new();
        if outcome.success() {
            text.push_str(&format!("\n{RULE}\nDEPLOYMENT COMPLETED SUCCESSFULLY!\n{RULE}\n"));
        } else {
            text.push_str(&format!("\n{RULE}\nDEPLOYMENT FAILED!\n{RULE}\n"));
            if let Some(errors) = errors {
                text.push_str(&errors);
                text.push('\n');
            }
        }
        text.push_str(&format_stages(&outcome.stages));
        text
    }

    /// `check` 命令的输出
    pub fn format_check(&self, resolved: &ResolvedConfig) -> String {
        if self.format == OutputFormat::Json {
            let fallback = resolved.fallback.as_ref().map(|f| {
                serde_json::json!({
                    "requested": f.requested,
                    "missingPath": f.missing_path,
                })
            });
            return to_json(&serde_json::json!({
                "source": resolved.source,
                "fallback": fallback,
                "configuration": resolved.config,
            }));
        }

        let config = &resolved.config;
        let mut lines = vec![format!("Configuration file: {}", resolved.source.display())];
        if let Some(fallback) = &resolved.fallback {
            lines.push(format!(
                "Configuration '{}' not found ({} does not exist), using default",
                fallback.requested,
                file_name(&fallback.missing_path)
            ));
        }
        lines.push(format!("Server:               {}", config.server));
        lines.push(format!("Application pool:     {}", config.pool_name));
        lines.push(format!("App folder:           {}", config.app_folder_location));
        lines.push(format!("Backup folder:        {}", config.backup_folder_location));
        lines.push(format!(
            "Exclude from cleanup: {}",
            format_exclusions(&config.exclude_from_cleanup)
        ));
        lines.push(format!(
            "Exclude from copy:    {}",
            format_exclusions(&config.exclude_from_copy)
        ));
        lines.push(format!(
            "Build configuration:  {}",
            config.build_configuration(None)
        ));
        lines.join("\n")
    }

    pub fn line(&self, line: &LogLine) {
        println!("{}", self.format_line(line));
    }

    pub fn outcome(&self, outcome: &DeployOutcome) {
        println!("{}", self.format_outcome(outcome));
    }

    /// 部署已在后台启动
    pub fn background_notice(&self) {
        if self.format == OutputFormat::Text {
            println!("Deployment is running in background...");
        }
    }
}

impl PipelineReporter for Renderer {
    fn report(&self, event: &PipelineEvent) {
        if let Some(text) = self.format_event(event) {
            println!("{}", text);
        }
    }
}

fn format_stages(stages: &[StageRecord]) -> String {
    let mut text = String::from("Stages:\n");
    for record in stages {
        let duration = record
            .duration_ms
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_default();
        text.push_str(&format!(
            "  {:<22} {:<8} {}\n",
            record.stage.display_name(),
            status_label(&record.status),
            duration
        ));
    }
    text.trim_end().to_string()
}

fn status_label(status: &StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "skipped",
        StageStatus::Running => "running",
        StageStatus::Success => "ok",
        StageStatus::Failed => "failed",
    }
}

fn format_exclusions(list: &ExclusionList) -> String {
    if list.is_empty() {
        "(none)".to_string()
    } else {
        list.items().join(", ")
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn to_json(value: &impl Serialize) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!("{{\"error\":\"failed to serialize output: {}\"}}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionResultBuilder, Stage};
    use std::path::PathBuf;

    fn stages(failed: Option<Stage>) -> Vec<StageRecord> {
        [Stage::Config, Stage::Credentials, Stage::Build, Stage::Deploy]
            .into_iter()
            .map(|stage| {
                let mut record = StageRecord::new(stage);
                record.start();
                record.finish(Some(stage) != failed, None);
                record
            })
            .collect()
    }

    #[test]
    fn test_fallback_notice_names_missing_file() {
        let renderer = Renderer::new(OutputFormat::Text);
        let text = renderer
            .format_event(&PipelineEvent::ConfigFallback {
                requested: "staging".to_string(),
                missing_path: PathBuf::from("/proj/deploy.staging.config.json"),
            })
            .unwrap();

        assert!(text.contains("Configuration 'staging' not found"));
        assert!(text.contains("deploy.staging.config.json"));
        assert!(text.ends_with("Using default: deploy.config.json"));
    }

    #[test]
    fn test_build_started_mentions_framework() {
        let renderer = Renderer::new(OutputFormat::Text);
        let text = renderer
            .format_event(&PipelineEvent::BuildStarted {
                project: "Shop.Web".to_string(),
                style: BuildStyle::Sdk,
                configuration: "Release".to_string(),
                target_framework: Some("net8.0".to_string()),
            })
            .unwrap();
        assert_eq!(text, "\nPublishing Shop.Web (Release, net8.0)...");
    }

    #[test]
    fn test_json_event_is_tagged() {
        let renderer = Renderer::new(OutputFormat::Json);
        let text = renderer
            .format_event(&PipelineEvent::CredentialsRejected {
                attempt: 2,
                message: "Logon failure".to_string(),
            })
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "credentials_rejected");
        assert_eq!(value["attempt"], 2);
    }

    #[test]
    fn test_text_mode_hides_rejections() {
        let renderer = Renderer::new(OutputFormat::Text);
        assert!(renderer
            .format_event(&PipelineEvent::CredentialsRejected {
                attempt: 1,
                message: "x".to_string(),
            })
            .is_none());
    }

    #[test]
    fn test_success_banner() {
        let mut builder = ExecutionResultBuilder::new();
        builder.push_line("done");
        builder.exit_code(0);
        let outcome = DeployOutcome {
            state: PipelineState::Deployed,
            stages: stages(None),
            output_lines: 1,
            result: Ok(builder.finish()),
        };

        let text = Renderer::new(OutputFormat::Text).format_outcome(&outcome);
        assert!(text.contains("DEPLOYMENT COMPLETED SUCCESSFULLY!"));
        assert!(text.contains("Validate Credentials"));
    }

    #[test]
    fn test_failure_summary_json() {
        let outcome = DeployOutcome {
            state: PipelineState::Failed(Stage::Deploy),
            stages: stages(Some(Stage::Deploy)),
            output_lines: 3,
            result: Err(DeployError::NonZeroExit {
                code: Some(1),
                errors: "Access denied".to_string(),
            }),
        };

        let text = Renderer::new(OutputFormat::Json).format_outcome(&outcome);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["exit_code"], 1);
        assert_eq!(value["output_lines"], 3);
        assert_eq!(value["state"]["state"], "failed");
        assert_eq!(value["state"]["stage"], "deploy");
        assert_eq!(value["stages"][3]["status"], "failed");

        let text = Renderer::new(OutputFormat::Text).format_outcome(&outcome);
        assert!(text.contains("DEPLOYMENT FAILED!\n"));
        assert!(text.contains("Access denied"));
    }
}
