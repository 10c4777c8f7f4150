//! 部署流水线
//!
//! 按固定顺序执行：解析配置 → 校验凭据 → 构建 → 部署。
//! 任一阶段失败立即停止，不会自动重试；只有凭据阶段会重新询问操作员。
//!
//! 部署阶段在独立的 tokio 任务中运行，`run` 在部署启动后立即返回
//! [`DeployHandle`]，调用方通过它按顺序接收输出行并等待最终结果。

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{self, ResolvedConfig, ToolConfig};
use crate::domain::{
    BuildStyle, Credentials, DeployRequest, ExecutionResult, LogLine, PipelineState,
    ProjectDescriptor, Stage, StageRecord,
};
use crate::error::{DeployError, PipelineError};

use super::build::{BuildOrchestrator, BuildProject};
use super::credentials::{self, ScriptCredentialValidator, ValidateCredentials};
use super::deploy::{into_outcome, ExecuteDeploy, ScriptDeployExecutor};

/// 凭据输入
///
/// 每次尝试调用一次；`previous_error` 是上一次失败的原因。
/// 返回 None 表示操作员取消。
pub trait PromptCredentials {
    fn prompt(&mut self, attempt: u32, previous_error: Option<&str>) -> Option<Credentials>;
}

/// 流水线事件
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    ConfigResolved {
        source: PathBuf,
    },
    /// 命名配置不存在，已回退到基础配置
    ConfigFallback {
        requested: String,
        missing_path: PathBuf,
    },
    CredentialsRejected {
        attempt: u32,
        message: String,
    },
    CredentialsValidated {
        username: String,
        configuration: String,
    },
    BuildStarted {
        project: String,
        style: BuildStyle,
        configuration: String,
        target_framework: Option<String>,
    },
    BuildCompleted {
        output_path: PathBuf,
    },
    DeployStarted {
        server: String,
        pool_name: String,
    },
    StageFinished {
        record: StageRecord,
    },
}

/// 流水线进度接收方
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: &PipelineEvent);
}

/// 写入 tracing 日志的 reporter
pub struct TracingReporter;

impl PipelineReporter for TracingReporter {
    fn report(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ConfigFallback {
                requested,
                missing_path,
            } => tracing::warn!(
                requested = %requested,
                missing = %missing_path.display(),
                "Configuration not found, using deploy.config.json"
            ),
            PipelineEvent::CredentialsRejected { attempt, message } => {
                tracing::warn!(attempt, message = %message, "Credentials rejected")
            }
            PipelineEvent::StageFinished { record } => tracing::info!(
                stage = record.stage.as_str(),
                status = ?record.status,
                duration_ms = ?record.duration_ms,
                "Stage finished"
            ),
            other => tracing::info!(event = ?other, "Pipeline progress"),
        }
    }
}

/// 一次流水线运行的输入
#[derive(Clone, Debug)]
pub struct PipelineRequest {
    pub project: ProjectDescriptor,
    /// 配置文件所在目录
    pub config_dir: PathBuf,
}

impl PipelineRequest {
    /// 配置文件位于项目目录
    pub fn for_project(project: ProjectDescriptor) -> Self {
        let config_dir = project.project_dir.clone();
        Self {
            project,
            config_dir,
        }
    }
}

/// 运行中的状态与阶段记录
struct PipelineRun {
    state: PipelineState,
    stages: Vec<StageRecord>,
    reporter: Arc<dyn PipelineReporter>,
}

impl PipelineRun {
    fn new(reporter: Arc<dyn PipelineReporter>) -> Self {
        Self {
            state: PipelineState::Idle,
            stages: [Stage::Config, Stage::Credentials, Stage::Build, Stage::Deploy]
                .into_iter()
                .map(StageRecord::new)
                .collect(),
            reporter,
        }
    }

    fn record_mut(&mut self, stage: Stage) -> &mut StageRecord {
        let index = self
            .stages
            .iter()
            .position(|r| r.stage == stage)
            .unwrap_or(0);
        &mut self.stages[index]
    }

    fn start(&mut self, stage: Stage) {
        self.record_mut(stage).start();
    }

    fn succeed(&mut self, stage: Stage, message: Option<String>) {
        self.state = self
            .state
            .advance(stage)
            .unwrap_or(PipelineState::Failed(stage));
        self.finish(stage, true, message);
    }

    fn fail(&mut self, stage: Stage, message: String) {
        self.state = PipelineState::Failed(stage);
        self.finish(stage, false, Some(message));
    }

    fn finish(&mut self, stage: Stage, success: bool, message: Option<String>) {
        let record = self.record_mut(stage);
        record.finish(success, message);
        let record = record.clone();
        self.reporter.report(&PipelineEvent::StageFinished { record });
    }

    fn report(&self, event: PipelineEvent) {
        self.reporter.report(&event);
    }
}

/// 部署流水线
pub struct Pipeline {
    validator: Arc<dyn ValidateCredentials>,
    builder: Arc<dyn BuildProject>,
    deployer: Arc<dyn ExecuteDeploy>,
    reporter: Arc<dyn PipelineReporter>,
}

impl Pipeline {
    pub fn new(
        validator: Arc<dyn ValidateCredentials>,
        builder: Arc<dyn BuildProject>,
        deployer: Arc<dyn ExecuteDeploy>,
    ) -> Self {
        Self {
            validator,
            builder,
            deployer,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// 使用外部脚本和构建工具
    pub fn from_tools(tools: &ToolConfig) -> Self {
        Self::new(
            Arc::new(ScriptCredentialValidator::new(tools.validation_script())),
            Arc::new(BuildOrchestrator::from_config(tools)),
            Arc::new(ScriptDeployExecutor::new(tools.deploy_script())),
        )
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn PipelineReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// 执行流水线直到部署启动
    pub async fn run(
        &self,
        request: PipelineRequest,
        prompt: &mut dyn PromptCredentials,
    ) -> Result<DeployHandle, PipelineError> {
        let PipelineRequest {
            project,
            config_dir,
        } = request;
        let mut run = PipelineRun::new(Arc::clone(&self.reporter));

        // Stage 1: 基础配置必须存在，才会询问凭据
        run.start(Stage::Config);
        let base = match config::resolve(&config_dir, None) {
            Ok(resolved) => resolved,
            Err(e) => {
                run.fail(Stage::Config, e.to_string());
                return Err(e.into());
            }
        };
        run.report(PipelineEvent::ConfigResolved {
            source: base.source.clone(),
        });
        run.succeed(Stage::Config, Some(base.config.to_string()));

        // Stage 2: 凭据
        run.start(Stage::Credentials);
        let (credentials, resolved) = match self.authenticate(&config_dir, prompt, &run).await {
            Some(accepted) => accepted,
            None => {
                run.fail(Stage::Credentials, "Cancelled by operator".to_string());
                return Err(PipelineError::Cancelled);
            }
        };
        let configuration = resolved
            .config
            .build_configuration(credentials.configuration_name.as_deref())
            .to_string();
        run.report(PipelineEvent::CredentialsValidated {
            username: credentials.username.clone(),
            configuration: configuration.clone(),
        });
        run.succeed(Stage::Credentials, None);

        // Stage 3: 构建
        run.start(Stage::Build);
        run.report(PipelineEvent::BuildStarted {
            project: project.name(),
            style: project.style,
            configuration: configuration.clone(),
            target_framework: project.target_framework.clone(),
        });
        let artifact = match self.builder.build(&project, Some(&configuration)).await {
            Ok(artifact) => artifact,
            Err(e) => {
                run.fail(Stage::Build, e.to_string());
                return Err(e.into());
            }
        };
        run.report(PipelineEvent::BuildCompleted {
            output_path: artifact.output_path.clone(),
        });
        run.succeed(
            Stage::Build,
            Some(artifact.output_path.display().to_string()),
        );

        // Stage 4: 部署（后台任务）
        run.start(Stage::Deploy);
        let config = resolved.config;
        run.report(PipelineEvent::DeployStarted {
            server: config.server.clone(),
            pool_name: config.pool_name.clone(),
        });

        let request = DeployRequest {
            server: config.server,
            credentials,
            pool_name: config.pool_name,
            app_folder: config.app_folder_location,
            artifact_path: artifact.output_path,
            backup_folder: config.backup_folder_location,
            exclude_from_cleanup: config.exclude_from_cleanup.items().to_vec(),
            exclude_from_copy: config.exclude_from_copy.items().to_vec(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let deployer = Arc::clone(&self.deployer);
        let task = tokio::spawn(async move {
            let mut on_line = move |line: &str| {
                // 接收方已放弃时丢弃输出，部署继续运行
                let _ = tx.send(LogLine::classify(line));
            };
            deployer.deploy(request, &mut on_line).await
        });

        Ok(DeployHandle {
            lines: rx,
            task,
            run,
        })
    }

    /// 凭据输入循环；操作员取消时返回 None
    async fn authenticate(
        &self,
        config_dir: &std::path::Path,
        prompt: &mut dyn PromptCredentials,
        run: &PipelineRun,
    ) -> Option<(Credentials, ResolvedConfig)> {
        let mut previous_error: Option<String> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let credentials = prompt.prompt(attempt, previous_error.as_deref())?;

            let resolved =
                match config::resolve(config_dir, credentials.configuration_name.as_deref()) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        let message = e.to_string();
                        run.report(PipelineEvent::CredentialsRejected {
                            attempt,
                            message: message.clone(),
                        });
                        previous_error = Some(message);
                        continue;
                    }
                };
            if let Some(fallback) = &resolved.fallback {
                run.report(PipelineEvent::ConfigFallback {
                    requested: fallback.requested.clone(),
                    missing_path: fallback.missing_path.clone(),
                });
            }

            let result = self
                .validator
                .validate(
                    &resolved.config.server,
                    &credentials.username,
                    &credentials.secret,
                    &resolved.config.app_folder_location,
                )
                .await;

            match credentials::check(&result) {
                Ok(()) => return Some((credentials, resolved)),
                Err(e) => {
                    let message = e.to_string();
                    run.report(PipelineEvent::CredentialsRejected {
                        attempt,
                        message: message.clone(),
                    });
                    previous_error = Some(message);
                }
            }
        }
    }
}

/// 运行中的部署
pub struct DeployHandle {
    lines: mpsc::UnboundedReceiver<LogLine>,
    task: JoinHandle<ExecutionResult>,
    run: PipelineRun,
}

impl DeployHandle {
    /// 下一行输出；部署结束且所有行都已读取后返回 None
    pub async fn next_line(&mut self) -> Option<LogLine> {
        self.lines.recv().await
    }

    pub fn state(&self) -> PipelineState {
        self.run.state
    }

    /// 等待部署结束
    pub async fn wait(mut self) -> DeployOutcome {
        let (output_lines, result) = match self.task.await {
            Ok(result) => (result.output().len(), into_outcome(result)),
            Err(e) => (
                0,
                Err(DeployError::ProcessFailure(format!(
                    "Deploy task failed: {}",
                    e
                ))),
            ),
        };

        match &result {
            Ok(_) => self.run.succeed(Stage::Deploy, None),
            Err(e) => self.run.fail(Stage::Deploy, e.to_string()),
        }

        DeployOutcome {
            state: self.run.state,
            stages: self.run.stages,
            output_lines,
            result,
        }
    }
}

/// 部署最终结果
#[derive(Debug)]
pub struct DeployOutcome {
    pub state: PipelineState,
    pub stages: Vec<StageRecord>,
    /// 脚本输出的行数，失败时同样计入
    pub output_lines: usize,
    pub result: Result<ExecutionResult, DeployError>,
}

impl DeployOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}
