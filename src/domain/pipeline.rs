//! 部署流水线相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 流水线阶段
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Config,
    Credentials,
    Build,
    Deploy,
}

impl Stage {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Credentials => "credentials",
            Stage::Build => "build",
            Stage::Deploy => "deploy",
        }
    }

    /// 显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Config => "Resolve Configuration",
            Stage::Credentials => "Validate Credentials",
            Stage::Build => "Build",
            Stage::Deploy => "Deploy",
        }
    }
}

/// 流水线状态
///
/// 只能向前推进：Idle → ConfigResolved → CredentialsValidated → Built → Deployed，
/// 任一阶段失败进入终态 `Failed(stage)`。
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum PipelineState {
    Idle,
    ConfigResolved,
    CredentialsValidated,
    Built,
    Deployed,
    Failed(Stage),
}

impl PipelineState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Deployed | PipelineState::Failed(_))
    }

    /// 当前状态之后要执行的阶段
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Idle => Some(Stage::Config),
            PipelineState::ConfigResolved => Some(Stage::Credentials),
            PipelineState::CredentialsValidated => Some(Stage::Build),
            PipelineState::Built => Some(Stage::Deploy),
            PipelineState::Deployed | PipelineState::Failed(_) => None,
        }
    }

    /// 阶段成功后的状态
    ///
    /// 只有当 `stage` 正是下一个待执行阶段时才允许推进
    pub fn advance(self, stage: Stage) -> Option<Self> {
        if self.next_stage() != Some(stage) {
            return None;
        }
        Some(match stage {
            Stage::Config => PipelineState::ConfigResolved,
            Stage::Credentials => PipelineState::CredentialsValidated,
            Stage::Build => PipelineState::Built,
            Stage::Deploy => PipelineState::Deployed,
        })
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// 阶段执行记录
#[derive(Clone, Debug, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    /// 开始时间
    pub started_at: Option<DateTime<Utc>>,
    /// 结束时间
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    /// 附加信息
    pub message: Option<String>,
}

impl StageRecord {
    /// 创建新的待执行阶段
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }
}
