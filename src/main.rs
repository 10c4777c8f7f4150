//! IIS Deploy - .NET 项目到 IIS 的部署工具
//!
//! Usage:
//! - Deploy a project: `iis-deploy deploy --project src/Shop.Web/Shop.Web.csproj`
//! - Create deploy.config.json: `iis-deploy init --project-dir src/Shop.Web`
//! - Show the effective configuration: `iis-deploy check --project-dir src/Shop.Web --configuration prod`

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iis_deploy::cli::{OutputFormat, Renderer, TerminalPrompt};
use iis_deploy::config::{self, ToolConfig};
use iis_deploy::domain::ProjectDescriptor;
use iis_deploy::error::PipelineError;
use iis_deploy::services::{Pipeline, PipelineRequest};

#[derive(Parser)]
#[command(name = "iis-deploy", version)]
#[command(about = "Build a .NET project and deploy it to IIS", long_about = None)]
struct Cli {
    /// Print events, output lines and the summary as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate credentials, build and deploy a project
    Deploy(DeployArgs),

    /// Create a deploy.config.json template
    Init {
        /// Project directory
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// Resolve and print the effective deploy configuration
    Check {
        /// Project directory
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Configuration name (selects deploy.<name>.config.json)
        #[arg(long, short)]
        configuration: Option<String>,
    },
}

#[derive(Args)]
struct DeployArgs {
    /// Project file (.csproj / .vbproj)
    #[arg(long, short)]
    project: PathBuf,

    /// Configuration name; skips the configuration prompt
    #[arg(long, short)]
    configuration: Option<String>,

    /// Default user name for the credential prompt
    #[arg(long, short)]
    username: Option<String>,

    /// Directory containing test-credentials.ps1 and deploy-template.ps1
    #[arg(long)]
    scripts_dir: Option<PathBuf>,

    /// Script interpreter; an empty value runs the scripts directly
    #[arg(long)]
    shell: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout 留给部署输出，日志写入 stderr
    let default_filter = if cli.verbose {
        "iis_deploy=debug,info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match run(cli.command, format) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, format: OutputFormat) -> Result<ExitCode> {
    match command {
        Commands::Deploy(args) => {
            let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
            rt.block_on(deploy(args, format))
        }
        Commands::Init { project_dir } => init(&project_dir),
        Commands::Check {
            project_dir,
            configuration,
        } => check(&project_dir, configuration.as_deref(), format),
    }
}

async fn deploy(args: DeployArgs, format: OutputFormat) -> Result<ExitCode> {
    let mut tools = ToolConfig::from_env();
    if let Some(dir) = args.scripts_dir {
        tools.scripts_dir = dir;
    }
    if let Some(shell) = args.shell {
        tools.shell = shell;
    }

    for host in [tools.validation_script(), tools.deploy_script()] {
        if !host.exists() {
            bail!("Script not found at: {}", host.script.display());
        }
    }

    let project = ProjectDescriptor::load(&args.project)
        .with_context(|| format!("Failed to read project file {}", args.project.display()))?;
    if !project.is_runnable() {
        bail!(
            "{} is not a deployable project (expected an executable or a web application)",
            project.name()
        );
    }

    if !config::deploy::base_config_path(&project.project_dir).is_file() {
        offer_template(&project.project_dir, format)?;
        return Ok(ExitCode::FAILURE);
    }

    let renderer = Renderer::new(format);
    let pipeline = Pipeline::from_tools(&tools).with_reporter(Arc::new(renderer));
    let mut prompt = TerminalPrompt::new(args.username, args.configuration);

    let mut handle = match pipeline
        .run(PipelineRequest::for_project(project), &mut prompt)
        .await
    {
        Ok(handle) => handle,
        Err(PipelineError::Cancelled) => {
            eprintln!("Deployment cancelled.");
            return Ok(ExitCode::FAILURE);
        }
        Err(PipelineError::Build(e)) => {
            if let Some(diagnostics) = e.diagnostics() {
                eprintln!("{}", diagnostics);
            }
            return Err(e).context("Build failed");
        }
        Err(e) => {
            let stage = e.stage().display_name();
            return Err(e).context(format!("{} failed", stage));
        }
    };

    renderer.background_notice();
    while let Some(line) = handle.next_line().await {
        renderer.line(&line);
    }

    let outcome = handle.wait().await;
    renderer.outcome(&outcome);

    Ok(if outcome.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// deploy.config.json 不存在时询问是否创建模板
fn offer_template(project_dir: &Path, format: OutputFormat) -> Result<()> {
    eprintln!("deploy.config.json not found in {}.", project_dir.display());
    if format == OutputFormat::Json {
        return Ok(());
    }

    let create = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Would you like to create it now?")
        .default(true)
        .interact()?;
    if create {
        init(project_dir)?;
    }
    Ok(())
}

fn init(project_dir: &Path) -> Result<ExitCode> {
    let created = config::deploy::write_template(project_dir)
        .with_context(|| format!("Failed to write template in {}", project_dir.display()))?;
    let path = config::deploy::base_config_path(project_dir);

    if created {
        println!("{} has been created.", path.display());
        println!("Please configure the settings and try again.");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{} already exists, leaving it unchanged.", path.display());
        Ok(ExitCode::FAILURE)
    }
}

fn check(project_dir: &Path, configuration: Option<&str>, format: OutputFormat) -> Result<ExitCode> {
    let resolved = config::resolve(project_dir, configuration)?;
    println!("{}", Renderer::new(format).format_check(&resolved));
    Ok(ExitCode::SUCCESS)
}
