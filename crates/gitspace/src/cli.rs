use crate::commands::{down, status, stop, up};
use crate::ui::spinner::with_spinner;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use gitspace_core::config::OrchestratorConfig;
use gitspace_core::ide::IdeRegistry;
use gitspace_core::infra::Infrastructure;
use gitspace_core::logstream::{default_log_dir, FileLogStreamFactory};
use gitspace_core::runtime::{CliRuntimeFactory, RuntimeKind};
use gitspace_core::Orchestrator;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Runtime selection options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum RuntimeOption {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl From<RuntimeOption> for RuntimeKind {
    fn from(runtime: RuntimeOption) -> Self {
        match runtime {
            RuntimeOption::Docker => RuntimeKind::Docker,
            RuntimeOption::Podman => RuntimeKind::Podman,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

impl From<LogFormat> for gitspace_core::logging::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Text => gitspace_core::logging::LogFormat::Text,
            LogFormat::Json => gitspace_core::logging::LogFormat::Json,
        }
    }
}

/// Log level options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Gitspace subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create, resume or confirm a running gitspace and print its connection details
    Up {
        /// Gitspace record (JSON or JSON5)
        #[arg(long, value_name = "PATH")]
        gitspace: PathBuf,
        /// Named volume mounted at the repository working directory
        #[arg(long)]
        storage: String,
        /// devcontainer.json for the repository
        #[arg(long, value_name = "PATH")]
        devcontainer: Option<PathBuf>,
        /// Working directory name inside the container (defaults to the repository name)
        #[arg(long)]
        repo_name: Option<String>,
    },

    /// Stop a gitspace, keeping its container for a later resume
    Stop {
        /// Gitspace record (JSON or JSON5)
        #[arg(long, value_name = "PATH")]
        gitspace: PathBuf,
    },

    /// Stop and remove a gitspace's container
    Down {
        /// Gitspace record (JSON or JSON5)
        #[arg(long, value_name = "PATH")]
        gitspace: PathBuf,
    },

    /// Report infrastructure status
    Status,
}

/// Orchestrate per-user development containers on a Docker or Podman host
#[derive(Debug, Parser)]
#[command(name = "gitspace", version, about)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via GITSPACE_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Container runtime (can be set via GITSPACE_RUNTIME env var)
    #[arg(long, global = true, value_enum)]
    pub runtime: Option<RuntimeOption>,

    /// Path to the runtime binary, overriding the runtime default
    #[arg(long, global = true, value_name = "PATH")]
    pub runtime_path: Option<String>,

    /// Directory holding per-gitspace operator logs
    #[arg(long, global = true, value_name = "PATH")]
    pub log_dir: Option<PathBuf>,

    /// Deadline for each operation in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Image used when the devcontainer declares none
    #[arg(long, global = true, value_name = "IMAGE")]
    pub default_image: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Initialize logging, build the orchestrator and run the selected subcommand
    pub async fn dispatch(self) -> Result<()> {
        let log_format = self.log_format.map(gitspace_core::logging::LogFormat::from);
        let mut log_level = self.log_level.as_str();

        // Spinner-friendly session: stderr is a TTY and logs are not JSON
        let spinner_eligible = std::io::stderr().is_terminal()
            && !matches!(log_format, Some(gitspace_core::logging::LogFormat::Json));

        if std::env::var_os("GITSPACE_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            // Keep the spinner readable unless the user asked for more
            if spinner_eligible && matches!(self.log_level, LogLevel::Info) {
                log_level = "warn";
            }
            std::env::set_var(
                "RUST_LOG",
                format!("gitspace={},gitspace_core={}", log_level, log_level),
            );
        }
        gitspace_core::logging::init(log_format)?;

        tracing::debug!("CLI initialized with log level: {}", log_level);

        let orchestrator = self.orchestrator()?;

        match self.command {
            Commands::Up {
                ref gitspace,
                ref storage,
                ref devcontainer,
                ref repo_name,
            } => {
                let args = up::UpArgs {
                    gitspace_file: gitspace.clone(),
                    devcontainer_file: devcontainer.clone(),
                    repo_name: repo_name.clone(),
                    infra: self.infrastructure(storage),
                };
                let result = with_spinner(
                    spinner_eligible,
                    "Starting gitspace…",
                    "Gitspace running",
                    up::execute_up(&orchestrator, args),
                )
                .await?;
                up::print_result(&result)
            }
            Commands::Stop { ref gitspace } => {
                let args = stop::StopArgs {
                    gitspace_file: gitspace.clone(),
                    infra: self.infrastructure(""),
                };
                with_spinner(
                    spinner_eligible,
                    "Stopping gitspace…",
                    "Gitspace stopped",
                    stop::execute_stop(&orchestrator, args),
                )
                .await
            }
            Commands::Down { ref gitspace } => {
                let args = down::DownArgs {
                    gitspace_file: gitspace.clone(),
                    infra: self.infrastructure(""),
                };
                with_spinner(
                    spinner_eligible,
                    "Removing gitspace…",
                    "Gitspace removed",
                    down::execute_down(&orchestrator, args),
                )
                .await
            }
            Commands::Status => {
                status::execute_status(&orchestrator, &self.infrastructure("")).await
            }
        }
    }

    /// Orchestrator settings: environment defaults overridden by flags
    fn orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let mut config = OrchestratorConfig::from_env()?;
        if let Some(secs) = self.timeout {
            config.operation_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(image) = &self.default_image {
            config.default_base_image = image.clone();
        }
        Ok(config)
    }

    fn orchestrator(&self) -> Result<Orchestrator> {
        let log_dir = self.log_dir.clone().unwrap_or_else(default_log_dir);
        tracing::debug!("Operator logs under {}", log_dir.display());

        Ok(Orchestrator::new(
            self.orchestrator_config()?,
            Arc::new(CliRuntimeFactory),
            Arc::new(FileLogStreamFactory::new(log_dir)),
            IdeRegistry::with_defaults(),
        ))
    }

    /// The local container host; teardown does not use the storage volume
    fn infrastructure(&self, storage: &str) -> Infrastructure {
        let mut infra = Infrastructure::new("local", storage);
        infra.runtime = RuntimeKind::detect(self.runtime.map(Into::into));
        infra.runtime_path = self.runtime_path.clone();
        infra
    }
}
