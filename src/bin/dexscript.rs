//! DexScript command line
//!
//! Runs scripts against an in-memory store seeded from a model schema file.
//!
//! # Usage
//!
//! ```bash
//! # Run a script file (or `-` for stdin)
//! dexscript run setup.dex
//!
//! # Interactive session; a line containing only `;;` submits the block
//! dexscript repl
//!
//! # Toggle or set a setting in the config file
//! dexscript setting debug
//! dexscript setting page_size 1200
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use dexscript::settings::{SettingValue, DEFAULT_CONFIG_FILE};
use dexscript::{
    Attachment, Host, HostError, InMemoryStore, Interpreter, ProcessState, Reply, Settings,
};

/// Line that submits the buffered block in the REPL
const SUBMIT_MARKER: &str = ";;";

#[derive(Parser)]
#[command(name = "dexscript")]
#[command(version)]
#[command(about = "Run DexScript against an in-memory model store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file
    #[arg(long, global = true, env = "DEXSCRIPT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Model schema file
    #[arg(long, global = true, env = "DEXSCRIPT_MODELS", default_value = "config/models.yaml")]
    models: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one script
    Run {
        /// Script file, `-` for stdin
        script: String,

        /// Files to attach to the triggering message
        #[arg(long)]
        attach: Vec<PathBuf>,
    },

    /// Read scripts from stdin until EOF
    Repl {
        /// Files to attach to every submitted script
        #[arg(long)]
        attach: Vec<PathBuf>,
    },

    /// Show, toggle or change a setting
    Setting {
        name: String,
        value: Option<String>,
    },
}

// =============================================================================
// CONSOLE HOST
// =============================================================================

struct ConsoleHost {
    input: Mutex<Lines<BufReader<Stdin>>>,
    attachments: Vec<Attachment>,
}

impl ConsoleHost {
    fn new(attachments: Vec<Attachment>) -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            attachments,
        }
    }

    async fn next_line(&self) -> Result<Option<String>, HostError> {
        self.input
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| HostError::Input(e.to_string()))
    }
}

#[async_trait]
impl Host for ConsoleHost {
    async fn reply(&self, reply: Reply) -> Result<(), HostError> {
        if !reply.text.is_empty() {
            println!("{}", reply.text);
        }
        for attachment in &reply.attachments {
            println!(
                "{} {} ({} bytes)",
                "attachment:".cyan(),
                attachment.filename,
                attachment.data.len()
            );
        }
        Ok(())
    }

    async fn prompt_for_input(&self, prompt: &str, timeout: Duration) -> Result<String, HostError> {
        println!("{}", prompt.yellow());

        match tokio::time::timeout(timeout, self.next_line()).await {
            Ok(Ok(Some(line))) => Ok(line),
            Ok(Ok(None)) => Err(HostError::Input("stdin closed".to_string())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(HostError::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }

    fn attachments(&self) -> Vec<Attachment> {
        self.attachments.clone()
    }

    async fn acknowledge(&self) -> Result<(), HostError> {
        println!("{}", "OK".green());
        Ok(())
    }
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { script, attach } => cmd_run(&cli.config, &cli.models, &script, &attach).await,
        Commands::Repl { attach } => cmd_repl(&cli.config, &cli.models, &attach).await,
        Commands::Setting { name, value } => cmd_setting(&cli.config, &name, value.as_deref()),
    }
}

fn build_interpreter(config: &Path, models: &Path) -> Result<Interpreter> {
    let settings = Settings::load(config)
        .with_context(|| format!("Failed to load settings from {}", config.display()))?;
    let store = InMemoryStore::load(models)
        .with_context(|| format!("Failed to load models from {}", models.display()))?;
    let state = ProcessState::new(settings).with_config_path(config);

    Interpreter::with_state(Arc::new(store), Arc::new(state))
        .context("Failed to build the model registry")
}

async fn read_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read attachment {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        attachments.push(Attachment::new(filename, data));
    }
    Ok(attachments)
}

async fn cmd_run(config: &Path, models: &Path, script: &str, attach: &[PathBuf]) -> Result<ExitCode> {
    let interpreter = build_interpreter(config, models)?;
    let host = ConsoleHost::new(read_attachments(attach).await?);

    let source = if script == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("Failed to read script from stdin")?;
        buffer
    } else {
        tokio::fs::read_to_string(script)
            .await
            .with_context(|| format!("Failed to read script {}", script))?
    };

    let report = interpreter.run(&host, &source).await;
    Ok(if report_failure(&report) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn cmd_repl(config: &Path, models: &Path, attach: &[PathBuf]) -> Result<ExitCode> {
    let interpreter = build_interpreter(config, models)?;
    let host = ConsoleHost::new(read_attachments(attach).await?);

    println!(
        "DexScript {} - end a script with a `{}` line, Ctrl-D to quit",
        env!("CARGO_PKG_VERSION"),
        SUBMIT_MARKER
    );

    let mut buffer = String::new();
    let mut failed = false;

    loop {
        let line = host.next_line().await.context("Failed to read stdin")?;
        match line {
            Some(line) if line.trim() == SUBMIT_MARKER => {
                failed |= report_failure(&interpreter.run(&host, &buffer).await);
                buffer.clear();
            }
            Some(line) => {
                buffer.push_str(&line);
                buffer.push('\n');
            }
            None => break,
        }
    }

    if !buffer.trim().is_empty() {
        failed |= report_failure(&interpreter.run(&host, &buffer).await);
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_setting(config: &Path, name: &str, value: Option<&str>) -> Result<ExitCode> {
    let state = ProcessState::new(
        Settings::load(config)
            .with_context(|| format!("Failed to load settings from {}", config.display()))?,
    )
    .with_config_path(config);

    if value.is_none() {
        if let Ok(current @ (SettingValue::Text(_) | SettingValue::Number(_))) =
            state.settings().get(name)
        {
            println!("`{}` is set to `{}`", name.to_lowercase(), current);
            return Ok(ExitCode::SUCCESS);
        }
    }

    match state.update_setting(name, value) {
        Ok(change) => {
            println!(
                "{} `{}` has been set from `{}` to `{}`",
                "OK".green(),
                change.name,
                change.old,
                change.new
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print the failing line, if any. Returns whether the run failed.
fn report_failure(report: &dexscript::RunReport) -> bool {
    match &report.error {
        None => false,
        Some(error) => {
            eprintln!(
                "{}: script stopped at line {} ({})",
                "error".red().bold(),
                error.line,
                error.error.category()
            );
            true
        }
    }
}
