use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use ibex_lib::poller::never_cancelled;
use ibex_lib::{
    detect_start_spec, normalize_manual_url, poll_until_ready, ControllerSettings, HtmlWatcher,
    HttpProbe, IbexConfig, Launcher, OpenOutcome, OutputMode, PollPolicy, PreviewController,
    PtyShellSpawner, TerminalHost,
};

#[derive(Parser)]
#[command(name = "ibex", version, about = "Preview HTML files and auto-detected local dev servers")]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Preview a file: render HTML directly or boot the project's dev server
    Open {
        /// File to preview
        path: Option<PathBuf>,
        /// Project root holding package.json (defaults to the current directory)
        #[arg(long, env = "IBEX_ROOT")]
        root: Option<PathBuf>,
    },
    /// Show how the dev server would be started, without starting it
    Detect {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Poll a URL until it answers
    Probe {
        url: String,
        #[arg(long)]
        attempts: Option<u32>,
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Normalize a manually entered URL
    Url { input: String },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    ibex_lib::logging::init_tracing(cli.verbose);

    let config = IbexConfig::load();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run(cli.command, config))
}

async fn run(command: Command, config: IbexConfig) -> Result<ExitCode> {
    match command {
        Command::Open { path, root } => open(path, root, &config).await,
        Command::Detect { root, json } => detect(root, json),
        Command::Probe {
            url,
            attempts,
            delay_ms,
        } => probe(&url, attempts, delay_ms, &config).await,
        Command::Url { input } => {
            let url = normalize_manual_url(&input).map_err(anyhow::Error::msg)?;
            println!("{url}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            println!("# {}", IbexConfig::config_path().display());
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to serialize config")?
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn current_root(root: Option<PathBuf>) -> Option<PathBuf> {
    root.or_else(|| std::env::current_dir().ok())
}

async fn open(path: Option<PathBuf>, root: Option<PathBuf>, config: &IbexConfig) -> Result<ExitCode> {
    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();
    let spawner = PtyShellSpawner::new(config.shell.clone(), OutputMode::Inherit, exit_tx);
    let launcher = Launcher::new(Box::new(spawner), config.terminal_label.clone());
    let probe = HttpProbe::new(Duration::from_millis(config.probe_timeout_ms))
        .map_err(anyhow::Error::msg)?;
    let controller = PreviewController::new(TerminalHost, probe, launcher, ControllerSettings::from(config));
    let root = current_root(root);

    let outcome = {
        let opening = controller.open(path.as_deref(), root.as_deref());
        tokio::pin!(opening);
        loop {
            tokio::select! {
                outcome = &mut opening => break outcome,
                Some(exit) = exit_rx.recv() => {
                    controller.on_process_exited(&exit);
                }
                _ = tokio::signal::ctrl_c() => {
                    controller.stop();
                }
            }
        }
    };

    match outcome {
        OpenOutcome::Html(file) => {
            let (doc_tx, mut doc_rx) = mpsc::unbounded_channel();
            let _watcher = HtmlWatcher::start(&file, doc_tx).map_err(anyhow::Error::msg)?;
            loop {
                tokio::select! {
                    Some(change) = doc_rx.recv() => {
                        controller.on_document_changed(&change);
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        OpenOutcome::Server(state) if state.is_running() => {
            loop {
                tokio::select! {
                    Some(exit) = exit_rx.recv() => {
                        if controller.on_process_exited(&exit) {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        controller.stop();
                        break;
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        OpenOutcome::LaunchFailed(_) | OpenOutcome::Unreadable(_) => Ok(ExitCode::FAILURE),
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn detect(root: Option<PathBuf>, json: bool) -> Result<ExitCode> {
    let root = current_root(root).context("No project root")?;
    let spec = detect_start_spec(&root);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&spec).context("Failed to serialize start spec")?
        );
    } else {
        println!("command: {}", spec.command);
        println!("port:    {}", spec.predicted_port);
        println!("url:     {}", spec.predicted_url);
    }
    Ok(ExitCode::SUCCESS)
}

async fn probe(
    url: &str,
    attempts: Option<u32>,
    delay_ms: Option<u64>,
    config: &IbexConfig,
) -> Result<ExitCode> {
    let probe = HttpProbe::new(Duration::from_millis(config.probe_timeout_ms))
        .map_err(anyhow::Error::msg)?;
    let policy = PollPolicy {
        max_attempts: attempts.unwrap_or(config.max_attempts),
        retry_delay: Duration::from_millis(delay_ms.unwrap_or(config.retry_delay_ms)),
    };

    let outcome = poll_until_ready(&probe, url, &policy, never_cancelled()).await;
    if outcome.is_ready() {
        println!("{url} is up");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("[Ibex] {url} did not answer after {} attempts", policy.max_attempts);
        Ok(ExitCode::FAILURE)
    }
}
