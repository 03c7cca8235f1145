use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use padbridge::config::AppConfig;
use padbridge::input::InputEvent;
use padbridge::mapping::Profile;
use padbridge::mode::Mode;
use padbridge::recoil::{AntiRecoilEngine, JsonPatternRepository};
use padbridge::Orchestrator;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "padbridge")]
#[command(about = "Keyboard, mouse and gamepad input to one virtual controller")]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the pipeline, reading capture events as JSON lines from stdin
    Run(RunArgs),
    Mode {
        #[command(subcommand)]
        action: ModeCommand,
    },
    Patterns {
        #[command(subcommand)]
        action: PatternCommand,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Profile JSON, overrides the configured one
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Stop after this many seconds instead of at end of input
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Record fire-held mouse motion into a pattern saved on exit
    #[arg(long)]
    record: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ModeCommand {
    Show,
    Cycle,
    Set { mode: Mode },
}

#[derive(Debug, Subcommand)]
enum PatternCommand {
    List,
    Show { name: String },
    Simulate { name: String },
    Rename { old: String, new: String },
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.log_level)?;

    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_create(&config_path)
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;
    debug!("Using configuration {}", config_path.display());

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Mode { action } => mode_command(config, action),
        Commands::Patterns { action } => pattern_command(config, action),
    }
}

fn setup(level: Level) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(level);
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .pretty()
        .init();
}

async fn run(mut config: AppConfig, args: RunArgs) -> Result<()> {
    if args.profile.is_some() {
        config.paths.profile = args.profile;
    }

    let builder = Orchestrator::builder(config);
    #[cfg(feature = "gilrs")]
    let builder = match padbridge::device::gilrs_backend::GilrsController::new(0.05) {
        Ok(controller) => builder.physical(controller),
        Err(e) => {
            warn!("Physical controller support unavailable: {}", e);
            builder
        }
    };
    let orchestrator = Arc::new(
        builder
            .build()
            .map_err(|e| eyre!("Failed to set up pipeline: {}", e))?,
    );

    if let Some(name) = &args.record {
        orchestrator
            .recoil()
            .start_pattern_recording(name)
            .map_err(|e| eyre!("Failed to start recording: {}", e))?;
    }

    orchestrator
        .start()
        .await
        .map_err(|e| eyre!("Failed to start pipeline: {}", e))?;

    feed_stdin(&orchestrator, args.duration_secs).await;

    if args.record.is_some() {
        match orchestrator.recoil().stop_pattern_recording(true) {
            Ok(pattern) => info!(
                "Saved pattern '{}' with {} samples",
                pattern.name,
                pattern.samples.len()
            ),
            Err(e) => warn!("Failed to save recorded pattern: {}", e),
        }
    }

    let status = orchestrator.status();
    let stats = orchestrator.stats();
    orchestrator
        .dispose()
        .await
        .map_err(|e| eyre!("Failed to shut down cleanly: {}", e))?;

    println!("{status}");
    println!(
        "Ticks: {} submitted, {} skipped, {} failed | Events: {} applied, {} dropped",
        stats.submitted, stats.skipped, stats.failed, stats.events_applied, stats.events_dropped
    );
    Ok(())
}

/// Feeds stdin events until input ends (without a duration), the duration
/// elapses, or ctrl-c
async fn feed_stdin(orchestrator: &Orchestrator, duration_secs: Option<u64>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut changes = orchestrator.subscribe_modes();

    let deadline = async move {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = &mut deadline => {
                info!("Run duration elapsed");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => feed_line(orchestrator, &line),
                Ok(None) => {
                    stdin_open = false;
                    if duration_secs.is_none() {
                        info!("End of input");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            Ok(change) = changes.recv() => {
                info!("Mode is now {} (was {})", change.current, change.previous);
            }
        }
    }
}

fn feed_line(orchestrator: &Orchestrator, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }
    match serde_json::from_str::<InputEvent>(line) {
        Ok(event) => {
            let suppressed = orchestrator.submit_event(event);
            debug!("{:?} (suppress: {})", event, suppressed);
        }
        Err(e) => warn!("Ignoring malformed event '{}': {}", line, e),
    }
}

fn mode_command(config: AppConfig, action: ModeCommand) -> Result<()> {
    let orchestrator = Orchestrator::builder(config)
        .build()
        .map_err(|e| eyre!("Failed to set up mode service: {}", e))?;
    let modes = orchestrator.modes();

    let change = match action {
        ModeCommand::Show => {
            println!("{}", orchestrator.status());
            return Ok(());
        }
        ModeCommand::Cycle => modes.toggle(),
        ModeCommand::Set { mode } => modes.switch(mode),
    }
    .map_err(|e| eyre!("Mode change rejected: {}", e))?;

    if change.changed() {
        println!("{} -> {}", change.previous, change.current);
    } else {
        println!("Already in {}", change.current);
    }
    Ok(())
}

fn pattern_command(config: AppConfig, action: PatternCommand) -> Result<()> {
    let repository = Arc::new(JsonPatternRepository::new(config.paths.pattern_dir.clone()));
    let engine = AntiRecoilEngine::new(config.anti_recoil, repository);

    match action {
        PatternCommand::List => {
            let names = engine
                .list_patterns()
                .map_err(|e| eyre!("Failed to list patterns: {}", e))?;
            if names.is_empty() {
                println!("No patterns in {}", config.paths.pattern_dir.display());
            }
            for name in names {
                println!("{name}");
            }
        }
        PatternCommand::Show { name } => {
            let pattern = engine
                .load_pattern(&name)
                .map_err(|e| eyre!("Failed to load pattern: {}", e))?;
            let json = serde_json::to_string_pretty(&pattern)
                .map_err(|e| eyre!("Failed to render pattern: {}", e))?;
            println!("{json}");
        }
        PatternCommand::Simulate { name } => {
            let result = engine
                .simulate_named(&name)
                .map_err(|e| eyre!("Failed to simulate pattern: {}", e))?;
            println!("{:>4} {:>8} {:>8} {:>8} {:>8} {:>8}", "#", "in dx", "in dy", "out dx", "out dy", "comp");
            for (index, sample) in result.samples.iter().enumerate() {
                println!(
                    "{:>4} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2}",
                    index + 1,
                    sample.input_dx,
                    sample.input_dy,
                    sample.output_dx,
                    sample.output_dy,
                    sample.compensation_y
                );
            }
            println!(
                "Vertical: {:.2} in, {:.2} out, {:.2} compensated ({:.0}%), peak {:.2}",
                result.total_input_dy,
                result.total_output_dy,
                result.total_compensation,
                result.reduction() * 100.0,
                result.peak_compensation
            );
        }
        PatternCommand::Rename { old, new } => {
            engine
                .rename_pattern(&old, &new)
                .map_err(|e| eyre!("Failed to rename pattern: {}", e))?;
            println!("Renamed '{old}' to '{new}'");
        }
        PatternCommand::Delete { name } => {
            engine
                .delete_pattern(&name)
                .map_err(|e| eyre!("Failed to delete pattern: {}", e))?;
            println!("Deleted '{name}'");
        }
    }
    Ok(())
}
