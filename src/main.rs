use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use autofire::config::parse_duration;
use autofire::{AutomationEngine, Config, ConsoleSender, EngineState};

#[derive(Parser, Debug)]
#[command(
    name = "autofire",
    version,
    about = "Fire configured actions on independent intervals (dry-run console delivery)"
)]
struct Cli {
    /// Path to the JSON configuration file.
    config: PathBuf,

    /// Stop automatically after this long (e.g. "30s", "5m").
    #[arg(long)]
    run_for: Option<String>,

    /// How long to wait for the worker on shutdown.
    #[arg(long, default_value = "5s")]
    stop_timeout: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.to_string_lossy().to_string();
    let config = Config::from_file(&config_path)?;
    config.validate()?;

    let default_level = if cli.verbose || config.verbose {
        "autofire=debug"
    } else {
        "autofire=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let run_for = cli
        .run_for
        .as_deref()
        .map(parse_duration)
        .transpose()
        .context("invalid --run-for value")?;
    let stop_timeout = parse_duration(&cli.stop_timeout).context("invalid --stop-timeout value")?;

    println!(
        "{} loaded {} action(s) from {}",
        "▶".green(),
        config.actions.len(),
        config_path.cyan()
    );
    for entry in &config.actions {
        let marker = if entry.enabled {
            "•".green()
        } else {
            "•".dimmed()
        };
        println!("  {marker} {} every {:?}", entry.id.bold(), entry.interval);
    }

    let engine = Arc::new(AutomationEngine::new(Arc::new(ConsoleSender)));
    engine.register_state_callback(|old, new| {
        println!("{} engine: {} → {}", "∙".blue(), old, new);
    });

    engine.configure(config.actions(), config.settings())?;
    engine.start().await?;

    match run_for {
        Some(duration) => {
            println!(
                "{} running for {:?}, press Ctrl+C to stop earlier",
                "▶".green(),
                duration
            );
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = tokio::signal::ctrl_c() => {
                    println!("\n{} interrupt received", "⏸".yellow());
                }
            }
        }
        None => {
            println!("{} running, press Ctrl+C to stop", "▶".green());
            tokio::signal::ctrl_c().await?;
            println!("\n{} interrupt received", "⏸".yellow());
        }
    }

    if engine.state() != EngineState::Stopped {
        engine.stop(stop_timeout).await?;
    }

    let stats = engine.stats();
    println!();
    println!("{}", "Execution summary".bold());
    println!("  total firings:  {}", stats.total);
    println!("  succeeded:      {}", stats.succeeded.to_string().green());
    println!("  failed:         {}", stats.failed.to_string().red());
    println!("  success rate:   {:.1}%", stats.success_rate * 100.0);
    if stats.rate_limited > 0 {
        println!(
            "  errors dropped by rate limit: {}",
            stats.rate_limited.to_string().yellow()
        );
    }
    if !stats.recent_errors.is_empty() {
        println!("  recent errors:");
        for message in stats.recent_errors.iter().rev().take(5) {
            println!("    {}", message.dimmed());
        }
    }

    Ok(())
}
