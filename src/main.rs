use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use resonance::config::{LoggingConfig, ResonanceConfig};
use resonance::monitor::{CsvSink, EventSink, RunOutcome, TickSink};

#[derive(Parser)]
#[command(
    name = "resonance",
    about = "Isolation-forest anomaly watchdog for host vital signs",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML). Without it: $RESONANCE_CONFIG, /etc/resonance/resonance.toml,
    /// then built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream every tick as CSV (timestamp,status,score,cpu,jitter,memory,state)
    Stream,

    /// Production watch: silent until the watchdog fires, then JSON event lines
    Watch {
        /// Stop the process (exit status 1) on a critical threat
        #[arg(long)]
        halt: bool,
    },

    /// Run the synthetic sine-wave demo
    Demo {
        /// Seed for signal generation and model fitting
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Load the configuration under a temporary stderr subscriber so load and
/// fallback diagnostics are not lost before the configured one is installed.
fn load_config(path: Option<&Path>) -> Result<ResonanceConfig> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(bootstrap, || match path {
        Some(path) => ResonanceConfig::load(path),
        None => Ok(ResonanceConfig::load_or_default()),
    })
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Stream => {
            tracing::info!("Starting CSV stream");
            let mut sink = CsvSink::new(std::io::stdout());
            return watch(&config, &mut sink).await;
        }
        Commands::Watch { halt } => {
            config.watchdog.halt_on_critical |= halt;
            tracing::info!(
                halt = config.watchdog.halt_on_critical,
                trigger = %config.simulation.trigger_file.display(),
                "Production watch started"
            );
            let mut sink = EventSink::new(std::io::stdout());
            return watch(&config, &mut sink).await;
        }
        Commands::Demo { seed } => {
            println!(">>> RESONANCE CORE: SYSTEM STARTUP");
            println!(">>> Mode: Statistical (Isolation Forest)");
            let report = resonance::demo::run(&config, seed)?;

            println!("\n[1] Baseline learned ({} samples)", resonance::demo::SIGNAL_LENGTH);
            println!(
                "[2] Spike of {:+.1} injected at T={}..{}",
                resonance::demo::SPIKE_OFFSET,
                resonance::demo::SPIKE.start,
                resonance::demo::SPIKE.end
            );
            println!(
                "[3] Analysis complete in {:.4} seconds (threshold {:.4})",
                report.elapsed.as_secs_f64(),
                report.threshold
            );
            println!("\n[4] REPORT:");
            println!("    Total Time Steps:   {}", report.total_steps());
            println!("    Anomalies Detected: {}", report.anomalies());
            match report.first_detection() {
                Some(first) => {
                    println!("    First Detection at: T={}", first);
                    println!(
                        "\n--- VISUALIZATION (Time Steps {}-{}) ---",
                        resonance::demo::CHART_RANGE.start,
                        resonance::demo::CHART_RANGE.end
                    );
                    print!("{}", report.chart(resonance::demo::CHART_RANGE));
                }
                None => println!("    No anomalies detected."),
            }

            if !report.events.is_empty() {
                println!("\n--- WATCHDOG EVENTS ---");
                for event in &report.events {
                    println!(
                        "{:<8} {:<18} score={:.4}  {}",
                        format!("{:?}", event.severity()).to_uppercase(),
                        event.kind(),
                        event.score(),
                        event.message()
                    );
                }
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn watch(config: &ResonanceConfig, sink: &mut dyn TickSink) -> Result<ExitCode> {
    let mut monitor = resonance::build_monitor(config)?;
    let interval = Duration::from_millis(config.simulation.interval_ms);
    match monitor.run(interval, sink, None).await? {
        RunOutcome::HaltRequested => {
            tracing::error!("Critical threat: halting");
            Ok(ExitCode::from(1))
        }
        RunOutcome::Interrupted | RunOutcome::Completed => Ok(ExitCode::SUCCESS),
    }
}
