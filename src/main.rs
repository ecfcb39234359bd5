use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codex_perfmon::config::{create_sample_env_file, Config};
use codex_perfmon::monitoring::{
    InMemoryCacheStats, InMemoryDatabaseStats, PerformanceAlert, PerformanceMonitor,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "codex-perfmon")]
#[command(about = "Performance monitoring and alerting engine")]
#[command(version)]
struct Cli {
    /// TOML config file; environment variables still override it
    #[arg(long, global = true, env = "PERFMON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor this process and print metrics every collection interval
    Watch {
        /// Stop after this many reports
        #[arg(long)]
        iterations: Option<u64>,
        /// Print the snapshot as JSON instead of metrics text
        #[arg(long)]
        json: bool,
    },
    /// Collect once and print the metrics text
    Export,
    /// Print the resolved configuration
    Config,
    /// Generate sample .env configuration file
    InitConfig {
        #[arg(long, default_value = ".env.example")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config);

    match cli.command {
        Commands::Watch { iterations, json } => watch(config, iterations, json).await,
        Commands::Export => {
            let monitor = standalone_monitor(&config)?;
            monitor.collect_now().await;
            println!("{}", monitor.export_prometheus_metrics());
            Ok(())
        }
        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
        Commands::InitConfig { output } => {
            create_sample_env_file(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Created {}", output.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            dotenv::dotenv().ok();
            let mut config = Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides()?;
            config
        }
        None => Config::from_env()?,
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_logging(config: &Config) {
    let json = config.operational.log_json;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.operational.log_level.clone().into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Engine wired to in-memory collaborators, reporting on this process only
fn standalone_monitor(config: &Config) -> Result<PerformanceMonitor> {
    let monitor = PerformanceMonitor::new(
        config.monitor.clone(),
        Arc::new(InMemoryDatabaseStats::new()),
        Arc::new(InMemoryCacheStats::new()),
    )?;
    Ok(monitor)
}

async fn watch(config: Config, iterations: Option<u64>, json: bool) -> Result<()> {
    let monitor = standalone_monitor(&config)?;
    monitor.on_alert(|alert: &PerformanceAlert| {
        println!(
            "[{}] {} {}: {}",
            alert.timestamp.to_rfc3339(),
            alert.severity,
            alert.category,
            alert.message
        );
    });

    monitor.start().await;

    let period = Duration::from_millis(monitor.config().collect_interval_ms);
    let mut ticker = tokio::time::interval(period);
    let mut reports = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&monitor.get_metrics())?);
                } else {
                    println!("{}\n", monitor.export_prometheus_metrics());
                }

                reports += 1;
                if iterations.is_some_and(|limit| reports >= limit) {
                    break;
                }
            }
        }
    }

    monitor.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_flag_applies_to_every_command() {
        let cli = Cli::try_parse_from(["codex-perfmon", "config", "--config", "perfmon.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("perfmon.toml")));
        assert!(matches!(cli.command, Commands::Config));

        let cli = Cli::try_parse_from(["codex-perfmon", "--config", "a.toml", "export"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
        assert!(matches!(cli.command, Commands::Export));
    }
}
