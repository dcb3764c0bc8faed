use std::time::Duration;

use clap::Parser;
use huddle_logging::{HuddleSubscriberBuilder, LogConfig};

mod cli;
mod console;
mod scenario;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.json {
        LogConfig::default()
    } else {
        LogConfig::development()
    };
    let _guard = HuddleSubscriberBuilder::new()
        .with_config(log_config)
        .with_level(cli.log_level.as_str())
        .try_init()?;

    match cli.command {
        Command::Walk {
            steps,
            step_meters,
            pace_ms,
            threshold,
            config,
        } => {
            let mut presence = scenario::load_config(config.as_deref())?;
            if let Some(meters) = threshold {
                presence = presence.with_max_distance_alert(meters);
            }
            scenario::walk(steps, step_meters, Duration::from_millis(pace_ms), presence).await?;
        }

        Command::Group { name } => scenario::group(&name).await?,

        Command::Config { config } => {
            let presence = scenario::load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&presence)?);
        }
    }

    Ok(())
}
