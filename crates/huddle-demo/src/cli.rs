use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "huddle-demo", about = "Replay a scripted walk through the Huddle presence engine")]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit JSONL logs instead of pretty console output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Walk away from two friends and watch the proximity alert fire
    Walk {
        /// Number of fixes to replay
        #[arg(long, default_value_t = 12)]
        steps: u32,
        /// Meters walked north between fixes
        #[arg(long, default_value_t = 60.0)]
        step_meters: f64,
        /// Delay between fixes in milliseconds
        #[arg(long, default_value_t = 250)]
        pace_ms: u64,
        /// Alert threshold in meters (overrides the config file)
        #[arg(long)]
        threshold: Option<f64>,
        /// TOML presence config
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Create a group and have a friend join it by code
    Group {
        /// Group name
        #[arg(default_value = "Friday night")]
        name: String,
    },
    /// Print the effective presence config (file, then HUDDLE_* overrides)
    Config {
        /// TOML presence config
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
