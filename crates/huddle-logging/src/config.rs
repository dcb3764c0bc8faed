//! Logging configuration
//!
//! [`LogConfig`] is plain data so it can sit in a TOML file next to the
//! presence config. The presets cover the three ways a Huddle client runs:
//! a developer terminal, a shipped build writing to disk, and tests.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level applied when `RUST_LOG` is unset
    pub default_level: String,
    pub console: ConsoleConfig,
    /// Log file sink, off unless set
    pub file: Option<FileConfig>,
    /// Shape of JSON records (console in JSON mode, and the file sink)
    pub jsonl: JsonlConfig,
    /// Per-target level overrides, e.g. `huddle_presence = "trace"`
    pub targets: HashMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            console: ConsoleConfig::default(),
            file: None,
            jsonl: JsonlConfig::default(),
            targets: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// Colored human-readable console at debug
    pub fn development() -> Self {
        Self {
            default_level: "debug".into(),
            console: ConsoleConfig::pretty(),
            ..Self::default()
        }
    }

    /// JSON lines into daily files under `log_dir`, nothing on the console
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: ConsoleConfig::disabled(),
            file: Some(FileConfig::in_dir(log_dir)),
            ..Self::default()
        }
    }

    /// Warnings and errors only, uncolored
    pub fn testing() -> Self {
        Self {
            default_level: "warn".into(),
            ..Self::default()
        }
    }

    /// Override the level for one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// Filter directives in `EnvFilter` syntax: the default level followed
    /// by the target overrides, sorted so output is stable
    pub fn filter_directives(&self) -> String {
        let mut targets: Vec<_> = self.targets.iter().collect();
        targets.sort();

        let mut directives = vec![self.default_level.clone()];
        directives.extend(targets.into_iter().map(|(t, l)| format!("{}={}", t, l)));
        directives.join(",")
    }
}

/// How records are rendered on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-field human-readable lines
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: ConsoleFormat,
    /// Color escapes; only honored by the pretty format
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Json,
            ansi: false,
        }
    }
}

impl ConsoleConfig {
    pub fn pretty() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Pretty,
            ansi: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub(crate) fn wants(&self, format: ConsoleFormat) -> bool {
        self.enabled && self.format == format
    }
}

/// Where the file sink writes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name stem; rolled files get a date suffix
    pub prefix: String,
    pub rotation: RotationStrategy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self::in_dir(PathBuf::from("./logs"))
    }
}

impl FileConfig {
    /// Daily `huddle.*` files in `directory`
    pub fn in_dir(directory: PathBuf) -> Self {
        Self {
            directory,
            prefix: "huddle".into(),
            rotation: RotationStrategy::Daily,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// One file, truncated when the sink opens
    Never,
}

/// Fields of each JSON record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Event fields at the top level instead of under `fields`
    pub flatten_events: bool,
    /// The chain of enclosing spans under `spans`
    pub include_spans: bool,
    /// Source file and line
    pub include_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
        }
    }
}
