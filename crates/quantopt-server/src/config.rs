use quantopt_core::CoreConfig;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "quantopt.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub event_buffer_capacity: usize,
    pub autostart: bool,
    pub allow_command_objectives: bool,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    events: EventsSection,
    #[serde(default)]
    queue: QueueSection,
    #[serde(default)]
    objectives: ObjectivesSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventsSection {
    #[serde(default = "default_buffer_capacity")]
    buffer_capacity: usize,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueueSection {
    #[serde(default = "default_autostart")]
    autostart: bool,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            autostart: default_autostart(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ObjectivesSection {
    #[serde(default)]
    allow_command: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_buffer_capacity() -> usize {
    1024
}

fn default_autostart() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(FileConfig::default())
    }
}

impl From<FileConfig> for ServerConfig {
    fn from(file: FileConfig) -> Self {
        Self {
            host: file.server.host,
            port: file.server.port,
            event_buffer_capacity: file.events.buffer_capacity,
            autostart: file.queue.autostart,
            allow_command_objectives: file.objectives.allow_command,
        }
    }
}

impl ServerConfig {
    /// Load from `QUANTOPT_CONFIG` or `./quantopt.toml`, falling back to environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var("QUANTOPT_CONFIG").ok().or_else(|| {
            Path::new(DEFAULT_CONFIG_FILE)
                .exists()
                .then(|| DEFAULT_CONFIG_FILE.to_string())
        });

        match path {
            Some(path) => Self::load_from_file(Path::new(&path)),
            None => Ok(Self::from_env()),
        }
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path.display(), err))?;
        let parsed: FileConfig = toml::from_str(&contents)
            .map_err(|err| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), err))?;
        Ok(Self::from(parsed))
    }

    fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse_bool = |value: String| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        };

        let host = lookup("QUANTOPT_HOST").unwrap_or_else(default_host);
        let port = lookup("QUANTOPT_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or_else(default_port);
        let event_buffer_capacity = lookup("QUANTOPT_EVENT_BUFFER")
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or_else(default_buffer_capacity);
        let autostart = lookup("QUANTOPT_AUTOSTART")
            .map(parse_bool)
            .unwrap_or_else(default_autostart);
        let allow_command_objectives = lookup("QUANTOPT_ALLOW_COMMAND_OBJECTIVES")
            .map(parse_bool)
            .unwrap_or(false);

        Self {
            host,
            port,
            event_buffer_capacity,
            autostart,
            allow_command_objectives,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            event_buffer_capacity: self.event_buffer_capacity,
            allow_command_objectives: self.allow_command_objectives,
        }
    }
}
