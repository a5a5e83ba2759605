use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Readalong reading room server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "readalong-server", version, about = "Synchronized reading room server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "READALONG_PORT", default_value = "4020")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "READALONG_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./readalong.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "READALONG_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys)
    #[arg(long, env = "READALONG_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Room policy knobs (loaded from [rooms] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub rooms: RoomPolicy,
}

/// Tunables for room capacity and participant lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomPolicy {
    /// Capacity used when a room is created without one (default: 8)
    #[serde(default = "default_capacity")]
    pub default_capacity: i64,

    /// Hard upper bound on a room's capacity (default: 64)
    #[serde(default = "default_max_capacity")]
    pub max_capacity: i64,

    /// Seconds a DISCONNECTED participant keeps their seat before the sweep
    /// converts them to EXITED (default: 300)
    #[serde(default = "default_grace")]
    pub disconnect_grace_secs: u64,

    /// Interval in seconds between disconnect sweep runs (default: 30)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Whether a participant who voluntarily EXITED may rejoin without a
    /// fresh invitation (default: false — rejoin requires an invitation)
    #[serde(default)]
    pub allow_rejoin_after_exit: bool,

    /// Seconds to wait for a room's exclusive lock before failing the
    /// request as retryable Busy (default: 5)
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

impl Default for RoomPolicy {
    fn default() -> Self {
        Self {
            default_capacity: 8,
            max_capacity: 64,
            disconnect_grace_secs: 300,
            sweep_interval_secs: 30,
            allow_rejoin_after_exit: false,
            lock_timeout_secs: 5,
        }
    }
}

fn default_capacity() -> i64 {
    8
}

fn default_max_capacity() -> i64 {
    64
}

fn default_grace() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_lock_timeout() -> u64 {
    5
}

impl Config {
    /// Load config with layered precedence: defaults < TOML file < env < CLI.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let cli = Config::parse();

        let figment = Figment::new()
            .merge(Serialized::defaults(&cli))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("READALONG_"));

        let config: Config = figment.extract()?;
        Ok(config)
    }
}

/// Commented TOML template printed by --generate-config.
pub fn generate_config_template() -> String {
    r#"# readalong-server configuration

# Port to listen on
port = 4020

# Bind address
bind_address = "0.0.0.0"

# Data directory for persistent state (DB, keys)
data_dir = "./data"

# Structured JSON logging (for Docker/production)
json_logs = false

[rooms]
# Capacity used when a room is created without one
default_capacity = 8

# Hard upper bound on a room's capacity
max_capacity = 64

# Seconds a disconnected participant keeps their seat before being exited
disconnect_grace_secs = 300

# Interval in seconds between disconnect sweep runs
sweep_interval_secs = 30

# Whether a participant who voluntarily left may rejoin without an invitation
allow_rejoin_after_exit = false

# Seconds to wait for a room's exclusive lock before failing as busy
lock_timeout_secs = 5
"#
    .to_string()
}
