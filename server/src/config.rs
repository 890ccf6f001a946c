use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Tutorlink messaging server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "tutorlink-server", version, about = "Tutorlink messaging server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "TUTORLINK_PORT", default_value = "8970")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "TUTORLINK_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./tutorlink.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "TUTORLINK_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys)
    #[arg(long, env = "TUTORLINK_DATA_DIR", default_value = "./data")]
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8970,
            bind_address: "0.0.0.0".to_string(),
            config: "./tutorlink.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (TUTORLINK_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("TUTORLINK_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Tutorlink Messaging Server Configuration
# Place this file at ./tutorlink.toml or specify with --config <path>
# All settings can be overridden via environment variables (TUTORLINK_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8970)
# port = 8970

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"
"#
    .to_string()
}
