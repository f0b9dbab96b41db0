use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for vpn-steward
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VpnStewardConfig {
    /// Chat transport credential (held for a chat adapter; unused by the console transport)
    pub bot: BotConfig,
    /// Admin roster settings
    pub admins: AdminsConfig,
    /// External certificate script settings
    pub executor: ExecutorConfig,
    /// Client record database settings
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    /// Bot token (can be set via env var)
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminsConfig {
    /// Caller id of the single superadmin
    pub superadmin_id: i64,
    /// Display name for the superadmin in listings
    pub superadmin_name: String,
    /// Regular admin caller ids
    pub admin_ids: Vec<i64>,
    /// Display names, parallel to `admin_ids`
    pub admin_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Path to the certificate management script
    pub script_path: String,
    /// Working directory the script is invoked from
    pub working_dir: String,
    /// Directory where the script drops generated .ovpn bundles
    pub artifact_dir: String,
    /// Upper bound on a single script invocation
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file path or connection string
    pub url: String,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for VpnStewardConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig { token: None },
            admins: AdminsConfig {
                superadmin_id: 0,
                superadmin_name: "Superadmin".to_string(),
                admin_ids: Vec::new(),
                admin_names: Vec::new(),
            },
            executor: ExecutorConfig {
                script_path: "./openvpn-install.sh".to_string(),
                working_dir: ".".to_string(),
                artifact_dir: "/root".to_string(),
                timeout_seconds: 120,
            },
            database: DatabaseConfig {
                url: "sqlite:vpn-steward.db".to_string(),
                auto_migrate: true,
            },
        }
    }
}

impl VpnStewardConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. vpn-steward.toml
    /// 3. Environment variables (prefixed with VPN_STEWARD_)
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&VpnStewardConfig::default())?;

        let mut builder = Config::builder().add_source(defaults);

        if Path::new("vpn-steward.toml").exists() {
            builder = builder.add_source(File::with_name("vpn-steward"));
        }

        builder = builder.add_source(
            Environment::with_prefix("VPN_STEWARD")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut steward_config: VpnStewardConfig = config.try_deserialize()?;

        // The original deployment surface used bare env vars; honor them as overrides.
        if steward_config.bot.token.is_none() {
            if let Ok(token) = std::env::var("BOT_TOKEN") {
                steward_config.bot.token = Some(token);
            }
        }
        if let Ok(id) = std::env::var("SUPERADMIN_ID") {
            steward_config.admins.superadmin_id = id.trim().parse()?;
        }
        if let Ok(ids) = std::env::var("ADMIN_IDS") {
            steward_config.admins.admin_ids = ids
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().parse())
                .collect::<Result<Vec<i64>, _>>()?;
        }
        if let Ok(names) = std::env::var("ADMIN_NAMES") {
            steward_config.admins.admin_names =
                names.split(',').map(|s| s.trim().to_string()).collect();
        }

        Ok(steward_config)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<VpnStewardConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = VpnStewardConfig::load_env_file();
        VpnStewardConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static VpnStewardConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
