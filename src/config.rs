use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub redis: RedisConfig,
    pub chat: ChatConfig,
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string for the non-superuser application role. RLS policies
    /// bind to this role; the privileged role below is reserved for the init
    /// binary.
    pub url: String,
    pub max_connections: u32,
    /// Privileged connection string, used only for migrations and
    /// ownership-level DDL.
    pub admin_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub url: String,
    /// DLQ drain cadence for the retry daemon.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub bot_token: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Coarse re-query cadence when no LISTEN notification arrives.
    pub safety_tick_secs: u64,
    /// Chat-message edit coalescing window. Empirically tuned, not a contract.
    pub edit_window_ms: u64,
    pub session_ttl_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            safety_tick_secs: 60,
            edit_window_ms: 1500,
            session_ttl_secs: 7 * 24 * 3600,
        }
    }
}

fn default_retry_interval() -> u64 {
    900
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".into()
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=10&encoding=json".into()
}

fn default_authorize_url() -> String {
    "https://discord.com/oauth2/authorize".into()
}

fn default_request_timeout() -> u64 {
    10
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("GAMENIGHT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
