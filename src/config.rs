use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Process-wide configuration, loaded once at startup and immutable thereafter.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub webhook: WebhookConfig,
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default = "default_redis_config")]
    pub redis: RedisConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
    #[serde(default = "default_throttle_config")]
    pub throttle: ThrottleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Chats that receive startup/shutdown notifications.
    #[serde(default)]
    pub admin_chat_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Base path of the webhook route. The bot token is appended as the final
    /// path segment, so the served route is `{path}/{token}`.
    #[serde(default = "default_webhook_path")]
    pub path: String,
    /// Public HTTPS URL registered with Telegram. Must resolve to the served
    /// route, token segment included.
    pub public_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThrottleConfig {
    /// Messages a single user may send within one window.
    #[serde(default = "default_max_messages")]
    pub max_messages: i64,
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_redis_url() -> String {
    "redis://127.0.0.1/".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("relaybot.db")
}

fn default_max_messages() -> i64 {
    5
}

fn default_window_secs() -> i64 {
    10
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_redis_config() -> RedisConfig {
    RedisConfig {
        url: default_redis_url(),
    }
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        database_path: default_db_path(),
    }
}

fn default_throttle_config() -> ThrottleConfig {
    ThrottleConfig {
        max_messages: default_max_messages(),
        window_secs: default_window_secs(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.telegram.bot_token.is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }

        Ok(config)
    }

    /// Socket address string the webhook server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [telegram]
        bot_token = "123:abc"

        [webhook]
        public_url = "https://bot.example.com/webhook/123:abc"
    "#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.webhook.path, "/webhook");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.redis.url, "redis://127.0.0.1/");
        assert_eq!(config.storage.database_path, PathBuf::from("relaybot.db"));
        assert_eq!(config.throttle.max_messages, 5);
        assert_eq!(config.throttle.window_secs, 10);
        assert!(config.telegram.admin_chat_ids.is_empty());
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            admin_chat_ids = [42, -100123]

            [webhook]
            path = "/hooks/telegram"
            public_url = "https://bot.example.com/hooks/telegram/123:abc"

            [server]
            host = "0.0.0.0"
            port = 9090

            [throttle]
            max_messages = 2
            window_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.webhook.path, "/hooks/telegram");
        assert_eq!(config.telegram.admin_chat_ids, vec![42, -100123]);
        assert_eq!(config.bind_addr(), "0.0.0.0:9090");
        assert_eq!(config.throttle.max_messages, 2);
    }

    #[test]
    fn test_missing_public_url_is_an_error() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"

            [webhook]
            "#,
        );
        assert!(result.is_err());
    }
}
