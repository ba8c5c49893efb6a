//! 统一配置中心
//!
//! 加载顺序：内置默认值 -> `APP_CONFIG_FILE` 指定的文件（按扩展名识别 TOML/YAML/JSON）
//! -> `APP_` 前缀的环境变量（`__` 表示嵌套，例如 `APP_SERVER__PORT=8080`）。

use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,
    /// 在线状态清理配置
    #[serde(default)]
    pub presence: PresenceConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 允许任意来源跨域访问
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            cors_permissive: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// 进程内存储，重启后数据丢失
    #[default]
    Memory,
    Postgres,
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: None,
            max_connections: 5,
        }
    }
}

/// 清理间隔和超时的上限（一天）
pub const MAX_PRESENCE_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub sweep_interval_secs: u64,
    /// 超过这个秒数没有心跳即视为离线
    pub timeout_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 10,
            timeout_secs: 10,
        }
    }
}

impl PresenceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            figment = if path.ends_with(".yml") || path.ends_with(".yaml") {
                figment.merge(Yaml::file(path))
            } else if path.ends_with(".json") {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }
        Self::from_figment(figment.merge(Env::prefixed("APP_").split("__")))
    }

    /// 从任意 figment 提取并验证配置
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "host cannot be empty".into(),
            ));
        }

        if self.storage.backend == StorageBackend::Postgres
            && self
                .storage
                .url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(ConfigError::InvalidStorageConfig(
                "postgres backend requires storage.url".into(),
            ));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::InvalidStorageConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        if !(1..=MAX_PRESENCE_SECS).contains(&self.presence.sweep_interval_secs) {
            return Err(ConfigError::InvalidPresenceConfig(format!(
                "sweep_interval_secs must be between 1 and {MAX_PRESENCE_SECS}"
            )));
        }
        if !(1..=MAX_PRESENCE_SECS).contains(&self.presence.timeout_secs) {
            return Err(ConfigError::InvalidPresenceConfig(format!(
                "timeout_secs must be between 1 and {MAX_PRESENCE_SECS}"
            )));
        }

        Ok(())
    }

    /// 用于日志输出，隐藏数据库连接串中的凭据
    pub fn sanitized_storage_url(&self) -> Option<String> {
        let url = self.storage.url.as_deref()?;
        Some(match (url.find("://"), url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}[REDACTED]{}", &url[..scheme_end + 3], &url[at..])
            }
            _ => url.to_owned(),
        })
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid storage configuration: {0}")]
    InvalidStorageConfig(String),
    #[error("Invalid presence configuration: {0}")]
    InvalidPresenceConfig(String),
}
