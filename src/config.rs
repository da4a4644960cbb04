use crate::service::matcher::MatchStrategy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// 价格库 JSON 文件
    pub path: String,
    pub strategy: MatchStrategy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "data/price_db.json".to_string(),
            strategy: MatchStrategy::FirstHit,
        }
    }
}

/// 任务队列配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 最大并发执行数
    pub concurrency: usize,
    /// 滚动窗口内最多准入任务数
    pub rate_limit: usize,
    pub rate_window_secs: u64,
    /// 单任务计算超时
    pub job_timeout_secs: u64,
    /// 终态任务在任务表中的保留时长
    pub retention_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            rate_limit: 100,
            rate_window_secs: 60,
            job_timeout_secs: 300,
            retention_secs: 3600,
        }
    }
}

impl QueueConfig {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// 过期清理间隔，0 表示不启用后台清理
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 60 * 60,
            sweep_interval_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl AppConfig {
    /// 加载配置: 默认值 -> claim-audit.toml (可选) -> AUDIT_ 前缀环境变量
    ///
    /// 环境变量以 `__` 分隔层级，例如 `AUDIT_QUEUE__CONCURRENCY=4`。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(File::with_name("claim-audit").required(false))
    }

    /// 从指定文件加载 (文件必须存在)
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(File::with_name(path).required(true))
    }

    fn load<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = AppConfig::default();

        Config::builder()
            .add_source(Config::try_from(&defaults)?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("AUDIT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
