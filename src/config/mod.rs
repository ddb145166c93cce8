use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub catalog: CatalogConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub delegate: DelegateConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_seconds: u64,
    pub fetch_concurrency: usize,
    pub requests_per_second: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Hours before a cached response is stale; zero or negative never expires
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub batch_size: usize,
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_k: usize,
    pub max_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl CacheConfig {
    /// TTL as a duration, or `None` when expiry is disabled
    pub fn ttl(&self) -> Option<Duration> {
        if self.ttl_hours <= 0 {
            None
        } else {
            Some(Duration::from_secs((self.ttl_hours as u64).saturating_mul(3600)))
        }
    }
}

impl CatalogConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn env_or<T: FromStr>(name: &str, default: &str) -> Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| Error::Config(format!("Invalid {name} value")))
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("THEMEALDB_BASE_URL")
            .unwrap_or_else(|_| "https://www.themealdb.com/api/json/v1".to_string());
        let api_key = std::env::var("THEMEALDB_API_KEY").unwrap_or_else(|_| "1".to_string());

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./data/meals.db".to_string());

        let cache_dir = std::env::var("CACHE_DIR")
            .unwrap_or_else(|_| "./cache".to_string())
            .into();

        let snapshot_path = std::env::var("SNAPSHOT_PATH")
            .unwrap_or_else(|_| "./data/meals.json".to_string())
            .into();

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let delegate_url = std::env::var("ANSWER_SERVICE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let delegate_key = std::env::var("ANSWER_SERVICE_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let model = std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| "openai:gpt-4o".to_string());

        Ok(Settings {
            catalog: CatalogConfig {
                base_url,
                api_key,
                request_timeout_seconds: env_or("REQUEST_TIMEOUT", "30")?,
                fetch_concurrency: env_or("FETCH_CONCURRENCY", "4")?,
                requests_per_second: env_or("RATE_LIMIT", "5")?,
                user_agent: format!("mealrag/{}", env!("CARGO_PKG_VERSION")),
            },
            cache: CacheConfig {
                dir: cache_dir,
                ttl_hours: env_or("CACHE_EXPIRY_HOURS", "24")?,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", "5")?,
                connection_timeout_seconds: env_or("DATABASE_CONNECTION_TIMEOUT", "30")?,
            },
            index: IndexConfig {
                batch_size: env_or("INDEX_BATCH_SIZE", "100")?,
                snapshot_path,
            },
            retrieval: RetrievalConfig {
                default_k: env_or("DEFAULT_K", "5")?,
                max_k: env_or("MAX_K", "50")?,
            },
            delegate: DelegateConfig {
                url: delegate_url,
                api_key: delegate_key,
                model,
            },
            server: ServerConfig {
                host,
                port: env_or("PORT", "3000")?,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.catalog.base_url)
            .map_err(|e| Error::Config(format!("Invalid THEMEALDB_BASE_URL: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Config(
                "Catalog base URL must use http or https".to_string(),
            ));
        }

        if self.catalog.api_key.trim().is_empty() {
            return Err(Error::Config("Catalog API key must not be empty".to_string()));
        }

        if self.cache.ttl_hours > 0 && (self.cache.ttl_hours as u64).checked_mul(3600).is_none() {
            return Err(Error::Config(format!(
                "CACHE_EXPIRY_HOURS ({}) is out of range",
                self.cache.ttl_hours
            )));
        }

        if self.catalog.fetch_concurrency == 0 {
            return Err(Error::Config("Fetch concurrency must be non-zero".to_string()));
        }

        if self.catalog.requests_per_second == 0 {
            return Err(Error::Config("Rate limit must be non-zero".to_string()));
        }

        if self.index.batch_size == 0 {
            return Err(Error::Config("Index batch size must be non-zero".to_string()));
        }

        if self.retrieval.default_k == 0 || self.retrieval.max_k == 0 {
            return Err(Error::Config("Context counts must be non-zero".to_string()));
        }

        if self.retrieval.default_k > self.retrieval.max_k {
            return Err(Error::Config(format!(
                "DEFAULT_K ({}) exceeds MAX_K ({})",
                self.retrieval.default_k, self.retrieval.max_k
            )));
        }

        if self.server.port == 0 {
            return Err(Error::Config("Port must be non-zero".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_settings(root: &std::path::Path, base_url: &str) -> Settings {
    Settings {
        catalog: CatalogConfig {
            base_url: base_url.to_string(),
            api_key: "1".to_string(),
            request_timeout_seconds: 5,
            fetch_concurrency: 4,
            requests_per_second: 1000,
            user_agent: "test".to_string(),
        },
        cache: CacheConfig {
            dir: root.join("cache"),
            ttl_hours: 24,
        },
        database: DatabaseConfig {
            url: format!("sqlite:{}", root.join("meals.db").display()),
            max_connections: 5,
            connection_timeout_seconds: 30,
        },
        index: IndexConfig {
            batch_size: 100,
            snapshot_path: root.join("meals.json"),
        },
        retrieval: RetrievalConfig {
            default_k: 5,
            max_k: 50,
        },
        delegate: DelegateConfig {
            url: None,
            api_key: None,
            model: "openai:gpt-4o".to_string(),
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(dir.path(), "https://www.themealdb.com/api/json/v1");

        assert!(settings.validate().is_ok());

        settings.server.port = 0;
        assert!(settings.validate().is_err());
        settings.server.port = 3000;

        settings.retrieval.default_k = 80;
        assert!(settings.validate().is_err());
        settings.retrieval.default_k = 5;

        settings.catalog.base_url = "ftp://example.com".to_string();
        assert!(settings.validate().is_err());
        settings.catalog.base_url = "https://www.themealdb.com/api/json/v1".to_string();

        settings.cache.ttl_hours = i64::MAX;
        assert!(settings.validate().is_err());
        settings.cache.ttl_hours = -1;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_cache_ttl() {
        let mut cache = CacheConfig {
            dir: "/tmp/cache".into(),
            ttl_hours: 2,
        };
        assert_eq!(cache.ttl(), Some(Duration::from_secs(7200)));

        cache.ttl_hours = 0;
        assert_eq!(cache.ttl(), None);

        cache.ttl_hours = -3;
        assert_eq!(cache.ttl(), None);

        cache.ttl_hours = i64::MAX;
        assert!(cache.ttl().is_some());
    }
}
