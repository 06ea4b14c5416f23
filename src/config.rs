//! Configuration management for Fatbox

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::forward::Destination;

/// Litterbox retention used when a request does not pick one
pub const DEFAULT_TTL: &str = "1h";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub forward: ForwardConfig,
    pub backends: BackendsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root for per-session chunk directories
    pub uploads_dir: PathBuf,
    /// Where assembled and direct-upload artifacts live until forwarded
    pub temp_dir: PathBuf,
    /// Request body ceiling for upload endpoints
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    pub timeout_secs: u64,
    pub default_ttl: String,
}

impl ForwardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Upload and download addresses of one hosting backend
#[derive(Debug, Clone, Deserialize)]
pub struct BackendEndpoint {
    pub upload_url: String,
    /// Public host files are served from, with trailing slash
    pub download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendsConfig {
    pub pomf: BackendEndpoint,
    pub catbox: BackendEndpoint,
    pub litterbox: BackendEndpoint,
}

impl BackendsConfig {
    pub fn endpoint(&self, destination: Destination) -> &BackendEndpoint {
        match destination {
            Destination::Pomf => &self.pomf,
            Destination::Catbox => &self.catbox,
            Destination::Litterbox => &self.litterbox,
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        BackendsConfig {
            pomf: BackendEndpoint {
                upload_url: "https://pomf.lain.la/upload.php".to_string(),
                download_url: "https://pomf.lain.la/".to_string(),
            },
            catbox: BackendEndpoint {
                upload_url: "https://catbox.moe/user/api.php".to_string(),
                download_url: "https://files.catbox.moe/".to_string(),
            },
            litterbox: BackendEndpoint {
                upload_url: "https://litterbox.catbox.moe/resources/internals/api.php".to_string(),
                download_url: "https://litter.catbox.moe/".to_string(),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./fatbox.db".to_string(),
                max_connections: 10,
            },
            storage: StorageConfig {
                uploads_dir: PathBuf::from("/tmp/uploads"),
                temp_dir: PathBuf::from("/tmp/temp"),
                max_body_bytes: 1024 * 1024 * 1024,
            },
            forward: ForwardConfig {
                timeout_secs: 300,
                default_ttl: DEFAULT_TTL.to_string(),
            },
            backends: BackendsConfig::default(),
        }
    }
}

impl Config {
    /// Build the config from the environment. Unset or unparsable
    /// variables fall back to their defaults one by one.
    pub fn from_env() -> Self {
        let defaults = BackendsConfig::default();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./fatbox.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
            storage: StorageConfig {
                uploads_dir: env::var("UPLOADS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp/uploads")),
                temp_dir: env::var("TEMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp/temp")),
                max_body_bytes: env::var("MAX_BODY_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1024 * 1024 * 1024),
            },
            forward: ForwardConfig {
                timeout_secs: env::var("FORWARD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
                default_ttl: env::var("DEFAULT_TTL").unwrap_or_else(|_| DEFAULT_TTL.to_string()),
            },
            backends: BackendsConfig {
                pomf: endpoint_from_env("POMF", defaults.pomf),
                catbox: endpoint_from_env("CATBOX", defaults.catbox),
                litterbox: endpoint_from_env("LITTERBOX", defaults.litterbox),
            },
        }
    }
}

fn endpoint_from_env(prefix: &str, fallback: BackendEndpoint) -> BackendEndpoint {
    BackendEndpoint {
        upload_url: env::var(format!("{prefix}_UPLOAD_URL")).unwrap_or(fallback.upload_url),
        download_url: env::var(format!("{prefix}_DOWNLOAD_URL")).unwrap_or(fallback.download_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_keeps_overrides_without_database_url() {
        env::remove_var("DATABASE_URL");
        env::set_var("UPLOADS_DIR", "/srv/fatbox/uploads");
        env::set_var("SERVER_PORT", "8080");
        env::set_var("CATBOX_UPLOAD_URL", "http://catbox.internal/api.php");

        let config = Config::from_env();

        env::remove_var("UPLOADS_DIR");
        env::remove_var("SERVER_PORT");
        env::remove_var("CATBOX_UPLOAD_URL");

        assert_eq!(config.database.url, "sqlite:./fatbox.db");
        assert_eq!(config.storage.uploads_dir, PathBuf::from("/srv/fatbox/uploads"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backends.catbox.upload_url, "http://catbox.internal/api.php");
        assert_eq!(config.backends.pomf.upload_url, BackendsConfig::default().pomf.upload_url);
    }
}
