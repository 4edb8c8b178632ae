//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use domain::TenantConfig;
use std::env;
use std::fmt;
use std::path::PathBuf;

const MAX_PATH_LENGTH: usize = 64;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("sqlite") {
            Self::Sqlite
        } else {
            Self::Memory
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    pub db_path: PathBuf,
    /// Log format
    pub log_format: LogFormat,
    /// Link issuing settings shared by every request
    pub tenant: TenantConfig,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port
        let port = var("PORT").and_then(|s| s.parse().ok()).unwrap_or(3001);

        // CORS allow origin
        let cors_origin_str = var("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let storage_provider =
            StorageProvider::from_str(&var("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into()));

        // DB path (for sqlite)
        let db_path = PathBuf::from(
            var("DB_PATH")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "./data/durablelinks.db".into()),
        );

        // Log format
        let log_format = LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        // Link scheme
        let url_scheme = var("URL_SCHEME")
            .unwrap_or_else(|| "https".into())
            .to_ascii_lowercase();
        if url_scheme != "http" && url_scheme != "https" {
            return Err(ConfigError {
                field: "URL_SCHEME",
                message: format!("Must be 'http' or 'https', got '{}'", url_scheme),
            });
        }

        // Allow-list for target links
        let domain_allow_list: Vec<String> = var("DOMAIN_ALLOW_LIST")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if domain_allow_list.is_empty() {
            return Err(ConfigError {
                field: "DOMAIN_ALLOW_LIST",
                message: "Required: comma-separated list of allowed target domains".into(),
            });
        }

        // Path lengths
        let short_path_length = path_length(&var, "SHORT_PATH_LENGTH", 4)?;
        let unguessable_path_length = path_length(&var, "UNGUESSABLE_PATH_LENGTH", 17)?;
        if unguessable_path_length < short_path_length {
            return Err(ConfigError {
                field: "UNGUESSABLE_PATH_LENGTH",
                message: format!(
                    "Must be at least SHORT_PATH_LENGTH ({}), got {}",
                    short_path_length, unguessable_path_length
                ),
            });
        }

        // Tenant defaults
        let default_ios_app_store_id = match var("DEFAULT_IOS_APP_STORE_ID").filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<u64>().map_err(|_| ConfigError {
                field: "DEFAULT_IOS_APP_STORE_ID",
                message: format!("Must be an unsigned integer, got '{}'", s),
            })?),
            None => None,
        };
        let default_android_package = var("DEFAULT_ANDROID_PACKAGE").filter(|s| !s.is_empty());

        Ok(Self {
            port,
            cors_allow_origin,
            storage_provider,
            db_path,
            log_format,
            tenant: TenantConfig {
                url_scheme,
                domain_allow_list,
                short_path_length,
                unguessable_path_length,
                default_ios_app_store_id,
                default_android_package,
            },
        })
    }

    /// Log warnings about risky configuration.
    pub fn warn_if_insecure(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: durable links are lost on restart.");
        }
        if self.tenant.short_path_length < 6 {
            tracing::warn!(
                short_path_length = self.tenant.short_path_length,
                "SHORT_PATH_LENGTH is small: short paths are easy to enumerate."
            );
        }
    }
}

fn path_length<F>(var: &F, field: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(field).filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<usize>() {
        Ok(n) if (1..=MAX_PATH_LENGTH).contains(&n) => Ok(n),
        _ => Err(ConfigError {
            field,
            message: format!("Must be an integer in 1..={}, got '{}'", MAX_PATH_LENGTH, raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn storage_provider_parsing() {
        assert_eq!(StorageProvider::from_str("memory"), StorageProvider::Memory);
        assert_eq!(StorageProvider::from_str("sqlite"), StorageProvider::Sqlite);
        assert_eq!(StorageProvider::from_str("SQLITE"), StorageProvider::Sqlite);
        assert_eq!(StorageProvider::from_str("anything"), StorageProvider::Memory);
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("anything"), LogFormat::Pretty);
    }

    #[test]
    fn defaults() {
        let cfg = load(&[("DOMAIN_ALLOW_LIST", "example.com")]).unwrap();
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.storage_provider, StorageProvider::Sqlite);
        assert_eq!(cfg.db_path, PathBuf::from("./data/durablelinks.db"));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.cors_allow_origin, HeaderValue::from_static("*"));
        assert_eq!(cfg.tenant.url_scheme, "https");
        assert_eq!(cfg.tenant.domain_allow_list, vec!["example.com".to_string()]);
        assert_eq!(cfg.tenant.short_path_length, 4);
        assert_eq!(cfg.tenant.unguessable_path_length, 17);
        assert_eq!(cfg.tenant.default_ios_app_store_id, None);
        assert_eq!(cfg.tenant.default_android_package, None);
    }

    #[test]
    fn full_configuration() {
        let cfg = load(&[
            ("PORT", "8080"),
            ("STORAGE_PROVIDER", "memory"),
            ("DB_PATH", "/tmp/links.db"),
            ("LOG_FORMAT", "json"),
            ("URL_SCHEME", "HTTP"),
            ("DOMAIN_ALLOW_LIST", " Example.com , ,other.org"),
            ("SHORT_PATH_LENGTH", "6"),
            ("UNGUESSABLE_PATH_LENGTH", "24"),
            ("DEFAULT_IOS_APP_STORE_ID", "123456789"),
            ("DEFAULT_ANDROID_PACKAGE", "com.example.app"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.storage_provider, StorageProvider::Memory);
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/links.db"));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.tenant.url_scheme, "http");
        assert_eq!(
            cfg.tenant.domain_allow_list,
            vec!["example.com".to_string(), "other.org".to_string()]
        );
        assert_eq!(cfg.tenant.short_path_length, 6);
        assert_eq!(cfg.tenant.unguessable_path_length, 24);
        assert_eq!(cfg.tenant.default_ios_app_store_id, Some(123456789));
        assert_eq!(cfg.tenant.default_android_package.as_deref(), Some("com.example.app"));
    }

    #[test]
    fn allow_list_is_required() {
        let err = load(&[]).unwrap_err();
        assert_eq!(err.field, "DOMAIN_ALLOW_LIST");
        let err = load(&[("DOMAIN_ALLOW_LIST", " , ")]).unwrap_err();
        assert_eq!(err.field, "DOMAIN_ALLOW_LIST");
    }

    #[test]
    fn invalid_values_fail_fast() {
        let base = ("DOMAIN_ALLOW_LIST", "example.com");
        let cases = [
            (("URL_SCHEME", "ftp"), "URL_SCHEME"),
            (("SHORT_PATH_LENGTH", "0"), "SHORT_PATH_LENGTH"),
            (("SHORT_PATH_LENGTH", "65"), "SHORT_PATH_LENGTH"),
            (("SHORT_PATH_LENGTH", "four"), "SHORT_PATH_LENGTH"),
            (("UNGUESSABLE_PATH_LENGTH", "3"), "UNGUESSABLE_PATH_LENGTH"),
            (("DEFAULT_IOS_APP_STORE_ID", "abc"), "DEFAULT_IOS_APP_STORE_ID"),
            (("CORS_ALLOW_ORIGIN", "bad\norigin"), "CORS_ALLOW_ORIGIN"),
        ];
        for (var, field) in cases {
            let err = load(&[base, var]).unwrap_err();
            assert_eq!(err.field, field, "{var:?}");
        }
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError {
            field: "URL_SCHEME",
            message: "bad".into(),
        };
        assert_eq!(err.to_string(), "Configuration error for URL_SCHEME: bad");
    }
}
