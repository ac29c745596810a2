use std::env;
use std::time::Duration;

/// Windows and limits handed to the core components at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub cache_ttl: Duration,
    pub cache_timeout: Duration,
    pub cache_max_entries: u64,
    pub share_window: Duration,
    pub sweep_interval: Duration,
    /// Expiry applied to new uploads; `None` keeps files until deleted
    pub file_retention: Option<Duration>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_timeout: Duration::from_millis(250),
            cache_max_entries: 10_000,
            share_window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            file_retention: Some(Duration::from_secs(60)),
        }
    }
}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub public_url: String,
    pub blob_store_url: String,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub core: CoreConfig,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |name: &str| var(name).and_then(|v| v.trim().parse::<u64>().ok());
        let defaults = CoreConfig::default();

        let port = var("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let database_url = var("DATABASE_URL")
            .or_else(|| database_url_from_parts(&var))
            .unwrap_or_else(|| "postgres://localhost/filebox".to_string());

        let public_url = var("PUBLIC_URL").unwrap_or_else(|| "http://localhost:8080".to_string());

        let blob_store_url =
            var("BLOB_STORE_URL").unwrap_or_else(|| "http://localhost:9000/filebox".to_string());

        let cors_origins = var("CORS_ORIGINS")
            .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ]
            });

        let max_upload_bytes = parsed("MAX_UPLOAD_BYTES")
            .map(|n| n as usize)
            .unwrap_or(10 * 1024 * 1024);

        let core = CoreConfig {
            cache_ttl: parsed("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_timeout: parsed("CACHE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache_timeout),
            cache_max_entries: parsed("CACHE_MAX_ENTRIES").unwrap_or(defaults.cache_max_entries),
            share_window: parsed("SHARE_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.share_window),
            sweep_interval: parsed("SWEEP_INTERVAL_SECS")
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            file_retention: match parsed("FILE_RETENTION_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.file_retention,
            },
        };

        Self {
            port,
            database_url,
            public_url,
            blob_store_url,
            cors_origins,
            max_upload_bytes,
            core,
        }
    }
}

/// Build a connection URL from `DB_HOST`/`DB_PORT`/`DB_USER`/`DB_PASSWORD`/`DB_NAME`
fn database_url_from_parts(var: &impl Fn(&str) -> Option<String>) -> Option<String> {
    let host = var("DB_HOST")?;
    let port = var("DB_PORT").unwrap_or_else(|| "5432".to_string());
    let name = var("DB_NAME").unwrap_or_else(|| "filebox".to_string());

    let credentials = match (var("DB_USER"), var("DB_PASSWORD")) {
        (Some(user), Some(password)) => format!(
            "{}:{}@",
            urlencoding::encode(&user),
            urlencoding::encode(&password)
        ),
        (Some(user), None) => format!("{}@", urlencoding::encode(&user)),
        _ => String::new(),
    };

    Some(format!("postgres://{credentials}{host}:{port}/{name}"))
}
