use std::str::FromStr;
use std::time::Duration;

/// Whether two leads may share a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePhonePolicy {
    /// A unique index on phone number; the second submission gets 409.
    #[default]
    Reject,
    /// No uniqueness; every submission creates a new lead.
    Allow,
}

impl FromStr for DuplicatePhonePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(DuplicatePhonePolicy::Reject),
            "allow" => Ok(DuplicatePhonePolicy::Allow),
            other => anyhow::bail!(
                "DUPLICATE_PHONE_POLICY must be 'reject' or 'allow', got '{}'",
                other
            ),
        }
    }
}

/// Which lead store backs the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local store; data is lost on restart.
    Memory,
}

/// Fixed request quota per time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Required unless `storage` is `Memory`.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub port: u16,
    /// `development`, `production` or `test`.
    pub environment: String,
    pub storage: StorageBackend,
    /// Automation webhook; delivery is skipped when unset.
    pub webhook_url: Option<String>,
    pub duplicate_phone_policy: DuplicatePhonePolicy,
    pub submission_rate_limit: RateLimit,
    pub general_rate_limit: RateLimit,
    /// Extra CORS origin allowed alongside the localhost and Vercel defaults.
    pub frontend_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = match lookup("STORAGE")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => anyhow::bail!("STORAGE must be 'postgres' or 'memory', got '{}'", other),
        };

        let database_url = lookup("DATABASE_URL")
            .or_else(|| lookup("DB_URL"))
            .filter(|url| !url.trim().is_empty());
        let database_url = match (storage, database_url) {
            (_, Some(url)) => {
                if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                    anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                }
                Some(url)
            }
            (StorageBackend::Postgres, None) => {
                anyhow::bail!("DATABASE_URL or DB_URL environment variable required")
            }
            (StorageBackend::Memory, None) => None,
        };

        let webhook_url = lookup("N8N_WEBHOOK_URL")
            .filter(|s| !s.trim().is_empty())
            .map(|raw| {
                let parsed = url::Url::parse(raw.trim())
                    .map_err(|e| anyhow::anyhow!("N8N_WEBHOOK_URL is not a valid URL: {}", e))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    anyhow::bail!("N8N_WEBHOOK_URL must start with http:// or https://");
                }
                Ok(raw.trim().to_string())
            })
            .transpose()?;

        let config = Self {
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            port: parse_or(&lookup, "PORT", 5000)
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            environment: lookup("APP_ENV")
                .or_else(|| lookup("NODE_ENV"))
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "development".to_string()),
            storage,
            webhook_url,
            duplicate_phone_policy: lookup("DUPLICATE_PHONE_POLICY")
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_default(),
            submission_rate_limit: RateLimit {
                max_requests: parse_or(&lookup, "SUBMISSION_RATE_LIMIT", 50)?,
                window: Duration::from_secs(parse_or(
                    &lookup,
                    "SUBMISSION_RATE_WINDOW_SECS",
                    3600,
                )?),
            },
            general_rate_limit: RateLimit {
                max_requests: parse_or(&lookup, "GENERAL_RATE_LIMIT", 100)?,
                window: Duration::from_secs(parse_or(&lookup, "GENERAL_RATE_WINDOW_SECS", 900)?),
            },
            frontend_url: lookup("FRONTEND_URL").filter(|s| !s.trim().is_empty()),
        };

        for (name, limit) in [
            ("SUBMISSION_RATE", config.submission_rate_limit),
            ("GENERAL_RATE", config.general_rate_limit),
        ] {
            if limit.max_requests == 0 || limit.window.is_zero() {
                anyhow::bail!("{}_LIMIT and {}_WINDOW_SECS must be greater than zero", name, name);
            }
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!(
            "Configuration loaded: env={}, storage={:?}, duplicate phones={:?}",
            config.environment,
            config.storage,
            config.duplicate_phone_policy
        );
        if let Some(ref url) = config.database_url {
            tracing::debug!("Database URL: {}...", &url[..20.min(url.len())]);
        }
        match config.webhook_url {
            Some(ref url) => tracing::info!("Webhook URL configured: {}", url),
            None => tracing::warn!("N8N_WEBHOOK_URL not configured; webhook delivery disabled"),
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).filter(|s| !s.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", key, raw)),
        None => Ok(default),
    }
}
