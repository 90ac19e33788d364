use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string. `None` means the server must run with the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub cors_origins: Vec<String>,
}

/// Cloudinary account and the fixed upload destination for car pictures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    pub api_base_url: String,
    pub folder: String,
    pub width: u32,
    pub height: u32,
    /// Must match the account's signature setting
    pub signature_algorithm: SignatureAlgorithm,
}

/// Digest used to sign upload requests. Cloudinary accounts verify SHA-1 unless switched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Some(Self::Sha1),
            "sha256" | "sha-256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set outside development")]
    MissingJwtSecret,

    #[error("Missing media configuration: {0}")]
    MissingMedia(&'static str),

    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
}

/// Secret used when running locally without JWT_SECRET. `validate` rejects it outside development.
const DEVELOPMENT_JWT_SECRET: &str = "development-only-secret";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.server.max_request_size_bytes = v.parse().unwrap_or(self.server.max_request_size_bytes);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database.url = Some(v);
            }
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Media overrides
        if let Ok(v) = env::var("CLOUDINARY_CLOUD_NAME") {
            self.media.cloud_name = v;
        }
        if let Ok(v) = env::var("CLOUDINARY_API_KEY") {
            self.media.api_key = v;
        }
        if let Ok(v) = env::var("CLOUDINARY_SECRET_KEY") {
            self.media.api_secret = v;
        }
        if let Ok(v) = env::var("CLOUDINARY_FOLDER") {
            self.media.folder = v;
        }
        if let Ok(v) = env::var("CLOUDINARY_API_BASE_URL") {
            self.media.api_base_url = v;
        }
        if let Ok(v) = env::var("CLOUDINARY_SIGNATURE_ALGORITHM") {
            self.media.signature_algorithm =
                SignatureAlgorithm::parse(&v).unwrap_or(self.media.signature_algorithm);
        }

        self
    }

    /// Check the settings needed to serve requests
    pub fn validate(&self, require_database: bool) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty()
            || (self.environment != Environment::Development
                && self.security.jwt_secret == DEVELOPMENT_JWT_SECRET)
        {
            return Err(ConfigError::MissingJwtSecret);
        }
        if self.media.cloud_name.is_empty() {
            return Err(ConfigError::MissingMedia("CLOUDINARY_CLOUD_NAME"));
        }
        if self.media.api_key.is_empty() {
            return Err(ConfigError::MissingMedia("CLOUDINARY_API_KEY"));
        }
        if self.media.api_secret.is_empty() {
            return Err(ConfigError::MissingMedia("CLOUDINARY_SECRET_KEY"));
        }
        if require_database && self.database.url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn media_defaults() -> MediaConfig {
        MediaConfig {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            api_base_url: "https://api.cloudinary.com".to_string(),
            folder: "FARM2".to_string(),
            width: 800,
            height: 600,
            signature_algorithm: SignatureAlgorithm::Sha1,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
                jwt_expiry_hours: 24,
                cors_origins: vec!["*".to_string()],
            },
            media: Self::media_defaults(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 8,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            media: Self::media_defaults(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 1,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            media: Self::media_defaults(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_media(mut config: AppConfig) -> AppConfig {
        config.media.cloud_name = "demo".to_string();
        config.media.api_key = "key".to_string();
        config.media.api_secret = "secret".to_string();
        config
    }

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.media.folder, "FARM2");
        assert_eq!((config.media.width, config.media.height), (800, 600));
        assert_eq!(config.security.cors_origins, vec!["*"]);
        assert!(with_media(config).validate(false).is_ok());
    }

    #[test]
    fn test_production_requires_real_secret() {
        let mut config = with_media(AppConfig::production());
        assert_eq!(config.validate(false), Err(ConfigError::MissingJwtSecret));

        config.security.jwt_secret = DEVELOPMENT_JWT_SECRET.to_string();
        assert_eq!(config.validate(false), Err(ConfigError::MissingJwtSecret));

        config.security.jwt_secret = "a-real-secret".to_string();
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_validate_reports_missing_media_and_database() {
        let config = AppConfig::development();
        assert_eq!(
            config.validate(false),
            Err(ConfigError::MissingMedia("CLOUDINARY_CLOUD_NAME"))
        );

        let config = with_media(AppConfig::development());
        assert_eq!(config.validate(true), Err(ConfigError::MissingDatabaseUrl));
    }

    #[test]
    fn test_signature_algorithm_defaults_to_sha1() {
        assert_eq!(
            AppConfig::production().media.signature_algorithm,
            SignatureAlgorithm::Sha1
        );
        assert_eq!(SignatureAlgorithm::parse("SHA256"), Some(SignatureAlgorithm::Sha256));
        assert_eq!(SignatureAlgorithm::parse("sha-1"), Some(SignatureAlgorithm::Sha1));
        assert_eq!(SignatureAlgorithm::parse("md5"), None);
    }

    #[test]
    fn test_bind_address() {
        let config = AppConfig::development();
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
    }
}
