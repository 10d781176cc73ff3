use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

pub const MAX_PAGE_SIZE: u32 = 100;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the back-office service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub payments: PaymentConfig,
    pub access: AccessConfig,
    pub listing: ListingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let account_reference =
            env::var("APP_PAYMENT_ACCOUNT").unwrap_or_else(|_| "caixa-principal".to_string());
        if account_reference.trim().is_empty() {
            return Err(ConfigError::MissingPaymentAccount);
        }

        let privileged_role =
            env::var("APP_PRIVILEGED_ROLE").unwrap_or_else(|_| "admin".to_string());

        let default_page_size = env::var("APP_DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| "20".to_string())
            .parse::<u32>()
            .ok()
            .filter(|size| (1..=MAX_PAGE_SIZE).contains(size))
            .ok_or(ConfigError::InvalidPageSize)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            payments: PaymentConfig {
                account_reference: account_reference.trim().to_string(),
            },
            access: AccessConfig { privileged_role },
            listing: ListingConfig { default_page_size },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Account that settles timesheet payments; carried on payment events for the ledger.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub account_reference: String,
}

#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub privileged_role: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ListingConfig {
    pub default_page_size: u32,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingPaymentAccount,
    InvalidPageSize,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingPaymentAccount => {
                write!(f, "APP_PAYMENT_ACCOUNT must not be blank")
            }
            ConfigError::InvalidPageSize => write!(
                f,
                "APP_DEFAULT_PAGE_SIZE must be an integer between 1 and {MAX_PAGE_SIZE}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::MissingPaymentAccount
            | ConfigError::InvalidPageSize => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("APP_PAYMENT_ACCOUNT");
        env::remove_var("APP_PRIVILEGED_ROLE");
        env::remove_var("APP_DEFAULT_PAGE_SIZE");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.payments.account_reference, "caixa-principal");
        assert_eq!(config.access.privileged_role, "admin");
        assert_eq!(config.listing.default_page_size, 20);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_page_size_outside_bounds() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_DEFAULT_PAGE_SIZE", "500");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidPageSize)
        ));
        reset_env();
    }

    #[test]
    fn rejects_blank_payment_account() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_PAYMENT_ACCOUNT", "   ");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::MissingPaymentAccount)
        ));
        reset_env();
    }
}
