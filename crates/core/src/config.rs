use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::product::TierId;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub pricing: PricingConfig,
    pub catalog: CatalogConfig,
    pub drafts: DraftConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Global pricing constants, resolved once at startup and handed to the calculator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub rush_multiplier: Decimal,
    pub deposit_percent: Decimal,
    pub min_deposit_cents: u64,
    pub price_ceiling_cents: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rush_multiplier: Decimal::new(115, 2),
            deposit_percent: Decimal::new(25, 2),
            min_deposit_cents: 25_000,
            price_ceiling_cents: 350_000,
        }
    }
}

/// Price overrides applied on top of the built-in catalog. Keys must name existing entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogConfig {
    pub tier_base_prices: BTreeMap<TierId, u64>,
    pub feature_prices: BTreeMap<String, u64>,
    pub maintenance_prices: BTreeMap<String, u64>,
}

#[derive(Clone, Debug)]
pub struct DraftConfig {
    pub cookie_name: String,
    pub cookie_max_age_days: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub pricing: Option<PricingConfig>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://quoteflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            pricing: PricingConfig::default(),
            catalog: CatalogConfig::default(),
            drafts: DraftConfig {
                cookie_name: "quoteflow_draft".to_string(),
                cookie_max_age_days: 30,
            },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("quoteflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(rush_multiplier) = pricing.rush_multiplier {
                self.pricing.rush_multiplier = rush_multiplier;
            }
            if let Some(deposit_percent) = pricing.deposit_percent {
                self.pricing.deposit_percent = deposit_percent;
            }
            if let Some(min_deposit_cents) = pricing.min_deposit_cents {
                self.pricing.min_deposit_cents = min_deposit_cents;
            }
            if let Some(price_ceiling_cents) = pricing.price_ceiling_cents {
                self.pricing.price_ceiling_cents = price_ceiling_cents;
            }
        }

        if let Some(catalog) = patch.catalog {
            self.catalog.tier_base_prices.extend(catalog.tier_base_prices);
            self.catalog.feature_prices.extend(catalog.feature_prices);
            self.catalog.maintenance_prices.extend(catalog.maintenance_prices);
        }

        if let Some(drafts) = patch.drafts {
            if let Some(cookie_name) = drafts.cookie_name {
                self.drafts.cookie_name = cookie_name;
            }
            if let Some(cookie_max_age_days) = drafts.cookie_max_age_days {
                self.drafts.cookie_max_age_days = cookie_max_age_days;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("QUOTEFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("QUOTEFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("QUOTEFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("QUOTEFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("QUOTEFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("QUOTEFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("QUOTEFLOW_SERVER_PORT") {
            self.server.port = parse_env("QUOTEFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("QUOTEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("QUOTEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("QUOTEFLOW_LOGGING_LEVEL").or_else(|| read_env("QUOTEFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("QUOTEFLOW_LOGGING_FORMAT").or_else(|| read_env("QUOTEFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("QUOTEFLOW_PRICING_RUSH_MULTIPLIER") {
            self.pricing.rush_multiplier = parse_env("QUOTEFLOW_PRICING_RUSH_MULTIPLIER", &value)?;
        }
        if let Some(value) = read_env("QUOTEFLOW_PRICING_DEPOSIT_PERCENT") {
            self.pricing.deposit_percent = parse_env("QUOTEFLOW_PRICING_DEPOSIT_PERCENT", &value)?;
        }
        if let Some(value) = read_env("QUOTEFLOW_PRICING_MIN_DEPOSIT_CENTS") {
            self.pricing.min_deposit_cents =
                parse_env("QUOTEFLOW_PRICING_MIN_DEPOSIT_CENTS", &value)?;
        }
        if let Some(value) = read_env("QUOTEFLOW_PRICING_PRICE_CEILING_CENTS") {
            self.pricing.price_ceiling_cents =
                parse_env("QUOTEFLOW_PRICING_PRICE_CEILING_CENTS", &value)?;
        }

        for tier in TierId::ALL {
            let key = format!("QUOTEFLOW_CATALOG_{}_BASE_CENTS", tier.as_str().to_uppercase());
            if let Some(value) = read_env(&key) {
                self.catalog.tier_base_prices.insert(tier, parse_env(&key, &value)?);
            }
        }
        if let Some(value) = read_env("QUOTEFLOW_CATALOG_FEATURE_PRICES") {
            let prices = parse_price_list("QUOTEFLOW_CATALOG_FEATURE_PRICES", &value)?;
            self.catalog.feature_prices.extend(prices);
        }
        if let Some(value) = read_env("QUOTEFLOW_CATALOG_MAINTENANCE_PRICES") {
            let prices = parse_price_list("QUOTEFLOW_CATALOG_MAINTENANCE_PRICES", &value)?;
            self.catalog.maintenance_prices.extend(prices);
        }

        if let Some(value) = read_env("QUOTEFLOW_DRAFTS_COOKIE_NAME") {
            self.drafts.cookie_name = value;
        }
        if let Some(value) = read_env("QUOTEFLOW_DRAFTS_COOKIE_MAX_AGE_DAYS") {
            self.drafts.cookie_max_age_days =
                parse_env("QUOTEFLOW_DRAFTS_COOKIE_MAX_AGE_DAYS", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(pricing) = overrides.pricing {
            self.pricing = pricing;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_pricing(&self.pricing)?;
        validate_drafts(&self.drafts)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("quoteflow.toml"), PathBuf::from("config/quoteflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.rush_multiplier < Decimal::ONE || pricing.rush_multiplier > Decimal::from(3) {
        return Err(ConfigError::Validation(
            "pricing.rush_multiplier must be in range 1.0..=3.0".to_string(),
        ));
    }

    if pricing.deposit_percent <= Decimal::ZERO || pricing.deposit_percent > Decimal::ONE {
        return Err(ConfigError::Validation(
            "pricing.deposit_percent must be greater than 0 and at most 1".to_string(),
        ));
    }

    if pricing.price_ceiling_cents == 0 {
        return Err(ConfigError::Validation(
            "pricing.price_ceiling_cents must be greater than zero".to_string(),
        ));
    }

    if pricing.min_deposit_cents > pricing.price_ceiling_cents {
        return Err(ConfigError::Validation(
            "pricing.min_deposit_cents must not exceed pricing.price_ceiling_cents".to_string(),
        ));
    }

    Ok(())
}

fn validate_drafts(drafts: &DraftConfig) -> Result<(), ConfigError> {
    let name = drafts.cookie_name.trim();
    let valid_name = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_name {
        return Err(ConfigError::Validation(
            "drafts.cookie_name must be non-empty and use only [A-Za-z0-9_-]".to_string(),
        ));
    }

    if drafts.cookie_max_age_days == 0 || drafts.cookie_max_age_days > 365 {
        return Err(ConfigError::Validation(
            "drafts.cookie_max_age_days must be in range 1..=365".to_string(),
        ));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Parses `id=cents,id=cents` lists used by the catalog price env overrides.
fn parse_price_list(key: &str, value: &str) -> Result<BTreeMap<String, u64>, ConfigError> {
    let invalid =
        || ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() };

    let mut prices = BTreeMap::new();
    for entry in value.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (id, cents) = entry.split_once('=').ok_or_else(invalid)?;
        let id = id.trim();
        if id.is_empty() {
            return Err(invalid());
        }
        let cents = cents.trim().parse::<u64>().map_err(|_| invalid())?;
        prices.insert(id.to_string(), cents);
    }

    Ok(prices)
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    pricing: Option<PricingPatch>,
    catalog: Option<CatalogPatch>,
    drafts: Option<DraftPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    rush_multiplier: Option<Decimal>,
    deposit_percent: Option<Decimal>,
    min_deposit_cents: Option<u64>,
    price_ceiling_cents: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    #[serde(default)]
    tier_base_prices: BTreeMap<TierId, u64>,
    #[serde(default)]
    feature_prices: BTreeMap<String, u64>,
    #[serde(default)]
    maintenance_prices: BTreeMap<String, u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DraftPatch {
    cookie_name: Option<String>,
    cookie_max_age_days: Option<u32>,
}
