use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use quoteflow_core::config::AppConfig;
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, to_data, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run(json_output: bool) -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let entries: Vec<ConfigEntry> = effective_values(&config)
        .into_iter()
        .map(|(key, value, env_keys)| ConfigEntry {
            key,
            value,
            source: field_source(
                key,
                &env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        })
        .collect();

    if json_output {
        return match to_data("config", &entries) {
            Ok(data) => CommandResult::with_data("config", "effective configuration", data),
            Err(failure) => failure,
        };
    }

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries
            .iter()
            .map(|entry| format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)),
    );
    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String, Vec<String>)> {
    let env_key = |key: &str| vec![key.to_string()];
    let tier_keys = quoteflow_core::TierId::ALL
        .iter()
        .map(|tier| format!("QUOTEFLOW_CATALOG_{}_BASE_CENTS", tier.as_str().to_uppercase()))
        .collect();

    vec![
        ("database.url", config.database.url.clone(), env_key("QUOTEFLOW_DATABASE_URL")),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            env_key("QUOTEFLOW_DATABASE_MAX_CONNECTIONS"),
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            env_key("QUOTEFLOW_DATABASE_TIMEOUT_SECS"),
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            env_key("QUOTEFLOW_SERVER_BIND_ADDRESS"),
        ),
        ("server.port", config.server.port.to_string(), env_key("QUOTEFLOW_SERVER_PORT")),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            env_key("QUOTEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"),
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            vec!["QUOTEFLOW_LOGGING_LEVEL".to_string(), "QUOTEFLOW_LOG_LEVEL".to_string()],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            vec!["QUOTEFLOW_LOGGING_FORMAT".to_string(), "QUOTEFLOW_LOG_FORMAT".to_string()],
        ),
        (
            "pricing.rush_multiplier",
            config.pricing.rush_multiplier.to_string(),
            env_key("QUOTEFLOW_PRICING_RUSH_MULTIPLIER"),
        ),
        (
            "pricing.deposit_percent",
            config.pricing.deposit_percent.to_string(),
            env_key("QUOTEFLOW_PRICING_DEPOSIT_PERCENT"),
        ),
        (
            "pricing.min_deposit_cents",
            config.pricing.min_deposit_cents.to_string(),
            env_key("QUOTEFLOW_PRICING_MIN_DEPOSIT_CENTS"),
        ),
        (
            "pricing.price_ceiling_cents",
            config.pricing.price_ceiling_cents.to_string(),
            env_key("QUOTEFLOW_PRICING_PRICE_CEILING_CENTS"),
        ),
        (
            "catalog.tier_base_prices",
            render_prices(
                config.catalog.tier_base_prices.iter().map(|(tier, cents)| (tier.as_str(), cents)),
            ),
            tier_keys,
        ),
        (
            "catalog.feature_prices",
            render_prices(config.catalog.feature_prices.iter().map(|(id, c)| (id.as_str(), c))),
            env_key("QUOTEFLOW_CATALOG_FEATURE_PRICES"),
        ),
        (
            "catalog.maintenance_prices",
            render_prices(
                config.catalog.maintenance_prices.iter().map(|(id, c)| (id.as_str(), c)),
            ),
            env_key("QUOTEFLOW_CATALOG_MAINTENANCE_PRICES"),
        ),
        (
            "drafts.cookie_name",
            config.drafts.cookie_name.clone(),
            env_key("QUOTEFLOW_DRAFTS_COOKIE_NAME"),
        ),
        (
            "drafts.cookie_max_age_days",
            config.drafts.cookie_max_age_days.to_string(),
            env_key("QUOTEFLOW_DRAFTS_COOKIE_MAX_AGE_DAYS"),
        ),
    ]
}

fn render_prices<'a>(prices: impl Iterator<Item = (&'a str, &'a u64)>) -> String {
    let prices: BTreeMap<&str, &u64> = prices.collect();
    if prices.is_empty() {
        return "<built-in>".to_string();
    }
    prices.into_iter().map(|(id, cents)| format!("{id}={cents}")).collect::<Vec<_>>().join(",")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("quoteflow.toml"), PathBuf::from("config/quoteflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[String],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key.as_str()).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
