// src/config.rs - Layered configuration: defaults, TOML file, then environment
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::security::{ProfileSettings, RiskSettings, TimingSettings, VerificationSettings};

pub const DEFAULT_CONFIG_FILE: &str = "risk_engine.toml";

const DAY_SECS: i64 = 24 * 60 * 60;
const MAX_TOKEN_TTL_SECS: i64 = DAY_SECS;
const MAX_WINDOW_SECS: i64 = 30 * DAY_SECS;
const MAX_IDLE_EVICTION_SECS: i64 = 365 * DAY_SECS;
const MAX_CLEANUP_INTERVAL_SECS: u64 = DAY_SECS as u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub workers: Option<usize>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            host: "127.0.0.1".to_string(),
            port: 3001,
            cors_origin: None,
            workers: None,
        }
    }
}

/// Balances served by the in-process wallet client, keyed by account id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    pub network_fee: f64,
    pub balances: BTreeMap<String, f64>,
}

impl Default for WalletSettings {
    fn default() -> Self {
        WalletSettings {
            network_fee: 0.0,
            balances: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub cleanup_interval_secs: u64,
    pub api: ApiSettings,
    pub risk: RiskSettings,
    pub timing: TimingSettings,
    pub verification: VerificationSettings,
    pub profile: ProfileSettings,
    pub wallet: WalletSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            cleanup_interval_secs: 60,
            api: ApiSettings::default(),
            risk: RiskSettings::default(),
            timing: TimingSettings::default(),
            verification: VerificationSettings::default(),
            profile: ProfileSettings::default(),
            wallet: WalletSettings::default(),
        }
    }
}

/// Load configuration from the optional TOML file and the environment
pub fn load_config() -> Result<Config> {
    // Load .env file if it exists
    dotenv::dotenv().ok();

    let mut config = Config::default();

    let path = env::var("RISK_ENGINE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let path = Path::new(&path);
    if path.exists() {
        config = load_from_file(path)?;
        info!("Loaded configuration from {}", path.display());
    } else {
        debug!("No configuration file at {}, using defaults", path.display());
    }

    load_from_env(&mut config)?;
    validate(&config)?;

    Ok(config)
}

/// Load configuration from a TOML file; missing keys keep their defaults
pub fn load_from_file(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
    parse_toml(&raw).with_context(|| format!("Failed to parse configuration file {}", path.display()))
}

pub fn parse_toml(raw: &str) -> Result<Config> {
    Ok(toml::from_str(raw)?)
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", key, value, e))
}

/// Override settings from environment variables
pub fn load_from_env(config: &mut Config) -> Result<()> {
    apply_overrides(config, env::vars())
}

/// Applies `KEY=value` overrides; unknown keys are ignored
pub fn apply_overrides<I>(config: &mut Config, vars: I) -> Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        match key.as_str() {
            "API_HOST" => config.api.host = value,
            "API_PORT" => config.api.port = parse_var(&key, &value)?,
            "API_WORKERS" => config.api.workers = Some(parse_var(&key, &value)?),
            "CORS_ORIGIN" => config.api.cors_origin = Some(value),
            "LOG_LEVEL" => config.log_level = value,
            "CLEANUP_INTERVAL_SECS" => config.cleanup_interval_secs = parse_var(&key, &value)?,
            "RISK_WEIGHT_AMOUNT" => config.risk.weights.amount_ratio = parse_var(&key, &value)?,
            "RISK_WEIGHT_ADDRESS" => config.risk.weights.address_novelty = parse_var(&key, &value)?,
            "RISK_WEIGHT_STATISTICAL" => config.risk.weights.statistical_anomaly = parse_var(&key, &value)?,
            "RISK_WEIGHT_TIME" => config.risk.weights.time_of_day = parse_var(&key, &value)?,
            "RISK_WEIGHT_TIMING" => config.risk.weights.behavioral_timing = parse_var(&key, &value)?,
            "INSUFFICIENT_HISTORY_RISK" => config.risk.insufficient_history_risk = parse_var(&key, &value)?,
            "VERIFICATION_TTL_SECS" => config.verification.ttl_secs = parse_var(&key, &value)?,
            "VERIFICATION_MAX_ATTEMPTS" => config.verification.max_attempts = parse_var(&key, &value)?,
            "VERIFICATION_CODE_LENGTH" => config.verification.code_length = parse_var(&key, &value)?,
            "PROFILE_IDLE_EVICTION_SECS" => config.profile.idle_eviction_secs = parse_var(&key, &value)?,
            "DEFAULT_AVERAGE_DURATION_SECS" => {
                config.profile.default_average_duration = parse_var(&key, &value)?
            }
            _ => {}
        }
    }
    Ok(())
}

/// Rejects configurations the engine cannot run with
pub fn validate(config: &Config) -> Result<()> {
    let weights = config.risk.weights.total();
    if weights != 100 {
        bail!("Risk weights must sum to 100, got {}", weights);
    }

    let levels = &config.risk.levels;
    if !(levels.low < levels.medium && levels.medium < levels.high && levels.high <= 100) {
        bail!(
            "Risk level thresholds must be strictly increasing and at most 100: {}/{}/{}",
            levels.low,
            levels.medium,
            levels.high
        );
    }

    let tiers = &config.risk.amount_tiers;
    if !(tiers.elevated_ratio > 0.0 && tiers.elevated_ratio < tiers.high_ratio && tiers.high_ratio < tiers.very_high_ratio) {
        bail!("Amount tiers must be positive and strictly increasing");
    }

    let timing = &config.timing;
    if !(timing.very_fast_ratio < timing.fast_ratio && timing.fast_ratio < timing.faster_ratio) {
        bail!("Timing ratios must be strictly increasing");
    }

    let verification = &config.verification;
    if !(4..=10).contains(&verification.code_length) {
        bail!("Verification code length must be between 4 and 10, got {}", verification.code_length);
    }
    if verification.max_attempts < 1 {
        bail!("Verification max attempts must be at least 1");
    }
    check_secs("Verification TTL", verification.ttl_secs, MAX_TOKEN_TTL_SECS)?;
    check_secs("Abandoned modal threshold", config.timing.abandoned_after_secs, MAX_WINDOW_SECS)?;
    check_secs("Velocity window", config.risk.velocity.window_secs, MAX_WINDOW_SECS)?;
    check_secs("Profile idle eviction", config.profile.idle_eviction_secs, MAX_IDLE_EVICTION_SECS)?;

    let profile = &config.profile;
    if !(profile.default_average_duration > 0.0 && profile.default_average_duration.is_finite()) {
        bail!("Default average duration must be positive");
    }
    if profile.history_limit == 0 || profile.duration_window == 0 {
        bail!("Profile history windows must be non-empty");
    }

    let wallet = &config.wallet;
    if !(wallet.network_fee >= 0.0 && wallet.network_fee.is_finite()) {
        bail!("Wallet network fee must be a non-negative number");
    }
    if let Some((account, _)) = wallet.balances.iter().find(|(_, b)| !(**b >= 0.0 && b.is_finite())) {
        bail!("Wallet balance for {} must be a non-negative number", account);
    }

    if config.cleanup_interval_secs == 0 || config.cleanup_interval_secs > MAX_CLEANUP_INTERVAL_SECS {
        bail!(
            "Cleanup interval must be between 1 and {} seconds, got {}",
            MAX_CLEANUP_INTERVAL_SECS,
            config.cleanup_interval_secs
        );
    }

    Ok(())
}

fn check_secs(name: &str, value: i64, max: i64) -> Result<()> {
    if value <= 0 || value > max {
        bail!("{} must be between 1 and {} seconds, got {}", name, max, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.verification.ttl_secs, 300);
        assert_eq!(config.profile.default_average_duration, 120.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = parse_toml(
            r#"
            log_level = "debug"

            [api]
            port = 8080

            [risk.weights]
            amount_ratio = 30
            behavioral_timing = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.risk.weights.amount_ratio, 30);
        assert_eq!(config.risk.weights.address_novelty, 20);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            vars(&[
                ("API_PORT", "9000"),
                ("VERIFICATION_TTL_SECS", "120"),
                ("CORS_ORIGIN", "http://localhost:5173"),
                ("UNRELATED", "x"),
            ]),
        )
        .unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.verification.ttl_secs, 120);
        assert_eq!(config.api.cors_origin.as_deref(), Some("http://localhost:5173"));
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = Config::default();
        assert!(apply_overrides(&mut config, vars(&[("API_PORT", "not-a-port")])).is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.risk.weights.time_of_day = 15;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.verification.code_length = 3;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.risk.levels.medium = 20;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duration_settings_are_bounded() {
        let mut config = Config::default();
        apply_overrides(&mut config, vars(&[("VERIFICATION_TTL_SECS", &i64::MAX.to_string())])).unwrap();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.verification.ttl_secs = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.timing.abandoned_after_secs = i64::MAX;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.risk.velocity.window_secs = 31 * DAY_SECS;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        apply_overrides(&mut config, vars(&[("PROFILE_IDLE_EVICTION_SECS", "-5")])).unwrap();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.cleanup_interval_secs = u64::MAX;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.verification.ttl_secs = DAY_SECS;
        config.risk.velocity.window_secs = 30 * DAY_SECS;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_wallet_balances_load_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [wallet]
            network_fee = 0.001

            [wallet.balances]
            acct-1 = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.wallet.balances.get("acct-1"), Some(&2.5));
        assert!(validate(&config).is_ok());

        let mut config = Config::default();
        config.wallet.balances.insert("acct-2".to_string(), -1.0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config::default();
        let rendered = toml::to_string(&config).unwrap();
        assert_eq!(parse_toml(&rendered).unwrap(), config);
    }
}
