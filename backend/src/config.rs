//! Process configuration from environment variables.

use crate::access::AccessPolicy;
use crate::compression::DEFAULT_MAX_COMPRESSION_RATIO;
use crate::errors::{PrivacyError, Result};
use crate::identity::ValidatorId;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProverMode {
    Groth16,
    /// Every proof is produced in simulated mode.
    Disabled,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    pub api_key: String,
    pub data_dir: PathBuf,
    pub database_url: String,
    pub max_compression_ratio: u32,
    pub default_committee_size: usize,
    pub default_threshold: u32,
    pub session_timeout_secs: i64,
    pub sweep_interval_secs: u64,
    pub validators: Vec<ValidatorId>,
    pub prover: ProverMode,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| {
            format!("sqlite:{}?mode=rwc", data_dir.join("ledger.sqlite").to_string_lossy())
        });

        let validators = lookup("VALIDATORS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(ValidatorId::from)
                    .collect()
            })
            .unwrap_or_default();

        let prover = match lookup("ZK_PROVER").as_deref().unwrap_or("groth16") {
            "groth16" => ProverMode::Groth16,
            "disabled" => ProverMode::Disabled,
            other => {
                return Err(PrivacyError::Validation(format!(
                    "ZK_PROVER must be 'groth16' or 'disabled', got '{other}'"
                )));
            }
        };

        let config = Self {
            addr: lookup("BACKEND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            // Development default; deployments set API_KEY.
            api_key: lookup("API_KEY").unwrap_or_else(|| "dev-secret-key".to_string()),
            data_dir,
            database_url,
            max_compression_ratio: parse_or(&lookup, "MAX_COMPRESSION_RATIO", DEFAULT_MAX_COMPRESSION_RATIO)?,
            default_committee_size: parse_or(&lookup, "DEFAULT_COMMITTEE_SIZE", 5)?,
            default_threshold: parse_or(&lookup, "DEFAULT_THRESHOLD", 3)?,
            session_timeout_secs: parse_or(&lookup, "SESSION_TIMEOUT_SECS", 24 * 60 * 60)?,
            sweep_interval_secs: parse_or(&lookup, "SWEEP_INTERVAL_SECS", 60)?,
            validators,
            prover,
        };

        if config.max_compression_ratio == 0 || config.default_threshold == 0 || config.sweep_interval_secs == 0 {
            return Err(PrivacyError::Validation(
                "MAX_COMPRESSION_RATIO, DEFAULT_THRESHOLD and SWEEP_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        if config.session_timeout_secs <= 0 {
            return Err(PrivacyError::Validation("SESSION_TIMEOUT_SECS must be positive".to_string()));
        }

        Ok(config)
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            default_committee_size: self.default_committee_size,
            default_threshold: self.default_threshold,
            session_timeout: chrono::Duration::seconds(self.session_timeout_secs),
        }
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PrivacyError::Validation(format!("{key} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}
