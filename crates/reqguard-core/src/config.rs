use crate::dispatcher::{Dispatcher, DispatcherError};
use crate::retry::{
    Backoff, ErrorClass, PolicyName, PolicyRegistry, RegistryError, RetryCondition, RetryPolicy,
};
use crate::transport::Transport;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Delay schedule of a custom policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelayConfig {
    /// `min(base_ms * 2^n, ceiling_ms)` before retry `n`.
    Exponential { base_ms: u64, ceiling_ms: u64 },
    /// Fixed wait before every retry.
    Constant { delay_ms: u64 },
}

fn default_retry_on() -> Vec<ErrorClass> {
    vec![ErrorClass::Timeout, ErrorClass::ServerError]
}

/// Custom retry policy (`[policies.<name>]` table in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Additional attempts allowed after the first.
    pub retries: u32,
    pub retry_delay: DelayConfig,
    /// Error classes that may be retried. `cancelled` is ignored.
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<ErrorClass>,
    /// Give every retry the full per-request timeout instead of what is left.
    #[serde(default)]
    pub should_reset_timeout: bool,
    /// Add up to 10% random extra delay to each wait.
    #[serde(default)]
    pub jitter: bool,
}

impl PolicyConfig {
    /// Build the immutable policy this table describes.
    pub fn to_policy(&self, name: &str) -> Result<RetryPolicy, ConfigError> {
        let backoff = match self.retry_delay {
            DelayConfig::Exponential {
                base_ms,
                ceiling_ms,
            } => {
                if ceiling_ms < base_ms {
                    return Err(ConfigError::InvalidPolicy {
                        name: name.to_string(),
                        reason: format!("ceiling_ms ({}) is below base_ms ({})", ceiling_ms, base_ms),
                    });
                }
                Backoff::exponential(
                    Duration::from_millis(base_ms),
                    Duration::from_millis(ceiling_ms),
                )
            }
            DelayConfig::Constant { delay_ms } => Backoff::Constant(Duration::from_millis(delay_ms)),
        };
        Ok(RetryPolicy::new(
            name,
            self.retries,
            backoff,
            RetryCondition::OneOf(self.retry_on.clone()),
            self.should_reset_timeout,
        )
        .with_jitter(self.jitter))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("retry policy {name:?}: {reason}")]
    InvalidPolicy { name: String, reason: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

/// Global configuration loaded from `~/.config/reqguard/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqguardConfig {
    /// Remote API every request path is joined onto.
    pub base_url: String,
    /// Per-attempt timeout for requests that do not set their own.
    pub default_timeout_ms: u64,
    /// Requests taking longer than this (backoff included) are reported as slow.
    pub slow_threshold_ms: u64,
    /// Policy used by dispatchers built from this config: a preset
    /// (`critical`, `normal`, `low_priority`) or a name under `[policies]`.
    #[serde(default = "default_policy_name")]
    pub default_policy: String,
    /// Custom policies by name. Names may not shadow the presets.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyConfig>,
}

fn default_policy_name() -> String {
    PolicyName::default().as_str().to_string()
}

impl Default for ReqguardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/".to_string(),
            default_timeout_ms: 10_000,
            slow_threshold_ms: 5_000,
            default_policy: default_policy_name(),
            policies: BTreeMap::new(),
        }
    }
}

impl ReqguardConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }

    /// Presets plus every custom policy in this config.
    pub fn registry(&self) -> Result<PolicyRegistry, ConfigError> {
        let mut registry = PolicyRegistry::with_defaults();
        for (name, cfg) in &self.policies {
            registry.register(cfg.to_policy(name)?)?;
        }
        Ok(registry)
    }

    /// The policy named by `default_policy`.
    pub fn default_policy(&self) -> Result<Arc<RetryPolicy>, ConfigError> {
        Ok(self.registry()?.require(&self.default_policy)?)
    }

    /// Dispatcher over `transport` using this config's base URL, timeout,
    /// slow threshold and default policy.
    pub fn dispatcher<T: Transport>(&self, transport: T) -> Result<Dispatcher<T>, ConfigError> {
        let dispatcher = Dispatcher::with_policy(
            transport,
            &self.base_url,
            self.default_timeout(),
            self.default_policy()?,
        )?;
        Ok(dispatcher.with_slow_threshold(self.slow_threshold()))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("reqguard")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ReqguardConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ReqguardConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit file.
pub fn load_from(path: &Path) -> Result<ReqguardConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: ReqguardConfig = toml::from_str(&data)?;
    // Surface bad policy tables at load time, not on first request.
    cfg.registry()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ReqguardConfig::default();
        assert_eq!(cfg.default_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.slow_threshold(), Duration::from_secs(5));
        assert_eq!(cfg.default_policy, "normal");
        assert!(cfg.policies.is_empty());
        assert_eq!(cfg.default_policy().unwrap().name(), "normal");
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut cfg = ReqguardConfig::default();
        cfg.policies.insert(
            "reports".to_string(),
            PolicyConfig {
                retries: 4,
                retry_delay: DelayConfig::Constant { delay_ms: 250 },
                retry_on: vec![ErrorClass::ServerError],
                should_reset_timeout: true,
                jitter: false,
            },
        );
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ReqguardConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_custom_policy() {
        let toml = r#"
            base_url = "https://backoffice.example.com/api"
            default_timeout_ms = 4000
            slow_threshold_ms = 2500
            default_policy = "inventory"

            [policies.inventory]
            retries = 5
            retry_delay = { kind = "exponential", base_ms = 200, ceiling_ms = 2000 }
            retry_on = ["timeout", "connection_refused", "server_error"]
            should_reset_timeout = true
            jitter = true
        "#;
        let cfg: ReqguardConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.default_timeout(), Duration::from_millis(4000));
        let policy = cfg.default_policy().unwrap();
        assert_eq!(policy.name(), "inventory");
        assert_eq!(policy.max_retries(), 5);
        assert!(policy.reset_timeout_on_retry());
        assert!(policy.jitter_enabled());
        assert!(policy.is_retryable(ErrorClass::ConnectionRefused));
        assert!(!policy.is_retryable(ErrorClass::DnsFailure));
        assert_eq!(policy.backoff().delay(4), Duration::from_millis(2000));
    }

    #[test]
    fn config_policy_defaults() {
        let toml = r#"
            base_url = "http://localhost/"
            default_timeout_ms = 1000
            slow_threshold_ms = 1000

            [policies.background]
            retries = 1
            retry_delay = { kind = "constant", delay_ms = 1500 }
        "#;
        let cfg: ReqguardConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.default_policy, "normal");
        let bg = &cfg.policies["background"];
        assert_eq!(bg.retry_on, [ErrorClass::Timeout, ErrorClass::ServerError]);
        assert!(!bg.should_reset_timeout);
        assert!(!bg.jitter);
    }

    #[test]
    fn config_rejects_bad_policies() {
        let mut cfg = ReqguardConfig::default();
        cfg.policies.insert(
            "broken".to_string(),
            PolicyConfig {
                retries: 1,
                retry_delay: DelayConfig::Exponential {
                    base_ms: 500,
                    ceiling_ms: 100,
                },
                retry_on: vec![],
                should_reset_timeout: false,
                jitter: false,
            },
        );
        assert!(matches!(
            cfg.registry(),
            Err(ConfigError::InvalidPolicy { .. })
        ));

        let mut cfg = ReqguardConfig::default();
        cfg.policies.insert(
            "critical".to_string(),
            PolicyConfig {
                retries: 9,
                retry_delay: DelayConfig::Constant { delay_ms: 1 },
                retry_on: vec![],
                should_reset_timeout: false,
                jitter: false,
            },
        );
        assert!(matches!(
            cfg.registry(),
            Err(ConfigError::Registry(RegistryError::Duplicate(_)))
        ));

        let cfg = ReqguardConfig {
            default_policy: "nonexistent".to_string(),
            ..ReqguardConfig::default()
        };
        assert!(cfg.default_policy().is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "base_url = \"http://pos.local:9000/\"\ndefault_timeout_ms = 2000\nslow_threshold_ms = 800\ndefault_policy = \"critical\"\n",
        )
        .unwrap();
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.default_policy().unwrap().name(), "critical");
        assert_eq!(cfg.slow_threshold(), Duration::from_millis(800));

        fs::write(&path, "base_url = 3").unwrap();
        assert!(load_from(&path).is_err());
    }
}
