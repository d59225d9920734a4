//! Named retry policies: the three process-wide presets plus any custom
//! policies declared in configuration.

use super::policy::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// One of the built-in policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyName {
    Critical,
    #[default]
    Normal,
    LowPriority,
}

impl PolicyName {
    pub const ALL: [PolicyName; 3] = [
        PolicyName::Critical,
        PolicyName::Normal,
        PolicyName::LowPriority,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyName::Critical => "critical",
            PolicyName::Normal => "normal",
            PolicyName::LowPriority => "low_priority",
        }
    }

    /// Shared preset for this name. Built on first use, never mutated.
    pub fn policy(&self) -> Arc<RetryPolicy> {
        let p = presets();
        Arc::clone(match self {
            PolicyName::Critical => &p.critical,
            PolicyName::Normal => &p.normal,
            PolicyName::LowPriority => &p.low_priority,
        })
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyName {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "critical" => Ok(PolicyName::Critical),
            "normal" => Ok(PolicyName::Normal),
            "low_priority" => Ok(PolicyName::LowPriority),
            _ => Err(RegistryError::UnknownPolicy(s.to_string())),
        }
    }
}

struct Presets {
    critical: Arc<RetryPolicy>,
    normal: Arc<RetryPolicy>,
    low_priority: Arc<RetryPolicy>,
}

fn presets() -> &'static Presets {
    static PRESETS: OnceLock<Presets> = OnceLock::new();
    PRESETS.get_or_init(|| Presets {
        critical: Arc::new(RetryPolicy::critical()),
        normal: Arc::new(RetryPolicy::normal()),
        low_priority: Arc::new(RetryPolicy::low_priority()),
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown retry policy: {0}")]
    UnknownPolicy(String),
    #[error("retry policy {0:?} is already registered")]
    Duplicate(String),
}

/// Lookup table from policy name to shared policy.
///
/// Filled while the process starts up and then only read; wrap it in an
/// `Arc` to share between tasks.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Arc<RetryPolicy>>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PolicyRegistry {
    /// Registry holding only the three presets.
    pub fn with_defaults() -> Self {
        let policies = PolicyName::ALL
            .iter()
            .map(|name| (name.as_str().to_string(), name.policy()))
            .collect();
        Self { policies }
    }

    /// Add a custom policy. Names are unique, so presets cannot be shadowed.
    pub fn register(&mut self, policy: RetryPolicy) -> Result<Arc<RetryPolicy>, RegistryError> {
        let name = policy.name().to_string();
        if self.policies.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let policy = Arc::new(policy);
        self.policies.insert(name, Arc::clone(&policy));
        Ok(policy)
    }

    pub fn get(&self, name: &str) -> Option<Arc<RetryPolicy>> {
        self.policies.get(name).cloned().or_else(|| {
            // Accept "low-priority" and friends for presets.
            name.parse::<PolicyName>().ok().map(|p| p.policy())
        })
    }

    pub fn require(&self, name: &str) -> Result<Arc<RetryPolicy>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownPolicy(name.to_string()))
    }

    /// Policies in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RetryPolicy>> {
        self.policies.values()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
