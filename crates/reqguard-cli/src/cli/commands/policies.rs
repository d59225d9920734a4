//! `reqguard policies` – list retry policies.

use anyhow::Result;
use reqguard_core::config::ReqguardConfig;
use reqguard_core::retry::{RetryCondition, RetryPolicy};

/// Delay schedule, e.g. `1000, 2000` (ms before each retry).
pub(crate) fn delay_schedule(policy: &RetryPolicy) -> String {
    let delays: Vec<String> = (1..=policy.max_retries())
        .map(|n| policy.backoff().delay(n).as_millis().to_string())
        .collect();
    let mut out = if delays.is_empty() {
        "-".to_string()
    } else {
        delays.join(", ")
    };
    if policy.jitter_enabled() {
        out.push_str(" (+jitter)");
    }
    out
}

pub(crate) fn retry_classes(policy: &RetryPolicy) -> String {
    match policy.retry_condition() {
        RetryCondition::OneOf(classes) if classes.is_empty() => "-".to_string(),
        RetryCondition::OneOf(classes) => classes
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(","),
        RetryCondition::Custom(_) => "custom".to_string(),
    }
}

/// One table row per registered policy; the default is marked with `*`.
pub(crate) fn policy_rows(cfg: &ReqguardConfig) -> Result<Vec<String>> {
    let registry = cfg.registry()?;
    let default = cfg.default_policy()?;
    let mut rows = vec![format!(
        "{:<14} {:>7}  {:<7} {:<28} {}",
        "NAME", "RETRIES", "RESET", "DELAYS(ms)", "RETRY ON"
    )];
    for policy in registry.iter() {
        let marker = if policy.name() == default.name() { "*" } else { "" };
        rows.push(format!(
            "{:<14} {:>7}  {:<7} {:<28} {}",
            format!("{}{}", policy.name(), marker),
            policy.max_retries(),
            policy.reset_timeout_on_retry(),
            delay_schedule(policy),
            retry_classes(policy)
        ));
    }
    Ok(rows)
}

pub fn run_policies(cfg: &ReqguardConfig) -> Result<()> {
    for row in policy_rows(cfg)? {
        println!("{}", row);
    }
    Ok(())
}
