use std::{path::Path, time::Duration};

use anyhow::{Context, bail};
use indoc::indoc;

use crate::{Config, POLICY_TIERS};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    let config: Config = toml::from_str(&content)?;

    let warnings = validate(&config)?;

    for warning in warnings {
        log::warn!("{warning}");
    }

    Ok(config)
}

/// Validates the configuration and returns warnings for accepted but
/// questionable settings.
pub(crate) fn validate(config: &Config) -> anyhow::Result<Vec<String>> {
    let mut warnings = Vec::new();
    let engine = &config.engine;

    for (tier, endpoints) in &engine.policies {
        if !POLICY_TIERS.contains(&tier.as_str()) {
            if tier == "unlimited" {
                bail!(indoc! {r#"
                    The unlimited tier carries no rate-limit policies; requests for it bypass
                    the engine entirely. Remove the [engine.policies.unlimited] section.
                "#});
            }

            bail!("Unknown tier '{tier}' in [engine.policies]. Valid tiers: free, premium, enterprise");
        }

        for (endpoint, policy) in endpoints {
            if policy.max == 0 {
                bail!("Policy for {tier} {endpoint}: max must be at least 1");
            }

            if policy.burst == 0 {
                bail!("Policy for {tier} {endpoint}: burst must be at least 1");
            }

            if policy.window.as_secs() == 0 {
                bail!("Policy for {tier} {endpoint}: window must be at least one second");
            }
        }
    }

    for (region, multiplier) in &engine.regions {
        if !multiplier.is_finite() || *multiplier <= 0.0 {
            bail!("Region multiplier for '{region}' must be a positive number");
        }
    }

    let slow_start = &engine.slow_start;

    if slow_start.enabled {
        if slow_start.stages.is_empty() {
            bail!("[engine.slow_start] stages must not be empty");
        }

        let mut previous = 0.0;

        for stage in &slow_start.stages {
            if !stage.is_finite() || *stage <= 0.0 || *stage > 1.0 {
                bail!("[engine.slow_start] stages must be within (0, 1]");
            }

            if *stage < previous {
                bail!("[engine.slow_start] stages must be ascending");
            }

            previous = *stage;
        }

        if slow_start.duration.as_secs() == 0 {
            bail!("[engine.slow_start] duration must be at least one second");
        }
    }

    if engine.cache.enabled && engine.cache.ttl > Duration::from_secs(1) {
        warnings.push(format!(
            "[engine.cache] ttl of {:?} exceeds one second; cached allow decisions under-charge the shared bucket for that long",
            engine.cache.ttl
        ));
    }

    Ok(warnings)
}
