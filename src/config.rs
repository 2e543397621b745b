//! Environment-driven configuration.
//!
//! Everything comes from process environment (after `.env` is loaded), via
//! figment. Durations accept either bare seconds (`300`) or human strings
//! (`5m`, `1h`, `750ms`). TTL overrides live under their own prefix:
//! `CACHE_TTL_METRICS=2m`, `CACHE_TTL_VERY_STATIC=14d`.

use crate::cache::{MAX_TTL, TtlClass, TtlPolicy};
use crate::utils::fmt_duration;
use anyhow::{Context, bail};
use figment::Figment;
use figment::providers::Env;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::time::Duration;

const TTL_ENV_PREFIX: &str = "CACHE_TTL_";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Grace period for in-flight requests after a shutdown signal.
    #[serde(default = "default_shutdown_timeout", deserialize_with = "duration")]
    pub shutdown_timeout: Duration,

    /// Base URL of the analytics query service the cache sits in front of.
    pub analytics_upstream_url: String,
    #[serde(default = "default_upstream_timeout", deserialize_with = "duration")]
    pub upstream_timeout: Duration,

    #[serde(default = "default_sweep_interval", deserialize_with = "duration")]
    pub cache_sweep_interval: Duration,
    /// How long a request waits on a computation before answering 504.
    #[serde(default, deserialize_with = "optional_duration")]
    pub cache_wait_timeout: Option<Duration>,
    #[serde(default)]
    pub cache_max_entries: Option<usize>,
    /// Bearer token for `/api/cache` administration; unset disables those routes.
    #[serde(default)]
    pub cache_admin_token: Option<String>,

    #[serde(skip)]
    pub ttl_policy: TtlPolicy,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::extract(
            &Figment::new().merge(Env::raw()),
            &Figment::new().merge(Env::prefixed(TTL_ENV_PREFIX)),
        )
    }

    /// Build from explicit figments: `main` for the flat settings, `ttl` for
    /// per-class TTL overrides keyed by class name.
    pub fn extract(main: &Figment, ttl: &Figment) -> anyhow::Result<Self> {
        let mut config: Config = main.extract().context("Failed to load config")?;

        let overrides: BTreeMap<String, DurationSetting> =
            ttl.extract().context("Failed to load TTL overrides")?;
        let mut parsed = Vec::with_capacity(overrides.len());
        for (name, setting) in &overrides {
            let ttl = setting
                .to_duration()
                .with_context(|| format!("Invalid duration for {TTL_ENV_PREFIX}{}", name.to_uppercase()))?;
            parsed.push((name.as_str(), ttl));
        }
        config.ttl_policy = TtlPolicy::default()
            .with_overrides(parsed)
            .with_context(|| format!("Invalid {TTL_ENV_PREFIX}* variable"))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for class in TtlClass::ALL {
            let ttl = self.ttl_policy.resolve(class);
            if ttl.is_zero() {
                bail!("TTL for {class} must be greater than zero");
            }
            if ttl > MAX_TTL {
                bail!("TTL for {class} must be at most {}", fmt_duration(MAX_TTL));
            }
        }
        if self.cache_sweep_interval.is_zero() {
            bail!("CACHE_SWEEP_INTERVAL must be greater than zero");
        }
        if self.cache_max_entries == Some(0) {
            bail!("CACHE_MAX_ENTRIES must be greater than zero when set");
        }
        if self
            .cache_admin_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            bail!("CACHE_ADMIN_TOKEN must not be blank when set");
        }
        if self.cache_wait_timeout.is_some_and(|t| t.is_zero()) {
            bail!("CACHE_WAIT_TIMEOUT must be greater than zero when set");
        }
        Ok(())
    }
}

/// A duration as it appears in the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DurationSetting {
    Seconds(u64),
    Text(String),
}

impl DurationSetting {
    fn to_duration(&self) -> anyhow::Result<Duration> {
        match self {
            DurationSetting::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationSetting::Text(text) => {
                let text = text.trim();
                if let Ok(secs) = text.parse::<u64>() {
                    return Ok(Duration::from_secs(secs));
                }
                fundu::parse_duration(text)
                    .with_context(|| format!("`{text}` is not a duration"))
            }
        }
    }
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    DurationSetting::deserialize(deserializer)?
        .to_duration()
        .map_err(serde::de::Error::custom)
}

fn optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<DurationSetting>::deserialize(deserializer)?
        .map(|setting| setting.to_duration())
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    fn base() -> Figment {
        Figment::new().merge(Serialized::default("analytics_upstream_url", "http://upstream"))
    }

    #[test]
    fn defaults_apply() {
        let config = Config::extract(&base(), &Figment::new()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(8));
        assert_eq!(config.cache_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.cache_wait_timeout, None);
        assert_eq!(config.cache_max_entries, None);
        assert_eq!(config.cache_admin_token, None);
        assert_eq!(config.ttl_policy, TtlPolicy::default());
    }

    #[test]
    fn durations_accept_seconds_and_human_strings() {
        let main = base()
            .merge(Serialized::default("shutdown_timeout", 3))
            .merge(Serialized::default("cache_wait_timeout", "1500ms"))
            .merge(Serialized::default("cache_sweep_interval", "2m"));
        let config = Config::extract(&main, &Figment::new()).unwrap();
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.cache_wait_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.cache_sweep_interval, Duration::from_secs(120));
    }

    #[test]
    fn ttl_overrides_apply_by_class_name() {
        let ttl = Figment::new()
            .merge(Serialized::default("metrics", "90s"))
            .merge(Serialized::default("very_static", 3600));
        let config = Config::extract(&base(), &ttl).unwrap();
        assert_eq!(config.ttl_policy.resolve(TtlClass::Metrics), Duration::from_secs(90));
        assert_eq!(config.ttl_policy.resolve(TtlClass::VeryStatic), Duration::from_secs(3600));
        assert_eq!(config.ttl_policy.resolve(TtlClass::Long), TtlClass::Long.default_ttl());
    }

    #[test]
    fn unknown_ttl_class_fails_loading() {
        let ttl = Figment::new().merge(Serialized::default("metric", 60));
        let err = Config::extract(&base(), &ttl).unwrap_err();
        assert!(format!("{err:#}").contains("unknown TTL class `metric`"), "{err:#}");
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let ttl = Figment::new().merge(Serialized::default("metrics", 0));
        assert!(Config::extract(&base(), &ttl).is_err());
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        let ttl = Figment::new().merge(Serialized::default("metrics", "18446744073709551615"));
        let err = Config::extract(&base(), &ttl).unwrap_err();
        assert!(format!("{err:#}").contains("TTL for METRICS must be at most"), "{err:#}");

        let ttl = Figment::new().merge(Serialized::default("very_static", 31_536_000));
        assert!(Config::extract(&base(), &ttl).is_ok());
    }

    #[test]
    fn blank_admin_token_is_rejected() {
        let main = base().merge(Serialized::default("cache_admin_token", "  "));
        assert!(Config::extract(&main, &Figment::new()).is_err());
    }

    #[test]
    fn missing_upstream_is_an_error() {
        assert!(Config::extract(&Figment::new(), &Figment::new()).is_err());
    }

    #[test]
    fn garbage_duration_is_an_error() {
        let main = base().merge(Serialized::default("cache_wait_timeout", "soon"));
        assert!(Config::extract(&main, &Figment::new()).is_err());
    }
}
