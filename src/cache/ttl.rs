//! Named TTL classes and the policy table that maps them to durations.

use crate::cache::error::UnknownTtlClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use ts_rs::TS;

/// Longest TTL any class may be configured with.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Semantic volatility class of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum TtlClass {
    /// Frequently changing aggregates.
    Metrics,
    OneHour,
    /// Slow-changing reference lists (brand and platform catalogs).
    Long,
    /// Near-immutable lookups.
    Static,
    VeryStatic,
}

impl TtlClass {
    /// Every class, ordered by default duration, shortest first.
    pub const ALL: [TtlClass; 5] = [
        TtlClass::Metrics,
        TtlClass::OneHour,
        TtlClass::Static,
        TtlClass::Long,
        TtlClass::VeryStatic,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TtlClass::Metrics => "METRICS",
            TtlClass::OneHour => "ONE_HOUR",
            TtlClass::Long => "LONG",
            TtlClass::Static => "STATIC",
            TtlClass::VeryStatic => "VERY_STATIC",
        }
    }

    pub const fn default_ttl(self) -> Duration {
        match self {
            TtlClass::Metrics => Duration::from_secs(5 * 60),
            TtlClass::OneHour => Duration::from_secs(60 * 60),
            TtlClass::Long => Duration::from_secs(24 * 60 * 60),
            TtlClass::Static => Duration::from_secs(6 * 60 * 60),
            TtlClass::VeryStatic => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    const fn index(self) -> usize {
        match self {
            TtlClass::Metrics => 0,
            TtlClass::OneHour => 1,
            TtlClass::Long => 2,
            TtlClass::Static => 3,
            TtlClass::VeryStatic => 4,
        }
    }
}

impl fmt::Display for TtlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `METRICS`, `one_hour`, `very-static` and the like.
impl FromStr for TtlClass {
    type Err = UnknownTtlClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        TtlClass::ALL
            .into_iter()
            .find(|class| class.as_str() == normalized)
            .ok_or_else(|| UnknownTtlClass(s.to_owned()))
    }
}

/// Resolved duration for every [`TtlClass`]. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    ttls: [Duration; 5],
}

impl Default for TtlPolicy {
    fn default() -> Self {
        let mut ttls = [Duration::ZERO; 5];
        for class in TtlClass::ALL {
            ttls[class.index()] = class.default_ttl();
        }
        Self { ttls }
    }
}

impl TtlPolicy {
    pub fn resolve(&self, class: TtlClass) -> Duration {
        self.ttls[class.index()]
    }

    pub fn with_ttl(mut self, class: TtlClass, ttl: Duration) -> Self {
        self.ttls[class.index()] = ttl;
        self
    }

    /// Apply overrides keyed by class name, e.g. from `CACHE_TTL_METRICS`.
    ///
    /// Unknown names are rejected so a typo cannot silently leave a class on
    /// its default.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Result<Self, UnknownTtlClass>
    where
        I: IntoIterator<Item = (&'a str, Duration)>,
    {
        for (name, ttl) in overrides {
            let class: TtlClass = name.parse()?;
            self = self.with_ttl(class, ttl);
        }
        Ok(self)
    }

    /// `(class, ttl)` pairs in [`TtlClass::ALL`] order.
    pub fn entries(&self) -> impl Iterator<Item = (TtlClass, Duration)> + '_ {
        TtlClass::ALL
            .into_iter()
            .map(|class| (class, self.resolve(class)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_durations() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.resolve(TtlClass::Metrics), Duration::from_secs(300));
        assert_eq!(policy.resolve(TtlClass::OneHour), Duration::from_secs(3600));
        assert_eq!(policy.resolve(TtlClass::Long), Duration::from_secs(86_400));
        assert_eq!(policy.resolve(TtlClass::Static), Duration::from_secs(21_600));
        assert_eq!(policy.resolve(TtlClass::VeryStatic), Duration::from_secs(604_800));
    }

    #[test]
    fn all_is_ordered_by_default_duration() {
        let policy = TtlPolicy::default();
        let ttls: Vec<Duration> = policy.entries().map(|(_, ttl)| ttl).collect();
        assert!(ttls.windows(2).all(|w| w[0] <= w[1]), "{ttls:?}");
    }

    #[test]
    fn parses_names_loosely() {
        assert_eq!("METRICS".parse(), Ok(TtlClass::Metrics));
        assert_eq!("one_hour".parse(), Ok(TtlClass::OneHour));
        assert_eq!("very-static".parse(), Ok(TtlClass::VeryStatic));
        assert_eq!(" Long ".parse(), Ok(TtlClass::Long));
    }

    #[test]
    fn unknown_names_fail() {
        assert_eq!(
            "METRIC".parse::<TtlClass>(),
            Err(UnknownTtlClass("METRIC".to_owned()))
        );
        assert!("".parse::<TtlClass>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for class in TtlClass::ALL {
            assert_eq!(class.to_string().parse(), Ok(class));
        }
    }

    #[test]
    fn overrides_replace_only_named_classes() {
        let policy = TtlPolicy::default()
            .with_overrides([("metrics", Duration::from_secs(60))])
            .unwrap();
        assert_eq!(policy.resolve(TtlClass::Metrics), Duration::from_secs(60));
        assert_eq!(policy.resolve(TtlClass::OneHour), Duration::from_secs(3600));
    }

    #[test]
    fn overrides_reject_typos() {
        let err = TtlPolicy::default()
            .with_overrides([("metrcis", Duration::from_secs(60))])
            .unwrap_err();
        assert_eq!(err, UnknownTtlClass("metrcis".to_owned()));
    }

    #[test]
    fn serde_uses_screaming_names() {
        assert_eq!(
            serde_json::to_string(&TtlClass::VeryStatic).unwrap(),
            "\"VERY_STATIC\""
        );
    }
}
