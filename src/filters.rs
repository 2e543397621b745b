//! Typed dashboard filters and the fixed set of cached endpoints.

use crate::cache::{CacheKey, KeyEncodingError, TtlClass};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A cached analytics endpoint. The label doubles as the cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Namespace {
    SummaryMetrics,
    TrendData,
    Offtake,
    Availability,
    ShareOfSearch,
    AdPerformance,
    Brands,
    Categories,
    Platforms,
}

impl Namespace {
    pub const ALL: [Namespace; 9] = [
        Namespace::SummaryMetrics,
        Namespace::TrendData,
        Namespace::Offtake,
        Namespace::Availability,
        Namespace::ShareOfSearch,
        Namespace::AdPerformance,
        Namespace::Brands,
        Namespace::Categories,
        Namespace::Platforms,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Namespace::SummaryMetrics => "summary-metrics",
            Namespace::TrendData => "trend-data",
            Namespace::Offtake => "offtake",
            Namespace::Availability => "availability",
            Namespace::ShareOfSearch => "share-of-search",
            Namespace::AdPerformance => "ad-performance",
            Namespace::Brands => "brands",
            Namespace::Categories => "categories",
            Namespace::Platforms => "platforms",
        }
    }

    /// How long results for this endpoint stay fresh.
    pub const fn ttl_class(self) -> TtlClass {
        match self {
            Namespace::SummaryMetrics
            | Namespace::TrendData
            | Namespace::Offtake
            | Namespace::AdPerformance => TtlClass::Metrics,
            Namespace::Availability | Namespace::ShareOfSearch => TtlClass::OneHour,
            Namespace::Brands => TtlClass::Long,
            Namespace::Categories => TtlClass::Static,
            Namespace::Platforms => TtlClass::VeryStatic,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown endpoint `{0}`")]
pub struct UnknownNamespace(pub String);

impl FromStr for Namespace {
    type Err = UnknownNamespace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.label() == s)
            .ok_or_else(|| UnknownNamespace(s.to_owned()))
    }
}

/// Filters accepted by every analytics endpoint.
///
/// `None` and `"All"` both mean "unfiltered" and produce the same cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFilters {
    pub platform: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub compare_start_date: Option<NaiveDate>,
    pub compare_end_date: Option<NaiveDate>,
    /// Share-of-search keywords, in the order the client sent them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl DashboardFilters {
    pub fn cache_key(&self, namespace: Namespace) -> Result<CacheKey, KeyEncodingError> {
        CacheKey::new(namespace.label(), self)
    }

    /// Flatten into query-string pairs; list filters repeat their key.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let scalars = [
            ("platform", &self.platform),
            ("brand", &self.brand),
            ("category", &self.category),
            ("location", &self.location),
        ];
        for (name, value) in scalars {
            if let Some(value) = value {
                pairs.push((name, value.clone()));
            }
        }
        let dates = [
            ("startDate", self.start_date),
            ("endDate", self.end_date),
            ("compareStartDate", self.compare_start_date),
            ("compareEndDate", self.compare_end_date),
        ];
        for (name, date) in dates {
            if let Some(date) = date {
                pairs.push((name, date.format("%Y-%m-%d").to_string()));
            }
        }
        pairs.extend(self.keywords.iter().map(|k| ("keyword", k.clone())));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn namespace_labels_round_trip() {
        for ns in Namespace::ALL {
            assert_eq!(ns.label().parse(), Ok(ns));
        }
        assert_eq!(
            "summary".parse::<Namespace>(),
            Err(UnknownNamespace("summary".to_owned()))
        );
    }

    #[test]
    fn reference_lists_outlive_metrics() {
        assert_eq!(Namespace::SummaryMetrics.ttl_class(), TtlClass::Metrics);
        assert_eq!(Namespace::Brands.ttl_class(), TtlClass::Long);
        assert_eq!(Namespace::Platforms.ttl_class(), TtlClass::VeryStatic);
    }

    #[test]
    fn all_brand_matches_unfiltered_brand() {
        let with_all = DashboardFilters {
            platform: Some("Zepto".into()),
            brand: Some("All".into()),
            ..Default::default()
        };
        let without = DashboardFilters {
            platform: Some("Zepto".into()),
            ..Default::default()
        };
        assert_eq!(
            with_all.cache_key(Namespace::SummaryMetrics).unwrap(),
            without.cache_key(Namespace::SummaryMetrics).unwrap()
        );
    }

    #[test]
    fn dates_are_part_of_the_key() {
        let filters = DashboardFilters {
            platform: Some("Zepto".into()),
            start_date: Some(date("2025-10-01")),
            end_date: Some(date("2025-10-06")),
            ..Default::default()
        };
        assert_eq!(
            filters.cache_key(Namespace::SummaryMetrics).unwrap().as_str(),
            r#"summary-metrics:{"endDate":"2025-10-06","platform":"Zepto","startDate":"2025-10-01"}"#
        );
    }

    #[test]
    fn query_pairs_repeat_list_filters() {
        let filters = DashboardFilters {
            brand: Some("Amul".into()),
            end_date: Some(date("2025-10-06")),
            keywords: vec!["milk".into(), "butter".into()],
            ..Default::default()
        };
        assert_eq!(
            filters.query_pairs(),
            vec![
                ("brand", "Amul".to_owned()),
                ("endDate", "2025-10-06".to_owned()),
                ("keyword", "milk".to_owned()),
                ("keyword", "butter".to_owned()),
            ]
        );
    }
}
