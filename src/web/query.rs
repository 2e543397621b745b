//! Query-string filters for analytics endpoints.

use crate::filters::DashboardFilters;
use crate::web::error::{ApiError, ApiErrorCode};
use chrono::NaiveDate;
use serde::Deserialize;

/// Raw filter parameters as sent by the dashboard.
///
/// Extract with `axum_extra::extract::Query` so repeated `keyword=` params
/// collect into a list.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    pub platform: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub compare_start_date: Option<String>,
    pub compare_end_date: Option<String>,
    #[serde(default, rename = "keyword")]
    pub keywords: Vec<String>,
}

impl TryFrom<DashboardQuery> for DashboardFilters {
    type Error = ApiError;

    fn try_from(query: DashboardQuery) -> Result<Self, Self::Error> {
        let start_date = parse_date("startDate", query.start_date)?;
        let end_date = parse_date("endDate", query.end_date)?;
        let compare_start_date = parse_date("compareStartDate", query.compare_start_date)?;
        let compare_end_date = parse_date("compareEndDate", query.compare_end_date)?;
        check_range("startDate", start_date, "endDate", end_date)?;
        check_range(
            "compareStartDate",
            compare_start_date,
            "compareEndDate",
            compare_end_date,
        )?;

        Ok(DashboardFilters {
            platform: non_empty(query.platform),
            brand: non_empty(query.brand),
            category: non_empty(query.category),
            location: non_empty(query.location),
            start_date,
            end_date,
            compare_start_date,
            compare_end_date,
            keywords: query
                .keywords
                .into_iter()
                .filter_map(|k| non_empty(Some(k)))
                .collect(),
        })
    }
}

/// Blank parameters (`?brand=`) mean the same as absent ones.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    let Some(raw) = non_empty(value) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| {
            ApiError::new(
                ApiErrorCode::InvalidFilters,
                format!("Invalid {field} '{raw}'. Expected YYYY-MM-DD"),
            )
        })
}

fn check_range(
    start_field: &str,
    start: Option<NaiveDate>,
    end_field: &str,
    end: Option<NaiveDate>,
) -> Result<(), ApiError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(ApiError::new(
            ApiErrorCode::InvalidFilters,
            format!("{start_field} ({start}) is after {end_field} ({end})"),
        )),
        _ => Ok(()),
    }
}
