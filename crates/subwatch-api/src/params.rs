//! Query-string parsing
//!
//! Query parameters arrive as raw strings and are validated here so that
//! every malformed value maps to a `validation` error with a useful message
//! instead of a generic query rejection.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use subwatch_core::{
    DateRange, MonitorError, MonitorResult, Pagination, Pathway, ProjectId, RetryStatus,
    SnapshotOrder, SnapshotQuery, SubmissionStatus,
};

/// `limit` default when omitted
const DEFAULT_LIMIT: usize = 20;

/// `/health/detailed` default `limit`
const DEFAULT_HEALTH_LIMIT: usize = 100;

fn parse<T: FromStr>(name: &str, value: Option<&str>) -> MonitorResult<Option<T>> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| MonitorError::validation(format!("invalid {name}: {v}")))
        })
        .transpose()
}

fn parse_time(name: &str, value: Option<&str>) -> MonitorResult<Option<DateTime<Utc>>> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| MonitorError::validation(format!("{name} must be RFC 3339, got {v}")))
        })
        .transpose()
}

fn page(limit: Option<&str>, offset: Option<&str>, default: usize, max: usize) -> MonitorResult<Pagination> {
    let limit = parse::<usize>("limit", limit)?.unwrap_or(default);
    let offset = parse::<usize>("offset", offset)?.unwrap_or(0);
    Pagination::new(limit, offset, max)
}

/// `/submissions/overview` filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewParams {
    pub project_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl OverviewParams {
    /// Validated project filter and creation window
    ///
    /// # Errors
    /// `MonitorError::Validation` for a malformed value
    pub fn parse(&self) -> MonitorResult<(Option<ProjectId>, DateRange)> {
        let project_id = parse("projectId", self.project_id.as_deref())?;
        let range = DateRange::new(
            parse_time("start", self.start.as_deref())?,
            parse_time("end", self.end.as_deref())?,
        )?;
        Ok((project_id, range))
    }
}

/// Submission listing filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub project_id: Option<String>,
    pub status: Option<String>,
    pub pathway: Option<String>,
}

/// Which listing a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    /// Newest submissions first
    Recent,
    /// Failed submissions, most recent activity first
    Failed,
    /// Submissions in a required status
    ByStatus,
}

impl ListingParams {
    /// Build the snapshot query for a listing
    ///
    /// # Errors
    /// `MonitorError::Validation` for a malformed value, or a missing
    /// `status` on the by-status listing
    pub fn query(&self, listing: Listing) -> MonitorResult<SnapshotQuery> {
        let status: Option<SubmissionStatus> = parse("status", self.status.as_deref())?;
        let (status, order) = match listing {
            Listing::Recent => (status, SnapshotOrder::Created),
            Listing::Failed => (Some(SubmissionStatus::Failed), SnapshotOrder::RecentActivity),
            Listing::ByStatus => (
                Some(status.ok_or_else(|| MonitorError::validation("status is required"))?),
                SnapshotOrder::RecentActivity,
            ),
        };
        Ok(SnapshotQuery {
            project_id: parse("projectId", self.project_id.as_deref())?,
            status,
            pathway: self
                .pathway
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(Pathway::new),
            created: DateRange::default(),
            order,
            page: page(
                self.limit.as_deref(),
                self.offset.as_deref(),
                DEFAULT_LIMIT,
                Pagination::MAX_LISTING,
            )?,
        })
    }
}

/// Retry task listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryListParams {
    pub status: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl RetryListParams {
    /// Validated status filter and page
    ///
    /// # Errors
    /// `MonitorError::Validation` for a malformed value
    pub fn parse(&self) -> MonitorResult<(Option<RetryStatus>, Pagination)> {
        Ok((
            parse("status", self.status.as_deref())?,
            page(
                self.limit.as_deref(),
                self.offset.as_deref(),
                DEFAULT_LIMIT,
                Pagination::MAX_LISTING,
            )?,
        ))
    }
}

/// `/health/detailed` filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthHistoryParams {
    pub since: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl HealthHistoryParams {
    /// Validated lower bound and page
    ///
    /// # Errors
    /// `MonitorError::Validation` for a malformed value
    pub fn parse(&self) -> MonitorResult<(Option<DateTime<Utc>>, Pagination)> {
        Ok((
            parse_time("since", self.since.as_deref())?,
            page(
                self.limit.as_deref(),
                self.offset.as_deref(),
                DEFAULT_HEALTH_LIMIT,
                Pagination::MAX_HEALTH,
            )?,
        ))
    }
}

/// Optional project filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectParams {
    pub project_id: Option<String>,
}

impl ProjectParams {
    /// Validated project filter
    ///
    /// # Errors
    /// `MonitorError::Validation` for a malformed id
    pub fn parse(&self) -> MonitorResult<Option<ProjectId>> {
        parse("projectId", self.project_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn listing(limit: Option<&str>, status: Option<&str>) -> ListingParams {
        ListingParams {
            limit: limit.map(String::from),
            status: status.map(String::from),
            ..ListingParams::default()
        }
    }

    #[test]
    fn listing_defaults_and_bounds() {
        let query = listing(None, None).query(Listing::Recent).unwrap();
        assert_eq!(query.page, Pagination { limit: 20, offset: 0 });
        assert_eq!(query.order, SnapshotOrder::Created);

        assert!(listing(Some("0"), None).query(Listing::Recent).is_err());
        assert!(listing(Some("101"), None).query(Listing::Recent).is_err());
        assert!(listing(Some("ten"), None).query(Listing::Recent).is_err());
        assert!(listing(Some("100"), None).query(Listing::Recent).is_ok());
    }

    #[test]
    fn listing_status_rules() {
        let failed = listing(None, Some("completed")).query(Listing::Failed).unwrap();
        assert_eq!(failed.status, Some(SubmissionStatus::Failed));

        assert!(listing(None, None).query(Listing::ByStatus).is_err());
        let err = listing(None, Some("stuck")).query(Listing::ByStatus).unwrap_err();
        assert!(err.to_string().contains("invalid status: stuck"));

        let by = listing(None, Some("in_progress")).query(Listing::ByStatus).unwrap();
        assert_eq!(by.status, Some(SubmissionStatus::InProgress));
    }

    #[test]
    fn overview_range_validation() {
        let params = OverviewParams {
            start: Some("2026-03-02T00:00:00Z".into()),
            end: Some("2026-03-01T00:00:00Z".into()),
            ..OverviewParams::default()
        };
        assert!(params.parse().is_err());

        let params = OverviewParams {
            start: Some("yesterday".into()),
            ..OverviewParams::default()
        };
        assert!(params.parse().is_err());

        let params = OverviewParams {
            project_id: Some("not-a-uuid".into()),
            ..OverviewParams::default()
        };
        assert!(params.parse().is_err());
    }

    #[test]
    fn health_history_allows_larger_pages() {
        let params = HealthHistoryParams {
            limit: Some("500".into()),
            ..HealthHistoryParams::default()
        };
        assert_eq!(params.parse().unwrap().1.limit, 500);

        let (since, page) = HealthHistoryParams::default().parse().unwrap();
        assert_eq!((since, page.limit), (None, 100));

        let params = HealthHistoryParams {
            limit: Some("501".into()),
            ..HealthHistoryParams::default()
        };
        assert!(params.parse().is_err());
    }

    #[test]
    fn retry_status_filter() {
        let params = RetryListParams {
            status: Some("exhausted".into()),
            ..RetryListParams::default()
        };
        assert_eq!(params.parse().unwrap().0, Some(RetryStatus::Exhausted));

        let params = RetryListParams {
            status: Some("done".into()),
            ..RetryListParams::default()
        };
        assert!(params.parse().is_err());
    }
}
