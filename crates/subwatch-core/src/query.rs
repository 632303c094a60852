//! Query filters and pagination shared by stores and the HTTP surface

use crate::error::MonitorError;
use crate::types::{Pathway, ProgressStatus, ProjectId, Stage, SubmissionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Validated limit/offset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Pagination {
    /// Largest page for submission listings
    pub const MAX_LISTING: usize = 100;

    /// Largest page for health history
    pub const MAX_HEALTH: usize = 500;

    /// Validate `limit` within `1..=max`
    ///
    /// # Errors
    /// `MonitorError::Validation` when the limit is out of range
    pub fn new(limit: usize, offset: usize, max: usize) -> Result<Self, MonitorError> {
        if limit == 0 || limit > max {
            return Err(MonitorError::validation(format!(
                "limit must be between 1 and {max}, got {limit}"
            )));
        }
        Ok(Self { limit, offset })
    }

    /// Unchecked page, for internal full scans
    #[inline]
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            limit: usize::MAX,
            offset: 0,
        }
    }

    /// Slice a fully materialized result set
    #[must_use]
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let items = items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect();
        Page {
            items,
            total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matching rows before pagination
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl<T> Page<T> {
    /// Transform page items, keeping paging metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Half-open `[start, end)` time window; either bound optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Create range, rejecting inverted bounds
    ///
    /// # Errors
    /// `MonitorError::Validation` when `start > end`
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, MonitorError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(MonitorError::validation("start must not be after end"));
            }
        }
        Ok(Self { start, end })
    }

    /// Whether `at` falls in the window
    #[inline]
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }
}

/// Filtered listing of progress events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub stage: Option<Stage>,
    pub status: Option<ProgressStatus>,
    pub project_id: Option<ProjectId>,
    pub range: DateRange,
    pub page: Pagination,
}

impl EventQuery {
    /// All failed events
    #[must_use]
    pub fn failed() -> Self {
        Self {
            status: Some(ProgressStatus::Failed),
            page: Pagination::unbounded(),
            ..Self::default()
        }
    }
}

/// Order of snapshot listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SnapshotOrder {
    /// Most recent activity first
    #[default]
    RecentActivity,
    /// Newest submissions first
    Created,
}

/// Filtered listing of submission snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotQuery {
    pub project_id: Option<ProjectId>,
    pub status: Option<SubmissionStatus>,
    pub pathway: Option<Pathway>,
    /// Filters on submission creation time
    pub created: DateRange,
    pub order: SnapshotOrder,
    pub page: Pagination,
}

impl SnapshotQuery {
    /// Every snapshot, unpaged
    #[must_use]
    pub fn all() -> Self {
        Self {
            page: Pagination::unbounded(),
            ..Self::default()
        }
    }

    /// Restrict to a project
    #[must_use]
    pub fn for_project(mut self, project_id: Option<ProjectId>) -> Self {
        self.project_id = project_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn pagination_bounds() {
        assert!(Pagination::new(0, 0, Pagination::MAX_LISTING).is_err());
        assert!(Pagination::new(101, 0, Pagination::MAX_LISTING).is_err());
        assert!(Pagination::new(100, 0, Pagination::MAX_LISTING).is_ok());
        assert!(Pagination::new(500, 0, Pagination::MAX_HEALTH).is_ok());
    }

    #[test]
    fn pagination_slices_and_counts() {
        let page = Pagination::new(2, 1, 10).unwrap().apply(vec![1, 2, 3, 4]);
        assert_eq!(page.items, vec![2, 3]);
        assert_eq!(page.total, 4);
    }

    #[test]
    fn date_range_is_half_open() {
        let start = Utc::now();
        let end = start + Duration::hours(1);
        let range = DateRange::new(Some(start), Some(end)).unwrap();
        assert!(range.contains(start));
        assert!(!range.contains(end));
        assert!(DateRange::new(Some(end), Some(start)).is_err());
    }
}
