use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{EmployeeId, Timesheet, TimesheetId, TimesheetStatus, WorkId};
use crate::config::MAX_PAGE_SIZE;

/// Storage abstraction so the service and orchestrator can be exercised in isolation.
///
/// Implementations are shared across concurrent requests and must synchronize internally.
pub trait TimesheetRepository: Send + Sync {
    fn save(&self, record: Timesheet) -> Result<Timesheet, RepositoryError>;
    fn fetch(&self, id: &TimesheetId) -> Result<Option<Timesheet>, RepositoryError>;
    /// Replaces the stored record only if it is still at `expected_version`.
    fn update(&self, record: Timesheet, expected_version: u64) -> Result<Timesheet, RepositoryError>;
    fn list(
        &self,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Page<Timesheet>, RepositoryError>;
    fn list_by_employee(
        &self,
        employee_id: &EmployeeId,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Page<Timesheet>, RepositoryError>;
    fn has_open_for_employee(&self, employee_id: &EmployeeId) -> Result<bool, RepositoryError>;
    /// Timesheet with the latest period end for the employee, if any.
    fn latest_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<Timesheet>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected version {expected}, stored version is {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Existence checks against the employee module.
pub trait EmployeeLookup: Send + Sync {
    fn employee_exists(&self, id: &EmployeeId) -> Result<bool, LookupError>;
}

/// Existence checks against the works ("obras") module.
pub trait WorkLookup: Send + Sync {
    fn work_exists(&self, id: &WorkId) -> Result<bool, LookupError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

/// Listing filter. `params` carries free-form query parameters through to the storage layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimesheetFilter {
    pub status: Option<TimesheetStatus>,
    pub work_id: Option<WorkId>,
    pub params: BTreeMap<String, String>,
}

impl TimesheetFilter {
    pub fn with_status(status: TimesheetStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &Timesheet) -> bool {
        self.status.map_or(true, |status| record.status() == status)
            && self.work_id.map_or(true, |work_id| record.work_id() == work_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Pages are 1-based; sizes are clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total_items: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    /// Cuts one page out of an already filtered and ordered result set.
    pub fn slice(items: Vec<T>, request: PageRequest) -> Self {
        let total_items = items.len() as u64;
        let items = items
            .into_iter()
            .skip(request.offset())
            .take(request.page_size() as usize)
            .collect();

        Self {
            items,
            pagination: Pagination {
                total_items,
                page: request.page(),
                page_size: request.page_size(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_inputs() {
        let request = PageRequest::new(0, 1_000);
        assert_eq!(request.page(), 1);
        assert_eq!(request.page_size(), MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(3, 0).page_size(), 1);
    }

    #[test]
    fn slice_reports_totals_for_partial_pages() {
        let page = Page::slice((1..=7).collect::<Vec<_>>(), PageRequest::new(2, 3));
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.pagination.total_items, 7);
        assert_eq!(page.pagination.page, 2);
        assert_eq!(page.pagination.page_size, 3);

        let past_end = Page::slice((1..=7).collect::<Vec<_>>(), PageRequest::new(5, 3));
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.pagination.total_items, 7);
    }
}
