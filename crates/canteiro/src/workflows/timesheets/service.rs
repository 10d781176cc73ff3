use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{
    parse_calendar_date, Compensation, EmployeeId, InvalidStateTransition, NegativeAmount,
    PeriodError, Timesheet, TimesheetChanges, TimesheetId, TimesheetOperation, WorkId,
    WorkPeriod,
};
use super::events::{EventPublisher, PaymentCompleted};
use super::repository::{
    EmployeeLookup, LookupError, Page, PageRequest, RepositoryError, TimesheetFilter,
    TimesheetRepository, WorkLookup,
};

/// Time source, injectable so transitions can be asserted deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Request to open a timesheet. Period bounds arrive as `YYYY-MM-DD` strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTimesheet {
    pub employee_id: EmployeeId,
    pub work_id: WorkId,
    pub period_start: String,
    pub period_end: String,
    pub daily_rate: Decimal,
    pub days_worked: u32,
    #[serde(default)]
    pub additions: Decimal,
    #[serde(default)]
    pub deductions: Decimal,
    #[serde(default)]
    pub advances: Decimal,
}

/// Full replacement of the mutable fields of an open timesheet.
pub type TimesheetEdit = NewTimesheet;

impl NewTimesheet {
    fn compensation(&self) -> Compensation {
        Compensation {
            daily_rate: self.daily_rate,
            days_worked: self.days_worked,
            additions: self.additions,
            deductions: self.deductions,
            advances: self.advances,
        }
    }
}

/// Orchestrates validation, aggregate transitions, persistence and events for single
/// timesheets.
pub struct TimesheetService<R, L, P> {
    repository: Arc<R>,
    directory: Arc<L>,
    events: Arc<P>,
    clock: Arc<dyn Clock>,
    payment_account: String,
    default_page_size: u32,
}

impl<R, L, P> TimesheetService<R, L, P>
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        directory: Arc<L>,
        events: Arc<P>,
        payment_account: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            directory,
            events,
            clock: Arc::new(SystemClock),
            payment_account: payment_account.into(),
            default_page_size: 20,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn repository(&self) -> Arc<R> {
        self.repository.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn page_request(&self, page: Option<u32>, page_size: Option<u32>) -> PageRequest {
        PageRequest::new(
            page.unwrap_or(1),
            page_size.unwrap_or(self.default_page_size),
        )
    }

    /// Open a new timesheet after validating references, period and amounts.
    pub fn create(&self, request: NewTimesheet) -> Result<Timesheet, TimesheetServiceError> {
        self.ensure_employee(&request.employee_id)?;
        self.ensure_work(&request.work_id)?;

        let period = WorkPeriod::parse(&request.period_start, &request.period_end)?;
        let compensation = request.compensation();
        compensation.validate()?;

        let record = Timesheet::open(
            request.employee_id,
            request.work_id,
            period,
            compensation,
            self.clock.now(),
        );
        let stored = self.repository.save(record)?;

        info!(
            timesheet_id = %stored.id(),
            employee_id = %stored.employee_id(),
            total = %stored.total(),
            "timesheet opened"
        );
        Ok(stored)
    }

    pub fn get(&self, id: &TimesheetId) -> Result<Timesheet, TimesheetServiceError> {
        self.load(id)
    }

    pub fn approve(&self, id: &TimesheetId) -> Result<Timesheet, TimesheetServiceError> {
        let current = self.load(id)?;
        let expected_version = current.version();
        let approved = current.approve(self.clock.now())?;
        let stored = self.persist(approved, expected_version)?;

        info!(timesheet_id = %stored.id(), "timesheet approved for payment");
        Ok(stored)
    }

    /// Pay an open or approved timesheet and notify the ledger.
    pub fn register_payment(&self, id: &TimesheetId) -> Result<Timesheet, TimesheetServiceError> {
        let current = self.load(id)?;
        let expected_version = current.version();
        let paid = current.register_payment(self.clock.now())?;
        let stored = self.persist(paid, expected_version)?;

        self.publish_payment(&stored);
        Ok(stored)
    }

    /// Fast path: pay an open timesheet without a separate approval step.
    pub fn approve_and_pay(&self, id: &TimesheetId) -> Result<Timesheet, TimesheetServiceError> {
        let current = self.load(id)?;
        let expected_version = current.version();
        let paid = current.approve_and_pay(self.clock.now())?;
        let stored = self.persist(paid, expected_version)?;

        self.publish_payment(&stored);
        Ok(stored)
    }

    /// Replace the mutable fields of an open timesheet. Locked records are refused before
    /// amounts or references are looked at.
    pub fn edit(
        &self,
        id: &TimesheetId,
        request: TimesheetEdit,
    ) -> Result<Timesheet, TimesheetServiceError> {
        let current = self.load(id)?;

        let start = parse_calendar_date(&request.period_start)?;
        let end = parse_calendar_date(&request.period_end)?;
        if !current.is_open() {
            return Err(InvalidStateTransition {
                id: current.id(),
                operation: TimesheetOperation::Edit,
                from: current.status(),
            }
            .into());
        }

        let period = WorkPeriod::new(start, end)?;
        let compensation = request.compensation();
        compensation.validate()?;

        if request.employee_id != current.employee_id() {
            self.ensure_employee(&request.employee_id)?;
        }
        if request.work_id != current.work_id() {
            self.ensure_work(&request.work_id)?;
        }

        let expected_version = current.version();
        let edited = current.edit(
            TimesheetChanges {
                employee_id: request.employee_id,
                work_id: request.work_id,
                period,
                compensation,
            },
            self.clock.now(),
        )?;
        let stored = self.persist(edited, expected_version)?;

        info!(timesheet_id = %stored.id(), total = %stored.total(), "timesheet edited");
        Ok(stored)
    }

    pub fn list(
        &self,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Page<Timesheet>, TimesheetServiceError> {
        Ok(self.repository.list(filter, page)?)
    }

    pub fn list_by_employee(
        &self,
        employee_id: &EmployeeId,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Page<Timesheet>, TimesheetServiceError> {
        Ok(self.repository.list_by_employee(employee_id, filter, page)?)
    }

    fn load(&self, id: &TimesheetId) -> Result<Timesheet, TimesheetServiceError> {
        self.repository
            .fetch(id)?
            .ok_or(TimesheetServiceError::NotFound(*id))
    }

    fn persist(
        &self,
        record: Timesheet,
        expected_version: u64,
    ) -> Result<Timesheet, TimesheetServiceError> {
        let id = record.id();
        match self.repository.update(record, expected_version) {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::VersionConflict { .. }) => {
                Err(TimesheetServiceError::ConcurrentModification(id))
            }
            Err(RepositoryError::NotFound) => Err(TimesheetServiceError::NotFound(id)),
            Err(other) => Err(other.into()),
        }
    }

    fn publish_payment(&self, record: &Timesheet) {
        let published = PaymentCompleted::from_timesheet(record, &self.payment_account)
            .into_event()
            .and_then(|event| self.events.publish(event));

        match published {
            Ok(()) => info!(
                timesheet_id = %record.id(),
                amount = %record.total(),
                "timesheet paid"
            ),
            Err(err) => warn!(
                timesheet_id = %record.id(),
                error = %err,
                "timesheet paid but payment event was not published"
            ),
        }
    }

    fn ensure_employee(&self, id: &EmployeeId) -> Result<(), TimesheetServiceError> {
        if self.directory.employee_exists(id)? {
            Ok(())
        } else {
            Err(TimesheetServiceError::ReferenceNotFound {
                kind: ReferenceKind::Employee,
                id: id.0,
            })
        }
    }

    fn ensure_work(&self, id: &WorkId) -> Result<(), TimesheetServiceError> {
        if self.directory.work_exists(id)? {
            Ok(())
        } else {
            Err(TimesheetServiceError::ReferenceNotFound {
                kind: ReferenceKind::Work,
                id: id.0,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Employee,
    Work,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Employee => f.write_str("employee"),
            ReferenceKind::Work => f.write_str("work"),
        }
    }
}

/// Error raised by the timesheet service.
#[derive(Debug, thiserror::Error)]
pub enum TimesheetServiceError {
    #[error("{kind} {id} does not exist")]
    ReferenceNotFound { kind: ReferenceKind, id: Uuid },
    #[error("timesheet {0} not found")]
    NotFound(TimesheetId),
    #[error("'{value}' is not a valid YYYY-MM-DD date")]
    InvalidDateFormat { value: String },
    #[error("period start {start} must be before end {end}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },
    #[error(transparent)]
    NegativeAmount(#[from] NegativeAmount),
    #[error(transparent)]
    InvalidStateTransition(#[from] InvalidStateTransition),
    #[error("timesheet {0} was modified concurrently; reload and retry")]
    ConcurrentModification(TimesheetId),
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl From<PeriodError> for TimesheetServiceError {
    fn from(value: PeriodError) -> Self {
        match value {
            PeriodError::InvalidDate { value } => Self::InvalidDateFormat { value },
            PeriodError::StartNotBeforeEnd { start, end } => Self::InvalidPeriod { start, end },
        }
    }
}
