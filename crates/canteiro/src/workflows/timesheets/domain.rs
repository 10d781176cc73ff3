use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use crate::registry::{EmployeeId, WorkId};

/// Identifier wrapper for timesheets ("apontamentos").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimesheetId(pub Uuid);

impl TimesheetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TimesheetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimesheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status. `Paid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimesheetStatus {
    Open,
    ApprovedForPayment,
    Paid,
}

impl TimesheetStatus {
    pub const fn label(self) -> &'static str {
        match self {
            TimesheetStatus::Open => "OPEN",
            TimesheetStatus::ApprovedForPayment => "APPROVED_FOR_PAYMENT",
            TimesheetStatus::Paid => "PAID",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "APPROVED_FOR_PAYMENT" => Some(Self::ApprovedForPayment),
            "PAID" => Some(Self::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for TimesheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
    #[error("'{value}' is not a valid YYYY-MM-DD date")]
    InvalidDate { value: String },
    #[error("period start {start} must be before end {end}")]
    StartNotBeforeEnd { start: NaiveDate, end: NaiveDate },
}

/// Parses a zero-padded `YYYY-MM-DD` date. chrono alone would accept `2025-1-5` or a signed
/// year, so the shape is checked first.
pub fn parse_calendar_date(raw: &str) -> Result<NaiveDate, PeriodError> {
    let invalid = || PeriodError::InvalidDate {
        value: raw.to_string(),
    };

    let trimmed = raw.trim();
    let well_shaped = trimmed.len() == 10
        && trimmed.bytes().enumerate().all(|(index, byte)| match index {
            4 | 7 => byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !well_shaped {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())
}

/// Inclusive calendar range covered by one timesheet (a "quinzena").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl WorkPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if start >= end {
            return Err(PeriodError::StartNotBeforeEnd { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, PeriodError> {
        Self::new(parse_calendar_date(start)?, parse_calendar_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Days between start and end; a 1st..15th period spans 14.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Period starting the day after this one ends, with the same span.
    pub fn following(&self) -> Option<Self> {
        let start = self.end.succ_opt()?;
        let end = start.checked_add_signed(Duration::days(self.span_days()))?;
        Some(Self { start, end })
    }

    pub fn label(&self) -> String {
        format!(
            "{} a {}",
            self.start.format("%d/%m/%Y"),
            self.end.format("%d/%m/%Y")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{field} must not be negative")]
pub struct NegativeAmount {
    pub field: &'static str,
}

/// Financial inputs of a timesheet. All amounts share one currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compensation {
    pub daily_rate: Decimal,
    pub days_worked: u32,
    #[serde(default)]
    pub additions: Decimal,
    #[serde(default)]
    pub deductions: Decimal,
    #[serde(default)]
    pub advances: Decimal,
}

impl Compensation {
    /// Keeps the rate and clears every transactional field.
    pub fn zeroed(daily_rate: Decimal) -> Self {
        Self {
            daily_rate,
            days_worked: 0,
            additions: Decimal::ZERO,
            deductions: Decimal::ZERO,
            advances: Decimal::ZERO,
        }
    }

    /// (daily rate x days worked) + additions - deductions - advances
    pub fn total(&self) -> Decimal {
        self.daily_rate * Decimal::from(self.days_worked) + self.additions
            - self.deductions
            - self.advances
    }

    pub fn validate(&self) -> Result<(), NegativeAmount> {
        let amounts = [
            ("daily_rate", self.daily_rate),
            ("additions", self.additions),
            ("deductions", self.deductions),
            ("advances", self.advances),
        ];

        match amounts
            .into_iter()
            .find(|(_, amount)| amount.is_sign_negative() && !amount.is_zero())
        {
            Some((field, _)) => Err(NegativeAmount { field }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimesheetOperation {
    Approve,
    RegisterPayment,
    ApproveAndPay,
    Edit,
}

impl TimesheetOperation {
    pub const fn label(self) -> &'static str {
        match self {
            TimesheetOperation::Approve => "approve",
            TimesheetOperation::RegisterPayment => "register payment for",
            TimesheetOperation::ApproveAndPay => "approve and pay",
            TimesheetOperation::Edit => "edit",
        }
    }
}

impl fmt::Display for TimesheetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {operation} timesheet {id} while it is {from}")]
pub struct InvalidStateTransition {
    pub id: TimesheetId,
    pub operation: TimesheetOperation,
    pub from: TimesheetStatus,
}

/// Replacement values for an open timesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimesheetChanges {
    pub employee_id: EmployeeId,
    pub work_id: WorkId,
    pub period: WorkPeriod,
    pub compensation: Compensation,
}

/// One employee's compensation record for a work period.
///
/// Transitions consume the record and hand back the next state, so a request owns its
/// copy exclusively until it is persisted. Every accepted transition bumps `version`,
/// which repositories use for compare-and-swap updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timesheet {
    id: TimesheetId,
    employee_id: EmployeeId,
    work_id: WorkId,
    period: WorkPeriod,
    #[serde(flatten)]
    compensation: Compensation,
    total: Decimal,
    status: TimesheetStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Timesheet {
    pub fn open(
        employee_id: EmployeeId,
        work_id: WorkId,
        period: WorkPeriod,
        compensation: Compensation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TimesheetId::new(),
            employee_id,
            work_id,
            period,
            total: compensation.total(),
            compensation,
            status: TimesheetStatus::Open,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn id(&self) -> TimesheetId {
        self.id
    }

    pub fn employee_id(&self) -> EmployeeId {
        self.employee_id
    }

    pub fn work_id(&self) -> WorkId {
        self.work_id
    }

    pub fn period(&self) -> WorkPeriod {
        self.period
    }

    pub fn compensation(&self) -> Compensation {
        self.compensation
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn status(&self) -> TimesheetStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_open(&self) -> bool {
        self.status == TimesheetStatus::Open
    }

    pub fn approve(self, now: DateTime<Utc>) -> Result<Self, InvalidStateTransition> {
        self.transition(
            TimesheetOperation::Approve,
            &[TimesheetStatus::Open],
            TimesheetStatus::ApprovedForPayment,
            now,
        )
    }

    pub fn register_payment(self, now: DateTime<Utc>) -> Result<Self, InvalidStateTransition> {
        self.transition(
            TimesheetOperation::RegisterPayment,
            &[TimesheetStatus::Open, TimesheetStatus::ApprovedForPayment],
            TimesheetStatus::Paid,
            now,
        )
    }

    /// Skips approval and pays an open timesheet directly.
    pub fn approve_and_pay(self, now: DateTime<Utc>) -> Result<Self, InvalidStateTransition> {
        self.transition(
            TimesheetOperation::ApproveAndPay,
            &[TimesheetStatus::Open],
            TimesheetStatus::Paid,
            now,
        )
    }

    pub fn edit(
        self,
        changes: TimesheetChanges,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidStateTransition> {
        let mut edited = self.transition(
            TimesheetOperation::Edit,
            &[TimesheetStatus::Open],
            TimesheetStatus::Open,
            now,
        )?;
        edited.employee_id = changes.employee_id;
        edited.work_id = changes.work_id;
        edited.period = changes.period;
        edited.compensation = changes.compensation;
        edited.total = changes.compensation.total();
        Ok(edited)
    }

    /// Fresh open timesheet for the period after this one, keeping employee, work and rate.
    pub fn next_period_template(&self, now: DateTime<Utc>) -> Option<Self> {
        let period = self.period.following()?;
        Some(Self::open(
            self.employee_id,
            self.work_id,
            period,
            Compensation::zeroed(self.compensation.daily_rate),
            now,
        ))
    }

    fn transition(
        mut self,
        operation: TimesheetOperation,
        allowed_from: &[TimesheetStatus],
        target: TimesheetStatus,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidStateTransition> {
        if !allowed_from.contains(&self.status) {
            return Err(InvalidStateTransition {
                id: self.id,
                operation,
                from: self.status,
            });
        }

        self.status = target;
        self.updated_at = now;
        self.version += 1;
        Ok(self)
    }
}
