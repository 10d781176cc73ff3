use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{EmployeeId, Timesheet, TimesheetId, WorkId};

pub const PAYMENT_COMPLETED: &str = "timesheet.payment_completed";

/// Outbound notification for other modules (e.g. the financial ledger).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

/// Fire-and-notify channel. Delivery guarantees belong to the implementation.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
    #[error("event payload could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Payload emitted once a timesheet reaches `PAID`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub timesheet_id: TimesheetId,
    pub employee_id: EmployeeId,
    pub work_id: WorkId,
    pub period_label: String,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub account_reference: String,
}

impl PaymentCompleted {
    pub fn from_timesheet(record: &Timesheet, account_reference: &str) -> Self {
        Self {
            timesheet_id: record.id(),
            employee_id: record.employee_id(),
            work_id: record.work_id(),
            period_label: format!("Apontamento {}", record.period().label()),
            amount: record.total(),
            paid_at: record.updated_at(),
            account_reference: account_reference.to_string(),
        }
    }

    pub fn into_event(self) -> Result<DomainEvent, PublishError> {
        Ok(DomainEvent {
            name: PAYMENT_COMPLETED.to_string(),
            payload: serde_json::to_value(self)?,
        })
    }
}
