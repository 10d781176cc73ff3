//! Timesheet ("apontamento") lifecycle: the aggregate state machine, its persistence and
//! lookup contracts, the single-item application service, and bulk replication into the
//! next work period.

pub mod domain;
pub mod events;
pub mod replication;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Compensation, EmployeeId, InvalidStateTransition, NegativeAmount, PeriodError, Timesheet,
    TimesheetChanges, TimesheetId, TimesheetOperation, TimesheetStatus, WorkId, WorkPeriod,
};
pub use events::{DomainEvent, EventPublisher, PaymentCompleted, PublishError, PAYMENT_COMPLETED};
pub use replication::{
    ReplicationFailure, ReplicationFailureDetail, ReplicationOrchestrator, ReplicationReport,
    ReplicationSuccess, ReplicationSummary,
};
pub use repository::{
    EmployeeLookup, LookupError, Page, PageRequest, Pagination, RepositoryError,
    TimesheetFilter, TimesheetRepository, WorkLookup,
};
pub use router::{timesheet_router, ReplicationRequest, TimesheetApi, ROLE_HEADER};
pub use service::{
    Clock, NewTimesheet, ReferenceKind, SystemClock, TimesheetEdit, TimesheetService,
    TimesheetServiceError,
};
