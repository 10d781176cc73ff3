//! Bulk replication of timesheets into the next work period.
//!
//! Each employee is processed independently and in input order. A failing item is recorded
//! in the report and never aborts the batch; items persisted before a crash stay persisted.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{EmployeeId, TimesheetId};
use super::repository::TimesheetRepository;
use super::service::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationFailure {
    AlreadyOpen,
    NoTemplate,
    Internal,
}

impl ReplicationFailure {
    pub const fn reason(self) -> &'static str {
        match self {
            ReplicationFailure::AlreadyOpen => "employee already has an open timesheet",
            ReplicationFailure::NoTemplate => "no prior timesheet to use as template",
            ReplicationFailure::Internal => "internal error while replicating timesheet",
        }
    }
}

impl fmt::Display for ReplicationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplicationSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplicationSuccess {
    pub employee_id: EmployeeId,
    pub timesheet_id: TimesheetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationFailureDetail {
    pub employee_id: EmployeeId,
    pub kind: ReplicationFailure,
    pub reason: String,
}

/// Multi-status outcome of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    pub summary: ReplicationSummary,
    pub successes: Vec<ReplicationSuccess>,
    pub failures: Vec<ReplicationFailureDetail>,
}

impl ReplicationReport {
    fn new(requested: usize) -> Self {
        Self {
            summary: ReplicationSummary {
                requested,
                succeeded: 0,
                failed: 0,
            },
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn record_success(&mut self, employee_id: EmployeeId, timesheet_id: TimesheetId) {
        self.summary.succeeded += 1;
        self.successes.push(ReplicationSuccess {
            employee_id,
            timesheet_id,
        });
    }

    fn record_failure(&mut self, employee_id: EmployeeId, kind: ReplicationFailure) {
        self.summary.failed += 1;
        self.failures.push(ReplicationFailureDetail {
            employee_id,
            kind,
            reason: kind.reason().to_string(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.summary.failed == 0
    }
}

pub struct ReplicationOrchestrator<R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> ReplicationOrchestrator<R>
where
    R: TimesheetRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn replicate(&self, employee_ids: &[EmployeeId]) -> ReplicationReport {
        let mut report = ReplicationReport::new(employee_ids.len());

        for employee_id in employee_ids {
            match self.replicate_one(employee_id) {
                Ok(timesheet_id) => {
                    debug!(employee_id = %employee_id, timesheet_id = %timesheet_id, "timesheet replicated");
                    report.record_success(*employee_id, timesheet_id);
                }
                Err(kind) => {
                    debug!(employee_id = %employee_id, reason = %kind, "timesheet not replicated");
                    report.record_failure(*employee_id, kind);
                }
            }
        }

        info!(
            requested = report.summary.requested,
            succeeded = report.summary.succeeded,
            failed = report.summary.failed,
            "timesheet replication finished"
        );
        report
    }

    fn replicate_one(&self, employee_id: &EmployeeId) -> Result<TimesheetId, ReplicationFailure> {
        let has_open = self
            .repository
            .has_open_for_employee(employee_id)
            .map_err(|err| {
                warn!(employee_id = %employee_id, error = %err, "open timesheet check failed");
                ReplicationFailure::Internal
            })?;
        if has_open {
            return Err(ReplicationFailure::AlreadyOpen);
        }

        let template = self
            .repository
            .latest_for_employee(employee_id)
            .map_err(|err| {
                warn!(employee_id = %employee_id, error = %err, "template lookup failed");
                ReplicationFailure::Internal
            })?
            .ok_or(ReplicationFailure::NoTemplate)?;

        let next = template
            .next_period_template(self.clock.now())
            .ok_or(ReplicationFailure::Internal)?;

        let stored = self.repository.save(next).map_err(|err| {
            warn!(employee_id = %employee_id, error = %err, "replicated timesheet not saved");
            ReplicationFailure::Internal
        })?;

        Ok(stored.id())
    }
}
