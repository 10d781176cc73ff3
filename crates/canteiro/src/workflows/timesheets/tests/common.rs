use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::access::{PermissionResolver, RoleTable};
use crate::workflows::timesheets::domain::{
    Compensation, EmployeeId, Timesheet, TimesheetId, WorkId, WorkPeriod,
};
use crate::workflows::timesheets::events::{DomainEvent, EventPublisher, PublishError};
use crate::workflows::timesheets::replication::ReplicationOrchestrator;
use crate::workflows::timesheets::repository::{
    EmployeeLookup, LookupError, Page, PageRequest, RepositoryError, TimesheetFilter,
    TimesheetRepository, WorkLookup,
};
use crate::workflows::timesheets::router::{timesheet_router, TimesheetApi};
use crate::workflows::timesheets::service::{Clock, NewTimesheet, TimesheetService};

pub(super) const PAYMENT_ACCOUNT: &str = "caixa-obra-centro";

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn first_half_of_january() -> WorkPeriod {
    WorkPeriod::new(date(2025, 1, 1), date(2025, 1, 15)).expect("valid period")
}

pub(super) fn standard_compensation() -> Compensation {
    Compensation {
        daily_rate: Decimal::from(100),
        days_worked: 10,
        additions: Decimal::from(50),
        deductions: Decimal::from(20),
        advances: Decimal::ZERO,
    }
}

pub(super) fn new_timesheet(employee_id: EmployeeId, work_id: WorkId) -> NewTimesheet {
    NewTimesheet {
        employee_id,
        work_id,
        period_start: "2025-01-01".to_string(),
        period_end: "2025-01-15".to_string(),
        daily_rate: Decimal::from(100),
        days_worked: 10,
        additions: Decimal::from(50),
        deductions: Decimal::from(20),
        advances: Decimal::ZERO,
    }
}

pub(super) fn open_timesheet(employee_id: EmployeeId, period: WorkPeriod) -> Timesheet {
    Timesheet::open(
        employee_id,
        WorkId::new(),
        period,
        standard_compensation(),
        clock_start(),
    )
}

pub(super) fn clock_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 16, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Clock that only moves when told to.
pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance_minutes(&self, minutes: i64) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard = *guard + Duration::minutes(minutes);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    records: Arc<Mutex<HashMap<TimesheetId, Timesheet>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryRepository {
    pub(super) fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(super) fn all(&self) -> Vec<Timesheet> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        guard.values().cloned().collect()
    }

    fn collect(&self, predicate: impl Fn(&Timesheet) -> bool) -> Vec<Timesheet> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut matching: Vec<Timesheet> = guard
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        matching.sort_by_key(|record| (record.period().start(), record.id()));
        matching
    }
}

impl TimesheetRepository for MemoryRepository {
    fn save(&self, record: Timesheet) -> Result<Timesheet, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.id()) {
            return Err(RepositoryError::Conflict);
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        guard.insert(record.id(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &TimesheetId) -> Result<Option<Timesheet>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(&self, record: Timesheet, expected_version: u64) -> Result<Timesheet, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let stored = guard.get(&record.id()).ok_or(RepositoryError::NotFound)?;
        if stored.version() != expected_version {
            return Err(RepositoryError::VersionConflict {
                expected: expected_version,
                found: stored.version(),
            });
        }
        guard.insert(record.id(), record.clone());
        Ok(record)
    }

    fn list(
        &self,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Page<Timesheet>, RepositoryError> {
        Ok(Page::slice(self.collect(|record| filter.matches(record)), page))
    }

    fn list_by_employee(
        &self,
        employee_id: &EmployeeId,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Page<Timesheet>, RepositoryError> {
        let records = self.collect(|record| {
            record.employee_id() == *employee_id && filter.matches(record)
        });
        Ok(Page::slice(records, page))
    }

    fn has_open_for_employee(&self, employee_id: &EmployeeId) -> Result<bool, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .any(|record| record.employee_id() == *employee_id && record.is_open()))
    }

    fn latest_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<Timesheet>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| record.employee_id() == *employee_id)
            .max_by_key(|record| (record.period().end(), record.created_at()))
            .cloned())
    }
}

/// Reads succeed, writes of new records fail.
#[derive(Default, Clone)]
pub(super) struct SaveFailingRepository {
    pub(super) inner: MemoryRepository,
}

impl TimesheetRepository for SaveFailingRepository {
    fn save(&self, _record: Timesheet) -> Result<Timesheet, RepositoryError> {
        Err(RepositoryError::Unavailable("disk full".to_string()))
    }

    fn fetch(&self, id: &TimesheetId) -> Result<Option<Timesheet>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn update(&self, record: Timesheet, expected_version: u64) -> Result<Timesheet, RepositoryError> {
        self.inner.update(record, expected_version)
    }

    fn list(
        &self,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Page<Timesheet>, RepositoryError> {
        self.inner.list(filter, page)
    }

    fn list_by_employee(
        &self,
        employee_id: &EmployeeId,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Page<Timesheet>, RepositoryError> {
        self.inner.list_by_employee(employee_id, filter, page)
    }

    fn has_open_for_employee(&self, employee_id: &EmployeeId) -> Result<bool, RepositoryError> {
        self.inner.has_open_for_employee(employee_id)
    }

    fn latest_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<Timesheet>, RepositoryError> {
        self.inner.latest_for_employee(employee_id)
    }
}

pub(super) struct UnavailableRepository;

impl TimesheetRepository for UnavailableRepository {
    fn save(&self, _record: Timesheet) -> Result<Timesheet, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &TimesheetId) -> Result<Option<Timesheet>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _record: Timesheet,
        _expected_version: u64,
    ) -> Result<Timesheet, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(
        &self,
        _filter: &TimesheetFilter,
        _page: PageRequest,
    ) -> Result<Page<Timesheet>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_by_employee(
        &self,
        _employee_id: &EmployeeId,
        _filter: &TimesheetFilter,
        _page: PageRequest,
    ) -> Result<Page<Timesheet>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn has_open_for_employee(&self, _employee_id: &EmployeeId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn latest_for_employee(
        &self,
        _employee_id: &EmployeeId,
    ) -> Result<Option<Timesheet>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryDirectory {
    employees: Mutex<HashSet<EmployeeId>>,
    works: Mutex<HashSet<WorkId>>,
}

impl MemoryDirectory {
    pub(super) fn register_employee(&self) -> EmployeeId {
        let id = EmployeeId::new();
        self.employees
            .lock()
            .expect("directory mutex poisoned")
            .insert(id);
        id
    }

    pub(super) fn register_work(&self) -> WorkId {
        let id = WorkId::new();
        self.works.lock().expect("directory mutex poisoned").insert(id);
        id
    }
}

impl EmployeeLookup for MemoryDirectory {
    fn employee_exists(&self, id: &EmployeeId) -> Result<bool, LookupError> {
        Ok(self
            .employees
            .lock()
            .expect("directory mutex poisoned")
            .contains(id))
    }
}

impl WorkLookup for MemoryDirectory {
    fn work_exists(&self, id: &WorkId) -> Result<bool, LookupError> {
        Ok(self.works.lock().expect("directory mutex poisoned").contains(id))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryEvents {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl MemoryEvents {
    pub(super) fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("event mutex poisoned").clone()
    }
}

impl EventPublisher for MemoryEvents {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        self.events
            .lock()
            .expect("event mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct OfflineEvents;

impl EventPublisher for OfflineEvents {
    fn publish(&self, _event: DomainEvent) -> Result<(), PublishError> {
        Err(PublishError::Transport("broker offline".to_string()))
    }
}

pub(super) type MemoryService = TimesheetService<MemoryRepository, MemoryDirectory, MemoryEvents>;

pub(super) struct Fixture {
    pub(super) service: MemoryService,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) directory: Arc<MemoryDirectory>,
    pub(super) events: Arc<MemoryEvents>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) employee_id: EmployeeId,
    pub(super) work_id: WorkId,
}

impl Fixture {
    pub(super) fn orchestrator(&self) -> ReplicationOrchestrator<MemoryRepository> {
        ReplicationOrchestrator::new(self.repository.clone()).with_clock(self.clock.clone())
    }

    pub(super) fn created(&self) -> Timesheet {
        self.service
            .create(new_timesheet(self.employee_id, self.work_id))
            .expect("timesheet is created")
    }
}

pub(super) fn build_fixture() -> Fixture {
    let repository = Arc::new(MemoryRepository::default());
    let directory = Arc::new(MemoryDirectory::default());
    let events = Arc::new(MemoryEvents::default());
    let clock = Arc::new(FixedClock::new(clock_start()));
    let employee_id = directory.register_employee();
    let work_id = directory.register_work();

    let service = TimesheetService::new(
        repository.clone(),
        directory.clone(),
        events.clone(),
        PAYMENT_ACCOUNT,
    )
    .with_clock(clock.clone());

    Fixture {
        service,
        repository,
        directory,
        events,
        clock,
        employee_id,
        work_id,
    }
}

pub(super) fn resolver() -> Arc<PermissionResolver> {
    Arc::new(PermissionResolver::new(
        RoleTable::standard("admin").expect("standard table is valid"),
    ))
}

pub(super) fn router_for(fixture: Fixture) -> axum::Router {
    let replication = Arc::new(fixture.orchestrator());
    timesheet_router(TimesheetApi {
        service: Arc::new(fixture.service),
        replication,
        resolver: resolver(),
    })
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
