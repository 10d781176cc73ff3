use canteiro::access::{PermissionResolver, RoleTable};
use canteiro::config::AppConfig;
use canteiro::registry::{Employee, EmployeeStatus, Work};
use canteiro::workflows::timesheets::{
    DomainEvent, EmployeeId, EmployeeLookup, EventPublisher, LookupError, Page, PageRequest,
    PublishError, RepositoryError, ReplicationOrchestrator, Timesheet, TimesheetApi,
    TimesheetFilter, TimesheetId, TimesheetRepository, TimesheetService, WorkId, WorkLookup,
};
use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

pub(crate) type BackOfficeApi =
    TimesheetApi<InMemoryTimesheetRepository, InMemoryDirectory, TracingEventPublisher>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryTimesheetRepository {
    records: Arc<Mutex<HashMap<TimesheetId, Timesheet>>>,
}

impl InMemoryTimesheetRepository {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TimesheetId, Timesheet>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("timesheet store lock poisoned".to_string()))
    }

    fn matching<F>(&self, predicate: F) -> Result<Vec<Timesheet>, RepositoryError>
    where
        F: Fn(&Timesheet) -> bool,
    {
        let guard = self.lock()?;
        let mut matching: Vec<Timesheet> = guard
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        matching.sort_by_key(|record| (record.period().start(), record.id()));
        Ok(matching)
    }
}

impl TimesheetRepository for InMemoryTimesheetRepository {
    fn save(&self, record: Timesheet) -> Result<Timesheet, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&record.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &TimesheetId) -> Result<Option<Timesheet>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.get(id).cloned())
    }

    fn update(&self, record: Timesheet, expected_version: u64) -> Result<Timesheet, RepositoryError> {
        let mut guard = self.lock()?;
        let found = guard
            .get(&record.id())
            .map(Timesheet::version)
            .ok_or(RepositoryError::NotFound)?;
        if found != expected_version {
            return Err(RepositoryError::VersionConflict {
                expected: expected_version,
                found,
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
        Ok(Page::slice(self.matching(|record| filter.matches(record))?, page))
    }

    fn list_by_employee(
        &self,
        employee_id: &EmployeeId,
        filter: &TimesheetFilter,
        page: PageRequest,
    ) -> Result<Page<Timesheet>, RepositoryError> {
        let records = self.matching(|record| {
            record.employee_id() == *employee_id && filter.matches(record)
        })?;
        Ok(Page::slice(records, page))
    }

    fn has_open_for_employee(&self, employee_id: &EmployeeId) -> Result<bool, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .values()
            .any(|record| record.employee_id() == *employee_id && record.is_open()))
    }

    fn latest_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<Timesheet>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .values()
            .filter(|record| record.employee_id() == *employee_id)
            .max_by_key(|record| (record.period().end(), record.created_at()))
            .cloned())
    }
}

/// Employee and work records standing in for their owning modules.
#[derive(Default, Clone)]
pub(crate) struct InMemoryDirectory {
    employees: Arc<Mutex<HashMap<EmployeeId, Employee>>>,
    works: Arc<Mutex<HashMap<WorkId, Work>>>,
}

impl InMemoryDirectory {
    pub(crate) fn register_employee(&self, employee: Employee) {
        let mut guard = self.employees.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(employee.id, employee);
    }

    pub(crate) fn register_work(&self, work: Work) {
        let mut guard = self.works.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(work.id, work);
    }

    pub(crate) fn employees(&self) -> Vec<Employee> {
        let guard = self.employees.lock().unwrap_or_else(PoisonError::into_inner);
        let mut employees: Vec<Employee> = guard.values().cloned().collect();
        employees.sort_by(|left, right| left.name.cmp(&right.name));
        employees
    }

    pub(crate) fn works(&self) -> Vec<Work> {
        let guard = self.works.lock().unwrap_or_else(PoisonError::into_inner);
        let mut works: Vec<Work> = guard.values().cloned().collect();
        works.sort_by(|left, right| left.name.cmp(&right.name));
        works
    }
}

impl EmployeeLookup for InMemoryDirectory {
    fn employee_exists(&self, id: &EmployeeId) -> Result<bool, LookupError> {
        let guard = self
            .employees
            .lock()
            .map_err(|_| LookupError::Unavailable("employee directory lock poisoned".to_string()))?;
        Ok(guard.get(id).is_some_and(Employee::is_present))
    }
}

impl WorkLookup for InMemoryDirectory {
    fn work_exists(&self, id: &WorkId) -> Result<bool, LookupError> {
        let guard = self
            .works
            .lock()
            .map_err(|_| LookupError::Unavailable("work directory lock poisoned".to_string()))?;
        Ok(guard.contains_key(id))
    }
}

/// Writes domain events to the log until a ledger consumer is wired in.
#[derive(Default, Clone)]
pub(crate) struct TracingEventPublisher {
    published: Arc<AtomicUsize>,
}

impl TracingEventPublisher {
    pub(crate) fn published(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }
}

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        info!(event = %event.name, payload = %event.payload, "domain event published");
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Wires the timesheet service, replication orchestrator and role resolver over in-memory
/// storage.
pub(crate) fn assemble_api(
    config: &AppConfig,
    roles: RoleTable,
    directory: InMemoryDirectory,
) -> BackOfficeApi {
    let repository = Arc::new(InMemoryTimesheetRepository::default());
    let events = Arc::new(TracingEventPublisher::default());
    let service = TimesheetService::new(
        repository.clone(),
        Arc::new(directory),
        events,
        config.payments.account_reference.clone(),
    )
    .with_default_page_size(config.listing.default_page_size);

    TimesheetApi {
        service: Arc::new(service),
        replication: Arc::new(ReplicationOrchestrator::new(repository)),
        resolver: Arc::new(PermissionResolver::new(roles)),
    }
}

/// Sample crew and sites so a fresh server has something to book timesheets against.
pub(crate) fn seed_directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::default();
    let today = Utc::now().date_naive();

    directory.register_work(Work {
        id: WorkId::new(),
        name: "Residencial Parque das Flores".to_string(),
        location: "Rua das Acacias, 120".to_string(),
        active: true,
    });
    directory.register_work(Work {
        id: WorkId::new(),
        name: "Galpao Logistico Norte".to_string(),
        location: "Rodovia BR-101, km 34".to_string(),
        active: true,
    });

    let crew = [
        ("Joao Pereira", "Pedreiro", 150, 3300, 400, None),
        ("Maria Souza", "Eletricista", 180, 3960, 250, None),
        ("Carlos Lima", "Servente", 110, 2420, 90, None),
        ("Antonio Reis", "Carpinteiro", 160, 3520, 700, Some(30)),
    ];
    for (index, (name, position, daily_rate, salary, tenure_days, left_days_ago)) in
        crew.into_iter().enumerate()
    {
        directory.register_employee(Employee {
            id: EmployeeId::new(),
            name: name.to_string(),
            document_id: format!("000.000.00{index}-00"),
            position: position.to_string(),
            hire_date: today - Duration::days(tenure_days),
            base_salary: Decimal::from(salary),
            daily_rate: Decimal::from(daily_rate),
            status: if left_days_ago.is_some() {
                EmployeeStatus::Inactive
            } else {
                EmployeeStatus::Active
            },
            deleted_at: left_days_ago.map(|days| Utc::now() - Duration::days(days)),
        });
    }

    directory
}
