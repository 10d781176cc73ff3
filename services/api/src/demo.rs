use crate::infra::{
    seed_directory, InMemoryTimesheetRepository, TracingEventPublisher,
};
use canteiro::config::MAX_PAGE_SIZE;
use canteiro::error::AppError;
use canteiro::workflows::timesheets::{
    NewTimesheet, ReplicationOrchestrator, ReplicationReport, Timesheet, TimesheetFilter,
    TimesheetService, TimesheetServiceError,
};
use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// First day of the opening period (YYYY-MM-DD)
    #[arg(long, default_value = "2025-01-01")]
    pub(crate) period_start: String,
    /// Last day of the opening period (YYYY-MM-DD)
    #[arg(long, default_value = "2025-01-15")]
    pub(crate) period_end: String,
    /// Days worked in the opening period
    #[arg(long, default_value_t = 10)]
    pub(crate) days_worked: u32,
    /// Account reference stamped on payment events
    #[arg(long, default_value = "caixa-principal")]
    pub(crate) account: String,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        period_start,
        period_end,
        days_worked,
        account,
    } = args;

    let directory = seed_directory();
    let repository = Arc::new(InMemoryTimesheetRepository::default());
    let events = Arc::new(TracingEventPublisher::default());
    let service = TimesheetService::new(
        repository.clone(),
        Arc::new(directory.clone()),
        events.clone(),
        account,
    );
    let orchestrator = ReplicationOrchestrator::new(repository);

    let works = directory.works();
    let Some(work) = works.first() else {
        println!("No works registered; nothing to demo.");
        return Ok(());
    };
    let crew = directory.employees();

    println!("Timesheet lifecycle demo");
    println!("Work: {} ({})", work.name, work.location);

    let mut created = Vec::new();
    for employee in &crew {
        let request = NewTimesheet {
            employee_id: employee.id,
            work_id: work.id,
            period_start: period_start.clone(),
            period_end: period_end.clone(),
            daily_rate: employee.daily_rate,
            days_worked,
            additions: Decimal::ZERO,
            deductions: Decimal::ZERO,
            advances: Decimal::ZERO,
        };

        match service.create(request) {
            Ok(record) => {
                println!("- opened for {}: {}", employee.name, describe(&record));
                created.push(record);
            }
            Err(err @ TimesheetServiceError::ReferenceNotFound { .. }) => {
                println!("- skipped {} ({}): {err}", employee.name, employee.status.label());
            }
            Err(err) => return Err(err.into()),
        }
    }

    let Some(first) = created.first() else {
        println!("No timesheets opened; check the period bounds.");
        return Ok(());
    };

    let approved = service.approve(&first.id())?;
    println!("\nApproved: {}", describe(&approved));
    match service.approve(&first.id()) {
        Err(err @ TimesheetServiceError::InvalidStateTransition(_)) => {
            println!("Second approval refused: {err}");
        }
        Err(err) => return Err(err.into()),
        Ok(_) => println!("Second approval unexpectedly accepted"),
    }

    let paid = service.register_payment(&first.id())?;
    println!("Paid: {}", describe(&paid));

    if let Some(second) = created.get(1) {
        let paid = service.approve_and_pay(&second.id())?;
        println!("Approved and paid in one step: {}", describe(&paid));
    }
    println!("Payment events published: {}", events.published());

    let employee_ids: Vec<_> = crew.iter().map(|employee| employee.id).collect();
    let report = orchestrator.replicate(&employee_ids);
    render_replication(&report);

    let listing = service.list(
        &TimesheetFilter::default(),
        service.page_request(Some(1), Some(MAX_PAGE_SIZE)),
    )?;
    println!(
        "\nTimesheets on record: {} (showing {})",
        listing.pagination.total_items,
        listing.items.len()
    );
    for record in &listing.items {
        println!("- {}", describe(record));
    }

    Ok(())
}

fn describe(record: &Timesheet) -> String {
    format!(
        "{} | {} | total {} | v{}",
        record.period().label(),
        record.status().label(),
        record.total(),
        record.version()
    )
}

fn render_replication(report: &ReplicationReport) {
    println!(
        "\nReplication: {} requested | {} replicated | {} failed",
        report.summary.requested, report.summary.succeeded, report.summary.failed
    );
    for success in &report.successes {
        println!(
            "  + employee {} -> timesheet {}",
            success.employee_id, success.timesheet_id
        );
    }
    for failure in &report.failures {
        println!("  ! employee {}: {}", failure.employee_id, failure.reason);
    }
}
