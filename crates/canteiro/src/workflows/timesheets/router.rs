use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::domain::{EmployeeId, TimesheetId, TimesheetStatus, WorkId};
use super::events::EventPublisher;
use super::replication::ReplicationOrchestrator;
use super::repository::{EmployeeLookup, RepositoryError, TimesheetFilter, TimesheetRepository, WorkLookup};
use super::service::{NewTimesheet, TimesheetEdit, TimesheetService, TimesheetServiceError};
use crate::access::permissions::{
    TIMESHEETS_APPROVE, TIMESHEETS_PAY, TIMESHEETS_READ, TIMESHEETS_WRITE,
};
use crate::access::PermissionResolver;

/// Header carrying the caller's role, set by the upstream identity layer.
pub const ROLE_HEADER: &str = "x-role";

/// Shared state behind the timesheet routes.
pub struct TimesheetApi<R, L, P> {
    pub service: Arc<TimesheetService<R, L, P>>,
    pub replication: Arc<ReplicationOrchestrator<R>>,
    pub resolver: Arc<PermissionResolver>,
}

impl<R, L, P> Clone for TimesheetApi<R, L, P> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            replication: self.replication.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationRequest {
    pub employee_ids: Vec<EmployeeId>,
}

/// Router builder exposing the timesheet lifecycle over HTTP.
pub fn timesheet_router<R, L, P>(api: TimesheetApi<R, L, P>) -> Router
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/timesheets",
            post(create_handler::<R, L, P>).get(list_handler::<R, L, P>),
        )
        .route(
            "/api/v1/timesheets/:timesheet_id",
            get(get_handler::<R, L, P>).put(edit_handler::<R, L, P>),
        )
        .route(
            "/api/v1/timesheets/:timesheet_id/approve",
            post(approve_handler::<R, L, P>),
        )
        .route(
            "/api/v1/timesheets/:timesheet_id/payment",
            post(payment_handler::<R, L, P>),
        )
        .route(
            "/api/v1/timesheets/:timesheet_id/approve-and-pay",
            post(approve_and_pay_handler::<R, L, P>),
        )
        .route(
            "/api/v1/employees/:employee_id/timesheets",
            get(employee_list_handler::<R, L, P>),
        )
        .route(
            "/api/v1/replications/timesheets",
            post(replicate_handler::<R, L, P>),
        )
        .with_state(api)
}

pub(crate) async fn create_handler<R, L, P>(
    State(api): State<TimesheetApi<R, L, P>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<NewTimesheet>,
) -> Response
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    if let Err(denied) = authorize(&api.resolver, &headers, &[TIMESHEETS_WRITE]) {
        return denied;
    }

    match api.service.create(request) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_handler<R, L, P>(
    State(api): State<TimesheetApi<R, L, P>>,
    headers: HeaderMap,
    Path(timesheet_id): Path<Uuid>,
) -> Response
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    if let Err(denied) = authorize(&api.resolver, &headers, &[TIMESHEETS_READ]) {
        return denied;
    }

    match api.service.get(&TimesheetId(timesheet_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn edit_handler<R, L, P>(
    State(api): State<TimesheetApi<R, L, P>>,
    headers: HeaderMap,
    Path(timesheet_id): Path<Uuid>,
    axum::Json(request): axum::Json<TimesheetEdit>,
) -> Response
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    if let Err(denied) = authorize(&api.resolver, &headers, &[TIMESHEETS_WRITE]) {
        return denied;
    }

    match api.service.edit(&TimesheetId(timesheet_id), request) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_handler<R, L, P>(
    State(api): State<TimesheetApi<R, L, P>>,
    headers: HeaderMap,
    Path(timesheet_id): Path<Uuid>,
) -> Response
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    if let Err(denied) = authorize(&api.resolver, &headers, &[TIMESHEETS_APPROVE]) {
        return denied;
    }

    match api.service.approve(&TimesheetId(timesheet_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn payment_handler<R, L, P>(
    State(api): State<TimesheetApi<R, L, P>>,
    headers: HeaderMap,
    Path(timesheet_id): Path<Uuid>,
) -> Response
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    if let Err(denied) = authorize(&api.resolver, &headers, &[TIMESHEETS_PAY]) {
        return denied;
    }

    match api.service.register_payment(&TimesheetId(timesheet_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_and_pay_handler<R, L, P>(
    State(api): State<TimesheetApi<R, L, P>>,
    headers: HeaderMap,
    Path(timesheet_id): Path<Uuid>,
) -> Response
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    if let Err(denied) = authorize(
        &api.resolver,
        &headers,
        &[TIMESHEETS_APPROVE, TIMESHEETS_PAY],
    ) {
        return denied;
    }

    match api.service.approve_and_pay(&TimesheetId(timesheet_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, L, P>(
    State(api): State<TimesheetApi<R, L, P>>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    if let Err(denied) = authorize(&api.resolver, &headers, &[TIMESHEETS_READ]) {
        return denied;
    }

    let listing = match ListingQuery::parse(query) {
        Ok(listing) => listing,
        Err(message) => return bad_request(message),
    };

    let page = api.service.page_request(listing.page, listing.page_size);
    match api.service.list(&listing.filter, page) {
        Ok(page) => (StatusCode::OK, axum::Json(page)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn employee_list_handler<R, L, P>(
    State(api): State<TimesheetApi<R, L, P>>,
    headers: HeaderMap,
    Path(employee_id): Path<Uuid>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    if let Err(denied) = authorize(&api.resolver, &headers, &[TIMESHEETS_READ]) {
        return denied;
    }

    let listing = match ListingQuery::parse(query) {
        Ok(listing) => listing,
        Err(message) => return bad_request(message),
    };

    let page = api.service.page_request(listing.page, listing.page_size);
    match api
        .service
        .list_by_employee(&EmployeeId(employee_id), &listing.filter, page)
    {
        Ok(page) => (StatusCode::OK, axum::Json(page)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn replicate_handler<R, L, P>(
    State(api): State<TimesheetApi<R, L, P>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReplicationRequest>,
) -> Response
where
    R: TimesheetRepository + 'static,
    L: EmployeeLookup + WorkLookup + 'static,
    P: EventPublisher + 'static,
{
    if let Err(denied) = authorize(&api.resolver, &headers, &[TIMESHEETS_WRITE]) {
        return denied;
    }

    if request.employee_ids.is_empty() {
        return bad_request("employee_ids must not be empty".to_string());
    }

    let report = api.replication.replicate(&request.employee_ids);
    (StatusCode::MULTI_STATUS, axum::Json(report)).into_response()
}

/// Parsed listing parameters; unrecognized keys pass through as free-form filters.
struct ListingQuery {
    filter: TimesheetFilter,
    page: Option<u32>,
    page_size: Option<u32>,
}

impl ListingQuery {
    fn parse(mut query: BTreeMap<String, String>) -> Result<Self, String> {
        let status = query
            .remove("status")
            .map(|raw| {
                TimesheetStatus::from_label(&raw).ok_or_else(|| format!("unknown status '{raw}'"))
            })
            .transpose()?;
        let work_id = query
            .remove("work_id")
            .map(|raw| {
                Uuid::parse_str(raw.trim())
                    .map(WorkId)
                    .map_err(|_| format!("work_id '{raw}' is not a valid id"))
            })
            .transpose()?;
        let page = parse_number(query.remove("page"), "page")?;
        let page_size = parse_number(query.remove("page_size"), "page_size")?;

        Ok(Self {
            filter: TimesheetFilter {
                status,
                work_id,
                params: query,
            },
            page,
            page_size,
        })
    }
}

fn parse_number(raw: Option<String>, field: &str) -> Result<Option<u32>, String> {
    raw.map(|value| {
        value
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("{field} must be a positive integer"))
    })
    .transpose()
}

fn authorize(
    resolver: &PermissionResolver,
    headers: &HeaderMap,
    required: &[&str],
) -> Result<(), Response> {
    let Some(role) = headers
        .get(ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
    else {
        let payload = json!({ "error": "missing caller role" });
        return Err((StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response());
    };

    let granted = resolver.resolve(role);
    match required.iter().find(|permission| !granted.contains(**permission)) {
        None => Ok(()),
        Some(missing) => {
            let payload = json!({
                "error": format!("role '{}' lacks permission '{}'", role.trim(), missing),
            });
            Err((StatusCode::FORBIDDEN, axum::Json(payload)).into_response())
        }
    }
}

fn bad_request(message: String) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

pub(crate) fn status_for(error: &TimesheetServiceError) -> StatusCode {
    match error {
        TimesheetServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        TimesheetServiceError::InvalidStateTransition(_)
        | TimesheetServiceError::ConcurrentModification(_)
        | TimesheetServiceError::Persistence(RepositoryError::Conflict) => StatusCode::CONFLICT,
        TimesheetServiceError::ReferenceNotFound { .. }
        | TimesheetServiceError::InvalidDateFormat { .. }
        | TimesheetServiceError::InvalidPeriod { .. }
        | TimesheetServiceError::NegativeAmount(_) => StatusCode::BAD_REQUEST,
        TimesheetServiceError::Persistence(_) | TimesheetServiceError::Lookup(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(error: TimesheetServiceError) -> Response {
    let status = status_for(&error);
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
