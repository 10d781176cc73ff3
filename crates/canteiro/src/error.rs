use crate::access::RoleTableError;
use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::timesheets::router::status_for;
use crate::workflows::timesheets::TimesheetServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Access(RoleTableError),
    Io(std::io::Error),
    Timesheet(TimesheetServiceError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Access(err) => write!(f, "role table error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Timesheet(err) => write!(f, "timesheet error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Access(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Timesheet(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Timesheet(err) => status_for(err),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Access(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<RoleTableError> for AppError {
    fn from(value: RoleTableError) -> Self {
        Self::Access(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<TimesheetServiceError> for AppError {
    fn from(value: TimesheetServiceError) -> Self {
        Self::Timesheet(value)
    }
}
