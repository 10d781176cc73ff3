use crate::cli::ServeArgs;
use crate::infra::{assemble_api, seed_directory, AppState};
use crate::routes::with_timesheet_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use canteiro::access::RoleTable;
use canteiro::config::AppConfig;
use canteiro::error::AppError;
use canteiro::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let roles = RoleTable::standard(&config.access.privileged_role)?;
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let api = assemble_api(&config, roles, seed_directory());

    let app = with_timesheet_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "timesheet back-office ready");

    axum::serve(listener, app).await?;
    Ok(())
}
