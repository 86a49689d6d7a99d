use crate::cli::ServeArgs;
use crate::infra::{
    AppState, DisabledExtractor, InMemoryClientRepository, InMemoryDocumentStore,
    InMemoryFeeRecordRepository, InMemoryPermitRepository,
};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use permit_desk::config::AppConfig;
use permit_desk::error::AppError;
use permit_desk::telemetry;
use permit_desk::workflows::clients::ClientService;
use permit_desk::workflows::permits::{PermitService, StatusPolicy};
use std::sync::atomic::Ordering;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let clients = Arc::new(InMemoryClientRepository::default());
    let client_service = Arc::new(ClientService::new(
        clients.clone(),
        Arc::new(InMemoryFeeRecordRepository::default()),
    ));
    let permit_service = Arc::new(
        PermitService::new(
            Arc::new(InMemoryPermitRepository::default()),
            clients,
            Arc::new(InMemoryDocumentStore::default()),
            Arc::new(DisabledExtractor),
        )
        .with_policy(StatusPolicy::from(&config.permits)),
    );

    let app = with_service_routes(permit_service, client_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        expiring_window_days = config.permits.expiring_window_days,
        "permit desk ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
