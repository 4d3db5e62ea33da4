use roster::{
    RosterError,
    config::{RosterConfig, TransportRuntime},
    transport::serve_http_with_workers,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RosterConfig::from_env();
    let service = match config.open_service() {
        Ok(service) => service,
        Err(err @ RosterError::Configuration(_)) => {
            error!(error = %err, "roster startup failed");
            std::process::exit(2);
        }
        Err(err) => {
            error!(error = %err, "roster failed opening storage backends");
            std::process::exit(1);
        }
    };

    let bind_addr = config.bind_addr.as_str();
    info!(
        table = service.table_name().as_deref().unwrap_or("<none>"),
        archive = %service.archive_location(),
        size_limit_bytes = config.size_limit_bytes,
        page_size = config.page_size,
        "roster storage ready"
    );
    info!(
        workers = config.http_workers,
        runtime = config.transport_runtime.as_str(),
        "roster transport listening on http://{bind_addr}"
    );
    info!("roster health endpoint: http://{bind_addr}/health");
    info!("roster query endpoint: http://{bind_addr}/q?first=&last=");
    info!("roster API endpoints: http://{bind_addr}/v1/load, /v1/query, /v1/clear");

    match config.transport_runtime {
        TransportRuntime::Std => {
            if let Err(err) = serve_http_with_workers(service, bind_addr, config.http_workers) {
                error!(error = %err, "roster transport failed");
                std::process::exit(1);
            }
        }
        TransportRuntime::Axum => {
            #[cfg(feature = "async-transport")]
            {
                if let Err(err) = roster::transport_axum::serve_http_with_axum(
                    service,
                    bind_addr,
                    config.http_workers,
                ) {
                    error!(error = %err, "roster transport failed");
                    std::process::exit(1);
                }
            }
            #[cfg(not(feature = "async-transport"))]
            {
                drop(service);
                error!("roster transport runtime 'axum' requires build feature 'async-transport'");
                std::process::exit(2);
            }
        }
    }
}
