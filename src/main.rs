//! Image upload server for network cameras.
//!
//! Cameras push JPEG snapshots with `POST /<prefix>/<site>/<camera>`; each
//! accepted image is written below the configured upload directory in an
//! hourly bucket. The main entry point loads settings, builds the Axum router
//! and serves HTTP until a termination signal arrives.

mod auth;
mod config;
mod error;
mod http;
mod logging;
mod paths;
mod response;
mod storage;
mod upload;

use axum::extract::Extension;
use axum::http::Request;
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::io::{Error, ErrorKind};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::config::{Args, Settings};
use crate::upload::UploadHandler;

shadow!(build);

/// Starts the upload server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    logging::init_logging(&args.log_level);

    let settings =
        Settings::load(&args).map_err(|err| Error::new(ErrorKind::InvalidInput, err.to_string()))?;
    let handler = Arc::new(UploadHandler::from_settings(&settings));
    handler.storage().ensure_root().await?;
    info!(
        path = %handler.storage().root_path().display(),
        auth = handler.authenticator().mode().as_str(),
        "upload storage ready"
    );

    let host = settings
        .http
        .host
        .parse::<IpAddr>()
        .map_err(|err| Error::new(ErrorKind::InvalidInput, err.to_string()))?;
    let http_addr = SocketAddr::new(host, settings.http.port);
    let handle = Handle::new();

    info!("Starting HTTP server at {}", http_addr);

    tokio::spawn(shutdown_signal(handle.clone()));
    serve(http_addr, build_router(handler), handle).await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Routes every method and path to the upload handler.
fn build_router(handler: Arc<UploadHandler>) -> Router {
    Router::new()
        .fallback(upload::handle_request)
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client_ip =
                        http::client_ip_label(request.headers(), request.extensions());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(handler))
}

/// Serves `app` on `addr`; resolves only after a graceful shutdown has drained
/// open connections or its grace period ran out.
async fn serve(addr: SocketAddr, app: Router, handle: Handle) -> Result<(), Error> {
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
