//! Upload request handling.
//!
//! Every request, whatever its method or path, goes through
//! [`UploadHandler::handle`]. `POST` requests are authenticated, checked for a
//! JPEG content type and streamed straight to disk. Whenever a `POST` is
//! rejected or fails, the rest of its body is read and discarded before the
//! response goes out so the connection stays usable.

use axum::body::{Body as AxumBody, BodyDataStream};
use axum::extract::Extension;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Local;
use futures_util::stream::StreamExt;
use std::io;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{Level, debug, error, info, warn};

use crate::auth::Authenticator;
use crate::config::{EXPECTED_CONTENT_TYPE, Settings};
use crate::error::{ApiError, UPLOAD_FAILED_MESSAGE};
use crate::http::client_ip_label;
use crate::response::html_response;
use crate::storage::{Storage, StorageError};

const READY_MESSAGE: &str = "Image upload server ready";
const ACCEPTED_MESSAGE: &str = "Image accepted";

/// Request handler shared by all connections; holds only read-only state.
pub struct UploadHandler {
    storage: Storage,
    authenticator: Authenticator,
}

impl UploadHandler {
    pub fn new(storage: Storage, authenticator: Authenticator) -> Self {
        Self {
            storage,
            authenticator,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Storage::new(settings.upload.path.clone()),
            Authenticator::from_settings(&settings.upload),
        )
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Handles one request and produces exactly one response.
    pub async fn handle(&self, request: Request<AxumBody>) -> Response {
        let (parts, body) = request.into_parts();
        let client_ip = client_ip_label(&parts.headers, &parts.extensions);
        info!(
            client_ip,
            method = %parts.method,
            path = parts.uri.path(),
            "request received"
        );
        if tracing::enabled!(Level::DEBUG) {
            let mut logged = parts.headers.clone();
            logged.remove(header::AUTHORIZATION);
            debug!(headers = ?logged, "request details");
        }

        let result = match parts.method {
            Method::GET => Ok(html_response(
                StatusCode::OK,
                HeaderMap::new(),
                READY_MESSAGE,
            )),
            Method::HEAD => Ok(StatusCode::OK.into_response()),
            Method::POST => self.accept_upload(&parts, &client_ip, body).await,
            _ => {
                debug!(client_ip, method = %parts.method, "method not allowed");
                Err(ApiError::MethodNotAllowed)
            }
        };

        result.unwrap_or_else(IntoResponse::into_response)
    }

    async fn accept_upload(
        &self,
        parts: &Parts,
        client_ip: &str,
        body: AxumBody,
    ) -> Result<Response, ApiError> {
        let mut data_stream = body.into_data_stream();
        let path = parts.uri.path();

        if !self.authenticator.authenticate(&parts.uri, &parts.headers) {
            warn!(
                client_ip,
                path,
                mode = self.authenticator.mode().as_str(),
                "missing or invalid credentials"
            );
            drain_body(&mut data_stream).await;
            return Err(self.authenticator.rejection());
        }

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if content_type != EXPECTED_CONTENT_TYPE {
            warn!(client_ip, path, content_type, "unexpected content type");
            drain_body(&mut data_stream).await;
            return Err(ApiError::BadRequest("Unexpected content type".into()));
        }

        let timestamp = Local::now().naive_local();
        let destination = match self.storage.prepare_destination(path, timestamp).await {
            Ok(destination) => destination,
            Err(err) => {
                log_storage_error(&err, client_ip, path);
                drain_body(&mut data_stream).await;
                return Err(err.into());
            }
        };

        let (mut file, stored_path) = match self.storage.create_upload_file(&destination).await {
            Ok(created) => created,
            Err(err) => {
                log_storage_error(&err, client_ip, path);
                drain_body(&mut data_stream).await;
                return Err(err.into());
            }
        };

        match write_body(&mut file, &mut data_stream).await {
            Ok(bytes) => {
                info!(
                    client_ip,
                    site = destination.site(),
                    camera = destination.camera(),
                    path = %stored_path.display(),
                    bytes,
                    "image stored"
                );
                Ok(html_response(
                    StatusCode::OK,
                    HeaderMap::new(),
                    ACCEPTED_MESSAGE,
                ))
            }
            Err(err) => {
                error!(
                    client_ip,
                    path = %stored_path.display(),
                    error = %err,
                    "upload interrupted, partial file left on disk"
                );
                drain_body(&mut data_stream).await;
                Err(ApiError::Internal(UPLOAD_FAILED_MESSAGE.into()))
            }
        }
    }
}

/// Router entry point; every method and path is served here.
pub async fn handle_request(
    Extension(handler): Extension<Arc<UploadHandler>>,
    request: Request<AxumBody>,
) -> Response {
    handler.handle(request).await
}

/// Streams the body into `file` chunk by chunk and returns the bytes written.
async fn write_body(file: &mut File, data_stream: &mut BodyDataStream) -> io::Result<u64> {
    let mut total_written: u64 = 0;
    while let Some(chunk) = data_stream.next().await {
        let chunk = chunk.map_err(io::Error::other)?;
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk).await?;
        total_written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(total_written)
}

/// Reads and discards whatever is left of the request body.
async fn drain_body(data_stream: &mut BodyDataStream) -> u64 {
    let mut discarded: u64 = 0;
    while let Some(chunk) = data_stream.next().await {
        match chunk {
            Ok(bytes) => discarded += bytes.len() as u64,
            Err(err) => {
                debug!(error = %err, "request body failed while draining");
                break;
            }
        }
    }
    debug!(bytes = discarded, "request body drained");
    discarded
}

fn log_storage_error(err: &StorageError, client_ip: &str, path: &str) {
    match err {
        StorageError::InvalidPath => {
            warn!(client_ip, path, "rejected upload path outside storage root");
        }
        StorageError::Io(io_err) => {
            error!(client_ip, path, error = %io_err, "failed to prepare upload file");
        }
    }
}
