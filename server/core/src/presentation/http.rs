// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP front end
//!
//! A single fallback handler takes every request through the same steps:
//! proxy rules, classification, session, then dispatch. JSON results are
//! wrapped in the `{error, result}` envelope; file reads stream raw bytes.

use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::endpoint::Endpoint;
use crate::application::request_pipeline::{ApiError, RequestPipeline};
use crate::domain::config::{ConnectionMode, HttpConfig};
use crate::domain::session::Session;
use crate::domain::vfs::{UploadedFile, VfsError, VfsMethod};
use crate::presentation::proxy::ProxyTable;
use crate::presentation::response::{success, vfs_reply};
use crate::presentation::static_files::StaticFiles;
use crate::presentation::ws;

/// Largest JSON body accepted on `/FS/` and `/API/`
const MAX_JSON_BODY: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
    pub proxy: Arc<ProxyTable>,
    pub static_files: Arc<StaticFiles>,
    pub upload_dir: PathBuf,
    pub session_cookie: Arc<str>,
    pub mode: ConnectionMode,
    pub ws_path: String,
}

impl AppState {
    pub fn new(
        pipeline: Arc<RequestPipeline>,
        proxy: ProxyTable,
        static_files: StaticFiles,
        http: &HttpConfig,
    ) -> Self {
        Self {
            pipeline,
            proxy: Arc::new(proxy),
            static_files: Arc::new(static_files),
            upload_dir: http.upload_dir.clone().unwrap_or_else(std::env::temp_dir),
            session_cookie: Arc::from(http.session_cookie.as_str()),
            mode: http.mode,
            ws_path: http.ws_path.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new();
    if state.mode == ConnectionMode::Ws {
        router = router.route(&state.ws_path, get(ws::upgrade));
    }

    router
        .fallback(dispatch)
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_string();

    if !state.proxy.is_empty() {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| path.clone());
        if let Some(upstream) = state.proxy.upstream_for(&path, &path_and_query) {
            return state.proxy.forward(&upstream, request).await;
        }
    }

    let endpoint = Endpoint::classify(&path);
    match endpoint {
        Endpoint::Static(asset) => {
            if !matches!(*request.method(), Method::GET | Method::HEAD) {
                return ApiError::from(VfsError::NotFound(path)).into_response();
            }
            return match state.static_files.serve(&asset).await {
                Ok(response) => response,
                Err(e) => error_response(&path, ApiError::from(e)),
            };
        }
        Endpoint::UnknownMethod(name) => {
            return error_response(&path, ApiError::UnknownMethod(name));
        }
        _ => {}
    }

    let incoming = session_id(request.headers(), &state.session_cookie);
    let mut session = state.pipeline.open_session(incoming.as_deref()).await;

    let response = match handle(&state, &mut session, endpoint, request).await {
        Ok(response) => response,
        Err(e) => error_response(&path, e),
    };

    state.pipeline.close_session(&session).await;
    with_session_cookie(response, &state.session_cookie, incoming.as_deref(), &session)
}

async fn handle(
    state: &AppState,
    session: &mut Session,
    endpoint: Endpoint,
    request: Request,
) -> Result<Response, ApiError> {
    let pipeline = &state.pipeline;
    let method = request.method().clone();

    match endpoint {
        Endpoint::FsGet(address) => {
            require_method(&method, &[Method::GET, Method::HEAD])?;
            let args = json!({ "path": address });
            let reply = pipeline
                .vfs_call(session, VfsMethod::Read, &args, Vec::new())
                .await?;
            Ok(vfs_reply(reply))
        }
        Endpoint::Fs(vfs_method) => {
            let (args, uploads) = if method == Method::GET {
                if !vfs_method.allows_get() {
                    return Err(ApiError::BadRequest(format!(
                        "{} is not available over GET",
                        vfs_method
                    )));
                }
                (query_args(&request)?, Vec::new())
            } else {
                require_method(&method, &[Method::POST])?;
                read_body(state, request).await?
            };
            let reply = pipeline.vfs_call(session, vfs_method, &args, uploads).await?;
            Ok(vfs_reply(reply))
        }
        Endpoint::Api(api_method) => {
            require_method(&method, &[Method::POST])?;
            let args = json_body(request).await?;
            let result = pipeline.api_call(session, api_method, &args).await?;
            Ok(success(result))
        }
        Endpoint::PackageAsset(asset) => {
            require_method(&method, &[Method::GET, Method::HEAD])?;
            pipeline.package_asset(session, &asset).await?;
            Ok(state.static_files.serve(&asset).await?)
        }
        Endpoint::Static(_) | Endpoint::UnknownMethod(_) => {
            Err(ApiError::BadRequest("unroutable request".to_string()))
        }
    }
}

fn error_response(path: &str, err: ApiError) -> Response {
    let status = err.status_code();
    if status >= 500 {
        error!(path = %path, status, error = %err, "Request failed");
    } else {
        debug!(path = %path, status, error = %err, "Request rejected");
    }
    err.into_response()
}

fn require_method(method: &Method, allowed: &[Method]) -> Result<(), ApiError> {
    if allowed.contains(method) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("{} is not supported here", method)))
    }
}

/// Session id from the `Cookie` header(s)
pub(crate) fn session_id(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn with_session_cookie(
    mut response: Response,
    cookie_name: &str,
    incoming: Option<&str>,
    session: &Session,
) -> Response {
    if incoming == Some(session.id.as_str()) {
        return response;
    }
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", cookie_name, session.id);
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "Could not encode session cookie"),
    }
    response
}

fn query_args(request: &Request) -> Result<Value, ApiError> {
    let Query(query) = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Value::Object(
        query.into_iter().map(|(k, v)| (k, field_value(v))).collect(),
    ))
}

async fn json_body(request: Request) -> Result<Value, ApiError> {
    let body = axum::body::to_bytes(request.into_body(), MAX_JSON_BODY)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

async fn read_body(state: &AppState, request: Request) -> Result<(Value, Vec<UploadedFile>), ApiError> {
    if !is_multipart(request.headers()) {
        return Ok((json_body(request).await?, Vec::new()));
    }

    let multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut fields = Map::new();
    let mut uploads = Vec::new();
    match read_multipart(state, multipart, &mut fields, &mut uploads).await {
        Ok(()) => Ok((Value::Object(fields), uploads)),
        Err(e) => {
            for upload in &uploads {
                if let Err(remove_err) = tokio::fs::remove_file(&upload.temp_path).await {
                    warn!(temp = %upload.temp_path.display(), error = %remove_err, "Failed to remove partial upload");
                }
            }
            Err(e)
        }
    }
}

async fn read_multipart(
    state: &AppState,
    mut multipart: Multipart,
    fields: &mut Map<String, Value>,
    uploads: &mut Vec<UploadedFile>,
) -> Result<(), ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::BadRequest(e.body_text());

    while let Some(mut field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(filename) = field.file_name().map(str::to_string) {
            tokio::fs::create_dir_all(&state.upload_dir)
                .await
                .map_err(|e| VfsError::from_io(e, &state.upload_dir.to_string_lossy()))?;
            let temp_path = state
                .upload_dir
                .join(format!("cloudesk-upload-{}", Uuid::new_v4()));
            let mime = field.content_type().map(str::to_string);

            let mut file = tokio::fs::File::create(&temp_path)
                .await
                .map_err(|e| VfsError::from_io(e, &filename))?;
            uploads.push(UploadedFile {
                filename: filename.clone(),
                temp_path: temp_path.clone(),
                size: 0,
                mime,
            });

            let mut size = 0u64;
            while let Some(chunk) = field.chunk().await.map_err(bad)? {
                size += chunk.len() as u64;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| VfsError::from_io(e, &filename))?;
            }
            file.flush().await.map_err(|e| VfsError::from_io(e, &filename))?;
            if let Some(upload) = uploads.last_mut() {
                upload.size = size;
            }
            debug!(field = %name, filename = %filename, size, "Buffered upload");
        } else {
            let text = field.text().await.map_err(bad)?;
            fields.insert(name, field_value(text));
        }
    }
    Ok(())
}

/// Multipart text fields and query values carrying JSON objects (e.g.
/// `options`, `args`) are decoded
fn field_value(text: String) -> Value {
    if text.trim_start().starts_with('{') {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text) {
            return value;
        }
    }
    Value::String(text)
}
