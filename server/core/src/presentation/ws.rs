// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! WebSocket front end
//!
//! Each text frame is one request:
//!
//! ```json
//! {"_index": 7, "sid": "…", "path": "/FS/scandir", "args": {"path": "home:///"}}
//! ```
//!
//! and is answered with `{"_index", "sid", "error", "result"}`. Messages
//! are handled concurrently, so replies may arrive out of order and must
//! be matched by `_index`. Only JSON results travel over the socket; file
//! contents are rejected with "Not available".

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::endpoint::Endpoint;
use crate::application::request_pipeline::ApiError;
use crate::domain::vfs::VfsError;
use crate::presentation::http::AppState;

const OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
struct WsRequest {
    #[serde(rename = "_index", default)]
    index: Value,
    #[serde(default)]
    sid: Option<String>,
    path: String,
    #[serde(default)]
    args: Value,
}

pub async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let cookie_sid = super::http::session_id(&headers, &state.session_cookie);
    ws.on_upgrade(move |socket| serve_socket(socket, state, cookie_sid))
}

async fn serve_socket(socket: WebSocket, state: AppState, cookie_sid: Option<String>) {
    info!("WebSocket client connected");
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut inbox) = mpsc::channel::<String>(OUTBOX_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(text) = inbox.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "WebSocket read failed");
                break;
            }
        };

        let state = state.clone();
        let outbox = outbox.clone();
        let cookie_sid = cookie_sid.clone();
        tokio::spawn(async move {
            let reply = handle_message(&state, cookie_sid.as_deref(), &text).await;
            if outbox.send(reply.to_string()).await.is_err() {
                debug!("WebSocket closed before reply was sent");
            }
        });
    }

    drop(outbox);
    if let Err(e) = writer.await {
        warn!(error = %e, "WebSocket writer task failed");
    }
    info!("WebSocket client disconnected");
}

async fn handle_message(state: &AppState, cookie_sid: Option<&str>, text: &str) -> Value {
    let request: WsRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            return json!({
                "_index": null,
                "sid": null,
                "error": format!("Malformed request: {}", e),
                "result": false,
            })
        }
    };

    let pipeline = &state.pipeline;
    let sid = request.sid.as_deref().or(cookie_sid);
    let mut session = pipeline.open_session(sid).await;
    let args = if request.args.is_null() {
        json!({})
    } else {
        request.args
    };

    let outcome = match Endpoint::classify_message(&request.path) {
        Endpoint::Fs(method) => match pipeline.vfs_call(&session, method, &args, Vec::new()).await {
            Ok(reply) => reply.into_value().map_err(ApiError::from),
            Err(e) => Err(e),
        },
        Endpoint::Api(method) => pipeline.api_call(&mut session, method, &args).await,
        Endpoint::UnknownMethod(name) => Err(ApiError::UnknownMethod(name)),
        Endpoint::FsGet(_) | Endpoint::PackageAsset(_) | Endpoint::Static(_) => {
            Err(ApiError::from(VfsError::NotAvailable))
        }
    };
    pipeline.close_session(&session).await;

    match outcome {
        Ok(result) => json!({
            "_index": request.index,
            "sid": session.id,
            "error": null,
            "result": result,
        }),
        Err(e) => {
            debug!(path = %request.path, error = %e, "WebSocket request failed");
            json!({
                "_index": request.index,
                "sid": session.id,
                "error": e.to_string(),
                "result": false,
            })
        }
    }
}
