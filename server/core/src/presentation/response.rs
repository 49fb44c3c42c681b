// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `{error, result}` envelope and byte replies

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{json, Value};

use crate::application::request_pipeline::ApiError;
use crate::domain::vfs::VfsReply;

pub fn success(result: Value) -> Response {
    (StatusCode::OK, Json(json!({ "error": null, "result": result }))).into_response()
}

pub fn failure(status: u16, message: impl Into<String>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message: String = message.into();
    (status, Json(json!({ "error": message, "result": false }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        failure(self.status_code(), self.to_string())
    }
}

/// Turn a VFS reply into a response: JSON results are enveloped, file
/// contents go out as-is with their MIME type
pub fn vfs_reply(reply: VfsReply) -> Response {
    match reply {
        VfsReply::Value(value) => success(value),
        VfsReply::Bytes { data, mime } => {
            let mut response = Response::new(Body::from(data));
            set_content_type(&mut response, &mime);
            response
        }
        VfsReply::Stream {
            stream,
            mime,
            size,
            filename,
        } => {
            let mut response = Response::new(Body::from_stream(stream));
            set_content_type(&mut response, &mime);
            let headers = response.headers_mut();
            if let Some(size) = size {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            }
            let disposition = format!(
                "inline; filename*=UTF-8''{}",
                utf8_percent_encode(&filename, NON_ALPHANUMERIC)
            );
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            response
        }
    }
}

pub(crate) fn set_content_type(response: &mut Response, mime: &str) {
    let value = HeaderValue::from_str(mime)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    response.headers_mut().insert(header::CONTENT_TYPE, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vfs::VfsError;
    use bytes::Bytes;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_envelopes() {
        let ok = success(json!([1, 2]));
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(body_json(ok).await, json!({"error": null, "result": [1, 2]}));

        let denied = ApiError::from(VfsError::OperationDenied).into_response();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(denied).await,
            json!({"error": "Operation denied", "result": false})
        );
    }

    #[tokio::test]
    async fn test_stream_reply_headers() {
        let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"hello"))]);
        let response = vfs_reply(VfsReply::Stream {
            stream: Box::pin(stream),
            mime: "text/plain".to_string(),
            size: Some(5),
            filename: "a b.txt".to_string(),
        });

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::CONTENT_LENGTH], "5");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "inline; filename*=UTF-8''a%20b%2Etxt"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
    }
}
