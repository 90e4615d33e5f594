// Copyright (c) 2026, Anthony DeDominic <adedomin@gmail.com>
//
// Permission to use, copy, modify, and/or distribute this software for any
// purpose with or without fee is hereby granted, provided that the above
// copyright notice and this permission notice appear in all copies.
//
// THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
// WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
// MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
// ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
// WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
// ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
// OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
use std::fmt::Display;

use axum::response::IntoResponse;
use chrono::Utc;
use http::{HeaderValue, Response, StatusCode, header::CONTENT_TYPE};
use serde::Serialize;

/// The gateway's error taxonomy (spec §7), independent of which stage raised it.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing or malformed client IP")]
    InvalidClient,
    #[error("blocked by policy: {0}")]
    PolicyBlock(&'static str),
    #[error("blocked by reputation verdict")]
    ReputationBlock,
    #[error("rate limited")]
    RateLimited,
    #[error("misconfiguration: {0}")]
    Misconfig(String),
    #[error("shared store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidClient => StatusCode::BAD_REQUEST,
            GatewayError::PolicyBlock(_) | GatewayError::ReputationBlock => StatusCode::FORBIDDEN,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Misconfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // reaching this generic conversion means no stage-local
            // fail-open/closed handling applied upstream.
            GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        ApiError::new_with_status(self.status(), self).into_response()
    }
}

/// JSON error envelope the gateway renders at the HTTP boundary: `{success,error,timestamp}`.
#[derive(Serialize, Debug)]
pub struct ApiError {
    #[serde(skip)]
    code: StatusCode,
    success: bool,
    error: String,
    timestamp: chrono::DateTime<Utc>,
}

const FALLBACK: &[u8] = br##"{ "success": false, "error": "failed to serialize error body" }"##;

impl ApiError {
    pub fn new<T: Display>(msg: T) -> Self {
        ApiError {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            success: false,
            error: msg.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn new_with_status<T: Display>(code: StatusCode, msg: T) -> Self {
        ApiError {
            code,
            success: false,
            error: msg.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| FALLBACK.to_owned())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        Response::builder()
            .status(self.code)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(self.to_json().into())
            .unwrap()
    }
}
