//! Rejection responses.
//!
//! Every short-circuited request gets the mapped status and a JSON body with
//! the stable reason code, so clients can branch on `code` without parsing
//! messages. 429 responses also carry `Retry-After`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::security::guard::ReasonCode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RejectionBody {
    pub code: ReasonCode,
    pub message: String,
    pub request_id: String,
}

pub fn rejection_response(
    reason: ReasonCode,
    status: StatusCode,
    request_id: String,
    retry_after_secs: u64,
) -> Response {
    let body = RejectionBody {
        code: reason,
        message: reason.message().to_string(),
        request_id,
    };
    let mut response = (status, Json(body)).into_response();

    if reason == ReasonCode::RateLimited {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    }
    response
}

/// Seconds until a drained bucket refills one token, at least one.
pub fn retry_after_secs(rate: f64) -> u64 {
    if rate.is_finite() && rate > 0.0 {
        (1.0 / rate).ceil().max(1.0) as u64
    } else {
        1
    }
}
