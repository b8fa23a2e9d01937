//! Uniform JSON envelope for the REST surface:
//! `{ success, data?, error? { code, message, details? } }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use nx_domain::error::Error;

/// 200 with `{ success: true, data }`.
pub fn ok<T: Serialize>(data: T) -> Response {
    Json(json!({ "success": true, "data": data })).into_response()
}

/// 201 with `{ success: true, data }`.
pub fn created<T: Serialize>(data: T) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": data })),
    )
        .into_response()
}

/// Error envelope with the status mapped from the error kind.
pub fn fail(err: &Error) -> Response {
    fail_with_details(err, None)
}

/// Error envelope carrying extra context (e.g. per-field messages).
pub fn fail_with_details(err: &Error, details: Option<serde_json::Value>) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut error = json!({
        "code": err.code(),
        "message": err.to_string(),
    });
    if let Some(details) = details {
        error["details"] = details;
    }
    // Validation errors always carry their field map.
    if let Error::Validation { fields } = err {
        error["details"] = json!(fields
            .iter()
            .map(|(f, m)| json!({ "field": f, "message": m }))
            .collect::<Vec<_>>());
    }
    (status, Json(json!({ "success": false, "error": error }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_maps_status_codes() {
        let resp = fail(&Error::NotFound("trace".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = fail(&Error::Conflict("dup".into()));
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = fail(&Error::RpmExceeded {
            count: 61,
            limit: 60,
        });
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn ok_is_200_created_is_201() {
        assert_eq!(ok(json!({"x": 1})).status(), StatusCode::OK);
        assert_eq!(created(json!({"x": 1})).status(), StatusCode::CREATED);
    }
}
