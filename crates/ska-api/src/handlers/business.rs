//! Default business handler.
//!
//! Stands in for the routes plugins guard. Activity CRUD itself lives
//! outside the host.

use axum::Json;
use axum::extract::OriginalUri;
use axum::http::Method;

use crate::dto::response::{ApiResponse, BusinessResponse};

/// ANY /api/activities, ANY /api/activities/{*rest}
pub async fn activities(
    method: Method,
    OriginalUri(uri): OriginalUri,
) -> Json<ApiResponse<BusinessResponse>> {
    Json(ApiResponse::ok(BusinessResponse {
        method: method.to_string(),
        path: uri.path().to_string(),
        message: "Handled by the default business handler".to_string(),
    }))
}
