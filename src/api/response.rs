use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        json_response(&self, HeaderMap::new())
    }
}

pub fn with_total_count<T: Serialize>(data: T, count: i64) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("X-Total-Count", HeaderValue::from(count));

    json_response(&ApiResponse { data }, headers)
}

fn json_response<T: Serialize>(body: &T, mut headers: HeaderMap) -> Response {
    let json = match serde_json::to_string(body) {
        Ok(json) => json,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    (StatusCode::OK, headers, json).into_response()
}
