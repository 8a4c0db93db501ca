use axum::{
    extract::{RawQuery, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use sms_core::GatewayResponse;
use sms_web_generic::{GatewayProcessor, ResponseConverter};
use std::time::Instant;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub processor: GatewayProcessor,
}

impl AppState {
    pub fn new(processor: GatewayProcessor) -> Self {
        Self { processor }
    }
}

/// Axum-specific response converter
pub struct AxumResponseConverter;

impl ResponseConverter for AxumResponseConverter {
    type ResponseType = Response;

    fn from_gateway_response(response: GatewayResponse) -> Self::ResponseType {
        let status = axum::http::StatusCode::from_u16(response.status.as_u16())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(axum::http::header::CONTENT_TYPE, response.content_type)],
            response.body,
        )
            .into_response()
    }
}

/// `GET /`: send an SMS described by the query string.
pub async fn send_sms(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let response = state
        .processor
        .process_query(query.as_deref().unwrap_or_default())
        .await;
    AxumResponseConverter::from_gateway_response(response)
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    AxumResponseConverter::from_gateway_response(state.processor.health())
}

/// Replaces the value of every `password` pair with `***`.
pub fn mask_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key.eq_ignore_ascii_case("password") => format!("{key}=***"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Logs every request with its outcome and duration.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(mask_query).unwrap_or_default();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        %path,
        %query,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

/// Gateway routes with request logging.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(send_sms))
        .route("/health", get(health))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use sms_core::HttpStatus;
    use tower::ServiceExt;

    #[test]
    fn password_is_masked() {
        assert_eq!(
            mask_query("username=u&password=secret&number=1"),
            "username=u&password=***&number=1"
        );
        assert_eq!(mask_query("text=password"), "text=password");
        assert_eq!(mask_query(""), "");
    }

    #[test]
    fn converter_keeps_status_and_content_type() {
        let response = AxumResponseConverter::from_gateway_response(GatewayResponse::error(
            HttpStatus::UnprocessableEntity,
            "nope",
        ));
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );
    }

    #[tokio::test]
    async fn health_route() {
        let app = router(AppState::new(GatewayProcessor::unconfigured()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["service"], "SMS Gateway API");
    }

    #[tokio::test]
    async fn send_without_router_config_is_500() {
        let app = router(AppState::new(GatewayProcessor::unconfigured()));
        let uri = "/?username=a&password=b&number=0170&text=hi";
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn send_without_query_is_400() {
        let app = router(AppState::new(GatewayProcessor::unconfigured()));
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
