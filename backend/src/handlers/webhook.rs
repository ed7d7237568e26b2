//! Payment provider webhooks (public, authenticated per provider)

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

use crate::error::AppResult;
use crate::services::payment::{PaymentService, WebhookAck};
use crate::AppState;

/// Both Xendit and Maya send their shared secret in this header
const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn service(state: AppState) -> PaymentService {
    PaymentService::new(state.db, state.config.payments.clone())
}

pub async fn xendit_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let token = header(&headers, CALLBACK_TOKEN_HEADER);
    Ok(Json(service(state).handle_xendit(token, &body).await?))
}

pub async fn maya_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let token = header(&headers, CALLBACK_TOKEN_HEADER);
    Ok(Json(service(state).handle_maya(token, &body).await?))
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = header(&headers, "stripe-signature");
    Ok(Json(service(state).handle_stripe(signature, &body).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaymentsConfig;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum::response::IntoResponse;

    fn maya_service() -> PaymentService {
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/craftworks_test").unwrap();
        PaymentService::new(
            db,
            PaymentsConfig {
                maya_webhook_token: Some("maya-secret".to_string()),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_maya_rejects_wrong_callback_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"X-Callback-Token").unwrap(),
            HeaderValue::from_static("not-the-secret"),
        );

        let token = header(&headers, CALLBACK_TOKEN_HEADER);
        assert_eq!(token, Some("not-the-secret"));

        let err = maya_service().handle_maya(token, b"{}").await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
