//! HTTP endpoint for the Slack Events API.
//!
//! Answers handshake challenges, verifies request signatures when a signing
//! secret is configured, and hands everything else to the ingress filter.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

use crate::{
    base::{config::Config, types::Void},
    interaction::ingress::{self, Ingress},
    service::queue::QueueClient,
};

type HmacSha256 = Hmac<Sha256>;

/// Requests older than this are rejected when signatures are verified.
const MAX_REQUEST_AGE_SECS: u64 = 60 * 5;

#[derive(Clone)]
struct WebhookState {
    config: Config,
    queue: QueueClient,
}

/// Build the webhook router.
pub fn router(config: Config, queue: QueueClient) -> Router {
    let path = config.webhook_path.clone();

    Router::new().route(&path, post(handle_events)).with_state(WebhookState { config, queue })
}

/// Serve the webhook until Ctrl-C.
pub async fn serve(config: Config, queue: QueueClient) -> Void {
    let listener = TcpListener::bind(&config.webhook_bind).await?;

    info!("Slack Events webhook listening on {}{}", config.webhook_bind, config.webhook_path);

    axum::serve(listener, router(config, queue))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

#[instrument(skip_all)]
async fn handle_events(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    if !state.config.slack_signing_secret.is_empty() && !verify_signature(&state.config.slack_signing_secret, &headers, &body, chrono::Utc::now().timestamp()) {
        warn!("Rejected webhook request: invalid Slack signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let payload = match ingress::parse_webhook(&body) {
        Ok(payload) => payload,
        Err(err) => {
            error!("Failed to parse webhook body: {}", err);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match ingress::classify(payload, state.config.forward_app_mentions) {
        Ingress::Challenge(challenge) => ([(header::CONTENT_TYPE, "text/plain")], challenge).into_response(),
        Ingress::Drop => StatusCode::OK.into_response(),
        Ingress::Forward(event) => match ingress::publish_event(&state.queue, &event).await {
            Ok(_) => StatusCode::OK.into_response(),
            Err(err) => {
                error!("Failed to publish event: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}

/// Check the `v0` HMAC-SHA256 signature Slack attaches to every request.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8], now: i64) -> bool {
    let timestamp = headers.get("X-Slack-Request-Timestamp").and_then(|v| v.to_str().ok()).unwrap_or_default();
    let signature = headers.get("X-Slack-Signature").and_then(|v| v.to_str().ok()).unwrap_or_default();

    let Ok(sent_at) = timestamp.parse::<i64>() else {
        return false;
    };

    if now.abs_diff(sent_at) > MAX_REQUEST_AGE_SECS {
        return false;
    }

    let Some(expected) = signature.strip_prefix("v0=").and_then(|hex_sig| hex::decode(hex_sig).ok()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);

    mac.verify_slice(&expected).is_ok()
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use mockall::mock;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        base::{
            config::ConfigInner,
            types::{NormalizedEvent, Res},
        },
        service::queue::GenericQueueClient,
    };

    mock! {
        pub Queue {}

        #[async_trait]
        impl GenericQueueClient for Queue {
            async fn publish(&self, payload: Vec<u8>) -> Res<String>;
        }
    }

    fn create_test_config(signing_secret: &str) -> Config {
        Config {
            inner: Arc::new(ConfigInner {
                slack_bot_token: "xoxb-test".to_string(),
                slack_signing_secret: signing_secret.to_string(),
                webhook_path: "/slack/events".to_string(),
                ..Default::default()
            }),
        }
    }

    fn sign(secret: &str, timestamp: i64, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("v0:{timestamp}:{body}").as_bytes());

        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    async fn post_event(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn request(body: String) -> Request<Body> {
        Request::builder().method("POST").uri("/slack/events").body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_challenge_is_answered_as_plain_text() {
        let mut queue = MockQueue::new();
        queue.expect_publish().never();

        let app = router(create_test_config(""), QueueClient::new(Arc::new(queue)));
        let response = app
            .oneshot(request(json!({"type": "url_verification", "challenge": "abc123"}).to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abc123");
    }

    #[tokio::test]
    async fn test_accepted_event_is_published_once() {
        let mut queue = MockQueue::new();
        queue
            .expect_publish()
            .times(1)
            .withf(|payload| NormalizedEvent::decode(payload).map(|e| e.text == "hi there").unwrap_or(false))
            .returning(|_| Ok("1".to_string()));

        let body = json!({"type": "event_callback", "event": {"type": "message", "channel": "D1", "channel_type": "im", "user": "U1", "text": "hi there", "ts": "1.1"}});
        let app = router(create_test_config(""), QueueClient::new(Arc::new(queue)));

        let (status, text) = post_event(app, request(body.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_a_server_error() {
        let mut queue = MockQueue::new();
        queue.expect_publish().returning(|_| Err(anyhow::anyhow!("nats unavailable")));

        let body = json!({"type": "event_callback", "event": {"type": "message", "channel": "D1", "channel_type": "im", "user": "U1", "text": "hi", "ts": "1.1"}});
        let app = router(create_test_config(""), QueueClient::new(Arc::new(queue)));

        let (status, _) = post_event(app, request(body.to_string())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_filtered_event_is_accepted_without_publishing() {
        let mut queue = MockQueue::new();
        queue.expect_publish().never();

        let body = json!({"type": "event_callback", "event": {"type": "message", "channel": "C1", "channel_type": "channel", "user": "U1", "text": "chatter", "ts": "1.1"}});
        let app = router(create_test_config(""), QueueClient::new(Arc::new(queue)));

        let (status, _) = post_event(app, request(body.to_string())).await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unreadable_body_is_a_bad_request() {
        let app = router(create_test_config(""), QueueClient::new(Arc::new(MockQueue::new())));

        let (status, _) = post_event(app, request("{not json".to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_signature_is_enforced_when_configured() {
        let body = json!({"type": "url_verification", "challenge": "abc123"}).to_string();
        let now = chrono::Utc::now().timestamp();

        let unsigned = router(create_test_config("s3cret"), QueueClient::new(Arc::new(MockQueue::new())));
        let (status, _) = post_event(unsigned, request(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let signed = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("X-Slack-Request-Timestamp", now.to_string())
            .header("X-Slack-Signature", sign("s3cret", now, &body))
            .body(Body::from(body))
            .unwrap();
        let app = router(create_test_config("s3cret"), QueueClient::new(Arc::new(MockQueue::new())));
        let (status, text) = post_event(app, signed).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "abc123");
    }

    #[test]
    fn test_stale_signature_is_rejected() {
        let body = "{}";
        let mut headers = HeaderMap::new();
        headers.insert("X-Slack-Request-Timestamp", "1000".parse().unwrap());
        headers.insert("X-Slack-Signature", sign("s3cret", 1000, body).parse().unwrap());

        assert!(verify_signature("s3cret", &headers, body.as_bytes(), 1000 + 10));
        assert!(!verify_signature("s3cret", &headers, body.as_bytes(), 1000 + MAX_REQUEST_AGE_SECS as i64 + 1));
        assert!(!verify_signature("other", &headers, body.as_bytes(), 1000));
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        let body = "{}";

        for timestamp in [i64::MIN, i64::MAX] {
            let mut headers = HeaderMap::new();
            headers.insert("X-Slack-Request-Timestamp", timestamp.to_string().parse().unwrap());
            headers.insert("X-Slack-Signature", sign("s3cret", timestamp, body).parse().unwrap());

            assert!(!verify_signature("s3cret", &headers, body.as_bytes(), 1_700_000_000));
        }
    }
}
