//! LINE channel: webhook intake and Messaging API delivery.
//!
//! Inbound: `POST /callback` receives webhook batches signed with the channel
//! secret (`X-Line-Signature`), turns text-message events into
//! [`InboundEvent`]s and hands them to the dispatcher queue.
//!
//! Outbound: up to five messages go out with the event's reply token; any
//! remainder is pushed to the user in order, five per request.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::channels::{InboundEvent, ReplySink};
use crate::error::ChannelError;

/// Production Messaging API host.
const LINE_API_BASE: &str = "https://api.line.me";

/// The reply and push APIs accept at most this many messages per call.
pub const MAX_MESSAGES_PER_REQUEST: usize = 5;

/// Header carrying the webhook body signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Liveness text served on `GET /`.
pub const LIVENESS_TEXT: &str = "LINE占いBotは稼働中！";

type HmacSha256 = Hmac<Sha256>;

// ── Signatures ──────────────────────────────────────────────────────────

/// Base64 HMAC-SHA256 of `body` keyed by the channel secret.
pub fn compute_signature(channel_secret: &SecretString, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(channel_secret.expose_secret().as_bytes()).ok()?;
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check `signature` against the body in constant time.
pub fn verify_signature(channel_secret: &SecretString, body: &[u8], signature: &str) -> bool {
    let Ok(claimed) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(&claimed).into()
}

// ── Webhook payload ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    #[serde(rename = "type")]
    kind: String,
    reply_token: Option<String>,
    source: Option<EventSource>,
    message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventSource {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Extract text-message events from a webhook body.
///
/// Other event and message types (follow, stickers, images, ...) are skipped.
pub fn parse_events(body: &[u8]) -> Result<Vec<InboundEvent>, ChannelError> {
    let parsed: WebhookBody = serde_json::from_slice(body)
        .map_err(|e| ChannelError::InvalidMessage(format!("webhook body: {e}")))?;

    Ok(parsed
        .events
        .into_iter()
        .filter(|ev| ev.kind == "message")
        .filter_map(|ev| {
            let message = ev.message?;
            if message.kind != "text" {
                return None;
            }
            let user_id = ev.source?.user_id?;
            Some(InboundEvent {
                user_id,
                text: message.text.unwrap_or_default(),
                reply_token: ev.reply_token,
            })
        })
        .collect())
}

// ── Webhook routes ──────────────────────────────────────────────────────

/// Axum handler state (cloneable).
#[derive(Clone)]
pub struct WebhookState {
    channel_secret: SecretString,
    events: mpsc::Sender<InboundEvent>,
}

impl WebhookState {
    pub fn new(channel_secret: SecretString, events: mpsc::Sender<InboundEvent>) -> Self {
        Self {
            channel_secret,
            events,
        }
    }
}

/// Build the router serving `GET /` and `POST /callback`.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/callback", post(callback))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

async fn callback(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!("Webhook request without signature header");
        return StatusCode::BAD_REQUEST;
    };

    if !verify_signature(&state.channel_secret, &body, signature) {
        warn!("Webhook signature mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    let events = match parse_events(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Malformed webhook body");
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!(count = events.len(), "Webhook accepted");
    for event in events {
        match state.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(user_id = %event.user_id, "Event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Event queue closed");
                return StatusCode::SERVICE_UNAVAILABLE;
            }
        }
    }
    StatusCode::OK
}

// ── Delivery ────────────────────────────────────────────────────────────

/// Sends replies through the LINE Messaging API.
pub struct LineChannel {
    access_token: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(access_token: SecretString) -> Self {
        Self {
            access_token,
            api_base: LINE_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the channel at another API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v2/bot/message/{path}", self.api_base)
    }

    async fn post_messages(&self, path: &str, body: serde_json::Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(path))
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "line".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ChannelError::AuthFailed {
                name: "line".into(),
                reason: format!("{path} returned {status}"),
            });
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "line".into(),
                reason: format!("{path} returned {status}: {detail}"),
            });
        }
        Ok(())
    }

    async fn reply(&self, reply_token: &str, batch: &[String]) -> Result<(), ChannelError> {
        self.post_messages(
            "reply",
            serde_json::json!({
                "replyToken": reply_token,
                "messages": text_messages(batch),
            }),
        )
        .await
    }

    async fn push(&self, user_id: &str, batch: &[String]) -> Result<(), ChannelError> {
        self.post_messages(
            "push",
            serde_json::json!({
                "to": user_id,
                "messages": text_messages(batch),
            }),
        )
        .await
    }
}

fn text_messages(batch: &[String]) -> Vec<serde_json::Value> {
    batch
        .iter()
        .map(|text| serde_json::json!({ "type": "text", "text": text }))
        .collect()
}

#[async_trait]
impl ReplySink for LineChannel {
    async fn deliver(&self, event: &InboundEvent, messages: Vec<String>) -> Result<(), ChannelError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut rest = messages.as_slice();
        if let Some(token) = event.reply_token.as_deref() {
            let (first, tail) = rest.split_at(rest.len().min(MAX_MESSAGES_PER_REQUEST));
            self.reply(token, first).await?;
            rest = tail;
        }
        for batch in rest.chunks(MAX_MESSAGES_PER_REQUEST) {
            self.push(&event.user_id, batch).await?;
        }

        info!(
            user_id = %event.user_id,
            segments = messages.len(),
            "Reply delivered"
        );
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Json;
    use tokio::net::TcpListener;

    use super::*;

    fn secret() -> SecretString {
        SecretString::from("channel-secret")
    }

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"events":[]}"#;
        let sig = compute_signature(&secret(), body).unwrap();
        assert!(verify_signature(&secret(), body, &sig));
    }

    #[test]
    fn signature_rejects_tampered_body() {
        let sig = compute_signature(&secret(), b"original").unwrap();
        assert!(!verify_signature(&secret(), b"tampered", &sig));
    }

    #[test]
    fn signature_rejects_wrong_secret_and_garbage() {
        let body = b"payload";
        let sig = compute_signature(&SecretString::from("other"), body).unwrap();
        assert!(!verify_signature(&secret(), body, &sig));
        assert!(!verify_signature(&secret(), body, "not base64!!"));
        assert!(!verify_signature(&secret(), body, ""));
    }

    #[test]
    fn parse_keeps_only_text_messages() {
        let body = serde_json::json!({
            "destination": "Uxxx",
            "events": [
                {
                    "type": "message",
                    "replyToken": "r1",
                    "source": { "type": "user", "userId": "U1" },
                    "message": { "type": "text", "id": "1", "text": "占い 恋愛運" }
                },
                {
                    "type": "message",
                    "replyToken": "r2",
                    "source": { "type": "user", "userId": "U2" },
                    "message": { "type": "sticker", "id": "2" }
                },
                {
                    "type": "follow",
                    "replyToken": "r3",
                    "source": { "type": "user", "userId": "U3" }
                }
            ]
        });
        let events = parse_events(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![InboundEvent::new("U1", "占い 恋愛運").with_reply_token("r1")]
        );
    }

    #[test]
    fn parse_empty_and_invalid_bodies() {
        assert!(parse_events(br#"{"events":[]}"#).unwrap().is_empty());
        assert!(parse_events(br#"{}"#).unwrap().is_empty());
        assert!(matches!(
            parse_events(b"not json"),
            Err(ChannelError::InvalidMessage(_))
        ));
    }

    type Recorded = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    /// Local stand-in for the Messaging API that records every call.
    async fn mock_api() -> (String, Recorded) {
        let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
        let reply_log = Arc::clone(&recorded);
        let push_log = Arc::clone(&recorded);
        let app = Router::new()
            .route(
                "/v2/bot/message/reply",
                post(move |Json(body): Json<serde_json::Value>| async move {
                    reply_log.lock().unwrap().push(("reply".into(), body));
                    StatusCode::OK
                }),
            )
            .route(
                "/v2/bot/message/push",
                post(move |Json(body): Json<serde_json::Value>| async move {
                    push_log.lock().unwrap().push(("push".into(), body));
                    StatusCode::OK
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), recorded)
    }

    fn texts(body: &serde_json::Value) -> Vec<String> {
        body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["text"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn deliver_replies_then_pushes_remainder() {
        let (base, recorded) = mock_api().await;
        let channel = LineChannel::new(SecretString::from("token")).with_api_base(base);
        let event = InboundEvent::new("U1", "占い").with_reply_token("r1");
        let messages: Vec<String> = (1..=12).map(|i| format!("m{i}")).collect();

        channel.deliver(&event, messages).await.unwrap();

        let calls = recorded.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0, "reply");
        assert_eq!(calls[0].1["replyToken"], "r1");
        assert_eq!(texts(&calls[0].1), vec!["m1", "m2", "m3", "m4", "m5"]);
        assert_eq!(calls[1].0, "push");
        assert_eq!(calls[1].1["to"], "U1");
        assert_eq!(texts(&calls[1].1), vec!["m6", "m7", "m8", "m9", "m10"]);
        assert_eq!(texts(&calls[2].1), vec!["m11", "m12"]);
    }

    #[tokio::test]
    async fn deliver_without_reply_token_pushes() {
        let (base, recorded) = mock_api().await;
        let channel = LineChannel::new(SecretString::from("token")).with_api_base(base);

        channel
            .deliver(&InboundEvent::new("U9", "hi"), vec!["hello".into()])
            .await
            .unwrap();

        let calls = recorded.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "push");
        assert_eq!(texts(&calls[0].1), vec!["hello"]);
    }

    #[tokio::test]
    async fn deliver_nothing_makes_no_calls() {
        let (base, recorded) = mock_api().await;
        let channel = LineChannel::new(SecretString::from("token")).with_api_base(base);
        let event = InboundEvent::new("U1", "x").with_reply_token("r");
        channel.deliver(&event, vec![]).await.unwrap();
        assert!(recorded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deliver_reports_api_failure() {
        let app = Router::new().route(
            "/v2/bot/message/reply",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let channel =
            LineChannel::new(SecretString::from("token")).with_api_base(format!("http://{addr}"));
        let event = InboundEvent::new("U1", "x").with_reply_token("r");
        let err = channel.deliver(&event, vec!["a".into()]).await.unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
    }
}
