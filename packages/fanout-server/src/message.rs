//! Structured message backends raced by the `POST /message` call site.
//!
//! Each backend receives the inbound [`Message`] as JSON and must reply with a
//! [`Message`]. The first decodable 2xx reply wins.

use std::sync::Arc;

use async_trait::async_trait;
use fanout_core::{Context, Operation, Traced};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::endpoint::EndpointError;

/// Envelope exchanged with message backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub source: String,
    pub destination: String,
    #[serde(default = "Uuid::new_v4")]
    pub transaction_uuid: Uuid,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

fn default_content_type() -> String {
    "application/json".to_string()
}

impl Message {
    /// Rejects envelopes that cannot be routed.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing field.
    pub fn check(&self) -> Result<(), String> {
        if self.source.trim().is_empty() {
            return Err("message source must not be empty".to_string());
        }
        if self.destination.trim().is_empty() {
            return Err("message destination must not be empty".to_string());
        }
        Ok(())
    }
}

/// Posts a [`Message`] to one url and decodes the reply.
#[derive(Debug, Clone)]
pub struct MessageEndpoint {
    url: Url,
    client: reqwest::Client,
}

impl MessageEndpoint {
    #[must_use]
    pub fn new(url: Url, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl Operation<Message> for MessageEndpoint {
    type Response = Traced<Message>;
    type Error = EndpointError;

    async fn call(
        &self,
        ctx: Context,
        message: Arc<Message>,
    ) -> Result<Traced<Message>, EndpointError> {
        let url = self.url.to_string();
        let send = self.client.post(self.url.clone()).json(&*message).send();

        let response = tokio::select! {
            biased;
            cause = ctx.done() => return Err(cause.into()),
            result = send => result.map_err(|source| EndpointError::Transport {
                url: url.clone(),
                source,
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointError::Status { url, status });
        }

        let reply = tokio::select! {
            biased;
            cause = ctx.done() => return Err(cause.into()),
            result = response.json::<Message>() => result
                .map_err(|source| EndpointError::Decode { url, source })?,
        };

        Ok(Traced::new(reply))
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::post;
    use axum::{Json, Router};
    use http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::test_support::spawn_backend;

    fn message() -> Arc<Message> {
        Arc::new(Message {
            source: "mac:112233445566".into(),
            destination: "event:device-status".into(),
            transaction_uuid: Uuid::new_v4(),
            content_type: "application/json".into(),
            payload: json!({"online": true}),
        })
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let msg: Message =
            serde_json::from_value(json!({"source": "a", "destination": "b"})).unwrap();
        assert_eq!(msg.content_type, "application/json");
        assert!(msg.payload.is_null());
        assert!(msg.check().is_ok());
    }

    #[test]
    fn check_requires_routing_fields() {
        let mut msg = (*message()).clone();
        msg.destination = " ".into();
        assert_eq!(
            msg.check().unwrap_err(),
            "message destination must not be empty"
        );
        msg.source.clear();
        assert_eq!(msg.check().unwrap_err(), "message source must not be empty");
    }

    #[tokio::test]
    async fn reply_is_decoded() {
        let backend = Router::new().route(
            "/inbox",
            post(|Json(mut msg): Json<Message>| async move {
                std::mem::swap(&mut msg.source, &mut msg.destination);
                Json(msg)
            }),
        );
        let base = spawn_backend(backend).await;
        let endpoint = MessageEndpoint::new(base.join("inbox").unwrap(), reqwest::Client::new());

        let sent = message();
        let reply = endpoint
            .call(Context::background(), Arc::clone(&sent))
            .await
            .unwrap();

        assert_eq!(reply.value.source, sent.destination);
        assert_eq!(reply.value.transaction_uuid, sent.transaction_uuid);
        assert!(reply.spans.is_empty());
    }

    #[tokio::test]
    async fn undecodable_reply_is_an_error() {
        let backend = Router::new().route("/inbox", post(|| async { "not json" }));
        let base = spawn_backend(backend).await;
        let endpoint = MessageEndpoint::new(base.join("inbox").unwrap(), reqwest::Client::new());

        let err = endpoint
            .call(Context::background(), message())
            .await
            .unwrap_err();
        assert!(matches!(err, EndpointError::Decode { .. }));
    }

    #[tokio::test]
    async fn rejected_message_is_a_status_error() {
        let backend = Router::new().route(
            "/inbox",
            post(|| async { (StatusCode::NOT_FOUND, "no such device") }),
        );
        let base = spawn_backend(backend).await;
        let endpoint = MessageEndpoint::new(base.join("inbox").unwrap(), reqwest::Client::new());

        let err = endpoint
            .call(Context::background(), message())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EndpointError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            }
        ));
    }
}
