//! REST client for the SnapMirror relationship endpoint.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::context::{ConnectionContext, RelationshipId, SyncMode};
use crate::error::{SyncError, SyncResult};

const RELATIONSHIPS_PATH: [&str; 3] = ["api", "snapmirror", "relationships"];
const JSON_MEDIA_TYPE: &str = "application/json";
const OP_FETCH: &str = "fetch relationship";
const OP_TRIGGER: &str = "trigger sync";

/// Build the Basic authentication and JSON content negotiation headers.
pub(crate) fn build_auth_headers(username: &str, password: &str) -> SyncResult<HeaderMap> {
    let encoded = general_purpose::STANDARD.encode(format!("{username}:{password}"));
    let mut authorization = HeaderValue::from_str(&format!("Basic {encoded}"))
        .map_err(|err| SyncError::invalid_input("credentials", err.to_string()))?;
    authorization.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, authorization);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));
    headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
    Ok(headers)
}

/// Relationship record as returned by the cluster, kept opaque.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Relationship(Value);

impl Relationship {
    pub(crate) fn state(&self) -> Option<&str> {
        self.0.get("state").and_then(Value::as_str)
    }

    /// Pretty-printed JSON for the run summary, object keys sorted at every level.
    pub(crate) fn to_pretty_json(&self) -> String {
        let sorted = sort_keys(&self.0);
        serde_json::to_string_pretty(&sorted).unwrap_or_else(|_| sorted.to_string())
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, &Value> = map.iter().collect();
            Value::Object(
                ordered
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sort_keys(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// How the cluster answered the state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerStatus {
    /// 200: the change was applied synchronously.
    Completed,
    /// 202: the change was queued as a cluster job.
    Accepted,
}

/// Immediate response to the state change request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TriggerOutcome {
    status: TriggerStatus,
    body: Value,
}

impl TriggerOutcome {
    pub(crate) const fn status(&self) -> TriggerStatus {
        self.status
    }

    /// Identifier of the cluster job tracking an accepted request.
    pub(crate) fn job_uuid(&self) -> Option<&str> {
        self.body.pointer("/job/uuid").and_then(Value::as_str)
    }
}

#[derive(Serialize)]
struct StateChange {
    state: SyncMode,
}

/// Authenticated client bound to one cluster.
#[derive(Clone)]
pub(crate) struct ReplicationClient {
    http: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl ReplicationClient {
    /// Build a client for the context. Server certificates are not verified.
    pub(crate) fn new(context: &ConnectionContext) -> SyncResult<Self> {
        let headers = build_auth_headers(context.username(), context.password())?;

        let mut builder = Client::builder().danger_accept_invalid_certs(true);
        if let Some(timeout) = context.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|source| SyncError::ClientBuild { source })?;

        Ok(Self::with_client(http, context.base_url().clone(), headers))
    }

    pub(crate) const fn with_client(http: Client, base_url: Url, headers: HeaderMap) -> Self {
        Self {
            http,
            base_url,
            headers,
        }
    }

    pub(crate) fn relationship_url(&self, id: &RelationshipId) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::invalid_input("cluster", "base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(RELATIONSHIPS_PATH)
            .push(id.as_str());
        Ok(url)
    }

    /// GET the relationship; anything but 200 is a lookup failure.
    pub(crate) async fn fetch_relationship(&self, id: &RelationshipId) -> SyncResult<Relationship> {
        let url = self.relationship_url(id)?;
        debug!(%url, "fetching snapmirror relationship");

        let response = self
            .http
            .get(url.clone())
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|source| transport(OP_FETCH, &url, source))?;
        let (status, bytes) = read_response(response, OP_FETCH, &url).await?;

        if status != StatusCode::OK {
            return Err(SyncError::Lookup {
                status,
                body: error_body(&bytes),
            });
        }

        success_body(&bytes)
            .map(Relationship)
            .map_err(|source| SyncError::Decode {
                operation: OP_FETCH,
                source,
            })
    }

    /// PATCH the relationship state; 200 and 202 are both success.
    pub(crate) async fn trigger_sync(
        &self,
        id: &RelationshipId,
        mode: SyncMode,
    ) -> SyncResult<TriggerOutcome> {
        let url = self.relationship_url(id)?;
        debug!(%url, %mode, "requesting snapmirror state change");

        let response = self
            .http
            .patch(url.clone())
            .headers(self.headers.clone())
            .json(&StateChange { state: mode })
            .send()
            .await
            .map_err(|source| transport(OP_TRIGGER, &url, source))?;
        let (status, bytes) = read_response(response, OP_TRIGGER, &url).await?;

        let trigger_status = match status {
            StatusCode::OK => TriggerStatus::Completed,
            StatusCode::ACCEPTED => TriggerStatus::Accepted,
            _ => {
                return Err(SyncError::Trigger {
                    status,
                    body: error_body(&bytes),
                });
            }
        };

        let body = success_body(&bytes).map_err(|source| SyncError::Decode {
            operation: OP_TRIGGER,
            source,
        })?;
        Ok(TriggerOutcome {
            status: trigger_status,
            body,
        })
    }
}

fn transport(operation: &'static str, url: &Url, source: reqwest::Error) -> SyncError {
    SyncError::Transport {
        operation,
        url: url.to_string(),
        source,
    }
}

async fn read_response(
    response: Response,
    operation: &'static str,
    url: &Url,
) -> SyncResult<(StatusCode, Vec<u8>)> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|source| transport(operation, url, source))?;
    Ok((status, bytes.to_vec()))
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Empty bodies become `null`; anything else must be JSON.
fn success_body(bytes: &[u8]) -> Result<Value, serde_json::Error> {
    if is_blank(bytes) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
}

/// Error bodies fall back to their raw text so the remote reason survives.
fn error_body(bytes: &[u8]) -> Value {
    if is_blank(bytes) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use httpmock::Method::PATCH;
    use httpmock::prelude::*;
    use serde_json::json;

    const ADMIN_SECRET: &str = "Basic YWRtaW46c2VjcmV0";

    fn client_for(server: &MockServer) -> Result<ReplicationClient> {
        Ok(ReplicationClient::with_client(
            Client::new(),
            server
                .base_url()
                .parse()
                .map_err(|_| anyhow!("valid URL"))?,
            build_auth_headers("admin", "secret")?,
        ))
    }

    fn relationship_id() -> Result<RelationshipId> {
        Ok(RelationshipId::parse("abc-123")?)
    }

    #[test]
    fn auth_headers_encode_basic_credentials() -> Result<()> {
        let headers = build_auth_headers("admin", "secret")?;
        let authorization = headers
            .get(AUTHORIZATION)
            .ok_or_else(|| anyhow!("authorization header"))?;
        assert_eq!(authorization.to_str()?, ADMIN_SECRET);
        assert!(authorization.is_sensitive());
        assert_eq!(headers.get(CONTENT_TYPE), Some(&HeaderValue::from_static(JSON_MEDIA_TYPE)));
        assert_eq!(headers.get(ACCEPT), Some(&HeaderValue::from_static(JSON_MEDIA_TYPE)));
        Ok(())
    }

    #[test]
    fn auth_header_has_no_line_breaks_for_long_credentials() -> Result<()> {
        let user = "u".repeat(80);
        let password = "p".repeat(120);
        let headers = build_auth_headers(&user, &password)?;
        let value = headers
            .get(AUTHORIZATION)
            .ok_or_else(|| anyhow!("authorization header"))?
            .to_str()?;
        let expected = general_purpose::STANDARD.encode(format!("{user}:{password}"));
        assert_eq!(value, format!("Basic {expected}"));
        assert!(!value.contains('\n'));
        Ok(())
    }

    #[test]
    fn relationship_url_escapes_identifier() -> Result<()> {
        let client = ReplicationClient::with_client(
            Client::new(),
            "https://storage01:8443".parse()?,
            HeaderMap::new(),
        );
        let url = client.relationship_url(&RelationshipId::parse("a/b c")?)?;
        assert_eq!(
            url.as_str(),
            "https://storage01:8443/api/snapmirror/relationships/a%2Fb%20c"
        );
        Ok(())
    }

    #[test]
    fn pretty_json_sorts_keys() -> Result<()> {
        let relationship = Relationship(serde_json::from_str(
            r#"{"uuid":"abc-123","state":"broken_off","destination":{"path":"svm:vol"}}"#,
        )?);
        let rendered = relationship.to_pretty_json();
        let position = |key: &str| {
            rendered
                .find(&format!("\"{key}\""))
                .ok_or_else(|| anyhow!("{key} missing from {rendered}"))
        };
        assert!(position("destination")? < position("state")?);
        assert!(position("state")? < position("uuid")?);
        Ok(())
    }

    #[test]
    fn error_body_keeps_plain_text() {
        assert_eq!(error_body(b"  gateway down \n"), json!("gateway down"));
        assert_eq!(error_body(b"{\"error\":\"busy\"}"), json!({"error": "busy"}));
        assert_eq!(error_body(b""), Value::Null);
    }

    #[tokio::test]
    async fn fetch_relationship_returns_record() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/snapmirror/relationships/abc-123")
                .header("authorization", ADMIN_SECRET)
                .header("accept", JSON_MEDIA_TYPE);
            then.status(200)
                .header("content-type", JSON_MEDIA_TYPE)
                .json_body(json!({"uuid": "abc-123", "state": "broken_off"}));
        });

        let relationship = client_for(&server)?
            .fetch_relationship(&relationship_id()?)
            .await?;
        mock.assert();
        assert_eq!(relationship.state(), Some("broken_off"));
        assert!(relationship.to_pretty_json().contains("\"uuid\": \"abc-123\""));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_relationship_surfaces_not_found() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/snapmirror/relationships/abc-123");
            then.status(404)
                .header("content-type", JSON_MEDIA_TYPE)
                .json_body(json!({"error": {"message": "entry doesn't exist", "code": "4"}}));
        });

        let err = client_for(&server)?
            .fetch_relationship(&relationship_id()?)
            .await
            .err()
            .ok_or_else(|| anyhow!("lookup should fail"))?;
        assert!(matches!(
            &err,
            SyncError::Lookup { status, .. } if *status == StatusCode::NOT_FOUND
        ));
        assert!(err.to_string().contains("entry doesn't exist"));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_relationship_rejects_non_json_success() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/snapmirror/relationships/abc-123");
            then.status(200).body("<html>login</html>");
        });

        let err = client_for(&server)?
            .fetch_relationship(&relationship_id()?)
            .await
            .err();
        assert!(matches!(err, Some(SyncError::Decode { operation: OP_FETCH, .. })));
        Ok(())
    }

    #[tokio::test]
    async fn trigger_sync_sends_state_body() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(PATCH)
                .path("/api/snapmirror/relationships/abc-123")
                .header("authorization", ADMIN_SECRET)
                .header("content-type", JSON_MEDIA_TYPE)
                .json_body(json!({"state": "snapmirrored"}));
            then.status(200)
                .header("content-type", JSON_MEDIA_TYPE)
                .json_body(json!({"uuid": "abc-123", "state": "snapmirrored"}));
        });

        let outcome = client_for(&server)?
            .trigger_sync(&relationship_id()?, SyncMode::Snapmirrored)
            .await?;
        mock.assert();
        assert_eq!(outcome.status(), TriggerStatus::Completed);
        assert_eq!(outcome.job_uuid(), None);
        Ok(())
    }

    #[tokio::test]
    async fn trigger_sync_accepts_async_job() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(PATCH).path("/api/snapmirror/relationships/abc-123");
            then.status(202)
                .header("content-type", JSON_MEDIA_TYPE)
                .json_body(json!({"job": {"uuid": "job-42", "_links": {}}}));
        });

        let outcome = client_for(&server)?
            .trigger_sync(&relationship_id()?, SyncMode::Snapmirrored)
            .await?;
        assert_eq!(outcome.status(), TriggerStatus::Accepted);
        assert_eq!(outcome.job_uuid(), Some("job-42"));
        Ok(())
    }

    #[tokio::test]
    async fn trigger_sync_surfaces_busy_error() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(PATCH).path("/api/snapmirror/relationships/abc-123");
            then.status(500)
                .header("content-type", JSON_MEDIA_TYPE)
                .json_body(json!({"error": "busy"}));
        });

        let err = client_for(&server)?
            .trigger_sync(&relationship_id()?, SyncMode::Snapmirrored)
            .await
            .err()
            .ok_or_else(|| anyhow!("trigger should fail"))?;
        assert!(matches!(err, SyncError::Trigger { .. }));
        assert!(err.to_string().contains("busy"));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_cluster_is_a_transport_error() -> Result<()> {
        let client = ReplicationClient::with_client(
            Client::new(),
            "http://127.0.0.1:1".parse()?,
            build_auth_headers("admin", "secret")?,
        );
        let err = client
            .fetch_relationship(&relationship_id()?)
            .await
            .err()
            .ok_or_else(|| anyhow!("closed port should fail"))?;
        assert!(matches!(err, SyncError::Transport { operation: OP_FETCH, .. }));
        let message = err.to_string().to_lowercase();
        assert!(
            message.contains("connection refused"),
            "cause missing from {message}"
        );
        Ok(())
    }

    #[test]
    fn new_builds_client_from_context() -> Result<()> {
        let context = ConnectionContext::new(
            "storage01",
            443,
            "admin",
            "secret",
            SyncMode::Snapmirrored,
            None,
        )?;
        let client = ReplicationClient::new(&context)?;
        assert_eq!(
            client.relationship_url(&relationship_id()?)?.as_str(),
            "https://storage01/api/snapmirror/relationships/abc-123"
        );
        Ok(())
    }
}
