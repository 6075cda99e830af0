//! Upstream status source: one atomic snapshot of every server per poll.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shardwatch_db::{ServerSnapshot, ServerStatus, Tier};
use thiserror::Error;
use tracing::debug;

const SERVERS_QUERY: &str =
    "{ connectedServices { servers { name status accessLevel playerMaximum apiHost } } }";

/// The status source could not produce a usable snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("status source unavailable: {reason}")]
pub struct SourceUnavailable {
    pub reason: String,
}

impl SourceUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for SourceUnavailable {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new("request timed out")
        } else {
            Self::new(err.to_string())
        }
    }
}

/// Something that can report the current state of every server.
pub trait StatusSource: Send + Sync {
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<ServerSnapshot>, SourceUnavailable>> + Send;
}

/// Status source backed by the game's GraphQL API.
#[derive(Clone)]
pub struct GraphQlSource {
    client: reqwest::Client,
    url: String,
}

impl GraphQlSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceUnavailable> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("shardwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
}

impl StatusSource for GraphQlSource {
    async fn fetch_all(&self) -> Result<Vec<ServerSnapshot>, SourceUnavailable> {
        let response = self
            .client
            .post(&self.url)
            .header("api-version", "1.0")
            .header("Accept", "application/json")
            .json(&GraphQlRequest {
                query: SERVERS_QUERY,
            })
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        let snapshots = decode_response(status, &body)?;
        debug!(count = snapshots.len(), "fetched server snapshot");
        Ok(snapshots)
    }
}

#[derive(Deserialize)]
struct Envelope {
    data: Option<Data>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Data {
    connected_services: ConnectedServices,
}

#[derive(Deserialize)]
struct ConnectedServices {
    servers: Vec<WireServer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireServer {
    name: String,
    status: String,
    access_level: String,
    player_maximum: i64,
    api_host: Option<String>,
}

/// Decode a GraphQL response body into a snapshot.
///
/// Any structural problem rejects the whole response. Unknown status or tier
/// strings do not: they are coerced (status to `Unknown`, tier to `Employees`).
pub fn decode_response(status: u16, body: &[u8]) -> Result<Vec<ServerSnapshot>, SourceUnavailable> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|err| SourceUnavailable::new(format!("malformed response (HTTP {status}): {err}")))?;

    let data = match (status, envelope.data) {
        (200, Some(data)) => data,
        (_, _) => {
            let detail = envelope
                .message
                .or_else(|| envelope.errors.into_iter().next().map(|e| e.message))
                .unwrap_or_else(|| "no data".to_string());
            return Err(SourceUnavailable::new(format!("HTTP {status}: {detail}")));
        }
    };

    data.connected_services
        .servers
        .into_iter()
        .map(|server| {
            if server.name.trim().is_empty() {
                return Err(SourceUnavailable::new("malformed response: server without a name"));
            }
            Ok(ServerSnapshot {
                status: ServerStatus::from_upstream(&server.status),
                access_tier: Tier::for_server(&server.access_level),
                capacity: server.player_maximum,
                api_host: server.api_host.unwrap_or_default(),
                name: server.name,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(servers: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({ "data": { "connectedServices": { "servers": servers } } })).unwrap()
    }

    #[test]
    fn test_decodes_servers_in_order() {
        let raw = body(json!([
            { "name": "Hatchery", "status": "Online", "accessLevel": "Alpha", "playerMaximum": 50, "apiHost": "hatchery.example" },
            { "name": "Wyrmling", "status": "Offline", "accessLevel": "Beta1", "playerMaximum": 0, "apiHost": null }
        ]));

        let servers = decode_response(200, &raw).unwrap();

        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "Hatchery");
        assert_eq!(servers[0].status, ServerStatus::Online);
        assert_eq!(servers[0].access_tier, Tier::Alpha);
        assert_eq!(servers[0].capacity, 50);
        assert_eq!(servers[0].api_host, "hatchery.example");
        assert_eq!(servers[1].api_host, "");
    }

    #[test]
    fn test_unknown_values_are_coerced_not_rejected() {
        let raw = body(json!([
            { "name": "Hatchery", "status": "Rebooting", "accessLevel": "Gold", "playerMaximum": 50, "apiHost": "h" }
        ]));

        let servers = decode_response(200, &raw).unwrap();

        assert_eq!(servers[0].status, ServerStatus::Unknown);
        assert_eq!(servers[0].access_tier, Tier::Employees);
    }

    #[test]
    fn test_missing_field_fails_the_whole_snapshot() {
        let raw = body(json!([
            { "name": "Hatchery", "status": "Online", "accessLevel": "Alpha", "playerMaximum": 50 },
            { "name": "Wyrmling", "status": "Online", "accessLevel": "Alpha" }
        ]));

        assert!(decode_response(200, &raw).is_err());
    }

    #[test]
    fn test_nameless_server_fails_the_whole_snapshot() {
        let raw = body(json!([
            { "name": "  ", "status": "Online", "accessLevel": "Alpha", "playerMaximum": 50 }
        ]));

        assert!(decode_response(200, &raw).is_err());
    }

    #[test]
    fn test_error_status_reports_upstream_message() {
        let raw = serde_json::to_vec(&json!({ "Message": "API key expired" })).unwrap();

        let err = decode_response(401, &raw).unwrap_err();

        assert_eq!(err.reason, "HTTP 401: API key expired");
    }

    #[test]
    fn test_graphql_errors_without_data() {
        let raw = serde_json::to_vec(&json!({ "data": null, "errors": [{ "message": "boom" }] })).unwrap();

        let err = decode_response(200, &raw).unwrap_err();

        assert_eq!(err.reason, "HTTP 200: boom");
    }

    #[test]
    fn test_non_json_body() {
        assert!(decode_response(502, b"<html>Bad Gateway</html>").is_err());
    }
}
