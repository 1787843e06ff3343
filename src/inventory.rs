//! Typed access to the PuppetDB node inventory.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;

/// A node as listed by PuppetDB. Fields the check doesn't use are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Node {
    pub name: String,
    /// `null` for nodes that never had a catalog compiled.
    #[serde(default)]
    pub catalog_timestamp: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("GET {url}: {}", error_chain(.source))]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("parsing response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Joins an error with all of its causes, `outer: inner: root`.
///
/// reqwest keeps the interesting part (refused, timed out, dns) in the source chain. Causes
/// already spelled out by the outer message are skipped.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !out.ends_with(&cause_text) {
            out.push_str(": ");
            out.push_str(&cause_text);
        }
        source = cause.source();
    }

    out
}

/// Where the list of nodes comes from.
pub trait NodeSource {
    fn nodes(&self) -> Result<Vec<Node>, FetchError>;
}

pub struct PuppetDbClient {
    nodes_url: String,
    http: Client,
}

impl PuppetDbClient {
    pub const NODES_PATH: &'static str = "/v3/nodes";

    /// PuppetDB is queried directly, proxy environment variables are not honoured.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .no_proxy()
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            nodes_url: format!("{}{}", config.base_url(), Self::NODES_PATH),
            http,
        })
    }

    pub fn nodes_url(&self) -> &str {
        &self.nodes_url
    }
}

impl NodeSource for PuppetDbClient {
    fn nodes(&self) -> Result<Vec<Node>, FetchError> {
        let url = &self.nodes_url;
        debug!(%url, "querying puppetdb");

        let resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source: source.without_url(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status,
            });
        }

        let body = resp.text().map_err(|source| FetchError::Request {
            url: url.clone(),
            source: source.without_url(),
        })?;

        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use super::*;

    /// Answers exactly one HTTP request with the given status line and body, and returns a
    /// config pointing at it.
    fn serve_once(status: &'static str, body: &'static str) -> Config {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let port = listener.local_addr().expect("local addr").port();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).expect("read request");
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream
                .write_all(response.as_bytes())
                .expect("write response");
        });

        Config {
            pdbhost: "127.0.0.1".to_owned(),
            pdbport: port,
            timeout: Duration::from_secs(5),
            ..Config::default()
        }
    }

    #[test]
    fn test_node_deserialize() {
        let nodes: Vec<Node> = serde_json::from_str(
            r#"[
                {"name": "web1.example.com", "deactivated": null,
                 "catalog_timestamp": "2024-03-01T10:00:00.123Z",
                 "facts_timestamp": "2024-03-01T09:59:58.001Z"},
                {"name": "new.example.com", "catalog_timestamp": null},
                {"name": "bare.example.com"}
            ]"#,
        )
        .expect("valid node list");

        assert_eq!(nodes.len(), 3);
        assert_eq!(&nodes[0].name, "web1.example.com");
        assert_eq!(
            nodes[0].catalog_timestamp.as_deref(),
            Some("2024-03-01T10:00:00.123Z")
        );
        assert_eq!(nodes[1].catalog_timestamp, None);
        assert_eq!(nodes[2].catalog_timestamp, None);
    }

    #[test]
    fn test_nodes_url() {
        let client = PuppetDbClient::new(&Config::default()).expect("client");
        assert_eq!(client.nodes_url(), "http://localhost:8080/v3/nodes");
    }

    #[test]
    fn test_fetch_nodes() {
        let config = serve_once(
            "200 OK",
            r#"[{"name":"a","catalog_timestamp":"2024-03-01T10:00:00Z"},{"name":"b","catalog_timestamp":null}]"#,
        );
        let client = PuppetDbClient::new(&config).expect("client");

        let nodes = client.nodes().expect("nodes");
        assert_eq!(
            nodes,
            vec![
                Node {
                    name: "a".to_owned(),
                    catalog_timestamp: Some("2024-03-01T10:00:00Z".to_owned()),
                },
                Node {
                    name: "b".to_owned(),
                    catalog_timestamp: None,
                },
            ]
        );
    }

    #[test]
    fn test_fetch_error_status() {
        let config = serve_once("500 Internal Server Error", "oops");
        let client = PuppetDbClient::new(&config).expect("client");

        let err = client.nodes().unwrap_err();
        assert!(matches!(
            err,
            FetchError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(err.to_string().contains("returned 500"));
    }

    #[test]
    fn test_fetch_error_malformed_json() {
        let config = serve_once("200 OK", r#"{"not": "a list"}"#);
        let client = PuppetDbClient::new(&config).expect("client");

        let err = client.nodes().unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(err.to_string().starts_with("parsing response from http://127.0.0.1:"));
    }

    #[test]
    fn test_fetch_error_connection_refused() {
        // grab a free port and release it again so nothing listens there
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("local addr").port()
        };
        let config = Config {
            pdbhost: "127.0.0.1".to_owned(),
            pdbport: port,
            ..Config::default()
        };
        let client = PuppetDbClient::new(&config).expect("client");

        let err = client.nodes().unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));

        let message = err.to_string();
        assert!(message.to_lowercase().contains("refused"), "{}", message);
        assert_eq!(message.matches("http://127.0.0.1:").count(), 1, "{}", message);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer(#[source] Middle);

    #[derive(Debug, thiserror::Error)]
    #[error("middle: root")]
    struct Middle(#[source] Root);

    #[derive(Debug, thiserror::Error)]
    #[error("root")]
    struct Root;

    #[test]
    fn test_error_chain() {
        assert_eq!(error_chain(&Root), "root");
        assert_eq!(error_chain(&Outer(Middle(Root))), "outer: middle: root");
    }
}
