//! HTTP transport for GraphQL requests
//!
//! Posts the request body as JSON and settles the observer from a spawned
//! task. Persisted requests go out in the `extensions.persistedQuery` form.

use crate::config::ClientConfig;
use std::time::Duration;
use tokio::runtime::Handle;
use vitrine_mutation::{GraphQlRequest, GraphQlResponse, Network, NetworkError, Observer};

/// [`Network`] over HTTP POST
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
    url: String,
}

impl HttpNetwork {
    /// Network posting to `url` with a default client
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Network for the configured deployment
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &ClientConfig) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| NetworkError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            url: config.graphql_url().to_string(),
        })
    }

    /// With a preconfigured client
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Endpoint
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(
        client: reqwest::Client,
        url: String,
        request: GraphQlRequest,
    ) -> Result<GraphQlResponse, NetworkError> {
        let response = client
            .post(&url)
            .json(&request.to_body())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<GraphQlResponse>()
            .await
            .map_err(|err| NetworkError::Decode(err.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout { timeout_ms: 0 }
    } else {
        NetworkError::Transport(err.to_string())
    }
}

impl Network for HttpNetwork {
    fn execute(&self, request: GraphQlRequest, observer: Observer) {
        let Ok(handle) = Handle::try_current() else {
            observer.error(NetworkError::Transport("no async runtime".to_string()));
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();
        let operation = request.operation_name.clone();
        handle.spawn(async move {
            tracing::trace!(%operation, %url, "sending request");
            match Self::send(client, url, request).await {
                Ok(response) => observer.complete(response),
                Err(err) => {
                    tracing::debug!(%operation, error = %err, "request failed");
                    observer.error(err);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use vitrine_mutation::{MutationError, OperationKind};

    /// Serve one HTTP response and hand back the request body
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/graphql", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let request_body = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + length {
                        break text[split + 4..].to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request_body
        });
        (url, server)
    }

    fn request() -> GraphQlRequest {
        GraphQlRequest::new("ViewerQuery", OperationKind::Query, json!({"first": 2}))
            .with_query("query ViewerQuery { viewer { __typename } }")
    }

    #[tokio::test]
    async fn posts_json_and_decodes_response() {
        let (url, server) = serve_once("200 OK", r#"{"data":{"viewer":null}}"#).await;
        let network = HttpNetwork::new(url);
        let (observer, completion) = Observer::channel();
        network.execute(request(), observer);

        let response = completion.wait("ViewerQuery").await.unwrap();
        assert_eq!(response.data, Some(json!({"viewer": null})));

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["operationName"], "ViewerQuery");
        assert_eq!(sent["variables"]["first"], 2);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (url, _server) = serve_once("503 Service Unavailable", r#"{"message":"down"}"#).await;
        let network = HttpNetwork::new(url);
        let (observer, completion) = Observer::channel();
        network.execute(request(), observer);

        let err = completion.wait("ViewerQuery").await.unwrap_err();
        assert!(matches!(
            err,
            MutationError::Network(NetworkError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn without_runtime_fails_immediately() {
        let network = HttpNetwork::new("http://127.0.0.1:1/graphql");
        let (observer, completion) = Observer::channel();
        network.execute(request(), observer);

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let err = runtime.block_on(completion.wait("ViewerQuery")).unwrap_err();
        assert!(matches!(err, MutationError::Network(NetworkError::Transport(_))));
    }

    #[test]
    fn from_config_uses_deployment_url() {
        let config = ClientConfig::new().with_graphql_url("http://localhost:9/q");
        assert_eq!(HttpNetwork::from_config(&config).unwrap().url(), "http://localhost:9/q");
    }
}
