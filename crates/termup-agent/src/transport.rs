//! ---
//! termup_section: "06-terminal-agent"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Terminal update agent."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use termup_manifest::CheckUpdateResponse;
use tracing::debug;
use url::Url;

use crate::config::AgentConfig;
use crate::AgentError;

/// Network side of an agent run.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    /// Ask the server whether `local_version` is current.
    async fn check(&self, local_version: &str) -> Result<CheckUpdateResponse, AgentError>;

    /// Fetch the package at `url`.
    async fn download(&self, url: &str) -> Result<Bytes, AgentError>;
}

/// `reqwest`-backed transport with bounded timeouts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    check_url: Url,
    request_timeout: Duration,
    download_timeout: Duration,
}

impl HttpTransport {
    /// Transport talking to the server named in `config`.
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .user_agent(concat!("termup-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AgentError::transport)?;
        Ok(Self {
            client,
            check_url: config.check_url(),
            request_timeout: config.request_timeout,
            download_timeout: config.download_timeout,
        })
    }
}

#[async_trait]
impl UpdateTransport for HttpTransport {
    async fn check(&self, local_version: &str) -> Result<CheckUpdateResponse, AgentError> {
        debug!(url = %self.check_url, local = local_version, "checking for update");
        let response = self
            .client
            .get(self.check_url.clone())
            .query(&[("version", local_version)])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(AgentError::transport)?;
        match response.status() {
            status if status.is_success() => response
                .json::<CheckUpdateResponse>()
                .await
                .map_err(|err| AgentError::InvalidResponse(err.to_string())),
            StatusCode::NOT_FOUND => Err(AgentError::ManifestNotFound),
            status => Err(AgentError::TransportFailure(format!(
                "update check returned HTTP {status}"
            ))),
        }
    }

    async fn download(&self, url: &str) -> Result<Bytes, AgentError> {
        let url = Url::parse(url)
            .map_err(|err| AgentError::InvalidResponse(format!("bad download url '{url}': {err}")))?;
        debug!(url = %url, "downloading package");
        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(AgentError::transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::TransportFailure(format!(
                "download returned HTTP {status}"
            )));
        }
        response.bytes().await.map_err(AgentError::transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termup_server::{PublishService, ServerBuilder, Stores};

    async fn serve(stores: Stores) -> (termup_server::ServerHandle, AgentConfig) {
        let handle = ServerBuilder::new("127.0.0.1:0".parse().unwrap(), stores)
            .spawn()
            .await
            .unwrap();
        let url = Url::parse(&format!("http://{}", handle.local_addr())).unwrap();
        let config = AgentConfig::new(url, "unused");
        (handle, config)
    }

    #[tokio::test]
    async fn check_maps_missing_manifest() {
        let (handle, config) = serve(Stores::in_memory()).await;
        let transport = HttpTransport::new(&config).unwrap();
        let err = transport.check("1.0").await.unwrap_err();
        assert!(matches!(err, AgentError::ManifestNotFound));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn check_and_download_against_live_service() {
        let stores = Stores::in_memory();
        PublishService::new(stores.clone())
            .publish("2.0", Bytes::from_static(b"package-bytes"))
            .await
            .unwrap();
        let (handle, config) = serve(stores).await;
        let transport = HttpTransport::new(&config).unwrap();

        let response = transport.check("1.0").await.unwrap();
        assert!(response.update_available);
        let url = response.url.unwrap();
        assert_eq!(&transport.download(&url).await.unwrap()[..], b"package-bytes");

        let missing = url.replace("v2.0", "v9.9");
        assert!(matches!(
            transport.download(&missing).await,
            Err(AgentError::TransportFailure(_))
        ));
        assert!(matches!(
            transport.download("::not a url::").await,
            Err(AgentError::InvalidResponse(_))
        ));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let config = AgentConfig::new(Url::parse(&format!("http://{addr}")).unwrap(), "unused")
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2));
        let transport = HttpTransport::new(&config).unwrap();
        assert!(matches!(
            transport.check("1.0").await,
            Err(AgentError::TransportFailure(_))
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out_as_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepting = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let base = Url::parse(&format!("http://{addr}")).unwrap();
        let config = AgentConfig::new(base, "unused")
            .with_timeouts(Duration::from_millis(300), Duration::from_millis(300));
        let transport = HttpTransport::new(&config).unwrap();

        let started = std::time::Instant::now();
        match transport.check("1.0").await {
            Err(AgentError::TransportFailure(reason)) => {
                assert!(reason.contains("timed out"), "{reason}")
            }
            other => panic!("unexpected check result {other:?}"),
        }
        match transport
            .download(&format!("http://{addr}/download/erp_update_v2.0.zip"))
            .await
        {
            Err(AgentError::TransportFailure(reason)) => {
                assert!(reason.contains("timed out"), "{reason}")
            }
            other => panic!("unexpected download result {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        accepting.abort();
    }
}
