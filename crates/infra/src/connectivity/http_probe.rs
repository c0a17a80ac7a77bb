//! HTTP-based reachability probe
//!
//! Samples reachability by requesting a lightweight connectivity-check
//! endpoint (a captive-portal style generate-204 URL). An HTTP probe can
//! confirm that the network carries traffic but cannot see the link type,
//! so the interface classification for confirmed-online samples comes from
//! configuration; platforms with a native reachability API implement
//! `ReachabilityProbe` directly instead.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use tideline_core::ports::ReachabilityProbe;
use tideline_domain::{ConnectivityInfo, NetworkType, Result, TidelineError};
use tracing::debug;

/// Configuration for [`HttpProbe`].
#[derive(Debug, Clone)]
pub struct HttpProbeConfig {
    /// Endpoint expected to answer quickly with a success status
    pub probe_url: String,
    /// Per-sample timeout; kept short so an offline sample resolves fast
    pub timeout: Duration,
    /// Link type reported for confirmed-online samples
    pub network: NetworkType,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        Self {
            probe_url: "http://connectivitycheck.gstatic.com/generate_204".to_string(),
            timeout: Duration::from_secs(5),
            network: NetworkType::Wifi,
        }
    }
}

/// Reachability probe backed by an HTTP connectivity-check endpoint.
pub struct HttpProbe {
    client: ReqwestClient,
    config: HttpProbeConfig,
}

impl HttpProbe {
    /// Build a probe for the configured endpoint.
    pub fn new(config: HttpProbeConfig) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| TidelineError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn sample(&self) -> ConnectivityInfo {
        match self.client.get(&self.config.probe_url).send().await {
            Ok(response) if response.status().is_success() => {
                ConnectivityInfo { is_online: true, network: self.config.network }
            }
            Ok(response) => {
                // Reachable but answering abnormally (captive portal,
                // degraded gateway): never report online without confirmation.
                debug!(status = %response.status(), "probe endpoint answered abnormally");
                ConnectivityInfo { is_online: false, network: NetworkType::Unknown }
            }
            Err(err) => {
                debug!(error = %err, "probe request failed");
                ConnectivityInfo::offline()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn probe_for(server_uri: String) -> HttpProbe {
        HttpProbe::new(HttpProbeConfig {
            probe_url: server_uri,
            timeout: Duration::from_secs(1),
            network: NetworkType::Wifi,
        })
        .expect("probe built")
    }

    #[tokio::test]
    async fn success_response_confirms_online() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(204)).mount(&server).await;

        let sample = probe_for(server.uri()).sample().await;
        assert!(sample.is_online);
        assert!(sample.is_usable());
    }

    #[tokio::test]
    async fn abnormal_response_is_treated_as_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let sample = probe_for(server.uri()).sample().await;
        assert!(!sample.is_online);
        assert_eq!(sample.network, NetworkType::Unknown);
        assert!(!sample.is_usable());
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_offline() {
        // Bind and drop a listener so the port refuses connections.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sample = probe_for(format!("http://{addr}")).sample().await;
        assert_eq!(sample, ConnectivityInfo::offline());
    }
}
