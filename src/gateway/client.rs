//! Gateway connection handling.

use crate::gateway::ConnectError;
use crate::gateway::command::DeployResourceCommand;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default connection timeout for the reachability probe.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Network address of a broker gateway.
///
/// Derived from a running container; valid only while that container runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAddress {
    /// Host the gateway is reachable on
    pub host: String,
    /// Published gateway port
    pub port: u16,
}

impl GatewayAddress {
    /// Create a gateway address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for GatewayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Gateway client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connect without transport security
    pub use_plaintext: bool,
    /// Timeout for the connection probe
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            use_plaintext: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Configuration for a plaintext connection, as used against a local
    /// test container.
    pub fn plaintext() -> Self {
        Self {
            use_plaintext: true,
            ..Self::default()
        }
    }
}

/// Readiness document served by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayStatus {
    /// Whether the gateway reports itself ready to take commands
    #[serde(default)]
    pub ready: bool,
    /// Broker version string, when reported
    #[serde(default)]
    pub version: Option<String>,
}

/// Client for a broker gateway endpoint.
///
/// Cheap to clone and safe for concurrent use: every command chain issues
/// its own independent request.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GatewayClient {
    /// Connect to a gateway.
    ///
    /// Builds the transport and probes the gateway's status endpoint once;
    /// an endpoint that does not answer at all fails here rather than on
    /// the first command. With `use_plaintext` disabled the caller must
    /// supply transport security configuration, which this client does not
    /// carry, so the connection is refused.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::TlsRequired`], [`ConnectError::InvalidAddress`]
    /// or [`ConnectError::Unreachable`].
    pub async fn connect(
        address: GatewayAddress,
        config: ClientConfig,
    ) -> Result<Self, ConnectError> {
        if !config.use_plaintext {
            return Err(ConnectError::TlsRequired);
        }

        let base_url = Url::parse(&format!("http://{address}/"))
            .map_err(|_| ConnectError::InvalidAddress(address.to_string()))?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|_| ConnectError::InvalidAddress(address.to_string()))?;

        let client = Self { http, base_url };

        debug!("Probing gateway at {}", address);
        let status = client.status().await?;
        info!(
            "Connected to gateway at {} (ready: {}, version: {:?})",
            address, status.ready, status.version
        );

        Ok(client)
    }

    /// Fetch the gateway's readiness document.
    ///
    /// Any HTTP answer proves reachability; a non-success status or an
    /// unparseable body reads as a not-ready gateway.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Unreachable`] if the endpoint does not
    /// answer.
    pub async fn status(&self) -> Result<GatewayStatus, ConnectError> {
        let url = self.endpoint("v1/status")?;
        let response =
            self.http
                .get(url)
                .send()
                .await
                .map_err(|source| ConnectError::Unreachable {
                    address: self.base_url.to_string(),
                    source,
                })?;

        if !response.status().is_success() {
            return Ok(GatewayStatus::default());
        }
        Ok(response.json().await.unwrap_or_default())
    }

    /// Create a deploy command bound to this client.
    pub fn new_deploy_command(&self) -> DeployResourceCommand {
        DeployResourceCommand::new(self.http.clone(), self.base_url.clone())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ConnectError> {
        self.base_url
            .join(path)
            .map_err(|_| ConnectError::InvalidAddress(self.base_url.to_string()))
    }
}
