//! Broker gateway client layer.
//!
//! A thin SDK over the broker's gateway endpoint: connection setup with a
//! reachability probe, and a fluent deploy command that accumulates resources
//! before a single cancellable send.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use broker_harness::gateway::{CallContext, ClientConfig, GatewayAddress, GatewayClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let address = GatewayAddress::new("127.0.0.1", 26500);
//!     let client = GatewayClient::connect(address, ClientConfig::plaintext()).await?;
//!
//!     let mut command = client
//!         .new_deploy_command()
//!         .add_resource_file("testdata/service_task.bpmn")?;
//!     let result = command.send(&CallContext::background()).await?;
//!
//!     println!("deployed under key {}", result.key);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod command;
pub mod context;

pub use client::{ClientConfig, GatewayAddress, GatewayClient, GatewayStatus};
pub use command::{
    CommandState, DeployResource, DeployResourceCommand, DeployedResource, DeploymentResult,
};
pub use context::CallContext;

use std::path::PathBuf;
use std::time::Duration;

/// Gateway connection errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The address does not form a valid endpoint URL
    #[error("invalid gateway address: {0}")]
    InvalidAddress(String),

    /// Plaintext is disabled and no transport security was supplied
    #[error("transport security is not configured; enable plaintext or supply TLS settings")]
    TlsRequired,

    /// The gateway endpoint could not be reached
    #[error("gateway unreachable at {address}: {source}")]
    Unreachable {
        /// Endpoint that was probed
        address: String,
        /// Transport-level failure
        #[source]
        source: reqwest::Error,
    },
}

/// Command dispatch errors.
///
/// The variant is the error kind; the payload carries the message.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A local input resource could not be read
    #[error("failed to read resource {path}: {source}")]
    ResourceRead {
        /// Path that failed to read
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// The request never reached the gateway
    #[error("connection failure: {0}")]
    Connection(String),

    /// The gateway or the command chain rejected the request
    #[error("validation failure: {0}")]
    Validation(String),

    /// The context deadline elapsed before a response arrived
    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    /// The context was cancelled; the in-flight call was aborted
    #[error("command cancelled")]
    Cancelled,

    /// The gateway answered with an unexpected failure
    #[error("gateway failure: {0}")]
    Unknown(String),
}
