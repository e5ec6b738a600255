//! Broker container runtime layer.
//!
//! This module provisions ephemeral broker containers for integration tests
//! using Docker/Podman via the bollard API. It handles daemon connection,
//! container configuration, startup gated on an observed readiness signal,
//! and teardown on every exit path.
//!
//! ## Architecture
//!
//! The runtime module is organized into several components:
//!
//! - [`client`]: Docker/Podman API client wrapper with connection fallback
//! - [`descriptor`]: Container request builder with bind-mount validation
//! - [`wait`]: Poll-based readiness strategies over the container log stream
//! - [`handle`]: Running-container handle with port mapping and idempotent stop
//!
//! ## Usage
//!
//! ```rust,no_run
//! use broker_harness::runtime::{BrokerContainer, BrokerDescriptor, RuntimeClient};
//! use broker_harness::runtime::descriptor::{BROKER_DATA_PATH, GATEWAY_PORT};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RuntimeClient::connect().await?;
//!
//!     let descriptor = BrokerDescriptor::builder()
//!         .image("example/broker:latest")
//!         .exposed_port(GATEWAY_PORT)
//!         .bind("/tmp/broker-data", BROKER_DATA_PATH)
//!         .build()?;
//!
//!     let broker = BrokerContainer::start(&client, descriptor).await?;
//!     let port = broker.mapped_port(GATEWAY_PORT)?;
//!     println!("gateway reachable on {}:{}", broker.host(), port);
//!
//!     broker.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod descriptor;
pub mod handle;
pub mod wait;

pub use client::RuntimeClient;
pub use descriptor::{BrokerDescriptor, BrokerDescriptorBuilder};
pub use handle::BrokerContainer;
pub use wait::{ContainerLogs, LogMarkerStrategy, LogSource, ReadyState, WaitCondition, WaitStrategy};

use std::time::Duration;

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Docker/Podman API error
    #[error("container API error: {0}")]
    Api(#[from] bollard::errors::Error),

    /// Container not found
    #[error("container not found: {0}")]
    NotFound(String),

    /// No container runtime reachable
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// Invalid container request
    #[error("configuration error: {0}")]
    Config(String),

    /// Readiness marker never observed within the wait budget
    #[error("broker not ready after {waited:?}: marker {marker:?} never observed")]
    ReadyTimeout {
        /// The log marker that was waited for
        marker: String,
        /// Time spent polling before giving up
        waited: Duration,
    },

    /// Exposed container port has no host mapping
    #[error("container port {0} has no host mapping")]
    PortNotMapped(u16),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
