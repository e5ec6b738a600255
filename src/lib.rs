//! # Broker Harness
//!
//! Integration test harness for workflow-broker client SDKs. The harness
//! provisions an ephemeral broker inside a container, gates the test on the
//! broker's own readiness signal instead of a fixed sleep, and drives deploy
//! commands through a gateway client with cancellation and deadline
//! propagation.
//!
//! ## Architecture Overview
//!
//! The crate consists of two module families:
//!
//! - **[`runtime`]**: Container provisioning against Docker/Podman:
//!   request descriptors with bind-mount validation, poll-based readiness
//!   wait strategies over the container log stream, and a container handle
//!   with idempotent teardown on every exit path.
//! - **[`gateway`]**: A thin client SDK for the broker's gateway endpoint:
//!   connection setup with a reachability probe and a fluent, single-use
//!   deploy command chain.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use broker_harness::gateway::{CallContext, ClientConfig, GatewayClient};
//! use broker_harness::runtime::descriptor::{BROKER_DATA_PATH, GATEWAY_PORT};
//! use broker_harness::runtime::{BrokerContainer, BrokerDescriptor, RuntimeClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let data_dir = tempfile::tempdir()?;
//!
//!     let runtime = RuntimeClient::connect().await?;
//!     let broker = BrokerContainer::start(
//!         &runtime,
//!         BrokerDescriptor::builder()
//!             .image("example/broker:latest")
//!             .exposed_port(GATEWAY_PORT)
//!             .bind(data_dir.path(), BROKER_DATA_PATH)
//!             .build()?,
//!     )
//!     .await?;
//!
//!     let client = GatewayClient::connect(
//!         broker.gateway_address(GATEWAY_PORT)?,
//!         ClientConfig::plaintext(),
//!     )
//!     .await?;
//!
//!     let result = client
//!         .new_deploy_command()
//!         .add_resource_file("testdata/service_task.bpmn")?
//!         .send(&CallContext::background())
//!         .await?;
//!     println!("deployed under key {}", result.key);
//!
//!     broker.stop().await?;
//!     Ok(())
//! }
//! ```

/// Container runtime layer.
///
/// Provisions broker containers via the bollard API, waits for an observed
/// readiness signal, and guarantees teardown on every exit path.
pub mod runtime;

/// Gateway client layer.
///
/// Connects to the broker gateway and dispatches single-use deploy commands
/// with cancellation and deadline propagation.
pub mod gateway;

// Re-export main runtime types
pub use runtime::{
    BrokerContainer, BrokerDescriptor, LogMarkerStrategy, RuntimeClient, RuntimeError,
    WaitCondition, WaitStrategy,
};

// Re-export main gateway types
pub use gateway::{
    CallContext, ClientConfig, CommandError, ConnectError, DeployResourceCommand, DeploymentResult,
    GatewayAddress, GatewayClient,
};
