//! Running broker container handle.
//!
//! Owns the exclusive lifetime of one provisioned container: creation,
//! startup gated on the readiness wait, host/port resolution, and teardown
//! on every exit path.

use crate::gateway::GatewayAddress;
use crate::runtime::descriptor::BrokerDescriptor;
use crate::runtime::wait::{ContainerLogs, LogMarkerStrategy, LogSource, WaitCondition, WaitStrategy};
use crate::runtime::{Result, RuntimeClient, RuntimeError};
use bollard::Docker;
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, RemoveContainerOptionsBuilder,
    StopContainerOptionsBuilder,
};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Host address used when the runtime publishes ports on all interfaces.
const LOOPBACK_HOST: &str = "127.0.0.1";

/// Seconds the runtime waits for a graceful stop before killing.
const STOP_TIMEOUT_SECS: i32 = 10;

/// Handle to a provisioned broker container.
///
/// [`stop`](Self::stop) is the mandated cleanup path; `Drop` only backstops
/// a handle that leaks without it.
pub struct BrokerContainer {
    client: RuntimeClient,
    id: String,
    name: String,
    host: String,
    ports: HashMap<u16, u16>,
    exposed_ports: Vec<u16>,
    wait: WaitCondition,
    started: bool,
    stopped: Arc<AtomicBool>,
}

impl BrokerContainer {
    /// Provision a container and block until the broker is ready.
    ///
    /// Pulls the image when absent, creates and starts the container, and
    /// waits for the descriptor's readiness marker in the log stream. On a
    /// wait failure the container is torn down before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ReadyTimeout`] if the marker never appears
    /// within the wait budget, or the underlying API error.
    pub async fn start(client: &RuntimeClient, descriptor: BrokerDescriptor) -> Result<Self> {
        let strategy = LogMarkerStrategy::new(descriptor.wait().clone());
        Self::start_with_strategy(client, descriptor, &strategy).await
    }

    /// Provision a container gated on a caller-supplied readiness strategy.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`start`](Self::start).
    pub async fn start_with_strategy(
        client: &RuntimeClient,
        descriptor: BrokerDescriptor,
        strategy: &dyn WaitStrategy,
    ) -> Result<Self> {
        descriptor.validate()?;
        ensure_image(client, descriptor.image()).await?;

        let name = format!("broker-{}", Uuid::new_v4());
        let options = CreateContainerOptionsBuilder::default().name(&name).build();

        debug!("Creating broker container: {}", name);
        let response = client
            .docker()
            .create_container(Some(options), descriptor.to_create_body())
            .await?;
        info!("Created broker container: {} ({})", name, response.id);

        let mut container = Self {
            client: client.clone(),
            id: response.id,
            name,
            host: LOOPBACK_HOST.to_string(),
            ports: HashMap::new(),
            exposed_ports: descriptor.exposed_ports().to_vec(),
            wait: descriptor.wait().clone(),
            started: false,
            stopped: Arc::new(AtomicBool::new(false)),
        };

        if descriptor.auto_start() {
            container.launch(strategy).await?;
        }

        Ok(container)
    }

    /// Start a container that was created with `auto_start` disabled.
    ///
    /// Blocks until the readiness marker is observed, like
    /// [`start`](Self::start) does. No-op if the container already runs.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`start`](Self::start); the container is torn
    /// down on failure.
    pub async fn start_running(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        let strategy = LogMarkerStrategy::new(self.wait.clone());
        self.launch(&strategy).await
    }

    /// Start the backing container, block on readiness, resolve ports.
    ///
    /// Tears the container down before returning any error so a failed
    /// start never leaks the process.
    async fn launch(&mut self, strategy: &dyn WaitStrategy) -> Result<()> {
        if let Err(e) = self.launch_inner(strategy).await {
            self.stopped.store(true, Ordering::SeqCst);
            if let Err(cleanup) = teardown(&self.client.docker_owned(), &self.id).await {
                warn!(
                    "Cleanup after failed start of {} also failed: {}",
                    self.name, cleanup
                );
            }
            return Err(e);
        }
        Ok(())
    }

    async fn launch_inner(&mut self, strategy: &dyn WaitStrategy) -> Result<()> {
        debug!("Starting broker container: {}", self.name);
        self.client
            .docker()
            .start_container(
                &self.id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await?;

        let logs = ContainerLogs::new(self.client.docker_owned(), self.id.clone());
        strategy.wait_ready(&logs).await?;

        self.resolve_address().await?;
        self.started = true;
        info!(
            "Broker container {} ready on {}:{:?}",
            self.name, self.host, self.ports
        );
        Ok(())
    }

    /// Read the published port map from the runtime.
    async fn resolve_address(&mut self) -> Result<()> {
        let inspect = self
            .client
            .docker()
            .inspect_container(
                &self.id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await?;

        let port_map = inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default();

        for port in &self.exposed_ports {
            let key = format!("{port}/tcp");
            let Some(Some(bindings)) = port_map.get(&key) else {
                continue;
            };
            let Some(binding) = bindings.first() else {
                continue;
            };
            if let Some(host_port) = binding
                .host_port
                .as_deref()
                .and_then(|p| p.parse::<u16>().ok())
            {
                self.ports.insert(*port, host_port);
            }
            // Wildcard and v6-any bindings are reachable via loopback.
            if let Some(ip) = binding.host_ip.as_deref() {
                if !ip.is_empty() && ip != "0.0.0.0" && ip != "::" {
                    self.host = ip.to_string();
                }
            }
        }

        Ok(())
    }

    /// The container ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host address the published ports are reachable on.
    ///
    /// Valid only while the container is running.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host port an exposed container port was published to.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::PortNotMapped`] if the port was not exposed
    /// or the container is not running.
    pub fn mapped_port(&self, container_port: u16) -> Result<u16> {
        self.ports
            .get(&container_port)
            .copied()
            .ok_or(RuntimeError::PortNotMapped(container_port))
    }

    /// Gateway address for an exposed container port.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::PortNotMapped`] if the port has no mapping.
    pub fn gateway_address(&self, container_port: u16) -> Result<GatewayAddress> {
        Ok(GatewayAddress::new(
            self.host.clone(),
            self.mapped_port(container_port)?,
        ))
    }

    /// Fetch the container's log output so far.
    ///
    /// Useful for post-mortem inspection after a failed wait.
    ///
    /// # Errors
    ///
    /// Returns error if log retrieval fails.
    pub async fn logs(&self) -> Result<String> {
        ContainerLogs::new(self.client.docker_owned(), self.id.clone())
            .observe()
            .await
    }

    /// Stop and remove the backing container.
    ///
    /// Idempotent: repeated calls, or a call racing `Drop`, release the
    /// container exactly once. Safe to invoke on a container whose start
    /// never completed.
    ///
    /// # Errors
    ///
    /// Returns error if removal fails for reasons other than the container
    /// already being gone.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Broker container {} already released", self.name);
            return Ok(());
        }

        info!("Stopping broker container: {}", self.name);
        teardown(&self.client.docker_owned(), &self.id).await
    }
}

impl Drop for BrokerContainer {
    fn drop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        warn!(
            "Broker container {} dropped without stop(); removing in background",
            self.name
        );
        let docker = self.client.docker_owned();
        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = remove_container(&docker, &id).await {
                        warn!("Failed to remove leaked container {}: {}", id, e);
                    }
                });
            }
            Err(_) => {
                warn!(
                    "No async runtime available; container {} must be removed manually",
                    id
                );
            }
        }
    }
}

/// Pull the image when it is not present locally.
async fn ensure_image(client: &RuntimeClient, image: &str) -> Result<()> {
    if client.image_exists(image).await? {
        debug!("Image {} already exists locally", image);
        return Ok(());
    }

    info!("Pulling image: {}", image);
    let options = CreateImageOptionsBuilder::default().from_image(image).build();
    let mut stream = client.docker().create_image(Some(options), None, None);

    while let Some(result) = stream.next().await {
        let progress = result?;
        if let Some(status) = progress.status {
            debug!("Pull status: {}", status);
        }
    }

    info!("Successfully pulled image: {}", image);
    Ok(())
}

/// Stop then force-remove a container.
///
/// A stop failure is reported and does not prevent removal; a container
/// that is already gone counts as released.
async fn teardown(docker: &Docker, id: &str) -> Result<()> {
    let stop_options = StopContainerOptionsBuilder::default()
        .t(STOP_TIMEOUT_SECS)
        .build();
    if let Err(e) = docker.stop_container(id, Some(stop_options)).await {
        warn!("Failed to stop container {}: {}", id, e);
    }

    remove_container(docker, id).await
}

async fn remove_container(docker: &Docker, id: &str) -> Result<()> {
    let options = RemoveContainerOptionsBuilder::default()
        .force(true)
        .v(true)
        .build();
    match docker.remove_container(id, Some(options)).await {
        Ok(()) => {
            debug!("Removed container: {}", id);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(()),
        Err(e) => Err(RuntimeError::Api(e)),
    }
}
