//! Broker container request builders.
//!
//! Provides a fluent API for describing the broker container to provision:
//! image, published ports, bind mounts, environment, and the readiness wait
//! condition that gates startup.

use crate::runtime::wait::WaitCondition;
use crate::runtime::{Result, RuntimeError};
use bollard::models::{ContainerCreateBody, HostConfig};
use std::collections::HashMap;
use std::path::PathBuf;

/// Path inside the container where the broker persists its data.
pub const BROKER_DATA_PATH: &str = "/usr/local/zeebe/data";

/// Container port the broker gateway listens on.
pub const GATEWAY_PORT: u16 = 26500;

/// Log line the broker emits once it accepts requests.
pub const READY_MARKER: &str = "Broker is ready";

/// Broker container request builder.
pub struct BrokerDescriptorBuilder {
    image: Option<String>,
    cmd: Option<Vec<String>>,
    exposed_ports: Vec<u16>,
    binds: Vec<(PathBuf, String)>,
    env: Vec<String>,
    wait: Option<WaitCondition>,
    auto_start: bool,
}

impl Default for BrokerDescriptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerDescriptorBuilder {
    /// Create a new descriptor builder.
    pub fn new() -> Self {
        Self {
            image: None,
            cmd: None,
            exposed_ports: Vec::new(),
            binds: Vec::new(),
            env: Vec::new(),
            wait: None,
            auto_start: true,
        }
    }

    /// Set the container image reference.
    pub fn image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Override the image's command.
    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Expose a container port, published to an ephemeral host port.
    pub fn exposed_port(mut self, port: u16) -> Self {
        self.exposed_ports.push(port);
        self
    }

    /// Bind-mount a host directory at a fixed container path.
    pub fn bind<P: Into<PathBuf>, S: Into<String>>(mut self, host_path: P, container_path: S) -> Self {
        self.binds.push((host_path.into(), container_path.into()));
        self
    }

    /// Add an environment variable.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push(format!("{}={}", key.into(), value.into()));
        self
    }

    /// Set the readiness wait condition.
    ///
    /// Defaults to the broker's [`READY_MARKER`] with the standard cadence.
    pub fn wait(mut self, condition: WaitCondition) -> Self {
        self.wait = Some(condition);
        self
    }

    /// Control whether the container is started and waited on immediately.
    ///
    /// When disabled, start only creates the container; call
    /// [`start_running`](crate::runtime::BrokerContainer::start_running) to
    /// launch it later.
    pub fn auto_start(mut self, enable: bool) -> Self {
        self.auto_start = enable;
        self
    }

    /// Build the descriptor.
    ///
    /// # Errors
    ///
    /// Returns error if no image was given.
    pub fn build(self) -> Result<BrokerDescriptor> {
        let image = self
            .image
            .ok_or_else(|| RuntimeError::Config("image is required".to_string()))?;

        Ok(BrokerDescriptor {
            image,
            cmd: self.cmd,
            exposed_ports: self.exposed_ports,
            binds: self.binds,
            env: self.env,
            wait: self
                .wait
                .unwrap_or_else(|| WaitCondition::for_marker(READY_MARKER)),
            auto_start: self.auto_start,
        })
    }
}

/// A broker container request.
///
/// Owned exclusively by its creator until handed to
/// [`BrokerContainer::start`](crate::runtime::BrokerContainer::start).
#[derive(Debug, Clone)]
pub struct BrokerDescriptor {
    image: String,
    cmd: Option<Vec<String>>,
    exposed_ports: Vec<u16>,
    binds: Vec<(PathBuf, String)>,
    env: Vec<String>,
    wait: WaitCondition,
    auto_start: bool,
}

impl BrokerDescriptor {
    /// Create a new descriptor builder.
    pub fn builder() -> BrokerDescriptorBuilder {
        BrokerDescriptorBuilder::new()
    }

    /// The image reference.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// The container ports published to the host.
    pub fn exposed_ports(&self) -> &[u16] {
        &self.exposed_ports
    }

    /// The readiness wait condition.
    pub fn wait(&self) -> &WaitCondition {
        &self.wait
    }

    /// Whether the container is started and waited on immediately.
    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    /// Check that every bind-mount host path exists and is writable.
    ///
    /// The broker writes artifacts into its data directory; a missing or
    /// read-only host path would surface much later as an opaque broker
    /// failure, so it is rejected before the container is created.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] naming the offending path.
    pub fn validate(&self) -> Result<()> {
        for (host_path, container_path) in &self.binds {
            let metadata = std::fs::metadata(host_path).map_err(|e| {
                RuntimeError::Config(format!(
                    "bind mount host path {} for {} is not accessible: {}",
                    host_path.display(),
                    container_path,
                    e
                ))
            })?;
            if metadata.permissions().readonly() {
                return Err(RuntimeError::Config(format!(
                    "bind mount host path {} for {} is not writable",
                    host_path.display(),
                    container_path
                )));
            }
        }
        Ok(())
    }

    /// Assemble the bollard create request for this descriptor.
    pub(crate) fn to_create_body(&self) -> ContainerCreateBody {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = self
            .exposed_ports
            .iter()
            .map(|port| (format!("{port}/tcp"), HashMap::new()))
            .collect();

        let binds: Vec<String> = self
            .binds
            .iter()
            .map(|(host_path, container_path)| {
                format!("{}:{}:rw", host_path.display(), container_path)
            })
            .collect();

        let host_config = HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            publish_all_ports: Some(true),
            ..Default::default()
        };

        ContainerCreateBody {
            image: Some(self.image.clone()),
            cmd: self.cmd.clone(),
            env: if self.env.is_empty() {
                None
            } else {
                Some(self.env.clone())
            },
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn build_requires_image() {
        let result = BrokerDescriptor::builder().exposed_port(GATEWAY_PORT).build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn build_defaults_to_broker_ready_marker() {
        let descriptor = BrokerDescriptor::builder()
            .image("example/broker:latest")
            .build()
            .unwrap();
        assert_eq!(descriptor.wait().marker(), READY_MARKER);
        assert!(descriptor.auto_start());
    }

    #[test]
    fn explicit_wait_condition_is_kept() {
        let condition =
            WaitCondition::new("gateway up", Duration::from_millis(100), Duration::from_secs(5))
                .unwrap();
        let descriptor = BrokerDescriptor::builder()
            .image("example/broker:latest")
            .wait(condition)
            .build()
            .unwrap();
        assert_eq!(descriptor.wait().marker(), "gateway up");
    }

    #[test]
    fn validate_rejects_missing_bind_path() {
        let descriptor = BrokerDescriptor::builder()
            .image("example/broker:latest")
            .bind("/definitely/not/a/real/path", BROKER_DATA_PATH)
            .build()
            .unwrap();
        let err = descriptor.validate().unwrap_err();
        assert!(err.to_string().contains("/definitely/not/a/real/path"));
    }

    #[test]
    fn validate_accepts_writable_temp_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let descriptor = BrokerDescriptor::builder()
            .image("example/broker:latest")
            .bind(temp_dir.path(), BROKER_DATA_PATH)
            .build()
            .unwrap();
        descriptor.validate().unwrap();
    }

    #[test]
    fn create_body_carries_binds_and_ports() {
        let temp_dir = tempfile::tempdir().unwrap();
        let descriptor = BrokerDescriptor::builder()
            .image("example/broker:latest")
            .exposed_port(GATEWAY_PORT)
            .bind(temp_dir.path(), BROKER_DATA_PATH)
            .env("BROKER_LOG_LEVEL", "debug")
            .build()
            .unwrap();

        let body = descriptor.to_create_body();
        assert_eq!(body.image.as_deref(), Some("example/broker:latest"));
        assert!(
            body.exposed_ports
                .unwrap()
                .contains_key(&format!("{GATEWAY_PORT}/tcp"))
        );

        let host_config = body.host_config.unwrap();
        assert_eq!(host_config.publish_all_ports, Some(true));
        let binds = host_config.binds.unwrap();
        assert_eq!(binds.len(), 1);
        assert!(binds[0].ends_with(&format!("{BROKER_DATA_PATH}:rw")));
        assert!(body.env.unwrap().contains(&"BROKER_LOG_LEVEL=debug".to_string()));
    }
}
