//! Deploy command chain.
//!
//! A command accumulates named resources while `Building`, then performs
//! exactly one RPC attempt on `send`. There is no implicit retry: blind
//! retry of a deployment risks duplicate artifact registration, so retry
//! policy stays with the caller.

use crate::gateway::CommandError;
use crate::gateway::context::CallContext;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use url::Url;

/// Lifecycle of a deploy command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Accepting resources
    Building,
    /// RPC in flight
    Sending,
    /// Terminal: the gateway accepted the deployment
    Succeeded,
    /// Terminal: the send failed
    Failed,
}

/// A named resource staged for deployment.
#[derive(Debug, Clone)]
pub struct DeployResource {
    /// Resource name as registered with the broker
    pub name: String,
    /// Raw resource content
    pub content: Vec<u8>,
}

/// Broker-assigned identifiers for an accepted deployment.
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    /// Key of the deployment as a whole
    pub key: i64,
    /// Per-resource registration records
    pub deployments: Vec<DeployedResource>,
}

/// One registered resource within a deployment.
#[derive(Debug, Clone)]
pub struct DeployedResource {
    /// Resource name
    pub name: String,
    /// Broker-assigned key
    pub key: i64,
}

#[derive(Serialize)]
struct WireRequest {
    resources: Vec<WireResource>,
}

#[derive(Serialize)]
struct WireResource {
    name: String,
    content: String,
}

#[derive(Deserialize)]
struct WireResponse {
    key: i64,
    #[serde(default)]
    deployments: Vec<WireDeployment>,
}

#[derive(Deserialize)]
struct WireDeployment {
    name: String,
    key: i64,
}

#[derive(Default, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

/// Fluent deploy command.
///
/// Single-use: once sent, the command is terminal and refuses further
/// mutation or a second send.
pub struct DeployResourceCommand {
    http: reqwest::Client,
    base_url: Url,
    resources: Vec<DeployResource>,
    state: CommandState,
}

impl DeployResourceCommand {
    pub(crate) fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            resources: Vec::new(),
            state: CommandState::Building,
        }
    }

    /// Stage a resource read from a file; the file name becomes the
    /// resource name.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::ResourceRead`] if the path cannot be read,
    /// or [`CommandError::Validation`] if the command was already sent.
    pub fn add_resource_file(self, path: impl AsRef<Path>) -> Result<Self, CommandError> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|source| CommandError::ResourceRead {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.add_resource_bytes(name, content)
    }

    /// Stage an in-memory resource under an explicit name.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Validation`] if the command was already sent.
    pub fn add_resource_bytes(
        mut self,
        name: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<Self, CommandError> {
        self.ensure_building()?;
        self.resources.push(DeployResource {
            name: name.into(),
            content,
        });
        Ok(self)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Number of staged resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Send the deployment: exactly one RPC attempt.
    ///
    /// Cancellation and deadline come from the context; either aborts the
    /// in-flight call by dropping it. A context that is already cancelled
    /// fails before any request is issued. A second send on the same
    /// command fails with a validation error instead of re-issuing the RPC.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] naming the failure kind.
    pub async fn send(&mut self, ctx: &CallContext) -> Result<DeploymentResult, CommandError> {
        self.ensure_building()?;
        if self.resources.is_empty() {
            return Err(CommandError::Validation(
                "deploy command has no resources".to_string(),
            ));
        }

        self.state = CommandState::Sending;
        debug!("Sending deploy command with {} resource(s)", self.resources.len());

        let outcome = self.dispatch(ctx).await;
        self.state = if outcome.is_ok() {
            CommandState::Succeeded
        } else {
            CommandState::Failed
        };
        outcome
    }

    fn ensure_building(&self) -> Result<(), CommandError> {
        match self.state {
            CommandState::Building => Ok(()),
            _ => Err(CommandError::Validation(
                "deploy command already sent".to_string(),
            )),
        }
    }

    async fn dispatch(&self, ctx: &CallContext) -> Result<DeploymentResult, CommandError> {
        let call = self.post_deployment();

        // Biased so an already-cancelled context wins before the request
        // future is ever polled.
        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(CommandError::Cancelled),
            outcome = async {
                match ctx.deadline() {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .map_err(|_| CommandError::Timeout(limit))?,
                    None => call.await,
                }
            } => outcome,
        }
    }

    async fn post_deployment(&self) -> Result<DeploymentResult, CommandError> {
        let url = self
            .base_url
            .join("v1/deployments")
            .map_err(|e| CommandError::Unknown(e.to_string()))?;

        let request = WireRequest {
            resources: self
                .resources
                .iter()
                .map(|r| WireResource {
                    name: r.name.clone(),
                    content: BASE64.encode(&r.content),
                })
                .collect(),
        };

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CommandError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: WireResponse = response
                .json()
                .await
                .map_err(|e| CommandError::Unknown(format!("malformed deployment response: {e}")))?;
            return Ok(DeploymentResult {
                key: body.key,
                deployments: body
                    .deployments
                    .into_iter()
                    .map(|d| DeployedResource {
                        name: d.name,
                        key: d.key,
                    })
                    .collect(),
            });
        }

        if status == StatusCode::BAD_REQUEST {
            let body: WireError = response.json().await.unwrap_or_default();
            let message = if body.message.is_empty() {
                status.to_string()
            } else {
                body.message
            };
            return Err(CommandError::Validation(message));
        }

        Err(CommandError::Unknown(format!("gateway returned {status}")))
    }
}
