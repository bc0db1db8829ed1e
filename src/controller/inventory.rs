use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{JarvisError, Result};
use crate::targets::{EndpointRecord, NodeRecord, NodeSelector};

/// Desired state of a command resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default)]
    pub selector: NodeSelector,
}

/// A named request to run a command on selected nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResource {
    pub name: String,
    pub spec: CommandSpec,
}

impl CommandResource {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: CommandSpec {
                command: command.into(),
                selector: NodeSelector::default(),
            },
        }
    }

    pub fn with_selector(mut self, selector: NodeSelector) -> Self {
        self.spec.selector = selector;
        self
    }
}

/// Read-only view of the cluster that the reconciler depends on.
///
/// Every call is a point-in-time snapshot; implementations may be stale.
#[tonic::async_trait]
pub trait ClusterState: Send + Sync + 'static {
    async fn get_command(&self, command_id: &str) -> Result<Option<CommandResource>>;

    async fn list_commands(&self) -> Result<Vec<CommandResource>>;

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>>;

    /// Endpoint records of the agent service.
    async fn list_agent_endpoints(&self) -> Result<Vec<EndpointRecord>>;
}

/// Serialized form of a [`StaticCluster`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub endpoints: Vec<EndpointRecord>,
    #[serde(default)]
    pub commands: Vec<CommandResource>,
}

/// In-memory cluster state, optionally loaded from a JSON inventory file.
#[derive(Debug, Default)]
pub struct StaticCluster {
    inventory: RwLock<Inventory>,
}

impl StaticCluster {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory: RwLock::new(inventory),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await.map_err(|e| {
            JarvisError::Inventory(format!("failed to read {}: {e}", path.display()))
        })?;
        let inventory: Inventory = serde_json::from_slice(&raw).map_err(|e| {
            JarvisError::Inventory(format!("failed to parse {}: {e}", path.display()))
        })?;

        tracing::info!(
            path = %path.display(),
            nodes = inventory.nodes.len(),
            endpoints = inventory.endpoints.len(),
            commands = inventory.commands.len(),
            "Loaded cluster inventory"
        );
        Ok(Self::new(inventory))
    }

    pub async fn set_nodes(&self, nodes: Vec<NodeRecord>) {
        self.inventory.write().await.nodes = nodes;
    }

    pub async fn set_endpoints(&self, endpoints: Vec<EndpointRecord>) {
        self.inventory.write().await.endpoints = endpoints;
    }

    /// Insert a command, replacing any existing one with the same name.
    pub async fn upsert_command(&self, command: CommandResource) {
        let mut inventory = self.inventory.write().await;
        match inventory
            .commands
            .iter_mut()
            .find(|c| c.name == command.name)
        {
            Some(existing) => *existing = command,
            None => inventory.commands.push(command),
        }
    }

    pub async fn remove_command(&self, name: &str) -> bool {
        let mut inventory = self.inventory.write().await;
        let before = inventory.commands.len();
        inventory.commands.retain(|c| c.name != name);
        inventory.commands.len() != before
    }
}

#[tonic::async_trait]
impl ClusterState for StaticCluster {
    async fn get_command(&self, command_id: &str) -> Result<Option<CommandResource>> {
        let inventory = self.inventory.read().await;
        Ok(inventory
            .commands
            .iter()
            .find(|c| c.name == command_id)
            .cloned())
    }

    async fn list_commands(&self) -> Result<Vec<CommandResource>> {
        Ok(self.inventory.read().await.commands.clone())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        Ok(self.inventory.read().await.nodes.clone())
    }

    async fn list_agent_endpoints(&self) -> Result<Vec<EndpointRecord>> {
        Ok(self.inventory.read().await.endpoints.clone())
    }
}
