use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A cluster node as reported by the node inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl NodeRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// One endpoint of the agent service as published by service discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl EndpointRecord {
    pub fn new(node_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            node_name: Some(node_name.into()),
            addresses: vec![address.into()],
        }
    }
}

/// Build the node → agent address map from endpoint records.
///
/// An endpoint is usable only when it names a node and carries at least one
/// address; its first address is used. A later record for the same node
/// replaces an earlier one.
pub fn agent_addresses(endpoints: &[EndpointRecord]) -> HashMap<String, String> {
    let mut addresses = HashMap::new();
    for endpoint in endpoints {
        let (Some(node), Some(address)) = (&endpoint.node_name, endpoint.addresses.first()) else {
            continue;
        };
        addresses.insert(node.clone(), address.clone());
    }
    addresses
}
