use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::targets::{ConfigError, NodeRecord, NodeSelector};

/// A selected node together with the address of its agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DispatchTarget {
    pub node_name: String,
    pub address: String,
}

impl DispatchTarget {
    pub fn new(node_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            address: address.into(),
        }
    }
}

/// Outcome of resolving one command's selector against the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Selected nodes with a known agent address.
    pub targets: Vec<DispatchTarget>,
    /// Selected nodes without an agent address. Skipped, not failed.
    pub unreachable: Vec<String>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.unreachable.is_empty()
    }
}

/// Join the node inventory with the agent address map through `selector`.
///
/// The selector is validated before any node is considered; an invalid
/// selector fails the whole resolution. Output order follows `nodes` but
/// carries no meaning.
///
/// Each node name appears at most once in the result. A name listed more
/// than once in `nodes` is selected when any of its records matches.
pub fn resolve(
    nodes: &[NodeRecord],
    selector: &NodeSelector,
    address_of: &HashMap<String, String>,
) -> Result<Resolution, ConfigError> {
    let selector = selector.compile()?;
    let mut resolution = Resolution::default();
    let mut seen = HashSet::new();

    for node in nodes.iter().filter(|n| selector.matches(n)) {
        if !seen.insert(node.name.as_str()) {
            tracing::warn!(node = %node.name, "Duplicate node record ignored");
            continue;
        }
        match address_of.get(&node.name) {
            Some(address) if !address.is_empty() => resolution
                .targets
                .push(DispatchTarget::new(node.name.clone(), address.clone())),
            _ => resolution.unreachable.push(node.name.clone()),
        }
    }

    tracing::debug!(
        targets = resolution.targets.len(),
        unreachable = resolution.unreachable.len(),
        "Resolved dispatch targets"
    );

    Ok(resolution)
}
